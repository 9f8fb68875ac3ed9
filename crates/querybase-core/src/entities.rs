//! The data model (§3): entities and the small enums that govern their
//! lifecycle transitions. Persistence lives in `querybase-store`; this
//! crate only owns the shapes and the invariants that are cheap to check
//! in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::ids::{
    ApprovalId, BackendId, CommentId, GroupId, HeldTransactionId, HistoryId, PrincipalId, QueryId,
    ReviewId,
};

/// A principal's role. `Admin` bypasses the permission evaluator entirely
/// (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
    Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub login: String,
    pub credential_hash: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub principal: PrincipalId,
    pub group: GroupId,
}

/// `{pg, mysql}` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Pg,
    Mysql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
    pub id: BackendId,
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// Base64 AEAD blob from `querybase-secrets`. Never exposed in any
    /// egress path.
    pub encrypted_credential: String,
    pub active: bool,
    pub healthy: bool,
    pub last_schema_sync_at: Option<DateTime<Utc>>,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Effective permission for a principal is the boolean union over all
/// groups they belong to (§4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Grant {
    pub backend: BackendId,
    pub group: GroupId,
    pub read: bool,
    pub write: bool,
    pub approve: bool,
}

/// A requested capability on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    Approve,
}

/// Statement kind produced by the classifier (§4.3). `Update` also serves
/// as the conservative default for unrecognized statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    DropTable,
    AlterTable,
}

impl StatementKind {
    /// Every kind except `select` enters the approval workflow (§4.3 table).
    #[must_use]
    pub const fn requires_approval(self) -> bool {
        !matches!(self, Self::Select)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::CreateTable => "create_table",
            Self::DropTable => "drop_table",
            Self::AlterTable => "alter_table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: QueryId,
    pub backend: BackendId,
    pub principal: PrincipalId,
    pub text: String,
    pub kind: StatementKind,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: QueryStatus,
    pub row_count: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub requires_approval: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A value in a result row (§9 "dynamic row payloads"): a tagged variant
/// covering what backend drivers can scan out of a row. Byte strings are
/// decoded as UTF-8 where valid, otherwise kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl CellValue {
    /// Parse this cell as a number for sort comparison (§4.7 pagination).
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(i) => Some(*i as f64),
            Self::Float64(f) => Some(*f),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Lexicographic comparison key used when numeric parsing fails.
    #[must_use]
    pub fn as_sort_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int64(i) => i.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Timestamp(t) => t.to_rfc3339(),
        }
    }

    /// Render for CSV export (§4.7 export): `null` becomes an empty,
    /// unquoted field.
    #[must_use]
    pub fn as_csv_field(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int64(i) => i.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Timestamp(t) => t.to_rfc3339(),
        }
    }
}

impl From<&CellValue> for JsonValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Null => JsonValue::Null,
            CellValue::Bool(b) => JsonValue::Bool(*b),
            CellValue::Int64(i) => JsonValue::from(*i),
            CellValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map_or(JsonValue::Null, JsonValue::Number),
            CellValue::String(s) => JsonValue::String(s.clone()),
            CellValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            CellValue::Timestamp(t) => JsonValue::String(t.to_rfc3339()),
        }
    }
}

/// One row: ordered by the parent result's `columns` list.
pub type Row = Vec<CellValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub query_id: QueryId,
    pub columns: Vec<String>,
    pub column_types: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: u64,
    pub stored_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub query: Option<QueryId>,
    pub principal: PrincipalId,
    pub backend: BackendId,
    pub text: String,
    pub kind: StatementKind,
    pub status: QueryStatus,
    pub row_count: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub principal_requested: PrincipalId,
    pub backend: BackendId,
    pub text: String,
    pub kind: StatementKind,
    pub status: ApprovalStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub approval: ApprovalId,
    pub reviewer: PrincipalId,
    pub decision: ReviewDecision,
    pub comments: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub approval: ApprovalId,
    pub author: PrincipalId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// §3: `status∈{active,committed,rolled_back,failed}`. Transitions out of
/// `Active` are monotonic and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeldTransactionStatus {
    Active,
    Committed,
    RolledBack,
    Failed,
}

impl HeldTransactionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldTransaction {
    pub id: HeldTransactionId,
    pub approval: ApprovalId,
    pub backend: BackendId,
    pub text: String,
    pub starter: PrincipalId,
    pub status: HeldTransactionStatus,
    pub preview_columns: Vec<String>,
    pub preview_rows: Vec<Row>,
    pub affected_rows: Option<u64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
