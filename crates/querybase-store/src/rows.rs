//! Raw `sqlx::FromRow` shapes mirroring the persisted layout. Kept
//! separate from `querybase_core::entities` so the wire/domain types never
//! need to derive `sqlx::FromRow` directly -- only this crate knows about
//! column names.

use chrono::{DateTime, Utc};
use querybase_core::entities::{
    Approval, ApprovalStatus, Backend, BackendKind, CellValue, Comment, Group, HeldTransaction,
    HeldTransactionStatus, HistoryEntry, Membership, Principal, QueryRecord, QueryStatus,
    ResultRecord, Review, ReviewDecision, Role, StatementKind,
};
use querybase_core::ids::{
    ApprovalId, BackendId, CommentId, GroupId, HeldTransactionId, HistoryId, PrincipalId, QueryId,
    ReviewId,
};
use uuid::Uuid;

fn parse_role(raw: &str) -> Role {
    match raw {
        "admin" => Role::Admin,
        "viewer" => Role::Viewer,
        _ => Role::User,
    }
}

pub(crate) fn role_str(role: Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::User => "user",
        Role::Viewer => "viewer",
    }
}

fn parse_backend_kind(raw: &str) -> BackendKind {
    if raw == "mysql" {
        BackendKind::Mysql
    } else {
        BackendKind::Pg
    }
}

pub(crate) fn backend_kind_str(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Pg => "pg",
        BackendKind::Mysql => "mysql",
    }
}

pub(crate) fn kind_str(kind: StatementKind) -> &'static str {
    kind.as_str()
}

fn parse_kind(raw: &str) -> StatementKind {
    match raw {
        "select" => StatementKind::Select,
        "insert" => StatementKind::Insert,
        "delete" => StatementKind::Delete,
        "create_table" => StatementKind::CreateTable,
        "drop_table" => StatementKind::DropTable,
        "alter_table" => StatementKind::AlterTable,
        _ => StatementKind::Update,
    }
}

pub(crate) fn query_status_str(status: QueryStatus) -> &'static str {
    match status {
        QueryStatus::Pending => "pending",
        QueryStatus::Running => "running",
        QueryStatus::Completed => "completed",
        QueryStatus::Failed => "failed",
    }
}

fn parse_query_status(raw: &str) -> QueryStatus {
    match raw {
        "pending" => QueryStatus::Pending,
        "running" => QueryStatus::Running,
        "failed" => QueryStatus::Failed,
        _ => QueryStatus::Completed,
    }
}

pub(crate) fn approval_status_str(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
    }
}

fn parse_approval_status(raw: &str) -> ApprovalStatus {
    match raw {
        "approved" => ApprovalStatus::Approved,
        "rejected" => ApprovalStatus::Rejected,
        _ => ApprovalStatus::Pending,
    }
}

pub(crate) fn review_decision_str(decision: ReviewDecision) -> &'static str {
    match decision {
        ReviewDecision::Approved => "approved",
        ReviewDecision::Rejected => "rejected",
    }
}

fn parse_review_decision(raw: &str) -> ReviewDecision {
    if raw == "rejected" {
        ReviewDecision::Rejected
    } else {
        ReviewDecision::Approved
    }
}

pub(crate) fn held_tx_status_str(status: HeldTransactionStatus) -> &'static str {
    match status {
        HeldTransactionStatus::Active => "active",
        HeldTransactionStatus::Committed => "committed",
        HeldTransactionStatus::RolledBack => "rolled_back",
        HeldTransactionStatus::Failed => "failed",
    }
}

fn parse_held_tx_status(raw: &str) -> HeldTransactionStatus {
    match raw {
        "committed" => HeldTransactionStatus::Committed,
        "rolled_back" => HeldTransactionStatus::RolledBack,
        "failed" => HeldTransactionStatus::Failed,
        _ => HeldTransactionStatus::Active,
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PrincipalRow {
    pub id: Uuid,
    pub login: String,
    pub credential_hash: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
}

impl From<PrincipalRow> for Principal {
    fn from(row: PrincipalRow) -> Self {
        Self {
            id: PrincipalId::from(row.id),
            login: row.login,
            credential_hash: row.credential_hash,
            display_name: row.display_name,
            role: parse_role(&row.role),
            active: row.active,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct GroupRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Self {
            id: GroupId::from(row.id),
            name: row.name,
            description: row.description,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MembershipRow {
    pub principal_id: Uuid,
    pub group_id: Uuid,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            principal: PrincipalId::from(row.principal_id),
            group: GroupId::from(row.group_id),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BackendRow {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub host: String,
    pub port: i32,
    pub database: String,
    pub user: String,
    pub encrypted_credential: String,
    pub active: bool,
    pub healthy: bool,
    pub last_schema_sync_at: Option<DateTime<Utc>>,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<BackendRow> for Backend {
    fn from(row: BackendRow) -> Self {
        Self {
            id: BackendId::from(row.id),
            name: row.name,
            kind: parse_backend_kind(&row.kind),
            host: row.host,
            port: row.port as u16,
            database: row.database,
            user: row.user,
            encrypted_credential: row.encrypted_credential,
            active: row.active,
            healthy: row.healthy,
            last_schema_sync_at: row.last_schema_sync_at,
            last_health_check_at: row.last_health_check_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct QueryRow {
    pub id: Uuid,
    pub backend_id: Uuid,
    pub principal_id: Uuid,
    pub text: String,
    pub kind: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub row_count: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub requires_approval: bool,
    pub created_at: DateTime<Utc>,
}

impl From<QueryRow> for QueryRecord {
    fn from(row: QueryRow) -> Self {
        Self {
            id: QueryId::from(row.id),
            backend: BackendId::from(row.backend_id),
            principal: PrincipalId::from(row.principal_id),
            text: row.text,
            kind: parse_kind(&row.kind),
            name: row.name,
            description: row.description,
            status: parse_query_status(&row.status),
            row_count: row.row_count.map(|v| v as u64),
            duration_ms: row.duration_ms.map(|v| v as u64),
            error: row.error,
            requires_approval: row.requires_approval,
            created_at: row.created_at,
            deleted_at: None,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ResultRow {
    pub query_id: Uuid,
    pub columns: serde_json::Value,
    pub column_types: serde_json::Value,
    pub rows: serde_json::Value,
    pub row_count: i64,
    pub stored_at: DateTime<Utc>,
    pub size_bytes: i64,
}

impl From<ResultRow> for ResultRecord {
    fn from(row: ResultRow) -> Self {
        let columns: Vec<String> = serde_json::from_value(row.columns).unwrap_or_default();
        let rows: Vec<Vec<CellValue>> = serde_json::from_value(row.rows).unwrap_or_default();
        Self {
            query_id: QueryId::from(row.query_id),
            columns,
            column_types: serde_json::from_value(row.column_types).unwrap_or_default(),
            rows,
            row_count: row.row_count as u64,
            stored_at: row.stored_at,
            size_bytes: row.size_bytes as u64,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoryRow {
    pub id: Uuid,
    pub query_id: Option<Uuid>,
    pub principal_id: Uuid,
    pub backend_id: Uuid,
    pub text: String,
    pub kind: String,
    pub status: String,
    pub row_count: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: HistoryId::from(row.id),
            query: row.query_id.map(QueryId::from),
            principal: PrincipalId::from(row.principal_id),
            backend: BackendId::from(row.backend_id),
            text: row.text,
            kind: parse_kind(&row.kind),
            status: parse_query_status(&row.status),
            row_count: row.row_count.map(|v| v as u64),
            duration_ms: row.duration_ms.map(|v| v as u64),
            error: row.error,
            executed_at: row.executed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ApprovalRow {
    pub id: Uuid,
    pub principal_requested: Uuid,
    pub backend_id: Uuid,
    pub text: String,
    pub kind: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ApprovalRow> for Approval {
    fn from(row: ApprovalRow) -> Self {
        Self {
            id: ApprovalId::from(row.id),
            principal_requested: PrincipalId::from(row.principal_requested),
            backend: BackendId::from(row.backend_id),
            text: row.text,
            kind: parse_kind(&row.kind),
            status: parse_approval_status(&row.status),
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReviewRow {
    pub id: Uuid,
    pub approval_id: Uuid,
    pub reviewer_id: Uuid,
    pub decision: String,
    pub comments: Option<String>,
    pub at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: ReviewId::from(row.id),
            approval: ApprovalId::from(row.approval_id),
            reviewer: PrincipalId::from(row.reviewer_id),
            decision: parse_review_decision(&row.decision),
            comments: row.comments,
            at: row.at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub id: Uuid,
    pub approval_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: CommentId::from(row.id),
            approval: ApprovalId::from(row.approval_id),
            author: PrincipalId::from(row.author_id),
            body: row.body,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct HeldTransactionRow {
    pub id: Uuid,
    pub approval_id: Uuid,
    pub backend_id: Uuid,
    pub text: String,
    pub starter_id: Uuid,
    pub status: String,
    pub preview_columns: serde_json::Value,
    pub preview_rows: serde_json::Value,
    pub affected_rows: Option<i64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<HeldTransactionRow> for HeldTransaction {
    fn from(row: HeldTransactionRow) -> Self {
        Self {
            id: HeldTransactionId::from(row.id),
            approval: ApprovalId::from(row.approval_id),
            backend: BackendId::from(row.backend_id),
            text: row.text,
            starter: PrincipalId::from(row.starter_id),
            status: parse_held_tx_status(&row.status),
            preview_columns: serde_json::from_value(row.preview_columns).unwrap_or_default(),
            preview_rows: serde_json::from_value(row.preview_rows).unwrap_or_default(),
            affected_rows: row.affected_rows.map(|v| v as u64),
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}
