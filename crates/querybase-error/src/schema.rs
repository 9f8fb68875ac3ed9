/// Errors from schema inspection, caching, and schema-aware validation
/// (§4.4, §4.5, §4.7 step 3).
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("table {table} referenced by statement not found on backend {backend_id} after forced refresh")]
    UnknownTable { backend_id: String, table: String },

    #[error("failed to introspect backend {backend_id}: {message}")]
    IntrospectionFailed { backend_id: String, message: String },

    #[error("schema refresh for backend {backend_id} timed out")]
    RefreshTimeout { backend_id: String },
}

impl SchemaError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownTable { .. } => "schema_mismatch",
            Self::IntrospectionFailed { .. } => "schema_introspection_failed",
            Self::RefreshTimeout { .. } => "schema_refresh_timeout",
        }
    }
}
