use crate::ErrorKind;

/// Errors from the metadata store (§4.13): the canonical persistent store
/// for principals, groups, grants, approvals, results, and history.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("unique constraint violated: {message}")]
    UniqueViolation { message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {message}")]
    Migration { message: String },
}

impl StoreError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "store_not_found",
            Self::UniqueViolation { .. } => "store_unique_violation",
            Self::Database(_) => "store_database_error",
            Self::Migration { .. } => "store_migration_error",
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UniqueViolation { .. } => ErrorKind::Conflict,
            Self::Database(_) | Self::Migration { .. } => ErrorKind::Internal,
        }
    }
}
