//! Unified error types for the QueryBase runtime crates.
//!
//! All runtime crates depend on this crate for error handling. The HTTP
//! transport (out of scope for this crate) maps [`ErrorKind`] onto status
//! codes; this crate only owns the taxonomy and the domain-specific detail.

// Error variants are self-documenting via their #[error(...)] messages.
#![allow(missing_docs)]

mod backend;
mod config;
mod schema;
mod store;
mod webhook;

pub use backend::BackendError;
pub use config::ConfigError;
pub use schema::SchemaError;
pub use store::StoreError;
pub use webhook::WebhookError;

/// The error taxonomy from the operation surface (see the operation error
/// table): each kind has a fixed meaning and propagation rule independent of
/// which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidInput,
    InvalidState,
    SchemaMismatch,
    BackendError,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Stable string form used in structured logs and client payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::InvalidState => "invalid_state",
            Self::SchemaMismatch => "schema_mismatch",
            Self::BackendError => "backend_error",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

/// Unified error type wrapping all domain errors produced by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("authentication required")]
    Unauthenticated,

    #[error("not permitted: requires {capability} on backend")]
    Forbidden { capability: String },

    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("invalid state transition: {message}")]
    InvalidState { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RuntimeError {
    /// Classify this error into the operation-surface taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Internal { .. } => ErrorKind::Internal,
            Self::Backend(_) => ErrorKind::BackendError,
            Self::Schema(_) => ErrorKind::SchemaMismatch,
            Self::Store(e) => e.kind(),
            Self::Webhook(_) => ErrorKind::Internal,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Conflict { .. } => ErrorKind::Conflict,
        }
    }

    /// Stable error code string, mirrored into audit log entries and events.
    pub const fn error_code(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn forbidden(capability: impl Into<String>) -> Self {
        Self::Forbidden {
            capability: capability.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, RuntimeError>;
