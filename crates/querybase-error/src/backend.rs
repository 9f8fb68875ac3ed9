use crate::ErrorKind;

/// Errors raised by the backend connection factory and live connections
/// (§4.2). The raw backend message is preserved verbatim for audit/history
/// persistence (§4.12) even though callers only see a sanitized summary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend {backend_id} not found or inactive")]
    NotFound { backend_id: String },

    #[error("failed to decrypt credential for backend {backend_id}")]
    CredentialDecryptionFailed { backend_id: String },

    #[error("failed to connect to backend {backend_id}: {message}")]
    ConnectionFailed { backend_id: String, message: String },

    #[error("statement execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("statement timed out after {timeout_secs}s")]
    StatementTimeout { timeout_secs: u64 },

    #[error("unsupported backend kind: {kind}")]
    UnsupportedKind { kind: String },
}

impl BackendError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "backend_not_found",
            Self::CredentialDecryptionFailed { .. } => "backend_credential_error",
            Self::ConnectionFailed { .. } => "backend_connection_failed",
            Self::ExecutionFailed { .. } => "backend_execution_failed",
            Self::StatementTimeout { .. } => "backend_statement_timeout",
            Self::UnsupportedKind { .. } => "backend_unsupported_kind",
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::BackendError,
        }
    }

    /// Truncate a raw backend message to the 4 KiB cap mandated for
    /// persisted history/audit entries (§4.7 step 5).
    pub fn truncated_message(message: &str) -> String {
        const CAP: usize = 4096;
        if message.len() <= CAP {
            return message.to_string();
        }
        let mut end = CAP;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &message[..end])
    }
}
