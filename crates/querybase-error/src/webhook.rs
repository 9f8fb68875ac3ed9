/// Errors from outbound notification delivery (§4.11, §9 "notification
/// delivery is pluggable"). The core only needs to know whether delivery
/// succeeded, failed transiently, or is permanently misconfigured.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("notification transport not configured: {transport}")]
    NotConfigured { transport: String },

    #[error("delivery failed: {message}")]
    DeliveryFailed { message: String },

    #[error("delivery timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl WebhookError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "notification_not_configured",
            Self::DeliveryFailed { .. } => "notification_delivery_failed",
            Self::Timeout { .. } => "notification_timeout",
            Self::RetriesExhausted { .. } => "notification_retries_exhausted",
        }
    }
}
