//! Outbound notification delivery (§9 "notification delivery is
//! pluggable"). The core only emits abstract events on the event bus;
//! this crate subscribes to them, persists a notification record, and
//! hands the payload to a transport that performs its own retries. The
//! core never blocks on transport latency -- the dispatcher runs as a
//! detached background task.

mod dispatcher;
mod signature;
mod transport;

pub use dispatcher::NotificationDispatcher;
pub use signature::sign_payload;
pub use transport::{NotificationTransport, WebhookTransport};

use querybase_error::WebhookError;

/// Convenience alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, WebhookError>;
