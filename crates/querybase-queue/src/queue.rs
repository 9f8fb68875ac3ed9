//! The three named queues and per-task enqueue options (§4.10).

use std::time::Duration;

/// `default` (user-triggered), `maintenance` (periodic), `notifications`
/// (high fan-out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Default,
    Maintenance,
    Notifications,
}

impl Queue {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Maintenance => "maintenance",
            Self::Notifications => "notifications",
        }
    }
}

/// `enqueue(kind, payload, opts{queue, max_retries, timeout, priority})`
/// (§4.10). Higher `priority` is claimed first within a queue.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    pub queue: Queue,
    pub max_retries: u32,
    pub timeout: Duration,
    pub priority: i32,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            queue: Queue::Default,
            max_retries: 5,
            timeout: Duration::from_secs(30),
            priority: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_match_spec() {
        assert_eq!(Queue::Default.as_str(), "default");
        assert_eq!(Queue::Maintenance.as_str(), "maintenance");
        assert_eq!(Queue::Notifications.as_str(), "notifications");
    }

    #[test]
    fn default_options_are_reasonable() {
        let opts = EnqueueOptions::default();
        assert_eq!(opts.queue, Queue::Default);
        assert_eq!(opts.max_retries, 5);
        assert_eq!(opts.timeout, Duration::from_secs(30));
    }
}
