//! Approval coordinator (C8) and transaction broker (C9, §4.9 "the
//! hardest subsystem"): everything that sits between a reviewer's decision
//! and a committed backend mutation.

mod active;
mod coordinator;
mod sweeper;
mod transaction;

pub use coordinator::{ApprovalCoordinator, ApprovalDetail};
pub use sweeper::IdleSweeper;
pub use transaction::{StartOutcome, StatusSnapshot, TransactionBroker, DEFAULT_IDLE_CAP};
