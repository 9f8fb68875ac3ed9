//! The process-wide `active: approval_id -> held_tx_state` map (§4.9),
//! plus the secondary `transaction_id` index used to look entries up by
//! the handle a reviewer actually holds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use querybase_core::ids::{ApprovalId, BackendId, HeldTransactionId};
use querybase_db::HeldConnection;

/// One live entry: the pinned connection plus the bookkeeping the
/// sweeper and `status` need.
pub struct ActiveEntry {
    pub conn: HeldConnection,
    pub transaction_id: HeldTransactionId,
    pub backend_id: BackendId,
    pub last_activity_at: DateTime<Utc>,
}

/// Keyed by approval id (the map key the mutex protects, §4.9), with a
/// secondary index from transaction id since `commit`/`rollback`/`status`
/// are called with the transaction id a reviewer was handed by `start`.
#[derive(Default)]
pub struct ActiveTable {
    entries: HashMap<ApprovalId, ActiveEntry>,
    tx_index: HashMap<HeldTransactionId, ApprovalId>,
}

impl ActiveTable {
    pub fn contains_approval(&self, approval: ApprovalId) -> bool {
        self.entries.contains_key(&approval)
    }

    pub fn insert(&mut self, approval: ApprovalId, entry: ActiveEntry) {
        self.tx_index.insert(entry.transaction_id, approval);
        self.entries.insert(approval, entry);
    }

    pub fn get_by_transaction(&self, transaction_id: HeldTransactionId) -> Option<&ActiveEntry> {
        let approval = self.tx_index.get(&transaction_id)?;
        self.entries.get(approval)
    }

    /// Remove by transaction id, returning the approval id and the
    /// removed entry so the caller can finalize both records.
    pub fn remove_by_transaction(&mut self, transaction_id: HeldTransactionId) -> Option<(ApprovalId, ActiveEntry)> {
        let approval = self.tx_index.remove(&transaction_id)?;
        let entry = self.entries.remove(&approval)?;
        Some((approval, entry))
    }

    /// Every entry whose `last_activity_at` is older than `cutoff`
    /// (idle sweep, §4.9).
    pub fn stale_transaction_ids(&self, cutoff: DateTime<Utc>) -> Vec<HeldTransactionId> {
        self.entries
            .values()
            .filter(|e| e.last_activity_at < cutoff)
            .map(|e| e.transaction_id)
            .collect()
    }

    /// Every transaction id currently held, for shutdown drain.
    pub fn all_transaction_ids(&self) -> Vec<HeldTransactionId> {
        self.tx_index.keys().copied().collect()
    }

    pub fn is_stale(&self, transaction_id: HeldTransactionId, cutoff: DateTime<Utc>) -> Option<bool> {
        self.get_by_transaction(transaction_id).map(|e| e.last_activity_at < cutoff)
    }
}
