//! Transaction broker (C9, §4.9): preview-before-commit over a
//! process-wide map of active held transactions, one per approval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use querybase_core::classifier::rewrite_to_preview_select;
use querybase_core::entities::{
    ApprovalStatus, Capability, HeldTransaction, HeldTransactionStatus, QueryStatus, Row as CoreRow, StatementKind,
};
use querybase_core::ids::{ApprovalId, BackendId, HeldTransactionId, PrincipalId};
use querybase_core::permissions::has_capability;
use querybase_db::{HeldConnection, PoolRegistry};
use querybase_error::RuntimeError;
use querybase_events::{EventBus, EventPayload};
use querybase_secrets::Vault;
use querybase_store::MetadataStore;
use tokio::sync::Mutex;

use crate::active::{ActiveEntry, ActiveTable};

/// Default idle cap before the sweeper force-rolls-back a held
/// transaction (§4.9 "Bounded hold time").
pub const DEFAULT_IDLE_CAP: Duration = Duration::from_secs(10 * 60);

/// Outcome of a successful [`TransactionBroker::start`] (§4.9 step 6).
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub transaction_id: HeldTransactionId,
    pub columns: Vec<String>,
    pub preview_rows: Vec<CoreRow>,
    pub affected_rows: Option<u64>,
    pub status: HeldTransactionStatus,
}

/// Read-only snapshot returned by `status` (§4.9).
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub held: HeldTransaction,
    pub is_stale: bool,
}

async fn require_approve(
    store: &MetadataStore,
    reviewer: PrincipalId,
    backend: BackendId,
) -> Result<(), RuntimeError> {
    let principal = store.get_principal(reviewer).await?;
    let memberships = store.memberships_for(reviewer).await?;
    let grants = store.grants_for_backend(backend).await?;
    if has_capability(principal.role, reviewer, backend, Capability::Approve, &memberships, &grants) {
        Ok(())
    } else {
        Err(RuntimeError::forbidden("approve"))
    }
}

/// Owns the in-memory `active` map and every operation that touches it.
pub struct TransactionBroker {
    table: Mutex<ActiveTable>,
    store: MetadataStore,
    pools: Arc<PoolRegistry>,
    vault: Arc<Vault>,
    events: EventBus,
    idle_cap: Duration,
}

impl TransactionBroker {
    /// Build a broker with an empty active map. Call
    /// [`TransactionBroker::recover_on_startup`] before accepting traffic.
    #[must_use]
    pub fn new(store: MetadataStore, pools: Arc<PoolRegistry>, vault: Arc<Vault>, events: EventBus, idle_cap: Duration) -> Self {
        Self {
            table: Mutex::new(ActiveTable::default()),
            store,
            pools,
            vault,
            events,
            idle_cap,
        }
    }

    /// Crash recovery (§4.9 "Crash recovery"): call once at startup,
    /// before accepting any `start` calls.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn recover_on_startup(&self) -> Result<u64, RuntimeError> {
        self.store.fail_all_active_held_transactions_on_startup().await
    }

    /// `start(approval_id, reviewer)` (§4.9).
    ///
    /// The mutex guarding the map is held for the whole procedure, per the
    /// spec's literal "acquire the mutex ... release the mutex" bracketing
    /// of steps 1-5: this serializes concurrent `start` calls against each
    /// other (not just against the same approval), trading throughput for
    /// the simplest possible correctness argument for the at-most-one
    /// invariant.
    ///
    /// # Errors
    ///
    /// Returns `conflict` if a held transaction is already active for this
    /// approval, `invalid_state` if the approval is not `pending`,
    /// `forbidden` if the reviewer lacks `approve`, or `backend_error` if
    /// opening the connection or running the statement fails.
    pub async fn start(&self, approval_id: ApprovalId, reviewer: PrincipalId) -> Result<StartOutcome, RuntimeError> {
        let mut table = self.table.lock().await;

        if table.contains_approval(approval_id) {
            return Err(RuntimeError::conflict("already_active"));
        }

        let approval = self.store.get_approval(approval_id).await?;
        if approval.status != ApprovalStatus::Pending {
            return Err(RuntimeError::invalid_state("approval is not pending"));
        }
        require_approve(&self.store, reviewer, approval.backend).await?;

        let backend = self.store.get_backend(approval.backend).await?;
        let conn = self.pools.connection(&backend, &self.vault).await?;
        let mut held = conn.begin().await?;

        let result = run_approval_statement(&mut held, &approval.text, approval.kind).await;
        let (columns, preview_rows, affected_rows) = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = held.rollback().await;
                self.store
                    .create_failed_held_transaction(approval_id, approval.backend, &approval.text, reviewer, &err.to_string())
                    .await?;
                return Err(err);
            }
        };

        let held_record = self
            .store
            .create_held_transaction(approval_id, approval.backend, &approval.text, reviewer, &columns, &preview_rows, affected_rows)
            .await?;

        table.insert(
            approval_id,
            ActiveEntry {
                conn: held,
                transaction_id: held_record.id,
                backend_id: approval.backend,
                last_activity_at: Utc::now(),
            },
        );

        Ok(StartOutcome {
            transaction_id: held_record.id,
            columns,
            preview_rows,
            affected_rows,
            status: HeldTransactionStatus::Active,
        })
    }

    /// `commit(transaction_id, reviewer)` (§4.9).
    ///
    /// # Errors
    ///
    /// Returns `not_found` if no active entry matches, `forbidden` if the
    /// reviewer lacks `approve`, or `backend_error` if the backend rejects
    /// the commit (the approval is left `pending` so the reviewer may
    /// retry with a fresh `start`).
    pub async fn commit(&self, transaction_id: HeldTransactionId, reviewer: PrincipalId) -> Result<(), RuntimeError> {
        let mut table = self.table.lock().await;

        let entry = table
            .get_by_transaction(transaction_id)
            .ok_or_else(|| RuntimeError::not_found(format!("held transaction {transaction_id}")))?;
        require_approve(&self.store, reviewer, entry.backend_id).await?;

        let (approval_id, entry) = table
            .remove_by_transaction(transaction_id)
            .ok_or_else(|| RuntimeError::not_found(format!("held transaction {transaction_id}")))?;

        match entry.conn.commit().await {
            Ok(()) => {
                self.finalize_commit(approval_id, transaction_id, entry.backend_id, reviewer).await?;
                Ok(())
            }
            Err(err) => {
                self.store
                    .finalize_held_transaction(transaction_id, HeldTransactionStatus::Failed, Some(&err.to_string()))
                    .await?;
                Err(err)
            }
        }
    }

    async fn finalize_commit(
        &self,
        approval_id: ApprovalId,
        transaction_id: HeldTransactionId,
        backend_id: BackendId,
        reviewer: PrincipalId,
    ) -> Result<(), RuntimeError> {
        let held = self.store.get_held_transaction(transaction_id).await?;
        let approval = self.store.get_approval(approval_id).await?;

        self.store
            .finalize_held_transaction(transaction_id, HeldTransactionStatus::Committed, None)
            .await?;

        let query = self
            .store
            .create_query(
                backend_id,
                approval.principal_requested,
                &approval.text,
                approval.kind,
                None,
                None,
                true,
                QueryStatus::Completed,
            )
            .await?;
        self.store
            .complete_query(query.id, &held.preview_columns, &[], &held.preview_rows, 0)
            .await?;
        self.store
            .append_history(
                Some(query.id),
                reviewer,
                backend_id,
                &approval.text,
                approval.kind,
                QueryStatus::Completed,
                held.affected_rows,
                None,
                None,
            )
            .await?;

        self.events.publish(EventPayload::ApprovalStatusChanged {
            approval_id,
            new_status: "approved".to_string(),
        });
        Ok(())
    }

    /// `rollback(transaction_id, reviewer)` (§4.9): symmetric to `commit`,
    /// leaves the approval `pending` so a fresh `start` may be attempted.
    ///
    /// # Errors
    ///
    /// Returns `not_found` if no active entry matches, `forbidden` if the
    /// reviewer lacks `approve`, or `backend_error` if the rollback fails.
    pub async fn rollback(&self, transaction_id: HeldTransactionId, reviewer: PrincipalId) -> Result<(), RuntimeError> {
        let mut table = self.table.lock().await;

        let entry = table
            .get_by_transaction(transaction_id)
            .ok_or_else(|| RuntimeError::not_found(format!("held transaction {transaction_id}")))?;
        require_approve(&self.store, reviewer, entry.backend_id).await?;

        let (_, entry) = table
            .remove_by_transaction(transaction_id)
            .ok_or_else(|| RuntimeError::not_found(format!("held transaction {transaction_id}")))?;

        entry.conn.rollback().await?;
        self.store
            .finalize_held_transaction(transaction_id, HeldTransactionStatus::RolledBack, None)
            .await?;
        Ok(())
    }

    /// `status(transaction_id)` (§4.9): read-only, never touches the map
    /// beyond a staleness check.
    ///
    /// # Errors
    ///
    /// Returns `not_found` if no such held transaction was ever persisted.
    pub async fn status(&self, transaction_id: HeldTransactionId) -> Result<StatusSnapshot, RuntimeError> {
        let held = self.store.get_held_transaction(transaction_id).await?;
        let table = self.table.lock().await;
        let cutoff = Utc::now() - chrono::Duration::from_std(self.idle_cap).unwrap_or_default();
        let is_stale = table.is_stale(transaction_id, cutoff).unwrap_or(false);
        Ok(StatusSnapshot { held, is_stale })
    }

    /// Force-rollback every entry idle longer than the configured cap
    /// (§4.9 "Bounded hold time"). Returns the count swept.
    pub async fn sweep_idle(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.idle_cap).unwrap_or_default();
        let stale_ids = {
            let table = self.table.lock().await;
            table.stale_transaction_ids(cutoff)
        };

        let mut swept = 0;
        for transaction_id in stale_ids {
            let entry = {
                let mut table = self.table.lock().await;
                table.remove_by_transaction(transaction_id)
            };
            let Some((_, entry)) = entry else { continue };

            if let Err(err) = entry.conn.rollback().await {
                tracing::error!(error = %err, %transaction_id, "idle sweep rollback failed");
            }
            if let Err(err) = self
                .store
                .finalize_held_transaction(transaction_id, HeldTransactionStatus::RolledBack, Some("idle_timeout"))
                .await
            {
                tracing::error!(error = %err, %transaction_id, "failed to persist idle sweep");
            }
            swept += 1;
        }
        swept
    }

    /// Shutdown drain (§4.9): attempt to roll back every active entry,
    /// bounded by `deadline`. Entries that don't finish in time are
    /// abandoned; their pooled connections are released by `Drop` on the
    /// held transaction's `sqlx::Transaction` regardless.
    pub async fn shutdown_drain(&self, deadline: Duration) -> usize {
        let ids = {
            let table = self.table.lock().await;
            table.all_transaction_ids()
        };

        let drain = async {
            let mut drained = 0;
            for transaction_id in ids {
                let entry = {
                    let mut table = self.table.lock().await;
                    table.remove_by_transaction(transaction_id)
                };
                let Some((_, entry)) = entry else { continue };
                let _ = entry.conn.rollback().await;
                let _ = self
                    .store
                    .finalize_held_transaction(transaction_id, HeldTransactionStatus::RolledBack, Some("shutdown_drain"))
                    .await;
                drained += 1;
            }
            drained
        };

        tokio::time::timeout(deadline, drain).await.unwrap_or(0)
    }
}

type PreviewOutcome = (Vec<String>, Vec<CoreRow>, Option<u64>);

async fn run_approval_statement(
    held: &mut HeldConnection,
    text: &str,
    kind: StatementKind,
) -> Result<PreviewOutcome, RuntimeError> {
    let (columns, preview_rows) = if matches!(kind, StatementKind::Delete | StatementKind::Update) {
        let preview_sql = rewrite_to_preview_select(text, kind)?;
        let preview = held.execute_read(&preview_sql).await?;
        (preview.columns, preview.rows)
    } else {
        (Vec::new(), Vec::new())
    };

    let affected = held.execute_write(text).await?;
    Ok((columns, preview_rows, Some(affected)))
}
