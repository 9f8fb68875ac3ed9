//! Query executor (C7, §4.7): classify -> validate -> permit -> execute
//! -> persist for direct runs, plus the `explain`, `dry_run`, `paginate`,
//! and `export` siblings.

use std::sync::Arc;
use std::time::Instant;

use querybase_core::classifier::{classify, classify_kind, rewrite_delete_to_select, validate_syntax};
use querybase_core::entities::{Capability, QueryStatus, Role, Row as CoreRow, StatementKind};
use querybase_core::ids::{ApprovalId, BackendId, PrincipalId, QueryId};
use querybase_core::permissions::has_capability;
use querybase_core::results::{export_csv, export_json, paginate, Page, SortDirection};
use querybase_core::schema::SchemaCache;
use querybase_db::{DbSchemaInspector, PoolRegistry};
use querybase_error::{RuntimeError, SchemaError};
use querybase_events::EventBus;
use querybase_secrets::Vault;
use querybase_store::MetadataStore;

/// Maximum length of a persisted backend error message (§4.7 step 5).
const MAX_ERROR_LEN: usize = 4096;

fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

/// Outcome of [`QueryExecutor::execute`] (§4.7 step 3/4).
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    PendingApproval { approval_id: ApprovalId },
    Completed {
        query_id: QueryId,
        columns: Vec<String>,
        rows: Vec<CoreRow>,
        row_count: u64,
        duration_ms: u64,
    },
}

/// Outcome of [`QueryExecutor::explain`].
#[derive(Debug, Clone)]
pub struct ExplainOutcome {
    pub raw: String,
    pub lines: Vec<String>,
}

/// Outcome of [`QueryExecutor::dry_run`].
#[derive(Debug, Clone)]
pub struct DryRunOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<CoreRow>,
    pub row_count: u64,
}

/// `export(query_id, format)` target (§4.7 "Export").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

async fn require_capability(
    store: &MetadataStore,
    principal: PrincipalId,
    backend: BackendId,
    capability: Capability,
) -> Result<Role, RuntimeError> {
    let p = store.get_principal(principal).await?;
    if !p.active {
        return Err(RuntimeError::Unauthenticated);
    }
    let memberships = store.memberships_for(principal).await?;
    let grants = store.grants_for_backend(backend).await?;
    if has_capability(p.role, principal, backend, capability, &memberships, &grants) {
        Ok(p.role)
    } else {
        let label = match capability {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Approve => "approve",
        };
        Err(RuntimeError::forbidden(label))
    }
}

/// Orchestrates C3 (classifier), C4/C5 (schema), C6 (permissions), C2
/// (connections), and C8/C13 (approval + persistence) for the primary
/// read/write entry point.
pub struct QueryExecutor {
    store: MetadataStore,
    pools: Arc<PoolRegistry>,
    vault: Arc<Vault>,
    schema_cache: Arc<SchemaCache>,
    inspector: DbSchemaInspector,
    approvals: querybase_broker::ApprovalCoordinator,
}

impl QueryExecutor {
    #[must_use]
    pub fn new(
        store: MetadataStore,
        pools: Arc<PoolRegistry>,
        vault: Arc<Vault>,
        schema_cache: Arc<SchemaCache>,
        events: EventBus,
    ) -> Self {
        let inspector = DbSchemaInspector::new(pools.clone(), vault.clone());
        let approvals = querybase_broker::ApprovalCoordinator::new(store.clone(), events);
        Self {
            store,
            pools,
            vault,
            schema_cache,
            inspector,
            approvals,
        }
    }

    /// `execute(principal, backend_id, text, name?, description?)` (§4.7).
    ///
    /// # Errors
    ///
    /// Returns `not_found` if the backend is missing or inactive,
    /// `forbidden` if the principal lacks the required capability,
    /// `invalid_input` on a syntax violation, `schema_mismatch` if a
    /// referenced table doesn't exist after a forced refresh, or
    /// `backend_error` if the backend rejects the statement.
    pub async fn execute(
        &self,
        principal: PrincipalId,
        backend_id: BackendId,
        text: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ExecuteOutcome, RuntimeError> {
        let backend = self.store.get_backend(backend_id).await?;
        if !backend.active {
            return Err(RuntimeError::not_found(format!("backend {backend_id}")));
        }

        let classification = classify(text);
        let kind = classification.kind;

        if kind.requires_approval() {
            require_capability(&self.store, principal, backend_id, Capability::Write).await?;
            validate_syntax(text, kind)?;

            let mut snapshot = self.schema_cache.get_or_refresh(&backend, &self.inspector, false).await?;
            let missing = classification.tables.iter().find(|t| !snapshot.has_table(t));
            if let Some(table) = missing {
                snapshot = self.schema_cache.get_or_refresh(&backend, &self.inspector, true).await?;
                if !snapshot.has_table(table) {
                    return Err(SchemaError::UnknownTable {
                        backend_id: backend_id.to_string(),
                        table: table.clone(),
                    }
                    .into());
                }
            }

            let approval = self.store.create_approval(principal, backend_id, text, kind).await?;
            self.approvals.notify_created(approval.id);
            return Ok(ExecuteOutcome::PendingApproval { approval_id: approval.id });
        }

        require_capability(&self.store, principal, backend_id, Capability::Read).await?;
        validate_syntax(text, kind)?;

        let query = self
            .store
            .create_query(backend_id, principal, text, kind, name, description, false, QueryStatus::Running)
            .await?;

        let conn = self.pools.connection(&backend, &self.vault).await?;
        let started = Instant::now();
        match conn.execute_read(text).await {
            Ok(outcome) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.store
                    .complete_query(query.id, &outcome.columns, &outcome.column_types, &outcome.rows, duration_ms)
                    .await?;
                self.store
                    .append_history(
                        Some(query.id),
                        principal,
                        backend_id,
                        text,
                        kind,
                        QueryStatus::Completed,
                        Some(outcome.rows.len() as u64),
                        Some(duration_ms),
                        None,
                    )
                    .await?;
                Ok(ExecuteOutcome::Completed {
                    query_id: query.id,
                    columns: outcome.columns,
                    rows: outcome.rows,
                    row_count: outcome.rows.len() as u64,
                    duration_ms,
                })
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let message = truncate_error(&err.to_string());
                self.store.fail_query(query.id, &message, duration_ms).await?;
                self.store
                    .append_history(
                        Some(query.id),
                        principal,
                        backend_id,
                        text,
                        kind,
                        QueryStatus::Failed,
                        None,
                        Some(duration_ms),
                        Some(&message),
                    )
                    .await?;
                Err(err)
            }
        }
    }

    /// `explain(principal, backend_id, text, analyze?)` (§4.7 "EXPLAIN
    /// path").
    ///
    /// # Errors
    ///
    /// Returns `forbidden` without `read`, `invalid_input` if `analyze`
    /// is requested for a non-`select` statement, or `backend_error` if
    /// the backend rejects the `EXPLAIN`.
    pub async fn explain(
        &self,
        principal: PrincipalId,
        backend_id: BackendId,
        text: &str,
        analyze: bool,
    ) -> Result<ExplainOutcome, RuntimeError> {
        require_capability(&self.store, principal, backend_id, Capability::Read).await?;
        let kind = classify_kind(text);
        if analyze && !matches!(kind, StatementKind::Select) {
            return Err(RuntimeError::invalid_input(
                "EXPLAIN ANALYZE is only accepted for select statements",
            ));
        }

        let backend = self.store.get_backend(backend_id).await?;
        let conn = self.pools.connection(&backend, &self.vault).await?;
        let prefix = if analyze { "EXPLAIN ANALYZE " } else { "EXPLAIN " };
        let outcome = conn.execute_read(&format!("{prefix}{text}")).await?;

        let lines: Vec<String> = outcome
            .rows
            .iter()
            .filter_map(|row| row.first())
            .map(|cell| cell.as_sort_string())
            .collect();
        Ok(ExplainOutcome {
            raw: lines.join("\n"),
            lines,
        })
    }

    /// `dry_run(principal, backend_id, text)` (§4.7 "Dry-run path").
    ///
    /// # Errors
    ///
    /// Returns `forbidden` without `write`, `invalid_input` if `text` is
    /// not a `delete` statement, or `backend_error` on the preview query.
    pub async fn dry_run(&self, principal: PrincipalId, backend_id: BackendId, text: &str) -> Result<DryRunOutcome, RuntimeError> {
        require_capability(&self.store, principal, backend_id, Capability::Write).await?;
        let kind = classify_kind(text);
        if !matches!(kind, StatementKind::Delete) {
            return Err(RuntimeError::invalid_input("dry-run is only supported for delete statements"));
        }

        let preview_sql = rewrite_delete_to_select(text)?;
        let backend = self.store.get_backend(backend_id).await?;
        let conn = self.pools.connection(&backend, &self.vault).await?;
        let outcome = conn.execute_read(&preview_sql).await?;
        Ok(DryRunOutcome {
            row_count: outcome.rows.len() as u64,
            columns: outcome.columns,
            rows: outcome.rows,
        })
    }

    /// `paginate(query_id, page, per_page, sort_col?, sort_dir)` (§4.7
    /// "Result pagination and sort").
    ///
    /// # Errors
    ///
    /// Returns `not_found` if no result is stored, or `invalid_input` for
    /// an out-of-range page or unknown sort column.
    pub async fn paginate_results(
        &self,
        query_id: QueryId,
        page: u64,
        per_page: u64,
        sort_col: Option<&str>,
        sort_dir: SortDirection,
    ) -> Result<Page, RuntimeError> {
        let result = self.store.get_result(query_id).await?;
        paginate(&result.columns, &result.rows, page, per_page, sort_col, sort_dir)
    }

    /// `export(query_id, format)` (§4.7 "Export").
    ///
    /// # Errors
    ///
    /// Returns `not_found` if no result is stored for `query_id`.
    pub async fn export(&self, query_id: QueryId, format: ExportFormat) -> Result<String, RuntimeError> {
        let result = self.store.get_result(query_id).await?;
        Ok(match format {
            ExportFormat::Csv => export_csv(&result.columns, &result.rows),
            ExportFormat::Json => export_json(&result.columns, &result.rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_error_is_untouched() {
        assert_eq!(truncate_error("syntax error"), "syntax error");
    }

    #[test]
    fn long_error_is_truncated_to_limit() {
        let message = "x".repeat(MAX_ERROR_LEN + 100);
        let truncated = truncate_error(&message);
        assert_eq!(truncated.len(), MAX_ERROR_LEN);
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let message = format!("{}é", "a".repeat(MAX_ERROR_LEN - 1));
        let truncated = truncate_error(&message);
        assert!(truncated.len() <= MAX_ERROR_LEN);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }

    #[test]
    fn explain_analyze_rejects_non_select_kind() {
        assert!(matches!(classify_kind("UPDATE t SET a = 1"), StatementKind::Update));
    }
}
