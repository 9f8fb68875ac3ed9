//! Schema inspector (C4, §4.4): issues information-schema queries against
//! a backend's live connection and assembles a [`SchemaSnapshot`].
//! PostgreSQL and MySQL both expose `information_schema`, so the same
//! query text serves either backend kind; foreign-key detection for
//! MySQL is best-effort per §4.4 and may come back empty on older
//! MySQL/MariaDB builds that don't populate `key_column_usage` fully.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use querybase_core::entities::Backend;
use querybase_core::schema::{Column, SchemaInspector, SchemaSnapshot, TableSchema};
use querybase_error::{RuntimeError, SchemaError};
use querybase_secrets::Vault;

use crate::factory::PoolRegistry;

const EXCLUDED_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "performance_schema",
    "mysql",
    "sys",
];

const COLUMNS_QUERY: &str = "SELECT table_schema, table_name, column_name, data_type, \
    is_nullable, column_default, ordinal_position FROM information_schema.columns \
    ORDER BY table_schema, table_name, ordinal_position";

const KEYS_QUERY: &str = "SELECT tc.table_schema, tc.table_name, kcu.column_name, tc.constraint_type \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
      ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
     AND tc.table_name = kcu.table_name \
    WHERE tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY')";

/// Introspects live PostgreSQL/MySQL backends via `information_schema`.
pub struct DbSchemaInspector {
    registry: Arc<PoolRegistry>,
    vault: Arc<Vault>,
}

impl DbSchemaInspector {
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>, vault: Arc<Vault>) -> Self {
        Self { registry, vault }
    }
}

#[async_trait]
impl SchemaInspector for DbSchemaInspector {
    async fn introspect(&self, backend: &Backend) -> Result<SchemaSnapshot, RuntimeError> {
        let conn = self.registry.connection(backend, &self.vault).await?;

        let columns_outcome = conn.execute_read(COLUMNS_QUERY).await.map_err(|_| {
            RuntimeError::from(SchemaError::IntrospectionFailed {
                backend_id: backend.id.to_string(),
                message: "failed to read information_schema.columns".to_string(),
            })
        })?;

        let mut keys: HashSet<(String, String, String, String)> = HashSet::new();
        if let Ok(keys_outcome) = conn.execute_read(KEYS_QUERY).await {
            for row in &keys_outcome.rows {
                if let [schema, table, column, kind] = row.as_slice() {
                    keys.insert((
                        schema.as_sort_string(),
                        table.as_sort_string(),
                        column.as_sort_string(),
                        kind.as_sort_string(),
                    ));
                }
            }
        }

        let mut tables: HashMap<(String, String), Vec<Column>> = HashMap::new();
        let mut order: Vec<(String, String)> = Vec::new();

        for row in &columns_outcome.rows {
            let [schema, table, column, data_type, nullable, default, _ordinal_position] = row.as_slice() else {
                continue;
            };
            let schema = schema.as_sort_string();
            if EXCLUDED_SCHEMAS.contains(&schema.as_str()) {
                continue;
            }
            let table = table.as_sort_string();
            let key = (schema.clone(), table.clone());
            if !tables.contains_key(&key) {
                order.push(key.clone());
            }
            let column_name = column.as_sort_string();
            let is_pk = keys.contains(&(schema.clone(), table.clone(), column_name.clone(), "PRIMARY KEY".to_string()));
            let is_fk = keys.contains(&(schema.clone(), table.clone(), column_name.clone(), "FOREIGN KEY".to_string()));

            tables.entry(key).or_default().push(Column {
                name: column_name,
                type_name: data_type.as_sort_string(),
                nullable: nullable.as_sort_string().eq_ignore_ascii_case("YES"),
                default: match default {
                    querybase_core::entities::CellValue::Null => None,
                    other => Some(other.as_sort_string()),
                },
                primary_key: is_pk,
                foreign_key: is_fk,
            });
        }

        let tables = order
            .into_iter()
            .map(|(schema, name)| TableSchema {
                columns: tables.remove(&(schema.clone(), name.clone())).unwrap_or_default(),
                schema,
                name,
                indexes: None,
            })
            .collect();

        Ok(SchemaSnapshot {
            backend_kind: backend.kind,
            database: backend.database.clone(),
            tables,
            synced_at: Utc::now(),
        })
    }
}
