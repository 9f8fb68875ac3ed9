//! Backend connection factory (C2) and schema inspector (C4): the only
//! crate that speaks to live PostgreSQL/MySQL backends.

mod factory;
mod handle;
mod inspector;
mod row;

pub use factory::PoolRegistry;
pub use handle::{BackendConnection, ExecuteOutcome, HeldConnection, DEFAULT_STATEMENT_TIMEOUT};
pub use inspector::DbSchemaInspector;
