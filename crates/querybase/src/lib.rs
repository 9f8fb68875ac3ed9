//! QueryBase: a multi-tenant SQL gateway that turns direct reads into
//! immediate execution and classifies mutations into an approval
//! workflow with a preview-before-commit transaction broker.
//!
//! This crate is a thin umbrella over the component crates; depend on
//! it directly to pull in the whole system, or depend on the
//! component crates individually for a narrower dependency footprint.

#![warn(missing_docs)]

pub use querybase_broker as broker;
pub use querybase_core as core;
pub use querybase_db as db;
pub use querybase_error as error;
pub use querybase_events as events;
pub use querybase_queue as queue;
pub use querybase_secrets as secrets;
pub use querybase_server as server;
pub use querybase_store as store;
pub use querybase_webhooks as webhooks;

/// Library version, mirrored from the workspace package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
