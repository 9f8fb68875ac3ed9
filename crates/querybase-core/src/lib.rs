//! Domain types and the pure-logic components of the gateway: the data
//! model (§3), the SQL classifier (C3), the schema cache (C5) built atop
//! the schema-inspector contract (C4), the permission evaluator (C6), and
//! result pagination/export (§4.7).
//!
//! Connection handling, persistence, and orchestration live in sibling
//! crates (`querybase-db`, `querybase-store`, `querybase-broker`) that
//! depend on the types defined here.

// The data model's fields are self-documenting from the field names and
// §3 of the shape they mirror; per-field doc comments would be noise.
#![allow(missing_docs)]

pub mod classifier;
pub mod entities;
pub mod ids;
pub mod permissions;
pub mod results;
pub mod schema;
