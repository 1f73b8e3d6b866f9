//! # imgfleet-id
//!
//! Identifier and name types for the imgfleet workspace.
//!
//! ## Kinds of identifiers
//!
//! - **Names** are opaque, caller-supplied strings. The orchestrator never
//!   looks inside them; it only requires them to be non-empty so they can key
//!   the location index. [`ImageName`] and [`NodeAddress`] are names.
//! - **IDs** are system-generated and use a prefixed format: `{prefix}_{ulid}`.
//!   [`OperationId`] tags every facade call so its log records can be
//!   correlated across concurrently running node tasks.
//!
//! Examples:
//! - `registry.example.com/team/api` (an `ImageName`)
//! - `http://10.0.0.7:2375` (a `NodeAddress`)
//! - `op_01HV4Z2WQXKJNM8GPQY6VBKC3D` (an `OperationId`)

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-exported for `define_id!` expansions.
pub use ulid::Ulid;
