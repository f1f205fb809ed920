//! Penumbra: a pull-based execution core for property-graph pattern queries.
//!
//! The crate turns a bound pattern (symbol table, pattern graph, expression
//! trees) into a tree of physical operators, rewrites that tree with a fixed
//! list of optimizer passes, and drives it record by record against a
//! [`storage::GraphTxn`].

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod query;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use config::ExecOptions;
pub use error::{ExecError, Result};
