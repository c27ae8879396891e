//! Relational store implementations.
//!
//! - [`PostgresTarget`]: the production target
//! - [`MemoryTarget`]: rehearsal target for `--dry-run` and tests

pub mod memory;
pub mod postgres;
pub mod tls;

pub use memory::MemoryTarget;
pub use postgres::PostgresTarget;
