//! Hostgate Shared Types and Storage
//!
//! This crate contains the tenant/domain data model, host normalization rules
//! and the Domain Directory shared by the API server and the worker.

pub mod db;
pub mod directory;
pub mod error;
pub mod host;
pub mod types;

pub use db::*;
pub use directory::{DomainDirectory, MemoryDirectory, PgDirectory};
pub use error::*;
pub use host::*;
pub use types::*;
