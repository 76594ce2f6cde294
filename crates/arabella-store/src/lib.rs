//! System-of-record seams.
//!
//! The pipeline only needs a handful of operations from durable storage:
//! job create/read/update, user lookup with an atomic credit ledger, and
//! template lookup. This crate defines those contracts and ships an
//! in-memory implementation used by the binary and by tests.

pub mod error;
pub mod memory;
pub mod repos;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use repos::{JobFilter, JobRepository, TemplateRepository, UserRepository};
