//! Hierarchy store backends.
//!
//! [`MemoryStore`] is always available and is what the tests use. The
//! SQL backends are feature-gated so the base crate stays light.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
