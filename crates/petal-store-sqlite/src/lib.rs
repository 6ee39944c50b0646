//! SQLite backend for the petal engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Embeddings are persisted here and
//! mirrored into an in-memory [`petal_core::index::FlatIndex`] that serves
//! nearest-neighbour queries.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{CategoryRecord, OrderRecord, SqliteStore};

#[cfg(test)]
mod tests;
