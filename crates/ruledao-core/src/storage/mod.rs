//! Storage layer for ruledao.
//!
//! This module provides a sled-based document store (one tree per entity
//! type) and the [`StoreSession`] that answers queries against it.

mod config;
mod engine;
mod filter;
mod record;
mod session;

pub mod key;

pub use config::StorageConfig;
pub use engine::StorageEngine;
pub use filter::FilterEvaluator;
pub use key::RecordKey;
pub use record::Record;
pub use session::StoreSession;
