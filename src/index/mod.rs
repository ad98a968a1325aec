//! Bulk loading of usage documents into the index store.
//!
//! This module provides:
//! - The [`IndexStore`] seam over the store's HTTP API
//! - An Elasticsearch implementation on a pooled `reqwest` client
//! - An in-memory store backing the test suites
//! - The batching [`BulkIndexer`] with success/error accounting

mod bulk;
mod elasticsearch;
mod memory;
mod store;

pub use bulk::{encode_batch, BulkIndexer, IndexingStats, ACTION_HEADER};
pub use elasticsearch::{usage_mapping, ElasticsearchStore, PASSWORD_ENV};
pub use memory::{MemoryStore, ScriptedReply};
pub use store::{IndexStore, StoreReply};
