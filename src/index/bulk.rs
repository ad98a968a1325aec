//! Batched bulk indexing with per-batch and per-document accounting.
//!
//! Records are cut into batches of a fixed size, in order. Each batch becomes
//! one `{action}\n{document}\n` payload and one request; requests are sent one
//! after the other. Failures are counted, not retried:
//! - transport error or non-2xx answer: every document in the batch errored
//! - 2xx answer: each item status outside 200..=201 is one errored document
//!
//! Only a record that cannot be serialized stops the run.

use std::fmt;
use std::time::{Duration, Instant};

use indicatif::HumanCount;
use serde::{Deserialize, Serialize};

use super::store::{IndexStore, StoreReply};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{IndexError, StoreError};
use crate::Result;

/// Action line preceding every document; the store assigns the id.
pub const ACTION_HEADER: &[u8] = b"{\"index\":{}}\n";

/// Counters for one bulk submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub submitted: u64,
    pub indexed: u64,
    pub errored: u64,
    pub batches: u64,
    pub elapsed: Duration,
}

impl IndexingStats {
    /// Every submitted document was either indexed or counted as an error.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.indexed + self.errored == self.submitted
    }

    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.errored > 0
    }

    /// Indexed documents per second; 0 when no time has elapsed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.indexed as f64 / secs
        } else {
            0.0
        }
    }

    /// Emit the end-of-run summary line.
    pub fn log_summary(&self) {
        let elapsed_ms = u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX);
        if self.has_errors() {
            tracing::error!(
                submitted = self.submitted,
                indexed = self.indexed,
                errored = self.errored,
                batches = self.batches,
                elapsed_ms,
                "{self}"
            );
        } else {
            tracing::info!(
                submitted = self.submitted,
                indexed = self.indexed,
                batches = self.batches,
                elapsed_ms,
                "{self}"
            );
        }
    }

    /// Turn a run with errors into [`IndexError::Incomplete`].
    ///
    /// # Errors
    ///
    /// Returns an error if any document failed to index.
    pub fn into_result(self) -> Result<Self> {
        if self.has_errors() {
            Err(IndexError::Incomplete {
                indexed: self.indexed,
                errored: self.errored,
            }
            .into())
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for IndexingStats {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed =
            Duration::from_millis(u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX));
        let rate = HumanCount(self.rate() as u64);
        if self.has_errors() {
            write!(
                f,
                "Indexed [{}] documents with [{}] errors in {elapsed:?} ({rate} docs/sec)",
                HumanCount(self.indexed),
                HumanCount(self.errored),
            )
        } else {
            write!(
                f,
                "Successfully indexed [{}] documents in {elapsed:?} ({rate} docs/sec)",
                HumanCount(self.indexed),
            )
        }
    }
}

/// Serialize records into one bulk payload.
///
/// `offset` is the position of the first record in the whole submission and
/// only feeds error messages.
///
/// # Errors
///
/// Returns [`IndexError::Serialize`] for the first record that cannot be
/// encoded.
pub fn encode_batch<T: Serialize>(
    records: &[T],
    offset: usize,
) -> std::result::Result<Vec<u8>, IndexError> {
    let mut payload = Vec::with_capacity(records.len() * 256);
    for (i, record) in records.iter().enumerate() {
        payload.extend_from_slice(ACTION_HEADER);
        serde_json::to_writer(&mut payload, record).map_err(|source| IndexError::Serialize {
            position: offset + i,
            source,
        })?;
        payload.push(b'\n');
    }
    Ok(payload)
}

/// Sends records to an [`IndexStore`] in fixed-size batches.
#[derive(Debug)]
pub struct BulkIndexer<S> {
    store: S,
    index: String,
    batch_size: usize,
}

impl<S: IndexStore> BulkIndexer<S> {
    /// Create an indexer writing to `index` with the default batch size.
    pub fn new(store: S, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of documents per request (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Index every record and report what happened to them.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Serialize`] if a record cannot be encoded.
    /// Batches already sent stay in the store.
    pub async fn submit<T: Serialize + Sync>(&self, records: &[T]) -> Result<IndexingStats> {
        let start = Instant::now();
        let mut stats = IndexingStats {
            submitted: records.len() as u64,
            ..IndexingStats::default()
        };

        for (batch, chunk) in records.chunks(self.batch_size).enumerate() {
            let payload = encode_batch(chunk, batch * self.batch_size)?;
            tracing::debug!(
                index = %self.index,
                batch,
                documents = chunk.len(),
                bytes = payload.len(),
                "Sending bulk request"
            );

            let reply = self.store.bulk(&self.index, payload).await;
            let outcome = classify(batch, chunk.len(), reply);
            stats.indexed += outcome.indexed;
            stats.errored += outcome.errored;
            stats.batches += 1;
        }

        stats.elapsed = start.elapsed();
        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BatchOutcome {
    indexed: u64,
    errored: u64,
}

impl BatchOutcome {
    const fn failed(documents: usize) -> Self {
        Self {
            indexed: 0,
            errored: documents as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(alias = "create")]
    index: ItemResult,
}

#[derive(Debug, Deserialize)]
struct ItemResult {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<ItemError>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    caused_by: Option<ErrorCause>,
}

#[derive(Debug, Deserialize)]
struct ErrorCause {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reason: String,
}

/// Decide how many documents of one batch were indexed.
fn classify(
    batch: usize,
    documents: usize,
    reply: std::result::Result<StoreReply, StoreError>,
) -> BatchOutcome {
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(batch, documents, error = %e, "Bulk request failed");
            return BatchOutcome::failed(documents);
        }
    };

    if !reply.is_success() {
        tracing::error!(
            batch,
            documents,
            status = reply.status,
            reason = %reply.error_reason(),
            "Bulk request rejected"
        );
        return BatchOutcome::failed(documents);
    }

    let response: BulkResponse = match serde_json::from_slice(&reply.body) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(batch, documents, error = %e, "Unreadable bulk response");
            return BatchOutcome::failed(documents);
        }
    };

    if response.items.len() != documents {
        tracing::warn!(
            batch,
            documents,
            items = response.items.len(),
            "Bulk response item count does not match the request"
        );
    }

    let mut outcome = BatchOutcome::default();
    let mut answered = 0;
    for item in response.items.into_iter().take(documents) {
        answered += 1;
        let result = item.index;
        if (200..=201).contains(&result.status) {
            outcome.indexed += 1;
            continue;
        }

        outcome.errored += 1;
        let error = result.error.unwrap_or_default();
        let (cause_type, cause_reason) = error
            .caused_by
            .map(|cause| (cause.kind, cause.reason))
            .unwrap_or_default();
        tracing::warn!(
            batch,
            status = result.status,
            id = result.id.as_deref().unwrap_or(""),
            error_type = %error.kind,
            reason = %error.reason,
            cause_type = %cause_type,
            cause_reason = %cause_reason,
            "Document failed to index"
        );
    }
    outcome.errored += (documents - answered) as u64;
    outcome
}
