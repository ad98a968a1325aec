//! In-memory index store.
//!
//! Behaves like a single-node cluster that auto-creates indices on bulk
//! writes. Replies to bulk requests can be scripted to simulate transport
//! failures, request-level rejections and per-document errors.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::store::{IndexStore, StoreReply};
use crate::error::StoreError;

/// Scripted outcome for the next bulk request.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Store every document.
    Accept,
    /// Fail before reaching the store.
    Transport(String),
    /// Answer with this status and body; nothing is stored.
    Raw { status: u16, body: String },
    /// Reject the documents at these positions within the batch with a
    /// mapping error; store the rest.
    RejectDocuments(Vec<usize>),
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, Vec<(String, Value)>>,
    requests: Vec<Vec<u8>>,
    script: VecDeque<ScriptedReply>,
    next_id: u64,
}

/// [`IndexStore`] that keeps documents in memory.
///
/// Clones share state, so a test can keep a handle while the indexer owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next unscripted bulk request.
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.state.lock().script.push_back(reply);
    }

    /// Raw payloads of every bulk request, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.lock().requests.clone()
    }

    /// Number of documents in each bulk request, in order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state
            .lock()
            .requests
            .iter()
            .map(|payload| payload.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count() / 2)
            .collect()
    }

    /// Stored documents with their ids, in insertion order.
    #[must_use]
    pub fn documents(&self, index: &str) -> Vec<(String, Value)> {
        self.state
            .lock()
            .indices
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    fn parse_documents(payload: &[u8]) -> Result<Vec<Value>, String> {
        let lines: Vec<&[u8]> = payload
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() % 2 != 0 {
            return Err("action header without document".to_string());
        }
        lines
            .chunks(2)
            .map(|pair| serde_json::from_slice(pair[1]).map_err(|e| e.to_string()))
            .collect()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn bulk(&self, index: &str, payload: Vec<u8>) -> Result<StoreReply, StoreError> {
        let mut state = self.state.lock();
        state.requests.push(payload.clone());

        let rejected = match state.script.pop_front().unwrap_or(ScriptedReply::Accept) {
            ScriptedReply::Accept => Vec::new(),
            ScriptedReply::Transport(reason) => {
                return Err(StoreError::transport(format!("memory://{index}/_bulk"), reason));
            }
            ScriptedReply::Raw { status, body } => return Ok(StoreReply::new(status, body)),
            ScriptedReply::RejectDocuments(positions) => positions,
        };

        let documents = match Self::parse_documents(&payload) {
            Ok(documents) => documents,
            Err(reason) => {
                let body = json!({
                    "error": { "type": "parse_exception", "reason": reason },
                    "status": 400
                });
                return Ok(StoreReply::new(400, body.to_string()));
            }
        };

        let mut items = Vec::with_capacity(documents.len());
        for (position, document) in documents.into_iter().enumerate() {
            state.next_id += 1;
            let id = state.next_id.to_string();
            if rejected.contains(&position) {
                items.push(json!({ "index": {
                    "_id": id,
                    "status": 400,
                    "error": {
                        "type": "mapper_parsing_exception",
                        "reason": "failed to parse field [disk_size]",
                        "caused_by": { "type": "number_format_exception", "reason": "For input string" }
                    }
                }}));
            } else {
                state
                    .indices
                    .entry(index.to_string())
                    .or_default()
                    .push((id.clone(), document));
                items.push(json!({ "index": { "_id": id, "result": "created", "status": 201 } }));
            }
        }

        let body = json!({ "took": 1, "errors": !rejected.is_empty(), "items": items });
        Ok(StoreReply::new(200, body.to_string()))
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, _mapping: &Value) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.indices.contains_key(index) {
            return Err(StoreError::Rejected {
                status: 400,
                reason: format!("resource_already_exists_exception: index [{index}] already exists"),
            });
        }
        state.indices.insert(index.to_string(), Vec::new());
        Ok(())
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        doc: &Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let stored = state
            .indices
            .get_mut(index)
            .and_then(|docs| docs.iter_mut().find(|(doc_id, _)| doc_id == id))
            .ok_or_else(|| not_found(index, id))?;

        match (&mut stored.1, doc) {
            (Value::Object(target), Value::Object(fields)) => {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(StoreError::Rejected {
                status: 400,
                reason: "action_request_validation_exception: doc must be an object".to_string(),
            }),
        }
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let docs = state
            .indices
            .get_mut(index)
            .ok_or_else(|| not_found(index, id))?;
        let position = docs
            .iter()
            .position(|(doc_id, _)| doc_id == id)
            .ok_or_else(|| not_found(index, id))?;
        docs.remove(position);
        Ok(())
    }
}

fn not_found(index: &str, id: &str) -> StoreError {
    StoreError::Rejected {
        status: 404,
        reason: format!("document_missing_exception: [{id}] in index [{index}]"),
    }
}
