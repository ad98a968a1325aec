//! Index store abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Raw answer to a request that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl StoreReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Best-effort `type: reason` from an Elasticsearch error body.
    #[must_use]
    pub fn error_reason(&self) -> String {
        let Ok(value) = serde_json::from_slice::<Value>(&self.body) else {
            return String::from_utf8_lossy(&self.body).trim().to_string();
        };
        match &value["error"] {
            Value::Object(error) => {
                let kind = error.get("type").and_then(Value::as_str).unwrap_or("unknown");
                let reason = error.get("reason").and_then(Value::as_str).unwrap_or("");
                format!("{kind}: {reason}")
            }
            Value::String(reason) => reason.clone(),
            _ => value.to_string(),
        }
    }

    /// Turn a non-success reply into [`StoreError::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the status is not 2xx.
    pub fn ensure_success(self) -> Result<Self, StoreError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(StoreError::Rejected {
                status: self.status,
                reason: self.error_reason(),
            })
        }
    }
}

/// Operations the indexing pipeline needs from the store.
///
/// `bulk` reports transport failures as `Err` and every answered request as
/// `Ok`, whatever its status; classifying the answer is the caller's job.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Send one line-delimited bulk payload.
    async fn bulk(&self, index: &str, payload: Vec<u8>) -> Result<StoreReply, StoreError>;

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError>;

    /// Partially update one document.
    async fn update_document(&self, index: &str, id: &str, doc: &Value)
        -> Result<(), StoreError>;

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: IndexStore + ?Sized> IndexStore for Arc<T> {
    async fn bulk(&self, index: &str, payload: Vec<u8>) -> Result<StoreReply, StoreError> {
        (**self).bulk(index, payload).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        (**self).index_exists(index).await
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError> {
        (**self).create_index(index, mapping).await
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        doc: &Value,
    ) -> Result<(), StoreError> {
        (**self).update_document(index, id, doc).await
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), StoreError> {
        (**self).delete_document(index, id).await
    }
}
