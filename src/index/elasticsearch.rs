//! Elasticsearch client over `reqwest`.
//!
//! One client, and so one connection pool, is shared by every request of a
//! run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde_json::{json, Value};

use super::store::{IndexStore, StoreReply};
use crate::config::ElasticsearchConfig;
use crate::error::StoreError;

/// Environment variable holding the basic auth password.
pub const PASSWORD_ENV: &str = "ES_PASSWORD";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_IDLE_PER_HOST: usize = 10;
const NDJSON: &str = "application/x-ndjson";

/// [`IndexStore`] backed by an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchStore {
    /// Build a store from configuration.
    ///
    /// Basic auth is used when `id` is set; the password comes from
    /// [`PASSWORD_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Setup`] if the URL is invalid or the client
    /// cannot be built.
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|e| StoreError::Setup(format!("invalid url '{}': {e}", config.base_url())))?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout())
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()
            .map_err(|e| StoreError::Setup(e.to_string()))?;

        let username = (!config.id.is_empty()).then(|| config.id.clone());
        let password = std::env::var(PASSWORD_ENV).ok();
        if username.is_some() && password.is_none() {
            tracing::warn!("{PASSWORD_ENV} is not set, authenticating without a password");
        }

        tracing::debug!(url = %base_url, "Elasticsearch client created");

        Ok(Self {
            client,
            base_url,
            username,
            password,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<StoreReply, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::transport(url.as_str(), e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| StoreError::transport(url.as_str(), e))?;
        Ok(StoreReply::new(status, body.to_vec()))
    }
}

#[async_trait]
impl IndexStore for ElasticsearchStore {
    async fn bulk(&self, index: &str, payload: Vec<u8>) -> Result<StoreReply, StoreError> {
        let url = self.url(&[index, "_bulk"]);
        let request = self
            .request(Method::POST, url.clone())
            .header(CONTENT_TYPE, NDJSON)
            .body(payload);
        self.send(request, &url).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let url = self.url(&[index]);
        let reply = self.send(self.request(Method::HEAD, url.clone()), &url).await?;
        if reply.status == 404 {
            return Ok(false);
        }
        reply.ensure_success().map(|_| true)
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError> {
        let url = self.url(&[index]);
        let request = self
            .request(Method::PUT, url.clone())
            .query(&[("timeout", "30s")])
            .json(mapping);
        self.send(request, &url).await?.ensure_success()?;
        tracing::info!(index, "Created index");
        Ok(())
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        doc: &Value,
    ) -> Result<(), StoreError> {
        let url = self.url(&[index, "_update", id]);
        let request = self
            .request(Method::POST, url.clone())
            .json(&json!({ "doc": doc }));
        self.send(request, &url).await?.ensure_success()?;
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), StoreError> {
        let url = self.url(&[index, "_doc", id]);
        self.send(self.request(Method::DELETE, url.clone()), &url)
            .await?
            .ensure_success()?;
        Ok(())
    }
}

/// Index mapping for usage documents.
#[must_use]
pub fn usage_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "timestamp": { "type": "date" },
                "cluster": { "type": "keyword" },
                "volume_type": { "type": "keyword" },
                "full_path": { "type": "keyword" },
                "disk_size": { "type": "long" },
                "volume_name": { "type": "keyword" },
                "project_name": { "type": "keyword" },
                "user_name": { "type": "keyword" }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ElasticsearchConfig {
        serde_yaml::from_str(
            "host: es.local\nport: 9200\nindexName: nfs-usage\ntimeoutSecs: 5\n",
        )
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let store = ElasticsearchStore::new(&config()).unwrap();
        assert_eq!(
            store.url(&["nfs-usage", "_bulk"]).as_str(),
            "http://es.local:9200/nfs-usage/_bulk"
        );
        assert_eq!(
            store.url(&["nfs-usage", "_doc", "a/b c"]).as_str(),
            "http://es.local:9200/nfs-usage/_doc/a%2Fb%20c"
        );
    }

    #[test]
    fn test_no_auth_without_id() {
        let store = ElasticsearchStore::new(&config()).unwrap();
        assert!(store.username.is_none());
    }

    #[test]
    fn test_invalid_host_is_setup_error() {
        let mut config = config();
        config.host = "bad host".to_string();
        let err = ElasticsearchStore::new(&config).unwrap_err();
        assert!(matches!(err, StoreError::Setup(_)));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transport_error() {
        let mut config = config();
        config.host = "127.0.0.1".to_string();
        config.port = 9;
        config.timeout_secs = 2;
        let store = ElasticsearchStore::new(&config).unwrap();

        let err = store.bulk("nfs-usage", b"{}\n".to_vec()).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport { .. }));
    }

    #[test]
    fn test_usage_mapping_covers_document_fields() {
        let mapping = usage_mapping();
        let properties = mapping["mappings"]["properties"].as_object().unwrap();
        for field in ["timestamp", "cluster", "volume_type", "full_path", "disk_size"] {
            assert!(properties.contains_key(field), "missing {field}");
        }
    }
}
