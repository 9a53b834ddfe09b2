//! S3-compatible storage client
//!
//! Async client using reqwest with path-style object URLs. Fetch
//! failures surface as typed errors with the offending key; there is
//! no retry layer here.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::ObjectStore;
use crate::error::{Result, RiptideError};

/// Configuration for the S3 client
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Access key ID
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            bucket: "riptide".into(),
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

impl S3Config {
    /// Build client configuration from the environment for the given
    /// bucket
    pub fn from_env(bucket: &str) -> Self {
        Self {
            endpoint: std::env::var("S3_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: bucket.into(),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into()),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            ..Default::default()
        }
    }
}

/// S3-compatible storage client using reqwest
pub struct S3Client {
    client: Client,
    config: S3Config,
}

impl S3Client {
    /// Create a new S3 client
    pub fn new(config: S3Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RiptideError::StorageError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Build URL for an object
    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.config.endpoint, self.config.bucket, key)
    }

    /// Get bucket name
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let url = self.object_url(key);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RiptideError::StorageError {
                message: format!("Get object failed for {}: {}", key, e),
            })?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(RiptideError::ObjectNotFound { key: key.into() });
        }

        if !resp.status().is_success() {
            return Err(RiptideError::StorageError {
                message: format!("Get object failed for {}: status {}", key, resp.status()),
            });
        }

        let data = resp.bytes().await.map_err(|e| RiptideError::StorageError {
            message: format!("Failed to read body for {}: {}", key, e),
        })?;

        Ok(data)
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let url = self.object_url(key);

        let resp = self
            .client
            .put(&url)
            .body(data)
            .send()
            .await
            .map_err(|e| RiptideError::StorageError {
                message: format!("Put object failed for {}: {}", key, e),
            })?;

        if !resp.status().is_success() {
            return Err(RiptideError::StorageError {
                message: format!("Put object failed for {}: status {}", key, resp.status()),
            });
        }

        debug!("Put {} complete", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let url = self.object_url(key);

        let resp = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| RiptideError::StorageError {
                message: format!("Head object failed for {}: {}", key, e),
            })?;

        Ok(resp.status().is_success())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}?list-type=2&prefix={}",
            self.config.endpoint, self.config.bucket, prefix
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RiptideError::StorageError {
                message: format!("List objects failed for prefix {}: {}", prefix, e),
            })?;

        if !resp.status().is_success() {
            return Err(RiptideError::StorageError {
                message: format!(
                    "List objects failed for prefix {}: status {}",
                    prefix,
                    resp.status()
                ),
            });
        }

        let body = resp.text().await.map_err(|e| RiptideError::StorageError {
            message: format!("Failed to read list response: {}", e),
        })?;

        // Key extraction from the XML listing
        let mut keys = Vec::new();
        for part in body.split("<Key>").skip(1) {
            if let Some(end) = part.find("</Key>") {
                keys.push(part[..end].to_string());
            }
        }

        Ok(keys)
    }

    async fn delete(&self, prefix: &str) -> Result<()> {
        let keys = self.list(prefix).await?;

        for key in keys {
            let url = self.object_url(&key);

            let resp = self
                .client
                .delete(&url)
                .send()
                .await
                .map_err(|e| RiptideError::StorageError {
                    message: format!("Delete object failed for {}: {}", key, e),
                })?;

            if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
                return Err(RiptideError::StorageError {
                    message: format!("Delete object failed for {}: status {}", key, resp.status()),
                });
            }

            debug!("Deleted {}", key);
        }

        Ok(())
    }
}
