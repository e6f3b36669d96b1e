//! Object storage on the hosted platform (`/storage/v1` API).

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, instrument};

use super::{BlobStore, ImageKind, StorageError};

#[derive(Clone)]
pub struct PlatformStore {
    client: Client,
    base_url: String,
    service_key: SecretString,
    bucket: String,
}

impl std::fmt::Debug for PlatformStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformStore")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("service_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PlatformStore {
    #[must_use]
    pub fn new(client: Client, base_url: &str, service_key: SecretString, bucket: &str) -> Self {
        Self { client, base_url: base_url.to_string(), service_key, bucket: bucket.to_string() }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{key}", self.base_url, self.bucket)
    }
}

#[async_trait]
impl BlobStore for PlatformStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, key: &str, kind: ImageKind, bytes: Vec<u8>) -> Result<String, StorageError> {
        let response = self
            .client
            .post(format!("{}/storage/v1/object/{}/{key}", self.base_url, self.bucket))
            .bearer_auth(self.service_key.expose_secret())
            .header("apikey", self.service_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, kind.content_type())
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %message, "Upload rejected by storage");
            return Err(StorageError::Backend { status: status.as_u16(), message });
        }

        debug!("Upload stored");
        Ok(self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url() {
        let store = PlatformStore::new(Client::new(), "https://proj.example", "key".to_string().into(), "product-images");
        assert_eq!(
            store.public_url("u1/abc.png"),
            "https://proj.example/storage/v1/object/public/product-images/u1/abc.png"
        );
        assert!(!format!("{store:?}").contains("key\""));
    }
}
