//! HTTP-backed `ObjectStore` over a signed-URL object storage API
//! (Supabase Storage satisfies this without modification). Upload
//! uses upsert semantics: a plain PUT to the resolved path, which the
//! storage API is expected to treat as create-or-replace — mirroring
//! the original worker's upload-then-update-on-duplicate fallback,
//! simplified to a single idempotent call.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::WorkerError;
use crate::traits::ObjectStore;

pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    token: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            bucket: bucket.into(),
            token: token.into(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            path
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, WorkerError> {
        let response = self
            .client
            .get(self.object_url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| WorkerError::BadInputError { item: path.to_string(), message: e.to_string() })?
            .error_for_status()
            .map_err(|e| WorkerError::BadInputError { item: path.to_string(), message: e.to_string() })?;

        Ok(response.bytes().await.map(|b| b.to_vec())?)
    }

    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), WorkerError> {
        self.client
            .post(self.object_url(path))
            .bearer_auth(&self.token)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await?
            .error_for_status()
            .map_err(|e| WorkerError::WriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_joins_base_bucket_and_path() {
        let store = HttpObjectStore::new("https://example.supabase.co", "pdm-files", "tok");
        assert_eq!(
            store.object_url("projects/p1/nests/j1/sheet_01.dxf"),
            "https://example.supabase.co/storage/v1/object/pdm-files/projects/p1/nests/j1/sheet_01.dxf"
        );
    }

    #[test]
    fn test_object_url_trims_trailing_slash_on_base() {
        let store = HttpObjectStore::new("https://example.supabase.co/", "pdm-files", "tok");
        assert_eq!(
            store.object_url("manifest.json"),
            "https://example.supabase.co/storage/v1/object/pdm-files/manifest.json"
        );
    }
}
