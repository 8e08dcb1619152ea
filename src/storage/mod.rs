//! Object storage for listing images

mod types;

use async_trait::async_trait;
use reqwest::multipart;

use crate::error::GatewayError;
use crate::fetch::Fetch;
use crate::gateway::SupabaseGateway;

pub use types::*;

/// Bucket-scoped object storage
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` at `path`; never overwrites an existing object
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError>;

    /// Publicly retrievable URL of an object
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Delete objects by path
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), GatewayError>;
}

#[async_trait]
impl ObjectStorage for SupabaseGateway {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        let url = self.service_url("storage", &format!("/object/{}/{}", bucket, path));
        let token = self.bearer().await;

        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let part = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", token))
            .header("Cache-Control", "3600")
            .header("x-upsert", "false")
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            return Err(GatewayError::status(
                status,
                format!("upload of {} failed: {}", path, text),
            ));
        }

        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.service_url("storage", &format!("/object/public/{}/{}", bucket, path))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), GatewayError> {
        let url = self.service_url("storage", &format!("/object/{}", bucket));
        let token = self.bearer().await;

        Fetch::delete(&self.client, &url)
            .credentials(&self.key, &token)
            .json(&serde_json::json!({ "prefixes": paths }))?
            .send()
            .await?;

        Ok(())
    }
}
