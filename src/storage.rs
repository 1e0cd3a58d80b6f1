use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::sign::SignedURLMethod;
use google_cloud_storage::sign::SignedURLOptions;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, instrument};

const SIGNED_URL_EXPIRY: Duration = Duration::from_secs(15 * 60); // 15 minutes

/// A filled PDF that was kept.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: String,
    pub file_size: i64,
    pub sha256_checksum: String,
    pub download_url: Option<String>,
}

/// Destination for filled PDFs of forms that keep their output.
#[async_trait]
pub trait OutputStorage: Send + Sync {
    async fn store(&self, path: &str, content_type: &str, data: &[u8]) -> Result<StoredFile>;
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Object path: `{scheme}/{destination_path}/{filename}`.
pub fn output_path(scheme: &str, destination_path: &str, file_name: &str) -> String {
    let destination = destination_path.trim_matches('/');
    let scheme = if scheme.is_empty() { "private" } else { scheme };
    format!("{}/{}/{}", scheme, destination, file_name)
}

#[derive(Clone)]
pub struct GcsOutputStorage {
    client: GcsClient,
    bucket: String,
}

impl GcsOutputStorage {
    /// Initialise from the mounted GCS service account key.
    pub async fn new(bucket: &str) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .context("Failed to initialise GCS client with service account")?;

        let client = GcsClient::new(config);

        Ok(Self {
            client,
            bucket: bucket.to_string(),
        })
    }

    /// Generate a signed URL for downloading a stored PDF.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn generate_signed_url(&self, gcs_path: &str) -> Result<String> {
        let file_name = gcs_path.rsplit('/').next().unwrap_or(gcs_path);
        let disposition = format!("attachment; filename=\"{}\"", file_name);

        let url = self
            .client
            .signed_url(
                &self.bucket,
                gcs_path,
                None,
                None,
                SignedURLOptions {
                    method: SignedURLMethod::GET,
                    expires: SIGNED_URL_EXPIRY,
                    query_parameters: vec![(
                        "response-content-disposition".to_string(),
                        vec![disposition],
                    )]
                    .into_iter()
                    .collect(),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to generate signed URL for {}", gcs_path))?;

        Ok(url)
    }
}

#[async_trait]
impl OutputStorage for GcsOutputStorage {
    #[instrument(skip(self, data), fields(bucket = %self.bucket))]
    async fn store(&self, path: &str, content_type: &str, data: &[u8]) -> Result<StoredFile> {
        let file_size = data.len() as i64;
        let sha256_checksum = sha256_hex(data);

        let upload_type = UploadType::Simple(Media {
            name: path.to_string().into(),
            content_type: content_type.to_string().into(),
            content_length: Some(file_size as u64),
        });

        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: self.bucket.clone(),
                    ..Default::default()
                },
                data.to_vec(),
                &upload_type,
            )
            .await
            .with_context(|| format!("Failed to upload filled PDF to GCS path {}", path))?;

        info!(
            gcs_path = %path,
            file_size = file_size,
            sha256 = %sha256_checksum,
            "Uploaded filled PDF to GCS"
        );

        let download_url = self.generate_signed_url(path).await?;

        Ok(StoredFile {
            path: path.to_string(),
            file_size,
            sha256_checksum,
            download_url: Some(download_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_join_scheme_and_destination() {
        assert_eq!(output_path("public", "/forms/2024/", "a.pdf"), "public/forms/2024/a.pdf");
        assert_eq!(output_path("", "x", "a.pdf"), "private/x/a.pdf");
    }

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
