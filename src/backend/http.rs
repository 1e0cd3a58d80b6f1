// fillpdf-service/src/backend/http.rs

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{FillOptions, ParsedField, PdfBackend};
use crate::error::{FillPdfError, Result};
use crate::mapping::FieldMapping;

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Serialize)]
struct ParseRequest {
    pdf: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MergeField {
    Text { value: String },
    Image { image: String },
}

#[derive(Debug, Serialize)]
struct MergeRequest {
    pdf: String,
    flatten: bool,
    fields: BTreeMap<String, MergeField>,
    /// Image bytes by content name; each image is sent once however many
    /// fields use it.
    images: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    pdf: String,
}

/// JSON-over-HTTP PDF service: either the local container or the hosted API.
pub struct HttpBackend {
    name: &'static str,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn local(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::build("local_server", base_url, None, timeout)
    }

    pub fn remote(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        Self::build("remote", base_url, Some(api_key), timeout)
    }

    fn build(
        name: &'static str,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FillPdfError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path);
        debug!(backend = self.name, url = %url, "Calling PDF service");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FillPdfError::BackendError(format!("{} timed out calling {url}", self.name))
            } else {
                FillPdfError::BackendError(format!("{} request to {url} failed: {e}", self.name))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FillPdfError::BackendError(format!(
                "{} returned {status}: {}",
                self.name,
                body.trim()
            )));
        }

        response.json::<T>().await.map_err(|e| {
            FillPdfError::BackendError(format!("{} sent an unreadable response: {e}", self.name))
        })
    }
}

fn merge_request(
    template: &[u8],
    mappings: &BTreeMap<String, FieldMapping>,
    options: &FillOptions,
) -> MergeRequest {
    let mut fields = BTreeMap::new();
    let mut images = BTreeMap::new();

    for (pdf_key, mapping) in mappings {
        let field = match mapping {
            FieldMapping::Text(text) => MergeField::Text {
                value: text.value().to_string(),
            },
            FieldMapping::Image(image) => {
                let name = image.content_name();
                images
                    .entry(name.clone())
                    .or_insert_with(|| general_purpose::STANDARD.encode(image.data()));
                MergeField::Image { image: name }
            }
        };
        fields.insert(pdf_key.clone(), field);
    }

    MergeRequest {
        pdf: general_purpose::STANDARD.encode(template),
        flatten: options.flatten,
        fields,
        images,
    }
}

#[async_trait]
impl PdfBackend for HttpBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn parse(&self, template: &[u8]) -> Result<Vec<ParsedField>> {
        let request = ParseRequest {
            pdf: general_purpose::STANDARD.encode(template),
        };
        let fields: Vec<ParsedField> = self.post("parse", &request).await?;
        info!(backend = self.name, fields = fields.len(), "Parsed template");
        Ok(fields)
    }

    async fn fill(
        &self,
        template: &[u8],
        mappings: &BTreeMap<String, FieldMapping>,
        options: &FillOptions,
    ) -> Result<Vec<u8>> {
        let request = merge_request(template, mappings, options);
        let response: MergeResponse = self.post("merge", &request).await?;
        let pdf = general_purpose::STANDARD.decode(response.pdf.trim())?;

        info!(
            backend = self.name,
            fields = request.fields.len(),
            images = request.images.len(),
            size_kb = pdf.len() / 1024,
            "Filled template"
        );
        Ok(pdf)
    }
}
