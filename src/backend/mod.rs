// fillpdf-service/src/backend/mod.rs

mod http;
mod pdftk;
mod xfdf;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, BackendKind};
use crate::error::{FillPdfError, Result};
use crate::mapping::FieldMapping;

pub use http::HttpBackend;
pub use pdftk::{parse_field_dump, PdftkBackend};
pub use xfdf::to_xfdf;

/// Parser type name for LiveCycle containers, which hold no value.
pub const CONTAINER_FIELD_TYPE: &str = "Container";

/// One field as reported by a backend's parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl ParsedField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            value: None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.field_type == CONTAINER_FIELD_TYPE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOptions {
    pub flatten: bool,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self { flatten: true }
    }
}

/// External PDF processor. Parsing and filling are delegated entirely.
#[async_trait]
pub trait PdfBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn parse(&self, template: &[u8]) -> Result<Vec<ParsedField>>;

    async fn fill(
        &self,
        template: &[u8],
        mappings: &BTreeMap<String, FieldMapping>,
        options: &FillOptions,
    ) -> Result<Vec<u8>>;
}

pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn PdfBackend>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.kind {
        BackendKind::Pdftk => Ok(Arc::new(PdftkBackend::new(
            &config.pdftk_path,
            config.locale.clone(),
            timeout,
        ))),
        BackendKind::LocalServer => Ok(Arc::new(HttpBackend::local(
            &config.local_server_url,
            timeout,
        )?)),
        BackendKind::Remote => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                FillPdfError::ConfigError("backend.api_key is required for the remote backend".into())
            })?;
            Ok(Arc::new(HttpBackend::remote(&config.remote_url, api_key, timeout)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: BackendKind) -> BackendConfig {
        BackendConfig {
            kind,
            pdftk_path: "pdftk".into(),
            locale: Some("en_US.UTF-8".into()),
            local_server_url: "http://127.0.0.1:8085".into(),
            remote_url: "https://fillpdf.example".into(),
            api_key: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn factory_picks_configured_backend() {
        assert_eq!(create_backend(&config(BackendKind::Pdftk)).unwrap().name(), "pdftk");
        assert_eq!(
            create_backend(&config(BackendKind::LocalServer)).unwrap().name(),
            "local_server"
        );
    }

    #[test]
    fn remote_requires_api_key() {
        let err = create_backend(&config(BackendKind::Remote)).err().unwrap();
        assert!(matches!(err, FillPdfError::ConfigError(_)));

        let mut with_key = config(BackendKind::Remote);
        with_key.api_key = Some("secret".into());
        assert_eq!(create_backend(&with_key).unwrap().name(), "remote");
    }

    #[test]
    fn parsed_fields_read_type_key() {
        let fields: Vec<ParsedField> =
            serde_json::from_str(r#"[{"name": "A", "type": "Text", "value": "x"}, {"name": "B"}]"#)
                .unwrap();
        assert_eq!(fields[0].field_type, "Text");
        assert_eq!(fields[0].value.as_deref(), Some("x"));
        assert_eq!(fields[1].field_type, "");
        assert!(ParsedField::new("C", "Container").is_container());
    }
}
