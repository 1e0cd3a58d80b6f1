// fillpdf-service/src/mapping.rs

//! Resolved field content handed to a PDF backend.
//!
//! A [`FieldMapping`] is built once per field per fill and never mutated;
//! producing different content means constructing a new mapping.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMapping {
    Text(TextMapping),
    Image(ImageMapping),
}

impl FieldMapping {
    pub fn text(value: impl Into<String>) -> Self {
        FieldMapping::Text(TextMapping::new(value))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldMapping::Text(text) => Some(text.value()),
            FieldMapping::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageMapping> {
        match self {
            FieldMapping::Image(image) => Some(image),
            FieldMapping::Text(_) => None,
        }
    }
}

/// Plain text, already stripped of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMapping {
    value: String,
}

impl TextMapping {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Raw image bytes plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMapping {
    data: Vec<u8>,
    uri: Option<String>,
    extension: Option<String>,
}

impl ImageMapping {
    pub fn new(data: Vec<u8>, uri: Option<String>, extension: Option<String>) -> Self {
        let extension = extension.or_else(|| uri.as_deref().and_then(extension_of));
        Self {
            data,
            uri,
            extension,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Stable name for the image inside a backend payload. Two mappings from
    /// the same source share a name, so backends can send the bytes once.
    pub fn content_name(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.uri {
            Some(uri) => hasher.update(uri.as_bytes()),
            None => hasher.update(&self.data),
        }
        let digest = hex::encode(hasher.finalize());
        match &self.extension {
            Some(ext) => format!("{digest}.{ext}"),
            None => digest,
        }
    }
}

fn extension_of(uri: &str) -> Option<String> {
    let file_name = uri.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}
