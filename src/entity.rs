// fillpdf-service/src/entity.rs

//! Content entities supplied by the caller at fill time.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FillPdfError, Result};

/// Entity type of submission-like entities whose values live under
/// `values:<element>` token paths.
pub const SUBMISSION_ENTITY_TYPE: &str = "webform_submission";

/// Candidate entities keyed by entity type. Order within each list matters:
/// the last entity wins when several resolve the same token.
pub type EntityContext = HashMap<String, Vec<Entity>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: String,
    pub id: String,
    #[serde(default)]
    pub bundle: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            bundle: None,
            label: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_submission(&self) -> bool {
        self.entity_type == SUBMISSION_ENTITY_TYPE
    }

    /// `type:id`, used in log lines.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.entity_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Plain text. Escaped when substituted into a template.
    Text(String),
    /// Trusted HTML, substituted as-is.
    Markup(String),
    Image(FileRef),
    File(FileRef),
    /// A `data:image/...;base64,` URI captured by a signature element.
    Signature(String),
    List(Vec<FieldValue>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(default)]
    pub fid: Option<i64>,
    pub uri: String,
    #[serde(default)]
    pub mime: Option<String>,
}

impl FileRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            fid: None,
            uri: uri.into(),
            mime: None,
        }
    }
}

/// Reads file contents on behalf of the resolver and the fill pipeline.
pub trait FileAccessor: Send + Sync {
    fn read(&self, file: &FileRef) -> Result<Vec<u8>>;
}

/// Maps `public://` and `private://` URIs onto local directories. Bare
/// paths are read as given.
#[derive(Debug, Clone)]
pub struct LocalFileAccessor {
    public_root: PathBuf,
    private_root: PathBuf,
}

impl LocalFileAccessor {
    pub fn new(public_root: impl Into<PathBuf>, private_root: impl Into<PathBuf>) -> Self {
        Self {
            public_root: public_root.into(),
            private_root: private_root.into(),
        }
    }

    pub fn resolve_path(&self, uri: &str) -> Result<PathBuf> {
        let (root, rest) = match uri.split_once("://") {
            Some(("public", rest)) => (&self.public_root, rest),
            Some(("private", rest)) => (&self.private_root, rest),
            Some((scheme, _)) => {
                return Err(FillPdfError::InvalidData(format!(
                    "Unsupported file scheme: {scheme}"
                )))
            }
            None => return Ok(PathBuf::from(uri)),
        };

        let relative = Path::new(rest);
        if relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(FillPdfError::InvalidData(format!(
                "File URI escapes its scheme root: {uri}"
            )));
        }
        Ok(root.join(relative))
    }
}

impl FileAccessor for LocalFileAccessor {
    fn read(&self, file: &FileRef) -> Result<Vec<u8>> {
        let path = self.resolve_path(&file.uri)?;
        debug!(uri = %file.uri, path = ?path, "Reading file");
        Ok(std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_uris_map_to_roots() {
        let files = LocalFileAccessor::new("/srv/public", "/srv/private");
        assert_eq!(
            files.resolve_path("public://images/a.png").unwrap(),
            PathBuf::from("/srv/public/images/a.png")
        );
        assert_eq!(
            files.resolve_path("private://forms/t.pdf").unwrap(),
            PathBuf::from("/srv/private/forms/t.pdf")
        );
    }

    #[test]
    fn parent_segments_are_rejected() {
        let files = LocalFileAccessor::new("/srv/public", "/srv/private");
        assert!(files.resolve_path("public://../etc/passwd").is_err());
        assert!(files.resolve_path("s3://bucket/a.png").is_err());
    }

    #[test]
    fn reads_through_public_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let files = LocalFileAccessor::new(dir.path(), dir.path());
        let bytes = files.read(&FileRef::new("public://a.txt")).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn field_values_deserialize_from_tagged_json() {
        let entity: Entity = serde_json::from_str(
            r#"{
                "entity_type": "node",
                "id": "7",
                "label": "Hello",
                "fields": {
                    "body": {"kind": "markup", "value": "a<br />b"},
                    "field_image": {"kind": "image", "value": {"uri": "public://x.png"}}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(entity.field("body"), Some(&FieldValue::Markup("a<br />b".into())));
        assert!(matches!(entity.field("field_image"), Some(FieldValue::Image(_))));
    }
}
