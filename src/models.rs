// fillpdf-service/src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityContext;
use crate::reconcile::Exportable;
use crate::token::ContentKind;

// ============================================================
// Forms and fields
// ============================================================

/// Exact-match value substitutions, written one `from|to` pair per line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Replacements {
    pairs: Vec<(String, String)>,
}

impl Replacements {
    /// Blank lines and lines without `|` are skipped.
    pub fn parse(text: &str) -> Self {
        let pairs = text
            .lines()
            .filter_map(|line| {
                let (from, to) = line.split_once('|')?;
                Some((from.trim().to_string(), to.trim().to_string()))
            })
            .collect();
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Replacement for a value equal to a `from` entry. A later line
    /// overrides an earlier one with the same `from`.
    pub fn lookup(&self, value: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(from, _)| from == value)
            .map(|(_, to)| to.as_str())
    }

    pub fn to_text(&self) -> String {
        self.pairs
            .iter()
            .map(|(from, to)| format!("{from}|{to}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<String> for Replacements {
    fn from(text: String) -> Self {
        Replacements::parse(&text)
    }
}

impl From<Replacements> for String {
    fn from(replacements: Replacements) -> Self {
        replacements.to_text()
    }
}

/// What a PDF field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Image,
    #[default]
    Unknown,
}

impl FieldType {
    /// Maps a type name reported by a PDF backend.
    pub fn from_pdf_type(pdf_type: &str) -> Self {
        match pdf_type {
            "Text" => FieldType::Text,
            "PushButton" | "Image" | "Signature" => FieldType::Image,
            _ => FieldType::Unknown,
        }
    }

    pub fn content_kind(self) -> ContentKind {
        match self {
            FieldType::Text => ContentKind::Text,
            FieldType::Image => ContentKind::Image,
            FieldType::Unknown => ContentKind::Any,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Image => "image",
            FieldType::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "text" => FieldType::Text,
            "image" => FieldType::Image,
            _ => FieldType::Unknown,
        }
    }
}

/// A fillable template plus its delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: Option<i64>,
    pub title: String,
    pub template_uri: String,
    pub scheme: String,
    pub destination_path: String,
    pub replacements: Replacements,
    pub default_entity_type: Option<String>,
    pub default_entity_id: Option<String>,
}

impl Form {
    pub fn new(template_uri: impl Into<String>) -> Self {
        Self {
            id: None,
            title: String::new(),
            template_uri: template_uri.into(),
            scheme: "private".to_string(),
            destination_path: String::new(),
            replacements: Replacements::default(),
            default_entity_type: None,
            default_entity_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormProperty {
    Title,
    Scheme,
    DestinationPath,
    Replacements,
    DefaultEntityType,
    DefaultEntityId,
}

impl Exportable for Form {
    type Property = FormProperty;

    fn exportable_properties() -> &'static [FormProperty] {
        &[
            FormProperty::Title,
            FormProperty::Scheme,
            FormProperty::DestinationPath,
            FormProperty::Replacements,
            FormProperty::DefaultEntityType,
            FormProperty::DefaultEntityId,
        ]
    }

    fn copy_property(&mut self, from: &Self, property: FormProperty) {
        match property {
            FormProperty::Title => self.title = from.title.clone(),
            FormProperty::Scheme => self.scheme = from.scheme.clone(),
            FormProperty::DestinationPath => self.destination_path = from.destination_path.clone(),
            FormProperty::Replacements => self.replacements = from.replacements.clone(),
            FormProperty::DefaultEntityType => {
                self.default_entity_type = from.default_entity_type.clone()
            }
            FormProperty::DefaultEntityId => self.default_entity_id = from.default_entity_id.clone(),
        }
    }
}

/// One PDF field and the token template that fills it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: Option<i64>,
    pub form_id: Option<i64>,
    pub pdf_key: String,
    pub field_type: FieldType,
    pub value: String,
    pub prefix: String,
    pub suffix: String,
    pub replacements: Replacements,
}

impl FormField {
    pub fn new(pdf_key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: None,
            form_id: None,
            pdf_key: pdf_key.into(),
            field_type,
            value: String::new(),
            prefix: String::new(),
            suffix: String::new(),
            replacements: Replacements::default(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProperty {
    Value,
    Prefix,
    Suffix,
    Replacements,
}

impl Exportable for FormField {
    type Property = FieldProperty;

    fn exportable_properties() -> &'static [FieldProperty] {
        &[
            FieldProperty::Value,
            FieldProperty::Prefix,
            FieldProperty::Suffix,
            FieldProperty::Replacements,
        ]
    }

    fn copy_property(&mut self, from: &Self, property: FieldProperty) {
        match property {
            FieldProperty::Value => self.value = from.value.clone(),
            FieldProperty::Prefix => self.prefix = from.prefix.clone(),
            FieldProperty::Suffix => self.suffix = from.suffix.clone(),
            FieldProperty::Replacements => self.replacements = from.replacements.clone(),
        }
    }
}

// ============================================================
// Service messages
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServiceRequest {
    Fill(FillRequest),
    CreateForm {
        template_uri: String,
        #[serde(default)]
        title: Option<String>,
    },
    ReplaceTemplate {
        form_id: i64,
        template_uri: String,
    },
    Export {
        form_id: i64,
    },
    Import {
        form_id: i64,
        code: String,
    },
    DeleteForm {
        form_id: i64,
    },
}

fn default_flatten() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillRequest {
    pub form_id: i64,
    #[serde(default)]
    pub entities: EntityContext,
    /// Fill every field with its own `<pdf_key>`.
    #[serde(default)]
    pub sample: bool,
    #[serde(default = "default_flatten")]
    pub flatten: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilledDocument {
    pub filename: String,
    pub content_base64: String,
    pub size_bytes: usize,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceResult {
    Filled(FilledDocument),
    FormCreated { form_id: i64, pdf_keys: Vec<String> },
    TemplateReplaced { form_id: i64, vanished_keys: Vec<String> },
    Exported { code: String },
    Imported { form_id: i64, unmatched_keys: Vec<String> },
    FormDeleted { form_id: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub request_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ServiceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ServiceResponse {
    pub fn success(request_id: String, result: ServiceResult) -> Self {
        Self {
            request_id,
            status: "success".to_string(),
            result: Some(result),
            error: None,
            error_type: None,
            generated_at: Utc::now(),
        }
    }

    pub fn error(request_id: String, error: String, error_type: String) -> Self {
        Self {
            request_id,
            status: "error".to_string(),
            result: None,
            error: Some(error),
            error_type: Some(error_type),
            generated_at: Utc::now(),
        }
    }
}
