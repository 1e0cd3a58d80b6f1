// fillpdf-service/src/serializer.rs

//! Import/export of form configuration as JSON.
//!
//! ```json
//! { "version": 1, "form": { "title": "..." }, "fields": [ { "pdf_key": "..." } ] }
//! ```
//!
//! Documents written before versioning existed have no `version` and are
//! read as version 1.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::{FillPdfError, Result};
use crate::models::{FieldType, Form, FormField, Replacements};
use crate::persistence::FormStore;
use crate::reconcile::{reconcile, Exportable, Reconciliation};

pub const EXPORT_VERSION: u32 = 1;

fn default_scheme() -> String {
    "private".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedForm {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub destination_path: String,
    #[serde(default)]
    pub replacements: Replacements,
    #[serde(default)]
    pub default_entity_type: Option<String>,
    #[serde(default)]
    pub default_entity_id: Option<String>,
}

impl From<&Form> for ExportedForm {
    fn from(form: &Form) -> Self {
        Self {
            title: form.title.clone(),
            scheme: form.scheme.clone(),
            destination_path: form.destination_path.clone(),
            replacements: form.replacements.clone(),
            default_entity_type: form.default_entity_type.clone(),
            default_entity_id: form.default_entity_id.clone(),
        }
    }
}

impl ExportedForm {
    fn into_form(self) -> Form {
        Form {
            id: None,
            title: self.title,
            template_uri: String::new(),
            scheme: self.scheme,
            destination_path: self.destination_path,
            replacements: self.replacements,
            default_entity_type: self.default_entity_type,
            default_entity_id: self.default_entity_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedField {
    pub pdf_key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub replacements: Replacements,
}

impl From<&FormField> for ExportedField {
    fn from(field: &FormField) -> Self {
        Self {
            pdf_key: field.pdf_key.clone(),
            value: field.value.clone(),
            prefix: field.prefix.clone(),
            suffix: field.suffix.clone(),
            replacements: field.replacements.clone(),
        }
    }
}

impl ExportedField {
    fn into_field(self) -> FormField {
        FormField {
            id: None,
            form_id: None,
            pdf_key: self.pdf_key,
            field_type: FieldType::Unknown,
            value: self.value,
            prefix: self.prefix,
            suffix: self.suffix,
            replacements: self.replacements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    pub form: ExportedForm,
    pub fields: Vec<ExportedField>,
}

/// A parsed import, detached from any stored form.
#[derive(Debug, Clone)]
pub struct ImportDocument {
    pub form: Form,
    /// Fields keyed by PDF key. A key listed twice keeps its last entry.
    pub fields: BTreeMap<String, FormField>,
}

pub fn export_form(form: &Form, fields: &[FormField]) -> Result<String> {
    let document = ExportDocument {
        version: EXPORT_VERSION,
        form: ExportedForm::from(form),
        fields: fields.iter().map(ExportedField::from).collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn parse_import(code: &str) -> Result<ImportDocument> {
    let value: Value = serde_json::from_str(code)
        .map_err(|e| FillPdfError::InvalidImportCode(format!("not valid JSON: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(FillPdfError::InvalidImportCode(
            "expected a JSON object".to_string(),
        ));
    };

    match object.get("version") {
        None => {}
        Some(Value::Number(n)) => {
            let found = n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| FillPdfError::InvalidImportCode(format!("bad version {n}")))?;
            if found == 0 || found > EXPORT_VERSION {
                return Err(FillPdfError::UnsupportedImportVersion {
                    found,
                    supported: EXPORT_VERSION,
                });
            }
        }
        Some(other) => {
            return Err(FillPdfError::InvalidImportCode(format!(
                "version must be a number, got {other}"
            )))
        }
    }

    let form = object
        .remove("form")
        .ok_or_else(|| FillPdfError::InvalidImportCode("missing `form`".to_string()))?;
    let fields = object
        .remove("fields")
        .ok_or_else(|| FillPdfError::InvalidImportCode("missing `fields`".to_string()))?;

    let form: ExportedForm = serde_json::from_value(form)
        .map_err(|e| FillPdfError::InvalidImportCode(format!("invalid `form`: {e}")))?;
    let fields: Vec<ExportedField> = serde_json::from_value(fields)
        .map_err(|e| FillPdfError::InvalidImportCode(format!("invalid `fields`: {e}")))?;

    Ok(ImportDocument {
        form: form.into_form(),
        fields: fields
            .into_iter()
            .map(|f| (f.pdf_key.clone(), f.into_field()))
            .collect(),
    })
}

pub fn key_fields(fields: Vec<FormField>) -> BTreeMap<String, FormField> {
    fields.into_iter().map(|f| (f.pdf_key.clone(), f)).collect()
}

/// Reconciles `incoming` onto `existing` and, when `save` is set, persists
/// every existing field that received values.
pub async fn import_form_fields(
    store: &dyn FormStore,
    incoming: &BTreeMap<String, FormField>,
    existing: &BTreeMap<String, FormField>,
    save: bool,
) -> Result<Reconciliation<FormField>> {
    let result = reconcile(incoming, existing);
    if save {
        for field in result.affected_entries() {
            store.save_field(field).await?;
        }
    }
    Ok(result)
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub form: Form,
    pub unmatched_keys: Vec<String>,
}

pub struct Serializer {
    store: Arc<dyn FormStore>,
}

impl Serializer {
    pub fn new(store: Arc<dyn FormStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn export(&self, form_id: i64) -> Result<String> {
        let form = self
            .store
            .load_form(form_id)
            .await?
            .ok_or(FillPdfError::FormNotFound(form_id))?;
        let fields = self.store.load_fields(form_id).await?;
        let code = export_form(&form, &fields)?;
        info!(form_id, fields = fields.len(), "Exported form configuration");
        Ok(code)
    }

    /// Applies an export onto an existing form. The template and the set of
    /// PDF keys stay as they are; keys the form does not have are returned.
    #[instrument(skip(self, code))]
    pub async fn import(&self, form_id: i64, code: &str) -> Result<ImportOutcome> {
        let imported = parse_import(code)?;

        let mut form = self
            .store
            .load_form(form_id)
            .await?
            .ok_or(FillPdfError::FormNotFound(form_id))?;
        form.copy_exportable(&imported.form);
        let form = self.store.save_form(&form).await?;

        let existing = key_fields(self.store.load_fields(form_id).await?);
        let result = import_form_fields(self.store.as_ref(), &imported.fields, &existing, true).await?;

        if !result.unmatched.is_empty() {
            warn!(
                form_id,
                unmatched = ?result.unmatched,
                "Imported fields have no counterpart on this form"
            );
        }
        info!(form_id, updated = result.affected.len(), "Imported form configuration");

        Ok(ImportOutcome {
            form,
            unmatched_keys: result.unmatched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_carries_version_and_only_exportable_data() {
        let mut form = Form::new("private://t.pdf");
        form.id = Some(5);
        form.title = "Invoice [node:title]".into();
        let mut field = FormField::new("Name", FieldType::Text).with_value("[user:name]");
        field.id = Some(9);

        let code = export_form(&form, &[field]).unwrap();
        let value: Value = serde_json::from_str(&code).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["form"]["title"], "Invoice [node:title]");
        assert!(value["form"].get("template_uri").is_none());
        assert!(value["form"].get("id").is_none());
        assert_eq!(value["fields"][0]["pdf_key"], "Name");
        assert!(value["fields"][0].get("id").is_none());
        assert!(value["fields"][0].get("field_type").is_none());
    }

    #[test]
    fn unversioned_documents_are_version_one() {
        let doc = parse_import(r#"{"form": {"title": "T"}, "fields": [{"pdf_key": "A", "value": "x"}]}"#)
            .unwrap();
        assert_eq!(doc.form.title, "T");
        assert_eq!(doc.fields["A"].value, "x");
    }

    #[test]
    fn rejects_malformed_codes() {
        for code in ["not json", "[]", r#"{"fields": []}"#, r#"{"form": {}}"#, r#"{"form": 3, "fields": []}"#] {
            let err = parse_import(code).unwrap_err();
            assert!(
                matches!(err, FillPdfError::InvalidImportCode(_)),
                "{code} gave {err:?}"
            );
        }
    }

    #[test]
    fn rejects_future_versions() {
        let err = parse_import(r#"{"version": 2, "form": {}, "fields": []}"#).unwrap_err();
        assert!(matches!(
            err,
            FillPdfError::UnsupportedImportVersion { found: 2, supported: 1 }
        ));
    }

    #[test]
    fn duplicate_keys_keep_the_last_entry() {
        let doc = parse_import(
            r#"{"form": {}, "fields": [{"pdf_key": "A", "value": "1"}, {"pdf_key": "A", "value": "2"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.fields.len(), 1);
        assert_eq!(doc.fields["A"].value, "2");
    }
}
