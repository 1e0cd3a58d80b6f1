// fillpdf-service/src/template.rs

//! Creating forms from templates and swapping a form's template.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::backend::{ParsedField, PdfBackend};
use crate::entity::{FileAccessor, FileRef};
use crate::error::{FillPdfError, Result};
use crate::models::{FieldType, Form, FormField};
use crate::persistence::FormStore;
use crate::reconcile::reconcile;
use crate::serializer::key_fields;

/// Fresh field definitions for a parsed template, in parser order.
///
/// Containers are dropped. A name reported more than once yields a single
/// field holding the last report.
pub fn fields_from_parse(parsed: Vec<ParsedField>) -> Vec<FormField> {
    let mut fields: Vec<FormField> = Vec::new();
    for field in parsed {
        if field.is_container() {
            continue;
        }
        let definition = FormField::new(&field.name, FieldType::from_pdf_type(&field.field_type));
        match fields.iter_mut().find(|f| f.pdf_key == field.name) {
            Some(existing) => {
                warn!(pdf_key = %field.name, "Template reports a field name twice, keeping the last");
                *existing = definition;
            }
            None => fields.push(definition),
        }
    }
    fields
}

#[derive(Debug, Clone)]
pub struct TemplateReplacement {
    pub form: Form,
    pub fields: Vec<FormField>,
    /// Keys of the old template missing from the new one. Their mappings
    /// are gone.
    pub vanished_keys: Vec<String>,
}

pub struct TemplateManager {
    store: Arc<dyn FormStore>,
    backend: Arc<dyn PdfBackend>,
    files: Arc<dyn FileAccessor>,
}

impl TemplateManager {
    pub fn new(
        store: Arc<dyn FormStore>,
        backend: Arc<dyn PdfBackend>,
        files: Arc<dyn FileAccessor>,
    ) -> Self {
        Self {
            store,
            backend,
            files,
        }
    }

    async fn parse_template(&self, template_uri: &str) -> Result<Vec<FormField>> {
        let template = self
            .files
            .read(&FileRef::new(template_uri))
            .map_err(|_| FillPdfError::TemplateNotFound(template_uri.to_string()))?;
        let parsed = match self.backend.parse(&template).await {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(
                    template_uri,
                    backend = self.backend.name(),
                    error = %e,
                    "PDF backend failed to parse template"
                );
                return Err(FillPdfError::ParseFailed);
            }
        };
        Ok(fields_from_parse(parsed))
    }

    #[instrument(skip(self))]
    pub async fn create_form(
        &self,
        template_uri: &str,
        title: Option<String>,
    ) -> Result<(Form, Vec<FormField>)> {
        let fresh = self.parse_template(template_uri).await?;

        let mut form = Form::new(template_uri);
        form.title = title.unwrap_or_default();
        let form = self.store.insert_form(&form).await?;
        let form_id = form.id.ok_or_else(|| FillPdfError::InvalidData("Stored form has no id".into()))?;

        let mut fields = Vec::with_capacity(fresh.len());
        for field in &fresh {
            fields.push(self.store.insert_field(form_id, field).await?);
        }

        info!(form_id, fields = fields.len(), "Created form from template");
        Ok((form, fields))
    }

    /// Points a form at a new template. Mappings carry over to fields whose
    /// PDF key is unchanged; the old field set is replaced in one write.
    #[instrument(skip(self))]
    pub async fn replace_template(&self, form_id: i64, template_uri: &str) -> Result<TemplateReplacement> {
        let mut form = self
            .store
            .load_form(form_id)
            .await?
            .ok_or(FillPdfError::FormNotFound(form_id))?;

        let fresh = self.parse_template(template_uri).await?;
        let old_fields = self.store.load_fields(form_id).await?;

        // Old values flow into the new shape, not the other way round.
        let result = reconcile(&key_fields(old_fields), &key_fields(fresh.clone()));

        let merged: Vec<FormField> = fresh
            .iter()
            .map(|field| result.updated.get(&field.pdf_key).unwrap_or(field).clone())
            .collect();
        form.template_uri = template_uri.to_string();
        let (form, fields) = self.store.replace_fields(&form, &merged).await?;

        if !result.unmatched.is_empty() {
            warn!(
                form_id,
                vanished = ?result.unmatched,
                "New template lacks fields that had mappings"
            );
        }
        info!(
            form_id,
            fields = fields.len(),
            carried_over = result.affected.len(),
            "Replaced form template"
        );

        Ok(TemplateReplacement {
            form,
            fields,
            vanished_keys: result.unmatched,
        })
    }
}
