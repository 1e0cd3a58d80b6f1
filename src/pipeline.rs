use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::backend::{FillOptions, PdfBackend};
use crate::entity::{EntityContext, FileAccessor, FileRef};
use crate::error::{FillPdfError, Result};
use crate::mapping::FieldMapping;
use crate::models::{FillRequest, Form, FormField};
use crate::persistence::FormStore;
use crate::storage::{output_path, sha256_hex, OutputStorage, StoredFile};
use crate::token::{ContentKind, ResolveOptions, TokenResolver};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A filled PDF ready to hand back to the caller.
#[derive(Debug, Clone)]
pub struct FilledPdf {
    pub filename: String,
    pub data: Vec<u8>,
    pub sha256: String,
    pub stored: Option<StoredFile>,
}

/// Orchestrates: load form → resolve every field → backend fill → optional upload.
pub struct FillPipeline {
    store: Arc<dyn FormStore>,
    backend: Arc<dyn PdfBackend>,
    resolver: TokenResolver,
    files: Arc<dyn FileAccessor>,
    output: Option<Arc<dyn OutputStorage>>,
}

impl FillPipeline {
    pub fn new(
        store: Arc<dyn FormStore>,
        backend: Arc<dyn PdfBackend>,
        resolver: TokenResolver,
        files: Arc<dyn FileAccessor>,
    ) -> Self {
        Self {
            store,
            backend,
            resolver,
            files,
            output: None,
        }
    }

    pub fn with_output_storage(mut self, output: Arc<dyn OutputStorage>) -> Self {
        self.output = Some(output);
        self
    }

    /// Main entry point called from the Pub/Sub message handler.
    #[instrument(skip(self, req), fields(form_id = req.form_id, sample = req.sample))]
    pub async fn process(&self, req: &FillRequest) -> Result<FilledPdf> {
        // 1. Load the form and its fields
        let form = self
            .store
            .load_form(req.form_id)
            .await?
            .ok_or(FillPdfError::FormNotFound(req.form_id))?;
        let fields = self.store.load_fields(req.form_id).await?;

        // 2. Load the template
        let template = self
            .files
            .read(&FileRef::new(&form.template_uri))
            .map_err(|_| FillPdfError::TemplateNotFound(form.template_uri.clone()))?;

        // 3. Resolve every field
        let mappings = self.resolve_fields(&form, &fields, &req.entities, req.sample);

        // 4. Fill through the backend. Details stay in the logs.
        let options = FillOptions {
            flatten: req.flatten,
        };
        let data = match self.backend.fill(&template, &mappings, &options).await {
            Ok(data) => data,
            Err(e) => {
                error!(
                    form_id = req.form_id,
                    entities = ?entity_references(&req.entities),
                    backend = self.backend.name(),
                    error = %e,
                    "PDF backend failed to fill form"
                );
                return Err(FillPdfError::FillFailed);
            }
        };

        let filename = self.output_filename(&form, &req.entities);
        let sha256 = sha256_hex(&data);

        // 5. Keep a copy when the form asks for it
        let stored = if form.destination_path.trim().is_empty() || req.sample {
            None
        } else {
            self.store_output(&form, &filename, &data).await
        };

        info!(
            form_id = req.form_id,
            filename = %filename,
            fields = mappings.len(),
            size_bytes = data.len(),
            stored = stored.is_some(),
            "Filled PDF generated"
        );

        Ok(FilledPdf {
            filename,
            data,
            sha256,
            stored,
        })
    }

    /// One mapping per field with a template. Sample fills show each
    /// field's own key instead.
    pub fn resolve_fields(
        &self,
        form: &Form,
        fields: &[FormField],
        entities: &EntityContext,
        sample: bool,
    ) -> BTreeMap<String, FieldMapping> {
        let mut mappings = BTreeMap::new();
        for field in fields {
            if sample {
                mappings.insert(
                    field.pdf_key.clone(),
                    FieldMapping::text(format!("<{}>", field.pdf_key)),
                );
                continue;
            }
            if field.value.is_empty() {
                continue;
            }

            let replacements = if field.replacements.is_empty() {
                form.replacements.clone()
            } else {
                field.replacements.clone()
            };
            let options = ResolveOptions::new()
                .with_content(field.field_type.content_kind())
                .with_replacements(replacements)
                .with_affixes(field.prefix.clone(), field.suffix.clone());

            let mapping = self.resolver.resolve(&field.value, entities, &options);
            mappings.insert(field.pdf_key.clone(), mapping);
        }
        mappings
    }

    /// The form title run through the resolver, reduced to a safe file name.
    pub fn output_filename(&self, form: &Form, entities: &EntityContext) -> String {
        let options = ResolveOptions::new().with_content(ContentKind::Text);
        let title = self
            .resolver
            .resolve(&form.title, entities, &options)
            .as_text()
            .map(str::to_string)
            .unwrap_or_default();
        format!("{}.pdf", sanitize_file_stem(&title))
    }

    async fn store_output(&self, form: &Form, filename: &str, data: &[u8]) -> Option<StoredFile> {
        let Some(output) = &self.output else {
            warn!(
                form_id = ?form.id,
                "Form has a destination path but no output storage is configured"
            );
            return None;
        };

        let path = output_path(&form.scheme, &form.destination_path, filename);
        match output.store(&path, PDF_CONTENT_TYPE, data).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                error!(form_id = ?form.id, path = %path, error = %format!("{e:#}"), "Failed to store filled PDF");
                None
            }
        }
    }
}

fn entity_references(entities: &EntityContext) -> Vec<String> {
    let mut refs: Vec<String> = entities.values().flatten().map(|e| e.reference()).collect();
    refs.sort();
    refs
}

fn sanitize_file_stem(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    for c in title.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            stem.push(c);
        } else if !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stems_are_sanitized() {
        assert_eq!(sanitize_file_stem("Invoice: Hello & bye!"), "Invoice_Hello_bye");
        assert_eq!(sanitize_file_stem("  "), "document");
        assert_eq!(sanitize_file_stem("a-b_c"), "a-b_c");
    }
}
