//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fillpdf_service::backend::{FillOptions, ParsedField, PdfBackend};
use fillpdf_service::config::TokensConfig;
use fillpdf_service::entity::LocalFileAccessor;
use fillpdf_service::error::{FillPdfError, Result};
use fillpdf_service::mapping::FieldMapping;
use fillpdf_service::models::{Form, FormField};
use fillpdf_service::persistence::{FormStore, MemoryFormStore};
use fillpdf_service::pipeline::FillPipeline;
use fillpdf_service::serializer::Serializer;
use fillpdf_service::template::TemplateManager;
use fillpdf_service::token::TokenResolver;
use tempfile::TempDir;

/// Backend that parses by looking up the template bytes and records fills.
#[derive(Default)]
pub struct ScriptedBackend {
    layouts: Mutex<BTreeMap<Vec<u8>, Vec<ParsedField>>>,
    fills: Mutex<Vec<(BTreeMap<String, FieldMapping>, FillOptions)>>,
    fail_fill: bool,
    fail_parse: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_fill: true,
            ..Self::default()
        }
    }

    pub fn failing_parse() -> Self {
        Self {
            fail_parse: true,
            ..Self::default()
        }
    }

    pub fn layout(&self, template: &[u8], fields: &[(&str, &str)]) {
        let parsed = fields
            .iter()
            .map(|(name, kind)| ParsedField::new(*name, *kind))
            .collect();
        self.layouts.lock().unwrap().insert(template.to_vec(), parsed);
    }

    pub fn fills(&self) -> Vec<(BTreeMap<String, FieldMapping>, FillOptions)> {
        self.fills.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn parse(&self, template: &[u8]) -> Result<Vec<ParsedField>> {
        if self.fail_parse {
            return Err(FillPdfError::BackendError(
                "pdftk exited with 1: java.lang.NullPointerException at pdftk.main /usr/bin/pdftk".into(),
            ));
        }
        Ok(self
            .layouts
            .lock()
            .unwrap()
            .get(template)
            .cloned()
            .unwrap_or_default())
    }

    async fn fill(
        &self,
        template: &[u8],
        mappings: &BTreeMap<String, FieldMapping>,
        options: &FillOptions,
    ) -> Result<Vec<u8>> {
        if self.fail_fill {
            return Err(FillPdfError::BackendError(
                "pdftk exited with 1: Error: Unexpected Exception in open_reader()".into(),
            ));
        }
        self.fills
            .lock()
            .unwrap()
            .push((mappings.clone(), *options));
        let mut out = b"FILLED:".to_vec();
        out.extend_from_slice(template);
        Ok(out)
    }
}

/// Memory store whose writes start failing after a number of field inserts,
/// and whose bulk field replacement always fails as a rolled back
/// transaction would.
pub struct FailingStore {
    pub inner: MemoryFormStore,
    inserts_left: Mutex<usize>,
}

impl FailingStore {
    pub fn new(inner: MemoryFormStore, inserts_allowed: usize) -> Self {
        Self {
            inner,
            inserts_left: Mutex::new(inserts_allowed),
        }
    }
}

#[async_trait]
impl FormStore for FailingStore {
    async fn load_form(&self, id: i64) -> anyhow::Result<Option<Form>> {
        self.inner.load_form(id).await
    }

    async fn insert_form(&self, form: &Form) -> anyhow::Result<Form> {
        self.inner.insert_form(form).await
    }

    async fn save_form(&self, form: &Form) -> anyhow::Result<Form> {
        self.inner.save_form(form).await
    }

    async fn delete_form(&self, id: i64) -> anyhow::Result<bool> {
        self.inner.delete_form(id).await
    }

    async fn load_fields(&self, form_id: i64) -> anyhow::Result<Vec<FormField>> {
        self.inner.load_fields(form_id).await
    }

    async fn insert_field(&self, form_id: i64, field: &FormField) -> anyhow::Result<FormField> {
        {
            let mut left = self.inserts_left.lock().unwrap();
            anyhow::ensure!(*left > 0, "connection reset while inserting {}", field.pdf_key);
            *left -= 1;
        }
        self.inner.insert_field(form_id, field).await
    }

    async fn save_field(&self, field: &FormField) -> anyhow::Result<FormField> {
        self.inner.save_field(field).await
    }

    async fn replace_fields(
        &self,
        _form: &Form,
        _fields: &[FormField],
    ) -> anyhow::Result<(Form, Vec<FormField>)> {
        anyhow::bail!("connection reset during field replacement")
    }
}

pub fn site() -> TokensConfig {
    TokensConfig {
        site_name: "Example".into(),
        site_mail: "admin@example.com".into(),
        site_url: "https://example.com".into(),
        site_slogan: String::new(),
    }
}

/// Everything a test needs, rooted in a temporary files directory that
/// serves as both `public://` and `private://`.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryFormStore>,
    pub backend: Arc<ScriptedBackend>,
    pub files: Arc<LocalFileAccessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(ScriptedBackend::new())
    }

    pub fn with_backend(backend: ScriptedBackend) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let files = Arc::new(LocalFileAccessor::new(dir.path(), dir.path()));
        Self {
            dir,
            store: Arc::new(MemoryFormStore::new()),
            backend: Arc::new(backend),
            files,
        }
    }

    pub fn write_file(&self, name: &str, bytes: &[u8]) -> String {
        std::fs::write(self.dir.path().join(name), bytes).unwrap();
        format!("public://{name}")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn resolver(&self) -> TokenResolver {
        TokenResolver::standard(self.files.clone(), site())
    }

    pub fn templates(&self) -> TemplateManager {
        TemplateManager::new(self.store.clone(), self.backend.clone(), self.files.clone())
    }

    pub fn serializer(&self) -> Serializer {
        Serializer::new(self.store.clone())
    }

    pub fn pipeline(&self) -> FillPipeline {
        FillPipeline::new(
            self.store.clone(),
            self.backend.clone(),
            self.resolver(),
            self.files.clone(),
        )
    }
}
