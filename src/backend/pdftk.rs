// fillpdf-service/src/backend/pdftk.rs

use std::collections::BTreeMap;
use std::io::Write;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::backend::xfdf::to_xfdf;
use crate::backend::{FillOptions, ParsedField, PdfBackend};
use crate::error::{FillPdfError, Result};
use crate::mapping::FieldMapping;

/// Runs the pdftk binary. Arguments go straight to the process, so nothing
/// is ever interpreted by a shell.
pub struct PdftkBackend {
    path: String,
    locale: Option<String>,
    timeout: Duration,
}

impl PdftkBackend {
    pub fn new(path: impl Into<String>, locale: Option<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            locale,
            timeout,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        if let Some(locale) = &self.locale {
            cmd.env("LC_ALL", locale);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<Output> {
        debug!("Running pdftk: {:?}", cmd);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                FillPdfError::BackendError(format!(
                    "pdftk timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| FillPdfError::BackendError(format!("Failed to run pdftk: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FillPdfError::BackendError(format!(
                "pdftk exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }
}

fn temp_file_with(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

#[async_trait]
impl PdfBackend for PdftkBackend {
    fn name(&self) -> &str {
        "pdftk"
    }

    async fn parse(&self, template: &[u8]) -> Result<Vec<ParsedField>> {
        let pdf_file = temp_file_with(template)?;

        let mut cmd = self.command();
        cmd.arg(pdf_file.path())
            .arg("dump_data_fields_utf8")
            .arg("output")
            .arg("-");

        let output = self.run(cmd).await?;
        let fields = parse_field_dump(&String::from_utf8_lossy(&output.stdout));

        info!(fields = fields.len(), "pdftk parsed template");
        Ok(fields)
    }

    async fn fill(
        &self,
        template: &[u8],
        mappings: &BTreeMap<String, FieldMapping>,
        options: &FillOptions,
    ) -> Result<Vec<u8>> {
        let mut values = BTreeMap::new();
        for (pdf_key, mapping) in mappings {
            match mapping {
                FieldMapping::Text(text) => {
                    values.insert(pdf_key.clone(), text.value().to_string());
                }
                FieldMapping::Image(_) => {
                    warn!(pdf_key = %pdf_key, "pdftk cannot place images, skipping field");
                }
            }
        }

        let pdf_file = temp_file_with(template)?;
        let xfdf_file = temp_file_with(to_xfdf(&values).as_bytes())?;

        let mut cmd = self.command();
        cmd.arg(pdf_file.path())
            .arg("fill_form")
            .arg(xfdf_file.path())
            .arg("output")
            .arg("-");
        if options.flatten {
            cmd.arg("flatten");
        } else {
            cmd.arg("need_appearances");
        }

        let output = self.run(cmd).await?;

        info!(
            fields = values.len(),
            size_kb = output.stdout.len() / 1024,
            "pdftk filled template"
        );
        Ok(output.stdout)
    }
}

/// Reads `dump_data_fields_utf8` output: records separated by `---`, one
/// `Key: value` pair per line.
pub fn parse_field_dump(dump: &str) -> Vec<ParsedField> {
    let mut fields = Vec::new();
    let mut current: Option<ParsedField> = None;

    for line in dump.lines() {
        if line.trim() == "---" {
            fields.extend(current.take());
            continue;
        }
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        match key {
            "FieldName" => {
                current.get_or_insert_with(|| ParsedField::new("", "")).name = value.to_string()
            }
            "FieldType" => {
                current.get_or_insert_with(|| ParsedField::new("", "")).field_type = value.to_string()
            }
            "FieldValue" => {
                current.get_or_insert_with(|| ParsedField::new("", "")).value = Some(value.to_string())
            }
            _ => {}
        }
    }
    fields.extend(current.take());

    fields.retain(|field| !field.name.is_empty());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "---\nFieldType: Text\nFieldName: TextField1\nFieldFlags: 0\nFieldValue: hi: there\nFieldJustification: Left\n---\nFieldType: Button\nFieldName: Check\nFieldStateOption: Off\n---\nFieldType: Text\nFieldFlags: 0\n";

    #[test]
    fn parses_records() {
        let fields = parse_field_dump(DUMP);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "TextField1");
        assert_eq!(fields[0].field_type, "Text");
        assert_eq!(fields[0].value.as_deref(), Some("hi: there"));
        assert_eq!(fields[1].name, "Check");
        assert_eq!(fields[1].field_type, "Button");
        assert_eq!(fields[1].value, None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_backend_error() {
        let backend = PdftkBackend::new(
            "/nonexistent/pdftk-binary",
            Some("C.UTF-8".into()),
            Duration::from_secs(5),
        );
        let err = backend.parse(b"%PDF-1.4").await.unwrap_err();
        assert!(matches!(err, FillPdfError::BackendError(_)));
    }
}
