// fillpdf-service/src/error.rs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FillPdfError>;

/// Message shown to end users when the PDF backend fails. Backend details
/// only ever go to the logs.
pub const GENERIC_FILL_FAILURE: &str = "Could not generate the PDF.";

/// Same, for a backend failing to list a template's fields.
pub const GENERIC_PARSE_FAILURE: &str = "Could not read the fields of the PDF template.";

#[derive(Error, Debug)]
pub enum FillPdfError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid import code: {0}")]
    InvalidImportCode(String),

    #[error("Unsupported import version {found} (this service reads up to version {supported})")]
    UnsupportedImportVersion { found: u32, supported: u32 },

    #[error("Form not found: {0}")]
    FormNotFound(i64),

    #[error("Template file not found: {0}")]
    TemplateNotFound(String),

    #[error("PDF backend error: {0}")]
    BackendError(String),

    #[error("{}", GENERIC_FILL_FAILURE)]
    FillFailed,

    #[error("{}", GENERIC_PARSE_FAILURE)]
    ParseFailed,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Base64 decoding error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FillPdfError {
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            error_type: self.error_type().to_string(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            FillPdfError::IoError(_) => "io_error",
            FillPdfError::SerializationError(_) => "serialization_error",
            FillPdfError::InvalidImportCode(_) => "invalid_import_code",
            FillPdfError::UnsupportedImportVersion { .. } => "unsupported_import_version",
            FillPdfError::FormNotFound(_) => "form_not_found",
            FillPdfError::TemplateNotFound(_) => "template_not_found",
            FillPdfError::BackendError(_) => "backend_error",
            FillPdfError::FillFailed => "fill_failed",
            FillPdfError::ParseFailed => "parse_failed",
            FillPdfError::StorageError(_) => "storage_error",
            FillPdfError::Base64Error(_) => "base64_error",
            FillPdfError::InvalidData(_) => "invalid_data",
            FillPdfError::ConfigError(_) => "config_error",
        }
    }
}

impl From<anyhow::Error> for FillPdfError {
    fn from(err: anyhow::Error) -> Self {
        FillPdfError::StorageError(format!("{err:#}"))
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_failure_never_leaks_backend_details() {
        let response = FillPdfError::FillFailed.to_error_response();
        assert_eq!(response.error, GENERIC_FILL_FAILURE);
        assert_eq!(response.error_type, "fill_failed");

        let response = FillPdfError::ParseFailed.to_error_response();
        assert_eq!(response.error, GENERIC_PARSE_FAILURE);
        assert_eq!(response.error_type, "parse_failed");
    }

    #[test]
    fn import_errors_are_tagged() {
        let err = FillPdfError::InvalidImportCode("missing `fields`".into());
        assert_eq!(err.error_type(), "invalid_import_code");
        assert!(err.to_string().contains("missing `fields`"));
    }
}
