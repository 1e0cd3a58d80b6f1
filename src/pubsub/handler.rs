// fillpdf-service/src/pubsub/handler.rs

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use tracing::{error, info};

use crate::error::{FillPdfError, Result};
use crate::models::{FilledDocument, ServiceRequest, ServiceResponse, ServiceResult};
use crate::persistence::FormStore;
use crate::pipeline::FillPipeline;
use crate::serializer::Serializer;
use crate::template::TemplateManager;

pub struct MessageHandler {
    pipeline: FillPipeline,
    serializer: Serializer,
    templates: TemplateManager,
    store: Arc<dyn FormStore>,
}

impl MessageHandler {
    pub fn new(
        pipeline: FillPipeline,
        serializer: Serializer,
        templates: TemplateManager,
        store: Arc<dyn FormStore>,
    ) -> Self {
        Self {
            pipeline,
            serializer,
            templates,
            store,
        }
    }

    pub async fn handle_message(&self, data: &[u8]) -> ServiceResponse {
        let request_id = uuid::Uuid::new_v4().to_string();

        // Parse the request
        let request: ServiceRequest = match serde_json::from_slice(data) {
            Ok(req) => req,
            Err(e) => {
                error!(request_id = %request_id, "Failed to parse request: {}", e);
                return ServiceResponse::error(
                    request_id,
                    format!("Invalid request format: {}", e),
                    "invalid_request".to_string(),
                );
            }
        };

        info!(
            request_id = %request_id,
            action = action_name(&request),
            "Processing request"
        );

        match self.dispatch(request).await {
            Ok(result) => {
                info!(request_id = %request_id, "Request completed");
                ServiceResponse::success(request_id, result)
            }
            Err(e) => {
                error!(request_id = %request_id, error = %e, "Request failed");
                let response = e.to_error_response();
                ServiceResponse::error(request_id, response.error, response.error_type)
            }
        }
    }

    async fn dispatch(&self, request: ServiceRequest) -> Result<ServiceResult> {
        match request {
            ServiceRequest::Fill(fill) => {
                let filled = self.pipeline.process(&fill).await?;
                let (stored_path, download_url) = match filled.stored {
                    Some(stored) => (Some(stored.path), stored.download_url),
                    None => (None, None),
                };
                Ok(ServiceResult::Filled(FilledDocument {
                    filename: filled.filename,
                    content_base64: general_purpose::STANDARD.encode(&filled.data),
                    size_bytes: filled.data.len(),
                    sha256: filled.sha256,
                    stored_path,
                    download_url,
                }))
            }
            ServiceRequest::CreateForm {
                template_uri,
                title,
            } => {
                let (form, fields) = self.templates.create_form(&template_uri, title).await?;
                Ok(ServiceResult::FormCreated {
                    form_id: form.id.unwrap_or_default(),
                    pdf_keys: fields.into_iter().map(|f| f.pdf_key).collect(),
                })
            }
            ServiceRequest::ReplaceTemplate {
                form_id,
                template_uri,
            } => {
                let replaced = self.templates.replace_template(form_id, &template_uri).await?;
                Ok(ServiceResult::TemplateReplaced {
                    form_id,
                    vanished_keys: replaced.vanished_keys,
                })
            }
            ServiceRequest::Export { form_id } => {
                let code = self.serializer.export(form_id).await?;
                Ok(ServiceResult::Exported { code })
            }
            ServiceRequest::Import { form_id, code } => {
                let outcome = self.serializer.import(form_id, &code).await?;
                Ok(ServiceResult::Imported {
                    form_id,
                    unmatched_keys: outcome.unmatched_keys,
                })
            }
            ServiceRequest::DeleteForm { form_id } => {
                if !self.store.delete_form(form_id).await? {
                    return Err(FillPdfError::FormNotFound(form_id));
                }
                info!(form_id, "Deleted form and its fields");
                Ok(ServiceResult::FormDeleted { form_id })
            }
        }
    }
}

fn action_name(request: &ServiceRequest) -> &'static str {
    match request {
        ServiceRequest::Fill(_) => "fill",
        ServiceRequest::CreateForm { .. } => "create_form",
        ServiceRequest::ReplaceTemplate { .. } => "replace_template",
        ServiceRequest::Export { .. } => "export",
        ServiceRequest::Import { .. } => "import",
        ServiceRequest::DeleteForm { .. } => "delete_form",
    }
}
