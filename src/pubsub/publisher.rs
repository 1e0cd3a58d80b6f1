// fillpdf-service/src/pubsub/publisher.rs

use std::collections::HashMap;

use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::Client;
use google_cloud_pubsub::publisher::Publisher as PubSubPublisher;
use tracing::{error, info};

use crate::error::Result;
use crate::models::{ServiceResponse, ServiceResult};

/// Sends every handled request's response to the response topic.
pub struct Publisher {
    publisher: PubSubPublisher,
    topic_name: String,
}

impl Publisher {
    pub fn new(client: &Client, project_id: &str, topic_name: &str) -> Self {
        let publisher = client.topic(topic_name).new_publisher(None);
        info!(project_id = %project_id, topic = %topic_name, "Publisher initialized");
        Self {
            publisher,
            topic_name: topic_name.to_string(),
        }
    }

    pub async fn publish_response(&self, response: &ServiceResponse) {
        let message = match response_message(response) {
            Ok(message) => message,
            Err(e) => {
                error!(request_id = %response.request_id, error = %e, "Failed to serialize response");
                return;
            }
        };

        match self.publisher.publish(message).await.get().await {
            Ok(message_id) => info!(
                request_id = %response.request_id,
                message_id = %message_id,
                topic = %self.topic_name,
                "Response published"
            ),
            Err(e) => error!(
                request_id = %response.request_id,
                topic = %self.topic_name,
                error = %e,
                "Failed to publish response"
            ),
        }
    }
}

/// Subscribers filter on `kind` and `form_id` without decoding the body.
/// Failed requests carry their `error_type` as the kind.
pub fn response_message(response: &ServiceResponse) -> Result<PubsubMessage> {
    let mut attributes = HashMap::from([
        ("request_id".to_string(), response.request_id.clone()),
        ("status".to_string(), response.status.clone()),
    ]);

    let kind = match (&response.result, &response.error_type) {
        (Some(result), _) => result_kind(result),
        (None, Some(error_type)) => error_type.as_str(),
        (None, None) => "unknown",
    };
    attributes.insert("kind".to_string(), kind.to_string());

    if let Some(form_id) = response.result.as_ref().and_then(result_form_id) {
        attributes.insert("form_id".to_string(), form_id.to_string());
    }

    Ok(PubsubMessage {
        data: serde_json::to_vec(response)?,
        attributes,
        ..Default::default()
    })
}

fn result_kind(result: &ServiceResult) -> &'static str {
    match result {
        ServiceResult::Filled(_) => "filled",
        ServiceResult::FormCreated { .. } => "form_created",
        ServiceResult::TemplateReplaced { .. } => "template_replaced",
        ServiceResult::Exported { .. } => "exported",
        ServiceResult::Imported { .. } => "imported",
        ServiceResult::FormDeleted { .. } => "form_deleted",
    }
}

fn result_form_id(result: &ServiceResult) -> Option<i64> {
    match result {
        ServiceResult::FormCreated { form_id, .. }
        | ServiceResult::TemplateReplaced { form_id, .. }
        | ServiceResult::Imported { form_id, .. }
        | ServiceResult::FormDeleted { form_id } => Some(*form_id),
        ServiceResult::Filled(_) | ServiceResult::Exported { .. } => None,
    }
}
