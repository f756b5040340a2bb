// ============================================================================
// WHATSAPP OUTBOUND DISPATCHER
// ============================================================================
// Purpose: Send replies through the provider a message arrived on
//          (Meta Cloud API or an Evolution instance)
// ============================================================================

use tracing::{error, info, warn};

use crate::models::whatsapp::{EvolutionSendTextRequest, MarkAsReadRequest, Text, TextMessageRequest};
use crate::models::ProviderCredentials;
use crate::observability::record_outbound_message;
use shared::utils::digits_only;

/// WhatsApp rejects text bodies past 4096 characters; stay under it.
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[derive(Clone)]
pub struct WhatsAppDispatcher {
    http_client: reqwest::Client,
    graph_api_base_url: String,
}

impl WhatsAppDispatcher {
    pub fn new(http_client: reqwest::Client, graph_api_base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            graph_api_base_url: graph_api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send `message` to `to` with the tenant's credentials.
    ///
    /// Long messages go out as several consecutive chunks. The first failing chunk
    /// aborts the rest; nothing is retried.
    pub async fn send(
        &self,
        credentials: &ProviderCredentials,
        to: &str,
        message: &str,
    ) -> Result<(), DispatchError> {
        let number = digits_only(to);
        if number.is_empty() {
            return Err(DispatchError::InvalidRecipient(to.to_string()));
        }

        let provider = credentials.provider();
        for chunk in split_message(message, MAX_MESSAGE_CHARS) {
            let result = match credentials {
                ProviderCredentials::Meta { phone_number_id, access_token } => {
                    self.send_meta_text(phone_number_id, access_token, &number, &chunk).await
                }
                ProviderCredentials::Evolution { api_url, api_key, instance_name } => {
                    self.send_evolution_text(api_url, api_key, instance_name, &number, &chunk).await
                }
            };

            match result {
                Ok(()) => record_outbound_message(provider.as_str(), "sent"),
                Err(e) => {
                    record_outbound_message(provider.as_str(), "failed");
                    error!(provider = %provider, to = %number, error = %e, "❌ Failed to send WhatsApp message");
                    return Err(e);
                }
            }
        }

        info!(provider = %provider, to = %number, "📤 Reply sent");
        Ok(())
    }

    /// Meta read receipt for an inbound message. Evolution has no equivalent call.
    pub async fn mark_as_read(
        &self,
        credentials: &ProviderCredentials,
        message_id: &str,
    ) -> Result<(), DispatchError> {
        let ProviderCredentials::Meta { phone_number_id, access_token } = credentials else {
            return Ok(());
        };

        let request_body = MarkAsReadRequest {
            messaging_product: "whatsapp".to_string(),
            status: "read".to_string(),
            message_id: message_id.to_string(),
        };

        let url = format!("{}/{}/messages", self.graph_api_base_url, phone_number_id);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(message_id = %message_id, status, body = %body, "⚠️ Failed to mark message as read");
            return Err(DispatchError::Rejected { status, body });
        }
        Ok(())
    }

    async fn send_meta_text(
        &self,
        phone_number_id: &str,
        access_token: &str,
        to: &str,
        body: &str,
    ) -> Result<(), DispatchError> {
        let request_body = TextMessageRequest {
            messaging_product: "whatsapp".to_string(),
            to: to.to_string(),
            message_type: "text".to_string(),
            text: Text { body: body.to_string() },
        };

        let url = format!("{}/{}/messages", self.graph_api_base_url, phone_number_id);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&request_body)
            .send()
            .await?;

        check_status(response).await
    }

    async fn send_evolution_text(
        &self,
        api_url: &str,
        api_key: &str,
        instance_name: &str,
        number: &str,
        text: &str,
    ) -> Result<(), DispatchError> {
        let request_body = EvolutionSendTextRequest {
            number: number.to_string(),
            text: text.to_string(),
        };

        let url = format!(
            "{}/message/sendText/{}",
            api_url.trim_end_matches('/'),
            instance_name
        );

        let response = self
            .http_client
            .post(&url)
            .header("apikey", api_key)
            .json(&request_body)
            .send()
            .await?;

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(DispatchError::Rejected { status: status.as_u16(), body })
}

/// Split text into chunks of at most `max_chars` characters, preferring to break
/// after a newline, then after a space.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        if rest.chars().count() <= max_chars {
            chunks.push(rest.to_string());
            break;
        }

        // Byte offset of the first character past the limit.
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..hard_end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .map(|i| i + 1)
            .unwrap_or(hard_end);

        chunks.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }

    chunks
}
