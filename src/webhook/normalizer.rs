//! Provider payload normalization.
//!
//! Webhook bodies are classified by shape before any typed decoding, so an
//! Evolution body can never be read as a Meta one or the other way round.
//! Downstream code only ever sees [`InboundMessage`].

use serde_json::Value;

use crate::models::whatsapp::{EvolutionMessageData, EvolutionWebhookPayload, MetaWebhookPayload};
use crate::models::{InboundMessage, Provider};
use shared::utils::{digits_only, normalize_jid};

const EVOLUTION_MESSAGE_EVENT: &str = "messages.upsert";

/// Inbound webhook body, tagged by provider shape.
#[derive(Debug, Clone)]
pub enum ProviderPayload {
    Evolution(EvolutionWebhookPayload),
    Meta(MetaWebhookPayload),
    Unrecognized,
}

impl ProviderPayload {
    pub fn provider(&self) -> Option<Provider> {
        match self {
            ProviderPayload::Evolution(_) => Some(Provider::Evolution),
            ProviderPayload::Meta(_) => Some(Provider::Meta),
            ProviderPayload::Unrecognized => None,
        }
    }
}

/// Why a recognized payload produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unrecognized,
    Malformed,
    IgnoredEvent,
    FromMe,
    GroupMessage,
    NoMessage,
    NoText,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unrecognized => "unrecognized",
            SkipReason::Malformed => "malformed",
            SkipReason::IgnoredEvent => "ignored_event",
            SkipReason::FromMe => "from_me",
            SkipReason::GroupMessage => "group_message",
            SkipReason::NoMessage => "no_message",
            SkipReason::NoText => "no_text",
        }
    }
}

fn has_keys(value: &Value, keys: &[&str]) -> bool {
    value
        .as_object()
        .is_some_and(|obj| keys.iter().all(|k| obj.contains_key(*k)))
}

pub fn is_evolution_shape(value: &Value) -> bool {
    has_keys(value, &["event", "instance", "data"])
}

pub fn is_meta_shape(value: &Value) -> bool {
    has_keys(value, &["object", "entry"])
}

/// Classify by structure, then decode into the matching typed payload.
pub fn classify(value: &Value) -> Result<ProviderPayload, SkipReason> {
    if is_evolution_shape(value) {
        serde_json::from_value(value.clone())
            .map(ProviderPayload::Evolution)
            .map_err(|_| SkipReason::Malformed)
    } else if is_meta_shape(value) {
        serde_json::from_value(value.clone())
            .map(ProviderPayload::Meta)
            .map_err(|_| SkipReason::Malformed)
    } else {
        Ok(ProviderPayload::Unrecognized)
    }
}

/// Evolution sends `messages.upsert`; some deployments use `MESSAGES_UPSERT`.
fn is_message_event(event: &str) -> bool {
    event.replace('_', ".").eq_ignore_ascii_case(EVOLUTION_MESSAGE_EVENT)
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

fn normalize_evolution(payload: &EvolutionWebhookPayload) -> Result<InboundMessage, SkipReason> {
    if !is_message_event(&payload.event) {
        return Err(SkipReason::IgnoredEvent);
    }

    let data: EvolutionMessageData =
        serde_json::from_value(payload.data.clone()).map_err(|_| SkipReason::Malformed)?;

    if data.key.from_me {
        return Err(SkipReason::FromMe);
    }
    if data.key.remote_jid.ends_with("@g.us") {
        return Err(SkipReason::GroupMessage);
    }

    let content = data.message.unwrap_or_default();
    let text = non_empty(content.conversation.as_deref())
        .or_else(|| {
            non_empty(
                content
                    .extended_text_message
                    .as_ref()
                    .and_then(|m| m.text.as_deref()),
            )
        })
        .ok_or(SkipReason::NoText)?;

    let from = normalize_jid(&data.key.remote_jid);
    if from.is_empty() || data.key.id.is_empty() {
        return Err(SkipReason::Malformed);
    }

    Ok(InboundMessage {
        provider: Provider::Evolution,
        from,
        text,
        message_id: data.key.id,
        instance_hint: Some(payload.instance.clone()).filter(|i| !i.is_empty()),
        phone_number_id: None,
        push_name: non_empty(data.push_name.as_deref()),
    })
}

fn normalize_meta(payload: &MetaWebhookPayload) -> Result<InboundMessage, SkipReason> {
    let value = payload
        .entry
        .first()
        .and_then(|e| e.changes.first())
        .map(|c| &c.value)
        .ok_or(SkipReason::NoMessage)?;
    // Status callbacks (sent, delivered, read) carry no messages.
    let message = value.messages.first().ok_or(SkipReason::NoMessage)?;

    let text = non_empty(message.text.as_ref().map(|t| t.body.as_str())).ok_or(SkipReason::NoText)?;
    let from = digits_only(&message.from);
    if from.is_empty() || message.id.is_empty() {
        return Err(SkipReason::Malformed);
    }

    Ok(InboundMessage {
        provider: Provider::Meta,
        from,
        text,
        message_id: message.id.clone(),
        instance_hint: None,
        phone_number_id: value
            .metadata
            .as_ref()
            .map(|m| m.phone_number_id.clone())
            .filter(|id| !id.is_empty()),
        push_name: non_empty(value.contacts.first().map(|c| c.profile.name.as_str())),
    })
}

/// Reduce any webhook body to at most one inbound text message.
pub fn normalize(value: &Value) -> Result<InboundMessage, SkipReason> {
    match classify(value)? {
        ProviderPayload::Evolution(payload) => normalize_evolution(&payload),
        ProviderPayload::Meta(payload) => normalize_meta(&payload),
        ProviderPayload::Unrecognized => Err(SkipReason::Unrecognized),
    }
}
