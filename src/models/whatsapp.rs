use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookVerification {
    #[serde(rename = "hub.mode")]
    pub hub_mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
}

// ============================================================================
// META CLOUD API (inbound)
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Text {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Message {
    pub from: String,
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub text: Option<Text>,
    #[serde(rename = "type", default)]
    pub message_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Contact {
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub wa_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Value {
    #[serde(default)]
    pub messaging_product: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Change {
    pub value: Value,
    #[serde(default)]
    pub field: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetaWebhookPayload {
    pub object: String,
    pub entry: Vec<Entry>,
}

// ============================================================================
// EVOLUTION API (inbound)
// ============================================================================

/// Envelope every Evolution webhook shares. `data` depends on `event`, so it is
/// only decoded further once the event is known to be `messages.upsert`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvolutionWebhookPayload {
    pub event: String,
    pub instance: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvolutionMessageKey {
    #[serde(rename = "remoteJid")]
    pub remote_jid: String,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtendedTextMessage {
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EvolutionMessageContent {
    pub conversation: Option<String>,
    #[serde(rename = "extendedTextMessage")]
    pub extended_text_message: Option<ExtendedTextMessage>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvolutionMessageData {
    pub key: EvolutionMessageKey,
    #[serde(rename = "pushName", default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message: Option<EvolutionMessageContent>,
}

// ============================================================================
// OUTBOUND REQUESTS
// ============================================================================

#[derive(Debug, Serialize, Clone)]
pub struct TextMessageRequest {
    pub messaging_product: String,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Text,
}

#[derive(Debug, Serialize, Clone)]
pub struct MarkAsReadRequest {
    pub messaging_product: String,
    pub status: String,
    pub message_id: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct EvolutionSendTextRequest {
    pub number: String,
    pub text: String,
}
