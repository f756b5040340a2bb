use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// WhatsApp transport a message arrived on (and must be answered through).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Meta,
    Evolution,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Meta => "meta",
            Provider::Evolution => "evolution",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "meta" | "cloud" | "cloud_api" => Ok(Provider::Meta),
            "evolution" | "baileys" => Ok(Provider::Evolution),
            other => Err(anyhow::anyhow!("unknown WhatsApp provider: {}", other)),
        }
    }
}

/// Provider-agnostic inbound text message. This is the only shape the pipeline
/// sees after the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub provider: Provider,
    /// Sender phone, digits only.
    pub from: String,
    pub text: String,
    /// Provider-native id, used as the dedup key.
    pub message_id: String,
    /// Evolution instance name; `None` for Meta.
    pub instance_hint: Option<String>,
    /// Meta `metadata.phone_number_id` of the receiving business number.
    pub phone_number_id: Option<String>,
    pub push_name: Option<String>,
}
