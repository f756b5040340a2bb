use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::inbound::Provider;

/// Credentials needed to answer through the tenant's provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderCredentials {
    Meta {
        phone_number_id: String,
        access_token: String,
    },
    Evolution {
        api_url: String,
        api_key: String,
        instance_name: String,
    },
}

impl ProviderCredentials {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderCredentials::Meta { .. } => Provider::Meta,
            ProviderCredentials::Evolution { .. } => Provider::Evolution,
        }
    }
}

/// Active WhatsApp configuration of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantWhatsAppConfig {
    pub id: Uuid,
    /// Owning professional; every other tenant lookup is keyed by this.
    pub user_id: Uuid,
    pub is_active: bool,
    pub credentials: ProviderCredentials,
}

impl TenantWhatsAppConfig {
    pub fn provider(&self) -> Provider {
        self.credentials.provider()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub name: Option<String>,
    pub phone: String,
    pub use_bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotPersonality {
    #[default]
    Friendly,
    Professional,
    Casual,
}

impl BotPersonality {
    /// Lenient parse for values stored by the dashboard; unknown values keep the default.
    pub fn from_db(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("professional") => BotPersonality::Professional,
            Some("casual") => BotPersonality::Casual,
            _ => BotPersonality::Friendly,
        }
    }
}

/// Per-tenant bot behavior, as configured in the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_name: Option<String>,
    pub personality: BotPersonality,
    pub auto_book_if_available: bool,
    pub always_confirm_booking: bool,
    pub ask_for_additional_info: bool,
    pub greeting_message: Option<String>,
    pub unavailable_message: Option<String>,
    pub confirmation_message: Option<String>,
    pub custom_system_prompt: Option<String>,
    pub max_context_messages: Option<usize>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: None,
            personality: BotPersonality::Friendly,
            auto_book_if_available: true,
            always_confirm_booking: false,
            ask_for_additional_info: false,
            greeting_message: None,
            unavailable_message: None,
            confirmation_message: None,
            custom_system_prompt: None,
            max_context_messages: None,
        }
    }
}

/// The tenant's `professionals` row. Services, hours, blocked dates, contacts and
/// bookings all hang off `professional_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub professional_id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    /// IANA zone name; `None` falls back to the configured default.
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price: Option<Decimal>,
}
