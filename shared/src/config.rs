//! Configuration management for the booking services

use serde::{Deserialize, Serialize};
use std::env;

/// Default sliding-window size for conversation memory.
pub const DEFAULT_CONVERSATION_MAX_TURNS: usize = 20;
/// Conversation memory expires 24h after the last write.
pub const DEFAULT_CONVERSATION_TTL_SECONDS: u64 = 60 * 60 * 24;
/// Providers retry within minutes, so five minutes of dedup memory is enough.
pub const DEFAULT_DEDUP_TTL_SECONDS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Secret echoed back during the Meta `hub.verify_token` handshake.
    pub verify_token: String,
    /// Meta app secret; when set, `X-Hub-Signature-256` is verified.
    pub app_secret: Option<String>,
    pub graph_api_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentClassifierMode {
    Keywords,
    Llm,
}

impl std::str::FromStr for IntentClassifierMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keywords" | "keyword" | "rules" => Ok(Self::Keywords),
            "llm" | "model" => Ok(Self::Llm),
            other => Err(anyhow::anyhow!("unknown INTENT_CLASSIFIER value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub intent_classifier: IntentClassifierMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub max_turns: usize,
    pub ttl_seconds: u64,
    pub dedup_ttl_seconds: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_CONVERSATION_MAX_TURNS,
            ttl_seconds: DEFAULT_CONVERSATION_TTL_SECONDS,
            dedup_ttl_seconds: DEFAULT_DEDUP_TTL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
    pub port: u16,
    pub admin_secret: Option<String>,
    pub default_timezone: String,
    pub request_timeout_seconds: u64,
}

impl Default for Config {
    /// Local defaults matching `from_env` with no variables set.
    fn default() -> Self {
        Config {
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 20,
                min_connections: 2,
                acquire_timeout_seconds: 5,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
            },
            whatsapp: WhatsAppConfig {
                verify_token: String::new(),
                app_secret: None,
                graph_api_base_url: "https://graph.facebook.com/v18.0".to_string(),
            },
            llm: LlmConfig {
                api_key: String::new(),
                model: "google/gemini-2.0-flash-001".to_string(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                timeout_seconds: 30,
                intent_classifier: IntentClassifierMode::Keywords,
            },
            conversation: ConversationConfig::default(),
            app: AppConfig {
                environment: "development".to_string(),
                log_level: "info".to_string(),
                port: 8000,
                admin_secret: None,
                default_timezone: "Europe/Dublin".to_string(),
                request_timeout_seconds: 30,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|e| anyhow::anyhow!("DATABASE_URL must be set: {}", e))?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()?,
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()?,
                acquire_timeout_seconds: env::var("DATABASE_ACQUIRE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            whatsapp: WhatsAppConfig {
                verify_token: env::var("VERIFY_TOKEN").unwrap_or_default(),
                app_secret: env::var("META_APP_SECRET").ok().filter(|s| !s.is_empty()),
                graph_api_base_url: env::var("WHATSAPP_API_BASE_URL")
                    .unwrap_or_else(|_| "https://graph.facebook.com/v18.0".to_string()),
            },
            llm: LlmConfig {
                api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                model: env::var("OPENROUTER_MODEL")
                    .unwrap_or_else(|_| "google/gemini-2.0-flash-001".to_string()),
                base_url: env::var("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
                timeout_seconds: env::var("OPENROUTER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
                intent_classifier: env::var("INTENT_CLASSIFIER")
                    .unwrap_or_else(|_| "keywords".to_string())
                    .parse()?,
            },
            conversation: ConversationConfig {
                max_turns: env::var("CONVERSATION_MAX_TURNS")
                    .unwrap_or_else(|_| DEFAULT_CONVERSATION_MAX_TURNS.to_string())
                    .parse()?,
                ttl_seconds: env::var("CONVERSATION_TTL_SECONDS")
                    .unwrap_or_else(|_| DEFAULT_CONVERSATION_TTL_SECONDS.to_string())
                    .parse()?,
                dedup_ttl_seconds: env::var("DEDUP_TTL_SECONDS")
                    .unwrap_or_else(|_| DEFAULT_DEDUP_TTL_SECONDS.to_string())
                    .parse()?,
            },
            app: AppConfig {
                environment: env::var("ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                admin_secret: env::var("ADMIN_SECRET").ok().filter(|s| !s.is_empty()),
                default_timezone: env::var("DEFAULT_TIMEZONE")
                    .unwrap_or_else(|_| "Europe/Dublin".to_string()),
                request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.app.environment == "development"
    }
}
