// ============================================================================
// SHARED SERVICES
// ============================================================================
pub mod conversation_store;
pub mod kv_store;
pub mod llm_service;
pub mod redis_service;
pub mod whatsapp_service;

pub use conversation_store::ConversationStore;
pub use kv_store::{KeyValueStore, MemoryStore, StoreError};
pub use llm_service::{ChatMessage, ChatRole, CompletionRequest, LanguageModel, LlmError, OpenRouterClient};
pub use redis_service::RedisService;
pub use whatsapp_service::{DispatchError, WhatsAppDispatcher};
