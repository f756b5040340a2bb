pub mod deduplication;
pub mod handlers;
pub mod normalizer;
pub mod routes;
pub mod signature;
pub mod stats;

pub use deduplication::{DeduplicationStats, MessageDeduplicator};
pub use handlers::{get_webhook, post_webhook};
pub use normalizer::{normalize, ProviderPayload, SkipReason};
pub use routes::create_webhook_router;
pub use stats::{get_webhook_stats, WebhookStats};
