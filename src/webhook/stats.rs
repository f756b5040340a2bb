use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;
use crate::webhook::DeduplicationStats;

/// Webhook statistics for monitoring; counters are per instance.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookStats {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub message_deduplication: DeduplicationStats,
    pub conversation: ConversationSettings,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationSettings {
    pub max_turns: usize,
    pub ttl_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemInfo {
    pub service_name: String,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
}

/// GET /webhook-stats
pub async fn get_webhook_stats(State(state): State<Arc<AppState>>) -> Json<WebhookStats> {
    Json(collect_webhook_stats(&state))
}

fn collect_webhook_stats(state: &AppState) -> WebhookStats {
    WebhookStats {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        message_deduplication: state.message_deduplicator.get_stats(),
        conversation: ConversationSettings {
            max_turns: state.conversations.max_turns(),
            ttl_seconds: state.config.conversation.ttl_seconds,
        },
        system_info: SystemInfo {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: state.config.app.environment.clone(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::in_memory_state;

    #[tokio::test]
    async fn test_stats_reflect_dedup_counters() {
        let state = in_memory_state();
        assert!(state.message_deduplicator.try_claim("stats-1").await);
        assert!(!state.message_deduplicator.try_claim("stats-1").await);

        let stats = collect_webhook_stats(&state);
        assert_eq!(stats.message_deduplication.claimed, 1);
        assert_eq!(stats.message_deduplication.duplicates, 1);
        assert_eq!(stats.conversation.max_turns, 20);

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("message_deduplication"));
    }
}
