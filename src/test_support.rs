//! In-memory application state for unit tests.

use shared::config::Config;
use std::sync::Arc;

use crate::db::{BookingRepository, InMemoryBookingRepository, InMemoryTenantRepository};
use crate::processing::availability::AvailabilityService;
use crate::services::{MemoryStore, OpenRouterClient};
use crate::state::{AppState, Backends};

pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.whatsapp.verify_token = "verify-me".to_string();
    config.app.admin_secret = Some("admin-secret".to_string());
    config
}

/// State on in-memory repositories with an unconfigured model.
pub(crate) fn in_memory_state() -> AppState {
    let config = test_config();
    let http_client = reqwest::Client::new();
    let bookings: Arc<dyn BookingRepository> = Arc::new(InMemoryBookingRepository::new());

    AppState::from_backends(
        config,
        http_client.clone(),
        Backends {
            kv_store: Arc::new(MemoryStore::new()),
            tenants: Arc::new(InMemoryTenantRepository::new()),
            availability: AvailabilityService::new(bookings.clone()),
            bookings,
            llm: Arc::new(OpenRouterClient::new(
                http_client,
                String::new(),
                "test-model".to_string(),
                "http://127.0.0.1:9".to_string(),
            )),
        },
    )
}
