use reqwest::Client as ReqwestClient;
use shared::config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::{BookingRepository, PgBookingRepository, PgTenantRepository, TenantRepository};
use crate::optimization::{create_optimized_db_pool, create_redis_pool, DatabasePoolConfig};
use crate::processing::agent::BookingAgent;
use crate::processing::availability::AvailabilityService;
use crate::processing::classification::Classifier;
use crate::processing::tenant_resolver::TenantResolver;
use crate::services::{
    ConversationStore, KeyValueStore, LanguageModel, OpenRouterClient, RedisService, WhatsAppDispatcher,
};
use crate::webhook::MessageDeduplicator;

/// Storage and model backends the pipeline runs on.
///
/// Production wires PostgreSQL, Redis and OpenRouter; tests pass in-memory
/// repositories and a scripted model.
pub struct Backends {
    pub kv_store: Arc<dyn KeyValueStore>,
    pub tenants: Arc<dyn TenantRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub llm: Arc<dyn LanguageModel>,
    pub availability: AvailabilityService,
}

/// Estado compartido de la aplicación.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http_client: ReqwestClient,
    /// `None` when running on in-memory repositories.
    pub db_pool: Option<PgPool>,
    pub kv_store: Arc<dyn KeyValueStore>,
    pub tenants: Arc<dyn TenantRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub message_deduplicator: MessageDeduplicator,
    pub conversations: ConversationStore,
    pub resolver: TenantResolver,
    pub classifier: Classifier,
    pub agent: BookingAgent,
    pub dispatcher: WhatsAppDispatcher,
    pub started_at: Instant,
}

pub fn build_http_client(config: &Config) -> anyhow::Result<ReqwestClient> {
    ReqwestClient::builder()
        .user_agent(concat!("circlehood-booking/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.app.request_timeout_seconds))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))
}

impl AppState {
    /// Production state: PostgreSQL repositories, Redis store and OpenRouter.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool =
            create_optimized_db_pool(&config.database.url, DatabasePoolConfig::from(&config.database)).await?;
        let redis_pool = create_redis_pool(&config.redis.url)?;
        let http_client = build_http_client(&config)?;

        let bookings: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(db_pool.clone()));
        let backends = Backends {
            kv_store: Arc::new(RedisService::new(redis_pool)),
            tenants: Arc::new(PgTenantRepository::new(db_pool.clone())),
            availability: AvailabilityService::new(bookings.clone()),
            bookings,
            llm: Arc::new(OpenRouterClient::from_config(http_client.clone(), &config.llm)),
        };

        let mut state = Self::from_backends(config, http_client, backends);
        state.db_pool = Some(db_pool);
        Ok(state)
    }

    pub fn from_backends(config: Config, http_client: ReqwestClient, backends: Backends) -> Self {
        let Backends { kv_store, tenants, bookings, llm, availability } = backends;
        let conversation = &config.conversation;

        let message_deduplicator =
            MessageDeduplicator::new(kv_store.clone(), Duration::from_secs(conversation.dedup_ttl_seconds));
        let conversations = ConversationStore::new(
            kv_store.clone(),
            conversation.max_turns,
            Duration::from_secs(conversation.ttl_seconds),
        );
        let classifier = Classifier::new(llm.clone(), config.llm.intent_classifier);
        let agent = BookingAgent::new(llm, availability);
        let dispatcher = WhatsAppDispatcher::new(http_client.clone(), config.whatsapp.graph_api_base_url.clone());

        AppState {
            resolver: TenantResolver::new(tenants.clone()),
            config: Arc::new(config),
            http_client,
            db_pool: None,
            kv_store,
            tenants,
            bookings,
            message_deduplicator,
            conversations,
            classifier,
            agent,
            dispatcher,
            started_at: Instant::now(),
        }
    }
}
