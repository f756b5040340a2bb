// ============================================================================
// MESSAGE PROCESSOR
// ============================================================================
// Background pipeline for one webhook body:
// normalize → dedup claim → tenant → history → classify → agent → store → send
// ============================================================================

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::agent::{AgentInput, AgentReply, TenantContext};
use super::availability::resolve_timezone;
use super::classification::Intent;
use super::tenant_resolver::{Resolution, ResolvedTenant};
use crate::cache_key;
use crate::db::RepositoryError;
use crate::models::{ConversationTurn, InboundMessage, Provider};
use crate::observability::{record_error, record_webhook_message, record_webhook_processing};
use crate::state::AppState;
use crate::webhook::normalizer::{normalize, SkipReason};

/// Terminal state of one inbound webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    Duplicate,
    /// No single tenant to answer for: not found, ambiguous or missing profile.
    Unresolved(&'static str),
    OptedOut,
    Failed(&'static str),
    DispatchFailed,
    Replied { greeting: bool, booked: bool },
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Skipped(reason) => reason.as_str(),
            ProcessOutcome::Duplicate => "duplicate",
            ProcessOutcome::Unresolved(label) => label,
            ProcessOutcome::OptedOut => "opted_out",
            ProcessOutcome::Failed(stage) => stage,
            ProcessOutcome::DispatchFailed => "dispatch_failed",
            ProcessOutcome::Replied { booked: true, .. } => "replied_booked",
            ProcessOutcome::Replied { greeting: true, .. } => "replied_greeting",
            ProcessOutcome::Replied { .. } => "replied",
        }
    }
}

/// Spawned by the webhook handler; records metrics for the outcome.
pub async fn process_webhook(state: Arc<AppState>, payload: Value) -> ProcessOutcome {
    let start = Instant::now();
    let outcome = process_inbound(&state, &payload).await;

    let provider = provider_label(&payload);
    record_webhook_message(provider, outcome.label());
    record_webhook_processing(provider, start.elapsed().as_secs_f64());
    debug!(provider = provider, outcome = outcome.label(), elapsed_ms = start.elapsed().as_millis() as u64, "🏁 Webhook processed");

    outcome
}

fn provider_label(payload: &Value) -> &'static str {
    use crate::webhook::normalizer::{is_evolution_shape, is_meta_shape};
    if is_evolution_shape(payload) {
        Provider::Evolution.as_str()
    } else if is_meta_shape(payload) {
        Provider::Meta.as_str()
    } else {
        "unknown"
    }
}

/// Run the whole pipeline for one webhook body. Never panics and never fails:
/// every error becomes an outcome.
pub async fn process_inbound(state: &AppState, payload: &Value) -> ProcessOutcome {
    let message = match normalize(payload) {
        Ok(message) => message,
        Err(reason) => {
            debug!(reason = reason.as_str(), "📭 Webhook acknowledged without processing");
            return ProcessOutcome::Skipped(reason);
        }
    };

    if !state.message_deduplicator.try_claim(&message.message_id).await {
        info!(message_id = %message.message_id, provider = %message.provider, "🚫 Message already claimed, skipping");
        return ProcessOutcome::Duplicate;
    }

    info!(
        message_id = %message.message_id,
        provider = %message.provider,
        from = %message.from,
        "📥 Processing inbound message"
    );

    let resolved = match state.resolver.resolve(&message).await {
        Ok(Resolution::Serve(resolved)) => *resolved,
        Ok(Resolution::OptedOut) => return ProcessOutcome::OptedOut,
        Ok(other) => return ProcessOutcome::Unresolved(other.label()),
        Err(e) => {
            error!(message_id = %message.message_id, error = %e, "❌ Tenant lookup failed");
            record_error("repository", "tenant_resolver");
            return ProcessOutcome::Failed("tenant_lookup_failed");
        }
    };

    if message.provider == Provider::Meta {
        if let Err(e) = state
            .dispatcher
            .mark_as_read(&resolved.config.credentials, &message.message_id)
            .await
        {
            warn!(message_id = %message.message_id, error = %e, "⚠️ Failed to mark message as read");
        }
    }

    let tenant = match load_tenant_context(state, &resolved).await {
        Ok(tenant) => tenant,
        Err(e) => {
            error!(tenant_id = %resolved.profile.user_id, error = %e, "❌ Failed to load tenant data");
            record_error("repository", "tenant_context");
            return ProcessOutcome::Failed("tenant_context_failed");
        }
    };

    respond_and_dispatch(state, &message, &resolved, &tenant).await
}

async fn load_tenant_context(state: &AppState, resolved: &ResolvedTenant) -> Result<TenantContext, RepositoryError> {
    let profile = resolved.profile.clone();
    let bot = state.tenants.bot_config(profile.user_id).await?.unwrap_or_default();
    let services = state.tenants.services(profile.professional_id).await?;
    let working_hours = state.bookings.working_hours(profile.professional_id).await?;
    let timezone = resolve_timezone(profile.timezone.as_deref(), &state.config.app.default_timezone);

    Ok(TenantContext {
        profile,
        bot,
        services,
        working_hours,
        timezone,
    })
}

async fn respond_and_dispatch(
    state: &AppState,
    message: &InboundMessage,
    resolved: &ResolvedTenant,
    tenant: &TenantContext,
) -> ProcessOutcome {
    let tenant_id = tenant.profile.user_id;
    let key = cache_key::conversation(&tenant_id.to_string(), &message.from);

    let history = state.conversations.read(&key).await.unwrap_or_else(|e| {
        warn!(tenant_id = %tenant_id, error = %e, "⚠️ Conversation read failed, continuing without history");
        Vec::new()
    });

    let language = state
        .classifier
        .detect_language(&message.from, &message.text, !history.is_empty())
        .await;
    let intent = state.classifier.classify_intent(&message.text, language).await;
    debug!(tenant_id = %tenant_id, language = language.code(), intent = intent.as_str(), "🧭 Message classified");

    let greeting = first_turn_greeting(tenant, history.is_empty(), intent);
    let is_greeting = greeting.is_some();
    let reply = match greeting {
        Some(text) => AgentReply { text, booking: None },
        None => {
            let client_name = resolved
                .contact
                .as_ref()
                .and_then(|c| c.name.as_deref())
                .or(message.push_name.as_deref());
            state
                .agent
                .respond(AgentInput {
                    tenant,
                    client_phone: &message.from,
                    push_name: client_name,
                    language,
                    intent,
                    history: &history,
                    user_text: &message.text,
                })
                .await
        }
    };

    if let Some(booking) = &reply.booking {
        info!(
            tenant_id = %tenant_id,
            booking_id = %booking.id,
            date = %booking.booking_date,
            start = %booking.start_time,
            "📅 Booking confirmed via WhatsApp"
        );
        if let Err(e) = state
            .tenants
            .ensure_contact(tenant.professional_id(), &booking.client_name, &message.from)
            .await
        {
            warn!(tenant_id = %tenant_id, error = %e, "⚠️ Failed to save contact after booking");
        }
    }

    let turns = vec![
        ConversationTurn::user(message.text.clone()),
        ConversationTurn::assistant(reply.text.clone()),
    ];
    if let Err(e) = state.conversations.append(&key, turns).await {
        warn!(tenant_id = %tenant_id, error = %e, "⚠️ Conversation write failed");
    }

    if let Err(e) = state
        .dispatcher
        .send(&resolved.config.credentials, &message.from, &reply.text)
        .await
    {
        error!(tenant_id = %tenant_id, message_id = %message.message_id, error = %e, "❌ Reply dispatch failed");
        return ProcessOutcome::DispatchFailed;
    }

    ProcessOutcome::Replied {
        greeting: is_greeting,
        booked: reply.booking.is_some(),
    }
}

/// Configured greeting for a contact's first greeting message, bypassing the model.
fn first_turn_greeting(tenant: &TenantContext, first_turn: bool, intent: Intent) -> Option<String> {
    if !first_turn || intent != Intent::Greeting {
        return None;
    }
    tenant
        .bot
        .greeting_message
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
}
