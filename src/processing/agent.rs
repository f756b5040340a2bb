// ============================================================================
// CONVERSATIONAL BOOKING AGENT
// ============================================================================
// One agent turn: prompt + history → model → optional booking side effect →
// user-visible reply. The model only *requests* bookings through a marker
// line; the write goes through `AvailabilityService`.
// ============================================================================

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::availability::{AvailabilityService, BookingRequest};
use super::classification::{Intent, Language};
use super::prompt::{build_system_prompt, PromptContext, BOOKING_REQUEST_MARKER};
use crate::models::{
    Booking, BookingError, BotConfig, BusinessProfile, ConversationTurn, Role, Service, WorkingHours,
};
use crate::services::llm_service::{ChatMessage, CompletionRequest, LanguageModel};

/// Most alternative slots offered after a conflict.
pub const MAX_ALTERNATIVES: usize = 5;

/// Tenant data the agent reasons over, loaded once per message.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub profile: BusinessProfile,
    pub bot: BotConfig,
    pub services: Vec<Service>,
    pub working_hours: Vec<WorkingHours>,
    pub timezone: Tz,
}

impl TenantContext {
    pub fn professional_id(&self) -> Uuid {
        self.profile.professional_id
    }
}

pub struct AgentInput<'a> {
    pub tenant: &'a TenantContext,
    pub client_phone: &'a str,
    pub push_name: Option<&'a str>,
    pub language: Language,
    pub intent: Intent,
    /// Earlier turns, oldest first, without the current message.
    pub history: &'a [ConversationTurn],
    pub user_text: &'a str,
}

#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub booking: Option<Booking>,
}

impl AgentReply {
    fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), booking: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookingRequestPayload {
    pub client_name: String,
    pub service: String,
    pub date: String,
    pub time: String,
}

/// Split a model reply into the user-visible text and the booking request line.
///
/// The first marker line wins; any marker line is removed from the visible text.
pub fn extract_booking_request(reply: &str) -> (String, Option<Result<BookingRequestPayload, String>>) {
    let mut visible = Vec::new();
    let mut request = None;

    for line in reply.lines() {
        let trimmed = line.trim().trim_matches('`').trim();
        match trimmed.find(BOOKING_REQUEST_MARKER) {
            Some(pos) => {
                if request.is_none() {
                    let json = trimmed[pos + BOOKING_REQUEST_MARKER.len()..].trim();
                    request = Some(
                        serde_json::from_str::<BookingRequestPayload>(json).map_err(|e| e.to_string()),
                    );
                }
            }
            None => visible.push(line),
        }
    }

    let text = visible.join("\n").trim().to_string();
    (text, request)
}

/// Exact case-insensitive name match, then containment either way.
pub fn resolve_service<'a>(services: &'a [Service], name: &str) -> Option<&'a Service> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    services
        .iter()
        .find(|s| s.name.to_lowercase() == wanted)
        .or_else(|| {
            services.iter().find(|s| {
                let candidate = s.name.to_lowercase();
                candidate.contains(&wanted) || wanted.contains(&candidate)
            })
        })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn fill_template(template: &str, name: &str, service: &str, date: NaiveDate, time: NaiveTime) -> String {
    template
        .replace("{name}", name)
        .replace("{service}", service)
        .replace("{date}", &format_date(date))
        .replace("{time}", &time.format("%H:%M").to_string())
}

// ============================================================================
// DETERMINISTIC REPLIES
// ============================================================================

pub fn fallback_reply(language: Language) -> &'static str {
    match language {
        Language::Pt => "Desculpe, estou com dificuldades no momento. Pode tentar novamente em instantes?",
        Language::Es => "Lo siento, estoy teniendo dificultades en este momento. ¿Puedes intentarlo de nuevo en unos instantes?",
        Language::En => "Sorry, I'm having trouble right now. Could you try again in a moment?",
    }
}

fn default_unavailable(language: Language) -> &'static str {
    match language {
        Language::Pt => "Infelizmente esse horário não está disponível.",
        Language::Es => "Lo siento, ese horario no está disponible.",
        Language::En => "Sorry, that time is not available.",
    }
}

fn alternatives_header(language: Language, date: NaiveDate) -> String {
    let date = format_date(date);
    match language {
        Language::Pt => format!("Horários disponíveis em {}:", date),
        Language::Es => format!("Horarios disponibles el {}:", date),
        Language::En => format!("Available times on {}:", date),
    }
}

fn no_alternatives(language: Language) -> &'static str {
    match language {
        Language::Pt => "Não há outros horários livres nesse dia. Quer tentar outra data?",
        Language::Es => "No hay otros horarios libres ese día. ¿Quieres probar otra fecha?",
        Language::En => "There are no other free times that day. Would you like to try another date?",
    }
}

fn default_confirmation(language: Language) -> &'static str {
    match language {
        Language::Pt => "Agendamento confirmado: {service} em {date} às {time}. Até lá, {name}!",
        Language::Es => "Reserva confirmada: {service} el {date} a las {time}. ¡Hasta pronto, {name}!",
        Language::En => "Booking confirmed: {service} on {date} at {time}. See you then, {name}!",
    }
}

/// Reply sent once a booking row exists. It always states the confirmation:
/// the tenant template alone, or the model's text followed by the default.
fn confirmation_reply(
    bot: &BotConfig,
    language: Language,
    visible: &str,
    name: &str,
    service: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> String {
    if let Some(template) = bot.confirmation_message.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return fill_template(template, name, service, date, time);
    }
    let confirmation = fill_template(default_confirmation(language), name, service, date, time);
    if visible.is_empty() {
        confirmation
    } else {
        format!("{}\n\n{}", visible, confirmation)
    }
}

fn service_not_found(language: Language, services: &[Service]) -> String {
    let names = services.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ");
    match language {
        Language::Pt => format!("Não encontrei esse serviço. Os serviços disponíveis são: {}.", names),
        Language::Es => format!("No encontré ese servicio. Los servicios disponibles son: {}.", names),
        Language::En => format!("I couldn't find that service. Available services: {}.", names),
    }
}

fn incomplete_request(language: Language) -> &'static str {
    match language {
        Language::Pt => "Pode confirmar o serviço, a data e o horário que deseja?",
        Language::Es => "¿Puedes confirmar el servicio, la fecha y la hora que deseas?",
        Language::En => "Could you confirm the service, date and time you'd like?",
    }
}

// ============================================================================
// AGENT
// ============================================================================

#[derive(Clone)]
pub struct BookingAgent {
    llm: Arc<dyn LanguageModel>,
    availability: AvailabilityService,
}

impl BookingAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, availability: AvailabilityService) -> Self {
        Self { llm, availability }
    }

    fn build_messages(&self, input: &AgentInput<'_>) -> Vec<ChatMessage> {
        let tenant = input.tenant;
        let today = self.availability.now_in(tenant.timezone).date();
        let system_prompt = build_system_prompt(&PromptContext {
            bot: &tenant.bot,
            profile: &tenant.profile,
            services: &tenant.services,
            working_hours: &tenant.working_hours,
            today,
            timezone: tenant.timezone.name(),
            client_phone: input.client_phone,
            client_name: input.push_name,
            language: input.language,
            intent: input.intent,
        });

        let history = match tenant.bot.max_context_messages {
            Some(limit) if input.history.len() > limit => &input.history[input.history.len() - limit..],
            _ => input.history,
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().map(|turn| match turn.role {
            Role::User => ChatMessage::user(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant(turn.content.clone()),
        }));
        messages.push(ChatMessage::user(input.user_text));
        messages
    }

    /// Produce the reply for one inbound message. Never fails: model and
    /// booking errors become deterministic replies in the conversation language.
    pub async fn respond(&self, input: AgentInput<'_>) -> AgentReply {
        let request = CompletionRequest {
            purpose: "agent",
            messages: self.build_messages(&input),
            temperature: 0.4,
            max_tokens: 600,
        };

        let raw = match self.llm.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "⚠️ Agent model call failed, using fallback reply");
                return AgentReply::text(fallback_reply(input.language));
            }
        };

        let (visible, booking_request) = extract_booking_request(&raw);
        let Some(booking_request) = booking_request else {
            if visible.is_empty() {
                return AgentReply::text(fallback_reply(input.language));
            }
            return AgentReply::text(visible);
        };

        match booking_request {
            Ok(payload) => self.handle_booking_request(&input, payload, visible).await,
            Err(e) => {
                warn!(error = %e, "⚠️ Malformed booking request from model");
                AgentReply::text(if visible.is_empty() {
                    incomplete_request(input.language).to_string()
                } else {
                    visible
                })
            }
        }
    }

    async fn handle_booking_request(
        &self,
        input: &AgentInput<'_>,
        payload: BookingRequestPayload,
        visible: String,
    ) -> AgentReply {
        let tenant = input.tenant;
        let language = input.language;

        let Some(service) = resolve_service(&tenant.services, &payload.service) else {
            info!(service = %payload.service, "🔎 Requested service not found");
            return AgentReply::text(service_not_found(language, &tenant.services));
        };
        let (Some(date), Some(start)) = (parse_date(&payload.date), parse_time(&payload.time)) else {
            warn!(date = %payload.date, time = %payload.time, "⚠️ Unparseable booking date/time");
            return AgentReply::text(incomplete_request(language));
        };
        let client_name = payload.client_name.trim();
        if client_name.is_empty() {
            return AgentReply::text(incomplete_request(language));
        }

        debug!(service = %service.name, date = %date, start = %start, "📅 Model requested booking");

        let result = self
            .availability
            .create_booking_if_available(
                BookingRequest {
                    professional_id: tenant.professional_id(),
                    service: service.clone(),
                    date,
                    start_time: start,
                    client_name: client_name.to_string(),
                    client_phone: input.client_phone.to_string(),
                    notes: Some("Booked via WhatsApp".to_string()),
                },
                tenant.timezone,
            )
            .await;

        match result {
            Ok(booking) => {
                let text =
                    confirmation_reply(&tenant.bot, language, &visible, client_name, &service.name, date, start);
                AgentReply { text, booking: Some(booking) }
            }
            Err(e) if e.is_conflict() => {
                AgentReply::text(self.conflict_reply(tenant, service, date, language).await)
            }
            Err(BookingError::ServiceNotFound(_)) => {
                AgentReply::text(service_not_found(language, &tenant.services))
            }
            Err(e) => {
                warn!(error = %e, "⚠️ Booking failed");
                AgentReply::text(fallback_reply(language))
            }
        }
    }

    async fn conflict_reply(
        &self,
        tenant: &TenantContext,
        service: &Service,
        date: NaiveDate,
        language: Language,
    ) -> String {
        let unavailable = tenant
            .bot
            .unavailable_message
            .as_deref()
            .unwrap_or_else(|| default_unavailable(language));

        let alternatives = match self
            .availability
            .available_slots(tenant.professional_id(), service, date, tenant.timezone)
            .await
        {
            Ok(slots) => slots,
            Err(e) => {
                warn!(error = %e, "⚠️ Could not load alternative slots");
                Vec::new()
            }
        };

        if alternatives.is_empty() {
            return format!("{}\n\n{}", unavailable, no_alternatives(language));
        }

        let times = alternatives
            .iter()
            .take(MAX_ALTERNATIVES)
            .map(|slot| slot.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}\n\n{} {}", unavailable, alternatives_header(language, date), times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryBookingRepository;
    use crate::models::BookingStatus;
    use crate::services::llm_service::LlmError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    /// Replies with a fixed string and records the last request.
    struct ScriptedModel {
        reply: Result<String, ()>,
        last: Mutex<Option<CompletionRequest>>,
    }

    impl ScriptedModel {
        fn new(reply: Result<&str, ()>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            *self.last.lock().unwrap() = Some(request);
            self.reply.clone().map_err(|_| LlmError::Timeout)
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn tenant(bot: BotConfig) -> TenantContext {
        TenantContext {
            profile: BusinessProfile {
                professional_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                business_name: "Salão da Ana".to_string(),
                bio: None,
                location: None,
                timezone: Some("Europe/Dublin".to_string()),
            },
            bot,
            services: vec![Service {
                id: Uuid::new_v4(),
                name: "Corte Feminino".to_string(),
                duration_minutes: 60,
                price: None,
            }],
            working_hours: vec![WorkingHours {
                day_of_week: 2,
                start_time: t(9, 0),
                end_time: t(18, 0),
                is_available: true,
            }],
            timezone: chrono_tz::Europe::Dublin,
        }
    }

    fn agent_with(model: Arc<ScriptedModel>, tenant: &TenantContext) -> (BookingAgent, InMemoryBookingRepository) {
        let repo = InMemoryBookingRepository::new();
        repo.set_working_hours(tenant.professional_id(), tenant.working_hours.clone());
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let availability = AvailabilityService::new(Arc::new(repo.clone())).with_clock(move || now);
        (BookingAgent::new(model, availability), repo)
    }

    fn input<'a>(tenant: &'a TenantContext, history: &'a [ConversationTurn]) -> AgentInput<'a> {
        AgentInput {
            tenant,
            client_phone: "353871234567",
            push_name: Some("Ana"),
            language: Language::Pt,
            intent: Intent::Booking,
            history,
            user_text: "Quero agendar um corte amanhã às 14h, sou Ana Silva",
        }
    }

    const BOOKING_REPLY: &str = "Perfeito, Ana! Vou reservar para você.\n\
        BOOKING_REQUEST: {\"client_name\":\"Ana Silva\",\"service\":\"corte feminino\",\"date\":\"2026-10-20\",\"time\":\"14:00\"}";

    #[test]
    fn test_extract_booking_request_strips_marker_line() {
        let (visible, request) = extract_booking_request(BOOKING_REPLY);
        assert_eq!(visible, "Perfeito, Ana! Vou reservar para você.");
        let payload = request.unwrap().unwrap();
        assert_eq!(payload.client_name, "Ana Silva");
        assert_eq!(payload.time, "14:00");

        let (visible, request) = extract_booking_request("Just chatting");
        assert_eq!(visible, "Just chatting");
        assert!(request.is_none());

        let (_, request) = extract_booking_request("`BOOKING_REQUEST: {not json}`");
        assert!(request.unwrap().is_err());
    }

    #[test]
    fn test_resolve_service_is_lenient() {
        let tenant = tenant(BotConfig::default());
        assert!(resolve_service(&tenant.services, "CORTE FEMININO").is_some());
        assert!(resolve_service(&tenant.services, "corte").is_some());
        assert!(resolve_service(&tenant.services, "manicure").is_none());
        assert!(resolve_service(&tenant.services, " ").is_none());
    }

    #[tokio::test]
    async fn test_booking_request_creates_booking_and_hides_marker() {
        let tenant = tenant(BotConfig::default());
        let (agent, repo) = agent_with(ScriptedModel::new(Ok(BOOKING_REPLY)), &tenant);

        let reply = agent.respond(input(&tenant, &[])).await;

        assert_eq!(
            reply.text,
            "Perfeito, Ana! Vou reservar para você.\n\n\
             Agendamento confirmado: Corte Feminino em 20/10/2026 às 14:00. Até lá, Ana Silva!"
        );
        assert!(!reply.text.contains(BOOKING_REQUEST_MARKER));
        let booking = reply.booking.unwrap();
        assert_eq!(booking.start_time, t(14, 0));
        assert_eq!(booking.end_time, t(15, 0));
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(repo.all_bookings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_template_overrides_model_text() {
        let tenant = tenant(BotConfig {
            confirmation_message: Some("Feito, {name}: {service} {date} {time}".to_string()),
            ..BotConfig::default()
        });
        let (agent, _repo) = agent_with(ScriptedModel::new(Ok(BOOKING_REPLY)), &tenant);

        let reply = agent.respond(input(&tenant, &[])).await;
        assert_eq!(reply.text, "Feito, Ana Silva: Corte Feminino 20/10/2026 14:00");
    }

    #[tokio::test]
    async fn test_conflict_replies_with_unavailable_message_and_alternatives() {
        let tenant = tenant(BotConfig {
            unavailable_message: Some("Esse horário já foi reservado.".to_string()),
            ..BotConfig::default()
        });
        let (agent, repo) = agent_with(ScriptedModel::new(Ok(BOOKING_REPLY)), &tenant);
        repo.insert_booking(Booking {
            id: Uuid::new_v4(),
            professional_id: tenant.professional_id(),
            service_id: tenant.services[0].id,
            booking_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: t(14, 0),
            end_time: t(15, 0),
            client_name: "Outra".to_string(),
            client_phone: "353870000000".to_string(),
            status: BookingStatus::Confirmed,
            notes: None,
        })
        .await;

        let reply = agent.respond(input(&tenant, &[])).await;

        assert!(reply.booking.is_none());
        assert_eq!(
            reply.text,
            "Esse horário já foi reservado.\n\nHorários disponíveis em 20/10/2026: 09:00, 09:30, 10:00, 10:30, 11:00"
        );
    }

    #[tokio::test]
    async fn test_model_failure_uses_language_fallback() {
        let tenant = tenant(BotConfig::default());
        let (agent, _repo) = agent_with(ScriptedModel::new(Err(())), &tenant);

        let reply = agent.respond(input(&tenant, &[])).await;
        assert_eq!(reply.text, fallback_reply(Language::Pt));
        assert!(reply.booking.is_none());
    }

    #[tokio::test]
    async fn test_history_is_bounded_by_max_context_messages() {
        let tenant = tenant(BotConfig {
            max_context_messages: Some(2),
            ..BotConfig::default()
        });
        let model = ScriptedModel::new(Ok("Olá!"));
        let (agent, _repo) = agent_with(model.clone(), &tenant);
        let history: Vec<ConversationTurn> = (0..6).map(|i| ConversationTurn::user(format!("m{}", i))).collect();

        agent.respond(input(&tenant, &history)).await;

        let request = model.last.lock().unwrap().clone().unwrap();
        // system + 2 history turns + current message
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[1].content, "m4");
        assert_eq!(request.messages[2].content, "m5");
    }
    #[tokio::test]
    async fn test_booking_is_confirmed_even_when_model_only_says_it_will_check() {
        let tenant = tenant(BotConfig::default());
        let model = ScriptedModel::new(Ok("Um momento, vou verificar a disponibilidade.\n\
             BOOKING_REQUEST: {\"client_name\":\"Ana Silva\",\"service\":\"Corte Feminino\",\"date\":\"2026-10-20\",\"time\":\"14:00\"}"));
        let (agent, repo) = agent_with(model, &tenant);

        let reply = agent.respond(input(&tenant, &[])).await;

        assert!(reply.booking.is_some());
        assert_eq!(repo.all_bookings().await.len(), 1);
        assert!(reply.text.starts_with("Um momento, vou verificar a disponibilidade."));
        assert!(reply.text.contains("Agendamento confirmado"));
        assert!(reply.text.contains("20/10/2026"));
        assert!(reply.text.contains("14:00"));
    }

    #[tokio::test]
    async fn test_marker_only_reply_gets_default_confirmation_in_language() {
        let tenant = tenant(BotConfig::default());
        let model = ScriptedModel::new(Ok(
            "BOOKING_REQUEST: {\"client_name\":\"Ana Silva\",\"service\":\"corte\",\"date\":\"2026-10-20\",\"time\":\"10:30\"}",
        ));
        let (agent, _repo) = agent_with(model, &tenant);

        let mut turn = input(&tenant, &[]);
        turn.language = Language::En;
        let reply = agent.respond(turn).await;

        assert_eq!(
            reply.text,
            "Booking confirmed: Corte Feminino on 20/10/2026 at 10:30. See you then, Ana Silva!"
        );
    }

    #[tokio::test]
    async fn test_auto_book_policy_books_on_first_request() {
        let tenant = tenant(BotConfig {
            auto_book_if_available: true,
            always_confirm_booking: false,
            ..BotConfig::default()
        });
        let model = ScriptedModel::new(Ok(BOOKING_REPLY));
        let (agent, repo) = agent_with(model.clone(), &tenant);

        let reply = agent.respond(input(&tenant, &[])).await;

        let request = model.last.lock().unwrap().clone().unwrap();
        assert!(!request.messages[0].content.contains("explicit"));
        assert!(reply.booking.is_some());
        assert_eq!(repo.all_bookings().await.len(), 1);
        assert!(reply.text.contains("Agendamento confirmado"));
    }

    #[tokio::test]
    async fn test_always_confirm_policy_books_only_after_client_agrees() {
        let tenant = tenant(BotConfig {
            always_confirm_booking: true,
            ..BotConfig::default()
        });

        // First turn: the model asks for confirmation and no row is written.
        let asking = ScriptedModel::new(Ok(
            "Ana Silva, Corte Feminino em 20/10/2026 às 14:00. Posso confirmar?",
        ));
        let (agent, repo) = agent_with(asking.clone(), &tenant);
        let reply = agent.respond(input(&tenant, &[])).await;

        let request = asking.last.lock().unwrap().clone().unwrap();
        assert!(request.messages[0].content.contains("explicit"));
        assert!(reply.booking.is_none());
        assert!(repo.all_bookings().await.is_empty());
        assert_eq!(reply.text, "Ana Silva, Corte Feminino em 20/10/2026 às 14:00. Posso confirmar?");

        // Second turn: the client agrees and the model emits the request.
        let history = vec![
            ConversationTurn::user("Quero agendar um corte amanhã às 14h, sou Ana Silva"),
            ConversationTurn::assistant(reply.text.clone()),
        ];
        let booking_model = ScriptedModel::new(Ok(
            "Combinado!\nBOOKING_REQUEST: {\"client_name\":\"Ana Silva\",\"service\":\"Corte Feminino\",\"date\":\"2026-10-20\",\"time\":\"14:00\"}",
        ));
        let agent = BookingAgent::new(booking_model, agent.availability.clone());
        let mut turn = input(&tenant, &history);
        turn.user_text = "Sim, pode confirmar";
        let reply = agent.respond(turn).await;

        assert!(reply.booking.is_some());
        assert_eq!(repo.all_bookings().await.len(), 1);
        assert!(reply.text.contains("Agendamento confirmado"));
        assert!(reply.text.contains("14:00"));
    }
}
