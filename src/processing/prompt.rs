//! System prompt construction for the booking agent.
//!
//! Everything here is pure: same tenant data in, same prompt out.

use chrono::{Datelike, NaiveDate};
use std::fmt::Write;

use super::classification::{Intent, Language};
use crate::models::{BotConfig, BotPersonality, BusinessProfile, Service, WorkingHours};

/// Line prefix the model uses to ask for a booking.
pub const BOOKING_REQUEST_MARKER: &str = "BOOKING_REQUEST:";

const DAY_NAMES: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];

pub struct PromptContext<'a> {
    pub bot: &'a BotConfig,
    pub profile: &'a BusinessProfile,
    pub services: &'a [Service],
    pub working_hours: &'a [WorkingHours],
    pub today: NaiveDate,
    pub timezone: &'a str,
    pub client_phone: &'a str,
    pub client_name: Option<&'a str>,
    pub language: Language,
    pub intent: Intent,
}

fn tone_instructions(personality: BotPersonality) -> &'static str {
    match personality {
        BotPersonality::Friendly => {
            "Be warm and friendly. Use a welcoming tone; an occasional emoji is fine."
        }
        BotPersonality::Professional => {
            "Be polite, concise and professional. Avoid slang and emojis."
        }
        BotPersonality::Casual => {
            "Be relaxed and conversational, like chatting with a regular client. Keep it short."
        }
    }
}

fn confirmation_policy(bot: &BotConfig) -> &'static str {
    if bot.always_confirm_booking || !bot.auto_book_if_available {
        "Before requesting a booking, summarize service, date, time and name, and wait for the \
         client to confirm explicitly. Only request the booking after a clear yes."
    } else {
        "As soon as you have every required detail, request the booking right away without \
         asking for an extra confirmation."
    }
}

fn format_services(services: &[Service]) -> String {
    if services.is_empty() {
        return "- (no services listed; ask the client what they need)\n".to_string();
    }
    services.iter().fold(String::new(), |mut out, s| {
        let _ = match s.price {
            Some(price) => writeln!(out, "- {} ({} min, price {})", s.name, s.duration_minutes, price),
            None => writeln!(out, "- {} ({} min)", s.name, s.duration_minutes),
        };
        out
    })
}

fn format_working_hours(hours: &[WorkingHours]) -> String {
    let mut out = String::new();
    for (dow, day) in DAY_NAMES.iter().enumerate() {
        let open = hours
            .iter()
            .find(|h| h.day_of_week == dow as i16 && h.is_available);
        let _ = match open {
            Some(h) => writeln!(
                out,
                "- {}: {} to {}",
                day,
                h.start_time.format("%H:%M"),
                h.end_time.format("%H:%M")
            ),
            None => writeln!(out, "- {}: closed", day),
        };
    }
    out
}

fn booking_protocol(ctx: &PromptContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Booking protocol");
    let _ = writeln!(
        out,
        "Today is {} ({}), timezone {}. Resolve relative dates like \"tomorrow\" from it.",
        ctx.today.format("%Y-%m-%d"),
        DAY_NAMES[ctx.today.weekday().num_days_from_sunday() as usize],
        ctx.timezone
    );
    let _ = writeln!(
        out,
        "Required to book: the client's full name, the service, the date and the time. \
         The client's phone number is already known ({}); never ask for it.",
        ctx.client_phone
    );
    if let Some(name) = ctx.client_name {
        let _ = writeln!(out, "The client's WhatsApp name is \"{}\"; confirm their full name before booking.", name);
    }
    let _ = writeln!(out, "{}", confirmation_policy(ctx.bot));
    let _ = writeln!(
        out,
        "To book, end your reply with exactly one line in this format and nothing after it:\n\
         {} {{\"client_name\":\"<full name>\",\"service\":\"<service name>\",\"date\":\"YYYY-MM-DD\",\"time\":\"HH:MM\"}}",
        BOOKING_REQUEST_MARKER
    );
    let _ = writeln!(
        out,
        "The system checks availability and creates the booking. Never state that a booking is \
         confirmed yourself, and never invent availability."
    );
    out
}

/// Build the system prompt for one agent turn.
///
/// A non-empty custom prompt replaces the generated template; the booking
/// protocol is appended either way.
pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let protocol = booking_protocol(ctx);

    if let Some(custom) = ctx.bot.custom_system_prompt.as_deref().map(str::trim) {
        if !custom.is_empty() {
            return format!("{}\n\n{}", custom, protocol);
        }
    }

    let bot_name = ctx.bot.bot_name.as_deref().unwrap_or("the booking assistant");
    let mut out = String::new();

    let _ = writeln!(
        out,
        "You are {}, the WhatsApp assistant of {}. You help clients with questions and book appointments.",
        bot_name, ctx.profile.business_name
    );
    let _ = writeln!(out, "{}", tone_instructions(ctx.bot.personality));
    let _ = writeln!(
        out,
        "Reply in {} unless the client clearly writes in another language. Keep replies short; this is WhatsApp.",
        ctx.language.name()
    );
    let _ = writeln!(out, "The latest message looks like a {} message.", ctx.intent);
    if ctx.bot.ask_for_additional_info {
        let _ = writeln!(
            out,
            "You may ask for useful optional details (preferences, first visit) and put them in the conversation."
        );
    }

    let _ = writeln!(out, "\n## Business");
    let _ = writeln!(out, "Name: {}", ctx.profile.business_name);
    if let Some(bio) = ctx.profile.bio.as_deref() {
        let _ = writeln!(out, "About: {}", bio);
    }
    if let Some(location) = ctx.profile.location.as_deref() {
        let _ = writeln!(out, "Location: {}", location);
    }

    let _ = writeln!(out, "\n## Services");
    out.push_str(&format_services(ctx.services));

    let _ = writeln!(out, "\n## Working hours");
    out.push_str(&format_working_hours(ctx.working_hours));

    out.push('\n');
    out.push_str(&protocol);
    out
}
