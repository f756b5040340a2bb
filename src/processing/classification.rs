//! Language and intent classification.
//!
//! Rules first, the language model only where rules are inconclusive. The
//! result is a hint for the agent, never a gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::services::llm_service::{ChatMessage, CompletionRequest, LanguageModel};
use shared::config::IntentClassifierMode;
use shared::utils::digits_only;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Pt,
    Es,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Pt => "pt",
            Language::Es => "es",
            Language::En => "en",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Pt => "Portuguese",
            Language::Es => "Spanish",
            Language::En => "English",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Booking,
    PriceInquiry,
    Greeting,
    GeneralInquiry,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Booking => "booking",
            Intent::PriceInquiry => "price_inquiry",
            Intent::Greeting => "greeting",
            Intent::GeneralInquiry => "general_inquiry",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RULES
// ============================================================================

const PORTUGUESE_PREFIXES: &[&str] = &["55", "351"];
const SPANISH_PREFIXES: &[&str] = &["34", "52", "54"];

const PT_WORDS: &[&str] = &[
    "olá", "oi", "quero", "agendar", "marcar", "obrigado", "obrigada", "horário", "você",
    "bom dia", "boa tarde", "boa noite", "gostaria", "amanhã", "preço",
];
const ES_WORDS: &[&str] = &[
    "hola", "quiero", "quisiera", "cita", "gracias", "mañana", "precio", "cuánto", "cuanto",
    "buenos días", "buenas tardes", "buenas noches", "reservar", "turno",
];
const EN_WORDS: &[&str] = &[
    "hello", "hi", "hey", "want", "book", "appointment", "thanks", "thank you", "tomorrow",
    "price", "please", "good morning", "how much",
];

const BOOKING_WORDS: &[(Language, &[&str])] = &[
    (Language::Pt, &["agendar", "marcar", "reservar", "agendamento", "horário", "vaga", "disponível"]),
    (Language::Es, &["reservar", "cita", "agendar", "turno", "disponible", "reserva"]),
    (Language::En, &["book", "booking", "appointment", "schedule", "reserve", "available", "slot"]),
];
const PRICE_WORDS: &[(Language, &[&str])] = &[
    (Language::Pt, &["preço", "precos", "preços", "valor", "quanto", "custa"]),
    (Language::Es, &["precio", "precios", "cuánto", "cuanto", "cuesta", "costo"]),
    (Language::En, &["price", "prices", "cost", "how much", "fee"]),
];
const GREETING_WORDS: &[(Language, &[&str])] = &[
    (Language::Pt, &["olá", "ola", "oi", "bom dia", "boa tarde", "boa noite"]),
    (Language::Es, &["hola", "buenos días", "buenos dias", "buenas tardes", "buenas noches", "buenas"]),
    (Language::En, &["hello", "hi", "hey", "good morning", "good afternoon", "good evening"]),
];

/// Lowercased words of `text`, space-joined and padded so phrases match on word
/// boundaries with a plain substring test.
fn normalized_words(text: &str) -> String {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    format!(" {} ", words.join(" "))
}

fn count_matches(normalized: &str, keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|k| normalized.contains(&format!(" {} ", k)))
        .count()
}

pub fn language_from_phone(phone: &str) -> Option<Language> {
    let digits = digits_only(phone);
    if PORTUGUESE_PREFIXES.iter().any(|p| digits.starts_with(p)) {
        Some(Language::Pt)
    } else if SPANISH_PREFIXES.iter().any(|p| digits.starts_with(p)) {
        Some(Language::Es)
    } else {
        None
    }
}

/// Language with the most keyword hits; ties and no hits are inconclusive.
pub fn language_from_keywords(text: &str) -> Option<Language> {
    let normalized = normalized_words(text);
    let mut scores = [
        (Language::Pt, count_matches(&normalized, PT_WORDS)),
        (Language::Es, count_matches(&normalized, ES_WORDS)),
        (Language::En, count_matches(&normalized, EN_WORDS)),
    ];
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    match scores {
        [(_, 0), ..] => None,
        [(first, a), (_, b), _] if a > b => Some(first),
        _ => None,
    }
}

fn lists_for(table: &[(Language, &'static [&'static str])], language: Language) -> Vec<&'static str> {
    // English keywords are always checked; mixed-language messages are common.
    table
        .iter()
        .filter(|(l, _)| *l == language || *l == Language::En)
        .flat_map(|(_, words)| words.iter().copied())
        .collect()
}

/// Keyword intent in priority order booking > price_inquiry > greeting.
pub fn keyword_intent(text: &str, language: Language) -> Intent {
    let normalized = normalized_words(text);
    if count_matches(&normalized, &lists_for(BOOKING_WORDS, language)) > 0 {
        Intent::Booking
    } else if count_matches(&normalized, &lists_for(PRICE_WORDS, language)) > 0 {
        Intent::PriceInquiry
    } else if count_matches(&normalized, &lists_for(GREETING_WORDS, language)) > 0 {
        Intent::Greeting
    } else {
        Intent::GeneralInquiry
    }
}

fn clean_label(output: &str) -> String {
    output
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_lowercase()
}

pub fn parse_language_label(output: &str) -> Option<Language> {
    match clean_label(output).as_str() {
        "pt" | "pt-br" | "portuguese" | "português" => Some(Language::Pt),
        "es" | "spanish" | "español" => Some(Language::Es),
        "en" | "english" => Some(Language::En),
        _ => None,
    }
}

pub fn parse_intent_label(output: &str) -> Option<Intent> {
    match clean_label(output).as_str() {
        "booking" => Some(Intent::Booking),
        "price_inquiry" => Some(Intent::PriceInquiry),
        "greeting" => Some(Intent::Greeting),
        "general_inquiry" => Some(Intent::GeneralInquiry),
        _ => None,
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

#[derive(Clone)]
pub struct Classifier {
    llm: Arc<dyn LanguageModel>,
    intent_mode: IntentClassifierMode,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LanguageModel>, intent_mode: IntentClassifierMode) -> Self {
        Self { llm, intent_mode }
    }

    /// Phone prefix, then keywords, then the model (first turn only), then English.
    pub async fn detect_language(&self, phone: &str, text: &str, has_history: bool) -> Language {
        if let Some(language) = language_from_phone(phone) {
            return language;
        }
        if let Some(language) = language_from_keywords(text) {
            return language;
        }
        if has_history {
            return Language::En;
        }

        let request = CompletionRequest {
            purpose: "language",
            messages: vec![
                ChatMessage::system(
                    "Identify the language of the user's message. \
                     Reply with exactly one code: pt, es or en.",
                ),
                ChatMessage::user(text),
            ],
            temperature: 0.0,
            max_tokens: 5,
        };

        match self.llm.complete(request).await {
            Ok(output) => parse_language_label(&output).unwrap_or_else(|| {
                debug!(output = %output, "Unrecognized language label, defaulting to en");
                Language::En
            }),
            Err(e) => {
                warn!(error = %e, "⚠️ Language detection fallback failed, defaulting to en");
                Language::En
            }
        }
    }

    pub async fn classify_intent(&self, text: &str, language: Language) -> Intent {
        let keyword_result = keyword_intent(text, language);
        if self.intent_mode == IntentClassifierMode::Keywords {
            return keyword_result;
        }

        let request = CompletionRequest {
            purpose: "intent",
            messages: vec![
                ChatMessage::system(
                    "Classify the intent of a client's WhatsApp message to a service business. \
                     Reply with exactly one label: booking, price_inquiry, greeting or general_inquiry.",
                ),
                ChatMessage::user(text),
            ],
            temperature: 0.0,
            max_tokens: 8,
        };

        match self.llm.complete(request).await {
            Ok(output) => parse_intent_label(&output).unwrap_or(keyword_result),
            Err(e) => {
                warn!(error = %e, "⚠️ Intent classifier failed, using keyword result");
                keyword_result
            }
        }
    }
}
