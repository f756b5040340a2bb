pub mod agent;
pub mod availability;
pub mod classification;
pub mod message_processor;
pub mod prompt;
pub mod tenant_resolver;

pub use message_processor::{process_inbound, process_webhook, ProcessOutcome};
