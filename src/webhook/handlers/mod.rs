pub mod webhook_handler;

pub use webhook_handler::{get_webhook, post_webhook};
