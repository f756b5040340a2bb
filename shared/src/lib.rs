//! Shared library for the CircleHood booking services
//!
//! This library contains common functionality used across the workspace:
//! - Environment-driven configuration
//! - The application error type and its HTTP mapping
//! - Phone number helpers shared by the WhatsApp providers

pub mod config;
pub mod error;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::AppError;
