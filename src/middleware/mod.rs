pub mod admin_auth;

pub use admin_auth::{require_admin_secret, ADMIN_SECRET_HEADER};
