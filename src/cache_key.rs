//! Cache key generation utilities
//!
//! This module provides consistent cache key generation
//! for everything the pipeline keeps in the shared key-value store.

use shared::utils::digits_only;

/// Dedup claim for an inbound provider message id
pub fn message_claim(message_id: &str) -> String {
    format!("msg:{}", message_id)
}

/// Conversation memory for one contact of one tenant.
///
/// The tenant component keeps two tenants' chats with the same phone apart.
pub fn conversation(tenant_id: &str, phone: &str) -> String {
    format!("conversation:{}:{}", tenant_id, digits_only(phone))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_claim_key() {
        assert_eq!(message_claim("MSG1"), "msg:MSG1");
    }

    #[test]
    fn test_conversation_key_is_tenant_scoped_and_normalized() {
        let a = conversation("tenant-a", "+353 87 123 4567");
        let b = conversation("tenant-b", "353871234567");
        assert_eq!(a, "conversation:tenant-a:353871234567");
        assert_ne!(a, b);
    }
}
