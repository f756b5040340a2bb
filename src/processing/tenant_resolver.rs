//! Maps an inbound message to exactly one tenant and applies the per-contact
//! bot opt-out.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::{RepositoryError, TenantLookup, TenantRepository};
use crate::models::{BusinessProfile, Contact, InboundMessage, TenantWhatsAppConfig};
use shared::utils::phone_variants;

#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    pub config: TenantWhatsAppConfig,
    pub profile: BusinessProfile,
    /// `None` for senders the tenant has never saved; they are still served.
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Serve(Box<ResolvedTenant>),
    /// The contact exists with the bot disabled.
    OptedOut,
    NotFound,
    Ambiguous(usize),
    /// Config found but the tenant has no professional profile.
    MissingProfile,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Serve(_) => "resolved",
            Resolution::OptedOut => "opted_out",
            Resolution::NotFound => "tenant_not_found",
            Resolution::Ambiguous(_) => "tenant_ambiguous",
            Resolution::MissingProfile => "profile_missing",
        }
    }
}

#[derive(Clone)]
pub struct TenantResolver {
    repository: Arc<dyn TenantRepository>,
}

impl TenantResolver {
    pub fn new(repository: Arc<dyn TenantRepository>) -> Self {
        Self { repository }
    }

    pub async fn resolve(&self, message: &InboundMessage) -> Result<Resolution, RepositoryError> {
        let lookup = TenantLookup {
            provider: message.provider,
            instance_name: message.instance_hint.as_deref(),
            phone_number_id: message.phone_number_id.as_deref(),
        };

        let mut configs = self.repository.find_active_configs(lookup).await?;
        let config = match configs.len() {
            0 => {
                warn!(
                    provider = %message.provider,
                    instance = ?message.instance_hint,
                    phone_number_id = ?message.phone_number_id,
                    "⚠️ No active WhatsApp config for message"
                );
                return Ok(Resolution::NotFound);
            }
            1 => configs.remove(0),
            n => {
                warn!(
                    provider = %message.provider,
                    instance = ?message.instance_hint,
                    matches = n,
                    "⚠️ Ambiguous WhatsApp config, refusing to answer"
                );
                return Ok(Resolution::Ambiguous(n));
            }
        };

        let Some(profile) = self.repository.business_profile(config.user_id).await? else {
            warn!(tenant_id = %config.user_id, "⚠️ Tenant has no professional profile");
            return Ok(Resolution::MissingProfile);
        };

        let contact = self
            .repository
            .find_contact(profile.professional_id, &phone_variants(&message.from))
            .await?;

        if let Some(contact) = &contact {
            if !contact.use_bot {
                info!(tenant_id = %config.user_id, contact_id = %contact.id, "🔕 Bot disabled for contact");
                return Ok(Resolution::OptedOut);
            }
        }

        debug!(tenant_id = %config.user_id, known_contact = contact.is_some(), "🏷️ Tenant resolved");
        Ok(Resolution::Serve(Box::new(ResolvedTenant { config, profile, contact })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTenantRepository;
    use crate::models::{Provider, ProviderCredentials};
    use uuid::Uuid;

    fn message(provider: Provider, instance: Option<&str>, phone_number_id: Option<&str>) -> InboundMessage {
        InboundMessage {
            provider,
            from: "353871234567".to_string(),
            text: "hello".to_string(),
            message_id: "MSG1".to_string(),
            instance_hint: instance.map(str::to_string),
            phone_number_id: phone_number_id.map(str::to_string),
            push_name: None,
        }
    }

    fn seed_tenant(repo: &InMemoryTenantRepository, credentials: ProviderCredentials) -> BusinessProfile {
        let user_id = Uuid::new_v4();
        repo.insert_config(TenantWhatsAppConfig {
            id: Uuid::new_v4(),
            user_id,
            is_active: true,
            credentials,
        });
        let profile = BusinessProfile {
            professional_id: Uuid::new_v4(),
            user_id,
            business_name: "Salon".to_string(),
            bio: None,
            location: None,
            timezone: None,
        };
        repo.insert_profile(profile.clone());
        profile
    }

    fn evolution(instance: &str) -> ProviderCredentials {
        ProviderCredentials::Evolution {
            api_url: "http://evo".to_string(),
            api_key: "k".to_string(),
            instance_name: instance.to_string(),
        }
    }

    fn meta(phone_number_id: &str) -> ProviderCredentials {
        ProviderCredentials::Meta {
            phone_number_id: phone_number_id.to_string(),
            access_token: "t".to_string(),
        }
    }

    #[tokio::test]
    async fn test_evolution_resolves_by_instance() {
        let repo = InMemoryTenantRepository::new();
        let ana = seed_tenant(&repo, evolution("salon-ana"));
        seed_tenant(&repo, evolution("barber-joe"));
        let resolver = TenantResolver::new(Arc::new(repo));

        match resolver.resolve(&message(Provider::Evolution, Some("salon-ana"), None)).await.unwrap() {
            Resolution::Serve(resolved) => assert_eq!(resolved.profile.user_id, ana.user_id),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_matches_are_ambiguous() {
        let repo = InMemoryTenantRepository::new();
        seed_tenant(&repo, meta("PN1"));
        seed_tenant(&repo, meta("PN2"));
        let resolver = TenantResolver::new(Arc::new(repo));

        let resolution = resolver.resolve(&message(Provider::Meta, None, None)).await.unwrap();
        assert!(matches!(resolution, Resolution::Ambiguous(2)));

        // The receiving phone number id disambiguates.
        let resolution = resolver.resolve(&message(Provider::Meta, None, Some("PN2"))).await.unwrap();
        assert!(matches!(resolution, Resolution::Serve(_)));
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let repo = InMemoryTenantRepository::new();
        seed_tenant(&repo, evolution("salon-ana"));
        let resolver = TenantResolver::new(Arc::new(repo));

        let resolution = resolver.resolve(&message(Provider::Evolution, Some("ghost"), None)).await.unwrap();
        assert!(matches!(resolution, Resolution::NotFound));
    }

    #[tokio::test]
    async fn test_contact_with_bot_disabled_is_opted_out() {
        let repo = InMemoryTenantRepository::new();
        let profile = seed_tenant(&repo, evolution("salon-ana"));
        repo.insert_contact(Contact {
            id: Uuid::new_v4(),
            professional_id: profile.professional_id,
            name: Some("Ana".to_string()),
            phone: "+353871234567".to_string(),
            use_bot: false,
        });
        let resolver = TenantResolver::new(Arc::new(repo));

        let resolution = resolver
            .resolve(&message(Provider::Evolution, Some("salon-ana"), None))
            .await
            .unwrap();
        assert!(matches!(resolution, Resolution::OptedOut));
    }
}
