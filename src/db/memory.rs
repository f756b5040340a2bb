//! In-process repositories for local runs and tests.
//!
//! They honor the same contracts as the Postgres implementations, including the
//! per-write serialization of `create_booking`.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use shared::utils::{digits_only, phone_variants};

use super::{BookingRepository, RepositoryError, TenantLookup, TenantRepository};
use crate::models::{
    Booking, BookingError, BookingStatus, BotConfig, BusinessProfile, Contact, NewBooking,
    ProviderCredentials, Service, TenantWhatsAppConfig, WorkingHours,
};

#[derive(Clone, Default)]
pub struct InMemoryTenantRepository {
    configs: Arc<DashMap<Uuid, TenantWhatsAppConfig>>,
    profiles: Arc<DashMap<Uuid, BusinessProfile>>,
    bot_configs: Arc<DashMap<Uuid, BotConfig>>,
    services: Arc<DashMap<Uuid, Vec<Service>>>,
    contacts: Arc<DashMap<Uuid, Vec<Contact>>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_config(&self, config: TenantWhatsAppConfig) {
        self.configs.insert(config.id, config);
    }

    pub fn insert_profile(&self, profile: BusinessProfile) {
        self.profiles.insert(profile.user_id, profile);
    }

    pub fn insert_bot_config(&self, user_id: Uuid, config: BotConfig) {
        self.bot_configs.insert(user_id, config);
    }

    pub fn insert_service(&self, professional_id: Uuid, service: Service) {
        self.services.entry(professional_id).or_default().push(service);
    }

    pub fn insert_contact(&self, contact: Contact) {
        self.contacts.entry(contact.professional_id).or_default().push(contact);
    }

    pub fn contacts(&self, professional_id: Uuid) -> Vec<Contact> {
        self.contacts
            .get(&professional_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

fn matches_lookup(config: &TenantWhatsAppConfig, lookup: &TenantLookup<'_>) -> bool {
    if !config.is_active || config.provider() != lookup.provider {
        return false;
    }
    match &config.credentials {
        ProviderCredentials::Evolution { instance_name, .. } => {
            lookup.instance_name.map_or(true, |hint| hint == instance_name.as_str())
        }
        ProviderCredentials::Meta { phone_number_id, .. } => {
            lookup.phone_number_id.map_or(true, |id| id == phone_number_id.as_str())
        }
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_active_configs(
        &self,
        lookup: TenantLookup<'_>,
    ) -> Result<Vec<TenantWhatsAppConfig>, RepositoryError> {
        Ok(self
            .configs
            .iter()
            .filter(|c| matches_lookup(c.value(), &lookup))
            .map(|c| c.value().clone())
            .collect())
    }

    async fn business_profile(&self, user_id: Uuid) -> Result<Option<BusinessProfile>, RepositoryError> {
        Ok(self.profiles.get(&user_id).map(|p| p.clone()))
    }

    async fn bot_config(&self, user_id: Uuid) -> Result<Option<BotConfig>, RepositoryError> {
        Ok(self.bot_configs.get(&user_id).map(|c| c.clone()))
    }

    async fn services(&self, professional_id: Uuid) -> Result<Vec<Service>, RepositoryError> {
        Ok(self
            .services
            .get(&professional_id)
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn find_contact(
        &self,
        professional_id: Uuid,
        phone_variants: &[String],
    ) -> Result<Option<Contact>, RepositoryError> {
        let Some(first) = phone_variants.first() else {
            return Ok(None);
        };
        let digits = digits_only(first);
        Ok(self.contacts.get(&professional_id).and_then(|contacts| {
            contacts
                .iter()
                .find(|c| phone_variants.iter().any(|v| v == &c.phone))
                .or_else(|| contacts.iter().find(|c| digits_only(&c.phone) == digits))
                .cloned()
        }))
    }

    async fn ensure_contact(
        &self,
        professional_id: Uuid,
        name: &str,
        phone: &str,
    ) -> Result<(), RepositoryError> {
        let variants = phone_variants(phone);
        let mut contacts = self.contacts.entry(professional_id).or_default();
        let digits = digits_only(phone);
        if !contacts
            .iter()
            .any(|c| variants.contains(&c.phone) || digits_only(&c.phone) == digits)
        {
            contacts.push(Contact {
                id: Uuid::new_v4(),
                professional_id,
                name: Some(name.to_string()),
                phone: digits,
                use_bot: true,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBookingRepository {
    working_hours: Arc<DashMap<Uuid, Vec<WorkingHours>>>,
    blocked_dates: Arc<DashMap<Uuid, Vec<NaiveDate>>>,
    // One lock for every booking stands in for the per-(professional, date) advisory lock.
    bookings: Arc<Mutex<Vec<Booking>>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_working_hours(&self, professional_id: Uuid, hours: Vec<WorkingHours>) {
        self.working_hours.insert(professional_id, hours);
    }

    pub fn block_date(&self, professional_id: Uuid, date: NaiveDate) {
        self.blocked_dates.entry(professional_id).or_default().push(date);
    }

    /// Seed an existing booking without any overlap check.
    pub async fn insert_booking(&self, booking: Booking) {
        self.bookings.lock().await.push(booking);
    }

    pub async fn all_bookings(&self) -> Vec<Booking> {
        self.bookings.lock().await.clone()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn working_hours(&self, professional_id: Uuid) -> Result<Vec<WorkingHours>, RepositoryError> {
        Ok(self
            .working_hours
            .get(&professional_id)
            .map(|h| h.clone())
            .unwrap_or_default())
    }

    async fn is_date_blocked(&self, professional_id: Uuid, date: NaiveDate) -> Result<bool, RepositoryError> {
        Ok(self
            .blocked_dates
            .get(&professional_id)
            .map(|dates| dates.contains(&date))
            .unwrap_or(false))
    }

    async fn confirmed_bookings(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .lock()
            .await
            .iter()
            .filter(|b| {
                b.professional_id == professional_id
                    && b.booking_date == date
                    && b.status == BookingStatus::Confirmed
            })
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.start_time);
        Ok(bookings)
    }

    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.lock().await;

        // Give competing writers a chance to run; the held lock must keep them out.
        tokio::task::yield_now().await;

        let taken = bookings.iter().any(|b| {
            b.professional_id == booking.professional_id
                && b.booking_date == booking.booking_date
                && b.status == BookingStatus::Confirmed
                && b.overlaps(booking.start_time, booking.end_time)
        });
        if taken {
            return Err(BookingError::SlotUnavailable {
                date: booking.booking_date,
                start: booking.start_time,
            });
        }

        let created = Booking {
            id: Uuid::new_v4(),
            professional_id: booking.professional_id,
            service_id: booking.service_id,
            booking_date: booking.booking_date,
            start_time: booking.start_time,
            end_time: booking.end_time,
            client_name: booking.client_name,
            client_phone: booking.client_phone,
            status: BookingStatus::Confirmed,
            notes: booking.notes,
        };
        bookings.push(created.clone());
        Ok(created)
    }
}
