// ============================================================================
// PERSISTENCE SEAMS
// ============================================================================
// Tenant data is read-only for the pipeline; bookings and contacts are the
// only writes. `postgres` backs production, `memory` backs local runs and tests.
// ============================================================================

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    Booking, BookingError, BotConfig, BusinessProfile, Contact, NewBooking, Provider, Service,
    TenantWhatsAppConfig, WorkingHours,
};

pub use memory::{InMemoryBookingRepository, InMemoryTenantRepository};
pub use postgres::{PgBookingRepository, PgTenantRepository};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

/// Filters for resolving the tenant that owns an inbound message.
#[derive(Debug, Clone, Copy)]
pub struct TenantLookup<'a> {
    pub provider: Provider,
    pub instance_name: Option<&'a str>,
    pub phone_number_id: Option<&'a str>,
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Active WhatsApp configs matching the lookup. More than one row is an
    /// ambiguity the caller must reject.
    async fn find_active_configs(
        &self,
        lookup: TenantLookup<'_>,
    ) -> Result<Vec<TenantWhatsAppConfig>, RepositoryError>;

    async fn business_profile(&self, user_id: Uuid) -> Result<Option<BusinessProfile>, RepositoryError>;

    async fn bot_config(&self, user_id: Uuid) -> Result<Option<BotConfig>, RepositoryError>;

    /// Active services only.
    async fn services(&self, professional_id: Uuid) -> Result<Vec<Service>, RepositoryError>;

    /// First contact whose stored phone equals any of `phone_variants`.
    async fn find_contact(
        &self,
        professional_id: Uuid,
        phone_variants: &[String],
    ) -> Result<Option<Contact>, RepositoryError>;

    /// Create the contact if no row exists for the phone; existing rows are untouched.
    async fn ensure_contact(
        &self,
        professional_id: Uuid,
        name: &str,
        phone: &str,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn working_hours(&self, professional_id: Uuid) -> Result<Vec<WorkingHours>, RepositoryError>;

    async fn is_date_blocked(&self, professional_id: Uuid, date: NaiveDate) -> Result<bool, RepositoryError>;

    async fn confirmed_bookings(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError>;

    /// Insert a confirmed booking unless it overlaps an existing confirmed one.
    ///
    /// Implementations serialize per (professional, date) so two concurrent
    /// overlapping requests can never both succeed.
    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, BookingError>;
}

impl From<RepositoryError> for BookingError {
    fn from(err: RepositoryError) -> Self {
        BookingError::Database(err.to_string())
    }
}
