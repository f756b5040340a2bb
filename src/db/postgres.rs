// ============================================================================
// POSTGRES REPOSITORIES
// ============================================================================
// Runtime-checked queries (`query_as::<_, Row>`) against the tables created in
// `migrations/`. Row structs stay private; callers only see domain models.
// ============================================================================

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared::utils::{digits_only, phone_variants};

use super::{BookingRepository, RepositoryError, TenantLookup, TenantRepository};
use crate::models::{
    Booking, BookingError, BookingStatus, BotConfig, BotPersonality, BusinessProfile, Contact,
    NewBooking, ProviderCredentials, Service, TenantWhatsAppConfig, WorkingHours,
};

/// Postgres `exclusion_violation`.
const EXCLUSION_VIOLATION: &str = "23P01";

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, FromRow)]
struct WhatsAppConfigRow {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    is_active: bool,
    phone_number_id: Option<String>,
    access_token: Option<String>,
    evolution_api_url: Option<String>,
    evolution_api_key: Option<String>,
    evolution_instance: Option<String>,
}

impl TryFrom<WhatsAppConfigRow> for TenantWhatsAppConfig {
    type Error = RepositoryError;

    fn try_from(row: WhatsAppConfigRow) -> Result<Self, Self::Error> {
        let missing = |field: &str| {
            RepositoryError::InvalidRow(format!("whatsapp_config {} has no {}", row.id, field))
        };

        let credentials = match row.provider.as_str() {
            "meta" => ProviderCredentials::Meta {
                phone_number_id: row.phone_number_id.clone().ok_or_else(|| missing("phone_number_id"))?,
                access_token: row.access_token.clone().ok_or_else(|| missing("access_token"))?,
            },
            "evolution" => ProviderCredentials::Evolution {
                api_url: row.evolution_api_url.clone().ok_or_else(|| missing("evolution_api_url"))?,
                api_key: row.evolution_api_key.clone().ok_or_else(|| missing("evolution_api_key"))?,
                instance_name: row.evolution_instance.clone().ok_or_else(|| missing("evolution_instance"))?,
            },
            other => {
                return Err(RepositoryError::InvalidRow(format!(
                    "whatsapp_config {} has unknown provider {}",
                    row.id, other
                )))
            }
        };

        Ok(TenantWhatsAppConfig {
            id: row.id,
            user_id: row.user_id,
            is_active: row.is_active,
            credentials,
        })
    }
}

#[derive(Debug, FromRow)]
struct BotConfigRow {
    bot_name: Option<String>,
    personality: Option<String>,
    auto_book_if_available: Option<bool>,
    always_confirm_booking: Option<bool>,
    ask_for_additional_info: Option<bool>,
    greeting_message: Option<String>,
    unavailable_message: Option<String>,
    confirmation_message: Option<String>,
    custom_system_prompt: Option<String>,
    max_context_messages: Option<i32>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<BotConfigRow> for BotConfig {
    fn from(row: BotConfigRow) -> Self {
        let defaults = BotConfig::default();
        BotConfig {
            bot_name: non_blank(row.bot_name),
            personality: BotPersonality::from_db(row.personality.as_deref()),
            auto_book_if_available: row.auto_book_if_available.unwrap_or(defaults.auto_book_if_available),
            always_confirm_booking: row.always_confirm_booking.unwrap_or(defaults.always_confirm_booking),
            ask_for_additional_info: row.ask_for_additional_info.unwrap_or(defaults.ask_for_additional_info),
            greeting_message: non_blank(row.greeting_message),
            unavailable_message: non_blank(row.unavailable_message),
            confirmation_message: non_blank(row.confirmation_message),
            custom_system_prompt: non_blank(row.custom_system_prompt),
            max_context_messages: row
                .max_context_messages
                .filter(|n| *n > 0)
                .map(|n| n as usize),
        }
    }
}

#[derive(Debug, FromRow)]
struct ProfessionalRow {
    id: Uuid,
    user_id: Uuid,
    business_name: String,
    bio: Option<String>,
    location: Option<String>,
    timezone: Option<String>,
}

#[derive(Debug, FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    duration_minutes: i32,
    price: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct ContactRow {
    id: Uuid,
    professional_id: Uuid,
    name: Option<String>,
    phone: String,
    use_bot: Option<bool>,
}

#[derive(Debug, FromRow)]
struct WorkingHoursRow {
    day_of_week: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
    is_available: bool,
}

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    professional_id: Uuid,
    service_id: Uuid,
    booking_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    client_name: String,
    client_phone: String,
    status: String,
    notes: Option<String>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = RepositoryError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::from_db(&row.status).ok_or_else(|| {
            RepositoryError::InvalidRow(format!("booking {} has unknown status {}", row.id, row.status))
        })?;
        Ok(Booking {
            id: row.id,
            professional_id: row.professional_id,
            service_id: row.service_id,
            booking_date: row.booking_date,
            start_time: row.start_time,
            end_time: row.end_time,
            client_name: row.client_name,
            client_phone: row.client_phone,
            status,
            notes: row.notes,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, professional_id, service_id, booking_date, start_time, end_time, \
                               client_name, client_phone, status, notes";

// ============================================================================
// TENANT REPOSITORY
// ============================================================================

#[derive(Clone)]
pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn find_active_configs(
        &self,
        lookup: TenantLookup<'_>,
    ) -> Result<Vec<TenantWhatsAppConfig>, RepositoryError> {
        let rows = sqlx::query_as::<_, WhatsAppConfigRow>(
            r#"
            SELECT id, user_id, provider, is_active, phone_number_id, access_token,
                   evolution_api_url, evolution_api_key, evolution_instance
            FROM whatsapp_config
            WHERE is_active = true
              AND provider = $1
              AND ($2::text IS NULL OR evolution_instance = $2)
              AND ($3::text IS NULL OR phone_number_id = $3)
            "#,
        )
        .bind(lookup.provider.as_str())
        .bind(lookup.instance_name)
        .bind(lookup.phone_number_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(provider = %lookup.provider, matches = rows.len(), "🔍 WhatsApp config lookup");

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            match TenantWhatsAppConfig::try_from(row) {
                Ok(config) => configs.push(config),
                // A half-configured row cannot answer anyone; skip it.
                Err(e) => warn!(error = %e, "⚠️ Skipping unusable WhatsApp config"),
            }
        }
        Ok(configs)
    }

    async fn business_profile(&self, user_id: Uuid) -> Result<Option<BusinessProfile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfessionalRow>(
            r#"
            SELECT id, user_id, business_name, bio,
                   NULLIF(CONCAT_WS(', ', NULLIF(address, ''), NULLIF(city, '')), '') AS location,
                   timezone
            FROM professionals
            WHERE user_id = $1
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BusinessProfile {
            professional_id: r.id,
            user_id: r.user_id,
            business_name: r.business_name,
            bio: non_blank(r.bio),
            location: r.location,
            timezone: non_blank(r.timezone),
        }))
    }

    async fn bot_config(&self, user_id: Uuid) -> Result<Option<BotConfig>, RepositoryError> {
        let row = sqlx::query_as::<_, BotConfigRow>(
            r#"
            SELECT bot_name, personality, auto_book_if_available, always_confirm_booking,
                   ask_for_additional_info, greeting_message, unavailable_message,
                   confirmation_message, custom_system_prompt, max_context_messages
            FROM bot_config
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BotConfig::from))
    }

    async fn services(&self, professional_id: Uuid) -> Result<Vec<Service>, RepositoryError> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT id, name, duration_minutes, price
            FROM services
            WHERE professional_id = $1 AND is_active = true
            ORDER BY name
            "#,
        )
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Service {
                id: r.id,
                name: r.name,
                duration_minutes: r.duration_minutes,
                price: r.price,
            })
            .collect())
    }

    async fn find_contact(
        &self,
        professional_id: Uuid,
        phone_variants: &[String],
    ) -> Result<Option<Contact>, RepositoryError> {
        if phone_variants.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT id, professional_id, name, phone, use_bot
            FROM contacts
            WHERE professional_id = $1
              AND (phone = ANY($2) OR regexp_replace(phone, '[^0-9]', '', 'g') = $3)
            ORDER BY (phone = ANY($2)) DESC
            LIMIT 1
            "#,
        )
        .bind(professional_id)
        .bind(phone_variants)
        .bind(digits_only(&phone_variants[0]))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Contact {
            id: r.id,
            professional_id: r.professional_id,
            name: r.name,
            phone: r.phone,
            use_bot: r.use_bot.unwrap_or(true),
        }))
    }

    async fn ensure_contact(
        &self,
        professional_id: Uuid,
        name: &str,
        phone: &str,
    ) -> Result<(), RepositoryError> {
        let variants = phone_variants(phone);
        let result = sqlx::query(
            r#"
            INSERT INTO contacts (id, professional_id, name, phone, use_bot)
            SELECT $1, $2, $3, $4, true
            WHERE NOT EXISTS (
                SELECT 1 FROM contacts
                WHERE professional_id = $2
                  AND (phone = ANY($5) OR regexp_replace(phone, '[^0-9]', '', 'g') = $4)
            )
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(professional_id)
        .bind(name)
        .bind(digits_only(phone))
        .bind(&variants)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(professional_id = %professional_id, "👤 Contact created from booking");
        }
        Ok(())
    }
}

// ============================================================================
// BOOKING REPOSITORY
// ============================================================================

#[derive(Clone)]
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error, booking: &NewBooking) -> BookingError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(EXCLUSION_VIOLATION) {
            return BookingError::SlotUnavailable {
                date: booking.booking_date,
                start: booking.start_time,
            };
        }
    }
    BookingError::from(err)
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn working_hours(&self, professional_id: Uuid) -> Result<Vec<WorkingHours>, RepositoryError> {
        let rows = sqlx::query_as::<_, WorkingHoursRow>(
            r#"
            SELECT day_of_week, start_time, end_time, is_available
            FROM working_hours
            WHERE professional_id = $1
            ORDER BY day_of_week
            "#,
        )
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| WorkingHours {
                day_of_week: r.day_of_week,
                start_time: r.start_time,
                end_time: r.end_time,
                is_available: r.is_available,
            })
            .collect())
    }

    async fn is_date_blocked(&self, professional_id: Uuid, date: NaiveDate) -> Result<bool, RepositoryError> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM blocked_dates WHERE professional_id = $1 AND blocked_date = $2
            )
            "#,
        )
        .bind(professional_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(blocked)
    }

    async fn confirmed_bookings(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE professional_id = $1 AND booking_date = $2 AND status = 'confirmed'
            ORDER BY start_time
            "#
        ))
        .bind(professional_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, BookingError> {
        let mut tx = self.pool.begin().await?;

        // Serialize writers per (professional, date)
        let lock_key = format!("{}:{}", booking.professional_id, booking.booking_date);
        sqlx::query(r#"SELECT pg_advisory_xact_lock(hashtext($1)::bigint)"#)
            .bind(&lock_key)
            .execute(&mut *tx)
            .await?;

        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bookings
                WHERE professional_id = $1
                  AND booking_date = $2
                  AND status = 'confirmed'
                  AND start_time < $4
                  AND end_time > $3
            )
            "#,
        )
        .bind(booking.professional_id)
        .bind(booking.booking_date)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .fetch_one(&mut *tx)
        .await?;

        if taken {
            // Dropping the transaction rolls back and releases the lock.
            return Err(BookingError::SlotUnavailable {
                date: booking.booking_date,
                start: booking.start_time,
            });
        }

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings
                (id, professional_id, service_id, booking_date, start_time, end_time,
                 client_name, client_phone, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'confirmed', $9)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(booking.professional_id)
        .bind(booking.service_id)
        .bind(booking.booking_date)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(&booking.client_name)
        .bind(&booking.client_phone)
        .bind(&booking.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, &booking))?;

        tx.commit().await.map_err(|e| map_insert_error(e, &booking))?;

        let created = Booking::try_from(row)?;
        info!(
            booking_id = %created.id,
            professional_id = %created.professional_id,
            date = %created.booking_date,
            start = %created.start_time,
            "📅 Booking created"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;

    fn config_row(provider: &str) -> WhatsAppConfigRow {
        WhatsAppConfigRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: provider.to_string(),
            is_active: true,
            phone_number_id: Some("PNID".to_string()),
            access_token: Some("token".to_string()),
            evolution_api_url: None,
            evolution_api_key: None,
            evolution_instance: None,
        }
    }

    #[test]
    fn test_meta_row_converts_to_meta_credentials() {
        let config = TenantWhatsAppConfig::try_from(config_row("meta")).unwrap();
        assert_eq!(config.provider(), Provider::Meta);
    }

    #[test]
    fn test_evolution_row_without_instance_is_rejected() {
        let err = TenantWhatsAppConfig::try_from(config_row("evolution")).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRow(_)));
    }

    #[test]
    fn test_bot_config_row_blank_strings_and_defaults() {
        let config = BotConfig::from(BotConfigRow {
            bot_name: Some("  ".to_string()),
            personality: Some("Casual".to_string()),
            auto_book_if_available: None,
            always_confirm_booking: Some(true),
            ask_for_additional_info: None,
            greeting_message: Some(String::new()),
            unavailable_message: None,
            confirmation_message: Some("Done {name}".to_string()),
            custom_system_prompt: None,
            max_context_messages: Some(0),
        });

        assert_eq!(config.bot_name, None);
        assert_eq!(config.personality, BotPersonality::Casual);
        assert!(config.auto_book_if_available);
        assert!(config.always_confirm_booking);
        assert_eq!(config.greeting_message, None);
        assert_eq!(config.confirmation_message.as_deref(), Some("Done {name}"));
        assert_eq!(config.max_context_messages, None);
    }

    #[test]
    fn test_unknown_booking_status_is_invalid_row() {
        let row = BookingRow {
            id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            booking_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            client_name: "Ana".to_string(),
            client_phone: "353871234567".to_string(),
            status: "pending".to_string(),
            notes: None,
        };
        assert!(Booking::try_from(row).is_err());
    }

    #[test]
    fn test_schema_statements_are_rerunnable() {
        let schema = include_str!("../../migrations/0001_booking_pipeline.sql");
        for line in schema.lines().map(str::trim) {
            if line.starts_with("CREATE TABLE")
                || line.starts_with("CREATE INDEX")
                || line.starts_with("CREATE UNIQUE INDEX")
                || line.starts_with("CREATE EXTENSION")
            {
                assert!(line.contains("IF NOT EXISTS"), "not guarded: {}", line);
            }
        }
        // The overlap constraint is only added when missing.
        let guard = schema.find("WHERE conname = 'bookings_no_confirmed_overlap'").unwrap();
        let alter = schema.find("ADD CONSTRAINT bookings_no_confirmed_overlap").unwrap();
        assert!(guard < alter);
        assert_eq!(schema.matches("ADD CONSTRAINT").count(), 1);
    }
}
