// ============================================================================
// AVAILABILITY & CONFLICT RESOLVER
// ============================================================================
// Slot generation is a pure function of the day's schedule; booking creation
// re-validates the request and leaves the overlap check to the repository,
// which serializes writers.
// ============================================================================

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{BookingRepository, RepositoryError};
use crate::models::{Booking, BookingError, NewBooking, Service, TimeSlot, WorkingHours};
use crate::observability::record_booking_outcome;

/// Distance between candidate slot starts.
pub const SLOT_STRIDE_MINUTES: i64 = 30;

const MINUTES_PER_DAY: i64 = 24 * 60;

fn minutes_of(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) / 60
}

fn time_from_minutes(minutes: i64) -> Option<NaiveTime> {
    if !(0..MINUTES_PER_DAY).contains(&minutes) {
        return None;
    }
    NaiveTime::from_hms_opt((minutes / 60) as u32, (minutes % 60) as u32, 0)
}

/// 0 = Sunday .. 6 = Saturday, matching `working_hours.day_of_week`.
pub fn day_of_week(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

/// Parse an IANA zone name, falling back to `default`, then to Europe/Dublin.
pub fn resolve_timezone(name: Option<&str>, default: &str) -> Tz {
    name.and_then(|n| n.trim().parse::<Tz>().ok())
        .or_else(|| default.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::Europe::Dublin)
}

/// One day of a professional's calendar, as needed for slot generation.
#[derive(Debug, Clone, Copy)]
pub struct DaySchedule<'a> {
    pub date: NaiveDate,
    pub working_hours: &'a [WorkingHours],
    pub is_blocked: bool,
    pub confirmed_bookings: &'a [Booking],
}

impl DaySchedule<'_> {
    fn hours(&self) -> Option<&WorkingHours> {
        let dow = day_of_week(self.date);
        self.working_hours
            .iter()
            .find(|h| h.day_of_week == dow && h.is_available)
    }
}

/// Free start times for a service of `duration_minutes` on `schedule.date`.
///
/// `now` is wall-clock time in the tenant timezone. Past dates yield nothing and
/// on today's date slots that already started are dropped.
pub fn compute_available_slots(
    schedule: &DaySchedule<'_>,
    duration_minutes: i64,
    now: NaiveDateTime,
) -> Vec<TimeSlot> {
    if schedule.is_blocked || duration_minutes <= 0 || schedule.date < now.date() {
        return Vec::new();
    }
    let Some(hours) = schedule.hours() else {
        return Vec::new();
    };

    let work_start = minutes_of(hours.start_time);
    let work_end = minutes_of(hours.end_time);
    let cutoff = (schedule.date == now.date()).then(|| now.time());

    let mut slots = Vec::new();
    let mut start = work_start;
    while start + duration_minutes <= work_end {
        let (Some(slot_start), Some(slot_end)) =
            (time_from_minutes(start), time_from_minutes(start + duration_minutes))
        else {
            break;
        };

        let taken = schedule
            .confirmed_bookings
            .iter()
            .any(|b| b.overlaps(slot_start, slot_end));
        let passed = cutoff.is_some_and(|now| slot_start <= now);

        if !taken && !passed {
            slots.push(TimeSlot { start: slot_start, end: slot_end });
        }
        start += SLOT_STRIDE_MINUTES;
    }

    slots
}

/// Validated booking intent produced by the agent.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub professional_id: Uuid,
    pub service: Service,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub client_name: String,
    pub client_phone: String,
    pub notes: Option<String>,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AvailabilityService {
    repository: Arc<dyn BookingRepository>,
    clock: Clock,
}

impl AvailabilityService {
    pub fn new(repository: Arc<dyn BookingRepository>) -> Self {
        Self {
            repository,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, for deterministic tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now_in(&self, tz: Tz) -> NaiveDateTime {
        (self.clock)().with_timezone(&tz).naive_local()
    }

    pub async fn available_slots(
        &self,
        professional_id: Uuid,
        service: &Service,
        date: NaiveDate,
        tz: Tz,
    ) -> Result<Vec<TimeSlot>, RepositoryError> {
        if self.repository.is_date_blocked(professional_id, date).await? {
            return Ok(Vec::new());
        }
        let working_hours = self.repository.working_hours(professional_id).await?;
        let bookings = self.repository.confirmed_bookings(professional_id, date).await?;

        let schedule = DaySchedule {
            date,
            working_hours: &working_hours,
            is_blocked: false,
            confirmed_bookings: &bookings,
        };
        Ok(compute_available_slots(
            &schedule,
            i64::from(service.duration_minutes),
            self.now_in(tz),
        ))
    }

    /// Create a confirmed booking if the requested start is bookable.
    ///
    /// Date and hours checks happen here; the overlap check is repeated by the
    /// repository under its lock, which is the authoritative one.
    pub async fn create_booking_if_available(
        &self,
        request: BookingRequest,
        tz: Tz,
    ) -> Result<Booking, BookingError> {
        let result = self.try_create(request, tz).await;
        match &result {
            Ok(_) => record_booking_outcome("confirmed"),
            Err(e) => record_booking_outcome(e.metric_label()),
        }
        result
    }

    async fn try_create(&self, request: BookingRequest, tz: Tz) -> Result<Booking, BookingError> {
        let date = request.date;
        let start = request.start_time;
        let duration = i64::from(request.service.duration_minutes);
        if duration <= 0 {
            return Err(BookingError::InvalidRequest(format!(
                "service {} has no duration",
                request.service.name
            )));
        }

        if date.and_time(start) <= self.now_in(tz) {
            return Err(BookingError::InPast { date, start });
        }

        if self.repository.is_date_blocked(request.professional_id, date).await? {
            return Err(BookingError::DateBlocked(date));
        }

        let end_minutes = minutes_of(start) + duration;
        let end = time_from_minutes(end_minutes)
            .ok_or(BookingError::OutsideWorkingHours { date, start })?;

        let working_hours = self.repository.working_hours(request.professional_id).await?;
        let dow = day_of_week(date);
        let within_hours = working_hours.iter().any(|h| {
            h.day_of_week == dow
                && h.is_available
                && start >= h.start_time
                && end_minutes <= minutes_of(h.end_time)
        });
        if !within_hours {
            return Err(BookingError::OutsideWorkingHours { date, start });
        }

        let booking = self
            .repository
            .create_booking(NewBooking {
                professional_id: request.professional_id,
                service_id: request.service.id,
                booking_date: date,
                start_time: start,
                end_time: end,
                client_name: request.client_name,
                client_phone: request.client_phone,
                notes: request.notes,
            })
            .await;

        match &booking {
            Ok(b) => info!(booking_id = %b.id, date = %date, start = %start, "✅ Booking confirmed"),
            Err(e) => warn!(date = %date, start = %start, error = %e, "⚠️ Booking rejected"),
        }
        booking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryBookingRepository;
    use crate::models::BookingStatus;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2026-10-20 is a Tuesday.
    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
    }

    fn nine_to_six(day_of_week: i16) -> WorkingHours {
        WorkingHours {
            day_of_week,
            start_time: t(9, 0),
            end_time: t(18, 0),
            is_available: true,
        }
    }

    fn booking(professional_id: Uuid, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            professional_id,
            service_id: Uuid::new_v4(),
            booking_date: date,
            start_time: start,
            end_time: end,
            client_name: "Existing".to_string(),
            client_phone: "353870000000".to_string(),
            status: BookingStatus::Confirmed,
            notes: None,
        }
    }

    fn service(minutes: i32) -> Service {
        Service {
            id: Uuid::new_v4(),
            name: "Haircut".to_string(),
            duration_minutes: minutes,
            price: None,
        }
    }

    fn long_ago() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_time(t(0, 0))
    }

    #[test]
    fn test_slots_exclude_overlaps_with_existing_booking() {
        let hours = vec![nine_to_six(2)];
        let existing = vec![booking(Uuid::new_v4(), tuesday(), t(10, 0), t(11, 0))];
        let schedule = DaySchedule {
            date: tuesday(),
            working_hours: &hours,
            is_blocked: false,
            confirmed_bookings: &existing,
        };

        let starts: Vec<NaiveTime> = compute_available_slots(&schedule, 60, long_ago())
            .into_iter()
            .map(|s| s.start)
            .collect();

        assert!(starts.contains(&t(9, 0)));
        assert!(!starts.contains(&t(9, 30)));
        assert!(!starts.contains(&t(10, 0)));
        assert!(!starts.contains(&t(10, 30)));
        assert!(starts.contains(&t(11, 0)));
        assert!(starts.contains(&t(11, 30)));
        assert_eq!(starts.last(), Some(&t(17, 0)));
    }

    #[test]
    fn test_blocked_date_and_closed_day_yield_nothing() {
        let hours = vec![nine_to_six(2)];
        let blocked = DaySchedule {
            date: tuesday(),
            working_hours: &hours,
            is_blocked: true,
            confirmed_bookings: &[],
        };
        assert!(compute_available_slots(&blocked, 30, long_ago()).is_empty());

        let wednesday = DaySchedule {
            date: tuesday().succ_opt().unwrap(),
            working_hours: &hours,
            is_blocked: false,
            confirmed_bookings: &[],
        };
        assert!(compute_available_slots(&wednesday, 30, long_ago()).is_empty());
    }

    #[test]
    fn test_today_cutoff_drops_started_slots() {
        let hours = vec![nine_to_six(2)];
        let schedule = DaySchedule {
            date: tuesday(),
            working_hours: &hours,
            is_blocked: false,
            confirmed_bookings: &[],
        };

        let now = tuesday().and_time(t(13, 10));
        let slots = compute_available_slots(&schedule, 60, now);
        assert_eq!(slots.first().map(|s| s.start), Some(t(13, 30)));

        let tomorrow_now = tuesday().succ_opt().unwrap().and_time(t(8, 0));
        assert!(compute_available_slots(&schedule, 60, tomorrow_now).is_empty());
    }

    #[test]
    fn test_resolve_timezone_falls_back() {
        assert_eq!(resolve_timezone(Some("America/Sao_Paulo"), "Europe/Dublin"), chrono_tz::America::Sao_Paulo);
        assert_eq!(resolve_timezone(Some("Mars/Olympus"), "Europe/Lisbon"), chrono_tz::Europe::Lisbon);
        assert_eq!(resolve_timezone(None, "nonsense"), chrono_tz::Europe::Dublin);
    }

    fn service_at(now: DateTime<Utc>) -> (AvailabilityService, InMemoryBookingRepository, Uuid) {
        let repo = InMemoryBookingRepository::new();
        let professional = Uuid::new_v4();
        repo.set_working_hours(professional, vec![nine_to_six(2)]);
        let availability = AvailabilityService::new(Arc::new(repo.clone())).with_clock(move || now);
        (availability, repo, professional)
    }

    fn request(professional_id: Uuid, date: NaiveDate, start: NaiveTime) -> BookingRequest {
        BookingRequest {
            professional_id,
            service: service(60),
            date,
            start_time: start,
            client_name: "Ana Silva".to_string(),
            client_phone: "353871234567".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_booking_validates_hours_blocked_and_past() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let (availability, repo, professional) = service_at(now);
        let tz = chrono_tz::Europe::Dublin;

        let err = availability
            .create_booking_if_available(request(professional, tuesday(), t(17, 30)), tz)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::OutsideWorkingHours { .. }));

        let err = availability
            .create_booking_if_available(request(professional, NaiveDate::from_ymd_opt(2026, 10, 13).unwrap(), t(10, 0)), tz)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InPast { .. }));

        repo.block_date(professional, tuesday());
        let err = availability
            .create_booking_if_available(request(professional, tuesday(), t(10, 0)), tz)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::DateBlocked(_)));
    }

    #[tokio::test]
    async fn test_concurrent_overlapping_requests_book_once() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let (availability, repo, professional) = service_at(now);

        let handles: Vec<_> = [t(14, 0), t(14, 30), t(14, 0), t(14, 15)]
            .into_iter()
            .map(|start| {
                let availability = availability.clone();
                tokio::spawn(async move {
                    availability
                        .create_booking_if_available(request(professional, tuesday(), start), chrono_tz::Europe::Dublin)
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let confirmed = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        assert_eq!(confirmed, 1);

        let bookings = repo.all_bookings().await;
        assert_eq!(bookings.len(), 1);
    }

    #[tokio::test]
    async fn test_available_slots_reflect_new_booking() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let (availability, _repo, professional) = service_at(now);
        let tz = chrono_tz::Europe::Dublin;
        let haircut = service(60);

        let before = availability.available_slots(professional, &haircut, tuesday(), tz).await.unwrap();
        availability
            .create_booking_if_available(request(professional, tuesday(), t(14, 0)), tz)
            .await
            .unwrap();
        let after = availability.available_slots(professional, &haircut, tuesday(), tz).await.unwrap();

        assert!(before.iter().any(|s| s.start == t(14, 0)));
        assert!(!after.iter().any(|s| s.start == t(14, 0) || s.start == t(13, 30) || s.start == t(14, 30)));
    }
}
