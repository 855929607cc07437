// Booking logic: which dates and slots can be offered, creating appointments,
// listing a patient's appointments and the 24-hour cancellation rule.
//
// Like every core service this has no Telegram types in it. Times are clinic
// local time (`NaiveDateTime` in the configured zone) because that is what the
// sheet holds.

use crate::core::catalog::ClinicCatalog;
use crate::core::records::{
    dedup_latest, Appointment, ClinicStore, NewAppointment, StoreError, DATE_FORMAT,
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// How many days ahead the booking calendar reaches.
pub const BOOKING_HORIZON_DAYS: i64 = 14;

/// Minimum notice for a patient-initiated cancellation.
pub const CANCELLATION_NOTICE_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Slot {time} on {date} is already taken")]
    SlotTaken { date: String, time: String },

    #[error("{0} is not a bookable time")]
    UnknownSlot(String),

    #[error("Appointments can only be cancelled more than 24 hours in advance")]
    TooLate,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Appointment date or time cannot be parsed")]
    Unparseable,

    #[error("Appointment not found")]
    NotFound,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub struct BookingService<S: ClinicStore + ?Sized> {
    store: Arc<S>,
    catalog: Arc<ClinicCatalog>,
    timezone: Tz,
    /// Held from the slot check until the row is written.
    booking_lock: Mutex<()>,
}

impl<S: ClinicStore + ?Sized> BookingService<S> {
    pub fn new(store: Arc<S>, catalog: Arc<ClinicCatalog>, timezone: Tz) -> Self {
        Self {
            store,
            catalog,
            timezone,
            booking_lock: Mutex::new(()),
        }
    }

    /// Current wall-clock time at the clinic.
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }

    /// Weekdays within the booking horizon, starting tomorrow.
    pub fn available_dates(today: NaiveDate) -> Vec<String> {
        (1..=BOOKING_HORIZON_DAYS)
            .map(|offset| today + Duration::days(offset))
            .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
            .map(|day| day.format(DATE_FORMAT).to_string())
            .collect()
    }

    /// Whether `date` is still offered by the calendar starting at `today`.
    pub fn is_bookable_date(today: NaiveDate, date: &str) -> bool {
        Self::available_dates(today).iter().any(|d| d == date)
    }

    /// Times already held by non-cancelled appointments for this doctor and date.
    pub async fn booked_times(&self, doctor: &str, date: &str) -> Result<HashSet<String>, BookingError> {
        let appointments = dedup_latest(self.store.list_appointments().await?);
        Ok(appointments
            .into_iter()
            .filter(|a| a.doctor == doctor && a.date == date && !a.status.is_cancelled())
            .map(|a| a.time)
            .collect())
    }

    /// Catalog times still free for this doctor and date, in catalog order.
    pub async fn free_slots(&self, doctor: &str, date: &str) -> Result<Vec<String>, BookingError> {
        let booked = self.booked_times(doctor, date).await?;
        Ok(self
            .catalog
            .available_times
            .iter()
            .filter(|t| !booked.contains(*t))
            .cloned()
            .collect())
    }

    /// Persist a new appointment.
    ///
    /// The same patient booking the same slot again replaces their earlier row;
    /// a slot held by someone else is rejected.
    pub async fn book(&self, request: NewAppointment) -> Result<Appointment, BookingError> {
        if !self.catalog.available_times.contains(&request.time) {
            return Err(BookingError::UnknownSlot(request.time));
        }

        let _guard = self.booking_lock.lock().await;
        let taken_by_other = dedup_latest(self.store.list_appointments().await?)
            .iter()
            .any(|a| {
                a.doctor == request.doctor
                    && a.date == request.date
                    && a.time == request.time
                    && !a.status.is_cancelled()
                    && !a.belongs_to(request.user_id)
            });
        if taken_by_other {
            return Err(BookingError::SlotTaken {
                date: request.date,
                time: request.time,
            });
        }

        let appointment = request.into_appointment(self.now());
        self.store.add_appointment(appointment.clone()).await?;
        tracing::info!(
            user_id = %appointment.user_id,
            doctor = %appointment.doctor,
            date = %appointment.date,
            time = %appointment.time,
            "Appointment booked"
        );
        Ok(appointment)
    }

    /// A patient's appointments, newest first, one row per slot.
    pub async fn appointments_for_user(&self, user_id: u64) -> Result<Vec<Appointment>, BookingError> {
        let mine: Vec<Appointment> = self
            .store
            .list_appointments()
            .await?
            .into_iter()
            .filter(|a| a.belongs_to(user_id))
            .collect();

        let mut mine = dedup_latest(mine);
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    /// Whether the patient may still cancel this appointment at `now`.
    pub fn can_cancel(appointment: &Appointment, now: NaiveDateTime) -> bool {
        Self::check_cancellable(appointment, now).is_ok()
    }

    fn check_cancellable(appointment: &Appointment, now: NaiveDateTime) -> Result<(), BookingError> {
        if appointment.status.is_cancelled() {
            return Err(BookingError::AlreadyCancelled);
        }
        let starts_at = appointment.starts_at().ok_or(BookingError::Unparseable)?;
        if starts_at - now <= Duration::hours(CANCELLATION_NOTICE_HOURS) {
            return Err(BookingError::TooLate);
        }
        Ok(())
    }

    /// Cancel (delete) one of the patient's own appointments.
    pub async fn cancel(
        &self,
        user_id: u64,
        appointment: &Appointment,
        now: NaiveDateTime,
    ) -> Result<(), BookingError> {
        if !appointment.belongs_to(user_id) {
            return Err(BookingError::NotFound);
        }
        Self::check_cancellable(appointment, now)?;

        if !self.store.delete_appointment(&appointment.key()).await? {
            return Err(BookingError::NotFound);
        }
        tracing::info!(
            user_id,
            date = %appointment.date,
            time = %appointment.time,
            doctor = %appointment.doctor,
            "Appointment cancelled by patient"
        );
        Ok(())
    }
}
