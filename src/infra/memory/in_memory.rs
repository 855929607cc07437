// In-memory implementation of ClinicStore.
//
// Keeps rows in insertion order, the same way a worksheet does, so service
// tests observe the ordering the spreadsheet backend produces.

use crate::core::records::{
    dedup_latest, Appointment, AppointmentKey, ClinicStore, Consultation, ExportTarget, Review,
    StoreError, SubscribeOutcome, Subscriber,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    appointments: Vec<Appointment>,
    reviews: Vec<Review>,
    consultations: Vec<Consultation>,
    subscribers: Vec<Subscriber>,
}

#[derive(Default)]
pub struct InMemoryClinicStore {
    tables: RwLock<Tables>,
    failing: AtomicBool,
}

impl InMemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail until switched back, like an unreachable backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Stand-in for an administrator editing the sheet by hand.
    pub async fn set_appointment_status(&self, key: &AppointmentKey, status: &str) -> bool {
        let mut tables = self.tables.write().await;
        match tables.appointments.iter_mut().find(|a| &a.key() == key) {
            Some(row) => {
                row.status = crate::core::records::AppointmentStatus::from_cell(status);
                true
            }
            None => false,
        }
    }

    pub async fn set_review_status(&self, index: usize, status: &str) -> bool {
        let mut tables = self.tables.write().await;
        match tables.reviews.get_mut(index) {
            Some(row) => {
                row.status = crate::core::records::ReviewStatus::from_cell(status);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ClinicStore for InMemoryClinicStore {
    fn describe(&self) -> String {
        "in-memory".to_string()
    }

    async fn add_appointment(&self, appointment: Appointment) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let mut rows = std::mem::take(&mut tables.appointments);
        rows.push(appointment);
        tables.appointments = dedup_latest(rows);
        Ok(())
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        self.check_available()?;
        // Give other tasks a turn, as a network round trip would
        tokio::task::yield_now().await;
        Ok(self.tables.read().await.appointments.clone())
    }

    async fn delete_appointment(&self, key: &AppointmentKey) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.appointments.len();
        tables.appointments.retain(|a| &a.key() != key);
        Ok(tables.appointments.len() != before)
    }

    async fn add_review(&self, review: Review) -> Result<(), StoreError> {
        self.tables.write().await.reviews.push(review);
        Ok(())
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().await.reviews.clone())
    }

    async fn add_consultation(&self, consultation: Consultation) -> Result<(), StoreError> {
        self.tables.write().await.consultations.push(consultation);
        Ok(())
    }

    async fn list_consultations(&self) -> Result<Vec<Consultation>, StoreError> {
        Ok(self.tables.read().await.consultations.clone())
    }

    async fn add_subscriber(&self, subscriber: Subscriber) -> Result<SubscribeOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .subscribers
            .iter()
            .any(|s| s.user_id == subscriber.user_id)
        {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }
        tables.subscribers.push(subscriber);
        Ok(SubscribeOutcome::Added)
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self.tables.read().await.subscribers.clone())
    }

    fn export_target(&self) -> ExportTarget {
        ExportTarget::Url("memory://clinic".to_string())
    }
}
