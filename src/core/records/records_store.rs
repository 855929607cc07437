use super::records_models::{
    Appointment, AppointmentKey, Consultation, ExportTarget, Review, SubscribeOutcome, Subscriber,
};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Google Sheets error: {0}")]
    Google(String),
}

/// Persistence for everything the bot collects.
///
/// Implemented by the Google Sheets store, the SQLite store, and an in-memory
/// store for tests. Records arrive fully stamped (status, timestamps) by the
/// core services, so every backend stores exactly the same cells.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    /// Human-readable backend name for logs.
    fn describe(&self) -> String;

    /// Save an appointment, replacing any row with the same slot key.
    async fn add_appointment(&self, appointment: Appointment) -> Result<(), StoreError>;

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError>;

    /// Delete the row matching `key` exactly. Returns `false` if nothing matched.
    async fn delete_appointment(&self, key: &AppointmentKey) -> Result<bool, StoreError>;

    async fn add_review(&self, review: Review) -> Result<(), StoreError>;

    async fn list_reviews(&self) -> Result<Vec<Review>, StoreError>;

    async fn add_consultation(&self, consultation: Consultation) -> Result<(), StoreError>;

    async fn list_consultations(&self) -> Result<Vec<Consultation>, StoreError>;

    /// Add a subscriber unless one with the same user id already exists.
    async fn add_subscriber(&self, subscriber: Subscriber) -> Result<SubscribeOutcome, StoreError>;

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Where `/export` should point administrators.
    fn export_target(&self) -> ExportTarget;
}
