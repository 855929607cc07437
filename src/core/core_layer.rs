// The core module contains all clinic business logic.
// Nothing in here knows about Telegram or about where records are stored.

#[path = "catalog/clinic_catalog.rs"]
pub mod catalog;

#[path = "records/mod.rs"]
pub mod records;

#[path = "booking/booking_service.rs"]
pub mod booking;

#[path = "feedback/feedback_service.rs"]
pub mod feedback;

#[path = "sessions/session_store.rs"]
pub mod sessions;

#[path = "sync/sync_watcher.rs"]
pub mod sync;
