pub mod records_models;
pub mod records_store;

pub use records_models::{
    dedup_latest, format_timestamp, Appointment, AppointmentKey, AppointmentStatus, Consultation,
    ExportTarget, NewAppointment, NewConsultation, NewReview, Review, ReviewKey, ReviewStatus,
    SlotKey, SubscribeOutcome, Subscriber, DATE_FORMAT, TIME_FORMAT,
};
pub use records_store::{ClinicStore, StoreError};
