use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// PERSISTED LAYOUT
// ============================================================================
// Worksheet titles and header rows. Administrators work with the spreadsheet
// directly, so these names and the column order are part of the data format.

pub const APPOINTMENTS_SHEET: &str = "Записи на прием";
pub const REVIEWS_SHEET: &str = "Отзывы";
pub const CONSULTATIONS_SHEET: &str = "Онлайн консультации";
pub const SUBSCRIBERS_SHEET: &str = "Подписчики";

pub const APPOINTMENT_HEADERS: [&str; 9] = [
    "Дата записи",
    "Время",
    "ФИО пациента",
    "Телефон",
    "Врач",
    "Специализация",
    "Статус",
    "ID пользователя",
    "Дата создания",
];
pub const REVIEW_HEADERS: [&str; 6] = ["Дата", "ФИО", "Оценка", "Отзыв", "ID пользователя", "Статус"];
pub const CONSULTATION_HEADERS: [&str; 5] = ["Дата", "Вопрос", "ID пользователя", "Статус", "Ответ"];
pub const SUBSCRIBER_HEADERS: [&str; 3] = ["ID пользователя", "Имя", "Дата подписки"];

pub const DATE_FORMAT: &str = "%d.%m.%Y";
pub const TIME_FORMAT: &str = "%H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const STATUS_NEW: &str = "Новая";
pub const REVIEW_STATUS_NEW: &str = "Новый";

const CANCELLED_MARKERS: [&str; 5] = ["отменена", "отменён", "cancelled", "canceled", "cancel"];
const HIDDEN_MARKERS: [&str; 8] = [
    "удален", "удалён", "скрыт", "отклонен", "отклонён", "deleted", "hidden", "rejected",
];

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn cell(row: &[String], index: usize) -> String {
    row.get(index).map(|c| c.trim().to_string()).unwrap_or_default()
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

// ============================================================================
// STATUSES
// ============================================================================

/// Appointment status as written in the `Статус` column.
///
/// Admins type free text here; anything that is not a known marker is kept
/// verbatim so rewriting the sheet never loses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentStatus {
    New,
    Cancelled(String),
    Other(String),
}

impl AppointmentStatus {
    pub fn from_cell(value: &str) -> Self {
        let value = value.trim();
        if value == STATUS_NEW {
            AppointmentStatus::New
        } else if CANCELLED_MARKERS.contains(&value.to_lowercase().as_str()) {
            AppointmentStatus::Cancelled(value.to_string())
        } else {
            AppointmentStatus::Other(value.to_string())
        }
    }

    pub fn as_cell(&self) -> &str {
        match self {
            AppointmentStatus::New => STATUS_NEW,
            AppointmentStatus::Cancelled(text) | AppointmentStatus::Other(text) => text,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewStatus {
    New,
    Hidden(String),
    Other(String),
}

impl ReviewStatus {
    pub fn from_cell(value: &str) -> Self {
        let value = value.trim();
        if value == REVIEW_STATUS_NEW {
            ReviewStatus::New
        } else if HIDDEN_MARKERS.contains(&value.to_lowercase().as_str()) {
            ReviewStatus::Hidden(value.to_string())
        } else {
            ReviewStatus::Other(value.to_string())
        }
    }

    pub fn as_cell(&self) -> &str {
        match self {
            ReviewStatus::New => REVIEW_STATUS_NEW,
            ReviewStatus::Hidden(text) | ReviewStatus::Other(text) => text,
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, ReviewStatus::Hidden(_))
    }
}

// ============================================================================
// APPOINTMENTS
// ============================================================================

/// Identity of a single appointment row; used to delete exactly that row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppointmentKey {
    pub user_id: String,
    pub date: String,
    pub time: String,
    pub doctor: String,
    pub created_at: String,
}

impl AppointmentKey {
    /// The slot this row claims, ignoring when it was created.
    pub fn slot(&self) -> SlotKey {
        SlotKey {
            user_id: self.user_id.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            doctor: self.doctor.clone(),
        }
    }
}

/// A user's claim on a doctor's slot. At most one row per key is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub user_id: String,
    pub date: String,
    pub time: String,
    pub doctor: String,
}

/// One row of the appointments sheet.
///
/// Cells stay as text: the sheet is edited by hand and every row has to survive
/// a full rewrite unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub date: String,
    pub time: String,
    pub patient_name: String,
    pub phone: String,
    pub doctor: String,
    pub specialization: String,
    pub status: AppointmentStatus,
    pub user_id: String,
    pub created_at: String,
}

impl Appointment {
    pub fn from_row(row: &[String]) -> Option<Self> {
        if is_blank(row) {
            return None;
        }
        Some(Self {
            date: cell(row, 0),
            time: cell(row, 1),
            patient_name: cell(row, 2),
            phone: cell(row, 3),
            doctor: cell(row, 4),
            specialization: cell(row, 5),
            status: AppointmentStatus::from_cell(&cell(row, 6)),
            user_id: cell(row, 7),
            created_at: cell(row, 8),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.time.clone(),
            self.patient_name.clone(),
            self.phone.clone(),
            self.doctor.clone(),
            self.specialization.clone(),
            self.status.as_cell().to_string(),
            self.user_id.clone(),
            self.created_at.clone(),
        ]
    }

    pub fn belongs_to(&self, user_id: u64) -> bool {
        self.user_id == user_id.to_string()
    }

    pub fn key(&self) -> AppointmentKey {
        AppointmentKey {
            user_id: self.user_id.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            doctor: self.doctor.clone(),
            created_at: self.created_at.clone(),
        }
    }

    pub fn slot_key(&self) -> SlotKey {
        self.key().slot()
    }

    /// Scheduled start in clinic local time; `None` when the cells were edited into
    /// something unparseable.
    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()?;
        let time = NaiveTime::parse_from_str(&self.time, TIME_FORMAT).ok()?;
        Some(date.and_time(time))
    }
}

/// Appointment data collected by the booking flow, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub date: String,
    pub time: String,
    pub patient_name: String,
    pub phone: String,
    pub doctor: String,
    pub specialization: String,
    pub user_id: u64,
}

impl NewAppointment {
    pub fn into_appointment(self, created_at: NaiveDateTime) -> Appointment {
        Appointment {
            date: self.date,
            time: self.time,
            patient_name: self.patient_name,
            phone: self.phone,
            doctor: self.doctor,
            specialization: self.specialization,
            status: AppointmentStatus::New,
            user_id: self.user_id.to_string(),
            created_at: format_timestamp(created_at),
        }
    }
}

/// Collapse rows that share a [`SlotKey`], keeping the most recently created one.
///
/// Rows are ordered by `created_at` (stable, so ties keep sheet order) and the
/// survivor of each slot takes the position of the slot's first row.
pub fn dedup_latest(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut positions: HashMap<SlotKey, usize> = HashMap::new();
    let mut kept: Vec<Appointment> = Vec::with_capacity(appointments.len());
    for appointment in appointments {
        match positions.get(&appointment.slot_key()) {
            Some(&index) => kept[index] = appointment,
            None => {
                positions.insert(appointment.slot_key(), kept.len());
                kept.push(appointment);
            }
        }
    }
    kept
}

// ============================================================================
// REVIEWS, CONSULTATIONS, SUBSCRIBERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReviewKey {
    pub user_id: String,
    pub date: String,
    pub rating: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub date: String,
    pub patient_name: String,
    pub rating: String,
    pub text: String,
    pub user_id: String,
    pub status: ReviewStatus,
}

impl Review {
    pub fn from_row(row: &[String]) -> Option<Self> {
        if is_blank(row) {
            return None;
        }
        Some(Self {
            date: cell(row, 0),
            patient_name: cell(row, 1),
            rating: cell(row, 2),
            text: cell(row, 3),
            user_id: cell(row, 4),
            status: ReviewStatus::from_cell(&cell(row, 5)),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.patient_name.clone(),
            self.rating.clone(),
            self.text.clone(),
            self.user_id.clone(),
            self.status.as_cell().to_string(),
        ]
    }

    /// Star count, clamped to the 0..=5 range a message can display.
    pub fn stars(&self) -> usize {
        self.rating
            .parse::<f64>()
            .map(|r| r.round().clamp(0.0, 5.0) as usize)
            .unwrap_or(0)
    }

    pub fn key(&self) -> ReviewKey {
        ReviewKey {
            user_id: self.user_id.clone(),
            date: self.date.clone(),
            rating: self.rating.clone(),
            text: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub patient_name: String,
    pub rating: u8,
    pub text: String,
    pub user_id: u64,
}

impl NewReview {
    pub fn into_review(self, created_at: NaiveDateTime) -> Review {
        Review {
            date: format_timestamp(created_at),
            patient_name: self.patient_name,
            rating: self.rating.to_string(),
            text: self.text,
            user_id: self.user_id.to_string(),
            status: ReviewStatus::New,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consultation {
    pub date: String,
    pub question: String,
    pub user_id: String,
    pub status: String,
    pub answer: String,
}

impl Consultation {
    pub fn from_row(row: &[String]) -> Option<Self> {
        if is_blank(row) {
            return None;
        }
        Some(Self {
            date: cell(row, 0),
            question: cell(row, 1),
            user_id: cell(row, 2),
            status: cell(row, 3),
            answer: cell(row, 4),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.question.clone(),
            self.user_id.clone(),
            self.status.clone(),
            self.answer.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConsultation {
    pub question: String,
    pub user_id: u64,
}

impl NewConsultation {
    pub fn into_consultation(self, created_at: NaiveDateTime) -> Consultation {
        Consultation {
            date: format_timestamp(created_at),
            question: self.question,
            user_id: self.user_id.to_string(),
            status: STATUS_NEW.to_string(),
            answer: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub user_id: String,
    pub name: String,
    pub subscribed_at: String,
}

impl Subscriber {
    pub fn from_row(row: &[String]) -> Option<Self> {
        if is_blank(row) {
            return None;
        }
        Some(Self {
            user_id: cell(row, 0),
            name: cell(row, 1),
            subscribed_at: cell(row, 2),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.user_id.clone(),
            self.name.clone(),
            self.subscribed_at.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Added,
    AlreadySubscribed,
}

/// Where an administrator can get the raw data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Url(String),
    File(PathBuf),
}
