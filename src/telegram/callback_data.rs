// Inline button payloads.
//
// Telegram limits callback data to 64 bytes, so specializations and doctors are
// referenced by catalog index rather than by (Cyrillic) name.

use crate::core::records::{DATE_FORMAT, TIME_FORMAT};
use chrono::{NaiveDate, NaiveTime};

#[cfg(test)]
const MAX_CALLBACK_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    MainMenu,
    Appointment,
    MyAppointments,
    Doctors,
    ClinicInfo,
    Consultation,
    Reviews,
    News,
    SubscribeNews,
    ViewReviews,
    WriteReview,
    Specialization(usize),
    Doctor { spec: usize, doctor: usize },
    Date(String),
    Time(String),
    Rating(u8),
    /// 1-based position in the last "my appointments" list.
    CancelAppointment(usize),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "back_to_menu" => CallbackAction::MainMenu,
            "appointment" => CallbackAction::Appointment,
            "my_appointments" => CallbackAction::MyAppointments,
            "doctors" => CallbackAction::Doctors,
            "clinic_info" => CallbackAction::ClinicInfo,
            "consultation" => CallbackAction::Consultation,
            "reviews" => CallbackAction::Reviews,
            "news" => CallbackAction::News,
            "subscribe_news" => CallbackAction::SubscribeNews,
            "view_reviews" => CallbackAction::ViewReviews,
            "write_review" => CallbackAction::WriteReview,
            _ => return Self::parse_with_argument(data),
        };
        Some(action)
    }

    fn parse_with_argument(data: &str) -> Option<Self> {
        if let Some(rest) = data.strip_prefix("cancel_appt_") {
            return rest.parse().ok().map(CallbackAction::CancelAppointment);
        }
        if let Some(rest) = data.strip_prefix("spec_") {
            return rest.parse().ok().map(CallbackAction::Specialization);
        }
        if let Some(rest) = data.strip_prefix("doctor_") {
            let (spec, doctor) = rest.split_once('_')?;
            return Some(CallbackAction::Doctor {
                spec: spec.parse().ok()?,
                doctor: doctor.parse().ok()?,
            });
        }
        if let Some(rest) = data.strip_prefix("date_") {
            NaiveDate::parse_from_str(rest, DATE_FORMAT).ok()?;
            return Some(CallbackAction::Date(rest.to_string()));
        }
        if let Some(rest) = data.strip_prefix("time_") {
            NaiveTime::parse_from_str(rest, TIME_FORMAT).ok()?;
            return Some(CallbackAction::Time(rest.to_string()));
        }
        if let Some(rest) = data.strip_prefix("rating_") {
            let rating: u8 = rest.parse().ok()?;
            return (1..=5)
                .contains(&rating)
                .then_some(CallbackAction::Rating(rating));
        }
        None
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::MainMenu => "back_to_menu".to_string(),
            CallbackAction::Appointment => "appointment".to_string(),
            CallbackAction::MyAppointments => "my_appointments".to_string(),
            CallbackAction::Doctors => "doctors".to_string(),
            CallbackAction::ClinicInfo => "clinic_info".to_string(),
            CallbackAction::Consultation => "consultation".to_string(),
            CallbackAction::Reviews => "reviews".to_string(),
            CallbackAction::News => "news".to_string(),
            CallbackAction::SubscribeNews => "subscribe_news".to_string(),
            CallbackAction::ViewReviews => "view_reviews".to_string(),
            CallbackAction::WriteReview => "write_review".to_string(),
            CallbackAction::Specialization(i) => format!("spec_{i}"),
            CallbackAction::Doctor { spec, doctor } => format!("doctor_{spec}_{doctor}"),
            CallbackAction::Date(date) => format!("date_{date}"),
            CallbackAction::Time(time) => format!("time_{time}"),
            CallbackAction::Rating(rating) => format!("rating_{rating}"),
            CallbackAction::CancelAppointment(n) => format!("cancel_appt_{n}"),
        }
    }
}
