// Per-user conversation state.
//
// Telegram delivers button presses and free text as unrelated updates; this
// store remembers what each user is in the middle of (booking, writing a review,
// asking a question) so a plain text message can be routed to the right step.

use crate::core::records::{Appointment, NewAppointment};
use dashmap::DashMap;

/// Rating used when a review text arrives before a star rating was picked.
pub const DEFAULT_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStage {
    ChoosingDate,
    ChoosingTime,
    EnteringName,
    EnteringPhone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    /// Index into the catalog's specialization list, for "back" buttons.
    pub spec_index: usize,
    pub specialization: String,
    pub doctor: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub patient_name: Option<String>,
    pub stage: BookingStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Idle,
    Booking(BookingDraft),
    ReviewRating,
    ReviewText {
        rating: u8,
    },
    Consultation,
}

/// What a free-text message means for the sender's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    /// Name accepted; ask for the phone number next.
    AskPhone,
    /// Blank input where a value is required; ask again.
    Reprompt(BookingStage),
    BookingReady(NewAppointment),
    ReviewReady { rating: u8, text: String },
    ConsultationReady(String),
    /// The user is not in a flow that accepts text.
    Ignored,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<u64, Session>,
    shown_appointments: DashMap<u64, Vec<Appointment>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, user_id: u64) -> Session {
        self.sessions
            .get(&user_id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn reset(&self, user_id: u64) {
        self.sessions.remove(&user_id);
    }

    /// Begin a booking with the chosen doctor. Replaces whatever the user was doing.
    pub fn start_booking(&self, user_id: u64, spec_index: usize, specialization: &str, doctor: &str) {
        self.sessions.insert(
            user_id,
            Session::Booking(BookingDraft {
                spec_index,
                specialization: specialization.to_string(),
                doctor: doctor.to_string(),
                date: None,
                time: None,
                patient_name: None,
                stage: BookingStage::ChoosingDate,
            }),
        );
    }

    /// Record the chosen date. `None` when the user has no booking in progress.
    ///
    /// Picking a date again (after "back") discards a previously chosen time.
    pub fn choose_date(&self, user_id: u64, date: &str) -> Option<BookingDraft> {
        let mut session = self.sessions.get_mut(&user_id)?;
        match &mut *session {
            Session::Booking(draft) => {
                draft.date = Some(date.to_string());
                draft.time = None;
                draft.patient_name = None;
                draft.stage = BookingStage::ChoosingTime;
                Some(draft.clone())
            }
            _ => None,
        }
    }

    /// Record the chosen time and move on to asking for the patient's name.
    pub fn choose_time(&self, user_id: u64, time: &str) -> Option<BookingDraft> {
        let mut session = self.sessions.get_mut(&user_id)?;
        match &mut *session {
            Session::Booking(draft) if draft.date.is_some() => {
                draft.time = Some(time.to_string());
                draft.stage = BookingStage::EnteringName;
                Some(draft.clone())
            }
            _ => None,
        }
    }

    pub fn begin_review(&self, user_id: u64) {
        self.sessions.insert(user_id, Session::ReviewRating);
    }

    /// Store the star rating. Out-of-range ratings are refused.
    pub fn choose_rating(&self, user_id: u64, rating: u8) -> bool {
        if !(1..=5).contains(&rating) {
            return false;
        }
        self.sessions.insert(user_id, Session::ReviewText { rating });
        true
    }

    pub fn begin_consultation(&self, user_id: u64) {
        self.sessions.insert(user_id, Session::Consultation);
    }

    /// Feed a text message into the user's session.
    pub fn submit_text(&self, user_id: u64, text: &str) -> TextOutcome {
        let Some((_, session)) = self.sessions.remove(&user_id) else {
            return TextOutcome::Ignored;
        };
        let text = text.trim();

        let (outcome, next) = match session {
            Session::Booking(mut draft) => match draft.stage {
                BookingStage::EnteringName if text.is_empty() => {
                    (TextOutcome::Reprompt(BookingStage::EnteringName), Session::Booking(draft))
                }
                BookingStage::EnteringName => {
                    draft.patient_name = Some(text.to_string());
                    draft.stage = BookingStage::EnteringPhone;
                    (TextOutcome::AskPhone, Session::Booking(draft))
                }
                BookingStage::EnteringPhone if text.is_empty() => {
                    (TextOutcome::Reprompt(BookingStage::EnteringPhone), Session::Booking(draft))
                }
                BookingStage::EnteringPhone => match Self::finish_booking(user_id, draft, text) {
                    Some(request) => (TextOutcome::BookingReady(request), Session::Idle),
                    None => (TextOutcome::Ignored, Session::Idle),
                },
                // Still picking buttons; text is not expected yet
                BookingStage::ChoosingDate | BookingStage::ChoosingTime => {
                    (TextOutcome::Ignored, Session::Booking(draft))
                }
            },
            Session::ReviewRating | Session::ReviewText { .. } if text.is_empty() => {
                (TextOutcome::Ignored, session)
            }
            Session::ReviewRating => (
                TextOutcome::ReviewReady {
                    rating: DEFAULT_RATING,
                    text: text.to_string(),
                },
                Session::Idle,
            ),
            Session::ReviewText { rating } => (
                TextOutcome::ReviewReady {
                    rating,
                    text: text.to_string(),
                },
                Session::Idle,
            ),
            Session::Consultation if text.is_empty() => (TextOutcome::Ignored, session),
            Session::Consultation => (TextOutcome::ConsultationReady(text.to_string()), Session::Idle),
            Session::Idle => (TextOutcome::Ignored, Session::Idle),
        };

        if next != Session::Idle {
            self.sessions.insert(user_id, next);
        }
        outcome
    }

    fn finish_booking(user_id: u64, draft: BookingDraft, phone: &str) -> Option<NewAppointment> {
        Some(NewAppointment {
            date: draft.date?,
            time: draft.time?,
            patient_name: draft.patient_name?,
            phone: phone.to_string(),
            doctor: draft.doctor,
            specialization: draft.specialization,
            user_id,
        })
    }

    /// Remember the list behind the last "my appointments" screen.
    pub fn remember_appointments(&self, user_id: u64, appointments: Vec<Appointment>) {
        self.shown_appointments.insert(user_id, appointments);
    }

    /// Entry `number` (1-based, as printed) of the last list shown to the user.
    pub fn shown_appointment(&self, user_id: u64, number: usize) -> Option<Appointment> {
        let list = self.shown_appointments.get(&user_id)?;
        number.checked_sub(1).and_then(|i| list.get(i)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_time_chosen(user_id: u64) -> SessionStore {
        let store = SessionStore::new();
        store.start_booking(user_id, 0, "Терапевт", "Иванов Иван Иванович");
        store.choose_date(user_id, "20.10.2026").unwrap();
        store.choose_time(user_id, "10:30").unwrap();
        store
    }

    #[test]
    fn test_booking_flow_produces_request() {
        let store = store_with_time_chosen(1);

        assert_eq!(store.submit_text(1, "  Петров Пётр  "), TextOutcome::AskPhone);
        match store.submit_text(1, "+7 999 123-45-67") {
            TextOutcome::BookingReady(request) => {
                assert_eq!(request.patient_name, "Петров Пётр");
                assert_eq!(request.phone, "+7 999 123-45-67");
                assert_eq!(request.date, "20.10.2026");
                assert_eq!(request.time, "10:30");
                assert_eq!(request.doctor, "Иванов Иван Иванович");
                assert_eq!(request.specialization, "Терапевт");
                assert_eq!(request.user_id, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.get(1), Session::Idle);
    }

    #[test]
    fn test_blank_name_is_asked_again() {
        let store = store_with_time_chosen(2);
        assert_eq!(
            store.submit_text(2, "   "),
            TextOutcome::Reprompt(BookingStage::EnteringName)
        );
        assert_eq!(store.submit_text(2, "Анна"), TextOutcome::AskPhone);
        assert_eq!(
            store.submit_text(2, ""),
            TextOutcome::Reprompt(BookingStage::EnteringPhone)
        );
    }

    #[test]
    fn test_date_and_time_need_a_draft() {
        let store = SessionStore::new();
        assert!(store.choose_date(3, "20.10.2026").is_none());
        assert!(store.choose_time(3, "10:00").is_none());

        // Time before date is refused too
        store.start_booking(3, 1, "Стоматолог", "Сидоров Петр Александрович");
        assert!(store.choose_time(3, "10:00").is_none());

        let draft = store.choose_date(3, "21.10.2026").unwrap();
        assert_eq!(draft.stage, BookingStage::ChoosingTime);
        assert_eq!(store.submit_text(3, "hello"), TextOutcome::Ignored);
        // Text while choosing keeps the draft
        assert!(matches!(store.get(3), Session::Booking(_)));
    }

    #[test]
    fn test_rechoosing_date_clears_time() {
        let store = store_with_time_chosen(4);
        let draft = store.choose_date(4, "22.10.2026").unwrap();
        assert_eq!(draft.time, None);
        assert_eq!(draft.stage, BookingStage::ChoosingTime);
    }

    #[test]
    fn test_review_defaults_to_five_stars() {
        let store = SessionStore::new();
        store.begin_review(5);
        assert_eq!(
            store.submit_text(5, "Отличная клиника"),
            TextOutcome::ReviewReady {
                rating: DEFAULT_RATING,
                text: "Отличная клиника".to_string()
            }
        );

        store.begin_review(5);
        assert!(!store.choose_rating(5, 9));
        assert!(store.choose_rating(5, 3));
        assert_eq!(
            store.submit_text(5, "Нормально"),
            TextOutcome::ReviewReady {
                rating: 3,
                text: "Нормально".to_string()
            }
        );
        assert_eq!(store.submit_text(5, "ещё"), TextOutcome::Ignored);
    }

    #[test]
    fn test_consultation_and_reset() {
        let store = SessionStore::new();
        store.begin_consultation(6);
        assert_eq!(
            store.submit_text(6, "Нужна справка"),
            TextOutcome::ConsultationReady("Нужна справка".to_string())
        );

        store.begin_consultation(6);
        store.reset(6);
        assert_eq!(store.submit_text(6, "вопрос"), TextOutcome::Ignored);
    }

    #[test]
    fn test_shown_appointments_are_one_based() {
        let store = SessionStore::new();
        let appointment = NewAppointment {
            date: "20.10.2026".to_string(),
            time: "09:00".to_string(),
            patient_name: "А".to_string(),
            phone: "1".to_string(),
            doctor: "Д".to_string(),
            specialization: "С".to_string(),
            user_id: 8,
        }
        .into_appointment(
            chrono::NaiveDate::from_ymd_opt(2026, 10, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        store.remember_appointments(8, vec![appointment.clone()]);

        assert_eq!(store.shown_appointment(8, 1), Some(appointment));
        assert_eq!(store.shown_appointment(8, 0), None);
        assert_eq!(store.shown_appointment(8, 2), None);
        assert_eq!(store.shown_appointment(9, 1), None);
    }
}
