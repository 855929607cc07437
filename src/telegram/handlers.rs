// Update handlers: free-text messages, button presses and the dispatcher tree.

use super::callback_data::CallbackAction;
use super::commands::{handle_command, Command};
use super::{keyboards, texts};
use crate::core::booking::{BookingError, BookingService};
use crate::core::catalog::ClinicCatalog;
use crate::core::feedback::FeedbackService;
use crate::core::records::{ClinicStore, NewReview, SubscribeOutcome};
use crate::core::sessions::{BookingStage, SessionStore, TextOutcome};
use crate::core::sync::SyncWatcher;
use dashmap::DashMap;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId, User};
use teloxide::{ApiError, RequestError};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), Error>;

/// Data shared by every handler and the background sync task.
pub struct Data {
    pub catalog: Arc<ClinicCatalog>,
    pub booking: Arc<BookingService<dyn ClinicStore>>,
    pub feedback: Arc<FeedbackService<dyn ClinicStore>>,
    pub sessions: Arc<SessionStore>,
    pub watcher: Arc<SyncWatcher<dyn ClinicStore>>,
    pub store: Arc<dyn ClinicStore>,
    /// Where each user's "my appointments" list is currently on screen.
    pub views: DashMap<u64, (ChatId, MessageId)>,
    pub admin_id: Option<u64>,
}

impl Data {
    /// Without a configured admin every user counts as one.
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_id.map_or(true, |admin| admin == user_id)
    }
}

/// A message the bot may update in place.
#[derive(Debug, Clone, Copy)]
pub struct Screen {
    pub chat_id: ChatId,
    pub message_id: Option<MessageId>,
}

impl Screen {
    pub fn new_message(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            message_id: None,
        }
    }
}

/// Edit the screen's message, or send a new one when there is nothing to edit
/// or Telegram refuses the edit. Returns the id of the message now showing `text`.
pub async fn show(
    bot: &Bot,
    screen: Screen,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<MessageId, RequestError> {
    if let Some(message_id) = screen.message_id {
        let mut edit = bot.edit_message_text(screen.chat_id, message_id, text.clone());
        if let Some(keyboard) = keyboard.clone() {
            edit = edit.reply_markup(keyboard);
        }
        match edit.await {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => return Ok(message_id),
            Err(e) => tracing::debug!("Editing message failed, sending a new one: {e}"),
        }
    }

    let mut send = bot.send_message(screen.chat_id, text);
    if let Some(keyboard) = keyboard {
        send = send.reply_markup(keyboard);
    }
    Ok(send.await?.id)
}

pub async fn show_main_menu(bot: &Bot, screen: Screen) -> Result<MessageId, RequestError> {
    show(
        bot,
        screen,
        texts::MAIN_MENU.to_string(),
        Some(keyboards::main_menu()),
    )
    .await
}

/// Render the user's appointments into `screen` and remember where they are shown.
pub async fn show_my_appointments(
    bot: &Bot,
    data: &Data,
    user_id: u64,
    screen: Screen,
) -> HandlerResult {
    let appointments = match data.booking.appointments_for_user(user_id).await {
        Ok(appointments) => appointments,
        Err(e) => {
            tracing::error!(user_id, "Failed to load appointments: {e}");
            show(
                bot,
                screen,
                texts::APPOINTMENTS_FAILED.to_string(),
                Some(keyboards::back_to_menu()),
            )
            .await?;
            return Ok(());
        }
    };

    let (text, cancellable) = texts::my_appointments(&appointments, data.booking.now());
    data.sessions.remember_appointments(user_id, appointments);
    let message_id = show(
        bot,
        screen,
        text,
        Some(keyboards::my_appointments(&cancellable)),
    )
    .await?;
    data.views.insert(user_id, (screen.chat_id, message_id));
    Ok(())
}

/// Commands the dispatcher did not recognise must not end up as flow input.
fn is_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

pub async fn handle_message(bot: Bot, msg: Message, data: Arc<Data>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0;
    let chat = Screen::new_message(msg.chat.id);
    // Photos and documents sent with a consultation question carry it as a caption
    let text = msg.text().or(msg.caption()).unwrap_or_default();
    if is_command(text) {
        tracing::debug!(user_id, text, "Ignoring unknown command");
        return Ok(());
    }

    match data.sessions.submit_text(user_id, text) {
        TextOutcome::AskPhone => {
            bot.send_message(msg.chat.id, texts::ASK_PHONE).await?;
        }
        TextOutcome::Reprompt(stage) => {
            let prompt = match stage {
                BookingStage::EnteringPhone => texts::ASK_PHONE,
                _ => texts::ASK_NAME,
            };
            bot.send_message(msg.chat.id, prompt).await?;
        }
        TextOutcome::BookingReady(request) => match data.booking.book(request).await {
            Ok(appointment) => {
                show(
                    &bot,
                    chat,
                    texts::booking_confirmed(&appointment),
                    Some(keyboards::back_to_menu()),
                )
                .await?;
            }
            Err(BookingError::SlotTaken { date, time }) => {
                tracing::info!(user_id, %date, %time, "Requested slot was taken meanwhile");
                bot.send_message(msg.chat.id, texts::SLOT_TAKEN).await?;
                show_main_menu(&bot, chat).await?;
            }
            Err(e) => {
                tracing::error!(user_id, "Failed to create appointment: {e}");
                bot.send_message(msg.chat.id, texts::BOOKING_FAILED).await?;
            }
        },
        TextOutcome::ReviewReady { rating, text } => {
            let review = NewReview {
                patient_name: user.full_name(),
                rating,
                text,
                user_id,
            };
            let reply = match data.feedback.submit_review(review).await {
                Ok(_) => texts::REVIEW_SAVED,
                Err(e) => {
                    tracing::error!(user_id, "Failed to save review: {e}");
                    texts::REVIEW_FAILED
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
            show_main_menu(&bot, chat).await?;
        }
        TextOutcome::ConsultationReady(question) => {
            let reply = match data.feedback.submit_consultation(user_id, &question).await {
                Ok(()) => texts::CONSULTATION_SENT,
                Err(e) => {
                    tracing::error!(user_id, "Failed to save consultation: {e}");
                    texts::CONSULTATION_FAILED
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
            show_main_menu(&bot, chat).await?;
        }
        TextOutcome::Ignored => {
            show_main_menu(&bot, chat).await?;
        }
    }
    Ok(())
}

pub async fn handle_callback(bot: Bot, q: CallbackQuery, data: Arc<Data>) -> HandlerResult {
    let user_id = q.from.id.0;
    let screen = match q.regular_message() {
        Some(message) => Screen {
            chat_id: message.chat.id,
            message_id: Some(message.id),
        },
        None => Screen::new_message(ChatId::from(q.from.id)),
    };

    let notice = match q.data.as_deref().and_then(CallbackAction::parse) {
        Some(action) => {
            if !matches!(
                action,
                CallbackAction::MyAppointments | CallbackAction::CancelAppointment(_)
            ) {
                data.views.remove(&user_id);
            }
            match handle_action(&bot, &data, &q.from, screen, action).await {
                Ok(notice) => notice,
                Err(e) => {
                    tracing::error!(user_id, data = ?q.data, "Callback failed: {e}");
                    None
                }
            }
        }
        None => {
            tracing::debug!(user_id, data = ?q.data, "Unrecognised callback data");
            Some(texts::INVALID_FORMAT)
        }
    };

    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Some(text) = notice {
        answer = answer.text(text).show_alert(true);
    }
    answer.await?;
    Ok(())
}

/// Carry out one button press. The returned text, if any, is shown as an alert.
async fn handle_action(
    bot: &Bot,
    data: &Data,
    user: &User,
    screen: Screen,
    action: CallbackAction,
) -> Result<Option<&'static str>, Error> {
    let user_id = user.id.0;
    let catalog = &data.catalog;

    match action {
        CallbackAction::MainMenu => {
            data.sessions.reset(user_id);
            show_main_menu(bot, screen).await?;
        }
        CallbackAction::Appointment => {
            data.sessions.reset(user_id);
            show(
                bot,
                screen,
                texts::CHOOSE_SPECIALIZATION.to_string(),
                Some(keyboards::specializations(catalog)),
            )
            .await?;
        }
        CallbackAction::Specialization(index) => {
            let Some(specialization) = catalog.specialization(index) else {
                return Ok(Some(texts::INVALID_FORMAT));
            };
            let doctors = catalog.doctors_for(specialization);
            let text = if doctors.is_empty() {
                texts::specialization_unavailable(specialization)
            } else {
                texts::doctors_of(specialization, doctors)
            };
            show(bot, screen, text, Some(keyboards::doctors_of(index, doctors))).await?;
        }
        CallbackAction::Doctor { spec, doctor } => {
            let Some((specialization, doctor)) = catalog.doctor(spec, doctor) else {
                show(
                    bot,
                    screen,
                    texts::DOCTOR_NOT_FOUND.to_string(),
                    Some(keyboards::back_to_menu()),
                )
                .await?;
                return Ok(None);
            };
            data.sessions
                .start_booking(user_id, spec, specialization, &doctor.name);
            let dates = BookingService::<dyn ClinicStore>::available_dates(data.booking.now().date());
            show(
                bot,
                screen,
                texts::doctor_chosen(doctor, specialization),
                Some(keyboards::dates(spec, &dates)),
            )
            .await?;
        }
        CallbackAction::Date(date) => {
            let today = data.booking.now().date();
            if !BookingService::<dyn ClinicStore>::is_bookable_date(today, &date) {
                tracing::debug!(user_id, %date, "Stale date button pressed");
                return Ok(Some(texts::DATE_UNAVAILABLE));
            }
            let Some(draft) = data.sessions.choose_date(user_id, &date) else {
                show_expired(bot, screen).await?;
                return Ok(None);
            };
            let free = data.booking.free_slots(&draft.doctor, &date).await?;
            if free.is_empty() {
                let dates = BookingService::<dyn ClinicStore>::available_dates(data.booking.now().date());
                show(
                    bot,
                    screen,
                    texts::NO_FREE_SLOTS.to_string(),
                    Some(keyboards::dates(draft.spec_index, &dates)),
                )
                .await?;
            } else {
                show(
                    bot,
                    screen,
                    texts::date_chosen(&date),
                    Some(keyboards::times(&free)),
                )
                .await?;
            }
        }
        CallbackAction::Time(time) => {
            if data.sessions.choose_time(user_id, &time).is_none() {
                show_expired(bot, screen).await?;
                return Ok(None);
            }
            show(bot, screen, texts::ASK_NAME.to_string(), None).await?;
        }
        CallbackAction::MyAppointments => {
            show_my_appointments(bot, data, user_id, screen).await?;
        }
        CallbackAction::CancelAppointment(number) => {
            return cancel_appointment(bot, data, user_id, screen, number).await;
        }
        CallbackAction::Doctors => {
            show(
                bot,
                screen,
                texts::doctors_overview(catalog),
                Some(keyboards::doctors_overview()),
            )
            .await?;
        }
        CallbackAction::ClinicInfo => {
            show(
                bot,
                screen,
                texts::clinic_info(&catalog.info),
                Some(keyboards::clinic_info(&catalog.info)),
            )
            .await?;
        }
        CallbackAction::Consultation => {
            data.sessions.begin_consultation(user_id);
            show(
                bot,
                screen,
                texts::consultation_prompt(),
                Some(keyboards::back_to_menu()),
            )
            .await?;
        }
        CallbackAction::Reviews => {
            data.sessions.reset(user_id);
            show(
                bot,
                screen,
                texts::REVIEWS_MENU.to_string(),
                Some(keyboards::reviews_menu()),
            )
            .await?;
        }
        CallbackAction::WriteReview => {
            data.sessions.begin_review(user_id);
            show(
                bot,
                screen,
                texts::ASK_RATING.to_string(),
                Some(keyboards::ratings()),
            )
            .await?;
        }
        CallbackAction::Rating(rating) => {
            if !data.sessions.choose_rating(user_id, rating) {
                return Ok(Some(texts::INVALID_FORMAT));
            }
            show(bot, screen, texts::rating_chosen(rating), None).await?;
        }
        CallbackAction::ViewReviews => {
            let text = match data.feedback.reviews().await {
                Ok(reviews) => texts::reviews_list(&reviews),
                Err(e) => {
                    tracing::error!(user_id, "Failed to load reviews: {e}");
                    texts::NO_REVIEWS.to_string()
                }
            };
            show(bot, screen, text, Some(keyboards::reviews_list())).await?;
        }
        CallbackAction::News => {
            show(
                bot,
                screen,
                texts::news(&catalog.news),
                Some(keyboards::news()),
            )
            .await?;
        }
        CallbackAction::SubscribeNews => {
            let reply = match data
                .feedback
                .subscribe(user_id, &user.full_name())
                .await
            {
                Ok(SubscribeOutcome::Added) => texts::SUBSCRIBED,
                Ok(SubscribeOutcome::AlreadySubscribed) => texts::ALREADY_SUBSCRIBED,
                Err(e) => {
                    tracing::error!(user_id, "Failed to subscribe: {e}");
                    texts::SUBSCRIBE_FAILED
                }
            };
            show(
                bot,
                screen,
                reply.to_string(),
                Some(keyboards::back_to_menu()),
            )
            .await?;
        }
    }
    Ok(None)
}

async fn show_expired(bot: &Bot, screen: Screen) -> Result<MessageId, RequestError> {
    show(
        bot,
        screen,
        texts::SESSION_EXPIRED.to_string(),
        Some(keyboards::back_to_menu()),
    )
    .await
}

async fn cancel_appointment(
    bot: &Bot,
    data: &Data,
    user_id: u64,
    screen: Screen,
    number: usize,
) -> Result<Option<&'static str>, Error> {
    let Some(appointment) = data.sessions.shown_appointment(user_id, number) else {
        return Ok(Some(texts::INVALID_NUMBER));
    };

    let key = appointment.key();
    data.watcher.forget_appointment(&key).await;
    let result = data
        .booking
        .cancel(user_id, &appointment, data.booking.now())
        .await;
    if result.is_err() {
        data.watcher.watch_appointment(&key).await;
    }

    let notice = match result {
        Ok(()) => texts::APPOINTMENT_CANCELLED,
        Err(BookingError::TooLate) => texts::CANCEL_RULE,
        Err(BookingError::Unparseable) => texts::CANCEL_UNVERIFIABLE,
        Err(e) => {
            tracing::warn!(user_id, number, "Failed to cancel appointment: {e}");
            texts::CANCEL_FAILED
        }
    };
    show_my_appointments(bot, data, user_id, screen).await?;
    Ok(Some(notice))
}

/// The dispatcher tree: commands first, then any other message, then buttons.
pub fn schema() -> UpdateHandler<Error> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryClinicStore;

    fn make_data(admin_id: Option<u64>) -> Data {
        let store: Arc<dyn ClinicStore> = Arc::new(InMemoryClinicStore::new());
        let catalog = Arc::new(ClinicCatalog::default());
        let tz = chrono_tz::Europe::Moscow;
        Data {
            catalog: Arc::clone(&catalog),
            booking: Arc::new(BookingService::new(Arc::clone(&store), catalog, tz)),
            feedback: Arc::new(FeedbackService::new(Arc::clone(&store), tz)),
            sessions: Arc::new(SessionStore::new()),
            watcher: Arc::new(SyncWatcher::new(Arc::clone(&store))),
            store,
            views: DashMap::new(),
            admin_id,
        }
    }

    #[test]
    fn test_admin_check() {
        assert!(make_data(None).is_admin(5));
        let data = make_data(Some(7));
        assert!(data.is_admin(7));
        assert!(!data.is_admin(5));
    }

    #[test]
    fn test_slash_text_is_not_flow_input() {
        assert!(is_command("/unknown"));
        assert!(is_command("  /start@other_bot"));
        assert!(!is_command("Иванова Мария"));
        assert!(!is_command("Болит голова / температура"));
        assert!(!is_command(""));
    }

    #[tokio::test]
    async fn test_services_share_one_store() {
        let data = make_data(None);
        data.feedback.subscribe(3, "Анна").await.unwrap();
        assert_eq!(data.store.list_subscribers().await.unwrap().len(), 1);
        assert!(data.booking.appointments_for_user(3).await.unwrap().is_empty());
    }
}
