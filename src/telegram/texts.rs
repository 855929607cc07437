// Message texts shown to patients and administrators.

use crate::core::booking::BookingService;
use crate::core::catalog::{ClinicCatalog, ClinicInfo, Doctor};
use crate::core::feedback::ClinicStats;
use crate::core::records::{Appointment, ClinicStore, Review};
use crate::core::sync::SyncEvent;
use chrono::NaiveDateTime;

/// How many of the newest reviews are listed at most.
pub const REVIEWS_SHOWN: usize = 10;

/// Telegram's message limit, counted in UTF-16 code units.
pub const MESSAGE_LIMIT: usize = 4096;

/// Longest review text quoted in the list.
const REVIEW_TEXT_CHARS: usize = 600;

/// Longest patient-entered field (name, phone) echoed in the appointment list.
const FIELD_CHARS: usize = 100;

/// Room kept free for the closing line of the appointment list.
const FOOTER_RESERVE: usize = 200;

fn message_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Cut `text` to `max` characters, marking the cut with `…`.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let mut cut: String = text.chars().take(max).collect();
        cut.push('…');
        cut
    } else {
        text.to_string()
    }
}

pub const MAIN_MENU: &str = "Выберите нужную опцию:";
pub const CHOOSE_SPECIALIZATION: &str = "Выберите специализацию врача:";
pub const ASK_NAME: &str = "Для завершения записи введите ваше ФИО:";
pub const ASK_PHONE: &str = "Теперь введите ваш номер телефона:";
pub const BOOKING_FAILED: &str = "❌ Произошла ошибка при создании записи. Попробуйте позже.";
pub const SLOT_TAKEN: &str =
    "😔 Это время только что заняли. Пожалуйста, выберите другое время.";
pub const SESSION_EXPIRED: &str =
    "Сеанс записи устарел. Пожалуйста, начните запись заново.";
pub const DOCTOR_NOT_FOUND: &str = "Ошибка: врач не найден";
pub const DATE_UNAVAILABLE: &str = "Эта дата больше недоступна для записи. Выберите другую дату.";
pub const NO_FREE_SLOTS: &str = "На эту дату свободного времени нет. Выберите другую дату.";
pub const CONSULTATION_SENT: &str = "✅ Ваш вопрос отправлен! Врач свяжется с вами в ближайшее время.";
pub const CONSULTATION_FAILED: &str = "❌ Произошла ошибка при отправке вопроса. Попробуйте позже.";
pub const REVIEWS_MENU: &str = "⭐ Отзывы\n\nВыберите действие:";
pub const ASK_RATING: &str = "Оцените нашу клинику от 1 до 5 звезд:";
pub const REVIEW_SAVED: &str = "✅ Спасибо за ваш отзыв! Он будет опубликован после модерации.";
pub const REVIEW_FAILED: &str = "❌ Произошла ошибка при сохранении отзыва. Попробуйте позже.";
pub const NO_REVIEWS: &str = "Пока нет отзывов. Будьте первым!";
pub const SUBSCRIBED: &str = "✅ Вы успешно подписались на рассылку новостей и акций!";
pub const ALREADY_SUBSCRIBED: &str = "Вы уже подписаны на рассылку новостей и акций.";
pub const SUBSCRIBE_FAILED: &str = "❌ Произошла ошибка при подписке. Попробуйте позже.";
pub const NO_APPOINTMENTS: &str = "У вас пока нет записей.";
pub const APPOINTMENTS_FAILED: &str = "❌ Не удалось загрузить ваши записи. Попробуйте позже.";
pub const CANCEL_RULE: &str = "Отменить запись можно только более чем за 24 часа до приёма";
pub const APPOINTMENT_CANCELLED: &str = "Запись отменена";
pub const CANCEL_FAILED: &str = "Ошибка при отмене записи";
pub const CANCEL_UNVERIFIABLE: &str = "Не удалось проверить время записи";
pub const INVALID_NUMBER: &str = "Неверный номер записи";
pub const INVALID_FORMAT: &str = "Неверный формат";
pub const OPERATION_CANCELLED: &str = "Операция отменена.";
pub const ADMIN_ONLY: &str = "Команда доступна только администратору";
pub const STATS_FAILED: &str = "❌ Не удалось собрать статистику. Попробуйте позже.";
pub const EXPORT_NOT_FOUND: &str = "Не удалось найти источник данных для экспорта.";

pub fn welcome(clinic_name: &str) -> String {
    format!("Здравствуйте! Добро пожаловать в {clinic_name}. Чем могу помочь?")
}

pub fn doctors_of(specialization: &str, doctors: &[Doctor]) -> String {
    let mut text = format!("Врачи специализации '{specialization}':\n\n");
    for doctor in doctors {
        text.push_str(&format!(
            "{} {}\nСтаж: {}\n{}\n\n",
            doctor.photo, doctor.name, doctor.experience, doctor.description
        ));
    }
    text
}

pub fn specialization_unavailable(specialization: &str) -> String {
    format!("К сожалению, врачи специализации '{specialization}' временно недоступны.")
}

pub fn doctor_chosen(doctor: &Doctor, specialization: &str) -> String {
    format!(
        "Выбран врач: {}\nСпециализация: {}\nСтаж: {}\n\nВыберите дату приема:",
        doctor.name, specialization, doctor.experience
    )
}

pub fn date_chosen(date: &str) -> String {
    format!("Выбрана дата: {date}\n\nВыберите время приема:")
}

pub fn booking_confirmed(appointment: &Appointment) -> String {
    format!(
        "✅ Запись успешно создана!\n\n\
         Врач: {}\nСпециализация: {}\nДата: {}\nВремя: {}\nФИО: {}\nТелефон: {}\n\n\
         Мы напомним вам за день до приема.",
        appointment.doctor,
        appointment.specialization,
        appointment.date,
        appointment.time,
        appointment.patient_name,
        appointment.phone
    )
}

pub fn doctors_overview(catalog: &ClinicCatalog) -> String {
    let mut text = String::from("Наши врачи:\n\n");
    for group in &catalog.doctors {
        text.push_str(&format!("🏥 {}:\n", group.specialization));
        for doctor in &group.doctors {
            text.push_str(&format!(
                "  {} {} - {}\n",
                doctor.photo, doctor.name, doctor.experience
            ));
        }
        text.push('\n');
    }
    text
}

pub fn clinic_info(info: &ClinicInfo) -> String {
    let mut text = format!("🏥 {}\n\n", info.name);
    if let Some(description) = &info.description {
        text.push_str(&format!("{description}\n\n"));
    }
    text.push_str(&format!("📍 Адрес: {}\n", info.address));
    text.push_str(&format!("⏰ Часы работы:\n{}\n", info.working_hours));
    text.push_str(&format!("📞 Телефон: {}\n", info.phone));
    if let Some(email) = &info.email {
        text.push_str(&format!("✉️ Email: {email}\n"));
    }
    text.push_str(&format!("🌐 Сайт: {}", info.website));
    text
}

pub fn consultation_prompt() -> String {
    "💬 Онлайн-консультация\n\n\
     Опишите ваш вопрос, и наш врач свяжется с вами в ближайшее время.\n\
     Вы также можете прикрепить фото или документы."
        .to_string()
}

pub fn rating_chosen(rating: u8) -> String {
    format!("Вы поставили {rating} звезд. Теперь напишите ваш отзыв:")
}

/// The newest visible reviews, oldest of them first, as many as fit one message.
pub fn reviews_list(reviews: &[Review]) -> String {
    let visible: Vec<&Review> = reviews.iter().filter(|r| !r.status.is_hidden()).collect();
    if visible.is_empty() {
        return NO_REVIEWS.to_string();
    }

    let header = "📝 Отзывы наших пациентов:\n\n";
    let mut used = message_len(header);
    let mut entries = Vec::new();
    for review in visible.iter().rev().take(REVIEWS_SHOWN) {
        let entry = format!(
            "{}\n👤 {}\n💬 {}\n📅 {}\n\n",
            "⭐".repeat(review.stars()),
            clip(&review.patient_name, FIELD_CHARS),
            clip(&review.text, REVIEW_TEXT_CHARS),
            review.date
        );
        used += message_len(&entry);
        if used > MESSAGE_LIMIT {
            break;
        }
        entries.push(entry);
    }

    let mut text = String::from(header);
    for entry in entries.iter().rev() {
        text.push_str(entry);
    }
    text
}

pub fn news(items: &[String]) -> String {
    let mut text = String::from("🔔 Новости и акции\n\n");
    for item in items {
        text.push_str(item);
        text.push_str("\n\n");
    }
    text.push_str("Подпишитесь на рассылку, чтобы получать уведомления о новых акциях!");
    text
}

/// The "my appointments" screen and the 1-based numbers that may still be cancelled.
///
/// Entries that would push the message past Telegram's limit are left out and
/// cannot be cancelled from this screen.
pub fn my_appointments(appointments: &[Appointment], now: NaiveDateTime) -> (String, Vec<usize>) {
    if appointments.is_empty() {
        return (NO_APPOINTMENTS.to_string(), Vec::new());
    }

    let mut text = String::from("🗂 Ваши записи:\n\n");
    let mut cancellable = Vec::new();
    let mut shown = 0;
    for (i, a) in appointments.iter().enumerate() {
        let number = i + 1;
        let entry = format!(
            "{number}. 📅 {} {}\n   👨‍⚕️ {} ({})\n   👤 {}\n   📞 {}\n   🔖 Статус: {}\n   🕒 Создано: {}\n\n",
            a.date,
            a.time,
            clip(&a.doctor, FIELD_CHARS),
            clip(&a.specialization, FIELD_CHARS),
            clip(&a.patient_name, FIELD_CHARS),
            clip(&a.phone, FIELD_CHARS),
            a.status.as_cell(),
            a.created_at
        );
        if message_len(&text) + message_len(&entry) > MESSAGE_LIMIT - FOOTER_RESERVE {
            break;
        }
        text.push_str(&entry);
        shown += 1;
        if BookingService::<dyn ClinicStore>::can_cancel(a, now) {
            cancellable.push(number);
        }
    }
    if shown < appointments.len() {
        text.push_str(&format!(
            "Показаны {shown} из {} записей.\n",
            appointments.len()
        ));
    }
    if cancellable.is_empty() {
        text.push_str(&format!("\n{CANCEL_RULE}."));
    }
    (text, cancellable)
}

pub fn sync_notice(event: &SyncEvent) -> String {
    match event {
        SyncEvent::AppointmentRemoved {
            date, time, doctor, ..
        } => format!(
            "Вашу запись на {date} {time} к {doctor} отменили администраторы или она была удалена.\n\
             При необходимости запишитесь заново."
        ),
        SyncEvent::ReviewRemoved {
            date,
            rating,
            preview,
            ..
        } => format!(
            "Ваш отзыв от {date} (оценка {rating}) был удалён/скрыт администратором.\nТекст: {preview}"
        ),
    }
}

pub fn stats(stats: &ClinicStats) -> String {
    let average = stats
        .average_rating
        .map_or_else(|| "—".to_string(), |r| format!("{r:.1}"));
    format!(
        "📊 Статистика\n\n\
         📅 Активные записи: {}\n\
         ❌ Отменённые записи: {}\n\
         ⭐ Отзывы: {} (скрыто: {}), средняя оценка: {}\n\
         💬 Консультации: {} (без ответа: {})\n\
         📧 Подписчики: {}",
        stats.active_appointments,
        stats.cancelled_appointments,
        stats.reviews,
        stats.hidden_reviews,
        average,
        stats.consultations,
        stats.unanswered_consultations,
        stats.subscribers
    )
}

pub fn export_link(url: &str) -> String {
    format!("Ссылка на таблицу: {url}")
}

pub fn export_failed(err: &dyn std::fmt::Display) -> String {
    format!("Не удалось отправить файл: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::{NewAppointment, NewReview, ReviewStatus};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn appointment(date: &str) -> Appointment {
        NewAppointment {
            date: date.to_string(),
            time: "10:00".to_string(),
            patient_name: "Анна".to_string(),
            phone: "+7 900".to_string(),
            doctor: "Иванов Иван Иванович".to_string(),
            specialization: "Терапевт".to_string(),
            user_id: 1,
        }
        .into_appointment(at(1, 9))
    }

    #[test]
    fn test_my_appointments_marks_cancellable_entries() {
        let list = vec![appointment("25.10.2026"), appointment("20.10.2026")];
        let (text, cancellable) = my_appointments(&list, at(19, 12));

        assert!(text.starts_with("🗂 Ваши записи:"));
        assert!(text.contains("1. 📅 25.10.2026 10:00"));
        assert!(text.contains("2. 📅 20.10.2026 10:00"));
        assert!(text.contains("🔖 Статус: Новая"));
        assert_eq!(cancellable, vec![1]);
        assert!(!text.contains(CANCEL_RULE));

        let (text, cancellable) = my_appointments(&list[1..], at(19, 12));
        assert!(cancellable.is_empty());
        assert!(text.ends_with("24 часа до приёма."));

        assert_eq!(my_appointments(&[], at(1, 0)).0, NO_APPOINTMENTS);
    }

    #[test]
    fn test_reviews_list_hides_moderated_and_caps_length() {
        let mut reviews: Vec<Review> = (0..15)
            .map(|i| {
                NewReview {
                    patient_name: format!("Пациент {i}"),
                    rating: 4,
                    text: format!("Отзыв {i}"),
                    user_id: i,
                }
                .into_review(at(1, 9))
            })
            .collect();
        reviews[14].status = ReviewStatus::from_cell("скрыт");

        let text = reviews_list(&reviews);
        assert!(!text.contains("Отзыв 14"));
        assert!(!text.contains("Отзыв 3\n"));
        assert!(text.contains("Отзыв 4\n"));
        assert!(text.contains("Отзыв 13"));
        assert!(text.contains("⭐⭐⭐⭐\n👤 Пациент 4"));

        assert_eq!(reviews_list(&reviews[14..]), NO_REVIEWS);
    }

    #[test]
    fn test_long_reviews_fit_one_message() {
        let reviews: Vec<Review> = (0..10)
            .map(|i| {
                NewReview {
                    patient_name: format!("Пациент {i}"),
                    rating: 5,
                    text: format!("{i}{}", "о".repeat(999)),
                    user_id: i,
                }
                .into_review(at(1, 9))
            })
            .collect();

        let text = reviews_list(&reviews);
        assert!(message_len(&text) <= MESSAGE_LIMIT, "{}", message_len(&text));
        // The newest review always makes it in
        assert!(text.contains("👤 Пациент 9\n"));
        assert!(!text.contains("👤 Пациент 0\n"));
        assert!(text.contains('…'));
    }

    #[test]
    fn test_long_appointment_list_fits_one_message() {
        let list: Vec<Appointment> = (0..40)
            .map(|_| {
                let mut a = appointment("25.10.2026");
                a.patient_name = "Я".repeat(300);
                a
            })
            .collect();

        let (text, cancellable) = my_appointments(&list, at(19, 12));
        assert!(message_len(&text) <= MESSAGE_LIMIT, "{}", message_len(&text));
        assert!(text.contains("1. 📅 25.10.2026"));
        assert!(!text.contains("40. 📅"));
        assert!(text.contains("из 40 записей"));
        assert!(!cancellable.is_empty());
        assert!(cancellable.len() < list.len());
        assert_eq!(cancellable, (1..=cancellable.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_sync_notices() {
        let text = sync_notice(&SyncEvent::AppointmentRemoved {
            user_id: 1,
            date: "20.10.2026".to_string(),
            time: "10:00".to_string(),
            doctor: "Иванов Иван Иванович".to_string(),
        });
        assert!(text.starts_with("Вашу запись на 20.10.2026 10:00 к Иванов Иван Иванович"));

        let text = sync_notice(&SyncEvent::ReviewRemoved {
            user_id: 1,
            date: "2026-10-16 10:00:00".to_string(),
            rating: "3".to_string(),
            preview: "Долго ждал".to_string(),
        });
        assert!(text.contains("(оценка 3)"));
        assert!(text.ends_with("Текст: Долго ждал"));
    }

    #[test]
    fn test_stats_without_reviews() {
        let text = stats(&ClinicStats {
            active_appointments: 3,
            ..ClinicStats::default()
        });
        assert!(text.contains("Активные записи: 3"));
        assert!(text.contains("средняя оценка: —"));
    }
}
