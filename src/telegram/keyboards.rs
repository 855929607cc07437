// Inline keyboards for every screen.

use super::callback_data::CallbackAction;
use crate::core::catalog::{ClinicCatalog, ClinicInfo, Doctor};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

const BACK: &str = "🔙 Назад";
const ROW_WIDTH: usize = 3;

fn button(text: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.encode())
}

fn back(to: CallbackAction) -> Vec<InlineKeyboardButton> {
    vec![button(BACK, to)]
}

/// Lay out `items` in rows of three, finished by a "back" row.
fn grid(items: &[String], action: impl Fn(&str) -> CallbackAction, back_to: CallbackAction) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = items
        .chunks(ROW_WIDTH)
        .map(|chunk| chunk.iter().map(|item| button(item.as_str(), action(item))).collect())
        .collect();
    rows.push(back(back_to));
    InlineKeyboardMarkup::new(rows)
}

pub fn main_menu() -> InlineKeyboardMarkup {
    let entries = [
        ("📅 Записаться на приём", CallbackAction::Appointment),
        ("🗂 Мои записи", CallbackAction::MyAppointments),
        ("👨‍⚕️ Наши врачи", CallbackAction::Doctors),
        ("ℹ️ О клинике", CallbackAction::ClinicInfo),
        ("💬 Онлайн-консультация", CallbackAction::Consultation),
        ("⭐ Отзывы", CallbackAction::Reviews),
        ("🔔 Новости и акции", CallbackAction::News),
    ];
    InlineKeyboardMarkup::new(
        entries
            .into_iter()
            .map(|(text, action)| vec![button(text, action)]),
    )
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([vec![button("🔙 Главное меню", CallbackAction::MainMenu)]])
}

pub fn specializations(catalog: &ClinicCatalog) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = catalog
        .specializations
        .iter()
        .enumerate()
        .map(|(i, spec)| vec![button(spec.as_str(), CallbackAction::Specialization(i))])
        .collect();
    rows.push(back(CallbackAction::MainMenu));
    InlineKeyboardMarkup::new(rows)
}

pub fn doctors_of(spec_index: usize, doctors: &[Doctor]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = doctors
        .iter()
        .enumerate()
        .map(|(i, doctor)| {
            vec![button(
                format!("📅 Записаться к {}", doctor.surname()),
                CallbackAction::Doctor {
                    spec: spec_index,
                    doctor: i,
                },
            )]
        })
        .collect();
    rows.push(back(CallbackAction::Appointment));
    InlineKeyboardMarkup::new(rows)
}

pub fn dates(spec_index: usize, dates: &[String]) -> InlineKeyboardMarkup {
    grid(
        dates,
        |d| CallbackAction::Date(d.to_string()),
        CallbackAction::Specialization(spec_index),
    )
}

pub fn times(times: &[String]) -> InlineKeyboardMarkup {
    grid(
        times,
        |t| CallbackAction::Time(t.to_string()),
        CallbackAction::Appointment,
    )
}

pub fn doctors_overview() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![button("📅 Записаться на приём", CallbackAction::Appointment)],
        back(CallbackAction::MainMenu),
    ])
}

/// Map and website links are skipped when the catalog holds an unusable URL.
pub fn clinic_info(info: &ClinicInfo) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for (text, raw) in [
        ("🗺️ Открыть карту", &info.map_url),
        ("🌐 Перейти на сайт", &info.website),
    ] {
        match reqwest::Url::parse(raw) {
            Ok(url) => rows.push(vec![InlineKeyboardButton::url(text, url)]),
            Err(e) => tracing::debug!(url = %raw, "Skipping link button: {e}"),
        }
    }
    rows.push(back(CallbackAction::MainMenu));
    InlineKeyboardMarkup::new(rows)
}

pub fn reviews_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![button("📝 Оставить отзыв", CallbackAction::WriteReview)],
        vec![button("👀 Посмотреть отзывы", CallbackAction::ViewReviews)],
        back(CallbackAction::MainMenu),
    ])
}

pub fn ratings() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = (1..=5u8)
        .map(|i| {
            vec![button(
                format!("{} ({i})", "⭐".repeat(i as usize)),
                CallbackAction::Rating(i),
            )]
        })
        .collect();
    rows.push(back(CallbackAction::Reviews));
    InlineKeyboardMarkup::new(rows)
}

pub fn reviews_list() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![button("📝 Оставить отзыв", CallbackAction::WriteReview)],
        back(CallbackAction::Reviews),
    ])
}

pub fn news() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![button("📧 Подписаться на рассылку", CallbackAction::SubscribeNews)],
        back(CallbackAction::MainMenu),
    ])
}

/// One cancel button per cancellable entry (1-based numbers as printed).
pub fn my_appointments(cancellable: &[usize]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = cancellable
        .iter()
        .map(|n| vec![button(format!("❌ Отменить #{n}"), CallbackAction::CancelAppointment(*n))])
        .collect();
    rows.push(back(CallbackAction::MainMenu));
    InlineKeyboardMarkup::new(rows)
}
