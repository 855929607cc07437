// Telegram layer - commands, button handlers and the notifications task.

#[path = "callback_data.rs"]
pub mod callback_data;

#[path = "commands.rs"]
pub mod commands;

#[path = "handlers.rs"]
pub mod handlers;

#[path = "keyboards.rs"]
pub mod keyboards;

#[path = "notifier.rs"]
pub mod notifier;

#[path = "texts.rs"]
pub mod texts;

pub use handlers::{schema, Data};
