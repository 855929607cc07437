// Slash commands.

use super::handlers::{show, Data, HandlerResult, Screen};
use super::{keyboards, texts};
use crate::core::records::ExportTarget;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "главное меню")]
    Start,
    #[command(description = "отменить текущее действие")]
    Cancel,
    #[command(description = "список команд")]
    Help,
    #[command(description = "выгрузка данных (для администратора)")]
    Export,
    #[command(description = "статистика клиники (для администратора)")]
    Stats,
}

pub async fn handle_command(bot: Bot, msg: Message, cmd: Command, data: Arc<Data>) -> HandlerResult {
    let Some(user_id) = msg.from.as_ref().map(|u| u.id.0) else {
        return Ok(());
    };
    let chat = Screen::new_message(msg.chat.id);

    match cmd {
        Command::Start => {
            data.sessions.reset(user_id);
            show(
                &bot,
                chat,
                texts::welcome(&data.catalog.info.name),
                Some(keyboards::main_menu()),
            )
            .await?;
        }
        Command::Cancel => {
            data.sessions.reset(user_id);
            bot.send_message(msg.chat.id, texts::OPERATION_CANCELLED)
                .reply_markup(keyboards::main_menu())
                .await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Export => {
            if !data.is_admin(user_id) {
                bot.send_message(msg.chat.id, texts::ADMIN_ONLY).await?;
                return Ok(());
            }
            export(&bot, msg.chat.id, &data).await?;
        }
        Command::Stats => {
            if !data.is_admin(user_id) {
                bot.send_message(msg.chat.id, texts::ADMIN_ONLY).await?;
                return Ok(());
            }
            let text = match data.feedback.stats().await {
                Ok(stats) => texts::stats(&stats),
                Err(e) => {
                    tracing::error!("Failed to collect stats: {e}");
                    texts::STATS_FAILED.to_string()
                }
            };
            bot.send_message(msg.chat.id, text).await?;
        }
    }
    Ok(())
}

/// Send the spreadsheet link, or the database file when running on SQLite.
async fn export(bot: &Bot, chat_id: ChatId, data: &Data) -> HandlerResult {
    match data.store.export_target() {
        ExportTarget::Url(url) => {
            bot.send_message(chat_id, texts::export_link(&url)).await?;
        }
        ExportTarget::File(path) if path.exists() => {
            tracing::info!(path = %path.display(), "Exporting database file");
            if let Err(e) = bot.send_document(chat_id, InputFile::file(path)).await {
                tracing::warn!("Export upload failed: {e}");
                bot.send_message(chat_id, texts::export_failed(&e)).await?;
            }
        }
        ExportTarget::File(path) => {
            tracing::warn!(path = %path.display(), "Export source is missing");
            bot.send_message(chat_id, texts::EXPORT_NOT_FOUND).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_parse() {
        assert_eq!(Command::parse("/start", "clinic_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/export", "clinic_bot").unwrap(), Command::Export);
        assert_eq!(
            Command::parse("/stats@clinic_bot", "clinic_bot").unwrap(),
            Command::Stats
        );
        assert!(Command::parse("/unknown", "clinic_bot").is_err());
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = Command::descriptions().to_string();
        for name in ["/start", "/cancel", "/help", "/export", "/stats"] {
            assert!(help.contains(name), "{help}");
        }
    }
}
