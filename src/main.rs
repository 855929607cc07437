// This is the entry point of the clinic Telegram bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (Google Sheets, SQLite)
// - `telegram/` = Telegram-specific adapters (commands, buttons, notifications)
//
// This file's job is to:
// 1. Load configuration
// 2. Pick a storage backend and build the services
// 3. Start the sync task and the Telegram dispatcher

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
mod settings;
#[path = "telegram/telegram_layer.rs"]
mod telegram;

use crate::core::booking::BookingService;
use crate::core::catalog::ClinicCatalog;
use crate::core::feedback::FeedbackService;
use crate::core::records::ClinicStore;
use crate::core::sessions::SessionStore;
use crate::core::sync::SyncWatcher;
use crate::infra::google::{
    CredentialsSource, ServiceAccountAuth, SheetsClinicStore, SheetsHttpClient, SpreadsheetApi,
};
use crate::infra::sqlite::SqliteClinicStore;
use crate::settings::{AppSettings, SheetsSettings};
use crate::telegram::Data;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Telegram bot for booking clinic appointments, reviews and consultations.
#[derive(Parser, Debug)]
#[command(name = "clinic_bot")]
#[command(version)]
struct Args {
    /// Path to the .env file (defaults to DOTENV_PATH, then ./.env).
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum CliCommand {
    /// Run the bot (default).
    Run,
    /// Check the Google Sheets configuration and connection, then exit.
    CheckSheets,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env before the logger so RUST_LOG from the file is honoured
    settings::load_env_file(args.env_file.as_deref());
    init_logging(&args.log_level);

    let settings = AppSettings::from_env().context("Invalid configuration")?;

    match args.command.unwrap_or(CliCommand::Run) {
        CliCommand::Run => run(settings).await,
        CliCommand::CheckSheets => check_sheets(&settings).await,
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_catalog(settings: &AppSettings) -> Result<ClinicCatalog> {
    match &settings.catalog_path {
        Some(path) => {
            let catalog = ClinicCatalog::from_json_file(path)
                .with_context(|| format!("Failed to load clinic catalog from {}", path.display()))?;
            info!(path = %path.display(), "Loaded clinic catalog");
            Ok(catalog)
        }
        None => Ok(ClinicCatalog::default()),
    }
}

async fn connect_sheets(sheets: &SheetsSettings) -> Result<SheetsHttpClient> {
    let auth = ServiceAccountAuth::from_source(&sheets.credentials)
        .await
        .context("Failed to load Google service account credentials")?;
    Ok(SheetsHttpClient::new(auth, sheets.spreadsheet_id.clone()))
}

/// Google Sheets when configured, otherwise a local SQLite database.
async fn open_store(settings: &AppSettings) -> Result<Arc<dyn ClinicStore>> {
    match &settings.sheets {
        Some(sheets) => {
            let client = connect_sheets(sheets).await?;
            info!(account = %client.client_email(), "Connecting to Google Sheets");
            let store = SheetsClinicStore::open(client)
                .await
                .context("Failed to prepare the spreadsheet")?;
            Ok(Arc::new(store))
        }
        None => {
            let path = settings.sqlite_path();
            let store = SqliteClinicStore::open(&path)
                .await
                .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

async fn run(settings: AppSettings) -> Result<()> {
    let token = settings.bot_token()?.to_string();
    let catalog = Arc::new(load_catalog(&settings)?);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Every service shares the one store picked here.

    let store = open_store(&settings).await?;
    info!(store = %store.describe(), "Storage ready");

    let data = Arc::new(Data {
        catalog: Arc::clone(&catalog),
        booking: Arc::new(BookingService::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            settings.timezone,
        )),
        feedback: Arc::new(FeedbackService::new(Arc::clone(&store), settings.timezone)),
        sessions: Arc::new(SessionStore::new()),
        watcher: Arc::new(SyncWatcher::new(Arc::clone(&store))),
        store,
        views: DashMap::new(),
        admin_id: settings.admin_id,
    });

    let bot = Bot::new(token);

    // Background sync: tells users when admins remove their records
    tokio::spawn(telegram::notifier::run_sync_loop(
        bot.clone(),
        Arc::clone(&data),
        settings.sync_interval,
    ));

    info!(clinic = %catalog.info.name, "🚀 Bot is ready!");
    Dispatcher::builder(bot, telegram::schema())
        .dependencies(dptree::deps![data])
        .default_handler(|update| async move {
            tracing::debug!("Unhandled update: {:?}", update.kind);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");
    Ok(())
}

/// Report which Google settings are present and try to reach the spreadsheet.
async fn check_sheets(settings: &AppSettings) -> Result<()> {
    let mark = |set: bool| if set { "✅" } else { "❌" };
    let env_set = |key: &str| std::env::var(key).map_or(false, |v| !v.trim().is_empty());

    println!("Checking Google Sheets configuration...");
    println!("{} GOOGLE_SHEETS_ID", mark(env_set("GOOGLE_SHEETS_ID")));
    println!(
        "{} GOOGLE_SERVICE_ACCOUNT_JSON",
        mark(env_set("GOOGLE_SERVICE_ACCOUNT_JSON"))
    );
    println!(
        "{} GOOGLE_APPLICATION_CREDENTIALS",
        mark(env_set("GOOGLE_APPLICATION_CREDENTIALS"))
    );

    let Some(sheets) = &settings.sheets else {
        println!("❌ Google Sheets is not configured; the bot will use SQLite at {}", settings.sqlite_path().display());
        return Err(settings::ConfigError::MissingSheetsId.into());
    };
    if let CredentialsSource::File(path) = &sheets.credentials {
        println!("{} Credentials file {}", mark(path.exists()), path.display());
    }

    let client = connect_sheets(sheets).await?;
    println!("✅ Service account: {}", client.client_email());
    let titles = client
        .sheet_titles()
        .await
        .context("Could not read the spreadsheet (is it shared with the service account?)")?;
    println!("✅ Connected. Worksheets: {}", titles.join(", "));
    println!("🔗 {}", client.spreadsheet_url());
    Ok(())
}
