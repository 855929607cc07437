// Runtime configuration read from the environment (and `.env`).

use crate::infra::google::CredentialsSource;
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Moscow;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "BOT_TOKEN is not set. Create a .env file with BOT_TOKEN=your_token or set the environment variable"
    )]
    MissingBotToken,

    #[error(
        "GOOGLE_SHEETS_ID is set but Google credentials are not configured. Set GOOGLE_SERVICE_ACCOUNT_JSON or GOOGLE_APPLICATION_CREDENTIALS"
    )]
    MissingGoogleCredentials,

    #[error("GOOGLE_SHEETS_ID is not set")]
    MissingSheetsId,

    #[error("Invalid ADMIN_ID {0:?} (must be a numeric Telegram user id)")]
    InvalidAdminId(String),

    #[error("Invalid SYNC_INTERVAL_SECS {0:?} (must be a positive number of seconds)")]
    InvalidSyncInterval(String),

    #[error("Unknown CLINIC_TIMEZONE {0:?}")]
    InvalidTimezone(String),
}

/// Spreadsheet backend settings; present only when `GOOGLE_SHEETS_ID` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsSettings {
    pub spreadsheet_id: String,
    pub credentials: CredentialsSource,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub bot_token: Option<String>,
    pub sheets: Option<SheetsSettings>,
    /// Only this user may run admin commands. Unset means everyone may.
    pub admin_id: Option<u64>,
    pub data_dir: PathBuf,
    pub timezone: Tz,
    pub sync_interval: Duration,
    pub catalog_path: Option<PathBuf>,
}

impl AppSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key/value source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let sheets = match get("GOOGLE_SHEETS_ID") {
            Some(spreadsheet_id) => {
                let credentials = get("GOOGLE_SERVICE_ACCOUNT_JSON")
                    .map(|v| CredentialsSource::from_setting(&v))
                    .or_else(|| get("GOOGLE_APPLICATION_CREDENTIALS").map(|p| CredentialsSource::File(PathBuf::from(p))))
                    .ok_or(ConfigError::MissingGoogleCredentials)?;
                Some(SheetsSettings {
                    spreadsheet_id,
                    credentials,
                })
            }
            None => None,
        };

        let admin_id = get("ADMIN_ID")
            .map(|v| v.parse::<u64>().map_err(|_| ConfigError::InvalidAdminId(v)))
            .transpose()?;

        let timezone = match get("CLINIC_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(name))?,
            None => DEFAULT_TIMEZONE,
        };

        let sync_interval = match get("SYNC_INTERVAL_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidSyncInterval(raw)),
            },
            None => Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        };

        Ok(Self {
            bot_token: get("BOT_TOKEN"),
            sheets,
            admin_id,
            data_dir: get("DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            timezone,
            sync_interval,
            catalog_path: get("CLINIC_CATALOG_PATH").map(PathBuf::from),
        })
    }

    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token.as_deref().ok_or(ConfigError::MissingBotToken)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("clinic.db")
    }
}

/// Load `.env` into the process environment.
///
/// Uses `explicit`, then `DOTENV_PATH`, then the usual `.env` search. When
/// `BOT_TOKEN` is still missing afterwards the file is parsed by hand, which
/// copes with a UTF-8 BOM that makes the first key unreadable to the regular
/// parser. Variables already set in the environment are never overridden.
pub fn load_env_file(explicit: Option<&Path>) {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("DOTENV_PATH").ok().map(PathBuf::from));

    let loaded = match &path {
        Some(path) => dotenv::from_path(path).map(|_| path.clone()),
        None => dotenv::dotenv(),
    };
    match &loaded {
        Ok(found) => tracing::debug!(path = %found.display(), "Loaded .env"),
        Err(e) => tracing::debug!("No .env loaded: {e}"),
    }

    if std::env::var("BOT_TOKEN").is_ok() {
        return;
    }

    let fallback = path.unwrap_or_else(|| PathBuf::from(".env"));
    let Ok(content) = std::fs::read_to_string(&fallback) else {
        return;
    };
    for (key, value) in parse_env_lines(&content) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
        }
    }
    tracing::debug!(path = %fallback.display(), "Parsed .env manually");
}

/// Minimal `KEY=VALUE` parser: strips a BOM, skips blanks, comments and lines
/// without `=`, and removes one pair of surrounding quotes.
pub fn parse_env_lines(content: &str) -> Vec<(String, String)> {
    content
        .trim_start_matches('\u{feff}')
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = ['"', '\'']
                .iter()
                .find_map(|q| {
                    value
                        .strip_prefix(*q)
                        .and_then(|v| v.strip_suffix(*q))
                })
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<AppSettings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppSettings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[("BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(s.bot_token().unwrap(), "123:abc");
        assert!(s.sheets.is_none());
        assert_eq!(s.sqlite_path(), PathBuf::from("data").join("clinic.db"));
        assert_eq!(s.timezone, chrono_tz::Europe::Moscow);
        assert_eq!(s.sync_interval, Duration::from_secs(2));
        assert_eq!(s.admin_id, None);
    }

    #[test]
    fn test_missing_token_only_matters_when_asked() {
        let s = settings(&[("BOT_TOKEN", "  ")]).unwrap();
        assert!(matches!(s.bot_token(), Err(ConfigError::MissingBotToken)));
    }

    #[test]
    fn test_sheets_credentials_resolution() {
        let s = settings(&[
            ("GOOGLE_SHEETS_ID", "abc"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/keys/sa.json"),
        ])
        .unwrap();
        assert_eq!(
            s.sheets.unwrap().credentials,
            CredentialsSource::File(PathBuf::from("/keys/sa.json"))
        );

        // Inline JSON wins over the file fallback
        let s = settings(&[
            ("GOOGLE_SHEETS_ID", "abc"),
            ("GOOGLE_SERVICE_ACCOUNT_JSON", "{\"client_email\": \"x\"}"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/keys/sa.json"),
        ])
        .unwrap();
        assert!(matches!(
            s.sheets.unwrap().credentials,
            CredentialsSource::Inline(_)
        ));

        assert!(matches!(
            settings(&[("GOOGLE_SHEETS_ID", "abc")]),
            Err(ConfigError::MissingGoogleCredentials)
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            settings(&[("ADMIN_ID", "@admin")]),
            Err(ConfigError::InvalidAdminId(_))
        ));
        assert!(matches!(
            settings(&[("SYNC_INTERVAL_SECS", "0")]),
            Err(ConfigError::InvalidSyncInterval(_))
        ));
        assert!(matches!(
            settings(&[("CLINIC_TIMEZONE", "Mars/Olympus")]),
            Err(ConfigError::InvalidTimezone(_))
        ));

        let s = settings(&[("ADMIN_ID", "777"), ("CLINIC_TIMEZONE", "Asia/Almaty")]).unwrap();
        assert_eq!(s.admin_id, Some(777));
        assert_eq!(s.timezone, chrono_tz::Asia::Almaty);
    }

    #[test]
    fn test_manual_env_parser() {
        let content = "\u{feff}BOT_TOKEN=\"123:abc\"\n\n# comment\nNO_EQUALS\nADMIN_ID = 42 \nexport DATA_DIR='/var/clinic'\n";
        let parsed = parse_env_lines(content);
        assert_eq!(
            parsed,
            vec![
                ("BOT_TOKEN".to_string(), "123:abc".to_string()),
                ("ADMIN_ID".to_string(), "42".to_string()),
                ("DATA_DIR".to_string(), "/var/clinic".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_file_fallback_keeps_existing_values() {
        // BOT_TOKEN may be set by the environment running the tests; the
        // manual pass only runs without it.
        if std::env::var("BOT_TOKEN").is_ok() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "\u{feff}CLINIC_ENV_TEST_BOM_KEY=from_file\nCLINIC_ENV_TEST_KEPT_KEY=from_file\n",
        )
        .unwrap();
        std::env::set_var("CLINIC_ENV_TEST_KEPT_KEY", "from_env");

        load_env_file(Some(path.as_path()));

        assert_eq!(std::env::var("CLINIC_ENV_TEST_BOM_KEY").unwrap(), "from_file");
        assert_eq!(std::env::var("CLINIC_ENV_TEST_KEPT_KEY").unwrap(), "from_env");
        std::env::remove_var("CLINIC_ENV_TEST_BOM_KEY");
        std::env::remove_var("CLINIC_ENV_TEST_KEPT_KEY");
        std::env::remove_var("\u{feff}CLINIC_ENV_TEST_BOM_KEY");
    }
}
