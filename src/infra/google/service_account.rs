// =============================================================================
// GOOGLE SERVICE ACCOUNT AUTHENTICATION
// =============================================================================
//
// Exchanges a signed JWT for an OAuth2 access token (the "JWT bearer" grant).
//
// **Setup:**
// 1. Create a service account in Google Cloud Console and enable the
//    Google Sheets API for its project.
// 2. Create a JSON key for it.
// 3. Share the spreadsheet with the service account email
//    (name@project.iam.gserviceaccount.com) as an Editor.
// 4. Provide the key as `GOOGLE_SERVICE_ACCOUNT_JSON` (inline JSON or a path)
//    or point `GOOGLE_APPLICATION_CREDENTIALS` at the file.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("Cannot read credentials file {path}: {source}")]
    CredentialsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid service account JSON: {0}")]
    InvalidCredentials(#[from] serde_json::Error),
    #[error("JWT signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },
    #[error("Google API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("System clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
}

/// Where the service account key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    Inline(String),
    File(PathBuf),
}

impl CredentialsSource {
    /// Interpret `GOOGLE_SERVICE_ACCOUNT_JSON`: JSON text when it looks like an
    /// object, otherwise a file path.
    pub fn from_setting(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with('{') {
            CredentialsSource::Inline(trimmed.to_string())
        } else {
            CredentialsSource::File(PathBuf::from(trimmed))
        }
    }
}

/// Service account credentials from the JSON key.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Authenticator that hands out cached access tokens for the service account.
pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    pub async fn from_source(source: &CredentialsSource) -> Result<Self, GoogleError> {
        match source {
            CredentialsSource::Inline(json) => Self::from_json(json),
            CredentialsSource::File(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|source| {
                    GoogleError::CredentialsFile {
                        path: path.clone(),
                        source,
                    }
                })?;
                Self::from_json(&content)
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self, GoogleError> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(json)?;
        Ok(Self {
            credentials,
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    /// The address the spreadsheet has to be shared with.
    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String, GoogleError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + Duration::from_secs(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let new_token = self.fetch_new_token().await?;

        let mut cached = self.cached_token.write().await;
        *cached = Some(CachedToken {
            token: new_token.clone(),
            expires_at: SystemTime::now() + Duration::from_secs(55 * 60),
        });

        Ok(new_token)
    }

    async fn fetch_new_token(&self) -> Result<String, GoogleError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: SCOPES.to_string(),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(GoogleError::TokenExchange { status, body });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(client_email = %self.credentials.client_email, "Fetched Google access token");
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_is_json_or_path() {
        assert_eq!(
            CredentialsSource::from_setting("  {\"type\": \"service_account\"}"),
            CredentialsSource::Inline("{\"type\": \"service_account\"}".to_string())
        );
        assert_eq!(
            CredentialsSource::from_setting("/etc/clinic/sa.json"),
            CredentialsSource::File(PathBuf::from("/etc/clinic/sa.json"))
        );
    }

    #[test]
    fn test_token_uri_defaults() {
        let auth = ServiceAccountAuth::from_json(
            r#"{"client_email": "bot@clinic.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();
        assert_eq!(auth.client_email(), "bot@clinic.iam.gserviceaccount.com");
        assert_eq!(auth.credentials.token_uri, "https://oauth2.googleapis.com/token");

        assert!(matches!(
            ServiceAccountAuth::from_json("not json"),
            Err(GoogleError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = ServiceAccountAuth::from_source(&CredentialsSource::File(path.clone()))
            .await
            .err()
            .unwrap();
        match err {
            GoogleError::CredentialsFile { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
