use super::service_account::{GoogleError, ServiceAccountAuth};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};

/// The handful of Sheets v4 calls the clinic store needs.
///
/// Ranges use A1 notation, e.g. `'Отзывы'!A1` or just `'Отзывы'` for a whole sheet.
#[async_trait]
pub trait SpreadsheetApi: Send + Sync {
    async fn sheet_titles(&self) -> Result<Vec<String>, GoogleError>;

    async fn add_sheet(&self, title: &str, rows: u32, cols: u32) -> Result<(), GoogleError>;

    /// Cell values as displayed. Trailing empty cells and rows are omitted by Google.
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, GoogleError>;

    /// Overwrite starting at `range`, storing values exactly as given.
    async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), GoogleError>;

    async fn clear(&self, range: &str) -> Result<(), GoogleError>;

    /// Append one row after the table in `range`, parsed as if typed by a user.
    async fn append_row(&self, range: &str, row: Vec<String>) -> Result<(), GoogleError>;

    fn spreadsheet_url(&self) -> String;
}

/// Quote a sheet title for use in A1 notation.
pub fn sheet_range(title: &str, cells: Option<&str>) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    match cells {
        Some(cells) => format!("{quoted}!{cells}"),
        None => quoted,
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// REST client for one spreadsheet, authenticated as a service account.
pub struct SheetsHttpClient {
    client: Client,
    auth: ServiceAccountAuth,
    spreadsheet_id: String,
    base_url: String,
}

impl SheetsHttpClient {
    pub fn new(auth: ServiceAccountAuth, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            auth,
            spreadsheet_id: spreadsheet_id.into(),
            base_url: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
        }
    }

    pub fn client_email(&self) -> &str {
        self.auth.client_email()
    }

    /// `{base}/{id}/{segments...}`; each segment is percent-encoded on its own,
    /// which keeps Cyrillic sheet titles intact.
    fn url(&self, segments: &[&str]) -> Result<Url, GoogleError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| GoogleError::Api {
            status: 0,
            body: format!("bad base url: {e}"),
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| GoogleError::Api {
                status: 0,
                body: "base url cannot have path segments".to_string(),
            })?;
            path.push(&self.spreadsheet_id);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GoogleError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(GoogleError::Api { status, body })
    }
}

#[async_trait]
impl SpreadsheetApi for SheetsHttpClient {
    async fn sheet_titles(&self) -> Result<Vec<String>, GoogleError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(self.url(&[])?)
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await?;
        let metadata: SpreadsheetMetadata = Self::check(response).await?.json().await?;
        Ok(metadata
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn add_sheet(&self, title: &str, rows: u32, cols: u32) -> Result<(), GoogleError> {
        let token = self.auth.access_token().await?;
        // `{id}:batchUpdate` is a single path segment
        let mut url = self.url(&[])?;
        let path = format!("{}:batchUpdate", url.path());
        url.set_path(&path);

        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            }]
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        tracing::info!(sheet = title, "Created worksheet");
        Ok(())
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, GoogleError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(self.url(&["values", range])?)
            .bearer_auth(token)
            .send()
            .await?;
        let range: ValueRange = Self::check(response).await?.json().await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), GoogleError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .put(self.url(&["values", range])?)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn clear(&self, range: &str) -> Result<(), GoogleError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .post(self.url(&["values", &format!("{range}:clear")])?)
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn append_row(&self, range: &str, row: Vec<String>) -> Result<(), GoogleError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .post(self.url(&["values", &format!("{range}:append")])?)
            .bearer_auth(token)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "majorDimension": "ROWS", "values": [row] }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn spreadsheet_url(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}", self.spreadsheet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_range_quotes_titles() {
        assert_eq!(sheet_range("Отзывы", None), "'Отзывы'");
        assert_eq!(sheet_range("Записи на прием", Some("1:1")), "'Записи на прием'!1:1");
        assert_eq!(sheet_range("Bob's", Some("A1")), "'Bob''s'!A1");
    }

    #[test]
    fn test_cell_values_become_text() {
        assert_eq!(cell_text(json!("09:00")), "09:00");
        assert_eq!(cell_text(json!(5)), "5");
        assert_eq!(cell_text(Value::Null), "");
    }

    #[test]
    fn test_value_paths_are_encoded_per_segment() {
        let auth = ServiceAccountAuth::from_json(
            r#"{"client_email": "bot@example.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();
        let client = SheetsHttpClient::new(auth, "sheet123");

        let url = client.url(&["values", "'Отзывы'!A1:append"]).unwrap();
        assert!(url
            .as_str()
            .starts_with("https://sheets.googleapis.com/v4/spreadsheets/sheet123/values/"));
        assert!(!url.path().contains("Отзывы"));
        assert_eq!(
            client.spreadsheet_url(),
            "https://docs.google.com/spreadsheets/d/sheet123"
        );
    }
}
