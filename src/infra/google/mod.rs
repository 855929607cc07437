// Google Sheets infra layer.
// - `service_account.rs` turns a service account key into access tokens.
// - `sheets_api.rs` is the thin REST client for the Sheets v4 API.
// - `sheets_store.rs` maps clinic records onto worksheets.

#[path = "service_account.rs"]
pub mod service_account;

#[path = "sheets_api.rs"]
pub mod sheets_api;

#[path = "sheets_store.rs"]
pub mod sheets_store;

pub use service_account::{CredentialsSource, ServiceAccountAuth};
pub use sheets_api::{SheetsHttpClient, SpreadsheetApi};
pub use sheets_store::SheetsClinicStore;
