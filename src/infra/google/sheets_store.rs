use super::service_account::GoogleError;
use super::sheets_api::{sheet_range, SpreadsheetApi};
use crate::core::records::records_models::{
    APPOINTMENTS_SHEET, APPOINTMENT_HEADERS, CONSULTATIONS_SHEET, CONSULTATION_HEADERS,
    REVIEWS_SHEET, REVIEW_HEADERS, SUBSCRIBERS_SHEET, SUBSCRIBER_HEADERS,
};
use crate::core::records::{
    dedup_latest, Appointment, AppointmentKey, ClinicStore, Consultation, ExportTarget, Review,
    StoreError, SubscribeOutcome, Subscriber,
};
use async_trait::async_trait;
use tokio::sync::Mutex;

const NEW_SHEET_ROWS: u32 = 1000;
const MIN_SHEET_COLS: u32 = 10;

impl From<GoogleError> for StoreError {
    fn from(err: GoogleError) -> Self {
        StoreError::Google(err.to_string())
    }
}

/// Column letter of the `count`-th column (A..Z).
fn last_column(count: usize) -> char {
    char::from(b'A' + (count.clamp(1, 26) - 1) as u8)
}

fn headers_row(headers: &[&str]) -> Vec<String> {
    headers.iter().map(|h| h.to_string()).collect()
}

/// Clinic records kept in a Google spreadsheet, one worksheet per record kind.
///
/// Appointment writes rewrite the whole worksheet, so they are serialized
/// through `write_lock`; appends rely on Google's own row insertion.
pub struct SheetsClinicStore<A: SpreadsheetApi> {
    api: A,
    write_lock: Mutex<()>,
}

impl<A: SpreadsheetApi> SheetsClinicStore<A> {
    /// Connect and make sure all four worksheets exist with the right headers.
    pub async fn open(api: A) -> Result<Self, StoreError> {
        let store = Self {
            api,
            write_lock: Mutex::new(()),
        };
        store.ensure_layout().await?;
        Ok(store)
    }

    async fn ensure_layout(&self) -> Result<(), StoreError> {
        let titles = self.api.sheet_titles().await?;
        let layout: [(&str, &[&str]); 4] = [
            (APPOINTMENTS_SHEET, &APPOINTMENT_HEADERS),
            (REVIEWS_SHEET, &REVIEW_HEADERS),
            (CONSULTATIONS_SHEET, &CONSULTATION_HEADERS),
            (SUBSCRIBERS_SHEET, &SUBSCRIBER_HEADERS),
        ];

        for (title, headers) in layout {
            if !titles.iter().any(|t| t == title) {
                let cols = MIN_SHEET_COLS.max(headers.len() as u32);
                self.api.add_sheet(title, NEW_SHEET_ROWS, cols).await?;
            }

            let first_row = self.api.get_values(&sheet_range(title, Some("1:1"))).await?;
            let matches = first_row.first().is_some_and(|row| {
                row.len() >= headers.len() && row.iter().zip(headers.iter()).all(|(a, b)| a == b)
            });
            if !matches {
                tracing::warn!(sheet = title, "Header row missing or changed, resetting worksheet");
                self.api.clear(&sheet_range(title, None)).await?;
                self.api
                    .update_values(&sheet_range(title, Some("A1")), vec![headers_row(headers)])
                    .await?;
            }
        }
        Ok(())
    }

    /// Data rows of a worksheet (header row skipped).
    async fn body(&self, title: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let mut rows = self.api.get_values(&sheet_range(title, None)).await?;
        if rows.is_empty() {
            return Ok(rows);
        }
        rows.remove(0);
        Ok(rows)
    }

    async fn rewrite_appointments(&self, appointments: &[Appointment]) -> Result<(), StoreError> {
        let mut rows = Vec::with_capacity(appointments.len() + 1);
        rows.push(headers_row(&APPOINTMENT_HEADERS));
        rows.extend(appointments.iter().map(Appointment::to_row));
        let written = rows.len();

        // Overwrite first: a failure here leaves the old rows in place
        self.api
            .update_values(&sheet_range(APPOINTMENTS_SHEET, Some("A1")), rows)
            .await?;
        let leftover = format!("A{}:{}", written + 1, last_column(APPOINTMENT_HEADERS.len()));
        self.api
            .clear(&sheet_range(APPOINTMENTS_SHEET, Some(leftover.as_str())))
            .await?;
        Ok(())
    }

    async fn append(&self, title: &str, row: Vec<String>) -> Result<(), StoreError> {
        self.api.append_row(&sheet_range(title, Some("A1")), row).await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn api(&self) -> &A {
        &self.api
    }
}

#[async_trait]
impl<A: SpreadsheetApi> ClinicStore for SheetsClinicStore<A> {
    fn describe(&self) -> String {
        format!("Google Sheets ({})", self.api.spreadsheet_url())
    }

    async fn add_appointment(&self, appointment: Appointment) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut appointments = self.list_appointments().await?;
        appointments.push(appointment);
        self.rewrite_appointments(&dedup_latest(appointments)).await
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        Ok(self
            .body(APPOINTMENTS_SHEET)
            .await?
            .iter()
            .filter_map(|row| Appointment::from_row(row))
            .collect())
    }

    async fn delete_appointment(&self, key: &AppointmentKey) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let appointments = self.list_appointments().await?;
        let before = appointments.len();
        let kept: Vec<Appointment> = appointments
            .into_iter()
            .filter(|a| &a.key() != key)
            .collect();
        if kept.len() == before {
            return Ok(false);
        }
        self.rewrite_appointments(&kept).await?;
        Ok(true)
    }

    async fn add_review(&self, review: Review) -> Result<(), StoreError> {
        self.append(REVIEWS_SHEET, review.to_row()).await
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, StoreError> {
        Ok(self
            .body(REVIEWS_SHEET)
            .await?
            .iter()
            .filter_map(|row| Review::from_row(row))
            .collect())
    }

    async fn add_consultation(&self, consultation: Consultation) -> Result<(), StoreError> {
        self.append(CONSULTATIONS_SHEET, consultation.to_row()).await
    }

    async fn list_consultations(&self) -> Result<Vec<Consultation>, StoreError> {
        Ok(self
            .body(CONSULTATIONS_SHEET)
            .await?
            .iter()
            .filter_map(|row| Consultation::from_row(row))
            .collect())
    }

    async fn add_subscriber(&self, subscriber: Subscriber) -> Result<SubscribeOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self
            .list_subscribers()
            .await?
            .iter()
            .any(|s| s.user_id == subscriber.user_id)
        {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }
        self.append(SUBSCRIBERS_SHEET, subscriber.to_row()).await?;
        Ok(SubscribeOutcome::Added)
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self
            .body(SUBSCRIBERS_SHEET)
            .await?
            .iter()
            .filter_map(|row| Subscriber::from_row(row))
            .collect())
    }

    fn export_target(&self) -> ExportTarget {
        ExportTarget::Url(self.api.spreadsheet_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::NewAppointment;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Spreadsheet held in memory. Understands the A1 ranges the store produces.
    #[derive(Default)]
    struct FakeSheets {
        sheets: StdMutex<BTreeMap<String, Vec<Vec<String>>>>,
        fail_updates: AtomicBool,
    }

    impl FakeSheets {
        fn with_sheet(title: &str, rows: Vec<Vec<&str>>) -> Self {
            let fake = Self::default();
            fake.sheets.lock().unwrap().insert(
                title.to_string(),
                rows.into_iter()
                    .map(|r| r.into_iter().map(String::from).collect())
                    .collect(),
            );
            fake
        }

        fn rows(&self, title: &str) -> Vec<Vec<String>> {
            self.sheets.lock().unwrap().get(title).cloned().unwrap_or_default()
        }

        fn split(range: &str) -> (String, Option<String>) {
            let (title, cells) = match range.rsplit_once("'!") {
                Some((title, cells)) => (title, Some(cells.to_string())),
                None => (range.trim_end_matches('\''), None),
            };
            (title.trim_start_matches('\'').replace("''", "'"), cells)
        }
    }

    #[async_trait]
    impl SpreadsheetApi for FakeSheets {
        async fn sheet_titles(&self) -> Result<Vec<String>, GoogleError> {
            Ok(self.sheets.lock().unwrap().keys().cloned().collect())
        }

        async fn add_sheet(&self, title: &str, _rows: u32, _cols: u32) -> Result<(), GoogleError> {
            self.sheets.lock().unwrap().insert(title.to_string(), Vec::new());
            Ok(())
        }

        async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, GoogleError> {
            let (title, cells) = Self::split(range);
            let rows = self.rows(&title);
            Ok(match cells.as_deref() {
                Some("1:1") => rows.into_iter().take(1).collect(),
                _ => rows,
            })
        }

        async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), GoogleError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(GoogleError::Api {
                    status: 503,
                    body: "backend unavailable".to_string(),
                });
            }
            let (title, _) = Self::split(range);
            let mut sheets = self.sheets.lock().unwrap();
            let sheet = sheets.entry(title).or_default();
            for (i, row) in rows.into_iter().enumerate() {
                if i < sheet.len() {
                    sheet[i] = row;
                } else {
                    sheet.push(row);
                }
            }
            Ok(())
        }

        async fn clear(&self, range: &str) -> Result<(), GoogleError> {
            let (title, cells) = Self::split(range);
            // "A5:I" clears from row 5 down; no cells clears the whole sheet
            let first_row = cells
                .as_deref()
                .and_then(|c| c.split(':').next())
                .and_then(|c| c.trim_start_matches('A').parse::<usize>().ok())
                .unwrap_or(1);
            let mut sheets = self.sheets.lock().unwrap();
            let sheet = sheets.entry(title).or_default();
            sheet.truncate(first_row - 1);
            Ok(())
        }

        async fn append_row(&self, range: &str, row: Vec<String>) -> Result<(), GoogleError> {
            let (title, _) = Self::split(range);
            self.sheets.lock().unwrap().entry(title).or_default().push(row);
            Ok(())
        }

        fn spreadsheet_url(&self) -> String {
            "https://docs.google.com/spreadsheets/d/fake".to_string()
        }
    }

    fn appointment(user_id: u64, time: &str, day: u32) -> Appointment {
        NewAppointment {
            date: "20.10.2026".to_string(),
            time: time.to_string(),
            patient_name: "Пациент".to_string(),
            phone: "+7".to_string(),
            doctor: "Иванов Иван Иванович".to_string(),
            specialization: "Терапевт".to_string(),
            user_id,
        }
        .into_appointment(
            chrono::NaiveDate::from_ymd_opt(2026, 10, day)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_open_creates_sheets_and_repairs_headers() {
        let fake = FakeSheets::with_sheet(REVIEWS_SHEET, vec![vec!["Дата", "Имя"], vec!["old"]]);
        let store = SheetsClinicStore::open(fake).await.unwrap();

        let api = store.api();
        assert_eq!(api.rows(APPOINTMENTS_SHEET), vec![headers_row(&APPOINTMENT_HEADERS)]);
        assert_eq!(api.rows(CONSULTATIONS_SHEET), vec![headers_row(&CONSULTATION_HEADERS)]);
        assert_eq!(api.rows(SUBSCRIBERS_SHEET), vec![headers_row(&SUBSCRIBER_HEADERS)]);
        // Wrong header: sheet cleared and rewritten
        assert_eq!(api.rows(REVIEWS_SHEET), vec![headers_row(&REVIEW_HEADERS)]);
    }

    #[tokio::test]
    async fn test_matching_headers_keep_data() {
        let mut header: Vec<&str> = SUBSCRIBER_HEADERS.to_vec();
        header.push("Комментарий");
        let fake = FakeSheets::with_sheet(SUBSCRIBERS_SHEET, vec![header, vec!["5", "Олег", "x"]]);
        let store = SheetsClinicStore::open(fake).await.unwrap();

        let subscribers = store.list_subscribers().await.unwrap();
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].name, "Олег");
    }

    #[tokio::test]
    async fn test_add_appointment_rewrites_deduplicated() {
        let store = SheetsClinicStore::open(FakeSheets::default()).await.unwrap();

        store.add_appointment(appointment(1, "09:00", 1)).await.unwrap();
        store.add_appointment(appointment(2, "10:00", 2)).await.unwrap();
        let mut again = appointment(1, "09:00", 3);
        again.phone = "+7 111".to_string();
        store.add_appointment(again).await.unwrap();

        let rows = store.api().rows(APPOINTMENTS_SHEET);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], headers_row(&APPOINTMENT_HEADERS));
        assert_eq!(rows[1][3], "+7 111");
        assert_eq!(rows[2][7], "2");
    }

    #[tokio::test]
    async fn test_delete_matches_exact_row() {
        let store = SheetsClinicStore::open(FakeSheets::default()).await.unwrap();
        let first = appointment(1, "09:00", 1);
        store.add_appointment(first.clone()).await.unwrap();
        store.add_appointment(appointment(1, "10:00", 1)).await.unwrap();

        let mut stale = first.key();
        stale.created_at = "2000-01-01 00:00:00".to_string();
        assert!(!store.delete_appointment(&stale).await.unwrap());

        assert!(store.delete_appointment(&first.key()).await.unwrap());
        let left = store.list_appointments().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].time, "10:00");
    }

    #[tokio::test]
    async fn test_failed_rewrite_keeps_existing_rows() {
        let store = SheetsClinicStore::open(FakeSheets::default()).await.unwrap();
        store.add_appointment(appointment(1, "09:00", 1)).await.unwrap();
        store.add_appointment(appointment(2, "10:00", 1)).await.unwrap();
        let before = store.api().rows(APPOINTMENTS_SHEET);

        store.api().fail_updates.store(true, Ordering::SeqCst);
        assert!(store.add_appointment(appointment(3, "11:00", 1)).await.is_err());
        assert!(store
            .delete_appointment(&appointment(1, "09:00", 1).key())
            .await
            .is_err());

        assert_eq!(store.api().rows(APPOINTMENTS_SHEET), before);
        assert_eq!(before.len(), 3);
    }

    #[test]
    fn test_last_column_letter() {
        assert_eq!(last_column(APPOINTMENT_HEADERS.len()), 'I');
        assert_eq!(last_column(1), 'A');
    }

    #[tokio::test]
    async fn test_subscribe_once_and_export_link() {
        let store = SheetsClinicStore::open(FakeSheets::default()).await.unwrap();
        let subscriber = Subscriber {
            user_id: "42".to_string(),
            name: "Анна".to_string(),
            subscribed_at: "2026-10-16 10:00:00".to_string(),
        };

        assert_eq!(
            store.add_subscriber(subscriber.clone()).await.unwrap(),
            SubscribeOutcome::Added
        );
        assert_eq!(
            store.add_subscriber(subscriber).await.unwrap(),
            SubscribeOutcome::AlreadySubscribed
        );
        assert_eq!(store.api().rows(SUBSCRIBERS_SHEET).len(), 2);
        assert_eq!(
            store.export_target(),
            ExportTarget::Url("https://docs.google.com/spreadsheets/d/fake".to_string())
        );
    }
}
