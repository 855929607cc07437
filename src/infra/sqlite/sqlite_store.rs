use crate::core::records::{
    Appointment, AppointmentKey, AppointmentStatus, ClinicStore, Consultation, ExportTarget,
    Review, ReviewStatus, StoreError, SubscribeOutcome, Subscriber,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Local fallback store used when no spreadsheet is configured.
///
/// Cells are stored as text, exactly as they would appear in the sheet, so the
/// two backends are interchangeable. Row order is insertion order (`id`).
pub struct SqliteClinicStore {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl SqliteClinicStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await?;

        let store = Self { pool, path };
        store.migrate().await?;
        tracing::info!(path = %store.path.display(), "Opened SQLite clinic store");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS appointments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                patient_name TEXT NOT NULL,
                phone TEXT NOT NULL,
                doctor TEXT NOT NULL,
                specialization TEXT NOT NULL,
                status TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                patient_name TEXT NOT NULL,
                rating TEXT NOT NULL,
                text TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS consultations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                question TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                answer TEXT NOT NULL DEFAULT ''
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                subscribed_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn appointment_from_row(row: &SqliteRow) -> Appointment {
        Appointment {
            date: row.get("date"),
            time: row.get("time"),
            patient_name: row.get("patient_name"),
            phone: row.get("phone"),
            doctor: row.get("doctor"),
            specialization: row.get("specialization"),
            status: AppointmentStatus::from_cell(row.get::<&str, _>("status")),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
        }
    }

    #[cfg(test)]
    async fn set_status(&self, table: &str, id: i64, status: &str) {
        sqlx::query(&format!("UPDATE {table} SET status = ? WHERE id = ?"))
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await
            .unwrap();
    }
}

#[async_trait]
impl ClinicStore for SqliteClinicStore {
    fn describe(&self) -> String {
        format!("SQLite ({})", self.path.display())
    }

    async fn add_appointment(&self, appointment: Appointment) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Existing rows for the same patient and slot, oldest position first
        let existing = sqlx::query(
            "SELECT id, created_at FROM appointments
             WHERE user_id = ? AND date = ? AND time = ? AND doctor = ?
             ORDER BY id",
        )
        .bind(&appointment.user_id)
        .bind(&appointment.date)
        .bind(&appointment.time)
        .bind(&appointment.doctor)
        .fetch_all(&mut *tx)
        .await?;

        let newest_existing = existing
            .iter()
            .map(|row| row.get::<String, _>("created_at"))
            .max();

        match existing.first() {
            None => {
                sqlx::query(
                    "INSERT INTO appointments
                     (date, time, patient_name, phone, doctor, specialization, status, user_id, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&appointment.date)
                .bind(&appointment.time)
                .bind(&appointment.patient_name)
                .bind(&appointment.phone)
                .bind(&appointment.doctor)
                .bind(&appointment.specialization)
                .bind(appointment.status.as_cell())
                .bind(&appointment.user_id)
                .bind(&appointment.created_at)
                .execute(&mut *tx)
                .await?;
            }
            // An older record than what is stored changes nothing
            Some(_)
                if newest_existing
                    .as_ref()
                    .is_some_and(|newest| *newest > appointment.created_at) => {}
            Some(first) => {
                let first_id: i64 = first.get("id");
                sqlx::query(
                    "UPDATE appointments SET patient_name = ?, phone = ?, specialization = ?,
                     status = ?, created_at = ? WHERE id = ?",
                )
                .bind(&appointment.patient_name)
                .bind(&appointment.phone)
                .bind(&appointment.specialization)
                .bind(appointment.status.as_cell())
                .bind(&appointment.created_at)
                .bind(first_id)
                .execute(&mut *tx)
                .await?;

                for duplicate in existing.iter().skip(1) {
                    sqlx::query("DELETE FROM appointments WHERE id = ?")
                        .bind(duplicate.get::<i64, _>("id"))
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let rows = sqlx::query("SELECT * FROM appointments ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::appointment_from_row).collect())
    }

    async fn delete_appointment(&self, key: &AppointmentKey) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM appointments
             WHERE user_id = ? AND date = ? AND time = ? AND doctor = ? AND created_at = ?",
        )
        .bind(&key.user_id)
        .bind(&key.date)
        .bind(&key.time)
        .bind(&key.doctor)
        .bind(&key.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_review(&self, review: Review) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reviews (date, patient_name, rating, text, user_id, status)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&review.date)
        .bind(&review.patient_name)
        .bind(&review.rating)
        .bind(&review.text)
        .bind(&review.user_id)
        .bind(review.status.as_cell())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query("SELECT * FROM reviews ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Review {
                date: row.get("date"),
                patient_name: row.get("patient_name"),
                rating: row.get("rating"),
                text: row.get("text"),
                user_id: row.get("user_id"),
                status: ReviewStatus::from_cell(row.get::<&str, _>("status")),
            })
            .collect())
    }

    async fn add_consultation(&self, consultation: Consultation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO consultations (date, question, user_id, status, answer)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&consultation.date)
        .bind(&consultation.question)
        .bind(&consultation.user_id)
        .bind(&consultation.status)
        .bind(&consultation.answer)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_consultations(&self) -> Result<Vec<Consultation>, StoreError> {
        let rows = sqlx::query("SELECT * FROM consultations ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Consultation {
                date: row.get("date"),
                question: row.get("question"),
                user_id: row.get("user_id"),
                status: row.get("status"),
                answer: row.get("answer"),
            })
            .collect())
    }

    async fn add_subscriber(&self, subscriber: Subscriber) -> Result<SubscribeOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscribers (user_id, name, subscribed_at) VALUES (?, ?, ?)",
        )
        .bind(&subscriber.user_id)
        .bind(&subscriber.name)
        .bind(&subscriber.subscribed_at)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            SubscribeOutcome::AlreadySubscribed
        } else {
            SubscribeOutcome::Added
        })
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query("SELECT user_id, name, subscribed_at FROM subscribers ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Subscriber {
                user_id: row.get("user_id"),
                name: row.get("name"),
                subscribed_at: row.get("subscribed_at"),
            })
            .collect())
    }

    fn export_target(&self) -> ExportTarget {
        ExportTarget::File(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::{NewAppointment, NewReview};
    use chrono::NaiveDate;

    fn appointment(user_id: u64, time: &str, day: u32) -> Appointment {
        NewAppointment {
            date: "20.10.2026".to_string(),
            time: time.to_string(),
            patient_name: format!("Пациент {day}"),
            phone: "+7".to_string(),
            doctor: "Иванов Иван Иванович".to_string(),
            specialization: "Терапевт".to_string(),
            user_id,
        }
        .into_appointment(
            NaiveDate::from_ymd_opt(2026, 10, day)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        )
    }

    async fn open_temp() -> (tempfile::TempDir, SqliteClinicStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteClinicStore::open(dir.path().join("data").join("clinic.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_rebooking_replaces_in_place() {
        let (_dir, store) = open_temp().await;

        store.add_appointment(appointment(1, "09:00", 1)).await.unwrap();
        store.add_appointment(appointment(2, "09:00", 2)).await.unwrap();
        store.add_appointment(appointment(1, "09:00", 3)).await.unwrap();
        // Older than what is stored: ignored
        store.add_appointment(appointment(1, "09:00", 2)).await.unwrap();

        let rows = store.list_appointments().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, "1");
        assert_eq!(rows[0].patient_name, "Пациент 3");
        assert_eq!(rows[1].user_id, "2");
    }

    #[tokio::test]
    async fn test_delete_and_status_round_trip() {
        let (_dir, store) = open_temp().await;
        let booked = appointment(4, "11:00", 1);
        store.add_appointment(booked.clone()).await.unwrap();

        store.set_status("appointments", 1, "Отменена").await;
        let rows = store.list_appointments().await.unwrap();
        assert!(rows[0].status.is_cancelled());

        assert!(store.delete_appointment(&booked.key()).await.unwrap());
        assert!(!store.delete_appointment(&booked.key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_reviews_consultations_subscribers() {
        let (dir, store) = open_temp().await;
        let now = NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let review = NewReview {
            patient_name: "Анна".to_string(),
            rating: 5,
            text: "Спасибо".to_string(),
            user_id: 7,
        }
        .into_review(now);
        store.add_review(review.clone()).await.unwrap();
        assert_eq!(store.list_reviews().await.unwrap(), vec![review]);

        let consultation = crate::core::records::NewConsultation {
            question: "Можно ли без записи?".to_string(),
            user_id: 7,
        }
        .into_consultation(now);
        store.add_consultation(consultation.clone()).await.unwrap();
        assert_eq!(store.list_consultations().await.unwrap(), vec![consultation]);

        let subscriber = Subscriber {
            user_id: "7".to_string(),
            name: "Анна".to_string(),
            subscribed_at: "2026-10-16 09:00:00".to_string(),
        };
        assert_eq!(
            store.add_subscriber(subscriber.clone()).await.unwrap(),
            SubscribeOutcome::Added
        );
        assert_eq!(
            store.add_subscriber(subscriber).await.unwrap(),
            SubscribeOutcome::AlreadySubscribed
        );
        assert_eq!(store.list_subscribers().await.unwrap().len(), 1);

        assert_eq!(
            store.export_target(),
            ExportTarget::File(dir.path().join("data").join("clinic.db"))
        );
    }
}
