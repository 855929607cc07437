use crate::core::records::{
    dedup_latest, ClinicStore, NewConsultation, NewReview, Review, StoreError, SubscribeOutcome,
    Subscriber,
};
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("Text is empty")]
    EmptyText,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Aggregate counters for the `/stats` admin command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicStats {
    pub active_appointments: usize,
    pub cancelled_appointments: usize,
    pub reviews: usize,
    pub hidden_reviews: usize,
    pub average_rating: Option<f64>,
    pub consultations: usize,
    pub unanswered_consultations: usize,
    pub subscribers: usize,
}

pub struct FeedbackService<S: ClinicStore + ?Sized> {
    store: Arc<S>,
    timezone: Tz,
}

impl<S: ClinicStore + ?Sized> FeedbackService<S> {
    pub fn new(store: Arc<S>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }

    pub async fn submit_review(&self, review: NewReview) -> Result<Review, FeedbackError> {
        if !(1..=5).contains(&review.rating) {
            return Err(FeedbackError::InvalidRating(review.rating));
        }
        let text = review.text.trim().to_string();
        if text.is_empty() {
            return Err(FeedbackError::EmptyText);
        }

        let stored = NewReview { text, ..review }.into_review(self.now());
        self.store.add_review(stored.clone()).await?;
        tracing::info!(user_id = %stored.user_id, rating = %stored.rating, "Review submitted");
        Ok(stored)
    }

    /// Every review in sheet order, moderated or not.
    pub async fn reviews(&self) -> Result<Vec<Review>, FeedbackError> {
        Ok(self.store.list_reviews().await?)
    }

    pub async fn submit_consultation(&self, user_id: u64, question: &str) -> Result<(), FeedbackError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(FeedbackError::EmptyText);
        }

        let consultation = NewConsultation {
            question: question.to_string(),
            user_id,
        }
        .into_consultation(self.now());
        self.store.add_consultation(consultation).await?;
        tracing::info!(user_id, "Consultation question received");
        Ok(())
    }

    pub async fn subscribe(&self, user_id: u64, name: &str) -> Result<SubscribeOutcome, FeedbackError> {
        let subscriber = Subscriber {
            user_id: user_id.to_string(),
            name: name.trim().to_string(),
            subscribed_at: crate::core::records::format_timestamp(self.now()),
        };
        let outcome = self.store.add_subscriber(subscriber).await?;
        tracing::info!(user_id, ?outcome, "News subscription");
        Ok(outcome)
    }

    pub async fn stats(&self) -> Result<ClinicStats, FeedbackError> {
        let appointments = dedup_latest(self.store.list_appointments().await?);
        let reviews = self.store.list_reviews().await?;
        let consultations = self.store.list_consultations().await?;
        let subscribers = self.store.list_subscribers().await?;

        let cancelled = appointments
            .iter()
            .filter(|a| a.status.is_cancelled())
            .count();

        let ratings: Vec<f64> = reviews
            .iter()
            .filter(|r| !r.status.is_hidden())
            .filter_map(|r| r.rating.parse::<f64>().ok())
            .collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        Ok(ClinicStats {
            active_appointments: appointments.len() - cancelled,
            cancelled_appointments: cancelled,
            reviews: reviews.len(),
            hidden_reviews: reviews.iter().filter(|r| r.status.is_hidden()).count(),
            average_rating,
            consultations: consultations.len(),
            unanswered_consultations: consultations
                .iter()
                .filter(|c| c.answer.trim().is_empty())
                .count(),
            subscribers: subscribers.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::{NewAppointment, ReviewStatus};
    use crate::infra::memory::InMemoryClinicStore;

    fn make_service() -> (Arc<InMemoryClinicStore>, FeedbackService<InMemoryClinicStore>) {
        let store = Arc::new(InMemoryClinicStore::new());
        let service = FeedbackService::new(Arc::clone(&store), chrono_tz::Europe::Moscow);
        (store, service)
    }

    fn review(rating: u8, text: &str) -> NewReview {
        NewReview {
            patient_name: "Анна Смирнова".to_string(),
            rating,
            text: text.to_string(),
            user_id: 11,
        }
    }

    #[tokio::test]
    async fn test_review_rating_bounds() {
        let (_store, service) = make_service();

        assert!(matches!(
            service.submit_review(review(0, "плохо")).await,
            Err(FeedbackError::InvalidRating(0))
        ));
        assert!(matches!(
            service.submit_review(review(6, "отлично")).await,
            Err(FeedbackError::InvalidRating(6))
        ));
        assert!(matches!(
            service.submit_review(review(4, "   ")).await,
            Err(FeedbackError::EmptyText)
        ));

        let saved = service.submit_review(review(5, "  Всё понравилось ")).await.unwrap();
        assert_eq!(saved.text, "Всё понравилось");
        assert_eq!(saved.status, ReviewStatus::New);
        assert_eq!(saved.user_id, "11");
        assert_eq!(service.reviews().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (store, service) = make_service();

        assert_eq!(service.subscribe(7, "Олег").await.unwrap(), SubscribeOutcome::Added);
        assert_eq!(
            service.subscribe(7, "Олег").await.unwrap(),
            SubscribeOutcome::AlreadySubscribed
        );
        assert_eq!(store.list_subscribers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_consultation_requires_text() {
        let (store, service) = make_service();

        assert!(matches!(
            service.submit_consultation(3, "\n").await,
            Err(FeedbackError::EmptyText)
        ));
        service.submit_consultation(3, "Болит голова").await.unwrap();

        let saved = store.list_consultations().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].status, "Новая");
        assert_eq!(saved[0].answer, "");
    }

    #[tokio::test]
    async fn test_stats_counts_everything() {
        let (store, service) = make_service();

        let at = |day: u32| {
            chrono::NaiveDate::from_ymd_opt(2026, 10, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
        };
        for (user_id, time) in [(1u64, "09:00"), (2, "09:30")] {
            let appointment = NewAppointment {
                date: "20.10.2026".to_string(),
                time: time.to_string(),
                patient_name: "П".to_string(),
                phone: "1".to_string(),
                doctor: "Д".to_string(),
                specialization: "Терапевт".to_string(),
                user_id,
            }
            .into_appointment(at(user_id as u32));
            store.add_appointment(appointment).await.unwrap();
        }
        let first = store.list_appointments().await.unwrap()[0].key();
        store.set_appointment_status(&first, "Отменена").await;

        service.submit_review(review(4, "хорошо")).await.unwrap();
        service.submit_review(review(2, "долго ждал")).await.unwrap();
        service.submit_review(review(5, "спам")).await.unwrap();
        store.set_review_status(2, "Скрыт").await;

        service.submit_consultation(1, "вопрос").await.unwrap();
        service.subscribe(1, "А").await.unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.active_appointments, 1);
        assert_eq!(stats.cancelled_appointments, 1);
        assert_eq!(stats.reviews, 3);
        assert_eq!(stats.hidden_reviews, 1);
        assert_eq!(stats.average_rating, Some(3.0));
        assert_eq!(stats.consultations, 1);
        assert_eq!(stats.unanswered_consultations, 1);
        assert_eq!(stats.subscribers, 1);
    }
}
