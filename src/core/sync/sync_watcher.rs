// Detects appointments and reviews that disappeared from the store.
//
// Administrators moderate by editing the spreadsheet: deleting a row or typing a
// cancellation / hidden status. The watcher keeps the set of active keys from
// the previous poll and reports whatever is missing now, so the owner can be told.

use crate::core::records::{AppointmentKey, ClinicStore, ReviewKey, SlotKey, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Longest review excerpt quoted back to the author.
pub const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    AppointmentRemoved {
        user_id: u64,
        date: String,
        time: String,
        doctor: String,
    },
    ReviewRemoved {
        user_id: u64,
        date: String,
        rating: String,
        preview: String,
    },
}

impl SyncEvent {
    pub fn user_id(&self) -> u64 {
        match self {
            SyncEvent::AppointmentRemoved { user_id, .. } | SyncEvent::ReviewRemoved { user_id, .. } => {
                *user_id
            }
        }
    }
}

/// Shorten review text to [`PREVIEW_CHARS`] characters, marking the cut with `…`.
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
        cut.push('…');
        cut
    } else {
        text.to_string()
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    appointments: HashSet<AppointmentKey>,
    reviews: HashSet<ReviewKey>,
}

#[derive(Debug, Default)]
struct WatchState {
    /// `None` until the first successful poll.
    baseline: Option<Snapshot>,
    /// Appointments the owner cancelled through the bot; their removal is not news.
    suppressed: HashSet<AppointmentKey>,
}

pub struct SyncWatcher<S: ClinicStore + ?Sized> {
    store: Arc<S>,
    state: RwLock<WatchState>,
}

impl<S: ClinicStore + ?Sized> SyncWatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: RwLock::new(WatchState::default()),
        }
    }

    async fn current(&self) -> Result<Snapshot, StoreError> {
        let appointments = self
            .store
            .list_appointments()
            .await?
            .into_iter()
            .filter(|a| !a.status.is_cancelled())
            .map(|a| a.key())
            .collect();
        let reviews = self
            .store
            .list_reviews()
            .await?
            .into_iter()
            .filter(|r| !r.status.is_hidden())
            .map(|r| r.key())
            .collect();
        Ok(Snapshot {
            appointments,
            reviews,
        })
    }

    /// Compare the store with the previous snapshot.
    ///
    /// The first call only records a baseline. On error the previous snapshot is kept.
    pub async fn poll(&self) -> Result<Vec<SyncEvent>, StoreError> {
        let current = self.current().await?;
        let mut state = self.state.write().await;

        let Some(previous) = state.baseline.take() else {
            tracing::debug!(
                appointments = current.appointments.len(),
                reviews = current.reviews.len(),
                "Sync baseline recorded"
            );
            state.baseline = Some(current);
            return Ok(Vec::new());
        };

        let mut removed_appointments: Vec<&AppointmentKey> = previous
            .appointments
            .difference(&current.appointments)
            .collect();
        removed_appointments.sort();

        // A row replaced by a newer one for the same slot is the owner re-booking
        let rebooked: HashSet<SlotKey> = current
            .appointments
            .iter()
            .map(AppointmentKey::slot)
            .collect();

        let mut events = Vec::new();
        for key in removed_appointments {
            if state.suppressed.remove(key) || rebooked.contains(&key.slot()) {
                continue;
            }
            match key.user_id.parse::<u64>() {
                Ok(user_id) => events.push(SyncEvent::AppointmentRemoved {
                    user_id,
                    date: key.date.clone(),
                    time: key.time.clone(),
                    doctor: key.doctor.clone(),
                }),
                Err(_) => tracing::debug!(user_id = %key.user_id, "Removed appointment has no valid owner"),
            }
        }

        let mut removed_reviews: Vec<&ReviewKey> =
            previous.reviews.difference(&current.reviews).collect();
        removed_reviews.sort();

        for key in removed_reviews {
            match key.user_id.parse::<u64>() {
                Ok(user_id) => events.push(SyncEvent::ReviewRemoved {
                    user_id,
                    date: key.date.clone(),
                    rating: key.rating.clone(),
                    preview: preview(&key.text),
                }),
                Err(_) => tracing::debug!(user_id = %key.user_id, "Removed review has no valid owner"),
            }
        }

        // Only keys still in the store can disappear later
        state
            .suppressed
            .retain(|key| current.appointments.contains(key));
        state.baseline = Some(current);
        Ok(events)
    }

    /// Do not report the removal of this appointment. Call before deleting it.
    pub async fn forget_appointment(&self, key: &AppointmentKey) {
        self.state.write().await.suppressed.insert(key.clone());
    }

    /// Undo [`forget_appointment`](Self::forget_appointment) when the delete did not happen.
    pub async fn watch_appointment(&self, key: &AppointmentKey) {
        self.state.write().await.suppressed.remove(key);
    }

    #[cfg(test)]
    async fn suppressed_count(&self) -> usize {
        self.state.read().await.suppressed.len()
    }
}
