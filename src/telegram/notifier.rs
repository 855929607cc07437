// Background task telling users about records administrators removed.

use super::handlers::{show_my_appointments, Data, Screen};
use super::texts;
use crate::core::sync::SyncEvent;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::time::sleep;

/// Poll the store forever. The first pass only records what exists.
pub async fn run_sync_loop(bot: Bot, data: Arc<Data>, interval: Duration) {
    tracing::info!(
        store = %data.store.describe(),
        interval_secs = interval.as_secs(),
        "Store sync started"
    );
    loop {
        match data.watcher.poll().await {
            Ok(events) => {
                if !events.is_empty() {
                    tracing::info!("Found {} removed records", events.len());
                    send_events(&bot, &data, events).await;
                }
            }
            Err(err) => tracing::warn!("Store sync poll failed: {}", err),
        }

        sleep(interval).await;
    }
}

/// Notify each owner, then refresh any "my appointments" list they have open.
pub async fn send_events(bot: &Bot, data: &Data, events: Vec<SyncEvent>) {
    let mut refresh = BTreeSet::new();
    for event in &events {
        let user_id = event.user_id();
        if let Err(err) = bot
            .send_message(UserId(user_id), texts::sync_notice(event))
            .await
        {
            tracing::warn!(user_id, error = %err, "Failed to send removal notice");
        }
        if matches!(event, SyncEvent::AppointmentRemoved { .. }) {
            refresh.insert(user_id);
        }
    }

    for user_id in refresh {
        let Some((chat_id, message_id)) = data.views.get(&user_id).map(|view| *view.value()) else {
            continue;
        };
        let screen = Screen {
            chat_id,
            message_id: Some(message_id),
        };
        if let Err(err) = show_my_appointments(bot, data, user_id, screen).await {
            tracing::warn!(user_id, error = %err, "Failed to refresh appointment list");
        }
    }
}
