//! Live unread-notification cache for one user.
//!
//! Two producers feed the same `watch` channel: a poller that re-lists the
//! unread notifications on a fixed interval, and a listener on the store's
//! change feed that re-lists as soon as a notification addressed to the
//! user is written. Subscribers only wake when the list actually changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use moodboard_db::ChangeEvent;
use moodboard_types::api::NotificationView;

use crate::MoodBoard;
use crate::collections::NOTIFICATIONS;
use crate::notifications::addressed_to;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

type Unread = Vec<NotificationView>;

/// Shared by both producers. Refreshes run one at a time so a slow poll
/// that started before a write cannot overwrite a newer result.
struct Cache {
    tx: watch::Sender<Unread>,
    gate: Mutex<()>,
}

impl Cache {
    async fn refresh(&self, board: &MoodBoard, user_id: &str) {
        let _guard = self.gate.lock().await;
        match board.list_unread(user_id, None).await {
            Ok(list) => {
                self.tx.send_if_modified(|current| {
                    if *current == list {
                        false
                    } else {
                        *current = list;
                        true
                    }
                });
            }
            Err(e) => warn!("Failed to refresh notifications for {}: {}", user_id, e),
        }
    }
}

pub struct NotificationWatcher {
    user_id: String,
    unread: watch::Receiver<Unread>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NotificationWatcher {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Latest cached list, newest first.
    pub fn current(&self) -> Unread {
        self.unread.borrow().clone()
    }

    /// A receiver that can outlive borrows of the watcher.
    pub fn subscribe(&self) -> watch::Receiver<Unread> {
        self.unread.clone()
    }

    /// Wait for the next change. Returns `None` once the watcher has stopped.
    pub async fn changed(&mut self) -> Option<Unread> {
        let res = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            res = self.unread.changed() => res,
        };
        res.ok()?;
        Some(self.unread.borrow_and_update().clone())
    }

    /// Stop both producers and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("Notification watcher task failed: {}", e);
            }
        }
        debug!("Notification watcher for {} stopped", self.user_id);
    }
}

impl Drop for NotificationWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl MoodBoard {
    /// Start watching `user_id`'s unread notifications. Must be called from
    /// within a Tokio runtime.
    pub fn watch_notifications(&self, user_id: &str, poll_interval: Duration) -> NotificationWatcher {
        let (tx, rx) = watch::channel(Vec::new());
        let cache = Arc::new(Cache {
            tx,
            gate: Mutex::new(()),
        });
        let cancel = CancellationToken::new();
        // Subscribe before spawning so no write in between is missed
        let changes = self.store.subscribe();

        let poller = tokio::spawn(poll_unread(
            self.clone(),
            user_id.to_string(),
            poll_interval,
            cache.clone(),
            cancel.clone(),
        ));
        let listener = tokio::spawn(listen_for_changes(
            self.clone(),
            user_id.to_string(),
            changes,
            cache,
            cancel.clone(),
        ));

        NotificationWatcher {
            user_id: user_id.to_string(),
            unread: rx,
            cancel,
            tasks: vec![poller, listener],
        }
    }
}

async fn poll_unread(
    board: MoodBoard,
    user_id: String,
    every: Duration,
    cache: Arc<Cache>,
    cancel: CancellationToken,
) {
    // The first tick fires immediately and serves as the initial load
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => cache.refresh(&board, &user_id).await,
        }
    }
}

async fn listen_for_changes(
    board: MoodBoard,
    user_id: String,
    mut changes: broadcast::Receiver<ChangeEvent>,
    cache: Arc<Cache>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = changes.recv() => match event {
                Ok(event) if concerns(&event, &user_id) => cache.refresh(&board, &user_id).await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Notification listener for {} skipped {} changes", user_id, n);
                    cache.refresh(&board, &user_id).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn concerns(event: &ChangeEvent, user_id: &str) -> bool {
    if event.collection != NOTIFICATIONS {
        return false;
    }
    match &event.data {
        Some(data) => addressed_to(data, user_id),
        // Deletions carry no body; the receiver is unknown
        None => true,
    }
}
