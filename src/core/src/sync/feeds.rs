//! Auxiliary feeds: the backend's pending-message queue and its event log.
//! Each runs on its own [`PollScheduler`](super::PollScheduler) alongside the
//! message poll and keeps only the latest list.

use std::sync::Arc;

use parley_protocol::{Event, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::controller::{Inner, SyncController};

const PENDING_TARGET: &str = "pending";
const EVENTS_TARGET: &str = "events";

impl SyncController {
    /// Start (or restart) the pending and events poll loops.
    pub fn start_feeds(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .pending_poll
            .start(PENDING_TARGET, move |_, token| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.poll_pending(token).await;
                    }
                }
            });

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .events_poll
            .start(EVENTS_TARGET, move |_, token| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.poll_events(token).await;
                    }
                }
            });
    }

    pub fn stop_feeds(&self) {
        self.inner.pending_poll.stop();
        self.inner.events_poll.stop();
    }

    /// Latest pending messages, normalized.
    pub fn pending_messages(&self) -> Vec<Message> {
        self.inner.lock().pending().to_vec()
    }

    /// Latest backend events.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events().to_vec()
    }
}

impl Inner {
    async fn poll_pending(&self, token: CancellationToken) {
        let raw = match self.backend.pending_messages().await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "pending poll failed");
                return;
            }
        };
        // Pending messages span conversations; each keeps its own context id.
        let pending: Vec<Message> = raw
            .iter()
            .enumerate()
            .map(|(index, message)| {
                let conversation_id = message.context_id.as_deref().unwrap_or_default();
                self.normalize_one(conversation_id, message, index)
            })
            .collect();

        let mut store = self.lock();
        if token.is_cancelled() {
            return;
        }
        if store.set_pending(pending) {
            debug!(count = store.pending().len(), "pending messages changed");
        }
    }

    async fn poll_events(&self, token: CancellationToken) {
        let events = match self.backend.events().await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "event poll failed");
                return;
            }
        };

        let mut store = self.lock();
        if token.is_cancelled() {
            return;
        }
        if store.set_events(events) {
            debug!(count = store.events().len(), "events changed");
        }
    }
}
