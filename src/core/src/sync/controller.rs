use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parley_protocol::{
    normalize_message, Agent, Conversation, Message, RawConversation, RawMessage, Task,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attachment::{outgoing_parts, Attachment};
use crate::backend::{Backend, HttpBackend};
use crate::config::ClientConfig;
use crate::error::{ApiError, SyncError};

use super::poller::PollScheduler;
use super::store::{ConversationStore, Delivery, SyncEvent, SyncSnapshot};

/// Drives the store from backend responses and user actions.
///
/// Cheap to clone; clones share one store and one set of poll loops. Store
/// mutations happen in short critical sections that never span a network
/// call.
#[derive(Clone)]
pub struct SyncController {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) backend: Arc<dyn Backend>,
    config: ClientConfig,
    store: Mutex<ConversationStore>,
    messages_poll: PollScheduler,
    pub(super) pending_poll: PollScheduler,
    pub(super) events_poll: PollScheduler,
    initialized: AtomicBool,
}

impl SyncController {
    pub fn new(backend: Arc<dyn Backend>, config: ClientConfig) -> Self {
        let inner = Inner {
            store: Mutex::new(ConversationStore::new(config.event_buffer)),
            messages_poll: PollScheduler::new("messages", config.message_poll_interval),
            pending_poll: PollScheduler::new("pending", config.pending_poll_interval),
            events_poll: PollScheduler::new("events", config.events_poll_interval),
            initialized: AtomicBool::new(false),
            backend,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Controller over the HTTP backend described by `config`.
    pub fn connect(config: ClientConfig) -> Result<Self, ApiError> {
        let backend = HttpBackend::new(&config)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.lock().subscribe()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.inner.lock().active_conversation_id().map(str::to_string)
    }

    /// Cached copy of a known conversation.
    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.inner.lock().conversation(conversation_id).cloned()
    }

    /// Load the catalog, then resume the most recently listed conversation
    /// or create one if there is none, and start polling it.
    ///
    /// A second call after success returns the active id without touching
    /// the backend.
    pub async fn initialize(&self) -> Result<String, SyncError> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            if let Some(active) = self.active_conversation_id() {
                return Ok(active);
            }
        }
        if !self.inner.lock().try_begin_creating() {
            return Err(SyncError::Busy("conversation setup"));
        }
        let result = self.initialize_inner().await;
        self.inner.lock().end_creating();
        result
    }

    async fn initialize_inner(&self) -> Result<String, SyncError> {
        let catalog = self
            .inner
            .backend
            .list_conversations()
            .await
            .map_err(|err| logged(err, "conversation list failed"))?;
        let catalog = self.inner.normalize_catalog(catalog);

        let resume = {
            let mut store = self.inner.lock();
            store.load_catalog(catalog);
            let resume = store.most_recent().map(str::to_string);
            if let Some(id) = &resume {
                store.select(id);
            }
            resume
        };

        let conversation_id = match resume {
            Some(id) => {
                info!(conversation_id = %id, "resuming conversation");
                id
            }
            None => {
                let id = self
                    .inner
                    .backend
                    .create_conversation()
                    .await
                    .map_err(|err| logged(err, "conversation create failed"))?;
                info!(conversation_id = %id, "created conversation");
                self.inner.lock().create_local(&id);
                id
            }
        };

        self.inner.initialized.store(true, Ordering::SeqCst);
        self.start_message_poll(&conversation_id);
        Ok(conversation_id)
    }

    /// Send a user message to the active conversation.
    ///
    /// The message is visible in the store before the backend call starts.
    /// On failure it stays visible, marked [`Delivery::Failed`].
    pub async fn send(
        &self,
        text: &str,
        attachment: Option<Attachment>,
    ) -> Result<String, SyncError> {
        let text = text.trim();
        if text.is_empty() && attachment.is_none() {
            return Err(SyncError::InvalidInput("message is empty"));
        }

        let message = {
            let mut store = self.inner.lock();
            let conversation_id = store
                .active_conversation_id()
                .ok_or(SyncError::NoActiveConversation)?
                .to_string();
            let message = Message::user(conversation_id, outgoing_parts(text, attachment));
            store.append_optimistic(message.clone());
            store.begin_send();
            message
        };
        self.deliver(message).await
    }

    /// Resend a message whose earlier send failed.
    pub async fn retry(&self, message_id: &str) -> Result<String, SyncError> {
        let message = {
            let mut store = self.inner.lock();
            let message = store
                .failed_message(message_id)
                .ok_or_else(|| SyncError::UnknownMessage(message_id.to_string()))?;
            store.mark_delivery(message_id, Delivery::Pending);
            store.begin_send();
            message
        };
        self.deliver(message).await
    }

    /// Drop a failed message from the store.
    pub fn discard(&self, message_id: &str) -> Result<(), SyncError> {
        if self.inner.lock().discard(message_id) {
            Ok(())
        } else {
            Err(SyncError::UnknownMessage(message_id.to_string()))
        }
    }

    async fn deliver(&self, message: Message) -> Result<String, SyncError> {
        let message_id = message.id.clone();
        let conversation_id = message.conversation_id.clone();
        let result = self.inner.backend.send_message(message).await;

        let mut store = self.inner.lock();
        store.end_send();
        match result {
            Ok(_) => {
                store.mark_delivery(&message_id, Delivery::Sent);
                debug!(
                    message_id = %message_id,
                    conversation_id = %conversation_id,
                    "message sent"
                );
                Ok(message_id)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    message_id = %message_id,
                    conversation_id = %conversation_id,
                    "message send failed"
                );
                store.mark_delivery(&message_id, Delivery::Failed);
                Err(err.into())
            }
        }
    }

    /// Create a backend conversation and make it active.
    ///
    /// Returns `Ok(None)` when a create is already in flight. If the backend
    /// call fails the previously active conversation is restored.
    pub async fn new_conversation(&self) -> Result<Option<String>, SyncError> {
        if !self.inner.lock().try_begin_creating() {
            debug!("conversation create already in flight");
            return Ok(None);
        }

        let previous = self.inner.messages_poll.stop();
        self.inner.lock().clear_active();

        let result = self.inner.backend.create_conversation().await;
        match result {
            Ok(id) => {
                {
                    let mut store = self.inner.lock();
                    store.create_local(&id);
                    store.end_creating();
                }
                self.inner.initialized.store(true, Ordering::SeqCst);
                info!(conversation_id = %id, "created conversation");
                self.start_message_poll(&id);
                Ok(Some(id))
            }
            Err(err) => {
                warn!(error = %err, "conversation create failed");
                let restored = {
                    let mut store = self.inner.lock();
                    store.end_creating();
                    previous.filter(|id| store.select(id))
                };
                if let Some(id) = restored {
                    self.start_message_poll(&id);
                }
                Err(err.into())
            }
        }
    }

    /// Make `conversation_id` active, showing its cached messages at once and
    /// polling it from now on. An id missing from the catalog triggers one
    /// catalog refresh before it is rejected.
    pub async fn switch_conversation(&self, conversation_id: &str) -> Result<(), SyncError> {
        if !self.inner.lock().knows(conversation_id) {
            self.refresh_catalog().await?;
            if !self.inner.lock().knows(conversation_id) {
                return Err(SyncError::UnknownConversation(
                    conversation_id.to_string(),
                ));
            }
        }

        self.inner.messages_poll.stop();
        self.inner.lock().select(conversation_id);
        self.start_message_poll(conversation_id);
        Ok(())
    }

    /// Reload `/conversation/list` into the catalog. Returns the known
    /// conversation ids in catalog order.
    pub async fn refresh_catalog(&self) -> Result<Vec<String>, SyncError> {
        let catalog = self
            .inner
            .backend
            .list_conversations()
            .await
            .map_err(|err| logged(err, "conversation list failed"))?;
        let catalog = self.inner.normalize_catalog(catalog);
        let mut store = self.inner.lock();
        store.load_catalog(catalog);
        Ok(store.snapshot().conversations)
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, SyncError> {
        self.inner
            .backend
            .list_agents()
            .await
            .map_err(|err| logged(err, "agent list failed"))
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, SyncError> {
        self.inner
            .backend
            .list_tasks()
            .await
            .map_err(|err| logged(err, "task list failed"))
    }

    pub async fn register_agent(&self, url: &str) -> Result<(), SyncError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SyncError::InvalidInput("agent url is empty"));
        }
        self.inner
            .backend
            .register_agent(url.to_string())
            .await
            .map_err(|err| logged(err, "agent register failed"))?;
        info!(url, "agent registered");
        Ok(())
    }

    pub async fn update_api_key(&self, api_key: &str) -> Result<(), SyncError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(SyncError::InvalidInput("api key is empty"));
        }
        self.inner
            .backend
            .update_api_key(api_key.to_string())
            .await
            .map_err(|err| logged(err, "api key update failed"))?;
        info!("api key updated");
        Ok(())
    }

    /// Stop every poll loop. Store contents are kept.
    pub fn teardown(&self) {
        self.inner.messages_poll.stop();
        self.stop_feeds();
        debug!("sync controller torn down");
    }

    fn start_message_poll(&self, conversation_id: &str) {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .messages_poll
            .start(conversation_id, move |target, token| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.poll_messages(target, token).await;
                    }
                }
            });
    }
}

impl Inner {
    pub(super) fn lock(&self) -> MutexGuard<'_, ConversationStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_messages(&self, conversation_id: String, token: CancellationToken) {
        let raw = match self.backend.list_messages(conversation_id.clone()).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, conversation_id = %conversation_id, "message poll failed");
                return;
            }
        };
        let messages = self.normalize_messages(&conversation_id, &raw);

        let mut store = self.lock();
        if token.is_cancelled() || store.active_conversation_id() != Some(conversation_id.as_str())
        {
            debug!(conversation_id = %conversation_id, "discarding stale message poll");
            return;
        }
        if store.reconcile(&conversation_id, messages) {
            debug!(conversation_id = %conversation_id, "messages reconciled");
        }
    }

    fn normalize_messages(&self, conversation_id: &str, raw: &[RawMessage]) -> Vec<Message> {
        raw.iter()
            .enumerate()
            .map(|(index, message)| self.normalize_one(conversation_id, message, index))
            .collect()
    }

    pub(super) fn normalize_one(
        &self,
        conversation_id: &str,
        message: &RawMessage,
        index: usize,
    ) -> Message {
        if self.config.log_raw_parts {
            debug!(
                conversation_id,
                message_id = %message.message_id,
                parts = ?message.parts,
                "raw message parts"
            );
        }
        normalize_message(message, conversation_id, index)
    }

    fn normalize_catalog(&self, raw: Vec<RawConversation>) -> Vec<Conversation> {
        raw.into_iter()
            .map(|conversation| {
                let messages = conversation
                    .messages
                    .as_deref()
                    .map(|list| self.normalize_messages(&conversation.conversation_id, list))
                    .unwrap_or_default();
                Conversation {
                    id: conversation.conversation_id,
                    messages,
                }
            })
            .collect()
    }
}

fn logged(err: ApiError, what: &'static str) -> SyncError {
    warn!(error = %err, "{what}");
    SyncError::Api(err)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_protocol::Role;

    use super::*;
    use crate::sync::fake::{raw, test_config, text_of, FakeBackend};

    fn controller(fake: &Arc<FakeBackend>) -> SyncController {
        SyncController::new(fake.clone(), test_config())
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn ids(snapshot: &SyncSnapshot) -> Vec<String> {
        snapshot
            .messages
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_creates_when_catalog_is_empty() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);

        let id = ctrl.initialize().await.unwrap();
        assert_eq!(id, "conv-1");
        assert!(ctrl.snapshot().is_empty_conversation());

        assert_eq!(ctrl.initialize().await.unwrap(), "conv-1");
        assert_eq!(fake.state().create_calls, 1);
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_resumes_most_recent_conversation() {
        let fake = FakeBackend::new();
        fake.add_conversation("old", vec![]);
        fake.add_conversation(
            "recent",
            vec![raw("recent", "r1", Role::Assistant, "welcome back")],
        );
        let ctrl = controller(&fake);

        let id = ctrl.initialize().await.unwrap();
        assert_eq!(id, "recent");
        assert_eq!(fake.state().create_calls, 0);
        let snap = ctrl.snapshot();
        assert_eq!(ids(&snap), ["r1"]);
        assert_eq!(snap.conversations, ["old", "recent"]);
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_surfaces_catalog_failure_without_creating() {
        let fake = FakeBackend::new();
        fake.state().fail_lists = true;
        let ctrl = controller(&fake);

        assert!(matches!(ctrl.initialize().await, Err(SyncError::Api(_))));
        assert_eq!(fake.state().create_calls, 0);
        assert!(!ctrl.snapshot().creating);
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_echo_is_visible_before_send_resolves() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();
        let gate = fake.gate_sends();

        let sending = tokio::spawn({
            let ctrl = ctrl.clone();
            async move { ctrl.send("hello", None).await }
        });
        wait_until(|| ctrl.snapshot().sending).await;

        let snap = ctrl.snapshot();
        let messages = snap.messages.as_deref().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(text_of(&messages[0]), ["hello"]);
        assert_eq!(snap.deliveries.get(&messages[0].id), Some(&Delivery::Pending));
        assert!(fake.state().sent.is_empty());

        gate.notify_one();
        let id = sending.await.unwrap().unwrap();
        assert_eq!(id, messages[0].id);
        assert!(!ctrl.snapshot().sending);
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn poll_replaces_local_echo_with_backend_history() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        let conv = ctrl.initialize().await.unwrap();

        ctrl.send("hi", None).await.unwrap();
        fake.set_messages(
            &conv,
            vec![
                raw(&conv, "m1", Role::User, "hi"),
                raw(&conv, "m2", Role::Assistant, "hello!"),
            ],
        );

        wait_until(|| ids(&ctrl.snapshot()) == ["m1", "m2"]).await;
        let snap = ctrl.snapshot();
        let messages = snap.messages.unwrap();
        assert_eq!(text_of(&messages[0]), ["hi"]);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(text_of(&messages[1]), ["hello!"]);
        assert!(snap.deliveries.is_empty());
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_for_previous_conversation_is_discarded() {
        let fake = FakeBackend::new();
        fake.add_conversation("b", vec![raw("b", "b1", Role::Assistant, "in b")]);
        fake.add_conversation("a", vec![raw("a", "a1", Role::Assistant, "in a")]);
        let gate = fake.gate_list("a");
        let ctrl = controller(&fake);

        assert_eq!(ctrl.initialize().await.unwrap(), "a");
        // Let the first poll of "a" reach the gate.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(fake.state().list_calls.is_empty());

        ctrl.switch_conversation("b").await.unwrap();
        fake.set_messages("a", vec![raw("a", "late", Role::Assistant, "too late")]);
        gate.notify_one();

        wait_until(|| fake.state().list_calls.get("a") == Some(&1)).await;
        wait_until(|| fake.state().list_calls.get("b").is_some_and(|n| *n >= 2)).await;
        let snap = ctrl.snapshot();
        assert_eq!(snap.active_conversation_id.as_deref(), Some("b"));
        assert_eq!(ids(&snap), ["b1"]);

        let cached = ctrl.conversation("a").unwrap();
        assert_eq!(cached.messages.len(), 1);
        assert_eq!(cached.messages[0].id, "a1");
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn switch_shows_cache_and_polls_new_target() {
        let fake = FakeBackend::new();
        fake.add_conversation("b", vec![raw("b", "b1", Role::Assistant, "in b")]);
        fake.add_conversation("a", vec![]);
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();

        ctrl.switch_conversation("b").await.unwrap();
        assert_eq!(ids(&ctrl.snapshot()), ["b1"]);

        fake.set_messages(
            "b",
            vec![
                raw("b", "b1", Role::Assistant, "in b"),
                raw("b", "b2", Role::Assistant, "more"),
            ],
        );
        wait_until(|| ids(&ctrl.snapshot()) == ["b1", "b2"]).await;
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn switch_refreshes_catalog_for_unknown_ids() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();

        fake.add_conversation("elsewhere", vec![]);
        ctrl.switch_conversation("elsewhere").await.unwrap();
        assert_eq!(ctrl.active_conversation_id().as_deref(), Some("elsewhere"));

        assert!(matches!(
            ctrl.switch_conversation("missing").await,
            Err(SyncError::UnknownConversation(id)) if id == "missing"
        ));
        assert_eq!(ctrl.active_conversation_id().as_deref(), Some("elsewhere"));
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn reentrant_new_conversation_is_ignored() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();
        let gate = fake.gate_creates();

        let creating = tokio::spawn({
            let ctrl = ctrl.clone();
            async move { ctrl.new_conversation().await }
        });
        wait_until(|| ctrl.snapshot().creating).await;

        let snap = ctrl.snapshot();
        assert!(snap.messages.is_none());
        assert!(snap.active_conversation_id.is_none());
        assert_eq!(ctrl.new_conversation().await.unwrap(), None);

        gate.notify_one();
        assert_eq!(creating.await.unwrap().unwrap().as_deref(), Some("conv-2"));
        assert_eq!(fake.state().create_calls, 2);
        let snap = ctrl.snapshot();
        assert_eq!(snap.active_conversation_id.as_deref(), Some("conv-2"));
        assert!(snap.is_empty_conversation());
        assert!(!snap.creating);
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_create_restores_previous_conversation() {
        let fake = FakeBackend::new();
        fake.add_conversation("a", vec![raw("a", "a1", Role::Assistant, "in a")]);
        let ctrl = controller(&fake);
        assert_eq!(ctrl.initialize().await.unwrap(), "a");
        wait_until(|| fake.state().list_calls.contains_key("a")).await;
        fake.state().fail_creates = true;

        assert!(matches!(
            ctrl.new_conversation().await,
            Err(SyncError::Api(_))
        ));
        let snap = ctrl.snapshot();
        assert_eq!(snap.active_conversation_id.as_deref(), Some("a"));
        assert!(snap.messages.is_some());
        assert_eq!(ids(&snap), ["a1"]);
        assert!(!snap.creating);
        assert_eq!(fake.state().create_calls, 0);

        let polled = fake.state().list_calls["a"];
        fake.set_messages(
            "a",
            vec![
                raw("a", "a1", Role::Assistant, "in a"),
                raw("a", "a2", Role::Assistant, "still polling"),
            ],
        );
        wait_until(|| ids(&ctrl.snapshot()) == ["a1", "a2"]).await;
        assert!(fake.state().list_calls["a"] > polled);
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_stays_visible_until_retried() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();
        fake.state().fail_sends = true;

        let err = ctrl.send("hi", None).await.unwrap_err();
        assert!(matches!(err, SyncError::Api(ApiError::Status { status: 503, .. })));
        let snap = ctrl.snapshot();
        let id = ids(&snap).pop().unwrap();
        assert_eq!(snap.deliveries.get(&id), Some(&Delivery::Failed));

        // Several polls of an empty backend list must not drop it.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ids(&ctrl.snapshot()), [id.clone()]);

        fake.state().fail_sends = false;
        assert_eq!(ctrl.retry(&id).await.unwrap(), id);
        wait_until(|| ctrl.snapshot().deliveries.is_empty()).await;
        assert_eq!(ids(&ctrl.snapshot()), [id.clone()]);
        assert_eq!(fake.state().sent.len(), 1);

        assert!(matches!(
            ctrl.retry(&id).await,
            Err(SyncError::UnknownMessage(_))
        ));
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn discard_removes_failed_message() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();
        fake.state().fail_sends = true;

        ctrl.send("oops", None).await.unwrap_err();
        let id = ids(&ctrl.snapshot()).pop().unwrap();
        ctrl.discard(&id).unwrap();
        assert!(ctrl.snapshot().is_empty_conversation());
        assert!(matches!(ctrl.discard(&id), Err(SyncError::UnknownMessage(_))));
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn attachment_precedes_trimmed_text() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();

        let attachment = Attachment::new("image/png", "data:image/png;base64,AAAA");
        ctrl.send("  look  ", Some(attachment)).await.unwrap();

        let state = fake.state();
        let sent = &state.sent[0];
        assert_eq!(sent.parts.len(), 2);
        let file = sent.parts[0].as_file().unwrap();
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.bytes.as_deref(), Some("AAAA"));
        assert_eq!(sent.parts[1].as_text(), Some("look"));
        drop(state);
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn blank_input_is_rejected_before_any_request() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        ctrl.initialize().await.unwrap();

        assert!(matches!(
            ctrl.send("   ", None).await,
            Err(SyncError::InvalidInput(_))
        ));
        assert!(matches!(
            ctrl.register_agent(" \t").await,
            Err(SyncError::InvalidInput(_))
        ));
        assert!(matches!(
            ctrl.update_api_key("").await,
            Err(SyncError::InvalidInput(_))
        ));
        {
            let state = fake.state();
            assert!(state.sent.is_empty());
            assert!(state.registered.is_empty());
            assert!(state.api_keys.is_empty());
        }

        ctrl.register_agent(" http://localhost:10000 ").await.unwrap();
        ctrl.update_api_key("sk-test").await.unwrap();
        let state = fake.state();
        assert_eq!(state.registered, ["http://localhost:10000"]);
        assert_eq!(state.api_keys, ["sk-test"]);
        drop(state);
        ctrl.teardown();
    }

    #[tokio::test]
    async fn send_without_active_conversation_fails() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        assert!(matches!(
            ctrl.send("hi", None).await,
            Err(SyncError::NoActiveConversation)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_survives_transport_failures() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        let conv = ctrl.initialize().await.unwrap();

        fake.state().fail_lists = true;
        fake.set_messages(&conv, vec![raw(&conv, "m1", Role::Assistant, "back")]);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(ctrl.snapshot().is_empty_conversation());

        fake.state().fail_lists = false;
        wait_until(|| ids(&ctrl.snapshot()) == ["m1"]).await;
        ctrl.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_polls_emit_nothing() {
        let fake = FakeBackend::new();
        let ctrl = controller(&fake);
        let conv = ctrl.initialize().await.unwrap();
        fake.set_messages(&conv, vec![raw(&conv, "m1", Role::Assistant, "steady")]);
        wait_until(|| ids(&ctrl.snapshot()) == ["m1"]).await;

        let mut events = ctrl.subscribe();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(events.try_recv().is_err());
        ctrl.teardown();
    }
}
