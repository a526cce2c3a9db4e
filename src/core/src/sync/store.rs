use std::collections::{HashMap, HashSet};

use parley_protocol::{Conversation, Event, Message};
use tokio::sync::broadcast;

/// Delivery state of a locally authored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Send call still in flight.
    Pending,
    /// Backend acknowledged the send; the next reconciliation supersedes it.
    Sent,
    /// Send call failed; kept visible until retried or discarded.
    Failed,
}

impl Delivery {
    /// Local copies in these states survive reconciliation.
    fn is_retained(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

/// Change notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    MessagesChanged { conversation_id: String },
    ActiveChanged { conversation_id: Option<String> },
    CatalogChanged,
    DeliveryChanged { message_id: String, delivery: Delivery },
    FlagsChanged,
    PendingChanged,
    EventsChanged,
}

/// Point-in-time copy of the store for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
    pub active_conversation_id: Option<String>,
    /// `None` until the active conversation has loaded at least once.
    pub messages: Option<Vec<Message>>,
    /// Known conversation ids in catalog order.
    pub conversations: Vec<String>,
    pub deliveries: HashMap<String, Delivery>,
    pub sending: bool,
    pub creating: bool,
}

impl SyncSnapshot {
    /// True when the empty-state placeholder should render: loaded and empty.
    pub fn is_empty_conversation(&self) -> bool {
        self.messages.as_ref().is_some_and(Vec::is_empty)
    }
}

/// In-memory conversation state.
///
/// `messages` is the view of the active conversation and is kept identical
/// to that conversation's catalog entry. Every mutation that changes
/// observable state emits a [`SyncEvent`]; mutations that change nothing
/// emit nothing.
pub struct ConversationStore {
    active: Option<String>,
    messages: Option<Vec<Message>>,
    known: HashMap<String, Conversation>,
    order: Vec<String>,
    outbox: HashMap<String, Delivery>,
    sends_in_flight: usize,
    creating: bool,
    pending: Vec<Message>,
    events: Vec<Event>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl ConversationStore {
    pub fn new(event_buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        Self {
            active: None,
            messages: None,
            known: HashMap::new(),
            order: Vec::new(),
            outbox: HashMap::new(),
            sends_in_flight: 0,
            creating: false,
            pending: Vec::new(),
            events: Vec::new(),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            active_conversation_id: self.active.clone(),
            messages: self.messages.clone(),
            conversations: self.order.clone(),
            deliveries: self.outbox.clone(),
            sending: self.sends_in_flight > 0,
            creating: self.creating,
        }
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn messages(&self) -> Option<&[Message]> {
        self.messages.as_deref()
    }

    pub fn knows(&self, conversation_id: &str) -> bool {
        self.known.contains_key(conversation_id)
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.known.get(conversation_id)
    }

    /// Most recently listed conversation.
    pub fn most_recent(&self) -> Option<&str> {
        self.order.last().map(String::as_str)
    }

    pub fn delivery(&self, message_id: &str) -> Option<Delivery> {
        self.outbox.get(message_id).copied()
    }

    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Register a fresh, empty conversation and make it active.
    pub fn create_local(&mut self, conversation_id: &str) {
        let inserted = self.register(Conversation::new(conversation_id));
        if inserted {
            self.emit(SyncEvent::CatalogChanged);
        }
        self.activate(conversation_id);
    }

    /// Switch to a known conversation, showing its cached messages.
    pub fn select(&mut self, conversation_id: &str) -> bool {
        if !self.known.contains_key(conversation_id) {
            return false;
        }
        self.activate(conversation_id);
        true
    }

    /// Drop the active selection and return the view to "not yet loaded".
    pub fn clear_active(&mut self) {
        let had_view = self.messages.take().is_some();
        let previous = self.active.take();
        if previous.is_some() || had_view {
            self.emit(SyncEvent::ActiveChanged {
                conversation_id: None,
            });
        }
    }

    /// Append a user message to the active conversation before the backend
    /// has seen it. Returns `false` if the message does not belong to the
    /// active conversation.
    pub fn append_optimistic(&mut self, message: Message) -> bool {
        if self.active.as_deref() != Some(message.conversation_id.as_str()) {
            return false;
        }
        let conversation_id = message.conversation_id.clone();
        let message_id = message.id.clone();

        let mut list = self.current_list(&conversation_id);
        list.push(message);
        self.store_list(&conversation_id, list);
        self.outbox.insert(message_id.clone(), Delivery::Pending);

        self.emit(SyncEvent::MessagesChanged { conversation_id });
        self.emit(SyncEvent::DeliveryChanged {
            message_id,
            delivery: Delivery::Pending,
        });
        true
    }

    /// Record the outcome of a send.
    pub fn mark_delivery(&mut self, message_id: &str, delivery: Delivery) {
        let Some(entry) = self.outbox.get_mut(message_id) else {
            return;
        };
        if *entry == delivery {
            return;
        }
        *entry = delivery;
        self.emit(SyncEvent::DeliveryChanged {
            message_id: message_id.to_string(),
            delivery,
        });
    }

    /// Replace a conversation's messages with the backend's list.
    ///
    /// Local messages whose send is in flight or failed are kept at the tail
    /// unless the backend list already carries their id. Returns whether
    /// anything observable changed; an unchanged result emits nothing.
    pub fn reconcile(&mut self, conversation_id: &str, authoritative: Vec<Message>) -> bool {
        let current = self
            .known
            .get(conversation_id)
            .map(|c| c.messages.as_slice())
            .unwrap_or_default();

        let confirmed: HashSet<String> = authoritative.iter().map(|m| m.id.clone()).collect();
        let local: HashSet<String> = current
            .iter()
            .filter(|m| self.outbox.contains_key(&m.id))
            .map(|m| m.id.clone())
            .collect();
        let retained: Vec<Message> = current
            .iter()
            .filter(|m| !confirmed.contains(&m.id))
            .filter(|m| self.outbox.get(&m.id).is_some_and(|d| d.is_retained()))
            .cloned()
            .collect();

        let mut merged = authoritative;
        merged.extend(retained);

        let list_changed = merged.as_slice() != current;
        let first_load =
            self.active.as_deref() == Some(conversation_id) && self.messages.is_none();

        // Confirmed and sent local copies are superseded by the backend's.
        let before = self.outbox.len();
        self.outbox.retain(|id, delivery| {
            !local.contains(id) || (!confirmed.contains(id) && delivery.is_retained())
        });
        let outbox_changed = self.outbox.len() != before;

        if !list_changed && !first_load {
            return outbox_changed;
        }

        if !self.known.contains_key(conversation_id) {
            self.register(Conversation::new(conversation_id));
            self.emit(SyncEvent::CatalogChanged);
        }
        self.store_list(conversation_id, merged);
        self.emit(SyncEvent::MessagesChanged {
            conversation_id: conversation_id.to_string(),
        });
        true
    }

    /// Merge a freshly listed catalog.
    ///
    /// New conversations are appended in listed order. Known, inactive
    /// conversations are reconciled against the listed messages; the active
    /// one is left to its poll loop.
    pub fn load_catalog(&mut self, conversations: Vec<Conversation>) -> bool {
        let mut changed = false;
        for conversation in conversations {
            if self.active.as_deref() == Some(conversation.id.as_str()) {
                continue;
            }
            if self.register(Conversation::new(conversation.id.clone())) {
                changed = true;
            }
            let id = conversation.id;
            if self.reconcile(&id, conversation.messages) {
                changed = true;
            }
        }
        if changed {
            self.emit(SyncEvent::CatalogChanged);
        }
        changed
    }

    /// A local message that failed to send.
    pub fn failed_message(&self, message_id: &str) -> Option<Message> {
        if self.delivery(message_id) != Some(Delivery::Failed) {
            return None;
        }
        self.known
            .values()
            .flat_map(|c| c.messages.iter())
            .find(|m| m.id == message_id)
            .cloned()
    }

    /// Remove a failed local message.
    pub fn discard(&mut self, message_id: &str) -> bool {
        let Some(message) = self.failed_message(message_id) else {
            return false;
        };
        self.outbox.remove(message_id);
        let conversation_id = message.conversation_id;
        let mut list = self.current_list(&conversation_id);
        list.retain(|m| m.id != message_id);
        self.store_list(&conversation_id, list);
        self.emit(SyncEvent::MessagesChanged { conversation_id });
        true
    }

    pub fn begin_send(&mut self) {
        self.sends_in_flight += 1;
        if self.sends_in_flight == 1 {
            self.emit(SyncEvent::FlagsChanged);
        }
    }

    pub fn end_send(&mut self) {
        if self.sends_in_flight == 0 {
            return;
        }
        self.sends_in_flight -= 1;
        if self.sends_in_flight == 0 {
            self.emit(SyncEvent::FlagsChanged);
        }
    }

    pub fn is_creating(&self) -> bool {
        self.creating
    }

    /// Claim the create slot; `false` if a create is already running.
    pub fn try_begin_creating(&mut self) -> bool {
        if self.creating {
            return false;
        }
        self.creating = true;
        self.emit(SyncEvent::FlagsChanged);
        true
    }

    pub fn end_creating(&mut self) {
        if self.creating {
            self.creating = false;
            self.emit(SyncEvent::FlagsChanged);
        }
    }

    pub fn set_pending(&mut self, pending: Vec<Message>) -> bool {
        if self.pending == pending {
            return false;
        }
        self.pending = pending;
        self.emit(SyncEvent::PendingChanged);
        true
    }

    pub fn set_events(&mut self, events: Vec<Event>) -> bool {
        if self.events == events {
            return false;
        }
        self.events = events;
        self.emit(SyncEvent::EventsChanged);
        true
    }

    fn activate(&mut self, conversation_id: &str) {
        let messages = self
            .known
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default();
        let switched = self.active.as_deref() != Some(conversation_id);
        self.active = Some(conversation_id.to_string());
        self.messages = Some(messages);
        if switched {
            self.emit(SyncEvent::ActiveChanged {
                conversation_id: self.active.clone(),
            });
        }
        self.emit(SyncEvent::MessagesChanged {
            conversation_id: conversation_id.to_string(),
        });
    }

    fn register(&mut self, conversation: Conversation) -> bool {
        if self.known.contains_key(&conversation.id) {
            return false;
        }
        self.order.push(conversation.id.clone());
        self.known.insert(conversation.id.clone(), conversation);
        true
    }

    fn current_list(&self, conversation_id: &str) -> Vec<Message> {
        self.known
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    fn store_list(&mut self, conversation_id: &str, messages: Vec<Message>) {
        if self.active.as_deref() == Some(conversation_id) {
            self.messages = Some(messages.clone());
        }
        match self.known.get_mut(conversation_id) {
            Some(conversation) => conversation.messages = messages,
            None => {
                self.order.push(conversation_id.to_string());
                self.known.insert(
                    conversation_id.to_string(),
                    Conversation {
                        id: conversation_id.to_string(),
                        messages,
                    },
                );
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }
}
