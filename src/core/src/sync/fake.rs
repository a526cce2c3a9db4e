//! In-process [`Backend`] for controller tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use parley_protocol::{
    Agent, Event, Message, MessageInfo, Part, RawConversation, RawMessage, Role, Task,
};
use serde_json::json;
use tokio::sync::Notify;

use crate::backend::{Backend, BackendFuture};
use crate::config::ClientConfig;
use crate::error::ApiError;

#[derive(Default)]
pub(crate) struct FakeState {
    pub conversations: Vec<String>,
    pub messages: HashMap<String, Vec<RawMessage>>,
    pub pending: Vec<RawMessage>,
    pub events: Vec<Event>,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub sent: Vec<Message>,
    pub registered: Vec<String>,
    pub api_keys: Vec<String>,
    pub fail_sends: bool,
    pub fail_lists: bool,
    pub fail_creates: bool,
    pub create_calls: usize,
    pub list_calls: HashMap<String, usize>,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
    send_gate: Mutex<Option<Arc<Notify>>>,
    create_gate: Mutex<Option<Arc<Notify>>>,
    list_gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_conversation(&self, id: &str, messages: Vec<RawMessage>) {
        let mut state = self.state();
        state.conversations.push(id.to_string());
        state.messages.insert(id.to_string(), messages);
    }

    pub fn set_messages(&self, id: &str, messages: Vec<RawMessage>) {
        self.state().messages.insert(id.to_string(), messages);
    }

    /// Hold every send until the returned gate is notified.
    pub fn gate_sends(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.send_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn gate_creates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold message lists for one conversation until notified.
    pub fn gate_list(&self, conversation_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.list_gates
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), gate.clone());
        gate
    }

    fn failure(endpoint: &str) -> ApiError {
        ApiError::Status {
            endpoint: endpoint.to_string(),
            status: 503,
        }
    }
}

pub(crate) fn raw(conversation_id: &str, id: &str, role: Role, text: &str) -> RawMessage {
    RawMessage {
        message_id: id.to_string(),
        context_id: Some(conversation_id.to_string()),
        role,
        recipient: None,
        parts: json!([{ "kind": "text", "text": text }]),
    }
}

fn to_raw(message: &Message) -> RawMessage {
    RawMessage {
        message_id: message.id.clone(),
        context_id: Some(message.conversation_id.clone()),
        role: message.role,
        recipient: message.recipient.clone(),
        parts: serde_json::to_value(&message.parts).unwrap(),
    }
}

pub(crate) fn text_of(message: &Message) -> Vec<&str> {
    message.parts.iter().filter_map(Part::as_text).collect()
}

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig {
        message_poll_interval: Duration::from_millis(100),
        pending_poll_interval: Duration::from_millis(200),
        events_poll_interval: Duration::from_millis(300),
        ..ClientConfig::default()
    }
}

impl Backend for FakeBackend {
    fn create_conversation(&self) -> BackendFuture<'_, String> {
        Box::pin(async move {
            let gate = self.create_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let mut state = self.state();
            if state.fail_creates {
                return Err(Self::failure("/conversation/create"));
            }
            state.create_calls += 1;
            let id = format!("conv-{}", state.create_calls);
            state.conversations.push(id.clone());
            state.messages.insert(id.clone(), Vec::new());
            Ok(id)
        })
    }

    fn list_conversations(&self) -> BackendFuture<'_, Vec<RawConversation>> {
        Box::pin(async move {
            let state = self.state();
            if state.fail_lists {
                return Err(Self::failure("/conversation/list"));
            }
            Ok(state
                .conversations
                .iter()
                .map(|id| RawConversation {
                    conversation_id: id.clone(),
                    messages: state.messages.get(id).cloned(),
                })
                .collect())
        })
    }

    fn send_message(&self, message: Message) -> BackendFuture<'_, MessageInfo> {
        Box::pin(async move {
            let gate = self.send_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let mut state = self.state();
            if state.fail_sends {
                return Err(Self::failure("/message/send"));
            }
            state
                .messages
                .entry(message.conversation_id.clone())
                .or_default()
                .push(to_raw(&message));
            let info = MessageInfo {
                message_id: message.id.clone(),
                context_id: message.conversation_id.clone(),
            };
            state.sent.push(message);
            Ok(info)
        })
    }

    fn list_messages(&self, conversation_id: String) -> BackendFuture<'_, Vec<RawMessage>> {
        Box::pin(async move {
            let gate = self.list_gates.lock().unwrap().get(&conversation_id).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let mut state = self.state();
            *state.list_calls.entry(conversation_id.clone()).or_default() += 1;
            if state.fail_lists {
                return Err(Self::failure("/message/list"));
            }
            Ok(state
                .messages
                .get(&conversation_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn pending_messages(&self) -> BackendFuture<'_, Vec<RawMessage>> {
        Box::pin(async move { Ok(self.state().pending.clone()) })
    }

    fn events(&self) -> BackendFuture<'_, Vec<Event>> {
        Box::pin(async move { Ok(self.state().events.clone()) })
    }

    fn list_tasks(&self) -> BackendFuture<'_, Vec<Task>> {
        Box::pin(async move { Ok(self.state().tasks.clone()) })
    }

    fn list_agents(&self) -> BackendFuture<'_, Vec<Agent>> {
        Box::pin(async move { Ok(self.state().agents.clone()) })
    }

    fn register_agent(&self, url: String) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.state().registered.push(url);
            Ok(())
        })
    }

    fn update_api_key(&self, api_key: String) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.state().api_keys.push(api_key);
            Ok(())
        })
    }
}
