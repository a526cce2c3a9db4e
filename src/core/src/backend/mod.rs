mod http;

use std::future::Future;
use std::pin::Pin;

use parley_protocol::{Agent, Event, Message, MessageInfo, RawConversation, RawMessage, Task};

use crate::error::ApiError;

pub use http::HttpBackend;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// The remote conversational-agent service.
///
/// The backend is authoritative: whatever `list_messages` returns is what the
/// store converges to. List endpoints return raw messages; normalization is
/// the caller's job.
pub trait Backend: Send + Sync + 'static {
    fn create_conversation(&self) -> BackendFuture<'_, String>;

    fn list_conversations(&self) -> BackendFuture<'_, Vec<RawConversation>>;

    fn send_message(&self, message: Message) -> BackendFuture<'_, MessageInfo>;

    fn list_messages(&self, conversation_id: String) -> BackendFuture<'_, Vec<RawMessage>>;

    fn pending_messages(&self) -> BackendFuture<'_, Vec<RawMessage>>;

    fn events(&self) -> BackendFuture<'_, Vec<Event>>;

    fn list_tasks(&self) -> BackendFuture<'_, Vec<Task>>;

    fn list_agents(&self) -> BackendFuture<'_, Vec<Agent>>;

    fn register_agent(&self, url: String) -> BackendFuture<'_, ()>;

    fn update_api_key(&self, api_key: String) -> BackendFuture<'_, ()>;
}
