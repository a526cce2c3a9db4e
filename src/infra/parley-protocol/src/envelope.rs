use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Backend endpoint paths. Every endpoint except the file fetch is a `POST`.
pub mod endpoints {
    pub const CONVERSATION_CREATE: &str = "/conversation/create";
    pub const CONVERSATION_LIST: &str = "/conversation/list";
    pub const MESSAGE_SEND: &str = "/message/send";
    pub const MESSAGE_LIST: &str = "/message/list";
    pub const MESSAGE_PENDING: &str = "/message/pending";
    pub const EVENTS_GET: &str = "/events/get";
    pub const TASK_LIST: &str = "/task/list";
    pub const AGENT_LIST: &str = "/agent/list";
    pub const AGENT_REGISTER: &str = "/agent/register";
    pub const API_KEY_UPDATE: &str = "/api_key/update";
    /// Prefix for stored files; fetched with `GET`.
    pub const MESSAGE_FILE_PREFIX: &str = "/message/file/";

    pub fn message_file(file_id: &str) -> String {
        format!("{MESSAGE_FILE_PREFIX}{file_id}")
    }
}

/// Response body shared by every JSON endpoint: `{ "result": T }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Absent or `null` when the backend had nothing to return.
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn new(result: T) -> Self {
        Self {
            result: Some(result),
        }
    }

    /// Unwrap the payload, treating a missing `result` as an error.
    pub fn into_result(self) -> Result<T, ProtocolError> {
        self.result.ok_or(ProtocolError::MissingResult)
    }
}

impl<T> ApiResponse<Vec<T>> {
    /// List endpoints answer `null` or omit `result` when empty.
    pub fn into_list(self) -> Vec<T> {
        self.result.unwrap_or_default()
    }
}

/// Request body for endpoints taking a single `params` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params<T> {
    pub params: T,
}

impl<T> Params<T> {
    pub fn new(params: T) -> Self {
        Self { params }
    }
}

/// Request body for `/api_key/update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyUpdate {
    pub api_key: String,
}

/// Decode a `{ "result": T }` body.
pub fn decode_response<T: DeserializeOwned>(text: &str) -> Result<ApiResponse<T>, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a request body.
pub fn encode_body<T: Serialize>(body: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(body)?)
}
