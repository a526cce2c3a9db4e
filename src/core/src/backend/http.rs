use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use parley_protocol::{
    decode_response, endpoints, Agent, ApiKeyUpdate, ApiResponse, Event, FileLocation, Message,
    MessageInfo, Params, RawConversation, RawMessage, Task,
};

use crate::config::ClientConfig;
use crate::error::ApiError;

use super::{Backend, BackendFuture};

/// [`Backend`] over plain HTTP. Every call is a JSON `POST` answered with
/// `{ "result": T }`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::Client)?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url.trim())?;
        // Url::join replaces the last segment unless the base ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of a stored file served by `/message/file/<id>`.
    pub fn file_url(&self, file_id: &str) -> Result<Url, ApiError> {
        self.endpoint(&endpoints::message_file(file_id))
    }

    /// Resolve a file part's uri for fetching.
    ///
    /// Same-origin paths go through the API base, absolute http(s) uris are
    /// used as-is, and anything else yields `None`.
    pub fn resolve_file_uri(&self, uri: &str) -> Option<Url> {
        match FileLocation::classify(uri).ok()? {
            FileLocation::Relative(path) => self.endpoint(&path).ok(),
            FileLocation::Absolute(url) => Url::parse(&url).ok(),
            FileLocation::Opaque(_) => None,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    async fn post_empty<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<ApiResponse<T>, ApiError> {
        let request = self.client.post(self.endpoint(endpoint)?);
        let text = self.execute(request, endpoint).await?;
        decode(endpoint, &text)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        let request = self.client.post(self.endpoint(endpoint)?).json(body);
        let text = self.execute(request, endpoint).await?;
        decode(endpoint, &text)
    }

    /// POST whose response body is ignored.
    async fn post_void<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<(), ApiError> {
        let request = self.client.post(self.endpoint(endpoint)?).json(body);
        self.execute(request, endpoint).await.map(|_| ())
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, text: &str) -> Result<ApiResponse<T>, ApiError> {
    if text.trim().is_empty() {
        return Ok(ApiResponse { result: None });
    }
    decode_response(text).map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

fn require<T>(endpoint: &str, response: ApiResponse<T>) -> Result<T, ApiError> {
    response.into_result().map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

impl Backend for HttpBackend {
    fn create_conversation(&self) -> BackendFuture<'_, String> {
        Box::pin(async move {
            let endpoint = endpoints::CONVERSATION_CREATE;
            require(endpoint, self.post_empty(endpoint).await?)
        })
    }

    fn list_conversations(&self) -> BackendFuture<'_, Vec<RawConversation>> {
        Box::pin(async move {
            Ok(self
                .post_empty::<Vec<RawConversation>>(endpoints::CONVERSATION_LIST)
                .await?
                .into_list())
        })
    }

    fn send_message(&self, message: Message) -> BackendFuture<'_, MessageInfo> {
        Box::pin(async move {
            let endpoint = endpoints::MESSAGE_SEND;
            require(
                endpoint,
                self.post_json(endpoint, &Params::new(&message)).await?,
            )
        })
    }

    fn list_messages(&self, conversation_id: String) -> BackendFuture<'_, Vec<RawMessage>> {
        Box::pin(async move {
            Ok(self
                .post_json::<_, Vec<RawMessage>>(
                    endpoints::MESSAGE_LIST,
                    &Params::new(conversation_id),
                )
                .await?
                .into_list())
        })
    }

    fn pending_messages(&self) -> BackendFuture<'_, Vec<RawMessage>> {
        Box::pin(async move {
            Ok(self
                .post_empty::<Vec<RawMessage>>(endpoints::MESSAGE_PENDING)
                .await?
                .into_list())
        })
    }

    fn events(&self) -> BackendFuture<'_, Vec<Event>> {
        Box::pin(async move {
            Ok(self
                .post_empty::<Vec<Event>>(endpoints::EVENTS_GET)
                .await?
                .into_list())
        })
    }

    fn list_tasks(&self) -> BackendFuture<'_, Vec<Task>> {
        Box::pin(async move {
            Ok(self
                .post_empty::<Vec<Task>>(endpoints::TASK_LIST)
                .await?
                .into_list())
        })
    }

    fn list_agents(&self) -> BackendFuture<'_, Vec<Agent>> {
        Box::pin(async move {
            Ok(self
                .post_empty::<Vec<Agent>>(endpoints::AGENT_LIST)
                .await?
                .into_list())
        })
    }

    fn register_agent(&self, url: String) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.post_void(endpoints::AGENT_REGISTER, &Params::new(url))
                .await
        })
    }

    fn update_api_key(&self, api_key: String) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.post_void(endpoints::API_KEY_UPDATE, &ApiKeyUpdate { api_key })
                .await
        })
    }
}
