use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin every endpoint path is joined onto (default: http://localhost:12000).
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Interval between message polls for the active conversation.
    pub message_poll_interval: Duration,
    /// Interval between pending-message polls.
    pub pending_poll_interval: Duration,
    /// Interval between event polls.
    pub events_poll_interval: Duration,
    /// Capacity of the change-notification channel.
    pub event_buffer: usize,
    /// Log raw part payloads before normalization.
    pub log_raw_parts: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:12000".to_string(),
            request_timeout: Duration::from_secs(10),
            message_poll_interval: Duration::from_secs(1),
            pending_poll_interval: Duration::from_secs(2),
            events_poll_interval: Duration::from_secs(3),
            event_buffer: 256,
            log_raw_parts: false,
        }
    }
}
