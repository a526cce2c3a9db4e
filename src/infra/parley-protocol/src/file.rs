use serde::{Deserialize, Serialize};

use crate::ProtocolError;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// File payload carried by a [`Part::File`](crate::Part).
///
/// Well-formed input populates exactly one of `uri` and `bytes`, but both
/// present and both absent are representable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePart {
    #[serde(alias = "mimeType")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Base64 payload without any `data:` prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
}

impl FilePart {
    pub fn with_bytes(mime_type: impl Into<String>, bytes: impl AsRef<str>) -> Self {
        Self {
            mime_type: mime_type.into(),
            uri: None,
            bytes: Some(strip_data_url_prefix(bytes.as_ref()).to_string()),
        }
    }

    pub fn with_uri(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            uri: Some(uri.into()),
            bytes: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Where a renderer should load the file from: the uri when present,
    /// otherwise an inline `data:` URL built from the bytes.
    pub fn source(&self) -> Option<String> {
        if let Some(uri) = self.uri.as_deref().filter(|u| !u.is_empty()) {
            return Some(uri.to_string());
        }
        self.data_url()
    }

    pub fn data_url(&self) -> Option<String> {
        self.bytes
            .as_deref()
            .filter(|b| !b.is_empty())
            .map(|bytes| format!("data:{};base64,{bytes}", self.mime_type))
    }
}

/// Drop a `data:<mime>;base64,` prefix if the payload carries one.
pub fn strip_data_url_prefix(bytes: &str) -> &str {
    match bytes.split_once("base64,") {
        Some((_, data)) => data,
        None => bytes,
    }
}

/// How a file uri should be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLocation {
    /// Same-origin path such as `/message/file/<id>`; resolved against the API base.
    Relative(String),
    /// `http://` or `https://`; used as-is.
    Absolute(String),
    /// Any other scheme; passed through without fetching.
    Opaque(String),
}

impl FileLocation {
    pub fn classify(uri: &str) -> Result<Self, ProtocolError> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::EmptyUri);
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Absolute(trimmed.to_string()));
        }
        if trimmed.starts_with('/') && !trimmed.starts_with("//") {
            return Ok(Self::Relative(trimmed.to_string()));
        }
        Ok(Self::Opaque(trimmed.to_string()))
    }
}
