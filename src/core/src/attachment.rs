use base64ct::{Base64, Encoding};
use parley_protocol::{strip_data_url_prefix, FilePart, Part, DEFAULT_MIME_TYPE};

use crate::error::SyncError;

/// A file picked by the user to go along with an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 payload without any `data:` prefix.
    pub bytes: String,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, bytes: impl AsRef<str>) -> Self {
        let mime_type = mime_type.into();
        Self {
            mime_type: if mime_type.trim().is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                mime_type
            },
            bytes: strip_data_url_prefix(bytes.as_ref()).to_string(),
        }
    }

    /// Encode raw file contents.
    pub fn from_raw(mime_type: impl Into<String>, raw: &[u8]) -> Self {
        Self::new(mime_type, Base64::encode_string(raw))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(data_url: &str) -> Result<Self, SyncError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or(SyncError::InvalidInput("attachment is not a data url"))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or(SyncError::InvalidInput("attachment data url has no payload"))?;
        let mime_type = meta
            .strip_suffix(";base64")
            .ok_or(SyncError::InvalidInput("attachment data url is not base64"))?;
        Base64::decode_vec(payload)
            .map_err(|_| SyncError::InvalidInput("attachment payload is not valid base64"))?;
        Ok(Self::new(mime_type, payload))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn into_part(self) -> Part {
        Part::file(FilePart::with_bytes(self.mime_type, self.bytes))
    }
}

/// Parts for an outgoing message: the attachment first, then the text.
pub(crate) fn outgoing_parts(text: &str, attachment: Option<Attachment>) -> Vec<Part> {
    let mut parts = Vec::with_capacity(2);
    if let Some(attachment) = attachment {
        parts.push(attachment.into_part());
    }
    if !text.is_empty() {
        parts.push(Part::text(text));
    }
    parts
}
