//! Content normalization.
//!
//! The backend has shipped several incompatible shapes for message parts.
//! [`normalize`] runs an ordered table of shape matchers over a raw part and
//! returns the first canonical [`Part`] produced. Anything no matcher accepts
//! becomes a text part describing the payload, so unknown shapes stay visible
//! instead of failing the whole message list.

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::file::{strip_data_url_prefix, DEFAULT_MIME_TYPE};
use crate::{FilePart, Message, Part, RawMessage};

/// Longest payload excerpt embedded in a diagnostic part.
const DIAGNOSTIC_MAX_CHARS: usize = 512;

type Matcher = fn(&Map<String, Value>) -> Option<Part>;

/// Shape matchers in resolution order; first match wins.
const MATCHERS: &[(&str, Matcher)] = &[
    ("canonical_text", canonical_text),
    ("canonical_file", canonical_file),
    ("root_file", root_file),
    ("root_text", root_text),
    ("root_is_file", root_is_file),
    ("flat_file", flat_file),
    ("flat_text", flat_text),
];

/// Convert one raw part into its canonical form.
///
/// Returns `None` only for JSON `null`; callers drop those.
pub fn normalize(raw: &Value) -> Option<Part> {
    let obj = match raw {
        Value::Null => {
            warn!("null message part");
            return None;
        }
        Value::Object(obj) => obj,
        other => return Some(diagnostic(other)),
    };

    for (shape, matcher) in MATCHERS {
        if let Some(part) = matcher(obj) {
            trace!(shape, "normalized message part");
            return Some(part);
        }
    }
    Some(diagnostic(raw))
}

/// Normalize a part list, dropping `null` entries.
pub fn normalize_parts(raw: &[Value]) -> Vec<Part> {
    raw.iter().filter_map(normalize).collect()
}

/// Normalize a backend message.
///
/// `conversation_id` fills in a missing `context_id`; `index` gives messages
/// without an id a stable one so repeated polls compare equal.
pub fn normalize_message(raw: &RawMessage, conversation_id: &str, index: usize) -> Message {
    let conversation_id = raw
        .context_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(conversation_id)
        .to_string();
    let id = if raw.message_id.is_empty() {
        format!("{conversation_id}#{index}")
    } else {
        raw.message_id.clone()
    };
    Message {
        id,
        conversation_id,
        role: raw.role,
        recipient: raw.recipient.clone(),
        parts: match &raw.parts {
            Value::Null => Vec::new(),
            Value::Array(parts) => normalize_parts(parts),
            other => vec![diagnostic(other)],
        },
    }
}

fn canonical_text(obj: &Map<String, Value>) -> Option<Part> {
    if kind(obj) != Some("text") {
        return None;
    }
    str_field(obj, "text").map(Part::text)
}

fn canonical_file(obj: &Map<String, Value>) -> Option<Part> {
    if kind(obj) != Some("file") {
        return None;
    }
    let file = obj.get("file")?.as_object()?;
    Some(file_part(file, &[obj]))
}

fn root_file(obj: &Map<String, Value>) -> Option<Part> {
    let root = obj.get("root")?.as_object()?;
    let file = root.get("file")?.as_object()?;
    Some(file_part(file, &[root, obj]))
}

fn root_text(obj: &Map<String, Value>) -> Option<Part> {
    let root = obj.get("root")?.as_object()?;
    str_field(root, "text").map(Part::text)
}

fn root_is_file(obj: &Map<String, Value>) -> Option<Part> {
    let root = obj.get("root")?.as_object()?;
    if !looks_like_file(root) {
        return None;
    }
    Some(file_part(root, &[obj]))
}

fn flat_file(obj: &Map<String, Value>) -> Option<Part> {
    if obj.contains_key("kind") {
        return None;
    }
    let file = obj.get("file")?.as_object()?;
    Some(file_part(file, &[obj]))
}

fn flat_text(obj: &Map<String, Value>) -> Option<Part> {
    if obj.contains_key("kind") {
        return None;
    }
    str_field(obj, "text").map(Part::text)
}

fn kind(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("kind").and_then(Value::as_str)
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn non_empty<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    str_field(obj, key).filter(|s| !s.is_empty())
}

fn mime_of(obj: &Map<String, Value>) -> Option<&str> {
    non_empty(obj, "mime_type").or_else(|| non_empty(obj, "mimeType"))
}

fn looks_like_file(obj: &Map<String, Value>) -> bool {
    ["mime_type", "mimeType", "bytes", "uri"]
        .iter()
        .any(|key| obj.contains_key(*key))
}

/// Build a file part from `file`, falling back to the enclosing objects
/// (innermost first) for the mime type.
fn file_part(file: &Map<String, Value>, outer: &[&Map<String, Value>]) -> Part {
    let mime_type = mime_of(file)
        .or_else(|| outer.iter().find_map(|o| mime_of(o)))
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();
    let uri = non_empty(file, "uri").map(str::to_string);
    let bytes = non_empty(file, "bytes")
        .map(strip_data_url_prefix)
        .filter(|b| !b.is_empty())
        .map(str::to_string);
    Part::file(FilePart {
        mime_type,
        uri,
        bytes,
    })
}

fn diagnostic(raw: &Value) -> Part {
    let rendered = raw.to_string();
    let excerpt: String = rendered.chars().take(DIAGNOSTIC_MAX_CHARS).collect();
    let ellipsis = if excerpt.len() < rendered.len() { "…" } else { "" };
    debug!(payload = %excerpt, "unrecognized message part shape");
    Part::text(format!("[unsupported content: {excerpt}{ellipsis}]"))
}
