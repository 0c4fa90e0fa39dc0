//! Message codec
//!
//! Maps the in-memory [`Message`] to the record stored in a conversation's
//! message log and back. Records carry a `type` discriminator and a
//! type-specific `content` string:
//!
//! | type       | content                  |
//! |------------|--------------------------|
//! | `text`     | message body             |
//! | `photo`    | download URL             |
//! | `video`    | download URL             |
//! | `location` | `"<lat>,<long>"`         |

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use url::Url;

use crate::config::DirectoryConfig;
use crate::error::DecodeError;
use crate::identity::CanonicalId;
use crate::models::{Location, Media, Message, MessageKind, Participant};

/// Discriminators this codec can decode.
pub const KNOWN_TYPES: [&str; 4] = ["text", "photo", "video", "location"];

/// Persisted shape of one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// RFC 3339, nanosecond precision
    pub date: String,
    pub sender_email: String,
    /// Sender display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_read: bool,
    /// Media only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl PersistedRecord {
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "id": self.id,
            "type": self.kind,
            "content": self.content,
            "date": self.date,
            "sender_email": self.sender_email,
            "name": self.name,
            "is_read": self.is_read,
        });
        if let Some(placeholder) = &self.placeholder {
            value["placeholder"] = json!(placeholder);
        }
        value
    }
}

pub fn encode(message: &Message) -> PersistedRecord {
    let (content, placeholder) = match &message.kind {
        MessageKind::Text(body) => (body.clone(), None),
        MessageKind::Photo(media) | MessageKind::Video(media) => {
            (media.url.to_string(), Some(media.placeholder.clone()))
        }
        MessageKind::Location(location) => (format_location(location), None),
    };

    PersistedRecord {
        id: message.id.clone(),
        kind: message.kind.type_name().to_string(),
        content,
        date: message.sent_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        sender_email: message.sender.id.to_string(),
        name: message.sender.display_name.clone(),
        is_read: false,
        placeholder,
    }
}

/// Decode one stored record.
///
/// A missing or unknown `type` yields [`DecodeError::UnrecognizedType`];
/// content that does not match its type yields [`DecodeError::MalformedContent`].
pub fn decode(value: &Value) -> Result<Message, DecodeError> {
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::MalformedRecord("expected an object".to_string()))?;

    match object.get("type").and_then(Value::as_str) {
        Some(kind) if KNOWN_TYPES.contains(&kind) => {}
        other => return Err(DecodeError::UnrecognizedType(other.map(str::to_string))),
    }

    let record: PersistedRecord = serde_json::from_value(value.clone())
        .map_err(|e| DecodeError::MalformedRecord(e.to_string()))?;
    decode_record(&record)
}

pub fn decode_record(record: &PersistedRecord) -> Result<Message, DecodeError> {
    let kind_name = KNOWN_TYPES
        .iter()
        .copied()
        .find(|known| *known == record.kind)
        .ok_or_else(|| DecodeError::UnrecognizedType(Some(record.kind.clone())))?;

    let kind = match kind_name {
        "photo" => MessageKind::Photo(parse_media(record, kind_name)?),
        "video" => MessageKind::Video(parse_media(record, kind_name)?),
        "location" => MessageKind::Location(parse_location(&record.content)?),
        _ => MessageKind::Text(record.content.clone()),
    };

    let sent_at = DateTime::parse_from_rfc3339(&record.date)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| DecodeError::MalformedContent {
            kind: kind_name,
            reason: format!("bad date {:?}: {}", record.date, e),
        })?;

    Ok(Message {
        id: record.id.clone(),
        sender: Participant::new(CanonicalId::from(record.sender_email.as_str()), record.name.clone()),
        sent_at,
        kind,
    })
}

/// Messages decoded from a log, plus the records that were skipped.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub messages: Vec<Message>,
    pub skipped: Vec<(usize, DecodeError)>,
}

/// Decode a whole log in order. A corrupt record is logged and skipped; it
/// never hides the rest of the conversation.
pub fn decode_batch(records: &[Value]) -> DecodedBatch {
    let mut batch = DecodedBatch::default();
    for (index, record) in records.iter().enumerate() {
        match decode(record) {
            Ok(message) => batch.messages.push(message),
            Err(err) => {
                warn!("[Codec] Skipping record {}: {}", index, err);
                batch.skipped.push((index, err));
            }
        }
    }
    batch
}

/// Text shown in a conversation list row for `kind`.
pub fn preview(kind: &MessageKind, config: &DirectoryConfig) -> String {
    match kind {
        MessageKind::Text(body) => body.clone(),
        MessageKind::Photo(_) => config.photo_preview.clone(),
        MessageKind::Video(_) => config.video_preview.clone(),
        MessageKind::Location(_) => config.location_preview.clone(),
    }
}

fn format_location(location: &Location) -> String {
    // Debug formatting keeps the fractional part ("41.0", not "41").
    format!("{:?},{:?}", location.latitude, location.longitude)
}

fn parse_location(content: &str) -> Result<Location, DecodeError> {
    let malformed = |reason: String| DecodeError::MalformedContent {
        kind: "location",
        reason,
    };

    let (lat, long) = content
        .split_once(',')
        .ok_or_else(|| malformed(format!("expected \"lat,long\", got {:?}", content)))?;

    let coordinate = |raw: &str| -> Result<f64, DecodeError> {
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| malformed(format!("bad coordinate {:?}", raw)))
    };

    Ok(Location {
        latitude: coordinate(lat)?,
        longitude: coordinate(long)?,
    })
}

fn parse_media(record: &PersistedRecord, kind: &'static str) -> Result<Media, DecodeError> {
    let url = Url::parse(&record.content).map_err(|e| DecodeError::MalformedContent {
        kind,
        reason: format!("bad url {:?}: {}", record.content, e),
    })?;

    let media = Media::new(url);
    Ok(match &record.placeholder {
        Some(placeholder) => media.with_placeholder(placeholder.clone()),
        None => media,
    })
}
