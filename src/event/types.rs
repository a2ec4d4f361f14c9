use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Maximum number of characters kept in a stored title
pub const TITLE_MAX_CHARS: usize = 64;

/// Maximum number of characters kept in a stored message
pub const MESSAGE_MAX_CHARS: usize = 512;

/// Severity of an event.
///
/// Stored as a small integer. Anything that is not recognised maps to
/// `Error` so that broken producers stay visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i16)]
pub enum EventLevel {
    Info = 0,
    Warning = 1,
    #[default]
    Error = 2,
}

impl EventLevel {
    /// Map a textual level. Only the exact strings `INFO` and `WARN` are recognised.
    pub fn from_code(code: &str) -> Self {
        match code {
            "INFO" => EventLevel::Info,
            "WARN" => EventLevel::Warning,
            _ => EventLevel::Error,
        }
    }

    /// Map a stored integer level; unknown values map to `Error`.
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => EventLevel::Info,
            1 => EventLevel::Warning,
            _ => EventLevel::Error,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Info => "INFO",
            EventLevel::Warning => "WARN",
            EventLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.as_i16())
    }
}

impl<'de> Deserialize<'de> for EventLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(EventLevelVisitor)
    }
}

struct EventLevelVisitor;

impl<'de> Visitor<'de> for EventLevelVisitor {
    type Value = EventLevel;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an event level name or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<EventLevel, E> {
        Ok(EventLevel::from_code(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<EventLevel, E> {
        Ok(EventLevel::from_i64(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<EventLevel, E> {
        Ok(i64::try_from(v).map_or(EventLevel::Error, EventLevel::from_i64))
    }

    /// `1.0` is read as `1`; fractional values are unrecognized
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<EventLevel, E> {
        if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
            Ok(EventLevel::from_i64(v as i64))
        } else {
            Ok(EventLevel::Error)
        }
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<EventLevel, E> {
        Ok(EventLevel::Error)
    }

    fn visit_unit<E: de::Error>(self) -> Result<EventLevel, E> {
        Ok(EventLevel::Error)
    }

    fn visit_none<E: de::Error>(self) -> Result<EventLevel, E> {
        Ok(EventLevel::Error)
    }
}

/// Event as sent by producers in the `entity` of an `event/create` message.
///
/// Either `code` names a catalog template, or `title`/`message`/`level`
/// carry a ready-made event. A non-empty `code` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IncomingEvent {
    #[serde(default, alias = "username", deserialize_with = "null_as_default")]
    pub username: String,

    #[serde(default, alias = "level")]
    pub level: EventLevel,

    /// Defaults to the time of receipt when the producer omits it
    #[serde(default = "Utc::now", alias = "eventDate", alias = "event_date")]
    pub event_date: DateTime<Utc>,

    #[serde(default, alias = "code", deserialize_with = "null_as_default")]
    pub code: String,

    #[serde(default, alias = "title", deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, alias = "message", deserialize_with = "null_as_default")]
    pub message: String,

    #[serde(default, alias = "parameters", deserialize_with = "null_as_default")]
    pub parameters: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Fully resolved, size-bounded event ready for storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub username: String,
    pub event_date: DateTime<Utc>,
    pub level: EventLevel,
    /// At most [`TITLE_MAX_CHARS`] characters
    pub title: String,
    /// At most [`MESSAGE_MAX_CHARS`] characters
    pub message: String,
    /// JSON encoding of the event parameters
    pub parameters: Vec<u8>,
}

impl NormalizedEvent {
    /// Decode the stored parameters back into a mapping.
    pub fn decode_parameters(&self) -> Result<Map<String, Value>, serde_json::Error> {
        serde_json::from_slice(&self.parameters)
    }
}
