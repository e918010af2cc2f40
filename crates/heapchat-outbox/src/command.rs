//! Outbound commands and the envelope handed to the transport.

use crate::{OutboxError, OutboxResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use tokio::time::Instant;

/// Default retry ceiling per command.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Key reserved for the command kind inside an envelope.
pub const ENVELOPE_TYPE_KEY: &str = "type";

/// Kind-specific command payload.
pub type Payload = Map<String, Value>;

/// Tag identifying what the embedded surface should do with a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Init,
    Login,
    Logout,
    CustomerData,
    Theme,
    ThemeMode,
    SetDeviceToken,
    /// A kind this crate does not know about, sent verbatim.
    Custom(String),
}

impl CommandKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "INIT",
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::CustomerData => "CUSTOMER_DATA",
            Self::Theme => "THEME",
            Self::ThemeMode => "THEME_MODE",
            Self::SetDeviceToken => "SET_DEVICE_TOKEN",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for CommandKind {
    fn from(value: &str) -> Self {
        match value {
            "INIT" => Self::Init,
            "LOGIN" => Self::Login,
            "LOGOUT" => Self::Logout,
            "CUSTOMER_DATA" => Self::CustomerData,
            "THEME" => Self::Theme,
            "THEME_MODE" => Self::ThemeMode,
            "SET_DEVICE_TOKEN" => Self::SetDeviceToken,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CommandKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CommandKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// One queued outbound instruction.
#[derive(Debug, Clone)]
pub struct Command {
    /// Process-unique id, assigned at enqueue time.
    pub id: u64,
    pub kind: CommandKind,
    pub payload: Payload,
    /// Delivery attempts made so far.
    pub attempt: u32,
    pub max_attempts: u32,
    /// When the first failed attempt happened; drives the head-retry stall cap.
    pub(crate) first_failure: Option<Instant>,
}

impl Command {
    pub fn new(id: u64, kind: CommandKind, payload: Payload, max_attempts: u32) -> Self {
        Self {
            id,
            kind,
            payload,
            attempt: 0,
            max_attempts,
            first_failure: None,
        }
    }

    /// True once no attempts remain.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Build the flat `{type, ...payload}` message for the transport.
    pub fn envelope(&self) -> Envelope {
        Envelope::new(&self.kind, &self.payload)
    }
}

/// Flat JSON object posted to the embedded surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Merge the payload under the kind. A payload `type` key never wins.
    pub fn new(kind: &CommandKind, payload: &Payload) -> Self {
        let mut map = Map::with_capacity(payload.len() + 1);
        map.insert(
            ENVELOPE_TYPE_KEY.to_string(),
            Value::String(kind.as_str().to_string()),
        );
        for (key, value) in payload {
            if key != ENVELOPE_TYPE_KEY {
                map.insert(key.clone(), value.clone());
            }
        }
        Self(map)
    }

    /// The `type` field.
    pub fn kind(&self) -> Option<&str> {
        self.0.get(ENVELOPE_TYPE_KEY).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Serialize a typed payload into a command payload map.
///
/// The value must serialize to a JSON object.
pub fn payload_from<T: Serialize + ?Sized>(value: &T) -> OutboxResult<Payload> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(OutboxError::Payload(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
