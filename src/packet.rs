use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical envelope exchanged between adapters and the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPacket {
    pub id: String,
    pub source: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DataPacket {
    pub fn new(id: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            timestamp: Utc::now(),
            payload,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether a value has the shape of a packet: `id`, `source`, `timestamp` and `payload`
    pub fn is_packet(value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                ["id", "source", "timestamp", "payload"]
                    .iter()
                    .all(|key| map.contains_key(*key))
            }
            _ => false,
        }
    }

    /// Decode a value that has the shape of a packet
    pub fn decode(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Interpret a value as a packet if it is well-formed
    pub fn from_value(value: &Value) -> Option<Self> {
        if !Self::is_packet(value) {
            return None;
        }
        Self::decode(value).ok()
    }

    /// Use `value` as a packet when it has the shape of one, otherwise wrap it
    /// as the payload
    ///
    /// A value shaped like a packet that does not decode is an error, never
    /// wrapped a second time.
    pub fn wrap(value: &Value, id: &str, source: &str) -> Result<Self, serde_json::Error> {
        if Self::is_packet(value) {
            Self::decode(value)
        } else {
            Ok(Self::new(id, source, value.clone()))
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// RFC3339 string or integer milliseconds since the Unix epoch
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| D::Error::custom(format!("invalid timestamp '{}': {}", s, e))),
            Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", n))),
            other => Err(D::Error::custom(format!(
                "timestamp must be an RFC3339 string or epoch milliseconds, got {}",
                other
            ))),
        }
    }
}
