//! Domain event model and wire serialization.
//!
//! A [`DomainEvent`] is an immutable fact produced by business logic. Events
//! are captured during a unit of work, appended to the durable event log as
//! [`StoredEvent`] envelopes and later projected into notifications for
//! external publication.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Wire format for timestamps inside serialized event bodies.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wire format for date-only values inside serialized event bodies.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Error raised while turning an event payload into its wire representation.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event {type_name} produced a non-object payload")]
    UnsupportedPayload { type_name: String },
}

/// A fact produced by domain logic.
///
/// Implementations are plain serde-serializable structs; `payload` is
/// expected to return a JSON object with the event-specific fields, most
/// simply via `serde_json::to_value(self)`. Timestamp fields should use the
/// [`datetime_format`]/[`date_format`] serde helpers so the body matches the
/// published wire format.
pub trait DomainEvent: fmt::Debug + Send + Sync {
    /// Stable type identifier, used as the notification routing key.
    fn type_name(&self) -> &str;

    /// Schema version of the event shape.
    fn event_version(&self) -> i32 {
        1
    }

    /// When the event occurred. Set once at creation.
    fn occurred_on(&self) -> DateTime<Utc>;

    /// Event-specific fields as a JSON object.
    fn payload(&self) -> Result<Value, SerializationError>;
}

/// Serializes an event body for storage and publication.
///
/// The body is the event payload plus the `event_version` and `occured_on`
/// envelope keys (the second spelled as in the established wire format),
/// with the timestamp rendered as [`DATETIME_FORMAT`].
pub fn serialize_event(event: &dyn DomainEvent) -> Result<String, SerializationError> {
    let mut body = match event.payload()? {
        Value::Object(map) => map,
        _ => {
            return Err(SerializationError::UnsupportedPayload {
                type_name: event.type_name().to_string(),
            });
        }
    };

    body.insert("event_version".into(), Value::from(event.event_version()));
    body.insert(
        "occured_on".into(),
        Value::from(format_datetime(&event.occurred_on())),
    );

    Ok(Value::Object(body).to_string())
}

/// Renders a timestamp in the body wire format.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Parses a timestamp in the body wire format.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).map(|naive| naive.and_utc())
}

/// Serde helper for `DateTime<Utc>` fields rendered as `YYYY-MM-DD HH:MM:SS`.
pub mod datetime_format {
    use super::{DATETIME_FORMAT, parse_datetime};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_datetime(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for `NaiveDate` fields rendered as `YYYY-MM-DD`.
pub mod date_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Persisted envelope of a domain event.
///
/// Created only by the event log's append operation. The `event_id` is the
/// log's strictly increasing ordering key; the row is never mutated or
/// deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredEvent {
    pub event_id: i64,
    pub type_name: String,
    pub occurred_on: DateTime<Utc>,
    pub event_body: String,
}

impl StoredEvent {
    pub fn new(
        event_id: i64,
        type_name: impl Into<String>,
        occurred_on: DateTime<Utc>,
        event_body: impl Into<String>,
    ) -> Self {
        Self {
            event_id,
            type_name: type_name.into(),
            occurred_on,
            event_body: event_body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationReader;
    use chrono::TimeZone;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct InventoryAdjusted {
        name: String,
        count: i64,
        #[serde(with = "datetime_format")]
        ts: DateTime<Utc>,
        flag: bool,
    }

    impl DomainEvent for InventoryAdjusted {
        fn type_name(&self) -> &str {
            "inventory.adjusted"
        }

        fn occurred_on(&self) -> DateTime<Utc> {
            self.ts
        }

        fn payload(&self) -> Result<Value, SerializationError> {
            Ok(serde_json::to_value(self)?)
        }
    }

    fn sample_event() -> InventoryAdjusted {
        InventoryAdjusted {
            name: "value1".to_string(),
            count: 1,
            ts: Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap(),
            flag: true,
        }
    }

    #[test]
    fn serialized_body_carries_envelope_keys() {
        let body = serialize_event(&sample_event()).unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(value["event_version"], 1);
        assert_eq!(value["occured_on"], "2010-01-01 00:00:00");
    }

    #[test]
    fn reader_recovers_typed_fields_from_serialized_body() {
        let body = serialize_event(&sample_event()).unwrap();
        let reader = NotificationReader::new(&body).unwrap();

        assert_eq!(reader.string("name").unwrap(), "value1");
        assert_eq!(reader.int("count").unwrap(), 1);
        assert_eq!(
            reader.datetime("ts").unwrap(),
            Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(reader.bool("flag").unwrap());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        #[derive(Debug)]
        struct Scalar;

        impl DomainEvent for Scalar {
            fn type_name(&self) -> &str {
                "scalar"
            }

            fn occurred_on(&self) -> DateTime<Utc> {
                Utc::now()
            }

            fn payload(&self) -> Result<Value, SerializationError> {
                Ok(Value::from(42))
            }
        }

        let err = serialize_event(&Scalar).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::UnsupportedPayload { .. }
        ));
    }

    #[test]
    fn datetime_round_trips_through_wire_format() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 30, 13, 45, 12).unwrap();
        assert_eq!(parse_datetime(&format_datetime(&ts)).unwrap(), ts);
    }
}
