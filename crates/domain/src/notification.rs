//! Notifications: the publishable projection of stored events.

use crate::event::{DATE_FORMAT, StoredEvent, parse_datetime};
use crate::message_bus::MessageHeaders;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Error raised while reading typed fields out of a notification body.
#[derive(Debug, thiserror::Error)]
pub enum NotificationReadError {
    #[error("Notification body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Key {key} not found in notification body")]
    MissingKey { key: String },

    #[error("Key {key} is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Key {key} holds an invalid {expected}: {value}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        value: String,
    },
}

/// Wire-facing projection of a [`StoredEvent`].
///
/// Constructed on demand; never persisted separately. Identity is the
/// `notification_id`, which equals the stored event's `event_id`.
#[derive(Debug, Clone)]
pub struct Notification {
    pub notification_id: i64,
    pub serialized_event: String,
    pub occurred_on: DateTime<Utc>,
    pub type_name: String,
    pub event_version: i32,
}

impl Notification {
    /// Builds the notification for a stored event (identity field mapping).
    ///
    /// The event version is recovered from the serialized body's
    /// `event_version` envelope key.
    pub fn from_stored_event(stored: &StoredEvent) -> Result<Self, NotificationReadError> {
        let reader = NotificationReader::new(&stored.event_body)?;

        Ok(Self {
            notification_id: stored.event_id,
            serialized_event: stored.event_body.clone(),
            occurred_on: stored.occurred_on,
            type_name: stored.type_name.clone(),
            event_version: reader.version()?,
        })
    }

    /// Broker headers for this notification.
    pub fn headers(&self) -> MessageHeaders {
        MessageHeaders {
            message_id: self.notification_id.to_string(),
            timestamp: self.occurred_on.timestamp(),
            type_name: self.type_name.clone(),
        }
    }
}

impl PartialEq for Notification {
    fn eq(&self, other: &Self) -> bool {
        self.notification_id == other.notification_id
    }
}

impl Eq for Notification {}

impl Hash for Notification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.notification_id.hash(state);
    }
}

/// Typed accessor over a serialized notification body.
///
/// Keys may use dotted paths (`parent.child`) to traverse nested objects;
/// a missing segment surfaces as an explicit
/// [`NotificationReadError::MissingKey`].
pub struct NotificationReader {
    root: Value,
}

impl NotificationReader {
    pub fn new(json: &str) -> Result<Self, NotificationReadError> {
        Ok(Self {
            root: serde_json::from_str(json)?,
        })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Schema version from the `event_version` envelope key.
    pub fn version(&self) -> Result<i32, NotificationReadError> {
        let raw = self.int("event_version")?;
        i32::try_from(raw).map_err(|_| NotificationReadError::InvalidValue {
            key: "event_version".to_string(),
            expected: "32-bit integer",
            value: raw.to_string(),
        })
    }

    /// Event timestamp from the `occured_on` envelope key (wire spelling).
    pub fn occurred_on(&self) -> Result<DateTime<Utc>, NotificationReadError> {
        self.datetime("occured_on")
    }

    pub fn type_name(&self) -> Result<String, NotificationReadError> {
        self.string("type_name")
    }

    pub fn notification_id(&self) -> Result<i64, NotificationReadError> {
        self.int("notification_id")
    }

    fn value(&self, key: &str) -> Result<&Value, NotificationReadError> {
        let mut current = &self.root;
        for segment in key.split('.') {
            current = current
                .get(segment)
                .ok_or_else(|| NotificationReadError::MissingKey {
                    key: key.to_string(),
                })?;
        }
        Ok(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_ok()
    }

    /// String rendering of the value; booleans become `"true"`/`"false"`
    /// and numbers their decimal form.
    pub fn string(&self, key: &str) -> Result<String, NotificationReadError> {
        match self.value(key)? {
            Value::String(s) => Ok(s.clone()),
            Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(NotificationReadError::TypeMismatch {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    pub fn int(&self, key: &str) -> Result<i64, NotificationReadError> {
        match self.value(key)? {
            Value::Number(n) => n.as_i64().ok_or_else(|| NotificationReadError::TypeMismatch {
                key: key.to_string(),
                expected: "integer",
            }),
            Value::String(s) => {
                s.parse()
                    .map_err(|_| NotificationReadError::InvalidValue {
                        key: key.to_string(),
                        expected: "integer",
                        value: s.clone(),
                    })
            }
            _ => Err(NotificationReadError::TypeMismatch {
                key: key.to_string(),
                expected: "integer",
            }),
        }
    }

    pub fn bool(&self, key: &str) -> Result<bool, NotificationReadError> {
        match self.value(key)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(NotificationReadError::TypeMismatch {
                key: key.to_string(),
                expected: "boolean",
            }),
        }
    }

    pub fn datetime(&self, key: &str) -> Result<DateTime<Utc>, NotificationReadError> {
        let raw = self.raw_string(key, "datetime")?;
        parse_datetime(&raw).map_err(|_| NotificationReadError::InvalidValue {
            key: key.to_string(),
            expected: "datetime",
            value: raw,
        })
    }

    pub fn date(&self, key: &str) -> Result<NaiveDate, NotificationReadError> {
        let raw = self.raw_string(key, "date")?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|_| {
            NotificationReadError::InvalidValue {
                key: key.to_string(),
                expected: "date",
                value: raw,
            }
        })
    }

    pub fn decimal(&self, key: &str) -> Result<Decimal, NotificationReadError> {
        let raw = match self.value(key)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                return Err(NotificationReadError::TypeMismatch {
                    key: key.to_string(),
                    expected: "decimal",
                });
            }
        };
        Decimal::from_str(&raw).map_err(|_| NotificationReadError::InvalidValue {
            key: key.to_string(),
            expected: "decimal",
            value: raw,
        })
    }

    fn raw_string(&self, key: &str, expected: &'static str) -> Result<String, NotificationReadError> {
        match self.value(key)? {
            Value::String(s) => Ok(s.clone()),
            _ => Err(NotificationReadError::TypeMismatch {
                key: key.to_string(),
                expected,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn reader() -> NotificationReader {
        NotificationReader::from_value(json!({
            "event_version": 2,
            "occured_on": "2024-03-10 08:30:00",
            "order": {
                "number": "A-42",
                "total": "19.95",
                "shipped": false,
                "customer": { "id": 7 }
            },
            "placed_on": "2024-03-09"
        }))
    }

    #[test]
    fn dotted_paths_traverse_nested_objects() {
        let reader = reader();
        assert_eq!(reader.string("order.number").unwrap(), "A-42");
        assert_eq!(reader.int("order.customer.id").unwrap(), 7);
    }

    #[test]
    fn missing_key_is_an_explicit_error() {
        let err = reader().string("order.missing").unwrap_err();
        assert!(matches!(
            err,
            NotificationReadError::MissingKey { key } if key == "order.missing"
        ));
    }

    #[test]
    fn string_renders_booleans_and_numbers() {
        let reader = reader();
        assert_eq!(reader.string("order.shipped").unwrap(), "false");
        assert_eq!(reader.string("event_version").unwrap(), "2");
    }

    #[test]
    fn typed_getters_recover_envelope_and_payload_fields() {
        let reader = reader();
        assert_eq!(reader.version().unwrap(), 2);
        assert_eq!(
            reader.occurred_on().unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 10, 8, 30, 0).unwrap()
        );
        assert_eq!(
            reader.date("placed_on").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        assert_eq!(
            reader.decimal("order.total").unwrap(),
            Decimal::from_str("19.95").unwrap()
        );
        assert!(reader.contains("order.customer"));
        assert!(!reader.contains("order.customer.name"));
    }

    #[test]
    fn version_outside_i32_range_is_an_invalid_value() {
        let reader = NotificationReader::from_value(json!({
            "event_version": i64::from(i32::MAX) + 1,
        }));

        let err = reader.version().unwrap_err();
        assert!(matches!(
            err,
            NotificationReadError::InvalidValue { ref key, .. } if key == "event_version"
        ));
    }

    #[test]
    fn notification_identity_is_the_notification_id() {
        let occurred_on = Utc.with_ymd_and_hms(2024, 3, 10, 8, 30, 0).unwrap();
        let body = json!({"event_version": 1, "occured_on": "2024-03-10 08:30:00"}).to_string();
        let stored = StoredEvent::new(9, "order.placed", occurred_on, body);

        let a = Notification::from_stored_event(&stored).unwrap();
        let mut b = a.clone();
        b.type_name = "something.else".to_string();

        assert_eq!(a, b);
        assert_eq!(a.notification_id, 9);
        assert_eq!(a.event_version, 1);
    }

    #[test]
    fn headers_carry_id_timestamp_and_type() {
        let occurred_on = Utc.with_ymd_and_hms(2024, 3, 10, 8, 30, 0).unwrap();
        let body = json!({"event_version": 1}).to_string();
        let stored = StoredEvent::new(3, "order.placed", occurred_on, body);
        let headers = Notification::from_stored_event(&stored).unwrap().headers();

        assert_eq!(headers.message_id, "3");
        assert_eq!(headers.timestamp, occurred_on.timestamp());
        assert_eq!(headers.type_name, "order.placed");
    }
}
