/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
use crate::utils::{FrameError, WebsocketError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Discriminators of the entity messages that are fanned out to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A deployed service was created, changed or removed.
    Service,
    /// A deployment was started, changed or removed.
    Deployment,
    /// A deployment step changed state.
    Step,
    /// Server notice sent before it closes the socket (e.g. expired token).
    Warning,
}

impl MessageKind {
    /// Maps a wire discriminator to a known kind.
    pub fn from_discriminator(discriminator: &str) -> Option<Self> {
        match discriminator {
            "service" => Some(MessageKind::Service),
            "deployment" => Some(MessageKind::Deployment),
            "step" => Some(MessageKind::Step),
            "warning" => Some(MessageKind::Warning),
            _ => None,
        }
    }

    /// The discriminator as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Service => "service",
            MessageKind::Deployment => "deployment",
            MessageKind::Step => "step",
            MessageKind::Warning => "warning",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by the server for the credential frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationStatus {
    Success,
    Failure,
}

/// Body of an `authentication` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthenticationResult {
    pub status: AuthenticationStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

/// A parsed inbound frame, keyed by its `type` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to the credential frame.
    Authentication(AuthenticationResult),
    /// Entity message for the subscribers, still in wire naming.
    Entity {
        kind: MessageKind,
        payload: Map<String, Value>,
    },
    /// A discriminator this client does not know. Ignored.
    Unknown { discriminator: String },
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` when the text is not a JSON object, has no string
    /// `type` field, or is an `authentication` frame without a valid `status`.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut payload) = value else {
            return Err(FrameError::NotAnObject);
        };

        let discriminator = match payload.remove("type") {
            Some(Value::String(discriminator)) => discriminator,
            _ => return Err(FrameError::MissingDiscriminator),
        };

        if discriminator == "authentication" {
            let result: AuthenticationResult = serde_json::from_value(Value::Object(payload))
                .map_err(|e| FrameError::InvalidAuthentication(e.to_string()))?;
            return Ok(InboundMessage::Authentication(result));
        }

        Ok(match MessageKind::from_discriminator(&discriminator) {
            Some(kind) => InboundMessage::Entity { kind, payload },
            None => InboundMessage::Unknown { discriminator },
        })
    }
}

/// Credential frame sent right after the transport opens.
#[derive(Clone, Serialize)]
pub struct AuthenticationFrame<'a> {
    pub access_token: &'a str,
}

impl AuthenticationFrame<'_> {
    /// Encodes the frame as the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, WebsocketError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Debug for AuthenticationFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationFrame")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// A field of a canonical message.
///
/// Date-valued fields hold an absolute instant, everything else is kept as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl FieldValue {
    /// Whether the field is JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Json(Value::Null))
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(instant) => Some(*instant),
            FieldValue::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Json(value) => Some(value),
            FieldValue::Timestamp(_) => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

/// The normalized form of an entity message, as handed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMessage {
    kind: MessageKind,
    fields: BTreeMap<String, FieldValue>,
}

impl CanonicalMessage {
    pub fn new(kind: MessageKind, fields: BTreeMap<String, FieldValue>) -> Self {
        Self { kind, fields }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Convenience accessor for integer ids such as `id` or `deploymentId`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_json()?.as_i64()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_json()?.as_str()
    }

    pub fn get_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key)?.as_timestamp()
    }

    /// Whether the message marks its entity as deleted (`deleted: true`).
    ///
    /// The client never acts on this itself; removing the entity is up to subscribers.
    pub fn is_tombstone(&self) -> bool {
        matches!(
            self.get("deleted"),
            Some(FieldValue::Json(Value::Bool(true)))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_authentication_success() {
            let message =
                InboundMessage::parse(r#"{"type":"authentication","status":"success"}"#).unwrap();
            assert_eq!(
                message,
                InboundMessage::Authentication(AuthenticationResult {
                    status: AuthenticationStatus::Success,
                    detail: None,
                })
            );
        }

        #[test]
        fn test_parse_authentication_failure_with_detail() {
            let message = InboundMessage::parse(
                r#"{"type":"authentication","status":"failure","detail":"access token verification failed"}"#,
            )
            .unwrap();
            match message {
                InboundMessage::Authentication(result) => {
                    assert_eq!(result.status, AuthenticationStatus::Failure);
                    assert_eq!(
                        result.detail.as_deref(),
                        Some("access token verification failed")
                    );
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }

        #[test]
        fn test_parse_authentication_bad_status() {
            let err = InboundMessage::parse(r#"{"type":"authentication","status":"maybe"}"#)
                .unwrap_err();
            assert!(matches!(err, FrameError::InvalidAuthentication(_)));
        }

        #[test]
        fn test_parse_entity_strips_discriminator() {
            let message =
                InboundMessage::parse(r#"{"type":"deployment","id":7,"service_id":1}"#).unwrap();
            match message {
                InboundMessage::Entity { kind, payload } => {
                    assert_eq!(kind, MessageKind::Deployment);
                    assert!(!payload.contains_key("type"));
                    assert_eq!(payload.get("service_id"), Some(&json!(1)));
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }

        #[test]
        fn test_parse_unknown_discriminator() {
            let message = InboundMessage::parse(r#"{"type":"ping"}"#).unwrap();
            assert_eq!(
                message,
                InboundMessage::Unknown {
                    discriminator: "ping".to_string()
                }
            );
        }

        #[test]
        fn test_parse_malformed_frames() {
            assert!(matches!(
                InboundMessage::parse("not json"),
                Err(FrameError::InvalidJson(_))
            ));
            assert!(matches!(
                InboundMessage::parse("[1,2]"),
                Err(FrameError::NotAnObject)
            ));
            assert!(matches!(
                InboundMessage::parse(r#"{"id":1}"#),
                Err(FrameError::MissingDiscriminator)
            ));
            assert!(matches!(
                InboundMessage::parse(r#"{"type":3}"#),
                Err(FrameError::MissingDiscriminator)
            ));
        }
    }

    mod canonical_tests {
        use super::*;

        #[test]
        fn test_tombstone_flag() {
            let mut fields = BTreeMap::new();
            fields.insert("id".to_string(), FieldValue::from(json!(3)));
            fields.insert("deleted".to_string(), FieldValue::from(json!(true)));
            let message = CanonicalMessage::new(MessageKind::Deployment, fields);
            assert!(message.is_tombstone());
            assert_eq!(message.get_i64("id"), Some(3));

            let live = CanonicalMessage::new(MessageKind::Deployment, BTreeMap::new());
            assert!(!live.is_tombstone());
        }

        #[test]
        fn test_authentication_frame_serialization_and_debug() {
            let frame = AuthenticationFrame {
                access_token: "secret",
            };
            assert_eq!(frame.encode().unwrap(), r#"{"access_token":"secret"}"#);
            assert!(!format!("{:?}", frame).contains("secret"));
        }

        #[test]
        fn test_kind_round_trips_discriminator() {
            for kind in [
                MessageKind::Service,
                MessageKind::Deployment,
                MessageKind::Step,
                MessageKind::Warning,
            ] {
                assert_eq!(MessageKind::from_discriminator(kind.as_str()), Some(kind));
            }
            assert_eq!(MessageKind::from_discriminator("authentication"), None);
        }
    }
}
