//! Parses raw frame text into a validated [`Message`] (§4.2).

use crate::domain::{Message, Visibility};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("frame was not valid JSON: {0}")]
    NotJson(String),
    #[error("bad payload: {0}")]
    BadPayload(String),
}

/// Parses and schema-checks an inbound frame into a canonical [`Message`].
///
/// The envelope must have exactly three keys — `type`, `payload`,
/// `visibility` — with `type` a string and `visibility` one of the four
/// literal values. The server assigns `ts`; `user` is filled in by the caller
/// once the sender's identity is known.
pub struct MessageValidator;

impl MessageValidator {
    pub fn parse(raw: &str, now: i64) -> Result<Message, ValidationError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| ValidationError::NotJson(err.to_string()))?;

        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::BadPayload("frame is not a JSON object".to_string()))?;

        if object.len() != 3 {
            return Err(ValidationError::BadPayload(
                "envelope must have exactly the keys type, payload, visibility".to_string(),
            ));
        }

        let kind = object
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ValidationError::BadPayload("\"type\" must be a string".to_string()))?
            .to_string();

        let payload = object
            .get("payload")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| ValidationError::BadPayload("\"payload\" must be an object".to_string()))?
            .clone();

        let visibility_str = object
            .get("visibility")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ValidationError::BadPayload("\"visibility\" must be a string".to_string())
            })?;

        let visibility = match visibility_str {
            "global" => Visibility::Global,
            "team" => Visibility::Team,
            "map" => Visibility::Map,
            "none" => Visibility::None,
            other => {
                return Err(ValidationError::BadPayload(format!(
                    "\"visibility\" must be one of global, team, map, none; got \"{other}\""
                )))
            }
        };

        Ok(Message {
            kind,
            payload,
            visibility,
            user: None,
            ts: now,
        })
    }
}
