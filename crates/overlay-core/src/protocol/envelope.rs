//! The `{action, data}` envelope exchanged with the relay.
//!
//! Every relay message, in both directions, is a single JSON text frame of the
//! form:
//!
//! ```json
//! {"action":"update_video_settings","data":{"output_width":1920.0,"output_height":1080.0}}
//! ```
//!
//! The shape of `data` depends on `action`.  The envelope itself keeps `data`
//! as an untyped JSON value; callers decode it into the payload type that
//! matches the action with [`ActionEnvelope::payload`].
//!
//! # Forward compatibility
//!
//! `action` is stored as a plain string rather than an enum.  An envelope
//! carrying an action this version does not know still decodes successfully;
//! [`ActionEnvelope::kind`] simply returns `None` for it, and the caller
//! ignores the message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors produced while encoding or decoding relay messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object with an `action` string.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// The envelope decoded, but its `data` does not match the action's payload.
    #[error("malformed '{action}' payload: {source}")]
    MalformedPayload {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    /// A payload or envelope could not be serialized.
    #[error("failed to encode '{action}' message: {source}")]
    Encode {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Actions recognized by this version of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Keepalive / greeting.  Outbound, empty payload.
    Ping,
    /// The viewer (re)connected and wants a full state snapshot.  Inbound.
    Welcome,
    /// Canvas size.  Outbound.
    UpdateVideoSettings,
    /// Static window-bounds configuration.  Outbound.
    UpdateBounds,
    /// Static info-window configuration.  Outbound.
    UpdateInfoWindowConfig,
    /// Current state of every managed scene item.  Outbound.
    UpdateSceneItems,
    /// Move one scene item to normalized coordinates.  Inbound.
    SetSceneItemTransform,
}

impl Action {
    /// Every recognized action, in declaration order.
    pub const ALL: [Action; 7] = [
        Action::Ping,
        Action::Welcome,
        Action::UpdateVideoSettings,
        Action::UpdateBounds,
        Action::UpdateInfoWindowConfig,
        Action::UpdateSceneItems,
        Action::SetSceneItemTransform,
    ];

    /// The string used for this action on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Ping => "ping",
            Action::Welcome => "welcome",
            Action::UpdateVideoSettings => "update_video_settings",
            Action::UpdateBounds => "update_bounds",
            Action::UpdateInfoWindowConfig => "update_info_window_config",
            Action::UpdateSceneItems => "update_scene_items",
            Action::SetSceneItemTransform => "set_scene_item_transform",
        }
    }

    /// Looks up the action for a wire string.  Unknown strings yield `None`.
    pub fn from_wire(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == action)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single wire unit exchanged with the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    /// Action name.  See [`Action`] for the recognized values.
    pub action: String,
    /// Action-specific payload.  Absent `data` decodes as `null`.
    #[serde(default)]
    pub data: Value,
}

impl ActionEnvelope {
    /// Builds an envelope for `action` carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the payload cannot be represented
    /// as JSON (e.g. a map with non-string keys).
    pub fn new<T: Serialize>(action: Action, payload: &T) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(payload).map_err(|source| ProtocolError::Encode {
            action: action.as_str().to_string(),
            source,
        })?;
        Ok(Self {
            action: action.as_str().to_string(),
            data,
        })
    }

    /// The keepalive envelope: `{"action":"ping","data":{}}`.
    pub fn ping() -> Self {
        Self {
            action: Action::Ping.as_str().to_string(),
            data: Value::Object(serde_json::Map::new()),
        }
    }

    /// Returns the recognized action, or `None` for an unknown one.
    pub fn kind(&self) -> Option<Action> {
        Action::from_wire(&self.action)
    }

    /// Decodes `data` into the payload type for this action.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] if `data` does not have the
    /// expected shape.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.data).map_err(|source| ProtocolError::MalformedPayload {
            action: self.action.clone(),
            source,
        })
    }

    /// Serializes the envelope into the text of one relay frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|source| ProtocolError::Encode {
            action: self.action.clone(),
            source,
        })
    }

    /// Parses the text of one relay frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedEnvelope`] if the text is not a JSON
    /// object with a string `action` field.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_action_maps_back_from_its_wire_string() {
        for action in Action::ALL {
            assert_eq!(Action::from_wire(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_unknown_wire_string_is_not_an_action() {
        assert_eq!(Action::from_wire("get_positions"), None);
        assert_eq!(Action::from_wire(""), None);
    }

    #[test]
    fn test_ping_envelope_has_empty_object_payload() {
        let json = ActionEnvelope::ping().to_json().unwrap();
        assert_eq!(json, r#"{"action":"ping","data":{}}"#);
    }

    #[test]
    fn test_welcome_without_data_decodes_with_null_payload() {
        // Arrange: the relay sends a bare handshake signal
        let text = r#"{"action":"welcome"}"#;

        // Act
        let envelope = ActionEnvelope::from_json(text).unwrap();

        // Assert
        assert_eq!(envelope.kind(), Some(Action::Welcome));
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn test_unknown_action_still_decodes() {
        let envelope =
            ActionEnvelope::from_json(r#"{"action":"future_thing","data":[1,2,3]}"#).unwrap();
        assert_eq!(envelope.kind(), None);
        assert_eq!(envelope.action, "future_thing");
    }

    #[test]
    fn test_plain_text_frame_is_malformed() {
        let result = ActionEnvelope::from_json("Hello Server!");
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_missing_action_field_is_malformed() {
        let result = ActionEnvelope::from_json(r#"{"data":{}}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_payload_type_mismatch_reports_action_name() {
        // Arrange: a payload that should be an object but is a string
        let envelope = ActionEnvelope {
            action: "set_scene_item_transform".to_string(),
            data: Value::String("oops".to_string()),
        };

        // Act
        let result: Result<crate::TransformCommand, _> = envelope.payload();

        // Assert
        match result {
            Err(ProtocolError::MalformedPayload { action, .. }) => {
                assert_eq!(action, "set_scene_item_transform");
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }
}
