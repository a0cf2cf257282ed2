//! Session lifecycle types.
//!
//! A session is one relay room plus the connections that serve it.  It is
//! created by `BridgeController::start` and destroyed by `stop` or by a fatal
//! error.  The types here carry no behaviour beyond formatting; the state
//! machine itself lives in the application layer.

use std::fmt;

/// Lifecycle state of the bridge controller.
///
/// ```text
/// Disconnected → Negotiating → Connecting → Running → Stopping → Disconnected
/// ```
///
/// Any state may fall back to `Disconnected` on a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Connecting to the control tool and bootstrapping the relay room.
    Negotiating,
    /// Dialing the relay.
    Connecting,
    /// The dispatch loop is serving the relay.
    Running,
    /// Shutdown in progress.
    Stopping,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Negotiating => "negotiating",
            SessionState::Connecting => "connecting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// Result of a successful room bootstrap.
#[derive(Clone, PartialEq, Eq)]
pub struct NegotiatedSession {
    /// External user identity the room is scoped to.
    pub user_id: String,
    /// Room key issued by the lobby service.  Treat as a secret.
    pub room_key: String,
    /// WebSocket address embedding the identity and the key.
    pub relay_address: String,
}

impl NegotiatedSession {
    /// The room key with every character replaced by `*`, for logging.
    pub fn masked_key(&self) -> String {
        mask_secret(&self.room_key)
    }
}

// Manual impl: the derived one would print the room key and the address that
// embeds it.
impl fmt::Debug for NegotiatedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiatedSession")
            .field("user_id", &self.user_id)
            .field("room_key", &self.masked_key())
            .finish_non_exhaustive()
    }
}

/// Replaces every character of `secret` with `*`.
pub fn mask_secret(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}

/// Published by the relay read loop when the connection ends without the
/// controller asking for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseNotice {
    /// Close code from the peer's close frame, if one arrived.
    pub code: Option<u16>,
    /// Close reason, or the transport error text when no frame arrived.
    pub reason: String,
}

impl fmt::Display for CloseNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "closed with code {code}: {}", self.reason),
            None => write!(f, "connection lost: {}", self.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> NegotiatedSession {
        NegotiatedSession {
            user_id: "12345".to_string(),
            room_key: "abc123".to_string(),
            relay_address: "wss://relay.test/lobby/connect/streamer?user=12345&key=abc123"
                .to_string(),
        }
    }

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert!(!SessionState::default().is_active());
        assert!(SessionState::Running.is_active());
    }

    #[test]
    fn test_masked_key_keeps_length() {
        assert_eq!(session().masked_key(), "******");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn test_debug_output_hides_room_key() {
        let text = format!("{:?}", session());
        assert!(!text.contains("abc123"), "debug output leaked the key: {text}");
        assert!(text.contains("12345"));
    }

    #[test]
    fn test_close_notice_display() {
        let with_code = CloseNotice { code: Some(1006), reason: "gone".to_string() };
        let without = CloseNotice { code: None, reason: "reset".to_string() };
        assert_eq!(with_code.to_string(), "closed with code 1006: gone");
        assert_eq!(without.to_string(), "connection lost: reset");
    }
}
