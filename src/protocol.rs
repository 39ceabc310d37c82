//! WebSocket wire protocol
//!
//! Every text frame is a JSON envelope `{"event": "<name>", "data": <payload>}`.
//! Payload field names are camelCase; cursor positions use the editor's
//! `lineNumber`/`column` naming.
//!
//! | Direction | Event | Payload |
//! |---|---|---|
//! | server→client | `document:init` | `{content, users}` |
//! | server→client | `document:update` | `{content, timestamp}` |
//! | client→server | `document:edit` | `{content}` |
//! | client→server | `cursor:move` | `{position, selection?}` |
//! | server→client | `cursor:update` | `{userId, color, position, selection?}` |
//! | server→client | `cursor:removed` | `{userId}` |
//! | server→client | `user:left` | `"<userId>"` |
//! | server→client | `presence:update` | `{count, users: [{id, color, name}]}` |
//! | server→client | `error` | `{message}` |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorCategory, LoglineErrorTrait};
use crate::session::{CursorColor, PresenceEntry};

pub const EVENT_DOCUMENT_EDIT: &str = "document:edit";
pub const EVENT_CURSOR_MOVE: &str = "cursor:move";

/// Sent to a client whose edit could not be processed
pub const EDIT_FAILED_MESSAGE: &str = "Failed to process edit";

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Cursor Types
// ============================================================================

/// Caret position; bounds are never checked against the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    #[serde(rename = "lineNumber", alias = "line")]
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSelection {
    #[serde(rename = "startLineNumber", alias = "startLine")]
    pub start_line: i64,
    #[serde(rename = "startColumn")]
    pub start_column: i64,
    #[serde(rename = "endLineNumber", alias = "endLine")]
    pub end_line: i64,
    #[serde(rename = "endColumn")]
    pub end_column: i64,
}

/// A cursor relayed to peers; never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub user_id: String,
    pub color: CursorColor,
    pub position: CursorPosition,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selection: Option<CursorSelection>,
}

// ============================================================================
// Client -> Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditPayload {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CursorMovePayload {
    pub position: CursorPosition,
    #[serde(default)]
    pub selection: Option<CursorSelection>,
}

/// Decoded client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    DocumentEdit(EditPayload),
    CursorMove(CursorMovePayload),
    /// Event name this server does not handle
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ClientEvent {
    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))?;

        match envelope.event.as_str() {
            EVENT_DOCUMENT_EDIT => serde_json::from_value(envelope.data)
                .map(Self::DocumentEdit)
                .map_err(|e| ProtocolError::malformed(EVENT_DOCUMENT_EDIT, e)),
            EVENT_CURSOR_MOVE => serde_json::from_value(envelope.data)
                .map(Self::CursorMove)
                .map_err(|e| ProtocolError::malformed(EVENT_CURSOR_MOVE, e)),
            _ => Ok(Self::Unknown(envelope.event)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::DocumentEdit(_) => EVENT_DOCUMENT_EDIT,
            Self::CursorMove(_) => EVENT_CURSOR_MOVE,
            Self::Unknown(name) => name,
        }
    }
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Event pushed to a connection's outbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "document:init")]
    DocumentInit { content: String, users: usize },

    #[serde(rename = "document:update")]
    DocumentUpdate { content: String, timestamp: i64 },

    #[serde(rename = "cursor:update")]
    CursorUpdate(CursorState),

    #[serde(rename = "cursor:removed")]
    CursorRemoved {
        #[serde(rename = "userId")]
        user_id: String,
    },

    #[serde(rename = "user:left")]
    UserLeft(String),

    #[serde(rename = "presence:update")]
    PresenceUpdate {
        count: usize,
        users: Vec<PresenceEntry>,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name, used for logging and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Self::DocumentInit { .. } => "document:init",
            Self::DocumentUpdate { .. } => "document:update",
            Self::CursorUpdate(_) => "cursor:update",
            Self::CursorRemoved { .. } => "cursor:removed",
            Self::UserLeft(_) => "user:left",
            Self::PresenceUpdate { .. } => "presence:update",
            Self::Error { .. } => "error",
        }
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors decoding client frames; never fatal to the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid message envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Malformed '{event}' payload: {reason}")]
    MalformedPayload { event: String, reason: String },
}

impl ProtocolError {
    fn malformed(event: &str, err: serde_json::Error) -> Self {
        Self::MalformedPayload {
            event: event.to_string(),
            reason: err.to_string(),
        }
    }

    /// Message reported to the client in an `error` event
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidEnvelope(_) => "Invalid message",
            Self::MalformedPayload { event, .. } if event == EVENT_DOCUMENT_EDIT => {
                EDIT_FAILED_MESSAGE
            }
            Self::MalformedPayload { event, .. } if event == EVENT_CURSOR_MOVE => {
                "Failed to process cursor"
            }
            Self::MalformedPayload { .. } => "Failed to process message",
        }
    }

    /// Event label for metrics
    pub fn event(&self) -> &str {
        match self {
            Self::InvalidEnvelope(_) => "envelope",
            Self::MalformedPayload { event, .. } => event,
        }
    }
}

impl LoglineErrorTrait for ProtocolError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_edit() {
        let event =
            ClientEvent::parse(r#"{"event":"document:edit","data":{"content":"hello"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::DocumentEdit(EditPayload {
                content: "hello".into()
            })
        );
    }

    #[test]
    fn test_parse_edit_missing_content() {
        let err = ClientEvent::parse(r#"{"event":"document:edit","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { .. }));
        assert_eq!(err.client_message(), "Failed to process edit");
    }

    #[test]
    fn test_parse_edit_non_string_content() {
        let err =
            ClientEvent::parse(r#"{"event":"document:edit","data":{"content":42}}"#).unwrap_err();
        assert_eq!(err.client_message(), EDIT_FAILED_MESSAGE);
    }

    #[test]
    fn test_parse_cursor_with_selection() {
        let text = json!({
            "event": "cursor:move",
            "data": {
                "position": {"lineNumber": 3, "column": 7},
                "selection": {
                    "startLineNumber": 1,
                    "startColumn": 1,
                    "endLineNumber": 3,
                    "endColumn": 7
                }
            }
        })
        .to_string();

        let ClientEvent::CursorMove(cursor) = ClientEvent::parse(&text).unwrap() else {
            panic!("expected cursor:move");
        };
        assert_eq!(cursor.position, CursorPosition { line: 3, column: 7 });
        assert_eq!(cursor.selection.unwrap().end_column, 7);
    }

    #[test]
    fn test_parse_cursor_accepts_line_alias_and_out_of_range_values() {
        let text = r#"{"event":"cursor:move","data":{"position":{"line":-5,"column":100000}}}"#;
        let ClientEvent::CursorMove(cursor) = ClientEvent::parse(text).unwrap() else {
            panic!("expected cursor:move");
        };
        assert_eq!(cursor.position.line, -5);
        assert!(cursor.selection.is_none());
    }

    #[test]
    fn test_parse_cursor_without_position() {
        let err = ClientEvent::parse(r#"{"event":"cursor:move","data":{}}"#).unwrap_err();
        assert_eq!(err.client_message(), "Failed to process cursor");
    }

    #[test]
    fn test_parse_unknown_and_invalid() {
        let event = ClientEvent::parse(r#"{"event":"chat:send","data":{}}"#).unwrap();
        assert_eq!(event, ClientEvent::Unknown("chat:send".into()));

        let err = ClientEvent::parse("not json").unwrap_err();
        assert_eq!(err.client_message(), "Invalid message");
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::DocumentInit {
            content: String::new(),
            users: 1,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "document:init", "data": {"content": "", "users": 1}}));

        let cursor = ServerEvent::CursorUpdate(CursorState {
            user_id: "u1".into(),
            color: CursorColor::Red,
            position: CursorPosition { line: 1, column: 2 },
            selection: None,
        });
        let value: serde_json::Value = serde_json::from_str(&cursor.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "cursor:update",
                "data": {
                    "userId": "u1",
                    "color": "#ef4444",
                    "position": {"lineNumber": 1, "column": 2}
                }
            })
        );

        let left = ServerEvent::UserLeft("u1".into());
        let value: serde_json::Value = serde_json::from_str(&left.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "user:left", "data": "u1"}));
    }
}
