/// Wire protocol: newline-delimited UTF-8 JSON messages
///
/// Outbound: `{"command": [...], "request_id": N}`
/// Inbound success: `{"request_id": N, "error": "success", "data": ...}`
/// Inbound failure: `{"request_id": N, "error": "<message>"}`
/// Inbound events: `{"event": "property-change", "name": ..., "data": ...}`,
/// `{"event": "file-loaded"}`, `{"event": "end-file", "reason": "<code>"}`
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The literal inbound error string that marks a successful response
const SUCCESS: &str = "success";

/// Outbound request envelope
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    /// Command name followed by its arguments
    pub command: &'a [Value],

    /// Correlation id, monotonically increasing per connection
    pub request_id: u64,
}

/// Reason code attached to an `end-file` event
///
/// Only [`EndReason::Eof`] triggers auto-advance; every other reason is
/// informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Natural end of the current file
    Eof,
    /// Playback was stopped
    Stop,
    /// The engine is quitting
    Quit,
    /// The engine failed to play the file
    Error,
    /// Playlist redirect
    Redirect,
    /// Any reason code this client does not know
    Other(String),
}

impl EndReason {
    fn parse(reason: &str) -> Self {
        match reason {
            "eof" => EndReason::Eof,
            "stop" => EndReason::Stop,
            "quit" => EndReason::Quit,
            "error" => EndReason::Error,
            "redirect" => EndReason::Redirect,
            other => EndReason::Other(other.to_string()),
        }
    }
}

/// Out-of-band engine events demultiplexed from the response stream
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A single observed property changed
    PropertyChange {
        /// Property name
        name: String,
        /// New value (may be `Value::Null` when the property was cleared)
        value: Value,
    },

    /// The engine finished opening media
    FileLoaded,

    /// The current file ended
    EndFile {
        /// Why the file ended
        reason: EndReason,
    },

    /// The connection to the engine was lost. Synthesized by the transport;
    /// never read off the wire.
    Closed {
        /// Human-readable cause
        reason: String,
    },
}

/// A classified inbound message
#[derive(Debug)]
pub enum Incoming {
    /// Response correlated to an outbound request
    Response {
        /// Correlation id echoed by the engine
        request_id: u64,
        /// Payload or the engine's error message
        result: Result<Value, String>,
    },

    /// Unsolicited event
    Event(EngineEvent),
}

/// Classification failures; the transport drops these lines silently
/// (forward-compatible with unknown message shapes)
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The line was not valid JSON of the expected shape
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A known message kind was missing a required field
    #[error("message missing field: {0}")]
    MissingField(&'static str),

    /// An event name this client does not handle
    #[error("unrecognized event: {0}")]
    UnrecognizedEvent(String),

    /// Neither a response nor an event
    #[error("unclassifiable message")]
    Unclassifiable,
}

/// Loosely-shaped inbound message; classification applies the checked
/// accessors on top of this
#[derive(Debug, Deserialize)]
struct RawMessage {
    request_id: Option<u64>,
    error: Option<String>,
    data: Option<Value>,
    event: Option<String>,
    name: Option<String>,
    reason: Option<String>,
}

/// Classify one complete line from the engine
pub fn classify_line(line: &str) -> Result<Incoming, ProtocolError> {
    let raw: RawMessage = serde_json::from_str(line)?;

    if let Some(request_id) = raw.request_id {
        let result = match raw.error.as_deref() {
            Some(SUCCESS) | None => Ok(raw.data.unwrap_or(Value::Null)),
            Some(message) => Err(message.to_string()),
        };
        return Ok(Incoming::Response { request_id, result });
    }

    match raw.event.as_deref() {
        Some("property-change") => {
            let name = raw.name.ok_or(ProtocolError::MissingField("name"))?;
            Ok(Incoming::Event(EngineEvent::PropertyChange {
                name,
                value: raw.data.unwrap_or(Value::Null),
            }))
        }
        Some("file-loaded") => Ok(Incoming::Event(EngineEvent::FileLoaded)),
        Some("end-file") => {
            let reason = raw.reason.ok_or(ProtocolError::MissingField("reason"))?;
            Ok(Incoming::Event(EngineEvent::EndFile {
                reason: EndReason::parse(&reason),
            }))
        }
        Some(other) => Err(ProtocolError::UnrecognizedEvent(other.to_string())),
        None => Err(ProtocolError::Unclassifiable),
    }
}

/// Serialize an outbound request as one newline-terminated wire line
pub fn encode_request(command: &[Value], request_id: u64) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&Request {
        command,
        request_id,
    })?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_response_with_data() {
        let incoming =
            classify_line(r#"{"request_id": 3, "error": "success", "data": 42.5}"#).unwrap();
        match incoming {
            Incoming::Response { request_id, result } => {
                assert_eq!(request_id, 3);
                assert_eq!(result.unwrap(), json!(42.5));
            }
            Incoming::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn error_response_carries_message() {
        let incoming =
            classify_line(r#"{"request_id": 7, "error": "property not found"}"#).unwrap();
        match incoming {
            Incoming::Response { request_id, result } => {
                assert_eq!(request_id, 7);
                assert_eq!(result.unwrap_err(), "property not found");
            }
            Incoming::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn property_change_event() {
        let incoming =
            classify_line(r#"{"event": "property-change", "name": "pause", "data": true}"#)
                .unwrap();
        match incoming {
            Incoming::Event(EngineEvent::PropertyChange { name, value }) => {
                assert_eq!(name, "pause");
                assert_eq!(value, json!(true));
            }
            _ => panic!("expected property-change"),
        }
    }

    #[test]
    fn end_file_reasons() {
        let eof = classify_line(r#"{"event": "end-file", "reason": "eof"}"#).unwrap();
        match eof {
            Incoming::Event(EngineEvent::EndFile { reason }) => assert_eq!(reason, EndReason::Eof),
            _ => panic!("expected end-file"),
        }

        let stop = classify_line(r#"{"event": "end-file", "reason": "stop"}"#).unwrap();
        match stop {
            Incoming::Event(EngineEvent::EndFile { reason }) => {
                assert_eq!(reason, EndReason::Stop);
            }
            _ => panic!("expected end-file"),
        }

        let odd = classify_line(r#"{"event": "end-file", "reason": "weird"}"#).unwrap();
        match odd {
            Incoming::Event(EngineEvent::EndFile { reason }) => {
                assert_eq!(reason, EndReason::Other("weird".to_string()));
            }
            _ => panic!("expected end-file"),
        }
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(classify_line("not json").is_err());
        assert!(classify_line(r#"{"event": "property-change"}"#).is_err());
        assert!(classify_line(r#"{"some": "object"}"#).is_err());
    }

    #[test]
    fn unknown_events_are_dropped_as_errors() {
        let err = classify_line(r#"{"event": "playback-restart"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnrecognizedEvent(_)));
    }

    #[test]
    fn encode_request_is_one_line() {
        let line = encode_request(&[json!("seek"), json!(10.0), json!("relative")], 5).unwrap();
        assert!(line.ends_with('\n'));
        assert!(!line.trim_end().contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["request_id"], json!(5));
        assert_eq!(parsed["command"][0], json!("seek"));
    }
}
