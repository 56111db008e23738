//! Minimal Socket.IO-over-WebSocket framing.
//!
//! The sync server speaks Socket.IO v5 on top of Engine.IO v4. Over a plain
//! WebSocket transport every *text* frame carries exactly one packet: an
//! Engine.IO type digit, and for Engine.IO `message` packets a Socket.IO type
//! digit followed by an optional JSON body.
//!
//! We implement only the packets this client needs:
//!
//! | Frame            | Direction        | Meaning                         |
//! |------------------|------------------|---------------------------------|
//! | `0{...}`         | server → client  | Engine.IO open (handshake info) |
//! | `1`              | both             | Engine.IO close                 |
//! | `2` / `3`        | server ↔ client  | ping / pong                     |
//! | `6`              | server → client  | noop                            |
//! | `40[{...}]`      | both             | Socket.IO connect (+ auth)      |
//! | `41`             | both             | Socket.IO disconnect            |
//! | `42[ack]["ev",x]`| both             | Socket.IO event                 |
//! | `44{...}`        | server → client  | Socket.IO connect error         |
//!
//! Only the default namespace (`/`) is supported. Binary packets are ignored.

use serde_json::{json, Value};

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Outbound frame builders
// ---------------------------------------------------------------------------

/// Build the Socket.IO `CONNECT` frame, with the bearer token as auth
/// payload when one is available.
pub fn connect_frame(token: Option<&str>) -> String {
    match token {
        Some(t) => format!("40{}", json!({ "token": t })),
        None => "40".into(),
    }
}

/// Build a `42["event",payload]` frame.
pub fn event_frame(event: &str, payload: &Value) -> String {
    format!("42{}", json!([event, payload]))
}

/// Build the Socket.IO `DISCONNECT` frame.
pub fn disconnect_frame() -> String {
    "41".into()
}

/// Build the Engine.IO `pong` reply to a server `ping`.
pub fn pong_frame() -> String {
    "3".into()
}

/// Path + query appended to the channel base URL.
pub const WEBSOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Full WebSocket URL for a channel base URL (`ws://host:port`).
pub fn websocket_url(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), WEBSOCKET_PATH)
}

// ---------------------------------------------------------------------------
// Inbound packet parsing
// ---------------------------------------------------------------------------

/// A single parsed packet received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}`: handshake info (`sid`, `pingInterval`, …).
    Open { handshake: Value },
    /// `1`
    Close,
    /// `2`: must be answered with `3`.
    Ping,
    /// `3`
    Pong,
    /// `6`
    Noop,
    /// `40{...}`: namespace connected.
    Connect { sid: Option<String> },
    /// `41`
    Disconnect,
    /// `42["event", data, ...]`: only the first argument is kept.
    Event { name: String, data: Value },
    /// `44{"message": ...}`
    ConnectError { message: String },
}

/// Parse one WebSocket text frame into a [`Packet`].
pub fn parse_frame(text: &str) -> Result<Packet, ProtocolError> {
    let mut chars = text.chars();
    let Some(eio) = chars.next() else {
        return Err(ProtocolError::Malformed("empty frame".into()));
    };
    let rest = chars.as_str();

    match eio {
        '0' => Ok(Packet::Open {
            handshake: parse_json(rest)?,
        }),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '6' => Ok(Packet::Noop),
        '4' => parse_socket_packet(rest),
        other => Err(ProtocolError::Malformed(format!(
            "unknown engine packet type '{other}'"
        ))),
    }
}

fn parse_socket_packet(text: &str) -> Result<Packet, ProtocolError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(ProtocolError::Malformed("empty socket packet".into()));
    };
    let body = chars.as_str();
    if body.starts_with('/') {
        return Err(ProtocolError::Malformed(
            "non-default namespaces are not supported".into(),
        ));
    }

    match kind {
        '0' => {
            let sid = if body.is_empty() {
                None
            } else {
                parse_json(body)?
                    .get("sid")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            Ok(Packet::Connect { sid })
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // Optional ack id precedes the JSON array.
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let Value::Array(mut args) = parse_json(body)? else {
                return Err(ProtocolError::Malformed("event body must be an array".into()));
            };
            if args.is_empty() {
                return Err(ProtocolError::Malformed("event without a name".into()));
            }
            let data = if args.len() > 1 {
                args.swap_remove(1)
            } else {
                Value::Null
            };
            let Value::String(name) = args.swap_remove(0) else {
                return Err(ProtocolError::Malformed("event name must be a string".into()));
            };
            Ok(Packet::Event { name, data })
        }
        '4' => {
            let message = match parse_json(body)? {
                Value::String(s) => s,
                v => v
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string(),
            };
            Ok(Packet::ConnectError { message })
        }
        other => Err(ProtocolError::Malformed(format!(
            "unsupported socket packet type '{other}'"
        ))),
    }
}

fn parse_json(text: &str) -> Result<Value, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Outbound frame builders
    // ---------------------------------------------------------------

    #[test]
    fn connect_frame_without_token() {
        assert_eq!(connect_frame(None), "40");
    }

    #[test]
    fn connect_frame_carries_token() {
        let frame = connect_frame(Some("abc"));
        assert!(frame.starts_with("40"));
        let v: Value = serde_json::from_str(&frame[2..]).expect("valid JSON");
        assert_eq!(v["token"], "abc");
    }

    #[test]
    fn event_frame_format() {
        let frame = event_frame("object:remove", &json!("box"));
        assert_eq!(frame, r#"42["object:remove","box"]"#);
    }

    #[test]
    fn control_frames() {
        assert_eq!(pong_frame(), "3");
        assert_eq!(disconnect_frame(), "41");
    }

    #[test]
    fn websocket_url_appends_path_once() {
        assert_eq!(
            websocket_url("ws://localhost:8000/"),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
    }

    // ---------------------------------------------------------------
    // Inbound parsing: engine packets
    // ---------------------------------------------------------------

    #[test]
    fn parse_open() {
        let p = parse_frame(r#"0{"sid":"abc","pingInterval":25000}"#).unwrap();
        let Packet::Open { handshake } = p else {
            panic!("expected Open");
        };
        assert_eq!(handshake["sid"], "abc");
    }

    #[test]
    fn parse_ping_pong_noop_close() {
        assert_eq!(parse_frame("2").unwrap(), Packet::Ping);
        assert_eq!(parse_frame("3").unwrap(), Packet::Pong);
        assert_eq!(parse_frame("6").unwrap(), Packet::Noop);
        assert_eq!(parse_frame("1").unwrap(), Packet::Close);
    }

    #[test]
    fn parse_empty_frame_is_error() {
        assert!(parse_frame("").is_err());
    }

    #[test]
    fn parse_unknown_engine_type_is_error() {
        assert!(parse_frame("9").is_err());
    }

    // ---------------------------------------------------------------
    // Inbound parsing: socket packets
    // ---------------------------------------------------------------

    #[test]
    fn parse_connect_ack() {
        assert_eq!(
            parse_frame(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Connect {
                sid: Some("xyz".into())
            }
        );
        assert_eq!(parse_frame("40").unwrap(), Packet::Connect { sid: None });
    }

    #[test]
    fn parse_connect_error() {
        let p = parse_frame(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            p,
            Packet::ConnectError {
                message: "Not authorized".into()
            }
        );
    }

    #[test]
    fn parse_event() {
        let p = parse_frame(r#"42["user:join",{"id":"u1"}]"#).unwrap();
        assert_eq!(
            p,
            Packet::Event {
                name: "user:join".into(),
                data: json!({"id": "u1"})
            }
        );
    }

    #[test]
    fn parse_event_with_ack_id_and_extra_args() {
        let p = parse_frame(r#"4212["object:remove","a","ignored"]"#).unwrap();
        assert_eq!(
            p,
            Packet::Event {
                name: "object:remove".into(),
                data: json!("a")
            }
        );
    }

    #[test]
    fn parse_event_without_payload() {
        let p = parse_frame(r#"42["ping:room"]"#).unwrap();
        assert_eq!(
            p,
            Packet::Event {
                name: "ping:room".into(),
                data: Value::Null
            }
        );
    }

    #[test]
    fn parse_event_rejects_bad_bodies() {
        assert!(parse_frame("42{}").is_err());
        assert!(parse_frame("42[]").is_err());
        assert!(parse_frame("42[1,2]").is_err());
        assert!(parse_frame("42[\"x\"").is_err());
    }

    #[test]
    fn parse_namespaced_packet_is_rejected() {
        assert!(parse_frame(r#"42/admin,["x",1]"#).is_err());
    }

    #[test]
    fn roundtrip_event_frame() {
        let payload = json!({"objectId": "a", "position": [1.0, 0.0, 0.0]});
        let frame = event_frame("object:position", &payload);
        assert_eq!(
            parse_frame(&frame).unwrap(),
            Packet::Event {
                name: "object:position".into(),
                data: payload
            }
        );
    }
}
