//! RPC wire frames exchanged with the simulation server.
//!
//! Client → server: [`RequestFrame`] `{id, object, action, params}`.
//! Server → client: [`InboundFrame`], a closed set tagged by `msgType`:
//!
//! - `response`: `{msgType, id, data}`, correlated to a request by `id`
//! - `notification`: `{msgType, data: {name, object}}`, a server-pushed event
//!
//! Subscriptions are ordinary requests on the `server` object
//! (`addListener` / `removeListener` with `{event}` params).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::WireError;

/// Per-channel request identifier. Allocated by the channel, never reused.
pub type RequestId = u64;

/// Object name for session-level calls (login, listeners, renotify).
pub const SERVER_OBJECT: &str = "server";

/// Well-known notification names pushed by the simulation server.
pub mod events {
    pub const SIGNAL_STATUS_CHANGED: &str = "SIGNAL_STATUS_CHANGED";
    pub const SIGNAL_ASPECT_CHANGED: &str = "signalAspectChanged";
    pub const ROUTE_ACTIVATED: &str = "routeActivated";
    pub const ROUTE_DEACTIVATED: &str = "routeDeactivated";
    pub const TRAIN_CHANGED: &str = "trainChanged";
    pub const CLOCK_CHANGED: &str = "clockChanged";
}

// ─── Outbound ────────────────────────────────────────────────────────

/// A serialized request as it goes over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: RequestId,
    pub object: String,
    pub action: String,
    pub params: Option<Value>,
}

/// An addressed call before an id has been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub object: String,
    pub action: String,
    pub params: Option<Value>,
}

impl Call {
    pub fn new(object: impl Into<String>, action: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            object: object.into(),
            action: action.into(),
            params,
        }
    }

    /// Login handshake sent right after the socket opens.
    pub fn register(client_type: &str, token: &str) -> Self {
        Self::new(
            SERVER_OBJECT,
            "register",
            Some(json!({ "type": client_type, "token": token })),
        )
    }

    pub fn add_listener(event: &str) -> Self {
        Self::new(SERVER_OBJECT, "addListener", Some(json!({ "event": event })))
    }

    pub fn remove_listener(event: &str) -> Self {
        Self::new(SERVER_OBJECT, "removeListener", Some(json!({ "event": event })))
    }

    /// Ask the server to re-push the current state as notifications.
    pub fn renotify() -> Self {
        Self::new(SERVER_OBJECT, "renotify", None)
    }

    /// Full simulation snapshot, returned in the response payload.
    pub fn simulation_dump() -> Self {
        Self::new("simulation", "dump", None)
    }

    pub fn into_frame(self, id: RequestId) -> RequestFrame {
        RequestFrame {
            id,
            object: self.object,
            action: self.action,
            params: self.params,
        }
    }
}

// ─── Inbound ─────────────────────────────────────────────────────────

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Response { id: RequestId, data: Value },
    Notification { name: String, object: Value },
}

#[derive(Deserialize)]
#[serde(tag = "msgType", rename_all = "lowercase")]
enum RawInbound {
    Response {
        id: RequestId,
        #[serde(default)]
        data: Value,
    },
    Notification {
        data: NotificationBody,
    },
}

#[derive(Deserialize)]
struct NotificationBody {
    name: String,
    #[serde(default)]
    object: Value,
}

impl InboundFrame {
    /// Decode one text frame. Unknown `msgType` values are errors.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let frame = match serde_json::from_str::<RawInbound>(raw)? {
            RawInbound::Response { id, data } => Self::Response { id, data },
            RawInbound::Notification { data } => Self::Notification {
                name: data.name,
                object: data.object,
            },
        };
        Ok(frame)
    }
}

/// `true` when a response payload carries `"status": "OK"`.
pub fn is_status_ok(data: &Value) -> bool {
    data.get("status").and_then(Value::as_str) == Some("OK")
}

/// The human-readable `message` of a response payload, or its `status`.
pub fn status_message(data: &Value) -> String {
    data.get("message")
        .or_else(|| data.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string()
}
