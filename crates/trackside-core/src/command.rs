//! Operator commands and how they are addressed on the wire.
//!
//! Route, train and suggestion commands travel over the RPC channel and
//! lower to a [`Call`]. Signal overrides and hint responses go over HTTP
//! and are plain serde bodies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::WireError;
use crate::rpc::Call;

// ─── RPC commands ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    Activate,
    Deactivate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainAction {
    Proceed,
    Reverse,
    SetService { service_code: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionCommand {
    List,
    Accept { id: String },
    Reject { id: String, minutes: u32 },
    Recompute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Route { id: String, action: RouteAction },
    Train { id: String, action: TrainAction },
    Suggestion(SuggestionCommand),
}

impl ConsoleCommand {
    pub fn to_call(&self) -> Call {
        match self {
            Self::Route { id, action } => {
                let name = match action {
                    RouteAction::Activate => "activate",
                    RouteAction::Deactivate => "deactivate",
                };
                Call::new("route", name, Some(json!({ "id": id })))
            }
            Self::Train { id, action } => match action {
                TrainAction::Proceed => Call::new("train", "proceed", Some(json!({ "id": id }))),
                TrainAction::Reverse => Call::new("train", "reverse", Some(json!({ "id": id }))),
                TrainAction::SetService { service_code } => Call::new(
                    "train",
                    "setService",
                    Some(json!({ "id": id, "serviceCode": service_code })),
                ),
            },
            Self::Suggestion(cmd) => match cmd {
                SuggestionCommand::List => Call::new("suggestions", "list", None),
                SuggestionCommand::Accept { id } => {
                    Call::new("suggestions", "accept", Some(json!({ "id": id })))
                }
                SuggestionCommand::Reject { id, minutes } => Call::new(
                    "suggestions",
                    "reject",
                    Some(json!({ "id": id, "minutes": minutes })),
                ),
                SuggestionCommand::Recompute => Call::new("suggestions", "recompute", None),
            },
        }
    }
}

// ─── Signal override (HTTP) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Red,
    Yellow,
    Green,
}

impl SignalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RED" => Ok(Self::Red),
            "YELLOW" => Ok(Self::Yellow),
            "GREEN" => Ok(Self::Green),
            _ => Err(WireError::UnknownSignalStatus(s.to_string())),
        }
    }
}

/// Body of `PUT /api/systems/signals/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalStatusUpdate {
    pub new_status: SignalStatus,
    pub reason: String,
    pub user_id: String,
}

pub fn signal_status_path(signal_id: &str) -> String {
    format!("/api/systems/signals/{signal_id}/status")
}

// ─── Hint response (HTTP) ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HintVerdict {
    Accept,
    Dismiss,
    Override,
}

/// Body of `POST /api/ai/hints/{id}/respond`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
    pub response: HintVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_action: Option<Value>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismiss_minutes: Option<u32>,
}

pub fn hint_response_path(hint_id: &str) -> String {
    format!("/api/ai/hints/{hint_id}/respond")
}
