//! Wire messages exchanged with the simulation
//!
//! Every frame is a single JSON object. Inbound frames are tagged by `type`;
//! outbound actions carry an `action` field instead.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The fixed action vocabulary understood by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Wait,
    Survey,
    Mine,
    Repair,
    NavigateToBody,
    EnterOrbit,
    Land,
    Launch,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Wait,
        ActionKind::Survey,
        ActionKind::Mine,
        ActionKind::Repair,
        ActionKind::NavigateToBody,
        ActionKind::EnterOrbit,
        ActionKind::Land,
        ActionKind::Launch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Wait => "wait",
            ActionKind::Survey => "survey",
            ActionKind::Mine => "mine",
            ActionKind::Repair => "repair",
            ActionKind::NavigateToBody => "navigate_to_body",
            ActionKind::EnterOrbit => "enter_orbit",
            ActionKind::Land => "land",
            ActionKind::Launch => "launch",
        }
    }

    /// Look up a kind by its wire name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// One-line usage hint shown to the LLM
    pub fn usage(self) -> &'static str {
        match self {
            ActionKind::Wait => "do nothing",
            ActionKind::Survey => "scan current body (progressive detail levels 0-4)",
            ActionKind::Mine => "mine a resource (add \"resource\":\"iron\" etc)",
            ActionKind::Repair => "self-repair hull",
            ActionKind::NavigateToBody => {
                "move to body (add \"target_body_hi\":N, \"target_body_lo\":N)"
            }
            ActionKind::EnterOrbit => "enter orbit around current body",
            ActionKind::Land => "land on surface",
            ActionKind::Launch => "launch from surface to orbit",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources a probe can mine
pub const RESOURCES: [&str; 9] = [
    "iron",
    "silicon",
    "rare_earth",
    "water",
    "hydrogen",
    "helium3",
    "carbon",
    "uranium",
    "exotic",
];

/// An action sent to the simulation: a recognized kind plus kind-specific fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub action: ActionKind,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Action {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            params: Map::new(),
        }
    }

    /// The canonical no-op
    pub fn wait() -> Self {
        Self::new(ActionKind::Wait)
    }

    /// Build from a kind name and parameters; unknown kinds become `wait`
    pub fn from_parts(kind: &str, mut params: Map<String, Value>) -> Self {
        match ActionKind::parse(kind) {
            Some(action) => {
                params.remove("action");
                Self { action, params }
            }
            None => Self::wait(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn is_wait(&self) -> bool {
        self.action == ActionKind::Wait
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode action")
    }
}

/// Messages sent to the simulation other than actions
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register { probe_id: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode client message")
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Registration acknowledgment
    Registered { probe_id: Option<String> },
    /// One tick of observation
    Observe(Observation),
    /// Any other message kind; ignored by the session
    Other { kind: Option<String> },
}

impl ServerMessage {
    /// Decode a text frame. Fails only if the frame is not a JSON object.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("Frame is not valid JSON")?;
        let Value::Object(mut fields) = value else {
            anyhow::bail!("Frame is not a JSON object");
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => Some(kind),
            _ => None,
        };

        Ok(match kind.as_deref() {
            Some("observe") => ServerMessage::Observe(Observation { fields }),
            Some("registered") => ServerMessage::Registered {
                probe_id: fields.get("probe_id").and_then(id_string),
            },
            _ => ServerMessage::Other { kind },
        })
    }
}

/// Render a JSON id (string or number) as a probe identity
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A tick observation with its `type` tag removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    fields: Map<String, Value>,
}

impl Observation {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The simulation's own tick number, if present
    pub fn tick(&self) -> Option<u64> {
        self.fields.get("tick").and_then(Value::as_u64)
    }

    /// Probe self-state: the nested `self` object, or the top level when flattened
    pub fn self_state(&self) -> &Map<String, Value> {
        match self.fields.get("self") {
            Some(Value::Object(state)) => state,
            _ => &self.fields,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Pretty JSON handed to the decision service
    pub fn to_prompt_text(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_kind_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
        }
        assert_eq!(ActionKind::parse("warp"), None);
        assert_eq!(ActionKind::parse(""), None);
    }

    #[test]
    fn test_action_serializes_flat() {
        let action = Action::new(ActionKind::Mine).with_param("resource", "iron");
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"action": "mine", "resource": "iron"})
        );
        assert_eq!(Action::wait().to_json().unwrap(), r#"{"action":"wait"}"#);
    }

    #[test]
    fn test_action_from_unknown_kind_is_wait() {
        let mut params = Map::new();
        params.insert("speed".into(), json!(11));
        let action = Action::from_parts("warp", params);
        assert!(action.is_wait());
        assert!(action.params.is_empty());
    }

    #[test]
    fn test_register_message() {
        let msg = ClientMessage::Register {
            probe_id: "1-1".into(),
        };
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"register","probe_id":"1-1"}"#
        );
    }

    #[test]
    fn test_decode_registered() {
        let msg = ServerMessage::decode(r#"{"type":"registered","probe_id":"1-1"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Registered {
                probe_id: Some("1-1".into())
            }
        );

        let msg = ServerMessage::decode(r#"{"type":"registered","probe_id":42}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Registered {
                probe_id: Some("42".into())
            }
        );
    }

    #[test]
    fn test_decode_observe_strips_type() {
        let msg = ServerMessage::decode(
            r#"{"type":"observe","tick":7,"self":{"name":"Bob","hull":0.9},"system":{"planets":3}}"#,
        )
        .unwrap();
        let ServerMessage::Observe(obs) = msg else {
            panic!("expected observation");
        };
        assert_eq!(obs.tick(), Some(7));
        assert!(!obs.fields().contains_key("type"));
        assert_eq!(obs.self_state().get("name"), Some(&json!("Bob")));
        assert!(!obs.to_prompt_text().contains("observe"));
    }

    #[test]
    fn test_flat_self_state() {
        let msg = ServerMessage::decode(r#"{"type":"observe","tick":1,"name":"Riker"}"#).unwrap();
        let ServerMessage::Observe(obs) = msg else {
            panic!("expected observation");
        };
        assert_eq!(obs.self_state().get("name"), Some(&json!("Riker")));
    }

    #[test]
    fn test_decode_other_kinds() {
        assert_eq!(
            ServerMessage::decode(r#"{"type":"chat","text":"hi"}"#).unwrap(),
            ServerMessage::Other {
                kind: Some("chat".into())
            }
        );
        assert_eq!(
            ServerMessage::decode(r#"{"tick":3}"#).unwrap(),
            ServerMessage::Other { kind: None }
        );
        assert!(ServerMessage::decode("[1,2,3]").is_err());
        assert!(ServerMessage::decode("not json").is_err());
    }
}
