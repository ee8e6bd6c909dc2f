//! Turns free-form LLM output into a well-formed action
//!
//! Models are asked for `{"action": ..., "monologue": ..., "reasoning": ...}`
//! but routinely wrap it in markdown fences or answer with the older
//! `{"actions": [{"type": ...}]}` shape. Anything that cannot be understood
//! degrades to `wait`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::protocol::Action;

/// The shape a decoded response object turned out to have
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// `{"action": "survey", ...params}`
    Direct {
        kind: String,
        params: Map<String, Value>,
    },
    /// `{"actions": [{"type": "mine", ...params}, ...]}`
    Legacy {
        kind: String,
        params: Map<String, Value>,
    },
    Unrecognized,
}

type ShapeDecoder = fn(&Map<String, Value>) -> Option<ResponseShape>;

/// Tried in order; the first decoder that matches wins
const DECODERS: [ShapeDecoder; 2] = [decode_direct, decode_legacy];

impl ResponseShape {
    pub fn decode(object: &Map<String, Value>) -> Self {
        DECODERS
            .iter()
            .find_map(|decode| decode(object))
            .unwrap_or(ResponseShape::Unrecognized)
    }

    /// Resolve to an action; unknown kinds become `wait`
    pub fn into_action(self) -> Action {
        match self {
            ResponseShape::Direct { kind, params } | ResponseShape::Legacy { kind, params } => {
                let action = Action::from_parts(&kind, params);
                if action.is_wait() && kind != "wait" {
                    debug!(kind = %kind, "Unrecognized action kind, falling back to wait");
                }
                action
            }
            ResponseShape::Unrecognized => Action::wait(),
        }
    }
}

fn decode_direct(object: &Map<String, Value>) -> Option<ResponseShape> {
    let kind = object.get("action")?.as_str()?.to_string();
    let mut params = object.clone();
    params.remove("action");
    Some(ResponseShape::Direct { kind, params })
}

fn decode_legacy(object: &Map<String, Value>) -> Option<ResponseShape> {
    let first = object.get("actions")?.as_array()?.first()?.as_object()?;
    let kind = first.get("type")?.as_str()?.to_string();
    let mut params = first.clone();
    params.remove("type");
    params.remove("action");
    Some(ResponseShape::Legacy { kind, params })
}

/// Strip a single markdown code fence wrapping the whole response
pub fn strip_code_fence(text: &str) -> &str {
    let mut clean = text.trim();
    if let Some(rest) = clean.strip_prefix("```") {
        // Drop the opening fence together with any language tag
        clean = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest,
        };
        if let Some(body) = clean.strip_suffix("```") {
            clean = body;
        }
        clean = clean.trim();
    }
    clean
}

/// Interpret a raw LLM response as `(action, monologue)`.
///
/// Never fails: unparseable text yields `wait` with an empty monologue, and
/// a parseable object without a usable action yields `wait` with whatever
/// monologue it carried.
pub fn interpret(raw: &str) -> (Action, String) {
    let clean = strip_code_fence(raw);

    let mut object = match serde_json::from_str::<Value>(clean) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            debug!("LLM response is not a JSON object");
            return (Action::wait(), String::new());
        }
        Err(e) => {
            debug!(error = %e, "LLM response is not valid JSON");
            return (Action::wait(), String::new());
        }
    };

    let monologue = match object.remove("monologue") {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    object.remove("reasoning");

    (ResponseShape::decode(&object).into_action(), monologue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ActionKind;
    use serde_json::json;

    fn as_json(action: &Action) -> Value {
        serde_json::to_value(action).unwrap()
    }

    #[test]
    fn test_direct_action_with_monologue() {
        let (action, monologue) = interpret(r#"{"action":"survey","monologue":"m"}"#);
        assert_eq!(action.action, ActionKind::Survey);
        assert_eq!(as_json(&action), json!({"action": "survey"}));
        assert_eq!(monologue, "m");
    }

    #[test]
    fn test_direct_action_keeps_params_drops_reasoning() {
        let (action, monologue) = interpret(
            r#"{"action":"navigate_to_body","target_body_hi":1,"target_body_lo":4,"reasoning":"closer","monologue":"Off we go."}"#,
        );
        assert_eq!(
            as_json(&action),
            json!({"action": "navigate_to_body", "target_body_hi": 1, "target_body_lo": 4})
        );
        assert_eq!(monologue, "Off we go.");
    }

    #[test]
    fn test_legacy_shape() {
        let (action, monologue) = interpret(r#"{"actions":[{"type":"mine","resource":"iron"}]}"#);
        assert_eq!(as_json(&action), json!({"action": "mine", "resource": "iron"}));
        assert_eq!(monologue, "");
    }

    #[test]
    fn test_legacy_shape_takes_first_entry() {
        let (action, monologue) = interpret(
            r#"{"actions":[{"type":"land"},{"type":"mine","resource":"water"}],"monologue":"Down."}"#,
        );
        assert_eq!(as_json(&action), json!({"action": "land"}));
        assert_eq!(monologue, "Down.");
    }

    #[test]
    fn test_fenced_json_matches_body() {
        let body = r#"{"action":"mine","resource":"helium3","monologue":"Fuel."}"#;
        let fenced = format!("```json\n{}\n```", body);
        assert_eq!(interpret(&fenced), interpret(body));

        let bare_fence = format!("```\n{}\n```", body);
        assert_eq!(interpret(&bare_fence), interpret(body));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_not_json() {
        let (action, monologue) = interpret("not json at all");
        assert!(action.is_wait());
        assert!(action.params.is_empty());
        assert_eq!(monologue, "");
    }

    #[test]
    fn test_no_action_field_keeps_monologue() {
        let (action, monologue) = interpret(r#"{"monologue":"Hmm.","reasoning":"unsure"}"#);
        assert_eq!(as_json(&action), json!({"action": "wait"}));
        assert_eq!(monologue, "Hmm.");
    }

    #[test]
    fn test_unknown_kind_becomes_wait() {
        let (action, _) = interpret(r#"{"action":"self_destruct","countdown":10}"#);
        assert_eq!(as_json(&action), json!({"action": "wait"}));

        let (action, _) = interpret(r#"{"actions":[{"type":"warp","factor":9}]}"#);
        assert_eq!(as_json(&action), json!({"action": "wait"}));
    }

    #[test]
    fn test_non_string_action_falls_through_to_legacy() {
        let (action, _) = interpret(r#"{"action":7,"actions":[{"type":"repair"}]}"#);
        assert_eq!(as_json(&action), json!({"action": "repair"}));
    }

    #[test]
    fn test_arbitrary_text_always_yields_known_kind() {
        let inputs = [
            "",
            "```",
            "``````",
            "[]",
            "null",
            "42",
            "\"survey\"",
            "{",
            "{}",
            r#"{"actions":[]}"#,
            r#"{"actions":"mine"}"#,
            r#"{"actions":[42]}"#,
            r#"{"actions":[{"type":null}]}"#,
            r#"{"action":null}"#,
            r#"{"monologue":5}"#,
            "```json\nnot even close\n```",
            "Sure! Here is my answer: {\"action\":\"land\"}",
        ];

        for input in inputs {
            let (action, _) = interpret(input);
            let encoded = as_json(&action);
            let kind = encoded["action"].as_str().unwrap();
            assert!(ActionKind::parse(kind).is_some(), "input {:?}", input);
            assert!(action.is_wait(), "input {:?}", input);
        }
    }

    #[test]
    fn test_response_shape_order() {
        let object = json!({"action": "land", "actions": [{"type": "launch"}]});
        let shape = ResponseShape::decode(object.as_object().unwrap());
        assert!(matches!(shape, ResponseShape::Direct { ref kind, .. } if kind == "land"));

        let object = json!({"note": "nothing here"});
        assert_eq!(
            ResponseShape::decode(object.as_object().unwrap()),
            ResponseShape::Unrecognized
        );
    }
}
