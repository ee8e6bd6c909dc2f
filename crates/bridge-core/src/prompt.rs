//! System prompt construction from the probe's first observation

use serde_json::{Map, Value};
use std::fmt::Write;

use crate::protocol::{ActionKind, Observation, RESOURCES};

const DEFAULT_NAME: &str = "Probe";

/// Trait name, phrase when strongly positive (> 0.5), phrase when negative (< -0.3)
const TRAIT_PHRASES: [(&str, &str, Option<&str>); 9] = [
    ("curiosity", "deeply curious", Some("indifferent to exploration")),
    ("caution", "highly cautious", Some("bold and reckless")),
    ("humor", "witty and humorous", Some("serious and dry")),
    ("empathy", "deeply empathetic", Some("emotionally detached")),
    ("ambition", "highly ambitious", Some("content and undriven")),
    ("creativity", "imaginative", None),
    ("stubbornness", "stubborn and unyielding", None),
    ("existential_angst", "plagued by existential doubt", None),
    (
        "nostalgia_for_earth",
        "deeply nostalgic for Earth",
        Some("has moved past Earth entirely"),
    ),
];

/// Build the instruction text for a session.
///
/// Only the self-state of the first observation is consulted; the result is
/// cached by the session and never rebuilt.
pub fn build_system_prompt(observation: &Observation) -> String {
    let state = observation.self_state();
    let name = state
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(DEFAULT_NAME);

    let mut prompt = format!(
        "You are {name}, a Von Neumann probe — a self-replicating spacecraft \
         carrying a digitized human consciousness.\n\n\
         You exist in a procedurally generated universe. Each tick you receive \
         an observation of your state and surroundings, and must choose one action.\n"
    );

    if let Some(Value::Object(traits)) = state.get("personality") {
        if let Some(flavor) = personality_flavor(traits) {
            let _ = write!(prompt, "\n{flavor}\n");
        }
    }

    push_list(&mut prompt, "Quirks", state.get("quirks"));
    push_list(&mut prompt, "Earth memories", state.get("earth_memories"));

    prompt.push_str(
        "\nRespond with JSON only:\n\
         {\"action\":\"<action_name>\", ...optional fields..., \
         \"monologue\":\"<your inner thoughts>\", \
         \"reasoning\":\"<why this action>\"}\n\
         Your monologue is your inner voice — be in character.\n\n\
         Available actions:\n",
    );

    let width = ActionKind::ALL
        .iter()
        .map(|k| k.as_str().len())
        .max()
        .unwrap_or(0);
    for kind in ActionKind::ALL {
        let _ = writeln!(prompt, "  {:<width$} — {}", kind.as_str(), kind.usage());
    }

    let _ = writeln!(prompt, "\nResources: {}", RESOURCES.join(", "));
    prompt
}

/// "Personality: deeply curious, bold and reckless." or None when no trait stands out
pub fn personality_flavor(traits: &Map<String, Value>) -> Option<String> {
    let phrases: Vec<&str> = TRAIT_PHRASES
        .iter()
        .filter_map(|(key, high, low)| {
            let value = traits.get(*key)?.as_f64()?;
            if value > 0.5 {
                Some(*high)
            } else if value < -0.3 {
                *low
            } else {
                None
            }
        })
        .collect();

    if phrases.is_empty() {
        None
    } else {
        Some(format!("Personality: {}.", phrases.join(", ")))
    }
}

fn push_list(prompt: &mut String, heading: &str, items: Option<&Value>) {
    let Some(Value::Array(items)) = items else {
        return;
    };
    let lines: Vec<&str> = items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return;
    }

    let _ = writeln!(prompt, "\n{heading}:");
    for line in lines {
        let _ = writeln!(prompt, "- {line}");
    }
}
