use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Keys the AI gateway is instructed to populate in every summary. Missing
/// keys are filled with `"N/A"` when a payload is accepted.
pub const SUMMARY_KEYS: &[&str] = &[
    "chief_complaint",
    "symptoms",
    "duration",
    "severity",
    "aggravating_factors",
    "alleviating_factors",
    "medications",
    "allergies",
    "past_medical_history",
    "priority_score",
    "summary_note",
];

pub const PRIORITY_KEY: &str = "priority_score";
pub const PRIORITY_MIN: i64 = 1;
pub const PRIORITY_MAX: i64 = 10;

const MISSING_VALUE: &str = "N/A";

/// Structured, AI-produced flat record describing a session's medical content
/// and urgency. Produced at most once per session and replaced wholesale when
/// regenerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary {
    fields: Map<String, Value>,
}

impl Summary {
    /// Parses an assistant reply into a summary. The model is told to emit a
    /// bare JSON object but routinely wraps it in Markdown code fences, so
    /// those are stripped first. Returns `None` (logging a warning, never
    /// raising) when the reply is not a flat object of scalar values carrying
    /// a `priority_score` key — the session then simply continues without a
    /// summary.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let cleaned = strip_code_fences(reply);

        let value: Value = match serde_json::from_str(cleaned) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "assistant reply is not valid JSON, leaving summary unset");
                return None;
            }
        };

        let Value::Object(mut fields) = value else {
            warn!("assistant reply is not a JSON object, leaving summary unset");
            return None;
        };

        if let Some((key, _)) = fields.iter().find(|(_, v)| v.is_object() || v.is_array()) {
            warn!(key = %key, "summary payload is not a flat mapping, leaving summary unset");
            return None;
        }

        if !fields.contains_key(PRIORITY_KEY) {
            warn!("summary payload carries no priority_score, leaving summary unset");
            return None;
        }

        for key in SUMMARY_KEYS {
            fields
                .entry(*key)
                .or_insert_with(|| Value::String(MISSING_VALUE.to_string()));
        }

        Some(Self { fields })
    }

    /// The declared priority, validated: an integer (or integer-valued string,
    /// since the field is externally supplied and untrusted) in
    /// [`PRIORITY_MIN`]..=[`PRIORITY_MAX`]. Anything else counts as absent and
    /// scores 0.
    pub fn priority_score(&self) -> i64 {
        let declared = match self.fields.get(PRIORITY_KEY) {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        declared
            .filter(|score| (PRIORITY_MIN..=PRIORITY_MAX).contains(score))
            .unwrap_or(0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Removes a surrounding ```json ... ``` (or bare ```) block if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}
