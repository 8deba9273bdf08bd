//! Operator hints and the suggestions fallback.
//!
//! The primary endpoint (`GET /api/ai/hints`) returns [`HintsPayload`].
//! When it fails, `GET /api/suggestions` is schema-compatible enough to be
//! remapped into the same shape via [`SuggestionsPayload::into_hints`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HintPriority {
    High,
    Low,
    #[default]
    #[serde(other)]
    Medium,
}

impl HintPriority {
    /// Priority band for a suggestion score.
    pub fn from_score(score: f64) -> Self {
        if score >= 15.0 {
            Self::High
        } else if score < 5.0 {
            Self::Low
        } else {
            Self::Medium
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub priority: HintPriority,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub suggested_action: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintsPayload {
    #[serde(default)]
    pub hints: Vec<Hint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_update: Option<String>,
}

// ─── Suggestions fallback ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionAction {
    #[serde(default)]
    pub object: Value,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub actions: Vec<SuggestionAction>,
}

/// `GET /api/suggestions`. Older servers name the list `items`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsPayload {
    #[serde(default, alias = "items")]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

pub const FALLBACK_SOURCE: &str = "suggestions";
pub const FALLBACK_KIND: &str = "OPTIMIZATION";

impl Suggestion {
    /// Reshape into the hints schema. `timestamp` is used verbatim.
    pub fn into_hint(self, timestamp: &str) -> Hint {
        let suggested_action = match self.actions.into_iter().next() {
            Some(first) => json!({
                "type": first.action.to_uppercase(),
                "object": first.object,
                "params": first.params,
            }),
            None => Value::Object(Map::new()),
        };
        Hint {
            id: self.id,
            kind: FALLBACK_KIND.to_string(),
            priority: HintPriority::from_score(self.score),
            message: self.title,
            reasoning: self.reason,
            confidence: fallback_confidence(self.score),
            suggested_action,
            timestamp: Some(timestamp.to_string()),
            source: Some(FALLBACK_SOURCE.to_string()),
        }
    }
}

impl SuggestionsPayload {
    /// `fetched_at` stands in when the server omitted `generatedAt`.
    pub fn into_hints(self, fetched_at: &str) -> HintsPayload {
        let timestamp = self.generated_at.unwrap_or_else(|| fetched_at.to_string());
        HintsPayload {
            hints: self
                .suggestions
                .into_iter()
                .map(|s| s.into_hint(&timestamp))
                .collect(),
            next_update: None,
        }
    }
}

/// Truncating remainder: a score below -80 gives a negative confidence.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn fallback_confidence(score: f64) -> f64 {
    ((80.0 + score).trunc() as i64 % 100) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_bands() {
        assert_eq!(HintPriority::from_score(15.0), HintPriority::High);
        assert_eq!(HintPriority::from_score(30.5), HintPriority::High);
        assert_eq!(HintPriority::from_score(14.9), HintPriority::Medium);
        assert_eq!(HintPriority::from_score(5.0), HintPriority::Medium);
        assert_eq!(HintPriority::from_score(4.99), HintPriority::Low);
    }

    #[test]
    fn unknown_priority_reads_as_medium() {
        let hint: Hint =
            serde_json::from_value(json!({"id": "h1", "type": "SAFETY", "priority": "CRITICAL"}))
                .unwrap();
        assert_eq!(hint.priority, HintPriority::Medium);
        assert_eq!(hint.kind, "SAFETY");
    }

    #[test]
    fn priority_serializes_uppercase() {
        assert_eq!(serde_json::to_value(HintPriority::Low).unwrap(), json!("LOW"));
        assert_eq!(serde_json::to_value(HintPriority::Medium).unwrap(), json!("MEDIUM"));
        let low: HintPriority = serde_json::from_value(json!("LOW")).unwrap();
        assert_eq!(low, HintPriority::Low);
        assert_eq!(HintPriority::default(), HintPriority::Medium);
    }

    #[test]
    fn fallback_confidence_keeps_sign() {
        assert_eq!(fallback_confidence(-90.0), -10.0);
        assert_eq!(fallback_confidence(-80.0), 0.0);
        assert_eq!(fallback_confidence(25.7), 5.0);
    }

    #[test]
    fn hints_payload_parses_server_shape() {
        let payload: HintsPayload = serde_json::from_value(json!({
            "hints": [{
                "id": "h1",
                "type": "CONFLICT",
                "priority": "HIGH",
                "message": "Hold T12 at S4",
                "reasoning": "Headway breach",
                "confidence": 91,
                "suggestedAction": {"type": "HOLD", "object": "T12"}
            }],
            "nextUpdate": "2026-10-19T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(payload.hints.len(), 1);
        assert_eq!(payload.hints[0].priority, HintPriority::High);
        assert_eq!(payload.hints[0].confidence, 91.0);
        assert_eq!(payload.next_update.as_deref(), Some("2026-10-19T10:00:00Z"));
    }

    #[test]
    fn suggestion_remaps_into_hint() {
        let payload: SuggestionsPayload = serde_json::from_value(json!({
            "items": [{
                "id": "sg-3",
                "kind": "reroute",
                "title": "Reroute T4 via platform 2",
                "reason": "Platform 1 occupied",
                "score": 27.4,
                "actions": [{"object": "route:R7", "action": "activate", "params": {"persistent": true}}]
            }],
            "generatedAt": "2026-10-19T09:00:00Z"
        }))
        .unwrap();
        let hints = payload.into_hints("ignored").hints;
        let hint = &hints[0];
        assert_eq!(hint.id, "sg-3");
        assert_eq!(hint.kind, "OPTIMIZATION");
        assert_eq!(hint.priority, HintPriority::High);
        assert_eq!(hint.message, "Reroute T4 via platform 2");
        assert_eq!(hint.reasoning, "Platform 1 occupied");
        assert_eq!(hint.confidence, 7.0);
        assert_eq!(
            hint.suggested_action,
            json!({"type": "ACTIVATE", "object": "route:R7", "params": {"persistent": true}})
        );
        assert_eq!(hint.timestamp.as_deref(), Some("2026-10-19T09:00:00Z"));
        assert_eq!(hint.source.as_deref(), Some("suggestions"));
    }

    #[test]
    fn suggestion_without_actions_or_timestamp() {
        let payload: SuggestionsPayload = serde_json::from_value(json!({
            "suggestions": [{"id": "sg-1", "title": "Check S3", "score": 2}]
        }))
        .unwrap();
        let hints = payload.into_hints("2026-10-19T08:00:00Z").hints;
        assert_eq!(hints[0].priority, HintPriority::Low);
        assert_eq!(hints[0].confidence, 82.0);
        assert_eq!(hints[0].suggested_action, json!({}));
        assert_eq!(hints[0].timestamp.as_deref(), Some("2026-10-19T08:00:00Z"));
    }
}
