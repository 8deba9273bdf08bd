//! Append-only audit log items.
//!
//! Ids are assigned by the server in insertion order. Some server builds
//! serialize them as JSON strings (`"12"`), so the id is read leniently:
//! an integer or a numeric string. Anything else leaves the id empty and
//! the item bypasses cursor tracking.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// SSE event name carrying audit items.
pub const AUDIT_EVENT: &str = "audit";

/// Server-side cap on one backfill page.
pub const MAX_BACKFILL_LIMIT: u32 = 1000;

/// Default backfill page size.
pub const DEFAULT_BACKFILL_LIMIT: u32 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditItem {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub object: Value,
    #[serde(default)]
    pub details: Value,
}

/// `GET /api/audit/logs` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditPage {
    #[serde(default)]
    pub items: Vec<AuditItem>,
}

/// Clamp a requested backfill size into `1..=MAX_BACKFILL_LIMIT`.
pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_BACKFILL_LIMIT)
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_accepts_integer_and_numeric_string() {
        let a: AuditItem = serde_json::from_value(json!({"id": 12, "event": "ROUTE_SET"})).unwrap();
        let b: AuditItem = serde_json::from_value(json!({"id": " 13 "})).unwrap();
        assert_eq!(a.id, Some(12));
        assert_eq!(a.event, "ROUTE_SET");
        assert_eq!(b.id, Some(13));
    }

    #[test]
    fn unusable_id_is_empty() {
        let missing: AuditItem = serde_json::from_value(json!({"event": "X"})).unwrap();
        let negative: AuditItem = serde_json::from_value(json!({"id": -4})).unwrap();
        let word: AuditItem = serde_json::from_value(json!({"id": "abc"})).unwrap();
        let null: AuditItem = serde_json::from_value(json!({"id": null})).unwrap();
        assert_eq!(missing.id, None);
        assert_eq!(negative.id, None);
        assert_eq!(word.id, None);
        assert_eq!(null.id, None);
    }

    #[test]
    fn page_parses_full_item() {
        let page: AuditPage = serde_json::from_value(json!({
            "items": [{
                "id": "5",
                "timestamp": "2026-10-19T09:12:00Z",
                "event": "SIGNAL_OVERRIDE",
                "category": "signals",
                "severity": "WARN",
                "object": "S4",
                "details": {"from": "RED", "to": "GREEN"}
            }]
        }))
        .unwrap();
        let item = &page.items[0];
        assert_eq!(item.id, Some(5));
        assert_eq!(item.severity, "WARN");
        assert_eq!(item.details["to"], "GREEN");
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(500), 500);
        assert_eq!(clamp_limit(5000), MAX_BACKFILL_LIMIT);
    }
}
