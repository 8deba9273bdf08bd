//! Line-oriented rendering of sync events for the terminal.

use serde_json::Value;
use trackside_core::analytics::KpiSnapshot;
use trackside_core::audit::AuditItem;
use trackside_core::rpc::{is_status_ok, status_message};
use trackside_sync::SyncEvent;
use trackside_sync::event::{HintsOrigin, HintsUpdate, StreamStatus};

const MAX_INLINE_JSON: usize = 160;

/// One event as zero or more output lines.
pub fn render(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::RpcReady => vec!["rpc: ready".to_string()],
        SyncEvent::RpcClosed { reason } => vec![format!(
            "rpc: closed ({})",
            reason.as_deref().unwrap_or("no reason given")
        )],
        SyncEvent::Notification { name, payload } => {
            vec![format!("notify: {name} {}", compact(payload))]
        }
        SyncEvent::CommandReply { label, data } => {
            vec![format!("reply: {label} {}", reply_summary(data))]
        }
        SyncEvent::HintsUpdated(update) => hints_lines(update),
        SyncEvent::HintsFailed(error) => vec![format!("hints: {error}")],
        SyncEvent::AuditBatch(items) => items.iter().map(audit_line).collect(),
        SyncEvent::AuditItem(item) => vec![audit_line(item)],
        SyncEvent::AuditStream(StreamStatus::Connected) => {
            vec!["audit: stream connected".to_string()]
        }
        SyncEvent::AuditStream(StreamStatus::Disconnected) => {
            vec!["audit: stream disconnected".to_string()]
        }
        SyncEvent::AuditError(error) => vec![format!("audit: {error}")],
        SyncEvent::Kpis(snapshot) => vec![kpi_line(snapshot)],
        SyncEvent::Historical(series) => {
            let last = series
                .values
                .last()
                .map(|v| format!(", last {v}"))
                .unwrap_or_default();
            vec![format!(
                "history: {} {} {} points{last}",
                series.metric,
                series.period,
                series.values.len()
            )]
        }
        SyncEvent::Overview(overview) => vec![format!("overview: {}", compact(overview))],
        SyncEvent::MetricsFailed { key, error } => vec![format!("metrics: {key} failed: {error}")],
    }
}

fn hints_lines(update: &HintsUpdate) -> Vec<String> {
    let origin = match update.origin {
        HintsOrigin::Primary => "hints",
        HintsOrigin::Fallback => "suggestions fallback",
    };
    let mut lines = vec![format!(
        "hints: {} from {origin}{}",
        update.hints.len(),
        if update.recompute { " (recomputed)" } else { "" }
    )];
    for hint in &update.hints {
        let priority = format!("{:?}", hint.priority).to_uppercase();
        lines.push(format!(
            "  {priority:<6} {} {} ({}%)",
            hint.id, hint.message, hint.confidence
        ));
    }
    lines
}

fn audit_line(item: &AuditItem) -> String {
    let id = item.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let mut line = format!("audit: #{id}");
    for part in [
        item.timestamp.as_deref().unwrap_or_default(),
        item.severity.as_str(),
        item.event.as_str(),
        item.category.as_str(),
    ] {
        if !part.is_empty() {
            line.push(' ');
            line.push_str(part);
        }
    }
    line
}

fn kpi_line(snapshot: &KpiSnapshot) -> String {
    let range = snapshot.time_range.as_deref().unwrap_or("?");
    let mut line = format!("kpis[{range}]:");
    for (name, value) in &snapshot.kpis {
        line.push_str(&format!(" {name}={}", compact(value)));
        if let Some(delta) = snapshot.trends.get(name).and_then(|t| t.signed_delta()) {
            line.push_str(&format!(" ({delta:+})"));
        }
    }
    line
}

fn reply_summary(data: &Value) -> String {
    if data.get("status").is_none() {
        return compact(data);
    }
    if is_status_ok(data) {
        "OK".to_string()
    } else {
        format!("failed: {}", status_message(data))
    }
}

fn compact(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_INLINE_JSON {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_INLINE_JSON).collect();
    cut.push_str("...");
    cut
}
