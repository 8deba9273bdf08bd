//! One-shot HTTP subcommands: `hints`, `respond`, `kpis`, `history`,
//! `signal`. Results are printed as JSON on stdout.

use anyhow::{Context, bail};
use serde_json::{Value, json};
use trackside_core::analytics::HISTORICAL_METRICS;
use trackside_core::command::{HintResponse, HintVerdict, SignalStatusUpdate};
use trackside_sync::event::HintsOrigin;
use trackside_sync::http::MetricsSource;
use trackside_sync::poller::DEFAULT_COOLDOWN;
use trackside_sync::{PollingCoordinator, SyncEvent, event_channel};

use crate::cli::{ConnectionOpts, HintsOpts, HistoryOpts, KpisOpts, RespondOpts, SignalOpts};

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Fetch hints once, falling back to suggestions like the console does.
pub async fn cmd_hints(conn: &ConnectionOpts, opts: &HintsOpts) -> anyhow::Result<()> {
    let (events, mut rx) = event_channel(4);
    let poller = PollingCoordinator::new(conn.api_client()?, DEFAULT_COOLDOWN, events);
    poller.refresh(opts.recompute);

    match rx.recv().await {
        Some(SyncEvent::HintsUpdated(update)) => {
            let origin = match update.origin {
                HintsOrigin::Primary => "hints",
                HintsOrigin::Fallback => "suggestions",
            };
            print_json(&json!({
                "origin": origin,
                "hints": update.hints,
                "nextUpdate": update.next_update,
            }))
        }
        Some(SyncEvent::HintsFailed(error)) => bail!(error),
        other => bail!("unexpected hints result: {other:?}"),
    }
}

pub async fn cmd_respond(conn: &ConnectionOpts, opts: &RespondOpts) -> anyhow::Result<()> {
    let verdict = HintVerdict::from(opts.verdict);
    let override_action = match (&opts.action, verdict) {
        (Some(raw), _) => Some(
            serde_json::from_str::<Value>(raw).context("--action must be a JSON object")?,
        ),
        (None, HintVerdict::Override) => bail!("override needs --action"),
        (None, _) => None,
    };
    let body = HintResponse {
        response: verdict,
        override_action,
        user_id: opts.user.clone(),
        dismiss_minutes: opts.minutes.filter(|_| verdict == HintVerdict::Dismiss),
    };
    let reply = conn.api_client()?.respond_to_hint(&opts.hint_id, &body).await?;
    print_json(&reply)
}

pub async fn cmd_kpis(conn: &ConnectionOpts, opts: &KpisOpts) -> anyhow::Result<()> {
    let snapshot = conn.api_client()?.fetch_kpis(opts.range).await?;
    print_json(&snapshot)
}

pub async fn cmd_history(conn: &ConnectionOpts, opts: &HistoryOpts) -> anyhow::Result<()> {
    if !HISTORICAL_METRICS.contains(&opts.metric.as_str()) {
        tracing::warn!(metric = %opts.metric, "metric is not one the server is known to chart");
    }
    let series = conn
        .api_client()?
        .fetch_historical(&opts.metric, opts.period)
        .await?;
    print_json(&series)
}

pub async fn cmd_signal(conn: &ConnectionOpts, opts: &SignalOpts) -> anyhow::Result<()> {
    let update = SignalStatusUpdate {
        new_status: opts.status,
        reason: opts.reason.clone(),
        user_id: opts.user.clone(),
    };
    conn.api_client()?
        .set_signal_status(&opts.id, &update)
        .await
        .with_context(|| format!("setting signal {} to {}", opts.id, opts.status))?;
    println!("signal {} set to {}", opts.id, opts.status);
    Ok(())
}
