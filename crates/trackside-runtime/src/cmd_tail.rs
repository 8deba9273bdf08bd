//! `trackside tail`: follow the audit log without an RPC session.

use trackside_sync::event::DEFAULT_EVENT_CAPACITY;
use trackside_sync::{AuditTailer, TailerConfig, event_channel};

use crate::cli::{ConnectionOpts, TailOpts};
use crate::render::render;
use crate::shutdown::shutdown_signal;

/// Entry point for `trackside tail`.
pub async fn cmd_tail(conn: &ConnectionOpts, opts: &TailOpts) -> anyhow::Result<()> {
    let (events, mut rx) = event_channel(DEFAULT_EVENT_CAPACITY);
    let tailer = AuditTailer::new(conn.api_client()?, TailerConfig::default(), events);
    tailer.start(opts.since, opts.limit);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                break;
            }
            Some(event) = rx.recv() => {
                for line in render(&event) {
                    println!("{line}");
                }
            }
        }
    }

    if let Some(handle) = tailer.stop() {
        let _ = handle.await;
    }
    tracing::info!(cursor = tailer.cursor(), "tail stopped");
    Ok(())
}
