//! `trackside console`: the live operator session.
//!
//! This is the single consumer of the sync event channel. Workers (RPC
//! reader, audit tailer, hints poller, metric fetches) only ever report
//! through [`SyncEvent`]s; everything the console does in response happens
//! here, in arrival order. The session ends when the RPC channel closes
//! (there is no reconnect), on `quit`, or on ctrl-c/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use trackside_core::rpc::{Call, events};
use trackside_sync::event::DEFAULT_EVENT_CAPACITY;
use trackside_sync::rpc_channel::ResponseCallback;
use trackside_sync::{
    ApiClient, AuditTailer, ChannelState, EventSink, MetricsFetcher, PollingCoordinator,
    RpcChannel, SyncEvent, TailerConfig, event_channel,
};

use crate::config::ConsoleConfig;
use crate::input::{ConsoleInput, HELP, parse_input};
use crate::render::render;
use crate::shutdown::shutdown_signal;

/// Notifications printed by the console. Signal changes also refresh
/// the systems overview.
const FORWARDED_EVENTS: &[&str] = &[
    events::SIGNAL_STATUS_CHANGED,
    events::SIGNAL_ASPECT_CHANGED,
    events::ROUTE_ACTIVATED,
    events::ROUTE_DEACTIVATED,
    events::TRAIN_CHANGED,
];

const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Outcome {
    Quit,
    RpcLost(Option<String>),
}

struct Session {
    config: ConsoleConfig,
    events: EventSink,
    rpc: RpcChannel,
    hints: PollingCoordinator<ApiClient>,
    tailer: AuditTailer<ApiClient>,
    metrics: MetricsFetcher<ApiClient>,
    cancel: CancellationToken,
    tickers: Vec<JoinHandle<()>>,
    started: bool,
}

/// Entry point for `trackside console`.
pub async fn run_console(config: ConsoleConfig) -> anyhow::Result<()> {
    let (events, mut rx) = event_channel(DEFAULT_EVENT_CAPACITY);
    let api = Arc::new(ApiClient::new(config.api.clone())?);

    tracing::info!(url = %config.rpc.url, api = %api.base_url(), "console starting");
    let rpc = RpcChannel::connect(config.rpc.clone(), events.clone()).await?;

    let mut session = Session {
        hints: PollingCoordinator::new(Arc::clone(&api), config.hints_cooldown, events.clone()),
        tailer: AuditTailer::new(Arc::clone(&api), TailerConfig::default(), events.clone()),
        metrics: MetricsFetcher::new(api, events.clone()),
        config,
        events,
        rpc,
        cancel: CancellationToken::new(),
        tickers: Vec::new(),
        started: false,
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                break Outcome::Quit;
            }
            Some(event) = rx.recv() => {
                if let Some(outcome) = session.apply(event) {
                    break outcome;
                }
            }
            line = input.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    if let Some(outcome) = session.handle_line(&line) {
                        break outcome;
                    }
                }
                Ok(None) => input_open = false,
                Err(e) => {
                    tracing::warn!("stdin closed: {e}");
                    input_open = false;
                }
            },
        }
    };

    session.teardown().await;
    match outcome {
        Outcome::Quit => Ok(()),
        Outcome::RpcLost(reason) => Err(anyhow::anyhow!(
            "rpc session closed: {}",
            reason.as_deref().unwrap_or("connection lost")
        )),
    }
}

impl Session {
    fn apply(&mut self, event: SyncEvent) -> Option<Outcome> {
        for line in render(&event) {
            println!("{line}");
        }
        match event {
            SyncEvent::RpcReady => self.on_ready(),
            SyncEvent::RpcClosed { reason } => {
                tracing::error!(reason = reason.as_deref().unwrap_or("none"), "rpc session lost");
                return Some(Outcome::RpcLost(reason));
            }
            SyncEvent::Notification { name, .. }
                if name == events::SIGNAL_STATUS_CHANGED || name == events::SIGNAL_ASPECT_CHANGED =>
            {
                self.metrics.refresh_overview();
            }
            _ => {}
        }
        None
    }

    /// Bootstrap once the login is accepted: initial state, listeners and
    /// the background feeds.
    fn on_ready(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        self.send(Call::simulation_dump(), "simulation/dump");
        if let Err(e) = self.rpc.send_call(Call::renotify(), None) {
            tracing::warn!("renotify failed: {e}");
        }
        for name in FORWARDED_EVENTS {
            if let Err(e) = self.rpc.forward_notifications(name, self.events.clone()) {
                tracing::warn!(event = *name, "subscribe failed: {e}");
            }
        }

        self.tailer.start(self.config.since, self.config.audit_limit);
        self.tickers.push(
            self.hints
                .run_periodic(self.config.hints_interval, self.cancel.child_token()),
        );
        self.tickers.push(self.spawn_kpi_ticker());
        self.metrics.refresh_overview();
    }

    fn spawn_kpi_ticker(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let cancel = self.cancel.child_token();
        let period = self.config.kpi_interval;
        let range = self.config.time_range;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => metrics.refresh_kpis(range),
                }
            }
        })
    }

    fn handle_line(&mut self, line: &str) -> Option<Outcome> {
        let input = match parse_input(line) {
            Ok(Some(input)) => input,
            Ok(None) => return None,
            Err(message) => {
                println!("{message}");
                return None;
            }
        };
        match input {
            ConsoleInput::Rpc(command) => {
                if self.ready() {
                    let call = command.to_call();
                    let label = format!("{}/{}", call.object, call.action);
                    self.send(call, &label);
                }
            }
            ConsoleInput::Accept(id) => {
                if self.ready() {
                    if let Err(e) = self.hints.accept(&self.rpc, &id) {
                        println!("accept failed: {e}");
                    }
                }
            }
            ConsoleInput::Reject { id, minutes } => {
                if self.ready() {
                    if let Err(e) = self.hints.reject(&self.rpc, &id, minutes) {
                        println!("reject failed: {e}");
                    }
                }
            }
            ConsoleInput::Hints { recompute } => self.hints.refresh(recompute),
            ConsoleInput::Kpis(range) => self
                .metrics
                .refresh_kpis(range.unwrap_or(self.config.time_range)),
            ConsoleInput::History { metric, period } => {
                self.metrics.fetch_historical(&metric, period);
            }
            ConsoleInput::Overview => self.metrics.refresh_overview(),
            ConsoleInput::Help => println!("{HELP}"),
            ConsoleInput::Quit => return Some(Outcome::Quit),
        }
        None
    }

    fn ready(&self) -> bool {
        let ready = self.rpc.state() == ChannelState::Ready;
        if !ready {
            println!("rpc: not ready");
        }
        ready
    }

    /// Send `call`; its response comes back as [`SyncEvent::CommandReply`].
    fn send(&self, call: Call, label: &str) {
        let callback = reply_to(self.events.clone(), label.to_string());
        if let Err(e) = self.rpc.send_call(call, Some(callback)) {
            println!("{label} failed: {e}");
        }
    }

    async fn teardown(self) {
        self.cancel.cancel();
        self.rpc.remove_handlers();
        let tailer_done = self.tailer.stop();
        for handle in tailer_done.into_iter().chain(self.tickers) {
            if tokio::time::timeout(TEARDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("background task did not stop in time");
            }
        }
        self.rpc.close();
        tracing::info!("console stopped");
    }
}

/// The callback runs on the RPC reader task, which must not block, so the
/// reply is handed to a task that waits for room in the event channel.
fn reply_to(events: EventSink, label: String) -> ResponseCallback {
    Box::new(move |data| {
        tokio::spawn(async move {
            if events
                .send(SyncEvent::CommandReply { label, data })
                .await
                .is_err()
            {
                tracing::debug!("command reply dropped: console stopped");
            }
        });
    })
}
