//! Command/response/notification channel over one websocket.
//!
//! Outbound requests get a per-channel id and an optional callback in the
//! pending table; the reader task removes the entry when the matching
//! response arrives and invokes the callback exactly once. Server
//! notifications are dispatched by name to handlers registered through
//! [`RpcChannel::register_handler`].
//!
//! ## States
//!
//! `Connecting -> LoggingIn -> Ready -> Closed`. `Closed` is terminal: the
//! channel never reconnects. Callbacks still pending at close are dropped
//! without being invoked, and [`SyncEvent::RpcClosed`] is emitted once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use trackside_core::rpc::{Call, InboundFrame, RequestId, is_status_ok, status_message};

use crate::error::SyncError;
use crate::event::{EventSink, SyncEvent};
use crate::lock;

pub type ResponseCallback = Box<dyn FnOnce(Value) + Send + 'static>;
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync + 'static>;

pub const DEFAULT_CLIENT_TYPE: &str = "client";
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// `ws://host:port/ws`
    pub url: String,
    pub token: String,
    pub client_type: String,
    /// Bounds both the socket handshake and the login response.
    pub handshake_timeout: Duration,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            client_type: DEFAULT_CLIENT_TYPE.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    LoggingIn,
    Ready,
    Closed,
}

enum Outbound {
    Frame(String),
    Close,
}

struct Shared {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, Option<ResponseCallback>>>,
    handlers: Mutex<HashMap<String, NotificationHandler>>,
    state: watch::Sender<ChannelState>,
    closed: AtomicBool,
    close_reason: Mutex<Option<String>>,
    events: EventSink,
}

/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct RpcChannel {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl RpcChannel {
    /// Open the socket and start the login handshake.
    ///
    /// Returns once the socket is open; readiness is reported later as
    /// [`SyncEvent::RpcReady`] (or [`SyncEvent::RpcClosed`] if the server
    /// refuses the token).
    pub async fn connect(config: RpcConfig, events: EventSink) -> Result<Self, SyncError> {
        let connecting = tokio_tungstenite::connect_async(config.url.as_str());
        let (ws, _response) = tokio::time::timeout(config.handshake_timeout, connecting)
            .await
            .map_err(|_| SyncError::Timeout("websocket connect"))??;
        tracing::info!(url = %config.url, "rpc: connected");

        let (sink, stream) = ws.split();
        let (channel, outbound_rx) = Self::detached(events);
        tokio::spawn(write_loop(
            sink,
            outbound_rx,
            Arc::clone(&channel.shared),
            channel.cancel.clone(),
        ));
        tokio::spawn(read_loop(
            stream,
            Arc::clone(&channel.shared),
            channel.cancel.clone(),
        ));
        channel.begin_login(&config);
        Ok(channel)
    }

    fn detached(events: EventSink) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            state,
            closed: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            events,
        });
        let channel = Self {
            shared,
            outbound,
            cancel: CancellationToken::new(),
        };
        (channel, outbound_rx)
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Queue `{id, object, action, params}` and remember `callback` under
    /// the new id. The callback runs on the reader task.
    pub fn send(
        &self,
        object: &str,
        action: &str,
        params: Option<Value>,
        callback: Option<ResponseCallback>,
    ) -> Result<RequestId, SyncError> {
        self.send_call(Call::new(object, action, params), callback)
    }

    pub fn send_call(
        &self,
        call: Call,
        callback: Option<ResponseCallback>,
    ) -> Result<RequestId, SyncError> {
        if self.is_closed() {
            return Err(SyncError::ChannelClosed);
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = call.into_frame(id);
        let text = serde_json::to_string(&frame)?;

        // Registered before transmit so a fast response always finds it.
        lock(&self.shared.pending).insert(id, callback);
        if self.is_closed() || self.outbound.send(Outbound::Frame(text)).is_err() {
            lock(&self.shared.pending).remove(&id);
            return Err(SyncError::ChannelClosed);
        }
        tracing::trace!(id, object = %frame.object, action = %frame.action, "rpc: request queued");
        Ok(id)
    }

    /// Send and hand back a receiver for the response payload. The
    /// receiver errors if the channel closes first.
    pub fn call(&self, call: Call) -> Result<oneshot::Receiver<Value>, SyncError> {
        let (tx, rx) = oneshot::channel();
        let callback: ResponseCallback = Box::new(move |data| {
            let _ = tx.send(data);
        });
        self.send_call(call, Some(callback))?;
        Ok(rx)
    }

    pub async fn request(&self, call: Call, timeout: Duration) -> Result<Value, SyncError> {
        let rx = self.call(call)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(SyncError::ChannelClosed),
            Err(_) => Err(SyncError::Timeout("rpc response")),
        }
    }

    /// Subscribe to `event` and route its notifications to `handler`.
    ///
    /// The subscription is fire-and-forget: the handler is stored whether
    /// or not the server acknowledges `addListener`.
    pub fn register_handler<F>(&self, event: &str, handler: F) -> Result<(), SyncError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        lock(&self.shared.handlers).insert(event.to_string(), Arc::new(handler));
        if let Err(e) = self.send_call(Call::add_listener(event), None) {
            lock(&self.shared.handlers).remove(event);
            return Err(e);
        }
        Ok(())
    }

    /// Register a handler that forwards `event` to `sink` as
    /// [`SyncEvent::Notification`].
    ///
    /// Handlers run on the reader task and cannot wait, so payloads are
    /// queued and a drain task awaits capacity on `sink`. Nothing is dropped
    /// while the consumer lags. The drain task ends once the handler is
    /// removed or the channel closes.
    pub fn forward_notifications(&self, event: &str, sink: EventSink) -> Result<(), SyncError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let name = event.to_string();
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let event = SyncEvent::Notification {
                    name: name.clone(),
                    payload,
                };
                if sink.send(event).await.is_err() {
                    break;
                }
            }
        });
        self.register_handler(event, move |payload| {
            let _ = tx.send(payload);
        })
    }

    /// Unsubscribe every registered event and clear the registry.
    pub fn remove_handlers(&self) {
        let names: Vec<String> = lock(&self.shared.handlers)
            .drain()
            .map(|(name, _)| name)
            .collect();
        for name in names {
            if let Err(e) = self.send_call(Call::remove_listener(&name), None) {
                tracing::debug!(event = %name, "rpc: unsubscribe skipped: {e}");
            }
        }
    }

    pub fn close(&self) {
        self.shutdown("closed by client".to_string());
    }

    fn shutdown(&self, reason: String) {
        lock(&self.shared.close_reason).get_or_insert(reason);
        let _ = self.outbound.send(Outbound::Close);
        self.cancel.cancel();
    }

    fn begin_login(&self, config: &RpcConfig) {
        self.shared.state.send_replace(ChannelState::LoggingIn);
        let channel = self.clone();
        let register = Call::register(&config.client_type, &config.token);
        let timeout = config.handshake_timeout;
        tokio::spawn(async move {
            match channel.request(register, timeout).await {
                Ok(data) if is_status_ok(&data) => {
                    let became_ready = channel.shared.state.send_if_modified(|state| {
                        if *state == ChannelState::LoggingIn {
                            *state = ChannelState::Ready;
                            true
                        } else {
                            false
                        }
                    });
                    if became_ready {
                        tracing::info!("rpc: login accepted");
                        let _ = channel.shared.events.send(SyncEvent::RpcReady).await;
                    }
                }
                Ok(data) => {
                    let message = status_message(&data);
                    tracing::error!(%message, "rpc: login rejected");
                    channel.shutdown(format!("login rejected: {message}"));
                }
                Err(SyncError::ChannelClosed) => {
                    tracing::debug!("rpc: channel closed during login");
                }
                Err(e) => {
                    tracing::error!("rpc: login failed: {e}");
                    channel.shutdown(format!("login failed: {e}"));
                }
            }
        });
    }
}

impl Shared {
    fn on_message(&self, raw: &str) {
        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("rpc: dropping malformed frame: {e}");
                return;
            }
        };
        match frame {
            InboundFrame::Response { id, data } => {
                let entry = lock(&self.pending).remove(&id);
                match entry {
                    Some(Some(callback)) => callback(data),
                    Some(None) => tracing::trace!(id, "rpc: response without callback"),
                    None => tracing::debug!(id, "rpc: response for unknown id dropped"),
                }
            }
            InboundFrame::Notification { name, object } => {
                let handler = lock(&self.handlers).get(&name).cloned();
                match handler {
                    Some(handler) => handler(object),
                    None => tracing::trace!(event = %name, "rpc: unhandled notification"),
                }
            }
        }
    }

    fn set_close_reason(&self, reason: String) {
        lock(&self.close_reason).get_or_insert(reason);
    }

    async fn close(&self, reason: Option<String>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let reason = lock(&self.close_reason).take().or(reason);
        self.state.send_replace(ChannelState::Closed);

        let abandoned: Vec<_> = lock(&self.pending).drain().collect();
        lock(&self.handlers).clear();
        tracing::info!(
            abandoned = abandoned.len(),
            reason = reason.as_deref().unwrap_or("connection closed"),
            "rpc: channel closed"
        );
        drop(abandoned);

        if self.events.send(SyncEvent::RpcClosed { reason }).await.is_err() {
            tracing::debug!("rpc: consumer gone before close signal");
        }
    }
}

async fn read_loop<S>(mut stream: S, shared: Arc<Shared>, cancel: CancellationToken)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => shared.on_message(&text),
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            }
        }
    };
    cancel.cancel();
    shared.close(reason).await;
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => None,
            out = outbound.recv() => out,
        };
        match next {
            Some(Outbound::Frame(text)) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!("rpc: write failed: {e}");
                    shared.set_close_reason(format!("write failed: {e}"));
                    cancel.cancel();
                    break;
                }
            }
            Some(Outbound::Close) | None => {
                let _ = sink.close().await;
                break;
            }
        }
    }
}
