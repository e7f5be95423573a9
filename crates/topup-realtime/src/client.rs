//! Reconnecting realtime channel client.

use crate::connection::{Connector, Outbound, SocketEvent};
use crate::messages::{IncomingMessage, OutboundMessage};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use topup_storage::TokenStore;
use tracing::{debug, info, warn};
use url::Url;

const NORMAL_CLOSURE: u16 = 1000;
const CLIENT_DISCONNECT: &str = "Client disconnect";

/// Channel client configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Realtime endpoint; the access token is appended as `?token=`.
    pub url: Url,
    pub auto_reconnect: bool,
    /// Delay before a reconnect, or the base delay with backoff.
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Double the delay on every attempt, up to `max_reconnect_delay`.
    pub exponential_backoff: bool,
    pub max_reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            auto_reconnect: true,
            reconnect_interval: Duration::from_millis(5000),
            max_reconnect_attempts: 10,
            exponential_backoff: false,
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.reconnect_interval;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnect_interval
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }

    fn endpoint(&self, token: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events emitted by the channel client.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    StateChanged(ConnectionState),
    Connected,
    Disconnected { code: u16, reason: String },
    Message(IncomingMessage),
    Error(String),
    ReconnectScheduled { attempt: u32, delay: Duration },
}

struct ActiveSocket {
    generation: u64,
    outgoing: mpsc::UnboundedSender<Outbound>,
    open: bool,
}

struct Shared {
    connection: ConnectionState,
    socket: Option<ActiveSocket>,
    generation: u64,
    reconnect_attempts: u32,
    reconnect_timer: Option<JoinHandle<()>>,
    /// Bumped whenever a pending reconnect must not fire.
    reconnect_epoch: u64,
    user_id: Option<String>,
}

struct Inner {
    config: ChannelConfig,
    tokens: Arc<TokenStore>,
    connector: Arc<dyn Connector>,
    events: broadcast::Sender<ChannelEvent>,
    shared: Mutex<Shared>,
}

/// Realtime channel client. Clones share one connection.
#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<Inner>,
}

impl ChannelClient {
    pub fn new(
        config: ChannelConfig,
        tokens: Arc<TokenStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                connector,
                events,
                shared: Mutex::new(Shared {
                    connection: ConnectionState::Disconnected,
                    socket: None,
                    generation: 0,
                    reconnect_attempts: 0,
                    reconnect_timer: None,
                    reconnect_epoch: 0,
                    user_id: None,
                }),
            }),
        }
    }

    /// Subscribe to channel events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect_attempts
    }

    /// Open the connection with the stored access token.
    ///
    /// No-op while a connection is open or being opened, and when no
    /// access token is stored.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Close the connection with the normal closure code. Cancels any
    /// pending reconnect. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Serialize and send `payload` if the connection is open.
    ///
    /// Returns whether the frame was handed to the socket. Nothing is
    /// queued while disconnected.
    pub fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let shared = self.inner.shared.lock();
        let Some(socket) = shared.socket.as_ref().filter(|socket| socket.open) else {
            warn!("Cannot send message, not connected");
            return false;
        };
        match serde_json::to_string(payload) {
            Ok(text) => socket.outgoing.send(Outbound::Text(text)).is_ok(),
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                false
            }
        }
    }

    /// Identity for the per-user channel subscription. Subscribes at once
    /// when already connected.
    pub fn set_user_id(&self, user_id: Option<String>) {
        let mut shared = self.inner.shared.lock();
        shared.user_id = user_id;
        if shared.socket.as_ref().is_some_and(|socket| socket.open) {
            subscribe_user(&shared);
        }
    }

    /// Connect while `authenticated` is true and disconnect otherwise.
    pub fn bind_auth_state(&self, mut authenticated: watch::Receiver<bool>) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let active = *authenticated.borrow_and_update();
                let Some(client) = inner.upgrade() else {
                    break;
                };
                if active {
                    client.connect();
                } else {
                    client.disconnect();
                }
                drop(client);

                if authenticated.changed().await.is_err() {
                    if let Some(client) = inner.upgrade() {
                        client.disconnect();
                    }
                    break;
                }
            }
        })
    }
}

impl Inner {
    fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, shared: &mut Shared, state: ConnectionState) {
        if shared.connection != state {
            shared.connection = state;
            self.emit(ChannelEvent::StateChanged(state));
        }
    }

    fn connect(self: &Arc<Self>) {
        let mut shared = self.shared.lock();
        shared.reconnect_epoch += 1;
        self.connect_locked(&mut shared);
    }

    /// Fire a scheduled reconnect unless it was superseded since.
    fn fire_reconnect(self: &Arc<Self>, epoch: u64) {
        let mut shared = self.shared.lock();
        if shared.reconnect_epoch != epoch {
            debug!("Stale reconnect timer ignored");
            return;
        }
        shared.reconnect_timer = None;
        self.connect_locked(&mut shared);
    }

    fn connect_locked(self: &Arc<Self>, shared: &mut Shared) {
        if shared.socket.is_some() {
            debug!("Realtime connection already open or opening");
            return;
        }

        let Some(token) = self.tokens.access_token() else {
            warn!("No access token available, not connecting");
            return;
        };

        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }

        shared.generation += 1;
        let generation = shared.generation;
        let handle = self.connector.open(&self.config.endpoint(&token));
        shared.socket = Some(ActiveSocket {
            generation,
            outgoing: handle.outgoing,
            open: false,
        });
        self.set_state(shared, ConnectionState::Connecting);
        info!(url = %self.config.url, generation, "Connecting to realtime channel");

        tokio::spawn(pump(Arc::downgrade(self), generation, handle.events));
    }

    fn disconnect(&self) {
        let mut shared = self.shared.lock();
        shared.reconnect_epoch += 1;
        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
            debug!("Pending reconnect cancelled");
        }

        if let Some(socket) = shared.socket.take() {
            let _ = socket.outgoing.send(Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: CLIENT_DISCONNECT.to_string(),
            });
            info!("Disconnected from realtime channel");
        }

        if shared.connection != ConnectionState::Disconnected {
            self.set_state(&mut shared, ConnectionState::Disconnected);
            self.emit(ChannelEvent::Disconnected {
                code: NORMAL_CLOSURE,
                reason: CLIENT_DISCONNECT.to_string(),
            });
        }
    }

    /// Apply one socket event. Returns false once the socket is finished
    /// or has been replaced.
    fn handle_socket_event(self: &Arc<Self>, generation: u64, event: SocketEvent) -> bool {
        let mut shared = self.shared.lock();
        if !shared
            .socket
            .as_ref()
            .is_some_and(|socket| socket.generation == generation)
        {
            debug!(generation, "Ignoring event from a replaced socket");
            return false;
        }

        match event {
            SocketEvent::Opened => {
                if let Some(socket) = shared.socket.as_mut() {
                    socket.open = true;
                }
                shared.reconnect_attempts = 0;
                self.set_state(&mut shared, ConnectionState::Connected);
                self.emit(ChannelEvent::Connected);
                info!("Realtime channel connected");
                subscribe_user(&shared);
            }
            SocketEvent::Text(text) => match IncomingMessage::parse(&text) {
                Ok(message) => {
                    debug!(kind = message.payload.kind(), "Realtime message");
                    self.emit(ChannelEvent::Message(message));
                }
                Err(e) => warn!(error = %e, "Dropping unparseable realtime frame"),
            },
            SocketEvent::Error(error) => {
                warn!(error = %error, "Realtime connection error");
                self.set_state(&mut shared, ConnectionState::Error);
                self.emit(ChannelEvent::Error(error));
            }
            SocketEvent::Closed { code, reason } => {
                shared.socket = None;
                self.set_state(&mut shared, ConnectionState::Disconnected);
                self.emit(ChannelEvent::Disconnected {
                    code,
                    reason: reason.clone(),
                });
                info!(code, reason = %reason, "Realtime channel closed");
                self.schedule_reconnect(&mut shared, code);
                return false;
            }
        }
        true
    }

    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared, code: u16) {
        if !self.config.auto_reconnect || code == NORMAL_CLOSURE {
            return;
        }
        if shared.reconnect_attempts >= self.config.max_reconnect_attempts {
            warn!(
                attempts = shared.reconnect_attempts,
                "Max reconnect attempts reached"
            );
            return;
        }

        shared.reconnect_attempts += 1;
        let attempt = shared.reconnect_attempts;
        let delay = self.config.delay_for_attempt(attempt);
        info!(
            attempt,
            max = self.config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        self.emit(ChannelEvent::ReconnectScheduled { attempt, delay });

        let inner = Arc::downgrade(self);
        let epoch = shared.reconnect_epoch;
        shared.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire_reconnect(epoch);
            }
        }));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut();
        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(socket) = shared.socket.take() {
            let _ = socket.outgoing.send(Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: CLIENT_DISCONNECT.to_string(),
            });
        }
    }
}

fn subscribe_user(shared: &Shared) {
    let (Some(user_id), Some(socket)) = (shared.user_id.as_deref(), shared.socket.as_ref()) else {
        return;
    };
    match serde_json::to_string(&OutboundMessage::subscribe_user(user_id)) {
        Ok(frame) => {
            let _ = socket.outgoing.send(Outbound::Text(frame));
            debug!(user_id, "Subscribed to user channel");
        }
        Err(e) => warn!(error = %e, "Failed to encode subscription"),
    }
}

async fn pump(inner: Weak<Inner>, generation: u64, mut events: mpsc::UnboundedReceiver<SocketEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.handle_socket_event(generation, event) {
            break;
        }
    }
}
