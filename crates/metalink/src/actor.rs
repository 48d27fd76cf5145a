//! Connection actor: an isolated Tokio task that owns one broker connection.
//!
//! Everything mutable about a connection lives here: the transport handle,
//! the request registry, the subscription ledger, the command queue, the
//! reconnection timer and the handshake bookkeeping. The outside world
//! reaches it only through [`CoreCommand`]s sent by
//! [`Connection`](crate::Connection) handles.
//!
//! Work that has to wait on I/O (dialing, reading frames, running service
//! handlers) happens on helper tasks. Helpers never touch actor state; they
//! post an [`Internal`] message back and the actor applies it. Each dial
//! starts a new epoch, and messages tagged with an older epoch are ignored,
//! so a slow reader of a dead socket can never disturb its successor.

use std::pin::Pin;
use std::sync::Arc;

use metalink_protocol::{Codec, Command, Envelope, ErrorBody, JsonCodec, RequestId, TypedValue, Value};
use metalink_transport::{Connection as Transport, Connector, TransportError};
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Sleep;

use crate::auth::AuthNegotiator;
use crate::dispatch::{self, Inbound, Invocation};
use crate::ledger::SubscriptionLedger;
use crate::queue::CommandQueue;
use crate::registry::RequestRegistry;
use crate::{
    ClientError, ConnectionConfig, ConnectionEvent, ConnectionState, HandlerError, ReconnectCause,
    ServiceHandler,
};

/// Reply channel for a command that can fail.
pub(crate) type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Commands sent to a connection actor through its channel.
pub(crate) enum CoreCommand {
    /// Activate the connection and dial `address`.
    Connect {
        address: String,
        secret: String,
        reply: Reply<()>,
    },

    /// Send a request and deliver its reply.
    Request {
        command: Command,
        params: Value,
        effect: LedgerEffect,
        reply: Reply<TypedValue>,
    },

    /// Report the current state.
    Inspect {
        reply: oneshot::Sender<ConnectionSnapshot>,
    },

    /// Close the connection for good.
    Close { reply: oneshot::Sender<()> },

    /// A caller stopped waiting for its reply.
    Prune,
}

/// What a successful reply does to the subscription ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LedgerEffect {
    None,
    Subscribe(String),
    Unsubscribe(String),
}

/// A point-in-time view of a connection's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Channels in the subscription ledger, in subscription order.
    pub subscriptions: Vec<String>,
    /// Frames buffered until the connection opens.
    pub queued_commands: usize,
    /// Requests waiting for a reply.
    pub pending_requests: usize,
}

impl ConnectionSnapshot {
    /// The view of a connection whose actor has stopped.
    pub(crate) fn closed() -> Self {
        Self {
            state: ConnectionState::Closed,
            subscriptions: Vec::new(),
            queued_commands: 0,
            pending_requests: 0,
        }
    }
}

/// What waits on an outstanding request id.
enum Pending {
    /// A caller of `send_request` or one of its wrappers.
    Caller {
        reply: Reply<TypedValue>,
        effect: LedgerEffect,
    },
    /// The auth request of one epoch.
    Auth { epoch: u64 },
    /// A ledger replay subscribe of one epoch.
    Resubscribe { epoch: u64, channel: String },
}

/// Messages from helper tasks to the actor.
enum Internal<T> {
    Dialed {
        epoch: u64,
        result: Result<T, TransportError>,
    },
    Frame {
        epoch: u64,
        frame: String,
    },
    /// The reader stopped. `None` means the peer closed cleanly.
    Dropped {
        epoch: u64,
        error: Option<TransportError>,
    },
    Handled {
        request_id: RequestId,
        outcome: Result<Option<TypedValue>, HandlerError>,
    },
}

/// Progress of the ledger replay that follows a successful auth.
struct Replay {
    epoch: u64,
    outstanding: usize,
    first_failure: Option<ClientError>,
}

enum Event<T> {
    Command(CoreCommand),
    Internal(Internal<T>),
    ReconnectDue,
    HandlesGone,
}

/// The internal connection state. Runs inside a Tokio task.
pub(crate) struct ConnectionCore<H, C: Connector> {
    service_name: String,
    handler: Arc<H>,
    connector: Arc<C>,
    config: ConnectionConfig,
    codec: JsonCodec,

    state: ConnectionState,
    /// Set by the first `connect`; requests are refused before that.
    activated: bool,
    address: Option<String>,
    auth: Option<AuthNegotiator>,
    epoch: u64,
    /// The current dial was started by the reconnection timer.
    redialing: bool,
    socket: Option<Arc<C::Connection>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    replay: Option<Replay>,
    connect_waiter: Option<Reply<()>>,

    registry: RequestRegistry<Pending>,
    ledger: SubscriptionLedger,
    queue: CommandQueue,

    events: broadcast::Sender<ConnectionEvent>,
    commands: mpsc::UnboundedReceiver<CoreCommand>,
    internal_tx: mpsc::UnboundedSender<Internal<C::Connection>>,
    internal_rx: mpsc::UnboundedReceiver<Internal<C::Connection>>,
}

/// Spawns a connection actor and returns the sender of its mailbox.
pub(crate) fn spawn_core<H: ServiceHandler, C: Connector>(
    service_name: String,
    handler: Arc<H>,
    connector: C,
    config: ConnectionConfig,
    events: broadcast::Sender<ConnectionEvent>,
) -> mpsc::UnboundedSender<CoreCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    let core = ConnectionCore::new(service_name, handler, connector, config, events, rx);
    tokio::spawn(core.run());
    tx
}

impl<H: ServiceHandler, C: Connector> ConnectionCore<H, C> {
    fn new(
        service_name: String,
        handler: Arc<H>,
        connector: C,
        config: ConnectionConfig,
        events: broadcast::Sender<ConnectionEvent>,
        commands: mpsc::UnboundedReceiver<CoreCommand>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            service_name,
            handler,
            connector: Arc::new(connector),
            config,
            codec: JsonCodec,
            state: ConnectionState::Disconnected,
            activated: false,
            address: None,
            auth: None,
            epoch: 0,
            redialing: false,
            socket: None,
            reconnect_timer: None,
            replay: None,
            connect_waiter: None,
            registry: RequestRegistry::new(),
            ledger: SubscriptionLedger::new(),
            queue: CommandQueue::new(),
            events,
            commands,
            internal_tx,
            internal_rx,
        }
    }

    /// Runs the actor loop until the connection is closed.
    async fn run(mut self) {
        tracing::debug!(service = %self.service_name, "connection actor started");

        while self.state != ConnectionState::Closed {
            let event = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => Event::Command(cmd),
                    None => Event::HandlesGone,
                },
                Some(msg) = self.internal_rx.recv() => Event::Internal(msg),
                () = reconnect_due(&mut self.reconnect_timer) => Event::ReconnectDue,
            };

            match event {
                Event::Command(cmd) => self.handle_command(cmd).await,
                Event::Internal(msg) => self.handle_internal(msg).await,
                Event::ReconnectDue => self.handle_reconnect_due(),
                Event::HandlesGone => {
                    tracing::debug!(service = %self.service_name, "all handles dropped");
                    self.shutdown().await;
                }
            }
        }

        self.reject_remaining_commands();
        tracing::debug!(service = %self.service_name, "connection actor stopped");
    }

    async fn handle_command(&mut self, cmd: CoreCommand) {
        match cmd {
            CoreCommand::Connect {
                address,
                secret,
                reply,
            } => {
                if self.state != ConnectionState::Disconnected {
                    let _ = reply.send(Err(ClientError::AlreadyConnected));
                    return;
                }
                self.activated = true;
                self.auth = Some(AuthNegotiator::new(self.service_name.clone(), secret));
                self.address = Some(address);
                self.connect_waiter = Some(reply);
                self.redialing = false;
                self.dial();
            }
            CoreCommand::Request {
                command,
                params,
                effect,
                reply,
            } => {
                if !self.activated {
                    let _ = reply.send(Err(ClientError::NotConnected));
                    return;
                }
                let request_id = self.registry.register(Pending::Caller { reply, effect });
                let envelope = Envelope::request(request_id.clone(), command, params);
                match self.codec.encode(&envelope) {
                    Ok(frame) => {
                        tracing::trace!(%request_id, %command, "request issued");
                        self.submit(frame).await;
                    }
                    Err(e) => {
                        if let Some(Pending::Caller { reply, .. }) = self.registry.take(&request_id) {
                            let _ = reply.send(Err(e.into()));
                        }
                    }
                }
            }
            CoreCommand::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
            CoreCommand::Close { reply } => {
                tracing::info!(service = %self.service_name, "close requested");
                self.shutdown().await;
                let _ = reply.send(());
            }
            CoreCommand::Prune => self.prune_registry(),
        }
    }

    async fn handle_internal(&mut self, msg: Internal<C::Connection>) {
        match msg {
            Internal::Dialed { epoch, result } => {
                if epoch != self.epoch || self.state != ConnectionState::Connecting {
                    tracing::debug!(epoch, "discarding stale dial result");
                    if let Ok(stale) = result {
                        tokio::spawn(async move {
                            let _ = stale.close().await;
                        });
                    }
                    return;
                }
                match result {
                    Ok(conn) => self.on_transport_open(conn).await,
                    Err(e) if e.is_refused() && self.config.reconnect => {
                        tracing::warn!(epoch, error = %e, "dial refused");
                        self.begin_reconnect(ReconnectCause::ConnectionRefused);
                    }
                    Err(e) if e.is_refused() => {
                        tracing::warn!(epoch, error = %e, "dial refused, reconnect disabled");
                        self.emit_connection_error(ClientError::Transport(e));
                        self.shutdown().await;
                    }
                    Err(e) if self.redialing => {
                        tracing::warn!(epoch, error = %e, "redial failed");
                        self.emit_connection_error(ClientError::Transport(e));
                        self.begin_reconnect(ReconnectCause::ConnectionLost);
                    }
                    Err(e) => {
                        tracing::warn!(epoch, error = %e, "dial failed");
                        self.state = ConnectionState::Disconnected;
                        self.emit_connection_error(ClientError::Transport(e));
                    }
                }
            }
            Internal::Frame { epoch, frame } => {
                if epoch == self.epoch && self.socket.is_some() {
                    self.handle_frame(&frame).await;
                }
            }
            Internal::Dropped { epoch, error } => {
                if epoch == self.epoch && self.socket.is_some() {
                    self.on_transport_closed(error).await;
                }
            }
            Internal::Handled {
                request_id,
                outcome,
            } => {
                let envelope = match outcome {
                    Ok(data) => Envelope::response(Some(request_id), data),
                    Err(e) => {
                        tracing::debug!(%request_id, error = %e, "handler failed");
                        Envelope::error(Some(request_id), e.into_body())
                    }
                };
                self.send_reply(&envelope).await;
            }
        }
    }

    // -- lifecycle ---------------------------------------------------------

    /// Starts a new epoch and dials the configured address.
    fn dial(&mut self) {
        let Some(address) = self.address.clone() else {
            return;
        };
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        let epoch = self.epoch;
        tracing::info!(%address, epoch, "connecting");

        let connector = Arc::clone(&self.connector);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&address).await;
            let _ = tx.send(Internal::Dialed { epoch, result });
        });
    }

    async fn on_transport_open(&mut self, conn: C::Connection) {
        let conn = Arc::new(conn);
        let epoch = self.epoch;
        tracing::info!(epoch, conn = %conn.id(), "transport open, authenticating");

        self.socket = Some(Arc::clone(&conn));
        self.state = ConnectionState::Authenticating;
        spawn_reader(conn, epoch, self.internal_tx.clone());

        let Some(auth) = &self.auth else {
            return;
        };
        let params = auth.request_params();
        let request_id = self.registry.register(Pending::Auth { epoch });
        self.send_direct(&Envelope::request(request_id, Command::Auth, params))
            .await;
    }

    async fn on_transport_closed(&mut self, error: Option<TransportError>) {
        self.socket = None;
        match error {
            Some(e) if e.is_connection_lost() && self.config.reconnect => {
                tracing::warn!(epoch = self.epoch, error = %e, "connection lost");
                self.begin_reconnect(ReconnectCause::ConnectionLost);
            }
            Some(e) => {
                tracing::warn!(epoch = self.epoch, error = %e, "connection lost, reconnect disabled");
                self.shutdown().await;
            }
            None => {
                tracing::info!(epoch = self.epoch, "peer closed the connection");
                self.shutdown().await;
            }
        }
    }

    fn begin_reconnect(&mut self, cause: ReconnectCause) {
        self.socket = None;
        self.replay = None;
        self.prune_registry();
        self.state = ConnectionState::Reconnecting;
        self.emit(ConnectionEvent::Reconnect(cause));
        self.schedule_reconnect();
    }

    /// Arms the reconnection timer unless one is already pending.
    fn schedule_reconnect(&mut self) {
        if self.reconnect_timer.is_some() {
            tracing::debug!("reconnect already scheduled");
            return;
        }
        let delay = self.config.reconnect_delay;
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn handle_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        if self.state == ConnectionState::Reconnecting {
            self.redialing = true;
            self.dial();
        }
    }

    /// Drops continuations nobody can complete: callers that stopped
    /// waiting, and handshake requests of a transport that is gone.
    fn prune_registry(&mut self) {
        let live_epoch = self.socket.as_ref().map(|_| self.epoch);
        let before = self.registry.len();
        self.registry.retain(|pending| match pending {
            Pending::Caller { reply, .. } => !reply.is_closed(),
            Pending::Auth { epoch } | Pending::Resubscribe { epoch, .. } => {
                Some(*epoch) == live_epoch
            }
        });
        let pruned = before - self.registry.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned request registry");
        }
    }

    /// Enters the terminal state. Pending continuations are dropped, so
    /// their callers observe [`ClientError::ConnectionClosed`].
    async fn shutdown(&mut self) {
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                tracing::debug!(error = %e, "closing transport failed");
            }
        }
        self.epoch += 1;
        self.reconnect_timer = None;
        self.replay = None;
        self.state = ConnectionState::Closed;
        self.ledger.clear();
        self.queue.clear();
        self.registry.clear();
        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Err(ClientError::ConnectionClosed));
        }
        tracing::info!(service = %self.service_name, "connection closed");
        self.emit(ConnectionEvent::Close);
    }

    fn reject_remaining_commands(&mut self) {
        self.commands.close();
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                CoreCommand::Connect { reply, .. } => {
                    let _ = reply.send(Err(ClientError::NotConnected));
                }
                CoreCommand::Request { reply, .. } => {
                    let _ = reply.send(Err(ClientError::NotConnected));
                }
                CoreCommand::Inspect { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                CoreCommand::Close { reply } => {
                    let _ = reply.send(());
                }
                CoreCommand::Prune => {}
            }
        }
    }

    // -- inbound -----------------------------------------------------------

    async fn handle_frame(&mut self, frame: &str) {
        match dispatch::classify(frame, &self.codec) {
            Inbound::Ignore => {}
            Inbound::Reply {
                request_id,
                outcome,
            } => self.resolve(request_id, outcome).await,
            Inbound::Invoke {
                request_id,
                invocation,
            } => self.invoke(request_id, invocation),
            Inbound::Reject { request_id, error } => {
                tracing::debug!(
                    request_id = ?request_id.as_ref().map(RequestId::as_str),
                    reason = %error.message,
                    "rejecting inbound frame"
                );
                self.send_reply(&Envelope::error(request_id, error)).await;
            }
        }
    }

    async fn resolve(&mut self, request_id: RequestId, outcome: Result<TypedValue, ErrorBody>) {
        let Some(pending) = self.registry.take(&request_id) else {
            tracing::debug!(%request_id, "dropping reply for unknown request");
            return;
        };
        match pending {
            Pending::Caller { reply, effect } => {
                if outcome.is_ok() {
                    self.apply(effect);
                }
                let _ = reply.send(outcome.map_err(ClientError::Remote));
            }
            Pending::Auth { epoch } => self.on_auth_reply(epoch, outcome).await,
            Pending::Resubscribe { epoch, channel } => {
                self.on_resubscribe_reply(epoch, channel, outcome).await;
            }
        }
    }

    fn apply(&mut self, effect: LedgerEffect) {
        match effect {
            LedgerEffect::None => {}
            LedgerEffect::Subscribe(channel) => self.ledger.insert(&channel),
            LedgerEffect::Unsubscribe(channel) => self.ledger.remove(&channel),
        }
    }

    fn invoke(&self, request_id: RequestId, invocation: Invocation) {
        tracing::debug!(%request_id, kind = invocation.kind(), "invoking handler");
        let handler = Arc::clone(&self.handler);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = invocation.run(handler.as_ref()).await;
            let _ = tx.send(Internal::Handled {
                request_id,
                outcome,
            });
        });
    }

    // -- post-auth sequence ------------------------------------------------

    async fn on_auth_reply(&mut self, epoch: u64, outcome: Result<TypedValue, ErrorBody>) {
        if epoch != self.epoch || self.state != ConnectionState::Authenticating {
            tracing::debug!(epoch, "dropping auth reply of an old epoch");
            return;
        }
        match outcome {
            Err(body) => {
                tracing::warn!(epoch, error = %body, "authentication rejected");
                self.emit_connection_error(ClientError::AuthRejected(body));
            }
            Ok(_) => {
                tracing::debug!(epoch, "authenticated");
                self.replay_subscriptions(epoch).await;
            }
        }
    }

    /// Re-subscribes every ledger channel at once, ahead of anything queued.
    async fn replay_subscriptions(&mut self, epoch: u64) {
        let channels = self.ledger.channels();
        if channels.is_empty() {
            self.finish_handshake().await;
            return;
        }

        tracing::info!(epoch, count = channels.len(), "replaying subscriptions");
        self.replay = Some(Replay {
            epoch,
            outstanding: channels.len(),
            first_failure: None,
        });
        for channel in channels {
            let params = json!({ "channel": channel });
            let request_id = self.registry.register(Pending::Resubscribe { epoch, channel });
            self.send_direct(&Envelope::request(request_id, Command::SrvSubscribe, params))
                .await;
        }
    }

    async fn on_resubscribe_reply(
        &mut self,
        epoch: u64,
        channel: String,
        outcome: Result<TypedValue, ErrorBody>,
    ) {
        let Some(replay) = self.replay.as_mut().filter(|r| r.epoch == epoch) else {
            tracing::debug!(epoch, %channel, "dropping resubscribe reply of an old epoch");
            return;
        };
        replay.outstanding = replay.outstanding.saturating_sub(1);
        if let Err(reason) = outcome {
            tracing::warn!(epoch, %channel, error = %reason, "resubscribe failed");
            if replay.first_failure.is_none() {
                replay.first_failure = Some(ClientError::ResubscribeFailed { channel, reason });
            }
        }
        if replay.outstanding > 0 {
            return;
        }

        if let Some(failure) = self.replay.take().and_then(|r| r.first_failure) {
            self.emit_connection_error(failure);
        }
        self.finish_handshake().await;
    }

    /// Drains the command queue in order, then declares the connection open.
    async fn finish_handshake(&mut self) {
        while let Some(frame) = self.queue.pop() {
            let Some(socket) = self.socket.clone() else {
                self.queue.push_front(frame);
                return;
            };
            if let Err(e) = socket.send(&frame).await {
                self.queue.push_front(frame);
                tracing::warn!(error = %e, remaining = self.queue.len(), "flush interrupted");
                self.emit_connection_error(ClientError::Transport(e));
                return;
            }
        }

        self.state = ConnectionState::Open;
        tracing::info!(epoch = self.epoch, service = %self.service_name, "connection open");
        self.emit(ConnectionEvent::Open);
        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Ok(()));
        }
    }

    // -- outbound ----------------------------------------------------------

    /// Sends a frame now if the connection is open, otherwise buffers it.
    ///
    /// Once anything is buffered, later frames queue behind it so the
    /// buffer keeps issue order.
    async fn submit(&mut self, frame: String) {
        let socket = match &self.socket {
            Some(socket) if self.state == ConnectionState::Open && self.queue.is_empty() => {
                Arc::clone(socket)
            }
            _ => {
                self.queue.push(frame);
                return;
            }
        };
        if let Err(e) = socket.send(&frame).await {
            tracing::warn!(error = %e, "send failed, buffering frame");
            self.queue.push(frame);
            self.emit_connection_error(ClientError::Transport(e));
        }
    }

    async fn send_reply(&mut self, envelope: &Envelope) {
        match self.codec.encode(envelope) {
            Ok(frame) => self.submit(frame).await,
            Err(e) => tracing::error!(error = %e, "failed to encode reply"),
        }
    }

    /// Sends a handshake frame straight to the transport, bypassing the
    /// queue.
    async fn send_direct(&mut self, envelope: &Envelope) {
        let frame = match self.codec.encode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode handshake request");
                return;
            }
        };
        let Some(socket) = self.socket.clone() else {
            return;
        };
        if let Err(e) = socket.send(&frame).await {
            tracing::warn!(error = %e, "handshake send failed");
            self.emit_connection_error(ClientError::Transport(e));
        }
    }

    // -- events ------------------------------------------------------------

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Broadcasts a connection error. The first one before the connection
    /// ever opened also fails the pending `connect`.
    fn emit_connection_error(&mut self, error: ClientError) {
        let error = Arc::new(error);
        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Err(ClientError::Connect(Arc::clone(&error))));
        }
        self.emit(ConnectionEvent::ConnectionError(error));
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            subscriptions: self.ledger.channels(),
            queued_commands: self.queue.len(),
            pending_requests: self.registry.len(),
        }
    }
}

/// Forwards inbound frames of one epoch until the transport ends.
fn spawn_reader<T: Transport>(
    conn: Arc<T>,
    epoch: u64,
    tx: mpsc::UnboundedSender<Internal<T>>,
) {
    tokio::spawn(async move {
        loop {
            match conn.recv().await {
                Ok(Some(frame)) => {
                    if tx.send(Internal::Frame { epoch, frame }).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(Internal::Dropped { epoch, error: None });
                    break;
                }
                Err(e) => {
                    let _ = tx.send(Internal::Dropped {
                        epoch,
                        error: Some(e),
                    });
                    break;
                }
            }
        }
    });
}

/// Completes when the reconnection timer fires; never, if none is armed.
async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
