//! The `Connection` handle: what a hosting service holds and calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metalink_protocol::{Command, TypedValue, Value};
use metalink_transport::Connector;
#[cfg(feature = "websocket")]
use metalink_transport::WebSocketConnector;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::actor::{self, ConnectionSnapshot, CoreCommand, LedgerEffect};
use crate::{ClientError, ConnectionConfig, ConnectionEvent, ConnectionState, ServiceHandler};

/// Handle to a running connection actor.
///
/// Cheap to clone: every clone talks to the same connection. Each
/// operation is queued with the actor when it is called, not when its
/// future is first polled, so calls keep their program order even when
/// the returned futures are awaited out of order or on different tasks.
///
/// Dropping every clone shuts the connection down.
#[derive(Clone)]
pub struct Connection {
    service_name: Arc<str>,
    commands: mpsc::UnboundedSender<CoreCommand>,
    events: broadcast::Sender<ConnectionEvent>,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection for `service_name` and starts its actor.
    ///
    /// Nothing is dialed until [`connect`](Self::connect). Must be called
    /// from within a Tokio runtime.
    pub fn new<H: ServiceHandler, C: Connector>(
        service_name: &str,
        handler: Arc<H>,
        connector: C,
        config: ConnectionConfig,
    ) -> Self {
        let config = config.validated();
        let (events, _) = broadcast::channel(config.event_capacity);
        let request_timeout = config.request_timeout;
        let commands = actor::spawn_core(
            service_name.to_owned(),
            handler,
            connector,
            config,
            events.clone(),
        );
        Self {
            service_name: Arc::from(service_name),
            commands,
            events,
            request_timeout,
        }
    }

    /// Creates a connection that dials brokers over WebSocket.
    #[cfg(feature = "websocket")]
    pub fn websocket<H: ServiceHandler>(
        service_name: &str,
        handler: Arc<H>,
        config: ConnectionConfig,
    ) -> Self {
        Self::new(service_name, handler, WebSocketConnector, config)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Subscribes to lifecycle events emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Dials `address`, authenticates with `secret` and waits until the
    /// connection is open.
    ///
    /// Fails with [`ClientError::Connect`] carrying the first connection
    /// error (rejected auth, failed resubscribe, failed dial) if one happens
    /// before the connection opens, and with
    /// [`ClientError::AlreadyConnected`] unless the connection is
    /// disconnected. A refused dial does not fail it: the connection keeps
    /// retrying and this resolves once a later attempt opens.
    pub fn connect(
        &self,
        address: &str,
        secret: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send + use<> {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .commands
            .send(CoreCommand::Connect {
                address: address.to_owned(),
                secret: secret.to_owned(),
                reply,
            })
            .is_ok();
        async move {
            if !sent {
                return Err(ClientError::NotConnected);
            }
            rx.await.map_err(|_| ClientError::ConnectionClosed)?
        }
    }

    /// Closes the connection for good.
    ///
    /// Resolves after the close event was emitted. Pending requests fail
    /// with [`ClientError::ConnectionClosed`]; later operations fail with
    /// [`ClientError::NotConnected`]. Closing twice is harmless.
    pub fn close(&self) -> impl Future<Output = ()> + Send + use<> {
        let (reply, rx) = oneshot::channel();
        let sent = self.commands.send(CoreCommand::Close { reply }).is_ok();
        async move {
            if sent {
                let _ = rx.await;
            }
        }
    }

    /// Sends `command` with `params` and waits for the reply.
    ///
    /// Sent right away while the connection is open, buffered otherwise.
    /// Fails with [`ClientError::NotConnected`] if `connect` was never
    /// called or the connection is closed.
    pub fn send_request(
        &self,
        command: Command,
        params: Value,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        self.request(command, params, LedgerEffect::None)
    }

    fn request(
        &self,
        command: Command,
        params: Value,
        effect: LedgerEffect,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .commands
            .send(CoreCommand::Request {
                command,
                params,
                effect,
                reply,
            })
            .is_ok();
        let timeout = self.request_timeout;
        let commands = self.commands.clone();
        async move {
            if !sent {
                return Err(ClientError::NotConnected);
            }
            let received = match timeout {
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(received) => received,
                    Err(_) => {
                        let _ = commands.send(CoreCommand::Prune);
                        return Err(ClientError::Timeout);
                    }
                },
                None => rx.await,
            };
            received.map_err(|_| ClientError::ConnectionClosed)?
        }
    }

    // -- convenience operations ---------------------------------------------

    /// Calls `method` on `endpoint` of another service.
    ///
    /// `Value::Null` params are sent as an empty object.
    pub fn call(
        &self,
        service: &str,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        let params = if params.is_null() { json!({}) } else { params };
        self.send_request(
            Command::SrvCall,
            json!({
                "service": service,
                "endpoint": endpoint,
                "method": method,
                "params": params,
            }),
        )
    }

    /// Subscribes to `channel`. On success the channel joins the
    /// subscription ledger and is re-subscribed after every reconnect.
    pub fn subscribe(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        self.request(
            Command::SrvSubscribe,
            json!({ "channel": channel }),
            LedgerEffect::Subscribe(channel.to_owned()),
        )
    }

    /// Unsubscribes from `channel` and, on success, drops it from the
    /// ledger.
    pub fn unsubscribe(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        self.request(
            Command::SrvUnsubscribe,
            json!({ "channel": channel }),
            LedgerEffect::Unsubscribe(channel.to_owned()),
        )
    }

    pub fn publish(
        &self,
        channel: &str,
        message: Value,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        self.send_request(
            Command::SrvPublish,
            json!({ "channel": channel, "message": message }),
        )
    }

    /// Lists the subscribers of `channel`.
    pub fn subscribers(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        self.send_request(Command::SrvSubscribers, json!({ "channel": channel }))
    }

    /// Starts receiving messages from the durable queue `queue`.
    pub fn subscribe_queue(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        self.send_request(Command::SrvSubscribeQueue, json!({ "queue": queue }))
    }

    pub fn unsubscribe_queue(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        self.send_request(Command::SrvUnsubscribeQueue, json!({ "queue": queue }))
    }

    /// Puts `message` on `queue`, optionally expiring after `ttl` seconds.
    pub fn enqueue(
        &self,
        queue: &str,
        message: Value,
        ttl: Option<u64>,
    ) -> impl Future<Output = Result<TypedValue, ClientError>> + Send + use<> {
        let mut params = json!({ "queue": queue, "message": message });
        if let (Some(ttl), Some(map)) = (ttl, params.as_object_mut()) {
            map.insert("ttl".to_owned(), json!(ttl));
        }
        self.send_request(Command::SrvEnqueue, params)
    }

    // -- introspection -------------------------------------------------------

    /// Current bookkeeping of the connection.
    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(CoreCommand::Inspect { reply }).is_err() {
            return ConnectionSnapshot::closed();
        }
        rx.await.unwrap_or_else(|_| ConnectionSnapshot::closed())
    }

    pub async fn state(&self) -> ConnectionState {
        self.snapshot().await.state
    }

    /// Channels in the subscription ledger.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.snapshot().await.subscriptions
    }

    /// Number of frames waiting for the connection to open.
    pub async fn queued_commands(&self) -> usize {
        self.snapshot().await.queued_commands
    }

    /// Number of requests waiting for a reply.
    pub async fn pending_requests(&self) -> usize {
        self.snapshot().await.pending_requests
    }
}
