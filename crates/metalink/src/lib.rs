//! # Metalink
//!
//! Reconnecting RPC and publish/subscribe client for Metalink brokers.
//!
//! A service holds a [`Connection`] to its broker. Through it the service
//! calls methods on other services, publishes to channels, subscribes to
//! them and feeds durable queues; in the other direction the broker routes
//! calls, publications and queue messages to the service's
//! [`ServiceHandler`].
//!
//! The connection survives network trouble on its own: after an abrupt
//! loss it redials on a fixed delay, authenticates again, re-subscribes
//! every channel it was subscribed to and then sends whatever was issued
//! while it was away, in issue order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use metalink::prelude::*;
//!
//! struct Quiet;
//!
//! impl ServiceHandler for Quiet {
//!     async fn handle_call(&self, _: String, _: String, _: Value) -> Result<TypedValue, HandlerError> {
//!         Err(HandlerError::with_code(501, "Not implemented."))
//!     }
//!     async fn handle_message(&self, _: String, _: Value) -> Result<Option<TypedValue>, HandlerError> {
//!         Ok(None)
//!     }
//!     async fn handle_queue_message(&self, _: String, _: Value) -> Result<bool, HandlerError> {
//!         Ok(true)
//!     }
//! }
//!
//! # async fn run() -> Result<(), ClientError> {
//! let conn = Connection::websocket("weather", Arc::new(Quiet), ConnectionConfig::default());
//! conn.connect("ws://127.0.0.1:7070", "secret").await?;
//! conn.subscribe("alerts").await?;
//! let forecast = conn
//!     .call("forecast", "daily", "today", serde_json::json!({ "city": "Oslo" }))
//!     .await?;
//! println!("{forecast:?}");
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

mod actor;
mod auth;
mod config;
mod connection;
mod dispatch;
mod error;
mod event;
mod handler;
mod ledger;
mod queue;
mod registry;

pub use actor::ConnectionSnapshot;
pub use auth::{AuthNegotiator, hour_bucket};
pub use config::{ConnectionConfig, ConnectionState};
pub use connection::Connection;
pub use error::{ClientError, HandlerError};
pub use event::{ConnectionEvent, ReconnectCause};
pub use handler::ServiceHandler;

pub use metalink_protocol as protocol;
pub use metalink_transport as transport;

/// Everything a hosting service usually needs.
pub mod prelude {
    pub use crate::{
        ClientError, Connection, ConnectionConfig, ConnectionEvent, ConnectionState,
        HandlerError, ReconnectCause, ServiceHandler,
    };
    pub use metalink_protocol::{
        ApiReference, ChannelReference, Command, ErrorBody, StorageReference, TypedValue, Value,
    };
}
