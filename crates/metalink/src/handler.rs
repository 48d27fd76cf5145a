//! Hooks through which the broker reaches the hosting service.
//!
//! A Metalink connection is bidirectional: besides making calls, the
//! service receives method calls, channel publications, and queue
//! messages routed to it by the broker. The connection doesn't know what
//! to do with them, so the hosting service supplies a [`ServiceHandler`].

use std::future::Future;

use metalink_protocol::{TypedValue, Value};

use crate::HandlerError;

/// Receives inbound calls and messages for a service.
///
/// Each invocation gets its own owned copy of the params or message, so a
/// handler may mutate what it receives freely. Invocations run on spawned
/// tasks and may overlap; whatever they return is sent back to the broker
/// as the reply to the inbound request.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one handler is shared by every invocation
///   through an `Arc`, possibly on different worker threads.
///
/// # Example
///
/// ```rust
/// use metalink::{HandlerError, ServiceHandler};
/// use metalink_protocol::{TypedValue, Value};
///
/// struct Echo;
///
/// impl ServiceHandler for Echo {
///     async fn handle_call(
///         &self,
///         _endpoint: String,
///         method: String,
///         params: Value,
///     ) -> Result<TypedValue, HandlerError> {
///         match method.as_str() {
///             "echo" => Ok(TypedValue::Plain(params)),
///             _ => Err(HandlerError::with_code(404, "Method not found.")),
///         }
///     }
///
///     async fn handle_message(
///         &self,
///         _channel: String,
///         _message: Value,
///     ) -> Result<Option<TypedValue>, HandlerError> {
///         Ok(None)
///     }
///
///     async fn handle_queue_message(
///         &self,
///         _queue: String,
///         _message: Value,
///     ) -> Result<bool, HandlerError> {
///         Ok(true)
///     }
/// }
/// ```
pub trait ServiceHandler: Send + Sync + 'static {
    /// A remote method call addressed to this service.
    ///
    /// `params` defaults to an empty object when the caller sent none.
    fn handle_call(
        &self,
        endpoint: String,
        method: String,
        params: Value,
    ) -> impl Future<Output = Result<TypedValue, HandlerError>> + Send;

    /// A publication on a channel this service subscribed to.
    ///
    /// Returning `Ok(None)` acknowledges the message without a payload.
    fn handle_message(
        &self,
        channel: String,
        message: Value,
    ) -> impl Future<Output = Result<Option<TypedValue>, HandlerError>> + Send;

    /// A message from a durable queue this service receives from.
    ///
    /// `Ok(true)` consumes the message; `Ok(false)` asks the broker to
    /// hand it to another receiver.
    fn handle_queue_message(
        &self,
        queue: String,
        message: Value,
    ) -> impl Future<Output = Result<bool, HandlerError>> + Send;
}
