//! Inbound dispatcher: decides what an inbound frame means.
//!
//! Classification is a pure function of the frame text so the routing
//! rules can be tested without a connection. The connection actor acts on
//! the result: replies resolve the request registry, invocations are run
//! on the [`ServiceHandler`], rejections are answered with an error reply.

use metalink_protocol::{
    Codec, Command, Envelope, ErrorBody, RequestId, TypedValue, Value,
};

use crate::{HandlerError, ServiceHandler};

pub(crate) const MSG_UNPARSEABLE: &str = "Invalid request format. Cannot parse JSON.";
pub(crate) const MSG_INVALID_REQUEST: &str = "Invalid request.";
pub(crate) const MSG_INVALID_PARAMS: &str = "Invalid request params.";
pub(crate) const MSG_UNDEFINED_COMMAND: &str = "Undefined command.";
pub(crate) const MSG_UNKNOWN_ERROR: &str = "Unknown error.";

/// What an inbound frame asks the connection to do.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    /// Nothing (peer greeting).
    Ignore,
    /// Resolve an outstanding request.
    Reply {
        request_id: RequestId,
        outcome: Result<TypedValue, ErrorBody>,
    },
    /// Run a handler and reply to `request_id` with its result.
    Invoke {
        request_id: RequestId,
        invocation: Invocation,
    },
    /// Answer with an error reply and do nothing else.
    Reject {
        request_id: Option<RequestId>,
        error: ErrorBody,
    },
}

/// A peer-initiated request for the hosting service.
#[derive(Debug, PartialEq)]
pub(crate) enum Invocation {
    Call {
        endpoint: String,
        method: String,
        params: Value,
    },
    Message {
        channel: String,
        message: Value,
    },
    QueueMessage {
        queue: String,
        message: Value,
    },
}

impl Invocation {
    /// Runs the matching handler method.
    ///
    /// The queue handler's verdict is sent back as the reply payload.
    pub(crate) async fn run<H: ServiceHandler>(
        self,
        handler: &H,
    ) -> Result<Option<TypedValue>, HandlerError> {
        match self {
            Self::Call {
                endpoint,
                method,
                params,
            } => handler.handle_call(endpoint, method, params).await.map(Some),
            Self::Message { channel, message } => {
                handler.handle_message(channel, message).await
            }
            Self::QueueMessage { queue, message } => handler
                .handle_queue_message(queue, message)
                .await
                .map(|consumed| Some(TypedValue::Plain(Value::Bool(consumed)))),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Message { .. } => "message",
            Self::QueueMessage { .. } => "queue message",
        }
    }
}

/// Classifies one inbound frame.
pub(crate) fn classify(frame: &str, codec: &impl Codec) -> Inbound {
    let envelope: Envelope = match codec.decode(frame) {
        Ok(env) => env,
        Err(_) => return reject(None, MSG_UNPARSEABLE),
    };

    let request_id = match &envelope.request_id {
        Some(id) if !id.as_str().is_empty() => id.clone(),
        _ => return reject(None, MSG_INVALID_REQUEST),
    };
    let Some(command) = envelope.command else {
        return reject(None, MSG_INVALID_REQUEST);
    };

    match command {
        Command::Hello => Inbound::Ignore,

        Command::Response => Inbound::Reply {
            request_id,
            outcome: Ok(TypedValue::from_wire(
                envelope.data,
                envelope.type_tag.as_deref(),
            )),
        },

        Command::Error => Inbound::Reply {
            request_id,
            outcome: Err(envelope
                .error
                .unwrap_or_else(|| ErrorBody::generic(MSG_UNKNOWN_ERROR))),
        },

        Command::CliCall => {
            let (Some(endpoint), Some(method)) = (
                envelope.param_str("endpoint").map(str::to_owned),
                envelope.param_str("method").map(str::to_owned),
            ) else {
                return reject(Some(request_id), MSG_INVALID_PARAMS);
            };
            let params = envelope
                .param("params")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            Inbound::Invoke {
                request_id,
                invocation: Invocation::Call {
                    endpoint,
                    method,
                    params,
                },
            }
        }

        Command::CliMessage => {
            let (Some(channel), Some(message)) = (
                envelope.param_str("channel").map(str::to_owned),
                envelope.param("message").cloned(),
            ) else {
                return reject(Some(request_id), MSG_INVALID_PARAMS);
            };
            Inbound::Invoke {
                request_id,
                invocation: Invocation::Message { channel, message },
            }
        }

        Command::CliQueueMessage => {
            let (Some(queue), Some(message)) = (
                envelope.param_str("queue").map(str::to_owned),
                envelope.param("message").cloned(),
            ) else {
                return reject(Some(request_id), MSG_INVALID_PARAMS);
            };
            Inbound::Invoke {
                request_id,
                invocation: Invocation::QueueMessage { queue, message },
            }
        }

        _ => reject(Some(request_id), MSG_UNDEFINED_COMMAND),
    }
}

fn reject(request_id: Option<RequestId>, message: &str) -> Inbound {
    Inbound::Reject {
        request_id,
        error: ErrorBody::generic(message),
    }
}
