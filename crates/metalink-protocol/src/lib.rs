//! Wire protocol for Metalink.
//!
//! This crate defines the "language" a Metalink client and its broker
//! speak:
//!
//! - **Envelope** ([`Envelope`], [`RequestId`], [`ErrorBody`]): the one
//!   JSON object that travels in every frame.
//! - **Commands** ([`Command`]): the fixed code table for the `c` field.
//! - **References** ([`TypedValue`], [`ApiReference`],
//!   [`ChannelReference`], [`StorageReference`]): typed payloads rebuilt
//!   from the `t` tag.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): envelopes to text frames
//!   and back.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (text frames) and the
//! connection core (request correlation, dispatch). It doesn't know about
//! sockets or reconnection, only about message shapes.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Connection core
//! ```

mod codec;
mod command;
mod envelope;
mod error;
mod reference;

pub use codec::{Codec, JsonCodec};
pub use command::Command;
pub use envelope::{Envelope, ErrorBody, GENERIC_ERROR_CODE, RequestId};
pub use error::ProtocolError;
pub use reference::{
    ApiReference, ChannelReference, StorageReference, TypeTag, TypedValue,
};

/// Re-exported so downstream crates build params with the same JSON type.
pub use serde_json::Value;
