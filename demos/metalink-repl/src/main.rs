//! Metalink REPL - an interactive shell on a broker connection.
//!
//! Connects as a service, then reads commands from stdin. Inbound channel
//! and queue messages are printed as they arrive.
//!
//! ```text
//! RUST_LOG=metalink=debug metalink-repl ws://127.0.0.1:7070 shell s3cret
//! ```

mod command;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metalink::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use crate::command::{HELP, ParseError, ReplCommand, parse_line};

#[derive(Parser, Debug)]
#[command(name = "metalink-repl")]
#[command(about = "Interactive shell for a Metalink broker")]
struct Args {
    /// Broker URL, e.g. ws://127.0.0.1:7070
    url: String,

    /// Service name to authenticate as
    service: String,

    /// Shared secret
    #[arg(default_value = "")]
    secret: String,

    /// Treat any connection loss as final
    #[arg(long)]
    no_reconnect: bool,

    /// Delay before each reconnection attempt
    #[arg(long, default_value_t = 3000)]
    reconnect_delay_ms: u64,
}

/// Prints what the broker routes to this shell.
struct Printer;

impl ServiceHandler for Printer {
    async fn handle_call(
        &self,
        endpoint: String,
        method: String,
        _params: Value,
    ) -> Result<TypedValue, HandlerError> {
        println!("<< call {endpoint}.{method} (not served)");
        Err(HandlerError::with_code(501, "Not implemented."))
    }

    async fn handle_message(
        &self,
        channel: String,
        message: Value,
    ) -> Result<Option<TypedValue>, HandlerError> {
        println!("<< [{channel}] {}", pretty(&message));
        Ok(None)
    }

    async fn handle_queue_message(
        &self,
        queue: String,
        message: Value,
    ) -> Result<bool, HandlerError> {
        println!("<< queue {queue}: {}", pretty(&message));
        Ok(false)
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = ConnectionConfig {
        reconnect: !args.no_reconnect,
        reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
        ..ConnectionConfig::default()
    };
    let conn = Connection::websocket(&args.service, Arc::new(Printer), config);
    let events = conn.events();

    conn.connect(&args.url, &args.secret).await?;
    println!("Connected.");

    let mut reporter = tokio::spawn(report_events(events));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !run_line(&conn, &line).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "reading stdin failed");
                    break;
                }
            },
            _ = &mut reporter => return Ok(()),
        }
    }

    conn.close().await;
    let _ = reporter.await;
    Ok(())
}

/// Runs one input line. Returns `false` when the shell should exit.
async fn run_line(conn: &Connection, line: &str) -> bool {
    let command = match parse_line(line) {
        Ok(command) => command,
        Err(ParseError::Empty) => return true,
        Err(e) => {
            eprintln!("{e}");
            return true;
        }
    };

    let result = match command {
        ReplCommand::Call {
            service,
            endpoint,
            method,
            params,
        } => conn.call(&service, &endpoint, &method, params).await,
        ReplCommand::Subscribe(channel) => conn.subscribe(&channel).await,
        ReplCommand::Unsubscribe(channel) => conn.unsubscribe(&channel).await,
        ReplCommand::Publish { channel, message } => conn.publish(&channel, message).await,
        ReplCommand::Subscribers(channel) => conn.subscribers(&channel).await,
        ReplCommand::SubscribeQueue(queue) => conn.subscribe_queue(&queue).await,
        ReplCommand::UnsubscribeQueue(queue) => conn.unsubscribe_queue(&queue).await,
        ReplCommand::Enqueue { queue, message } => conn.enqueue(&queue, message, None).await,
        ReplCommand::Help => {
            println!("{HELP}");
            return true;
        }
        ReplCommand::Close => return false,
    };

    match result {
        Ok(value) => show_reply(conn, value).await,
        Err(e) => eprintln!("Error: {e}"),
    }
    true
}

/// Prints a reply. A channel reference is subscribed to right away.
async fn show_reply(conn: &Connection, value: TypedValue) {
    if let TypedValue::Channel(reference) = &value {
        let channel = reference.to_string();
        match conn.subscribe(&channel).await {
            Ok(_) => println!("Subscribed to {channel}."),
            Err(e) => eprintln!("Subscribing to {channel} failed: {e}"),
        }
    }
    let tag = value.type_tag();
    let (data, _) = value.into_wire();
    match tag {
        Some(tag) => println!("{} {}", tag.as_str(), pretty(&data)),
        None => println!("{}", pretty(&data)),
    }
}

async fn report_events(mut events: broadcast::Receiver<ConnectionEvent>) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::Open) => eprintln!("Connection open."),
            Ok(ConnectionEvent::Reconnect(cause)) => eprintln!("{cause} Reconnecting..."),
            Ok(ConnectionEvent::ConnectionError(e)) => eprintln!("Connection error: {e}"),
            Ok(ConnectionEvent::Close) => {
                eprintln!("Connection closed.");
                break;
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event reporter fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
