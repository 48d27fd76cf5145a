//! End-to-end run of a connection against a loopback WebSocket broker.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use metalink::prelude::*;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type BrokerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

struct Greeter;

impl ServiceHandler for Greeter {
    async fn handle_call(
        &self,
        _endpoint: String,
        method: String,
        params: Value,
    ) -> Result<TypedValue, HandlerError> {
        match method.as_str() {
            "greet" => Ok(TypedValue::Plain(json!(format!(
                "hello {}",
                params["name"].as_str().unwrap_or("stranger")
            )))),
            _ => Err(HandlerError::with_code(404, "Method not found.")),
        }
    }

    async fn handle_message(
        &self,
        _channel: String,
        _message: Value,
    ) -> Result<Option<TypedValue>, HandlerError> {
        Ok(None)
    }

    async fn handle_queue_message(
        &self,
        _queue: String,
        _message: Value,
    ) -> Result<bool, HandlerError> {
        Ok(true)
    }
}

async fn next_json(ws: &mut BrokerWs) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("frame should arrive")
        .expect("stream open")
        .expect("frame ok");
    serde_json::from_str(msg.to_text().expect("text frame")).expect("json")
}

async fn send_json(ws: &mut BrokerWs, value: Value) {
    ws.send(Message::text(value.to_string())).await.expect("send");
}

#[tokio::test]
async fn test_full_session_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));

    let broker = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");

        let auth = next_json(&mut ws).await;
        assert_eq!(auth["c"], 4);
        assert_eq!(auth["p"]["serviceName"], "greeter");
        send_json(&mut ws, json!({ "r": auth["r"], "c": 2, "d": true })).await;

        let call = next_json(&mut ws).await;
        assert_eq!(call["c"], 20);
        assert_eq!(call["p"]["method"], "today");
        send_json(
            &mut ws,
            json!({
                "r": call["r"], "c": 2,
                "d": { "bucket": "reports", "objectId": "2024-01-05" },
                "t": "StorageReference",
            }),
        )
        .await;

        send_json(
            &mut ws,
            json!({
                "r": "s1", "c": 10,
                "p": { "endpoint": "hello", "method": "greet", "params": { "name": "broker" } },
            }),
        )
        .await;
        let reply = next_json(&mut ws).await;
        assert_eq!(reply, json!({ "r": "s1", "c": 2, "d": "hello broker" }));

        ws.close(None).await.expect("close");
    });

    let conn = Connection::websocket("greeter", Arc::new(Greeter), ConnectionConfig::default());
    let mut events = conn.events();
    conn.connect(&url, "secret").await.expect("connect");
    assert!(matches!(events.recv().await, Ok(ConnectionEvent::Open)));

    let report = conn
        .call("reports", "daily", "today", json!({}))
        .await
        .expect("call");
    assert_eq!(
        report,
        TypedValue::Storage(StorageReference {
            bucket: "reports".into(),
            object_id: "2024-01-05".into(),
        })
    );

    broker.await.expect("broker assertions");
    let closed = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("close event");
    assert!(matches!(closed, Ok(ConnectionEvent::Close)));
    assert_eq!(conn.state().await, ConnectionState::Closed);
}
