//! Integration tests for the WebSocket dialer.
//!
//! These tests spin up a throwaway `tokio-tungstenite` server on a random
//! loopback port and dial it with [`WebSocketConnector`], so frames really
//! cross a socket.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use metalink_transport::{Connection, Connector, WebSocketConnector};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its ws:// URL.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_websocket_dial_and_exchange_text() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let conn = WebSocketConnector
            .connect(&url)
            .await
            .expect("dial should succeed");
        let mut server_ws = server.await.expect("task should complete");
        assert!(conn.id().into_inner() > 0);

        // --- Client sends, server receives ---
        conn.send(r#"{"r":"c1","c":4,"p":{}}"#)
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"r":"c1","c":4,"p":{}}"#);

        // --- Server sends, client receives ---
        server_ws
            .send(Message::text(r#"{"r":"c1","c":2,"d":true}"#.to_owned()))
            .await
            .unwrap();
        let received = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have a frame");
        assert_eq!(received, r#"{"r":"c1","c":2,"d":true}"#);

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_server_close() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let conn = WebSocketConnector.connect(&url).await.unwrap();
        let mut server_ws = server.await.unwrap();

        server_ws.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("clean close is not an error");
        assert!(result.is_none(), "should return None on clean close");
    }

    #[tokio::test]
    async fn test_websocket_recv_reports_lost_on_abrupt_drop() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let conn = WebSocketConnector.connect(&url).await.unwrap();
        let server_ws = server.await.unwrap();

        // Dropping the stream closes the TCP socket without a close frame.
        drop(server_ws);

        let err = conn.recv().await.expect_err("abrupt drop is an error");
        assert!(err.is_connection_lost(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_websocket_dial_refused_is_classified() {
        // Bind then drop to get a port nothing is listening on.
        let (listener, url) = listen().await;
        drop(listener);

        let err = WebSocketConnector
            .connect(&url)
            .await
            .err()
            .expect("dial should fail");
        assert!(err.is_refused(), "got {err:?}");
    }
}
