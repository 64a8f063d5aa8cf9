//! Integration tests for the WebSocket transport.
//!
//! These spin up a real WebSocket listener on an OS-assigned port and drive
//! it with a `tokio-tungstenite` client, checking that the events coming out
//! of the server and the frames going into the socket line up.

#[cfg(feature = "websocket")]
mod websocket {
    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use roomrelay_transport::{
        Delivery, StreamTransport, TransportEvent, WebSocketHandle,
        WebSocketServer,
    };
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Starts a server on a random port and returns the event stream,
    /// the send handle, and the address to connect to.
    async fn start() -> (
        mpsc::UnboundedReceiver<TransportEvent>,
        WebSocketHandle,
        String,
    ) {
        let server = WebSocketServer::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = server.local_addr().expect("bound").to_string();
        let handle = server.handle();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(server.run(tx));
        (rx, handle, addr)
    }

    async fn connect_client(addr: &str) -> Client {
        let url = format!("ws://{addr}");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("client should connect");
        ws
    }

    #[tokio::test]
    async fn test_websocket_connect_send_and_receive() {
        let (mut events, handle, addr) = start().await;
        let mut client = connect_client(&addr).await;

        let conn = match events.recv().await {
            Some(TransportEvent::Connected { conn, request }) => {
                assert!(request.is_none());
                conn
            }
            other => panic!("expected Connected, got {other:?}"),
        };

        // Server to client.
        handle
            .send_one(conn, Bytes::from_static(b"hello from server"))
            .expect("send should succeed");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello from server");

        // Client to server.
        client
            .send(Message::Binary(Bytes::from_static(b"hello from client")))
            .await
            .unwrap();
        match events.recv().await {
            Some(TransportEvent::Data {
                conn: from,
                data,
                delivery,
            }) => {
                assert_eq!(from, conn);
                assert_eq!(data.as_ref(), b"hello from client");
                assert_eq!(delivery, Delivery::ReliableOrdered);
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_client_close_emits_disconnected() {
        let (mut events, handle, addr) = start().await;
        let mut client = connect_client(&addr).await;
        let conn = events.recv().await.expect("connected").conn();

        client.send(Message::Close(None)).await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected { conn })
        );
        assert_eq!(handle.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_websocket_kick_closes_client() {
        let (mut events, handle, addr) = start().await;
        let mut client = connect_client(&addr).await;
        let conn = events.recv().await.expect("connected").conn();

        handle.kick(conn);

        // Keep polling so the client answers the close handshake.
        while let Some(Ok(_)) = client.next().await {}
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected { conn })
        );
    }

    #[tokio::test]
    async fn test_websocket_send_to_unknown_connection_fails() {
        let (_events, handle, _addr) = start().await;
        let result = handle.send_one(
            roomrelay_transport::ConnectionId::new(u64::MAX),
            Bytes::new(),
        );
        assert!(result.is_err());
    }
}
