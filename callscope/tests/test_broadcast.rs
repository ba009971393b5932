//! Observer server with real websocket clients.

use callscope::server::{BroadcastServer, ServerEvent};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (BroadcastServer, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = BroadcastServer::bind(addr, tx).await.unwrap();
    (server, rx)
}

async fn connect(server: &BroadcastServer) -> Client {
    let url = format!("ws://{}/", server.local_addr().unwrap());
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn wait_for_observers(server: &BroadcastServer, count: usize) {
    for _ in 0..200 {
        if server.observer_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} observers, have {}", server.observer_count());
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no message in time")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return text.to_string();
        }
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event in time")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_broadcast_reaches_every_observer() {
    let (server, _events) = start().await;
    let mut one = connect(&server).await;
    let mut two = connect(&server).await;
    wait_for_observers(&server, 2).await;

    assert_eq!(server.broadcast(r#"{"method":"Telemetry.update"}"#), 2);
    assert_eq!(next_text(&mut one).await, r#"{"method":"Telemetry.update"}"#);
    assert_eq!(next_text(&mut two).await, r#"{"method":"Telemetry.update"}"#);

    server.close().await;
}

#[tokio::test]
async fn test_inbound_messages_become_events() {
    let (server, mut events) = start().await;
    let mut client = connect(&server).await;
    wait_for_observers(&server, 1).await;

    client.send(Message::Text("not json".into())).await.unwrap();
    client
        .send(Message::Text(r#"{"method":"Debugger.enable","id":3}"#.into()))
        .await
        .unwrap();

    match next_event(&mut events).await {
        ServerEvent::Message { message, .. } => {
            assert_eq!(message.method, "Debugger.enable");
            assert_eq!(message.id, Some(3));
        }
        other => panic!("unexpected {other:?}"),
    }
    server.close().await;
}

#[tokio::test]
async fn test_no_connections_only_when_last_observer_leaves() {
    let (server, mut events) = start().await;
    let mut one = connect(&server).await;
    let mut two = connect(&server).await;
    wait_for_observers(&server, 2).await;

    one.close(None).await.unwrap();
    wait_for_observers(&server, 1).await;
    assert!(events.try_recv().is_err());

    two.close(None).await.unwrap();
    assert!(matches!(next_event(&mut events).await, ServerEvent::NoConnections));
    assert_eq!(server.observer_count(), 0);
    server.close().await;
}

#[tokio::test]
async fn test_close_disconnects_observers() {
    let (server, _events) = start().await;
    let mut client = connect(&server).await;
    wait_for_observers(&server, 1).await;

    server.close().await;
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn test_disabled_server_broadcasts_nowhere() {
    let server = BroadcastServer::disabled();
    assert_eq!(server.local_addr(), None);
    assert_eq!(server.broadcast("x"), 0);
    server.close().await;
}
