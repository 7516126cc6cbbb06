//! Broker-to-WebSocket fan-out through a real server socket.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use wetask_broker::{EventPublisher, MemoryTransport, Transport};
use wetask_core::config::GatewayConfig;
use wetask_core::events;
use wetask_gateway::{GatewayServer, Hub};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Stand up a gateway on an ephemeral port and return its address, the
/// shared in-process broker, and the hub handle.
async fn start_gateway() -> (std::net::SocketAddr, Arc<MemoryTransport>, wetask_gateway::HubHandle) {
    let transport = Arc::new(MemoryTransport::new());
    let (hub, handle) = Hub::connect(transport.clone() as Arc<dyn Transport>)
        .await
        .unwrap();
    tokio::spawn(hub.run());

    let server = GatewayServer::new(GatewayConfig::default(), handle.clone());
    let app = server.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, transport, handle)
}

async fn connect(addr: std::net::SocketAddr) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    stream
}

async fn expect_frame(stream: &mut WsStream) -> serde_json::Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("frame within deadline")
            .expect("socket open")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn expect_silence(stream: &mut WsStream) {
    let outcome = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
    assert!(outcome.is_err(), "unexpected frame: {outcome:?}");
}

#[tokio::test]
async fn test_only_the_joined_board_receives_the_event() {
    let (addr, transport, _hub) = start_gateway().await;
    let publisher = EventPublisher::new(transport as Arc<dyn Transport>)
        .await
        .unwrap();

    let mut board7 = connect(addr).await;
    let mut board9 = connect(addr).await;
    board7
        .send(Message::Text(
            json!({"type": "join:board", "data": {"boardId": 7}}).to_string(),
        ))
        .await
        .unwrap();
    board9
        .send(Message::Text(
            json!({"type": "join:board", "data": {"boardId": 9}}).to_string(),
        ))
        .await
        .unwrap();
    // Let the read pumps apply the joins before publishing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    publisher
        .publish(events::TASK_CREATED, &json!({"boardId": 7}))
        .await
        .unwrap();

    let frame = expect_frame(&mut board7).await;
    assert_eq!(frame, json!({"type": "task.created", "data": {"boardId": 7}}));
    expect_silence(&mut board9).await;
}

#[tokio::test]
async fn test_leave_board_stops_delivery() {
    let (addr, transport, _hub) = start_gateway().await;
    let publisher = EventPublisher::new(transport as Arc<dyn Transport>)
        .await
        .unwrap();

    let mut client = connect(addr).await;
    client
        .send(Message::Text(
            json!({"type": "join:board", "data": {"boardId": 3}}).to_string(),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    publisher
        .publish(events::TASK_UPDATED, &json!({"boardId": 3, "task": {"id": 1}}))
        .await
        .unwrap();
    assert_eq!(expect_frame(&mut client).await["type"], "task.updated");

    client
        .send(Message::Text(
            json!({"type": "leave:board", "data": {"boardId": 3}}).to_string(),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    publisher
        .publish(events::TASK_UPDATED, &json!({"boardId": 3, "task": {"id": 2}}))
        .await
        .unwrap();
    expect_silence(&mut client).await;
}

#[tokio::test]
async fn test_team_events_reach_team_members() {
    let (addr, transport, _hub) = start_gateway().await;
    let publisher = EventPublisher::new(transport as Arc<dyn Transport>)
        .await
        .unwrap();

    let mut member = connect(addr).await;
    member
        .send(Message::Text(
            json!({"type": "join:team", "data": {"teamId": 5, "userId": 11}}).to_string(),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    publisher
        .publish(events::TEAM_MEMBER_ADDED, &json!({"teamId": 5, "member": {"userId": 12}}))
        .await
        .unwrap();

    let frame = expect_frame(&mut member).await;
    assert_eq!(frame["type"], "team.memberAdded");
    assert_eq!(frame["data"]["teamId"], 5);
}

#[tokio::test]
async fn test_malformed_client_messages_are_ignored() {
    let (addr, transport, _hub) = start_gateway().await;
    let publisher = EventPublisher::new(transport as Arc<dyn Transport>)
        .await
        .unwrap();

    let mut client = connect(addr).await;
    client
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    client
        .send(Message::Text(
            json!({"type": "join:board", "data": {}}).to_string(),
        ))
        .await
        .unwrap();
    client
        .send(Message::Text(
            json!({"type": "join:board", "data": {"boardId": 2}}).to_string(),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The connection survived the garbage and the valid join took effect.
    publisher
        .publish(events::TASK_DELETED, &json!({"boardId": 2, "taskId": 9}))
        .await
        .unwrap();
    let frame = expect_frame(&mut client).await;
    assert_eq!(frame["data"]["taskId"], 9);
}

#[tokio::test]
async fn test_closing_the_outbox_tears_down_an_unresponsive_peer() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (addr, _transport, hub) = start_gateway().await;

    // Handshake by hand so nothing on this side ever answers the server's
    // close frame.
    let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /ws HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
    );
    socket.write_all(request.as_bytes()).await.unwrap();
    let mut buf = [0u8; 1024];
    let n = socket.read(&mut buf).await.unwrap();
    assert!(
        std::str::from_utf8(&buf[..n]).unwrap().starts_with("HTTP/1.1 101"),
        "upgrade rejected"
    );
    // Let the upgrade future register the client with the hub.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // First connection of this gateway instance gets client id 1.
    hub.unregister(1);

    // The server must send its close frame and then drop the connection,
    // even though this peer never reads or replies.
    let teardown = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if socket.read(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await;
    assert!(teardown.is_ok(), "connection stayed open after the outbox closed");
}
