// Socket-level smoke test against a real server on an ephemeral port.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;
use word_bomb_be::config::Config;
use word_bomb_be::dictionary::DictionaryIndex;
use word_bomb_be::state::AppState;

async fn spawn_server() -> (AppState, SocketAddr) {
    let data_dir = std::env::temp_dir().join(format!("word-bomb-ws-{}", Uuid::new_v4()));
    let config = Config {
        data_dir: data_dir.to_string_lossy().into_owned(),
        ..Default::default()
    };
    let state = AppState::new(config);
    state
        .dictionary
        .install(DictionaryIndex::build_from_lines(["BONJOUR"], 30));

    let app = word_bomb_be::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (state, addr)
}

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for server message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn register_create_and_list_rooms_over_socket() {
    let (_state, addr) = spawn_server().await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect failed");

    ws.send(Message::Text(
        json!({"type": "register", "token": "sock-tok"}).to_string().into(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(
        json!({
            "type": "createRoom",
            "data": {"name": "Salon", "player": {"name": "ana", "avatar": "a1"}},
        })
        .to_string()
        .into(),
    ))
    .await
    .unwrap();

    let created = next_json(&mut ws).await;
    assert_eq!(created["type"], "roomCreated");
    let room_id = created["room"]["id"].as_str().unwrap().to_string();

    // Room-set mutation pushes a fresh list.
    let list = next_json(&mut ws).await;
    assert_eq!(list["type"], "roomsList");
    assert_eq!(list["rooms"][0]["id"], room_id.as_str());
    assert_eq!(list["rooms"][0]["playerCount"], 1);

    ws.send(Message::Text(json!({"type": "getRooms"}).to_string().into()))
        .await
        .unwrap();
    let list = next_json(&mut ws).await;
    assert_eq!(list["type"], "roomsList");

    // Unparseable input answers a typed error without dropping the socket.
    ws.send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");

    let _ = ws.close(None).await;
}

#[tokio::test]
async fn http_validate_and_honeypot_tagging() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (state, addr) = spawn_server().await;

    // Raw HTTP GET against the validate endpoint.
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            format!(
                "GET /validate?word=bonjour HTTP/1.1\r\nHost: {addr}\r\nUser-Agent: Mozilla/5.0 Firefox/122.0\r\nConnection: close\r\n\r\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"exists\":true"), "{response}");

    // Honeypot: tagged and reported missing.
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            format!(
                "GET /dictionary.txt HTTP/1.1\r\nHost: {addr}\r\nUser-Agent: Mozilla/5.0 Firefox/122.0\r\nConnection: close\r\n\r\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    let stats = state.guard.stats().await;
    assert!(stats["clients"].as_array().unwrap().iter().any(|c| {
        c["ip"] == "127.0.0.1" && c["suspicionScore"].as_i64().unwrap() >= 50
    }));
}
