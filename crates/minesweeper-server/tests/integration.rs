use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Spin up a test server on a random port with the given room capacity,
/// return its base HTTP URL.
async fn start_server(capacity: usize) -> String {
    let (app, _state) = minesweeper_server::build_app(capacity);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{}", port)
}

/// Mint a fresh room id via the HTTP boundary.
async fn new_room_id(base: &str) -> String {
    reqwest::get(format!("{}/game/create", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

/// Connect a client to a room's message stream.
async fn ws_connect(base: &str, room_id: &str) -> (WsSink, WsStream) {
    let ws_url = base.replace("http://", "ws://");
    let url = format!("{}/game/{}", ws_url, room_id);
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    stream.split()
}

async fn ws_send(sink: &mut WsSink, msg: Value) {
    sink.send(Message::Text(msg.to_string().into())).await.unwrap();
}

/// Receive messages until one matching `event_type` arrives, skipping
/// (and discarding) anything else -- mirrors a real client that only
/// reacts to the event types it cares about.
async fn ws_recv_type(stream: &mut WsStream, event_type: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            panic!("timed out waiting for event_type: {event_type}");
        }
        let msg = tokio::time::timeout(remaining, stream.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event_type}"))
            .unwrap()
            .unwrap();

        if let Message::Text(text) = msg {
            let parsed: Value = serde_json::from_str(&text).unwrap();
            if parsed["event_type"].as_str() == Some(event_type) {
                return parsed;
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_liveness() {
    let base = start_server(4).await;
    let resp = reqwest::get(format!("{}/healthcheck/liveness", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(resp, "OK");
}

#[tokio::test]
async fn test_create_room_issues_five_char_id() {
    let base = start_server(4).await;
    let id = new_room_id(&base).await;
    assert_eq!(id.len(), 5);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
}

/// Scenario 1: two clients connect to the same room id; the first creates
/// it, the second joins, and both sides observe the other's arrival.
#[tokio::test]
async fn test_create_then_join_round_trip() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    let created = ws_recv_type(&mut stream1, "create_room").await;
    assert_eq!(created["success"], true);
    assert_eq!(created["game_room"]["id_room"], room_id);

    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "join_room", "client_name": "bob"})).await;
    let joined = ws_recv_type(&mut stream2, "join_room").await;
    assert!(joined["id_player"].as_str().is_some());
    assert_eq!(joined["game_room"]["players"].as_object().unwrap().len(), 2);

    let broadcast = ws_recv_type(&mut stream1, "join_room_broadcast").await;
    assert_eq!(broadcast["player"]["name"], "bob");
}

#[tokio::test]
async fn test_create_room_rejects_duplicate_id() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    ws_recv_type(&mut stream1, "create_room").await;

    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "create_room", "client_name": "mallory"})).await;
    let result = ws_recv_type(&mut stream2, "create_room").await;
    assert_eq!(result["success"], false);
}

#[tokio::test]
async fn test_join_room_rejects_duplicate_name() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    ws_recv_type(&mut stream1, "create_room").await;

    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "join_room", "client_name": "alice"})).await;
    let result = ws_recv_type(&mut stream2, "join_room").await;
    assert!(result["id_player"].is_null());
    assert_eq!(result["detail"], "username already exist");
}

#[tokio::test]
async fn test_server_full_rejects_create() {
    let base = start_server(0).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    let result = ws_recv_type(&mut stream1, "create_room").await;
    assert_eq!(result["success"], false);
    assert_eq!(result["message"], "server is at capacity");
}

/// Scenario 2: host starts a game on a single-player room with default
/// settings; the broadcast board is rows x cols of blank cells.
#[tokio::test]
async fn test_start_game_broadcasts_blank_board() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    ws_recv_type(&mut stream1, "create_room").await;

    ws_send(
        &mut sink1,
        json!({"event_type": "change_settings", "settings": {"rows": 5, "cols": 5, "mines": 3}}),
    )
    .await;
    ws_recv_type(&mut stream1, "settings_updated").await;

    ws_send(&mut sink1, json!({"event_type": "start_game"})).await;
    let started = ws_recv_type(&mut stream1, "start_game").await;
    assert_eq!(started["success"], true);
    let board: Vec<Vec<String>> = serde_json::from_value(started["board"].clone()).unwrap();
    assert_eq!(board.len(), 5);
    for row in &board {
        assert_eq!(row.len(), 5);
        assert!(row.iter().all(|cell| cell == " "));
    }
}

#[tokio::test]
async fn test_non_host_cannot_start_game() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    ws_recv_type(&mut stream1, "create_room").await;

    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "join_room", "client_name": "bob"})).await;
    ws_recv_type(&mut stream2, "join_room").await;
    ws_recv_type(&mut stream1, "join_room_broadcast").await;

    ws_send(&mut sink2, json!({"event_type": "start_game"})).await;
    let result = ws_recv_type(&mut stream2, "start_game").await;
    assert_eq!(result["success"], false);
}

/// Scenario 3: opening the genesis cell on a small board leaves the
/// genesis open and never a mine, per the safe-neighborhood guarantee.
#[tokio::test]
async fn test_open_cell_genesis_is_never_a_mine() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    ws_recv_type(&mut stream1, "create_room").await;

    ws_send(
        &mut sink1,
        json!({"event_type": "change_settings", "settings": {"rows": 8, "cols": 8, "mines": 10, "count_cold_open": true}}),
    )
    .await;
    ws_recv_type(&mut stream1, "settings_updated").await;

    ws_send(&mut sink1, json!({"event_type": "start_game"})).await;
    ws_recv_type(&mut stream1, "start_game").await;

    ws_send(&mut sink1, json!({"event_type": "open_cell", "row": 0, "col": 0})).await;
    let updated = ws_recv_type(&mut stream1, "board_updated").await;
    let board: Vec<Vec<String>> = serde_json::from_value(updated["board"].clone()).unwrap();
    assert_ne!(board[0][0], "X");
    assert_ne!(board[0][0], " ");
}

/// Scenario 5: a majority vote kicks the host, who is then replaced by the
/// remaining player.
#[tokio::test]
async fn test_vote_kick_evicts_host_and_promotes_remaining_player() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    let created = ws_recv_type(&mut stream1, "create_room").await;
    let host_id = created["game_room"]["id_host"].as_str().unwrap().to_string();

    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "join_room", "client_name": "bob"})).await;
    let joined = ws_recv_type(&mut stream2, "join_room").await;
    let bob_id = joined["id_player"].as_str().unwrap().to_string();
    ws_recv_type(&mut stream1, "join_room_broadcast").await;

    ws_send(&mut sink2, json!({"event_type": "kick_player", "id_player": host_id})).await;
    ws_recv_type(&mut stream2, "vote_kick_player").await;
    let issued = ws_recv_type(&mut stream1, "vote_kick_player").await;
    assert_eq!(issued["id_player"], host_id);

    ws_send(
        &mut sink2,
        json!({"event_type": "vote_kick_player", "id_player": host_id, "agree_to_kick": true}),
    )
    .await;

    let eviction = ws_recv_type(&mut stream1, "vote_kick_player").await;
    assert_eq!(eviction["success"], true);

    let leave_broadcast = ws_recv_type(&mut stream2, "leave_room_broadcast").await;
    assert_eq!(leave_broadcast["id_player"], host_id);

    let host_changed = ws_recv_type(&mut stream2, "host_changed").await;
    assert_eq!(host_changed["id_player"], bob_id);
}

#[tokio::test]
async fn test_chat_broadcasts_sender_and_message() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    ws_recv_type(&mut stream1, "create_room").await;

    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "join_room", "client_name": "bob"})).await;
    ws_recv_type(&mut stream2, "join_room").await;
    ws_recv_type(&mut stream1, "join_room_broadcast").await;

    ws_send(&mut sink1, json!({"event_type": "chat", "message": "gl hf"})).await;
    let chat = ws_recv_type(&mut stream2, "chat").await;
    assert_eq!(chat["sender"], "alice");
    assert_eq!(chat["message"], "gl hf");
}

#[tokio::test]
async fn test_position_updated_broadcasts_sender_id() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    let created = ws_recv_type(&mut stream1, "create_room").await;
    let host_id = created["game_room"]["id_host"].as_str().unwrap().to_string();

    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "join_room", "client_name": "bob"})).await;
    ws_recv_type(&mut stream2, "join_room").await;
    ws_recv_type(&mut stream1, "join_room_broadcast").await;

    ws_send(&mut sink1, json!({"event_type": "position_updated", "row": 3, "col": 4})).await;
    let pos = ws_recv_type(&mut stream2, "position_updated").await;
    assert_eq!(pos["sender_id"], host_id);
    assert_eq!(pos["row"], 3);
    assert_eq!(pos["col"], 4);
}

/// Scenario 6: the last player leaving a started room tears the room down
/// (and, by extension, stops its score ticker).
#[tokio::test]
async fn test_last_player_leaving_started_room_tears_it_down() {
    let base = start_server(4).await;
    let room_id = new_room_id(&base).await;

    let (mut sink1, mut stream1) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink1, json!({"event_type": "create_room", "client_name": "alice"})).await;
    ws_recv_type(&mut stream1, "create_room").await;

    ws_send(&mut sink1, json!({"event_type": "start_game"})).await;
    ws_recv_type(&mut stream1, "start_game").await;

    ws_send(&mut sink1, json!({"event_type": "leave_room"})).await;
    let ack = ws_recv_type(&mut stream1, "leave_room").await;
    assert_eq!(ack["success"], true);

    // The room is gone: a fresh connection can recreate the same id.
    let (mut sink2, mut stream2) = ws_connect(&base, &room_id).await;
    ws_send(&mut sink2, json!({"event_type": "create_room", "client_name": "carol"})).await;
    let recreated = ws_recv_type(&mut stream2, "create_room").await;
    assert_eq!(recreated["success"], true);
}
