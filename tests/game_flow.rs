// End-to-end game scenarios driven through the coordinator with channel
// connections standing in for sockets. Timer-driven paths run under the
// paused clock so grace windows and turn timers elapse instantly.

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use uuid::Uuid;
use word_bomb_be::config::Config;
use word_bomb_be::dictionary::DictionaryIndex;
use word_bomb_be::room::GamePhase;
use word_bomb_be::state::{AppState, ConnectionInfo};
use word_bomb_be::ws::handler::{actions, handle_disconnect};
use word_bomb_be::ws::messages::ClientMessage;

struct Client {
    socket_id: Uuid,
    ip: String,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Client {
    fn drain(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            out.push(serde_json::from_str(&text).expect("server sent invalid json"));
        }
        out
    }
}

fn typed<'a>(events: &'a [Value], ty: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| e.get("type").and_then(Value::as_str) == Some(ty))
        .collect()
}

fn position_of(events: &[Value], ty: &str) -> Option<usize> {
    events
        .iter()
        .position(|e| e.get("type").and_then(Value::as_str) == Some(ty))
}

fn test_state(words: &[&str]) -> AppState {
    let data_dir = std::env::temp_dir().join(format!("word-bomb-test-{}", Uuid::new_v4()));
    let config = Config {
        data_dir: data_dir.to_string_lossy().into_owned(),
        ..Default::default()
    };
    let state = AppState::new(config);
    state
        .dictionary
        .install(DictionaryIndex::build_from_lines(words.iter().copied(), 30));
    state
}

async fn connect(state: &AppState, ip: &str) -> Client {
    let socket_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    state.connections.lock().await.insert(
        socket_id,
        Arc::new(ConnectionInfo {
            socket_id,
            ip: ip.to_string(),
            sender: tx,
        }),
    );
    Client {
        socket_id,
        ip: ip.to_string(),
        rx,
    }
}

async fn send(state: &AppState, client: &Client, payload: Value) {
    let msg: ClientMessage = serde_json::from_value(payload).expect("bad test payload");
    actions::dispatch(state, client.socket_id, &client.ip, msg).await;
}

/// Register two players, create a room and join the peer. Returns the room
/// id; both clients' queues are drained.
async fn setup_room(
    state: &AppState,
    host: &mut Client,
    peer: &mut Client,
    settings: Value,
) -> String {
    send(state, host, json!({"type": "register", "token": "host-tok"})).await;
    send(state, peer, json!({"type": "register", "token": "peer-tok"})).await;
    send(
        state,
        host,
        json!({
            "type": "createRoom",
            "data": {
                "name": "Salon",
                "player": {"name": "host", "avatar": "a1"},
                "settings": settings,
            }
        }),
    )
    .await;
    let events = host.drain();
    let created = typed(&events, "roomCreated")[0];
    let room_id = created["room"]["id"].as_str().unwrap().to_string();

    send(
        state,
        peer,
        json!({
            "type": "joinRoom",
            "roomId": room_id,
            "playerData": {"name": "peer", "avatar": "a2"},
        }),
    )
    .await;
    host.drain();
    peer.drain();
    room_id
}

async fn room_phase(state: &AppState, room_id: &str) -> GamePhase {
    let shared = state.rooms.get(room_id).await.unwrap();
    let room = shared.lock().await;
    room.phase
}

// Scenario 1: basic round. The host answers their turn, then the peer
// answers theirs; each acceptance advances to a fresh syllable.
#[tokio::test(start_paused = true)]
async fn basic_round_word_accept_advances() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({})).await;

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(100)).await;

    let events = peer.drain();
    assert_eq!(typed(&events, "gameStarted").len(), 1);
    let syllables = typed(&events, "syllableUpdate");
    assert_eq!(syllables.len(), 1);
    let first_syllable = syllables[0]["syllable"].as_str().unwrap().to_string();
    assert_eq!(syllables[0]["playerIndex"], 0);
    assert_eq!(syllables[0]["roundNumber"], 1);

    // Every syllable of the one-word dictionary is a substring of BONJOUR,
    // so the word always matches the server's choice.
    send(
        &state,
        &host,
        json!({"type": "submitWord", "roomId": room_id, "word": "bonjour"}),
    )
    .await;
    sleep(Duration::from_millis(200)).await;

    let events = peer.drain();
    let accepted = typed(&events, "wordAccepted");
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0]["word"], "BONJOUR");
    assert_eq!(accepted[0]["wordsFound"], 1);
    assert_eq!(accepted[0]["playerIndex"], 0);

    let next = typed(&events, "syllableUpdate");
    assert_eq!(next.len(), 1);
    assert_eq!(next[0]["playerIndex"], 1);
    assert_eq!(next[0]["roundNumber"], 2);
    assert_ne!(next[0]["syllable"].as_str().unwrap(), first_syllable);

    // Peer answers their own turn.
    send(
        &state,
        &peer,
        json!({"type": "submitWord", "roomId": room_id, "word": "BONJOUR"}),
    )
    .await;
    sleep(Duration::from_millis(200)).await;
    let events = host.drain();
    let accepted = typed(&events, "wordAccepted");
    assert!(!accepted.is_empty());
    assert_eq!(accepted[0]["playerIndex"], 1);
    assert_eq!(accepted[0]["wordsFound"], 1);
}

// Scenario 2: timeout loss. No submission: at +8s the current player loses
// a life, the turn advances and the next round is armed.
#[tokio::test(start_paused = true)]
async fn timeout_applies_loss_and_advances() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({"startingLives": 2})).await;

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(8_600)).await;

    let events = peer.drain();
    let timeout_at = position_of(&events, "timeout").expect("timeout not broadcast");
    let loss = typed(&events, "playerLostLife");
    assert_eq!(loss.len(), 1);
    assert_eq!(loss[0]["livesLeft"], 1);
    assert_eq!(loss[0]["playerIndex"], 0);

    // Ordering: timeout precedes the next round's syllable.
    let rounds: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.get("type").and_then(Value::as_str) == Some("syllableUpdate"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(rounds.len(), 2);
    assert!(rounds[0] < timeout_at && timeout_at < rounds[1]);

    let shared = state.rooms.get(&room_id).await.unwrap();
    let room = shared.lock().await;
    assert_eq!(room.game.current_player_index, 1);
    assert!(room.game.deadline.is_some());
    // Invariant: while playing and unpaused, the timer is armed.
    assert!(!room.game.paused);
}

// Scenario 3: elimination and win. One life each: the first timeout
// eliminates the host, the peer wins, the room returns to the lobby with
// lives reset.
#[tokio::test(start_paused = true)]
async fn elimination_ends_game_and_returns_to_lobby() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({"startingLives": 1})).await;

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(8_600)).await;

    let events = peer.drain();
    let eliminated = typed(&events, "playerEliminated");
    assert_eq!(eliminated.len(), 1);
    assert_eq!(eliminated[0]["playerName"], "host");

    let over = typed(&events, "gameOver");
    assert_eq!(over.len(), 1);
    assert_eq!(over[0]["winner"], "peer");

    assert_eq!(room_phase(&state, &room_id).await, GamePhase::Lobby);
    let shared = state.rooms.get(&room_id).await.unwrap();
    let room = shared.lock().await;
    for p in &room.players {
        assert_eq!(p.lives, 1);
        assert!(p.is_alive);
    }
}

// Scenario 4: reconnect during turn. The current player's socket dies; at
// +8s the round pauses; the player returns and the round resumes with the
// frozen remainder.
#[tokio::test(start_paused = true)]
async fn disconnect_pauses_and_reconnect_resumes() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    // 18s turns so the round outlives the 8s grace window.
    let room_id = setup_room(
        &state,
        &mut host,
        &mut peer,
        json!({"extraTurnSeconds": 10}),
    )
    .await;

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(1_000)).await;

    // Transport loss for the current player.
    state.connections.lock().await.remove(&host.socket_id);
    handle_disconnect(&state, host.socket_id).await;

    sleep(Duration::from_millis(8_500)).await;
    let events = peer.drain();
    let disc = typed(&events, "playerDisconnected");
    assert_eq!(disc.len(), 1);
    assert_eq!(disc[0]["gamePaused"], true);
    assert_eq!(typed(&events, "gamePaused").len(), 1);

    // Reconnect at ~t+20s with the same token on a new socket.
    sleep(Duration::from_millis(11_500)).await;
    let mut host2 = connect(&state, "10.0.0.1").await;
    send(&state, &host2, json!({"type": "register", "token": "host-tok"})).await;

    let events = peer.drain();
    assert_eq!(typed(&events, "playerReconnected").len(), 1);
    let resumed = typed(&events, "gameResumed");
    assert_eq!(resumed.len(), 1);
    // Original remainder: ~18s total minus ~9s elapsed when paused.
    let remaining = resumed[0]["remaining"].as_u64().unwrap();
    assert!((8_000..=10_000).contains(&remaining), "remaining {remaining}");

    // The voided eviction stage must not fire.
    sleep(Duration::from_millis(40_000)).await;
    let events = peer.drain();
    assert!(typed(&events, "playerLeft").is_empty());
    let shared = state.rooms.get(&room_id).await.unwrap();
    assert_eq!(shared.lock().await.players.len(), 2);
    host2.drain();
}

// Scenario 5: abandonment eviction. The disconnected current player never
// returns: paused at +8s, evicted at +53s, and the round restarts for the
// next seat.
#[tokio::test(start_paused = true)]
async fn abandoned_player_is_evicted_and_round_resumes() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut p2 = connect(&state, "10.0.0.2").await;
    let mut p3 = connect(&state, "10.0.0.3").await;

    send(&state, &host, json!({"type": "register", "token": "host-tok"})).await;
    send(&state, &p2, json!({"type": "register", "token": "p2-tok"})).await;
    send(&state, &p3, json!({"type": "register", "token": "p3-tok"})).await;
    send(
        &state,
        &host,
        json!({
            "type": "createRoom",
            "data": {
                "name": "Salon",
                "player": {"name": "host", "avatar": "a1"},
                "settings": {"extraTurnSeconds": 10},
            }
        }),
    )
    .await;
    let events = host.drain();
    let room_id = typed(&events, "roomCreated")[0]["room"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    for (client, name) in [(&p2, "p2"), (&p3, "p3")] {
        send(
            &state,
            client,
            json!({
                "type": "joinRoom",
                "roomId": room_id,
                "playerData": {"name": name, "avatar": "a"},
            }),
        )
        .await;
    }
    p2.drain();
    p3.drain();

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(1_000)).await;

    state.connections.lock().await.remove(&host.socket_id);
    handle_disconnect(&state, host.socket_id).await;

    // Past t+8s+45s the seat is gone.
    sleep(Duration::from_millis(54_000)).await;
    let events = p2.drain();
    assert_eq!(typed(&events, "playerDisconnected").len(), 1);
    let left = typed(&events, "playerLeft");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["playerName"], "host");
    assert_eq!(left[0]["newHost"], "p2");

    // The paused round gave way to a fresh one for the next seat.
    let left_at = position_of(&events, "playerLeft").unwrap();
    let new_round = events
        .iter()
        .enumerate()
        .filter(|(i, e)| {
            *i > left_at && e.get("type").and_then(Value::as_str) == Some("syllableUpdate")
        })
        .map(|(_, e)| e)
        .next()
        .expect("no round restart after eviction");
    assert_eq!(new_round["player"], "p2");

    let shared = state.rooms.get(&room_id).await.unwrap();
    let room = shared.lock().await;
    assert_eq!(room.players.len(), 2);
    assert_eq!(room.host_token, "p2-tok");
    assert_eq!(room.phase, GamePhase::Playing);
}

// Scenario 6: sub8 integrity. Every emitted syllable stays within the
// scenario's count cap for the whole game, across used-set resets.
#[tokio::test(start_paused = true)]
async fn sub8_scenario_never_leaves_the_pool() {
    let mut words = vec!["AXYB", "CXYD", "EZTA"];
    let frequent: Vec<String> = (0..20).map(|i| format!("BONJOUR{i}")).collect();
    words.extend(frequent.iter().map(|s| s.as_str()));
    let state = test_state(&words);

    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({"startingLives": 5})).await;

    send(
        &state,
        &host,
        json!({"type": "startGame", "roomId": room_id, "scenario": "sub8"}),
    )
    .await;

    // Nine timeouts (alternating seats, five lives each) end the game.
    sleep(Duration::from_millis(80_000)).await;

    let events = peer.drain();
    let syllables = typed(&events, "syllableUpdate");
    assert!(syllables.len() >= 9, "only {} rounds", syllables.len());
    for update in &syllables {
        let count = update["count"].as_u64().expect("syllable without count");
        assert!(count <= 8, "emitted {:?} with count {count}", update["syllable"]);
    }
    assert_eq!(typed(&events, "gameOver").len(), 1);
}

// Invariant 7: two submissions within 800ms; only the first can be
// accepted.
#[tokio::test(start_paused = true)]
async fn rapid_resubmission_is_rejected() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({})).await;

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(100)).await;
    host.drain();

    send(
        &state,
        &host,
        json!({"type": "submitWord", "roomId": room_id, "word": "BONJOUR"}),
    )
    .await;
    send(
        &state,
        &host,
        json!({"type": "submitWord", "roomId": room_id, "word": "BONJOUR"}),
    )
    .await;

    let events = host.drain();
    assert_eq!(typed(&events, "wordAccepted").len(), 1);
    let rejected = typed(&events, "wordRejected");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["reason"], "Trop rapide!");
    peer.drain();
}

// The host submit carve-out covers only seats with no live session behind
// them: answering for a connected player is rejected as not-your-turn, a
// dead seat (locally driven bot) is accepted.
#[tokio::test(start_paused = true)]
async fn host_submits_only_for_dead_seats() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({})).await;

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    // Let the host's opening turn time out so the peer holds the turn.
    sleep(Duration::from_millis(8_600)).await;
    host.drain();
    peer.drain();

    send(
        &state,
        &host,
        json!({"type": "submitWord", "roomId": room_id, "word": "BONJOUR"}),
    )
    .await;
    let events = host.drain();
    assert!(typed(&events, "wordAccepted").is_empty());
    let rejected = typed(&events, "wordRejected");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["reason"], "Ce n'est pas ton tour");
    // The peer's round is untouched.
    {
        let shared = state.rooms.get(&room_id).await.unwrap();
        let mut room = shared.lock().await;
        assert_eq!(room.game.current_player_index, 1);
        assert_eq!(room.game.round_number, 2);
        // The submission cooldown is wall-clock; reset it so the next
        // attempt exercises authorization, not throttling.
        room.game.last_submit_ms.clear();
    }

    // The peer's socket dies: their seat has no live session and the host
    // may drive it.
    state.connections.lock().await.remove(&peer.socket_id);
    handle_disconnect(&state, peer.socket_id).await;

    send(
        &state,
        &host,
        json!({"type": "submitWord", "roomId": room_id, "word": "BONJOUR"}),
    )
    .await;
    let events = host.drain();
    let accepted = typed(&events, "wordAccepted");
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0]["playerIndex"], 1);
}

// Reconnection just before each grace boundary: neither the disconnect
// broadcast nor the eviction may fire once a newer connection arrived.
#[tokio::test(start_paused = true)]
async fn reconnect_before_grace_boundaries_voids_stages() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(
        &state,
        &mut host,
        &mut peer,
        json!({"extraTurnSeconds": 10}),
    )
    .await;
    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(500)).await;

    // First loss, reconnect 100ms before the mark stage.
    state.connections.lock().await.remove(&host.socket_id);
    handle_disconnect(&state, host.socket_id).await;
    sleep(Duration::from_millis(7_900)).await;
    let host2 = connect(&state, "10.0.0.1").await;
    send(&state, &host2, json!({"type": "register", "token": "host-tok"})).await;
    sleep(Duration::from_millis(1_000)).await;

    let events = peer.drain();
    assert!(typed(&events, "playerDisconnected").is_empty());
    assert!(typed(&events, "gamePaused").is_empty());

    // Second loss, reconnect between mark and eviction.
    state.connections.lock().await.remove(&host2.socket_id);
    handle_disconnect(&state, host2.socket_id).await;
    sleep(Duration::from_millis(52_000)).await;
    let host3 = connect(&state, "10.0.0.1").await;
    send(&state, &host3, json!({"type": "register", "token": "host-tok"})).await;
    sleep(Duration::from_millis(5_000)).await;

    let events = peer.drain();
    assert_eq!(typed(&events, "playerDisconnected").len(), 1);
    assert!(typed(&events, "playerLeft").is_empty());
    let shared = state.rooms.get(&room_id).await.unwrap();
    assert_eq!(shared.lock().await.players.len(), 2);
}

// Host-only operations are refused for everyone else.
#[tokio::test(start_paused = true)]
async fn non_host_cannot_start_or_delete() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({})).await;

    send(&state, &peer, json!({"type": "startGame", "roomId": room_id})).await;
    send(&state, &peer, json!({"type": "deleteRoom", "roomId": room_id})).await;

    let events = peer.drain();
    assert_eq!(typed(&events, "error").len(), 2);
    assert_eq!(room_phase(&state, &room_id).await, GamePhase::Lobby);
    assert!(state.rooms.get(&room_id).await.is_some());
    host.drain();
}

// Mid-game joiners wait as spectators and are promoted at game end.
#[tokio::test(start_paused = true)]
async fn spectator_promoted_after_game_over() {
    let state = test_state(&["BONJOUR"]);
    let mut host = connect(&state, "10.0.0.1").await;
    let mut peer = connect(&state, "10.0.0.2").await;
    let room_id = setup_room(&state, &mut host, &mut peer, json!({"startingLives": 1})).await;

    send(&state, &host, json!({"type": "startGame", "roomId": room_id})).await;
    sleep(Duration::from_millis(100)).await;

    let mut late = connect(&state, "10.0.0.3").await;
    send(&state, &late, json!({"type": "register", "token": "late-tok"})).await;
    send(
        &state,
        &late,
        json!({
            "type": "joinRoom",
            "roomId": room_id,
            "playerData": {"name": "late", "avatar": "a3"},
        }),
    )
    .await;

    let events = late.drain();
    assert_eq!(typed(&events, "joinedAsSpectator").len(), 1);
    let events = host.drain();
    let waiting = typed(&events, "spectatorsWaiting");
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0]["count"], 1);

    // First timeout eliminates the host and ends the game; the spectator
    // becomes a seated player in the next lobby.
    sleep(Duration::from_millis(8_600)).await;
    let events = late.drain();
    assert_eq!(typed(&events, "promotedToPlayer").len(), 1);

    let shared = state.rooms.get(&room_id).await.unwrap();
    let room = shared.lock().await;
    assert_eq!(room.players.len(), 3);
    assert!(room.pending_spectators.is_empty());
    peer.drain();
}
