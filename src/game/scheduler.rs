// Per-room turn scheduler.
//
// One task per playing room owns the turn timer: it starts rounds, ticks,
// applies timeout losses and advances turns. Handlers never expire a timer
// themselves; they set a turn flag and signal the loop, which is what keeps
// two expirations from double-charging a life.
//
// Flow per round:
//   syllableUpdate -> timerUpdate* -> (wordAccepted | timeout) -> next round

use crate::dictionary::DictionaryIndex;
use crate::game::scenario::{self, Scenario};
use crate::room::registry::SharedRoom;
use crate::room::{
    GamePhase, Room, TurnFlag,
    model::{RESUME_FLOOR, SERVER_CONTROL_MS},
};
use crate::state::AppState;
use crate::ws::core::hub;
use crate::ws::messages::ServerMessage;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use tokio::time::{Duration, Instant, sleep};

const TICK: Duration = Duration::from_millis(100);

/// Selection falls through to the seed list when the index is still
/// building.
static EMPTY_INDEX: Lazy<DictionaryIndex> =
    Lazy::new(|| DictionaryIndex::build_from_lines(Vec::<String>::new(), 0));

enum RoundStart {
    Started,
    Finished,
}

enum TurnOutcome {
    WordAccepted,
    Aborted,
    TimedOut,
    Stopped,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LossResult {
    Continued,
    GameEnded,
}

/// Drive one room's game until it leaves the `playing` phase.
pub async fn run_game_loop(state: AppState, shared: SharedRoom) {
    loop {
        match start_round(&state, &shared).await {
            RoundStart::Started => {}
            RoundStart::Finished => break,
        }

        match run_turn(&state, &shared).await {
            TurnOutcome::WordAccepted => {
                let mut room = shared.lock().await;
                room.advance_to_next_alive();
            }
            TurnOutcome::Aborted => {}
            TurnOutcome::TimedOut => {
                let mut room = shared.lock().await;
                let idx = room.game.current_player_index;
                if apply_life_loss(&state, &mut room, idx).await == LossResult::GameEnded {
                    break;
                }
            }
            TurnOutcome::Stopped => break,
        }
    }

    hub::broadcast_rooms_list(&state).await;
    tracing::debug!("game loop ended");
}

/// Choose the next syllable, arm the timer and broadcast `syllableUpdate`.
async fn start_round(state: &AppState, shared: &SharedRoom) -> RoundStart {
    let mut room = shared.lock().await;
    if room.phase != GamePhase::Playing {
        return RoundStart::Finished;
    }
    if room.alive_count() <= 1 {
        end_game(state, &mut room).await;
        return RoundStart::Finished;
    }
    if !room
        .current_player()
        .map(|p| p.can_take_turn())
        .unwrap_or(false)
        && !room.advance_to_next_alive()
    {
        end_game(state, &mut room).await;
        return RoundStart::Finished;
    }

    let index = state.dictionary.get();
    let index: &DictionaryIndex = index.as_deref().unwrap_or(&EMPTY_INDEX);
    let train: Option<HashSet<String>> = match room.settings.scenario {
        Some(Scenario::TrainSkip) => room
            .settings
            .train_syllables
            .as_ref()
            .map(|list| list.iter().map(|s| s.trim().to_uppercase()).collect()),
        _ => None,
    };

    let scenario_kind = room.settings.scenario;
    let syllable = scenario::choose_syllable(
        index,
        scenario_kind,
        &mut room.game.used_syllables,
        train.as_ref(),
    );
    let Some(syllable) = syllable else {
        // Practice set exhausted: the game ends instead of hanging.
        end_game(state, &mut room).await;
        return RoundStart::Finished;
    };

    room.game.used_syllables.insert(syllable.clone());
    room.game.round_number += 1;
    room.game.current_syllable = Some(syllable.clone());
    room.game.turn_flag = None;
    room.game.paused = false;
    room.game.paused_remaining = None;
    room.game.timer_total = room.settings.turn_total();
    room.game.started_at_ms = Some(chrono::Utc::now().timestamp_millis());

    let now = Instant::now();
    room.game.deadline = Some(now + room.game.timer_total);
    room.game.server_controlled_until = Some(now + Duration::from_millis(SERVER_CONTROL_MS));

    let player_index = room.game.current_player_index;
    let player = room
        .current_player()
        .map(|p| p.name.clone())
        .unwrap_or_default();
    let msg = ServerMessage::SyllableUpdate {
        syllable: syllable.clone(),
        player_index,
        player,
        round_number: room.game.round_number,
        count: index.count_for(&syllable),
    };
    hub::broadcast_room(state, &room, &msg).await;
    RoundStart::Started
}

/// Tick until the turn resolves. The timer handle is cleared before any
/// loss is applied, so a racing word acceptance can never double-resolve.
async fn run_turn(state: &AppState, shared: &SharedRoom) -> TurnOutcome {
    let signals = shared.lock().await.signals.clone();
    loop {
        tokio::select! {
            _ = sleep(TICK) => {
                let mut room = shared.lock().await;
                if room.phase != GamePhase::Playing {
                    return TurnOutcome::Stopped;
                }
                if room.game.paused {
                    continue;
                }
                let Some(deadline) = room.game.deadline else {
                    continue;
                };
                let now = Instant::now();
                if now >= deadline {
                    room.game.deadline = None;
                    if let Some(flag) = room.game.turn_flag.take() {
                        return match flag {
                            TurnFlag::WordAccepted => TurnOutcome::WordAccepted,
                            TurnFlag::Aborted => TurnOutcome::Aborted,
                        };
                    }
                    let (socket_id, player_name) = room
                        .current_player()
                        .map(|p| (p.socket_id, p.name.clone()))
                        .unwrap_or((None, String::new()));
                    hub::broadcast_room(
                        state,
                        &room,
                        &ServerMessage::Timeout {
                            socket_id,
                            player_name,
                        },
                    )
                    .await;
                    return TurnOutcome::TimedOut;
                }
                let msg = ServerMessage::TimerUpdate {
                    remaining: deadline.saturating_duration_since(now).as_millis() as u64,
                    total: room.game.timer_total.as_millis() as u64,
                };
                hub::broadcast_room(state, &room, &msg).await;
            }
            _ = signals.turn_over.notified() => {
                let mut room = shared.lock().await;
                match room.game.turn_flag.take() {
                    Some(TurnFlag::WordAccepted) => return TurnOutcome::WordAccepted,
                    Some(TurnFlag::Aborted) => return TurnOutcome::Aborted,
                    None if room.phase != GamePhase::Playing => return TurnOutcome::Stopped,
                    None => {}
                }
            }
            _ = signals.stop.notified() => {
                return TurnOutcome::Stopped;
            }
        }
    }
}

/// Decrement a player's lives, eliminating and ending the game as needed.
/// When the loser held the turn, the turn advances here; the loop then
/// starts the next round.
pub async fn apply_life_loss(state: &AppState, room: &mut Room, idx: usize) -> LossResult {
    let Some(player) = room.players.get_mut(idx) else {
        return LossResult::Continued;
    };
    player.lives = player.lives.saturating_sub(1);
    let lives_left = player.lives;
    let player_name = player.name.clone();

    hub::broadcast_room(
        state,
        room,
        &ServerMessage::PlayerLostLife {
            player_name: player_name.clone(),
            player_index: idx,
            lives_left,
        },
    )
    .await;

    if lives_left == 0 {
        room.players[idx].is_alive = false;
        hub::broadcast_room(
            state,
            room,
            &ServerMessage::PlayerEliminated {
                player_name,
                player_index: idx,
            },
        )
        .await;
    }

    if room.alive_count() <= 1 {
        end_game(state, room).await;
        return LossResult::GameEnded;
    }

    if room.game.current_player_index == idx {
        room.advance_to_next_alive();
        let msg = ServerMessage::TurnChanged {
            player_index: room.game.current_player_index,
            player_name: room
                .current_player()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
        };
        hub::broadcast_room(state, room, &msg).await;
    }
    LossResult::Continued
}

/// Freeze the remaining turn time without drift.
pub async fn pause_round(state: &AppState, room: &mut Room, reason: &str) {
    if room.phase != GamePhase::Playing || room.game.paused {
        return;
    }
    let Some(deadline) = room.game.deadline.take() else {
        return;
    };
    room.game.paused_remaining = Some(deadline.saturating_duration_since(Instant::now()));
    room.game.paused = true;
    hub::broadcast_room(
        state,
        room,
        &ServerMessage::GamePaused {
            reason: reason.to_string(),
        },
    )
    .await;
}

/// Resume from the frozen remainder, floored so the returning player gets a
/// fair window.
pub async fn resume_round(state: &AppState, room: &mut Room) {
    if !room.game.paused {
        return;
    }
    let remaining = room
        .game
        .paused_remaining
        .take()
        .unwrap_or(RESUME_FLOOR)
        .max(RESUME_FLOOR);
    room.game.paused = false;
    room.game.deadline = Some(Instant::now() + remaining);
    hub::broadcast_room(
        state,
        room,
        &ServerMessage::GameResumed {
            remaining: remaining.as_millis() as u64,
        },
    )
    .await;
}

/// Stop the timer, settle the winner, promote waiting spectators and return
/// the room to the lobby. `finished` is transient by design.
pub async fn end_game(state: &AppState, room: &mut Room) {
    room.game.deadline = None;
    room.game.paused = false;
    room.game.paused_remaining = None;

    let winner = room
        .players
        .iter()
        .find(|p| p.is_alive && p.lives > 0)
        .map(|p| p.name.clone());
    room.phase = GamePhase::Finished;

    let promoted = room.reset_for_lobby();
    hub::broadcast_room(
        state,
        room,
        &ServerMessage::GameOver {
            winner,
            players: room.players.clone(),
            game_state: room.phase,
        },
    )
    .await;
    for player_name in promoted {
        hub::broadcast_room(state, room, &ServerMessage::PromotedToPlayer { player_name }).await;
    }

    // Wake the loop in case the game was ended from a handler.
    room.signals.stop.notify_waiters();
}
