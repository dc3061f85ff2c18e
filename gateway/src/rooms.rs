//! Room lookup/creation: the same room name always maps to the same room
//! actor (§3 "created on demand by a registry keyed by name"). A combat
//! room and a conquest room can share a name without colliding because the
//! actual registry key is namespaced by kind.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use combat_room::{CombatRoomDeps, CombatRoomLogic};
use conquest_room::{ConquestRoomDeps, ConquestRoomLogic};
use protocol::{CHANNEL_BUFFER_SIZE, RoomKind};
use replay_store::MatchRecorder;
use sim_core::run_room;

use crate::state::{AppState, CombatInbox, ConquestInbox, RoomHandle, now_ms};

/// A replay snapshot no more than once a (simulated) second; §4.10's tick
/// itself decides when a snapshot is actually forced, this is just the
/// recorder's own bookkeeping interval.
const RECORDER_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(1_000);

/// Looks up a live combat room actor for `room_name`, spawning one if none
/// exists yet or the previous one has already disposed.
pub async fn get_or_create_combat(state: &Arc<AppState>, room_name: &str) -> CombatInbox {
    let room_id = combat_room_id(room_name);
    let mut rooms = state.rooms.lock().await;
    if let Some(RoomHandle::Combat(tx)) = rooms.get(&room_id) {
        if !tx.is_closed() {
            return tx.clone();
        }
    }

    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    state.registry.register(room_id.clone(), RoomKind::Combat);

    let recorder = Arc::new(std::sync::Mutex::new(MatchRecorder::new(
        state.replay_store.clone(),
        room_id.clone(),
        room_name.to_string(),
        now_ms(),
        RECORDER_SNAPSHOT_INTERVAL,
    )));
    let deps = CombatRoomDeps { room_id: room_id.clone(), ticket: state.ticket.clone(), recorder: recorder.clone() };
    let logic = CombatRoomLogic::new(deps);

    let registry = state.registry.clone();
    let replay_store = state.replay_store.clone();
    let spawned_room_id = room_id.clone();
    tokio::spawn(async move {
        run_room(spawned_room_id.clone(), logic, rx, registry).await;
        finalize_replay(&replay_store, &recorder, &spawned_room_id).await;
    });

    rooms.insert(room_id, RoomHandle::Combat(tx.clone()));
    tx
}

/// §4.6 "finalize: write to the Replay Store once" — run after the room
/// actor task has returned, i.e. exactly once per match, outside the
/// synchronous `RoomLogic` hot path.
async fn finalize_replay(
    store: &Arc<replay_store::ReplayStore>,
    recorder: &Arc<std::sync::Mutex<MatchRecorder>>,
    room_id: &str,
) {
    let (replay_id, bytes) = {
        let guard = recorder.lock().unwrap();
        (guard.replay_id().to_string(), guard.to_bytes())
    };
    match bytes {
        Ok(bytes) => {
            if let Err(e) = store.write(&replay_id, &bytes).await {
                tracing::error!(error = %e, room_id, replay_id, "failed to write replay on room dispose");
            }
        }
        Err(e) => tracing::error!(error = %e, room_id, replay_id, "failed to serialize replay on dispose"),
    }
}

/// Looks up a live conquest room actor for `room_name`, spawning one if
/// none exists yet. Unlike combat, an empty conquest room is never torn
/// down by the actor itself (§4.11) — it only stops when the gateway
/// drops its inbox sender (process shutdown).
pub async fn get_or_create_conquest(state: &Arc<AppState>, room_name: &str, seed_override: Option<u64>) -> ConquestInbox {
    let room_id = conquest_room_id(room_name);
    let mut rooms = state.rooms.lock().await;
    if let Some(RoomHandle::Conquest(tx)) = rooms.get(&room_id) {
        if !tx.is_closed() {
            return tx.clone();
        }
    }

    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    state.registry.register(room_id.clone(), RoomKind::Conquest);

    let saved = conquest_room::persistence::load(&state.config.conquest_save_dir, room_name).await;
    let deps = ConquestRoomDeps { galaxy_id: room_name.to_string(), save_dir: state.config.conquest_save_dir.clone() };
    let logic = ConquestRoomLogic::new(deps, seed_override, saved);

    let registry = state.registry.clone();
    let spawned_room_id = room_id.clone();
    tokio::spawn(async move {
        run_room(spawned_room_id.clone(), logic, rx, registry).await;
        tracing::info!(room_id = %spawned_room_id, "conquest room actor stopped");
    });

    rooms.insert(room_id, RoomHandle::Conquest(tx.clone()));
    tx
}

/// Namespaces a room name by kind so a combat room and a conquest room can
/// share a human-chosen name without their registry/handle keys colliding.
fn combat_room_id(room_name: &str) -> String {
    format!("{room_name}#combat")
}

fn conquest_room_id(room_name: &str) -> String {
    format!("{room_name}#conquest")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combat_and_conquest_ids_never_collide_for_the_same_name() {
        assert_ne!(combat_room_id("arena-1"), conquest_room_id("arena-1"));
    }

    #[test]
    fn same_name_and_kind_always_maps_to_the_same_id() {
        assert_eq!(combat_room_id("arena-1"), combat_room_id("arena-1"));
    }
}
