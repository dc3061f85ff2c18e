//! Process-wide Room Registry / Metrics (§4.7): a single table of
//! `roomId -> {kind, playerCount}`, guarded by one mutex, updated on
//! register/unregister and on every join/leave of a known room kind.

use std::collections::HashMap;
use std::sync::Mutex;

use protocol::RoomKind;

#[derive(Debug, Clone, Copy)]
struct RoomEntry {
    kind: RoomKind,
    player_count: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub total_rooms: u32,
    pub waiting_rooms: u32,
    pub active_rooms: u32,
    pub waiting_players: u32,
    pub total_players: u32,
    pub presence_players: u32,
}

/// Process-wide mutable table. All writes are single-field increments or
/// decrements behind this one mutex (§5 "Shared resources").
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, RoomEntry>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, room_id: impl Into<String>, kind: RoomKind) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms.insert(room_id.into(), RoomEntry { kind, player_count: 0 });
    }

    pub fn unregister(&self, room_id: &str) {
        self.rooms.lock().unwrap().remove(room_id);
    }

    pub fn on_join(&self, room_id: &str) {
        if let Some(entry) = self.rooms.lock().unwrap().get_mut(room_id) {
            entry.player_count += 1;
        }
    }

    pub fn on_leave(&self, room_id: &str) {
        if let Some(entry) = self.rooms.lock().unwrap().get_mut(room_id) {
            entry.player_count = entry.player_count.saturating_sub(1);
        }
    }

    /// Aggregate counts. Presence rooms never count toward `total_rooms`
    /// (§4.7, §8 testable property).
    pub fn snapshot(&self) -> RegistrySnapshot {
        let rooms = self.rooms.lock().unwrap();
        let mut snap = RegistrySnapshot::default();
        for entry in rooms.values() {
            if entry.kind == RoomKind::Presence {
                snap.presence_players += entry.player_count;
                continue;
            }
            snap.total_rooms += 1;
            snap.total_players += entry.player_count;
            match entry.player_count {
                1 => {
                    snap.waiting_rooms += 1;
                    snap.waiting_players += 1;
                }
                n if n >= 2 => snap.active_rooms += 1,
                _ => {}
            }
        }
        snap
    }

    pub fn enlist(&self) -> Vec<(String, RoomKind, u32)> {
        self.rooms
            .lock()
            .unwrap()
            .iter()
            .map(|(id, e)| (id.clone(), e.kind, e.player_count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_never_counts_toward_total_rooms() {
        let reg = RoomRegistry::new();
        reg.register("p1", RoomKind::Presence);
        reg.on_join("p1");
        reg.on_join("p1");
        let snap = reg.snapshot();
        assert_eq!(snap.total_rooms, 0);
        assert_eq!(snap.presence_players, 2);
    }

    #[test]
    fn join_then_leave_returns_to_previous_count() {
        let reg = RoomRegistry::new();
        reg.register("c1", RoomKind::Combat);
        reg.on_join("c1");
        reg.on_join("c1");
        reg.on_leave("c1");
        let snap = reg.snapshot();
        assert_eq!(snap.total_players, 1);
        assert_eq!(snap.waiting_rooms, 1);
    }

    #[test]
    fn two_players_counts_as_active() {
        let reg = RoomRegistry::new();
        reg.register("c1", RoomKind::Combat);
        reg.on_join("c1");
        reg.on_join("c1");
        let snap = reg.snapshot();
        assert_eq!(snap.active_rooms, 1);
        assert_eq!(snap.waiting_rooms, 0);
    }

    #[test]
    fn unregister_removes_room() {
        let reg = RoomRegistry::new();
        reg.register("c1", RoomKind::Combat);
        reg.on_join("c1");
        reg.unregister("c1");
        let snap = reg.snapshot();
        assert_eq!(snap.total_rooms, 0);
    }
}
