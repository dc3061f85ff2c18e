//! §4.6 Match Recorder: accumulates one room's lifetime into a single
//! replay blob and hands it to the `ReplayStore` once, at dispose.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::store::ReplayStore;

const MAX_INPUTS: usize = 20_000;
const MAX_SNAPSHOTS: usize = 2_000;
const REPLAY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct PlayerRecord {
    pub address: String,
    pub profile_picture_url: Option<String>,
    pub ticket_token_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedInput {
    pub session_id: u32,
    pub at_ms: u64,
    pub kind: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedSnapshot {
    pub at_ms: u64,
    pub summary: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SettlementBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loser_token_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SettlementBlock {
    /// Merges `update` over `self` field-by-field, so an asynchronous
    /// tx-hash arriving after an earlier error (or vice versa) doesn't
    /// clobber whichever field was already captured (§4.6), and so the
    /// loser/winner captured synchronously survive the later async merge.
    fn merge(&mut self, update: SettlementBlock) {
        if update.loser_token_id.is_some() {
            self.loser_token_id = update.loser_token_id;
        }
        if update.winner_address.is_some() {
            self.winner_address = update.winner_address;
        }
        if update.tx_hash.is_some() {
            self.tx_hash = update.tx_hash;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        for (key, value) in update.extra {
            self.extra.insert(key, value);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchPhase {
    pub started_at_ms: Option<u64>,
    pub planned_end_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub end_reason: Option<String>,
    pub winner_session_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct ReplayHeader {
    version: u32,
    id: String,
    room_id: String,
    room_name: String,
    created_at_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
struct ReplayDocument {
    header: ReplayHeader,
    phase: MatchPhase,
    players: HashMap<u32, PlayerRecord>,
    inputs: Vec<RecordedInput>,
    snapshots: Vec<RecordedSnapshot>,
    settlement: SettlementBlock,
}

pub struct MatchRecorder {
    store: Arc<ReplayStore>,
    header: ReplayHeader,
    phase: MatchPhase,
    players: HashMap<u32, PlayerRecord>,
    inputs: Vec<RecordedInput>,
    snapshots: Vec<RecordedSnapshot>,
    settlement: SettlementBlock,
    last_snapshot_at_ms: Option<u64>,
    snapshot_interval: Duration,
}

impl MatchRecorder {
    pub fn new(store: Arc<ReplayStore>, room_id: String, room_name: String, created_at_ms: u64, snapshot_interval: Duration) -> Self {
        let id = format!("{room_id}_{created_at_ms}");
        Self {
            store,
            header: ReplayHeader { version: REPLAY_VERSION, id, room_id, room_name, created_at_ms },
            phase: MatchPhase::default(),
            players: HashMap::new(),
            inputs: Vec::new(),
            snapshots: Vec::new(),
            settlement: SettlementBlock::default(),
            last_snapshot_at_ms: None,
            snapshot_interval,
        }
    }

    pub fn record_join(&mut self, session_id: u32, record: PlayerRecord) {
        self.players.insert(session_id, record);
    }

    pub fn record_leave(&mut self, session_id: u32) {
        self.players.remove(&session_id);
    }

    /// Silently drops once the hard cap is reached, bounding memory use.
    pub fn record_input(&mut self, session_id: u32, at_ms: u64, kind: impl Into<String>, payload: serde_json::Value) {
        if self.inputs.len() >= MAX_INPUTS {
            return;
        }
        self.inputs.push(RecordedInput { session_id, at_ms, kind: kind.into(), payload });
    }

    /// Appends a snapshot if `force` or the interval has elapsed; hard
    /// capped at 2,000 entries.
    pub fn maybe_snapshot(&mut self, at_ms: u64, summary: serde_json::Value, force: bool) {
        if self.snapshots.len() >= MAX_SNAPSHOTS {
            return;
        }
        let elapsed = self.last_snapshot_at_ms.map(|prev| at_ms.saturating_sub(prev)).unwrap_or(u64::MAX);
        if !force && elapsed < self.snapshot_interval.as_millis() as u64 {
            return;
        }
        self.last_snapshot_at_ms = Some(at_ms);
        self.snapshots.push(RecordedSnapshot { at_ms, summary });
    }

    pub fn start_match(&mut self, started_at_ms: u64, planned_end_at_ms: u64) {
        self.phase.started_at_ms = Some(started_at_ms);
        self.phase.planned_end_at_ms = Some(planned_end_at_ms);
    }

    pub fn end_match(&mut self, ended_at_ms: u64, end_reason: impl Into<String>, winner_session_id: Option<u32>) {
        self.phase.ended_at_ms = Some(ended_at_ms);
        self.phase.end_reason = Some(end_reason.into());
        self.phase.winner_session_id = winner_session_id;
    }

    pub fn set_settlement(&mut self, update: SettlementBlock) {
        self.settlement.merge(update);
    }

    /// Serializes the accumulated document synchronously. Exposed so a
    /// caller holding this recorder behind a lock that can't be held across
    /// an `.await` (e.g. a room task's owning `std::sync::Mutex`) can drop
    /// the lock before performing the async store write itself.
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        let document = ReplayDocument {
            header: self.header.clone(),
            phase: self.phase.clone(),
            players: self.players.clone(),
            inputs: self.inputs.clone(),
            snapshots: self.snapshots.clone(),
            settlement: self.settlement.clone(),
        };
        serde_json::to_vec(&document).map_err(|e| e.to_string())
    }

    /// Writes the accumulated document to the Replay Store. Callers are
    /// responsible for calling this exactly once per match (§4.6); store
    /// errors are captured into the settlement block's `error` field
    /// rather than propagated.
    pub async fn finalize(&mut self) {
        let bytes = match self.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, id = self.header.id, "failed to serialize replay document");
                return;
            }
        };

        if let Err(e) = self.store.write(&self.header.id, &bytes).await {
            tracing::error!(error = %e, id = self.header.id, "failed to finalize replay");
            self.settlement.error = Some(e);
        }
    }

    pub fn replay_id(&self) -> &str {
        &self.header.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ReplayMode, ReplayStoreConfig};
    use serde_json::json;

    fn store_at(dir: std::path::PathBuf) -> Arc<ReplayStore> {
        Arc::new(ReplayStore::new(ReplayStoreConfig {
            mode: ReplayMode::Local,
            dir,
            supabase_bucket: None,
            supabase_url: None,
            supabase_service_role_key: None,
        }))
    }

    #[test]
    fn inputs_stop_appending_past_the_hard_cap() {
        let store = store_at(std::env::temp_dir().join("recorder_unused"));
        let mut recorder = MatchRecorder::new(store, "room1".into(), "Room One".into(), 0, Duration::from_millis(500));
        for i in 0..(MAX_INPUTS + 10) {
            recorder.record_input(1, i as u64, "position", json!({}));
        }
        assert_eq!(recorder.inputs.len(), MAX_INPUTS);
    }

    #[test]
    fn snapshot_respects_interval_unless_forced() {
        let store = store_at(std::env::temp_dir().join("recorder_unused2"));
        let mut recorder = MatchRecorder::new(store, "room1".into(), "Room One".into(), 0, Duration::from_millis(500));
        recorder.maybe_snapshot(0, json!({}), false);
        recorder.maybe_snapshot(100, json!({}), false);
        assert_eq!(recorder.snapshots.len(), 1);
        recorder.maybe_snapshot(150, json!({}), true);
        assert_eq!(recorder.snapshots.len(), 2);
        recorder.maybe_snapshot(700, json!({}), false);
        assert_eq!(recorder.snapshots.len(), 3);
    }

    #[test]
    fn settlement_merge_preserves_earlier_error_when_update_only_has_hash() {
        let store = store_at(std::env::temp_dir().join("recorder_unused3"));
        let mut recorder = MatchRecorder::new(store, "room1".into(), "Room One".into(), 0, Duration::from_millis(500));
        recorder.set_settlement(SettlementBlock { error: Some("timeout".into()), ..Default::default() });
        recorder.set_settlement(SettlementBlock { tx_hash: Some("0xdead".into()), ..Default::default() });
        assert_eq!(recorder.settlement.tx_hash.as_deref(), Some("0xdead"));
        assert_eq!(recorder.settlement.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn settlement_keeps_loser_and_winner_once_tx_hash_merges_in() {
        let store = store_at(std::env::temp_dir().join("recorder_unused4"));
        let mut recorder = MatchRecorder::new(store, "room1".into(), "Room One".into(), 0, Duration::from_millis(500));
        recorder.set_settlement(SettlementBlock { loser_token_id: Some(2), winner_address: Some("0xAA".into()), ..Default::default() });
        recorder.set_settlement(SettlementBlock { tx_hash: Some("0xdead".into()), ..Default::default() });
        assert_eq!(recorder.settlement.loser_token_id, Some(2));
        assert_eq!(recorder.settlement.winner_address.as_deref(), Some("0xAA"));
        assert_eq!(recorder.settlement.tx_hash.as_deref(), Some("0xdead"));
    }

    #[tokio::test]
    async fn finalize_writes_document_to_store() {
        let dir = std::env::temp_dir().join(format!("recorder_finalize_{}", std::process::id()));
        let store = store_at(dir.clone());
        let mut recorder = MatchRecorder::new(store.clone(), "room1".into(), "Room One".into(), 42, Duration::from_millis(500));
        recorder.record_join(1, PlayerRecord { address: "0xAA".into(), profile_picture_url: None, ticket_token_id: Some(7) });
        let id = recorder.replay_id().to_string();
        recorder.finalize().await;

        let bytes = store.read(&id).await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["header"]["room_id"], "room1");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
