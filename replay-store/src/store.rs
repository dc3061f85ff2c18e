//! §4.5 Replay Store: local filesystem with atomic rename+backup, and an
//! optional remote object store upload/list/read. Mode is one of `local`
//! (default), `remote`, `both`.

use std::path::PathBuf;

use sim_core::atomic_file::{read_with_backup_fallback, sanitize_id, write_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Local,
    Remote,
    Both,
}

impl ReplayMode {
    fn from_env_value(value: &str) -> Self {
        match value {
            "remote" => ReplayMode::Remote,
            "both" => ReplayMode::Both,
            _ => ReplayMode::Local,
        }
    }

    fn writes_local(self) -> bool {
        matches!(self, ReplayMode::Local | ReplayMode::Both)
    }

    fn writes_remote(self) -> bool {
        matches!(self, ReplayMode::Remote | ReplayMode::Both)
    }

    /// `both` swallows remote failures; `remote` does not.
    fn remote_failures_are_fatal(self) -> bool {
        matches!(self, ReplayMode::Remote)
    }

    fn reads_remote(self) -> bool {
        matches!(self, ReplayMode::Remote | ReplayMode::Both)
    }
}

#[derive(Debug, Clone)]
pub struct ReplayStoreConfig {
    pub mode: ReplayMode,
    pub dir: PathBuf,
    pub supabase_bucket: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<String>,
}

impl ReplayStoreConfig {
    pub fn from_env() -> Self {
        Self {
            mode: std::env::var("REPLAY_STORE")
                .map(|v| ReplayMode::from_env_value(&v))
                .unwrap_or(ReplayMode::Local),
            dir: std::env::var("REPLAY_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./replays")),
            supabase_bucket: std::env::var("REPLAY_SUPABASE_BUCKET").ok(),
            supabase_url: std::env::var("SUPABASE_URL").ok(),
            supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
        }
    }
}

pub struct ReplayStore {
    config: ReplayStoreConfig,
    client: Option<reqwest::Client>,
}

#[derive(Debug, Clone)]
pub struct ReplayListing {
    pub id: String,
    pub modified_at: std::time::SystemTime,
}

impl ReplayStore {
    pub fn from_env() -> Self {
        Self::new(ReplayStoreConfig::from_env())
    }

    pub fn new(config: ReplayStoreConfig) -> Self {
        let client = if config.mode.writes_remote() || config.mode.reads_remote() {
            Some(reqwest::Client::new())
        } else {
            None
        };
        Self { config, client }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.config.dir.join(format!("{}.json", sanitize_id(id)))
    }

    /// Writes `bytes` under `id`. Local write (when enabled) must succeed;
    /// remote upload failures are swallowed unless `mode == remote`.
    pub async fn write(&self, id: &str, bytes: &[u8]) -> Result<(), String> {
        if self.config.mode.writes_local() {
            tokio::fs::create_dir_all(&self.config.dir)
                .await
                .map_err(|e| format!("failed to create replay dir: {e}"))?;
            write_atomic(&self.path_for(id), bytes).await?;
        }

        if self.config.mode.writes_remote() {
            match self.upload_remote(id, bytes).await {
                Ok(()) => {}
                Err(e) if self.config.mode.remote_failures_are_fatal() => return Err(e),
                Err(e) => tracing::warn!(error = %e, id, "remote replay upload failed, swallowed"),
            }
        }

        Ok(())
    }

    /// Reads `id`: prefers local, falls back to remote when enabled.
    pub async fn read(&self, id: &str) -> Result<Option<Vec<u8>>, String> {
        if self.config.mode.writes_local() {
            if let Some(bytes) = read_with_backup_fallback(&self.path_for(id)).await? {
                return Ok(Some(bytes));
            }
        }
        if self.config.mode.reads_remote() {
            return self.download_remote(id).await;
        }
        Ok(None)
    }

    /// Lists up to 200 local replay ids, newest modification time first.
    pub async fn list(&self) -> Result<Vec<ReplayListing>, String> {
        if !self.config.mode.writes_local() {
            return Ok(Vec::new());
        }
        let mut read_dir = match tokio::fs::read_dir(&self.config.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(format!("failed to list replay dir: {e}")),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| e.to_string())? {
            let path = entry.path();
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(modified_at) = metadata.modified() else { continue };
            entries.push(ReplayListing { id: name.to_string(), modified_at });
        }

        entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        entries.truncate(200);
        Ok(entries)
    }

    async fn upload_remote(&self, id: &str, bytes: &[u8]) -> Result<(), String> {
        let client = self.client.as_ref().ok_or("replay store has no remote client configured")?;
        let url = self.remote_object_url(id)?;
        let key = self.config.supabase_service_role_key.as_deref().unwrap_or_default();
        let response = client
            .post(&url)
            .header("apikey", key)
            .header("authorization", format!("Bearer {key}"))
            .header("content-type", "application/json")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("remote upload returned status {}", response.status()));
        }
        Ok(())
    }

    async fn download_remote(&self, id: &str) -> Result<Option<Vec<u8>>, String> {
        let client = self.client.as_ref().ok_or("replay store has no remote client configured")?;
        let url = self.remote_object_url(id)?;
        let key = self.config.supabase_service_role_key.as_deref().unwrap_or_default();
        let response = client
            .get(&url)
            .header("apikey", key)
            .header("authorization", format!("Bearer {key}"))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("remote download returned status {}", response.status()));
        }
        Ok(Some(response.bytes().await.map_err(|e| e.to_string())?.to_vec()))
    }

    fn remote_object_url(&self, id: &str) -> Result<String, String> {
        let base = self.config.supabase_url.as_deref().ok_or("SUPABASE_URL is not set")?;
        let bucket = self.config.supabase_bucket.as_deref().unwrap_or("replays");
        Ok(format!("{base}/storage/v1/object/{bucket}/{}.json", sanitize_id(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_only_config(dir: PathBuf) -> ReplayStoreConfig {
        ReplayStoreConfig {
            mode: ReplayMode::Local,
            dir,
            supabase_bucket: None,
            supabase_url: None,
            supabase_service_role_key: None,
        }
    }

    #[tokio::test]
    async fn writes_then_reads_back_local() {
        let dir = std::env::temp_dir().join(format!("replay_store_test_{}", std::process::id()));
        let store = ReplayStore::new(local_only_config(dir.clone()));

        store.write("match_123", b"{\"v\":1}").await.unwrap();
        let read_back = store.read("match_123").await.unwrap().unwrap();
        assert_eq!(read_back, b"{\"v\":1}");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_replay_reads_as_none() {
        let dir = std::env::temp_dir().join(format!("replay_store_test_missing_{}", std::process::id()));
        let store = ReplayStore::new(local_only_config(dir.clone()));
        assert!(store.read("nope").await.unwrap().is_none());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_caps_at_200() {
        let dir = std::env::temp_dir().join(format!("replay_store_test_list_{}", std::process::id()));
        let store = ReplayStore::new(local_only_config(dir.clone()));

        for i in 0..5 {
            store.write(&format!("match_{i}"), b"{}").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let listing = store.list().await.unwrap();
        assert_eq!(listing.len(), 5);
        assert_eq!(listing[0].id, "match_4");
        assert_eq!(listing[4].id, "match_0");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
