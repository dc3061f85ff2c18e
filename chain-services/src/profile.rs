//! Profile Service: key/value profile fetch (profile picture URL, display
//! name) backed by Supabase's REST interface, with the 1,200 ms hard cap
//! and TTL cache the combat room orchestrator relies on (§4.10, §5).

use std::time::Duration;

use serde::Deserialize;

use crate::cache::{clamp_ttl, TtlCache};

const FETCH_TIMEOUT: Duration = Duration::from_millis(1_200);
const DEFAULT_TTL: Duration = Duration::from_secs(60);
const MIN_TTL: Duration = Duration::from_secs(5);
const MAX_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub supabase_url: Option<String>,
    pub service_role_key: Option<String>,
    pub ttl: Duration,
}

impl ProfileConfig {
    pub fn from_env() -> Self {
        Self {
            supabase_url: std::env::var("SUPABASE_URL").ok(),
            service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            ttl: clamp_ttl(DEFAULT_TTL, MIN_TTL, MAX_TTL),
        }
    }
}

pub struct ProfileService {
    config: ProfileConfig,
    client: Option<reqwest::Client>,
    cache: TtlCache<String, Profile>,
}

impl ProfileService {
    pub fn from_env() -> Self {
        Self::new(ProfileConfig::from_env())
    }

    pub fn new(config: ProfileConfig) -> Self {
        let client = if config.supabase_url.is_some() && config.service_role_key.is_some() {
            reqwest::Client::builder().timeout(FETCH_TIMEOUT).build().ok()
        } else {
            None
        };
        let cache = TtlCache::new(config.ttl);
        Self { config, client, cache }
    }

    /// Fetches the profile row for `address`, applying the 1,200 ms hard
    /// cap. Returns the default (empty) profile on timeout, network error,
    /// missing row, or when unconfigured — the join must proceed regardless
    /// (§4.10 "join proceeds with defaults").
    pub async fn fetch(&self, address: &str) -> Profile {
        if let Some(cached) = self.cache.get(&address.to_string()).await {
            return cached;
        }
        let profile = match tokio::time::timeout(FETCH_TIMEOUT, self.fetch_uncached(address)).await {
            Ok(Some(profile)) => profile,
            Ok(None) => Profile::default(),
            Err(_) => {
                tracing::warn!(address, "profile fetch exceeded 1200ms, using defaults");
                Profile::default()
            }
        };
        self.cache.put(address.to_string(), profile.clone()).await;
        profile
    }

    async fn fetch_uncached(&self, address: &str) -> Option<Profile> {
        let client = self.client.as_ref()?;
        let base = self.config.supabase_url.as_ref()?;
        let key = self.config.service_role_key.as_ref()?;
        let url = format!("{}/rest/v1/profiles?address=eq.{}&select=display_name,profile_picture_url", base, address);

        let response = client
            .get(&url)
            .header("apikey", key)
            .header("authorization", format!("Bearer {key}"))
            .send()
            .await
            .map_err(|e| tracing::warn!(error = %e, address, "profile fetch request failed"))
            .ok()?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), address, "profile fetch returned non-success status");
            return None;
        }

        let rows: Vec<Profile> = response
            .json()
            .await
            .map_err(|e| tracing::warn!(error = %e, address, "profile fetch returned malformed JSON"))
            .ok()?;
        rows.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_service_returns_default_profile() {
        let service = ProfileService::new(ProfileConfig { supabase_url: None, service_role_key: None, ttl: DEFAULT_TTL });
        let profile = service.fetch("0xAA").await;
        assert_eq!(profile, Profile::default());
    }

    #[tokio::test]
    async fn cached_profile_short_circuits_fetch() {
        let service = ProfileService::new(ProfileConfig { supabase_url: None, service_role_key: None, ttl: DEFAULT_TTL });
        let seeded = Profile { display_name: Some("Nova".into()), profile_picture_url: None };
        service.cache.put("0xAA".to_string(), seeded.clone()).await;
        assert_eq!(service.fetch("0xAA").await, seeded);
    }
}
