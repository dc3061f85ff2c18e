//! Gateway-level configuration: everything in §6's environment variable
//! table that isn't already owned by one of the service crates (those each
//! carry their own `*Config::from_env`, called from [`crate::state::AppState::from_env`]).

use std::path::PathBuf;

/// Built by one `ServerConfig::from_env()` call in `main`, matching the
/// teacher's single typed config loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PORT` — listen port.
    pub port: u16,
    /// Not in §6's enumerated list (the distilled spec never names where
    /// conquest saves land on disk); grounded in the same pattern as
    /// `REPLAY_DIR` for the replay store.
    pub conquest_save_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = parse_port(std::env::var("PORT").ok().as_deref());
        let conquest_save_dir =
            std::env::var("CONQUEST_SAVE_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./saves"));
        Self { port, conquest_save_dir }
    }
}

fn parse_port(raw: Option<&str>) -> u16 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(8080)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_port_falls_back_to_default() {
        assert_eq!(parse_port(None), 8080);
    }

    #[test]
    fn garbage_port_falls_back_to_default() {
        assert_eq!(parse_port(Some("not-a-port")), 8080);
    }

    #[test]
    fn valid_port_is_used() {
        assert_eq!(parse_port(Some("9001")), 9001);
    }
}
