//! NFT Bonus Service (§4.4): reads an ERC-721 balance and maps it to a
//! small table of combat bonuses, with a per-address TTL cache so a busy
//! lobby doesn't hammer the RPC endpoint on every join.

use std::time::Duration;

use ethers::prelude::{Address, Http, Provider, U256};

use crate::cache::{clamp_ttl, TtlCache};

const ERC721_BALANCE_OF_ABI: &str = r#"[
  {"name":"balanceOf","type":"function","stateMutability":"view","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}]}
]"#;

const MAX_BALANCE: u32 = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(60);
const MIN_TTL: Duration = Duration::from_secs(5);
const MAX_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NftBonus {
    pub armor_regen_rate: u32,
    pub bonus_max_hp: u32,
    pub bonus_crit_percent: u32,
    pub bonus_dmg: u32,
}

impl NftBonus {
    /// §4.4's bonus ladder: each threshold applies independently and the
    /// thresholds stack ("≥1 ... else 1; ≥2 ... ; ≥3 ...; ≥5 ...").
    fn from_balance(balance: u32) -> Self {
        let balance = balance.min(MAX_BALANCE);
        Self {
            armor_regen_rate: if balance >= 1 { 2 } else { 1 },
            bonus_max_hp: if balance >= 2 { 5 } else { 0 },
            bonus_crit_percent: if balance >= 3 { 2 } else { 0 },
            bonus_dmg: if balance >= 5 { 3 } else { 0 },
        }
    }

    fn none() -> Self {
        Self { armor_regen_rate: 1, bonus_max_hp: 0, bonus_crit_percent: 0, bonus_dmg: 0 }
    }
}

#[derive(Debug, Clone)]
pub struct NftBonusConfig {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub enabled: bool,
    pub ttl: Duration,
}

impl NftBonusConfig {
    pub fn from_env() -> Self {
        let ttl_ms: u64 = std::env::var("PVP_NFT_BONUSES_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TTL.as_millis() as u64);
        Self {
            rpc_url: std::env::var("RONIN_RPC_URL").ok(),
            contract_address: std::env::var("RONKEVERSE_NFT_CONTRACT_ADDRESS").ok(),
            enabled: std::env::var("PVP_NFT_BONUSES_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            ttl: clamp_ttl(Duration::from_millis(ttl_ms), MIN_TTL, MAX_TTL),
        }
    }
}

pub struct NftBonusService {
    config: NftBonusConfig,
    contract: Option<ethers::contract::Contract<Provider<Http>>>,
    cache: TtlCache<String, NftBonus>,
}

impl NftBonusService {
    pub fn from_env() -> Self {
        Self::new(NftBonusConfig::from_env())
    }

    pub fn new(config: NftBonusConfig) -> Self {
        let contract = if config.enabled { build_contract(&config) } else { None };
        let cache = TtlCache::new(config.ttl);
        Self { config, contract, cache }
    }

    /// Returns the no-bonus baseline when disabled, unconfigured, or the
    /// address fails to parse; never errors out to the caller.
    pub async fn bonus_for(&self, address: &str) -> NftBonus {
        if !self.config.enabled {
            return NftBonus::none();
        }
        if let Some(cached) = self.cache.get(&address.to_string()).await {
            return cached;
        }
        let Some(contract) = &self.contract else {
            return NftBonus::none();
        };
        let Ok(owner) = address.parse::<Address>() else {
            return NftBonus::none();
        };

        let Ok(call) = contract.method::<_, U256>("balanceOf", owner) else {
            return NftBonus::none();
        };
        let bonus = match call.call().await {
            Ok(balance) => NftBonus::from_balance(balance.as_u32()),
            Err(e) => {
                tracing::warn!(error = %e, address, "balanceOf RPC failed, using no-bonus baseline");
                NftBonus::none()
            }
        };
        self.cache.put(address.to_string(), bonus).await;
        bonus
    }
}

fn build_contract(config: &NftBonusConfig) -> Option<ethers::contract::Contract<Provider<Http>>> {
    let rpc_url = config.rpc_url.as_ref()?;
    let contract_address = config.contract_address.as_ref()?;
    let provider = Provider::<Http>::try_from(rpc_url.as_str())
        .map_err(|e| tracing::error!(error = %e, "invalid NFT bonus RPC url"))
        .ok()?;
    let address: Address = match contract_address.parse() {
        Ok(address) => address,
        Err(e) => {
            tracing::error!(error = ?e, "invalid NFT bonus contract address");
            return None;
        }
    };
    let abi: ethers::abi::Abi = serde_json::from_str(ERC721_BALANCE_OF_ABI).expect("NFT ABI is valid JSON");
    Some(ethers::contract::Contract::new(address, abi, std::sync::Arc::new(provider)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bonus_ladder_stacks_by_threshold() {
        assert_eq!(NftBonus::from_balance(0), NftBonus { armor_regen_rate: 1, bonus_max_hp: 0, bonus_crit_percent: 0, bonus_dmg: 0 });
        assert_eq!(NftBonus::from_balance(1), NftBonus { armor_regen_rate: 2, bonus_max_hp: 0, bonus_crit_percent: 0, bonus_dmg: 0 });
        assert_eq!(NftBonus::from_balance(2), NftBonus { armor_regen_rate: 2, bonus_max_hp: 5, bonus_crit_percent: 0, bonus_dmg: 0 });
        assert_eq!(NftBonus::from_balance(3), NftBonus { armor_regen_rate: 2, bonus_max_hp: 5, bonus_crit_percent: 2, bonus_dmg: 0 });
        assert_eq!(NftBonus::from_balance(5), NftBonus { armor_regen_rate: 2, bonus_max_hp: 5, bonus_crit_percent: 2, bonus_dmg: 3 });
    }

    #[test]
    fn balance_clamps_to_ten_thousand() {
        let huge = NftBonus::from_balance(50_000);
        assert_eq!(huge, NftBonus::from_balance(MAX_BALANCE));
    }

    #[tokio::test]
    async fn disabled_service_returns_baseline() {
        let service = NftBonusService::new(NftBonusConfig {
            rpc_url: None,
            contract_address: None,
            enabled: false,
            ttl: DEFAULT_TTL,
        });
        assert_eq!(service.bonus_for("0xAA").await, NftBonus::none());
    }
}
