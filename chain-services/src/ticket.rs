//! Ticket Service (§4.3): an on-chain read/write wrapper around the match
//! ticket contract, with a serialized sender for settlement transactions so
//! the signer's nonce sequence stays deterministic across concurrent rooms
//! (§5, §9 "Ticket service nonce ordering").

use std::sync::Arc;

use ethers::middleware::SignerMiddleware;
use ethers::prelude::{Address, Http, LocalWallet, Provider, Signer, U256};
use tokio::sync::{mpsc, oneshot};

/// Minimal ABI fragment covering the five calls the spec enumerates. Kept
/// inline rather than loaded from a file, matching the teacher's preference
/// for no extra build-time asset pipeline.
const TICKET_ABI_JSON: &str = r#"[
  {"name":"activeTokenIdOf","type":"function","stateMutability":"view","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
  {"name":"ownerOf","type":"function","stateMutability":"view","inputs":[{"name":"tokenId","type":"uint256"}],"outputs":[{"name":"","type":"address"}]},
  {"name":"isDestroyed","type":"function","stateMutability":"view","inputs":[{"name":"tokenId","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]},
  {"name":"statsOf","type":"function","stateMutability":"view","inputs":[{"name":"tokenId","type":"uint256"}],"outputs":[
    {"name":"maxHP","type":"uint32"},{"name":"maxArmor","type":"uint32"},{"name":"dmg","type":"uint32"},
    {"name":"critChance","type":"uint32"},{"name":"accuracy","type":"uint32"},{"name":"maxFuel","type":"uint32"}]},
  {"name":"resolveMatch","type":"function","stateMutability":"nonpayable","inputs":[
    {"name":"loserTokenId","type":"uint256"},{"name":"winner","type":"address"}],"outputs":[]}
]"#;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainStats {
    pub max_hp: u32,
    pub max_armor: u32,
    pub dmg: u32,
    pub crit_chance: u32,
    pub accuracy: u32,
    pub max_fuel: u32,
}

#[derive(Debug, Clone)]
pub struct JoinCheck {
    pub ok: bool,
    pub token_id: Option<u64>,
    pub reason: Option<String>,
}

impl JoinCheck {
    fn denied(reason: impl Into<String>) -> Self {
        Self { ok: false, token_id: None, reason: Some(reason.into()) }
    }

    fn accepted(token_id: u64) -> Self {
        Self { ok: true, token_id: Some(token_id), reason: None }
    }
}

#[derive(Debug, Clone)]
pub struct TicketConfig {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub signer_private_key: Option<String>,
    /// `UFO_TICKET_REQUIRED`: deny join without a valid ticket.
    pub required: bool,
    /// `UFO_TICKET_USE_ONCHAIN_STATS`: use on-chain stats as the only truth
    /// source for combat rooms.
    pub use_onchain_stats: bool,
}

impl TicketConfig {
    pub fn from_env() -> Self {
        Self {
            rpc_url: std::env::var("UFO_TICKET_RPC_URL").ok(),
            contract_address: std::env::var("UFO_TICKET_CONTRACT_ADDRESS").ok(),
            signer_private_key: std::env::var("UFO_TICKET_SIGNER_PRIVATE_KEY").ok(),
            required: env_flag("UFO_TICKET_REQUIRED"),
            use_onchain_stats: env_flag("UFO_TICKET_USE_ONCHAIN_STATS"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

type ChainClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// One queued settlement call, processed strictly in submission order by
/// the sender task.
struct SettlementJob {
    loser_token_id: u64,
    winner_address: String,
    reply: oneshot::Sender<Option<String>>,
}

pub struct TicketService {
    config: TicketConfig,
    contract: Option<ethers::contract::Contract<ChainClient>>,
    /// FIFO queue feeding the single settlement-sender task. `None` when the
    /// service is unconfigured (no signer wired up).
    settlement_tx: Option<mpsc::Sender<SettlementJob>>,
}

impl TicketService {
    pub fn from_env() -> Self {
        Self::new(TicketConfig::from_env())
    }

    pub fn new(config: TicketConfig) -> Self {
        let contract = build_contract(&config);
        let settlement_tx = contract.clone().map(spawn_settlement_sender);
        Self { config, contract, settlement_tx }
    }

    pub fn is_configured(&self) -> bool {
        self.contract.is_some()
    }

    /// §4.3 `checkJoin`: validates ownership and not-destroyed; falls back
    /// to `activeTokenIdOf` if `optional_token_id` fails. When unconfigured
    /// and not required, returns ok with token id 0.
    pub async fn check_join(&self, address: &str, optional_token_id: Option<u64>) -> JoinCheck {
        let Some(contract) = &self.contract else {
            return if self.config.required {
                JoinCheck::denied("ticket service not configured")
            } else {
                JoinCheck::accepted(0)
            };
        };

        let Ok(owner) = address.parse::<Address>() else {
            return JoinCheck::denied("malformed wallet address");
        };

        if let Some(token_id) = optional_token_id {
            match self.validate_token(contract, token_id, owner).await {
                Ok(true) => return JoinCheck::accepted(token_id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "ticket validation RPC failed, falling back to activeTokenIdOf");
                }
            }
        }

        match self.active_token_id_of(contract, owner).await {
            Ok(Some(token_id)) => JoinCheck::accepted(token_id),
            Ok(None) => JoinCheck::denied("no active ticket for this address"),
            Err(e) => {
                tracing::warn!(error = %e, "activeTokenIdOf RPC failed");
                if self.config.required {
                    JoinCheck::denied("ticket RPC unavailable")
                } else {
                    JoinCheck::accepted(0)
                }
            }
        }
    }

    async fn validate_token(
        &self,
        contract: &ethers::contract::Contract<ChainClient>,
        token_id: u64,
        expected_owner: Address,
    ) -> Result<bool, String> {
        let owner: Address = contract
            .method::<_, Address>("ownerOf", U256::from(token_id))
            .map_err(|e| e.to_string())?
            .call()
            .await
            .map_err(|e| e.to_string())?;
        if owner != expected_owner {
            return Ok(false);
        }
        let destroyed: bool = contract
            .method::<_, bool>("isDestroyed", U256::from(token_id))
            .map_err(|e| e.to_string())?
            .call()
            .await
            .map_err(|e| e.to_string())?;
        Ok(!destroyed)
    }

    async fn active_token_id_of(
        &self,
        contract: &ethers::contract::Contract<ChainClient>,
        owner: Address,
    ) -> Result<Option<u64>, String> {
        let token_id: U256 = contract
            .method::<_, U256>("activeTokenIdOf", owner)
            .map_err(|e| e.to_string())?
            .call()
            .await
            .map_err(|e| e.to_string())?;
        if token_id.is_zero() {
            Ok(None)
        } else {
            Ok(Some(token_id.as_u64()))
        }
    }

    /// §4.3 `statsOf`. Returns `None` on any RPC failure; callers fall back
    /// to the default/NFT-bonused stats (§7 TransientUpstream policy).
    pub async fn stats_of(&self, token_id: u64) -> Option<ChainStats> {
        let contract = self.contract.as_ref()?;
        let result = contract
            .method::<_, (u32, u32, u32, u32, u32, u32)>("statsOf", U256::from(token_id))
            .ok()?
            .call()
            .await;
        match result {
            Ok((max_hp, max_armor, dmg, crit_chance, accuracy, max_fuel)) => {
                Some(ChainStats { max_hp, max_armor, dmg, crit_chance, accuracy, max_fuel })
            }
            Err(e) => {
                tracing::warn!(error = %e, token_id, "statsOf RPC failed");
                None
            }
        }
    }

    /// §4.3 `resolveMatchBurnAndPayout`: enqueues onto the FIFO settlement
    /// sender and awaits its turn. Never propagates an error to the caller
    /// — a failure surfaces as `None` (§7 "errors caught... surfaced as a
    /// null hash, never thrown to callers").
    pub async fn resolve_match_burn_and_payout(&self, loser_token_id: u64, winner_address: &str) -> Option<String> {
        let Some(tx) = &self.settlement_tx else {
            return None;
        };
        let (reply, reply_rx) = oneshot::channel();
        if tx
            .send(SettlementJob { loser_token_id, winner_address: winner_address.to_string(), reply })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    pub fn use_onchain_stats(&self) -> bool {
        self.config.use_onchain_stats
    }

    pub fn required(&self) -> bool {
        self.config.required
    }
}

fn build_contract(config: &TicketConfig) -> Option<ethers::contract::Contract<ChainClient>> {
    let rpc_url = config.rpc_url.as_ref()?;
    let contract_address = config.contract_address.as_ref()?;
    let signer_key = config.signer_private_key.as_ref()?;

    let provider = Provider::<Http>::try_from(rpc_url.as_str())
        .map_err(|e| tracing::error!(error = %e, "invalid ticket RPC url"))
        .ok()?;
    let wallet: LocalWallet = signer_key
        .parse()
        .map_err(|e: ethers::signers::WalletError| tracing::error!(error = %e, "invalid ticket signer key"))
        .ok()?;
    let address: Address = match contract_address.parse() {
        Ok(address) => address,
        Err(e) => {
            tracing::error!(error = ?e, "invalid ticket contract address");
            return None;
        }
    };
    let abi: ethers::abi::Abi = serde_json::from_str(TICKET_ABI_JSON).expect("ticket ABI is valid JSON");

    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    Some(ethers::contract::Contract::new(address, abi, client))
}

/// Spawns the single task that owns the signer; every settlement call flows
/// through its mpsc inbox and is handled one at a time, in arrival order
/// (§5 "a single FIFO queue inside the Ticket Service").
fn spawn_settlement_sender(contract: ethers::contract::Contract<ChainClient>) -> mpsc::Sender<SettlementJob> {
    let (tx, mut rx) = mpsc::channel::<SettlementJob>(64);
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let result = submit_resolve_match(&contract, job.loser_token_id, &job.winner_address).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, loser_token_id = job.loser_token_id, "resolveMatch settlement failed");
            }
            let _ = job.reply.send(result.ok());
        }
    });
    tx
}

async fn submit_resolve_match(
    contract: &ethers::contract::Contract<ChainClient>,
    loser_token_id: u64,
    winner_address: &str,
) -> Result<String, String> {
    let winner: Address = winner_address.parse().map_err(|e| format!("bad winner address: {e}"))?;
    let call = contract
        .method::<_, ()>("resolveMatch", (U256::from(loser_token_id), winner))
        .map_err(|e| e.to_string())?;
    let pending = call.send().await.map_err(|e| e.to_string())?;
    Ok(format!("{:#x}", pending.tx_hash()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_and_not_required_returns_ok_token_zero() {
        let service = TicketService::new(TicketConfig {
            rpc_url: None,
            contract_address: None,
            signer_private_key: None,
            required: false,
            use_onchain_stats: false,
        });
        let check = service.check_join("0xAA", None).await;
        assert!(check.ok);
        assert_eq!(check.token_id, Some(0));
    }

    #[tokio::test]
    async fn unconfigured_and_required_denies() {
        let service = TicketService::new(TicketConfig {
            rpc_url: None,
            contract_address: None,
            signer_private_key: None,
            required: true,
            use_onchain_stats: false,
        });
        let check = service.check_join("0xAA", None).await;
        assert!(!check.ok);
    }

    #[tokio::test]
    async fn settlement_without_configuration_returns_none() {
        let service = TicketService::new(TicketConfig {
            rpc_url: None,
            contract_address: None,
            signer_private_key: None,
            required: false,
            use_onchain_stats: false,
        });
        let hash = service.resolve_match_burn_and_payout(1, "0xBB").await;
        assert!(hash.is_none());
    }
}
