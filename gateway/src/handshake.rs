//! The pre-room handshake: read the client's [`JoinRequest`], resolve
//! whatever the joining room kind needs asynchronously before a session is
//! allowed to reach the room actor (§5 suspension points), and report the
//! result.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;

use combat_room::CombatJoinContext;
use combat_sim::player::CombatStats;
use protocol::JoinRequest;

use crate::state::AppState;

/// Reads the first binary frame off a fresh websocket and decodes it as a
/// [`JoinRequest`]. There is no tag byte in front of it (§6): the handshake
/// is a one-shot exchange, not part of the tagged post-handshake stream.
pub async fn read_join_request(receiver: &mut SplitStream<WebSocket>) -> Option<JoinRequest> {
    loop {
        let frame = receiver.next().await?;
        match frame {
            Ok(Message::Binary(bytes)) => {
                return match postcard::from_bytes::<JoinRequest>(&bytes) {
                    Ok(req) => Some(req),
                    Err(e) => {
                        tracing::warn!(error = ?e, "failed to parse join request");
                        None
                    }
                };
            }
            Ok(_) => continue, // Ignore ping/pong/text/close before the handshake.
            Err(e) => {
                tracing::warn!(error = ?e, "websocket error before handshake completed");
                return None;
            }
        }
    }
}

/// §4.10's join order for combat rooms: ticket check (unless this is a
/// "fun" room), stats (on-chain if enforcement is on, else defaults), an
/// optional profile fetch, then the NFT bonus snapshot. Every suspension
/// point here degrades to a documented default rather than ever blocking
/// the room itself (§7 TransientUpstream).
pub async fn resolve_combat_context(
    state: &AppState,
    address: &str,
    token_id: Option<u64>,
    fun_room: bool,
) -> CombatJoinContext {
    if fun_room {
        return CombatJoinContext {
            ticket_ok: true,
            deny_reason: None,
            ticket_token_id: None,
            stats: CombatStats::default(),
            nft_bonus: state.nft.bonus_for(address).await,
            profile_picture_url: None,
        };
    }

    let join_check = state.ticket.check_join(address, token_id).await;
    if !join_check.ok {
        return CombatJoinContext { ticket_ok: false, deny_reason: join_check.reason, ..Default::default() };
    }

    let mut stats = CombatStats::default();
    let mut profile_picture_url = None;
    if state.ticket.use_onchain_stats() {
        if let Some(token_id) = join_check.token_id {
            if let Some(chain_stats) = state.ticket.stats_of(token_id).await {
                stats = CombatStats {
                    max_hp: chain_stats.max_hp,
                    max_armor: chain_stats.max_armor,
                    dmg: chain_stats.dmg as f32,
                    crit_chance: chain_stats.crit_chance as f32 / 100.0,
                    accuracy: chain_stats.accuracy as f32 / 100.0,
                    max_fuel: chain_stats.max_fuel as f32,
                };
            }
        }
    } else {
        // §5: "Profile fetch: 1,200 ms hard cap; on timeout the join
        // proceeds with defaults." `ProfileService::fetch` already enforces
        // this internally; the outer timeout here is a defensive backstop
        // in case the service is ever swapped for one that doesn't.
        let profile = tokio::time::timeout(Duration::from_millis(1_200), state.profile.fetch(address))
            .await
            .unwrap_or_default();
        profile_picture_url = profile.profile_picture_url;
    }

    CombatJoinContext {
        ticket_ok: true,
        deny_reason: None,
        ticket_token_id: join_check.token_id,
        stats,
        nft_bonus: state.nft.bonus_for(address).await,
        profile_picture_url,
    }
}
