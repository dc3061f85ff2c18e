//! The Combat Room Orchestrator itself (§4.10): a [`sim_core::RoomLogic`]
//! implementation gluing `combat-sim`'s pure physics to join gating, the
//! lobby/ready/match timers, throttled broadcast, and the settlement +
//! replay hooks fired on leave/dispose.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;

use chain_services::{NftBonus, TicketService};
use combat_sim::arena::Arena;
use combat_sim::damage::{apply_damage, clamp_regen_proposal, clamp_unenforced_rise, UNENFORCED_ARMOR_CAP, UNENFORCED_HP_CAP};
use combat_sim::hitbox::PlayerHitbox;
use combat_sim::player::{CombatPlayer, CombatStats};
use combat_sim::projectile::{Projectile, ProjectileKind};
use combat_sim::validation::acceptance_window_ms;
use combat_sim::{compute_damage, TICK_MS};
use protocol::combat::{CombatEvent, CombatInput, GameState, MatchEndReason, PlayerView, WeaponKind};
use replay_store::recorder::{MatchRecorder, PlayerRecord, SettlementBlock};
use sim_core::room::{RoomCommand, RoomLogic};
use sim_core::timer::Timer;

pub const LOBBY_WAIT_MS: u64 = 90_000;
pub const READY_WAIT_MS: u64 = 35_000;
pub const MATCH_DURATION_MS: u64 = 90_000;
pub const MATCH_GRACE_MS: u64 = 5_000;
/// Shared with `combat_sim::damage::clamp_regen_proposal`'s test fixtures:
/// armor regen gates require 2s since the last hit and the last regen tick.
const ARMOR_REGEN_INTERVAL_MS: u64 = 2_000;
const POSITION_BROADCAST_THROTTLE_MS: u64 = 50;

/// §4.8 broadcast-throttling thresholds for the continuous state-sync
/// track. Arrow/projectile position streams aren't modeled: the wire
/// protocol's `StateDelta` is keyed purely on player session id, and
/// projectile state already rides the discrete stone/tnt events.
const STATE_SYNC_POSITION_EPS: f32 = 8.0;
const STATE_SYNC_VELOCITY_EPS: f32 = 1.0;
const STATE_SYNC_HEARTBEAT_MS: u64 = 400;
const STATE_SYNC_STATS_HEARTBEAT_MS: u64 = 1_500;

const TIMER_LOBBY_WAIT: u32 = 1;
const TIMER_READY_WAIT: u32 = 2;
const TIMER_MATCH_END: u32 = 3;
const TIMER_GRACE: u32 = 4;

/// Everything the gateway resolves asynchronously (§5 suspension points)
/// before a join is allowed to reach the room (§4.10's join order).
#[derive(Debug, Clone, Default)]
pub struct CombatJoinContext {
    pub ticket_ok: bool,
    pub deny_reason: Option<String>,
    pub ticket_token_id: Option<u64>,
    pub stats: CombatStats,
    pub nft_bonus: NftBonus,
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitingForPlayers,
    WaitingForReady,
    Active,
    Grace,
    Ended,
}

/// Per-player baseline the continuous state-sync track compares against to
/// decide whether a field crossed a broadcast threshold (§4.8).
#[derive(Debug, Clone, Copy, Default)]
struct SyncState {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    last_position_broadcast_ms: u64,
    position_synced: bool,
    hp: u32,
    armor: u32,
    max_hp: u32,
    max_armor: u32,
    paralyzed: bool,
    last_stats_broadcast_ms: u64,
    stats_synced: bool,
}

/// Room-scoped dependencies injected at creation. The ticket settlement
/// call and the replay finalize are both async, so they're driven by
/// `tokio::spawn`ed tasks from inside otherwise-synchronous `RoomLogic`
/// methods rather than awaited directly (§5 "tick itself never blocks").
pub struct CombatRoomDeps {
    pub room_id: String,
    pub ticket: Arc<TicketService>,
    pub recorder: Arc<Mutex<MatchRecorder>>,
}

pub struct CombatRoomLogic {
    deps: CombatRoomDeps,
    arena: Arena,
    players: HashMap<u16, CombatPlayer>,
    projectiles: Vec<Projectile>,
    next_projectile_id: u32,
    pending: Vec<RoomCommand<CombatEvent>>,
    timers: Timer,
    phase: Phase,
    now_ms: u64,
    match_start_at_ms: u64,
    match_end_at_ms: u64,
    last_broadcast_at_ms: u64,
    sync_state: HashMap<u16, SyncState>,
    disposed: bool,
}

impl CombatRoomLogic {
    pub fn new(deps: CombatRoomDeps) -> Self {
        Self {
            deps,
            arena: Arena::default(),
            players: HashMap::new(),
            projectiles: Vec::new(),
            next_projectile_id: 0,
            pending: Vec::new(),
            timers: Timer::default(),
            phase: Phase::WaitingForPlayers,
            now_ms: 0,
            match_start_at_ms: 0,
            match_end_at_ms: 0,
            last_broadcast_at_ms: 0,
            sync_state: HashMap::new(),
            disposed: false,
        }
    }

    fn stats_with_bonus(base: CombatStats, bonus: NftBonus) -> CombatStats {
        CombatStats {
            max_hp: base.max_hp + bonus.bonus_max_hp,
            max_armor: base.max_armor,
            dmg: base.dmg + bonus.bonus_dmg as f32,
            crit_chance: base.crit_chance + bonus.bonus_crit_percent as f32 / 100.0,
            accuracy: base.accuracy,
            max_fuel: base.max_fuel,
        }
    }

    fn end_match(&mut self, reason: MatchEndReason, winner_sid: Option<u16>) {
        if self.phase == Phase::Ended {
            return;
        }
        self.phase = Phase::Ended;
        self.timers.cancel(TIMER_MATCH_END);
        let players: Vec<u16> = self.players.keys().copied().collect();
        let replay_id = self.deps.recorder.lock().unwrap().replay_id().to_string();
        {
            let mut recorder = self.deps.recorder.lock().unwrap();
            let end_reason = match reason {
                MatchEndReason::Timeout => "timeout",
                MatchEndReason::Hp => "hp",
                MatchEndReason::PlayerLeft => "player_left",
            };
            recorder.end_match(self.now_ms, end_reason, winner_sid.map(|s| s as u32));
        }
        self.pending.push(RoomCommand::Broadcast(CombatEvent::MatchEnd { reason, winner_sid, players, replay_id }));
        self.timers.start(TIMER_GRACE, MATCH_GRACE_MS);
        self.phase = Phase::Grace;
    }

    /// §4.10 "trigger the settlement hook before clearing the leaver's
    /// ticket reference": captures the loser's token id and the winner's
    /// address before the leaver is removed from `self.players`, then
    /// fires the on-chain call off the synchronous hot path. §4.8 requires
    /// `{loserTokenId, winnerAddress}` recorded into the replay settlement
    /// block immediately, with the tx hash merged in once the async call
    /// resolves.
    fn trigger_settlement(&self, loser_token_id: Option<u64>, winner_address: String) {
        let Some(loser_token_id) = loser_token_id else { return };
        self.deps.recorder.lock().unwrap().set_settlement(SettlementBlock {
            loser_token_id: Some(loser_token_id),
            winner_address: Some(winner_address.clone()),
            ..Default::default()
        });
        let ticket = self.deps.ticket.clone();
        let recorder = self.deps.recorder.clone();
        tokio::spawn(async move {
            let tx_hash = ticket.resolve_match_burn_and_payout(loser_token_id, &winner_address).await;
            let mut recorder = recorder.lock().unwrap();
            match tx_hash {
                Some(hash) => recorder.set_settlement(SettlementBlock { tx_hash: Some(hash), ..Default::default() }),
                None => recorder.set_settlement(SettlementBlock { error: Some("settlement failed".into()), ..Default::default() }),
            }
        });
    }

    /// §4.8 "ended with a clear winner in a non-'fun' room": queues the
    /// ticket burn/payout for `loser` against `winner`'s address, if
    /// `loser` holds a ticket. Call before either player is removed from
    /// `self.players`.
    fn settle_between(&self, loser: u16, winner: u16) {
        let loser_token_id = self.players.get(&loser).and_then(|p| p.ticket_token_id);
        let Some(winner_address) = self.players.get(&winner).map(|p| p.address.clone()) else { return };
        self.trigger_settlement(loser_token_id, winner_address);
    }

    /// Winner by higher HP when the match clock runs out (§4.8 "playing
    /// --timeout--> ended (winner by hp)"). `None` on a tie, or if the
    /// room somehow isn't at exactly two players.
    fn timeout_winner(&self) -> Option<u16> {
        let mut players: Vec<(u16, u32)> = self.players.iter().map(|(&sid, p)| (sid, p.hp)).collect();
        if players.len() != 2 {
            return None;
        }
        players.sort_by(|a, b| b.1.cmp(&a.1));
        if players[0].1 == players[1].1 {
            return None;
        }
        Some(players[0].0)
    }

    fn spawn_projectile_for(&mut self, shooter: u16, weapon: WeaponKind, target_x: f32, target_y: f32) {
        let Some(player) = self.players.get(&shooter) else { return };
        let origin = player.position;
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        let target = combat_sim::Vec2::new(target_x, target_y);
        let projectile = match weapon {
            WeaponKind::Arrow => Some(Projectile::spawn_arrow(id, shooter, origin, target)),
            WeaponKind::Bullet => {
                let velocity = target.sub(origin).normalized().scale(combat_sim::projectile::BULLET_SPEED);
                Some(Projectile::spawn_bullet(id, shooter, origin, velocity))
            }
            WeaponKind::Heavy => {
                let velocity = target.sub(origin).normalized().scale(combat_sim::projectile::ARROW_SPEED);
                Some(Projectile::spawn_heavy(id, shooter, origin, velocity))
            }
            WeaponKind::Tnt => Some(Projectile::spawn_tnt(id, shooter, origin)),
            // Mine/spike are melee-range hit-validation-only (§4.8); the fire
            // timestamp recorded on the player is enough for a later `Hit`.
            WeaponKind::Mine | WeaponKind::Spike => None,
        };
        if let Some(p) = projectile {
            self.projectiles.push(p);
        }
    }

    fn step_projectiles(&mut self) {
        // (id, x, y, shooter, stuck target) — only `Some` stuck targets take
        // damage; a TNT that expired without ever sticking just explodes.
        let mut exploded: Vec<(u32, f32, f32, u16, Option<u16>)> = Vec::new();
        let mut hits: Vec<(u16, u16, WeaponKind, ProjectileKind, f32)> = Vec::new();

        for projectile in &mut self.projectiles {
            match projectile.step(&self.arena, TICK_MS) {
                Some(true) => self.pending.push(RoomCommand::Broadcast(CombatEvent::StoneBounce {
                    projectile_id: projectile.id,
                    x: projectile.position.x,
                    y: projectile.position.y,
                })),
                Some(false) => self.pending.push(RoomCommand::Broadcast(CombatEvent::StoneHit {
                    projectile_id: projectile.id,
                    x: projectile.position.x,
                    y: projectile.position.y,
                })),
                None => {}
            }

            if projectile.kind == ProjectileKind::Tnt && projectile.dead {
                let stuck_target = projectile.stuck.map(|(target, _)| target);
                exploded.push((projectile.id, projectile.position.x, projectile.position.y, projectile.shooter_id, stuck_target));
                continue;
            }

            if !projectile.damage_enabled || projectile.dead {
                continue;
            }

            for (&sid, player) in self.players.iter() {
                if sid == projectile.shooter_id || !player.is_alive() {
                    continue;
                }
                let hitbox = PlayerHitbox::new(player.position);
                if hitbox.overlaps_point(projectile.position, 4.0) {
                    if projectile.kind == ProjectileKind::Tnt {
                        // Sticking only arms the fuse; the hit (and its
                        // damage) resolves on fuse expiry below (§4.8).
                        projectile.stick_tnt(sid);
                        self.pending.push(RoomCommand::Broadcast(CombatEvent::TntStick { projectile_id: projectile.id, target_sid: sid }));
                    } else {
                        hits.push((projectile.shooter_id, sid, weapon_for(projectile.kind), projectile.kind, player.stats.dmg));
                        projectile.dead = true;
                    }
                    break;
                }
            }
        }

        self.projectiles.retain(|p| !p.dead);

        for (id, x, y, shooter, stuck_target) in exploded {
            self.pending.push(RoomCommand::Broadcast(CombatEvent::TntExplode { projectile_id: id, x, y }));
            if let Some(target) = stuck_target {
                if let Some(dmg_stat) = self.players.get(&target).map(|p| p.stats.dmg) {
                    hits.push((shooter, target, WeaponKind::Tnt, ProjectileKind::Tnt, dmg_stat));
                }
            }
        }

        for (shooter, target, weapon, kind, dmg_stat) in hits {
            self.apply_validated_hit(shooter, target, weapon, kind, dmg_stat);
        }
    }

    fn apply_validated_hit(&mut self, shooter: u16, target: u16, weapon: WeaponKind, kind: ProjectileKind, dmg_stat: f32) {
        let is_crit = self.players.get(&shooter).map(|p| rand::thread_rng().gen_bool(p.stats.crit_chance.clamp(0.0, 1.0) as f64)).unwrap_or(false);
        let variance = rand::thread_rng().gen_range(combat_sim::damage::VARIANCE_MIN..combat_sim::damage::VARIANCE_MAX);
        let damage = compute_damage(dmg_stat, kind, is_crit, variance);
        self.apply_damage_to(target, damage);
        self.pending.push(RoomCommand::Broadcast(CombatEvent::Hit { shooter_sid: shooter, target_sid: target, weapon, damage, is_crit }));
    }

    fn apply_damage_to(&mut self, target: u16, damage: u32) {
        let now = self.now_ms;
        let Some(player) = self.players.get_mut(&target) else { return };
        let outcome = apply_damage(player.hp, player.stats.max_hp, player.armor, player.stats.max_armor, damage);
        player.hp = outcome.new_hp;
        player.armor = outcome.new_armor;
        player.last_damage_at_ms = now;
        if player.hp == 0 {
            let loser = target;
            let winner = self.players.keys().copied().find(|&sid| sid != loser);
            if let Some(winner) = winner {
                self.settle_between(loser, winner);
            }
            self.end_match(MatchEndReason::Hp, winner);
        }
    }

    fn apply_stats_packet(&mut self, session_id: u16, now_ms: u64, hp: u32, armor: u32, paralyzed: bool) {
        let Some(player) = self.players.get_mut(&session_id) else { return };
        if !player.stats_throttle.allow(now_ms, combat_sim::validation::STATS_THROTTLE_MS) {
            return;
        }
        let max_regen = player.max_regen_per_tick();
        let (accepted_armor, regen_granted) = clamp_regen_proposal(
            player.armor,
            player.stats.max_armor,
            armor,
            max_regen,
            now_ms,
            player.last_damage_at_ms,
            player.last_armor_regen_at_ms,
            ARMOR_REGEN_INTERVAL_MS,
        );
        let accepted_hp = if hp <= player.hp {
            hp.min(player.hp)
        } else {
            clamp_unenforced_rise(player.hp, player.stats.max_hp, hp, UNENFORCED_HP_CAP)
        };
        let accepted_armor = if accepted_armor <= player.armor {
            accepted_armor
        } else {
            clamp_unenforced_rise(player.armor, player.stats.max_armor, accepted_armor, UNENFORCED_ARMOR_CAP)
        };
        player.hp = accepted_hp;
        player.armor = accepted_armor;
        player.paralyzed = paralyzed;
        if regen_granted {
            player.last_armor_regen_at_ms = now_ms;
        }
    }

    /// Appends every input verbatim to the replay (§4.6, §4.8 scenario 2
    /// "the rejected packet recorded verbatim"), before any validation that
    /// might reject or ignore it.
    fn record_raw_input(&self, session_id: u32, input: &CombatInput) {
        let (kind, at_ms) = match input {
            CombatInput::Position { timestamp_ms, .. } => ("position", *timestamp_ms),
            CombatInput::Fire { timestamp_ms, .. } => ("fire", *timestamp_ms),
            CombatInput::Dash { timestamp_ms, .. } => ("dash", *timestamp_ms),
            CombatInput::Hit { timestamp_ms, .. } => ("hit", *timestamp_ms),
            CombatInput::Stats { timestamp_ms, .. } => ("stats", *timestamp_ms),
            CombatInput::Ready { .. } => ("ready", self.now_ms),
            CombatInput::Ping { .. } => ("ping", self.now_ms),
        };
        let payload = serde_json::to_value(input).unwrap_or(serde_json::Value::Null);
        self.deps.recorder.lock().unwrap().record_input(session_id, at_ms, kind, payload);
    }

    /// §4.8 broadcast throttling for the continuous position/stats stream:
    /// position-class fields forward only past an 8px displacement, a >1
    /// velocity delta, or a 400ms heartbeat; stats-class fields forward
    /// only on a meaningful change or a 1.5s heartbeat. Returns `None` when
    /// nothing crossed a threshold this tick.
    fn sync_deltas(&mut self) -> Option<protocol::combat::StateDelta> {
        let now_ms = self.now_ms;
        let mut out: HashMap<u16, protocol::combat::PlayerDelta> = HashMap::new();

        for (&sid, player) in self.players.iter() {
            let state = self.sync_state.entry(sid).or_default();
            let mut delta = protocol::combat::PlayerDelta::default();
            let mut changed = false;

            let dx = player.position.x - state.x;
            let dy = player.position.y - state.y;
            let displacement = (dx * dx + dy * dy).sqrt();
            let dvx = player.velocity.x - state.vx;
            let dvy = player.velocity.y - state.vy;
            let velocity_delta = (dvx * dvx + dvy * dvy).sqrt();
            let heartbeat_due = now_ms.saturating_sub(state.last_position_broadcast_ms) > STATE_SYNC_HEARTBEAT_MS;
            if !state.position_synced || displacement > STATE_SYNC_POSITION_EPS || velocity_delta > STATE_SYNC_VELOCITY_EPS || heartbeat_due {
                delta.x = Some(player.position.x);
                delta.y = Some(player.position.y);
                delta.vx = Some(player.velocity.x);
                delta.vy = Some(player.velocity.y);
                delta.orientation = Some(player.orientation);
                state.x = player.position.x;
                state.y = player.position.y;
                state.vx = player.velocity.x;
                state.vy = player.velocity.y;
                state.last_position_broadcast_ms = now_ms;
                state.position_synced = true;
                changed = true;
            }

            let stats_changed = !state.stats_synced
                || player.hp != state.hp
                || player.armor != state.armor
                || player.stats.max_hp != state.max_hp
                || player.stats.max_armor != state.max_armor
                || player.paralyzed != state.paralyzed;
            let stats_heartbeat_due = now_ms.saturating_sub(state.last_stats_broadcast_ms) >= STATE_SYNC_STATS_HEARTBEAT_MS;
            if stats_changed || stats_heartbeat_due {
                delta.hp = Some(player.hp);
                delta.armor = Some(player.armor);
                delta.max_hp = Some(player.stats.max_hp);
                delta.max_armor = Some(player.stats.max_armor);
                delta.paralyzed = Some(player.paralyzed);
                state.hp = player.hp;
                state.armor = player.armor;
                state.max_hp = player.stats.max_hp;
                state.max_armor = player.stats.max_armor;
                state.paralyzed = player.paralyzed;
                state.last_stats_broadcast_ms = now_ms;
                state.stats_synced = true;
                changed = true;
            }

            if changed {
                out.insert(sid, delta);
            }
        }

        if out.is_empty() {
            None
        } else {
            Some(protocol::combat::StateDelta { players: out })
        }
    }

    fn player_view(player: &CombatPlayer) -> PlayerView {
        PlayerView {
            x: player.position.x,
            y: player.position.y,
            vx: player.velocity.x,
            vy: player.velocity.y,
            orientation: player.orientation,
            hp: player.hp,
            max_hp: player.stats.max_hp,
            armor: player.armor,
            max_armor: player.stats.max_armor,
            ready: player.ready,
            profile_picture: player.profile_picture.clone(),
            paralyzed: player.paralyzed,
        }
    }
}

fn weapon_for(kind: ProjectileKind) -> WeaponKind {
    match kind {
        ProjectileKind::Arrow => WeaponKind::Arrow,
        ProjectileKind::Bullet => WeaponKind::Bullet,
        ProjectileKind::Heavy => WeaponKind::Heavy,
        ProjectileKind::Tnt => WeaponKind::Tnt,
    }
}

impl RoomLogic for CombatRoomLogic {
    type Input = CombatInput;
    type Event = CombatEvent;
    type FullState = GameState;
    type JoinContext = CombatJoinContext;

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(TICK_MS)
    }

    fn session_joined(&mut self, session_id: u32, address: &str, context: CombatJoinContext) -> Result<(), String> {
        if self.disposed || self.phase == Phase::Ended || self.phase == Phase::Grace {
            return Err("room is no longer accepting players".to_string());
        }
        if self.players.len() >= 2 {
            return Err("room is full".to_string());
        }
        if address.is_empty() {
            return Err("address is required".to_string());
        }
        if !context.ticket_ok {
            let reason = context.deny_reason.unwrap_or_else(|| "ticket check failed".to_string());
            self.pending.push(RoomCommand::Unicast { session_id, event: CombatEvent::JoinDenied { reason: reason.clone() } });
            return Err(reason);
        }

        let sid = session_id as u16;
        let stats = Self::stats_with_bonus(context.stats, context.nft_bonus);
        let nft_present = if context.nft_bonus.armor_regen_rate >= 2 { 1 } else { 0 };
        let mut player = CombatPlayer::new(sid, address.to_string(), stats, nft_present, context.ticket_token_id);
        player.profile_picture = context.profile_picture_url.clone().unwrap_or_default();
        self.players.insert(sid, player);

        self.deps.recorder.lock().unwrap().record_join(
            sid as u32,
            PlayerRecord { address: address.to_string(), profile_picture_url: context.profile_picture_url, ticket_token_id: context.ticket_token_id },
        );

        self.pending.push(RoomCommand::Broadcast(CombatEvent::PlayerJoined { session_id: sid, address: address.to_string() }));

        match self.players.len() {
            1 => {
                self.phase = Phase::WaitingForPlayers;
                self.timers.start(TIMER_LOBBY_WAIT, LOBBY_WAIT_MS);
            }
            2 => {
                self.timers.cancel(TIMER_LOBBY_WAIT);
                self.phase = Phase::WaitingForReady;
                self.timers.start(TIMER_READY_WAIT, READY_WAIT_MS);
            }
            _ => {}
        }
        Ok(())
    }

    fn session_left(&mut self, session_id: u32) {
        let sid = session_id as u16;
        let Some(leaver) = self.players.remove(&sid) else { return };
        self.sync_state.remove(&sid);
        self.deps.recorder.lock().unwrap().record_leave(session_id);
        self.pending.push(RoomCommand::Broadcast(CombatEvent::PlayerLeft { session_id: sid }));

        if self.phase == Phase::Active {
            let winner_sid = self.players.keys().copied().next();
            let winner_address = winner_sid.and_then(|w| self.players.get(&w)).map(|p| p.address.clone());
            if let Some(winner_address) = winner_address {
                self.trigger_settlement(leaver.ticket_token_id, winner_address);
            }
            self.end_match(MatchEndReason::PlayerLeft, winner_sid);
        } else if self.players.is_empty() {
            self.disposed = true;
        }
    }

    fn apply_input(&mut self, session_id: u32, input: CombatInput) {
        let sid = session_id as u16;
        self.record_raw_input(session_id, &input);
        match input {
            CombatInput::Position { timestamp_ms: _, x, y, vx, vy, orientation } => {
                if self.phase != Phase::Active {
                    return;
                }
                let Some(player) = self.players.get_mut(&sid) else { return };
                let clamped = self.arena.clamp_to_bounds(combat_sim::Vec2::new(x, y));
                player.position = clamped;
                player.velocity = combat_sim::Vec2::new(vx, vy);
                player.orientation = orientation;
            }
            CombatInput::Fire { timestamp_ms, weapon, target_x, target_y } => {
                if self.phase != Phase::Active {
                    return;
                }
                let allowed = self.players.get_mut(&sid).map(|p| p.action_limiter.try_high_impact_action(timestamp_ms)).unwrap_or(false);
                if !allowed {
                    return;
                }
                if let Some(player) = self.players.get_mut(&sid) {
                    player.record_fire(weapon, timestamp_ms);
                }
                self.spawn_projectile_for(sid, weapon, target_x, target_y);
            }
            CombatInput::Dash { timestamp_ms, dx, dy } => {
                if self.phase != Phase::Active {
                    return;
                }
                let allowed = self.players.get_mut(&sid).map(|p| p.action_limiter.try_high_impact_action(timestamp_ms)).unwrap_or(false);
                if !allowed {
                    return;
                }
                let Some(player) = self.players.get_mut(&sid) else { return };
                let from = player.position;
                let to = from.add(combat_sim::Vec2::new(dx, dy));
                player.position = self.arena.resolve_dash(from, to);
            }
            CombatInput::Hit { timestamp_ms, weapon, target_player_id, damage: _, is_crit: _ } => {
                if self.phase != Phase::Active {
                    return;
                }
                let window = acceptance_window_ms(weapon);
                let valid = self
                    .players
                    .get(&sid)
                    .map(|p| p.has_matching_fire(weapon, timestamp_ms, window))
                    .unwrap_or(false);
                if !valid || !self.players.contains_key(&target_player_id) {
                    return;
                }
                let dmg_stat = self.players.get(&sid).map(|p| p.stats.dmg).unwrap_or(0.0);
                let kind = ProjectileKind::from(weapon);
                self.apply_validated_hit(sid, target_player_id, weapon, kind, dmg_stat);
            }
            CombatInput::Stats { timestamp_ms, hp, armor, max_hp: _, max_armor: _, paralyzed } => {
                if self.phase != Phase::Active {
                    return;
                }
                self.apply_stats_packet(sid, timestamp_ms, hp, armor, paralyzed);
            }
            CombatInput::Ready { ready } => {
                if self.phase != Phase::WaitingForReady {
                    return;
                }
                if let Some(player) = self.players.get_mut(&sid) {
                    player.ready = ready;
                }
                if self.players.len() == 2 && self.players.values().all(|p| p.ready) {
                    self.timers.cancel(TIMER_READY_WAIT);
                    self.phase = Phase::Active;
                    self.match_start_at_ms = self.now_ms;
                    self.match_end_at_ms = self.now_ms + MATCH_DURATION_MS;
                    self.timers.start(TIMER_MATCH_END, MATCH_DURATION_MS);
                    self.deps.recorder.lock().unwrap().start_match(self.match_start_at_ms, self.match_end_at_ms);
                    self.pending.push(RoomCommand::Broadcast(CombatEvent::MatchReady));
                    self.pending.push(RoomCommand::Broadcast(CombatEvent::MatchTimer {
                        start_at_ms: self.match_start_at_ms,
                        end_at_ms: self.match_end_at_ms,
                        duration_ms: MATCH_DURATION_MS,
                    }));
                }
            }
            CombatInput::Ping { t0 } => {
                self.pending.push(RoomCommand::Unicast { session_id, event: CombatEvent::MatchTimer { start_at_ms: t0, end_at_ms: self.now_ms, duration_ms: 0 } });
            }
        }
    }

    fn tick(&mut self) {
        self.now_ms += TICK_MS;

        for fired in self.timers.advance(TICK_MS as i64) {
            match fired {
                TIMER_LOBBY_WAIT => {
                    self.pending.push(RoomCommand::Broadcast(CombatEvent::LobbyTimeout { reason: "no opponent joined".into(), timeout_ms: LOBBY_WAIT_MS }));
                    self.disposed = true;
                }
                TIMER_READY_WAIT => {
                    self.pending.push(RoomCommand::Broadcast(CombatEvent::MatchCancelled { reason: "ready timeout".into(), timeout_ms: READY_WAIT_MS }));
                    self.disposed = true;
                }
                TIMER_MATCH_END => {
                    let winner = self.timeout_winner();
                    if let Some(winner) = winner {
                        if let Some(loser) = self.players.keys().copied().find(|&sid| sid != winner) {
                            self.settle_between(loser, winner);
                        }
                    }
                    self.end_match(MatchEndReason::Timeout, winner);
                }
                TIMER_GRACE => {
                    self.disposed = true;
                }
                _ => {}
            }
        }

        if self.phase == Phase::Active {
            self.step_projectiles();
            if let Some(delta) = self.sync_deltas() {
                self.pending.push(RoomCommand::Broadcast(CombatEvent::StateSync(delta)));
            }
            if self.now_ms.saturating_sub(self.last_broadcast_at_ms) >= POSITION_BROADCAST_THROTTLE_MS {
                self.last_broadcast_at_ms = self.now_ms;
                let should_snapshot = self.now_ms % 1000 < TICK_MS;
                let summary = serde_json::json!(self
                    .players
                    .iter()
                    .map(|(sid, p)| (sid.to_string(), serde_json::json!({"x": p.position.x, "y": p.position.y, "hp": p.hp})))
                    .collect::<HashMap<_, _>>());
                self.deps.recorder.lock().unwrap().maybe_snapshot(self.now_ms, summary, should_snapshot);
            }
        }
    }

    fn full_state(&self) -> GameState {
        GameState { players: self.players.iter().map(|(sid, p)| (*sid, Self::player_view(p))).collect() }
    }

    fn drain_commands(&mut self) -> Vec<RoomCommand<CombatEvent>> {
        std::mem::take(&mut self.pending)
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_services::ticket::{JoinCheck, TicketConfig};
    use replay_store::{ReplayMode, ReplayStore};
    use replay_store::store::ReplayStoreConfig;

    fn context_ok(stats: CombatStats) -> CombatJoinContext {
        CombatJoinContext { ticket_ok: true, deny_reason: None, ticket_token_id: Some(1), stats, nft_bonus: NftBonus::default(), profile_picture_url: None }
    }

    fn new_room() -> CombatRoomLogic {
        let ticket = Arc::new(TicketService::new(TicketConfig {
            rpc_url: None,
            contract_address: None,
            signer_private_key: None,
            required: false,
            use_onchain_stats: false,
        }));
        let store = Arc::new(ReplayStore::new(ReplayStoreConfig {
            mode: ReplayMode::Local,
            dir: std::env::temp_dir().join("combat_room_test_unused"),
            supabase_bucket: None,
            supabase_url: None,
            supabase_service_role_key: None,
        }));
        let recorder = Arc::new(Mutex::new(MatchRecorder::new(store, "room1".into(), "Room One".into(), 0, Duration::from_millis(500))));
        CombatRoomLogic::new(CombatRoomDeps { room_id: "room1".into(), ticket, recorder })
    }

    #[test]
    fn second_join_arms_ready_wait_and_first_arms_lobby_wait() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        assert_eq!(room.phase, Phase::WaitingForPlayers);
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        assert_eq!(room.phase, Phase::WaitingForReady);
    }

    #[test]
    fn third_join_is_rejected() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        assert!(room.session_joined(3, "0xCC", context_ok(CombatStats::default())).is_err());
    }

    #[test]
    fn denied_ticket_check_rejects_join() {
        let mut room = new_room();
        let mut ctx = context_ok(CombatStats::default());
        ctx.ticket_ok = false;
        ctx.deny_reason = Some("no ticket".into());
        assert!(room.session_joined(1, "0xAA", ctx).is_err());
        assert!(room.players.is_empty());
    }

    #[test]
    fn both_ready_starts_match() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        room.apply_input(1, CombatInput::Ready { ready: true });
        assert_eq!(room.phase, Phase::WaitingForReady);
        room.apply_input(2, CombatInput::Ready { ready: true });
        assert_eq!(room.phase, Phase::Active);
    }

    // Settlement now fires synchronously-queued `tokio::spawn` calls, so
    // any test reaching a clear-winner end condition needs a runtime.
    #[tokio::test]
    async fn leave_during_active_match_ends_it_with_remaining_as_winner() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        room.apply_input(1, CombatInput::Ready { ready: true });
        room.apply_input(2, CombatInput::Ready { ready: true });
        room.session_left(1);
        assert_eq!(room.phase, Phase::Grace);
    }

    #[tokio::test]
    async fn hp_reaching_zero_ends_the_match_and_settles_against_the_loser() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        room.apply_input(1, CombatInput::Ready { ready: true });
        room.apply_input(2, CombatInput::Ready { ready: true });
        room.apply_damage_to(2, 10_000);
        assert_eq!(room.phase, Phase::Grace);
        assert_eq!(room.players.get(&2).unwrap().hp, 0);

        let bytes = room.deps.recorder.lock().unwrap().to_bytes().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["settlement"]["loser_token_id"], 1);
        assert_eq!(doc["settlement"]["winner_address"], "0xAA");
    }

    #[tokio::test]
    async fn timeout_picks_the_higher_hp_player_as_winner_and_settles() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        room.apply_input(1, CombatInput::Ready { ready: true });
        room.apply_input(2, CombatInput::Ready { ready: true });
        room.apply_damage_to(2, 60);

        for _ in 0..((MATCH_DURATION_MS / combat_sim::TICK_MS) + 2) {
            room.tick();
            if room.phase == Phase::Grace {
                break;
            }
        }
        assert_eq!(room.phase, Phase::Grace);

        let bytes = room.deps.recorder.lock().unwrap().to_bytes().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["phase"]["end_reason"], "timeout");
        assert_eq!(doc["phase"]["winner_session_id"], 1);
        assert_eq!(doc["settlement"]["loser_token_id"], 1);
        assert_eq!(doc["settlement"]["winner_address"], "0xAA");
    }

    #[test]
    fn ready_transition_starts_the_match_in_the_recorder() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        room.apply_input(1, CombatInput::Ready { ready: true });
        room.apply_input(2, CombatInput::Ready { ready: true });

        let bytes = room.deps.recorder.lock().unwrap().to_bytes().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(doc["phase"]["started_at_ms"].is_number());
        assert_eq!(doc["phase"]["planned_end_at_ms"], room.match_end_at_ms);
    }

    #[test]
    fn every_input_is_recorded_verbatim_including_rejected_ones() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        // Position input before the match is Active: ignored by the sim,
        // but still recorded (§4.8 scenario 2's "rejected packet").
        room.apply_input(1, CombatInput::Position { timestamp_ms: 1, x: 5.0, y: 5.0, vx: 0.0, vy: 0.0, orientation: 0.0 });
        room.apply_input(1, CombatInput::Ready { ready: true });
        room.apply_input(2, CombatInput::Ready { ready: true });
        room.apply_input(1, CombatInput::Position { timestamp_ms: 2, x: 6.0, y: 6.0, vx: 0.0, vy: 0.0, orientation: 0.0 });

        let bytes = room.deps.recorder.lock().unwrap().to_bytes().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let inputs = doc["inputs"].as_array().unwrap();
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[0]["kind"], "position");
        assert_eq!(inputs[0]["session_id"], 1);
        assert_eq!(inputs[1]["kind"], "ready");
    }

    #[test]
    fn state_sync_broadcasts_once_then_quiets_until_movement_or_heartbeat() {
        let mut room = new_room();
        room.session_joined(1, "0xAA", context_ok(CombatStats::default())).unwrap();
        room.session_joined(2, "0xBB", context_ok(CombatStats::default())).unwrap();
        room.apply_input(1, CombatInput::Ready { ready: true });
        room.apply_input(2, CombatInput::Ready { ready: true });

        room.tick();
        let first_sync_count = room
            .drain_commands()
            .into_iter()
            .filter(|cmd| matches!(cmd, RoomCommand::Broadcast(CombatEvent::StateSync(_))))
            .count();
        assert_eq!(first_sync_count, 1, "first active tick must force a full baseline sync");

        room.tick();
        let quiet_sync_count = room
            .drain_commands()
            .into_iter()
            .filter(|cmd| matches!(cmd, RoomCommand::Broadcast(CombatEvent::StateSync(_))))
            .count();
        assert_eq!(quiet_sync_count, 0, "no movement or stats change, no heartbeat elapsed yet");

        room.apply_input(1, CombatInput::Position { timestamp_ms: 100, x: 50.0, y: 0.0, vx: 0.0, vy: 0.0, orientation: 0.0 });
        room.tick();
        let moved_sync_count = room
            .drain_commands()
            .into_iter()
            .filter(|cmd| matches!(cmd, RoomCommand::Broadcast(CombatEvent::StateSync(_))))
            .count();
        assert_eq!(moved_sync_count, 1, "displacement past the 8px threshold must force a resync");
    }
}
