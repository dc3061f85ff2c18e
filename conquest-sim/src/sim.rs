//! The 10 Hz conquest simulation tick (§4.9): orbits, mining, growth,
//! stability, attacks, turrets, battles, supply recalc and AI.

use serde::{Deserialize, Serialize};
use sim_core::DeterministicRng;

use crate::attack::{
    Attack, Battle, ShipClass, TurretMissile, ATTACK_LINEAR_SPEED, ATTACK_MAX_ANGULAR_VELOCITY_RAD_S,
    BATTLE_MERGE_DURATION_CAP_MS, SHIELD_INTERACTION_RADIUS, TURRET_ACQUIRE_RANGE, TURRET_MISSILE_SPEED,
};
use crate::planet::Planet;
use crate::player::ConquestPlayer;

pub const TICK_HZ: u32 = 10;
pub const TICK_MS: u64 = 1000 / TICK_HZ as u64;
pub const SUPPLY_RECALC_INTERVAL_MS: u64 = 2_000;
pub const SUPPLY_RANGE: f32 = 800.0;
pub const EMPIRE_UNIT_THRESHOLD: f32 = 2_000.0;
pub const EMPIRE_SLOW_THRESHOLD: u32 = 8;
pub const EMPIRE_DECAY_THRESHOLD: u32 = 20;
pub const DISTANCE_LOSS_PER_30: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn ai_interval_ms(self) -> u64 {
        match self {
            Difficulty::Easy => 6_000,
            Difficulty::Normal => 3_500,
            Difficulty::Hard => 1_800,
        }
    }

    pub fn growth_multiplier(self) -> f32 {
        match self {
            Difficulty::Easy => 0.8,
            Difficulty::Normal => 1.0,
            Difficulty::Hard => 1.3,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConquestSimEvent {
    AttackLaunched { attack_id: u32, from_id: u32, to_id: u32, shooter_id: u16 },
    AttackDestroyed { attack_id: u32 },
    BattleStarted { planet_id: u32, attacker_id: u16 },
    BattleResolved { planet_id: u32, new_owner: Option<u16> },
    TurretFired { planet_id: u32, attack_id: u32 },
    PlayerEliminated { slot: u16 },
}

pub struct GalaxyState {
    pub planets: Vec<Planet>,
    pub players: Vec<ConquestPlayer>,
    pub attacks: Vec<Attack>,
    pub battles: Vec<Battle>,
    pub missiles: Vec<TurretMissile>,
    pub game_time_ms: u64,
    pub difficulty: Difficulty,
    pub rng: DeterministicRng,
    next_attack_id: u32,
    since_supply_recalc_ms: u64,
    since_ai_ms: u64,
}

impl GalaxyState {
    pub fn new(planets: Vec<Planet>, seed: u32, difficulty: Difficulty) -> Self {
        Self {
            planets,
            players: Vec::new(),
            attacks: Vec::new(),
            battles: Vec::new(),
            missiles: Vec::new(),
            game_time_ms: 0,
            difficulty,
            rng: DeterministicRng::new(seed),
            next_attack_id: 1,
            since_supply_recalc_ms: 0,
            since_ai_ms: 0,
        }
    }

    fn planet_mut(&mut self, id: u32) -> Option<&mut Planet> {
        self.planets.iter_mut().find(|p| p.id == id)
    }

    fn planet(&self, id: u32) -> Option<&Planet> {
        self.planets.iter().find(|p| p.id == id)
    }

    pub fn player(&self, slot: u16) -> Option<&ConquestPlayer> {
        self.players.iter().find(|p| p.slot == slot)
    }

    pub fn planet_count(&self, slot: u16) -> u32 {
        self.planets.iter().filter(|p| p.owner_id == Some(slot)).count() as u32
    }

    pub fn total_units(&self, slot: u16) -> f32 {
        self.planets.iter().filter(|p| p.owner_id == Some(slot)).map(|p| p.units).sum()
    }

    /// Active-generator cap (§3 invariant): 5 if planetCount <= 5, else
    /// 5 + floor((n-5)/5).
    pub fn max_generators(planet_count: u32) -> u32 {
        if planet_count <= 5 {
            5
        } else {
            5 + (planet_count - 5) / 5
        }
    }

    /// Advances the whole simulation by one tick, returning the discrete
    /// events the orchestrator should broadcast.
    pub fn tick(&mut self, dt_ms: u64) -> Vec<ConquestSimEvent> {
        self.game_time_ms += dt_ms;
        let mut events = Vec::new();

        self.step_moons(dt_ms);
        self.step_mining(dt_ms);
        self.step_growth(dt_ms);
        self.step_stability(dt_ms, &mut events);
        self.step_attacks(dt_ms, &mut events);
        self.step_turret_targeting(dt_ms);
        self.step_turret_missiles(dt_ms, &mut events);
        self.resolve_battles(&mut events);

        self.since_supply_recalc_ms += dt_ms;
        if self.since_supply_recalc_ms >= SUPPLY_RECALC_INTERVAL_MS {
            self.since_supply_recalc_ms = 0;
            self.recalc_supply(&mut events);
        }

        self.since_ai_ms += dt_ms;
        let ai_interval = self.difficulty.ai_interval_ms();
        if self.since_ai_ms >= ai_interval {
            self.since_ai_ms = 0;
            self.run_ai();
        }

        events
    }

    fn step_moons(&mut self, dt_ms: u64) {
        let dt = dt_ms as f32 / 1000.0;
        let parents: Vec<(u32, f32, f32)> = self.planets.iter().filter(|p| !p.is_moon).map(|p| (p.id, p.x, p.y)).collect();
        for moon in self.planets.iter_mut().filter(|p| p.is_moon) {
            let Some(orbit) = moon.orbit else { continue };
            moon.orbit_angle += orbit.angular_speed_rad_s * dt;
            if let Some(&(_, px, py)) = parents.iter().find(|&&(id, _, _)| Some(id) == moon.parent_id) {
                moon.x = px + orbit.radius * moon.orbit_angle.cos();
                moon.y = py + orbit.radius * moon.orbit_angle.sin();
            }
        }
    }

    fn step_mining(&mut self, dt_ms: u64) {
        for planet in self.planets.iter_mut() {
            if planet.mine_count() == 0 || planet.owner_id.is_none() {
                continue;
            }
            if self.game_time_ms < planet.next_mine_time_ms {
                continue;
            }
            planet.next_mine_time_ms = self.game_time_ms + 5_000;
            for deposit in planet.deposits.iter_mut() {
                deposit.amount = deposit.amount.saturating_sub(planet.mine_count() as u32 * 10);
            }
        }
        let _ = dt_ms;
    }

    /// Growth rule (§4.9). Mutates `planet.units`.
    fn step_growth(&mut self, dt_ms: u64) {
        let dt_s = dt_ms as f32 / 1000.0;
        let multiplier = self.difficulty.growth_multiplier();
        let planet_counts: std::collections::HashMap<u16, u32> =
            self.players.iter().map(|p| (p.slot, self.planet_count(p.slot))).collect();
        let total_units: std::collections::HashMap<u16, f32> =
            self.players.iter().map(|p| (p.slot, self.total_units(p.slot))).collect();

        for planet in self.planets.iter_mut() {
            let Some(owner) = planet.owner_id else { continue };
            if !planet.generating {
                continue;
            }
            let mut growth = multiplier * planet.growth_rate;
            growth *= 1.0 + 0.25 * planet.mine_count() as f32;

            if total_units.get(&owner).copied().unwrap_or(0.0) >= EMPIRE_UNIT_THRESHOLD {
                if planet.stability < 30.0 {
                    growth = -1.0;
                } else if planet.stability < 70.0 {
                    growth *= 0.3;
                }
                let count = planet_counts.get(&owner).copied().unwrap_or(0);
                if count > EMPIRE_SLOW_THRESHOLD {
                    let excess = (count - EMPIRE_SLOW_THRESHOLD) as f32;
                    growth *= (1.0 - excess * 0.08).max(0.1);
                }
                if count > EMPIRE_DECAY_THRESHOLD {
                    growth -= 0.5;
                }
                if !planet.connected {
                    growth = growth.min(-0.5);
                }
            }

            planet.units += growth * dt_s;
            let cap = planet.max_units + 200.0 * planet.factory_count() as f32;
            planet.units = planet.units.clamp(0.0, cap);
            if planet.units <= 0.0 {
                planet.make_neutral();
            }
        }
    }

    /// Stability rule (§4.9): ramps toward a target computed from distance
    /// to home, connectivity, and empire size.
    fn step_stability(&mut self, dt_ms: u64, events: &mut Vec<ConquestSimEvent>) {
        let dt_s = dt_ms as f32 / 1000.0;
        let homes: std::collections::HashMap<u16, (f32, f32)> = self
            .players
            .iter()
            .filter_map(|p| self.planet(p.home_id).map(|h| (p.slot, (h.x, h.y))))
            .collect();
        let planet_counts: std::collections::HashMap<u16, u32> =
            self.players.iter().map(|p| (p.slot, self.planet_count(p.slot))).collect();

        let mut to_neutralize = Vec::new();
        for planet in self.planets.iter_mut() {
            let Some(owner) = planet.owner_id else { continue };
            let Some(&(hx, hy)) = homes.get(&owner) else { continue };
            let dx = planet.x - hx;
            let dy = planet.y - hy;
            let dist_home = (dx * dx + dy * dy).sqrt();

            let mut target = 100.0 - (dist_home / 200.0) * 3.0;
            if !planet.connected {
                target = target.min(20.0);
            }
            let count = planet_counts.get(&owner).copied().unwrap_or(0);
            if count > EMPIRE_SLOW_THRESHOLD {
                target -= 3.0 * (count - EMPIRE_SLOW_THRESHOLD) as f32;
            }
            let target = target.clamp(0.0, 100.0);

            if target > planet.stability {
                planet.stability = (planet.stability + 5.0 * dt_s).min(target);
            } else {
                planet.stability = (planet.stability - 2.0 * dt_s).max(target);
            }

            if planet.stability <= 0.0 {
                to_neutralize.push(planet.id);
            }
        }

        for id in to_neutralize {
            if let Some(planet) = self.planet_mut(id) {
                planet.units *= 0.3;
                planet.generating = false;
                planet.make_neutral();
                events.push(ConquestSimEvent::BattleResolved { planet_id: id, new_owner: None });
            }
        }
    }

    /// Consumes `floor(from.units * percent/100)` units (>=1, else reject)
    /// and spawns an in-flight attack (§4.9 step 1).
    pub fn launch_attack(&mut self, from_id: u32, to_id: u32, percent: u8, blitz: bool, shooter_id: u16) -> Result<u32, &'static str> {
        let Some(from) = self.planet(from_id) else { return Err("unknown source planet") };
        if from.owner_id != Some(shooter_id) {
            return Err("not your planet");
        }
        let send = (from.units * percent as f32 / 100.0).floor();
        if send < 1.0 {
            return Err("not enough units");
        }
        let (fx, fy) = (from.x, from.y);
        let to = self.planet(to_id).ok_or("unknown target planet")?;
        let (tx, ty) = (to.x, to.y);
        let heading = (ty - fy).atan2(tx - fx);

        if let Some(from_mut) = self.planet_mut(from_id) {
            from_mut.units -= send;
        }

        let id = self.next_attack_id;
        self.next_attack_id += 1;
        self.attacks.push(Attack {
            id,
            from_id,
            to_id,
            starting_units: send,
            current_units: send,
            shooter_id,
            x: fx,
            y: fy,
            heading,
            traveled: 0.0,
            drone_bonus: 0,
            blitz,
            shield_hit: false,
            other_loss: 0.0,
            ship_class: ShipClass::for_units(send),
        });
        Ok(id)
    }

    fn step_attacks(&mut self, dt_ms: u64, events: &mut Vec<ConquestSimEvent>) {
        let dt_s = dt_ms as f32 / 1000.0;
        let mut arrived = Vec::new();
        let mut destroyed = Vec::new();

        for attack in self.attacks.iter_mut() {
            let Some(target) = self.planets.iter().find(|p| p.id == attack.to_id) else {
                destroyed.push(attack.id);
                continue;
            };
            let dx = target.x - attack.x;
            let dy = target.y - attack.y;
            let desired_heading = dy.atan2(dx);
            let mut delta = desired_heading - attack.heading;
            while delta > std::f32::consts::PI {
                delta -= std::f32::consts::TAU;
            }
            while delta < -std::f32::consts::PI {
                delta += std::f32::consts::TAU;
            }
            let max_turn = ATTACK_MAX_ANGULAR_VELOCITY_RAD_S * dt_s;
            attack.heading += delta.clamp(-max_turn, max_turn);

            let step = ATTACK_LINEAR_SPEED * dt_s;
            attack.x += attack.heading.cos() * step;
            attack.y += attack.heading.sin() * step;
            attack.traveled += step;

            attack.current_units = attack.arriving_units(DISTANCE_LOSS_PER_30);
            if attack.current_units <= 0.0 {
                destroyed.push(attack.id);
                continue;
            }

            // Shield interaction (§4.9 step 4). The reduction is recorded as
            // a permanent `other_loss` rather than subtracted directly from
            // `current_units`, since the next tick's decay recompute is
            // based on `starting_units` and would otherwise erase it.
            if target.has_shield && Some(attack.shooter_id) != target.owner_id && !attack.shield_hit {
                let dist = (dx * dx + dy * dy).sqrt();
                if dist <= SHIELD_INTERACTION_RADIUS {
                    attack.shield_hit = true;
                    let defender_units = target.units;
                    let reduction = attack.current_units.min(defender_units);
                    attack.other_loss += reduction;
                    attack.current_units = attack.arriving_units(DISTANCE_LOSS_PER_30);
                    if attack.current_units <= 0.0 {
                        destroyed.push(attack.id);
                        continue;
                    }
                }
            }

            let dist = (dx * dx + dy * dy).sqrt();
            if dist <= target.radius + 5.0 {
                arrived.push(attack.id);
            }
        }

        for id in destroyed {
            self.attacks.retain(|a| a.id != id);
            events.push(ConquestSimEvent::AttackDestroyed { attack_id: id });
        }

        for id in arrived {
            self.resolve_arrival(id, events);
        }

        if self.attacks.iter().any(|a| a.shield_hit) {
            let consumed: Vec<u32> = self.attacks.iter().filter(|a| a.shield_hit).map(|a| a.to_id).collect();
            for to_id in consumed {
                if let Some(planet) = self.planet_mut(to_id) {
                    if planet.has_shield {
                        planet.has_shield = false;
                        planet.remove_first_shield_gen();
                    }
                }
            }
        }
    }

    fn resolve_arrival(&mut self, attack_id: u32, events: &mut Vec<ConquestSimEvent>) {
        let Some(pos) = self.attacks.iter().position(|a| a.id == attack_id) else { return };
        let attack = self.attacks.remove(pos);
        let Some((owner_id, defender_units, max_units)) =
            self.planet(attack.to_id).map(|p| (p.owner_id, p.units, p.max_units))
        else {
            return;
        };

        if owner_id == Some(attack.shooter_id) {
            if let Some(target) = self.planet_mut(attack.to_id) {
                target.units = (defender_units + attack.current_units).min(max_units);
            }
            return;
        }

        // Spawn or merge a battle (at most one concurrent per planet+attacker).
        if let Some(existing) = self.battles.iter_mut().find(|b| b.planet_id == attack.to_id && b.attacker_id == attack.shooter_id && !b.resolved) {
            existing.merge(attack.current_units);
            return;
        }

        let duration = Battle::duration_for_units(attack.current_units + defender_units);
        self.battles.push(Battle {
            planet_id: attack.to_id,
            attacker_units: attack.current_units,
            defender_units,
            attacker_id: attack.shooter_id,
            start_ms: self.game_time_ms,
            duration_ms: duration.min(BATTLE_MERGE_DURATION_CAP_MS),
            blitz: attack.blitz,
            resolved: false,
        });
        events.push(ConquestSimEvent::BattleStarted { planet_id: attack.to_id, attacker_id: attack.shooter_id });
    }

    fn resolve_battles(&mut self, events: &mut Vec<ConquestSimEvent>) {
        let now = self.game_time_ms;
        let mut resolved_ids = Vec::new();
        for (idx, battle) in self.battles.iter().enumerate() {
            if battle.resolved {
                continue;
            }
            if now.saturating_sub(battle.start_ms) >= battle.duration_ms {
                resolved_ids.push(idx);
            }
        }

        for idx in resolved_ids {
            let battle = &mut self.battles[idx];
            battle.resolved = true;
            let planet_id = battle.planet_id;
            let attacker_units = battle.attacker_units;
            let defender_units = battle.defender_units;
            let attacker_id = battle.attacker_id;
            let defense_multiplier = self.planet(planet_id).map(|p| p.defense).unwrap_or(1.0);
            let defense_strength = defender_units * defense_multiplier;

            let new_owner = if attacker_units > defense_strength {
                let remaining = (attacker_units - defense_strength).max(1.0);
                if let Some(planet) = self.planet_mut(planet_id) {
                    planet.owner_id = Some(attacker_id);
                    planet.units = remaining;
                    planet.stability = 50.0;
                    planet.connected = false;
                    planet.has_shield = false;
                }
                let count = self.planet_count(attacker_id);
                if GalaxyState::max_generators(count) > 0 {
                    if let Some(planet) = self.planet_mut(planet_id) {
                        planet.generating = true;
                    }
                }
                Some(attacker_id)
            } else {
                let remaining_defense = (defense_strength - attacker_units) / defense_multiplier;
                if let Some(planet) = self.planet_mut(planet_id) {
                    if remaining_defense <= 0.0 {
                        planet.make_neutral();
                        planet.units = 0.0;
                    } else {
                        planet.units = remaining_defense;
                    }
                }
                self.planet(planet_id).and_then(|p| p.owner_id)
            };

            events.push(ConquestSimEvent::BattleResolved { planet_id, new_owner });
        }

        self.battles.retain(|b| !b.resolved);
    }

    /// Nearest enemy attack targeting this planet or a same-owner planet,
    /// within `TURRET_ACQUIRE_RANGE`, one missile per turret, staggered
    /// delays; next fire time is `2,000 + rand(3,000)` ms out (§4.9).
    fn step_turret_targeting(&mut self, dt_ms: u64) {
        const TURRET_COOLDOWN_BASE_MS: u64 = 2_000;
        const TURRET_COOLDOWN_JITTER_MS: i64 = 3_000;
        let mut fired: Vec<u32> = Vec::new();

        for planet in &self.planets {
            let Some(owner) = planet.owner_id else { continue };
            let turrets = planet.turret_count();
            if turrets == 0 || self.game_time_ms < planet.next_turret_fire_time_ms {
                continue;
            }

            let mut best: Option<(u32, f32)> = None;
            for attack in &self.attacks {
                if attack.shooter_id == owner {
                    continue;
                }
                let targets_owner_planet =
                    attack.to_id == planet.id || self.planet(attack.to_id).and_then(|p| p.owner_id) == Some(owner);
                if !targets_owner_planet {
                    continue;
                }
                let dx = attack.x - planet.x;
                let dy = attack.y - planet.y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist > TURRET_ACQUIRE_RANGE {
                    continue;
                }
                if best.map(|(_, d)| dist < d).unwrap_or(true) {
                    best = Some((attack.id, dist));
                }
            }

            let Some((target_id, _)) = best else { continue };
            for t in 0..turrets {
                self.missiles.push(TurretMissile {
                    x: planet.x,
                    y: planet.y,
                    target_attack_id: target_id,
                    speed: TURRET_MISSILE_SPEED,
                    source_planet_id: planet.id,
                    delay_ms: t as u64 * 150,
                });
            }
            fired.push(planet.id);
        }

        for id in fired {
            let next_fire_at =
                self.game_time_ms + TURRET_COOLDOWN_BASE_MS + self.rng.int_inclusive(0, TURRET_COOLDOWN_JITTER_MS) as u64;
            if let Some(planet) = self.planet_mut(id) {
                planet.next_turret_fire_time_ms = next_fire_at;
            }
        }
        let _ = dt_ms;
    }

    fn step_turret_missiles(&mut self, dt_ms: u64, events: &mut Vec<ConquestSimEvent>) {
        let mut done = Vec::new();
        let mut damage_targets: Vec<(u32, f32, u32)> = Vec::new();

        for (idx, missile) in self.missiles.iter_mut().enumerate() {
            if missile.delay_ms > 0 {
                missile.delay_ms = missile.delay_ms.saturating_sub(dt_ms);
                continue;
            }
            let Some(target) = self.attacks.iter().find(|a| a.id == missile.target_attack_id) else {
                done.push(idx);
                continue;
            };
            let dx = target.x - missile.x;
            let dy = target.y - missile.y;
            let dist = (dx * dx + dy * dy).sqrt();
            let step = missile.speed * (dt_ms as f32 / 1000.0);
            if dist <= step {
                let source_units = self.planets.iter().find(|p| p.id == missile.source_planet_id).map(|p| p.units).unwrap_or(0.0);
                let damage = (source_units / 10.0).floor();
                damage_targets.push((missile.target_attack_id, damage, 0));
                events.push(ConquestSimEvent::TurretFired { planet_id: missile.source_planet_id, attack_id: missile.target_attack_id });
                done.push(idx);
            } else {
                let nx = dx / dist;
                let ny = dy / dist;
                missile.x += nx * step;
                missile.y += ny * step;
            }
        }

        for idx in done.into_iter().rev() {
            self.missiles.remove(idx);
        }

        for (attack_id, damage, _) in damage_targets {
            if let Some(attack) = self.attacks.iter_mut().find(|a| a.id == attack_id) {
                attack.other_loss += damage;
                attack.current_units = attack.arriving_units(DISTANCE_LOSS_PER_30);
                if attack.current_units <= 0.0 {
                    self.attacks.retain(|a| a.id != attack_id);
                    events.push(ConquestSimEvent::AttackDestroyed { attack_id });
                }
            }
        }
    }

    /// BFS from each player's home over their own planets within supply
    /// range. A player not reaching their home anymore is eliminated
    /// (§3 invariant, §4.9).
    fn recalc_supply(&mut self, events: &mut Vec<ConquestSimEvent>) {
        let mut eliminated = Vec::new();
        let slots: Vec<u16> = self.players.iter().map(|p| p.slot).collect();

        for slot in slots {
            let owned: Vec<u32> = self.planets.iter().filter(|p| p.owner_id == Some(slot)).map(|p| p.id).collect();
            let player = self.players.iter().find(|p| p.slot == slot).unwrap();
            let home_owned = owned.contains(&player.home_id);

            let mut reachable = std::collections::HashSet::new();
            if home_owned {
                let mut queue = vec![player.home_id];
                reachable.insert(player.home_id);
                while let Some(current_id) = queue.pop() {
                    let Some(current) = self.planet(current_id) else { continue };
                    let (cx, cy) = (current.x, current.y);
                    for &candidate_id in &owned {
                        if reachable.contains(&candidate_id) {
                            continue;
                        }
                        let Some(candidate) = self.planet(candidate_id) else { continue };
                        let dx = candidate.x - cx;
                        let dy = candidate.y - cy;
                        if (dx * dx + dy * dy).sqrt() <= SUPPLY_RANGE {
                            reachable.insert(candidate_id);
                            queue.push(candidate_id);
                        }
                    }
                }
            }

            for &id in &owned {
                if let Some(planet) = self.planet_mut(id) {
                    planet.connected = reachable.contains(&id);
                }
            }

            if !home_owned {
                eliminated.push(slot);
            }
        }

        for slot in eliminated {
            if let Some(player) = self.players.iter_mut().find(|p| p.slot == slot) {
                if player.alive {
                    player.alive = false;
                    events.push(ConquestSimEvent::PlayerEliminated { slot });
                }
            }
        }

        self.enforce_generator_caps();
    }

    /// Active-generator count per player stays <= `max_generators`; the
    /// smallest-radius generators are deactivated first (§3 invariant).
    fn enforce_generator_caps(&mut self) {
        let slots: Vec<u16> = self.players.iter().map(|p| p.slot).collect();
        for slot in slots {
            let count = self.planet_count(slot);
            let cap = GalaxyState::max_generators(count) as usize;
            let mut generating: Vec<(u32, f32)> = self
                .planets
                .iter()
                .filter(|p| p.owner_id == Some(slot) && p.generating)
                .map(|p| (p.id, p.radius))
                .collect();
            if generating.len() <= cap {
                continue;
            }
            generating.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            let to_disable: Vec<u32> = generating[..generating.len() - cap].iter().map(|(id, _)| *id).collect();
            for id in to_disable {
                if let Some(planet) = self.planet_mut(id) {
                    planet.generating = false;
                }
            }
        }
    }

    /// Manages generators (highest-radius first) and launches the top-2
    /// scored attacks for every AI player (§4.9).
    fn run_ai(&mut self) {
        let ai_slots: Vec<u16> = self.players.iter().filter(|p| p.is_ai && p.alive).map(|p| p.slot).collect();
        for slot in ai_slots {
            self.ai_manage_generators(slot);
            self.ai_launch_top_actions(slot);
        }
    }

    fn ai_manage_generators(&mut self, slot: u16) {
        let count = self.planet_count(slot);
        let cap = GalaxyState::max_generators(count) as usize;
        let mut owned: Vec<(u32, f32, bool)> = self
            .planets
            .iter()
            .filter(|p| p.owner_id == Some(slot))
            .map(|p| (p.id, p.radius, p.generating))
            .collect();
        owned.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let mut active = 0usize;
        for (id, _, was_generating) in owned {
            if active < cap {
                if let Some(planet) = self.planet_mut(id) {
                    planet.generating = true;
                }
                active += 1;
            } else if was_generating {
                if let Some(planet) = self.planet_mut(id) {
                    planet.generating = false;
                }
            }
        }
    }

    fn ai_launch_top_actions(&mut self, slot: u16) {
        let Some(player) = self.player(slot) else { return };
        let home_id = player.home_id;
        let mut mines: Vec<u32> = self.planets.iter().filter(|p| p.owner_id == Some(slot) && p.units >= 2.0).map(|p| p.id).collect();
        mines.sort();

        let mut scored: Vec<(f32, u32, u32)> = Vec::new();
        for &mine_id in &mines {
            let Some(mine) = self.planet(mine_id) else { continue };
            let (mx, my, mine_units) = (mine.x, mine.y, mine.units);
            for target in &self.planets {
                if target.id == mine_id {
                    continue;
                }
                let dx = target.x - mx;
                let dy = target.y - my;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist > 600.0 {
                    continue;
                }
                let score = if target.owner_id.is_none() {
                    1.0 - (target.units / target.max_units).min(1.0)
                } else if target.owner_id != Some(slot) {
                    let sent = (mine_units * 0.5).floor();
                    if sent <= target.units * target.defense * 1.2 {
                        continue;
                    }
                    let mut s = 0.6;
                    if target.id == home_id {
                        s += 0.4;
                    }
                    s
                } else {
                    continue;
                };
                scored.push((score, mine_id, target.id));
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        for &(_, from_id, to_id) in scored.iter().take(2) {
            let _ = self.launch_attack(from_id, to_id, 50, false, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planet::PlanetSize;
    use crate::player::{ColorPair, ConquestPlayer};

    fn bare_planet(id: u32, x: f32, y: f32, owner: Option<u16>, units: f32) -> Planet {
        Planet {
            id,
            x,
            y,
            radius: 35.0,
            size: PlanetSize::Small,
            is_moon: false,
            parent_id: None,
            orbit: None,
            orbit_angle: 0.0,
            is_black_hole: false,
            is_sun: false,
            owner_id: owner,
            units,
            max_units: 400.0,
            defense: 1.0,
            growth_rate: 1.0,
            stability: 100.0,
            connected: true,
            generating: owner.is_some(),
            has_shield: false,
            buildings: [None, None, None],
            deposits: Vec::new(),
            next_mine_time_ms: 0,
            next_turret_fire_time_ms: 0,
        }
    }

    /// Two close-together owned planets, 100 units apart, well within the
    /// free-decay range so an attack arrives in a handful of ticks.
    fn two_player_state() -> GalaxyState {
        let home0 = bare_planet(0, 0.0, 0.0, Some(0), 500.0);
        let home1 = bare_planet(1, 100.0, 0.0, Some(1), 50.0);
        let mut state = GalaxyState::new(vec![home0, home1], 1, Difficulty::Normal);
        state.players.push(ConquestPlayer::new(0, "0xA".into(), "A".into(), ColorPair(0, 1), 0, false));
        state.players.push(ConquestPlayer::new(1, "0xB".into(), "B".into(), ColorPair(2, 3), 1, false));
        state
    }

    #[test]
    fn launch_attack_rejects_insufficient_units() {
        let mut state = two_player_state();
        if let Some(p) = state.planets.iter_mut().find(|p| p.id == 0) {
            p.units = 0.5;
        }
        assert!(state.launch_attack(0, 1, 50, false, 0).is_err());
    }

    #[test]
    fn launch_attack_rejects_non_owner() {
        let mut state = two_player_state();
        assert!(state.launch_attack(1, 0, 50, false, 0).is_err());
    }

    #[test]
    fn full_send_capture_eliminates_defender() {
        let mut state = two_player_state();
        state.launch_attack(0, 1, 100, false, 0).unwrap();
        for _ in 0..120 {
            state.tick(TICK_MS);
        }
        let target = state.planets.iter().find(|p| p.id == 1).unwrap();
        assert_eq!(target.owner_id, Some(0));
        assert!(!state.players[1].alive);
    }

    #[test]
    fn max_generators_formula() {
        assert_eq!(GalaxyState::max_generators(3), 5);
        assert_eq!(GalaxyState::max_generators(5), 5);
        assert_eq!(GalaxyState::max_generators(10), 6);
        assert_eq!(GalaxyState::max_generators(15), 7);
    }

    #[test]
    fn reinforcement_caps_at_max_units() {
        let mut state = two_player_state();
        if let Some(p) = state.planets.iter_mut().find(|p| p.id == 1) {
            p.owner_id = Some(0);
            p.units = 395.0;
            p.max_units = 400.0;
        }
        state.launch_attack(0, 1, 50, false, 0).unwrap();
        for _ in 0..60 {
            state.tick(TICK_MS);
        }
        let target = state.planets.iter().find(|p| p.id == 1).unwrap();
        assert!(target.units <= target.max_units);
    }

    #[test]
    fn supply_recalc_eliminates_player_who_loses_home() {
        let mut state = two_player_state();
        if let Some(p) = state.planets.iter_mut().find(|p| p.id == 1) {
            p.owner_id = Some(0);
        }
        let mut events = Vec::new();
        state.recalc_supply(&mut events);
        assert!(!state.players[1].alive);
    }
}
