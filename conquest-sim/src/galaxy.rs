//! Galaxy Generator (§4.2): a pure function from a 32-bit seed to a fixed
//! planet set. Every source of randomness flows through the one
//! [`sim_core::DeterministicRng`] built from `seed`, so `generate(seed)` is
//! byte-identical across processes (§8 "Galaxy generator is a pure function").

use sim_core::DeterministicRng;

use crate::planet::{Deposit, OrbitParams, Planet, PlanetSize, ALL_DEPOSIT_TYPES};

pub const SUN_RADIUS: f32 = 800.0;
pub const GALAXY_HALF_EXTENT: f32 = 20_000.0;
pub const SUN_NO_SPAWN_RADIUS: f32 = 1_500.0;
pub const MIN_PLANET_DISTANCE: f32 = 300.0;
const PLACEMENT_ATTEMPTS: u32 = 200;

/// Fixed order planets are stamped in, so id assignment matches client-side
/// regeneration (§9 "Galaxy stamping order").
const SIZE_STAMP_ORDER: [PlanetSize; 5] =
    [PlanetSize::Giant, PlanetSize::Large, PlanetSize::Medium, PlanetSize::Small, PlanetSize::Asteroid];

fn empty_planet(id: u32, x: f32, y: f32, radius: f32, size: PlanetSize) -> Planet {
    Planet {
        id,
        x,
        y,
        radius,
        size,
        is_moon: false,
        parent_id: None,
        orbit: None,
        orbit_angle: 0.0,
        is_black_hole: false,
        is_sun: false,
        owner_id: None,
        units: 0.0,
        max_units: size.max_units(),
        defense: size.base_defense(),
        growth_rate: size.base_growth_rate(),
        stability: 100.0,
        connected: false,
        generating: false,
        has_shield: false,
        buildings: [None, None, None],
        deposits: Vec::new(),
        next_mine_time_ms: 0,
        next_turret_fire_time_ms: 0,
    }
}

fn draw_deposits(rng: &mut DeterministicRng, size: PlanetSize) -> Vec<Deposit> {
    let mut types = ALL_DEPOSIT_TYPES.to_vec();
    rng.shuffle(&mut types);
    types
        .into_iter()
        .take(size.deposit_count())
        .map(|kind| Deposit { kind, amount: rng.int_inclusive(500, 5000) as u32 })
        .collect()
}

fn random_point(rng: &mut DeterministicRng) -> (f32, f32) {
    let x = rng.float(-GALAXY_HALF_EXTENT as f64, GALAXY_HALF_EXTENT as f64) as f32;
    let y = rng.float(-GALAXY_HALF_EXTENT as f64, GALAXY_HALF_EXTENT as f64) as f32;
    (x, y)
}

fn too_close(x: f32, y: f32, placed: &[Planet]) -> bool {
    let dist_to_sun = (x * x + y * y).sqrt();
    if dist_to_sun < SUN_NO_SPAWN_RADIUS + SUN_RADIUS {
        return true;
    }
    placed.iter().any(|p| {
        let dx = p.x - x;
        let dy = p.y - y;
        (dx * dx + dy * dy).sqrt() < MIN_PLANET_DISTANCE + p.radius
    })
}

/// Pure: `generate(seed)` always returns the same planet set for the same
/// seed (§4.2, §8).
pub fn generate(seed: u32) -> Vec<Planet> {
    let mut rng = DeterministicRng::new(seed);
    let mut planets = Vec::with_capacity(902);
    let mut next_id = 1u32;

    // Sun first, id 0, always at the galaxy center.
    let mut sun = empty_planet(0, 0.0, 0.0, SUN_RADIUS, PlanetSize::Giant);
    sun.is_sun = true;
    sun.generating = false;
    planets.push(sun);

    // Main planets, rejection-sampled against the sun and each other, one
    // size tier at a time in the fixed stamping order.
    for &size in &SIZE_STAMP_ORDER {
        for _ in 0..size.count_in_galaxy() {
            let mut chosen = random_point(&mut rng);
            for attempt in 0..PLACEMENT_ATTEMPTS {
                if !too_close(chosen.0, chosen.1, &planets) || attempt == PLACEMENT_ATTEMPTS - 1 {
                    break;
                }
                chosen = random_point(&mut rng);
            }
            let radius = size.base_radius();
            let mut planet = empty_planet(next_id, chosen.0, chosen.1, radius, size);
            planet.deposits = draw_deposits(&mut rng, size);
            planets.push(planet);
            next_id += 1;
        }
    }

    // Moons, stamped after every main planet so ids stay deterministic.
    let host_ids: Vec<u32> = planets.iter().filter(|p| !p.is_sun).map(|p| p.id).collect();
    for host_id in host_ids {
        let (host_size, host_radius) = {
            let host = planets.iter().find(|p| p.id == host_id).unwrap();
            (host.size, host.radius)
        };
        for m in 0..host_size.moon_count() {
            let orbit_radius = host_radius * 2.0 + 60.0 + m as f32 * 40.0;
            let angular_speed = rng.float(0.05, 0.2) as f32;
            let mut moon = empty_planet(next_id, 0.0, 0.0, host_radius * 0.3, PlanetSize::Asteroid);
            moon.is_moon = true;
            moon.parent_id = Some(host_id);
            moon.orbit = Some(OrbitParams { radius: orbit_radius, angular_speed_rad_s: angular_speed });
            moon.orbit_angle = rng.float(0.0, std::f64::consts::TAU) as f32;
            planets.push(moon);
            next_id += 1;
        }
    }

    // Exactly one black hole, at a random angle/distance from the sun,
    // clamped to world bounds (§4.2).
    let angle = rng.float(0.0, std::f64::consts::TAU);
    let distance = rng.float((GALAXY_HALF_EXTENT * 0.5) as f64, GALAXY_HALF_EXTENT as f64);
    let bx = (angle.cos() * distance) as f32;
    let by = (angle.sin() * distance) as f32;
    let bx = bx.clamp(-GALAXY_HALF_EXTENT, GALAXY_HALF_EXTENT);
    let by = by.clamp(-GALAXY_HALF_EXTENT, GALAXY_HALF_EXTENT);
    let mut black_hole = empty_planet(next_id, bx, by, SUN_RADIUS * 0.6, PlanetSize::Giant);
    black_hole.is_black_hole = true;
    planets.push(black_hole);

    planets
}

/// Filters to candidate starting planets: unowned small/medium, non-moon,
/// non-sun, non-black-hole, farther than `min_distance_from_homes` from
/// every already-chosen home (§4.2).
fn candidate_homes<'a>(planets: &'a [Planet], homes: &[(f32, f32)], min_distance_from_homes: f32) -> Vec<&'a Planet> {
    planets
        .iter()
        .filter(|p| {
            !p.is_moon
                && !p.is_sun
                && !p.is_black_hole
                && p.is_neutral()
                && matches!(p.size, PlanetSize::Small | PlanetSize::Medium)
        })
        .filter(|p| {
            homes.iter().all(|&(hx, hy)| {
                let dx = p.x - hx;
                let dy = p.y - hy;
                (dx * dx + dy * dy).sqrt() >= min_distance_from_homes
            })
        })
        .collect()
}

const MIN_HOME_DISTANCE: f32 = 2_500.0;

/// Picks a starting planet for a new player (§4.2). `homes` holds the
/// (x, y) of every already-assigned home.
pub fn pick_starting_planet(planets: &[Planet], homes: &[(f32, f32)], rng: &mut DeterministicRng) -> Option<u32> {
    let candidates = candidate_homes(planets, homes, MIN_HOME_DISTANCE);
    if candidates.is_empty() {
        return None;
    }

    if homes.is_empty() {
        // First player: uniformly from the top 20% farthest from the sun.
        let mut by_sun_distance: Vec<&Planet> = candidates;
        by_sun_distance.sort_by(|a, b| {
            let da = a.x * a.x + a.y * a.y;
            let db = b.x * b.x + b.y * b.y;
            db.partial_cmp(&da).unwrap()
        });
        let top_count = ((by_sun_distance.len() as f64 * 0.2).ceil() as usize).max(1);
        let pool = &by_sun_distance[..top_count.min(by_sun_distance.len())];
        let idx = rng.int_inclusive(0, pool.len() as i64 - 1) as usize;
        return Some(pool[idx].id);
    }

    // Subsequent players: score by "neighbor sweet spot" (closest existing
    // home at [1500, 3000]) plus an outer-ring bonus, pick from the top 10%.
    let mut scored: Vec<(f32, u32)> = candidates
        .iter()
        .map(|p| {
            let closest = homes
                .iter()
                .map(|&(hx, hy)| {
                    let dx = p.x - hx;
                    let dy = p.y - hy;
                    (dx * dx + dy * dy).sqrt()
                })
                .fold(f32::MAX, f32::min);
            let sweet_spot_score = if (1500.0..=3000.0).contains(&closest) {
                1.0 - (closest - 2250.0).abs() / 750.0
            } else {
                0.0
            };
            let sun_distance = (p.x * p.x + p.y * p.y).sqrt();
            let outer_ring_bonus = (sun_distance / GALAXY_HALF_EXTENT).min(1.0) * 0.5;
            (sweet_spot_score + outer_ring_bonus, p.id)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    let top_count = ((scored.len() as f64 * 0.1).ceil() as usize).max(1);
    let pool = &scored[..top_count.min(scored.len())];
    let idx = rng.int_inclusive(0, pool.len() as i64 - 1) as usize;
    Some(pool[idx].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_byte_identical_in_process() {
        let a = generate(42);
        let b = generate(42);
        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.iter().zip(b.iter()) {
            assert_eq!((pa.x, pa.y, pa.radius, pa.size as u8), (pb.x, pb.y, pb.radius, pb.size as u8));
        }
    }

    #[test]
    fn size_distribution_matches_configured_counts() {
        let planets = generate(42);
        let asteroids = planets.iter().filter(|p| !p.is_moon && !p.is_sun && !p.is_black_hole && p.size == PlanetSize::Asteroid).count();
        assert_eq!(asteroids, 250);
        let total_main = planets.iter().filter(|p| !p.is_moon && !p.is_sun && !p.is_black_hole).count();
        assert_eq!(total_main, 900);
    }

    #[test]
    fn exactly_one_black_hole_and_one_sun() {
        let planets = generate(7);
        assert_eq!(planets.iter().filter(|p| p.is_black_hole).count(), 1);
        assert_eq!(planets.iter().filter(|p| p.is_sun).count(), 1);
    }

    #[test]
    fn sun_radius_matches_spec() {
        let planets = generate(7);
        let sun = planets.iter().find(|p| p.is_sun).unwrap();
        assert_eq!(sun.radius, SUN_RADIUS);
    }

    #[test]
    fn different_seeds_diverge() {
        let a = generate(1);
        let b = generate(2);
        assert_ne!((a[1].x, a[1].y), (b[1].x, b[1].y));
    }

    #[test]
    fn first_home_has_no_prior_homes_to_avoid() {
        let planets = generate(42);
        let mut rng = DeterministicRng::new(99);
        let home = pick_starting_planet(&planets, &[], &mut rng);
        assert!(home.is_some());
    }

    #[test]
    fn second_home_keeps_distance_from_first() {
        let planets = generate(42);
        let mut rng = DeterministicRng::new(99);
        let first_id = pick_starting_planet(&planets, &[], &mut rng).unwrap();
        let first = planets.iter().find(|p| p.id == first_id).unwrap();
        let second_id = pick_starting_planet(&planets, &[(first.x, first.y)], &mut rng).unwrap();
        let second = planets.iter().find(|p| p.id == second_id).unwrap();
        let dist = ((first.x - second.x).powi(2) + (first.y - second.y).powi(2)).sqrt();
        assert!(dist >= MIN_HOME_DISTANCE);
    }
}
