//! Shared building blocks for both room runtimes: a deterministic PRNG, a
//! small timer scheduler, the FNV-1a seed-derivation hash, and the generic
//! `RoomLogic` contract that both the combat and the conquest orchestrator
//! implement.
//!
//! The `RoomLogic` trait below is the server-authoritative generalization of
//! the relay server's `BackEndArchitecture`: instead of a client-hosted game
//! backend whose commands get relayed to remote spectators, it is the
//! contract a tokio task uses to run an authoritative room to completion.

pub mod actor;
pub mod atomic_file;
pub mod fnv;
pub mod registry;
pub mod rng;
pub mod room;
pub mod timer;

pub use actor::{run_room, Outbound, RoomActorMsg, SessionTx};
pub use fnv::fnv1a;
pub use registry::{RegistrySnapshot, RoomRegistry};
pub use rng::DeterministicRng;
pub use room::{RoomCommand, RoomLogic};
pub use timer::Timer;
