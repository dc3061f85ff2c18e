//! The generic room actor: a tokio task that owns one [`RoomLogic`] and
//! drives it from a fixed-rate tick plus an inbox of session events,
//! exactly per §5's scheduling model ("each room owns its state exclusively
//! and advances it only inside its own tick step or its own input
//! handler... no field of a room is read or written by any other room").
//!
//! This generalizes the relay server's per-room tokio tasks (there: a pair
//! of send/receive tasks shuffling bytes between one host and many
//! spectators) into a single authoritative task that *is* the game, with
//! the gateway only responsible for getting bytes in and out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::registry::RoomRegistry;
use crate::room::{RoomCommand, RoomLogic};

/// One outbound frame destined for a single session's websocket write task.
pub enum Outbound<Event> {
    Event(Event),
    Kick(String),
}

/// A session's outbound channel, registered with the room actor when it
/// joins and dropped when it leaves.
pub type SessionTx<Event> = mpsc::Sender<Outbound<Event>>;

/// Messages the gateway feeds into a running room actor.
pub enum RoomActorMsg<Input, Event, FullState, JoinContext> {
    /// A session joined. `context` is whatever the gateway resolved
    /// asynchronously before this message was sent (§5 suspension points);
    /// `reply` carries the full authoritative state to send on a
    /// successful join (§3, §6 "sent in full on join/reset"), or the deny
    /// reason on failure.
    Join {
        session_id: u32,
        address: String,
        tx: SessionTx<Event>,
        context: JoinContext,
        reply: oneshot::Sender<Result<FullState, String>>,
    },
    Input { session_id: u32, input: Input },
    Leave { session_id: u32 },
}

/// Drives `logic` to completion: alternates between its fixed tick and
/// draining `inbox`, dispatching every command `logic` queues to the
/// sessions currently registered. Returns the final `logic` once
/// `logic.is_disposed()`, so the caller can run any async finalization
/// (replay finalize, settlement) that must happen after the last tick.
pub async fn run_room<L>(
    room_id: String,
    mut logic: L,
    mut inbox: mpsc::Receiver<RoomActorMsg<L::Input, L::Event, L::FullState, L::JoinContext>>,
    registry: Arc<RoomRegistry>,
) -> L
where
    L: RoomLogic,
    L::Event: Clone,
{
    let mut sessions: HashMap<u32, SessionTx<L::Event>> = HashMap::new();
    let mut ticker = tokio::time::interval(logic.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                logic.tick();
                dispatch(&mut logic, &mut sessions).await;
            }
            msg = inbox.recv() => {
                let Some(msg) = msg else {
                    tracing::info!(room_id, "inbox closed, disposing room");
                    break;
                };
                match msg {
                    RoomActorMsg::Join { session_id, address, tx, context, reply } => {
                        let result = logic.session_joined(session_id, &address, context);
                        match result {
                            Ok(()) => {
                                sessions.insert(session_id, tx);
                                registry.on_join(&room_id);
                                let _ = reply.send(Ok(logic.full_state()));
                            }
                            Err(reason) => {
                                let _ = reply.send(Err(reason));
                            }
                        }
                    }
                    RoomActorMsg::Input { session_id, input } => {
                        logic.apply_input(session_id, input);
                    }
                    RoomActorMsg::Leave { session_id } => {
                        logic.session_left(session_id);
                        if sessions.remove(&session_id).is_some() {
                            registry.on_leave(&room_id);
                        }
                    }
                }
                dispatch(&mut logic, &mut sessions).await;
            }
        }

        if logic.is_disposed() {
            tracing::info!(room_id, "room disposed");
            break;
        }
    }

    registry.unregister(&room_id);
    logic
}

async fn dispatch<L>(logic: &mut L, sessions: &mut HashMap<u32, SessionTx<L::Event>>)
where
    L: RoomLogic,
    L::Event: Clone,
{
    for command in logic.drain_commands() {
        match command {
            RoomCommand::Broadcast(event) => {
                for tx in sessions.values() {
                    let _ = tx.send(Outbound::Event(event.clone())).await;
                }
            }
            RoomCommand::Unicast { session_id, event } => {
                if let Some(tx) = sessions.get(&session_id) {
                    let _ = tx.send(Outbound::Event(event)).await;
                }
            }
            RoomCommand::Kick { session_id, reason } => {
                if let Some(tx) = sessions.remove(&session_id) {
                    let _ = tx.send(Outbound::Kick(reason)).await;
                }
            }
            RoomCommand::Dispose => {
                sessions.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RoomRegistry;
    use protocol::RoomKind;
    use std::time::Duration;

    #[derive(Clone)]
    struct EchoEvent(u32);

    struct EchoLogic {
        disposed: bool,
        pending: Vec<RoomCommand<EchoEvent>>,
    }

    impl RoomLogic for EchoLogic {
        type Input = u32;
        type Event = EchoEvent;
        type FullState = ();
        type JoinContext = ();

        fn tick_interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn session_joined(&mut self, _session_id: u32, _address: &str, _context: ()) -> Result<(), String> {
            Ok(())
        }

        fn session_left(&mut self, _session_id: u32) {}

        fn apply_input(&mut self, session_id: u32, input: u32) {
            self.pending.push(RoomCommand::Unicast { session_id, event: EchoEvent(input) });
            self.disposed = true;
        }

        fn tick(&mut self) {}

        fn full_state(&self) {}

        fn drain_commands(&mut self) -> Vec<RoomCommand<EchoEvent>> {
            std::mem::take(&mut self.pending)
        }

        fn is_disposed(&self) -> bool {
            self.disposed
        }
    }

    #[tokio::test]
    async fn join_then_input_is_echoed_back_to_sender() {
        let registry = Arc::new(RoomRegistry::new());
        registry.register("room-1", RoomKind::Combat);
        let (inbox_tx, inbox_rx) = mpsc::channel(8);

        let logic = EchoLogic { disposed: false, pending: Vec::new() };
        let handle = tokio::spawn(run_room("room-1".to_string(), logic, inbox_rx, registry.clone()));

        let (session_tx, mut session_rx) = mpsc::channel(8);
        let (reply_tx, reply_rx) = oneshot::channel();
        inbox_tx
            .send(RoomActorMsg::Join { session_id: 1, address: "0xAA".into(), tx: session_tx, context: (), reply: reply_tx })
            .await
            .unwrap();
        assert!(reply_rx.await.unwrap().is_ok());

        inbox_tx.send(RoomActorMsg::Input { session_id: 1, input: 42 }).await.unwrap();

        let outbound = session_rx.recv().await.unwrap();
        match outbound {
            Outbound::Event(EchoEvent(v)) => assert_eq!(v, 42),
            _ => panic!("expected an event"),
        }

        drop(inbox_tx);
        handle.await.unwrap();
    }
}
