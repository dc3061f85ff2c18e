//! Per-session message pump, generic over which room kind it's attached
//! to. This is the gateway's half of §4.12: frame bytes in, typed input
//! out to the room's inbox; typed events in from the room, frames out to
//! the socket. The room never touches a socket; this is the only place
//! that does.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::{BufMut, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, Mutex};

use protocol::{
    FRAME_CLIENT_INPUT, FRAME_ERROR, FRAME_EVENT, FRAME_KICK, FRAME_PING, FRAME_PONG, FRAME_STATE_FULL, Ping, Pong,
};
use sim_core::actor::{Outbound, RoomActorMsg};

/// Runs one joined session to completion: sends the initial full state,
/// then pumps inbound input frames to the room and outbound room events to
/// the socket concurrently, until either side closes. Always sends a
/// `Leave` to the room on the way out, whether the socket died or the room
/// kicked it.
///
/// Generic over the room kind's `Input`/`Event`/`FullState`/`JoinContext`
/// so combat and conquest sessions share one implementation (§4.12 "both
/// tracks are in-order per session").
pub async fn run_session<Input, Event, FullState, JoinContext>(
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    mut receiver: SplitStream<WebSocket>,
    session_id: u32,
    address: String,
    context: JoinContext,
    room_tx: mpsc::Sender<RoomActorMsg<Input, Event, FullState, JoinContext>>,
) -> &'static str
where
    Input: DeserializeOwned + Send + 'static,
    Event: Serialize + Clone + Send + 'static,
    FullState: Serialize + Clone + Send + 'static,
    JoinContext: Send + 'static,
{
    let (session_tx, mut session_rx) = mpsc::channel::<Outbound<Event>>(protocol::CHANNEL_BUFFER_SIZE);
    let (reply_tx, reply_rx) = oneshot::channel();

    let joined = room_tx
        .send(RoomActorMsg::Join { session_id, address: address.clone(), tx: session_tx, context, reply: reply_tx })
        .await;
    if joined.is_err() {
        return "room actor is no longer accepting joins";
    }

    let full_state = match reply_rx.await {
        Ok(Ok(state)) => state,
        Ok(Err(reason)) => {
            send_error_frame(&sender, &reason).await;
            return "join denied";
        }
        Err(_) => return "room actor dropped the join reply",
    };

    if !send_state_full(&sender, &full_state).await {
        let _ = room_tx.send(RoomActorMsg::Leave { session_id }).await;
        return "failed to deliver initial state";
    }

    let outbound_sender = sender.clone();
    let mut outbound_task =
        tokio::spawn(async move { pump_outbound(outbound_sender, &mut session_rx).await });

    let inbound_room_tx = room_tx.clone();
    let inbound_sender = sender.clone();
    let mut inbound_task =
        tokio::spawn(async move { pump_inbound(&mut receiver, inbound_sender, inbound_room_tx, session_id).await });

    let reason = tokio::select! {
        res = &mut outbound_task => { inbound_task.abort(); res.unwrap_or("outbound task panicked") }
        res = &mut inbound_task => { outbound_task.abort(); res.unwrap_or("inbound task panicked") }
    };

    let _ = room_tx.send(RoomActorMsg::Leave { session_id }).await;
    reason
}

async fn pump_outbound<Event>(
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    session_rx: &mut mpsc::Receiver<Outbound<Event>>,
) -> &'static str
where
    Event: Serialize,
{
    while let Some(outbound) = session_rx.recv().await {
        match outbound {
            Outbound::Event(event) => {
                if !send_tagged(&sender, FRAME_EVENT, &event).await {
                    return "failed to deliver event to client";
                }
            }
            Outbound::Kick(reason) => {
                send_tagged(&sender, FRAME_KICK, &reason).await;
                return "kicked by room";
            }
        }
    }
    "room closed the session's outbound channel"
}

async fn pump_inbound<Input, Event, FullState, JoinContext>(
    receiver: &mut SplitStream<WebSocket>,
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    room_tx: mpsc::Sender<RoomActorMsg<Input, Event, FullState, JoinContext>>,
    session_id: u32,
) -> &'static str
where
    Input: DeserializeOwned,
{
    while let Some(frame) = receiver.next().await {
        let bytes = match frame {
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(_)) => return "client closed the connection",
            Ok(_) => continue,
            Err(_) => return "connection lost",
        };
        if bytes.is_empty() {
            continue;
        }
        let (tag, payload) = (bytes[0], &bytes[1..]);
        match tag {
            FRAME_CLIENT_INPUT => match postcard::from_bytes::<Input>(payload) {
                Ok(input) => {
                    if room_tx.send(RoomActorMsg::Input { session_id, input }).await.is_err() {
                        return "room actor inbox closed";
                    }
                }
                Err(e) => {
                    tracing::debug!(error = ?e, session_id, "dropped malformed input frame");
                }
            },
            FRAME_PING => {
                if let Ok(ping) = postcard::from_bytes::<Ping>(payload) {
                    let pong = Pong { t0: ping.t0, server_ts: crate::state::now_ms() };
                    send_tagged(&sender, FRAME_PONG, &pong).await;
                }
            }
            _ => tracing::debug!(tag, session_id, "dropped frame with unknown tag"),
        }
    }
    "connection lost"
}

async fn send_state_full<FullState: Serialize>(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, state: &FullState) -> bool {
    send_tagged(sender, FRAME_STATE_FULL, state).await
}

async fn send_error_frame(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, reason: &str) {
    send_tagged(sender, FRAME_ERROR, &reason).await;
}

async fn send_tagged<T: Serialize + ?Sized>(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, tag: u8, payload: &T) -> bool {
    let encoded = match postcard::to_stdvec(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = ?e, "failed to encode outbound frame");
            return false;
        }
    };
    let mut msg = BytesMut::with_capacity(1 + encoded.len());
    msg.put_u8(tag);
    msg.put_slice(&encoded);

    let mut guard = sender.lock().await;
    guard.send(Message::Binary(msg.into())).await.is_ok()
}
