//! Signaling session: registration, SDP exchange and ICE relay
//!
//! JSON frames over a websocket. The viewer registers with a `HELLO` line
//! carrying its id and current-resolution metadata, then acts as the
//! answerer: the server's offer arrives as a `{"sdp": …}` frame, the
//! answer and both sides' ICE candidates flow back the same way.

mod client;
mod protocol;

pub use client::{SignalingClient, SignalingEvent};
pub use protocol::{HelloMeta, IceCandidatePayload, IncomingFrame, SignalFrame};
