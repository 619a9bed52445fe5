//! WebRTC transport: peer connection, data channels and playout buffers
//!
//! # Overview
//!
//! - [`PeerTransport`]: exclusive owner of the peer connection lifecycle
//! - [`PrimaryChannel`] / [`AuxChannel`]: the two data channels with
//!   their send and back-pressure semantics
//! - [`PlayoutBuffer`]: receive-side reordering with a latency-governed
//!   release delay
//! - [`TransportEvent`]: the outbound event port the orchestrator
//!   consumes

mod channels;
mod events;
mod peer;
mod playout;

pub use channels::{AuxChannel, PrimaryChannel, AUX_LABEL, PRIMARY_LABEL};
pub use events::{CursorFrame, TransportEvent};
pub use peer::PeerTransport;
pub use playout::{PlayoutBuffer, PlayoutCounters, PlayoutFrame};
