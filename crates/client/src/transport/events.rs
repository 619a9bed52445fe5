//! Typed transport event port
//!
//! The transport owns only the sender half; the orchestrator injects it at
//! construction and consumes events from its end of the channel. This
//! replaces per-callback fields and keeps the transport free of any
//! reference back to the session.

use bytes::Bytes;
use deskstream_core::protocol::{CursorPayload, GpuStats, SystemAction, SystemStats};
use deskstream_core::settings::SettingsPayload;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::signaling::IceCandidatePayload;

/// A cursor update, in whichever encoding the server chose
#[derive(Debug, Clone, PartialEq)]
pub enum CursorFrame {
    /// JSON cursor payload from the typed envelope
    Decoded(CursorPayload),
    /// Raw binary frame from the primary channel
    Raw(Bytes),
}

/// Events emitted by the transport manager
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The primary `input` channel opened
    PrimaryChannelOpen,
    /// The primary channel closed
    PrimaryChannelClose,
    /// Peer connection state transition
    ConnectionStateChanged(RTCPeerConnectionState),
    /// A locally gathered ICE candidate ready for the signaling session
    LocalIceCandidate(IceCandidatePayload),
    /// Playback blocked pending a user gesture
    PlayStreamRequired,
    /// Complete clipboard text pushed by the server
    ClipboardContent(String),
    /// Remote cursor image/hotspot update
    CursorUpdate(CursorFrame),
    /// Out-of-band server action (reload, setting acks)
    SystemAction(SystemAction),
    /// Encoder GPU load snapshot
    GpuStats(GpuStats),
    /// Host CPU/memory snapshot
    SystemStats(SystemStats),
    /// Server clock sample to be answered with a latency report
    PingRequest { start_time: f64 },
    /// Round trip measured by the server, milliseconds
    LatencyMeasurement(f64),
    /// Broadcast settings map
    ServerSettings(SettingsPayload),
    /// Human-readable progress
    Status(String),
    /// Non-fatal transport error, string form only
    Error(String),
}
