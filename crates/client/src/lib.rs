//! Viewer-side streaming core for deskstream
//!
//! Owns the peer connection, the two media receivers, the bidirectional
//! signaling session, the control/aux data channels with their
//! back-pressured byte protocol, the adaptive rendering loop and the
//! settings reconciliation pass. The UI shell talks to this crate through
//! the typed dashboard ports; the server side is an opaque peer.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Session (orchestrator)                                   │
//! │  ├─ SignalingClient   ws JSON: offer/answer + ICE         │
//! │  ├─ PeerTransport     RTCPeerConnection, input/aux        │
//! │  │   └─ PlayoutBuffer per receiver (latency-governed)     │
//! │  ├─ GeometryController  DPR × viewport × manual override  │
//! │  ├─ UploadPipeline    chunked, back-pressured aux bytes   │
//! │  ├─ StatsAggregator   1 s sampling, watch observable      │
//! │  └─ dashboard ports   typed command/update channels       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deskstream_client::{
//!     ClientConfig, DashboardCommand, Session, SessionOptions,
//!     platform::{NullClipboard, NullSurface},
//! };
//! use deskstream_core::settings::PreferenceStore;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> deskstream_client::Result<()> {
//! let config = ClientConfig::new("https://desktop.example/webrtc".parse().unwrap());
//! let (update_tx, _update_rx) = mpsc::unbounded_channel();
//! let (command_tx, command_rx) = mpsc::unbounded_channel();
//!
//! let session = Session::new(SessionOptions {
//!     config,
//!     store: PreferenceStore::in_memory("example"),
//!     clipboard: Arc::new(NullClipboard),
//!     surface: Arc::new(NullSurface::default()),
//!     update_tx,
//! });
//! session.initialize(command_rx).await?;
//!
//! command_tx
//!     .send(DashboardCommand::SetManualResolution { width: 1920, height: 1080 })
//!     .ok();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dashboard;
pub mod display;
pub mod error;
pub mod platform;
pub mod session;
pub mod signaling;
pub mod stats;
pub mod transport;
pub mod upload;

pub use config::{ClientConfig, IceServerConfig, IceSettings};
pub use dashboard::{DashboardCommand, DashboardUpdate, FileUploadUpdate, UploadStatus};
pub use error::{Error, Result};
pub use session::{Session, SessionOptions};
pub use stats::StreamStats;
pub use transport::{PeerTransport, TransportEvent};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
