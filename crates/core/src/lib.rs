//! Core protocol and state model for the deskstream viewer
//!
//! This crate holds the synchronous half of the viewer core: the control
//! channel codec, the binary aux-channel framing, the settings schema with
//! its persistent preference store and reconciler, and the rendering
//! geometry math. Everything here is runtime-agnostic; the async transport,
//! signaling and session orchestration live in `deskstream-client`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  deskstream-client (async)                   │
//! │  ├─ SignalingClient / PeerTransport          │
//! │  ├─ UploadPipeline / StatsAggregator         │
//! │  └─ Session orchestrator                     │
//! │        ↓ encodes / decodes / persists via    │
//! │  deskstream-core (this crate)                │
//! │  ├─ protocol  (control ops, server events,   │
//! │  │             aux frame codec)              │
//! │  ├─ settings  (schema, store, reconciler)    │
//! │  └─ geometry  (surface style math)           │
//! └──────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod geometry;
pub mod protocol;
pub mod settings;
pub mod types;

pub use error::{Error, Result};
pub use types::{ConnectionState, Resolution, StreamMode};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
