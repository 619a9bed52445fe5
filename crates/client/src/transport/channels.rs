//! Data channel wrappers
//!
//! [`PrimaryChannel`] carries the control protocol: sends are best-effort
//! and silently dropped (with a warning) while the channel is not open.
//! [`AuxChannel`] carries bulk file bytes and exposes the buffered-amount
//! back-pressure primitives the upload pipeline yields on.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, warn};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

use crate::error::Error;
use crate::Result;

/// Label of the server-opened control channel
pub const PRIMARY_LABEL: &str = "input";

/// Label of the on-demand upload channel
pub const AUX_LABEL: &str = "aux";

/// Poll interval while waiting for the aux buffer to drain
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Reliable ordered control channel, opened by the offerer
#[derive(Clone)]
pub struct PrimaryChannel {
    dc: Arc<RTCDataChannel>,
}

impl PrimaryChannel {
    pub fn new(dc: Arc<RTCDataChannel>) -> Self {
        Self { dc }
    }

    pub fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    /// Send a control line. Dropped with a warning when the channel is
    /// not open: control traffic must never fail the session.
    pub async fn send_text(&self, text: &str) {
        if !self.is_open() {
            warn!(message = %text, "dropping control message, primary channel not open");
            return;
        }
        if let Err(e) = self.dc.send_text(text.to_string()).await {
            warn!("primary channel text send failed: {e}");
        }
    }

    /// Send a binary payload with the same drop semantics.
    pub async fn send_bytes(&self, data: &Bytes) {
        if !self.is_open() {
            warn!(len = data.len(), "dropping binary payload, primary channel not open");
            return;
        }
        if let Err(e) = self.dc.send(data).await {
            warn!("primary channel binary send failed: {e}");
        }
    }
}

/// On-demand bulk channel with buffered-amount back-pressure
pub struct AuxChannel {
    dc: Arc<RTCDataChannel>,
    open_rx: watch::Receiver<bool>,
    high_water: usize,
    low_water: usize,
}

impl AuxChannel {
    /// Wrap a freshly created channel and install its state handlers.
    pub fn new(dc: Arc<RTCDataChannel>, high_water: usize, low_water: usize) -> Self {
        let (open_tx, open_rx) = watch::channel(false);
        let open_tx = Arc::new(open_tx);

        let on_open = Arc::clone(&open_tx);
        dc.on_open(Box::new(move || {
            let _ = on_open.send(true);
            Box::pin(async {})
        }));

        let on_close = Arc::clone(&open_tx);
        dc.on_close(Box::new(move || {
            debug!("aux channel closed");
            let _ = on_close.send(false);
            Box::pin(async {})
        }));

        dc.on_error(Box::new(move |e| {
            warn!("aux channel error: {e}");
            Box::pin(async {})
        }));

        Self {
            dc,
            open_rx,
            high_water,
            low_water,
        }
    }

    pub fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    /// Resolve once the channel reaches the open state.
    pub async fn wait_open(&self) -> Result<()> {
        let mut rx = self.open_rx.clone();
        // The channel may have opened before the caller got here.
        if self.is_open() {
            return Ok(());
        }
        rx.wait_for(|open| *open)
            .await
            .map_err(|_| Error::DataChannel("aux channel gone before opening".into()))?;
        Ok(())
    }

    /// Whether buffered bytes have reached the high-water mark.
    pub async fn near_threshold(&self) -> bool {
        self.dc.buffered_amount().await >= self.high_water
    }

    /// Wait until buffered bytes fall to the low-water mark or the channel
    /// leaves the open state.
    pub async fn drain(&self) {
        loop {
            if !self.is_open() {
                return;
            }
            if self.dc.buffered_amount().await <= self.low_water {
                return;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    /// Send one framed chunk. Unlike the primary channel this surfaces
    /// errors: the upload pipeline aborts the batch on a dead channel.
    pub async fn send(&self, frame: &Bytes) -> Result<()> {
        if !self.is_open() {
            return Err(Error::DataChannel("aux channel is not open".into()));
        }
        self.dc
            .send(frame)
            .await
            .map_err(|e| Error::DataChannel(format!("aux send failed: {e}")))?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Err(e) = self.dc.close().await {
            debug!("aux channel close: {e}");
        }
    }
}
