//! Transport statistics sampling and derivation
//!
//! Every second the aggregator takes a [`TransportSnapshot`] from the
//! transport, derives interval metrics from the previous one and
//! publishes the result three ways: on a watch observable for in-process
//! subscribers, to the dashboard port, and to the server as a
//! `_stats_video` op. Viewer FPS and latency also go out as `_f`/`_l`
//! every fifth tick.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use deskstream_core::protocol::ControlMessage;

use crate::dashboard::DashboardUpdate;
use crate::transport::{PeerTransport, PlayoutCounters};

/// Per-receiver half of a snapshot
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    pub bytes_received: u64,
    pub packets_received: u64,
    pub playout: PlayoutCounters,
    pub codec: String,
}

/// One sample of the transport, taken per tick
#[derive(Debug, Clone)]
pub struct TransportSnapshot {
    pub video: ReceiverStats,
    pub audio: ReceiverStats,
    /// Current round trip over the selected candidate pair, milliseconds
    pub rtt_ms: f64,
    /// Receive-side bandwidth estimate, when the pair reports one
    pub available_incoming_mbps: Option<f64>,
    pub taken_at: Instant,
}

/// Derived metrics for one interval
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub video_bitrate_mbps: f64,
    pub audio_bitrate_kbps: f64,
    pub video_latency_ms: f64,
    pub audio_latency_ms: f64,
    pub connection_latency_ms: f64,
    pub client_fps: f64,
    pub rtt_ms: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub bytes_received_video: u64,
    pub bytes_received_audio: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_incoming_mbps: Option<f64>,
}

/// Derive interval metrics from two consecutive snapshots.
///
/// Latency per receiver is the transport round trip plus the
/// jitter-buffer-induced term `1000 × Δdelay / Δemitted`, zero when no
/// frame was emitted in the interval.
pub fn derive_interval(previous: &TransportSnapshot, current: &TransportSnapshot) -> StreamStats {
    let elapsed = current
        .taken_at
        .saturating_duration_since(previous.taken_at)
        .as_secs_f64()
        .max(1e-3);

    let video_delta_bytes = current
        .video
        .bytes_received
        .saturating_sub(previous.video.bytes_received);
    let audio_delta_bytes = current
        .audio
        .bytes_received
        .saturating_sub(previous.audio.bytes_received);

    let video_latency_ms = current.rtt_ms + playout_latency_ms(&previous.video, &current.video);
    let audio_latency_ms = current.rtt_ms + playout_latency_ms(&previous.audio, &current.audio);

    let video_frames = current
        .video
        .playout
        .emitted
        .saturating_sub(previous.video.playout.emitted);

    StreamStats {
        video_bitrate_mbps: (video_delta_bytes as f64 * 8.0) / (elapsed * 1e6),
        audio_bitrate_kbps: (audio_delta_bytes as f64 * 8.0) / (elapsed * 1e3),
        video_latency_ms,
        audio_latency_ms,
        connection_latency_ms: video_latency_ms.max(audio_latency_ms),
        client_fps: video_frames as f64 / elapsed,
        rtt_ms: current.rtt_ms,
        video_codec: current.video.codec.clone(),
        audio_codec: current.audio.codec.clone(),
        bytes_received_video: current.video.bytes_received,
        bytes_received_audio: current.audio.bytes_received,
        available_incoming_mbps: current.available_incoming_mbps,
    }
}

fn playout_latency_ms(previous: &ReceiverStats, current: &ReceiverStats) -> f64 {
    let emitted = current.playout.emitted.saturating_sub(previous.playout.emitted);
    if emitted == 0 {
        return 0.0;
    }
    let delay = current.playout.cumulative_delay_ms - previous.playout.cumulative_delay_ms;
    delay.max(0.0) / emitted as f64
}

/// Background sampler publishing to the observable, the dashboard and the
/// server
pub struct StatsAggregator {
    latest: watch::Receiver<StreamStats>,
    latency_ms: Arc<AtomicU32>,
    task: tokio::task::JoinHandle<()>,
}

impl StatsAggregator {
    /// Spawn the sampling loop.
    pub fn spawn(
        transport: PeerTransport,
        updates: mpsc::UnboundedSender<DashboardUpdate>,
        interval: Duration,
        report_every_ticks: u32,
    ) -> Self {
        let (latest_tx, latest) = watch::channel(StreamStats::default());
        let latency_ms = Arc::new(AtomicU32::new(0));
        let shared_latency = Arc::clone(&latency_ms);

        let task = tokio::spawn(async move {
            let mut previous: Option<TransportSnapshot> = None;
            let mut tick: u32 = 0;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(snapshot) = transport.stats_snapshot().await else {
                    previous = None;
                    continue;
                };
                if let Some(prev) = previous.as_ref() {
                    let stats = derive_interval(prev, &snapshot);
                    let _ = latest_tx.send(stats.clone());
                    let _ = updates.send(DashboardUpdate::Stats(stats.clone()));
                    if let Ok(json) = serde_json::to_value(&stats) {
                        transport.send_control(&ControlMessage::VideoStats(json)).await;
                    }

                    tick += 1;
                    if report_every_ticks > 0 && tick % report_every_ticks == 0 {
                        let fps = stats.client_fps.round().max(0.0) as u32;
                        let latency = shared_latency.load(Ordering::Relaxed);
                        debug!(fps, latency, "client report");
                        transport.send_control(&ControlMessage::ClientFps(fps)).await;
                        transport
                            .send_control(&ControlMessage::ClientLatency(latency))
                            .await;
                    }
                }
                previous = Some(snapshot);
            }
        });

        Self {
            latest,
            latency_ms,
            task,
        }
    }

    /// Observable of the most recent derived stats.
    pub fn subscribe(&self) -> watch::Receiver<StreamStats> {
        self.latest.clone()
    }

    /// Record the most recent latency measurement for the `_l` report.
    pub fn record_latency_ms(&self, latency_ms: f64) {
        self.latency_ms
            .store(latency_ms.max(0.0).round() as u32, Ordering::Relaxed);
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(at: Instant) -> TransportSnapshot {
        TransportSnapshot {
            video: ReceiverStats {
                codec: "video/H264".into(),
                ..Default::default()
            },
            audio: ReceiverStats {
                codec: "audio/opus".into(),
                ..Default::default()
            },
            rtt_ms: 0.0,
            available_incoming_mbps: None,
            taken_at: at,
        }
    }

    #[test]
    fn test_bitrates_from_byte_deltas() {
        let start = Instant::now();
        let mut prev = snapshot(start);
        prev.video.bytes_received = 1_000_000;
        prev.audio.bytes_received = 50_000;

        let mut cur = snapshot(start + Duration::from_secs(1));
        cur.video.bytes_received = 2_000_000; // +1 MB over 1 s
        cur.audio.bytes_received = 66_000; // +16 kB over 1 s

        let stats = derive_interval(&prev, &cur);
        assert!((stats.video_bitrate_mbps - 8.0).abs() < 0.1);
        assert!((stats.audio_bitrate_kbps - 128.0).abs() < 1.0);
    }

    #[test]
    fn test_latency_combines_rtt_and_playout() {
        let start = Instant::now();
        let mut prev = snapshot(start);
        prev.video.playout = PlayoutCounters {
            emitted: 100,
            cumulative_delay_ms: 500.0,
            dropped: 0,
        };

        let mut cur = snapshot(start + Duration::from_secs(1));
        cur.rtt_ms = 20.0;
        cur.video.playout = PlayoutCounters {
            emitted: 160, // 60 frames this interval
            cumulative_delay_ms: 800.0, // +300 ms buffered over 60 frames
            dropped: 0,
        };

        let stats = derive_interval(&prev, &cur);
        assert!((stats.video_latency_ms - 25.0).abs() < 1e-6);
        // Audio emitted nothing: rtt only
        assert!((stats.audio_latency_ms - 20.0).abs() < 1e-6);
        assert_eq!(stats.connection_latency_ms, stats.video_latency_ms);
        assert!((stats.client_fps - 60.0).abs() < 0.5);
    }

    #[test]
    fn test_zero_emitted_denominator_is_zero_latency() {
        let start = Instant::now();
        let prev = snapshot(start);
        let mut cur = snapshot(start + Duration::from_secs(1));
        cur.video.playout.cumulative_delay_ms = 100.0; // delay moved, nothing emitted

        let stats = derive_interval(&prev, &cur);
        assert_eq!(stats.video_latency_ms, 0.0);
    }

    #[test]
    fn test_counter_regression_clamps_to_zero() {
        let start = Instant::now();
        let mut prev = snapshot(start);
        prev.video.bytes_received = 5_000;
        let cur = snapshot(start + Duration::from_secs(1)); // counters reset to 0

        let stats = derive_interval(&prev, &cur);
        assert_eq!(stats.video_bitrate_mbps, 0.0);
    }
}
