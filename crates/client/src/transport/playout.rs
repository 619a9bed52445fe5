//! Receive-side playout buffer
//!
//! Reorders RTP payloads by sequence number and holds them for a target
//! delay before release. The latency governor drives the target to zero
//! while the connection is live, trading smoothing for interactivity; the
//! cumulative delay/emitted counters feed the stats aggregator's
//! jitter-buffer latency term.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

/// One buffered media payload
#[derive(Debug, Clone)]
pub struct PlayoutFrame {
    pub sequence: u16,
    pub rtp_timestamp: u32,
    pub payload: Bytes,
    pub received_at: Instant,
}

/// Cumulative playout accounting
///
/// `emitted` and `cumulative_delay_ms` only ever grow; the stats pass
/// derives per-interval latency from their deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayoutCounters {
    /// Frames released to the surface
    pub emitted: u64,
    /// Total time released frames spent buffered, in milliseconds
    pub cumulative_delay_ms: f64,
    /// Frames dropped (late arrivals and overruns)
    pub dropped: u64,
}

/// Sequence-ordered buffer with a resettable release delay
#[derive(Debug)]
pub struct PlayoutBuffer {
    frames: BTreeMap<u64, PlayoutFrame>,
    target_delay_ms: u32,
    last_emitted: Option<u64>,
    base_sequence: Option<u16>,
    counters: PlayoutCounters,
    max_frames: usize,
}

impl PlayoutBuffer {
    pub fn new(target_delay_ms: u32) -> Self {
        Self {
            frames: BTreeMap::new(),
            target_delay_ms,
            last_emitted: None,
            base_sequence: None,
            counters: PlayoutCounters::default(),
            max_frames: 1024,
        }
    }

    /// Current release delay in milliseconds.
    pub fn target_delay_ms(&self) -> u32 {
        self.target_delay_ms
    }

    /// Set the release delay. The latency governor calls this with zero
    /// every tick while the track is live.
    pub fn set_target_delay_ms(&mut self, ms: u32) {
        self.target_delay_ms = ms;
    }

    /// Insert a frame; returns `false` when the frame was discarded as a
    /// late arrival.
    pub fn insert(&mut self, frame: PlayoutFrame) -> bool {
        let extended = self.extend_sequence(frame.sequence);
        if let Some(last) = self.last_emitted {
            if extended <= last {
                self.counters.dropped += 1;
                return false;
            }
        }
        if self.frames.len() >= self.max_frames {
            // Overrun: evict the oldest frame to keep latency bounded.
            if let Some(&oldest) = self.frames.keys().next() {
                self.frames.remove(&oldest);
                self.counters.dropped += 1;
            }
        }
        self.frames.insert(extended, frame);
        true
    }

    /// Pop the next in-order frame if it has been buffered for at least
    /// the target delay.
    pub fn pop_ready(&mut self, now: Instant) -> Option<PlayoutFrame> {
        let (&extended, head) = self.frames.iter().next()?;
        let buffered = now.saturating_duration_since(head.received_at);
        if buffered < Duration::from_millis(self.target_delay_ms as u64) {
            return None;
        }
        let frame = self.frames.remove(&extended)?;
        self.last_emitted = Some(extended);
        self.counters.emitted += 1;
        self.counters.cumulative_delay_ms += buffered.as_secs_f64() * 1_000.0;
        Some(frame)
    }

    pub fn counters(&self) -> PlayoutCounters {
        self.counters
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop buffered frames and ordering state; counters survive so stats
    /// intervals spanning a reset stay monotone.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.last_emitted = None;
        self.base_sequence = None;
    }

    // Extend the 16-bit RTP sequence into a monotone 64-bit ordering key.
    // Signed difference arithmetic keeps ordering correct across
    // wraparound.
    fn extend_sequence(&mut self, sequence: u16) -> u64 {
        let reference = match (self.last_emitted, self.base_sequence) {
            (Some(last), _) => Some((last, (last & 0xFFFF) as u16)),
            (None, Some(base)) => Some((base as u64, base)),
            (None, None) => None,
        };
        match reference {
            Some((ref_extended, ref_sequence)) => {
                let diff = sequence.wrapping_sub(ref_sequence) as i16 as i64;
                (ref_extended as i64 + diff).max(0) as u64
            }
            None => {
                self.base_sequence = Some(sequence);
                sequence as u64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_at(sequence: u16, received_at: Instant) -> PlayoutFrame {
        PlayoutFrame {
            sequence,
            rtp_timestamp: sequence as u32 * 3_000,
            payload: Bytes::from_static(b"payload"),
            received_at,
        }
    }

    fn frame(sequence: u16) -> PlayoutFrame {
        frame_at(sequence, Instant::now())
    }

    #[test]
    fn test_reorders_by_sequence() {
        let mut buffer = PlayoutBuffer::new(0);
        buffer.insert(frame(3));
        buffer.insert(frame(1));
        buffer.insert(frame(2));

        let now = Instant::now();
        assert_eq!(buffer.pop_ready(now).unwrap().sequence, 1);
        assert_eq!(buffer.pop_ready(now).unwrap().sequence, 2);
        assert_eq!(buffer.pop_ready(now).unwrap().sequence, 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_target_releases_immediately() {
        let mut buffer = PlayoutBuffer::new(0);
        let now = Instant::now();
        buffer.insert(frame_at(1, now));
        assert!(buffer.pop_ready(now).is_some());
    }

    #[test]
    fn test_target_delay_holds_frames() {
        let mut buffer = PlayoutBuffer::new(50);
        let received = Instant::now();
        buffer.insert(frame_at(1, received));

        assert!(buffer.pop_ready(received).is_none());
        assert!(buffer
            .pop_ready(received + Duration::from_millis(60))
            .is_some());
    }

    #[test]
    fn test_governor_reset_unblocks_held_frame() {
        let mut buffer = PlayoutBuffer::new(200);
        let received = Instant::now();
        buffer.insert(frame_at(1, received));
        assert!(buffer.pop_ready(received + Duration::from_millis(10)).is_none());

        buffer.set_target_delay_ms(0);
        assert!(buffer.pop_ready(received + Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_late_arrival_dropped() {
        let mut buffer = PlayoutBuffer::new(0);
        buffer.insert(frame(5));
        let now = Instant::now();
        buffer.pop_ready(now).unwrap();

        assert!(!buffer.insert(frame(3)));
        assert_eq!(buffer.counters().dropped, 1);
    }

    #[test]
    fn test_sequence_wraparound() {
        let mut buffer = PlayoutBuffer::new(0);
        for seq in [65_534u16, 65_535, 0, 1] {
            buffer.insert(frame(seq));
        }
        let now = Instant::now();
        let order: Vec<u16> = std::iter::from_fn(|| buffer.pop_ready(now).map(|f| f.sequence))
            .collect();
        assert_eq!(order, vec![65_534, 65_535, 0, 1]);
    }

    #[test]
    fn test_counters_accumulate_delay() {
        let mut buffer = PlayoutBuffer::new(0);
        let received = Instant::now();
        buffer.insert(frame_at(1, received));
        buffer.insert(frame_at(2, received));

        let later = received + Duration::from_millis(40);
        buffer.pop_ready(later).unwrap();
        buffer.pop_ready(later).unwrap();

        let counters = buffer.counters();
        assert_eq!(counters.emitted, 2);
        assert!(counters.cumulative_delay_ms >= 80.0);
    }

    #[test]
    fn test_overrun_evicts_oldest() {
        let mut buffer = PlayoutBuffer::new(0);
        buffer.max_frames = 4;
        for seq in 0..8u16 {
            buffer.insert(frame(seq));
        }
        assert_eq!(buffer.len(), 4);
        let now = Instant::now();
        assert_eq!(buffer.pop_ready(now).unwrap().sequence, 4);
        assert!(buffer.counters().dropped >= 4);
    }
}
