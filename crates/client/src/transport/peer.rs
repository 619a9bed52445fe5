//! Peer connection lifecycle and channel ownership
//!
//! One [`PeerTransport`] owns the peer connection, both media receivers
//! and the two data channels; nothing else mutates them. The server is
//! the offerer and opens the primary `input` channel; the viewer answers
//! and creates the `aux` channel on demand for uploads.
//!
//! While the connection is live a governor task drives both playout
//! buffer delay targets to zero on a short interval, keeping the receive
//! path at minimum latency even when loss briefly inflates buffering.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

use deskstream_core::protocol::{ClipboardAssembler, ServerEvent};

use super::channels::{AuxChannel, PrimaryChannel, AUX_LABEL, PRIMARY_LABEL};
use super::events::{CursorFrame, TransportEvent};
use super::playout::{PlayoutBuffer, PlayoutFrame};
use crate::config::{IceSettings, AUX_HIGH_WATER, AUX_LOW_WATER};
use crate::error::Error;
use crate::platform::{MediaKind, MediaSurface};
use crate::signaling::IceCandidatePayload;
use crate::stats::{ReceiverStats, TransportSnapshot};
use crate::Result;

/// Per-receiver shared state: the playout buffer the track task fills and
/// the governor drains, plus the codec label for stats.
pub(crate) struct ReceiverState {
    kind: MediaKind,
    playout: StdMutex<PlayoutBuffer>,
    codec: StdMutex<String>,
    live: AtomicBool,
}

impl ReceiverState {
    fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            playout: StdMutex::new(PlayoutBuffer::new(0)),
            codec: StdMutex::new(String::new()),
            live: AtomicBool::new(false),
        }
    }

    fn reset(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.playout.lock().expect("playout lock").clear();
    }
}

struct PeerInner {
    events: mpsc::UnboundedSender<TransportEvent>,
    surface: Arc<dyn MediaSurface>,
    governor_interval: Duration,
    ice: StdMutex<IceSettings>,
    pc: Mutex<Option<Arc<RTCPeerConnection>>>,
    primary: StdMutex<Option<PrimaryChannel>>,
    aux: Mutex<Option<Arc<AuxChannel>>>,
    video: Arc<ReceiverState>,
    audio: Arc<ReceiverState>,
    clipboard: StdMutex<ClipboardAssembler>,
    connected: AtomicBool,
    autoplay_checked: AtomicBool,
    primary_open_tx: watch::Sender<bool>,
    primary_open_rx: watch::Receiver<bool>,
    // Incremented on reset; running background loops exit when it moves.
    generation: AtomicU64,
}

/// Transport manager: exclusive owner of the peer connection
#[derive(Clone)]
pub struct PeerTransport {
    inner: Arc<PeerInner>,
}

impl PeerTransport {
    /// Create a transport with its outbound event port and surface seam.
    pub fn new(
        events: mpsc::UnboundedSender<TransportEvent>,
        surface: Arc<dyn MediaSurface>,
        governor_interval: Duration,
    ) -> Self {
        let (primary_open_tx, primary_open_rx) = watch::channel(false);
        Self {
            inner: Arc::new(PeerInner {
                events,
                surface,
                governor_interval,
                ice: StdMutex::new(IceSettings::default()),
                pc: Mutex::new(None),
                primary: StdMutex::new(None),
                aux: Mutex::new(None),
                video: Arc::new(ReceiverState::new(MediaKind::Video)),
                audio: Arc::new(ReceiverState::new(MediaKind::Audio)),
                clipboard: StdMutex::new(ClipboardAssembler::new()),
                connected: AtomicBool::new(false),
                autoplay_checked: AtomicBool::new(false),
                primary_open_tx,
                primary_open_rx,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Begin the connection from the viewer side: makes sure the peer
    /// connection exists and resolves once the offerer's primary channel
    /// is open. Negotiation itself is driven by the incoming offer.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_peer_connection().await?;
        let mut open = self.inner.primary_open_rx.clone();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| Error::PeerConnection("transport gone while connecting".into()))?;
        Ok(())
    }

    /// Install ICE servers and relay policy; call before negotiation.
    pub fn configure(&self, ice: IceSettings) {
        *self.inner.ice.lock().expect("ice lock") = ice;
    }

    /// Handle the server's offer: build the peer connection if needed,
    /// apply the remote description and return the local answer SDP.
    pub async fn handle_offer(&self, sdp: String) -> Result<String> {
        let pc = self.ensure_peer_connection().await?;
        pc.set_remote_description(RTCSessionDescription::offer(sdp)?)
            .await?;
        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer).await?;
        let local = pc
            .local_description()
            .await
            .ok_or_else(|| Error::PeerConnection("no local description after answer".into()))?;
        info!("negotiation answered");
        Ok(local.sdp)
    }

    /// Apply a remote ICE candidate from signaling.
    pub async fn add_remote_candidate(&self, candidate: IceCandidatePayload) -> Result<()> {
        if candidate.candidate.is_empty() {
            debug!("end-of-candidates marker received");
            return Ok(());
        }
        let pc = self
            .current_peer_connection()
            .await
            .ok_or_else(|| Error::PeerConnection("candidate before negotiation".into()))?;
        pc.add_ice_candidate(RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        })
        .await?;
        Ok(())
    }

    /// Tear everything down. Media receivers detach, channels close, the
    /// next offer builds a fresh peer connection.
    pub async fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.autoplay_checked.store(false, Ordering::SeqCst);

        if let Some(aux) = self.inner.aux.lock().await.take() {
            aux.close().await;
        }
        self.inner.primary.lock().expect("primary lock").take();
        let _ = self.inner.primary_open_tx.send(false);
        if let Some(pc) = self.inner.pc.lock().await.take() {
            if let Err(e) = pc.close().await {
                debug!("peer connection close: {e}");
            }
        }
        self.inner.video.reset();
        self.inner.audio.reset();
        *self.inner.clipboard.lock().expect("clipboard lock") = ClipboardAssembler::new();
        info!("transport reset");
    }

    /// Send a control op on the primary channel; dropped with a warning
    /// when the channel is not open.
    pub async fn send_control(&self, message: &deskstream_core::protocol::ControlMessage) {
        self.send_primary_text(&message.encode()).await;
    }

    pub async fn send_primary_text(&self, text: &str) {
        let channel = self.inner.primary.lock().expect("primary lock").clone();
        match channel {
            Some(channel) => channel.send_text(text).await,
            None => warn!(message = %text, "dropping control message, no primary channel"),
        }
    }

    pub async fn send_primary_bytes(&self, data: Bytes) {
        let channel = self.inner.primary.lock().expect("primary lock").clone();
        match channel {
            Some(channel) => channel.send_bytes(&data).await,
            None => warn!(len = data.len(), "dropping binary payload, no primary channel"),
        }
    }

    /// Allocate the aux channel. Returns `Ok(false)` while one is already
    /// open, leaving the existing channel untouched.
    pub async fn create_aux_channel(&self) -> Result<bool> {
        let mut guard = self.inner.aux.lock().await;
        if guard.is_some() {
            return Ok(false);
        }
        let pc = self
            .current_peer_connection()
            .await
            .ok_or_else(|| Error::PeerConnection("no peer connection for aux channel".into()))?;
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = pc.create_data_channel(AUX_LABEL, Some(init)).await?;
        *guard = Some(Arc::new(AuxChannel::new(dc, AUX_HIGH_WATER, AUX_LOW_WATER)));
        debug!("aux channel created");
        Ok(true)
    }

    /// Resolve when the aux channel reaches the open state.
    pub async fn wait_aux_open(&self) -> Result<()> {
        let aux = self.aux_handle().await?;
        aux.wait_open().await
    }

    /// Whether aux buffered bytes are at or above the high-water mark.
    pub async fn aux_near_threshold(&self) -> bool {
        match self.aux_handle().await {
            Ok(aux) => aux.near_threshold().await,
            Err(_) => false,
        }
    }

    /// Wait for aux buffered bytes to fall to the low-water mark.
    pub async fn drain_aux(&self) {
        if let Ok(aux) = self.aux_handle().await {
            aux.drain().await;
        }
    }

    /// Send one framed chunk on the aux channel.
    pub async fn send_aux(&self, frame: Bytes) -> Result<()> {
        let aux = self.aux_handle().await?;
        aux.send(&frame).await
    }

    /// Close and release the aux channel, ending the upload batch's
    /// exclusive hold.
    pub async fn close_aux(&self) {
        if let Some(aux) = self.inner.aux.lock().await.take() {
            aux.close().await;
        }
    }

    /// Assemble a stats snapshot from the peer connection report and the
    /// playout counters. `None` before negotiation.
    pub async fn stats_snapshot(&self) -> Option<TransportSnapshot> {
        let pc = self.current_peer_connection().await?;
        let report = pc.get_stats().await;

        let mut video = self.receiver_stats(&self.inner.video);
        let mut audio = self.receiver_stats(&self.inner.audio);
        let mut rtt_ms = 0.0_f64;
        let mut available_incoming_mbps = None;

        for stats in report.reports.values() {
            match stats {
                StatsReportType::InboundRTP(inbound) => {
                    let target = if inbound.kind == "video" {
                        &mut video
                    } else {
                        &mut audio
                    };
                    target.bytes_received = inbound.bytes_received;
                    target.packets_received = inbound.packets_received;
                }
                StatsReportType::CandidatePair(pair) => {
                    if pair.nominated {
                        rtt_ms = pair.current_round_trip_time * 1_000.0;
                        if pair.available_incoming_bitrate > 0.0 {
                            available_incoming_mbps =
                                Some(pair.available_incoming_bitrate / 1_000_000.0);
                        }
                    }
                }
                _ => {}
            }
        }

        Some(TransportSnapshot {
            video,
            audio,
            rtt_ms,
            available_incoming_mbps,
            taken_at: Instant::now(),
        })
    }

    fn receiver_stats(&self, receiver: &ReceiverState) -> ReceiverStats {
        ReceiverStats {
            bytes_received: 0,
            packets_received: 0,
            playout: receiver.playout.lock().expect("playout lock").counters(),
            codec: receiver.codec.lock().expect("codec lock").clone(),
        }
    }

    async fn aux_handle(&self) -> Result<Arc<AuxChannel>> {
        self.inner
            .aux
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::DataChannel("no aux channel".into()))
    }

    async fn current_peer_connection(&self) -> Option<Arc<RTCPeerConnection>> {
        self.inner.pc.lock().await.clone()
    }

    async fn ensure_peer_connection(&self) -> Result<Arc<RTCPeerConnection>> {
        let mut guard = self.inner.pc.lock().await;
        if let Some(pc) = guard.as_ref() {
            return Ok(Arc::clone(pc));
        }

        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice = self.inner.ice.lock().expect("ice lock").clone();
        let config = RTCConfiguration {
            ice_servers: ice
                .servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ice_transport_policy: if ice.force_relay {
                RTCIceTransportPolicy::Relay
            } else {
                RTCIceTransportPolicy::All
            },
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);
        self.install_handlers(&pc);
        *guard = Some(Arc::clone(&pc));
        info!(force_relay = ice.force_relay, "peer connection created");
        Ok(pc)
    }

    fn install_handlers(&self, pc: &Arc<RTCPeerConnection>) {
        let inner = Arc::clone(&self.inner);
        pc.on_ice_candidate(Box::new(move |candidate| {
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = inner.events.send(TransportEvent::LocalIceCandidate(
                            IceCandidatePayload {
                                candidate: init.candidate,
                                sdp_mline_index: init.sdp_mline_index,
                                sdp_mid: init.sdp_mid,
                            },
                        ));
                    }
                    Err(e) => warn!("local candidate serialization failed: {e}"),
                }
            })
        }));

        let inner = Arc::clone(&self.inner);
        let transport = self.clone();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let inner = Arc::clone(&inner);
            let transport = transport.clone();
            Box::pin(async move {
                info!(?state, "peer connection state changed");
                let _ = inner
                    .events
                    .send(TransportEvent::ConnectionStateChanged(state));
                match state {
                    RTCPeerConnectionState::Connected => {
                        inner.connected.store(true, Ordering::SeqCst);
                        transport.spawn_latency_governor();
                    }
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => {
                        inner.connected.store(false, Ordering::SeqCst);
                    }
                    _ => {}
                }
            })
        }));

        let inner = Arc::clone(&self.inner);
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                if dc.label() == PRIMARY_LABEL {
                    install_primary(inner, dc);
                } else {
                    warn!(label = dc.label(), "ignoring unexpected data channel");
                }
            })
        }));

        let inner = Arc::clone(&self.inner);
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                install_track(inner, track).await;
            })
        }));
    }

    // Governor: while this connection generation is live, pin both playout
    // targets to zero on a short interval. Exits when the connection drops
    // or a reset bumps the generation.
    fn spawn_latency_governor(&self) {
        let inner = Arc::clone(&self.inner);
        let generation = inner.generation.load(Ordering::SeqCst);
        let interval = inner.governor_interval;
        tokio::spawn(async move {
            debug!("latency governor started");
            loop {
                tokio::time::sleep(interval).await;
                if inner.generation.load(Ordering::SeqCst) != generation
                    || !inner.connected.load(Ordering::SeqCst)
                {
                    break;
                }
                let live = inner.video.live.load(Ordering::SeqCst)
                    || inner.audio.live.load(Ordering::SeqCst);
                if !live {
                    continue;
                }
                for receiver in [&inner.video, &inner.audio] {
                    let mut playout = receiver.playout.lock().expect("playout lock");
                    if playout.target_delay_ms() != 0 {
                        playout.set_target_delay_ms(0);
                    }
                }
            }
            debug!("latency governor stopped");
        });
    }
}

fn install_primary(inner: Arc<PeerInner>, dc: Arc<RTCDataChannel>) {
    debug!("primary channel announced by offerer");

    let on_open_inner = Arc::clone(&inner);
    dc.on_open(Box::new(move || {
        let inner = Arc::clone(&on_open_inner);
        Box::pin(async move {
            let _ = inner.primary_open_tx.send(true);
            let _ = inner.events.send(TransportEvent::PrimaryChannelOpen);
            // First playback attempt happens when the channel comes up; a
            // shell that blocks autoplay gets exactly one gesture request
            // per connection.
            if !inner.autoplay_checked.swap(true, Ordering::SeqCst)
                && !inner.surface.try_autoplay()
            {
                let _ = inner.events.send(TransportEvent::PlayStreamRequired);
            }
        })
    }));

    let on_close_inner = Arc::clone(&inner);
    dc.on_close(Box::new(move || {
        let inner = Arc::clone(&on_close_inner);
        Box::pin(async move {
            let _ = inner.primary_open_tx.send(false);
            let _ = inner.events.send(TransportEvent::PrimaryChannelClose);
        })
    }));

    let on_message_inner = Arc::clone(&inner);
    dc.on_message(Box::new(move |message: DataChannelMessage| {
        let inner = Arc::clone(&on_message_inner);
        Box::pin(async move {
            route_primary_message(&inner, message);
        })
    }));

    *inner.primary.lock().expect("primary lock") = Some(PrimaryChannel::new(dc));
}

/// Decode a primary-channel message and fan it out as transport events.
/// Protocol violations are logged and dropped; the channel stays up.
fn route_primary_message(inner: &PeerInner, message: DataChannelMessage) {
    if !message.is_string {
        let _ = inner.events.send(TransportEvent::CursorUpdate(CursorFrame::Raw(
            message.data,
        )));
        return;
    }
    let text = match std::str::from_utf8(&message.data) {
        Ok(text) => text,
        Err(_) => {
            warn!("dropping non-UTF-8 text frame");
            return;
        }
    };
    let event = match ServerEvent::decode(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("dropping malformed server event: {e}");
            return;
        }
    };
    let out = match event {
        ServerEvent::System(action) => Some(TransportEvent::SystemAction(action)),
        ServerEvent::ServerSettings(payload) => Some(TransportEvent::ServerSettings(payload)),
        ServerEvent::Cursor(payload) => {
            Some(TransportEvent::CursorUpdate(CursorFrame::Decoded(payload)))
        }
        ServerEvent::Ping { start_time } => Some(TransportEvent::PingRequest { start_time }),
        ServerEvent::LatencyMeasurement { latency_ms } => {
            Some(TransportEvent::LatencyMeasurement(latency_ms))
        }
        ServerEvent::GpuStats(stats) => Some(TransportEvent::GpuStats(stats)),
        ServerEvent::SystemStats(stats) => Some(TransportEvent::SystemStats(stats)),
        ServerEvent::ClipboardChunk { content, last } => {
            let mut assembler = inner.clipboard.lock().expect("clipboard lock");
            match assembler.push(&content, last) {
                Some(Ok(text)) => Some(TransportEvent::ClipboardContent(text)),
                Some(Err(e)) => {
                    warn!("dropping undecodable clipboard payload: {e}");
                    None
                }
                None => None,
            }
        }
    };
    if let Some(event) = out {
        let _ = inner.events.send(event);
    }
}

async fn install_track(inner: Arc<PeerInner>, track: Arc<TrackRemote>) {
    let receiver = match track.kind() {
        RTPCodecType::Video => Arc::clone(&inner.video),
        RTPCodecType::Audio => Arc::clone(&inner.audio),
        _ => {
            warn!("ignoring track of unknown kind");
            return;
        }
    };
    let mime = track.codec().capability.mime_type.clone();
    *receiver.codec.lock().expect("codec lock") = mime.clone();
    receiver.live.store(true, Ordering::SeqCst);
    info!(kind = receiver.kind.label(), codec = %mime, "media receiver attached");

    let surface = Arc::clone(&inner.surface);
    tokio::spawn(async move {
        loop {
            match track.read_rtp().await {
                Ok((packet, _attributes)) => {
                    let now = Instant::now();
                    let mut playout = receiver.playout.lock().expect("playout lock");
                    playout.insert(PlayoutFrame {
                        sequence: packet.header.sequence_number,
                        rtp_timestamp: packet.header.timestamp,
                        payload: packet.payload,
                        received_at: now,
                    });
                    let mut ready = Vec::new();
                    while let Some(frame) = playout.pop_ready(now) {
                        ready.push(frame);
                    }
                    drop(playout);
                    for frame in ready {
                        surface.deliver(receiver.kind, frame.payload);
                    }
                }
                Err(e) => {
                    debug!(kind = receiver.kind.label(), "track reader finished: {e}");
                    receiver.live.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    });
}
