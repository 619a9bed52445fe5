//! Session orchestrator
//!
//! Wires the signaling client, the peer transport, the geometry
//! controller, the upload pipeline and the stats aggregator together and
//! runs the single event loop that owns all mutable session state. The
//! public surface is [`Session::initialize`] and [`Session::cleanup`];
//! everything else flows through the dashboard ports.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use deskstream_core::geometry::Viewport;
use deskstream_core::protocol::{ControlMessage, SystemAction};
use deskstream_core::settings::{reconcile, PreferenceStore, ResolutionDirective, SettingsPayload};
use deskstream_core::types::{ConnectionState, StreamMode};

use crate::config::{fetch_turn_config, ClientConfig, IceSettings};
use crate::dashboard::{DashboardCommand, DashboardUpdate};
use crate::display::GeometryController;
use crate::error::Error;
use crate::platform::{ClipboardPort, MediaSurface};
use crate::signaling::{HelloMeta, SignalingClient, SignalingEvent};
use crate::stats::StatsAggregator;
use crate::transport::{PeerTransport, TransportEvent};
use crate::upload::UploadPipeline;
use crate::Result;

/// Everything a session needs injected at construction
pub struct SessionOptions {
    pub config: ClientConfig,
    pub store: PreferenceStore,
    pub clipboard: Arc<dyn ClipboardPort>,
    pub surface: Arc<dyn MediaSurface>,
    /// Outbound dashboard port
    pub update_tx: mpsc::UnboundedSender<DashboardUpdate>,
}

/// The singleton viewer session
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: ClientConfig,
    clipboard: Arc<dyn ClipboardPort>,
    surface: Arc<dyn MediaSurface>,
    update_tx: mpsc::UnboundedSender<DashboardUpdate>,
    store: Arc<Mutex<PreferenceStore>>,
    state: StdMutex<ConnectionState>,
    runtime: Mutex<Option<Runtime>>,
}

/// Live half of the session, built by `initialize`, torn down by
/// `cleanup`
struct Runtime {
    signaling: Arc<SignalingClient>,
    transport: PeerTransport,
    stats: Arc<StatsAggregator>,
    event_task: JoinHandle<()>,
    control_task: JoinHandle<()>,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config: options.config,
                clipboard: options.clipboard,
                surface: options.surface,
                update_tx: options.update_tx,
                store: Arc::new(Mutex::new(options.store)),
                state: StdMutex::new(ConnectionState::Connecting),
                runtime: Mutex::new(None),
            }),
        }
    }

    /// Current session lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().expect("state lock")
    }

    /// Bring the session up: resolve ICE configuration, start signaling
    /// and spawn the event loop consuming the given dashboard commands.
    ///
    /// Only configuration errors are returned; runtime faults are routed
    /// through the dashboard status port and retried internally.
    pub async fn initialize(
        &self,
        command_rx: mpsc::UnboundedReceiver<DashboardCommand>,
    ) -> Result<()> {
        let inner = &self.inner;
        let mut runtime_guard = inner.runtime.lock().await;
        if runtime_guard.is_some() {
            debug!("initialize called on a live session");
            return Ok(());
        }
        inner.config.validate()?;

        let ice = self.resolve_ice().await;

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let transport = PeerTransport::new(
            transport_tx,
            Arc::clone(&inner.surface),
            Duration::from_millis(inner.config.latency_governor_interval_ms),
        );
        transport.configure(ice);

        let display = GeometryController::new(
            control_tx.clone(),
            inner.update_tx.clone(),
            Arc::clone(&inner.surface),
            Duration::from_millis(inner.config.resize_quiet_ms),
            Viewport::new(1280.0, 720.0, 1.0),
        );
        self.restore_display_mode(&display).await;

        let peer_id = (uuid::Uuid::new_v4().as_u128() % 9_000 + 1_000) as u32;
        let meta = HelloMeta {
            res: display.current_resolution().to_string(),
            scale: display.viewport().device_pixel_ratio,
        };
        let signaling = Arc::new(SignalingClient::spawn(
            inner.config.signaling_url()?,
            peer_id,
            meta,
            inner.config.backoff,
            signaling_tx,
        ));

        let stats = Arc::new(StatsAggregator::spawn(
            transport.clone(),
            inner.update_tx.clone(),
            Duration::from_millis(inner.config.stats_interval_ms),
            inner.config.client_report_every_ticks,
        ));

        // Control pump: everything any component wants to tell the server
        // funnels through one ordered queue onto the primary channel.
        let pump_transport = transport.clone();
        let control_task = tokio::spawn(async move {
            while let Some(message) = control_rx.recv().await {
                pump_transport.send_control(&message).await;
            }
        });

        let ctx = EventCtx {
            inner: Arc::clone(&self.inner),
            signaling: Arc::clone(&signaling),
            transport: transport.clone(),
            display,
            stats: Arc::clone(&stats),
            control_tx,
        };
        let event_task = tokio::spawn(run_event_loop(ctx, signaling_rx, transport_rx, command_rx));

        signaling.connect();
        self.set_state(ConnectionState::Connecting);
        info!(peer_id, "session initialized");

        *runtime_guard = Some(Runtime {
            signaling,
            transport,
            stats,
            event_task,
            control_task,
        });
        Ok(())
    }

    /// Tear the session down: stop every task and listener this session
    /// installed, close channels and zero mutable state. Idempotent.
    pub async fn cleanup(&self) {
        let Some(runtime) = self.inner.runtime.lock().await.take() else {
            debug!("cleanup on an already-clean session");
            return;
        };
        runtime.event_task.abort();
        runtime.control_task.abort();
        runtime.stats.shutdown();
        runtime.signaling.shutdown();
        runtime.transport.reset().await;

        if let Err(e) = self.inner.store.lock().await.commit() {
            warn!("preference flush during cleanup failed: {e}");
        }
        self.set_state(ConnectionState::Disconnected);
        info!("session cleaned up");
    }

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock().expect("state lock") = state;
    }

    // ICE resolution: explicit config wins, otherwise the ./turn
    // endpoint; the persisted turn_switch preference forces relay-only.
    async fn resolve_ice(&self) -> IceSettings {
        let inner = &self.inner;
        let force_relay = inner.config.ice.force_relay
            || inner
                .store
                .lock()
                .await
                .get_bool("turn_switch")
                .unwrap_or(false);

        if !inner.config.ice.servers.is_empty() {
            let mut ice = inner.config.ice.clone();
            ice.force_relay = force_relay;
            return ice;
        }
        match fetch_turn_config(&inner.config, force_relay).await {
            Ok(ice) => ice,
            Err(e) => {
                warn!("TURN endpoint unavailable: {e}");
                let _ = inner.update_tx.send(DashboardUpdate::Status {
                    message: format!("TURN config unavailable, continuing without relay: {e}"),
                });
                IceSettings {
                    servers: Vec::new(),
                    force_relay,
                }
            }
        }
    }

    // Restore manual resolution mode from persisted preferences, so a
    // cleanup/initialize cycle comes back with the same pinned geometry.
    async fn restore_display_mode(&self, display: &GeometryController) {
        let store = self.inner.store.lock().await;
        let manual = store.get_bool("is_manual_resolution_mode").unwrap_or(false);
        let width = store.get_int("manual_width").unwrap_or(0);
        let height = store.get_int("manual_height").unwrap_or(0);
        drop(store);
        if manual && width > 0 && height > 0 {
            display.disable_auto_resize();
            display.apply_manual_style(width as u32, height as u32, true);
            info!(width, height, "restored manual resolution mode");
        }
    }
}

struct EventCtx {
    inner: Arc<SessionInner>,
    signaling: Arc<SignalingClient>,
    transport: PeerTransport,
    display: GeometryController,
    stats: Arc<StatsAggregator>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
}

impl EventCtx {
    fn send_control(&self, message: ControlMessage) {
        let _ = self.control_tx.send(message);
    }

    fn post(&self, update: DashboardUpdate) {
        let _ = self.inner.update_tx.send(update);
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "session status");
        self.post(DashboardUpdate::Status { message });
    }

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock().expect("state lock") = state;
        self.status(state.label().to_string());
    }

    /// Voluntary disconnect, transport reset, fresh negotiation. Used by
    /// the server `reload` action and by fatal transport faults.
    fn schedule_reconnect(&self, delay: Duration) {
        let signaling = Arc::clone(&self.signaling);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            signaling.disconnect();
            transport.reset().await;
            signaling.connect();
        });
    }
}

async fn run_event_loop(
    ctx: EventCtx,
    mut signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut command_rx: mpsc::UnboundedReceiver<DashboardCommand>,
) {
    loop {
        tokio::select! {
            event = signaling_rx.recv() => match event {
                Some(event) => handle_signaling_event(&ctx, event).await,
                None => break,
            },
            event = transport_rx.recv() => match event {
                Some(event) => handle_transport_event(&ctx, event).await,
                None => break,
            },
            command = command_rx.recv() => match command {
                Some(command) => handle_command(&ctx, command).await,
                None => break,
            },
        }
    }
    debug!("session event loop ended");
}

async fn handle_signaling_event(ctx: &EventCtx, event: SignalingEvent) {
    match event {
        SignalingEvent::Status(message) => ctx.status(message),
        SignalingEvent::Registered => ctx.set_state(ConnectionState::Connecting),
        SignalingEvent::Offer { sdp } => {
            ctx.set_state(ConnectionState::Offering);
            match ctx.transport.handle_offer(sdp).await {
                Ok(answer) => {
                    ctx.signaling.send_answer(answer);
                    ctx.set_state(ConnectionState::Answered);
                }
                Err(e) => {
                    warn!("offer handling failed: {e}");
                    ctx.status(format!("Negotiation failed: {e}"));
                }
            }
        }
        SignalingEvent::RemoteCandidate(candidate) => {
            if let Err(e) = ctx.transport.add_remote_candidate(candidate).await {
                warn!("remote candidate rejected: {e}");
            }
        }
        SignalingEvent::Disconnected { reconnect } => {
            ctx.transport.reset().await;
            ctx.set_state(if reconnect {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            });
        }
        SignalingEvent::Error(message) => {
            ctx.status(format!("Signaling error: {message}"));
        }
    }
}

async fn handle_transport_event(ctx: &EventCtx, event: TransportEvent) {
    match event {
        TransportEvent::PrimaryChannelOpen => {
            ctx.status("Control channel open");
            // Advertise the current geometry and persisted preferences as
            // soon as the server can hear them.
            let resolution = ctx.display.current_resolution();
            ctx.send_control(ControlMessage::StreamResolution(resolution));
            send_persisted_preferences(ctx).await;
        }
        TransportEvent::PrimaryChannelClose => ctx.status("Control channel closed"),
        TransportEvent::ConnectionStateChanged(state) => {
            use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState as Pc;
            match state {
                Pc::Connected => ctx.set_state(ConnectionState::Connected),
                Pc::Failed => {
                    ctx.status("Peer connection failed, renegotiating");
                    ctx.set_state(ConnectionState::Reconnecting);
                    ctx.schedule_reconnect(Duration::ZERO);
                }
                Pc::Disconnected => ctx.set_state(ConnectionState::Disconnected),
                _ => {}
            }
        }
        TransportEvent::LocalIceCandidate(candidate) => {
            ctx.signaling.send_candidate(candidate);
        }
        TransportEvent::PlayStreamRequired => {
            ctx.post(DashboardUpdate::PlayStreamRequired);
        }
        TransportEvent::ClipboardContent(text) => {
            if !ctx.inner.clipboard.write_text(&text).await {
                debug!("host clipboard rejected server content");
            }
            ctx.post(DashboardUpdate::ClipboardContentUpdate { text });
        }
        TransportEvent::CursorUpdate(cursor) => {
            ctx.inner.surface.update_cursor(&cursor);
        }
        TransportEvent::SystemAction(action) => handle_system_action(ctx, action).await,
        TransportEvent::GpuStats(stats) => ctx.post(DashboardUpdate::GpuStats(stats)),
        TransportEvent::SystemStats(stats) => ctx.post(DashboardUpdate::SystemStats(stats)),
        TransportEvent::PingRequest { start_time } => {
            let now_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64() * 1_000.0)
                .unwrap_or_default();
            let latency_ms = (now_ms - start_time * 1_000.0).max(0.0);
            ctx.stats.record_latency_ms(latency_ms);
        }
        TransportEvent::LatencyMeasurement(latency_ms) => {
            ctx.stats.record_latency_ms(latency_ms);
        }
        TransportEvent::ServerSettings(payload) => {
            handle_server_settings(ctx, payload).await;
        }
        TransportEvent::Status(message) => ctx.status(message),
        TransportEvent::Error(message) => ctx.status(format!("Transport error: {message}")),
    }
}

async fn handle_system_action(ctx: &EventCtx, action: SystemAction) {
    let mut store = ctx.inner.store.lock().await;
    match action {
        SystemAction::Reload => {
            drop(store);
            info!("server requested reload");
            ctx.status("Server requested reload");
            ctx.schedule_reconnect(Duration::from_millis(ctx.inner.config.reload_delay_ms));
        }
        SystemAction::Framerate(fps) => {
            store.set_int("framerate", fps as i64);
            flush(&store);
        }
        SystemAction::VideoBitrate(kbps) => {
            store.set_int("video_bitrate", kbps as i64);
            flush(&store);
        }
        SystemAction::AudioBitrate(bps) => {
            store.set_int("audio_bitrate", bps as i64);
            flush(&store);
        }
        SystemAction::Encoder(name) => {
            store.set_raw("encoder_rtc", name);
            flush(&store);
        }
        SystemAction::ResizeEnabled(enabled) => {
            store.set_bool("resize_remote", enabled);
            flush(&store);
            drop(store);
            if enabled && !ctx.display.is_manual() {
                ctx.display.enable_auto_resize();
            } else {
                ctx.display.disable_auto_resize();
            }
        }
        SystemAction::RemoteResolution(resolution) => {
            debug!(%resolution, "server reports stream resolution");
        }
        SystemAction::Other(action) => {
            warn!(%action, "dropping unknown system action");
        }
    }
}

async fn handle_server_settings(ctx: &EventCtx, payload: SettingsPayload) {
    let outcome = {
        let mut store = ctx.inner.store.lock().await;
        reconcile(&mut store, &payload)
    };
    match outcome {
        Ok(outcome) => {
            // Persists are committed; the delta may go out now.
            if let Some(delta) = outcome.settings_message() {
                ctx.send_control(ControlMessage::Settings(delta));
            }
            match outcome.directive {
                ResolutionDirective::Manual { width, height } => {
                    ctx.display.disable_auto_resize();
                    let pinned = ctx.display.apply_manual_style(width, height, true);
                    ctx.display.send_resolution_to_server(pinned);
                }
                ResolutionDirective::Auto => {
                    if ctx.display.is_manual() {
                        ctx.display.reset_to_window_resolution();
                    }
                    ctx.display.enable_auto_resize();
                }
            }
        }
        Err(e) => warn!("settings reconciliation failed: {e}"),
    }
    ctx.post(DashboardUpdate::ServerSettings { payload });
}

async fn handle_command(ctx: &EventCtx, command: DashboardCommand) {
    match command {
        DashboardCommand::Mode { mode } => match StreamMode::from_str_opt(&mode) {
            Some(mode) => {
                let mut store = ctx.inner.store.lock().await;
                store.set_stream_mode(mode);
                flush(&store);
                drop(store);
                ctx.status(format!("Switching stream mode to {}", mode.as_str()));
                ctx.schedule_reconnect(Duration::ZERO);
            }
            None => warn!(%mode, "dropping unknown stream mode"),
        },
        DashboardCommand::SetScaleLocally { value } => {
            ctx.display.set_scale_to_fit(value);
        }
        DashboardCommand::ResetResolutionToWindow => {
            {
                let mut store = ctx.inner.store.lock().await;
                store.set_bool("is_manual_resolution_mode", false);
                flush(&store);
            }
            ctx.display.enable_auto_resize();
            ctx.display.reset_to_window_resolution();
        }
        DashboardCommand::SetManualResolution { width, height } => {
            ctx.display.disable_auto_resize();
            let pinned = ctx.display.apply_manual_style(width, height, true);
            ctx.display.send_resolution_to_server(pinned);
            let mut store = ctx.inner.store.lock().await;
            store.set_bool("is_manual_resolution_mode", true);
            store.set_int("manual_width", pinned.width as i64);
            store.set_int("manual_height", pinned.height as i64);
            flush(&store);
        }
        DashboardCommand::SetUseCssScaling { value } => {
            // Persisted and recorded only; the HiDPI path behind this
            // flag is a known gap and stays inert.
            let mut store = ctx.inner.store.lock().await;
            store.set_bool("use_css_scaling", value);
            flush(&store);
            drop(store);
            ctx.display.set_use_css_scaling(value);
        }
        DashboardCommand::ClipboardUpdateFromUi { text } => {
            ctx.send_control(ControlMessage::ClipboardWrite(text));
        }
        DashboardCommand::Settings { settings } => {
            apply_runtime_settings(ctx, settings).await;
        }
        DashboardCommand::Command { value } => {
            ctx.send_control(ControlMessage::Command(value));
        }
        DashboardCommand::RequestFileUpload { paths } => {
            let pipeline = UploadPipeline::new(
                Arc::new(ctx.transport.clone()),
                ctx.inner.update_tx.clone(),
                ctx.inner.config.upload_chunk_size,
            );
            tokio::spawn(async move {
                match pipeline.upload(paths).await {
                    Ok(()) => {}
                    Err(Error::UploadBusy) => {}
                    Err(e) => warn!("upload batch failed: {e}"),
                }
            });
        }
        DashboardCommand::WindowResized {
            width,
            height,
            device_pixel_ratio,
        } => {
            let viewport = Viewport::new(width, height, device_pixel_ratio);
            ctx.display.window_resized(viewport);
            ctx.signaling.update_meta(HelloMeta {
                res: ctx.display.current_resolution().to_string(),
                scale: device_pixel_ratio,
            });
        }
        DashboardCommand::WindowFocused => {
            ctx.send_control(ControlMessage::KeyboardReset);
            if ctx.inner.clipboard.is_secure_context() {
                if let Some(text) = ctx.inner.clipboard.read_text().await {
                    ctx.send_control(ControlMessage::ClipboardWrite(text));
                } else {
                    debug!("clipboard read denied, bridging stays off");
                }
            }
        }
        DashboardCommand::WindowBlurred => {
            ctx.send_control(ControlMessage::KeyboardReset);
        }
    }
}

/// Runtime setting mutations from the dashboard: forward to the server
/// and persist, key by key. Unknown keys are warned about and dropped.
async fn apply_runtime_settings(ctx: &EventCtx, settings: serde_json::Value) {
    let Some(map) = settings.as_object() else {
        warn!("dropping non-object settings payload");
        return;
    };
    let mut store = ctx.inner.store.lock().await;
    for (key, value) in map {
        match key.as_str() {
            "framerate" => {
                if let Some(fps) = value.as_u64() {
                    store.set_int("framerate", fps as i64);
                    ctx.send_control(ControlMessage::TargetFramerate(fps as u32));
                }
            }
            "video_bitrate" => {
                if let Some(kbps) = value.as_u64() {
                    store.set_int("video_bitrate", kbps as i64);
                    ctx.send_control(ControlMessage::VideoBitrate(kbps as u32));
                }
            }
            "audio_bitrate" => {
                if let Some(bps) = value.as_u64() {
                    store.set_int("audio_bitrate", bps as i64);
                    ctx.send_control(ControlMessage::AudioBitrate(bps as u32));
                }
            }
            "scaling_dpi" => {
                if let Some(dpi) = value.as_u64() {
                    store.set_int("scaling_dpi", dpi as i64);
                    ctx.send_control(ControlMessage::ScalingDpi(dpi as u32));
                }
            }
            "encoder_rtc" => {
                if let Some(name) = value.as_str() {
                    store.set_raw("encoder_rtc", name);
                }
            }
            "enable_binary_clipboard" | "turn_switch" | "resize_remote" | "debug"
            | "gamepad_enabled" => {
                if let Some(flag) = value.as_bool() {
                    store.set_bool(key, flag);
                }
            }
            other => warn!(setting = %other, "dropping unknown dashboard setting"),
        }
    }
    flush(&store);
}

/// Push persisted tuning values to a freshly opened control channel.
async fn send_persisted_preferences(ctx: &EventCtx) {
    let store = ctx.inner.store.lock().await;
    if let Some(fps) = store.get_int("framerate") {
        ctx.send_control(ControlMessage::TargetFramerate(fps as u32));
    }
    if let Some(kbps) = store.get_int("video_bitrate") {
        ctx.send_control(ControlMessage::VideoBitrate(kbps as u32));
    }
    if let Some(bps) = store.get_int("audio_bitrate") {
        ctx.send_control(ControlMessage::AudioBitrate(bps as u32));
    }
    if let Some(dpi) = store.get_int("scaling_dpi") {
        ctx.send_control(ControlMessage::ScalingDpi(dpi as u32));
    }
}

fn flush(store: &PreferenceStore) {
    if let Err(e) = store.commit() {
        warn!("preference flush failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{NullClipboard, NullSurface};

    fn options(update_tx: mpsc::UnboundedSender<DashboardUpdate>) -> SessionOptions {
        SessionOptions {
            config: ClientConfig::new("https://desktop.example/webrtc".parse().unwrap()),
            store: PreferenceStore::in_memory("test"),
            clipboard: Arc::new(NullClipboard),
            surface: Arc::new(NullSurface::default()),
            update_tx,
        }
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let (update_tx, _updates) = mpsc::unbounded_channel();
        let session = Session::new(options(update_tx));

        // Never initialized: both calls are no-ops.
        session.cleanup().await;
        session.cleanup().await;
        assert_eq!(session.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_initialize_then_cleanup_cycle() {
        let (update_tx, _updates) = mpsc::unbounded_channel();
        let session = Session::new(options(update_tx));

        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        session.initialize(command_rx).await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connecting);

        session.cleanup().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);

        // A fresh command port brings the session back up.
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        session.initialize(command_rx).await.unwrap();
        session.cleanup().await;
    }

    #[tokio::test]
    async fn test_manual_resolution_survives_reinitialize() {
        let (update_tx, _updates) = mpsc::unbounded_channel();
        let mut store = PreferenceStore::in_memory("test");
        store.set_bool("is_manual_resolution_mode", true);
        store.set_int("manual_width", 1920);
        store.set_int("manual_height", 1080);

        let mut opts = options(update_tx);
        opts.store = store;
        let session = Session::new(opts);

        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        session.initialize(command_rx).await.unwrap();

        let store = session.inner.store.lock().await;
        assert_eq!(store.get_bool("is_manual_resolution_mode"), Some(true));
        assert_eq!(store.get_int("manual_width"), Some(1920));
        assert_eq!(store.get_int("manual_height"), Some(1080));
        drop(store);
        session.cleanup().await;
    }
}
