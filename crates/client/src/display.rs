//! Geometry controller
//!
//! Owns the mutable half of the rendering geometry: current viewport,
//! manual override, scale-to-fit preference and the auto-resize listener
//! with its trailing-edge debounce. All math is delegated to
//! `deskstream_core::geometry`; this module decides *when* to recompute
//! and where the results go (control channel, surface, dashboard).

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use deskstream_core::geometry::{
    effective_dpr, logical_resolution, manual_style, rendering_hint, window_style, Viewport,
};
use deskstream_core::protocol::ControlMessage;
use deskstream_core::types::Resolution;

use crate::dashboard::DashboardUpdate;
use crate::platform::MediaSurface;

#[derive(Debug)]
struct GeomState {
    viewport: Viewport,
    manual: Option<Resolution>,
    scale_to_fit: bool,
    use_css_scaling: bool,
    auto_resize: bool,
    pending_deadline: Option<Instant>,
}

struct ControllerInner {
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    updates: mpsc::UnboundedSender<DashboardUpdate>,
    surface: Arc<dyn MediaSurface>,
    quiet: Duration,
    state: StdMutex<GeomState>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

/// Controller for the media surface geometry
#[derive(Clone)]
pub struct GeometryController {
    inner: Arc<ControllerInner>,
}

impl GeometryController {
    pub fn new(
        control_tx: mpsc::UnboundedSender<ControlMessage>,
        updates: mpsc::UnboundedSender<DashboardUpdate>,
        surface: Arc<dyn MediaSurface>,
        quiet: Duration,
        initial_viewport: Viewport,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                control_tx,
                updates,
                surface,
                quiet,
                state: StdMutex::new(GeomState {
                    viewport: initial_viewport,
                    manual: None,
                    scale_to_fit: true,
                    use_css_scaling: false,
                    auto_resize: true,
                    pending_deadline: None,
                }),
                timer: StdMutex::new(None),
            }),
        }
    }

    /// Whether manual resolution mode is active.
    pub fn is_manual(&self) -> bool {
        self.lock_state().manual.is_some()
    }

    /// Logical resolution the stream should currently run at.
    pub fn current_resolution(&self) -> Resolution {
        let state = self.lock_state();
        current_resolution(&state)
    }

    /// Last viewport reported by the shell.
    pub fn viewport(&self) -> Viewport {
        self.lock_state().viewport
    }

    /// Record a window resize. In auto mode this (re-)arms the debounce
    /// timer; in manual mode the pinned style is recomputed immediately
    /// since only placement changes.
    pub fn window_resized(&self, viewport: Viewport) {
        let manual = {
            let mut state = self.lock_state();
            state.viewport = viewport;
            if state.manual.is_some() {
                Some(())
            } else if state.auto_resize {
                state.pending_deadline = Some(Instant::now() + self.inner.quiet);
                None
            } else {
                return;
            }
        };
        match manual {
            Some(()) => self.reapply_manual(),
            None => self.spawn_debounce_timer(),
        }
    }

    /// Record the dashboard's CSS-scaling preference.
    ///
    /// Deliberately has no effect beyond the next resolution computation:
    /// the HiDPI path this flag belongs to is incomplete in the protocol
    /// and no further behaviour is inferred.
    pub fn set_use_css_scaling(&self, value: bool) {
        self.lock_state().use_css_scaling = value;
    }

    /// Toggle aspect-preserving scaling for the pinned surface.
    pub fn set_scale_to_fit(&self, value: bool) {
        {
            let mut state = self.lock_state();
            state.scale_to_fit = value;
            if state.manual.is_none() {
                return;
            }
        }
        self.reapply_manual();
    }

    /// Re-enable the auto-resize listener.
    pub fn enable_auto_resize(&self) {
        self.lock_state().auto_resize = true;
        debug!("auto-resize enabled");
    }

    /// Disable the auto-resize listener and cancel any pending debounce.
    pub fn disable_auto_resize(&self) {
        {
            let mut state = self.lock_state();
            state.auto_resize = false;
            state.pending_deadline = None;
        }
        if let Some(timer) = self.inner.timer.lock().expect("timer lock").take() {
            timer.abort();
        }
        debug!("auto-resize disabled");
    }

    /// Pin the surface to a fixed resolution and style it.
    ///
    /// Dimensions are rounded down to even; the caller persists the
    /// values and disables auto-resize around this.
    pub fn apply_manual_style(&self, width: u32, height: u32, scale_to_fit: bool) -> Resolution {
        let pinned = logical_resolution(width as f64, height as f64, 1.0);
        {
            let mut state = self.lock_state();
            state.manual = Some(pinned);
            state.scale_to_fit = scale_to_fit;
        }
        self.reapply_manual();
        pinned
    }

    /// Leave manual mode and size the stream from the window again.
    pub fn reset_to_window_resolution(&self) -> Resolution {
        {
            let mut state = self.lock_state();
            state.manual = None;
        }
        self.apply_window_geometry()
    }

    /// Send a resolution update to the server.
    pub fn send_resolution_to_server(&self, resolution: Resolution) {
        let _ = self
            .inner
            .control_tx
            .send(ControlMessage::StreamResolution(resolution));
    }

    fn reapply_manual(&self) {
        let (style, resolution) = {
            let state = self.lock_state();
            let Some(pinned) = state.manual else { return };
            let dpr = effective_dpr(true, state.use_css_scaling, state.viewport.device_pixel_ratio);
            let style = manual_style(
                state.viewport.width,
                state.viewport.height,
                pinned,
                state.scale_to_fit,
                rendering_hint(dpr),
            );
            (style, pinned)
        };
        debug!(%resolution, "manual surface style applied");
        self.inner.surface.apply_style(style);
        let _ = self.inner.updates.send(DashboardUpdate::SurfaceStyle(style));
    }

    // Recompute geometry from the current window, notify the server and
    // restyle the surface. The auto-resize debounce lands here.
    fn apply_window_geometry(&self) -> Resolution {
        let (style, resolution) = {
            let state = self.lock_state();
            let dpr = effective_dpr(
                state.manual.is_some(),
                state.use_css_scaling,
                state.viewport.device_pixel_ratio,
            );
            let resolution =
                logical_resolution(state.viewport.width, state.viewport.height, dpr);
            (window_style(&state.viewport, rendering_hint(dpr)), resolution)
        };
        self.send_resolution_to_server(resolution);
        self.inner.surface.apply_style(style);
        let _ = self.inner.updates.send(DashboardUpdate::SurfaceStyle(style));
        resolution
    }

    // Trailing-edge debounce: one timer task waits on the deadline, which
    // every further resize pushes out. The timer fires once after a full
    // quiet period and exits; resizes that stop early never reach the
    // server.
    fn spawn_debounce_timer(&self) {
        let mut timer = self.inner.timer.lock().expect("timer lock");
        if timer.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let controller = self.clone();
        *timer = Some(tokio::spawn(async move {
            loop {
                let deadline = controller.lock_state().pending_deadline;
                let Some(deadline) = deadline else { return };
                tokio::time::sleep_until(deadline).await;
                let fire = {
                    let mut state = controller.lock_state();
                    match state.pending_deadline {
                        Some(armed) if armed <= Instant::now() => {
                            state.pending_deadline = None;
                            state.auto_resize
                        }
                        // Re-armed while we slept: go around again.
                        Some(_) => continue,
                        None => return,
                    }
                };
                if fire {
                    controller.apply_window_geometry();
                }
                return;
            }
        }));
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GeomState> {
        self.inner.state.lock().expect("geometry state lock")
    }
}

fn current_resolution(state: &GeomState) -> Resolution {
    match state.manual {
        Some(pinned) => pinned,
        None => {
            let dpr = effective_dpr(false, state.use_css_scaling, state.viewport.device_pixel_ratio);
            logical_resolution(state.viewport.width, state.viewport.height, dpr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NullSurface;
    use tokio::sync::mpsc::error::TryRecvError;

    const QUIET: Duration = Duration::from_millis(500);

    fn controller() -> (
        GeometryController,
        mpsc::UnboundedReceiver<ControlMessage>,
        mpsc::UnboundedReceiver<DashboardUpdate>,
    ) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let ctrl = GeometryController::new(
            control_tx,
            update_tx,
            Arc::new(NullSurface::default()),
            QUIET,
            Viewport::new(1920.0, 1080.0, 1.0),
        );
        (ctrl, control_rx, update_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_burst_debounces_to_one_message() {
        let (ctrl, mut control_rx, _updates) = controller();

        // 20 resize events over 200 ms
        for i in 0..20 {
            ctrl.window_resized(Viewport::new(1000.0 + i as f64, 700.0, 1.0));
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert!(matches!(control_rx.try_recv(), Err(TryRecvError::Empty)));

        // Quiet period elapses after the last event
        tokio::time::advance(QUIET + Duration::from_millis(20)).await;
        tokio::task::yield_now().await;

        let message = control_rx.try_recv().expect("one resolution message");
        assert_eq!(
            message,
            ControlMessage::StreamResolution(Resolution::new(1018, 700))
        );
        assert!(matches!(control_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_auto_resize_cancels_pending_send() {
        let (ctrl, mut control_rx, _updates) = controller();

        ctrl.window_resized(Viewport::new(1280.0, 720.0, 1.0));
        tokio::time::advance(Duration::from_millis(100)).await;
        ctrl.disable_auto_resize();

        tokio::time::advance(QUIET * 2).await;
        tokio::task::yield_now().await;
        assert!(matches!(control_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_mode_ignores_resize_debounce() {
        let (ctrl, mut control_rx, _updates) = controller();

        ctrl.disable_auto_resize();
        ctrl.apply_manual_style(1920, 1080, true);
        ctrl.window_resized(Viewport::new(800.0, 600.0, 1.0));

        tokio::time::advance(QUIET * 2).await;
        tokio::task::yield_now().await;
        // Styling happens, but no resolution message goes to the server.
        assert!(matches!(control_rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(ctrl.is_manual());
    }

    #[tokio::test]
    async fn test_manual_dimensions_rounded_even() {
        let (ctrl, _control_rx, _updates) = controller();
        let pinned = ctrl.apply_manual_style(1921, 1081, false);
        assert_eq!(pinned, Resolution::new(1920, 1080));
        assert_eq!(ctrl.current_resolution(), pinned);
    }

    #[tokio::test]
    async fn test_reset_to_window_sends_resolution() {
        let (ctrl, mut control_rx, _updates) = controller();
        ctrl.apply_manual_style(640, 480, false);

        let resolution = ctrl.reset_to_window_resolution();
        assert_eq!(resolution, Resolution::new(1920, 1080));
        assert!(!ctrl.is_manual());
        assert_eq!(
            control_rx.try_recv().unwrap(),
            ControlMessage::StreamResolution(resolution)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidpi_resolution_uses_dpr() {
        let (ctrl, mut control_rx, _updates) = controller();
        ctrl.window_resized(Viewport::new(1280.0, 720.0, 2.0));
        tokio::time::advance(QUIET + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(
            control_rx.try_recv().unwrap(),
            ControlMessage::StreamResolution(Resolution::new(2560, 1440))
        );
    }
}
