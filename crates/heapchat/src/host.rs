//! The environment the widget is embedded in.
//!
//! A [`Host`] owns everything visual: it mounts the embedded surface, draws
//! the launcher and applies presentation state. The widget only sees the
//! transport into the mounted surface and a one-shot "loaded" signal.

use crate::config::Position;
use crate::{WidgetError, WidgetResult};
use heapchat_outbox::{MemoryTransport, SurfaceOrigin, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Visible state the host should reflect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    /// Surface shown.
    pub open: bool,
    /// Launcher button shown.
    pub toggle_visible: bool,
    pub position: Position,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            open: false,
            toggle_visible: true,
            position: Position::default(),
        }
    }
}

/// A freshly mounted surface.
pub struct MountedSurface {
    /// Send primitive into the surface.
    pub transport: Arc<dyn Transport>,
    /// Where the surface actually lives.
    pub origin: SurfaceOrigin,
    /// Fires once when the surface has finished loading.
    pub loaded: oneshot::Receiver<()>,
}

/// Capabilities the widget needs from its environment.
pub trait Host: Send + Sync {
    /// False when there is nothing to draw into (server-side, headless CI).
    fn is_display_capable(&self) -> bool;

    /// Mount the surface pointed at `surface_url`.
    fn mount(&self, surface_url: &str) -> WidgetResult<MountedSurface>;

    fn render(&self, presentation: &Presentation);

    fn unmount(&self);
}

/// Host without a display. Nothing is ever mounted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplayHost;

impl Host for NoDisplayHost {
    fn is_display_capable(&self) -> bool {
        false
    }

    fn mount(&self, _surface_url: &str) -> WidgetResult<MountedSurface> {
        Err(WidgetError::Host("no display available".to_string()))
    }

    fn render(&self, _presentation: &Presentation) {}

    fn unmount(&self) {}
}

/// How a [`HeadlessHost`] surface finishes loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    /// Only when [`HeadlessHost::finish_loading`] is called.
    Manual,
    /// On its own after a delay.
    After(Duration),
}

/// In-memory host backed by a [`MemoryTransport`].
///
/// Used by the simulator and tests. Each mount creates a fresh surface; the
/// last rendered presentation is kept for inspection.
pub struct HeadlessHost {
    load_mode: LoadMode,
    surface_origin: Option<SurfaceOrigin>,
    state: Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    transport: Option<Arc<MemoryTransport>>,
    load_tx: Option<oneshot::Sender<()>>,
    presentation: Option<Presentation>,
    mounted: bool,
    mounts: usize,
}

impl HeadlessHost {
    /// Surface loads when [`finish_loading`](Self::finish_loading) is called.
    pub fn new() -> Self {
        Self {
            load_mode: LoadMode::Manual,
            surface_origin: None,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Surface loads by itself `delay` after mounting.
    pub fn with_load_delay(delay: Duration) -> Self {
        Self {
            load_mode: LoadMode::After(delay),
            ..Self::new()
        }
    }

    /// Serve the surface from `origin` regardless of the URL it is mounted at.
    pub fn serving_from(mut self, origin: SurfaceOrigin) -> Self {
        self.surface_origin = Some(origin);
        self
    }

    /// Signal that the current surface finished loading.
    ///
    /// Returns false if nothing is mounted or it already loaded.
    pub fn finish_loading(&self) -> bool {
        match self.state.lock().load_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Surface of the current (or last) mount.
    pub fn transport(&self) -> Option<Arc<MemoryTransport>> {
        self.state.lock().transport.clone()
    }

    pub fn presentation(&self) -> Option<Presentation> {
        self.state.lock().presentation
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().mounted
    }

    pub fn mount_count(&self) -> usize {
        self.state.lock().mounts
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for HeadlessHost {
    fn is_display_capable(&self) -> bool {
        true
    }

    fn mount(&self, surface_url: &str) -> WidgetResult<MountedSurface> {
        let origin = match &self.surface_origin {
            Some(origin) => origin.clone(),
            None => SurfaceOrigin::parse(surface_url)?,
        };
        let transport = Arc::new(MemoryTransport::new(origin.clone()));
        let (tx, loaded) = oneshot::channel();

        let load_tx = match self.load_mode {
            LoadMode::Manual => Some(tx),
            LoadMode::After(delay) => {
                let runtime =
                    tokio::runtime::Handle::try_current().map_err(|_| WidgetError::NoRuntime)?;
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(());
                });
                None
            }
        };

        let mut state = self.state.lock();
        state.transport = Some(transport.clone());
        state.load_tx = load_tx;
        state.mounted = true;
        state.mounts += 1;
        debug!(surface_url, origin = %origin, "Headless surface mounted");

        Ok(MountedSurface {
            transport,
            origin,
            loaded,
        })
    }

    fn render(&self, presentation: &Presentation) {
        self.state.lock().presentation = Some(*presentation);
    }

    fn unmount(&self) {
        let mut state = self.state.lock();
        state.mounted = false;
        state.load_tx = None;
        state.presentation = None;
    }
}
