//! The widget facade.
//!
//! Every public command turns into an outbound command on the widget's
//! channel and returns immediately. The channel is marked ready, with INIT
//! at the head of the queue, once both of these have happened:
//! - the surface finished loading
//! - `configure` supplied an API key
//!
//! ```text
//! login() ──enqueue──> OutboundChannel ──ScheduledTransport──> surface
//!                           ^
//! host "loaded" ──────mark_ready_with(INIT)
//! ```

use crate::config::{CustomerData, Position, WidgetConfig};
use crate::host::{Host, Presentation};
use crate::registry::Slot;
use crate::theme::{Theme, ThemeMode};
use crate::{WidgetError, WidgetResult};
use heapchat_outbox::{
    payload_from, ChannelConfig, CommandKind, DeliveryEvents, OutboundChannel, ScheduledTransport,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitPayload<'a> {
    api_key: &'a str,
    position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    support_image: Option<&'a str>,
}

impl<'a> InitPayload<'a> {
    fn from_config(config: &'a WidgetConfig) -> Self {
        Self {
            api_key: &config.api_key,
            position: config.resolved_position(),
            support_image: config.support_image.as_deref(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
struct CustomerDataPayload<'a> {
    data: &'a CustomerData,
}

#[derive(Serialize)]
struct ThemePayload<'a> {
    theme: &'a Theme,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThemeModePayload {
    theme_mode: ThemeMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceTokenPayload<'a> {
    device_token: &'a str,
}

#[derive(Serialize)]
struct Empty {}

/// Handle to the active widget. Clones share the same widget.
#[derive(Clone)]
pub struct Heapchat {
    inner: Arc<WidgetInner>,
}

struct WidgetInner {
    host: Arc<dyn Host>,
    channel: OutboundChannel,
    display_capable: bool,
    slot: Weak<Slot>,
    state: Mutex<WidgetState>,
}

struct WidgetState {
    config: Option<WidgetConfig>,
    theme: Theme,
    theme_mode: ThemeMode,
    presentation: Presentation,
    mounted: bool,
    loaded: bool,
    destroyed: bool,
    load_watcher: Option<JoinHandle<()>>,
}

impl Heapchat {
    /// Build the widget and, on a display-capable host, mount the surface.
    pub(crate) fn create(
        host: Arc<dyn Host>,
        channel_config: &ChannelConfig,
        slot: Weak<Slot>,
    ) -> WidgetResult<Self> {
        let channel = OutboundChannel::new(channel_config)?;
        let display_capable = host.is_display_capable();

        let widget = Self {
            inner: Arc::new(WidgetInner {
                host,
                channel,
                display_capable,
                slot,
                state: Mutex::new(WidgetState {
                    config: None,
                    theme: Theme::hosted_default(),
                    theme_mode: ThemeMode::default(),
                    presentation: Presentation::default(),
                    mounted: false,
                    loaded: false,
                    destroyed: false,
                    load_watcher: None,
                }),
            }),
        };

        if display_capable {
            widget.mount(channel_config)?;
        } else {
            warn!("Heapchat: no display available, widget will stay inert");
        }

        info!(
            destination = %widget.inner.channel.destination(),
            display_capable,
            "Heapchat widget created"
        );
        Ok(widget)
    }

    fn mount(&self, channel_config: &ChannelConfig) -> WidgetResult<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WidgetError::NoRuntime)?;
        let surface = self.inner.host.mount(&channel_config.surface_url)?;

        let transport = ScheduledTransport::new(
            surface.transport,
            surface.origin,
            channel_config.dispatch_delay,
        );
        self.inner.channel.attach_transport(Arc::new(transport));

        let watcher = runtime.spawn(watch_load(Arc::downgrade(&self.inner), surface.loaded));

        let presentation = {
            let mut state = self.inner.state.lock();
            state.mounted = true;
            state.load_watcher = Some(watcher);
            state.presentation
        };
        self.inner.host.render(&presentation);
        Ok(())
    }

    /// Store the configuration and arrange for INIT to be sent.
    ///
    /// Before the surface loads, INIT is deferred and built from whatever
    /// configuration is current at load time. After it loaded, a fresh INIT
    /// is queued right away.
    pub fn configure(&self, config: WidgetConfig) {
        let mut state = self.inner.state.lock();
        state.config = Some(config.clone());

        if !self.inner.display_capable {
            warn!("Heapchat: configure called without a display, skipping initialization");
            return;
        }
        if state.destroyed {
            warn!("Heapchat: configure called after destroy");
            return;
        }

        state.presentation.position = config.resolved_position();
        state.presentation.toggle_visible = config.toggle_button_visible();
        let presentation = state.presentation;

        if state.loaded {
            let payload = match payload_from(&InitPayload::from_config(&config)) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, "Failed to build INIT payload");
                    return;
                }
            };
            if self.inner.channel.is_ready() {
                self.inner.channel.enqueue(CommandKind::Init, payload);
            } else {
                self.inner.channel.mark_ready_with(CommandKind::Init, payload);
            }
        } else {
            debug!("INIT deferred until the surface loads");
        }
        drop(state);

        self.inner.host.render(&presentation);
    }

    pub fn login(&self, user_id: &str) {
        self.send(CommandKind::Login, &LoginPayload { user_id });
    }

    pub fn logout(&self) {
        self.send(CommandKind::Logout, &Empty {});
    }

    pub fn set_customer_data(&self, data: &CustomerData) {
        self.send(CommandKind::CustomerData, &CustomerDataPayload { data });
    }

    /// Register a push notification token with the surface.
    pub fn set_device_token(&self, device_token: &str) {
        self.send(
            CommandKind::SetDeviceToken,
            &DeviceTokenPayload { device_token },
        );
    }

    /// Merge `patch` into the current theme and forward the patch.
    pub fn set_theme(&self, patch: &Theme) {
        if !self.inner.display_capable {
            warn!("Heapchat: set_theme called without a display, ignoring");
            return;
        }
        self.inner.state.lock().theme.merge(patch);
        self.send(CommandKind::Theme, &ThemePayload { theme: patch });
    }

    pub fn set_theme_mode(&self, theme_mode: ThemeMode) {
        if !self.inner.display_capable {
            warn!("Heapchat: set_theme_mode called without a display, ignoring");
            return;
        }
        self.inner.state.lock().theme_mode = theme_mode;
        self.send(CommandKind::ThemeMode, &ThemeModePayload { theme_mode });
    }

    pub fn show(&self) {
        self.present(|p| p.open = true);
    }

    pub fn hide(&self) {
        self.present(|p| p.open = false);
    }

    /// Open if closed, close if open. What the launcher button does.
    pub fn toggle(&self) {
        self.present(|p| p.open = !p.open);
    }

    pub fn show_toggle_button(&self) {
        self.present(|p| p.toggle_visible = true);
    }

    pub fn hide_toggle_button(&self) {
        self.present(|p| p.toggle_visible = false);
    }

    /// Unmount the surface, drop undelivered commands and free the
    /// single-instance slot. Later calls on this handle do nothing.
    pub fn destroy(&self) {
        let (abandoned, was_mounted) = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            if let Some(watcher) = state.load_watcher.take() {
                watcher.abort();
            }
            let was_mounted = std::mem::replace(&mut state.mounted, false);
            (self.inner.channel.shutdown(), was_mounted)
        };

        if was_mounted {
            self.inner.host.unmount();
        }
        if let Some(slot) = self.inner.slot.upgrade() {
            let mut active = slot.lock();
            if active.as_ref().is_some_and(|w| w.ptr_eq(self)) {
                *active = None;
            }
        }

        info!(abandoned, "Heapchat widget destroyed");
    }

    /// Current merged theme.
    pub fn theme(&self) -> Theme {
        self.inner.state.lock().theme.clone()
    }

    pub fn theme_mode(&self) -> ThemeMode {
        self.inner.state.lock().theme_mode
    }

    /// Configuration from the last `configure` call.
    pub fn config(&self) -> Option<WidgetConfig> {
        self.inner.state.lock().config.clone()
    }

    pub fn presentation(&self) -> Presentation {
        self.inner.state.lock().presentation
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().loaded
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Delivery outcomes of every command this widget sends.
    pub fn subscribe(&self) -> DeliveryEvents {
        self.inner.channel.subscribe()
    }

    pub fn channel(&self) -> &OutboundChannel {
        &self.inner.channel
    }

    /// Same underlying widget.
    pub fn ptr_eq(&self, other: &Heapchat) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn send<T: Serialize>(&self, kind: CommandKind, body: &T) {
        if !self.inner.display_capable {
            warn!(kind = %kind, "Heapchat: no display available, command ignored");
            return;
        }
        match payload_from(body) {
            Ok(payload) => {
                self.inner.channel.enqueue(kind, payload);
            }
            Err(e) => error!(kind = %kind, error = %e, "Failed to build command payload"),
        }
    }

    fn present(&self, change: impl FnOnce(&mut Presentation)) {
        let presentation = {
            let mut state = self.inner.state.lock();
            if !state.mounted {
                return;
            }
            change(&mut state.presentation);
            state.presentation
        };
        self.inner.host.render(&presentation);
    }
}

impl WidgetInner {
    fn on_surface_loaded(&self) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        state.loaded = true;
        state.load_watcher = None;

        let Some(config) = state.config.as_ref() else {
            info!("Surface loaded, waiting for configure before sending INIT");
            return;
        };

        match payload_from(&InitPayload::from_config(config)) {
            Ok(payload) => {
                let id = self.channel.mark_ready_with(CommandKind::Init, payload);
                info!(command_id = id, "Surface loaded, INIT queued");
            }
            Err(e) => error!(error = %e, "Failed to build INIT payload"),
        }
    }
}

async fn watch_load(widget: Weak<WidgetInner>, loaded: oneshot::Receiver<()>) {
    if loaded.await.is_err() {
        debug!("Surface dropped before it finished loading");
        return;
    }
    if let Some(widget) = widget.upgrade() {
        widget.on_surface_loaded();
    }
}
