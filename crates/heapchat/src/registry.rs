//! Single active widget per registry.

use crate::host::Host;
use crate::widget::Heapchat;
use crate::{WidgetError, WidgetResult};
use heapchat_outbox::ChannelConfig;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub(crate) type Slot = Mutex<Option<Heapchat>>;

static GLOBAL: OnceLock<WidgetRegistry> = OnceLock::new();

/// Holds at most one live [`Heapchat`]. Destroying the widget frees the slot.
#[derive(Clone, Default)]
pub struct WidgetRegistry {
    slot: Arc<Slot>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static WidgetRegistry {
        GLOBAL.get_or_init(WidgetRegistry::new)
    }

    /// Create the widget, failing if one is already active.
    pub fn create(
        &self,
        host: Arc<dyn Host>,
        channel_config: &ChannelConfig,
    ) -> WidgetResult<Heapchat> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(WidgetError::AlreadyInitialized);
        }

        let widget = Heapchat::create(host, channel_config, Arc::downgrade(&self.slot))?;
        *slot = Some(widget.clone());
        Ok(widget)
    }

    /// Return the active widget, creating it if there is none.
    pub fn acquire(
        &self,
        host: Arc<dyn Host>,
        channel_config: &ChannelConfig,
    ) -> WidgetResult<Heapchat> {
        let mut slot = self.slot.lock();
        if let Some(widget) = slot.as_ref() {
            debug!("Reusing active Heapchat widget");
            return Ok(widget.clone());
        }

        let widget = Heapchat::create(host, channel_config, Arc::downgrade(&self.slot))?;
        *slot = Some(widget.clone());
        Ok(widget)
    }

    pub fn active(&self) -> Option<Heapchat> {
        self.slot.lock().clone()
    }
}
