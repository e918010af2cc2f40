//! Heapchat embeddable chat widget.
//!
//! The widget mounts a hosted chat surface through a [`Host`] and relays a
//! small command set into it: configuration, customer identity, theming and
//! push tokens. Delivery is handled by [`heapchat_outbox`]: commands are
//! queued while the surface loads and retried on failure, and callers never
//! block or see an error.
//!
//! ```rust,ignore
//! let widget = WidgetRegistry::global().acquire(host, &ChannelConfig::from_env()?)?;
//! widget.configure(WidgetConfig::new("pk_live_123"));
//! widget.login("user-42");
//! ```

mod config;
mod error;
mod host;
mod registry;
mod theme;
mod widget;

pub use config::{CustomerData, Position, WidgetConfig};
pub use error::{WidgetError, WidgetResult};
pub use host::{HeadlessHost, Host, MountedSurface, NoDisplayHost, Presentation};
pub use registry::WidgetRegistry;
pub use theme::{Theme, ThemeMode};
pub use widget::Heapchat;

pub use heapchat_outbox::{ChannelConfig, DeliveryEvent, DeliveryEvents};
