//! Outbound command delivery into the Heapchat embedded surface.
//!
//! This crate provides:
//! - OutboundChannel: ordered queue plus a single drain task that posts
//!   commands to the surface and retries failed attempts with a fixed backoff
//! - Transport: the one-way, origin-pinned send primitive, with an in-memory
//!   implementation and a deferred-dispatch adapter
//! - ChannelConfig: retry ceiling, backoff, dispatch delay and surface URL
//!
//! # Core Invariants
//!
//! 1. **Single Drain**: at most one task walks the queue at a time
//! 2. **Bounded Retry**: a command is attempted at most `max_attempts` times
//! 3. **Origin-Pinned**: messages are only ever addressed to the surface origin
//! 4. **Silent Failures**: callers never see delivery errors; outcomes are
//!    logged and broadcast as [`DeliveryEvent`]s

mod channel;
mod command;
mod config;
mod error;
mod origin;
mod transport;

#[cfg(test)]
mod tests;

pub use channel::{DeliveryEvent, DeliveryEvents, OutboundChannel};
pub use command::{
    payload_from, Command, CommandKind, Envelope, Payload, DEFAULT_MAX_ATTEMPTS, ENVELOPE_TYPE_KEY,
};
pub use config::{
    ChannelConfig, RetryPlacement, DEFAULT_DISPATCH_DELAY, DEFAULT_EVENT_BUFFER,
    DEFAULT_RETRY_DELAY, DEFAULT_SURFACE_URL,
};
pub use error::{OutboxError, OutboxResult, TransportError};
pub use origin::SurfaceOrigin;
pub use transport::{check_origin, MemoryTransport, ScheduledTransport, Transport};
