//! Channel configuration.

use crate::command::DEFAULT_MAX_ATTEMPTS;
use crate::origin::SurfaceOrigin;
use crate::{OutboxError, OutboxResult};
use std::time::Duration;

/// Where the hosted chat UI lives.
pub const DEFAULT_SURFACE_URL: &str = "https://webui.heap.chat/";

/// Pause after a failed attempt before the drain continues.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Delay between accepting a message and physically posting it.
pub const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_millis(200);

/// Capacity of the delivery event broadcast.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Where a failed command goes before its next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPlacement {
    /// Move to the tail so later commands are not blocked. Commands can be
    /// delivered out of submission order when retries happen.
    #[default]
    Tail,
    /// Stay at the head and block later commands, for at most `max_stall`
    /// measured from the first failure.
    Head { max_stall: Duration },
}

/// Outbound channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// URL the embedded surface is loaded from; its origin is the only
    /// destination the channel ever posts to.
    pub surface_url: String,

    /// Attempts per command before it is dropped.
    pub max_attempts: u32,

    /// Backoff after a failed attempt.
    pub retry_delay: Duration,

    /// Deferred dispatch delay applied by the widget's scheduled transport.
    pub dispatch_delay: Duration,

    pub retry_placement: RetryPlacement,

    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            surface_url: DEFAULT_SURFACE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            dispatch_delay: DEFAULT_DISPATCH_DELAY,
            retry_placement: RetryPlacement::Tail,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ChannelConfig {
    /// Defaults overridden by `HEAPCHAT_*` environment variables.
    ///
    /// - `HEAPCHAT_SURFACE_URL`
    /// - `HEAPCHAT_MAX_ATTEMPTS`
    /// - `HEAPCHAT_RETRY_DELAY_MS`
    /// - `HEAPCHAT_DISPATCH_DELAY_MS`
    pub fn from_env() -> OutboxResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> OutboxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("HEAPCHAT_SURFACE_URL").filter(|v| !v.trim().is_empty()) {
            config.surface_url = url.trim().to_string();
        }
        if let Some(value) = lookup("HEAPCHAT_MAX_ATTEMPTS") {
            config.max_attempts = parse_number("HEAPCHAT_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("HEAPCHAT_RETRY_DELAY_MS") {
            config.retry_delay =
                Duration::from_millis(parse_number("HEAPCHAT_RETRY_DELAY_MS", &value)?);
        }
        if let Some(value) = lookup("HEAPCHAT_DISPATCH_DELAY_MS") {
            config.dispatch_delay =
                Duration::from_millis(parse_number("HEAPCHAT_DISPATCH_DELAY_MS", &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the channel cannot run with.
    pub fn validate(&self) -> OutboxResult<()> {
        if self.max_attempts == 0 {
            return Err(OutboxError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(OutboxError::Config(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        self.destination_origin()?;
        Ok(())
    }

    /// Pinned destination origin derived from `surface_url`.
    pub fn destination_origin(&self) -> OutboxResult<SurfaceOrigin> {
        SurfaceOrigin::parse(&self.surface_url)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> OutboxResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| OutboxError::Config(format!("{key} must be a non-negative integer, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = ChannelConfig::default();
        assert_eq!(config.surface_url, "https://webui.heap.chat/");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.dispatch_delay, Duration::from_millis(200));
        assert_eq!(config.retry_placement, RetryPlacement::Tail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_destination_origin() {
        let config = ChannelConfig::default();
        assert_eq!(
            config.destination_origin().unwrap().as_str(),
            "https://webui.heap.chat"
        );
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let config = ChannelConfig::from_lookup(lookup_from(&[
            ("HEAPCHAT_SURFACE_URL", "http://localhost:5173/"),
            ("HEAPCHAT_MAX_ATTEMPTS", "5"),
            ("HEAPCHAT_RETRY_DELAY_MS", "250"),
            ("HEAPCHAT_DISPATCH_DELAY_MS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.surface_url, "http://localhost:5173/");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.dispatch_delay, Duration::ZERO);
    }

    #[test]
    fn test_config_from_lookup_empty_uses_defaults() {
        let config = ChannelConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.surface_url, DEFAULT_SURFACE_URL);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_config_from_lookup_rejects_bad_number() {
        let result = ChannelConfig::from_lookup(lookup_from(&[("HEAPCHAT_RETRY_DELAY_MS", "soon")]));
        assert!(matches!(result, Err(OutboxError::Config(msg)) if msg.contains("HEAPCHAT_RETRY_DELAY_MS")));
    }

    #[test]
    fn test_config_rejects_zero_attempts() {
        let config = ChannelConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OutboxError::Config(_))));
    }

    #[test]
    fn test_config_rejects_opaque_surface_url() {
        let config = ChannelConfig {
            surface_url: "about:blank".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
