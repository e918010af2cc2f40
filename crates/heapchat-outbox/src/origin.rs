//! Origin pinning for the embedded surface.

use crate::{OutboxError, OutboxResult};
use std::fmt;
use url::Url;

/// Serialized `scheme://host[:port]` origin of the embedded surface.
///
/// Two origins are equal only when their ASCII serializations are equal,
/// so `https://webui.heap.chat` and `https://webui.heap.chat:8443` differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceOrigin(String);

impl SurfaceOrigin {
    /// Derive the origin of a surface URL.
    ///
    /// Opaque origins (`data:`, `file:`, ...) cannot be pinned and are rejected.
    pub fn from_url(url: &Url) -> OutboxResult<Self> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(OutboxError::InvalidOrigin(url.to_string()));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    /// Parse a URL string and derive its origin.
    pub fn parse(input: &str) -> OutboxResult<Self> {
        let url = Url::parse(input)?;
        Self::from_url(&url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
