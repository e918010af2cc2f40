//! Behavioral tests for the outbound channel.
//!
//! - `harness.rs`   - Test channel wired to in-memory surfaces
//! - `ordering.rs`  - Submission order, tail/head retry placement
//! - `readiness.rs` - Ready gating, handshake at head, missing transport
//! - `retry.rs`     - Bounded attempts, backoff timing, exhaustion
//! - `reentry.rs`   - Single drain under concurrent enqueue
//! - `teardown.rs`  - Shutdown abandons the queue and stops retries

mod ordering;
