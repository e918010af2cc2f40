//! One-way transports into the embedded surface.

use crate::command::Envelope;
use crate::error::TransportError;
use crate::origin::SurfaceOrigin;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fire-and-forget send primitive into the embedded surface.
///
/// `Ok(())` means the transport accepted the message, not that the remote
/// side received or processed it. Implementations must reject a
/// `destination` that differs from the surface's actual origin.
pub trait Transport: Send + Sync {
    fn post(&self, destination: &SurfaceOrigin, envelope: &Envelope) -> Result<(), TransportError>;
}

/// Shared check used by transports that know their surface origin.
pub fn check_origin(expected: &SurfaceOrigin, actual: &SurfaceOrigin) -> Result<(), TransportError> {
    if expected == actual {
        Ok(())
    } else {
        Err(TransportError::OriginMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// In-memory surface for tests, simulators and headless hosts.
///
/// Records every accepted envelope and can be told to reject upcoming posts.
pub struct MemoryTransport {
    origin: SurfaceOrigin,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    received: Vec<Envelope>,
    attempts: usize,
    reject_next: usize,
    scripted: VecDeque<TransportError>,
    rejecting: bool,
    closed: bool,
}

impl MemoryTransport {
    /// Create a surface that lives at `origin`.
    pub fn new(origin: SurfaceOrigin) -> Self {
        Self {
            origin,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn origin(&self) -> &SurfaceOrigin {
        &self.origin
    }

    /// Reject the next `count` posts that pass the origin check.
    pub fn reject_next(&self, count: usize) {
        self.state.lock().reject_next += count;
    }

    /// Fail the next post with a specific error. Takes precedence over
    /// `reject_next`.
    pub fn fail_next_with(&self, error: TransportError) {
        self.state.lock().scripted.push_back(error);
    }

    /// Reject every post until turned off again.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.state.lock().rejecting = rejecting;
    }

    /// Stop accepting anything.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Envelopes accepted so far, in acceptance order.
    pub fn received(&self) -> Vec<Envelope> {
        self.state.lock().received.clone()
    }

    /// Kinds of the accepted envelopes, in acceptance order.
    pub fn received_kinds(&self) -> Vec<String> {
        self.state
            .lock()
            .received
            .iter()
            .filter_map(|e| e.kind().map(str::to_string))
            .collect()
    }

    pub fn received_count(&self) -> usize {
        self.state.lock().received.len()
    }

    /// Every call to `post`, accepted or not.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().attempts
    }
}

impl Transport for MemoryTransport {
    fn post(&self, destination: &SurfaceOrigin, envelope: &Envelope) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if state.closed {
            return Err(TransportError::Closed);
        }
        check_origin(destination, &self.origin)?;
        if let Some(error) = state.scripted.pop_front() {
            return Err(error);
        }
        if state.rejecting {
            return Err(TransportError::Rejected("surface rejecting".to_string()));
        }
        if state.reject_next > 0 {
            state.reject_next -= 1;
            return Err(TransportError::Rejected("scripted rejection".to_string()));
        }

        state.received.push(envelope.clone());
        Ok(())
    }
}

/// Accepts synchronously, posts to the inner transport after a fixed delay.
///
/// The origin check runs at acceptance time so a mismatch is still seen by
/// the channel as a failed attempt. Accepted envelopes are handed to one
/// dispatcher task that posts them in acceptance order, each `delay` after
/// it was accepted. Errors from the deferred post are only logged; nothing
/// correlates them back to the command.
///
/// The dispatcher is started on the first deferred post and aborted when
/// the transport is dropped; envelopes still waiting are lost.
pub struct ScheduledTransport {
    inner: Arc<dyn Transport>,
    surface_origin: SurfaceOrigin,
    delay: Duration,
    dispatcher: Mutex<Option<Dispatcher>>,
}

struct Dispatcher {
    tx: mpsc::UnboundedSender<Scheduled>,
    task: JoinHandle<()>,
}

struct Scheduled {
    accepted_at: Instant,
    destination: SurfaceOrigin,
    envelope: Envelope,
}

impl ScheduledTransport {
    pub fn new(inner: Arc<dyn Transport>, surface_origin: SurfaceOrigin, delay: Duration) -> Self {
        Self {
            inner,
            surface_origin,
            delay,
            dispatcher: Mutex::new(None),
        }
    }

    fn schedule(&self, scheduled: Scheduled) -> Result<(), TransportError> {
        let mut dispatcher = self.dispatcher.lock();

        if dispatcher.is_none() {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                TransportError::Rejected("no async runtime to schedule send".to_string())
            })?;
            let (tx, rx) = mpsc::unbounded_channel();
            let task = runtime.spawn(dispatch(self.inner.clone(), self.delay, rx));
            *dispatcher = Some(Dispatcher { tx, task });
        }

        match dispatcher.as_ref() {
            Some(d) => d.tx.send(scheduled).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }
}

impl Transport for ScheduledTransport {
    fn post(&self, destination: &SurfaceOrigin, envelope: &Envelope) -> Result<(), TransportError> {
        check_origin(destination, &self.surface_origin)?;

        if self.delay.is_zero() {
            return self.inner.post(destination, envelope);
        }

        self.schedule(Scheduled {
            accepted_at: Instant::now(),
            destination: destination.clone(),
            envelope: envelope.clone(),
        })
    }
}

impl Drop for ScheduledTransport {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.task.abort();
        }
    }
}

/// Post scheduled envelopes strictly in acceptance order.
async fn dispatch(
    inner: Arc<dyn Transport>,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<Scheduled>,
) {
    while let Some(scheduled) = rx.recv().await {
        tokio::time::sleep_until(scheduled.accepted_at + delay).await;

        let kind = scheduled.envelope.kind();
        match inner.post(&scheduled.destination, &scheduled.envelope) {
            Ok(()) => debug!(kind = ?kind, "Deferred send posted"),
            Err(e) => warn!(
                kind = ?kind,
                error = %e,
                "Deferred send failed after acceptance"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, Payload};

    fn origin(url: &str) -> SurfaceOrigin {
        SurfaceOrigin::parse(url).unwrap()
    }

    fn logout() -> Envelope {
        Envelope::new(&CommandKind::Logout, &Payload::new())
    }

    #[test]
    fn test_memory_transport_records_accepted() {
        let transport = MemoryTransport::new(origin("https://webui.heap.chat/"));
        transport
            .post(&origin("https://webui.heap.chat"), &logout())
            .unwrap();

        assert_eq!(transport.received_kinds(), vec!["LOGOUT"]);
        assert_eq!(transport.attempt_count(), 1);
    }

    #[test]
    fn test_memory_transport_pins_origin() {
        let transport = MemoryTransport::new(origin("https://webui.heap.chat/"));
        let result = transport.post(&origin("https://evil.example/"), &logout());

        assert_eq!(
            result,
            Err(TransportError::OriginMismatch {
                expected: "https://evil.example".to_string(),
                actual: "https://webui.heap.chat".to_string(),
            })
        );
        assert_eq!(transport.received_count(), 0);
        assert_eq!(transport.attempt_count(), 1);
    }

    #[test]
    fn test_memory_transport_reject_next() {
        let transport = MemoryTransport::new(origin("https://webui.heap.chat/"));
        let dest = origin("https://webui.heap.chat/");
        transport.reject_next(2);

        assert!(transport.post(&dest, &logout()).is_err());
        assert!(transport.post(&dest, &logout()).is_err());
        assert!(transport.post(&dest, &logout()).is_ok());
        assert_eq!(transport.received_count(), 1);
        assert_eq!(transport.attempt_count(), 3);
    }

    #[test]
    fn test_memory_transport_scripted_error_first() {
        let transport = MemoryTransport::new(origin("https://webui.heap.chat/"));
        let dest = origin("https://webui.heap.chat/");
        transport.fail_next_with(TransportError::Unavailable);

        assert_eq!(transport.post(&dest, &logout()), Err(TransportError::Unavailable));
        assert!(transport.post(&dest, &logout()).is_ok());
    }

    #[test]
    fn test_memory_transport_closed() {
        let transport = MemoryTransport::new(origin("https://webui.heap.chat/"));
        transport.close();
        assert_eq!(
            transport.post(&origin("https://webui.heap.chat/"), &logout()),
            Err(TransportError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_transport_defers_post() {
        let memory = Arc::new(MemoryTransport::new(origin("https://webui.heap.chat/")));
        let scheduled = ScheduledTransport::new(
            memory.clone(),
            origin("https://webui.heap.chat/"),
            Duration::from_millis(200),
        );

        scheduled
            .post(&origin("https://webui.heap.chat/"), &logout())
            .unwrap();
        assert_eq!(memory.received_count(), 0);

        tokio::time::sleep(Duration::from_millis(199)).await;
        assert_eq!(memory.received_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(memory.received_kinds(), vec!["LOGOUT"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scheduled_transport_posts_in_acceptance_order() {
        let memory = Arc::new(MemoryTransport::new(origin("https://webui.heap.chat/")));
        let scheduled = ScheduledTransport::new(
            memory.clone(),
            origin("https://webui.heap.chat/"),
            Duration::from_millis(20),
        );
        let dest = origin("https://webui.heap.chat/");

        for seq in 0..20u64 {
            let mut payload = Payload::new();
            payload.insert("seq".to_string(), seq.into());
            let envelope = Envelope::new(&CommandKind::Custom("PING".to_string()), &payload);
            scheduled.post(&dest, &envelope).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while memory.received_count() < 20 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let order: Vec<u64> = memory
            .received()
            .iter()
            .filter_map(|envelope| envelope.get("seq").and_then(|v| v.as_u64()))
            .collect();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_transport_drop_cancels_pending_posts() {
        let memory = Arc::new(MemoryTransport::new(origin("https://webui.heap.chat/")));
        let scheduled = ScheduledTransport::new(
            memory.clone(),
            origin("https://webui.heap.chat/"),
            Duration::from_millis(200),
        );

        scheduled
            .post(&origin("https://webui.heap.chat/"), &logout())
            .unwrap();
        drop(scheduled);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(memory.attempt_count(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_transport_rejects_mismatch_synchronously() {
        let memory = Arc::new(MemoryTransport::new(origin("https://webui.heap.chat/")));
        let scheduled = ScheduledTransport::new(
            memory.clone(),
            origin("https://webui.heap.chat/"),
            Duration::from_millis(200),
        );

        let result = scheduled.post(&origin("https://other.example/"), &logout());
        assert!(matches!(result, Err(TransportError::OriginMismatch { .. })));
        assert_eq!(memory.attempt_count(), 0);
    }

    #[test]
    fn test_scheduled_transport_zero_delay_posts_inline() {
        let memory = Arc::new(MemoryTransport::new(origin("https://webui.heap.chat/")));
        let scheduled = ScheduledTransport::new(
            memory.clone(),
            origin("https://webui.heap.chat/"),
            Duration::ZERO,
        );

        scheduled
            .post(&origin("https://webui.heap.chat/"), &logout())
            .unwrap();
        assert_eq!(memory.received_count(), 1);
    }

    #[test]
    fn test_scheduled_transport_without_runtime_rejects() {
        let memory = Arc::new(MemoryTransport::new(origin("https://webui.heap.chat/")));
        let scheduled = ScheduledTransport::new(
            memory,
            origin("https://webui.heap.chat/"),
            Duration::from_millis(200),
        );

        let result = scheduled.post(&origin("https://webui.heap.chat/"), &logout());
        assert!(matches!(result, Err(TransportError::Rejected(_))));
    }
}
