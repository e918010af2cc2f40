//! Outbound message channel.
//!
//! Commands are queued FIFO and walked by a single drain task. Each attempt
//! either hands the head command to the transport (removing it on acceptance)
//! or fails it: the command is then retried after a fixed backoff until it
//! runs out of attempts and is dropped.
//!
//! ```text
//! enqueue ──> [ c1 | c2 | c3 ] ──drain──> Transport::post(origin, {type, ..})
//!                ^                 |
//!                |__ retry (tail) _|   (or head, see RetryPlacement)
//! ```
//!
//! The queue, the ready flag and the "draining" flag live under one lock so
//! that "queue is empty, stop draining" and "push, start a drain if none is
//! running" can never interleave and strand a command.

use crate::command::{Command, CommandKind, Payload};
use crate::config::{ChannelConfig, RetryPlacement};
use crate::error::TransportError;
use crate::origin::SurfaceOrigin;
use crate::transport::Transport;
use crate::OutboxResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Broadcast stream of delivery outcomes.
pub type DeliveryEvents = broadcast::Receiver<DeliveryEvent>;

/// What happened to one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    /// The transport accepted the command; it left the queue.
    Delivered {
        id: u64,
        kind: CommandKind,
        attempts: u32,
    },
    /// The attempt failed and the command was re-queued.
    Retrying {
        id: u64,
        kind: CommandKind,
        attempt: u32,
        error: TransportError,
    },
    /// The last allowed attempt failed; the command is gone.
    Exhausted {
        id: u64,
        kind: CommandKind,
        attempts: u32,
        error: TransportError,
    },
}

impl DeliveryEvent {
    pub fn id(&self) -> u64 {
        match self {
            Self::Delivered { id, .. } | Self::Retrying { id, .. } | Self::Exhausted { id, .. } => {
                *id
            }
        }
    }

    /// Delivered or exhausted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retrying { .. })
    }
}

/// Handle to the outbound channel. Clones share the same queue.
#[derive(Clone)]
pub struct OutboundChannel {
    shared: Arc<Shared>,
}

struct Shared {
    destination: SurfaceOrigin,
    max_attempts: u32,
    retry_delay: Duration,
    placement: RetryPlacement,
    next_id: AtomicU64,
    events: broadcast::Sender<DeliveryEvent>,
    state: Mutex<ChannelState>,
}

#[derive(Default)]
struct ChannelState {
    queue: VecDeque<Command>,
    ready: bool,
    draining: bool,
    closed: bool,
    transport: Option<Arc<dyn Transport>>,
    drain_task: Option<JoinHandle<()>>,
}

/// How a finished attempt left the queue.
enum Settled {
    Delivered,
    Retrying,
    Exhausted,
    /// The command vanished while the attempt ran (shutdown).
    Gone,
}

impl OutboundChannel {
    /// Create a channel pinned to the origin of `config.surface_url`.
    pub fn new(config: &ChannelConfig) -> OutboxResult<Self> {
        config.validate()?;
        let destination = config.destination_origin()?;
        let (events, _) = broadcast::channel(config.event_buffer);

        Ok(Self {
            shared: Arc::new(Shared {
                destination,
                max_attempts: config.max_attempts,
                retry_delay: config.retry_delay,
                placement: config.retry_placement,
                next_id: AtomicU64::new(1),
                events,
                state: Mutex::new(ChannelState::default()),
            }),
        })
    }

    /// Origin every message is addressed to.
    pub fn destination(&self) -> &SurfaceOrigin {
        &self.shared.destination
    }

    /// Append a command and make sure a drain is running.
    ///
    /// Never blocks and never fails; the returned id matches the ids carried
    /// by [`DeliveryEvent`]s.
    pub fn enqueue(&self, kind: CommandKind, payload: Payload) -> u64 {
        let command = self.shared.new_command(kind, payload);
        let id = command.id;

        let mut state = self.shared.state.lock();
        if state.closed {
            warn!(command_id = id, kind = %command.kind, "Channel shut down, dropping command");
            return id;
        }

        debug!(command_id = id, kind = %command.kind, queued = state.queue.len() + 1, "Enqueued command");
        state.queue.push_back(command);
        Shared::start_drain(&self.shared, &mut state);
        id
    }

    /// Flip the transport to ready. The transition is one-way.
    pub fn mark_ready(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        self.shared.set_ready(&mut state);
        if !state.queue.is_empty() {
            Shared::start_drain(&self.shared, &mut state);
        }
    }

    /// Flip the transport to ready and put a handshake command at the head.
    ///
    /// Everything queued while the surface was loading is delivered after the
    /// handshake.
    pub fn mark_ready_with(&self, kind: CommandKind, payload: Payload) -> u64 {
        let command = self.shared.new_command(kind, payload);
        let id = command.id;

        let mut state = self.shared.state.lock();
        if state.closed {
            warn!(command_id = id, kind = %command.kind, "Channel shut down, dropping handshake");
            return id;
        }

        self.shared.set_ready(&mut state);
        debug!(command_id = id, kind = %command.kind, "Queued handshake at head");
        state.queue.push_front(command);
        Shared::start_drain(&self.shared, &mut state);
        id
    }

    /// Install the transport handle used for delivery.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.transport = Some(transport);
        debug!("Transport attached");
    }

    /// Remove the transport handle; attempts fail as unavailable until a new
    /// one is attached.
    pub fn detach_transport(&self) {
        self.shared.state.lock().transport = None;
        debug!("Transport detached");
    }

    /// Subscribe to delivery outcomes.
    pub fn subscribe(&self) -> DeliveryEvents {
        self.shared.events.subscribe()
    }

    /// Number of commands waiting (including one mid-attempt).
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Kinds currently queued, head first.
    pub fn pending_kinds(&self) -> Vec<CommandKind> {
        self.shared
            .state
            .lock()
            .queue
            .iter()
            .map(|c| c.kind.clone())
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state.lock().ready
    }

    pub fn is_draining(&self) -> bool {
        self.shared.state.lock().draining
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Tear down: stop the drain, drop queued commands, detach the transport.
    ///
    /// Returns how many commands were abandoned. Later calls are no-ops.
    pub fn shutdown(&self) -> usize {
        let mut state = self.shared.state.lock();
        if state.closed {
            return 0;
        }

        state.closed = true;
        state.draining = false;
        state.transport = None;
        if let Some(task) = state.drain_task.take() {
            task.abort();
        }
        let abandoned = state.queue.len();
        state.queue.clear();

        info!(abandoned, "Outbound channel shut down");
        abandoned
    }
}

impl Shared {
    fn new_command(&self, kind: CommandKind, payload: Payload) -> Command {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Command::new(id, kind, payload, self.max_attempts)
    }

    fn set_ready(&self, state: &mut ChannelState) {
        if !state.ready {
            state.ready = true;
            info!(destination = %self.destination, queued = state.queue.len(), "Transport ready");
        }
    }

    /// Spawn the drain task unless one is already walking the queue.
    fn start_drain(this: &Arc<Shared>, state: &mut ChannelState) {
        if state.draining {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                state.draining = true;
                state.drain_task = Some(runtime.spawn(drain(this.clone())));
            }
            Err(_) => {
                warn!(
                    queued = state.queue.len(),
                    "No async runtime, commands stay queued until the next enqueue"
                );
            }
        }
    }

    /// Apply the outcome of one attempt to the command with `id`.
    fn settle(&self, id: u64, outcome: Result<(), TransportError>) -> Settled {
        let mut state = self.state.lock();
        let Some(position) = state.queue.iter().position(|c| c.id == id) else {
            return Settled::Gone;
        };
        let Some(mut command) = state.queue.remove(position) else {
            return Settled::Gone;
        };

        let error = match outcome {
            Ok(()) => {
                let attempts = command.attempt + 1;
                debug!(command_id = id, kind = %command.kind, attempts, "Command delivered");
                self.emit(DeliveryEvent::Delivered {
                    id,
                    kind: command.kind,
                    attempts,
                });
                return Settled::Delivered;
            }
            Err(error) => error,
        };

        command.attempt += 1;
        let now = Instant::now();
        let first_failure = *command.first_failure.get_or_insert(now);

        let stalled = match self.placement {
            RetryPlacement::Tail => false,
            RetryPlacement::Head { max_stall } => now.duration_since(first_failure) >= max_stall,
        };

        if command.is_exhausted() || stalled {
            error!(
                command_id = id,
                kind = %command.kind,
                attempts = command.attempt,
                error = %error,
                "Command failed after max retries, dropping"
            );
            self.emit(DeliveryEvent::Exhausted {
                id,
                kind: command.kind,
                attempts: command.attempt,
                error,
            });
            return Settled::Exhausted;
        }

        warn!(
            command_id = id,
            kind = %command.kind,
            attempt = command.attempt,
            max_attempts = command.max_attempts,
            delay_ms = self.retry_delay.as_millis() as u64,
            error = %error,
            "Send failed, retrying"
        );
        self.emit(DeliveryEvent::Retrying {
            id,
            kind: command.kind.clone(),
            attempt: command.attempt,
            error,
        });

        match self.placement {
            RetryPlacement::Tail => state.queue.push_back(command),
            RetryPlacement::Head { .. } => state.queue.push_front(command),
        }
        Settled::Retrying
    }

    fn emit(&self, event: DeliveryEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// Walk the queue until it is empty.
///
/// The transport is called outside the lock so a transport may enqueue
/// without deadlocking; the outcome is matched back by command id.
async fn drain(shared: Arc<Shared>) {
    debug!("Drain started");

    loop {
        let (id, envelope, route) = {
            let mut state = shared.state.lock();
            let Some(head) = state.queue.front() else {
                state.draining = false;
                state.drain_task = None;
                debug!("Drain finished, queue empty");
                return;
            };

            let route = if !state.ready {
                Err(TransportError::NotReady)
            } else {
                state.transport.clone().ok_or(TransportError::Unavailable)
            };
            (head.id, head.envelope(), route)
        };

        let outcome = route.and_then(|transport| transport.post(&shared.destination, &envelope));

        match shared.settle(id, outcome) {
            Settled::Retrying => tokio::time::sleep(shared.retry_delay).await,
            Settled::Delivered | Settled::Exhausted | Settled::Gone => {}
        }
    }
}
