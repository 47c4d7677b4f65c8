// ABOUTME: Bounded, non-blocking bridge between a control loop and an isolated worker thread.
// ABOUTME: Overflow abandons the rest of the batch with one notice; draining is exhaustive.

use crate::message::{FromLogEvent, LogEvent, LogLevel};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Control-side end of a relay.
///
/// `Out` travels control → worker, `In` travels worker → control. Both
/// channels share the same capacity.
pub struct Relay<Out, In> {
    name: String,
    to_worker: mpsc::Sender<Out>,
    from_worker: mpsc::Receiver<In>,
    worker_stopped: bool,
}

/// Worker-side end of a relay.
pub struct WorkerSide<Out, In> {
    pub inbox: mpsc::Receiver<Out>,
    pub outbox: mpsc::Sender<In>,
}

/// Largest capacity a relay channel is created with.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Create a relay with both channels bounded to `capacity` items, clamped to
/// `1..=MAX_QUEUE_CAPACITY`.
pub fn relay<Out, In>(name: &str, capacity: usize) -> (Relay<Out, In>, WorkerSide<Out, In>) {
    let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
    let (to_worker, inbox) = mpsc::channel(capacity);
    let (outbox, from_worker) = mpsc::channel(capacity);
    (
        Relay {
            name: name.to_string(),
            to_worker,
            from_worker,
            worker_stopped: false,
        },
        WorkerSide { inbox, outbox },
    )
}

/// Start a worker on its own named OS thread.
pub fn spawn_worker<F>(name: &str, f: F) -> std::io::Result<std::thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new().name(name.to_string()).spawn(f)
}

impl<Out, In: FromLogEvent> Relay<Out, In> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One control-loop tick: enqueue `outbound`, then drain everything the
    /// worker has produced so far.
    pub fn step(&mut self, outbound: Vec<Out>) -> Vec<In> {
        let mut inbound = Vec::new();

        let mut pending = outbound.into_iter();
        while let Some(item) = pending.next() {
            match self.to_worker.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = 1 + pending.len();
                    tracing::warn!(relay = %self.name, dropped, "Queue to worker is full, abandoning batch");
                    metrics::counter!("parley_relay_dropped_total", "relay" => self.name.clone())
                        .increment(dropped as u64);
                    inbound.push(In::from_log_event(LogEvent::new(
                        LogLevel::Error,
                        format!("relay.{}", self.name),
                        format!("Item dropped: queue_to_{} is full.", self.name),
                    )));
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    self.note_stopped(&mut inbound);
                    break;
                }
            }
        }

        loop {
            match self.from_worker.try_recv() {
                Ok(item) => inbound.push(item),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.note_stopped(&mut inbound);
                    break;
                }
            }
        }

        inbound
    }

    /// True once the worker has been observed to have gone away.
    pub fn is_worker_stopped(&self) -> bool {
        self.worker_stopped
    }

    fn note_stopped(&mut self, inbound: &mut Vec<In>) {
        if self.worker_stopped {
            return;
        }
        self.worker_stopped = true;
        tracing::error!(relay = %self.name, "Worker stopped");
        inbound.push(In::from_log_event(LogEvent::new(
            LogLevel::Error,
            format!("relay.{}", self.name),
            format!("Worker {} stopped.", self.name),
        )));
    }
}
