//! Fixed-size worker pool that executes messages off the caller's task.
//!
//! `submit` validates the payload and pushes it onto a bounded queue; it
//! never waits. A full queue is rejected with [`Error::QueueFull`]. Workers
//! take messages in FIFO order, but per-message execution time varies, so
//! completion order is unspecified. The only way to learn about completion is
//! the [`Mailbox`] the dispatcher was built with.
//!
//! Shutdown is graceful: [`Dispatcher::shutdown`] stops intake and waits until
//! every accepted message has been executed.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::mailbox::Mailbox;
use crate::model::{Message, State};
use crate::telemetry::delivery::{record_state_transition, start_delivery_span};
use crate::telemetry::metrics;
use crate::transport::{SimulatedLatency, Transport};

type Queue = Arc<Mutex<mpsc::Receiver<Message>>>;

/// Handle to a running worker pool.
///
/// Workers are spawned on the ambient tokio runtime; constructing one
/// outside a runtime is a config error. Dropping it without calling
/// [`shutdown`](Self::shutdown) still lets the workers drain the queue, but
/// nobody waits for them.
pub struct Dispatcher {
    tx: mpsc::Sender<Message>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl Dispatcher {
    /// Pool using [`SimulatedLatency`] with the configured delay.
    pub fn new(config: DispatcherConfig, mailbox: Arc<Mailbox>) -> Result<Self> {
        let transport = SimulatedLatency::new(config.latency());
        Self::with_transport(config, mailbox, transport)
    }

    /// Pool executing each message through `transport`.
    pub fn with_transport<T: Transport>(
        config: DispatcherConfig,
        mailbox: Arc<Mailbox>,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("dispatcher needs a tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let queue: Queue = Arc::new(Mutex::new(rx));
        let transport = Arc::new(transport);

        let workers = (0..config.workers)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let transport = Arc::clone(&transport);
                let mailbox = Arc::clone(&mailbox);
                runtime.spawn(worker_loop(worker_id, queue, transport, mailbox))
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "dispatcher started"
        );

        Ok(Self {
            tx,
            workers,
            capacity: config.queue_capacity,
        })
    }

    /// Queue `payload` for execution and return immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPayload`] if the payload is blank.
    /// - [`Error::QueueFull`] if `queue_capacity` messages are already waiting.
    /// - [`Error::Closed`] if every worker has exited.
    pub fn submit(&self, payload: impl Into<String>) -> Result<()> {
        let counter = metrics::messages_submitted();

        let message = match Message::new(payload) {
            Ok(message) => message,
            Err(e) => {
                counter.add(1, &[KeyValue::new("result", "invalid")]);
                return Err(e);
            }
        };

        match self.tx.try_send(message) {
            Ok(()) => {
                counter.add(1, &[KeyValue::new("result", "accepted")]);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(message)) => {
                counter.add(1, &[KeyValue::new("result", "queue_full")]);
                warn!(
                    message = %message,
                    capacity = self.capacity,
                    "submission rejected, queue full"
                );
                Err(Error::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counter.add(1, &[KeyValue::new("result", "closed")]);
                Err(Error::Closed)
            }
        }
    }

    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Messages accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Stop accepting work and wait for the backlog to drain.
    pub async fn shutdown(self) {
        let Self { tx, workers, .. } = self;
        drop(tx);

        info!(workers = workers.len(), "dispatcher draining");
        for worker in workers {
            if let Err(e) = worker.await {
                error!("worker task ended abnormally: {e}");
            }
        }
        info!("dispatcher stopped");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers.len())
            .field("capacity", &self.capacity)
            .field("queued", &self.queued())
            .finish()
    }
}

async fn worker_loop<T: Transport>(
    worker_id: usize,
    queue: Queue,
    transport: Arc<T>,
    mailbox: Arc<Mailbox>,
) {
    debug!(worker_id, "worker started");
    loop {
        // Idle workers wait on the lock in arrival order; the holder waits on
        // the channel. Either way each message goes to exactly one worker.
        let next = queue.lock().await.recv().await;
        let Some(message) = next else {
            break;
        };
        execute(worker_id, &transport, &mailbox, message).await;
    }
    debug!(worker_id, "worker exiting, queue closed");
}

/// Run one message to a terminal state. Never panics, never returns an error.
async fn execute<T: Transport>(
    worker_id: usize,
    transport: &Arc<T>,
    mailbox: &Mailbox,
    message: Message,
) {
    let span = start_delivery_span(worker_id, &message);

    async {
        record_state_transition(&span, State::Submitted, State::Executing);
        let started = Instant::now();

        // Run the transport in its own task so a panic stays contained.
        let delivery = {
            let transport = Arc::clone(transport);
            let message = message.clone();
            tokio::spawn(async move { transport.deliver(&message).await }.in_current_span())
        };
        let outcome = match delivery.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) if e.is_panic() => Err(format!(
                "transport panicked: {}",
                panic_reason(e.into_panic())
            )),
            Err(e) => Err(format!("transport task aborted: {e}")),
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::execution_duration_ms().record(elapsed_ms, &[]);

        let state = match outcome {
            Ok(()) => {
                record_state_transition(&span, State::Executing, State::Completed);
                debug!(elapsed_ms, "delivered");
                notify_mailbox(|| mailbox.receive(message));
                State::Completed
            }
            Err(reason) => {
                record_state_transition(&span, State::Executing, State::Failed);
                warn!(%reason, elapsed_ms, "delivery failed");
                notify_mailbox(|| mailbox.fail(message, reason));
                State::Failed
            }
        };

        metrics::messages_finished().add(1, &[KeyValue::new("outcome", state.to_string())]);
    }
    .instrument(span.clone())
    .await
}

/// The mailbox hook is caller code; a panic in it must not take the worker down.
fn notify_mailbox(record: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(record)) {
        error!(reason = %panic_reason(panic), "mailbox hook panicked");
    }
}

fn panic_reason(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
