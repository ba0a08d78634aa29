//! The execution step a worker runs for each message.
//!
//! The dispatcher is generic over [`Transport`] so tests and callers can plug
//! in their own delivery logic. [`SimulatedLatency`] is the default: it waits
//! a fixed, bounded amount of time to stand in for real I/O.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::model::Message;

/// Delivers one message. Errors and panics are contained by the worker and
/// recorded as failed deliveries.
pub trait Transport: Send + Sync + 'static {
    fn deliver(&self, message: &Message) -> impl Future<Output = Result<()>> + Send;
}

/// Sleeps for `latency`, then succeeds.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedLatency {
    pub latency: Duration,
}

impl SimulatedLatency {
    pub const DEFAULT_LATENCY: Duration = Duration::from_micros(500);

    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedLatency {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LATENCY)
    }
}

impl Transport for SimulatedLatency {
    async fn deliver(&self, _message: &Message) -> Result<()> {
        tokio::time::sleep(self.latency).await;
        Ok(())
    }
}
