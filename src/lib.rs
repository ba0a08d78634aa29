//! # mailq
//!
//! A bounded async worker pool paired with a completion mailbox.
//!
//! [`Dispatcher`] executes submitted messages on a fixed set of workers.
//! Finished messages land in a [`Mailbox`], whose optional hook fires on the
//! worker right after each record is visible. Observers wait on that hook
//! (see [`latch::CountdownLatch`]) instead of sleeping or polling.

pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod latch;
pub mod mailbox;
pub mod model;
pub mod telemetry;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use mailbox::Mailbox;
pub use model::{Completion, Message};
