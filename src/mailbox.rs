//! Completion mailbox: the set of messages workers have finished with.
//!
//! Storage is deduplicated by value, so [`Mailbox::count`] answers "how many
//! distinct messages arrived". [`Mailbox::deliveries`] counts every receipt.
//!
//! A single hook may be installed with [`Mailbox::set_hook`]. It runs on the
//! worker that recorded the completion, after the record is visible, and
//! before `receive`/`fail` returns. Receipts are serialized across the whole
//! record-then-notify sequence, which has two consequences callers must live
//! with:
//!
//! - the hook runs on a tokio runtime thread, so a hook that blocks pins that
//!   thread as well as stalling its worker and every other receipt until it
//!   returns;
//! - a hook that calls `receive` or `fail` on the same mailbox deadlocks.
//!
//! Queries (`contains`, `count`, `deliveries`, `failures`) and `set_hook` are
//! safe to call from inside a hook.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{Completion, Message};

type Hook = Arc<dyn Fn(&Completion) + Send + Sync>;

/// A submission whose execution faulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    pub message: Message,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Default)]
struct Contents {
    received: HashSet<Message>,
    deliveries: u64,
    failures: Vec<FailedDelivery>,
}

/// Thread-safe record of completed messages with a single-slot hook.
#[derive(Default)]
pub struct Mailbox {
    /// Held across record + notify so receipts never interleave.
    receipt: Mutex<()>,
    contents: RwLock<Contents>,
    hook: RwLock<Option<Hook>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` as delivered, then notify the hook.
    pub fn receive(&self, message: Message) {
        let _receipt = self.lock_receipt();

        let first = {
            let mut contents = self.write_contents();
            contents.deliveries += 1;
            contents.received.insert(message.clone())
        };
        debug!(message = %message, first, "mail received");

        self.notify(&Completion::Delivered(message));
    }

    /// Record a failed execution of `message`, then notify the hook.
    ///
    /// Failures never enter the received set.
    pub fn fail(&self, message: Message, reason: impl Into<String>) {
        let reason = reason.into();
        let _receipt = self.lock_receipt();

        self.write_contents().failures.push(FailedDelivery {
            message: message.clone(),
            reason: reason.clone(),
            failed_at: Utc::now(),
        });
        debug!(message = %message, %reason, "mail failed");

        self.notify(&Completion::Failed { message, reason });
    }

    /// Has a message equal to `payload` ever been received?
    pub fn contains(&self, payload: &str) -> bool {
        self.read_contents().received.contains(payload)
    }

    /// Number of distinct messages received.
    pub fn count(&self) -> usize {
        self.read_contents().received.len()
    }

    /// Number of `receive` calls, duplicates included.
    pub fn deliveries(&self) -> u64 {
        self.read_contents().deliveries
    }

    pub fn failures(&self) -> Vec<FailedDelivery> {
        self.read_contents().failures.clone()
    }

    /// Install `hook`, replacing any previous one.
    ///
    /// Only future receipts fire it. A receipt already in progress finishes
    /// with whichever hook it started with.
    pub fn set_hook<F>(&self, hook: F)
    where
        F: Fn(&Completion) + Send + Sync + 'static,
    {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    pub fn clear_hook(&self) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn notify(&self, completion: &Completion) {
        // Snapshot the slot so the hook runs without the slot lock held.
        let hook = self
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(completion);
        }
    }

    // A panicking hook poisons `receipt`; the guarded data is `()` and the
    // contents are updated before the hook runs, so recovering is sound.
    fn lock_receipt(&self) -> MutexGuard<'_, ()> {
        self.receipt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_contents(&self) -> RwLockReadGuard<'_, Contents> {
        self.contents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_contents(&self) -> RwLockWriteGuard<'_, Contents> {
        self.contents.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let contents = self.read_contents();
        f.debug_struct("Mailbox")
            .field("distinct", &contents.received.len())
            .field("deliveries", &contents.deliveries)
            .field("failures", &contents.failures.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn msg(s: &str) -> Message {
        Message::new(s).unwrap()
    }

    #[test]
    fn contains_is_false_until_received_then_stays_true() {
        let mailbox = Mailbox::new();
        assert!(!mailbox.contains("m1"));
        mailbox.receive(msg("m1"));
        assert!(mailbox.contains("m1"));
        mailbox.receive(msg("m2"));
        assert!(mailbox.contains("m1"));
    }

    #[test]
    fn duplicates_do_not_grow_count_but_do_count_deliveries() {
        let mailbox = Mailbox::new();
        mailbox.receive(msg("dup"));
        mailbox.receive(msg("dup"));
        assert_eq!(mailbox.count(), 1);
        assert_eq!(mailbox.deliveries(), 2);
    }

    #[test]
    fn hook_sees_message_already_recorded() {
        let mailbox = Arc::new(Mailbox::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let mb = Arc::downgrade(&mailbox);
        let s = Arc::clone(&seen);
        mailbox.set_hook(move |completion| {
            let mb = mb.upgrade().unwrap();
            assert_eq!(completion.message().as_str(), "m1");
            assert!(mb.contains("m1"));
            s.fetch_add(1, Ordering::SeqCst);
        });

        mailbox.receive(msg("m1"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_fires_once_per_receipt_even_for_duplicates() {
        let mailbox = Mailbox::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        mailbox.set_hook(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        mailbox.receive(msg("x"));
        mailbox.receive(msg("x"));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(mailbox.count(), 1);
    }

    #[test]
    fn set_hook_replaces_previous_and_is_not_retroactive() {
        let mailbox = Mailbox::new();
        mailbox.receive(msg("before"));

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        mailbox.set_hook(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(first.load(Ordering::SeqCst), 0);

        mailbox.receive(msg("a"));
        let s = Arc::clone(&second);
        mailbox.set_hook(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        mailbox.receive(msg("b"));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        mailbox.clear_hook();
        mailbox.receive(msg("c"));
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_may_replace_itself() {
        let mailbox = Arc::new(Mailbox::new());
        let later = Arc::new(AtomicUsize::new(0));

        let mb = Arc::downgrade(&mailbox);
        let l = Arc::clone(&later);
        mailbox.set_hook(move |_| {
            let l = Arc::clone(&l);
            mb.upgrade().unwrap().set_hook(move |_| {
                l.fetch_add(1, Ordering::SeqCst);
            });
        });

        mailbox.receive(msg("one"));
        mailbox.receive(msg("two"));
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_logged_and_tagged_but_not_received() {
        let mailbox = Mailbox::new();
        let failed = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&failed);
        mailbox.set_hook(move |completion| {
            if completion.is_failure() {
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        mailbox.fail(msg("bad"), "smtp down");
        assert!(!mailbox.contains("bad"));
        assert_eq!(mailbox.count(), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);

        let failures = mailbox.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].message.as_str(), "bad");
        assert_eq!(failures[0].reason, "smtp down");
    }

    #[test]
    fn panicking_hook_does_not_wedge_the_mailbox() {
        let mailbox = Arc::new(Mailbox::new());
        mailbox.set_hook(|_| panic!("hook exploded"));

        let mb = Arc::clone(&mailbox);
        let outcome = std::thread::spawn(move || mb.receive(Message::new("p").unwrap())).join();
        assert!(outcome.is_err());

        mailbox.clear_hook();
        mailbox.receive(msg("q"));
        assert!(mailbox.contains("p"));
        assert!(mailbox.contains("q"));
    }

    #[test]
    fn concurrent_receipts_lose_nothing() {
        let mailbox = Arc::new(Mailbox::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        mailbox.set_hook(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let mb = Arc::clone(&mailbox);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        mb.receive(Message::new(format!("t{t}-{i}")).unwrap());
                        mb.receive(Message::new("shared").unwrap());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(mailbox.count(), 8 * 50 + 1);
        assert_eq!(mailbox.deliveries(), 8 * 50 * 2);
        assert_eq!(fired.load(Ordering::SeqCst), 8 * 50 * 2);
    }
}
