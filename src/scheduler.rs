//! # Ordered Scheduler
//!
//! A ticket-based turnstile that serializes asynchronous units of work in
//! submission order, without blocking the submitting task.
//!
//! Each submission takes a monotonically increasing ticket, then suspends
//! until `completed_up_to` reaches that ticket. Completion is bumped by a
//! guard on `Drop`, so a failing (or panicking) body can never wedge the
//! queue behind it. This is strict FIFO: a slow early ticket blocks all
//! later ones by design, preserving program-order mutation semantics.
//!
//! Flushing never jumps the completion counter past unresolved waiters.
//! Instead, [`OrderedScheduler::flush`] records a cancellation watermark:
//! every pending ticket still takes its turn, but resolves immediately with
//! [`ResourceError::Cancelled`] instead of running its body, so no caller is
//! left waiting forever.

use crate::error::ResourceError;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, trace};

struct Counters {
    /// Count of tickets ever issued.
    total_issued: u64,
    /// Tickets below this sequence number have finished (or were cancelled).
    completed_up_to: u64,
    /// Tickets below this sequence number resolve as cancelled.
    cancelled_before: u64,
}

struct Shared {
    counters: Mutex<Counters>,
    completed_tx: watch::Sender<u64>,
}

impl Shared {
    /// Marks ticket `seq` as finished and wakes the next waiter.
    fn complete(&self, seq: u64) {
        let mut counters = self.counters.lock().unwrap();
        counters.completed_up_to = seq + 1;
        self.completed_tx.send_replace(counters.completed_up_to);
        trace!(ticket = seq, "ticket completed");
    }
}

/// A turnstile serializer for asynchronous work.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct OrderedScheduler {
    shared: Arc<Shared>,
}

impl Default for OrderedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedScheduler {
    pub fn new() -> Self {
        let (completed_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                counters: Mutex::new(Counters {
                    total_issued: 0,
                    completed_up_to: 0,
                    cancelled_before: 0,
                }),
                completed_tx,
            }),
        }
    }

    /// Takes the next ticket. Synchronous, so ticket order is exactly the
    /// order in which callers reach this point.
    pub fn issue(&self) -> Ticket {
        let mut counters = self.shared.counters.lock().unwrap();
        let seq = counters.total_issued;
        counters.total_issued += 1;
        trace!(ticket = seq, "ticket issued");
        Ticket {
            seq,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs `body` when its turn comes, in submission order.
    ///
    /// The completion counter advances regardless of how `body` exits, so an
    /// error inside the body never blocks later submissions. Returns
    /// [`ResourceError::Cancelled`] if a flush abandoned the ticket before
    /// its turn; the body is then never invoked.
    ///
    /// The returned future must be driven to completion (or to its
    /// cancellation error); dropping it after the ticket is issued would
    /// stall every later ticket.
    pub async fn schedule<F, Fut, O>(&self, body: F) -> Result<O, ResourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = O>,
    {
        let ticket = self.issue();
        let guard = ticket.wait_turn().await?;
        let out = body().await;
        drop(guard);
        Ok(out)
    }

    /// Abandons every pending ticket.
    ///
    /// Pending tickets still resolve, in FIFO order, each returning
    /// [`ResourceError::Cancelled`] from its wait. A body already running
    /// keeps running to completion. Tickets issued after the flush are
    /// unaffected.
    pub fn flush(&self) {
        let mut counters = self.shared.counters.lock().unwrap();
        counters.cancelled_before = counters.total_issued;
        debug!(
            up_to = counters.cancelled_before,
            pending = counters.total_issued - counters.completed_up_to,
            "flushing pending tickets"
        );
    }

    /// Count of tickets ever issued.
    pub fn total_issued(&self) -> u64 {
        self.shared.counters.lock().unwrap().total_issued
    }

    /// Count of tickets that have finished or been cancelled.
    pub fn completed_up_to(&self) -> u64 {
        self.shared.counters.lock().unwrap().completed_up_to
    }
}

/// A position in the queue, taken by [`OrderedScheduler::issue`].
pub struct Ticket {
    seq: u64,
    shared: Arc<Shared>,
}

impl Ticket {
    /// The sequence number of this ticket.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Suspends until this ticket's turn, then either hands out the turn or
    /// resolves the ticket as cancelled.
    ///
    /// A cancelled ticket bumps the completion counter itself, so the queue
    /// keeps draining even when nothing runs.
    pub async fn wait_turn(self) -> Result<TurnGuard, ResourceError> {
        // Subscribe before the first check so a completion racing this call
        // is never missed.
        let mut rx = self.shared.completed_tx.subscribe();
        loop {
            {
                let counters = self.shared.counters.lock().unwrap();
                if counters.completed_up_to == self.seq {
                    let cancelled = self.seq < counters.cancelled_before;
                    drop(counters);
                    if cancelled {
                        self.shared.complete(self.seq);
                        debug!(ticket = self.seq, "ticket cancelled");
                        return Err(ResourceError::Cancelled);
                    }
                    return Ok(TurnGuard {
                        seq: self.seq,
                        shared: Arc::clone(&self.shared),
                    });
                }
            }
            if rx.changed().await.is_err() {
                // Sender lives in `shared`, which this ticket holds.
                unreachable!("scheduler dropped while a ticket was waiting");
            }
        }
    }
}

/// Held while a ticket's body runs. Bumps the completion counter on `Drop`,
/// success, failure, or unwind alike.
pub struct TurnGuard {
    seq: u64,
    shared: Arc<Shared>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.shared.complete(self.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn bodies_run_in_submission_order() {
        let scheduler = OrderedScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (label, delay_ms) in [("a", 100u64), ("b", 1), ("c", 1)] {
            let scheduler = scheduler.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .schedule(|| async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        log.lock().unwrap().push(label);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(scheduler.total_issued(), 3);
        assert_eq!(scheduler.completed_up_to(), 3);
    }

    #[tokio::test]
    async fn failed_body_advances_the_turnstile() {
        let scheduler = OrderedScheduler::new();

        let failed: Result<Result<(), &str>, ResourceError> =
            scheduler.schedule(|| async { Err("body failed") }).await;
        assert_eq!(failed.unwrap(), Err("body failed"));

        // The queue is not wedged: a later ticket still runs.
        let ran = scheduler.schedule(|| async { 7u32 }).await.unwrap();
        assert_eq!(ran, 7);
        assert_eq!(scheduler.completed_up_to(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_resolves_pending_tickets_as_cancelled() {
        let scheduler = OrderedScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for label in ["a", "b", "c"] {
            let scheduler = scheduler.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .schedule(|| async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        log.lock().unwrap().push(label);
                    })
                    .await
            }));
        }
        // Let all three take tickets and park; "a" starts running.
        tokio::task::yield_now().await;
        scheduler.flush();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        // "a" was already running and finished; "b" and "c" were cancelled.
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ResourceError::Cancelled)));
        assert!(matches!(results[2], Err(ResourceError::Cancelled)));
        assert_eq!(*log.lock().unwrap(), vec!["a"]);

        // Every ticket was resolved; nothing hangs.
        assert_eq!(scheduler.completed_up_to(), scheduler.total_issued());
    }

    #[tokio::test]
    async fn tickets_issued_after_a_flush_run_normally() {
        let scheduler = OrderedScheduler::new();
        let first = scheduler.issue();
        let second = scheduler.issue();
        scheduler.flush();

        // Abandoned tickets resolve in FIFO order, each bumping the counter.
        assert!(matches!(
            first.wait_turn().await,
            Err(ResourceError::Cancelled)
        ));
        assert!(matches!(
            second.wait_turn().await,
            Err(ResourceError::Cancelled)
        ));

        let out = scheduler.schedule(|| async { "ran" }).await.unwrap();
        assert_eq!(out, "ran");
        assert_eq!(scheduler.completed_up_to(), scheduler.total_issued());
    }
}
