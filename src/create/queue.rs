//! Work tracking and the self-feeding directory scan queue
//!
//! The pipeline drains when every enqueued unit (directory or file) has
//! been fully processed. [`WorkTracker`] counts outstanding units: +1 at
//! enqueue time, -1 on completion, including error paths.
//!
//! [`ScanQueue`] is special because the scanner pool both produces and
//! consumes it: a blocking send from a scanner on a full queue could
//! deadlock the whole pool. Subdirectory sends therefore fall back to a
//! detached sender thread when the queue is full, which makes the
//! configured capacity a soft bound.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Counter of outstanding pipeline units
///
/// The pipeline is quiescent exactly when the count is zero: every unit
/// holds a +1 for its own lifetime and takes +1 for each child it
/// enqueues before releasing its own, so zero cannot be observed while
/// work remains.
#[derive(Debug, Default)]
pub struct WorkTracker {
    pending: Mutex<u64>,
    idle: Condvar,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `n` new units of outstanding work
    pub fn add(&self, n: u64) {
        let mut pending = self.pending.lock().expect("work tracker poisoned");
        *pending += n;
    }

    /// Release one unit of outstanding work
    pub fn done(&self) {
        let mut pending = self.pending.lock().expect("work tracker poisoned");
        debug_assert!(*pending > 0, "work tracker underflow");
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    /// Current number of outstanding units
    pub fn pending(&self) -> u64 {
        *self.pending.lock().expect("work tracker poisoned")
    }

    /// Wait up to `timeout` for the count to reach zero
    ///
    /// Returns `true` if the tracker is idle. Callers loop on this so they
    /// can interleave shutdown checks between waits.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().expect("work tracker poisoned");
        let (pending, _) = self
            .idle
            .wait_timeout_while(pending, timeout, |p| *p > 0)
            .expect("work tracker poisoned");
        *pending == 0
    }
}

/// Bounded queue of directory paths, consumed and fed by the scanner pool
pub struct ScanQueue {
    sender: Sender<String>,
    receiver: Receiver<String>,
}

impl ScanQueue {
    /// Create a new scan queue with the given (soft) capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Get a handle for one worker (or for seeding)
    pub fn handle(&self) -> ScanQueueHandle {
        ScanQueueHandle {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

/// Per-worker handle on the scan queue
#[derive(Clone)]
pub struct ScanQueueHandle {
    sender: Sender<String>,
    receiver: Receiver<String>,
}

impl ScanQueueHandle {
    /// Blocking send, used for seeding before the pool starts
    pub fn push(&self, path: String) -> bool {
        self.sender.send(path).is_ok()
    }

    /// Deadlock-safe send from within a scanner
    ///
    /// Scanners consume this queue, so they must never block on it. When
    /// the queue is full the send moves to a detached thread; the path is
    /// small and the work tracker already accounts for it, so the handoff
    /// needs no further coordination.
    pub fn push_detached(&self, path: String) {
        match self.sender.try_send(path) {
            Ok(()) => {}
            Err(TrySendError::Full(path)) => {
                let sender = self.sender.clone();
                thread::spawn(move || {
                    let _ = sender.send(path);
                });
            }
            // Receivers are gone only during teardown; the path is moot.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Receive with timeout so workers can observe the shutdown flag
    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tracker_idle_when_empty() {
        let tracker = WorkTracker::new();
        assert!(tracker.wait_idle(Duration::from_millis(1)));

        tracker.add(2);
        assert_eq!(tracker.pending(), 2);
        assert!(!tracker.wait_idle(Duration::from_millis(1)));

        tracker.done();
        tracker.done();
        assert!(tracker.wait_idle(Duration::from_millis(1)));
    }

    #[test]
    fn test_tracker_wakes_waiter() {
        let tracker = Arc::new(WorkTracker::new());
        tracker.add(1);

        let tracker_clone = Arc::clone(&tracker);
        let handle = thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tracker_clone.done();
        });

        assert!(tracker.wait_idle(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_push_detached_survives_full_queue() {
        let queue = ScanQueue::new(1);
        let handle = queue.handle();

        handle.push_detached("a".into());
        handle.push_detached("b".into());
        handle.push_detached("c".into());

        // All three paths must come through despite capacity 1.
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(handle.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        seen.sort();
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[test]
    fn test_recv_timeout_on_empty_queue() {
        let queue = ScanQueue::new(4);
        let handle = queue.handle();
        assert_eq!(handle.recv_timeout(Duration::from_millis(1)), None);
    }
}
