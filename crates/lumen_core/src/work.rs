//! Deferred work executor.
//!
//! Pulse handlers run in a context that must never block: they may flip
//! atomics and enqueue work, nothing else. The [`WorkQueue`] gives them a
//! fire-and-forget surface with the semantics the timing code is built on:
//!
//! - at most one pending invocation per job between enqueues
//! - synchronous cancellation that also waits out a running invocation
//! - a flush barrier so tests and shutdown can drain the queue
//!
//! Jobs are registered up front through [`WorkQueueBuilder`] and addressed
//! by [`JobId`] afterwards; the hot-path `schedule` call is a mutex flip
//! plus a non-blocking channel send.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// Handle to a job registered on a [`WorkQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobId(usize);

enum Msg {
    Run(usize),
    Barrier(Arc<(Mutex<bool>, Condvar)>),
}

#[derive(Default)]
struct SlotState {
    /// An enqueue is outstanding, not yet picked up.
    pending: bool,
    /// The worker is inside the body.
    running: bool,
}

struct JobSlot {
    name: &'static str,
    state: Mutex<SlotState>,
    done: Condvar,
    runs: AtomicU64,
    body: Box<dyn Fn() + Send + Sync>,
}

/// Registers jobs before the worker thread starts.
pub struct WorkQueueBuilder {
    name: String,
    slots: Vec<JobSlot>,
}

impl WorkQueueBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
        }
    }

    /// Register a job body; the returned id addresses it on the running
    /// queue.
    pub fn job<F>(&mut self, name: &'static str, body: F) -> JobId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.slots.push(JobSlot {
            name,
            state: Mutex::new(SlotState::default()),
            done: Condvar::new(),
            runs: AtomicU64::new(0),
            body: Box::new(body),
        });
        JobId(self.slots.len() - 1)
    }

    /// Spawn the worker thread and hand back the queue.
    pub fn start(self) -> WorkQueue {
        // Run messages are bounded by the job count through the pending
        // flag; the slack covers flush barriers.
        let (tx, rx) = bounded(self.slots.len() + 8);
        let slots = Arc::new(self.slots);
        let worker_slots = Arc::clone(&slots);

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker_loop(worker_slots, rx))
            .expect("Failed to start work queue thread");
        let worker_thread = handle.thread().id();

        log::debug!("work queue '{}' started with {} jobs", self.name, slots.len());

        WorkQueue {
            slots,
            tx: Some(tx),
            handle: Some(handle),
            worker_thread,
        }
    }
}

/// Single-thread deferred-work executor.
pub struct WorkQueue {
    slots: Arc<Vec<JobSlot>>,
    tx: Option<Sender<Msg>>,
    handle: Option<JoinHandle<()>>,
    worker_thread: ThreadId,
}

impl WorkQueue {
    /// Enqueue a job unless an invocation is already pending. Returns true
    /// when this call enqueued it. Never blocks.
    pub fn schedule(&self, id: JobId) -> bool {
        let slot = &self.slots[id.0];
        {
            let mut st = slot.state.lock();
            if st.pending {
                return false;
            }
            st.pending = true;
        }

        let Some(tx) = &self.tx else {
            slot.state.lock().pending = false;
            return false;
        };
        if tx.try_send(Msg::Run(id.0)).is_err() {
            slot.state.lock().pending = false;
            log::error!("work queue saturated, dropped '{}'", slot.name);
            return false;
        }
        true
    }

    /// Drop a pending invocation and wait out a running one. After this
    /// returns the job does not run again until re-scheduled.
    ///
    /// Must not be called from the worker thread itself.
    pub fn cancel_sync(&self, id: JobId) {
        let slot = &self.slots[id.0];
        let mut st = slot.state.lock();
        st.pending = false;
        while st.running {
            slot.done.wait(&mut st);
        }
    }

    /// True while an enqueued invocation has not started.
    pub fn is_scheduled(&self, id: JobId) -> bool {
        self.slots[id.0].state.lock().pending
    }

    /// Completed invocations of a job.
    pub fn runs(&self, id: JobId) -> u64 {
        self.slots[id.0].runs.load(Ordering::Acquire)
    }

    /// Block until everything enqueued before this call has run.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        if tx.send(Msg::Barrier(Arc::clone(&gate))).is_err() {
            return;
        }
        let (lock, cond) = &*gate;
        let mut passed = lock.lock();
        while !*passed {
            cond.wait(&mut passed);
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            // A job body can hold the last strong reference to its owner;
            // dropping from the worker itself would self-join.
            if thread::current().id() != self.worker_thread {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(slots: Arc<Vec<JobSlot>>, rx: Receiver<Msg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            Msg::Run(idx) => {
                let slot = &slots[idx];
                {
                    let mut st = slot.state.lock();
                    if !st.pending {
                        // Cancelled while queued.
                        continue;
                    }
                    st.pending = false;
                    st.running = true;
                }

                (slot.body)();

                slot.runs.fetch_add(1, Ordering::Release);
                let mut st = slot.state.lock();
                st.running = false;
                drop(st);
                slot.done.notify_all();
            }
            Msg::Barrier(gate) => {
                let (lock, cond) = &*gate;
                *lock.lock() = true;
                cond.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn queue_with_counter() -> (WorkQueue, JobId, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let mut builder = WorkQueueBuilder::new("test-queue");
        let h = Arc::clone(&hits);
        let id = builder.job("count", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (builder.start(), id, hits)
    }

    #[test]
    fn test_schedule_runs_job() {
        let (queue, id, hits) = queue_with_counter();
        assert!(queue.schedule(id));
        queue.flush();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(queue.runs(id), 1);
    }

    #[test]
    fn test_at_most_one_pending() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let hits = Arc::new(AtomicU32::new(0));

        let mut builder = WorkQueueBuilder::new("test-queue");
        let g = Arc::clone(&gate);
        let h = Arc::clone(&hits);
        let slow = builder.job("slow", move || {
            let (lock, cond) = &*g;
            let mut open = lock.lock();
            while !*open {
                cond.wait(&mut open);
            }
            h.fetch_add(1, Ordering::SeqCst);
        });
        let queue = builder.start();

        // First enqueue starts running and parks on the gate; the next
        // enqueue is pending; everything after collapses into it.
        assert!(queue.schedule(slow));
        std::thread::sleep(Duration::from_millis(20));
        assert!(queue.schedule(slow));
        assert!(!queue.schedule(slow));
        assert!(!queue.schedule(slow));

        let (lock, cond) = &*gate;
        *lock.lock() = true;
        cond.notify_all();

        queue.flush();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_before_run() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let hits = Arc::new(AtomicU32::new(0));

        let mut builder = WorkQueueBuilder::new("test-queue");
        let g = Arc::clone(&gate);
        let slow = builder.job("slow", move || {
            let (lock, cond) = &*g;
            let mut open = lock.lock();
            while !*open {
                cond.wait(&mut open);
            }
        });
        let h = Arc::clone(&hits);
        let counted = builder.job("count", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let queue = builder.start();

        // Park the worker, queue the counted job, then cancel it before
        // the worker can reach it.
        queue.schedule(slow);
        std::thread::sleep(Duration::from_millis(20));
        queue.schedule(counted);
        assert!(queue.is_scheduled(counted));
        queue.cancel_sync(counted);
        assert!(!queue.is_scheduled(counted));

        let (lock, cond) = &*gate;
        *lock.lock() = true;
        cond.notify_all();

        queue.flush();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_waits_for_running() {
        let hits = Arc::new(AtomicU32::new(0));

        let mut builder = WorkQueueBuilder::new("test-queue");
        let h = Arc::clone(&hits);
        let slow = builder.job("slow", move || {
            std::thread::sleep(Duration::from_millis(50));
            h.fetch_add(1, Ordering::SeqCst);
        });
        let queue = builder.start();

        queue.schedule(slow);
        std::thread::sleep(Duration::from_millis(10));
        queue.cancel_sync(slow);

        // cancel_sync returned, so the running invocation finished.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reschedule_after_run() {
        let (queue, id, hits) = queue_with_counter();

        for _ in 0..3 {
            assert!(queue.schedule(id));
            queue.flush();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_flush_on_empty_queue() {
        let (queue, _id, _hits) = queue_with_counter();
        queue.flush();
    }
}
