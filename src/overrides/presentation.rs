//! Fire-and-forget hand-off to the presentation role
//!
//! The simulation thread schedules callbacks through a [`PresentationHandle`]
//! (an unbounded send, never blocks); the presentation role runs them from a
//! [`PresentationQueue`], either as a tokio task or by pumping it manually.
//! Delivery latency is unbounded, delivery itself is guaranteed while the
//! queue is alive.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Callback executed on the presentation role
pub type PresentationTask = Box<dyn FnOnce() + Send + 'static>;

/// Sending side, cheap to clone and safe to use from any thread
#[derive(Clone)]
pub struct PresentationHandle {
    tx: mpsc::UnboundedSender<PresentationTask>,
}

impl PresentationHandle {
    /// Queue a callback; returns false if the presentation role is gone
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) -> bool {
        if self.tx.send(Box::new(task)).is_err() {
            trace!("Presentation queue closed, dropping callback");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side, owned by the presentation role
pub struct PresentationQueue {
    rx: mpsc::UnboundedReceiver<PresentationTask>,
}

impl PresentationQueue {
    pub fn new() -> (PresentationHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PresentationHandle { tx }, Self { rx })
    }

    /// Run every callback queued so far, returning how many ran
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Run callbacks until every handle has been dropped
    pub async fn run(mut self) {
        debug!("Presentation queue started");
        while let Some(task) = self.rx.recv().await {
            task();
        }
        debug!("Presentation queue stopped");
    }

    /// Run the queue as a tokio task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_drain_runs_in_order() {
        let (handle, mut queue) = PresentationQueue::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            assert!(handle.schedule(move || seen.lock().push(i)));
        }
        assert_eq!(queue.drain(), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_schedule_after_queue_dropped() {
        let (handle, queue) = PresentationQueue::new();
        drop(queue);
        assert!(handle.is_closed());
        assert!(!handle.schedule(|| {}));
    }

    #[tokio::test]
    async fn test_spawned_queue_runs_cross_thread_tasks() {
        let (handle, queue) = PresentationQueue::new();
        let task = queue.spawn();
        let count = Arc::new(AtomicUsize::new(0));

        let sender = {
            let count = count.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let count = count.clone();
                    handle.schedule(move || {
                        count.fetch_add(1, Ordering::Relaxed);
                    });
                }
            })
        };
        sender.join().unwrap();

        // All handles dropped with the thread, so the task finishes
        task.await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 100);
    }
}
