//! Serialized ("main") context.
//!
//! Pooled work runs on the tokio runtime; its result comes back as a job on a
//! crossbeam channel, and jobs only run when the owner of the target drains
//! the channel. State mutation therefore never races:
//!
//! ```text
//!  main context                          tokio pool
//!  ────────────                          ──────────
//!  run_on_pool(work, cont) ───spawn───►  work.await
//!                                          │
//!  drain / pump_until_settled ◄──job───  send(cont(output))
//!     cont(&mut target, output)
//! ```

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::warn;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// Continuation applied to the target on the main context
pub type Job<T> = Box<dyn FnOnce(&mut T) + Send>;

pub struct MainExecutor<T> {
    runtime: Handle,
    sender: Sender<Job<T>>,
    receiver: Receiver<Job<T>>,
    /// Jobs posted or pooled tasks spawned that have not run on the main context yet
    in_flight: Arc<AtomicUsize>,
}

impl<T> Clone for MainExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T: 'static> MainExecutor<T> {
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        let (sender, receiver) = unbounded();
        Self { runtime, sender, receiver, in_flight: Arc::new(AtomicUsize::new(0)) }
    }

    /// Runtime used for pooled work
    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Queue `job` for the next drain
    pub fn post(&self, job: impl FnOnce(&mut T) + Send + 'static) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        send(&self.sender, &self.in_flight, Box::new(job));
    }

    /// Await `work` on the pool, then apply `continuation` on the main context
    pub fn run_on_pool<F, C>(&self, work: F, continuation: C)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        C: FnOnce(&mut T, F::Output) + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let sender = self.sender.clone();
        let in_flight = Arc::clone(&self.in_flight);
        self.runtime.spawn(async move {
            let output = work.await;
            send(&sender, &in_flight, Box::new(move |target: &mut T| continuation(target, output)));
        });
    }

    /// Number of continuations still owed to the main context
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run every queued job without blocking. Returns how many ran.
    pub fn drain(&self, target: &mut T) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            self.run(job, target);
            ran += 1;
        }
        ran
    }

    /// Run jobs as they arrive until nothing is in flight.
    ///
    /// Returns false if work was still pending when `timeout` expired.
    pub fn pump_until_settled(&self, target: &mut T, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain(target);
            if self.in_flight() == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(job) => self.run(job, target),
                Err(RecvTimeoutError::Timeout) => return false,
                // Unreachable while we hold a sender
                Err(RecvTimeoutError::Disconnected) => return self.in_flight() == 0,
            }
        }
    }

    fn run(&self, job: Job<T>, target: &mut T) {
        job(target);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn send<T>(sender: &Sender<Job<T>>, in_flight: &AtomicUsize, job: Job<T>) {
    if sender.send(job).is_err() {
        warn!("Main context is gone, dropping continuation");
        in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap()
    }

    #[test]
    fn test_posted_jobs_wait_for_drain() {
        let rt = runtime();
        let executor: MainExecutor<Vec<u32>> = MainExecutor::new(rt.handle().clone());
        let mut log = Vec::new();

        executor.post(|log| log.push(1));
        executor.post(|log| log.push(2));
        assert!(log.is_empty());
        assert_eq!(executor.in_flight(), 2);

        assert_eq!(executor.drain(&mut log), 2);
        assert_eq!(log, vec![1, 2]);
        assert_eq!(executor.in_flight(), 0);
    }

    #[test]
    fn test_pool_result_runs_on_main_context() {
        let rt = runtime();
        let executor: MainExecutor<Vec<u32>> = MainExecutor::new(rt.handle().clone());
        let mut log = Vec::new();

        executor.run_on_pool(async { 40 + 2 }, |log, value| log.push(value));
        assert!(executor.pump_until_settled(&mut log, Duration::from_secs(5)));
        assert_eq!(log, vec![42]);
    }

    #[test]
    fn test_continuations_can_chain() {
        let rt = runtime();
        let executor: MainExecutor<Vec<u32>> = MainExecutor::new(rt.handle().clone());
        let chained = executor.clone();
        let mut log = Vec::new();

        executor.run_on_pool(async { 1 }, move |log, value| {
            log.push(value);
            chained.run_on_pool(async { 2 }, |log, value| log.push(value));
        });
        assert!(executor.pump_until_settled(&mut log, Duration::from_secs(5)));
        assert_eq!(log, vec![1, 2]);
    }

    #[test]
    fn test_pump_times_out_on_stuck_work() {
        let rt = runtime();
        let executor: MainExecutor<Vec<u32>> = MainExecutor::new(rt.handle().clone());
        let mut log = Vec::new();

        executor.run_on_pool(futures::future::pending::<u32>(), |log, value| log.push(value));
        assert!(!executor.pump_until_settled(&mut log, Duration::from_millis(50)));
        assert_eq!(executor.in_flight(), 1);
    }
}
