//! Fixed-size worker pool consuming a FIFO job queue.
//!
//! `add_job` enqueues and wakes one worker, `wait_all` blocks until every
//! queued job has run, `join_all` stops the workers. Jobs left in the queue
//! at teardown are dropped without running and still counted as done.

use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    bailout: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    job_available: Condvar,
    jobs_left: Mutex<usize>,
    all_done: Condvar,
}

impl Shared {
    fn job_finished(&self, count: usize) {
        let mut left = self.jobs_left.lock();
        *left = left.saturating_sub(count);
        if *left == 0 {
            self.all_done.notify_all();
        }
    }
}

/// Decrements the outstanding-job counter even if the job panics.
struct Completion<'a>(&'a Shared);

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.0.job_finished(1);
    }
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Start `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let shared = Arc::new(Shared::default());
        let workers = (0..size.max(1))
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(index, &shared))
            })
            .collect();
        Self { shared, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn add_job<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.shared.jobs_left.lock() += 1;
        self.shared.queue.lock().jobs.push_back(Box::new(job));
        self.shared.job_available.notify_one();
    }

    /// Block until no job is queued or running.
    pub fn wait_all(&self) {
        let mut left = self.shared.jobs_left.lock();
        while *left > 0 {
            self.shared.all_done.wait(&mut left);
        }
    }

    pub fn jobs_left(&self) -> usize {
        *self.shared.jobs_left.lock()
    }

    /// Stop every worker and drain the queue.
    pub fn join_all(&mut self) {
        self.shared.queue.lock().bailout = true;
        self.shared.job_available.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("thread pool worker terminated abnormally");
            }
        }
        let dropped = {
            let mut queue = self.shared.queue.lock();
            let count = queue.jobs.len();
            queue.jobs.clear();
            count
        };
        if dropped > 0 {
            debug!("dropping {} queued jobs at thread pool teardown", dropped);
            self.shared.job_finished(dropped);
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join_all();
    }
}

fn worker_loop(index: usize, shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.bailout {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                shared.job_available.wait(&mut queue);
            }
        };
        let _done = Completion(shared);
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("job panicked on worker {}", index);
        }
    }
}
