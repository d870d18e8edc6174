//! Single-shot task queue (§4.1) with a dynamic worker pool and three
//! priority classes. Guarantees FIFO dispatch order within a priority class;
//! actual execution concurrency is provided by a `rayon` work-stealing pool
//! so individual jobs still run in parallel once dispatched.
use crate::sync::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskqPriority {
    Low,
    Normal,
    High,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Pending {
    id: u64,
    job: Job,
}

struct State {
    queues: [VecDeque<Pending>; 3],
    cancelled: HashSet<u64>,
    outstanding: HashSet<u64>,
    shutdown: bool,
}

/// A priority task queue backed by a bounded `rayon` thread pool.
pub struct Taskq {
    pool: Arc<rayon::ThreadPool>,
    state: Arc<Mutex<State>>,
    cv: Arc<Condvar>,
    next_id: AtomicU64,
    dispatcher: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

fn priority_index(p: TaskqPriority) -> usize {
    match p {
        TaskqPriority::High => 0,
        TaskqPriority::Normal => 1,
        TaskqPriority::Low => 2,
    }
}

impl Taskq {
    pub fn new(nthreads: usize) -> Self {
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(nthreads.max(1))
                .thread_name(|i| format!("taskq-{i}"))
                .build()
                .expect("failed to build taskq thread pool"),
        );
        let state = Arc::new(Mutex::new(State {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            cancelled: HashSet::new(),
            outstanding: HashSet::new(),
            shutdown: false,
        }));
        let cv = Arc::new(Condvar::new());
        let stop = Arc::new(AtomicBool::new(false));

        let dispatcher = {
            let pool = pool.clone();
            let state = state.clone();
            let cv = cv.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("taskq-dispatch".into())
                .spawn(move || Self::dispatch_loop(pool, state, cv, stop))
                .expect("failed to spawn taskq dispatcher")
        };

        Taskq {
            pool,
            state,
            cv,
            next_id: AtomicU64::new(1),
            dispatcher: Some(dispatcher),
            stop,
        }
    }

    fn dispatch_loop(
        pool: Arc<rayon::ThreadPool>,
        state: Arc<Mutex<State>>,
        cv: Arc<Condvar>,
        stop: Arc<AtomicBool>,
    ) {
        loop {
            let pending = {
                let mut guard = state.lock();
                loop {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Some(p) = Self::pop_highest(&mut guard) {
                        break p;
                    }
                    cv.wait(&mut guard);
                }
            };
            let id = pending.id;
            let job = pending.job;
            let state2 = state.clone();
            let cv2 = cv.clone();
            pool.spawn(move || {
                let cancelled = {
                    let guard = state2.lock();
                    guard.cancelled.contains(&id)
                };
                if !cancelled {
                    job();
                }
                let mut guard = state2.lock();
                guard.outstanding.remove(&id);
                guard.cancelled.remove(&id);
                cv2.notify_all();
            });
        }
    }

    fn pop_highest(state: &mut State) -> Option<Pending> {
        for q in state.queues.iter_mut() {
            if let Some(p) = q.pop_front() {
                return Some(p);
            }
        }
        None
    }

    /// Dispatch `job` under `priority`, returning an id usable with
    /// `cancel_id`/`wait_outstanding`.
    pub fn dispatch(&self, priority: TaskqPriority, job: impl FnOnce() + Send + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut guard = self.state.lock();
            guard.outstanding.insert(id);
            guard.queues[priority_index(priority)].push_back(Pending {
                id,
                job: Box::new(job),
            });
        }
        self.cv.notify_all();
        id
    }

    /// Dispatch `job` after `delay` elapses.
    pub fn dispatch_delayed(
        &self,
        priority: TaskqPriority,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut guard = self.state.lock();
            guard.outstanding.insert(id);
        }
        let state = self.state.clone();
        let cv = self.cv.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let mut guard = state.lock();
            if guard.shutdown {
                return;
            }
            guard.queues[priority_index(priority)].push_back(Pending {
                id,
                job: Box::new(job),
            });
            drop(guard);
            cv.notify_all();
        });
        id
    }

    /// Cancel a dispatched job before it starts running. Returns `true` if
    /// the job had not yet begun executing (and thus will never run).
    pub fn cancel_id(&self, id: u64) -> bool {
        let mut guard = self.state.lock();
        for q in guard.queues.iter_mut() {
            if let Some(pos) = q.iter().position(|p| p.id == id) {
                q.remove(pos);
                guard.outstanding.remove(&id);
                return true;
            }
        }
        // Already dequeued by the dispatcher: mark cancelled so the pool
        // worker skips running the body, but it still completes bookkeeping.
        guard.cancelled.insert(id);
        false
    }

    /// Block until the job `id` has completed (or been cancelled).
    pub fn wait_outstanding(&self, id: u64) {
        let mut guard = self.state.lock();
        while guard.outstanding.contains(&id) {
            self.cv.wait(&mut guard);
        }
    }
}

impl Drop for Taskq {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        {
            let mut guard = self.state.lock();
            guard.shutdown = true;
        }
        self.cv.notify_all();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fifo_within_priority() {
        let tq = Taskq::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut ids = Vec::new();
        for i in 0..5 {
            let order = order.clone();
            ids.push(tq.dispatch(TaskqPriority::Normal, move || {
                order.lock().push(i);
            }));
        }
        for id in ids {
            tq.wait_outstanding(id);
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cancel_before_run() {
        let tq = Taskq::new(0.max(1));
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        // Keep the pool busy with a blocking first job so the second job is
        // still queued when we try to cancel it.
        let gate = Arc::new(AtomicBool::new(false));
        let gate2 = gate.clone();
        let busy_id = tq.dispatch(TaskqPriority::Normal, move || {
            while !gate2.load(Ordering::SeqCst) {
                thread::yield_now();
            }
        });
        let id = tq.dispatch(TaskqPriority::Normal, move || {
            ran2.store(true, Ordering::SeqCst);
        });
        let cancelled = tq.cancel_id(id);
        gate.store(true, Ordering::SeqCst);
        tq.wait_outstanding(busy_id);
        tq.wait_outstanding(id);
        assert!(cancelled);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn priority_counter() {
        let count = Arc::new(AtomicUsize::new(0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
