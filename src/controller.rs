use crate::{
    sync::{AtomicBool, Condvar, Mutex, Ordering},
    task::TaskTable,
    types::TaskId,
};
use std::collections::VecDeque;
use std::mem;
use tracing::{debug, trace};

/// Thread-safe channels between the graph driver and the worker pool.
///
/// Two independent lock regions:
/// - the *jobs* side: one deque of task ids per worker plus the round-robin
///   placement cursor, guarded by a single mutex and condvar;
/// - the *ready* side: the list of completed task ids, guarded by its own
///   mutex and condvar.
///
/// The two locks are never held at the same time. The happens-before chain
/// from a parent's execution to a child's dispatch is carried entirely by
/// these two lock regions.
pub(crate) struct Controller {
    jobs: Mutex<JobBoard>,
    jobs_cv: Condvar,
    ready: Mutex<Vec<TaskId>>,
    ready_cv: Condvar,
    done: AtomicBool,
}

struct JobBoard {
    queues: Vec<VecDeque<TaskId>>,
    next_rr: usize,
}

impl JobBoard {
    /// Places one task id into exactly one worker deque and returns the
    /// chosen worker index.
    ///
    /// A task whose mask names an in-range worker goes to the first set bit;
    /// everything else (empty mask, out-of-range preference) falls back to
    /// the round-robin cursor.
    fn place(&mut self, id: TaskId, tasks: &TaskTable) -> usize {
        let preferred = tasks[&id]
            .affinity()
            .first()
            .map(|bit| bit as usize)
            .filter(|&bit| bit < self.queues.len());
        let worker = match preferred {
            Some(worker) => worker,
            None => {
                let worker = self.next_rr;
                self.next_rr = (self.next_rr + 1) % self.queues.len();
                worker
            }
        };
        self.queues[worker].push_back(id);
        worker
    }

    /// Transfers the back half of the first deque holding more than one task
    /// to the `thief`. Affinity is a placement hint only; stealing ignores it.
    fn steal_for(&mut self, thief: usize) -> VecDeque<TaskId> {
        for victim in 0..self.queues.len() {
            if victim == thief {
                continue;
            }
            let len = self.queues[victim].len();
            if len > 1 {
                let batch = self.queues[victim].split_off(len / 2);
                debug!(thief, victim, count = batch.len(), "stole queued tasks");
                return batch;
            }
        }
        VecDeque::new()
    }
}

impl Controller {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            jobs: Mutex::new(JobBoard {
                queues: vec![VecDeque::new(); workers],
                next_rr: 0,
            }),
            jobs_cv: Condvar::new(),
            ready: Mutex::new(Vec::new()),
            ready_cv: Condvar::new(),
            done: AtomicBool::new(false),
        }
    }

    /// Distributes a frontier of runnable task ids over the worker deques and
    /// wakes every worker.
    pub(crate) fn enqueue(&self, ids: Vec<TaskId>, tasks: &TaskTable) {
        {
            let mut board = self.jobs.lock().expect("jobs mutex poisoned");
            for id in ids {
                let worker = board.place(id, tasks);
                trace!(task = %id, worker, "queued task");
            }
        }
        self.jobs_cv.notify_all();
    }

    /// Blocks worker `worker` until its deque is non-empty or shutdown has
    /// been signalled. Returns the shutdown flag.
    pub(crate) fn wait_for_work(&self, worker: usize) -> bool {
        let mut board = self.jobs.lock().expect("jobs mutex poisoned");
        while board.queues[worker].is_empty() && !self.done.load(Ordering::Acquire) {
            board = self.jobs_cv.wait(board).expect("jobs mutex poisoned");
        }
        self.done.load(Ordering::Acquire)
    }

    /// Takes the front half of the worker's own deque (at least one task), or
    /// steals from a busier worker when the own deque is empty.
    ///
    /// An empty return means there is no work anywhere right now; the caller
    /// loops back to [`Controller::wait_for_work`].
    pub(crate) fn take_batch(&self, worker: usize) -> VecDeque<TaskId> {
        let mut board = self.jobs.lock().expect("jobs mutex poisoned");
        let own_len = board.queues[worker].len();
        if own_len > 0 {
            let take = own_len.div_ceil(2);
            return board.queues[worker].drain(..take).collect();
        }
        board.steal_for(worker)
    }

    /// Appends completed task ids to the ready list and wakes the driver.
    pub(crate) fn report(&self, ids: Vec<TaskId>) {
        {
            let mut ready = self.ready.lock().expect("ready mutex poisoned");
            ready.extend(ids);
        }
        self.ready_cv.notify_one();
    }

    /// Blocks the driver until at least one completion has been reported,
    /// then swaps the whole list out.
    pub(crate) fn wait_ready(&self) -> Vec<TaskId> {
        let mut ready = self.ready.lock().expect("ready mutex poisoned");
        while ready.is_empty() {
            ready = self.ready_cv.wait(ready).expect("ready mutex poisoned");
        }
        mem::take(&mut *ready)
    }

    /// Raises the shutdown flag and wakes everything blocked on either side.
    pub(crate) fn shutdown(&self) {
        self.done.store(true, Ordering::Release);
        self.jobs_cv.notify_all();
        self.ready_cv.notify_all();
    }

    /// Returns the controller to its pristine state so the owning graph can
    /// host another run. Must only be called after the workers have been
    /// joined.
    pub(crate) fn reset(&self) {
        {
            let mut board = self.jobs.lock().expect("jobs mutex poisoned");
            for queue in &mut board.queues {
                queue.clear();
            }
            board.next_rr = 0;
        }
        {
            let mut ready = self.ready.lock().expect("ready mutex poisoned");
            ready.clear();
        }
        self.done.store(false, Ordering::Release);
    }
}
