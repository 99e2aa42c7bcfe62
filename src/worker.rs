use crate::{controller::Controller, task::TaskTable};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::trace;

/// A single worker of the pool.
///
/// Workers see an immutable snapshot of the task table and communicate with
/// the driver only through the [`Controller`]: they pull batches of runnable
/// task ids, run each task's callable, and report the finished ids back.
/// Dependency bookkeeping never happens here; that is the driver's job.
pub(crate) struct Worker {
    index: usize,
    controller: Arc<Controller>,
    tasks: Arc<TaskTable>,
}

impl Worker {
    /// Spawns the worker on a named OS thread and returns its join handle.
    pub(crate) fn spawn(
        index: usize,
        controller: Arc<Controller>,
        tasks: Arc<TaskTable>,
    ) -> JoinHandle<()> {
        thread::Builder::new()
            .name(format!("taskdag-worker-{index}"))
            .spawn(move || {
                Worker {
                    index,
                    controller,
                    tasks,
                }
                .run();
            })
            .expect("failed to spawn worker thread")
    }

    fn run(self) {
        loop {
            if self.controller.wait_for_work(self.index) {
                break;
            }
            // Drain until neither the own deque nor stealing yields anything,
            // then go back to waiting.
            loop {
                let batch = self.controller.take_batch(self.index);
                if batch.is_empty() {
                    break;
                }
                trace!(worker = self.index, count = batch.len(), "running batch");
                let mut finished = Vec::with_capacity(batch.len());
                for id in batch {
                    let task = &self.tasks[&id];
                    finished.push(task.run());
                }
                self.controller.report(finished);
            }
        }
        trace!(worker = self.index, "worker exiting");
    }
}
