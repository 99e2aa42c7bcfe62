use crate::{
    controller::Controller,
    task::{Task, TaskHandle, TaskTable},
    types::{HashSet, IndexMap, TaskId},
    worker::Worker,
};
use core::num::NonZeroUsize;
use derive_more::Debug;
use indexmap::map::Entry;
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Error returned by the graph construction operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    /// The task id is already present in the graph.
    #[error("task {0} is already present in the graph")]
    DuplicateTask(TaskId),
    /// An edge names a parent that was never added to the graph.
    #[error("parent task {0} is not part of the graph")]
    UnknownParent(TaskId),
}

/// A DAG of tasks and the driver that executes it.
///
/// The graph owns the task table, the child-edge map, the frontier of
/// runnable tasks and the completion set. [`TaskGraph::wait_all`] spawns the
/// worker pool, feeds the frontier through the controller, absorbs
/// completions and advances dependents until every task has run, then joins
/// the workers.
///
/// All graph state is mutated by the driver thread alone. Workers only read
/// an immutable snapshot of the task table; the controller queues carry all
/// cross-thread traffic.
///
/// The caller must supply an acyclic graph. Cycles are not detected: a graph
/// whose remaining tasks all wait on each other never completes and
/// `wait_all` blocks forever.
#[derive(Debug)]
#[must_use]
pub struct TaskGraph {
    #[debug(skip)]
    controller: Arc<Controller>,
    worker_count: usize,
    tasks: IndexMap<TaskId, TaskHandle>,
    children: IndexMap<TaskId, Vec<TaskId>>,
    pending: Vec<TaskId>,
    completed: HashSet<TaskId>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    /// Creates a graph with one worker per available CPU (at least one).
    pub fn new() -> Self {
        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_workers(workers as u32)
    }

    /// Creates a graph with an explicit worker count. A count of `0` is
    /// treated as `1`.
    pub fn with_workers(workers: u32) -> Self {
        let worker_count = workers.max(1) as usize;
        Self {
            controller: Arc::new(Controller::new(worker_count)),
            worker_count,
            tasks: IndexMap::default(),
            children: IndexMap::default(),
            pending: Vec::new(),
            completed: HashSet::default(),
        }
    }

    /// Number of workers the graph will run with.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Adds a root task and seeds it into the initial frontier.
    ///
    /// # Errors
    /// [`GraphError::DuplicateTask`] if the task was already added; the graph
    /// is left untouched.
    pub fn add_task(&mut self, task: TaskHandle) -> Result<(), GraphError> {
        let id = task.id();
        match self.tasks.entry(id) {
            Entry::Occupied(_) => Err(GraphError::DuplicateTask(id)),
            Entry::Vacant(entry) => {
                entry.insert(task);
                self.pending.push(id);
                Ok(())
            }
        }
    }

    /// Registers `child` (if absent) and records the edge `parent -> child`.
    ///
    /// The child is *not* seeded into the frontier: it becomes runnable only
    /// once its readiness predicate approves a completed parent. Repeating an
    /// edge is a no-op, so a completion fans a child out at most once per
    /// distinct parent.
    ///
    /// # Errors
    /// [`GraphError::UnknownParent`] if `parent` was never added.
    pub fn add_task_edge(&mut self, parent: &dyn Task, child: TaskHandle) -> Result<(), GraphError> {
        let parent_id = parent.id();
        if !self.tasks.contains_key(&parent_id) {
            return Err(GraphError::UnknownParent(parent_id));
        }
        let child_id = child.id();
        self.tasks.entry(child_id).or_insert(child);
        let children = self.children.entry(parent_id).or_default();
        if !children.contains(&child_id) {
            children.push(child_id);
        }
        Ok(())
    }

    /// Registers `child` with an edge from each of the given parents.
    ///
    /// Typically paired with a [`JoinNode`](crate::task::JoinNode) whose
    /// declared parent set matches `parents`.
    ///
    /// # Errors
    /// [`GraphError::UnknownParent`] on the first parent that was never
    /// added; the graph is left untouched in that case.
    pub fn add_task_edges(
        &mut self,
        parents: &[TaskHandle],
        child: TaskHandle,
    ) -> Result<(), GraphError> {
        for parent in parents {
            if !self.tasks.contains_key(&parent.id()) {
                return Err(GraphError::UnknownParent(parent.id()));
            }
        }
        let child_id = child.id();
        self.tasks.entry(child_id).or_insert(child);
        for parent in parents {
            let children = self.children.entry(parent.id()).or_default();
            if !children.contains(&child_id) {
                children.push(child_id);
            }
        }
        Ok(())
    }

    /// Runs the graph to completion, blocking the caller.
    ///
    /// Spawns the worker pool, repeatedly hands the frontier to the
    /// controller and folds reported completions back into the graph. When
    /// every task has completed, signals shutdown and joins every worker.
    pub fn wait_all(&mut self) {
        let table: Arc<TaskTable> = Arc::new(
            self.tasks
                .iter()
                .map(|(&id, task)| (id, Arc::clone(task)))
                .collect(),
        );
        debug!(
            tasks = self.tasks.len(),
            workers = self.worker_count,
            "running task graph"
        );

        let handles: Vec<_> = (0..self.worker_count)
            .map(|index| Worker::spawn(index, Arc::clone(&self.controller), Arc::clone(&table)))
            .collect();

        while self.completed.len() < self.tasks.len() {
            if self.pending.is_empty() {
                for id in self.controller.wait_ready() {
                    self.complete(id);
                }
            } else {
                let frontier = mem::take(&mut self.pending);
                self.controller.enqueue(frontier, &table);
            }
        }

        self.controller.shutdown();
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
        self.controller.reset();
        debug!(tasks = self.completed.len(), "task graph completed");
    }

    /// Folds one completion into the graph state: asks every child whether it
    /// is now runnable and appends the ready ones to the frontier.
    ///
    /// A duplicate completion (only reachable when the caller has mis-wired a
    /// single-result node behind several always-ready edges) is folded
    /// idempotently instead of fanning its children out again.
    fn complete(&mut self, id: TaskId) {
        if !self.completed.insert(id) {
            trace!(task = %id, "duplicate completion ignored");
            return;
        }
        if let Some(children) = self.children.get(&id) {
            for &child in children {
                if self.tasks[&child].ready(id) {
                    self.pending.push(child);
                }
            }
        }
        trace!(task = %id, completed = self.completed.len(), "task completed");
    }

    /// The order in which tasks would be visited by a breadth-first walk
    /// from the current frontier along child edges.
    ///
    /// Only meaningful before [`TaskGraph::wait_all`], while the frontier
    /// still holds the root tasks.
    #[must_use]
    pub fn execution_order(&self) -> Vec<TaskId> {
        let mut order = Vec::with_capacity(self.tasks.len());
        let mut visited = HashSet::default();
        let mut queue = VecDeque::new();

        for &id in &self.pending {
            if visited.insert(id) {
                queue.push_back(id);
            }
        }

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(children) = self.children.get(&id) {
                for &child in children {
                    if visited.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }

        order
    }

    /// Logs the breadth-first execution order of the graph.
    pub fn print_tasks_execution(&self) {
        let order = self.execution_order();
        info!(?order, "task execution order");
    }
}
