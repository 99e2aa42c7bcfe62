use crate::{
    affinity::TaskAffinity,
    types::{HashMap, HashSet, TaskId},
};
use derive_more::Debug;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex, OnceLock,
};

/// A single unit of computation in the DAG.
///
/// Nodes are shared values: the graph driver holds the definitive handle in
/// its task table, and downstream nodes may hold additional handles to read a
/// typed result. All methods therefore take `&self`.
///
/// The readiness predicate [`Task::ready`] is consulted by the driver thread
/// alone, once per completed parent edge. Single-parent variants keep the
/// default implementation (always ready); the multi-join variant counts down
/// its declared parent set.
pub trait Task: core::fmt::Debug + Send + Sync {
    /// Unique identifier assigned at construction.
    fn id(&self) -> TaskId;

    /// Current placement preference.
    fn affinity(&self) -> TaskAffinity;

    /// Replaces the placement preference with the given worker indices.
    ///
    /// Must be called before the graph starts executing; a change made while
    /// the task is already queued may or may not be observed.
    fn set_affinity(&self, workers: &[u32]);

    /// Whether the node may run now, given that `finished_parent` has just
    /// completed.
    fn ready(&self, finished_parent: TaskId) -> bool {
        let _ = finished_parent;
        true
    }

    /// Invokes the node's callable, stores its result and returns [`Task::id`].
    fn run(&self) -> TaskId;
}

/// Access to the typed result of a completed node.
///
/// The scheduler establishes a happens-before relation from a parent's
/// [`Task::run`] to any child's: a child reading its parent through this
/// trait always observes the stored value.
pub trait TaskResult<O>: Task {
    /// Returns the stored result, or `None` if the node has not run yet.
    ///
    /// Reads are idempotent and side-effect-free.
    fn result(&self) -> Option<O>;
}

/// Shared handle to a type-erased task node.
pub type TaskHandle = Arc<dyn Task>;

/// Immutable snapshot of the graph's task table handed to workers.
pub(crate) type TaskTable = HashMap<TaskId, TaskHandle>;

/// Identity and placement state common to every node variant.
#[derive(Debug)]
pub(crate) struct TaskMeta {
    id: TaskId,
    affinity: AtomicU32,
}

impl TaskMeta {
    pub(crate) fn new() -> Self {
        Self {
            id: TaskId::next(),
            affinity: AtomicU32::new(0),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn affinity(&self) -> TaskAffinity {
        TaskAffinity::from_bits(self.affinity.load(Ordering::Relaxed))
    }

    pub(crate) fn set_affinity(&self, workers: &[u32]) {
        self.affinity
            .store(TaskAffinity::from_workers(workers).bits(), Ordering::Relaxed);
    }
}

/// Stores a run's result. A repeated run (possible only when the caller has
/// violated the graph shape contract) recomputes, but the first stored value
/// wins and readers stay consistent.
fn store_once<O>(slot: &OnceLock<O>, value: O) {
    let _ = slot.set(value);
}

/// A root node with no data parent.
///
/// Executes a nullary callable and stores its return value. Source nodes are
/// seeded into the initial frontier when added via
/// [`TaskGraph::add_task`](crate::graph::TaskGraph::add_task).
#[derive(Debug)]
pub struct SourceNode<O> {
    meta: TaskMeta,
    #[debug(skip)]
    callable: Box<dyn Fn() -> O + Send + Sync>,
    #[debug(skip)]
    result: OnceLock<O>,
}

impl<O: Send + Sync + 'static> SourceNode<O> {
    /// Creates a source node around the given callable.
    pub fn new(callable: impl Fn() -> O + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            meta: TaskMeta::new(),
            callable: Box::new(callable),
            result: OnceLock::new(),
        })
    }
}

impl<O: Send + Sync + 'static> Task for SourceNode<O> {
    fn id(&self) -> TaskId {
        self.meta.id()
    }

    fn affinity(&self) -> TaskAffinity {
        self.meta.affinity()
    }

    fn set_affinity(&self, workers: &[u32]) {
        self.meta.set_affinity(workers);
    }

    fn run(&self) -> TaskId {
        let value = (self.callable)();
        store_once(&self.result, value);
        self.meta.id()
    }
}

impl<O: Clone + Send + Sync + 'static> TaskResult<O> for SourceNode<O> {
    fn result(&self) -> Option<O> {
        self.result.get().cloned()
    }
}

/// A node with exactly one typed data parent.
///
/// On execution, reads the parent's result and applies the callable to it.
/// The typed edge is fixed at construction: the parent handle already proves
/// it produces `I`, so no runtime bridging is needed. If the parent has not
/// produced a result (a caller contract violation, e.g. the node was run
/// outside a graph), execution is a no-op and the result stays empty.
#[derive(Debug)]
pub struct UnaryNode<I, O> {
    meta: TaskMeta,
    #[debug(skip)]
    parent: Arc<dyn TaskResult<I>>,
    #[debug(skip)]
    callable: Box<dyn Fn(I) -> O + Send + Sync>,
    #[debug(skip)]
    result: OnceLock<O>,
}

impl<I, O> UnaryNode<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Creates a node that applies `callable` to `parent`'s result.
    pub fn new<P: TaskResult<I> + 'static>(
        parent: Arc<P>,
        callable: impl Fn(I) -> O + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            meta: TaskMeta::new(),
            parent,
            callable: Box::new(callable),
            result: OnceLock::new(),
        })
    }
}

impl<I, O> Task for UnaryNode<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn id(&self) -> TaskId {
        self.meta.id()
    }

    fn affinity(&self) -> TaskAffinity {
        self.meta.affinity()
    }

    fn set_affinity(&self, workers: &[u32]) {
        self.meta.set_affinity(workers);
    }

    fn run(&self) -> TaskId {
        if let Some(input) = self.parent.result() {
            let value = (self.callable)(input);
            store_once(&self.result, value);
        }
        self.meta.id()
    }
}

impl<I, O> TaskResult<O> for UnaryNode<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn result(&self) -> Option<O> {
        self.result.get().cloned()
    }
}

/// One parameterised worker of a fork-join fan-out.
///
/// Carries an integer chunk index and no data parent; the callable receives
/// the index. Chunk indices are dense `[0, n)` when the nodes are created
/// through [`parallel_for`](crate::compose::parallel_for) or
/// [`parallel_reduce`](crate::compose::parallel_reduce).
#[derive(Debug)]
pub struct ChunkNode<O> {
    meta: TaskMeta,
    chunk: u32,
    #[debug(skip)]
    callable: Arc<dyn Fn(u32) -> O + Send + Sync>,
    #[debug(skip)]
    result: OnceLock<O>,
}

impl<O: Send + Sync + 'static> ChunkNode<O> {
    /// Creates a chunk node owning its callable.
    pub fn new(chunk: u32, callable: impl Fn(u32) -> O + Send + Sync + 'static) -> Arc<Self> {
        Self::from_shared(chunk, Arc::new(callable))
    }

    /// Creates a chunk node over a callable shared with sibling chunks.
    pub fn from_shared(chunk: u32, callable: Arc<dyn Fn(u32) -> O + Send + Sync>) -> Arc<Self> {
        Arc::new(Self {
            meta: TaskMeta::new(),
            chunk,
            callable,
            result: OnceLock::new(),
        })
    }

    /// The chunk index passed to the callable.
    #[must_use]
    pub fn chunk(&self) -> u32 {
        self.chunk
    }
}

impl<O: Send + Sync + 'static> Task for ChunkNode<O> {
    fn id(&self) -> TaskId {
        self.meta.id()
    }

    fn affinity(&self) -> TaskAffinity {
        self.meta.affinity()
    }

    fn set_affinity(&self, workers: &[u32]) {
        self.meta.set_affinity(workers);
    }

    fn run(&self) -> TaskId {
        let value = (self.callable)(self.chunk);
        store_once(&self.result, value);
        self.meta.id()
    }
}

impl<O: Clone + Send + Sync + 'static> TaskResult<O> for ChunkNode<O> {
    fn result(&self) -> Option<O> {
        self.result.get().cloned()
    }
}

/// A node that joins a declared set of parents.
///
/// The readiness predicate is stateful: each completed parent is erased from
/// the waiting set, and the node reports ready once the set drains. The set
/// is only ever consulted by the driver thread; the mutex exists solely so
/// the node can be shared through [`TaskHandle`]s.
#[derive(Debug)]
pub struct JoinNode<O> {
    meta: TaskMeta,
    waiting: Mutex<HashSet<TaskId>>,
    #[debug(skip)]
    callable: Box<dyn Fn() -> O + Send + Sync>,
    #[debug(skip)]
    result: OnceLock<O>,
}

impl<O: Send + Sync + 'static> JoinNode<O> {
    /// Creates a join node over the given parents.
    ///
    /// The declared set must match the edges registered with
    /// [`TaskGraph::add_task_edges`](crate::graph::TaskGraph::add_task_edges);
    /// a mismatch leaves the node either never ready or ready too early.
    pub fn new(parents: &[TaskHandle], callable: impl Fn() -> O + Send + Sync + 'static) -> Arc<Self> {
        let waiting = parents.iter().map(|parent| parent.id()).collect();
        Arc::new(Self {
            meta: TaskMeta::new(),
            waiting: Mutex::new(waiting),
            callable: Box::new(callable),
            result: OnceLock::new(),
        })
    }
}

impl<O: Send + Sync + 'static> Task for JoinNode<O> {
    fn id(&self) -> TaskId {
        self.meta.id()
    }

    fn affinity(&self) -> TaskAffinity {
        self.meta.affinity()
    }

    fn set_affinity(&self, workers: &[u32]) {
        self.meta.set_affinity(workers);
    }

    fn ready(&self, finished_parent: TaskId) -> bool {
        let mut waiting = self.waiting.lock().expect("join parent set poisoned");
        waiting.remove(&finished_parent);
        waiting.is_empty()
    }

    fn run(&self) -> TaskId {
        let value = (self.callable)();
        store_once(&self.result, value);
        self.meta.id()
    }
}

impl<O: Clone + Send + Sync + 'static> TaskResult<O> for JoinNode<O> {
    fn result(&self) -> Option<O> {
        self.result.get().cloned()
    }
}
