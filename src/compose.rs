use crate::{
    affinity::TaskAffinity,
    graph::{GraphError, TaskGraph},
    task::{ChunkNode, JoinNode, SourceNode, Task, TaskHandle},
};
use std::sync::Arc;

/// Boxed nullary callable used by [`add_task_sequence`].
pub type SourceCallable<O> = Box<dyn Fn() -> O + Send + Sync>;

/// Builds a linear chain of source nodes running the callables in order.
///
/// The first callable becomes a root; every later one is chained behind its
/// predecessor with an edge. The chain carries ordering only, not data: the
/// callables communicate through whatever state they capture. Returns the
/// last node of the chain, or `None` for an empty callable list.
///
/// # Errors
/// Propagates graph construction errors.
pub fn add_task_sequence<O: Send + Sync + 'static>(
    graph: &mut TaskGraph,
    callables: impl IntoIterator<Item = SourceCallable<O>>,
) -> Result<Option<Arc<SourceNode<O>>>, GraphError> {
    let mut callables = callables.into_iter();
    let Some(first) = callables.next() else {
        return Ok(None);
    };

    let mut last = SourceNode::new(first);
    graph.add_task(last.clone())?;
    for callable in callables {
        let next = SourceNode::new(callable);
        graph.add_task_edge(&*last, next.clone())?;
        last = next;
    }
    Ok(Some(last))
}

/// Adds `chunks` parallel root tasks invoking `callable` with dense indices
/// `[0, chunks)`.
///
/// With an affinity mask, the chunk tasks are pinned across the mask's set
/// bits in round-robin order. Returns the created nodes so callers can read
/// per-chunk results after the run.
///
/// # Errors
/// Propagates graph construction errors.
pub fn parallel_for<O, F>(
    graph: &mut TaskGraph,
    chunks: u32,
    callable: F,
    affinity: Option<TaskAffinity>,
) -> Result<Vec<Arc<ChunkNode<O>>>, GraphError>
where
    O: Send + Sync + 'static,
    F: Fn(u32) -> O + Send + Sync + 'static,
{
    let callable: Arc<dyn Fn(u32) -> O + Send + Sync> = Arc::new(callable);
    let mut placement = affinity.and_then(|mask| Some((mask, mask.first()?)));

    let mut nodes = Vec::with_capacity(chunks as usize);
    for chunk in 0..chunks {
        let node = ChunkNode::from_shared(chunk, Arc::clone(&callable));
        if let Some((mask, next_bit)) = &mut placement {
            node.set_affinity(&[*next_bit]);
            *next_bit = mask
                .next_after(*next_bit)
                .expect("non-empty affinity mask has a next bit");
        }
        graph.add_task(node.clone())?;
        nodes.push(node);
    }
    Ok(nodes)
}

/// Adds `chunks` parallel workers and a multi-join reducer over all of them.
///
/// The reducer runs `reduce` exactly once, strictly after every chunk task
/// has completed, and is returned so callers can chain further stages behind
/// it. With `chunks == 0` the reducer is added as a root and runs
/// immediately.
///
/// With `parent`, each chunk task is attached behind `parent` instead of
/// being a root. Chunk tasks keep their always-true readiness predicate, so
/// the dependency on `parent` is enforced by dispatch order alone: the
/// driver does not hand a child to the workers before a parent completes.
///
/// # Errors
/// Propagates graph construction errors.
pub fn parallel_reduce<O, R, F, G>(
    graph: &mut TaskGraph,
    parent: Option<&dyn Task>,
    chunks: u32,
    callable: F,
    reduce: G,
    affinity: Option<TaskAffinity>,
) -> Result<Arc<JoinNode<R>>, GraphError>
where
    O: Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: Fn(u32) -> O + Send + Sync + 'static,
    G: Fn() -> R + Send + Sync + 'static,
{
    let callable: Arc<dyn Fn(u32) -> O + Send + Sync> = Arc::new(callable);
    let mut placement = affinity.and_then(|mask| Some((mask, mask.first()?)));

    let mut workers: Vec<TaskHandle> = Vec::with_capacity(chunks as usize);
    for chunk in 0..chunks {
        let node = ChunkNode::from_shared(chunk, Arc::clone(&callable));
        if let Some((mask, next_bit)) = &mut placement {
            node.set_affinity(&[*next_bit]);
            *next_bit = mask
                .next_after(*next_bit)
                .expect("non-empty affinity mask has a next bit");
        }
        match parent {
            Some(parent) => graph.add_task_edge(parent, node.clone())?,
            None => graph.add_task(node.clone())?,
        }
        workers.push(node);
    }

    let reducer = JoinNode::new(&workers, reduce);
    if workers.is_empty() {
        graph.add_task(reducer.clone())?;
    } else {
        graph.add_task_edges(&workers, reducer.clone())?;
    }
    Ok(reducer)
}

/// Builds a private graph, runs [`parallel_for`] on it and waits for
/// completion.
///
/// # Errors
/// Propagates graph construction errors.
pub fn run_parallel_for<O, F>(workers: u32, chunks: u32, callable: F) -> Result<(), GraphError>
where
    O: Send + Sync + 'static,
    F: Fn(u32) -> O + Send + Sync + 'static,
{
    let mut graph = TaskGraph::with_workers(workers);
    parallel_for(&mut graph, chunks, callable, None)?;
    graph.wait_all();
    Ok(())
}

/// Builds a private graph, runs [`parallel_reduce`] on it and waits for
/// completion. Returns the reducer so its result can be read.
///
/// # Errors
/// Propagates graph construction errors.
pub fn run_parallel_reduce<O, R, F, G>(
    workers: u32,
    chunks: u32,
    callable: F,
    reduce: G,
) -> Result<Arc<JoinNode<R>>, GraphError>
where
    O: Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: Fn(u32) -> O + Send + Sync + 'static,
    G: Fn() -> R + Send + Sync + 'static,
{
    let mut graph = TaskGraph::with_workers(workers);
    let reducer = parallel_reduce(&mut graph, None, chunks, callable, reduce, None)?;
    graph.wait_all();
    Ok(reducer)
}
