//! In-process task-graph scheduler with typed dependencies, worker affinity
//! and work stealing.
//!
//! This crate executes a directed acyclic graph (DAG) of computational tasks
//! across a fixed pool of worker threads. It:
//! - Tracks dependencies per node, including multi-parent joins, and advances
//!   the runnable frontier as parents complete.
//! - Distributes work over per-worker queues, honoring per-task affinity
//!   masks as a soft placement hint.
//! - Rebalances by work stealing: an idle worker takes the back half of the
//!   first queue holding more than one task.
//! - Exposes typed results on every node variant, so a child reads its
//!   parent's output without any runtime type bridging.
//!
//! Key modules:
//! - `task`: the `Task` trait, typed result access and the four node
//!   variants (source, unary, parallel-chunk, multi-join).
//! - `graph`: the `TaskGraph` driver owning the DAG and the `wait_all`
//!   execution loop.
//! - `affinity`: the worker-index bitset used for placement hints.
//! - `compose`: sugar for linear chains, parallel-for and parallel-reduce.
//!
//! Quick start:
//! 1. Create a [`TaskGraph`], explicitly sized or one worker per CPU.
//! 2. Build nodes ([`SourceNode`], [`UnaryNode`], [`ChunkNode`],
//!    [`JoinNode`]) and attach them via [`TaskGraph::add_task`] /
//!    [`TaskGraph::add_task_edge`] / [`TaskGraph::add_task_edges`].
//! 3. Call [`TaskGraph::wait_all`], then read results through
//!    [`TaskResult::result`].
//!
//! The example below is `no_run`: with the `loom` feature enabled the
//! scheduler's lock primitives switch to their model-checked variants, which
//! must not be exercised outside `loom::model` (the integration tests are
//! gated the same way).
//!
//! ```no_run
//! use taskdag::{SourceNode, TaskGraph, TaskResult, UnaryNode};
//!
//! let mut graph = TaskGraph::with_workers(2);
//! let base = SourceNode::new(|| 21_u64);
//! let doubled = UnaryNode::new(base.clone(), |x: u64| x * 2);
//! graph.add_task(base.clone()).unwrap();
//! graph.add_task_edge(&*base, doubled.clone()).unwrap();
//! graph.wait_all();
//! assert_eq!(doubled.result(), Some(42));
//! ```
//!
//! The scheduler guarantees that a child's callable runs strictly after all
//! of its parents' callables have returned, with the necessary happens-before
//! established by the queue locks. Affinity is honored at enqueue time only;
//! stealing may migrate a queued task to any worker.

/// Worker-index bitset used as a soft placement hint.
pub mod affinity;
/// Composition helpers: linear chains, parallel-for, parallel-reduce.
pub mod compose;
mod controller;
/// The graph driver: DAG construction and the execution loop.
pub mod graph;
mod sync;
/// Task trait, typed results and the node variants.
pub mod task;
/// Core identifier and collection types.
pub mod types;
mod worker;

pub use crate::{
    affinity::TaskAffinity,
    compose::{
        add_task_sequence, parallel_for, parallel_reduce, run_parallel_for, run_parallel_reduce,
        SourceCallable,
    },
    graph::{GraphError, TaskGraph},
    task::{ChunkNode, JoinNode, SourceNode, Task, TaskHandle, TaskResult, UnaryNode},
    types::TaskId,
};
