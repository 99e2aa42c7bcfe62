#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taskdag::{
    GraphError, JoinNode, SourceNode, Task, TaskGraph, TaskHandle, TaskResult, UnaryNode,
};

#[test]
fn single_source_runs_to_completion() {
    let mut graph = TaskGraph::with_workers(2);
    let node = SourceNode::new(|| 7_u32);
    graph.add_task(node.clone()).unwrap();

    assert_eq!(node.result(), None);
    graph.wait_all();
    assert_eq!(node.result(), Some(7));
    // Reads stay idempotent.
    assert_eq!(node.result(), Some(7));
}

#[test]
fn identity_chain_carries_value_to_tail() {
    let mut graph = TaskGraph::with_workers(3);
    let source = SourceNode::new(|| 7_i64);
    graph.add_task(source.clone()).unwrap();

    let step1 = UnaryNode::new(source.clone(), |x: i64| x);
    graph.add_task_edge(&*source, step1.clone()).unwrap();
    let step2 = UnaryNode::new(step1.clone(), |x: i64| x);
    graph.add_task_edge(&*step1, step2.clone()).unwrap();
    let step3 = UnaryNode::new(step2.clone(), |x: i64| x);
    graph.add_task_edge(&*step2, step3.clone()).unwrap();

    graph.wait_all();
    assert_eq!(step3.result(), Some(7));
}

#[test]
fn unary_child_can_drive_a_nested_graph() {
    let mut graph = TaskGraph::with_workers(5);

    let produce = SourceNode::new(|| 1000_i64);
    let child = UnaryNode::new(produce.clone(), |input: i64| {
        let mut inner = TaskGraph::with_workers(2);
        let base = SourceNode::new(|| 500_i64);
        inner.add_task(base.clone()).unwrap();
        let plus_one = UnaryNode::new(base.clone(), |x: i64| x + 1);
        inner.add_task_edge(&*base, plus_one.clone()).unwrap();
        inner.wait_all();

        input * 40 * 1000 + plus_one.result().unwrap()
    });

    graph.add_task(produce.clone()).unwrap();
    graph.add_task_edge(&*produce, child.clone()).unwrap();
    graph.wait_all();

    assert_eq!(child.result(), Some(40_000_501));
}

#[test]
fn diamond_join_orders_all_stages() {
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let log = |label: &'static str, events: &Arc<Mutex<Vec<&'static str>>>| {
        let events = events.clone();
        move || {
            events.lock().unwrap().push(label);
        }
    };

    let mut graph = TaskGraph::with_workers(4);
    let root = SourceNode::new({
        let push = log("root", &events);
        move || {
            push();
            2_u32
        }
    });
    let left = UnaryNode::new(root.clone(), {
        let push = log("left", &events);
        move |x: u32| {
            push();
            x + 1
        }
    });
    let right = UnaryNode::new(root.clone(), {
        let push = log("right", &events);
        move |x: u32| {
            push();
            x + 2
        }
    });
    let join_parents: Vec<TaskHandle> = vec![left.clone(), right.clone()];
    let join = JoinNode::new(&join_parents, {
        let push = log("join", &events);
        move || {
            push();
            9_u32
        }
    });
    let tail = UnaryNode::new(join.clone(), {
        let push = log("tail", &events);
        move |x: u32| {
            push();
            x
        }
    });

    graph.add_task(root.clone()).unwrap();
    graph.add_task_edge(&*root, left.clone()).unwrap();
    graph.add_task_edge(&*root, right.clone()).unwrap();
    graph.add_task_edges(&join_parents, join.clone()).unwrap();
    graph.add_task_edge(&*join, tail.clone()).unwrap();
    graph.wait_all();

    assert_eq!(tail.result(), Some(9));

    let events = events.lock().unwrap();
    let position = |label: &str| {
        events
            .iter()
            .position(|&event| event == label)
            .unwrap_or_else(|| panic!("missing event {label}"))
    };
    assert_eq!(events.len(), 5);
    assert!(position("root") < position("left"));
    assert!(position("root") < position("right"));
    assert!(position("left") < position("join"));
    assert!(position("right") < position("join"));
    assert!(position("join") < position("tail"));
}

#[test]
fn affinity_pins_task_to_named_worker() {
    let mut graph = TaskGraph::with_workers(4);
    let observed = Arc::new(Mutex::new(None));
    let node = SourceNode::new({
        let observed = observed.clone();
        move || {
            let name = std::thread::current().name().map(String::from);
            *observed.lock().unwrap() = name;
        }
    });
    node.set_affinity(&[2]);
    graph.add_task(node).unwrap();
    graph.wait_all();

    // A lone task cannot be stolen, so placement is exact.
    assert_eq!(
        observed.lock().unwrap().as_deref(),
        Some("taskdag-worker-2")
    );
}

#[test]
fn out_of_range_affinity_still_runs() {
    let mut graph = TaskGraph::with_workers(2);
    let node = SourceNode::new(|| 11_u8);
    node.set_affinity(&[7]);
    graph.add_task(node.clone()).unwrap();
    graph.wait_all();
    assert_eq!(node.result(), Some(11));
}

#[test]
fn zero_workers_is_coerced_to_one() {
    let mut graph = TaskGraph::with_workers(0);
    assert_eq!(graph.worker_count(), 1);

    let node = SourceNode::new(|| "done");
    graph.add_task(node.clone()).unwrap();
    graph.wait_all();
    assert_eq!(node.result(), Some("done"));
}

#[test]
fn default_worker_count_is_at_least_one() {
    let graph = TaskGraph::new();
    assert!(graph.worker_count() >= 1);
}

#[test]
fn duplicate_add_task_is_rejected() {
    let mut graph = TaskGraph::with_workers(1);
    let node = SourceNode::new(|| ());
    graph.add_task(node.clone()).unwrap();
    assert_eq!(
        graph.add_task(node.clone()),
        Err(GraphError::DuplicateTask(node.id()))
    );
}

#[test]
fn edge_with_unknown_parent_is_rejected() {
    let mut graph = TaskGraph::with_workers(1);
    let parent = SourceNode::new(|| 1_u32);
    let child = UnaryNode::new(parent.clone(), |x: u32| x);
    assert_eq!(
        graph.add_task_edge(&*parent, child),
        Err(GraphError::UnknownParent(parent.id()))
    );
}

#[test]
fn repeated_edge_is_collapsed() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut graph = TaskGraph::with_workers(2);
    let parent = SourceNode::new(|| 5_u32);
    let child = UnaryNode::new(parent.clone(), {
        let runs = runs.clone();
        move |x: u32| {
            runs.fetch_add(1, Ordering::SeqCst);
            x + 1
        }
    });
    graph.add_task(parent.clone()).unwrap();
    graph.add_task_edge(&*parent, child.clone()).unwrap();
    // The second registration of the same edge is a no-op.
    graph.add_task_edge(&*parent, child.clone()).unwrap();
    graph.wait_all();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(child.result(), Some(6));
}

#[test]
fn task_ids_follow_construction_order() {
    let a = SourceNode::new(|| ());
    let b = SourceNode::new(|| ());
    let c = SourceNode::new(|| ());
    assert!(a.id() < b.id());
    assert!(b.id() < c.id());
}

#[test]
fn execution_order_is_breadth_first_from_roots() {
    let mut graph = TaskGraph::with_workers(2);
    let root = SourceNode::new(|| 1_u32);
    let left = UnaryNode::new(root.clone(), |x: u32| x);
    let right = UnaryNode::new(root.clone(), |x: u32| x);
    let join_parents: Vec<TaskHandle> = vec![left.clone(), right.clone()];
    let join = JoinNode::new(&join_parents, || 0_u32);

    graph.add_task(root.clone()).unwrap();
    graph.add_task_edge(&*root, left.clone()).unwrap();
    graph.add_task_edge(&*root, right.clone()).unwrap();
    graph.add_task_edges(&join_parents, join.clone()).unwrap();

    let order = graph.execution_order();
    assert_eq!(
        order,
        vec![root.id(), left.id(), right.id(), join.id()]
    );
    graph.print_tasks_execution();
}

#[test]
fn graph_can_host_a_second_run() {
    let mut graph = TaskGraph::with_workers(2);
    let first = SourceNode::new(|| 1_u32);
    graph.add_task(first.clone()).unwrap();
    graph.wait_all();
    assert_eq!(first.result(), Some(1));

    let second = SourceNode::new(|| 2_u32);
    graph.add_task(second.clone()).unwrap();
    graph.wait_all();
    assert_eq!(second.result(), Some(2));
}

#[test]
fn every_task_runs_exactly_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut graph = TaskGraph::with_workers(4);
    let mut nodes = Vec::new();
    for _ in 0..16 {
        let node = SourceNode::new({
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });
        graph.add_task(node.clone()).unwrap();
        nodes.push(node);
    }
    graph.wait_all();

    assert_eq!(runs.load(Ordering::SeqCst), 16);
    for node in nodes {
        assert_eq!(node.result(), Some(()));
    }
}
