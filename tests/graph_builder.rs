// tests/graph_builder.rs

use std::collections::BTreeSet;
use std::error::Error;

use macroseq::dag::{ExecGraph, ExecutorId, ExecutorKind, GraphBuilder};
use macroseq::errors::MacroError;
use macroseq_test_utils::builders::{MacroBuilder, group, run, wait};

type TestResult = Result<(), Box<dyn Error>>;

fn id_of(graph: &ExecGraph, node: usize) -> ExecutorId {
    graph
        .executor_for_node(node)
        .unwrap_or_else(|| panic!("no executor for node {node}"))
}

fn set(ids: &[ExecutorId]) -> BTreeSet<ExecutorId> {
    ids.iter().copied().collect()
}

fn assert_mirrored(graph: &ExecGraph) {
    for executor in graph.iter() {
        for succ in executor.successors() {
            let target = graph.get(*succ).expect("successor exists");
            assert!(
                target.predecessors().contains(&executor.id()),
                "edge {} -> {} has no mirror",
                executor.id(),
                succ
            );
        }
        for pred in executor.predecessors() {
            let source = graph.get(*pred).expect("predecessor exists");
            assert!(source.successors().contains(&executor.id()));
        }
    }
}

#[test]
fn linear_macro_chains_successors() -> TestResult {
    let nodes = MacroBuilder::new()
        .with(run("A"))
        .with(run("B"))
        .with(run("C"))
        .build();

    let built = GraphBuilder::build(&nodes)?;
    let g = &built.graph;
    let (a, b, c) = (id_of(g, 0), id_of(g, 1), id_of(g, 2));

    assert_eq!(built.start, a);
    assert_eq!(g.len(), 3);
    assert_eq!(g.get(a).unwrap().successors(), &set(&[b]));
    assert_eq!(g.get(b).unwrap().successors(), &set(&[c]));
    assert!(g.get(c).unwrap().successors().is_empty());
    assert!(g.iter().all(|e| e.concurrent_starts().is_empty()));
    assert_mirrored(g);
    Ok(())
}

#[test]
fn start_modifier_links_next_command_as_concurrent_start() -> TestResult {
    let nodes = MacroBuilder::new()
        .with(run("A").start())
        .with(run("B"))
        .with(run("C"))
        .build();

    let built = GraphBuilder::build(&nodes)?;
    let g = &built.graph;
    let (a, b, c) = (id_of(g, 0), id_of(g, 1), id_of(g, 2));

    assert_eq!(g.get(a).unwrap().concurrent_starts(), &set(&[b]));
    assert!(g.get(a).unwrap().successors().is_empty());
    assert_eq!(g.get(b).unwrap().successors(), &set(&[c]));
    assert!(g.get(c).unwrap().predecessors().contains(&b));
    Ok(())
}

#[test]
fn group_members_join_on_a_waiter_spliced_into_the_main_stream() -> TestResult {
    let nodes = MacroBuilder::new()
        .with(group("A"))
        .with(group("B"))
        .with(run("C"))
        .build();

    let built = GraphBuilder::build(&nodes)?;
    let g = &built.graph;
    let (a, b, c) = (id_of(g, 0), id_of(g, 1), id_of(g, 2));

    let waiters = g
        .iter()
        .filter(|e| e.kind() == ExecutorKind::GroupWaiter)
        .map(|e| e.id())
        .collect::<Vec<_>>();
    assert_eq!(waiters.len(), 1);
    let waiter = waiters[0];

    assert_eq!(built.start, a);
    assert_eq!(g.get(a).unwrap().concurrent_starts(), &set(&[b]));
    assert_eq!(g.get(a).unwrap().successors(), &set(&[waiter]));
    assert_eq!(g.get(b).unwrap().successors(), &set(&[waiter]));
    assert_eq!(g.get(waiter).unwrap().awaited(), &[a, b]);
    assert_eq!(g.get(waiter).unwrap().successors(), &set(&[c]));
    assert_eq!(g.get(c).unwrap().predecessors(), &set(&[waiter]));
    assert_mirrored(g);
    Ok(())
}

#[test]
fn group_at_end_of_macro_still_gets_a_waiter() -> TestResult {
    let nodes = MacroBuilder::new()
        .with(run("A"))
        .with(group("B"))
        .with(group("C"))
        .build();

    let built = GraphBuilder::build(&nodes)?;
    let g = &built.graph;
    let (b, c) = (id_of(g, 1), id_of(g, 2));

    let waiter = g
        .iter()
        .find(|e| e.kind() == ExecutorKind::GroupWaiter)
        .expect("group waiter");
    assert_eq!(waiter.awaited(), &[b, c]);
    assert!(waiter.successors().is_empty());
    Ok(())
}

#[test]
fn after_command_hangs_off_its_dependency_not_the_main_stream() -> TestResult {
    let nodes = MacroBuilder::new()
        .with(run("A"))
        .with(run("B").after(&["A"]))
        .with(run("C"))
        .build();

    let built = GraphBuilder::build(&nodes)?;
    let g = &built.graph;
    let (a, b, c) = (id_of(g, 0), id_of(g, 1), id_of(g, 2));

    assert_eq!(g.get(a).unwrap().successors(), &set(&[b, c]));
    assert_eq!(g.get(b).unwrap().predecessors(), &set(&[a]));
    assert!(g.get(b).unwrap().successors().is_empty());
    assert_eq!(g.get(c).unwrap().predecessors(), &set(&[a]));
    assert_mirrored(g);
    Ok(())
}

#[test]
fn wait_command_awaits_its_targets_and_stays_on_the_main_stream() -> TestResult {
    let nodes = MacroBuilder::new()
        .with(run("A").start())
        .with(run("B").start())
        .with(wait(&["A", "B"]))
        .with(run("C"))
        .build();

    let built = GraphBuilder::build(&nodes)?;
    let g = &built.graph;
    let (a, b, w, c) = (id_of(g, 0), id_of(g, 1), id_of(g, 2), id_of(g, 3));

    assert_eq!(g.get(w).unwrap().kind(), ExecutorKind::Wait);
    assert_eq!(g.get(w).unwrap().awaited(), &[a, b]);
    assert!(g.get(a).unwrap().successors().contains(&w));
    assert!(g.get(b).unwrap().successors().contains(&w));
    assert_eq!(g.get(b).unwrap().concurrent_starts(), &set(&[w]));
    assert_eq!(g.get(w).unwrap().successors(), &set(&[c]));
    Ok(())
}

#[test]
fn wait_targets_can_be_created_ahead_of_their_position() -> TestResult {
    // Not a valid macro (the wait could never finish), but the builder must
    // still reuse the executor it created for the forward reference.
    let nodes = MacroBuilder::new()
        .with(run("A"))
        .with(wait(&["B"]))
        .with(run("B"))
        .build_unchecked();

    let built = GraphBuilder::build(&nodes)?;
    let g = &built.graph;

    assert_eq!(g.len(), 3);
    assert_eq!(g.get(id_of(g, 1)).unwrap().awaited(), &[id_of(g, 2)]);
    assert_eq!(g.get(id_of(g, 2)).unwrap().node(), Some(2));
    Ok(())
}

#[test]
fn macro_with_only_after_commands_has_no_start() {
    let nodes = MacroBuilder::new()
        .with(run("A").after(&["B"]))
        .with(run("B").after(&["A"]))
        .build_unchecked();

    let err = GraphBuilder::build(&nodes).unwrap_err();
    assert!(matches!(err, MacroError::NoStartCommand), "got {err:?}");
}

#[test]
fn unknown_reference_is_a_build_error() {
    let nodes = MacroBuilder::new()
        .with(run("A"))
        .with(run("B").after(&["missing"]))
        .build_unchecked();

    let err = GraphBuilder::build(&nodes).unwrap_err();
    match err {
        MacroError::UnknownProcess { location, name } => {
            assert_eq!(location.index, 2);
            assert_eq!(name, "missing");
        }
        other => panic!("expected UnknownProcess, got {other:?}"),
    }
}

#[test]
fn building_twice_gives_identical_adjacency() -> TestResult {
    let nodes = MacroBuilder::new()
        .with(run("A").start())
        .with(group("B"))
        .with(group("C"))
        .with(run("D").after(&["A", "B"]))
        .with(wait(&["A"]))
        .with(run("E"))
        .build();

    let first = GraphBuilder::build(&nodes)?;
    let second = GraphBuilder::build(&nodes)?;

    assert_eq!(first.start, second.start);
    assert_eq!(first.graph.adjacency(), second.graph.adjacency());
    Ok(())
}
