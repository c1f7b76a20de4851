// tests/property_builder.rs

use std::sync::Arc;

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use macroseq::config::CommandNode;
use macroseq::dag::{ExecStatus, GraphBuilder};
use macroseq::engine::{MacroSequencer, RunOutcome, SequencerOptions, ShutdownCoordinator};
use macroseq_test_utils::builders::{MacroBuilder, run};
use macroseq_test_utils::fake_launcher::{FakeLauncher, LaunchEvent};

#[derive(Debug, Clone)]
enum Shape {
    Plain,
    Start,
    After(Vec<usize>),
}

// Strategy to generate a valid macro of `run` commands named p0, p1, ...
// AFTER references only point backwards, so the ordering is always acyclic,
// and the first command is never deferred.
fn macro_strategy(max_commands: usize) -> impl Strategy<Value = Vec<Shape>> {
    (1..=max_commands).prop_flat_map(|n| {
        proptest::collection::vec(
            (0..3u8, proptest::collection::vec(any::<usize>(), 1..3)),
            n,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (kind, deps))| match (i, kind) {
                    (_, 1) => Shape::Start,
                    (i, 2) if i > 0 => {
                        let mut deps: Vec<usize> = deps.into_iter().map(|d| d % i).collect();
                        deps.sort_unstable();
                        deps.dedup();
                        Shape::After(deps)
                    }
                    _ => Shape::Plain,
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("p{i}")
}

fn to_nodes(shapes: &[Shape]) -> Vec<CommandNode> {
    let mut builder = MacroBuilder::new();
    for (i, shape) in shapes.iter().enumerate() {
        let node = run(&name(i));
        let node = match shape {
            Shape::Plain => node,
            Shape::Start => node.start(),
            Shape::After(deps) => {
                let names: Vec<String> = deps.iter().map(|d| name(*d)).collect();
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                node.after(&refs)
            }
        };
        builder = builder.with(node);
    }
    builder.build()
}

fn started(i: usize) -> LaunchEvent {
    LaunchEvent::Started(name(i))
}

fn exited(i: usize) -> LaunchEvent {
    LaunchEvent::Exited {
        program: name(i),
        code: 0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn building_is_deterministic_and_mirrored(shapes in macro_strategy(10)) {
        let nodes = to_nodes(&shapes);
        let first = GraphBuilder::build(&nodes).expect("valid macro builds");
        let second = GraphBuilder::build(&nodes).expect("valid macro builds");

        prop_assert_eq!(first.start, second.start);
        prop_assert_eq!(first.graph.adjacency(), second.graph.adjacency());

        for executor in first.graph.iter() {
            for succ in executor.successors() {
                let target = first.graph.get(*succ).expect("successor exists");
                prop_assert!(target.predecessors().contains(&executor.id()));
            }
        }
    }

    #[test]
    fn every_command_runs_once_and_respects_its_ordering(shapes in macro_strategy(8)) {
        let nodes = to_nodes(&shapes);
        let launcher = FakeLauncher::new();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        let report = rt.block_on(async {
            let seq = MacroSequencer::new(
                Arc::new(launcher.clone()),
                SequencerOptions::new(std::env::temp_dir()),
                ShutdownCoordinator::new(),
            );
            seq.play(&nodes, CancellationToken::new()).await
        }).expect("play succeeds");

        prop_assert_eq!(&report.outcome, &RunOutcome::Completed);
        prop_assert_eq!(report.count_in(ExecStatus::Completed), shapes.len());
        prop_assert_eq!(launcher.started().len(), shapes.len());

        // AFTER commands start only once every referenced process has exited.
        for (i, shape) in shapes.iter().enumerate() {
            if let Shape::After(deps) = shape {
                for dep in deps {
                    prop_assert!(
                        launcher.position(&exited(*dep)) < launcher.position(&started(i)),
                        "p{} started before p{} exited", i, dep
                    );
                }
            }
        }

        // Consecutive main-stream commands: a START command only has to have
        // started, any other command has to have exited.
        let main: Vec<usize> = shapes
            .iter()
            .enumerate()
            .filter(|(_, s)| !matches!(s, Shape::After(_)))
            .map(|(i, _)| i)
            .collect();
        for pair in main.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let gate = match shapes[prev] {
                Shape::Start => started(prev),
                _ => exited(prev),
            };
            prop_assert!(
                launcher.position(&gate) < launcher.position(&started(next)),
                "p{} started too early after p{}", next, prev
            );
        }
    }
}
