// tests/executor_state.rs

use std::error::Error;

use macroseq::dag::{ExecGraph, ExecStatus, ExecutorKind, WaitProgress};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn legal_transitions_follow_the_state_machine() {
    use ExecStatus::*;

    let allowed = [
        (Unexecuted, Skipped),
        (Unexecuted, Completed),
        (Unexecuted, Running),
        (Running, ProcFinished),
        (Running, Terminated),
        (ProcFinished, Completed),
        (ProcFinished, Terminated),
    ];
    let all = [Unexecuted, Running, ProcFinished, Completed, Skipped, Terminated];

    for from in all {
        for to in all {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
}

#[test]
fn terminal_states_never_move() {
    for status in [ExecStatus::Completed, ExecStatus::Skipped, ExecStatus::Terminated] {
        assert!(status.is_terminal());
        assert!(!status.can_transition_to(ExecStatus::Running));
        assert!(!status.can_transition_to(ExecStatus::Unexecuted));
    }
    assert!(ExecStatus::Skipped.is_finished());
    assert!(!ExecStatus::Terminated.is_finished());
}

#[test]
fn transition_records_exit_code_and_rejects_regression() -> TestResult {
    let mut graph = ExecGraph::new();
    let id = graph.get_or_create(0, ExecutorKind::Command);
    let executor = graph.get(id).unwrap();

    executor.transition(ExecStatus::Running, None)?;
    assert!(executor.finish_process(3, false));
    assert_eq!(executor.status(), ExecStatus::ProcFinished);

    let state = executor.transition(ExecStatus::Completed, None)?;
    assert_eq!(state.exit_code, Some(3), "exit code kept when none is given");

    let err = executor
        .transition(ExecStatus::Running, None)
        .unwrap_err();
    assert_eq!(err.from, ExecStatus::Completed);
    assert_eq!(err.to, ExecStatus::Running);
    assert_eq!(executor.status(), ExecStatus::Completed);
    Ok(())
}

#[test]
fn finish_process_only_applies_to_running_executors() -> TestResult {
    let mut graph = ExecGraph::new();
    let id = graph.get_or_create(0, ExecutorKind::Command);
    let executor = graph.get(id).unwrap();

    assert!(!executor.finish_process(0, false), "not started yet");

    executor.transition(ExecStatus::Running, None)?;
    assert!(executor.finish_process(143, true));
    assert_eq!(executor.status(), ExecStatus::Terminated);
    assert_eq!(executor.exit_code(), Some(143));

    assert!(!executor.finish_process(0, false), "second report ignored");
    Ok(())
}

#[test]
fn abandon_terminates_running_and_unsettled_processes() -> TestResult {
    let mut graph = ExecGraph::new();
    let running = graph.get_or_create(0, ExecutorKind::Command);
    let finished = graph.get_or_create(1, ExecutorKind::Command);
    let idle = graph.get_or_create(2, ExecutorKind::Command);

    graph.get(running).unwrap().transition(ExecStatus::Running, None)?;
    let f = graph.get(finished).unwrap();
    f.transition(ExecStatus::Running, None)?;
    f.finish_process(0, false);

    assert!(graph.get(running).unwrap().abandon());
    assert!(graph.get(finished).unwrap().abandon());
    assert!(!graph.get(idle).unwrap().abandon());

    assert_eq!(
        graph.in_status(ExecStatus::Terminated),
        vec![running, finished]
    );
    assert_eq!(graph.get(idle).unwrap().status(), ExecStatus::Unexecuted);
    Ok(())
}

#[test]
fn wait_progress_defers_until_every_target_finished() -> TestResult {
    let mut graph = ExecGraph::new();
    let a = graph.get_or_create(0, ExecutorKind::Command);
    let b = graph.get_or_create(1, ExecutorKind::Command);
    let w = graph.get_or_create(2, ExecutorKind::Wait);
    graph.add_awaited(w, a);
    graph.add_awaited(w, b);

    assert_eq!(graph.wait_progress(w), WaitProgress::Pending { remaining: 2 });

    let ea = graph.get(a).unwrap();
    ea.transition(ExecStatus::Running, None)?;
    ea.finish_process(4, false);
    // PROC_FINISHED does not count as finished yet.
    assert_eq!(graph.wait_progress(w), WaitProgress::Pending { remaining: 2 });
    ea.transition(ExecStatus::Completed, None)?;

    // Asking again without progress must not change the answer.
    assert_eq!(graph.wait_progress(w), WaitProgress::Pending { remaining: 1 });
    assert_eq!(graph.wait_progress(w), WaitProgress::Pending { remaining: 1 });

    graph.get(b).unwrap().transition(ExecStatus::Skipped, None)?;
    assert_eq!(
        graph.wait_progress(w),
        WaitProgress::Done { exit_code: Some(4) },
        "skipped target without a code leaves the last code in place"
    );
    Ok(())
}

#[test]
fn wait_progress_takes_the_last_non_null_exit_code() -> TestResult {
    let mut graph = ExecGraph::new();
    let a = graph.get_or_create(0, ExecutorKind::Command);
    let b = graph.get_or_create(1, ExecutorKind::Command);
    let waiter = graph.add_group_waiter();
    graph.add_awaited(waiter, a);
    graph.add_awaited(waiter, b);

    graph.get(a).unwrap().transition(ExecStatus::Completed, Some(1))?;
    graph.get(b).unwrap().transition(ExecStatus::Completed, Some(2))?;

    assert_eq!(
        graph.wait_progress(waiter),
        WaitProgress::Done { exit_code: Some(2) }
    );
    Ok(())
}

#[test]
fn removing_an_edge_removes_its_mirror() {
    let mut graph = ExecGraph::new();
    let a = graph.get_or_create(0, ExecutorKind::Command);
    let b = graph.get_or_create(1, ExecutorKind::Command);

    graph.add_successor(a, b);
    assert!(graph.get(b).unwrap().predecessors().contains(&a));

    graph.remove_successor(a, b);
    assert!(graph.get(a).unwrap().successors().is_empty());
    assert!(graph.get(b).unwrap().predecessors().is_empty());
}
