// tests/real_process.rs
#![cfg(unix)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use macroseq::config::Action;
use macroseq::dag::ExecStatus;
use macroseq::engine::{MacroSequencer, RunOutcome, SequencerOptions, ShutdownCoordinator};
use macroseq::exec::{LaunchSpec, ProcessLauncher, TokioProcessLauncher};
use macroseq_test_utils::builders::{MacroBuilder, errorcond, run_args, shell};
use macroseq_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn shell_spec(line: &str, dir: &Path) -> LaunchSpec {
    LaunchSpec::for_action(
        &Action::Shell {
            line: line.to_string(),
        },
        "test",
        dir,
    )
    .expect("shell spec")
    .expect("shell starts a process")
}

fn sequencer(dir: &Path) -> MacroSequencer {
    let mut options = SequencerOptions::new(dir);
    options.terminate_grace = Duration::from_secs(2);
    MacroSequencer::new(
        Arc::new(TokioProcessLauncher),
        options,
        ShutdownCoordinator::new(),
    )
}

#[test]
fn actions_map_to_argv() -> TestResult {
    let dir = Path::new("/work");

    let run = LaunchSpec::for_action(
        &Action::Run {
            args: vec!["cargo".into(), "build".into(), "--release".into()],
        },
        "build",
        dir,
    )?
    .ok_or("run should start a process")?;
    assert_eq!(run.program, "cargo");
    assert_eq!(run.args, vec!["build", "--release"]);
    assert_eq!(run.working_dir, PathBuf::from("/work"));
    assert_eq!(run.label, "build");

    let sh = shell_spec("echo hi && exit 2", dir);
    assert_eq!(sh.program, "sh");
    assert_eq!(sh.args, vec!["-c", "echo hi && exit 2"]);

    let sub = LaunchSpec::for_action(
        &Action::SubMacro {
            path: PathBuf::from("nested/Macro.toml"),
        },
        "nested",
        dir,
    )?
    .ok_or("sub-macro should start a process")?;
    assert_eq!(
        sub.args,
        vec!["--macro", "/work/nested/Macro.toml", "--working-dir", "/work"]
    );

    let echo = LaunchSpec::for_action(
        &Action::Echo {
            text: "hi".into(),
        },
        "echo",
        dir,
    )?;
    assert!(echo.is_none());

    assert!(LaunchSpec::for_action(&Action::Run { args: vec![] }, "empty", dir).is_err());
    Ok(())
}

#[tokio::test]
async fn shell_exit_code_is_reported() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let mut handle = TokioProcessLauncher.launch(&shell_spec("exit 3", dir.path()))?;

    with_timeout(handle.wait()).await?;
    assert_eq!(with_timeout(handle.cleanup()).await, 3);
    Ok(())
}

#[tokio::test]
async fn terminate_stops_a_sleeping_process() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let mut handle = TokioProcessLauncher.launch(&shell_spec("exec sleep 30", dir.path()))?;
    assert!(handle.id().is_some());

    handle.terminate()?;
    with_timeout(handle.wait()).await?;
    assert_eq!(with_timeout(handle.cleanup()).await, 128 + libc::SIGTERM);
    Ok(())
}

#[tokio::test]
async fn missing_program_fails_to_launch() {
    init_tracing();
    let spec = LaunchSpec {
        label: "ghost".into(),
        program: "/definitely/not/a/program".into(),
        args: vec![],
        working_dir: std::env::temp_dir(),
    };

    let err = match TokioProcessLauncher.launch(&spec) {
        Ok(_) => panic!("launch should fail"),
        Err(e) => e,
    };
    assert!(format!("{err:#}").contains("/definitely/not/a/program"));
}

#[tokio::test]
async fn processes_run_in_the_working_directory() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("marker"), "x")?;

    let nodes = MacroBuilder::new()
        .with(shell("check", "test -f marker"))
        .build();
    let report = with_timeout(sequencer(dir.path()).play(&nodes, CancellationToken::new())).await?;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn last_exit_code_becomes_the_result() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let nodes = MacroBuilder::new()
        .with(errorcond("never"))
        .with(run_args("ok", &["true"]))
        .with(shell("four", "exit 4"))
        .build();

    let report = with_timeout(sequencer(dir.path()).play(&nodes, CancellationToken::new())).await?;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.exit_code(), 4);
    assert_eq!(report.exit_codes.get("ok"), Some(&0));
    Ok(())
}

#[tokio::test]
async fn failing_process_aborts_under_the_default_condition() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let nodes = MacroBuilder::new()
        .with(run_args("bad", &["false"]))
        .with(run_args("next", &["true"]))
        .build();

    let report = with_timeout(sequencer(dir.path()).play(&nodes, CancellationToken::new())).await?;

    assert!(matches!(report.outcome, RunOutcome::TerminationCondition { .. }));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.status_of("next"), Some(ExecStatus::Unexecuted));
    Ok(())
}

#[tokio::test]
async fn cancellation_terminates_a_real_process() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let nodes = MacroBuilder::new()
        .with(shell("sleeper", "exec sleep 30"))
        .build();
    let seq = sequencer(dir.path());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let report = with_timeout(seq.play(&nodes, cancel)).await?;

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.exit_code(), 130);
    assert_eq!(report.status_of("sleeper"), Some(ExecStatus::Terminated));
    assert_eq!(seq.active_process_count(), 0);
    Ok(())
}
