// tests/cli_args.rs

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use macroseq::cli::{CliArgs, LogLevel};
use macroseq::config::default_macro_path;
use macroseq::dag::TerminationCondition;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn defaults_to_macro_toml() -> TestResult {
    let args = CliArgs::try_parse_from(["macroseq"])?;

    assert_eq!(args.macro_path, default_macro_path());
    assert!(args.working_dir.is_none());
    assert!(args.errorcond.is_none());
    assert!(args.log_level.is_none());
    assert!(!args.dry_run);
    Ok(())
}

#[test]
fn parses_every_flag() -> TestResult {
    let args = CliArgs::try_parse_from([
        "macroseq",
        "--macro",
        "ci/Build.toml",
        "--working-dir",
        "/tmp/build",
        "--errorcond",
        "never",
        "--log-level",
        "debug",
        "--dry-run",
    ])?;

    assert_eq!(args.macro_path, PathBuf::from("ci/Build.toml"));
    assert_eq!(args.working_dir, Some(PathBuf::from("/tmp/build")));
    assert_eq!(args.errorcond, Some(TerminationCondition::Never));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(args.dry_run);
    Ok(())
}

#[test]
fn rejects_a_malformed_errorcond() {
    let err = CliArgs::try_parse_from(["macroseq", "--errorcond", "sometimes"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
}
