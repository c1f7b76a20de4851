//! Shared helpers for `macroseq` integration tests.
//!
//! - [`builders`] assembles command lists without a macro file.
//! - [`fake_launcher`] stands in for real processes behind the
//!   `ProcessLauncher` seam.

pub mod builders;
pub mod fake_launcher;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use macroseq::logging::LOG_ENV_VAR;
use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for any single awaited step in a test. Scheduler bugs show up
/// as hangs, so every `play` and every poll loop goes through this.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a tracing subscriber once per test binary.
///
/// Reads the same `MACROSEQ_LOG` directive as the binary, defaulting to
/// `info`. Output goes through the test writer, so it only shows for failing
/// tests unless `--nocapture` is passed.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("test step timed out after {TEST_TIMEOUT:?}"))
}
