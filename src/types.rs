use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a command is placed relative to the main sequential stream.
///
/// - `None`: runs after the previous main-stream command finishes.
/// - `Start`: starts, and the *next* main-stream command starts alongside it
///   instead of waiting for it.
/// - `After`: not on the main stream at all; runs once every referenced
///   process has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modifier {
    #[default]
    None,
    Start,
    After,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::None => write!(f, "none"),
            Modifier::Start => write!(f, "start"),
            Modifier::After => write!(f, "after"),
        }
    }
}

/// Fixed result codes a macro run can end with, besides the exit code of a
/// process that tripped the termination condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// Bad macro, graph build failure, scheduler bug, forced shutdown.
    Fatal,
    /// The OS refused to start a process.
    CannotExecute,
    /// Cooperative cancellation was requested.
    Cancelled,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Fatal => 1,
            ExitCode::CannotExecute => 126,
            ExitCode::Cancelled => 130,
        }
    }
}

/// Wrapper so durations like `"10s"` can be parsed from the macro file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(HumanDuration)
    }
}

/// Parse strings such as `"500ms"`, `"10s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|_| format!("invalid number in duration '{s}'"))?;

    match unit_part.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
