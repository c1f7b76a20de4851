// src/dag/condition.rs

//! Exit-code predicates.
//!
//! - [`TerminationCondition`] decides whether a finished process aborts the
//!   whole run (`errorcond` commands replace the current one).
//! - [`Guard`] decides whether a command runs at all (`when = "build==0"`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(==|!=|<=|>=|<|>)\s*(-?\d+)\s*$").expect("comparison regex is valid")
});

static GUARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_.\-]+)\s*(==|!=|<=|>=|<|>)\s*(-?\d+)\s*$")
        .expect("guard regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn apply(self, lhs: i32, rhs: i32) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// Predicate over a process exit code; when it matches, the run aborts with
/// that exit code as its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCondition {
    Compare { op: CompareOp, value: i32 },
    /// Never abort, whatever the exit code.
    Never,
}

impl Default for TerminationCondition {
    fn default() -> Self {
        TerminationCondition::Compare {
            op: CompareOp::Ne,
            value: 0,
        }
    }
}

impl TerminationCondition {
    pub fn matches(&self, exit_code: i32) -> bool {
        match self {
            TerminationCondition::Compare { op, value } => op.apply(exit_code, *value),
            TerminationCondition::Never => false,
        }
    }
}

impl FromStr for TerminationCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("never") {
            return Ok(TerminationCondition::Never);
        }

        let caps = COMPARISON.captures(s).ok_or_else(|| {
            format!("invalid termination condition '{s}' (expected e.g. \"!=0\", \">=2\" or \"never\")")
        })?;

        let op = CompareOp::parse(&caps[1])
            .ok_or_else(|| format!("invalid comparison operator in '{s}'"))?;
        let value = caps[2]
            .parse::<i32>()
            .map_err(|e| format!("invalid exit code in '{s}': {e}"))?;

        Ok(TerminationCondition::Compare { op, value })
    }
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCondition::Compare { op, value } => write!(f, "{op}{value}"),
            TerminationCondition::Never => write!(f, "never"),
        }
    }
}

/// Skip guard: the command only runs if the named process finished with an
/// exit code satisfying the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub process: String,
    pub op: CompareOp,
    pub value: i32,
}

impl Guard {
    /// A process that has not (yet) recorded an exit code never satisfies a
    /// guard.
    pub fn evaluate(&self, exit_codes: &HashMap<String, i32>) -> bool {
        exit_codes
            .get(&self.process)
            .is_some_and(|code| self.op.apply(*code, self.value))
    }
}

impl FromStr for Guard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = GUARD.captures(s).ok_or_else(|| {
            format!("invalid guard '{s}' (expected e.g. \"build==0\")")
        })?;

        let op = CompareOp::parse(&caps[2])
            .ok_or_else(|| format!("invalid comparison operator in '{s}'"))?;
        let value = caps[3]
            .parse::<i32>()
            .map_err(|e| format!("invalid exit code in '{s}': {e}"))?;

        Ok(Guard {
            process: caps[1].to_string(),
            op,
            value,
        })
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.process, self.op, self.value)
    }
}
