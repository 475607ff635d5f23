//! Participant reports, checkpoint identities and boundary status codes.

use super::{Result, TierError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;
use tracing::info;

/// Matches the part of an entry name that follows the collective name.
static VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-([0-9]+)$").expect("version suffix pattern is valid"));

/// Boundary result codes shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Operation or round completed successfully
    Success,
    /// Operation or round failed
    Failure,
    /// Nothing actionable yet (round still open, no qualifying entry)
    Ignored,
    /// Hard I/O failure such as a missing directory
    NotFound,
}

impl Status {
    /// Numeric code exposed at process boundaries.
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Ignored => 1,
            Self::NotFound => -1,
            Self::Failure => -2,
        }
    }

    /// Inverse of [`Status::code`].
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Ignored),
            -1 => Some(Self::NotFound),
            -2 => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Ignored => "ignored",
            Self::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// Kind of collective round a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundKind {
    Checkpoint,
    Restart,
}

/// Per-participant outcome of its share of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Failed,
}

/// One participant's report for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantReport {
    /// Participant (process rank) that produced the report
    pub participant_id: u32,
    /// Collective checkpoint name
    pub name: String,
    /// Round kind
    pub kind: RoundKind,
    /// Local outcome
    pub outcome: Outcome,
    /// Version being written, or requested for restart (0 = latest)
    pub version: u64,
}

impl ParticipantReport {
    pub fn new(
        participant_id: u32,
        name: impl Into<String>,
        kind: RoundKind,
        outcome: Outcome,
        version: u64,
    ) -> Self {
        Self {
            participant_id,
            name: name.into(),
            kind,
            outcome,
            version,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }

    /// Identity of the checkpoint this report refers to.
    pub fn identity(&self) -> CheckpointIdentity {
        CheckpointIdentity::new(self.name.clone(), self.version)
    }
}

/// Load participant reports from a JSONL file, one report per line.
pub fn load_reports(path: &Path) -> Result<Vec<ParticipantReport>> {
    let file = File::open(path).map_err(|e| TierError::io("opening reports file", e))?;
    let reader = BufReader::new(file);
    let mut reports = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TierError::io("reading reports file", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let report: ParticipantReport = serde_json::from_str(&line)
            .map_err(|e| TierError::ParseError(format!("Line {}: {}", line_num + 1, e)))?;
        reports.push(report);
    }

    info!(count = reports.len(), "Loaded reports");
    Ok(reports)
}

/// A named, versioned collective checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointIdentity {
    pub name: String,
    pub version: u64,
}

impl CheckpointIdentity {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// On-disk stamp: `<name>-<version>`.
    pub fn stamp(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Check that `name` stays a single path component inside a tier root.
    ///
    /// Rejects empty names, names containing `/` or NUL, and names starting
    /// with `.`, which covers `.`, `..` and the hidden staging directories.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\0']) {
            return Err(TierError::Malformed(name.to_string()));
        }
        Ok(())
    }

    /// Parse the version out of `entry` if it is exactly `<prefix>-<digits>`.
    ///
    /// Anything after the digits disqualifies the entry, as does a version
    /// that does not fit in a `u64`.
    pub fn parse_version(prefix: &str, entry: &str) -> Option<u64> {
        let rest = entry.strip_prefix(prefix)?;
        let caps = VERSION_SUFFIX.captures(rest)?;
        caps[1].parse().ok()
    }
}

impl fmt::Display for CheckpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}
