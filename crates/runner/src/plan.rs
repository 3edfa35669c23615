//! Test plan document model.
//!
//! A plan is a YAML document rooted at `testPlan`. Parsing is strict: unknown
//! keys are rejected at every level. The `type` and `mode` fields are matched
//! case-insensitively and tolerate surrounding quote characters.

use crate::errors::RunnerError;
use common::types::ProbeKind;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Root of a parsed plan. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TestPlan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub test_targets: Vec<TestTarget>,
}

/// One group of pods and the checks run against each of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TestTarget {
    #[serde(default)]
    pub name: String,
    /// Empty means all namespaces.
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod_selector: PodSelector,
    #[serde(default)]
    pub tests: Vec<Test>,
}

/// How pods are chosen for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PodSelector {
    /// `None` when the document omits it; selection then fails.
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: Option<SelectionMode>,
    #[serde(default)]
    pub labels: String,
    #[serde(default)]
    pub fields: String,
}

impl fmt::Display for PodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode: ")?;
        if let Some(mode) = self.mode {
            write!(f, "{mode}")?;
        }
        if !self.labels.is_empty() {
            write!(f, ", labels: {}", self.labels)?;
        }
        if !self.fields.is_empty() {
            write!(f, ", fields: {}", self.fields)?;
        }
        Ok(())
    }
}

/// Pod selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionMode {
    /// Every ready pod.
    All,
    /// One ready pod chosen uniformly at random.
    Random,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::All => "all",
            SelectionMode::Random => "random",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_enum(s).as_str() {
            "all" => Ok(SelectionMode::All),
            "random" => Ok(SelectionMode::Random),
            _ => Err(RunnerError::InvalidSelectionMode(s.to_string())),
        }
    }
}

/// A single connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Test {
    #[serde(default)]
    pub name: String,
    /// URL (HTTP), `host:port` (TCP) or host name (DNS).
    #[serde(default)]
    pub endpoint: String,
    /// Expected HTTP status; `0` expects a connection failure.
    #[serde(default)]
    pub status_code: u16,
    #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
    pub kind: ProbeKind,
    #[serde(default)]
    pub expect_fail: bool,
    #[serde(default, deserialize_with = "humantime_duration")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub probe_image: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct PlanDocument {
    test_plan: TestPlan,
}

/// Parse a plan document.
///
/// # Errors
///
/// - `RunnerError::MalformedPlan` - invalid YAML, unknown keys, missing
///   `testPlan.testTargets`, unknown probe type or selection mode, or an
///   invalid duration
pub fn parse_test_plan<R: Read>(reader: R) -> Result<TestPlan, RunnerError> {
    let document: PlanDocument =
        serde_yaml::from_reader(reader).map_err(|e| RunnerError::MalformedPlan(e.to_string()))?;
    Ok(document.test_plan)
}

/// Read and parse a plan file.
///
/// # Errors
///
/// - `RunnerError::PlanUnreadable` - the file cannot be opened
/// - `RunnerError::MalformedPlan` - see [`parse_test_plan`]
pub fn load_test_plan(path: &Path) -> Result<TestPlan, RunnerError> {
    let file = File::open(path)
        .map_err(|e| RunnerError::PlanUnreadable(format!("{}: {e}", path.display())))?;
    parse_test_plan(BufReader::new(file))
}

// YAML passes `"all"` and `'all'` through as-is when they appear inside a
// quoted scalar, so surrounding quotes are stripped before matching.
fn normalize_enum(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed);
    unquoted.trim().to_ascii_lowercase()
}

fn lenient_mode<'de, D>(deserializer: D) -> Result<Option<SelectionMode>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid selection mode: {raw:?}"))),
    }
}

fn lenient_kind<'de, D>(deserializer: D) -> Result<ProbeKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let normalized = normalize_enum(&raw);
    if normalized.is_empty() {
        return Ok(ProbeKind::Http);
    }
    normalized
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid test type: {raw:?}")))
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => humantime::parse_duration(raw.trim())
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {raw:?}: {e}"))),
    }
}
