use crate::Position;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Version,
    Seed,
    Path,
    Parameter,
    Environment,
}

/// One reproducibility problem found in an analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReproducibilityIssue {
    pub severity: Severity,
    pub category: IssueCategory,
    pub message: String,
    pub source: Option<String>,
    pub position: Option<Position>,
    pub suggestion: Option<String>,
}

impl ReproducibilityIssue {
    pub fn new(severity: Severity, category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            source: None,
            position: None,
            suggestion: None,
        }
    }

    #[must_use]
    pub fn at(mut self, source: impl Into<String>, position: Position) -> Self {
        self.source = Some(source.into());
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// The ten checklist items, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    AllVersionsRecorded,
    RandomSeedsSpecified,
    NoHardcodedPaths,
    EnvironmentSpecPresent,
    InputSourcesDocumented,
    ParametersRecorded,
    WorkflowDocumented,
    ContainerizationUsed,
    VersionControlUsed,
    PublicDataUsed,
}

impl Check {
    pub const ALL: [Self; 10] = [
        Self::AllVersionsRecorded,
        Self::RandomSeedsSpecified,
        Self::NoHardcodedPaths,
        Self::EnvironmentSpecPresent,
        Self::InputSourcesDocumented,
        Self::ParametersRecorded,
        Self::WorkflowDocumented,
        Self::ContainerizationUsed,
        Self::VersionControlUsed,
        Self::PublicDataUsed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::AllVersionsRecorded => "All software versions recorded",
            Self::RandomSeedsSpecified => "Random seeds specified",
            Self::NoHardcodedPaths => "No hardcoded paths",
            Self::EnvironmentSpecPresent => "Environment specification present",
            Self::InputSourcesDocumented => "Input data sources documented",
            Self::ParametersRecorded => "Parameters recorded",
            Self::WorkflowDocumented => "Workflow documented",
            Self::ContainerizationUsed => "Containerization used",
            Self::VersionControlUsed => "Version control used",
            Self::PublicDataUsed => "Public data repository used",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReproducibilityReport {
    pub issues: Vec<ReproducibilityIssue>,
    /// Percentage of passed checklist items, 0..=100
    pub score: f64,
    pub checklist: BTreeMap<Check, bool>,
}

impl ReproducibilityReport {
    /// Build a report from checklist outcomes; the score is derived, never set directly.
    pub fn new(issues: Vec<ReproducibilityIssue>, checklist: BTreeMap<Check, bool>) -> Self {
        let passed = checklist.values().filter(|ok| **ok).count();
        let score = if checklist.is_empty() {
            0.0
        } else {
            passed as f64 / checklist.len() as f64 * 100.0
        };
        Self {
            issues,
            score,
            checklist,
        }
    }

    pub fn passed(&self, check: Check) -> bool {
        self.checklist.get(&check).copied().unwrap_or(false)
    }

    pub fn issues_with(&self, severity: Severity) -> impl Iterator<Item = &ReproducibilityIssue> {
        self.issues.iter().filter(move |issue| issue.severity == severity)
    }

    /// Short plain-text rendering: score line, checklist, then issue counts.
    pub fn summary(&self) -> String {
        let mut out = format!("Reproducibility score: {:.0}/100\n", self.score);
        for check in Check::ALL {
            let mark = if self.passed(check) { "x" } else { " " };
            out.push_str(&format!("[{mark}] {}\n", check.label()));
        }
        let count = |s| self.issues_with(s).count();
        out.push_str(&format!(
            "Issues: {} error, {} warning, {} info\n",
            count(Severity::Error),
            count(Severity::Warning),
            count(Severity::Info)
        ));
        out
    }
}
