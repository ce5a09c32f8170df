//! # BioMethod Protocol
//!
//! Shared data model for tool-usage extraction: the facts emitted by dialect
//! scanners, the aggregate analysis result, and the reproducibility report.
//! Everything here is plain data with serde + JSON schema support so an
//! external renderer can consume it without linking the scanners.

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

mod report;
mod value;

pub use report::{Check, IssueCategory, ReproducibilityIssue, ReproducibilityReport, Severity};
pub use value::{
    ParamValue, Parameters, PLACEHOLDER_KEY, PLACEHOLDER_VARIABLE, REFERENCE_SENTINEL,
};

pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Normalize a tool name for lookups: lowercase, spaces and hyphens become `_`.
pub fn normalize_tool_name(name: &str) -> String {
    name.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Fixed taxonomy of tool categories.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Alignment,
    Quantification,
    VariantCalling,
    QualityControl,
    Preprocessing,
    DifferentialExpression,
    SingleCell,
    Enrichment,
    Annotation,
    Genomics,
    Visualization,
    Statistics,
    General,
    Shell,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alignment => "alignment",
            Self::Quantification => "quantification",
            Self::VariantCalling => "variant-calling",
            Self::QualityControl => "quality-control",
            Self::Preprocessing => "preprocessing",
            Self::DifferentialExpression => "differential-expression",
            Self::SingleCell => "single-cell",
            Self::Enrichment => "enrichment",
            Self::Annotation => "annotation",
            Self::Genomics => "genomics",
            Self::Visualization => "visualization",
            Self::Statistics => "statistics",
            Self::General => "general",
            Self::Shell => "shell",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a category label; anything outside the taxonomy is `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().replace('_', "-").as_str() {
            "alignment" => Self::Alignment,
            "quantification" => Self::Quantification,
            "variant-calling" => Self::VariantCalling,
            "quality-control" => Self::QualityControl,
            "preprocessing" => Self::Preprocessing,
            "differential-expression" => Self::DifferentialExpression,
            "single-cell" => Self::SingleCell,
            "enrichment" => Self::Enrichment,
            "annotation" => Self::Annotation,
            "genomics" => Self::Genomics,
            "visualization" => Self::Visualization,
            "statistics" => Self::Statistics,
            "general" => Self::General,
            "shell" => Self::Shell,
            _ => Self::Unknown,
        }
    }

    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Categories whose methods are stochastic and expected to pin a random seed.
    pub const fn is_stochastic(self) -> bool {
        matches!(self, Self::SingleCell | Self::DifferentialExpression)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Citation record for a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Citation {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Citation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            doi: None,
            url: None,
        }
    }
}

/// Where in an artifact a fact was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Position {
    /// 1-indexed line number.
    Line(usize),
    /// Ordinal of a notebook cell (0-indexed, counting every cell).
    Cell(usize),
}

impl Position {
    pub const fn index(self) -> usize {
        match self {
            Self::Line(n) | Self::Cell(n) => n,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(n) => write!(f, "line {n}"),
            Self::Cell(n) => write!(f, "cell {n}"),
        }
    }
}

/// Which extraction rule produced a fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Import,
    ShellCommand,
    ApiCall,
    Container { image: String },
    Dependency { spec: String },
    Wrapper { path: String },
    Library,
    FunctionCall,
}

/// One detected occurrence of a tool invocation.
///
/// Identity (for `Eq`/`Hash`) is `(name, version, source, position)`; two facts
/// with the same tuple describe the same occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolUsage {
    /// Canonical tool name
    pub name: String,
    pub version: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub category: Category,
    pub citation: Option<Citation>,
    /// Source artifact identifier
    pub source: String,
    pub position: Position,
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub evidence: Evidence,
    /// Owning workflow block (process or rule name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
}

impl ToolUsage {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        position: Position,
        evidence: Evidence,
    ) -> Self {
        Self {
            name: name.into(),
            version: None,
            parameters: Parameters::new(),
            category: Category::Unknown,
            citation: None,
            source: source.into(),
            position,
            description: None,
            aliases: Vec::new(),
            evidence,
            block: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version.filter(|v| !v.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub const fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn in_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    pub fn has_version(&self) -> bool {
        self.version.as_deref().is_some_and(|v| !v.is_empty())
    }

    pub fn identity(&self) -> (&str, Option<&str>, &str, Position) {
        (
            &self.name,
            self.version.as_deref(),
            &self.source,
            self.position,
        )
    }
}

impl PartialEq for ToolUsage {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ToolUsage {}

impl Hash for ToolUsage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// Declared runtime environment of an analyzed directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentSnapshot {
    /// Interpreter version (Python)
    pub runtime_version: Option<String>,
    /// Secondary-language runtime version (R)
    pub secondary_runtime_version: Option<String>,
    pub conda_environment: Option<String>,
    /// Declared package -> pinned version (None when unpinned)
    #[serde(default)]
    pub packages: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub containers: Vec<String>,
    /// Dependency manifests (requirements, conda, pyproject)
    #[serde(default)]
    pub manifest_files: Vec<String>,
    /// Container build files (Dockerfile, Singularity definitions)
    #[serde(default)]
    pub container_files: Vec<String>,
    /// Nearest enclosing version-control root, if any
    pub vcs_root: Option<String>,
}

impl EnvironmentSnapshot {
    /// Pinned version declared for `name`, matched case- and separator-insensitively.
    pub fn declared_version(&self, name: &str) -> Option<&str> {
        if let Some(Some(version)) = self.packages.get(name) {
            return Some(version);
        }
        let wanted = normalize_tool_name(name);
        self.packages
            .iter()
            .find(|(pkg, _)| normalize_tool_name(pkg) == wanted)
            .and_then(|(_, version)| version.as_deref())
    }

    /// A dependency manifest was found; container build files do not count.
    pub fn has_environment_spec(&self) -> bool {
        !self.manifest_files.is_empty()
    }

    /// Merge another snapshot in; fields already set here win.
    pub fn merge(&mut self, other: Self) {
        if self.runtime_version.is_none() {
            self.runtime_version = other.runtime_version;
        }
        if self.secondary_runtime_version.is_none() {
            self.secondary_runtime_version = other.secondary_runtime_version;
        }
        if self.conda_environment.is_none() {
            self.conda_environment = other.conda_environment;
        }
        if self.vcs_root.is_none() {
            self.vcs_root = other.vcs_root;
        }
        for (name, version) in other.packages {
            self.packages.entry(name).or_insert(version);
        }
        for image in other.containers {
            if !self.containers.contains(&image) {
                self.containers.push(image);
            }
        }
        for file in other.manifest_files {
            if !self.manifest_files.contains(&file) {
                self.manifest_files.push(file);
            }
        }
        for file in other.container_files {
            if !self.container_files.contains(&file) {
                self.container_files.push(file);
            }
        }
    }
}

/// Overall workflow dialect inferred for an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowDialect {
    Nextflow,
    Snakemake,
    Python,
    R,
    Script,
}

impl WorkflowDialect {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nextflow => "nextflow",
            Self::Snakemake => "snakemake",
            Self::Python => "python",
            Self::R => "r",
            Self::Script => "script",
        }
    }

    pub const fn is_workflow_manager(self) -> bool {
        matches!(self, Self::Nextflow | Self::Snakemake)
    }
}

impl fmt::Display for WorkflowDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate result of one analysis invocation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub schema_version: u32,
    pub tools: Vec<ToolUsage>,
    /// Artifacts that were routed to a scanner
    pub source_files: Vec<String>,
    pub workflow_dialect: Option<WorkflowDialect>,
    pub environment: EnvironmentSnapshot,
    pub warnings: Vec<String>,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION,
            tools: Vec::new(),
            source_files: Vec::new(),
            workflow_dialect: None,
            environment: EnvironmentSnapshot::default(),
            warnings: Vec::new(),
        }
    }
}

impl AnalysisResult {
    pub fn tools_by_category(&self) -> BTreeMap<Category, Vec<&ToolUsage>> {
        let mut groups: BTreeMap<Category, Vec<&ToolUsage>> = BTreeMap::new();
        for tool in &self.tools {
            groups.entry(tool.category).or_default().push(tool);
        }
        groups
    }

    /// First occurrence of every distinct `(name, version)` pair, in fact order.
    pub fn unique_tools(&self) -> Vec<&ToolUsage> {
        let mut seen: HashSet<(&str, Option<&str>)> = HashSet::new();
        self.tools
            .iter()
            .filter(|tool| seen.insert((tool.name.as_str(), tool.version.as_deref())))
            .collect()
    }

    /// Sorted, deduplicated citation texts.
    pub fn citations(&self) -> Vec<String> {
        let mut citations: Vec<String> = self
            .tools
            .iter()
            .filter_map(|tool| tool.citation.as_ref())
            .map(|citation| citation.text.clone())
            .filter(|text| !text.is_empty())
            .collect();
        citations.sort();
        citations.dedup();
        citations
    }
}

/// JSON schema of [`AnalysisResult`] for external renderers.
pub fn analysis_result_schema() -> Result<serde_json::Value> {
    let schema = schemars::schema_for!(AnalysisResult);
    serde_json::to_value(schema).map_err(Into::into)
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn usage(name: &str, version: Option<&str>, line: usize) -> ToolUsage {
        ToolUsage::new(name, "a.py", Position::Line(line), Evidence::Import)
            .with_version(version.map(str::to_string))
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_tool_name("BWA-MEM2"), "bwa_mem2");
        assert_eq!(normalize_tool_name(" Feature Counts "), "feature_counts");
    }

    #[test]
    fn category_round_trips_through_labels() {
        assert_eq!(Category::parse("single-cell"), Category::SingleCell);
        assert_eq!(Category::parse("Variant_Calling"), Category::VariantCalling);
        assert_eq!(Category::parse("something-else"), Category::Unknown);
        let json = serde_json::to_string(&Category::QualityControl).unwrap();
        assert_eq!(json, "\"quality-control\"");
        let parsed: Category = serde_json::from_str("\"no-such\"").unwrap();
        assert_eq!(parsed, Category::Unknown);
    }

    #[test]
    fn identity_ignores_parameters() {
        let mut a = usage("fastp", Some("0.23.2"), 3);
        let b = usage("fastp", Some("0.23.2"), 3);
        a.parameters.insert("-w".into(), ParamValue::text("8"));
        assert_eq!(a, b);

        let set: HashSet<ToolUsage> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unique_tools_dedups_by_name_and_version() {
        let result = AnalysisResult {
            tools: vec![
                usage("star", None, 1),
                usage("star", None, 9),
                usage("star", Some("2.7.10a"), 12),
                usage("salmon", None, 4),
            ],
            ..AnalysisResult::default()
        };
        let unique: Vec<_> = result
            .unique_tools()
            .into_iter()
            .map(|t| (t.name.as_str(), t.version.as_deref(), t.position))
            .collect();
        assert_eq!(
            unique,
            vec![
                ("star", None, Position::Line(1)),
                ("star", Some("2.7.10a"), Position::Line(12)),
                ("salmon", None, Position::Line(4)),
            ]
        );
    }

    #[test]
    fn groups_and_citations() {
        let mut a = usage("star", None, 1).with_category(Category::Alignment);
        a.citation = Some(Citation::new("Dobin 2013"));
        let mut b = usage("salmon", None, 2).with_category(Category::Quantification);
        b.citation = Some(Citation::new("Patro 2017"));
        let mut c = usage("star", None, 3).with_category(Category::Alignment);
        c.citation = Some(Citation::new("Dobin 2013"));
        let result = AnalysisResult {
            tools: vec![a, b, c],
            ..AnalysisResult::default()
        };

        let groups = result.tools_by_category();
        assert_eq!(groups[&Category::Alignment].len(), 2);
        assert_eq!(groups[&Category::Quantification].len(), 1);
        assert_eq!(result.citations(), vec!["Dobin 2013", "Patro 2017"]);
    }

    #[test]
    fn declared_version_matches_normalized_names() {
        let mut env = EnvironmentSnapshot::default();
        env.packages
            .insert("scikit-learn".into(), Some("1.3.0".into()));
        env.packages.insert("numpy".into(), None);
        assert_eq!(env.declared_version("scikit_learn"), Some("1.3.0"));
        assert_eq!(env.declared_version("numpy"), None);
        assert_eq!(env.declared_version("pandas"), None);
    }

    #[test]
    fn schema_is_generated() {
        let schema = analysis_result_schema().unwrap();
        assert!(schema.to_string().contains("workflow_dialect"));
    }
}
