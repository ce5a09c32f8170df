//! Reproducibility scoring over a finished analysis.
//!
//! Ten fixed checks; the score is the share that pass. Inspectable failures
//! also yield one issue per offending fact.

use biomethod_protocol::{
    AnalysisResult, Check, Evidence, IssueCategory, ReproducibilityIssue, ReproducibilityReport,
    Severity, ToolUsage,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Substrings that mark a machine-specific absolute path.
pub const HARDCODED_PATH_PATTERNS: &[&str] = &["/home/", "/Users/", "C:\\", "/tmp/", "/var/"];

/// Parameter names accepted as a random seed (case-insensitive).
pub const SEED_PARAMETERS: &[&str] = &["seed", "random_seed", "random_state", "-s", "--seed"];

fn accession_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:GS[EM]\d+|SR[RXP]\d+|ER[RXP]\d+|DRR\d+|PRJ(?:NA|EB|DB)\d+|E-MTAB-\d+)\b")
            .ok()
    })
    .as_ref()
}

pub fn has_seed(tool: &ToolUsage) -> bool {
    tool.parameters.keys().any(|key| {
        SEED_PARAMETERS
            .iter()
            .any(|seed| seed.eq_ignore_ascii_case(key))
    })
}

pub fn needs_seed(tool: &ToolUsage) -> bool {
    tool.category.is_stochastic() && !has_seed(tool)
}

/// `(parameter, value)` pairs whose value embeds a hard-coded path, searching nested values.
pub fn hardcoded_paths(tool: &ToolUsage) -> Vec<(&str, &str)> {
    tool.parameters
        .iter()
        .filter_map(|(key, value)| {
            value
                .find_string(|s| HARDCODED_PATH_PATTERNS.iter().any(|p| s.contains(p)))
                .map(|hit| (key.as_str(), hit))
        })
        .collect()
}

pub fn references_public_data(tool: &ToolUsage) -> bool {
    let Some(re) = accession_pattern() else {
        return false;
    };
    tool.parameters
        .values()
        .any(|value| value.find_string(|s| re.is_match(s)).is_some())
}

/// Warnings appended to an analysis right after collection.
pub fn prescan_warnings(tools: &[ToolUsage]) -> Vec<String> {
    let mut warnings = Vec::new();
    for tool in tools.iter().filter(|tool| !tool.has_version()) {
        warnings.push(format!(
            "Tool '{}' has no version specified (source: {})",
            tool.name, tool.source
        ));
    }
    for tool in tools {
        for (key, value) in hardcoded_paths(tool) {
            warnings.push(format!(
                "Hardcoded path detected in {} parameter '{key}': {value}",
                tool.name
            ));
        }
    }
    for tool in tools.iter().filter(|tool| needs_seed(tool)) {
        warnings.push(format!(
            "Tool '{}' may need a random seed for reproducibility",
            tool.name
        ));
    }
    warnings
}

/// Evaluates the reproducibility checklist.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReproducibilityChecker;

impl ReproducibilityChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, result: &AnalysisResult) -> ReproducibilityReport {
        let tools = &result.tools;
        let environment = &result.environment;
        let mut issues = Vec::new();
        let mut checklist: BTreeMap<Check, bool> = BTreeMap::new();

        let unversioned: Vec<_> = tools.iter().filter(|t| !t.has_version()).collect();
        checklist.insert(Check::AllVersionsRecorded, unversioned.is_empty());
        issues.extend(unversioned.into_iter().map(|tool| {
            ReproducibilityIssue::new(
                Severity::Warning,
                IssueCategory::Version,
                format!("Tool '{}' has no version specified", tool.name),
            )
            .at(&tool.source, tool.position)
            .suggest("Record the exact version used in the analysis")
        }));

        let unseeded: Vec<_> = tools.iter().filter(|t| needs_seed(t)).collect();
        checklist.insert(Check::RandomSeedsSpecified, unseeded.is_empty());
        issues.extend(unseeded.into_iter().map(|tool| {
            ReproducibilityIssue::new(
                Severity::Info,
                IssueCategory::Seed,
                format!("Tool '{}' may benefit from a random seed", tool.name),
            )
            .at(&tool.source, tool.position)
            .suggest("Set a random seed for reproducibility")
        }));

        let mut path_free = true;
        for tool in tools {
            let Some((key, value)) = hardcoded_paths(tool).into_iter().next() else {
                continue;
            };
            path_free = false;
            issues.push(
                ReproducibilityIssue::new(
                    Severity::Warning,
                    IssueCategory::Path,
                    format!("Hardcoded path in {} parameter '{key}': {value}", tool.name),
                )
                .at(&tool.source, tool.position)
                .suggest("Use relative paths or configuration parameters"),
            );
        }
        checklist.insert(Check::NoHardcodedPaths, path_free);

        let has_spec = environment.has_environment_spec();
        checklist.insert(Check::EnvironmentSpecPresent, has_spec);
        if !has_spec {
            issues.push(
                ReproducibilityIssue::new(
                    Severity::Warning,
                    IssueCategory::Environment,
                    "No environment specification file found",
                )
                .suggest("Add a requirements.txt or environment.yml"),
            );
        }

        checklist.insert(Check::InputSourcesDocumented, true);
        checklist.insert(Check::ParametersRecorded, true);
        checklist.insert(Check::WorkflowDocumented, true);

        let containerized = !environment.containers.is_empty()
            || tools
                .iter()
                .any(|t| matches!(t.evidence, Evidence::Container { .. }));
        checklist.insert(Check::ContainerizationUsed, containerized);
        checklist.insert(Check::VersionControlUsed, environment.vcs_root.is_some());
        checklist.insert(
            Check::PublicDataUsed,
            tools.iter().any(references_public_data),
        );

        let report = ReproducibilityReport::new(issues, checklist);
        log::debug!(
            "reproducibility score {:.0} with {} issues",
            report.score,
            report.issues.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomethod_protocol::{Category, ParamValue, Position};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn fact(name: &str, category: Category) -> ToolUsage {
        ToolUsage::new(name, "analysis.py", Position::Line(4), Evidence::ApiCall)
            .with_category(category)
            .with_version(Some("1.0".into()))
    }

    fn result_with(tools: Vec<ToolUsage>) -> AnalysisResult {
        AnalysisResult {
            tools,
            ..Default::default()
        }
    }

    #[test]
    fn alignment_is_exempt_from_seed_issues() {
        let report = ReproducibilityChecker::new()
            .evaluate(&result_with(vec![fact("bwa", Category::Alignment)]));
        assert!(report.passed(Check::RandomSeedsSpecified));
        assert!(report
            .issues
            .iter()
            .all(|issue| issue.category != IssueCategory::Seed));
    }

    #[test]
    fn single_cell_without_seed_is_one_info_issue() {
        let mut seeded = fact("scanpy", Category::SingleCell);
        seeded
            .parameters
            .insert("random_state".into(), ParamValue::Integer(0));
        let report = ReproducibilityChecker::new().evaluate(&result_with(vec![
            fact("scanpy", Category::SingleCell),
            seeded,
        ]));
        let seed_issues: Vec<_> = report
            .issues
            .iter()
            .filter(|issue| issue.category == IssueCategory::Seed)
            .collect();
        assert_eq!(seed_issues.len(), 1);
        assert_eq!(seed_issues[0].severity, Severity::Info);
        assert_eq!(seed_issues[0].position, Some(Position::Line(4)));
        assert!(!report.passed(Check::RandomSeedsSpecified));
    }

    #[test]
    fn seed_names_are_case_insensitive() {
        let mut tool = fact("seurat", Category::SingleCell);
        tool.parameters.insert("SEED".into(), ParamValue::Integer(42));
        assert!(has_seed(&tool));
        tool.parameters.clear();
        tool.parameters.insert("--seed".into(), ParamValue::text("7"));
        assert!(!needs_seed(&tool));
    }

    #[test]
    fn hardcoded_paths_are_found_in_nested_values() {
        let mut tool = fact("star", Category::Alignment);
        tool.parameters.insert(
            "inputs".into(),
            ParamValue::List(vec![
                ParamValue::text("reads.fq"),
                ParamValue::text("/home/alice/ref.fa"),
            ]),
        );
        tool.parameters
            .insert("--outTmpDir".into(), ParamValue::text("/tmp/star"));
        assert_eq!(
            hardcoded_paths(&tool),
            vec![
                ("--outTmpDir", "/tmp/star"),
                ("inputs", "/home/alice/ref.fa"),
            ]
        );

        let report = ReproducibilityChecker::new().evaluate(&result_with(vec![tool]));
        let path_issues = report
            .issues
            .iter()
            .filter(|issue| issue.category == IssueCategory::Path)
            .count();
        assert_eq!(path_issues, 1);
        assert!(!report.passed(Check::NoHardcodedPaths));
    }

    #[test]
    fn empty_result_scores_defaults() {
        let report = ReproducibilityChecker::new().evaluate(&AnalysisResult::default());
        let expected: BTreeMap<Check, bool> = [
            (Check::AllVersionsRecorded, true),
            (Check::RandomSeedsSpecified, true),
            (Check::NoHardcodedPaths, true),
            (Check::EnvironmentSpecPresent, false),
            (Check::InputSourcesDocumented, true),
            (Check::ParametersRecorded, true),
            (Check::WorkflowDocumented, true),
            (Check::ContainerizationUsed, false),
            (Check::VersionControlUsed, false),
            (Check::PublicDataUsed, false),
        ]
        .into_iter()
        .collect();
        assert_eq!(report.checklist, expected);
        assert!((report.score - 60.0).abs() < f64::EPSILON);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].category, IssueCategory::Environment);
    }

    #[test]
    fn every_check_passing_scores_full_marks() {
        let mut fetch = ToolUsage::new(
            "sra-tools",
            "main.nf",
            Position::Line(3),
            Evidence::Container {
                image: "quay.io/biocontainers/sra-tools:3.0.3--h87f3376_0".into(),
            },
        )
        .with_version(Some("3.0.3".into()));
        fetch
            .parameters
            .insert("input".into(), ParamValue::text("SRR1234567"));
        let mut result = result_with(vec![fetch]);
        result.environment.manifest_files = vec!["environment.yml".into()];
        result.environment.vcs_root = Some("/work/repo".into());

        let report = ReproducibilityChecker::new().evaluate(&result);
        assert!(report.issues.is_empty());
        assert!((report.score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn accessions_mark_public_data() {
        let mut tool = fact("geoquery", Category::General);
        assert!(!references_public_data(&tool));
        for accession in ["GSE12345", "PRJNA257197", "E-MTAB-5061", "ERR188044"] {
            tool.parameters
                .insert("arg_0".into(), ParamValue::text(accession));
            assert!(references_public_data(&tool), "{accession}");
        }
        tool.parameters
            .insert("arg_0".into(), ParamValue::text("GSEA_results"));
        assert!(!references_public_data(&tool));
    }

    #[test]
    fn prescan_lists_versions_paths_then_seeds() {
        let mut unversioned = ToolUsage::new("fastp", "run.sh", Position::Line(1), Evidence::ShellCommand);
        unversioned
            .parameters
            .insert("-i".into(), ParamValue::text("/Users/bob/r1.fq"));
        let warnings = prescan_warnings(&[unversioned, fact("deseq2", Category::DifferentialExpression)]);
        assert_eq!(
            warnings,
            vec![
                "Tool 'fastp' has no version specified (source: run.sh)".to_string(),
                "Hardcoded path detected in fastp parameter '-i': /Users/bob/r1.fq".to_string(),
                "Tool 'deseq2' may need a random seed for reproducibility".to_string(),
            ]
        );
    }
}
