use biomethod_analyzer::{Analyzer, AnalyzerConfig, StaticVersionOracle};
use biomethod_protocol::{Check, Evidence, IssueCategory, Position, WorkflowDialect};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MAIN_NF: &str = r#"process FASTP {
    container 'quay.io/biocontainers/fastp:0.23.2--h79da9fb_0'

    script:
    """
    fastp -i ${reads[0]} -I ${reads[1]} -w 8 --detect_adapter_for_pe
    """
}
"#;

fn write(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn pipeline() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join(".git")).unwrap();
    write(root, "main.nf", MAIN_NF.as_bytes());
    write(
        root,
        "scripts/qc.py",
        b"import scanpy as sc\nsc.pp.neighbors(adata, n_neighbors=15)\n",
    );
    write(root, "scripts/plot.py", b"import matplotlib.pyplot as plt\n");
    write(
        root,
        "environment.yml",
        b"name: scrna\ndependencies:\n  - scanpy=1.9.3\n",
    );
    dir
}

fn analyzer() -> Analyzer {
    Analyzer::new(AnalyzerConfig::default())
        .unwrap()
        .with_oracle(StaticVersionOracle::new([("python", "3.11.4")]))
}

#[tokio::test]
async fn directory_analysis_merges_every_dialect() {
    let dir = pipeline();
    let result = analyzer().analyze(dir.path(), true).await;

    let names: Vec<_> = result.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["fastp", "fastp", "matplotlib", "scanpy", "scanpy"]);
    assert_eq!(result.workflow_dialect, Some(WorkflowDialect::Nextflow));
    assert_eq!(result.source_files.len(), 3);
    assert!(result.source_files[0].ends_with("main.nf"));

    let container = &result.tools[0];
    assert_eq!(container.version.as_deref(), Some("0.23.2"));
    assert_eq!(container.position, Position::Line(2));
    assert!(matches!(container.evidence, Evidence::Container { .. }));
    assert_eq!(container.block.as_deref(), Some("FASTP"));

    let shell = &result.tools[1];
    assert_eq!(shell.position, Position::Line(6));
    assert!(shell.parameters["-i"].is_placeholder());
    assert!(shell.citation.is_some(), "knowledge base fills citations");

    // declared in environment.yml
    assert!(result.tools[3..]
        .iter()
        .all(|t| t.version.as_deref() == Some("1.9.3")));

    assert_eq!(result.environment.runtime_version.as_deref(), Some("3.11.4"));
    assert_eq!(result.environment.conda_environment.as_deref(), Some("scrna"));
    assert!(result.environment.vcs_root.is_some());

    assert!(result
        .warnings
        .iter()
        .any(|w| w.starts_with("Tool 'matplotlib' has no version specified")));
    assert!(result
        .warnings
        .iter()
        .any(|w| w == "Tool 'scanpy' may need a random seed for reproducibility"));
}

#[tokio::test]
async fn reproducibility_report_reflects_the_analysis() {
    let dir = pipeline();
    let analyzer = analyzer();
    let result = analyzer.analyze(dir.path(), true).await;
    let report = analyzer.reproducibility(&result);

    assert!(!report.passed(Check::AllVersionsRecorded));
    assert!(!report.passed(Check::RandomSeedsSpecified));
    assert!(report.passed(Check::EnvironmentSpecPresent));
    assert!(report.passed(Check::ContainerizationUsed));
    assert!(report.passed(Check::VersionControlUsed));
    assert!(!report.passed(Check::PublicDataUsed));
    assert!((report.score - 70.0).abs() < 1e-9);
}

#[tokio::test]
async fn dockerfile_alone_is_not_an_environment_spec() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Dockerfile", b"FROM ubuntu:22.04\n");
    write(dir.path(), "run.py", b"import pysam\n");
    let analyzer = analyzer();
    let result = analyzer.analyze(dir.path(), true).await;
    let report = analyzer.reproducibility(&result);

    assert_eq!(result.environment.containers, vec!["ubuntu:22.04".to_string()]);
    assert!(result.environment.manifest_files.is_empty());
    assert!(!report.passed(Check::EnvironmentSpecPresent));
    assert!(report.passed(Check::ContainerizationUsed));
    let environment_issues = report
        .issues
        .iter()
        .filter(|issue| issue.category == IssueCategory::Environment)
        .count();
    assert_eq!(environment_issues, 1);
}

#[tokio::test]
async fn single_artifact_uses_its_directory_environment() {
    let dir = pipeline();
    let script = dir.path().join("scripts/qc.py");
    let result = analyzer().analyze(&script, false).await;

    assert_eq!(result.source_files, vec![script.display().to_string()]);
    assert_eq!(result.workflow_dialect, Some(WorkflowDialect::Python));
    assert!(result.tools.iter().all(|t| t.version.is_none()));
    assert!(result.environment.manifest_files.is_empty());
}

#[tokio::test]
async fn special_dialect_beats_script_majority() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Snakefile", b"rule qc:\n    shell: \"fastqc {input}\"\n");
    for name in ["a.py", "b.py", "c.py"] {
        write(dir.path(), name, b"import pandas\n");
    }
    let result = analyzer().analyze(dir.path(), true).await;
    assert_eq!(result.workflow_dialect, Some(WorkflowDialect::Snakemake));
}

#[tokio::test]
async fn unreadable_artifacts_become_warnings() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bad.py", &[0xff, 0xfe, 0x00, 0x9f]);
    write(dir.path(), "good.py", b"import pysam\n");
    write(dir.path(), "broken.py", b"def f(:\n    import pysam\n");

    let result = analyzer().analyze(dir.path(), true).await;

    let names: Vec<_> = result.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["samtools"]);
    let failures: Vec<_> = result
        .warnings
        .iter()
        .filter(|w| w.starts_with("Failed to scan"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("bad.py"));
    // broken syntax is not a failure
    assert_eq!(result.source_files.len(), 2);
}

#[tokio::test]
async fn shallow_analysis_ignores_subdirectories() {
    let dir = pipeline();
    let result = analyzer().analyze(dir.path(), false).await;
    assert_eq!(result.source_files.len(), 1);
    assert!(result.tools.iter().all(|t| t.name == "fastp"));
}

#[tokio::test]
async fn missing_path_is_a_warning() {
    let result = analyzer()
        .analyze("/definitely/not/here/pipeline", true)
        .await;
    assert!(result.tools.is_empty());
    assert_eq!(result.workflow_dialect, None);
    assert_eq!(
        result.warnings,
        vec!["Path does not exist: /definitely/not/here/pipeline".to_string()]
    );
}

#[tokio::test]
async fn repeated_analysis_is_identical() {
    let dir = pipeline();
    let analyzer = Analyzer::new(AnalyzerConfig {
        scan_concurrency: 4,
        ..AnalyzerConfig::offline()
    })
    .unwrap();
    let first = serde_json::to_string(&analyzer.analyze(dir.path(), true).await).unwrap();
    let second = serde_json::to_string(&analyzer.analyze(dir.path(), true).await).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn offline_config_ignores_the_oracle() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "run.py", b"import pysam\n");
    let analyzer = Analyzer::new(AnalyzerConfig::offline())
        .unwrap()
        .with_oracle(StaticVersionOracle::new([("samtools", "1.17"), ("python", "3.12.0")]));
    let result = analyzer.analyze(dir.path(), true).await;
    assert_eq!(result.tools[0].version, None);
    assert_eq!(result.environment.runtime_version, None);
}
