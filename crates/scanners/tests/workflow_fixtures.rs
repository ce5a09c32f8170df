use biomethod_protocol::{Evidence, Position, ToolUsage};
use biomethod_scanners::{DialectScanner, ScannerSet};
use std::fs;
use std::path::Path;

fn extract(path: &Path) -> Vec<ToolUsage> {
    let scanners = ScannerSet::builtin();
    let scanner = scanners.route(path).expect("routed");
    scanner.extract(path).expect("readable")
}

#[test]
fn nextflow_merges_colocated_config_and_conda_manifest() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("envs")).unwrap();
    fs::write(
        dir.path().join("envs/align.yml"),
        "channels:\n  - bioconda\ndependencies:\n  - bioconda::bwa=0.7.17\n  - bioconda::samtools=1.17\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("nextflow.config"),
        "process {\n    withName: 'SALMON_QUANT' {\n        container = 'quay.io/biocontainers/salmon:1.10.1--h7e5ed60_0'\n    }\n    // container = 'quay.io/biocontainers/kallisto:0.48.0--h15996b6_2'\n}\n",
    )
    .unwrap();
    let main = dir.path().join("main.nf");
    fs::write(
        &main,
        "process ALIGN {\n    conda 'envs/align.yml'\n\n    script:\n    \"\"\"\n    bwa mem ref.fa ${reads} > out.sam\n    \"\"\"\n}\n",
    )
    .unwrap();

    let facts = extract(&main);
    let summary: Vec<_> = facts
        .iter()
        .map(|f| (f.name.as_str(), f.version.as_deref(), f.block.as_deref()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("bwa", Some("0.7.17"), Some("ALIGN")),
            ("samtools", Some("1.17"), Some("ALIGN")),
            ("bwa", None, Some("ALIGN")),
            ("salmon", Some("1.10.1"), Some("config")),
        ]
    );
    let config = facts.last().unwrap();
    assert!(config.source.ends_with("nextflow.config"));
    assert_eq!(config.position, Position::Line(3));
    assert!(matches!(facts[0].evidence, Evidence::Dependency { .. }));
}

#[test]
fn missing_conda_manifest_contributes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.nf");
    fs::write(
        &main,
        "process QC {\n    conda \"${moduleDir}/environment.yml\"\n    script:\n    \"\"\"\n    fastqc in.fq\n    \"\"\"\n}\n",
    )
    .unwrap();
    let names: Vec<_> = extract(&main).into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["fastqc"]);
}

#[test]
fn snakefile_resolves_conda_relative_to_workflow() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("qc.yaml"),
        "dependencies:\n  - fastqc=0.12.1\n  - pip:\n    - multiqc==1.14\n",
    )
    .unwrap();
    let snakefile = dir.path().join("Snakefile");
    fs::write(
        &snakefile,
        "rule qc:\n    conda: \"qc.yaml\"\n    shell: \"fastqc {input} && multiqc .\"\n",
    )
    .unwrap();

    let facts = extract(&snakefile);
    let summary: Vec<_> = facts
        .iter()
        .map(|f| (f.name.as_str(), f.version.as_deref(), f.position))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("fastqc", Some("0.12.1"), Position::Line(2)),
            ("multiqc", Some("1.14"), Position::Line(2)),
            ("fastqc", None, Position::Line(3)),
            ("multiqc", None, Position::Line(3)),
        ]
    );
}

#[test]
fn notebook_and_script_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("align.py");
    fs::write(
        &script,
        "import subprocess\nsubprocess.run(['hisat2', '-p', '8', '-x', 'idx'])\n",
    )
    .unwrap();
    let facts = extract(&script);
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].name, "hisat2");
    assert_eq!(facts[0].source, script.display().to_string());

    let nb = dir.path().join("explore.ipynb");
    fs::write(
        &nb,
        r#"{"metadata": {}, "cells": [{"cell_type": "code", "source": ["import pandas as pd"], "outputs": []}]}"#,
    )
    .unwrap();
    let facts = extract(&nb);
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].position, Position::Cell(0));
}

#[test]
fn missing_file_is_an_error() {
    let scanners = ScannerSet::builtin();
    let path = Path::new("/nonexistent/dir/run.py");
    let scanner = scanners.route(path).unwrap();
    assert!(scanner.extract(path).is_err());
}
