use crate::config::AnalyzerConfig;
use crate::enrich::enrich_tools;
use crate::environment::{EnvironmentParser, ManifestEnvironmentParser};
use crate::error::{AnalyzerError, Result};
use crate::reproducibility::{prescan_warnings, ReproducibilityChecker};
use crate::scanner::FileScanner;
use crate::version::{CommandVersionOracle, NoVersionOracle, VersionOracle};
use biomethod_knowledge::KnowledgeBase;
use biomethod_protocol::{
    AnalysisResult, EnvironmentSnapshot, ReproducibilityReport, ToolUsage, WorkflowDialect,
};
use biomethod_scanners::{Dialect, ScannerSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome of scanning one artifact: the scanner's dialect and its facts,
/// or `None` when no scanner handles the path.
type ArtifactScan = Result<Option<(Dialect, Vec<ToolUsage>)>>;

/// Drives one analysis: walk, scan, environment, enrichment, pre-scan warnings.
pub struct Analyzer {
    config: AnalyzerConfig,
    scanners: Arc<ScannerSet>,
    knowledge: Arc<KnowledgeBase>,
    oracle: Arc<dyn VersionOracle>,
    environment: Arc<dyn EnvironmentParser>,
}

impl Analyzer {
    /// Analyzer with the builtin scanners and knowledge base.
    ///
    /// Versions are resolved by running tools when `detect_versions` is set.
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate().map_err(AnalyzerError::config)?;
        let oracle: Arc<dyn VersionOracle> = if config.detect_versions {
            Arc::new(CommandVersionOracle::new(config.oracle_timeout()))
        } else {
            Arc::new(NoVersionOracle)
        };
        Ok(Self {
            config,
            scanners: Arc::new(ScannerSet::builtin()),
            knowledge: Arc::new(KnowledgeBase::builtin()),
            oracle,
            environment: Arc::new(ManifestEnvironmentParser::new()),
        })
    }

    #[must_use]
    pub fn with_scanners(mut self, scanners: ScannerSet) -> Self {
        self.scanners = Arc::new(scanners);
        self
    }

    #[must_use]
    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Arc::new(knowledge);
        self
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: impl VersionOracle + 'static) -> Self {
        self.oracle = Arc::new(oracle);
        self
    }

    #[must_use]
    pub fn with_environment_parser(mut self, parser: impl EnvironmentParser + 'static) -> Self {
        self.environment = Arc::new(parser);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Analyze a single artifact or a directory tree.
    ///
    /// Never fails: unreadable artifacts become warnings, unparseable ones
    /// contribute no facts.
    pub async fn analyze(&self, path: impl AsRef<Path>, recursive: bool) -> AnalysisResult {
        let path = path.as_ref();
        let started = Instant::now();
        let mut result = AnalysisResult::default();

        let (artifacts, env_dir) = if path.is_dir() {
            let scanner = FileScanner::for_scanners(path, &self.scanners);
            (
                scanner.scan(&self.config.scan_options(recursive)),
                path.to_path_buf(),
            )
        } else if path.is_file() {
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            (vec![path.to_path_buf()], parent.to_path_buf())
        } else {
            log::warn!("Path does not exist: {}", path.display());
            result.warnings.push(format!("Path does not exist: {}", path.display()));
            return result;
        };

        let mut dialects = Vec::new();
        for (artifact, outcome) in self.scan_artifacts(artifacts).await {
            match outcome {
                Ok(Some((dialect, facts))) => {
                    dialects.push(dialect);
                    result.source_files.push(artifact.display().to_string());
                    result.tools.extend(facts);
                }
                Ok(None) => log::debug!("no scanner handles {}", artifact.display()),
                Err(err) => {
                    log::warn!("Failed to scan {}: {err}", artifact.display());
                    result
                        .warnings
                        .push(format!("Failed to scan {}: {err}", artifact.display()));
                }
            }
        }
        result.workflow_dialect = infer_workflow_dialect(&dialects);

        result.environment = self.environment_snapshot(env_dir).await;
        enrich_tools(
            &mut result.tools,
            &self.knowledge,
            self.oracle(),
            &result.environment,
        )
        .await;
        result.warnings.extend(prescan_warnings(&result.tools));

        log::info!(
            "Analyzed {} artifacts: {} tools, {} warnings in {:?}",
            result.source_files.len(),
            result.tools.len(),
            result.warnings.len(),
            started.elapsed()
        );
        result
    }

    /// Reproducibility report for a finished analysis.
    pub fn reproducibility(&self, result: &AnalysisResult) -> ReproducibilityReport {
        ReproducibilityChecker::new().evaluate(result)
    }

    fn oracle(&self) -> &dyn VersionOracle {
        if self.config.detect_versions {
            self.oracle.as_ref()
        } else {
            &NoVersionOracle
        }
    }

    /// Scan artifacts in parallel; outcomes come back in input order.
    async fn scan_artifacts(&self, artifacts: Vec<PathBuf>) -> Vec<(PathBuf, ArtifactScan)> {
        let semaphore = Arc::new(Semaphore::new(self.config.scan_concurrency));
        let mut tasks = JoinSet::new();

        for (index, artifact) in artifacts.into_iter().enumerate() {
            let scanners = Arc::clone(&self.scanners);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let target = artifact.clone();
                let outcome = tokio::task::spawn_blocking(move || scan_artifact(&scanners, &target))
                    .await
                    .unwrap_or_else(|err| {
                        Err(AnalyzerError::Other(format!("scanner aborted: {err}")))
                    });
                (index, artifact, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => log::warn!("scan task failed: {err}"),
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);
        outcomes
            .into_iter()
            .map(|(_, artifact, outcome)| (artifact, outcome))
            .collect()
    }

    /// Declared environment of `dir` plus runtime versions from the oracle.
    async fn environment_snapshot(&self, dir: PathBuf) -> EnvironmentSnapshot {
        let parser = Arc::clone(&self.environment);
        let declared = tokio::task::spawn_blocking(move || parser.parse_directory(&dir))
            .await
            .unwrap_or_else(|err| {
                log::warn!("environment parsing aborted: {err}");
                EnvironmentSnapshot::default()
            });

        let oracle = self.oracle();
        let mut snapshot = EnvironmentSnapshot {
            runtime_version: oracle.resolve("python").await,
            secondary_runtime_version: oracle.resolve("r").await,
            ..Default::default()
        };
        snapshot.merge(declared);
        snapshot
    }
}

fn scan_artifact(scanners: &ScannerSet, path: &Path) -> ArtifactScan {
    let Some(scanner) = scanners.route(path) else {
        return Ok(None);
    };
    let facts = scanner.extract(path)?;
    log::debug!(
        "{} scanner found {} facts in {}",
        scanner.name(),
        facts.len(),
        path.display()
    );
    Ok(Some((scanner.dialect(), facts)))
}

/// Workflow dialect of a set of scanned artifacts.
///
/// A workflow-manager artifact wins outright (Nextflow before Snakemake);
/// otherwise the strictly larger of the Python and R families wins, else
/// `Script`. Nothing scanned yields `None`.
pub fn infer_workflow_dialect(dialects: &[Dialect]) -> Option<WorkflowDialect> {
    if dialects.is_empty() {
        return None;
    }
    let families: Vec<WorkflowDialect> = dialects
        .iter()
        .filter_map(|dialect| dialect.workflow_family())
        .collect();
    for manager in [WorkflowDialect::Nextflow, WorkflowDialect::Snakemake] {
        if families.contains(&manager) {
            return Some(manager);
        }
    }
    let count = |wanted: WorkflowDialect| families.iter().filter(|f| **f == wanted).count();
    let python = count(WorkflowDialect::Python);
    let r = count(WorkflowDialect::R);
    Some(if python > r {
        WorkflowDialect::Python
    } else if r > python {
        WorkflowDialect::R
    } else {
        WorkflowDialect::Script
    })
}
