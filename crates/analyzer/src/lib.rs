//! # Biomethod Analyzer
//!
//! Orchestrates tool-usage extraction over a file tree and scores the result
//! for reproducibility.
//!
//! ## Pipeline
//!
//! ```text
//! analyze(path, recursive)
//!     │
//!     ├──> FileScanner (ignore-aware walk, scanner extensions + special names)
//!     │
//!     ├──> ScannerSet per artifact (spawn_blocking, bounded by a semaphore)
//!     │    └─> facts merged in artifact order, failures become warnings
//!     │
//!     ├──> Workflow dialect inference
//!     │
//!     ├──> EnvironmentParser (manifests, container bases, .git root)
//!     │    + VersionOracle runtime versions
//!     │
//!     ├──> Enrichment (oracle → declared packages → knowledge base)
//!     │
//!     └──> Pre-scan warnings
//!
//! ReproducibilityChecker::evaluate(&AnalysisResult) → ReproducibilityReport
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use biomethod_analyzer::{Analyzer, AnalyzerConfig};
//!
//! # async fn run() -> biomethod_analyzer::Result<()> {
//! let analyzer = Analyzer::new(AnalyzerConfig::offline())?;
//! let result = analyzer.analyze("pipeline/", true).await;
//! let report = analyzer.reproducibility(&result);
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

mod analyzer;
mod config;
mod enrich;
mod environment;
mod error;
mod limits;
mod reproducibility;
mod scanner;
mod version;

pub use analyzer::{infer_workflow_dialect, Analyzer};
pub use config::AnalyzerConfig;
pub use enrich::{enrich_tools, fill_from_knowledge};
pub use environment::{
    dockerfile_images, parse_conda_dependency, parse_conda_yaml, parse_pyproject,
    parse_requirement, parse_requirements, singularity_images, vcs_root, EnvironmentParser,
    ManifestEnvironmentParser,
};
pub use error::{AnalyzerError, Result};
pub use limits::{scan_concurrency_from_env, MAX_SCAN_CONCURRENCY, SCAN_CONCURRENCY_ENV};
pub use reproducibility::{
    has_seed, hardcoded_paths, needs_seed, prescan_warnings, references_public_data,
    ReproducibilityChecker, HARDCODED_PATH_PATTERNS, SEED_PARAMETERS,
};
pub use scanner::{FileScanner, ScanOptions};
pub use version::{
    parse_version_output, CommandVersionOracle, NoVersionOracle, StaticVersionOracle,
    VersionOracle,
};
