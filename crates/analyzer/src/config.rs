use crate::limits::{scan_concurrency_from_env, MAX_SCAN_CONCURRENCY};
use crate::scanner::ScanOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Ask the version oracle for missing tool versions and runtime versions
    pub detect_versions: bool,

    /// Upper bound for a single oracle invocation, in milliseconds
    pub oracle_timeout_ms: u64,

    /// Number of artifacts scanned in parallel
    pub scan_concurrency: usize,

    /// Honour .gitignore / global excludes while walking directories
    pub respect_gitignore: bool,

    /// Walk into hidden files and directories
    pub include_hidden: bool,

    /// Artifacts larger than this are skipped
    pub max_file_size_bytes: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            detect_versions: true,
            oracle_timeout_ms: 10_000,
            scan_concurrency: scan_concurrency_from_env(),
            respect_gitignore: true,
            include_hidden: false,
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

impl AnalyzerConfig {
    /// No external commands are run; versions come only from sources and manifests
    pub fn offline() -> Self {
        Self {
            detect_versions: false,
            ..Default::default()
        }
    }

    /// Walk everything, including hidden and ignored files, with a generous oracle timeout
    pub fn thorough() -> Self {
        Self {
            oracle_timeout_ms: 30_000,
            respect_gitignore: false,
            include_hidden: true,
            max_file_size_bytes: 64 * 1024 * 1024,
            ..Default::default()
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn scan_options(&self, recursive: bool) -> ScanOptions {
        ScanOptions {
            recursive,
            include_hidden: self.include_hidden,
            respect_gitignore: self.respect_gitignore,
            max_file_size_bytes: self.max_file_size_bytes,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.scan_concurrency == 0 || self.scan_concurrency > MAX_SCAN_CONCURRENCY {
            return Err(format!(
                "scan_concurrency ({}) must be within 1..={MAX_SCAN_CONCURRENCY}",
                self.scan_concurrency
            ));
        }

        if self.detect_versions && self.oracle_timeout_ms == 0 {
            return Err("oracle_timeout_ms must be > 0 when detect_versions is set".to_string());
        }

        if self.max_file_size_bytes == 0 {
            return Err("max_file_size_bytes must be > 0".to_string());
        }

        Ok(())
    }
}
