use crate::error::{Result, ScanError};
use biomethod_protocol::WorkflowDialect;

/// Extension-less (or otherwise special) file names that mark a Snakemake workflow.
pub const SNAKEMAKE_FILE_NAMES: &[&str] = &["snakefile", "snakefile.py"];

/// Nextflow configuration file colocated with a workflow script.
pub const NEXTFLOW_CONFIG_FILE: &str = "nextflow.config";

/// Source dialect of one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Python,
    Notebook,
    R,
    Nextflow,
    Snakemake,
    Unknown,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Python => "python",
            Dialect::Notebook => "notebook",
            Dialect::R => "r",
            Dialect::Nextflow => "nextflow",
            Dialect::Snakemake => "snakemake",
            Dialect::Unknown => "unknown",
        }
    }

    /// Workflow-level family this artifact counts towards
    pub fn workflow_family(self) -> Option<WorkflowDialect> {
        match self {
            Dialect::Python | Dialect::Notebook => Some(WorkflowDialect::Python),
            Dialect::R => Some(WorkflowDialect::R),
            Dialect::Nextflow => Some(WorkflowDialect::Nextflow),
            Dialect::Snakemake => Some(WorkflowDialect::Snakemake),
            Dialect::Unknown => None,
        }
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Dialect::Python | Dialect::Notebook => Ok(tree_sitter_python::LANGUAGE.into()),
            _ => Err(ScanError::tree_sitter(format!(
                "no grammar for {}",
                self.as_str()
            ))),
        }
    }
}
