//! # Biomethod Scanners
//!
//! Per-dialect extraction of tool-usage facts from analysis-pipeline sources.
//!
//! ## Architecture
//!
//! ```text
//! Artifact
//!     │
//!     ├──> ScannerSet::route (first scanner whose can_handle matches)
//!     │    Nextflow → Snakemake → Notebook → Script → R
//!     │
//!     ├──> Dialect scanner
//!     │    ├─> Script:    tree-sitter Python (imports, shell calls, API calls)
//!     │    ├─> Notebook:  code cells → Script rules, shell escapes, output banners
//!     │    ├─> R:         library loads, known functions, system() calls
//!     │    ├─> Nextflow:  process blocks (brace lexer), containers, conda, config
//!     │    └─> Snakemake: rule blocks (indentation), shell, wrapper, containers
//!     │
//!     └──> Vec<ToolUsage> in document order
//! ```
//!
//! ## Example
//!
//! ```rust
//! use biomethod_scanners::ScannerSet;
//!
//! let scanners = ScannerSet::builtin();
//! let scanner = scanners.route("align.py").unwrap();
//! let facts = scanner.extract_source("import pysam\n", "align.py");
//! assert_eq!(facts[0].name, "samtools");
//! ```

/// Lazily compiled regex; an invalid pattern logs once and yields `None`.
macro_rules! static_regex {
    ($pattern:expr) => {{
        static CELL: std::sync::OnceLock<Option<regex::Regex>> = std::sync::OnceLock::new();
        CELL.get_or_init(|| match regex::Regex::new($pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                log::error!("invalid pattern {}: {err}", $pattern);
                None
            }
        })
        .as_ref()
    }};
}

mod dialect;
mod error;
mod lexer;
mod literal;
mod nextflow;
mod notebook;
mod rscript;
mod scanner;
mod script;
mod shell;
mod snakemake;
mod tables;
mod workflow;

pub use dialect::{Dialect, NEXTFLOW_CONFIG_FILE, SNAKEMAKE_FILE_NAMES};
pub use error::{Result, ScanError};
pub use literal::{command_string, literal_of};
pub use nextflow::NextflowScanner;
pub use notebook::NotebookScanner;
pub use rscript::RScriptScanner;
pub use scanner::{DialectScanner, ScannerSet};
pub use script::ScriptScanner;
pub use shell::{command_parameters, mine_command, ShellMatch};
pub use snakemake::SnakemakeScanner;
pub use tables::{ApiPrefix, RFunction, ToolTables};
pub use workflow::{parse_container, parse_dependency};
