use crate::dialect::Dialect;
use crate::error::{Result, ScanError};
use crate::nextflow::NextflowScanner;
use crate::notebook::NotebookScanner;
use crate::rscript::RScriptScanner;
use crate::script::ScriptScanner;
use crate::snakemake::SnakemakeScanner;
use crate::tables::ToolTables;
use biomethod_protocol::ToolUsage;
use std::path::Path;
use std::sync::Arc;

/// One dialect's extraction capability.
///
/// `extract_source` is total: malformed input yields an empty list. Only
/// `extract` can fail, and only when the artifact cannot be read.
pub trait DialectScanner: Send + Sync {
    fn name(&self) -> &'static str;

    fn dialect(&self) -> Dialect;

    /// Lowercase extensions (without the dot) this scanner claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Lowercase file names claimed regardless of extension.
    fn special_file_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn can_handle(&self, path: &Path) -> bool {
        let special = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                self.special_file_names()
                    .contains(&name.to_lowercase().as_str())
            });
        special
            || path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.extensions().contains(&ext.to_lowercase().as_str()))
    }

    /// Facts for in-memory artifact text; `artifact` becomes each fact's source.
    fn extract_source(&self, source: &str, artifact: &str) -> Vec<ToolUsage>;

    fn extract(&self, path: &Path) -> Result<Vec<ToolUsage>> {
        let source = read_artifact(path)?;
        Ok(self.extract_source(&source, &path.display().to_string()))
    }
}

/// Read an artifact as UTF-8 text.
pub(crate) fn read_artifact(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| ScanError::decode(path.display().to_string()))
}

/// Ordered scanner list; routing is a linear scan, first match wins.
pub struct ScannerSet {
    scanners: Vec<Box<dyn DialectScanner>>,
}

impl ScannerSet {
    pub fn builtin() -> Self {
        Self::with_tables(Arc::new(ToolTables::builtin()))
    }

    /// Priority: Nextflow, Snakemake, Notebook, Script, R.
    pub fn with_tables(tables: Arc<ToolTables>) -> Self {
        let scanners: Vec<Box<dyn DialectScanner>> = vec![
            Box::new(NextflowScanner::new(Arc::clone(&tables))),
            Box::new(SnakemakeScanner::new(Arc::clone(&tables))),
            Box::new(NotebookScanner::new(Arc::clone(&tables))),
            Box::new(ScriptScanner::new(Arc::clone(&tables))),
            Box::new(RScriptScanner::new(tables)),
        ];
        Self { scanners }
    }

    pub fn from_scanners(scanners: Vec<Box<dyn DialectScanner>>) -> Self {
        Self { scanners }
    }

    pub fn route(&self, path: impl AsRef<Path>) -> Option<&dyn DialectScanner> {
        let path = path.as_ref();
        self.scanners
            .iter()
            .find(|scanner| scanner.can_handle(path))
            .map(|scanner| scanner.as_ref())
    }

    pub fn scanners(&self) -> impl Iterator<Item = &dyn DialectScanner> {
        self.scanners.iter().map(|scanner| scanner.as_ref())
    }

    /// Union of every scanner's extensions, sorted and deduplicated.
    pub fn extensions(&self) -> Vec<&'static str> {
        let mut all: Vec<_> = self
            .scanners
            .iter()
            .flat_map(|scanner| scanner.extensions().iter().copied())
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    pub fn special_file_names(&self) -> Vec<&'static str> {
        let mut all: Vec<_> = self
            .scanners
            .iter()
            .flat_map(|scanner| scanner.special_file_names().iter().copied())
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

impl Default for ScannerSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn routed(path: &str) -> Option<&'static str> {
        ScannerSet::builtin().route(path).map(|s| s.name())
    }

    #[test]
    fn routes_by_priority() {
        assert_eq!(routed("main.nf"), Some("nextflow"));
        assert_eq!(routed("workflow/Snakefile"), Some("snakemake"));
        assert_eq!(routed("Snakefile.py"), Some("snakemake"));
        assert_eq!(routed("rules/align.smk"), Some("snakemake"));
        assert_eq!(routed("analysis.ipynb"), Some("notebook"));
        assert_eq!(routed("scripts/run.py"), Some("script"));
        assert_eq!(routed("de.R"), Some("r"));
        assert_eq!(routed("report.Rmd"), Some("r"));
        assert_eq!(routed("README.md"), None);
        assert_eq!(routed("nextflow.config"), None);
    }

    #[test]
    fn extension_union() {
        let set = ScannerSet::builtin();
        assert_eq!(set.len(), 5);
        let extensions = set.extensions();
        for ext in ["ipynb", "nf", "py", "r", "rmd", "smk"] {
            assert!(extensions.contains(&ext), "missing {ext}");
        }
        assert_eq!(set.special_file_names(), vec!["snakefile", "snakefile.py"]);
    }

    #[test]
    fn extract_reports_undecodable_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.py");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = ScriptScanner::new(Arc::new(ToolTables::builtin()))
            .extract(&path)
            .unwrap_err();
        assert!(matches!(err, ScanError::Decode { .. }));
    }
}
