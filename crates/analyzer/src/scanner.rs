use biomethod_scanners::ScannerSet;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Directory walking policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Descend into subdirectories; otherwise only direct children are listed
    pub recursive: bool,
    pub include_hidden: bool,
    pub respect_gitignore: bool,
    pub max_file_size_bytes: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            include_hidden: false,
            respect_gitignore: true,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

/// Finds analysis artifacts under a directory
pub struct FileScanner {
    root: PathBuf,
    extensions: Vec<String>,
    special_names: Vec<String>,
}

impl FileScanner {
    pub fn new<E, N>(root: impl AsRef<Path>, extensions: E, special_names: N) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().to_lowercase())
                .collect(),
            special_names: special_names
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Walker matching every extension and special file name the scanners accept
    pub fn for_scanners(root: impl AsRef<Path>, scanners: &ScannerSet) -> Self {
        Self::new(root, scanners.extensions(), scanners.special_file_names())
    }

    /// Scan directory for artifacts (.gitignore aware); paths are sorted
    pub fn scan(&self, options: &ScanOptions) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(!options.include_hidden)
            .git_ignore(options.respect_gitignore)
            .git_global(options.respect_gitignore)
            .git_exclude(options.respect_gitignore)
            .ignore(options.respect_gitignore)
            .require_git(false)
            .parents(options.respect_gitignore);
        if !options.recursive {
            builder.max_depth(Some(1));
        }
        builder.filter_entry(move |entry| !FileScanner::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if !self.is_artifact(path) {
                        continue;
                    }

                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > options.max_file_size_bytes {
                            log::debug!(
                                "Skipping large file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                options.max_file_size_bytes
                            );
                            continue;
                        }
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::info!("Found {} analysis artifacts", files.len());
        files
    }

    fn is_artifact(&self, path: &Path) -> bool {
        if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
            let lowered = file_name.to_lowercase();
            if self.special_names.iter().any(|name| name == &lowered) {
                return true;
            }
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| self.extensions.iter().any(|candidate| candidate == &ext))
    }

    pub(crate) fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Tool state and run output directories; never analysis sources.
const IGNORED_SCOPES: &[&str] = &[
    // VCS / editors
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // Python
    "__pycache__",
    ".ipynb_checkpoints",
    ".venv",
    ".tox",
    // workflow engines
    ".snakemake",
    ".nextflow",
    "work",
    // R
    ".rproj.user",
    "renv",
    // JS tooling
    "node_modules",
];

const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn finds_artifacts_and_special_names() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("scripts")).unwrap();
        fs::write(temp.path().join("Snakefile"), b"rule a:\n").unwrap();
        fs::write(temp.path().join("main.nf"), b"").unwrap();
        fs::write(temp.path().join("README.md"), b"# notes").unwrap();
        fs::write(temp.path().join("scripts").join("de.R"), b"library(DESeq2)").unwrap();
        fs::write(temp.path().join("scripts").join("qc.py"), b"import pysam").unwrap();

        let scanner = FileScanner::for_scanners(temp.path(), &ScannerSet::builtin());
        let files = scanner.scan(&ScanOptions::default());

        assert_eq!(
            names(&files, temp.path()),
            vec!["Snakefile", "main.nf", "scripts/de.R", "scripts/qc.py"]
        );
    }

    #[test]
    fn shallow_scan_stays_at_top_level() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("top.py"), b"").unwrap();
        fs::write(temp.path().join("nested").join("deep.py"), b"").unwrap();

        let scanner = FileScanner::new(temp.path(), ["py"], Vec::<String>::new());
        let options = ScanOptions {
            recursive: false,
            ..Default::default()
        };
        assert_eq!(names(&scanner.scan(&options), temp.path()), vec!["top.py"]);
    }

    #[test]
    fn skips_engine_state_and_ignored_paths() {
        let temp = tempdir().unwrap();
        for dir in ["work/ab/cdef", ".snakemake/scripts", "results", "__pycache__"] {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        fs::write(temp.path().join("work/ab/cdef/.command.py"), b"").unwrap();
        fs::write(temp.path().join("work/ab/cdef/task.py"), b"").unwrap();
        fs::write(temp.path().join(".snakemake/scripts/tmp.py"), b"").unwrap();
        fs::write(temp.path().join("__pycache__/x.py"), b"").unwrap();
        fs::write(temp.path().join("results/plot.py"), b"").unwrap();
        fs::write(temp.path().join("pipeline.py"), b"").unwrap();
        fs::write(temp.path().join(".gitignore"), b"/results\n").unwrap();

        let scanner = FileScanner::new(temp.path(), ["py"], Vec::<String>::new());
        let files = scanner.scan(&ScanOptions::default());
        assert_eq!(names(&files, temp.path()), vec!["pipeline.py"]);

        let unfiltered = scanner.scan(&ScanOptions {
            respect_gitignore: false,
            ..Default::default()
        });
        assert_eq!(
            names(&unfiltered, temp.path()),
            vec!["pipeline.py", "results/plot.py"]
        );
    }

    #[test]
    fn skips_files_over_size_cap() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("big.py"), vec![b'#'; 64]).unwrap();
        fs::write(temp.path().join("small.py"), b"#").unwrap();

        let scanner = FileScanner::new(temp.path(), ["py"], Vec::<String>::new());
        let options = ScanOptions {
            max_file_size_bytes: 16,
            ..Default::default()
        };
        assert_eq!(names(&scanner.scan(&options), temp.path()), vec!["small.py"]);
    }
}
