//! Environment Snapshot parser: declared packages, container bases and the
//! version-control root of an analyzed directory.

use crate::scanner::FileScanner;
use biomethod_protocol::EnvironmentSnapshot;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub trait EnvironmentParser: Send + Sync {
    fn parse_directory(&self, dir: &Path) -> EnvironmentSnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ManifestKind {
    Requirements,
    Conda,
    Yaml,
    Pyproject,
    Dockerfile,
    Singularity,
}

/// Ordered so that a named match wins over the generic YAML probe.
const MANIFEST_PATTERNS: &[(&str, ManifestKind)] = &[
    ("requirements*.txt", ManifestKind::Requirements),
    ("{environment,conda}.{yml,yaml}", ManifestKind::Conda),
    ("*env*.{yml,yaml}", ManifestKind::Conda),
    ("*.{yml,yaml}", ManifestKind::Yaml),
    ("pyproject.toml", ManifestKind::Pyproject),
    ("Dockerfile*", ManifestKind::Dockerfile),
    ("*.dockerfile", ManifestKind::Dockerfile),
    ("*.def", ManifestKind::Singularity),
    ("Singularity*", ManifestKind::Singularity),
];

const CONDA_PROBE_BYTES: usize = 500;

/// Reads dependency manifests found anywhere under the directory.
pub struct ManifestEnvironmentParser {
    patterns: Option<GlobSet>,
    /// Kind of every glob in `patterns`, by index
    kinds: Vec<ManifestKind>,
}

impl Default for ManifestEnvironmentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestEnvironmentParser {
    pub fn new() -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut kinds = Vec::new();
        for (pattern, kind) in MANIFEST_PATTERNS {
            match GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
            {
                Ok(glob) => {
                    builder.add(glob);
                    kinds.push(*kind);
                }
                Err(err) => log::error!("invalid manifest pattern {pattern}: {err}"),
            }
        }
        let patterns = match builder.build() {
            Ok(set) => Some(set),
            Err(err) => {
                log::error!("manifest patterns unavailable: {err}");
                None
            }
        };
        Self { patterns, kinds }
    }

    fn kind_of(&self, path: &Path) -> Option<ManifestKind> {
        let name = path.file_name()?;
        let patterns = self.patterns.as_ref()?;
        let first = patterns.matches(Path::new(name)).into_iter().min()?;
        let kind = self.kinds.get(first).copied()?;
        match kind {
            ManifestKind::Yaml if !looks_like_conda(path) => None,
            ManifestKind::Yaml => Some(ManifestKind::Conda),
            other => Some(other),
        }
    }

    fn manifests(&self, dir: &Path) -> Vec<(PathBuf, ManifestKind)> {
        let root = dir.to_path_buf();
        let mut builder = WalkBuilder::new(dir);
        builder.hidden(true).require_git(false);
        builder.filter_entry(move |entry| !FileScanner::is_ignored_scope(entry.path(), &root));

        let mut found = Vec::new();
        for entry in builder.build().flatten() {
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if let Some(kind) = self.kind_of(entry.path()) {
                found.push((entry.path().to_path_buf(), kind));
            }
        }
        found.sort();
        found
    }
}

impl EnvironmentParser for ManifestEnvironmentParser {
    fn parse_directory(&self, dir: &Path) -> EnvironmentSnapshot {
        let mut snapshot = EnvironmentSnapshot::default();

        for (path, kind) in self.manifests(dir) {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("Failed to read manifest {}: {err}", path.display());
                    continue;
                }
            };
            log::debug!("reading {kind:?} manifest {}", path.display());
            let display = path.display().to_string();
            match kind {
                ManifestKind::Requirements => {
                    insert_all(&mut snapshot.packages, parse_requirements(&text));
                    snapshot.manifest_files.push(display);
                }
                ManifestKind::Conda | ManifestKind::Yaml => {
                    let (name, packages) = parse_conda_yaml(&text);
                    if snapshot.conda_environment.is_none() {
                        snapshot.conda_environment = name;
                    }
                    insert_all(&mut snapshot.packages, packages);
                    snapshot.manifest_files.push(display);
                }
                ManifestKind::Pyproject => {
                    insert_all(&mut snapshot.packages, parse_pyproject(&text));
                    snapshot.manifest_files.push(display);
                }
                ManifestKind::Dockerfile => {
                    snapshot.containers.extend(dockerfile_images(&text));
                    snapshot.container_files.push(display);
                }
                ManifestKind::Singularity => {
                    snapshot.containers.extend(singularity_images(&text));
                    snapshot.container_files.push(display);
                }
            }
        }

        snapshot.containers.sort();
        snapshot.containers.dedup();
        snapshot.runtime_version = snapshot.packages.get("python").cloned().flatten();
        snapshot.secondary_runtime_version = snapshot.packages.get("r-base").cloned().flatten();
        snapshot.vcs_root = vcs_root(dir).map(|root| root.display().to_string());
        snapshot
    }
}

/// Later manifests never replace a pin recorded by an earlier one.
fn insert_all(into: &mut BTreeMap<String, Option<String>>, packages: Vec<(String, Option<String>)>) {
    for (name, version) in packages {
        let slot = into.entry(name).or_insert(None);
        if slot.is_none() {
            *slot = version;
        }
    }
}

fn looks_like_conda(path: &Path) -> bool {
    let mut head = Vec::with_capacity(CONDA_PROBE_BYTES);
    let read = fs::File::open(path)
        .and_then(|file| file.take(CONDA_PROBE_BYTES as u64).read_to_end(&mut head));
    if read.is_err() {
        return false;
    }
    String::from_utf8_lossy(&head)
        .lines()
        .any(|line| line.starts_with("dependencies:") || line.starts_with("channels:"))
}

fn requirement_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(===|==|>=|<=|~=|!=|>|<|=)?\s*([^,;\s]*)")
            .ok()
    })
    .as_ref()
}

/// One requirement line: `name==v`, `name>=v`, `name<=v`, `name~=v`, bare `name`.
///
/// Options (`-r`, `-e`, `--index-url`), comments and blank lines yield `None`.
pub fn parse_requirement(line: &str) -> Option<(String, Option<String>)> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() || line.starts_with('-') {
        return None;
    }
    let caps = requirement_pattern()?.captures(line)?;
    let name = caps.get(1)?.as_str().to_lowercase();
    let pinned = matches!(
        caps.get(2).map(|m| m.as_str()),
        Some("==" | "===" | ">=" | "<=" | "~=" | "=")
    );
    let version = caps
        .get(3)
        .map(|m| m.as_str().trim_end_matches(".*"))
        .filter(|v| pinned && !v.is_empty())
        .map(str::to_string);
    Some((name, version))
}

pub fn parse_requirements(text: &str) -> Vec<(String, Option<String>)> {
    text.lines().filter_map(parse_requirement).collect()
}

/// `channel::name=version[=build]`; the channel and build string are dropped.
pub fn parse_conda_dependency(spec: &str) -> Option<(String, Option<String>)> {
    let spec = spec.trim();
    let spec = spec.rsplit_once("::").map_or(spec, |(_, rest)| rest);
    let (name, version) = parse_requirement(spec)?;
    let version = version.and_then(|v| v.split('=').next().map(str::to_string));
    Some((name, version.filter(|v| !v.is_empty())))
}

/// Environment name and declared packages of a conda YAML document.
pub fn parse_conda_yaml(text: &str) -> (Option<String>, Vec<(String, Option<String>)>) {
    let doc: serde_yaml::Value = match serde_yaml::from_str(text) {
        Ok(doc) => doc,
        Err(err) => {
            log::debug!("malformed conda manifest: {err}");
            return (None, Vec::new());
        }
    };
    let name = doc.get("name").and_then(|v| v.as_str()).map(str::to_string);
    let mut packages = Vec::new();
    let entries = doc.get("dependencies").and_then(|deps| deps.as_sequence());
    for entry in entries.into_iter().flatten() {
        if let Some(spec) = entry.as_str() {
            packages.extend(parse_conda_dependency(spec));
        } else if let Some(pip) = entry.get("pip").and_then(|pip| pip.as_sequence()) {
            packages.extend(pip.iter().filter_map(|v| v.as_str()).filter_map(parse_requirement));
        }
    }
    (name, packages)
}

/// `[project].dependencies`, `[project.optional-dependencies]` and Poetry tables.
pub fn parse_pyproject(text: &str) -> Vec<(String, Option<String>)> {
    let doc: toml::Value = match toml::from_str(text) {
        Ok(doc) => doc,
        Err(err) => {
            log::debug!("malformed pyproject.toml: {err}");
            return Vec::new();
        }
    };
    let mut packages = Vec::new();
    let requirement_list = |value: Option<&toml::Value>| -> Vec<(String, Option<String>)> {
        value
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .filter_map(parse_requirement)
            .collect()
    };

    let project = doc.get("project");
    packages.extend(requirement_list(project.and_then(|p| p.get("dependencies"))));
    if let Some(groups) = project
        .and_then(|p| p.get("optional-dependencies"))
        .and_then(|v| v.as_table())
    {
        for group in groups.values() {
            packages.extend(requirement_list(Some(group)));
        }
    }

    let poetry = doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_table());
    for (name, spec) in poetry.into_iter().flatten() {
        if name.eq_ignore_ascii_case("python") {
            continue;
        }
        let raw = spec
            .as_str()
            .or_else(|| spec.get("version").and_then(|v| v.as_str()));
        let version = raw
            .map(|v| v.trim_start_matches(['^', '~', '=', '>', '<', ' ']))
            .filter(|v| !v.is_empty() && *v != "*")
            .map(str::to_string);
        packages.push((name.to_lowercase(), version));
    }
    packages
}

/// Base images of `FROM` instructions; `--platform=` style flags and `AS stage` are dropped.
pub fn dockerfile_images(text: &str) -> Vec<String> {
    let mut stages: Vec<String> = Vec::new();
    let mut images = Vec::new();
    for line in text.lines().map(str::trim) {
        let mut words = line.split_whitespace();
        if !words.next().is_some_and(|w| w.eq_ignore_ascii_case("FROM")) {
            continue;
        }
        let mut rest = words.skip_while(|w| w.starts_with("--"));
        let Some(image) = rest.next() else {
            continue;
        };
        let is_stage = stages.iter().any(|s| s.eq_ignore_ascii_case(image));
        if !is_stage && !image.eq_ignore_ascii_case("scratch") {
            images.push(image.to_string());
        }
        if rest.next().is_some_and(|w| w.eq_ignore_ascii_case("AS")) {
            if let Some(stage) = rest.next() {
                stages.push(stage.to_string());
            }
        }
    }
    images
}

/// `From:` header values of a Singularity/Apptainer definition file.
pub fn singularity_images(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case("from").then(|| value.trim())
        })
        .filter(|image| !image.is_empty())
        .map(str::to_string)
        .collect()
}

/// Nearest ancestor (inclusive) holding a `.git` entry.
pub fn vcs_root(dir: &Path) -> Option<PathBuf> {
    let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    start
        .ancestors()
        .find(|candidate| candidate.join(".git").exists())
        .map(Path::to_path_buf)
}
