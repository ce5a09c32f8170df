//! Version Oracle: resolves a canonical tool name to an installed version.
//!
//! Every failure (missing executable, permission error, timeout, unparseable
//! output) resolves to `None`; the oracle never fails an analysis.

use async_trait::async_trait;
use biomethod_protocol::normalize_tool_name;
use regex::Regex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;

#[async_trait]
pub trait VersionOracle: Send + Sync {
    async fn resolve(&self, name: &str) -> Option<String>;
}

/// Oracle that never knows a version
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVersionOracle;

#[async_trait]
impl VersionOracle for NoVersionOracle {
    async fn resolve(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Oracle backed by a fixed name -> version map
#[derive(Debug, Clone, Default)]
pub struct StaticVersionOracle {
    versions: HashMap<String, String>,
}

impl StaticVersionOracle {
    pub fn new<I, K, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            versions: versions
                .into_iter()
                .map(|(name, version)| (normalize_tool_name(name.as_ref()), version.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl VersionOracle for StaticVersionOracle {
    async fn resolve(&self, name: &str) -> Option<String> {
        self.versions.get(&normalize_tool_name(name)).cloned()
    }
}

/// One command line that may print a version
#[derive(Debug, Clone, PartialEq, Eq)]
struct Probe {
    program: String,
    args: Vec<String>,
}

impl Probe {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Tools whose version flag differs from `<name> --version`.
const COMMAND_TABLE: &[(&str, &str, &[&str])] = &[
    ("python", "python3", &["--version"]),
    ("r", "R", &["--version"]),
    ("bwa", "bwa", &[]),
    ("star", "STAR", &["--version"]),
    ("kallisto", "kallisto", &["version"]),
    ("featurecounts", "featureCounts", &["-v"]),
    ("trimmomatic", "trimmomatic", &["-version"]),
    ("blast", "blastn", &["-version"]),
    ("htseq", "htseq-count", &["--version"]),
    ("rsem", "rsem-calculate-expression", &["--version"]),
    ("sra_tools", "fasterq-dump", &["--version"]),
    ("bedtools", "bedtools", &["--version"]),
];

/// Canonical name -> pip distribution for tools shipped as Python packages.
const PYTHON_PACKAGES: &[(&str, &str)] = &[
    ("scanpy", "scanpy"),
    ("anndata", "anndata"),
    ("numpy", "numpy"),
    ("pandas", "pandas"),
    ("scipy", "scipy"),
    ("scikit_learn", "scikit-learn"),
    ("statsmodels", "statsmodels"),
    ("matplotlib", "matplotlib"),
    ("seaborn", "seaborn"),
    ("biopython", "biopython"),
    ("pysam", "pysam"),
    ("pybedtools", "pybedtools"),
    ("pydeseq2", "pydeseq2"),
    ("gseapy", "gseapy"),
    ("scvi_tools", "scvi-tools"),
    ("multiqc", "multiqc"),
    ("cutadapt", "cutadapt"),
    ("htseq", "HTSeq"),
];

/// Resolves versions by running the tool (or `pip show`) under a timeout.
///
/// Hits and misses are cached for the lifetime of the oracle.
pub struct CommandVersionOracle {
    timeout: Duration,
    overrides: HashMap<String, Vec<Probe>>,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl CommandVersionOracle {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            overrides: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the probes for `name` with a single custom command.
    #[must_use]
    pub fn with_command(mut self, name: &str, program: &str, args: &[&str]) -> Self {
        self.overrides
            .insert(normalize_tool_name(name), vec![Probe::new(program, args)]);
        self
    }

    fn probes(&self, key: &str, program: &str) -> Vec<Probe> {
        if let Some(custom) = self.overrides.get(key) {
            return custom.clone();
        }

        let mut probes = Vec::new();
        if let Some((_, pkg)) = PYTHON_PACKAGES.iter().find(|(name, _)| *name == key) {
            probes.push(Probe::new("python3", &["-m", "pip", "show", pkg]));
        }
        match COMMAND_TABLE.iter().find(|(name, _, _)| *name == key) {
            Some((_, binary, args)) => probes.push(Probe::new(binary, args)),
            None => probes.push(Probe::new(program, &["--version"])),
        }
        probes
    }

    async fn run_probe(&self, probe: &Probe, name: &str) -> Option<String> {
        let mut command = Command::new(&probe.program);
        command
            .args(&probe.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                log::debug!("version probe {} failed: {err}", probe.program);
                return None;
            }
            Err(_) => {
                log::debug!(
                    "version probe {} timed out after {:?}",
                    probe.program,
                    self.timeout
                );
                return None;
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        parse_version_output(&text, name)
    }
}

#[async_trait]
impl VersionOracle for CommandVersionOracle {
    async fn resolve(&self, name: &str) -> Option<String> {
        let key = normalize_tool_name(name);
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.lock().await.get(&key) {
            return cached.clone();
        }

        let mut version = None;
        for probe in self.probes(&key, name.trim()) {
            version = self.run_probe(&probe, &key).await;
            if version.is_some() {
                break;
            }
        }
        log::debug!("resolved {key} -> {version:?}");

        self.cache.lock().await.insert(key, version.clone());
        version
    }
}

fn labelled_version() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)version[:\s]+v?(\d+\.\d+(?:\.\d+)?[\w.\-]*)").ok())
        .as_ref()
}

fn bare_version() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bv?(\d+\.\d+(?:\.\d+)?)\b").ok())
        .as_ref()
}

fn leading_version() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v?(\d+\.\d+(?:\.\d+)?)").ok())
        .as_ref()
}

/// Version following a leading `<name>` word, e.g. `samtools 1.17` or `HTSeq-count, 2.0`.
///
/// Case and `-`/`_` separators are ignored when matching the name.
fn named_line_version(line: &str, name: &str) -> Option<String> {
    let squash = |text: &str| -> String {
        text.chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect()
    };
    let wanted = squash(name);
    if wanted.is_empty() {
        return None;
    }
    let line = line.trim_start();
    let word_end = line
        .find(|c: char| c.is_whitespace() || c == ',')
        .unwrap_or(line.len());
    let (word, rest) = line.split_at(word_end);
    if !squash(word).starts_with(&wanted) {
        return None;
    }
    let after = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    if after.len() == rest.len() {
        return None;
    }
    let caps = leading_version()?.captures(after)?;
    caps.get(1).map(|m| m.as_str().to_string())
}

/// Pull a version out of free-text command output.
///
/// Tried in order, first match wins: `Version: X.Y.Z`, `<name> X.Y`, bare `X.Y.Z`.
/// The bare form can pick up an unrelated number.
pub fn parse_version_output(output: &str, name: &str) -> Option<String> {
    if let Some(caps) = labelled_version().and_then(|re| re.captures(output)) {
        return caps.get(1).map(|m| m.as_str().trim_end_matches('.').to_string());
    }

    if let Some(version) = output.lines().find_map(|line| named_line_version(line, name)) {
        return Some(version);
    }

    bare_version()
        .and_then(|re| re.captures(output))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
