//! Helpers shared by the two workflow-block scanners.

use crate::shell::mine_script;
use crate::tables::ToolTables;
use biomethod_protocol::{Evidence, Position, ToolUsage, PLACEHOLDER_VARIABLE};
use std::path::Path;

/// Interpolation syntax of an embedded shell script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interpolation {
    /// `${expr}`, `$name`, `!{expr}`; `\\` and `\$` are unescaped
    Groovy,
    /// `{expr}` with `{{`/`}}` escapes, plus shell `${VAR}`/`$VAR`
    Snakemake,
}

/// Replace every interpolation token with the neutral placeholder.
///
/// Newlines swallowed by a multi-line interpolation are re-emitted so line
/// offsets stay valid.
pub(crate) fn neutralize(text: &str, style: Interpolation) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match (ch, next) {
            ('\\', Some('$')) if style == Interpolation::Groovy => i += 1,
            ('\\', Some('\\')) if style == Interpolation::Groovy => {
                out.push('\\');
                i += 2;
            }
            ('$', Some('{')) => i = push_placeholder(&chars, i + 1, &mut out),
            ('!', Some('{')) if style == Interpolation::Groovy => {
                i = push_placeholder(&chars, i + 1, &mut out);
            }
            ('$', Some(c)) if c == '_' || c.is_ascii_alphabetic() => {
                i += 1;
                while i < chars.len() && is_ident(chars[i]) {
                    i += 1;
                }
                while style == Interpolation::Groovy
                    && chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|&c| c == '_' || c.is_ascii_alphabetic())
                {
                    i += 1;
                    while i < chars.len() && is_ident(chars[i]) {
                        i += 1;
                    }
                }
                out.push_str(PLACEHOLDER_VARIABLE);
            }
            ('{', Some('{')) if style == Interpolation::Snakemake => {
                out.push('{');
                i += 2;
            }
            ('}', Some('}')) if style == Interpolation::Snakemake => {
                out.push('}');
                i += 2;
            }
            ('{', _) if style == Interpolation::Snakemake => {
                i = push_placeholder(&chars, i, &mut out);
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

fn is_ident(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}

/// Skip the balanced group opening at `open`; returns the index after it.
fn push_placeholder(chars: &[char], open: usize, out: &mut String) -> usize {
    let mut depth = 0usize;
    let mut newlines = 0;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            '\n' => newlines += 1,
            _ => {}
        }
        i += 1;
    }
    out.push_str(PLACEHOLDER_VARIABLE);
    out.extend(std::iter::repeat('\n').take(newlines));
    i + 1
}

/// Shell facts for an embedded script whose first line sits at `first_line`.
pub(crate) fn shell_facts(
    tables: &ToolTables,
    script: &str,
    style: Interpolation,
    source: &str,
    first_line: usize,
    block: &str,
) -> Vec<ToolUsage> {
    mine_script(tables, &neutralize(script, style))
        .into_iter()
        .map(|(offset, hit)| {
            ToolUsage::new(
                hit.tool,
                source,
                Position::Line(first_line + offset),
                Evidence::ShellCommand,
            )
            .with_parameters(hit.parameters)
            .with_category(tables.category(hit.tool))
            .in_block(block)
        })
        .collect()
}

/// Canonical tool and optional version for a container image reference.
///
/// The last path segment's name is tried first; otherwise the longest known
/// tool name contained in the repository path (registry host excluded) wins.
/// The version is the version-looking prefix of the tag.
pub fn parse_container(tables: &ToolTables, image: &str) -> Option<(&'static str, Option<String>)> {
    let lower = image.trim().to_lowercase().replace("%3a", ":");
    let lower = lower.split_once("://").map_or(lower.as_str(), |(_, rest)| rest);
    let last = lower.rsplit('/').next().unwrap_or(lower);
    let (name, tag) = match last.split_once(':') {
        Some((name, tag)) => (name, Some(tag)),
        None => (last, None),
    };
    let tool = tables.container_tool(name).or_else(|| {
        let repository = lower.strip_suffix(last).unwrap_or("");
        let mut segments: Vec<&str> = repository.split('/').filter(|s| !s.is_empty()).collect();
        if segments.first().is_some_and(|host| host.contains('.') || host.contains(':')) {
            segments.remove(0);
        }
        segments.push(name);
        tables.container_tool_within(&segments.join("/"))
    })?;
    Some((tool, tag.and_then(version_prefix)))
}

fn version_prefix(tag: &str) -> Option<String> {
    let re = static_regex!(r"^v?\d+(?:\.\d+)*")?;
    re.find(tag).map(|m| m.as_str().to_string())
}

/// Unwrap a conditional container expression to its last quoted image.
pub(crate) fn container_image(value: &str) -> String {
    let value = value.trim();
    if value.contains('?') {
        if let Some(re) = static_regex!(r"'([^']+)'") {
            if let Some(last) = re.captures_iter(value).filter_map(|c| c.get(1)).last() {
                return last.as_str().to_string();
            }
        }
    }
    value.to_string()
}

pub(crate) fn container_fact(
    tables: &ToolTables,
    image: &str,
    source: &str,
    line: usize,
) -> Option<ToolUsage> {
    let (tool, version) = parse_container(tables, image)?;
    Some(
        ToolUsage::new(
            tool,
            source,
            Position::Line(line),
            Evidence::Container {
                image: image.to_string(),
            },
        )
        .with_version(version)
        .with_category(tables.category(tool)),
    )
}

/// `name`, `name=version` or `channel::name=version`; only `=` pins yield a version.
pub fn parse_dependency(tables: &ToolTables, spec: &str) -> Option<(&'static str, Option<String>)> {
    let spec = spec.trim();
    let spec = spec.rsplit_once("::").map_or(spec, |(_, rest)| rest);
    let end = spec
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~') || c.is_whitespace())
        .unwrap_or(spec.len());
    let (name, rest) = spec.split_at(end);
    let tool = tables.container_tool(name.trim())?;
    let version = rest
        .strip_prefix('=')
        .map(|v| v.trim_start_matches('='))
        .and_then(|v| v.split('=').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    Some((tool, version))
}

pub(crate) fn dependency_fact(
    tables: &ToolTables,
    spec: &str,
    source: &str,
    line: usize,
) -> Option<ToolUsage> {
    let (tool, version) = parse_dependency(tables, spec)?;
    Some(
        ToolUsage::new(
            tool,
            source,
            Position::Line(line),
            Evidence::Dependency {
                spec: spec.trim().to_string(),
            },
        )
        .with_version(version)
        .with_category(tables.category(tool)),
    )
}

/// Facts for a dependency directive: an inline package list or a manifest path.
pub(crate) fn conda_facts(
    tables: &ToolTables,
    value: &str,
    base_dir: Option<&Path>,
    source: &str,
    line: usize,
) -> Vec<ToolUsage> {
    let value = value.trim();
    let lower = value.to_lowercase();
    if lower.ends_with(".yml") || lower.ends_with(".yaml") {
        let Some(base_dir) = base_dir else {
            return Vec::new();
        };
        let relative = value.rsplit_once('}').map_or(value, |(_, rest)| rest);
        let path = base_dir.join(relative.trim_start_matches('/'));
        return manifest_dependencies(&path)
            .iter()
            .filter_map(|spec| dependency_fact(tables, spec, source, line))
            .collect();
    }
    value
        .split_whitespace()
        .filter_map(|spec| dependency_fact(tables, spec, source, line))
        .collect()
}

/// Package specs listed under `dependencies:` (including nested `pip:` lists).
pub(crate) fn manifest_dependencies(path: &Path) -> Vec<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            log::debug!("dependency manifest {} unavailable: {err}", path.display());
            return Vec::new();
        }
    };
    let doc: serde_yaml::Value = match serde_yaml::from_str(&text) {
        Ok(doc) => doc,
        Err(err) => {
            log::debug!("dependency manifest {} malformed: {err}", path.display());
            return Vec::new();
        }
    };
    let Some(entries) = doc.get("dependencies").and_then(|deps| deps.as_sequence()) else {
        return Vec::new();
    };
    let mut specs = Vec::new();
    for entry in entries {
        match entry {
            serde_yaml::Value::String(spec) => specs.push(spec.clone()),
            serde_yaml::Value::Mapping(_) => {
                let pip = entry.get("pip").and_then(|pip| pip.as_sequence());
                specs.extend(
                    pip.into_iter()
                        .flatten()
                        .filter_map(|spec| spec.as_str().map(str::to_string)),
                );
            }
            _ => {}
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn biocontainer_tag_yields_version() {
        let tables = ToolTables::builtin();
        assert_eq!(
            parse_container(&tables, "quay.io/biocontainers/fastp:0.23.2--h79da9fb_0"),
            Some(("fastp", Some("0.23.2".to_string())))
        );
        assert_eq!(
            parse_container(&tables, "https://depot.galaxyproject.org/singularity/samtools%3A1.17--h00cdaf9_0"),
            Some(("samtools", Some("1.17".to_string())))
        );
        assert_eq!(
            parse_container(&tables, "broadinstitute/gatk:4.4.0.0"),
            Some(("gatk", Some("4.4.0.0".to_string())))
        );
        assert_eq!(
            parse_container(&tables, "nfcore/salmon:latest"),
            Some(("salmon", None))
        );
    }

    #[test]
    fn container_name_found_inside_repository_path() {
        let tables = ToolTables::builtin();
        assert_eq!(
            parse_container(&tables, "quay.io/mulled/star-aligner:v2.7.10b"),
            Some(("star", Some("v2.7.10".to_string())))
        );
        assert_eq!(parse_container(&tables, "ubuntu:22.04"), None);
    }

    #[test]
    fn ternary_images_use_the_last_literal() {
        let value = "${ workflow.containerEngine == 'singularity' ? 'https://depot/fastp:0.23.2--0' : 'biocontainers/fastp:0.23.2--0' }";
        assert_eq!(container_image(value), "biocontainers/fastp:0.23.2--0");
        assert_eq!(container_image("biocontainers/bwa:0.7.17"), "biocontainers/bwa:0.7.17");
    }

    #[test]
    fn dependency_specs() {
        let tables = ToolTables::builtin();
        assert_eq!(
            parse_dependency(&tables, "bioconda::samtools=1.17=h00cdaf9_0"),
            Some(("samtools", Some("1.17".to_string())))
        );
        assert_eq!(parse_dependency(&tables, "fastqc"), Some(("fastqc", None)));
        assert_eq!(
            parse_dependency(&tables, "multiqc==1.14"),
            Some(("multiqc", Some("1.14".to_string())))
        );
        assert_eq!(parse_dependency(&tables, "cutadapt>=4.0"), Some(("cutadapt", None)));
        assert_eq!(parse_dependency(&tables, "conda-forge::python=3.11"), None);
    }

    #[test]
    fn groovy_interpolations_are_neutralized() {
        assert_eq!(
            neutralize("bwa mem -t ${task.cpus} $index ${reads[0]} !{x} \\$HOME", Interpolation::Groovy),
            "bwa mem -t <variable> <variable> <variable> <variable> <variable>"
        );
        assert_eq!(
            neutralize("samtools sort -o ${prefix\n}.bam", Interpolation::Groovy),
            "samtools sort -o <variable>\n.bam"
        );
    }

    #[test]
    fn snakemake_placeholders_are_neutralized() {
        assert_eq!(
            neutralize("fastqc {input.r1} -o {output} -t {threads}", Interpolation::Snakemake),
            "fastqc <variable> -o <variable> -t <variable>"
        );
        assert_eq!(
            neutralize("awk '{{print $1}}' {input}", Interpolation::Snakemake),
            "awk '{print $1}' <variable>"
        );
    }

    #[test]
    fn manifest_dependencies_read_conda_and_pip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.yml");
        std::fs::write(
            &path,
            "name: qc\nchannels: [bioconda]\ndependencies:\n  - bioconda::fastqc=0.12.1\n  - python=3.11\n  - pip:\n      - multiqc==1.14\n",
        )
        .unwrap();
        assert_eq!(
            manifest_dependencies(&path),
            vec!["bioconda::fastqc=0.12.1", "python=3.11", "multiqc==1.14"]
        );
        assert!(manifest_dependencies(&dir.path().join("missing.yml")).is_empty());
        std::fs::write(&path, "dependencies: [unclosed").unwrap();
        assert!(manifest_dependencies(&path).is_empty());
    }
}
