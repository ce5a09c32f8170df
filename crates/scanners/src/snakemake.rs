use crate::dialect::{Dialect, SNAKEMAKE_FILE_NAMES};
use crate::error::Result;
use crate::scanner::read_artifact;
use crate::tables::ToolTables;
use crate::workflow::{conda_facts, container_fact, shell_facts, Interpolation};
use crate::DialectScanner;
use biomethod_protocol::{Evidence, Position, ToolUsage};
use std::path::Path;
use std::sync::Arc;

const DIRECTIVES: &[&str] = &["shell", "wrapper", "container", "singularity", "conda"];

/// Scanner for Snakemake workflows.
///
/// `rule`/`checkpoint` blocks are delimited by indentation. Inside a block the
/// `shell`, `wrapper`, `container`/`singularity` and `conda` directives are
/// mined; top-level container directives are reported under `global`.
pub struct SnakemakeScanner {
    tables: Arc<ToolTables>,
}

/// A directive and the text of its value, which may span several lines.
struct Directive {
    keyword: String,
    value: String,
    /// 0-based line of the directive keyword
    line: usize,
}

impl SnakemakeScanner {
    pub fn new(tables: Arc<ToolTables>) -> Self {
        Self { tables }
    }

    pub fn scan(&self, source: &str, artifact: &str, base_dir: Option<&Path>) -> Vec<ToolUsage> {
        let Some(header) =
            static_regex!(r"^(\s*)(?:rule|checkpoint)(?:\s+([A-Za-z_][A-Za-z0-9_]*))?\s*:\s*(?:#.*)?$")
        else {
            return Vec::new();
        };
        let lines: Vec<&str> = source.lines().collect();
        let mut facts = Vec::new();
        let mut idx = 0;
        while idx < lines.len() {
            if let Some(caps) = header.captures(lines[idx]) {
                let indent = caps.get(1).map_or(0, |m| m.as_str().len());
                let name = caps.get(2).map_or("rule", |m| m.as_str());
                let end = block_end(&lines, idx + 1, indent);
                for directive in directives(&lines, idx + 1, end) {
                    facts.extend(self.directive_facts(&directive, name, artifact, base_dir));
                }
                idx = end;
                continue;
            }
            if indent_of(lines[idx]) == 0 {
                if let Some(directive) = directive_at(&lines, idx) {
                    let global = matches!(directive.keyword.as_str(), "container" | "singularity");
                    if global {
                        facts.extend(self.directive_facts(&directive, "global", artifact, base_dir));
                    }
                    idx = block_end(&lines, idx + 1, 0);
                    continue;
                }
            }
            idx += 1;
        }
        facts
    }

    fn directive_facts(
        &self,
        directive: &Directive,
        block: &str,
        artifact: &str,
        base_dir: Option<&Path>,
    ) -> Vec<ToolUsage> {
        let Some((text, offset)) = string_literals(&directive.value) else {
            return Vec::new();
        };
        let line = directive.line + 1 + directive.value[..offset].matches('\n').count();
        match directive.keyword.as_str() {
            "shell" => shell_facts(
                &self.tables,
                &text,
                Interpolation::Snakemake,
                artifact,
                line,
                block,
            ),
            "wrapper" => self
                .wrapper_fact(&text, artifact, line)
                .map(|fact| fact.in_block(block))
                .into_iter()
                .collect(),
            "container" | "singularity" => container_fact(&self.tables, &text, artifact, line)
                .map(|fact| fact.in_block(block))
                .into_iter()
                .collect(),
            "conda" => conda_facts(&self.tables, &text, base_dir, artifact, line)
                .into_iter()
                .map(|fact| fact.in_block(block))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `v1.21.0/bio/bwa/mem`: a leading version-tag segment, then the first
    /// segment naming a known shell tool.
    fn wrapper_fact(&self, path: &str, artifact: &str, line: usize) -> Option<ToolUsage> {
        let path = path.trim();
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let version = match (segments.peek(), static_regex!(r"^v?\d+(?:\.\d+)+$")) {
            (Some(first), Some(re)) if re.is_match(first) => {
                segments.next().map(str::to_string)
            }
            _ => None,
        };
        let tool = segments.find_map(|segment| self.tables.shell_tool(segment))?;
        Some(
            ToolUsage::new(
                tool,
                artifact,
                Position::Line(line),
                Evidence::Wrapper {
                    path: path.to_string(),
                },
            )
            .with_version(version)
            .with_category(self.tables.category(tool)),
        )
    }
}

impl DialectScanner for SnakemakeScanner {
    fn name(&self) -> &'static str {
        "snakemake"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Snakemake
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["smk", "snakefile", "snake"]
    }

    fn special_file_names(&self) -> &'static [&'static str] {
        SNAKEMAKE_FILE_NAMES
    }

    fn extract_source(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        self.scan(source, artifact, None)
    }

    fn extract(&self, path: &Path) -> Result<Vec<ToolUsage>> {
        let source = read_artifact(path)?;
        Ok(self.scan(&source, &path.display().to_string(), path.parent()))
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_blank(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// First line at or after `start` that closes a block opened at `indent`.
///
/// Lines inside a triple-quoted string belong to the block whatever their
/// indentation.
fn block_end(lines: &[&str], start: usize, indent: usize) -> usize {
    let mut open_fence: Option<&str> = None;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        if open_fence.is_none() && !is_blank(line) && indent_of(line) <= indent {
            return idx;
        }
        open_fence = track_fences(line, open_fence);
    }
    lines.len()
}

/// Fence state after scanning `line`, given the state before it.
fn track_fences<'f>(line: &str, mut open: Option<&'f str>) -> Option<&'f str> {
    let mut rest = line;
    loop {
        match open {
            Some(fence) => match rest.find(fence) {
                Some(pos) => {
                    rest = &rest[pos + 3..];
                    open = None;
                }
                None => return open,
            },
            None => {
                let next = [("\"\"\"", rest.find("\"\"\"")), ("'''", rest.find("'''"))]
                    .into_iter()
                    .filter_map(|(fence, pos)| pos.map(|pos| (pos, fence)))
                    .min();
                match next {
                    Some((pos, fence)) => {
                        rest = &rest[pos + 3..];
                        open = Some(fence);
                    }
                    None => return None,
                }
            }
        }
    }
}

/// Directives at the body indentation of lines `start..end`.
fn directives(lines: &[&str], start: usize, end: usize) -> Vec<Directive> {
    let Some(body_indent) = lines[start..end]
        .iter()
        .find(|line| !is_blank(line))
        .map(|line| indent_of(line))
    else {
        return Vec::new();
    };
    let mut found = Vec::new();
    let mut idx = start;
    while idx < end {
        let line = lines[idx];
        if is_blank(line) || indent_of(line) != body_indent {
            idx += 1;
            continue;
        }
        let value_end = block_end(lines, idx + 1, body_indent).min(end);
        if let Some(directive) = directive_at(lines, idx) {
            if DIRECTIVES.contains(&directive.keyword.as_str()) {
                let mut directive = directive;
                directive.value = std::iter::once(directive.value.as_str())
                    .chain(lines[idx + 1..value_end].iter().copied())
                    .collect::<Vec<_>>()
                    .join("\n");
                found.push(directive);
            }
        }
        idx = value_end;
    }
    found
}

/// `keyword: rest` at line `idx`; the value holds only the same-line text.
fn directive_at(lines: &[&str], idx: usize) -> Option<Directive> {
    let re = static_regex!(r"^\s*([A-Za-z_]+)\s*:(.*)$")?;
    let caps = re.captures(lines.get(idx)?)?;
    let keyword = caps.get(1)?.as_str();
    if !DIRECTIVES.contains(&keyword) {
        return None;
    }
    Some(Directive {
        keyword: keyword.to_string(),
        value: caps.get(2).map_or("", |m| m.as_str()).to_string(),
        line: idx,
    })
}

/// Adjacent Python string literals at the start of `text`, concatenated.
///
/// Returns the joined contents and the byte offset of the first literal's
/// contents within `text`. Escapes are kept verbatim.
fn string_literals(text: &str) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut first = None;
    let mut i = 0;
    loop {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || matches!(bytes[i], b'(' | b')' | b'\\')) {
            i += 1;
        }
        let mut quote_at = i;
        while quote_at < bytes.len()
            && quote_at - i < 2
            && matches!(bytes[quote_at].to_ascii_lowercase(), b'r' | b'f' | b'b' | b'u')
        {
            quote_at += 1;
        }
        let Some(&quote) = bytes.get(quote_at) else {
            break;
        };
        if quote != b'"' && quote != b'\'' {
            break;
        }
        let fence = [quote; 3];
        let triple = bytes.get(quote_at..quote_at + 3) == Some(&fence[..]);
        let width = if triple { 3 } else { 1 };
        let content_start = quote_at + width;
        let Some(content_len) = literal_length(&bytes[content_start..], quote, triple) else {
            break;
        };
        let content_end = content_start + content_len;
        out.push_str(text.get(content_start..content_end)?);
        first.get_or_insert(content_start);
        i = content_end + width;
    }
    first.map(|offset| (out, offset))
}

fn literal_length(bytes: &[u8], quote: u8, triple: bool) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !triple => return None,
            b if b == quote => {
                if !triple || bytes.get(i..i + 3) == Some(&[quote; 3][..]) {
                    return Some(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomethod_protocol::{Category, ParamValue};
    use pretty_assertions::assert_eq;

    const SNAKEFILE: &str = r#"configfile: "config.yaml"
container: "docker://continuumio/miniconda3:4.12.0"
singularity: "docker://quay.io/biocontainers/samtools:1.17--h00cdaf9_0"

rule all:
    input: "results/multiqc.html"

rule trim:
    input:
        r1="reads/{sample}_R1.fq.gz",
    output:
        "trimmed/{sample}.fq.gz"
    threads: 4
    container: "docker://quay.io/biocontainers/fastp:0.23.2--h79da9fb_0"
    shell:
        "fastp -i {input.r1} -o {output} -w {threads} "
        "--detect_adapter_for_pe"

checkpoint align:
    output: "aligned/{sample}.bam"
    shell:
        """
bwa mem -t {threads} ref.fa {input} \
    | samtools sort -o {output}
        """

rule qc:
    wrapper:
        "v1.21.0/bio/fastqc"
"#;

    fn scan(source: &str) -> Vec<ToolUsage> {
        SnakemakeScanner::new(Arc::new(ToolTables::builtin())).extract_source(source, "Snakefile")
    }

    #[test]
    fn rules_directives_and_globals() {
        let facts = scan(SNAKEFILE);
        let summary: Vec<_> = facts
            .iter()
            .map(|f| (f.name.as_str(), f.version.as_deref(), f.position, f.block.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("samtools", Some("1.17"), Position::Line(3), Some("global")),
                ("fastp", Some("0.23.2"), Position::Line(14), Some("trim")),
                ("fastp", None, Position::Line(16), Some("trim")),
                ("bwa", None, Position::Line(23), Some("align")),
                ("samtools", None, Position::Line(23), Some("align")),
                ("fastqc", Some("v1.21.0"), Position::Line(29), Some("qc")),
            ]
        );
        let trim = &facts[2];
        assert!(trim.parameters["-i"].is_placeholder());
        assert_eq!(trim.parameters["--detect_adapter_for_pe"], ParamValue::Bool(true));
        assert_eq!(trim.category, Category::Preprocessing);
        assert_eq!(
            facts[5].evidence,
            Evidence::Wrapper {
                path: "v1.21.0/bio/fastqc".to_string()
            }
        );
    }

    #[test]
    fn anonymous_rules_and_comments() {
        let facts = scan("rule:  # unnamed\n    shell: 'multiqc results/'\n");
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].block.as_deref(), Some("rule"));
    }

    #[test]
    fn adjacent_literals_concatenate() {
        assert_eq!(
            string_literals(" ('a ' \"b\"\n  r'c')"),
            Some(("a bc".to_string(), 3))
        );
        assert_eq!(string_literals(" rules.x.output"), None);
        assert_eq!(string_literals(" 'unterminated"), None);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(scan("rule x:\n    shell:\n        \"\"\"\n    bwa mem").is_empty());
        assert!(scan("shell:").is_empty());
    }
}
