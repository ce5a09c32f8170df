use crate::dialect::{Dialect, NEXTFLOW_CONFIG_FILE};
use crate::error::Result;
use crate::lexer::{find_processes, line_at, script_section, Block};
use crate::scanner::read_artifact;
use crate::tables::ToolTables;
use crate::workflow::{conda_facts, container_fact, container_image, shell_facts, Interpolation};
use crate::DialectScanner;
use biomethod_protocol::ToolUsage;
use std::path::Path;
use std::sync::Arc;

/// Scanner for Nextflow workflow scripts.
///
/// Each `process` block contributes shell facts from its `script:`/`shell:`
/// section plus container and conda directive facts; `params.*_container`
/// assignments and a sibling `nextflow.config` are merged in.
pub struct NextflowScanner {
    tables: Arc<ToolTables>,
}

impl NextflowScanner {
    pub fn new(tables: Arc<ToolTables>) -> Self {
        Self { tables }
    }

    /// Facts for one workflow script; `base_dir` resolves conda manifests and
    /// the colocated config.
    pub fn scan(&self, source: &str, artifact: &str, base_dir: Option<&Path>) -> Vec<ToolUsage> {
        let mut facts = Vec::new();
        for block in find_processes(source) {
            facts.extend(self.process_facts(source, &block, artifact, base_dir));
        }
        facts.extend(self.params_facts(source, artifact));
        facts.sort_by_key(|fact| fact.position);

        if let Some(dir) = base_dir {
            facts.extend(self.config_facts(&dir.join(NEXTFLOW_CONFIG_FILE)));
        }
        facts
    }

    fn process_facts(
        &self,
        source: &str,
        block: &Block<'_>,
        artifact: &str,
        base_dir: Option<&Path>,
    ) -> Vec<ToolUsage> {
        let mut facts = Vec::new();
        let section = script_section(block.body);
        if let Some(section) = &section {
            let first_line = line_at(source, block.body_offset + section.text_offset);
            facts.extend(shell_facts(
                &self.tables,
                section.text,
                Interpolation::Groovy,
                artifact,
                first_line,
                block.name,
            ));
        }

        let lines = body_lines(block.body);
        let mut idx = 0;
        while idx < lines.len() {
            let (offset, line) = lines[idx];
            idx += 1;
            if section
                .as_ref()
                .is_some_and(|s| s.span.contains(&offset))
            {
                continue;
            }
            let trimmed = line.trim();
            if trimmed.starts_with("//") {
                continue;
            }
            let line_no = line_at(source, block.body_offset + offset);
            if let Some(value) = directive_value(trimmed, "container") {
                let mut value = value.to_string();
                while value.starts_with("\"${") && !value.contains('}') && idx < lines.len() {
                    value.push(' ');
                    value.push_str(lines[idx].1.trim());
                    idx += 1;
                }
                let image = container_image(unquote(&value));
                facts.extend(
                    container_fact(&self.tables, &image, artifact, line_no)
                        .map(|fact| fact.in_block(block.name)),
                );
            } else if let Some(value) = directive_value(trimmed, "conda") {
                facts.extend(
                    conda_facts(&self.tables, unquote(value), base_dir, artifact, line_no)
                        .into_iter()
                        .map(|fact| fact.in_block(block.name)),
                );
            }
        }
        facts.sort_by_key(|fact| fact.position);
        facts
    }

    fn params_facts(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        let Some(re) = static_regex!(
            r#"^\s*params\.([A-Za-z0-9_]*container[A-Za-z0-9_]*)\s*=\s*['"]([^'"]+)['"]"#
        ) else {
            return Vec::new();
        };
        source
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let image = re.captures(line)?.get(2)?.as_str();
                container_fact(&self.tables, image, artifact, idx + 1)
            })
            .map(|fact| fact.in_block("params"))
            .collect()
    }

    /// `container = '...'` assignments of a colocated config, anywhere in it.
    fn config_facts(&self, path: &Path) -> Vec<ToolUsage> {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        let Some(re) = static_regex!(r#"^\s*container\s*=\s*['"]([^'"]+)['"]"#) else {
            return Vec::new();
        };
        let source = path.display().to_string();
        log::debug!("merging container directives from {source}");
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim_start().starts_with("//"))
            .filter_map(|(idx, line)| {
                let image = re.captures(line)?.get(1)?.as_str();
                container_fact(&self.tables, image, &source, idx + 1)
            })
            .map(|fact| fact.in_block("config"))
            .collect()
    }
}

impl DialectScanner for NextflowScanner {
    fn name(&self) -> &'static str {
        "nextflow"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Nextflow
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["nf"]
    }

    fn extract_source(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        self.scan(source, artifact, None)
    }

    fn extract(&self, path: &Path) -> Result<Vec<ToolUsage>> {
        let source = read_artifact(path)?;
        Ok(self.scan(&source, &path.display().to_string(), path.parent()))
    }
}

/// Lines of a block body paired with their body-relative byte offsets.
fn body_lines(body: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    body.split_inclusive('\n')
        .map(|line| {
            let start = offset;
            offset += line.len();
            (start, line.trim_end_matches(['\n', '\r']))
        })
        .collect()
}

/// Argument text of `keyword value` or `keyword(value)`.
fn directive_value<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if !rest.starts_with([' ', '\t', '(']) {
        return None;
    }
    let rest = rest.trim();
    let rest = rest
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(rest);
    Some(rest.trim())
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|inner| inner.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
