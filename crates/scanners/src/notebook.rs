use crate::dialect::Dialect;
use crate::script::ScriptScanner;
use crate::shell::{mine_command, mine_script, split_segments, ShellMatch};
use crate::tables::ToolTables;
use crate::DialectScanner;
use biomethod_protocol::{Evidence, Position, ToolUsage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const SHELL_CELL_MAGICS: &[&str] = &["%%bash", "%%sh", "%%script bash", "%%script sh"];

/// Scanner for Jupyter notebooks.
///
/// Code cells of Python-kernel notebooks are run through the script rules;
/// shell escapes and shell cell magics are mined as shell commands. Every
/// fact is positioned at its cell ordinal. Versions printed in a cell's
/// captured output fill versionless facts of that same cell.
pub struct NotebookScanner {
    tables: Arc<ToolTables>,
    script: ScriptScanner,
}

impl NotebookScanner {
    pub fn new(tables: Arc<ToolTables>) -> Self {
        let script = ScriptScanner::new(Arc::clone(&tables));
        Self { tables, script }
    }

    fn cell_facts(&self, cell: &Value, index: usize, artifact: &str) -> Vec<ToolUsage> {
        let source = joined_text(cell.get("source"));
        let mut shell_hits: Vec<ShellMatch> = Vec::new();
        let mut python = Vec::new();

        let first = source.lines().next().map(str::trim).unwrap_or("");
        if SHELL_CELL_MAGICS.iter().any(|magic| first == *magic) {
            let body: String = source.lines().skip(1).collect::<Vec<_>>().join("\n");
            shell_hits.extend(mine_script(&self.tables, &body).into_iter().map(|(_, hit)| hit));
        } else {
            for line in source.lines() {
                let trimmed = line.trim_start();
                if let Some(command) = trimmed.strip_prefix('!') {
                    shell_hits.extend(
                        split_segments(command)
                            .into_iter()
                            .filter_map(|segment| mine_command(&self.tables, segment)),
                    );
                } else if !trimmed.starts_with('%') {
                    python.push(line);
                }
            }
        }

        let position = Position::Cell(index);
        let mut facts: Vec<ToolUsage> = shell_hits
            .into_iter()
            .map(|hit| {
                ToolUsage::new(hit.tool, artifact, position, Evidence::ShellCommand)
                    .with_parameters(hit.parameters)
                    .with_category(self.tables.category(hit.tool))
            })
            .collect();
        if python.iter().any(|line| !line.trim().is_empty()) {
            facts.extend(
                self.script
                    .scan_python(&python.join("\n"), artifact)
                    .into_iter()
                    .map(|mut fact| {
                        fact.position = position;
                        fact
                    }),
            );
        }

        let versions = self.output_versions(cell);
        if !versions.is_empty() {
            for fact in facts.iter_mut().filter(|fact| !fact.has_version()) {
                if let Some(version) = versions.get(fact.name.as_str()) {
                    fact.version = Some(version.clone());
                }
            }
        }
        facts
    }

    /// Tool -> version pairs recovered from a cell's captured output.
    ///
    /// Patterns are tried in order (`name version`, `name/version`,
    /// `name-version`); the first hit per tool wins.
    fn output_versions(&self, cell: &Value) -> HashMap<&'static str, String> {
        let mut found = HashMap::new();
        let Some(outputs) = cell.get("outputs").and_then(Value::as_array) else {
            return found;
        };
        let patterns = [
            static_regex!(r"(?i)\b([A-Za-z][A-Za-z0-9_.+-]*?)\s+(?:version\s+)?v?(\d+\.\d+(?:\.\d+)*)"),
            static_regex!(r"\b([A-Za-z][A-Za-z0-9_.+-]*?)/v?(\d+\.\d+(?:\.\d+)*)"),
            static_regex!(r"\b([A-Za-z][A-Za-z0-9_.+]*?)-v?(\d+\.\d+(?:\.\d+)*)"),
        ];
        for output in outputs {
            let text = output_text(output);
            for re in patterns.iter().flatten() {
                for caps in re.captures_iter(&text) {
                    let (Some(name), Some(version)) = (caps.get(1), caps.get(2)) else {
                        continue;
                    };
                    if let Some(tool) = self.tables.known_tool(name.as_str()) {
                        found
                            .entry(tool)
                            .or_insert_with(|| version.as_str().to_string());
                    }
                }
            }
        }
        found
    }
}

impl DialectScanner for NotebookScanner {
    fn name(&self) -> &'static str {
        "notebook"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Notebook
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ipynb"]
    }

    fn extract_source(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        let doc: Value = match serde_json::from_str(source) {
            Ok(doc) => doc,
            Err(err) => {
                log::debug!("skipping {artifact}: {err}");
                return Vec::new();
            }
        };
        let language = kernel_language(&doc);
        if !language.eq_ignore_ascii_case("python") {
            log::debug!("skipping {artifact}: {language} kernel");
            return Vec::new();
        }
        let Some(cells) = doc.get("cells").and_then(Value::as_array) else {
            return Vec::new();
        };
        cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.get("cell_type").and_then(Value::as_str) == Some("code"))
            .flat_map(|(index, cell)| self.cell_facts(cell, index, artifact))
            .collect()
    }
}

fn kernel_language(doc: &Value) -> String {
    let metadata = doc.get("metadata");
    metadata
        .and_then(|m| m.pointer("/kernelspec/language"))
        .or_else(|| metadata.and_then(|m| m.pointer("/language_info/name")))
        .and_then(Value::as_str)
        .unwrap_or("python")
        .to_string()
}

/// Notebook text fields are either a string or a list of line strings.
fn joined_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn output_text(output: &Value) -> String {
    match output.get("output_type").and_then(Value::as_str) {
        Some("stream") => joined_text(output.get("text")),
        Some("execute_result" | "display_data") => {
            joined_text(output.pointer("/data/text~1plain"))
        }
        _ => String::new(),
    }
}
