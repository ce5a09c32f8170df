use crate::dialect::Dialect;
use crate::lexer::line_at;
use crate::shell::mine_command;
use crate::tables::ToolTables;
use crate::DialectScanner;
use biomethod_protocol::{Evidence, ParamValue, Parameters, Position, ToolUsage};
use regex::Regex;
use std::sync::Arc;

/// Line-oriented scanner for R scripts and R Markdown.
///
/// Package loads, calls to known analysis functions and `system()` shell
/// invocations each yield a fact. Only fenced `{r}` chunks of R Markdown are
/// scanned; line numbers stay artifact-absolute.
pub struct RScriptScanner {
    tables: Arc<ToolTables>,
    functions: Option<Regex>,
}

impl RScriptScanner {
    pub fn new(tables: Arc<ToolTables>) -> Self {
        let mut names: Vec<&str> = tables.r_functions().iter().map(|f| f.name).collect();
        names.sort_by_key(|name| std::cmp::Reverse(name.len()));
        let alternation = names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"(?:\b[A-Za-z][A-Za-z0-9.]*::)?\b({alternation})\s*\(");
        let functions = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                log::error!("invalid R function pattern: {err}");
                None
            }
        };
        Self { tables, functions }
    }

    fn scan(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        let markdown = artifact.to_lowercase().ends_with(".rmd");
        let code = code_text(source, markdown);
        let mut found: Vec<(usize, ToolUsage)> = Vec::new();
        found.extend(self.library_facts(&code, artifact));
        found.extend(self.function_facts(&code, artifact));
        found.extend(self.system_facts(&code, artifact));
        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, fact)| fact).collect()
    }

    fn library_facts(&self, code: &str, artifact: &str) -> Vec<(usize, ToolUsage)> {
        let Some(re) = static_regex!(r"\b(library|require|requireNamespace|p_load)\s*\(([^()]*)\)")
        else {
            return Vec::new();
        };
        let mut facts = Vec::new();
        for caps in re.captures_iter(code) {
            let (Some(whole), Some(loader), Some(args)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let packages: Vec<&str> = split_args(args.as_str())
                .into_iter()
                .filter(|arg| !arg.contains('='))
                .take(if loader.as_str() == "p_load" { usize::MAX } else { 1 })
                .map(unquote)
                .filter(|pkg| is_package_name(pkg))
                .collect();
            for package in packages {
                let tool = self.tables.r_package(package);
                let category = self.tables.category(&tool);
                let line = Position::Line(line_at(code, whole.start()));
                facts.push((
                    whole.start(),
                    ToolUsage::new(tool, artifact, line, Evidence::Library).with_category(category),
                ));
            }
        }
        facts
    }

    fn function_facts(&self, code: &str, artifact: &str) -> Vec<(usize, ToolUsage)> {
        let Some(re) = &self.functions else {
            return Vec::new();
        };
        let mut facts = Vec::new();
        for caps in re.captures_iter(code) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some(func) = self.tables.r_function(name.as_str()) else {
                continue;
            };
            let parameters = call_arguments(code, whole.end() - 1)
                .map(keyword_parameters)
                .unwrap_or_default();
            let line = Position::Line(line_at(code, whole.start()));
            facts.push((
                whole.start(),
                ToolUsage::new(func.tool, artifact, line, Evidence::FunctionCall)
                    .with_parameters(parameters)
                    .with_category(func.category),
            ));
        }
        facts
    }

    fn system_facts(&self, code: &str, artifact: &str) -> Vec<(usize, ToolUsage)> {
        let Some(re) = static_regex!(r#"\bsystem2?\s*\(\s*(?:command\s*=\s*)?(?:"((?:\\.|[^"\\])*)"|'((?:\\.|[^'\\])*)')"#)
        else {
            return Vec::new();
        };
        re.captures_iter(code)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let command = caps.get(1).or_else(|| caps.get(2))?.as_str();
                let hit = mine_command(&self.tables, command)?;
                let line = Position::Line(line_at(code, whole.start()));
                Some((
                    whole.start(),
                    ToolUsage::new(hit.tool, artifact, line, Evidence::ShellCommand)
                        .with_parameters(hit.parameters)
                        .with_category(self.tables.category(hit.tool)),
                ))
            })
            .collect()
    }
}

impl DialectScanner for RScriptScanner {
    fn name(&self) -> &'static str {
        "r"
    }

    fn dialect(&self) -> Dialect {
        Dialect::R
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["r", "rmd"]
    }

    fn extract_source(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        self.scan(source, artifact)
    }
}

/// Source with comments and (for R Markdown) prose blanked; line count preserved.
fn code_text(source: &str, markdown: bool) -> String {
    let mut in_chunk = !markdown;
    let mut out = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if markdown && trimmed.starts_with("```") {
            let info = trimmed.trim_start_matches('`').trim_start();
            in_chunk = !in_chunk && is_r_chunk_header(info);
            out.push("");
            continue;
        }
        out.push(if in_chunk { strip_comment(line) } else { "" });
    }
    out.join("\n")
}

fn is_r_chunk_header(info: &str) -> bool {
    let Some(inner) = info.strip_prefix('{') else {
        return false;
    };
    let mut chars = inner.chars();
    matches!(chars.next(), Some('r' | 'R'))
        && matches!(chars.next(), Some(' ' | ',' | '}') | None)
}

/// Drop a trailing `#` comment that is not inside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '#' => return &line[..idx],
                _ => {}
            },
        }
    }
    line
}

/// Text between the parenthesis at `open` and its match.
fn call_arguments(code: &str, open: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in code.get(open..)?.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return code.get(open + 1..open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on top-level commas.
fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, ch) in args.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(args[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// `key = value` arguments as text parameters; positional arguments are ignored.
fn keyword_parameters(args: &str) -> Parameters {
    let mut params = Parameters::new();
    for arg in split_args(args) {
        let Some((key, value)) = arg.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if value.starts_with('=') || !is_package_name(key) {
            continue;
        }
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        params.insert(key.to_string(), ParamValue::text(unquote(&value)));
    }
    params
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

fn is_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}
