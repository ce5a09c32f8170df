//! Shell command mining shared by every dialect.

use crate::tables::ToolTables;
use biomethod_protocol::{ParamValue, Parameters, PLACEHOLDER_VARIABLE};

/// A shell command attributed to a known tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellMatch {
    pub tool: &'static str,
    pub parameters: Parameters,
}

/// Attribute one command string: first token names the tool, the rest become parameters.
pub fn mine_command(tables: &ToolTables, command: &str) -> Option<ShellMatch> {
    let mut tokens = command.split_whitespace();
    let tool = tables.shell_tool(tokens.next()?)?;
    let args: Vec<&str> = tokens.collect();
    Some(ShellMatch {
        tool,
        parameters: command_parameters(&args),
    })
}

/// Flags consume the next token unless it is itself a flag; bare tokens fill
/// `input` then `output`.
pub fn command_parameters(args: &[&str]) -> Parameters {
    let mut params = Parameters::new();
    let mut idx = 0;
    while idx < args.len() {
        let arg = args[idx];
        if arg.starts_with('-') {
            match args.get(idx + 1) {
                Some(next) if !next.starts_with('-') => {
                    params.insert(arg.to_string(), token_value(next));
                    idx += 2;
                }
                _ => {
                    params.insert(arg.to_string(), ParamValue::Bool(true));
                    idx += 1;
                }
            }
        } else {
            let key = if params.contains_key("input") {
                "output"
            } else {
                "input"
            };
            params.insert(key.to_string(), token_value(arg));
            idx += 1;
        }
    }
    params
}

fn token_value(token: &str) -> ParamValue {
    if token.contains(PLACEHOLDER_VARIABLE) {
        ParamValue::placeholder(PLACEHOLDER_VARIABLE)
    } else {
        ParamValue::text(token)
    }
}

/// Split a command line into pipeline and sequence segments (`|`, `||`, `;`, `&&`).
pub fn split_segments(line: &str) -> Vec<&str> {
    let Some(re) = static_regex!(r"\|\|?|&&|;") else {
        return vec![line];
    };
    re.split(line)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Join backslash-continued lines; each joined line keeps the index of its first physical line.
pub fn join_continuations(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (idx, raw) in text.lines().enumerate() {
        let trimmed = raw.trim_end();
        let (body, continued) = match trimmed.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        let entry = pending.get_or_insert_with(|| (idx, String::new()));
        if !entry.1.is_empty() {
            entry.1.push(' ');
        }
        entry.1.push_str(body.trim());
        if !continued {
            if let Some(done) = pending.take() {
                out.push(done);
            }
        }
    }
    if let Some(done) = pending {
        out.push(done);
    }
    out
}

/// Mine every segment of every logical line of a shell script.
///
/// Returns `(line_offset, match)` pairs where the offset is relative to the
/// first line of `script`. Comment lines are skipped.
pub fn mine_script(tables: &ToolTables, script: &str) -> Vec<(usize, ShellMatch)> {
    let mut found = Vec::new();
    for (offset, line) in join_continuations(script) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for segment in split_segments(line) {
            if let Some(hit) = mine_command(tables, segment) {
                found.push((offset, hit));
            }
        }
    }
    found
}
