//! Best-effort literal evaluation over tree-sitter Python nodes.

use biomethod_protocol::ParamValue;
use std::collections::BTreeMap;
use tree_sitter::Node;

pub(crate) fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Literal value of an expression node, if it has one.
///
/// Bare identifiers become reference placeholders; `None` and any other
/// expression shape yield `None`.
pub fn literal_of(node: Node<'_>, source: &str) -> Option<ParamValue> {
    match node.kind() {
        "string" => string_literal(node, source).map(ParamValue::Text),
        "concatenated_string" => {
            let mut out = String::new();
            let mut cursor = node.walk();
            for part in node.named_children(&mut cursor) {
                out.push_str(&string_literal(part, source)?);
            }
            Some(ParamValue::Text(out))
        }
        "integer" => parse_integer(node_text(node, source)).map(ParamValue::Integer),
        "float" => node_text(node, source)
            .replace('_', "")
            .parse::<f64>()
            .ok()
            .map(ParamValue::Float),
        "true" => Some(ParamValue::Bool(true)),
        "false" => Some(ParamValue::Bool(false)),
        "unary_operator" => {
            let operator = node.child_by_field_name("operator")?;
            let argument = node.child_by_field_name("argument")?;
            match (node_text(operator, source), literal_of(argument, source)?) {
                ("-", ParamValue::Integer(n)) => Some(ParamValue::Integer(-n)),
                ("-", ParamValue::Float(x)) => Some(ParamValue::Float(-x)),
                ("+", value @ (ParamValue::Integer(_) | ParamValue::Float(_))) => Some(value),
                _ => None,
            }
        }
        "list" | "tuple" => {
            let mut cursor = node.walk();
            let items = node
                .named_children(&mut cursor)
                .filter(|child| child.kind() != "comment")
                .map(|child| literal_of(child, source))
                .collect::<Option<Vec<_>>>()?;
            Some(ParamValue::List(items))
        }
        "dictionary" => {
            let mut map = BTreeMap::new();
            let mut cursor = node.walk();
            for pair in node.named_children(&mut cursor) {
                match pair.kind() {
                    "pair" => {
                        let key = literal_of(pair.child_by_field_name("key")?, source)?;
                        let value = literal_of(pair.child_by_field_name("value")?, source)?;
                        let key = match key {
                            ParamValue::Text(text) => text,
                            ParamValue::Placeholder { .. } => return None,
                            other => other.to_string(),
                        };
                        map.insert(key, value);
                    }
                    "comment" => {}
                    _ => return None,
                }
            }
            Some(ParamValue::Map(map))
        }
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let inner = node
                .named_children(&mut cursor)
                .find(|child| child.kind() != "comment")?;
            literal_of(inner, source)
        }
        "identifier" => Some(ParamValue::reference(node_text(node, source))),
        _ => None,
    }
}

/// Best-effort command string for a process-spawning call's first argument.
///
/// Formatted strings keep only their literal segments; list commands require
/// every element to evaluate and are joined with spaces.
pub fn command_string(node: Node<'_>, source: &str) -> Option<String> {
    let command = match node.kind() {
        "string" => literal_segments(node, source),
        "concatenated_string" => {
            let mut out = String::new();
            let mut cursor = node.walk();
            for part in node.named_children(&mut cursor) {
                out.push_str(&literal_segments(part, source));
            }
            out
        }
        "list" | "tuple" => match literal_of(node, source)? {
            ParamValue::List(items) => items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            _ => return None,
        },
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let inner = node.named_children(&mut cursor).next()?;
            return command_string(inner, source);
        }
        _ => return None,
    };
    (!command.trim().is_empty()).then_some(command)
}

/// Plain string literal value; formatted strings with interpolations are not literals.
fn string_literal(node: Node<'_>, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let mut cursor = node.walk();
    if node
        .named_children(&mut cursor)
        .any(|child| child.kind() == "interpolation")
    {
        return None;
    }
    Some(literal_segments(node, source))
}

fn literal_segments(node: Node<'_>, source: &str) -> String {
    let raw = string_prefix(node, source).contains(['r', 'R']);
    let mut out = String::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "string_content" {
            let text = node_text(child, source);
            if raw {
                out.push_str(text);
            } else {
                out.push_str(&unescape(text));
            }
        }
    }
    out
}

fn string_prefix<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    let mut cursor = node.walk();
    let start = node
        .children(&mut cursor)
        .find(|child| child.kind() == "string_start")
        .map(|child| node_text(child, source))
        .unwrap_or("");
    start.trim_end_matches(['"', '\''])
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_integer(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "").to_lowercase();
    let cleaned = cleaned.trim_end_matches('l');
    if let Some(hex) = cleaned.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = cleaned.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = cleaned.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        cleaned.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tree_sitter::Parser;

    /// Evaluate the right-hand side of `x = <expr>`.
    fn eval(expr: &str, f: impl Fn(Node<'_>, &str) -> Option<String>) -> Option<String> {
        let source = format!("x = {expr}\n");
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(&source, None).unwrap();
        let assignment = tree
            .root_node()
            .named_child(0)
            .and_then(|stmt| stmt.named_child(0))
            .unwrap();
        let rhs = assignment.child_by_field_name("right").unwrap();
        f(rhs, &source)
    }

    fn literal(expr: &str) -> Option<String> {
        eval(expr, |node, src| {
            literal_of(node, src).map(|v| serde_json::to_string(&v).unwrap())
        })
    }

    fn command(expr: &str) -> Option<String> {
        eval(expr, command_string)
    }

    #[test]
    fn scalars() {
        assert_eq!(literal("'abc'").as_deref(), Some("\"abc\""));
        assert_eq!(literal("42").as_deref(), Some("42"));
        assert_eq!(literal("-3").as_deref(), Some("-3"));
        assert_eq!(literal("0.5").as_deref(), Some("0.5"));
        assert_eq!(literal("True").as_deref(), Some("true"));
        assert_eq!(literal("None"), None);
        assert_eq!(literal("1_000").as_deref(), Some("1000"));
    }

    #[test]
    fn containers_require_literal_elements() {
        assert_eq!(literal("[1, 'a', False]").as_deref(), Some("[1,\"a\",false]"));
        assert_eq!(literal("{'k': 1, 'v': [2]}").as_deref(), Some("{\"k\":1,\"v\":[2]}"));
        assert_eq!(literal("[1, f(x)]"), None);
        assert_eq!(literal("{'k': g()}"), None);
    }

    #[test]
    fn identifiers_become_references() {
        assert_eq!(
            literal("adata").as_deref(),
            Some("{\"$placeholder\":\"$adata\"}")
        );
    }

    #[test]
    fn fstrings_are_not_literals_but_feed_commands() {
        assert_eq!(literal("f'bwa mem {ref}'"), None);
        assert_eq!(
            command("f'bwa mem -t 4 {ref} {reads}'").as_deref(),
            Some("bwa mem -t 4  ")
        );
    }

    #[test]
    fn list_commands_join_with_spaces() {
        assert_eq!(
            command("['samtools', 'sort', '-o', 'out.bam', 'in.bam']").as_deref(),
            Some("samtools sort -o out.bam in.bam")
        );
        assert_eq!(command("['samtools', build()]"), None);
        assert_eq!(command("cmd"), None);
        assert_eq!(command("''"), None);
    }

    #[test]
    fn concatenated_strings() {
        assert_eq!(
            command("'fastqc ' 'sample.fq'").as_deref(),
            Some("fastqc sample.fq")
        );
    }
}
