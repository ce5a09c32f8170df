use crate::dialect::Dialect;
use crate::error::{Result, ScanError};
use crate::literal::{command_string, literal_of, node_text};
use crate::shell::mine_command;
use crate::tables::ToolTables;
use crate::DialectScanner;
use biomethod_protocol::{Evidence, Parameters, Position, ToolUsage};
use std::sync::Arc;
use tree_sitter::{Node, Parser, Tree};

/// Process-spawning primitives whose first argument is a shell command.
const PROCESS_CALLS: &[&str] = &[
    "subprocess.run",
    "subprocess.call",
    "subprocess.Popen",
    "subprocess.check_call",
    "subprocess.check_output",
    "os.system",
    "os.popen",
];

/// Scanner for imperative Python scripts, backed by tree-sitter.
///
/// Three independent rules run over the same syntax tree: import mapping,
/// shell-invocation mining and known-API call mining. Their outputs are
/// concatenated in that order, each in document order.
pub struct ScriptScanner {
    tables: Arc<ToolTables>,
}

impl ScriptScanner {
    pub fn new(tables: Arc<ToolTables>) -> Self {
        Self { tables }
    }

    fn parse(&self, source: &str) -> Result<Tree> {
        let language = Dialect::Python.tree_sitter_language()?;
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ScanError::tree_sitter(format!("Failed to set language: {e}")))?;
        parser
            .parse(source, None)
            .ok_or_else(|| ScanError::parse("Failed to parse source code"))
    }

    /// Facts for a Python source text. Syntax errors yield an empty list.
    pub(crate) fn scan_python(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        let tree = match self.parse(source) {
            Ok(tree) => tree,
            Err(err) => {
                log::debug!("skipping {artifact}: {err}");
                return Vec::new();
            }
        };
        let root = tree.root_node();
        if root.has_error() {
            log::debug!("skipping {artifact}: syntax error");
            return Vec::new();
        }

        let mut imports = Vec::new();
        let mut commands = Vec::new();
        let mut api_calls = Vec::new();
        walk(root, &mut |node| match node.kind() {
            "import_statement" => self.import_facts(node, source, artifact, &mut imports),
            "import_from_statement" => {
                self.import_from_fact(node, source, artifact, &mut imports);
            }
            "call" => {
                let Some(name) = node
                    .child_by_field_name("function")
                    .and_then(|func| dotted_name(func, source))
                else {
                    return;
                };
                if let Some(fact) = self.command_fact(node, &name, source, artifact) {
                    commands.push(fact);
                }
                if let Some(fact) = self.api_fact(node, &name, source, artifact) {
                    api_calls.push(fact);
                }
            }
            _ => {}
        });

        imports.extend(commands);
        imports.extend(api_calls);
        imports
    }

    fn import_fact(&self, module: &str, node: Node<'_>, artifact: &str) -> Option<ToolUsage> {
        let tool = self.tables.import_tool(module)?;
        Some(
            ToolUsage::new(tool, artifact, line_of(node), Evidence::Import)
                .with_category(self.tables.category(tool)),
        )
    }

    fn import_facts(&self, node: Node<'_>, source: &str, artifact: &str, out: &mut Vec<ToolUsage>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let module = match name.kind() {
                "aliased_import" => name.child_by_field_name("name"),
                _ => Some(name),
            };
            if let Some(module) = module {
                out.extend(self.import_fact(node_text(module, source), node, artifact));
            }
        }
    }

    fn import_from_fact(
        &self,
        node: Node<'_>,
        source: &str,
        artifact: &str,
        out: &mut Vec<ToolUsage>,
    ) {
        let Some(module) = node.child_by_field_name("module_name") else {
            return;
        };
        if module.kind() != "dotted_name" {
            return;
        }
        out.extend(self.import_fact(node_text(module, source), node, artifact));
    }

    fn command_fact(
        &self,
        call: Node<'_>,
        name: &str,
        source: &str,
        artifact: &str,
    ) -> Option<ToolUsage> {
        if !PROCESS_CALLS.contains(&name) {
            return None;
        }
        let arguments = call.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        let first = arguments
            .named_children(&mut cursor)
            .find(|arg| arg.kind() != "comment")?;
        if matches!(first.kind(), "keyword_argument" | "list_splat" | "dictionary_splat") {
            return None;
        }
        let command = command_string(first, source)?;
        let hit = mine_command(&self.tables, &command)?;
        Some(
            ToolUsage::new(hit.tool, artifact, line_of(call), Evidence::ShellCommand)
                .with_parameters(hit.parameters)
                .with_category(self.tables.category(hit.tool)),
        )
    }

    fn api_fact(
        &self,
        call: Node<'_>,
        name: &str,
        source: &str,
        artifact: &str,
    ) -> Option<ToolUsage> {
        let api = self.tables.api_prefix(name)?;
        let parameters = call
            .child_by_field_name("arguments")
            .map(|args| call_parameters(args, source))
            .unwrap_or_default();
        Some(
            ToolUsage::new(api.tool, artifact, line_of(call), Evidence::ApiCall)
                .with_parameters(parameters)
                .with_category(api.category),
        )
    }
}

impl DialectScanner for ScriptScanner {
    fn name(&self) -> &'static str {
        "script"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Python
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyw"]
    }

    fn extract_source(&self, source: &str, artifact: &str) -> Vec<ToolUsage> {
        self.scan_python(source, artifact)
    }
}

/// Positional arguments become `arg_{i}`, keyword arguments keep their name.
fn call_parameters(arguments: Node<'_>, source: &str) -> Parameters {
    let mut params = Parameters::new();
    let mut position = 0;
    let mut cursor = arguments.walk();
    for arg in arguments.named_children(&mut cursor) {
        match arg.kind() {
            "comment" => {}
            "keyword_argument" => {
                let (Some(key), Some(value)) = (
                    arg.child_by_field_name("name"),
                    arg.child_by_field_name("value"),
                ) else {
                    continue;
                };
                if let Some(value) = literal_of(value, source) {
                    params.insert(node_text(key, source).to_string(), value);
                }
            }
            "list_splat" | "dictionary_splat" => position += 1,
            _ => {
                if let Some(value) = literal_of(arg, source) {
                    params.insert(format!("arg_{position}"), value);
                }
                position += 1;
            }
        }
    }
    params
}

/// Dotted name of a call target (`a.b.c`), or `None` for computed targets.
fn dotted_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "attribute" => {
            let object = dotted_name(node.child_by_field_name("object")?, source)?;
            let attribute = node.child_by_field_name("attribute")?;
            Some(format!("{object}.{}", node_text(attribute, source)))
        }
        _ => None,
    }
}

fn line_of(node: Node<'_>) -> Position {
    Position::Line(node.start_position().row + 1)
}

/// Pre-order walk in document order.
fn walk<'t>(root: Node<'t>, visit: &mut impl FnMut(Node<'t>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}
