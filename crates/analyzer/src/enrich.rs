use crate::version::VersionOracle;
use biomethod_knowledge::{KnowledgeBase, KnowledgeEntry};
use biomethod_protocol::{normalize_tool_name, EnvironmentSnapshot, ToolUsage};
use std::collections::HashMap;

/// Fill absent fields of every fact; fields already set are never changed.
///
/// Versions come from the oracle first, then from the snapshot's declared
/// packages. Citation, category, description and aliases come from the
/// knowledge base.
pub async fn enrich_tools(
    tools: &mut [ToolUsage],
    knowledge: &KnowledgeBase,
    oracle: &dyn VersionOracle,
    environment: &EnvironmentSnapshot,
) {
    let mut resolved: HashMap<String, Option<String>> = HashMap::new();
    for tool in tools.iter_mut() {
        if !tool.has_version() {
            let key = normalize_tool_name(&tool.name);
            if !resolved.contains_key(&key) {
                let version = oracle.resolve(&tool.name).await;
                resolved.insert(key.clone(), version);
            }
            let version = resolved
                .get(&key)
                .cloned()
                .flatten()
                .or_else(|| environment.declared_version(&tool.name).map(str::to_string));
            if version.is_some() {
                tool.version = version;
            }
        }

        if let Some(entry) = knowledge.lookup(&tool.name) {
            fill_from_knowledge(tool, entry);
        }
    }
    log::debug!(
        "enriched {} facts ({} distinct oracle queries)",
        tools.len(),
        resolved.len()
    );
}

pub fn fill_from_knowledge(tool: &mut ToolUsage, entry: &KnowledgeEntry) {
    if tool.citation.is_none() {
        tool.citation = entry.citation.clone();
    }
    if tool.category.is_unknown() {
        tool.category = entry.category;
    }
    if tool.description.as_deref().map_or(true, str::is_empty) && !entry.description.is_empty() {
        tool.description = Some(entry.description.clone());
    }
    if tool.aliases.is_empty() {
        tool.aliases = entry.aliases.clone();
    }
}
