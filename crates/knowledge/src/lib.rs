//! # BioMethod Knowledge
//!
//! Immutable lookup of canonical tool names to descriptive metadata
//! (category, citation, aliases, description, common parameters).
//!
//! A dataset is bundled with the crate; callers may also load an external
//! JSON file. Loading never aborts an analysis: a dataset that cannot be read
//! or parsed yields an empty base whose lookups always miss.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use biomethod_protocol::{normalize_tool_name, Category, Citation};
use serde::Deserialize;

const BUILTIN_DATASET: &str = include_str!("../data/tools.json");

/// Metadata for one canonical tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub name: String,
    pub category: Category,
    pub citation: Option<Citation>,
    pub aliases: Vec<String>,
    pub description: String,
    /// Common parameter -> short documentation
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    citation: Option<Citation>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

impl From<RawEntry> for KnowledgeEntry {
    fn from(raw: RawEntry) -> Self {
        Self {
            name: raw.name,
            category: raw
                .category
                .as_deref()
                .map(Category::parse)
                .unwrap_or_default(),
            citation: raw.citation.filter(|c| !c.text.trim().is_empty()),
            aliases: raw.aliases,
            description: raw.description,
            parameters: raw.parameters,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: HashMap<String, KnowledgeEntry>,
    /// normalized alias -> normalized entry key
    aliases: HashMap<String, String>,
}

impl KnowledgeBase {
    /// An empty base; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The dataset bundled with the crate.
    pub fn builtin() -> Self {
        match Self::from_bytes(BUILTIN_DATASET.as_bytes()) {
            Ok(kb) => kb,
            Err(err) => {
                log::warn!("bundled knowledge base failed to parse: {err:#}");
                Self::empty()
            }
        }
    }

    /// Load a dataset from `path`, falling back to an empty base on any failure.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(kb) => kb,
            Err(err) => {
                log::warn!("knowledge base unavailable, continuing without it: {err:#}");
                Self::empty()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read knowledge base at {}", path.display()))?;
        Self::from_bytes(&bytes)
            .with_context(|| format!("parse knowledge base at {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: Vec<RawEntry> =
            serde_json::from_slice(bytes).context("knowledge base must be a JSON array")?;
        Ok(Self::from_entries(raw.into_iter().map(KnowledgeEntry::from)))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = KnowledgeEntry>) -> Self {
        let mut kb = Self::default();
        for entry in entries {
            let key = normalize_tool_name(&entry.name);
            if key.is_empty() {
                continue;
            }
            for alias in &entry.aliases {
                kb.aliases
                    .entry(normalize_tool_name(alias))
                    .or_insert_with(|| key.clone());
            }
            kb.entries.entry(key).or_insert(entry);
        }
        log::debug!("knowledge base ready with {} entries", kb.entries.len());
        kb
    }

    /// Look up a tool by name, then by alias; both compared after normalization.
    pub fn lookup(&self, name: &str) -> Option<&KnowledgeEntry> {
        let key = normalize_tool_name(name);
        if key.is_empty() {
            return None;
        }
        self.entries.get(&key).or_else(|| {
            self.aliases
                .get(&key)
                .and_then(|canonical| self.entries.get(canonical))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by canonical name.
    pub fn entries(&self) -> Vec<&KnowledgeEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}
