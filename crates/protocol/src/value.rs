use schemars::JsonSchema;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Parameter map of a tool usage, keyed by flag or argument name.
pub type Parameters = BTreeMap<String, ParamValue>;

/// Token recorded for shell arguments that were built from workflow variables.
pub const PLACEHOLDER_VARIABLE: &str = "<variable>";

/// Sentinel prefixed to bare name references captured from call arguments.
pub const REFERENCE_SENTINEL: char = '$';

/// Object key that tags a serialized placeholder.
///
/// Literal map keys starting with `$` are written with an extra `$`, so this
/// key never comes from a captured map.
pub const PLACEHOLDER_KEY: &str = "$placeholder";

/// A literal value captured from source.
///
/// Values that could not be resolved to a literal (a variable reference, an
/// interpolated workflow argument) are kept as an opaque [`ParamValue::Placeholder`]
/// instead of being dropped.
///
/// Literals serialize untagged; a placeholder serializes as
/// `{"$placeholder": "<token>"}`.
#[derive(Debug, Clone, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
    Placeholder {
        #[serde(rename = "$placeholder")]
        placeholder: String,
    },
    Map(BTreeMap<String, ParamValue>),
}

fn escape_key(key: &str) -> Cow<'_, str> {
    if key.starts_with('$') {
        Cow::Owned(format!("${key}"))
    } else {
        Cow::Borrowed(key)
    }
}

fn unescape_key(key: String) -> String {
    match key.strip_prefix('$') {
        Some(rest) if rest.starts_with('$') => rest.to_string(),
        _ => key,
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Text(s) => serializer.serialize_str(s),
            Self::List(items) => items.serialize(serializer),
            Self::Placeholder { placeholder } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(PLACEHOLDER_KEY, placeholder)?;
                map.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(&escape_key(key), value)?;
                }
                map.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawValue::deserialize(deserializer)? {
            RawValue::Bool(b) => Self::Bool(b),
            RawValue::Integer(n) => Self::Integer(n),
            RawValue::Float(x) => Self::Float(x),
            RawValue::Text(s) => Self::Text(s),
            RawValue::List(items) => Self::List(items),
            RawValue::Map(mut entries) => {
                let tagged = entries.len() == 1
                    && matches!(entries.get(PLACEHOLDER_KEY), Some(Self::Text(_)));
                if tagged {
                    if let Some(Self::Text(token)) = entries.remove(PLACEHOLDER_KEY) {
                        return Ok(Self::placeholder(token));
                    }
                }
                Self::Map(
                    entries
                        .into_iter()
                        .map(|(key, value)| (unescape_key(key), value))
                        .collect(),
                )
            }
        })
    }
}

impl ParamValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn placeholder(token: impl Into<String>) -> Self {
        Self::Placeholder {
            placeholder: token.into(),
        }
    }

    /// Placeholder for a bare name reference (`$name`).
    pub fn reference(name: &str) -> Self {
        Self::placeholder(format!("{REFERENCE_SENTINEL}{name}"))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }

    /// Visit every string literal, descending into lists and maps.
    pub fn visit_strings<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Self::Text(s) => visit(s),
            Self::List(items) => {
                for item in items {
                    item.visit_strings(visit);
                }
            }
            Self::Map(map) => {
                for value in map.values() {
                    value.visit_strings(visit);
                }
            }
            Self::Bool(_) | Self::Integer(_) | Self::Float(_) | Self::Placeholder { .. } => {}
        }
    }

    /// Returns the first string literal matching `pred`, searching nested values.
    pub fn find_string(&self, pred: impl Fn(&str) -> bool) -> Option<&str> {
        let mut found = None;
        self.visit_strings(&mut |s| {
            if found.is_none() && pred(s) {
                found = Some(s);
            }
        });
        found
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Placeholder { placeholder } => f.write_str(placeholder),
            Self::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn placeholder_serializes_as_tagged_object() {
        let value = ParamValue::reference("adata");
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({ "$placeholder": "$adata" }));

        let back: ParamValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn literal_maps_never_read_back_as_placeholders() {
        for key in ["placeholder", "$placeholder", "$$x"] {
            let mut map = BTreeMap::new();
            map.insert(key.to_string(), ParamValue::text("x"));
            let value = ParamValue::Map(map);

            let json = serde_json::to_string(&value).unwrap();
            let back: ParamValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value, "key {key} via {json}");
        }
    }

    #[test]
    fn literals_serialize_untagged() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), ParamValue::Integer(3));
        let value = ParamValue::List(vec![
            ParamValue::text("a"),
            ParamValue::Bool(true),
            ParamValue::Float(0.5),
            ParamValue::Map(map),
        ]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!(["a", true, 0.5, { "k": 3 }]));
    }

    #[test]
    fn visit_strings_descends_into_containers() {
        let mut map = BTreeMap::new();
        map.insert("out".to_string(), ParamValue::text("/home/me/out.bam"));
        let value = ParamValue::List(vec![ParamValue::text("x"), ParamValue::Map(map)]);

        let mut seen = Vec::new();
        value.visit_strings(&mut |s| seen.push(s.to_string()));
        assert_eq!(seen, vec!["x".to_string(), "/home/me/out.bam".to_string()]);
        assert_eq!(
            value.find_string(|s| s.starts_with("/home/")),
            Some("/home/me/out.bam")
        );
    }

    #[test]
    fn display_joins_nested_values() {
        let value = ParamValue::List(vec![ParamValue::text("bwa"), ParamValue::Integer(8)]);
        assert_eq!(value.to_string(), "[bwa, 8]");
    }
}
