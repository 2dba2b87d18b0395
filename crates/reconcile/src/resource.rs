//! Resource declarations and attribute references.
//!
//! A [`ResourceDecl`] is the ephemeral, per-run description of one resource:
//! a logical name that is stable across runs, an opaque type tag the provider
//! registry dispatches on, a property map, and the set of resources it
//! depends on. Dependencies come from two places: the explicit `depends_on`
//! set, and `${name.attr}` reference tokens embedded in string property
//! values, which also splice the referenced attribute value in at apply time.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_]*)\}")
            .expect("reference pattern is valid")
    })
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("name pattern is valid")
    })
}

/// A reference to another resource's attribute, written `${name.attr}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrRef {
    /// Logical name of the referenced resource.
    pub resource: String,
    /// Attribute to read off the referenced resource.
    pub attribute: String,
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.resource, self.attribute)
    }
}

/// One declared resource in the desired-state graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Logical name, unique within the stack.
    pub name: String,
    /// Opaque type tag (e.g. "bucket", "repository") used for provider
    /// dispatch. The core attaches no meaning to it.
    pub resource_type: String,
    /// Declared properties. Insertion order is irrelevant; hashing and
    /// comparison are key-order independent.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Explicitly declared dependencies, by logical name.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl ResourceDecl {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Builder-style property setter, mostly for tests and embedding.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Builder-style dependency setter.
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    /// Structural validation: name and type tag are well-formed and the
    /// resource does not depend on itself. Type-specific checks belong to
    /// the provider.
    pub fn validate(&self) -> Result<()> {
        if !name_pattern().is_match(&self.name) {
            return Err(Error::validation(
                &self.name,
                "logical name must start with a letter and contain only \
                 letters, digits, '_' or '-'",
            ));
        }
        if self.resource_type.is_empty() {
            return Err(Error::validation(&self.name, "missing resource type"));
        }
        if self.all_dependencies().contains(&self.name) {
            return Err(Error::validation(&self.name, "resource depends on itself"));
        }
        Ok(())
    }

    /// All attribute references embedded in property values.
    pub fn references(&self) -> BTreeSet<AttrRef> {
        let mut refs = BTreeSet::new();
        for value in self.properties.values() {
            collect_refs(value, &mut refs);
        }
        refs
    }

    /// The full dependency set: `depends_on` plus every referenced resource.
    pub fn all_dependencies(&self) -> BTreeSet<String> {
        let mut deps = self.depends_on.clone();
        deps.extend(self.references().into_iter().map(|r| r.resource));
        deps
    }
}

fn collect_refs(value: &Value, refs: &mut BTreeSet<AttrRef>) {
    match value {
        Value::String(s) => {
            for captures in reference_pattern().captures_iter(s) {
                refs.insert(AttrRef {
                    resource: captures[1].to_string(),
                    attribute: captures[2].to_string(),
                });
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, refs);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_refs(item, refs);
            }
        }
        _ => {}
    }
}

/// Resolve every reference token in `properties` through `lookup`.
///
/// A string that consists of exactly one token is replaced by the looked-up
/// value with its type preserved; tokens embedded in longer strings are
/// spliced in as text. Tokens `lookup` cannot resolve are left as written,
/// so a declaration referencing a resource that does not exist yet hashes
/// stably until the target materializes.
pub fn resolve_properties<F>(
    properties: &BTreeMap<String, Value>,
    lookup: &F,
) -> BTreeMap<String, Value>
where
    F: Fn(&AttrRef) -> Option<Value>,
{
    properties
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, lookup)))
        .collect()
}

fn resolve_value<F>(value: &Value, lookup: &F) -> Value
where
    F: Fn(&AttrRef) -> Option<Value>,
{
    match value {
        Value::String(s) => resolve_string(s, lookup),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| resolve_value(item, lookup)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), resolve_value(item, lookup)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string<F>(s: &str, lookup: &F) -> Value
where
    F: Fn(&AttrRef) -> Option<Value>,
{
    let pattern = reference_pattern();

    // A lone token keeps the resolved value's type.
    if let Some(captures) = pattern.captures(s)
        && captures.get(0).map(|m| m.as_str()) == Some(s)
    {
        let reference = AttrRef {
            resource: captures[1].to_string(),
            attribute: captures[2].to_string(),
        };
        return match lookup(&reference) {
            Some(value) => value,
            None => Value::String(s.to_string()),
        };
    }

    // Tokens inside longer strings splice in as text.
    let replaced = pattern.replace_all(s, |captures: &regex::Captures<'_>| {
        let reference = AttrRef {
            resource: captures[1].to_string(),
            attribute: captures[2].to_string(),
        };
        match lookup(&reference) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => captures[0].to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

/// Whether any unresolved reference tokens remain in `value`.
pub fn has_unresolved_refs(value: &Value) -> bool {
    let mut refs = BTreeSet::new();
    collect_refs(value, &mut refs);
    !refs.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_rejects_bad_names() {
        assert!(ResourceDecl::new("assets", "bucket").validate().is_ok());
        assert!(ResourceDecl::new("my-bucket_2", "bucket").validate().is_ok());
        assert!(ResourceDecl::new("", "bucket").validate().is_err());
        assert!(ResourceDecl::new("2assets", "bucket").validate().is_err());
        assert!(ResourceDecl::new("a.b", "bucket").validate().is_err());
        assert!(ResourceDecl::new("assets", "").validate().is_err());
    }

    #[test]
    fn validate_rejects_self_dependency() {
        let decl = ResourceDecl::new("a", "bucket").with_dependency("a");
        assert!(decl.validate().is_err());

        let decl =
            ResourceDecl::new("a", "bucket").with_property("path", "${a.id}/sub");
        assert!(decl.validate().is_err());
    }

    #[test]
    fn references_found_in_nested_values() {
        let decl = ResourceDecl::new("app", "service")
            .with_property("image", "${registry.url}/app:latest")
            .with_property("env", json!({"BUCKET": "${assets.id}"}))
            .with_property("mirrors", json!(["${registry.url}", "plain"]));

        let refs = decl.references();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&AttrRef {
            resource: "registry".into(),
            attribute: "url".into()
        }));
        assert!(refs.contains(&AttrRef {
            resource: "assets".into(),
            attribute: "id".into()
        }));

        let deps = decl.all_dependencies();
        assert!(deps.contains("registry"));
        assert!(deps.contains("assets"));
    }

    #[test]
    fn explicit_and_implicit_dependencies_merge() {
        let decl = ResourceDecl::new("app", "service")
            .with_dependency("network")
            .with_property("bucket", "${assets.id}");
        let deps = decl.all_dependencies();
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("network"));
        assert!(deps.contains("assets"));
    }

    #[test]
    fn lone_token_keeps_value_type() {
        let mut props = BTreeMap::new();
        props.insert("count".to_string(), json!("${pool.size}"));

        let resolved = resolve_properties(&props, &|r: &AttrRef| {
            (r.resource == "pool" && r.attribute == "size").then(|| json!(3))
        });
        assert_eq!(resolved["count"], json!(3));
    }

    #[test]
    fn embedded_token_splices_as_text() {
        let mut props = BTreeMap::new();
        props.insert("image".to_string(), json!("${registry.url}/app:latest"));

        let resolved = resolve_properties(&props, &|r: &AttrRef| {
            (r.resource == "registry").then(|| json!("registry.local"))
        });
        assert_eq!(resolved["image"], json!("registry.local/app:latest"));
    }

    #[test]
    fn unresolved_tokens_survive_as_written() {
        let mut props = BTreeMap::new();
        props.insert("bucket".to_string(), json!("${assets.id}"));

        let resolved = resolve_properties(&props, &|_: &AttrRef| None);
        assert_eq!(resolved["bucket"], json!("${assets.id}"));
        assert!(has_unresolved_refs(&resolved["bucket"]));
    }
}
