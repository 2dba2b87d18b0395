//! Stackfile loading: the TOML declaration of a stack.
//!
//! ```toml
//! [stack]
//! name = "storage-demo"
//!
//! [resources.assets]
//! type = "bucket"
//! [resources.assets.properties]
//! label = "assets-prod"
//! tags = { managed = "true" }
//!
//! [resources.images]
//! type = "repository"
//! depends_on = ["assets"]
//! [resources.images.properties]
//! label = "images-prod"
//! mirror_of = "${assets.id}"
//!
//! [outputs]
//! assets_id = "${assets.id}"
//! ```
//!
//! The format is a thin skin over the core's resource model; everything
//! here deserializes straight into declarations. Name and graph validation
//! stay in the core.

use anyhow::{Context as AnyhowContext, Result, bail};
use reconcile::ResourceDecl;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Stackfile {
    pub stack: StackMeta,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceEntry>,

    /// Output name -> `${resource.attr}` template.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StackMeta {
    /// Stack name; keys the state blob.
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceEntry {
    /// Type tag dispatched to a provider (e.g. "bucket", "repository").
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Stackfile {
    /// Load and parse a stackfile.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read stackfile: {}", path.display()))?;
        let stackfile: Stackfile = toml::from_str(&content)
            .with_context(|| format!("invalid stackfile: {}", path.display()))?;

        if stackfile.stack.name.is_empty()
            || !stackfile
                .stack
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!(
                "invalid stack name '{}': use letters, digits, '-' or '_'",
                stackfile.stack.name
            );
        }
        Ok(stackfile)
    }

    /// Desired-state declarations for the core.
    pub fn declarations(&self) -> Vec<ResourceDecl> {
        self.resources
            .iter()
            .map(|(name, entry)| {
                let mut decl = ResourceDecl::new(name, &entry.resource_type);
                decl.properties = entry.properties.clone();
                decl.depends_on = entry.depends_on.iter().cloned().collect();
                decl
            })
            .collect()
    }

    /// Every type tag the stackfile mentions.
    pub fn type_tags(&self) -> BTreeSet<String> {
        self.resources
            .values()
            .map(|entry| entry.resource_type.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;

    fn write_stackfile(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_resources_outputs_and_dependencies() {
        let file = write_stackfile(
            r#"
            [stack]
            name = "storage-demo"
            description = "demo stack"

            [resources.assets]
            type = "bucket"
            [resources.assets.properties]
            label = "assets-prod"
            tags = { managed = "true" }

            [resources.images]
            type = "repository"
            depends_on = ["assets"]
            [resources.images.properties]
            mirror_of = "${assets.id}"

            [outputs]
            assets_id = "${assets.id}"
            "#,
        );

        let stackfile = Stackfile::load(file.path()).unwrap();
        assert_eq!(stackfile.stack.name, "storage-demo");
        assert_eq!(stackfile.outputs.len(), 1);
        assert_eq!(
            stackfile.type_tags(),
            BTreeSet::from(["bucket".to_string(), "repository".to_string()])
        );

        let decls = stackfile.declarations();
        assert_eq!(decls.len(), 2);
        let assets = decls.iter().find(|d| d.name == "assets").unwrap();
        assert_eq!(assets.properties["tags"], json!({"managed": "true"}));
        let images = decls.iter().find(|d| d.name == "images").unwrap();
        assert!(images.depends_on.contains("assets"));
        assert!(images.all_dependencies().contains("assets"));
    }

    #[test]
    fn rejects_bad_stack_names() {
        let file = write_stackfile("[stack]\nname = \"not a name\"\n");
        assert!(Stackfile::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Stackfile::load(Path::new("/nonexistent/stack.toml")).is_err());
    }

    #[test]
    fn empty_resource_table_is_fine() {
        let file = write_stackfile("[stack]\nname = \"empty\"\n");
        let stackfile = Stackfile::load(file.path()).unwrap();
        assert!(stackfile.declarations().is_empty());
        assert!(stackfile.outputs.is_empty());
    }
}
