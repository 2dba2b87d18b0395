//! Local provider: resources as JSON documents on disk.
//!
//! Each resource materializes as `<root>/<type>/<physical-id>.json`. The
//! provider assigns physical identifiers, answers reads for drift
//! detection, and honors operation deadlines. It exists so a stack can be
//! exercised end to end without any remote service; nothing about it is
//! vendor-specific.

use anyhow::{Context as AnyhowContext, Result, bail};
use chrono::{DateTime, Utc};
use reconcile::{Created, OpContext, Provider, ResourceDecl};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One materialized resource document.
#[derive(Debug, Serialize, Deserialize)]
struct StoredObject {
    name: String,
    #[serde(rename = "type")]
    resource_type: String,
    properties: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Filesystem-backed provider for one type tag.
pub struct LocalProvider {
    type_tag: String,
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(type_tag: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            type_tag: type_tag.into(),
            root: root.into(),
        }
    }

    fn object_path(&self, physical_id: &str) -> PathBuf {
        self.root
            .join(&self.type_tag)
            .join(format!("{physical_id}.json"))
    }

    /// Physical ids are `<type>-<hash12>`, salted with the creation time so
    /// a replace never reuses the old identifier.
    fn assign_id(&self, name: &str) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let digest = blake3::hash(format!("{}|{name}|{nanos}", self.type_tag).as_bytes());
        let hex = digest.to_hex();
        format!("{}-{}", self.type_tag, &hex.as_str()[..12])
    }

    fn attributes_for(&self, physical_id: &str, object: &StoredObject) -> BTreeMap<String, Value> {
        BTreeMap::from([
            (
                "uri".to_string(),
                json!(format!("local://{}/{physical_id}", self.type_tag)),
            ),
            (
                "path".to_string(),
                json!(self.object_path(physical_id).display().to_string()),
            ),
            ("created_at".to_string(), json!(object.created_at)),
        ])
    }

    fn load_object(&self, path: &Path) -> Result<StoredObject> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read object: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("corrupt object document: {}", path.display()))
    }

    fn write_object(&self, path: &Path, object: &StoredObject) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(object)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write object: {}", path.display()))?;
        Ok(())
    }
}

impl Provider for LocalProvider {
    fn validate(&self, decl: &ResourceDecl) -> Result<()> {
        // Every local object carries a display label; catching the missing
        // property at plan time beats a half-applied stack.
        match decl.properties.get("label") {
            Some(Value::String(_)) => Ok(()),
            Some(_) => bail!("property 'label' must be a string"),
            None => bail!("missing required property 'label'"),
        }
    }

    fn create(
        &self,
        ctx: &OpContext,
        name: &str,
        properties: &BTreeMap<String, Value>,
    ) -> Result<Created> {
        if ctx.expired() {
            bail!("deadline exceeded before create");
        }
        let physical_id = self.assign_id(name);
        let now = Utc::now();
        let object = StoredObject {
            name: name.to_string(),
            resource_type: self.type_tag.clone(),
            properties: properties.clone(),
            created_at: now,
            updated_at: now,
        };
        self.write_object(&self.object_path(&physical_id), &object)?;
        log::debug!("{}: created {physical_id}", self.type_tag);

        Ok(Created {
            attributes: self.attributes_for(&physical_id, &object),
            physical_id,
        })
    }

    fn update(
        &self,
        ctx: &OpContext,
        physical_id: &str,
        properties: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>> {
        if ctx.expired() {
            bail!("deadline exceeded before update");
        }
        let path = self.object_path(physical_id);
        if !path.exists() {
            bail!("object '{physical_id}' does not exist");
        }
        let mut object = self.load_object(&path)?;
        object.properties = properties.clone();
        object.updated_at = Utc::now();
        self.write_object(&path, &object)?;
        log::debug!("{}: updated {physical_id}", self.type_tag);

        Ok(self.attributes_for(physical_id, &object))
    }

    fn delete(&self, ctx: &OpContext, physical_id: &str) -> Result<()> {
        if ctx.expired() {
            bail!("deadline exceeded before delete");
        }
        let path = self.object_path(physical_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("{}: deleted {physical_id}", self.type_tag);
                Ok(())
            }
            // Already gone: converging forward, not an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "{}: {physical_id} was already gone during delete",
                    self.type_tag
                );
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("failed to delete {physical_id}")),
        }
    }

    fn read(
        &self,
        _ctx: &OpContext,
        physical_id: &str,
    ) -> Result<Option<BTreeMap<String, Value>>> {
        let path = self.object_path(physical_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.load_object(&path)?.properties))
    }
}
