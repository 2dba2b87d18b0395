//! Stack state: the last-applied record of every resource.
//!
//! The state blob is loaded once at the start of a run, mutated only by the
//! coordinating thread as operations complete, and persisted atomically at
//! the end. There is no ambient global: callers own the value and hand it
//! to the planner and executor explicitly.

use crate::error::{Error, Result};
use crate::resource::AttrRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

/// Format version written into every state blob.
pub const STATE_VERSION: u32 = 1;

/// Last-applied record for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Type tag the resource was created with.
    pub resource_type: String,
    /// Properties as applied, with references resolved.
    pub properties: BTreeMap<String, Value>,
    /// Content hash of the applied properties.
    pub hash: String,
    /// Dependencies at apply time; drives delete ordering on later runs.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Provider-assigned identifier. Present only after a successful create.
    pub physical_id: Option<String>,
    /// Provider-reported attributes, including the injected `id`.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The whole stack's persisted state, keyed by logical name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    pub version: u32,
    /// Monotonic run counter, bumped once per completed run.
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    pub last_updated: DateTime<Utc>,
}

impl StackState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Look up a `${name.attr}` reference against recorded attributes.
    /// `id` always resolves to the physical identifier.
    pub fn attribute(&self, reference: &AttrRef) -> Option<Value> {
        let record = self.resources.get(&reference.resource)?;
        if reference.attribute == "id" {
            return record.physical_id.clone().map(Value::String);
        }
        record.attributes.get(&reference.attribute).cloned()
    }

    /// Record a successful create (or the create half of a replace).
    pub fn record_created(
        &mut self,
        name: &str,
        resource_type: &str,
        properties: BTreeMap<String, Value>,
        hash: String,
        dependencies: BTreeSet<String>,
        physical_id: String,
        mut attributes: BTreeMap<String, Value>,
    ) {
        attributes.insert("id".to_string(), Value::String(physical_id.clone()));
        let now = Utc::now();
        self.resources.insert(
            name.to_string(),
            ResourceRecord {
                resource_type: resource_type.to_string(),
                properties,
                hash,
                dependencies,
                physical_id: Some(physical_id),
                attributes,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Record a successful in-place update.
    pub fn record_updated(
        &mut self,
        name: &str,
        properties: BTreeMap<String, Value>,
        hash: String,
        dependencies: BTreeSet<String>,
        attributes: BTreeMap<String, Value>,
    ) {
        if let Some(record) = self.resources.get_mut(name) {
            record.properties = properties;
            record.hash = hash;
            record.dependencies = dependencies;
            record.attributes = attributes;
            if let Some(id) = &record.physical_id {
                record
                    .attributes
                    .insert("id".to_string(), Value::String(id.clone()));
            }
            record.updated_at = Utc::now();
        }
    }

    /// Record a successful delete: the physical identifier is gone.
    pub fn record_deleted(&mut self, name: &str) {
        self.resources.remove(name);
    }

    /// Stamp the end of a run.
    pub fn finish_run(&mut self) {
        self.serial += 1;
        self.last_updated = Utc::now();
    }
}

impl Default for StackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistence boundary for stack state, keyed by stack name.
pub trait StateStore {
    /// Load a stack's state; a stack that was never applied yields an empty
    /// state, not an error.
    fn load(&self, stack: &str) -> Result<StackState>;

    /// Persist a stack's state atomically.
    fn save(&self, stack: &str, state: &StackState) -> Result<()>;
}

/// File-backed store: one JSON blob per stack under a root directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, stack: &str) -> PathBuf {
        self.root.join(format!("{stack}.json"))
    }
}

impl StateStore for FileStore {
    fn load(&self, stack: &str) -> Result<StackState> {
        let path = self.blob_path(stack);
        if !path.exists() {
            log::debug!("no state at {}, starting empty", path.display());
            return Ok(StackState::new());
        }

        let content = fs::read_to_string(&path)?;
        let state: StackState = serde_json::from_str(&content)?;
        if state.version != STATE_VERSION {
            return Err(Error::state_conflict(
                stack,
                format!(
                    "state format version {} is not supported (expected {})",
                    state.version, STATE_VERSION
                ),
            ));
        }
        log::debug!(
            "loaded state for '{stack}' (serial {}, {} resources)",
            state.serial,
            state.resources.len()
        );
        Ok(state)
    }

    fn save(&self, stack: &str, state: &StackState) -> Result<()> {
        fs::create_dir_all(&self.root)?;

        // Write-then-rename keeps a crashed run from truncating the blob.
        let path = self.blob_path(stack);
        let tmp = self.root.join(format!("{stack}.json.tmp"));
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;

        log::debug!("saved state for '{stack}' to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(state: &mut StackState, name: &str) {
        state.record_created(
            name,
            "bucket",
            BTreeMap::from([("label".to_string(), json!("x"))]),
            "hash-1".to_string(),
            BTreeSet::new(),
            format!("bucket-{name}"),
            BTreeMap::from([("region".to_string(), json!("local"))]),
        );
    }

    #[test]
    fn created_record_injects_id_attribute() {
        let mut state = StackState::new();
        record(&mut state, "assets");

        let reference = AttrRef {
            resource: "assets".into(),
            attribute: "id".into(),
        };
        assert_eq!(state.attribute(&reference), Some(json!("bucket-assets")));

        let region = AttrRef {
            resource: "assets".into(),
            attribute: "region".into(),
        };
        assert_eq!(state.attribute(&region), Some(json!("local")));
    }

    #[test]
    fn delete_clears_the_record() {
        let mut state = StackState::new();
        record(&mut state, "assets");
        state.record_deleted("assets");
        assert!(!state.contains("assets"));
        assert_eq!(
            state.attribute(&AttrRef {
                resource: "assets".into(),
                attribute: "id".into()
            }),
            None
        );
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let mut state = StackState::new();
        record(&mut state, "assets");
        state.finish_run();
        store.save("demo", &state).unwrap();

        let loaded = store.load("demo").unwrap();
        assert_eq!(loaded.serial, 1);
        assert_eq!(loaded.resources.len(), 1);
        let rec = loaded.get("assets").unwrap();
        assert_eq!(rec.physical_id.as_deref(), Some("bucket-assets"));
        assert_eq!(rec.resource_type, "bucket");
    }

    #[test]
    fn missing_blob_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let state = store.load("never-applied").unwrap();
        assert!(state.is_empty());
        assert_eq!(state.serial, 0);
    }

    #[test]
    fn version_mismatch_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let mut state = StackState::new();
        state.version = 99;
        let content = serde_json::to_string(&state).unwrap();
        std::fs::write(dir.path().join("demo.json"), content).unwrap();

        assert!(matches!(
            store.load("demo"),
            Err(Error::StateConflict { .. })
        ));
    }
}
