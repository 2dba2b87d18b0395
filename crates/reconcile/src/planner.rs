//! Plan computation: diff desired declarations against recorded state.
//!
//! The planner validates the desired graph, decides one operation per
//! resource by comparing content hashes, and schedules deletes for anything
//! recorded but no longer declared. The output is plain data: an ordered
//! list of operations plus the records for resources rejected up front.

use crate::error::{Error, Result};
use crate::graph::DepGraph;
use crate::provider::{Provider, ProviderSet};
use crate::resource::{ResourceDecl, resolve_properties};
use crate::state::StackState;
use crate::types::{OpKind, OpOutcome, OpRecord, SkipReason};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One scheduled operation.
#[derive(Debug, Clone)]
pub struct PlannedOp {
    pub name: String,
    pub kind: OpKind,
    /// Type tag to dispatch on; for deletes, the recorded type.
    pub resource_type: String,
    /// Declared properties, references still unresolved. Empty for deletes.
    pub properties: BTreeMap<String, Value>,
    /// Full dependency set, recorded into state on success.
    pub dependencies: BTreeSet<String>,
    /// Operations that must complete before this one may start.
    pub waits_on: Vec<String>,
    pub prior_hash: Option<String>,
    pub new_hash: Option<String>,
}

/// The computed plan: executable operations in schedule order, plus
/// resources rejected at plan time (validation roots and their dependents).
#[derive(Debug, Default)]
pub struct Plan {
    pub ops: Vec<PlannedOp>,
    pub rejected: Vec<OpRecord>,
}

impl Plan {
    /// Whether anything at all would touch a provider.
    pub fn has_changes(&self) -> bool {
        self.ops.iter().any(|op| op.kind.is_change()) || !self.rejected.is_empty()
    }

    /// Number of operations that change something.
    pub fn change_count(&self) -> usize {
        self.ops.iter().filter(|op| op.kind.is_change()).count()
    }

    pub fn op(&self, name: &str) -> Option<&PlannedOp> {
        self.ops.iter().find(|op| op.name == name)
    }
}

/// Key-order-independent content hash of a property map.
pub fn content_hash(properties: &BTreeMap<String, Value>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"{");
    for (key, value) in properties {
        hash_str(&mut hasher, key);
        hash_value(&mut hasher, value);
    }
    hasher.update(b"}");
    hasher.finalize().to_hex().to_string()
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_value(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(b"n");
        }
        Value::Bool(b) => {
            hasher.update(if *b { b"t" } else { b"f" });
        }
        Value::Number(n) => {
            hasher.update(b"#");
            hash_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update(b"s");
            hash_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update(b"[");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(b"{");
            // serde_json objects may carry any key order; hash sorted.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                hash_str(hasher, key);
                hash_value(hasher, &map[key]);
            }
            hasher.update(b"}");
        }
    }
}

/// Compute the plan for `desired` against `state`.
///
/// Fatal errors (duplicate names, dependency cycles, blocked deletes) abort
/// planning; per-resource validation failures land in `Plan::rejected`
/// together with the dependents they drag down.
pub fn plan(
    desired: &[ResourceDecl],
    state: &StackState,
    providers: &ProviderSet,
) -> Result<Plan> {
    let mut desired_map: BTreeMap<String, &ResourceDecl> = BTreeMap::new();
    for decl in desired {
        if desired_map.insert(decl.name.clone(), decl).is_some() {
            return Err(Error::validation(&decl.name, "duplicate logical name"));
        }
    }

    let dependencies: BTreeMap<String, BTreeSet<String>> = desired_map
        .iter()
        .map(|(name, decl)| (name.clone(), decl.all_dependencies()))
        .collect();
    let graph = DepGraph::build(&dependencies);
    let order = graph.topo_order()?;

    // Per-resource validation, cascading to dependents in schedule order.
    let mut failed: BTreeMap<String, Error> = BTreeMap::new();
    let mut dragged: BTreeMap<String, String> = BTreeMap::new();
    for name in &order {
        let decl = desired_map[name];
        let deps = decl.all_dependencies();
        if let Some(bad) = deps
            .iter()
            .find(|d| failed.contains_key(*d) || dragged.contains_key(*d))
        {
            dragged.insert(name.clone(), bad.clone());
            continue;
        }
        if let Err(error) = validate_decl(decl, &desired_map, providers) {
            failed.insert(name.clone(), error);
        }
    }

    let mut plan = Plan::default();
    for name in &order {
        let decl = desired_map[name];
        let (kind, prior_hash, new_hash) = diff_kind(decl, state, providers);

        if let Some(error) = failed.remove(name) {
            plan.rejected.push(OpRecord {
                name: name.clone(),
                kind,
                outcome: OpOutcome::Failed(error),
            });
        } else if let Some(dependency) = dragged.remove(name) {
            plan.rejected.push(OpRecord {
                name: name.clone(),
                kind,
                outcome: OpOutcome::Skipped(SkipReason::DependencyFailed { dependency }),
            });
        } else {
            plan.ops.push(PlannedOp {
                name: name.clone(),
                kind,
                resource_type: decl.resource_type.clone(),
                properties: decl.properties.clone(),
                dependencies: decl.all_dependencies(),
                waits_on: decl.all_dependencies().into_iter().collect(),
                prior_hash,
                new_hash,
            });
        }
    }

    plan_deletes(&desired_map, state, &mut plan)?;
    Ok(plan)
}

fn validate_decl(
    decl: &ResourceDecl,
    desired: &BTreeMap<String, &ResourceDecl>,
    providers: &ProviderSet,
) -> Result<()> {
    decl.validate()?;
    for dep in decl.all_dependencies() {
        if !desired.contains_key(&dep) {
            return Err(Error::validation(
                &decl.name,
                format!("unknown dependency '{dep}'"),
            ));
        }
    }
    let provider = providers.get(&decl.resource_type).ok_or_else(|| {
        Error::validation(
            &decl.name,
            format!("no provider registered for type '{}'", decl.resource_type),
        )
    })?;
    provider
        .validate(decl)
        .map_err(|e| Error::validation(&decl.name, format!("{e:#}")))?;
    Ok(())
}

fn diff_kind(
    decl: &ResourceDecl,
    state: &StackState,
    providers: &ProviderSet,
) -> (OpKind, Option<String>, Option<String>) {
    let resolved = resolve_properties(&decl.properties, &|r| state.attribute(r));
    let new_hash = content_hash(&resolved);

    match state.get(&decl.name) {
        None => (OpKind::Create, None, Some(new_hash)),
        Some(record) if record.resource_type != decl.resource_type => {
            // A type change always tears down the old physical resource.
            (OpKind::Replace, Some(record.hash.clone()), Some(new_hash))
        }
        Some(record) if record.hash == new_hash => {
            (OpKind::NoOp, Some(record.hash.clone()), Some(new_hash))
        }
        Some(record) => {
            let in_place = providers
                .get(&decl.resource_type)
                .is_none_or(|p: &dyn Provider| p.supports_update());
            let kind = if in_place { OpKind::Update } else { OpKind::Replace };
            (kind, Some(record.hash.clone()), Some(new_hash))
        }
    }
}

/// Schedule deletes for recorded resources absent from the desired graph,
/// dependents before dependencies.
fn plan_deletes(
    desired: &BTreeMap<String, &ResourceDecl>,
    state: &StackState,
    plan: &mut Plan,
) -> Result<()> {
    let removed: BTreeSet<String> = state
        .resources
        .keys()
        .filter(|name| !desired.contains_key(*name))
        .cloned()
        .collect();
    if removed.is_empty() {
        return Ok(());
    }

    // A delete is rejected while surviving resources still record a
    // dependency on the target; the dependents must go in the same pass.
    for name in &removed {
        let survivors: Vec<&str> = state
            .resources
            .iter()
            .filter(|(other, record)| {
                *other != name
                    && record.dependencies.contains(name)
                    && desired.contains_key(*other)
            })
            .map(|(other, _)| other.as_str())
            .collect();
        if !survivors.is_empty() {
            return Err(Error::validation(
                name,
                format!("cannot delete: still referenced by {}", survivors.join(", ")),
            ));
        }
    }

    let old_dependencies: BTreeMap<String, BTreeSet<String>> = removed
        .iter()
        .map(|name| {
            let deps = state
                .get(name)
                .map(|record| {
                    record
                        .dependencies
                        .iter()
                        .filter(|dep| removed.contains(*dep))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            (name.clone(), deps)
        })
        .collect();
    let old_graph = DepGraph::build(&old_dependencies);
    let mut delete_order = old_graph.topo_order()?;
    delete_order.reverse();

    for name in delete_order {
        let Some(record) = state.get(&name) else {
            continue;
        };
        plan.ops.push(PlannedOp {
            name: name.clone(),
            kind: OpKind::Delete,
            resource_type: record.resource_type.clone(),
            properties: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            waits_on: old_graph.direct_dependents(&name),
            prior_hash: Some(record.hash.clone()),
            new_hash: None,
        });
    }
    Ok(())
}
