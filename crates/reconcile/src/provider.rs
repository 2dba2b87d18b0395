//! Provider capability traits.
//!
//! The core treats providers as an opaque capability set per resource type:
//! create, update, delete, read. Type-specific schema validation hangs off
//! the optional `validate` hook so vendor semantics never leak into the
//! planner or executor. Providers report failures as plain `anyhow` errors;
//! the executor wraps them into the run's error taxonomy.

use crate::resource::ResourceDecl;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct Created {
    /// Provider-assigned physical identifier (ARN, URL, path, ...).
    pub physical_id: String,
    /// Provider-reported attributes, readable through `${name.attr}`.
    pub attributes: BTreeMap<String, Value>,
}

/// Deadline context handed to every provider call.
#[derive(Debug, Clone, Copy)]
pub struct OpContext {
    deadline: Instant,
}

impl OpContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Capability set for one resource type.
///
/// Implementations must be safe to call from worker threads; the executor
/// never calls a provider twice for the same operation.
pub trait Provider: Send + Sync {
    /// Whether a changed resource can be updated in place. Types that
    /// cannot are converged by delete-then-create instead.
    fn supports_update(&self) -> bool {
        true
    }

    /// Type-specific declaration check, run at plan time. A rejection fails
    /// the resource and cascades to its dependents.
    fn validate(&self, decl: &ResourceDecl) -> anyhow::Result<()> {
        let _ = decl;
        Ok(())
    }

    /// Create the physical resource from resolved properties.
    fn create(
        &self,
        ctx: &OpContext,
        name: &str,
        properties: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Created>;

    /// Update the physical resource in place, returning fresh attributes.
    fn update(
        &self,
        ctx: &OpContext,
        physical_id: &str,
        properties: &BTreeMap<String, Value>,
    ) -> anyhow::Result<BTreeMap<String, Value>>;

    /// Delete the physical resource.
    fn delete(&self, ctx: &OpContext, physical_id: &str) -> anyhow::Result<()>;

    /// Read the resource's current properties, or `None` if it no longer
    /// exists. Drives drift detection; never mutates anything.
    fn read(
        &self,
        ctx: &OpContext,
        physical_id: &str,
    ) -> anyhow::Result<Option<BTreeMap<String, Value>>>;
}

/// Registry mapping type tags to provider implementations.
#[derive(Default)]
pub struct ProviderSet {
    providers: BTreeMap<String, Box<dyn Provider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a type tag, replacing any previous one.
    pub fn register(&mut self, type_tag: impl Into<String>, provider: Box<dyn Provider>) {
        self.providers.insert(type_tag.into(), provider);
    }

    pub fn get(&self, type_tag: &str) -> Option<&dyn Provider> {
        self.providers.get(type_tag).map(Box::as_ref)
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.providers.contains_key(type_tag)
    }

    /// Registered type tags, sorted.
    pub fn type_tags(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_deadline_expires() {
        let ctx = OpContext::with_timeout(Duration::ZERO);
        assert!(ctx.expired());
        assert_eq!(ctx.remaining(), Duration::ZERO);

        let ctx = OpContext::with_timeout(Duration::from_secs(3600));
        assert!(!ctx.expired());
        assert!(ctx.remaining() > Duration::from_secs(3500));
    }
}
