//! Drift detection: recorded state vs. the physical world.
//!
//! Findings are reported, never auto-resolved; the caller decides whether
//! to re-apply or to edit declarations. Reads go through the same provider
//! capability set as everything else and mutate nothing.

use crate::error::Error;
use crate::planner::content_hash;
use crate::provider::{OpContext, ProviderSet};
use crate::state::StackState;
use std::time::Duration;

/// One divergence between a state record and the physical resource.
#[derive(Debug)]
pub struct DriftFinding {
    pub name: String,
    pub error: Error,
}

/// Compare every recorded resource against what the provider reports.
pub fn detect(
    state: &StackState,
    providers: &ProviderSet,
    read_timeout: Duration,
) -> Vec<DriftFinding> {
    let mut findings = Vec::new();

    for (name, record) in &state.resources {
        let Some(provider) = providers.get(&record.resource_type) else {
            findings.push(DriftFinding {
                name: name.clone(),
                error: Error::validation(
                    name,
                    format!(
                        "no provider registered for type '{}'",
                        record.resource_type
                    ),
                ),
            });
            continue;
        };

        let Some(physical_id) = record.physical_id.as_deref() else {
            findings.push(DriftFinding {
                name: name.clone(),
                error: Error::state_conflict(
                    name,
                    "recorded resource has no physical identifier",
                ),
            });
            continue;
        };

        let ctx = OpContext::with_timeout(read_timeout);
        match provider.read(&ctx, physical_id) {
            Ok(Some(actual)) => {
                if content_hash(&actual) != content_hash(&record.properties) {
                    findings.push(DriftFinding {
                        name: name.clone(),
                        error: Error::state_conflict(
                            name,
                            "physical properties diverge from recorded state",
                        ),
                    });
                }
            }
            Ok(None) => findings.push(DriftFinding {
                name: name.clone(),
                error: Error::state_conflict(
                    name,
                    format!("physical resource '{physical_id}' no longer exists"),
                ),
            }),
            Err(error) => findings.push(DriftFinding {
                name: name.clone(),
                error: Error::provider(name, format!("{error:#}")),
            }),
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Created, Provider};
    use serde_json::{Value, json};
    use std::collections::{BTreeMap, BTreeSet};

    struct FixedReadProvider {
        response: Option<BTreeMap<String, Value>>,
    }

    impl Provider for FixedReadProvider {
        fn create(
            &self,
            _ctx: &OpContext,
            _name: &str,
            _properties: &BTreeMap<String, Value>,
        ) -> anyhow::Result<Created> {
            anyhow::bail!("read-only test provider")
        }

        fn update(
            &self,
            _ctx: &OpContext,
            _physical_id: &str,
            _properties: &BTreeMap<String, Value>,
        ) -> anyhow::Result<BTreeMap<String, Value>> {
            anyhow::bail!("read-only test provider")
        }

        fn delete(&self, _ctx: &OpContext, _physical_id: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only test provider")
        }

        fn read(
            &self,
            _ctx: &OpContext,
            _physical_id: &str,
        ) -> anyhow::Result<Option<BTreeMap<String, Value>>> {
            Ok(self.response.clone())
        }
    }

    fn state_with(properties: BTreeMap<String, Value>) -> StackState {
        let mut state = StackState::new();
        state.record_created(
            "assets",
            "bucket",
            properties,
            "h1".into(),
            BTreeSet::new(),
            "bucket-1".into(),
            BTreeMap::new(),
        );
        state
    }

    #[test]
    fn matching_resources_produce_no_findings() {
        let props = BTreeMap::from([("label".to_string(), json!("a"))]);
        let state = state_with(props.clone());
        let mut providers = ProviderSet::new();
        providers.register(
            "bucket",
            Box::new(FixedReadProvider {
                response: Some(props),
            }),
        );

        let findings = detect(&state, &providers, Duration::from_secs(5));
        assert!(findings.is_empty());
    }

    #[test]
    fn missing_physical_resource_is_a_conflict() {
        let state = state_with(BTreeMap::new());
        let mut providers = ProviderSet::new();
        providers.register("bucket", Box::new(FixedReadProvider { response: None }));

        let findings = detect(&state, &providers, Duration::from_secs(5));
        assert_eq!(findings.len(), 1);
        assert!(matches!(
            findings[0].error,
            Error::StateConflict { .. }
        ));
    }

    #[test]
    fn diverged_properties_are_a_conflict() {
        let state = state_with(BTreeMap::from([("label".to_string(), json!("a"))]));
        let mut providers = ProviderSet::new();
        providers.register(
            "bucket",
            Box::new(FixedReadProvider {
                response: Some(BTreeMap::from([("label".to_string(), json!("b"))])),
            }),
        );

        let findings = detect(&state, &providers, Duration::from_secs(5));
        assert_eq!(findings.len(), 1);
        assert!(matches!(
            findings[0].error,
            Error::StateConflict { .. }
        ));
    }
}
