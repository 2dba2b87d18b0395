//! Stack outputs: named values read off the final state.

use crate::error::Error;
use crate::resource::{has_unresolved_refs, resolve_properties};
use crate::state::StackState;
use serde_json::Value;
use std::collections::BTreeMap;

/// A resolved (or failed) stack output.
#[derive(Debug)]
pub struct OutputValue {
    pub name: String,
    pub value: Result<Value, Error>,
}

/// Resolve output templates against the final stack state.
///
/// Templates use the same `${name.attr}` syntax as resource properties. An
/// output whose references cannot all be resolved fails individually; the
/// rest still resolve.
pub fn resolve(templates: &BTreeMap<String, String>, state: &StackState) -> Vec<OutputValue> {
    let as_properties: BTreeMap<String, Value> = templates
        .iter()
        .map(|(name, template)| (name.clone(), Value::String(template.clone())))
        .collect();
    let resolved = resolve_properties(&as_properties, &|r| state.attribute(r));

    templates
        .keys()
        .map(|name| {
            let value = &resolved[name];
            if has_unresolved_refs(value) {
                OutputValue {
                    name: name.clone(),
                    value: Err(Error::validation(
                        name,
                        format!("unresolved reference in output: {value}"),
                    )),
                }
            } else {
                OutputValue {
                    name: name.clone(),
                    value: Ok(value.clone()),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn outputs_resolve_attributes_and_ids() {
        let mut state = StackState::new();
        state.record_created(
            "assets",
            "bucket",
            BTreeMap::new(),
            "h1".into(),
            BTreeSet::new(),
            "bucket-1".into(),
            BTreeMap::from([("region".to_string(), json!("local"))]),
        );

        let templates = BTreeMap::from([
            ("bucket_id".to_string(), "${assets.id}".to_string()),
            ("bucket_region".to_string(), "${assets.region}".to_string()),
            (
                "bucket_uri".to_string(),
                "s3://${assets.id}/data".to_string(),
            ),
        ]);
        let outputs = resolve(&templates, &state);

        let by_name = |name: &str| {
            outputs
                .iter()
                .find(|o| o.name == name)
                .and_then(|o| o.value.as_ref().ok())
                .cloned()
        };
        assert_eq!(by_name("bucket_id"), Some(json!("bucket-1")));
        assert_eq!(by_name("bucket_region"), Some(json!("local")));
        assert_eq!(by_name("bucket_uri"), Some(json!("s3://bucket-1/data")));
    }

    #[test]
    fn unresolved_output_fails_individually() {
        let state = StackState::new();
        let templates = BTreeMap::from([
            ("missing".to_string(), "${ghost.id}".to_string()),
            ("plain".to_string(), "constant".to_string()),
        ]);
        let outputs = resolve(&templates, &state);

        let missing = outputs.iter().find(|o| o.name == "missing").unwrap();
        assert!(missing.value.is_err());
        let plain = outputs.iter().find(|o| o.name == "plain").unwrap();
        assert_eq!(plain.value.as_ref().unwrap(), &json!("constant"));
    }
}
