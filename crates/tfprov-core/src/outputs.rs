use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reference to a workspace's current state version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshotRef {
    pub state_version_id: String,
    /// Outputs are only queryable once the remote has processed resources.
    pub resources_processed: bool,
}

/// One output as listed by the remote for a state version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateOutput {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub sensitive: bool,
}

/// Output name → value, restricted to the names a caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSet(BTreeMap<String, serde_json::Value>);

impl OutputSet {
    /// Keep only outputs whose name is in `allow_list`.
    ///
    /// Requested names the state does not contain are omitted, not errors.
    pub fn filter(outputs: impl IntoIterator<Item = StateOutput>, allow_list: &[String]) -> Self {
        let set = outputs
            .into_iter()
            .filter(|o| allow_list.iter().any(|name| name == &o.name))
            .map(|o| (o.name, o.value))
            .collect();
        Self(set)
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, serde_json::Value)> for OutputSet {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str, value: serde_json::Value) -> StateOutput {
        StateOutput {
            name: name.into(),
            value,
            sensitive: false,
        }
    }

    #[test]
    fn filters_to_allow_list_and_omits_missing() {
        let outputs = vec![
            output("vpc_id", serde_json::json!("vpc-1")),
            output("region", serde_json::json!("us-east-1")),
        ];
        let allow = vec!["vpc_id".to_string(), "subnet_ids".to_string()];

        let set = OutputSet::filter(outputs, &allow);

        let expected: OutputSet = [("vpc_id".to_string(), serde_json::json!("vpc-1"))]
            .into_iter()
            .collect();
        assert_eq!(set, expected);
        assert!(set.get("region").is_none());
        assert!(set.get("subnet_ids").is_none());
    }

    #[test]
    fn no_matches_yields_empty_set() {
        let outputs = vec![output("region", serde_json::json!("us-east-1"))];
        let set = OutputSet::filter(outputs, &["vpc_id".to_string()]);
        assert!(set.is_empty());
    }

    #[test]
    fn serializes_as_plain_object() {
        let set: OutputSet = [("ids".to_string(), serde_json::json!(["a", "b"]))]
            .into_iter()
            .collect();
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            serde_json::json!({"ids": ["a", "b"]})
        );
    }
}
