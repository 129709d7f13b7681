use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::config::StateId;
use super::stack::StackInvariantError;

pub const NAV_SNAPSHOT_VERSION: u32 = 1;

/// Persistable view of the navigation stack and bound data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationSnapshot {
    pub version: u32,
    pub config_fingerprint: String,
    pub stack: Vec<StateId>,
    #[serde(default)]
    pub state_data: BTreeMap<StateId, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    #[error("snapshot version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("snapshot was taken against dialog config {found}, current config is {expected}")]
    ConfigChanged { found: String, expected: String },
    #[error("snapshot binds data to unknown state '{state}'")]
    UnknownDataState { state: StateId },
    #[error("snapshot stack is invalid: {0}")]
    Stack(#[from] StackInvariantError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_json_shape_is_stable() {
        let snapshot = NavigationSnapshot {
            version: NAV_SNAPSHOT_VERSION,
            config_fingerprint: "abc".to_string(),
            stack: vec![StateId::from("pause-menu"), StateId::from("settings")],
            state_data: BTreeMap::from([(StateId::from("settings"), json!({ "tab": 2 }))]),
        };
        let encoded = serde_json::to_value(&snapshot).expect("encode");
        assert_eq!(
            encoded,
            json!({
                "version": 1,
                "config_fingerprint": "abc",
                "stack": ["pause-menu", "settings"],
                "state_data": { "settings": { "tab": 2 } }
            })
        );
        let decoded: NavigationSnapshot = serde_json::from_value(encoded).expect("decode");
        assert_eq!(decoded, snapshot);
    }
}
