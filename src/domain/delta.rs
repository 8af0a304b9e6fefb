use crate::types::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level state fields whose value changed, keyed by their wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    pub changed: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

fn as_object(state: &SessionState) -> Map<String, Value> {
    match serde_json::to_value(state) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// `None` when nothing but `updatedAt` moved.
#[must_use]
pub fn state_delta(before: &SessionState, after: &SessionState) -> Option<StateDelta> {
    let before = as_object(before);
    let changed: Map<String, Value> = as_object(after)
        .into_iter()
        .filter(|(key, _)| key != "updatedAt")
        .filter(|(key, value)| before.get(key) != Some(value))
        .collect();

    (!changed.is_empty()).then(|| StateDelta {
        changed,
        updated_at: after.updated_at,
    })
}

/// Full snapshot expressed as a delta, used when a viewer first connects.
#[must_use]
pub fn full_delta(state: &SessionState) -> StateDelta {
    let mut changed = as_object(state);
    changed.remove("updatedAt");
    StateDelta {
        changed,
        updated_at: state.updated_at,
    }
}
