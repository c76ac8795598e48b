use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ChildEvent, ValueEvent};
use crate::models::{UserFields, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// 记录变化通知，携带变化后的完整快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub kind: ChangeKind,
    pub id: UserId,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RecordChange {
    pub fn new(existed: bool, id: &str, fields: Map<String, Value>) -> Self {
        Self {
            kind: if existed {
                ChangeKind::Changed
            } else {
                ChangeKind::Added
            },
            id: id.to_owned(),
            fields,
        }
    }

    pub fn removed(id: &str) -> Self {
        Self {
            kind: ChangeKind::Removed,
            id: id.to_owned(),
            fields: Map::new(),
        }
    }

    pub fn to_child_event(&self) -> ChildEvent {
        let id = self.id.clone();
        match self.kind {
            ChangeKind::Added => ChildEvent::Added {
                id,
                fields: UserFields::from_map(&self.fields),
            },
            ChangeKind::Changed => ChildEvent::Changed {
                id,
                fields: UserFields::from_map(&self.fields),
            },
            ChangeKind::Removed => ChildEvent::Removed { id },
        }
    }

    pub fn to_value_event(&self) -> ValueEvent {
        match self.kind {
            ChangeKind::Added | ChangeKind::Changed => {
                ValueEvent::Value(Some(UserFields::from_map(&self.fields)))
            }
            ChangeKind::Removed => ValueEvent::Value(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_format() {
        let change: RecordChange = serde_json::from_value(json!({
            "kind": "changed",
            "id": "u1",
            "fields": {"nombre": "Ana", "available": true}
        }))
        .unwrap();

        assert_eq!(change.kind, ChangeKind::Changed);
        match change.to_child_event() {
            ChildEvent::Changed { id, fields } => {
                assert_eq!(id, "u1");
                assert_eq!(fields.name.as_deref(), Some("Ana"));
                assert!(fields.is_available());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn removal_has_no_fields() {
        let change: RecordChange =
            serde_json::from_value(json!({"kind": "removed", "id": "u1"})).unwrap();
        assert_eq!(change, RecordChange::removed("u1"));
        assert_eq!(change.to_child_event(), ChildEvent::Removed { id: "u1".into() });
        assert_eq!(change.to_value_event(), ValueEvent::Value(None));
    }
}
