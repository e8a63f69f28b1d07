//! Structural edit records decoded from the generated text stream.

use crate::content::{join_path, NodeType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Kind of structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Add,
    Update,
    Delete,
}

impl Action {
    pub fn parse_lenient(s: &str) -> Option<Action> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADD" => Some(Action::Add),
            "UPDATE" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Add => "ADD",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a record could not be turned into a [`Modification`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing action")]
    MissingAction,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("missing targetType")]
    MissingTargetType,

    #[error("unknown targetType: {0}")]
    UnknownTargetType(String),

    #[error("record has neither a node payload nor a name")]
    MissingNode,

    #[error("node has no usable id or name")]
    MissingIdentity,
}

/// Node fields carried by a modification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

/// Dedup identity of a modification: `(targetType, node id, action)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationKey {
    pub target_type: NodeType,
    pub node_id: String,
    pub action: Action,
}

impl fmt::Display for ModificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.action, self.target_type, self.node_id)
    }
}

/// A validated structural edit targeting the content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modification {
    pub action: Action,
    pub target_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    pub node: NodePayload,
}

impl Modification {
    /// Decode one loosely-shaped edit record.
    ///
    /// A record is accepted when it has an `action`, a known `targetType`, and
    /// either a `node` object or a top-level `name`. Top-level `id`/`name`
    /// fill in whatever the node payload lacks.
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let record = value.as_object().ok_or(DecodeError::NotAnObject)?;

        let action = match record.get("action") {
            Some(Value::String(s)) => {
                Action::parse_lenient(s).ok_or_else(|| DecodeError::UnknownAction(s.clone()))?
            }
            Some(other) => return Err(DecodeError::UnknownAction(other.to_string())),
            None => return Err(DecodeError::MissingAction),
        };

        let target_type = match field(record, &["targetType", "target_type"]) {
            Some(Value::String(s)) => NodeType::parse_lenient(s)
                .ok_or_else(|| DecodeError::UnknownTargetType(s.clone()))?,
            Some(other) => return Err(DecodeError::UnknownTargetType(other.to_string())),
            None => return Err(DecodeError::MissingTargetType),
        };

        let parent_path = field(record, &["parentPath", "parent_path"])
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let top_name = record.get("name").and_then(scalar_string);
        let top_id = record.get("id").and_then(scalar_string);

        let mut node = match record.get("node") {
            Some(Value::Object(fields)) => NodePayload::decode(target_type, fields),
            _ if top_name.is_some() => NodePayload::default(),
            _ => return Err(DecodeError::MissingNode),
        };
        if node.name.is_none() {
            node.name = top_name;
        }
        if node.id.is_none() {
            node.id = top_id;
        }

        let modification = Self {
            action,
            target_type,
            parent_path,
            node,
        };
        if modification.node_id().is_none() {
            return Err(DecodeError::MissingIdentity);
        }
        Ok(modification)
    }

    /// Id of the targeted node: the explicit id, or one derived from the name.
    pub fn node_id(&self) -> Option<String> {
        if let Some(id) = self.node.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        self.node.name.as_deref().map(slugify).filter(|s| !s.is_empty())
    }

    /// Dedup identity.
    pub fn key(&self) -> Option<ModificationKey> {
        Some(ModificationKey {
            target_type: self.target_type,
            node_id: self.node_id()?,
            action: self.action,
        })
    }

    /// Path of the targeted node once it is in the tree.
    pub fn target_path(&self) -> Option<String> {
        let id = self.node_id()?;
        Some(join_path(self.parent_path.as_deref(), &id))
    }

    /// Human-readable name: the payload name, else the id.
    pub fn display_name(&self) -> String {
        self.node
            .name
            .clone()
            .or_else(|| self.node_id())
            .unwrap_or_default()
    }
}

impl NodePayload {
    /// Decode payload fields for the given level. Only slides keep a
    /// `slideType`; other levels carry it as a plain attribute.
    fn decode(target_type: NodeType, fields: &Map<String, Value>) -> Self {
        let mut payload = NodePayload::default();
        for (key, value) in fields {
            match key.as_str() {
                "id" => payload.id = scalar_string(value),
                "name" | "title" if payload.name.is_none() => payload.name = scalar_string(value),
                "description" => payload.description = scalar_string(value),
                "slideType" | "slide_type" if target_type == NodeType::Slide => {
                    payload.slide_type = scalar_string(value)
                }
                _ => {
                    payload.attributes.insert(key.clone(), value.clone());
                }
            }
        }
        payload
    }
}

fn field<'a>(record: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| record.get(*name))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lowercase a name and collapse everything that is not alphanumeric into `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_record() {
        let record = json!({
            "action": "ADD",
            "targetType": "MODULE",
            "parentPath": "C1.S1",
            "node": {"id": "M1", "name": "Intro", "description": "First steps", "order": 1}
        });
        let m = Modification::decode(&record).unwrap();
        assert_eq!(m.action, Action::Add);
        assert_eq!(m.target_type, NodeType::Module);
        assert_eq!(m.parent_path.as_deref(), Some("C1.S1"));
        assert_eq!(m.node.name.as_deref(), Some("Intro"));
        assert_eq!(m.node.description.as_deref(), Some("First steps"));
        assert_eq!(m.node.attributes.get("order"), Some(&json!(1)));
        assert_eq!(m.target_path().as_deref(), Some("C1.S1.M1"));
    }

    #[test]
    fn test_decode_lenient_casing_and_top_level_name() {
        let record = json!({
            "action": "add",
            "targetType": "chapter",
            "parentPath": "C1.S1.M1",
            "name": "Ownership",
            "id": "CH2"
        });
        let m = Modification::decode(&record).unwrap();
        assert_eq!(m.action, Action::Add);
        assert_eq!(m.target_type, NodeType::Chapter);
        assert_eq!(m.node.id.as_deref(), Some("CH2"));
        assert_eq!(m.node.name.as_deref(), Some("Ownership"));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        assert_eq!(
            Modification::decode(&json!({"targetType": "MODULE", "name": "x"})),
            Err(DecodeError::MissingAction)
        );
        assert_eq!(
            Modification::decode(&json!({"action": "ADD", "name": "x"})),
            Err(DecodeError::MissingTargetType)
        );
        assert_eq!(
            Modification::decode(&json!({"action": "ADD", "targetType": "MODULE"})),
            Err(DecodeError::MissingNode)
        );
        assert_eq!(
            Modification::decode(&json!({"action": "MOVE", "targetType": "MODULE", "name": "x"})),
            Err(DecodeError::UnknownAction("MOVE".to_string()))
        );
        assert_eq!(
            Modification::decode(&json!({"action": "ADD", "targetType": "LESSON", "name": "x"})),
            Err(DecodeError::UnknownTargetType("LESSON".to_string()))
        );
        assert_eq!(
            Modification::decode(&json!({"action": "ADD", "targetType": "MODULE", "node": {}})),
            Err(DecodeError::MissingIdentity)
        );
        assert_eq!(Modification::decode(&json!([1, 2])), Err(DecodeError::NotAnObject));
    }

    #[test]
    fn test_slide_type_only_kept_for_slides() {
        let slide = Modification::decode(&json!({
            "action": "ADD", "targetType": "SLIDE", "parentPath": "C1.S1.M1.CH1",
            "node": {"id": "SL1", "name": "Welcome", "slideType": "video"}
        }))
        .unwrap();
        assert_eq!(slide.node.slide_type.as_deref(), Some("video"));

        let module = Modification::decode(&json!({
            "action": "ADD", "targetType": "MODULE",
            "node": {"id": "M1", "name": "Intro", "slideType": "video"}
        }))
        .unwrap();
        assert!(module.node.slide_type.is_none());
        assert_eq!(module.node.attributes.get("slideType"), Some(&json!("video")));
    }

    #[test]
    fn test_identity_falls_back_to_name() {
        let m = Modification::decode(&json!({
            "action": "UPDATE", "targetType": "SUBJECT", "node": {"name": "Data Structures & Algorithms"}
        }))
        .unwrap();
        let key = m.key().unwrap();
        assert_eq!(key.node_id, "data-structures-algorithms");
        assert_eq!(key.to_string(), "UPDATE:Subject:data-structures-algorithms");
    }

    #[test]
    fn test_numeric_ids_are_stringified() {
        let m = Modification::decode(&json!({
            "action": "DELETE", "targetType": "COURSE", "node": {"id": 7}
        }))
        .unwrap();
        assert_eq!(m.node_id().as_deref(), Some("7"));
        assert_eq!(m.target_path().as_deref(), Some("7"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Intro to Rust"), "intro-to-rust");
        assert_eq!(slugify("  --Hello!!  "), "hello");
        assert_eq!(slugify("!!!"), "");
    }
}
