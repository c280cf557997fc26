//! Node schemas: the declared inputs, outputs and layout of a node type.
//!
//! Schemas are plain data deserialized from the catalog. Type fields hold
//! unevaluated `Expression`s; `function::FunctionDefinition` evaluates them.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub String);

impl InputId {
    /// Name under which the input's type is visible to output expressions.
    pub fn generic_name(self) -> String {
        format!("Input{}", self.0)
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaId {
    fn from(s: &str) -> Self {
        SchemaId(s.to_string())
    }
}

fn default_true() -> bool {
    true
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    pub schema_id: SchemaId,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<InputSchema>,
    #[serde(default)]
    pub outputs: Vec<OutputSchema>,
    #[serde(default)]
    pub side_effects: bool,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Regular,
    Generator,
    Collector,
    Transformer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSchema {
    pub id: InputId,
    pub label: String,
    #[serde(rename = "type")]
    pub ty: Expression,
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default = "default_true")]
    pub has_handle: bool,
    /// Unset optional inputs evaluate to `null` instead of their declared type.
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_output: Option<OutputId>,
}

/// How a literal value entered in the node is interpreted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Generic,
    Number,
    Text,
    Dropdown { options: Vec<DropdownOption> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropdownOption {
    pub value: InputValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Type the option stands for; defaults to the value's literal type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<Expression>,
}

/// A literal value stored on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Number(f64),
    String(String),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Number(n) => write!(f, "{n}"),
            InputValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchema {
    pub id: OutputId,
    pub label: String,
    #[serde(rename = "type")]
    pub ty: Expression,
    #[serde(default = "default_true")]
    pub has_handle: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<PassthroughSource>,
}

/// `"auto"`, `"none"` or the id of the input whose type is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PassthroughSource {
    Input(InputId),
    Keyword(PassthroughKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassthroughKeyword {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "none")]
    None,
}

// ---- layout ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(flatten)]
    pub kind: GroupKind,
    #[serde(default)]
    pub items: Vec<GroupItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GroupKind {
    Ordinary,
    /// Items are shown only while the condition holds.
    Conditional { condition: Condition },
    /// Optional items become required while the condition holds.
    Required { condition: Condition },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupItem {
    Input(InputId),
    Group(Group),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    And {
        items: Vec<Condition>,
    },
    Or {
        items: Vec<Condition>,
    },
    Not {
        condition: Box<Condition>,
    },
    /// The input's literal value is one of `values`.
    Enum {
        input: InputId,
        values: Vec<InputValue>,
    },
    /// The input's resolved type is assignable to `condition`.
    Type {
        input: InputId,
        condition: Expression,
        #[serde(rename = "ifNotConnected", default)]
        if_not_connected: bool,
    },
}

impl NodeSchema {
    pub fn input(&self, id: InputId) -> Option<&InputSchema> {
        self.inputs.iter().find(|i| i.id == id)
    }

    pub fn output(&self, id: OutputId) -> Option<&OutputSchema> {
        self.outputs.iter().find(|o| o.id == id)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_de::from_value_with_path;
    use serde_json::json;

    fn blur() -> serde_json::Value {
        json!({
            "schemaId": "image:blur",
            "name": "Blur",
            "inputs": [
                {"id": 0, "label": "Image", "type": {"type": "named", "name": "Image"}},
                {"id": 1, "label": "Radius", "type": {"type": "interval", "min": 0, "max": "inf"}, "kind": {"type": "number"}},
                {"id": 2, "label": "Mode", "type": {"type": "string"}, "kind": {"type": "dropdown", "options": [
                    {"value": "fast"},
                    {"value": 1, "label": "Precise", "type": {"type": "string-literal", "value": "precise"}}
                ]}}
            ],
            "outputs": [
                {"id": 0, "label": "Image", "type": {"type": "named", "name": "Input0"}, "passthrough": "auto"}
            ],
            "groups": [
                {"kind": "conditional", "condition": {"type": "enum", "input": 2, "values": ["fast"]}, "items": [1]},
                {"kind": "ordinary", "items": [{"kind": "required", "condition": {
                    "type": "type", "input": 0, "condition": {"type": "any"}, "ifNotConnected": true
                }, "items": [0]}]}
            ]
        })
    }

    #[test]
    fn schema_decodes_with_defaults() {
        let schema: NodeSchema = from_value_with_path(blur()).unwrap();
        assert_eq!(schema.schema_id, SchemaId::from("image:blur"));
        assert_eq!(schema.kind, NodeKind::Regular);
        assert!(!schema.side_effects);

        let radius = schema.input(InputId(1)).unwrap();
        assert!(matches!(radius.kind, InputKind::Number));
        assert!(radius.has_handle && !radius.optional && !radius.nullable);

        let mode = schema.input(InputId(2)).unwrap();
        match &mode.kind {
            InputKind::Dropdown { options } => {
                assert_eq!(options[0].value, InputValue::String("fast".into()));
                assert_eq!(options[1].value, InputValue::Number(1.0));
                assert_eq!(options[1].label.as_deref(), Some("Precise"));
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let out = schema.output(OutputId(0)).unwrap();
        assert_eq!(out.passthrough, Some(PassthroughSource::Keyword(PassthroughKeyword::Auto)));

        assert!(matches!(schema.groups[0].kind, GroupKind::Conditional { .. }));
        match &schema.groups[1].items[0] {
            GroupItem::Group(g) => match &g.kind {
                GroupKind::Required { condition: Condition::Type { if_not_connected, .. } } => {
                    assert!(*if_not_connected)
                }
                other => panic!("unexpected group {other:?}"),
            },
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn explicit_passthrough_input() {
        let out: OutputSchema = from_value_with_path(json!({
            "id": 0, "label": "Out", "type": {"type": "any"}, "passthrough": 3
        }))
        .unwrap();
        assert_eq!(out.passthrough, Some(PassthroughSource::Input(InputId(3))));
    }

    #[test]
    fn bad_expressions_report_their_path() {
        let mut value = blur();
        value["inputs"][1]["type"] = json!({"type": "interval", "min": 5, "max": 1});
        let err = from_value_with_path::<NodeSchema>(value).unwrap_err();
        assert!(err.path.starts_with("inputs[1]"), "{err}");
        assert!(err.message.contains("invalid interval bounds"), "{err}");
    }
}
