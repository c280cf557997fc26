//! Whether a node is fully and correctly configured.
//!
//! A node's group layout decides which inputs are shown and which optional
//! inputs become required; the checks then run in a fixed order:
//! - the node failed to evaluate
//! - a visible required input has neither an edge nor a value
//! - an input received a type disjoint from its declared type
//! - an output has no valid value
use std::collections::HashSet;

use crate::algebra::is_subset_of;
use crate::eval::{GenericParameters, evaluate};
use crate::explain::explain;
use crate::function::{FunctionDefinition, FunctionInstance};
use crate::graph::Node;
use crate::schema::{Condition, Group, GroupItem, GroupKind, InputId};
use crate::type_state::TypeState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl Validity {
    pub fn valid() -> Self {
        Validity { is_valid: true, reason: None }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Validity { is_valid: false, reason: Some(reason.into()) }
    }
}

struct Context<'a> {
    node: &'a Node,
    definition: &'a FunctionDefinition,
    instance: &'a FunctionInstance,
    state: &'a TypeState,
}

pub fn check_node_validity(node: &Node, definition: &FunctionDefinition, state: &TypeState) -> Validity {
    if let Some(error) = state.evaluation_error(&node.id) {
        return Validity::invalid(format!("Failed to evaluate the node: {error}"));
    }
    let Some(instance) = state.get(&node.id) else {
        return Validity::invalid("The node has not been evaluated");
    };
    let cx = Context { node, definition, instance, state };
    let layout = Layout::compute(&cx);

    let missing: Vec<&str> = definition
        .schema
        .inputs
        .iter()
        .filter(|i| layout.is_required(i.id, i.optional))
        .filter(|i| !state.is_connected(&node.id, i.id) && !node.data.contains_key(&i.id))
        .map(|i| i.label.as_str())
        .collect();
    if !missing.is_empty() {
        return Validity::invalid(format!("Missing required input data: {}", missing.join(", ")));
    }

    if let Some(error) = instance.input_errors.iter().find(|e| !layout.hidden.contains(&e.input)) {
        let label = input_label(definition, error.input);
        let detail = explain(&error.assigned, &error.declared).map(|e| format!(" {e}")).unwrap_or_default();
        return Validity::invalid(match state.source_of(&node.id, error.input) {
            Some(edge) => format!(
                "Input {label} was connected with an incompatible value from node {}.{detail}",
                edge.source
            ),
            None => format!("Input {label} has an invalid value.{detail}"),
        });
    }

    if let Some(error) = instance.output_errors.first() {
        let label = definition
            .schema
            .output(error.output)
            .map_or_else(|| error.output.to_string(), |o| o.label.clone());
        return Validity::invalid(match &error.reason {
            Some(reason) => format!("Output {label}: {reason}"),
            None => format!("The output {label} has no valid value"),
        });
    }

    Validity::valid()
}

fn input_label(definition: &FunctionDefinition, id: InputId) -> String {
    definition.schema.input(id).map_or_else(|| id.to_string(), |i| i.label.clone())
}

// ---- layout ----

#[derive(Default)]
struct Layout {
    hidden: HashSet<InputId>,
    required: HashSet<InputId>,
}

impl Layout {
    fn compute(cx: &Context<'_>) -> Self {
        let mut layout = Layout::default();
        for group in &cx.definition.schema.groups {
            layout.walk(cx, group, true);
        }
        layout
    }

    fn walk(&mut self, cx: &Context<'_>, group: &Group, visible: bool) {
        let (visible, required) = match &group.kind {
            GroupKind::Ordinary => (visible, false),
            GroupKind::Conditional { condition } => (visible && holds(cx, condition), false),
            GroupKind::Required { condition } => (visible, visible && holds(cx, condition)),
        };
        for item in &group.items {
            match item {
                GroupItem::Input(id) => {
                    if !visible {
                        self.hidden.insert(*id);
                    }
                    if required {
                        self.required.insert(*id);
                    }
                }
                GroupItem::Group(inner) => self.walk(cx, inner, visible),
            }
        }
    }

    fn is_required(&self, id: InputId, optional: bool) -> bool {
        !self.hidden.contains(&id) && (!optional || self.required.contains(&id))
    }
}

fn holds(cx: &Context<'_>, condition: &Condition) -> bool {
    match condition {
        Condition::And { items } => items.iter().all(|c| holds(cx, c)),
        Condition::Or { items } => items.iter().any(|c| holds(cx, c)),
        Condition::Not { condition } => !holds(cx, condition),
        Condition::Enum { input, values } => cx.node.data.get(input).is_some_and(|v| values.contains(v)),
        Condition::Type { input, condition, if_not_connected } => {
            let supplied = cx.state.is_connected(&cx.node.id, *input) || cx.node.data.contains_key(input);
            if !supplied {
                return *if_not_connected;
            }
            let Some(actual) = cx.instance.input(*input) else {
                return false;
            };
            // a condition that fails to evaluate never holds
            evaluate(condition, &cx.definition.scope, &GenericParameters::new())
                .is_ok_and(|expected| is_subset_of(actual, &expected))
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::function::tests::image_scope;
    use crate::graph::GraphSnapshot;
    use crate::path_de::from_value_with_path;
    use crate::schema::NodeSchema;
    use crate::type_state::tests::{definitions, graph};
    use crate::type_state::{FunctionDefinitions, OutputNarrowing};
    use serde_json::json;

    fn with_layouts() -> FunctionDefinitions {
        let scope = image_scope();
        let mut defs = definitions();
        let schemas: Vec<NodeSchema> = from_value_with_path(json!([
            {
                "schemaId": "resize",
                "name": "Resize",
                "inputs": [
                    {"id": 0, "label": "Mode", "type": {"type": "string"}, "hasHandle": false, "kind": {"type": "dropdown", "options": [
                        {"value": 0, "type": {"type": "string-literal", "value": "factor"}},
                        {"value": 1, "type": {"type": "string-literal", "value": "size"}}
                    ]}},
                    {"id": 1, "label": "Factor", "type": {"type": "number"}, "hasHandle": false, "kind": {"type": "number"}},
                    {"id": 2, "label": "Width", "type": {"type": "number"}, "optional": true, "kind": {"type": "number"}}
                ],
                "groups": [
                    {"kind": "conditional", "condition": {"type": "enum", "input": 0, "values": [0]}, "items": [1]},
                    {"kind": "required", "condition": {"type": "enum", "input": 0, "values": [1]}, "items": [2]}
                ]
            },
            {
                "schemaId": "tune",
                "name": "Tune",
                "inputs": [
                    {"id": 0, "label": "Value", "type": {"type": "any"}},
                    {"id": 1, "label": "Scale", "type": {"type": "number"}, "hasHandle": false}
                ],
                "groups": [
                    {"kind": "conditional", "condition": {"type": "type", "input": 0, "condition": {"type": "number"}}, "items": [1]}
                ]
            }
        ]))
        .unwrap();
        for schema in schemas {
            let id = schema.schema_id.clone();
            defs.insert(id, Rc::new(FunctionDefinition::new(Rc::new(schema), &scope).unwrap()));
        }
        defs
    }

    fn check_all(g: &GraphSnapshot, defs: &FunctionDefinitions) -> Vec<(String, Validity)> {
        let state = TypeState::create(&g.nodes, &g.edges, &OutputNarrowing::new(), defs, None, None);
        g.nodes
            .iter()
            .map(|n| (n.id.to_string(), check_node_validity(n, &defs[&n.schema_id], &state)))
            .collect()
    }

    fn validity_of(g: &GraphSnapshot, defs: &FunctionDefinitions, id: &str) -> Validity {
        check_all(g, defs).into_iter().find(|(n, _)| n == id).map(|(_, v)| v).unwrap()
    }

    #[test]
    fn configured_nodes_are_valid() {
        let defs = definitions();
        let g = graph(json!({"nodes": [{"id": "a", "schemaId": "scale", "data": {"0": 2}}]}));
        assert_eq!(validity_of(&g, &defs, "a"), Validity::valid());
    }

    #[test]
    fn missing_required_input_names_its_label() {
        let defs = definitions();
        let g = graph(json!({"nodes": [{"id": "g", "schemaId": "gray"}]}));
        let validity = validity_of(&g, &defs, "g");
        assert!(!validity.is_valid);
        assert_eq!(validity.reason.as_deref(), Some("Missing required input data: Image"));
    }

    #[test]
    fn incompatible_edges_name_the_source_node() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [{"id": "a", "schemaId": "fail"}, {"id": "b", "schemaId": "scale"}],
            "edges": [{"source": "a", "sourceHandle": 0, "target": "b", "targetHandle": 0}]
        }));
        let a = validity_of(&g, &defs, "a");
        assert_eq!(a.reason.as_deref(), Some("Output Value: boom"));

        let b = validity_of(&g, &defs, "b");
        assert!(!b.is_valid);
        let reason = b.reason.unwrap();
        assert!(reason.starts_with("Input Factor was connected with an incompatible value from node a."), "{reason}");
    }

    #[test]
    fn invalid_literals_are_reported() {
        let defs = definitions();
        let g = graph(json!({"nodes": [{"id": "a", "schemaId": "scale", "data": {"0": "two"}}]}));
        let reason = validity_of(&g, &defs, "a").reason.unwrap();
        assert!(reason.starts_with("Input Factor has an invalid value."), "{reason}");
    }

    #[test]
    fn evaluation_errors_come_first() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [{"id": "a", "schemaId": "scale"}, {"id": "b", "schemaId": "scale"}],
            "edges": [
                {"source": "a", "sourceHandle": 0, "target": "b", "targetHandle": 0},
                {"source": "b", "sourceHandle": 0, "target": "a", "targetHandle": 0}
            ]
        }));
        let reason = validity_of(&g, &defs, "a").reason.unwrap();
        assert!(reason.starts_with("Failed to evaluate the node"), "{reason}");
    }

    #[test]
    fn enum_conditions_control_visibility_and_requirement() {
        let defs = with_layouts();
        let g = graph(json!({"nodes": [
            {"id": "by-factor", "schemaId": "resize", "data": {"0": 0}},
            {"id": "by-size", "schemaId": "resize", "data": {"0": 1}},
            {"id": "sized", "schemaId": "resize", "data": {"0": 1, "2": 640}}
        ]}));
        let results = check_all(&g, &defs);
        assert_eq!(results[0].1, Validity::invalid("Missing required input data: Factor"));
        assert_eq!(results[1].1, Validity::invalid("Missing required input data: Width"));
        assert_eq!(results[2].1, Validity::valid());
    }

    #[test]
    fn type_conditions_follow_connections() {
        let defs = with_layouts();
        let unconnected = graph(json!({"nodes": [{"id": "t", "schemaId": "tune", "data": {"0": "x"}}]}));
        assert_eq!(validity_of(&unconnected, &defs, "t"), Validity::valid());

        let connected = graph(json!({
            "nodes": [{"id": "s", "schemaId": "scale", "data": {"0": 1}}, {"id": "t", "schemaId": "tune"}],
            "edges": [{"source": "s", "sourceHandle": 0, "target": "t", "targetHandle": 0}]
        }));
        assert_eq!(validity_of(&connected, &defs, "t"), Validity::invalid("Missing required input data: Scale"));
    }
}
