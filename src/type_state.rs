//! Graph Type State: the function instance of every node in a graph snapshot.
//!
//! The state is rebuilt wholesale for every revision of the graph. Nodes are
//! resolved on demand in whatever order they are reached:
//! - an input connected by an edge takes the source node's output type
//! - otherwise a literal value is adapted to a type
//! - otherwise a nullable input is `null`
//! - otherwise the declared type applies
//!
//! A node whose evaluation fails falls back to its default instance; the error
//! is kept per node and the rest of the graph still resolves. Instances equal
//! to the previous state's are reused so consumers can compare by pointer.
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::builtins::null_type;
use crate::error::EvaluationError;
use crate::explain::explain;
use crate::function::{FunctionDefinition, FunctionInstance, PassthroughMap};
use crate::graph::{Edge, EdgeIndex, Node, NodeId};
use crate::schema::{InputId, OutputId, SchemaId};
use crate::types::Type;

pub type FunctionDefinitions = IndexMap<SchemaId, Rc<FunctionDefinition>>;

/// Output types reported by the backend, per node.
pub type OutputNarrowing = HashMap<NodeId, IndexMap<OutputId, Type>>;

#[derive(Debug)]
pub struct TypeState {
    functions: IndexMap<NodeId, Rc<FunctionInstance>>,
    evaluation_errors: IndexMap<NodeId, EvaluationError>,
    edges: EdgeIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCheck {
    Valid,
    Invalid(String),
}

impl ConnectionCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, ConnectionCheck::Valid)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BUILD
// ————————————————————————————————————————————————————————————————————————————

enum Slot {
    InProgress,
    Resolved(Rc<FunctionInstance>),
}

struct Builder<'a> {
    nodes: HashMap<&'a NodeId, &'a Node>,
    edges: EdgeIndex,
    narrowing: &'a OutputNarrowing,
    definitions: &'a FunctionDefinitions,
    passthrough: Option<&'a PassthroughMap>,
    previous: Option<&'a TypeState>,
    slots: HashMap<NodeId, Slot>,
    errors: IndexMap<NodeId, EvaluationError>,
}

impl<'a> Builder<'a> {
    fn resolve(&mut self, id: &NodeId) -> Option<Rc<FunctionInstance>> {
        match self.slots.get(id) {
            Some(Slot::Resolved(instance)) => return Some(instance.clone()),
            Some(Slot::InProgress) => {
                warn!(node = %id, "cycle detected while resolving node");
                self.errors.insert(id.clone(), EvaluationError::Cycle { node: id.clone() });
                return None;
            }
            None => {}
        }

        let node: &'a Node = self.nodes.get(id).copied()?;
        let definitions = self.definitions;
        let Some(definition) = definitions.get(&node.schema_id) else {
            warn!(node = %id, schema = %node.schema_id, "unknown node schema");
            self.errors.insert(id.clone(), EvaluationError::UnknownSchema { schema: node.schema_id.clone() });
            return None;
        };

        self.slots.insert(id.clone(), Slot::InProgress);
        let supplied = self.supplied_inputs(node, definition);
        if self.errors.contains_key(id) {
            // the node was re-entered through one of its own inputs
            let instance = definition.default_instance().clone();
            self.slots.insert(id.clone(), Slot::Resolved(instance.clone()));
            return Some(instance);
        }

        let narrowing = self.narrowing.get(id);
        let passthrough = self.passthrough.and_then(|m| m.get(&node.schema_id));
        let instance =
            match FunctionInstance::from_partial_inputs(definition, |i| supplied.get(&i).cloned(), narrowing, passthrough) {
                Ok(fresh) => self.reuse(id, fresh),
                Err(error) => {
                    warn!(node = %id, %error, "node evaluation failed; using its default instance");
                    self.errors.insert(id.clone(), error);
                    definition.default_instance().clone()
                }
            };
        self.slots.insert(id.clone(), Slot::Resolved(instance.clone()));
        Some(instance)
    }

    fn supplied_inputs(&mut self, node: &Node, definition: &FunctionDefinition) -> IndexMap<InputId, Type> {
        let mut supplied = IndexMap::new();
        for (input, _) in definition.input_types() {
            let ty = if let Some(edge) = self.edges.source_of(&node.id, input).cloned() {
                self.resolve(&edge.source).and_then(|source| source.output(edge.source_handle).cloned())
            } else if let Some(value) = node.data.get(&input) {
                // a value the adapter rejects fits no type
                Some(definition.adapt(input, value).unwrap_or(Type::Never))
            } else if definition.is_nullable(input) {
                Some(null_type())
            } else {
                None
            };
            if let Some(ty) = ty {
                supplied.insert(input, ty);
            }
        }
        supplied
    }

    fn reuse(&self, id: &NodeId, fresh: FunctionInstance) -> Rc<FunctionInstance> {
        match self.previous.and_then(|p| p.functions.get(id)) {
            Some(old) if **old == fresh => {
                trace!(node = %id, "instance unchanged");
                old.clone()
            }
            _ => Rc::new(fresh),
        }
    }
}

impl TypeState {
    pub fn create(
        nodes: &[Node],
        edges: &[Edge],
        narrowing: &OutputNarrowing,
        definitions: &FunctionDefinitions,
        passthrough: Option<&PassthroughMap>,
        previous: Option<&TypeState>,
    ) -> Self {
        let mut builder = Builder {
            nodes: nodes.iter().map(|n| (&n.id, n)).collect(),
            edges: EdgeIndex::new(edges),
            narrowing,
            definitions,
            passthrough,
            previous,
            slots: HashMap::new(),
            errors: IndexMap::new(),
        };
        for node in nodes {
            builder.resolve(&node.id);
        }

        let mut functions = IndexMap::new();
        for node in nodes {
            if let Some(Slot::Resolved(instance)) = builder.slots.remove(&node.id) {
                functions.insert(node.id.clone(), instance);
            }
        }
        debug!(nodes = functions.len(), errors = builder.errors.len(), "type state created");
        TypeState { functions, evaluation_errors: builder.errors, edges: builder.edges }
    }

    pub fn get(&self, node: &NodeId) -> Option<&Rc<FunctionInstance>> {
        self.functions.get(node)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&NodeId, &Rc<FunctionInstance>)> {
        self.functions.iter()
    }

    pub fn evaluation_error(&self, node: &NodeId) -> Option<&EvaluationError> {
        self.evaluation_errors.get(node)
    }

    pub fn evaluation_errors(&self) -> impl Iterator<Item = (&NodeId, &EvaluationError)> {
        self.evaluation_errors.iter()
    }

    pub fn is_connected(&self, node: &NodeId, input: InputId) -> bool {
        self.edges.is_connected(node, input)
    }

    pub fn source_of(&self, node: &NodeId, input: InputId) -> Option<&Edge> {
        self.edges.source_of(node, input)
    }

    /// Whether `edge` could be added to the graph this state was built from.
    pub fn test_connection(&self, edge: &Edge, definitions: &FunctionDefinitions) -> ConnectionCheck {
        let Some(source) = self.get(&edge.source) else {
            return ConnectionCheck::Invalid(format!("Unknown node {}", edge.source));
        };
        let Some(target) = self.get(&edge.target) else {
            return ConnectionCheck::Invalid(format!("Unknown node {}", edge.target));
        };
        let Some(ty) = source.output(edge.source_handle) else {
            return ConnectionCheck::Invalid(format!("Node {} has no output {}", edge.source, edge.source_handle));
        };
        let Some(definition) = definitions.get(&target.schema_id) else {
            return ConnectionCheck::Invalid(format!("Unknown node schema {}", target.schema_id));
        };
        let Some(declared) = definition.input_type(edge.target_handle) else {
            return ConnectionCheck::Invalid(format!("Node {} has no input {}", edge.target, edge.target_handle));
        };
        if !definition.can_assign(edge.target_handle, ty) {
            let reason = explain(ty, declared).unwrap_or_else(|| format!("`{ty}` is not assignable to `{declared}`"));
            return ConnectionCheck::Invalid(reason);
        }

        let connected = FunctionInstance::from_partial_inputs(
            definition,
            |i| if i == edge.target_handle { Some(ty.clone()) } else { target.input(i).cloned() },
            None,
            None,
        );
        let connected = match connected {
            Ok(instance) => instance,
            Err(error) => return ConnectionCheck::Invalid(error.to_string()),
        };
        for (output, before) in &target.outputs {
            let now_never = connected.output(*output).is_none_or(Type::is_never);
            if !before.is_never() && now_never {
                let label = definition.schema.output(*output).map_or_else(|| output.to_string(), |o| o.label.clone());
                return ConnectionCheck::Invalid(format!("Connecting would make the output {label} invalid"));
            }
        }
        ConnectionCheck::Valid
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::function::build_passthrough_map;
    use crate::function::tests::image_scope;
    use crate::graph::GraphSnapshot;
    use crate::path_de::from_value_with_path;
    use crate::schema::NodeSchema;
    use serde_json::json;

    pub(crate) fn definitions() -> FunctionDefinitions {
        let scope = image_scope();
        let schemas: Vec<NodeSchema> = from_value_with_path(json!([
            {
                "schemaId": "load",
                "name": "Load Image",
                "outputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Image", "fields": {
                    "channels": {"type": "numeric-literal", "value": 3}
                }}}]
            },
            {
                "schemaId": "gray",
                "name": "Grayscale",
                "inputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Image", "fields": {
                    "channels": {"type": "numeric-literal", "value": 1}
                }}}],
                "outputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Input0"}}]
            },
            {
                "schemaId": "scale",
                "name": "Scale",
                "inputs": [{"id": 0, "label": "Factor", "type": {"type": "number"}, "kind": {"type": "number"}}],
                "outputs": [{"id": 0, "label": "Result", "type": {"type": "function-call", "name": "number::mul", "args": [
                    {"type": "named", "name": "Input0"}, {"type": "numeric-literal", "value": 2}
                ]}}]
            },
            {
                "schemaId": "fail",
                "name": "Fail",
                "outputs": [{"id": 0, "label": "Value", "type": {"type": "named", "name": "Error", "fields": {
                    "message": {"type": "string-literal", "value": "boom"}
                }}}]
            },
            {
                "schemaId": "option",
                "name": "Option",
                "inputs": [{"id": 0, "label": "Value", "type": {"type": "number"}, "optional": true, "nullable": true}],
                "outputs": [{"id": 0, "label": "Text", "type": {"type": "match", "of": {"type": "named", "name": "Input0"}, "arms": [
                    {"pattern": {"type": "named", "name": "null"}, "body": {"type": "string-literal", "value": "none"}},
                    {"pattern": {"type": "number"}, "binding": "n", "body": {"type": "string-literal", "value": "some"}}
                ]}}]
            },
            {
                "schemaId": "pass",
                "name": "Pass",
                "inputs": [{"id": 0, "label": "Value", "type": {"type": "any"}}],
                "outputs": [{"id": 0, "label": "Value", "type": {"type": "any"}, "passthrough": "auto"}]
            }
        ]))
        .unwrap();
        schemas
            .into_iter()
            .map(|s| {
                let id = s.schema_id.clone();
                (id, Rc::new(FunctionDefinition::new(Rc::new(s), &scope).unwrap()))
            })
            .collect()
    }

    pub(crate) fn graph(value: serde_json::Value) -> GraphSnapshot {
        from_value_with_path(value).unwrap()
    }

    fn build(graph: &GraphSnapshot, definitions: &FunctionDefinitions) -> TypeState {
        TypeState::create(&graph.nodes, &graph.edges, &OutputNarrowing::new(), definitions, None, None)
    }

    #[test]
    fn types_flow_along_edges() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [{"id": "a", "schemaId": "scale", "data": {"0": 3}}, {"id": "b", "schemaId": "scale"}],
            "edges": [{"source": "a", "sourceHandle": 0, "target": "b", "targetHandle": 0}]
        }));
        let state = build(&g, &defs);
        let b = state.get(&NodeId::from("b")).unwrap();
        assert_eq!(b.input(InputId(0)), Some(&Type::literal(6.0)));
        assert_eq!(b.output(OutputId(0)), Some(&Type::literal(12.0)));
        assert!(state.is_connected(&NodeId::from("b"), InputId(0)));
    }

    #[test]
    fn resolution_does_not_depend_on_node_order() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [{"id": "b", "schemaId": "scale"}, {"id": "a", "schemaId": "scale", "data": {"0": 1}}],
            "edges": [{"source": "a", "sourceHandle": 0, "target": "b", "targetHandle": 0}]
        }));
        let state = build(&g, &defs);
        assert_eq!(state.get(&NodeId::from("b")).unwrap().output(OutputId(0)), Some(&Type::literal(4.0)));
    }

    #[test]
    fn never_propagates_downstream() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [{"id": "a", "schemaId": "fail"}, {"id": "b", "schemaId": "scale"}],
            "edges": [{"source": "a", "sourceHandle": 0, "target": "b", "targetHandle": 0}]
        }));
        let state = build(&g, &defs);

        let a = state.get(&NodeId::from("a")).unwrap();
        assert!(a.input_errors.is_empty());
        assert_eq!(a.output(OutputId(0)), Some(&Type::Never));
        assert_eq!(a.output_errors[0].reason.as_deref(), Some("boom"));

        let b = state.get(&NodeId::from("b")).unwrap();
        assert_eq!(b.input(InputId(0)), Some(&Type::Never));
        assert_eq!(b.input_errors.len(), 1);
        assert_eq!(b.input_errors[0].assigned, Type::Never);
        assert_eq!(state.source_of(&NodeId::from("b"), InputId(0)).map(|e| &e.source), Some(&NodeId::from("a")));
    }

    #[test]
    fn rejected_literals_are_input_errors() {
        let defs = definitions();
        let g = graph(json!({"nodes": [{"id": "a", "schemaId": "scale", "data": {"0": "three"}}]}));
        let state = build(&g, &defs);
        let a = state.get(&NodeId::from("a")).unwrap();
        assert_eq!(a.input_errors.len(), 1);
        assert_eq!(a.output(OutputId(0)), Some(&Type::Never));
    }

    #[test]
    fn nullable_inputs_default_to_null() {
        let defs = definitions();
        let g = graph(json!({"nodes": [
            {"id": "unset", "schemaId": "option"},
            {"id": "set", "schemaId": "option", "data": {"0": 2}}
        ]}));
        let state = build(&g, &defs);
        assert_eq!(state.get(&NodeId::from("unset")).unwrap().output(OutputId(0)), Some(&Type::string_literal("none")));
        assert_eq!(state.get(&NodeId::from("set")).unwrap().output(OutputId(0)), Some(&Type::string_literal("some")));
    }

    #[test]
    fn evaluation_errors_stay_on_their_node() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [
                {"id": "missing", "schemaId": "nope"},
                {"id": "ok", "schemaId": "scale"}
            ],
            "edges": [{"source": "missing", "sourceHandle": 0, "target": "ok", "targetHandle": 0}]
        }));
        let state = build(&g, &defs);
        assert!(state.get(&NodeId::from("missing")).is_none());
        assert!(matches!(
            state.evaluation_error(&NodeId::from("missing")),
            Some(EvaluationError::UnknownSchema { .. })
        ));
        let ok = state.get(&NodeId::from("ok")).unwrap();
        assert_eq!(ok.input(InputId(0)), Some(&Type::number()));
        assert!(state.evaluation_error(&NodeId::from("ok")).is_none());
    }

    #[test]
    fn cycles_are_reported() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [{"id": "a", "schemaId": "scale"}, {"id": "b", "schemaId": "scale"}],
            "edges": [
                {"source": "a", "sourceHandle": 0, "target": "b", "targetHandle": 0},
                {"source": "b", "sourceHandle": 0, "target": "a", "targetHandle": 0}
            ]
        }));
        let state = build(&g, &defs);
        assert_eq!(
            state.evaluation_error(&NodeId::from("a")),
            Some(&EvaluationError::Cycle { node: NodeId::from("a") })
        );
        assert!(state.get(&NodeId::from("b")).is_some());

        let a = state.get(&NodeId::from("a")).unwrap();
        assert!(Rc::ptr_eq(a, defs[&SchemaId::from("scale")].default_instance()));
    }

    #[test]
    fn unchanged_instances_are_reused() {
        let defs = definitions();
        let g = graph(json!({
            "nodes": [{"id": "a", "schemaId": "scale", "data": {"0": 3}}, {"id": "b", "schemaId": "scale", "data": {"0": 1}}]
        }));
        let first = build(&g, &defs);

        let mut changed = g.clone();
        changed.nodes[1].data.insert(InputId(0), crate::schema::InputValue::Number(5.0));
        let second = TypeState::create(&changed.nodes, &changed.edges, &OutputNarrowing::new(), &defs, None, Some(&first));

        let a = NodeId::from("a");
        let b = NodeId::from("b");
        assert!(Rc::ptr_eq(first.get(&a).unwrap(), second.get(&a).unwrap()));
        assert!(!Rc::ptr_eq(first.get(&b).unwrap(), second.get(&b).unwrap()));
    }

    #[test]
    fn passthrough_forwards_upstream_types() {
        let defs = definitions();
        let passthrough = build_passthrough_map(defs.values().map(Rc::as_ref));
        let g = graph(json!({
            "nodes": [{"id": "load", "schemaId": "load"}, {"id": "p", "schemaId": "pass"}],
            "edges": [{"source": "load", "sourceHandle": 0, "target": "p", "targetHandle": 0}]
        }));
        let state = TypeState::create(&g.nodes, &g.edges, &OutputNarrowing::new(), &defs, Some(&passthrough), None);
        let load = state.get(&NodeId::from("load")).unwrap().output(OutputId(0)).cloned();
        assert_eq!(state.get(&NodeId::from("p")).unwrap().output(OutputId(0)).cloned(), load);
    }

    #[test]
    fn connections_are_tested_before_they_exist() {
        let defs = definitions();
        let g = graph(json!({"nodes": [
            {"id": "load", "schemaId": "load"},
            {"id": "gray", "schemaId": "gray"},
            {"id": "pass", "schemaId": "pass"}
        ]}));
        let state = build(&g, &defs);
        let edge = |source: &str, target: &str| Edge {
            source: source.into(),
            source_handle: OutputId(0),
            target: target.into(),
            target_handle: InputId(0),
        };

        assert_eq!(state.test_connection(&edge("load", "pass"), &defs), ConnectionCheck::Valid);
        assert_eq!(
            state.test_connection(&edge("load", "gray"), &defs),
            ConnectionCheck::Invalid("The Image has 3 channel(s) but 1 channel(s) are required".into())
        );
        assert!(!state.test_connection(&edge("load", "nowhere"), &defs).is_valid());
    }
}
