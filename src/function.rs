//! Function definitions and instances.
//!
//! A `FunctionDefinition` is a node schema with every declared type evaluated
//! once. A `FunctionInstance` is one binding of that definition to concrete
//! input types: it carries the narrowed inputs, the resulting outputs, and
//! the assignment errors found along the way.
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::algebra::{intersect, is_disjoint_with, union};
use crate::builtins::{ERROR, null_type};
use crate::error::EvaluationError;
use crate::eval::{GenericParameters, evaluate};
use crate::scope::Scope;
use crate::schema::{InputId, InputKind, InputValue, NodeKind, NodeSchema, OutputId, PassthroughKeyword, PassthroughSource, SchemaId};
use crate::types::{StringType, Type};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Turns a literal value stored on a node into a type.
#[derive(Debug, Clone)]
pub enum InputAdapter {
    Generic,
    Number,
    Text,
    Dropdown(Vec<(InputValue, Type)>),
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub schema: Rc<NodeSchema>,
    pub scope: Rc<Scope>,
    /// Declared input types; nullable inputs include `null`.
    inputs: IndexMap<InputId, Type>,
    adapters: IndexMap<InputId, InputAdapter>,
    default_instance: Rc<FunctionInstance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputAssignmentError {
    pub input: InputId,
    pub assigned: Type,
    pub declared: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputError {
    pub output: OutputId,
    /// Messages of the `Error` members the output evaluated to, if any.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInstance {
    pub schema_id: SchemaId,
    pub inputs: IndexMap<InputId, Type>,
    pub outputs: IndexMap<OutputId, Type>,
    pub input_errors: Vec<InputAssignmentError>,
    pub output_errors: Vec<OutputError>,
}

/// Outputs that forward the exact type of one of their inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassthroughInfo {
    pub mapping: IndexMap<OutputId, InputId>,
}

pub type PassthroughMap = HashMap<SchemaId, PassthroughInfo>;

// ————————————————————————————————————————————————————————————————————————————
// DEFINITION
// ————————————————————————————————————————————————————————————————————————————

impl InputAdapter {
    pub fn adapt(&self, value: &InputValue) -> Option<Type> {
        match (self, value) {
            (InputAdapter::Generic | InputAdapter::Number, InputValue::Number(v)) => Some(Type::literal(*v)),
            (InputAdapter::Generic | InputAdapter::Text, InputValue::String(s)) => Some(Type::string_literal(s.clone())),
            (InputAdapter::Dropdown(options), v) => options.iter().find(|(o, _)| o == v).map(|(_, t)| t.clone()),
            _ => None,
        }
    }
}

fn literal_type(value: &InputValue) -> Type {
    match value {
        InputValue::Number(v) => Type::literal(*v),
        InputValue::String(s) => Type::string_literal(s.clone()),
    }
}

impl FunctionDefinition {
    pub fn new(schema: Rc<NodeSchema>, scope: &Rc<Scope>) -> Result<Self, EvaluationError> {
        let empty = GenericParameters::new();
        let mut inputs = IndexMap::new();
        let mut adapters = IndexMap::new();
        for input in &schema.inputs {
            let mut ty = evaluate(&input.ty, scope, &empty)?;
            if input.nullable {
                ty = union([ty, null_type()]);
            }
            inputs.insert(input.id, ty);

            let adapter = match &input.kind {
                InputKind::Generic => InputAdapter::Generic,
                InputKind::Number => InputAdapter::Number,
                InputKind::Text => InputAdapter::Text,
                InputKind::Dropdown { options } => InputAdapter::Dropdown(
                    options
                        .iter()
                        .map(|o| {
                            let ty = match &o.ty {
                                Some(expr) => evaluate(expr, scope, &empty)?,
                                None => literal_type(&o.value),
                            };
                            Ok((o.value.clone(), ty))
                        })
                        .collect::<Result<_, EvaluationError>>()?,
                ),
            };
            adapters.insert(input.id, adapter);
        }

        let placeholder = Rc::new(FunctionInstance {
            schema_id: schema.schema_id.clone(),
            inputs: inputs.clone(),
            outputs: IndexMap::new(),
            input_errors: Vec::new(),
            output_errors: Vec::new(),
        });
        let mut definition = FunctionDefinition {
            schema,
            scope: scope.clone(),
            inputs,
            adapters,
            default_instance: placeholder,
        };
        let default = FunctionInstance::from_partial_inputs(&definition, |_| None, None, None)?;
        definition.default_instance = Rc::new(default);

        debug!(
            schema = %definition.schema.schema_id,
            inputs = definition.inputs.len(),
            outputs = definition.default_instance.outputs.len(),
            "function definition created"
        );
        Ok(definition)
    }

    pub fn schema_id(&self) -> &SchemaId {
        &self.schema.schema_id
    }

    pub fn input_type(&self, id: InputId) -> Option<&Type> {
        self.inputs.get(&id)
    }

    pub fn input_types(&self) -> impl Iterator<Item = (InputId, &Type)> {
        self.inputs.iter().map(|(id, t)| (*id, t))
    }

    pub fn output_default(&self, id: OutputId) -> Option<&Type> {
        self.default_instance.outputs.get(&id)
    }

    pub fn default_instance(&self) -> &Rc<FunctionInstance> {
        &self.default_instance
    }

    pub fn is_nullable(&self, id: InputId) -> bool {
        self.schema.input(id).is_some_and(|i| i.nullable)
    }

    /// Type of a literal value entered for `input`.
    pub fn adapt(&self, input: InputId, value: &InputValue) -> Option<Type> {
        self.adapters.get(&input)?.adapt(value)
    }

    /// Whether a value of type `ty` may be connected to `input`.
    pub fn can_assign(&self, input: InputId, ty: &Type) -> bool {
        self.inputs.get(&input).is_some_and(|declared| !is_disjoint_with(ty, declared))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INSTANCE
// ————————————————————————————————————————————————————————————————————————————

impl FunctionInstance {
    /// Binds `definition` to the inputs `provider` knows about; the rest keep
    /// their declared types.
    pub fn from_partial_inputs(
        definition: &FunctionDefinition,
        mut provider: impl FnMut(InputId) -> Option<Type>,
        narrowing: Option<&IndexMap<OutputId, Type>>,
        passthrough: Option<&PassthroughInfo>,
    ) -> Result<Self, EvaluationError> {
        let mut inputs = IndexMap::new();
        let mut input_errors = Vec::new();
        let mut supplied = Vec::new();
        for (id, declared) in &definition.inputs {
            let Some(assigned) = provider(*id) else {
                inputs.insert(*id, declared.clone());
                continue;
            };
            let narrowed = intersect([assigned.clone(), declared.clone()]);
            if narrowed.is_never() {
                input_errors.push(InputAssignmentError { input: *id, assigned, declared: declared.clone() });
            }
            supplied.push(*id);
            inputs.insert(*id, narrowed);
        }

        let generics: GenericParameters = inputs.iter().map(|(id, t)| (id.generic_name(), t.clone())).collect();
        let mut outputs = IndexMap::new();
        let mut output_errors = Vec::new();
        for output in &definition.schema.outputs {
            let raw = evaluate(&output.ty, &definition.scope, &generics)?;
            let (mut value, reason) = split_error_members(raw);
            if let Some(reported) = narrowing.and_then(|n| n.get(&output.id)) {
                let narrowed = intersect([value.clone(), reported.clone()]);
                if !narrowed.is_never() {
                    value = narrowed;
                }
            }
            if value.is_never() {
                output_errors.push(OutputError { output: output.id, reason });
            }
            outputs.insert(output.id, value);
        }

        if let Some(info) = passthrough {
            for (output, input) in &info.mapping {
                if !supplied.contains(input) {
                    continue;
                }
                let Some(forwarded) = inputs.get(input).filter(|t| !t.is_never()) else {
                    continue;
                };
                outputs.insert(*output, forwarded.clone());
                output_errors.retain(|e| e.output != *output);
            }
        }

        Ok(FunctionInstance {
            schema_id: definition.schema.schema_id.clone(),
            inputs,
            outputs,
            input_errors,
            output_errors,
        })
    }

    pub fn input(&self, id: InputId) -> Option<&Type> {
        self.inputs.get(&id)
    }

    pub fn output(&self, id: OutputId) -> Option<&Type> {
        self.outputs.get(&id)
    }

    pub fn has_errors(&self) -> bool {
        !self.input_errors.is_empty() || !self.output_errors.is_empty()
    }
}

/// Removes `Error { message }` members; their literal messages become the reason.
fn split_error_members(t: Type) -> (Type, Option<String>) {
    let is_error = |m: &Type| matches!(m, Type::Struct(s) if s.name() == ERROR);
    if !t.members().iter().any(is_error) {
        return (t, None);
    }
    let mut reasons = Vec::new();
    let mut rest = Vec::new();
    for member in t.members() {
        match member {
            Type::Struct(s) if s.name() == ERROR => {
                if let Some(Type::String(StringType::Literal(message))) = s.field("message") {
                    reasons.push(message.clone());
                }
            }
            other => rest.push(other.clone()),
        }
    }
    let reason = (!reasons.is_empty()).then(|| reasons.join("; "));
    (union(rest), reason)
}

// ————————————————————————————————————————————————————————————————————————————
// PASSTHROUGH
// ————————————————————————————————————————————————————————————————————————————

impl PassthroughInfo {
    /// Forwarding only applies to single-output, side-effect-free regular nodes.
    /// Without an explicit input the first required handle input whose type
    /// overlaps the output's is forwarded; `"none"` turns forwarding off.
    pub fn for_definition(definition: &FunctionDefinition) -> Option<Self> {
        let schema = &definition.schema;
        if schema.side_effects || schema.kind != NodeKind::Regular || schema.outputs.len() != 1 {
            return None;
        }
        let output = &schema.outputs[0];
        let input = match output.passthrough {
            Some(PassthroughSource::Input(id)) => {
                schema.input(id)?;
                id
            }
            Some(PassthroughSource::Keyword(PassthroughKeyword::None)) => return None,
            Some(PassthroughSource::Keyword(PassthroughKeyword::Auto)) | None => {
                let output_type = definition.output_default(output.id)?;
                schema
                    .inputs
                    .iter()
                    .filter(|i| i.has_handle && !i.optional)
                    .find(|i| {
                        definition
                            .input_type(i.id)
                            .is_some_and(|t| !is_disjoint_with(t, output_type))
                    })?
                    .id
            }
        };
        let mut mapping = IndexMap::new();
        mapping.insert(output.id, input);
        Some(PassthroughInfo { mapping })
    }
}

pub fn build_passthrough_map<'a>(definitions: impl IntoIterator<Item = &'a FunctionDefinition>) -> PassthroughMap {
    definitions
        .into_iter()
        .filter_map(|d| PassthroughInfo::for_definition(d).map(|info| (d.schema_id().clone(), info)))
        .collect()
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builtins::prelude;
    use crate::expr::Expression;
    use crate::path_de::from_value_with_path;
    use crate::scope::{ScopeBuilder, StructDefinition};
    use crate::types::{NumberType, StructField, StructType};
    use serde_json::json;

    pub(crate) fn image_scope() -> Rc<Scope> {
        let mut b = ScopeBuilder::new("catalog", Some(prelude().unwrap()));
        b.add(StructDefinition {
            name: "Image".into(),
            fields: vec![
                ("width".into(), Expression::named("uint")),
                ("height".into(), Expression::named("uint")),
                ("channels".into(), Expression::Number(NumberType::int_interval(1.0, f64::INFINITY).unwrap())),
            ],
        })
        .unwrap();
        b.build()
    }

    pub(crate) fn uint() -> Type {
        Type::Number(NumberType::int_interval(0.0, f64::INFINITY).unwrap())
    }

    pub(crate) fn image(channels: Type) -> Type {
        StructType::new(
            "Image",
            vec![
                StructField::new("width", uint()),
                StructField::new("height", uint()),
                StructField::new("channels", channels),
            ],
        )
    }

    fn definition(schema: serde_json::Value) -> FunctionDefinition {
        let schema: NodeSchema = from_value_with_path(schema).unwrap();
        FunctionDefinition::new(Rc::new(schema), &image_scope()).unwrap()
    }

    /// Image in, image out; the radius is optional and nullable.
    fn blur() -> FunctionDefinition {
        definition(json!({
            "schemaId": "blur",
            "name": "Blur",
            "inputs": [
                {"id": 0, "label": "Image", "type": {"type": "named", "name": "Image"}},
                {"id": 1, "label": "Radius", "type": {"type": "interval", "min": 0, "max": "inf"},
                 "kind": {"type": "number"}, "optional": true, "nullable": true}
            ],
            "outputs": [
                {"id": 0, "label": "Image", "type": {"type": "match", "of": {"type": "named", "name": "Input1"}, "arms": [
                    {"pattern": {"type": "named", "name": "null"}, "body": {"type": "named", "name": "Error", "fields": {
                        "message": {"type": "string-literal", "value": "radius is required"}
                    }}},
                    {"pattern": {"type": "any"}, "body": {"type": "named", "name": "Input0"}}
                ]}}
            ]
        }))
    }

    #[test]
    fn default_instance_uses_declared_types() {
        let def = blur();
        let default = def.default_instance();
        assert_eq!(default.input(InputId(0)), Some(&image(Type::Number(NumberType::int_interval(1.0, f64::INFINITY).unwrap()))));
        assert_eq!(default.input(InputId(1)).map(Type::type_id).as_deref(), Some("0..inf | null"));
        assert!(default.input_errors.is_empty());
        assert!(default.output_errors.is_empty());
    }

    #[test]
    fn supplied_inputs_narrow_outputs() {
        let def = blur();
        let rgb = image(Type::literal(3.0));
        let instance = FunctionInstance::from_partial_inputs(
            &def,
            |id| match id.0 {
                0 => Some(rgb.clone()),
                1 => Some(Type::literal(2.0)),
                _ => None,
            },
            None,
            None,
        )
        .unwrap();
        assert_eq!(instance.output(OutputId(0)), Some(&rgb));
        assert!(!instance.has_errors());
    }

    #[test]
    fn disjoint_inputs_are_recorded() {
        let def = blur();
        let instance = FunctionInstance::from_partial_inputs(
            &def,
            |id| (id.0 == 0).then(Type::string),
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            instance.input_errors,
            vec![InputAssignmentError { input: InputId(0), assigned: Type::string(), declared: def.input_type(InputId(0)).unwrap().clone() }]
        );
        assert_eq!(instance.output(OutputId(0)), Some(&Type::Never));
        assert_eq!(instance.output_errors.len(), 1);
    }

    #[test]
    fn error_members_become_the_reason() {
        let def = blur();
        let instance = FunctionInstance::from_partial_inputs(
            &def,
            |id| (id.0 == 1).then(null_type),
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            instance.output_errors,
            vec![OutputError { output: OutputId(0), reason: Some("radius is required".into()) }]
        );
    }

    #[test]
    fn narrowing_applies_only_when_compatible() {
        let def = blur();
        let mut narrowing = IndexMap::new();
        narrowing.insert(OutputId(0), image(Type::literal(4.0)));
        let instance = FunctionInstance::from_partial_inputs(&def, |_| None, Some(&narrowing), None).unwrap();
        assert_eq!(instance.output(OutputId(0)), Some(&image(Type::literal(4.0))));

        narrowing.insert(OutputId(0), Type::string());
        let instance = FunctionInstance::from_partial_inputs(&def, |_| None, Some(&narrowing), None).unwrap();
        assert_eq!(instance.output(OutputId(0)), def.output_default(OutputId(0)));
    }

    #[test]
    fn literal_values_are_adapted() {
        let def = definition(json!({
            "schemaId": "pick",
            "name": "Pick",
            "inputs": [
                {"id": 0, "label": "Mode", "type": {"type": "string"}, "kind": {"type": "dropdown", "options": [
                    {"value": 0, "type": {"type": "string-literal", "value": "fast"}},
                    {"value": 1, "type": {"type": "string-literal", "value": "slow"}}
                ]}},
                {"id": 1, "label": "Amount", "type": {"type": "number"}, "kind": {"type": "number"}}
            ],
            "outputs": []
        }));
        assert_eq!(def.adapt(InputId(0), &InputValue::Number(1.0)), Some(Type::string_literal("slow")));
        assert_eq!(def.adapt(InputId(0), &InputValue::Number(7.0)), None);
        assert_eq!(def.adapt(InputId(1), &InputValue::Number(0.5)), Some(Type::literal(0.5)));
        assert_eq!(def.adapt(InputId(1), &InputValue::String("x".into())), None);
        assert!(def.can_assign(InputId(1), &Type::literal(3.0)));
        assert!(!def.can_assign(InputId(1), &Type::string()));
    }

    #[test]
    fn passthrough_forwards_supplied_inputs() {
        let def = definition(json!({
            "schemaId": "identity",
            "name": "Identity",
            "inputs": [
                {"id": 0, "label": "Value", "type": {"type": "any"}}
            ],
            "outputs": [
                {"id": 0, "label": "Value", "type": {"type": "any"}, "passthrough": "auto"}
            ]
        }));
        let info = PassthroughInfo::for_definition(&def).unwrap();
        assert_eq!(info.mapping.get(&OutputId(0)), Some(&InputId(0)));

        let forwarded = FunctionInstance::from_partial_inputs(&def, |_| Some(Type::literal(5.0)), None, Some(&info)).unwrap();
        assert_eq!(forwarded.output(OutputId(0)), Some(&Type::literal(5.0)));

        let unsupplied = FunctionInstance::from_partial_inputs(&def, |_| None, None, Some(&info)).unwrap();
        assert_eq!(unsupplied.output(OutputId(0)), Some(&Type::Any));
    }

    #[test]
    fn passthrough_is_inferred_unless_turned_off() {
        let inferred = definition(json!({
            "schemaId": "blur",
            "name": "Blur",
            "inputs": [
                {"id": 0, "label": "Radius", "type": {"type": "number"}, "hasHandle": false},
                {"id": 1, "label": "Mask", "type": {"type": "string"}, "optional": true},
                {"id": 2, "label": "Label", "type": {"type": "string"}},
                {"id": 3, "label": "Image", "type": {"type": "named", "name": "Image"}}
            ],
            "outputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Image"}}]
        }));
        let info = PassthroughInfo::for_definition(&inferred).unwrap();
        assert_eq!(info.mapping.get(&OutputId(0)), Some(&InputId(3)));

        let rgb = image(Type::literal(3.0));
        let forwarded =
            FunctionInstance::from_partial_inputs(&inferred, |i| (i == InputId(3)).then(|| rgb.clone()), None, Some(&info))
                .unwrap();
        assert_eq!(forwarded.output(OutputId(0)), Some(&rgb));

        let explicit = definition(json!({
            "schemaId": "pick",
            "name": "Pick",
            "inputs": [
                {"id": 0, "label": "A", "type": {"type": "any"}},
                {"id": 1, "label": "B", "type": {"type": "any"}}
            ],
            "outputs": [{"id": 0, "label": "Value", "type": {"type": "any"}, "passthrough": 1}]
        }));
        let info = PassthroughInfo::for_definition(&explicit).unwrap();
        assert_eq!(info.mapping.get(&OutputId(0)), Some(&InputId(1)));

        let off = definition(json!({
            "schemaId": "gray",
            "name": "Grayscale",
            "inputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Image"}}],
            "outputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Image"}, "passthrough": "none"}]
        }));
        assert_eq!(PassthroughInfo::for_definition(&off), None);
    }

    #[test]
    fn passthrough_requires_a_plain_single_output_node() {
        let def = definition(json!({
            "schemaId": "save",
            "name": "Save",
            "sideEffects": true,
            "inputs": [{"id": 0, "label": "Value", "type": {"type": "any"}}],
            "outputs": [{"id": 0, "label": "Value", "type": {"type": "any"}, "passthrough": 0}]
        }));
        assert_eq!(PassthroughInfo::for_definition(&def), None);
        assert!(build_passthrough_map([&def]).is_empty());
    }
}
