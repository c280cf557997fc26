//! Catalogs: the type definitions and node schemas an editor session starts
//! from, loaded from one or more JSON files.
//!
//! ```json
//! {
//!   "definitions": [
//!     {"kind": "struct", "name": "Image", "fields": {"channels": {"type": "int-interval", "min": 1, "max": "inf"}}},
//!     {"kind": "alias", "name": "Channels", "type": {"type": "field-access", "of": {"type": "named", "name": "Image"}, "field": "channels"}},
//!     {"kind": "variable", "name": "MAX_SIZE", "value": {"type": "numeric-literal", "value": 65535}},
//!     {"kind": "function", "name": "withChannels", "parameters": {"c": {"type": "number"}}, "body": ...}
//!   ],
//!   "schemas": [ ... ]
//! }
//! ```
//!
//! Structs, aliases and functions share one scope on top of the prelude and
//! may refer to each other in any order. Variables are evaluated once against
//! that scope and live in a child scope of their own.
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::builtins::prelude;
use crate::error::{CatalogError, DefinitionError};
use crate::eval::{GenericParameters, evaluate};
use crate::expr::Expression;
use crate::function::{FunctionDefinition, PassthroughMap, build_passthrough_map};
use crate::path_de::from_str_with_path;
use crate::schema::{NodeSchema, SchemaId};
use crate::scope::{
    AliasDefinition, FunctionParameter, Scope, ScopeBuilder, StructDefinition, TypeFunctionDefinition, VariableDefinition,
};
use crate::type_state::FunctionDefinitions;
use crate::wire::unique_fields;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DefinitionEntry {
    Struct {
        name: String,
        #[serde(default, with = "unique_fields")]
        fields: Vec<(String, Expression)>,
    },
    Alias {
        name: String,
        #[serde(rename = "type")]
        ty: Expression,
    },
    Variable {
        name: String,
        value: Expression,
    },
    Function {
        name: String,
        #[serde(default, with = "unique_fields")]
        parameters: Vec<(String, Expression)>,
        body: Expression,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub definitions: Vec<DefinitionEntry>,
    #[serde(default)]
    pub schemas: Vec<NodeSchema>,
}

#[derive(Debug)]
pub struct Catalog {
    pub scope: Rc<Scope>,
    pub schemas: IndexMap<SchemaId, Rc<NodeSchema>>,
    pub functions: FunctionDefinitions,
    pub passthrough: PassthroughMap,
}

impl CatalogFile {
    pub fn parse(src: &str) -> Result<Self, CatalogError> {
        Ok(from_str_with_path(src)?)
    }

    pub fn read(path: &Path) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path).map_err(|source| CatalogError::Io { path: path.to_path_buf(), source })?;
        from_str_with_path(&src).map_err(|source| CatalogError::File { path: path.to_path_buf(), source })
    }
}

impl Catalog {
    /// Reads and merges every file, in order.
    pub fn load(paths: &[PathBuf]) -> Result<Self, CatalogError> {
        let files = paths.iter().map(|p| CatalogFile::read(p)).collect::<Result<Vec<_>, _>>()?;
        Self::from_files(files)
    }

    pub fn from_files(files: impl IntoIterator<Item = CatalogFile>) -> Result<Self, CatalogError> {
        let mut definitions = Vec::new();
        let mut schemas = IndexMap::new();
        for file in files {
            definitions.extend(file.definitions);
            for schema in file.schemas {
                let id = schema.schema_id.clone();
                if schemas.insert(id.clone(), Rc::new(schema)).is_some() {
                    return Err(CatalogError::DuplicateSchema { schema: id });
                }
            }
        }

        let scope = build_scope(definitions)?;
        let functions = schemas
            .values()
            .map(|schema| {
                let definition = FunctionDefinition::new(schema.clone(), &scope)
                    .map_err(|source| CatalogError::Schema { schema: schema.schema_id.clone(), source })?;
                Ok((schema.schema_id.clone(), Rc::new(definition)))
            })
            .collect::<Result<FunctionDefinitions, CatalogError>>()?;
        let passthrough = build_passthrough_map(functions.values().map(|d| d.as_ref()));

        debug!(schemas = schemas.len(), passthrough = passthrough.len(), "catalog loaded");
        Ok(Catalog { scope, schemas, functions, passthrough })
    }

    pub fn function(&self, schema: &SchemaId) -> Option<&Rc<FunctionDefinition>> {
        self.functions.get(schema)
    }
}

fn build_scope(definitions: Vec<DefinitionEntry>) -> Result<Rc<Scope>, CatalogError> {
    let mut builder = ScopeBuilder::new("catalog", Some(prelude()?));
    let mut variables = Vec::new();
    for entry in definitions {
        match entry {
            DefinitionEntry::Struct { name, fields } => {
                builder.add(StructDefinition { name, fields })?
            }
            DefinitionEntry::Alias { name, ty } => builder.add(AliasDefinition { name, ty })?,
            DefinitionEntry::Function { name, parameters, body } => builder.add(TypeFunctionDefinition {
                name,
                parameters: parameters.into_iter().map(|(name, ty)| FunctionParameter { name, ty }).collect(),
                body,
            })?,
            DefinitionEntry::Variable { name, value } => variables.push((name, value)),
        }
    }
    let definitions = builder.build();
    if variables.is_empty() {
        return Ok(definitions);
    }

    let empty = GenericParameters::new();
    let mut builder = ScopeBuilder::new("variables", Some(definitions.clone()));
    for (name, value) in variables {
        if definitions.get_local(&name).is_some() {
            return Err(DefinitionError::DuplicateName { name, scope: definitions.name().to_string() }.into());
        }
        let value = evaluate(&value, &definitions, &empty).map_err(|source| CatalogError::Variable { name: name.clone(), source })?;
        builder.add(VariableDefinition { name, value })?;
    }
    Ok(builder.build())
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::expr::Expression;
    use crate::types::{NumberType, Type};

    const CATALOG: &str = r#"{
        "definitions": [
            {"kind": "alias", "name": "Channels", "type": {"type": "field-access", "of": {"type": "named", "name": "Image"}, "field": "channels"}},
            {"kind": "struct", "name": "Image", "fields": {
                "width": {"type": "named", "name": "uint"},
                "height": {"type": "named", "name": "uint"},
                "channels": {"type": "int-interval", "min": 1, "max": "inf"}
            }},
            {"kind": "variable", "name": "RGB", "value": {"type": "named", "name": "Image", "fields": {
                "channels": {"type": "numeric-literal", "value": 3}
            }}},
            {"kind": "function", "name": "double", "parameters": {"x": {"type": "number"}}, "body": {
                "type": "function-call", "name": "number::mul", "args": [{"type": "named", "name": "x"}, {"type": "numeric-literal", "value": 2}]
            }}
        ],
        "schemas": [
            {
                "schemaId": "invert",
                "name": "Invert",
                "inputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Image"}}],
                "outputs": [{"id": 0, "label": "Image", "type": {"type": "named", "name": "Input0"}, "passthrough": "auto"}]
            }
        ]
    }"#;

    fn evaluate_in(catalog: &Catalog, expr: Expression) -> Type {
        evaluate(&expr, &catalog.scope, &GenericParameters::new()).unwrap()
    }

    #[test]
    fn definitions_may_refer_forward() {
        let catalog = Catalog::from_files([CatalogFile::parse(CATALOG).unwrap()]).unwrap();
        assert_eq!(
            evaluate_in(&catalog, Expression::named("Channels")),
            Type::Number(NumberType::int_interval(1.0, f64::INFINITY).unwrap())
        );
        let rgb = evaluate_in(&catalog, Expression::named("RGB"));
        assert_eq!(rgb.as_struct().and_then(|s| s.field("channels")), Some(&Type::literal(3.0)));
        assert_eq!(
            evaluate_in(&catalog, Expression::call("double", vec![Expression::Number(NumberType::literal(4.0))])),
            Type::literal(8.0)
        );
    }

    #[test]
    fn schemas_become_function_definitions() {
        let catalog = Catalog::from_files([CatalogFile::parse(CATALOG).unwrap()]).unwrap();
        let invert = catalog.function(&"invert".into()).unwrap();
        assert_eq!(invert.schema.name, "Invert");
        assert!(catalog.passthrough.contains_key(&SchemaId::from("invert")));
    }

    #[test]
    fn duplicate_schemas_are_rejected() {
        let file = CatalogFile::parse(CATALOG).unwrap();
        let err = Catalog::from_files([file.clone(), CatalogFile { definitions: Vec::new(), ..file }]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSchema { schema } if schema.0 == "invert"));
    }

    #[test]
    fn unknown_names_in_schemas_are_reported() {
        let src = r#"{"schemas": [{"schemaId": "x", "name": "X", "outputs": [
            {"id": 0, "label": "Out", "type": {"type": "named", "name": "Imag"}}
        ]}], "definitions": [{"kind": "struct", "name": "Image"}]}"#;
        let err = Catalog::from_files([CatalogFile::parse(src).unwrap()]).unwrap_err();
        match err {
            CatalogError::Schema { schema, source: EvaluationError::UnresolvedName(e) } => {
                assert_eq!(schema, SchemaId::from("x"));
                assert_eq!(e.suggestions.first().map(String::as_str), Some("Image"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn variables_cannot_shadow_definitions() {
        let src = r#"{"definitions": [
            {"kind": "struct", "name": "Image"},
            {"kind": "variable", "name": "Image", "value": {"type": "number"}}
        ]}"#;
        let err = Catalog::from_files([CatalogFile::parse(src).unwrap()]).unwrap_err();
        assert!(matches!(err, CatalogError::Definition(DefinitionError::DuplicateName { .. })));
    }

    #[test]
    fn repeated_struct_fields_are_rejected() {
        let err = CatalogFile::parse(
            r#"{"definitions": [{"kind": "struct", "name": "Image", "fields": {
                "width": {"type": "number"},
                "width": {"type": "string"}
            }}]}"#,
        )
        .unwrap_err();
        match err {
            CatalogError::Parse(e) => assert!(e.message.contains("duplicate field `width`"), "{e}"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn malformed_files_carry_a_path() {
        let err = CatalogFile::parse(r#"{"definitions": [{"kind": "alias", "name": "x", "type": {"type": "interval", "min": 2, "max": 1}}]}"#)
            .unwrap_err();
        match err {
            CatalogError::Parse(e) => assert!(e.path.starts_with("definitions[0]"), "{e}"),
            other => panic!("unexpected error {other}"),
        }
    }
}
