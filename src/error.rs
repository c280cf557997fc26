//! Error types shared across the crate.
//!
//! Algebra functions never fail. Everything that can fail does so at one of
//! three layers:
//! - scope construction (`DefinitionError`), which is a catalog bug;
//! - expression evaluation (`EvaluationError`), caught per node by the graph
//!   type state;
//! - decoding (`ParseError`), which always carries the JSON path.
use std::path::PathBuf;

use thiserror::Error;

use crate::graph::NodeId;
use crate::schema::SchemaId;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("`{name}` is already defined in scope `{scope}`")]
    DuplicateName { name: String, scope: String },
    #[error("`{name}` is not a valid identifier")]
    InvalidName { name: String },
    #[error("struct `{structure}` declares field `{field}` more than once")]
    DuplicateField { structure: String, field: String },
    #[error("function `{function}` declares parameter `{parameter}` more than once")]
    DuplicateParameter { function: String, parameter: String },
}

/// An identifier that is not visible from the evaluating scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown name `{name}`{}", render_suggestions(.suggestions))]
pub struct NameResolutionError {
    pub name: String,
    pub suggestions: Vec<String>,
}

fn render_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let list = suggestions
        .iter()
        .map(|s| format!("`{s}`"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" (did you mean {list}?)")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} bounds {min}..{max}")]
pub struct InvalidIntervalError {
    pub kind: &'static str,
    pub min: String,
    pub max: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterAssignmentError {
    #[error("cannot assign `{name}`: no such definition")]
    Missing { name: String },
    #[error("cannot assign `{name}`: it is not a parameter")]
    NotAParameter { name: String },
    #[error("cannot assign `{value}` to parameter `{name}`: not a subset of `{bound}`")]
    OutOfBounds { name: String, value: Type, bound: Type },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    UnresolvedName(#[from] NameResolutionError),
    #[error("`{name}` is defined in terms of itself")]
    RecursiveDefinition { name: String },
    #[error("`{name}` is not a type")]
    NotAType { name: String },
    #[error("`{name}` is not a function")]
    NotAFunction { name: String },
    #[error("`{name}` does not accept fields")]
    UnexpectedFields { name: String },
    #[error("struct `{structure}` has no field `{field}`")]
    UnknownField { structure: String, field: String },
    #[error("field `{field}` of `{structure}` is assigned more than once")]
    DuplicateFieldAssignment { structure: String, field: String },
    #[error("field `{field}` of `{structure}`: `{assigned}` is not assignable to `{declared}`")]
    FieldNotSubset {
        structure: String,
        field: String,
        assigned: Type,
        declared: Type,
    },
    #[error("cannot access field `{field}` of `any`")]
    FieldAccessOnAny { field: String },
    #[error("cannot access field `{field}` of non-struct type `{ty}`")]
    FieldAccessOnNonStruct { ty: Type, field: String },
    #[error("`{function}` expects {expected} argument(s) but got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },
    #[error("argument `{parameter}` of `{function}`: `{assigned}` is not assignable to `{expected}`")]
    InvalidArgument {
        function: String,
        parameter: String,
        assigned: Type,
        expected: Type,
    },
    #[error("`{expression}` cannot be evaluated without a scope")]
    NotStatic { expression: String },
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Parameter(#[from] ParameterAssignmentError),
    #[error("node `{node}` depends on itself")]
    Cycle { node: NodeId },
    #[error("node schema `{schema}` is not part of the catalog")]
    UnknownSchema { schema: SchemaId },
}

/// Decoding failure with the JSON path of the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at JSON path {path} → {message}")]
pub struct ParseError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog file {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error("variable `{name}`: {source}")]
    Variable {
        name: String,
        #[source]
        source: EvaluationError,
    },
    #[error("node schema `{schema}`: {source}")]
    Schema {
        schema: SchemaId,
        #[source]
        source: EvaluationError,
    },
    #[error("node schema `{schema}` is defined more than once")]
    DuplicateSchema { schema: SchemaId },
}
