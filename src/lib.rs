//! Structural type algebra and type propagation for node graphs.
//!
//! - `types`, `algebra`, `arith`: the type values and operations on them
//! - `expr`, `wire`, `scope`, `builtins`, `eval`: type expressions and their evaluation
//! - `schema`, `function`, `explain`: node schemas bound to concrete types
//! - `graph`, `type_state`, `validity`: per-graph resolution and checking
//! - `catalog`: loading definitions and schemas from JSON
pub mod algebra;
pub mod arith;
pub mod builtins;
pub mod catalog;
pub mod error;
pub mod eval;
pub mod explain;
pub mod expr;
pub mod function;
pub mod graph;
pub mod path_de;
pub mod schema;
pub mod scope;
pub mod type_state;
pub mod types;
pub mod validity;
pub mod wire;
