//! The prelude scope: core structs, aliases and builtin type functions.
use std::rc::Rc;

use ordered_float::OrderedFloat;

use crate::arith;
use crate::error::DefinitionError;
use crate::expr::Expression;
use crate::scope::{AliasDefinition, BuiltinFunctionDefinition, BuiltinImplementation, Scope, ScopeBuilder, StructDefinition};
use crate::types::{NumberType, StringType, StructType, Type};

pub const NULL: &str = "null";
pub const ERROR: &str = "Error";

pub fn null_type() -> Type {
    StructType::new(NULL, Vec::new())
}

/// Builds the root scope every catalog scope hangs off.
pub fn prelude() -> Result<Rc<Scope>, DefinitionError> {
    let mut b = ScopeBuilder::new("prelude", None);

    for name in [NULL, "true", "false"] {
        b.add(StructDefinition { name: name.into(), fields: Vec::new() })?;
    }
    b.add(StructDefinition {
        name: ERROR.into(),
        fields: vec![("message".into(), Expression::String(StringType::String))],
    })?;

    let alias = |name: &str, ty: Expression| AliasDefinition { name: name.into(), ty };
    b.add(alias("bool", Expression::Union(vec![Expression::named("true"), Expression::named("false")])))?;
    b.add(alias("int", Expression::Number(int_from(f64::NEG_INFINITY))))?;
    b.add(alias("uint", Expression::Number(int_from(0.0))))?;
    b.add(alias(
        "real",
        Expression::Number(NumberType::Interval {
            min: OrderedFloat(f64::NEG_INFINITY),
            max: OrderedFloat(f64::INFINITY),
        }),
    ))?;

    let number = Type::number();
    let string = Type::string();
    let unary = |name: &str, implementation: BuiltinImplementation| builtin(name, &["a"], &number, None, implementation);
    let binary = |name: &str, implementation: BuiltinImplementation| builtin(name, &["a", "b"], &number, None, implementation);
    let variadic = |name: &str, implementation: BuiltinImplementation| {
        builtin(name, &["a"], &number, Some(number.clone()), implementation)
    };

    b.add(variadic("number::add", |args| fold(args, arith::add)))?;
    b.add(variadic("number::mul", |args| fold(args, arith::multiply)))?;
    b.add(variadic("number::min", |args| fold(args, arith::min)))?;
    b.add(variadic("number::max", |args| fold(args, arith::max)))?;
    b.add(unary("number::neg", |args| arith::negate(&args[0])))?;
    b.add(unary("number::rec", |args| arith::reciprocal(&args[0])))?;
    b.add(unary("number::round", |args| arith::round(&args[0])))?;
    b.add(binary("number::sub", |args| arith::subtract(&args[0], &args[1])))?;
    b.add(binary("number::div", |args| arith::divide(&args[0], &args[1])))?;
    b.add(builtin("string::concat", &[], &string, Some(string.clone()), concat))?;

    Ok(b.build())
}

fn int_from(min: f64) -> NumberType {
    NumberType::IntInterval { min: OrderedFloat(min), max: OrderedFloat(f64::INFINITY) }
}

fn builtin(
    name: &str,
    parameters: &[&str],
    ty: &Type,
    varargs: Option<Type>,
    implementation: BuiltinImplementation,
) -> BuiltinFunctionDefinition {
    BuiltinFunctionDefinition {
        name: name.to_string(),
        parameters: parameters.iter().map(|p| (p.to_string(), ty.clone())).collect(),
        varargs,
        implementation,
    }
}

/// Left fold; callers guarantee at least one argument.
fn fold(args: &[Type], op: fn(&Type, &Type) -> Type) -> Type {
    match args.split_first() {
        Some((first, rest)) => rest.iter().fold(first.clone(), |acc, t| op(&acc, t)),
        None => Type::Never,
    }
}

/// Concatenation of string literals; anything wider is `string`.
fn concat(args: &[Type]) -> Type {
    let mut out = String::new();
    for arg in args {
        match arg {
            Type::String(StringType::Literal(s)) => out.push_str(s),
            _ => return Type::string(),
        }
    }
    Type::string_literal(out)
}
