//! Type expressions.
//!
//! An `Expression` is a `Type` plus the structural nodes a scope gives
//! meaning to: named references (with optional field assignments), union and
//! intersection of sub-expressions, field access, function calls and `match`.
//! Every `Type` lowers to an `Expression` that evaluates back to itself.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{NumberType, StringType, Type};

/// Wire representation lives in `wire`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "crate::wire::ExpressionJson", into = "crate::wire::ExpressionJson")]
pub enum Expression {
    Never,
    Any,
    Number(NumberType),
    String(StringType),
    Named(NamedExpression),
    Union(Vec<Expression>),
    Intersection(Vec<Expression>),
    FieldAccess { of: Box<Expression>, field: String },
    FunctionCall { name: String, args: Vec<Expression> },
    Match { of: Box<Expression>, arms: Vec<MatchArm> },
}

/// `Name` or `Name { field: expr, ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpression {
    pub name: String,
    pub fields: Vec<(String, Expression)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Expression,
    /// Name under which the matched part is visible in `body`.
    pub binding: Option<String>,
    pub body: Expression,
}

impl Expression {
    pub fn named(name: impl Into<String>) -> Self {
        Expression::Named(NamedExpression { name: name.into(), fields: Vec::new() })
    }

    pub fn named_with<N, I>(name: impl Into<String>, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Expression)>,
    {
        Expression::Named(NamedExpression {
            name: name.into(),
            fields: fields.into_iter().map(|(n, e)| (n.into(), e)).collect(),
        })
    }

    pub fn field(of: Expression, field: impl Into<String>) -> Self {
        Expression::FieldAccess { of: Box::new(of), field: field.into() }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::FunctionCall { name: name.into(), args }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Expression::Union(_) | Expression::Intersection(_) | Expression::Match { .. })
    }
}

// ---- lowering ----

impl From<&Type> for Expression {
    fn from(t: &Type) -> Self {
        match t {
            Type::Never => Expression::Never,
            Type::Any => Expression::Any,
            Type::Number(n) => Expression::Number(*n),
            Type::String(s) => Expression::String(s.clone()),
            Type::Struct(s) => Expression::named_with(
                s.name(),
                s.fields().iter().map(|f| (f.name.clone(), Expression::from(&f.ty))),
            ),
            Type::Union(u) => Expression::Union(u.items().iter().map(Expression::from).collect()),
        }
    }
}

impl From<Type> for Expression {
    fn from(t: Type) -> Self {
        Expression::from(&t)
    }
}

// ---- display ----

struct Operand<'a>(&'a Expression);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_compound() { write!(f, "({})", self.0) } else { write!(f, "{}", self.0) }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expression], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", Operand(item))?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Never => f.write_str("never"),
            Expression::Any => f.write_str("any"),
            Expression::Number(n) => write!(f, "{n}"),
            Expression::String(s) => write!(f, "{s}"),
            Expression::Named(named) => {
                f.write_str(&named.name)?;
                if named.fields.is_empty() {
                    return Ok(());
                }
                f.write_str(" { ")?;
                for (i, (name, value)) in named.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str(" }")
            }
            Expression::Union(items) if items.is_empty() => f.write_str("never"),
            Expression::Union(items) => join(f, items, " | "),
            Expression::Intersection(items) if items.is_empty() => f.write_str("any"),
            Expression::Intersection(items) => join(f, items, " & "),
            Expression::FieldAccess { of, field } => write!(f, "{}.{field}", Operand(of)),
            Expression::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expression::Match { of, arms } => {
                write!(f, "match {of} {{")?;
                for arm in arms {
                    write!(f, " {}", arm.pattern)?;
                    if let Some(binding) = &arm.binding {
                        write!(f, " as {binding}")?;
                    }
                    write!(f, " => {},", arm.body)?;
                }
                f.write_str(" }")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::union;
    use crate::types::{StructField, StructType};

    #[test]
    fn lowering_keeps_the_type_id() {
        let t = union([
            Type::literal(1.0),
            Type::string_literal("a"),
            StructType::new("Image", vec![StructField::new("channels", Type::literal(3.0))]),
        ]);
        assert_eq!(Expression::from(&t).to_string(), t.type_id());
    }

    #[test]
    fn nested_operators_are_parenthesized() {
        let e = Expression::Intersection(vec![
            Expression::Union(vec![Expression::named("A"), Expression::named("B")]),
            Expression::field(Expression::named("c"), "x"),
        ]);
        assert_eq!(e.to_string(), "(A | B) & c.x");

        let call = Expression::call("number::add", vec![Expression::named("a"), Expression::Number(NumberType::literal(1.0))]);
        assert_eq!(call.to_string(), "number::add(a, 1)");
    }

    #[test]
    fn match_display() {
        let e = Expression::Match {
            of: Box::new(Expression::named("x")),
            arms: vec![
                MatchArm { pattern: Expression::named("null"), binding: None, body: Expression::Never },
                MatchArm { pattern: Expression::Any, binding: Some("v".into()), body: Expression::named("v") },
            ],
        };
        assert_eq!(e.to_string(), "match x { null => never, any as v => v, }");
    }
}
