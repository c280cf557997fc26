//! JSON wire format for type expressions.
//!
//! A tree of objects tagged by `"type"`:
//! - `never`, `any`, `number`, `string`
//! - `numeric-literal {value}`, `interval {min, max}`, `int-interval {min, max}`
//! - `string-literal {value}`
//! - `named {name, fields?}`, `union {items}`, `intersection {items}`
//! - `field-access {of, field}`, `function-call {name, args}`
//! - `match {of, arms: [{pattern, binding?, body}]}`
//!
//! Non-finite numbers are written as the strings `"inf"`, `"-inf"` and `"NaN"`
//! so every expression round-trips losslessly.
use serde::{Deserialize, Serialize};

use crate::error::{InvalidIntervalError, ParseError};
use crate::expr::{Expression, MatchArm, NamedExpression};
use crate::path_de;
use crate::types::{NumberType, StringType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum ExpressionJson {
    Never,
    Any,
    Number,
    NumericLiteral {
        #[serde(with = "sentinel")]
        value: f64,
    },
    Interval {
        #[serde(with = "sentinel")]
        min: f64,
        #[serde(with = "sentinel")]
        max: f64,
    },
    IntInterval {
        #[serde(with = "sentinel")]
        min: f64,
        #[serde(with = "sentinel")]
        max: f64,
    },
    String,
    StringLiteral {
        value: String,
    },
    Named {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty", with = "unique_fields")]
        fields: Vec<(String, Expression)>,
    },
    Union {
        items: Vec<Expression>,
    },
    Intersection {
        items: Vec<Expression>,
    },
    FieldAccess {
        of: Box<Expression>,
        field: String,
    },
    FunctionCall {
        name: String,
        #[serde(default)]
        args: Vec<Expression>,
    },
    Match {
        of: Box<Expression>,
        arms: Vec<MatchArmJson>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MatchArmJson {
    pattern: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    binding: Option<String>,
    body: Expression,
}

impl TryFrom<ExpressionJson> for Expression {
    type Error = InvalidIntervalError;

    fn try_from(json: ExpressionJson) -> Result<Self, Self::Error> {
        Ok(match json {
            ExpressionJson::Never => Expression::Never,
            ExpressionJson::Any => Expression::Any,
            ExpressionJson::Number => Expression::Number(NumberType::Number),
            ExpressionJson::NumericLiteral { value } => Expression::Number(NumberType::literal(value)),
            ExpressionJson::Interval { min, max } => Expression::Number(NumberType::interval(min, max)?),
            ExpressionJson::IntInterval { min, max } => Expression::Number(NumberType::int_interval(min, max)?),
            ExpressionJson::String => Expression::String(StringType::String),
            ExpressionJson::StringLiteral { value } => Expression::String(StringType::Literal(value)),
            ExpressionJson::Named { name, fields } => {
                Expression::Named(NamedExpression { name, fields })
            }
            ExpressionJson::Union { items } => Expression::Union(items),
            ExpressionJson::Intersection { items } => Expression::Intersection(items),
            ExpressionJson::FieldAccess { of, field } => Expression::FieldAccess { of, field },
            ExpressionJson::FunctionCall { name, args } => Expression::FunctionCall { name, args },
            ExpressionJson::Match { of, arms } => Expression::Match {
                of,
                arms: arms
                    .into_iter()
                    .map(|a| MatchArm { pattern: a.pattern, binding: a.binding, body: a.body })
                    .collect(),
            },
        })
    }
}

impl From<Expression> for ExpressionJson {
    fn from(e: Expression) -> Self {
        match e {
            Expression::Never => ExpressionJson::Never,
            Expression::Any => ExpressionJson::Any,
            Expression::Number(n) => match n {
                NumberType::Literal(v) => ExpressionJson::NumericLiteral { value: v.0 },
                NumberType::IntInterval { min, max } => ExpressionJson::IntInterval { min: min.0, max: max.0 },
                NumberType::Interval { min, max } => ExpressionJson::Interval { min: min.0, max: max.0 },
                NumberType::Number => ExpressionJson::Number,
            },
            Expression::String(StringType::String) => ExpressionJson::String,
            Expression::String(StringType::Literal(value)) => ExpressionJson::StringLiteral { value },
            Expression::Named(named) => ExpressionJson::Named { name: named.name, fields: named.fields },
            Expression::Union(items) => ExpressionJson::Union { items },
            Expression::Intersection(items) => ExpressionJson::Intersection { items },
            Expression::FieldAccess { of, field } => ExpressionJson::FieldAccess { of, field },
            Expression::FunctionCall { name, args } => ExpressionJson::FunctionCall { name, args },
            Expression::Match { of, arms } => ExpressionJson::Match {
                of,
                arms: arms
                    .into_iter()
                    .map(|a| MatchArmJson { pattern: a.pattern, binding: a.binding, body: a.body })
                    .collect(),
            },
        }
    }
}

/// `f64` with `"inf"`/`"-inf"`/`"NaN"` for the values JSON cannot hold.
mod sentinel {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::format_number;

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() { s.serialize_f64(*v) } else { s.serialize_str(&format_number(*v)) }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(t) => match t.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(D::Error::custom(format!(
                    "expected a number or one of \"inf\", \"-inf\", \"NaN\", found {other:?}"
                ))),
            },
        }
    }
}

/// Object entries kept in order; a repeated key is rejected instead of
/// overwriting the earlier entry.
pub(crate) mod unique_fields {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{Error as _, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<T: Serialize, S: Serializer>(fields: &Vec<(String, T)>, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(fields.len()))?;
        for (name, value) in fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<Vec<(String, T)>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        struct Entries<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for Entries<T> {
            type Value = Vec<(String, T)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut out: Vec<(String, T)> = Vec::new();
                while let Some((name, value)) = map.next_entry::<String, T>()? {
                    if out.iter().any(|(existing, _)| *existing == name) {
                        return Err(A::Error::custom(format!("duplicate field `{name}`")));
                    }
                    out.push((name, value));
                }
                Ok(out)
            }
        }

        d.deserialize_map(Entries(PhantomData))
    }
}

// ---- entry points ----

pub fn parse_expression(src: &str) -> Result<Expression, ParseError> {
    path_de::from_str_with_path(src)
}

pub fn expression_from_value(value: serde_json::Value) -> Result<Expression, ParseError> {
    path_de::from_value_with_path(value)
}

pub fn expression_to_value(expr: &Expression) -> serde_json::Value {
    // ExpressionJson only holds strings, numbers and nested objects
    serde_json::to_value(expr).unwrap_or(serde_json::Value::Null)
}

// ------------------------------- Tests ------------------------------------ //
