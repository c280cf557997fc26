//! Human-readable explanations for assignment mismatches.
//!
//! - `simple_error`: one-line messages for the common shapes (channel counts,
//!   numeric ranges, number vs string)
//! - `generate_assignment_error_trace`: structural diff down to the first
//!   incompatible field
//! - `print_error_trace`: renders a trace, naming type groups instead of full
//!   structures when the groups alone explain the mismatch
use std::collections::BTreeSet;

use crate::algebra::is_disjoint_with;
use crate::types::{Kind, NumberType, Type, format_number};

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorTrace {
    /// Field `field` of `structure` is incompatible.
    Field { structure: String, field: String, inner: Box<ErrorTrace> },
    General { assigned: Type, declared: Type },
}

/// Best explanation available for assigning `assigned` to `declared`.
pub fn explain(assigned: &Type, declared: &Type) -> Option<String> {
    simple_error(assigned, declared).or_else(|| generate_assignment_error_trace(assigned, declared).map(|t| print_error_trace(&t)))
}

// ---- simple errors ----

pub fn simple_error(assigned: &Type, declared: &Type) -> Option<String> {
    if assigned.is_never() {
        return Some("No valid value reaches this input".to_string());
    }
    if !is_disjoint_with(assigned, declared) {
        return None;
    }
    if let Some(message) = channel_error(assigned, declared) {
        return Some(message);
    }

    let a = kinds(assigned)?;
    let d = kinds(declared)?;
    match (a.as_slice(), d.as_slice()) {
        ([Kind::Number], [Kind::String]) => Some("Expected a string but got a number".to_string()),
        ([Kind::String], [Kind::Number]) => Some("Expected a number but got a string".to_string()),
        ([Kind::Number], [Kind::Number]) => Some(match assigned {
            Type::Number(NumberType::Literal(v)) => {
                format!("The value {} is outside the allowed range {declared}", format_number(v.0))
            }
            _ => format!("The range {assigned} is outside the allowed range {declared}"),
        }),
        _ => None,
    }
}

fn kinds(t: &Type) -> Option<Vec<Kind>> {
    let set: BTreeSet<Kind> = t.members().iter().map(Type::kind).collect::<Option<_>>()?;
    Some(set.into_iter().collect())
}

/// Same-named structs that differ only in a `channels` field.
fn channel_error(assigned: &Type, declared: &Type) -> Option<String> {
    let a = assigned.as_struct()?;
    let d = declared.as_struct()?;
    if a.name() != d.name() {
        return None;
    }
    let got = a.field("channels")?;
    let expected = d.field("channels")?;
    if !is_disjoint_with(got, expected) {
        return None;
    }
    let others_fit = a
        .fields()
        .iter()
        .zip(d.fields())
        .filter(|(fa, _)| fa.name != "channels")
        .all(|(fa, fd)| !is_disjoint_with(&fa.ty, &fd.ty));
    if !others_fit {
        return None;
    }
    Some(format!(
        "The {} has {} channel(s) but {} channel(s) are required",
        a.name(),
        describe_count(got),
        describe_count(expected)
    ))
}

fn describe_count(t: &Type) -> String {
    let literals: Option<Vec<String>> = t
        .members()
        .iter()
        .map(|m| match m {
            Type::Number(NumberType::Literal(v)) => Some(format_number(v.0)),
            _ => None,
        })
        .collect();
    match (literals, t) {
        (Some(values), _) if !values.is_empty() => values.join(" or "),
        (_, Type::Number(NumberType::IntInterval { min, max })) if max.0 == f64::INFINITY => {
            format!("at least {}", format_number(min.0))
        }
        _ => t.to_string(),
    }
}

// ---- traces ----

/// `None` when some value of `assigned` fits `declared`.
pub fn generate_assignment_error_trace(assigned: &Type, declared: &Type) -> Option<ErrorTrace> {
    if !assigned.is_never() && !is_disjoint_with(assigned, declared) {
        return None;
    }
    let general = || ErrorTrace::General { assigned: assigned.clone(), declared: declared.clone() };

    let Some(a) = assigned.as_struct() else {
        return Some(general());
    };
    let mut same_name = declared.members().iter().filter_map(Type::as_struct).filter(|d| d.name() == a.name());
    let (Some(d), None) = (same_name.next(), same_name.next()) else {
        return Some(general());
    };
    for (fa, fd) in a.fields().iter().zip(d.fields()) {
        if is_disjoint_with(&fa.ty, &fd.ty) {
            let inner = generate_assignment_error_trace(&fa.ty, &fd.ty).unwrap_or_else(|| ErrorTrace::General {
                assigned: fa.ty.clone(),
                declared: fd.ty.clone(),
            });
            return Some(ErrorTrace::Field {
                structure: a.name().to_string(),
                field: fa.name.clone(),
                inner: Box::new(inner),
            });
        }
    }
    Some(general())
}

pub fn print_error_trace(trace: &ErrorTrace) -> String {
    match trace {
        ErrorTrace::General { assigned, declared } => print_general(assigned, declared),
        ErrorTrace::Field { structure, .. } => {
            let mut path = vec![structure.as_str()];
            let mut current = trace;
            while let ErrorTrace::Field { field, inner, .. } = current {
                path.push(field);
                current = inner;
            }
            format!("{}: {}", path.join("."), print_error_trace(current))
        }
    }
}

fn print_general(assigned: &Type, declared: &Type) -> String {
    match (groups(assigned), groups(declared)) {
        (Some(a), Some(d)) if a.is_disjoint(&d) => {
            format!("{} is not assignable to {}", join(&a), join(&d))
        }
        _ => format!("`{assigned}` is not assignable to `{declared}`"),
    }
}

/// Short group names (`number`, `string`, struct names) of every member.
fn groups(t: &Type) -> Option<BTreeSet<String>> {
    if t.is_never() {
        return None;
    }
    t.members()
        .iter()
        .map(|m| match m {
            Type::Number(_) => Some("number".to_string()),
            Type::String(_) => Some("string".to_string()),
            Type::Struct(s) => Some(s.name().to_string()),
            _ => None,
        })
        .collect()
}

fn join(groups: &BTreeSet<String>) -> String {
    groups.iter().map(String::as_str).collect::<Vec<_>>().join(" | ")
}

// ------------------------------- Tests ------------------------------------ //
