//! Expression evaluation against a scope.
//!
//! `evaluate` turns an `Expression` into a canonical `Type`:
//! - names resolve against the generic parameters first, then the scope chain;
//! - aliases and struct skeletons are resolved once per scope entry, in the
//!   scope that defines them;
//! - struct field assignments, call arguments and patterns are evaluated in
//!   the caller's scope with the caller's generics;
//! - function bodies see only their parameters (and everything visible from
//!   the defining scope).
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::algebra::{intersect, is_subset_of, union, without};
use crate::error::EvaluationError;
use crate::expr::{Expression, MatchArm, NamedExpression};
use crate::scope::{
    BuiltinFunctionDefinition, Definition, ParameterDefinition, Scope, ScopeBuilder, ScopeEntry, StructDefinition,
    TypeFunctionDefinition,
};
use crate::types::{StructField, StructType, Type};

/// Name → type bindings that shadow the scope (e.g. node inputs, match bindings).
pub type GenericParameters = IndexMap<String, Type>;

pub fn evaluate(expr: &Expression, scope: &Rc<Scope>, generics: &GenericParameters) -> Result<Type, EvaluationError> {
    match expr {
        Expression::Never => Ok(Type::Never),
        Expression::Any => Ok(Type::Any),
        Expression::Number(n) => Ok(Type::Number(*n)),
        Expression::String(s) => Ok(Type::String(s.clone())),
        Expression::Union(items) => Ok(union(evaluate_all(items, scope, generics)?)),
        Expression::Intersection(items) => Ok(intersect(evaluate_all(items, scope, generics)?)),
        Expression::Named(named) => evaluate_named(named, scope, generics),
        Expression::FieldAccess { of, field } => field_access(&evaluate(of, scope, generics)?, field),
        Expression::FunctionCall { name, args } => call(name, args, scope, generics),
        Expression::Match { of, arms } => evaluate_match(of, arms, scope, generics),
    }
}

/// Evaluates expressions that need no scope: primitives, unions and intersections.
pub fn static_evaluate(expr: &Expression) -> Result<Type, EvaluationError> {
    match expr {
        Expression::Never => Ok(Type::Never),
        Expression::Any => Ok(Type::Any),
        Expression::Number(n) => Ok(Type::Number(*n)),
        Expression::String(s) => Ok(Type::String(s.clone())),
        Expression::Union(items) => Ok(union(items.iter().map(static_evaluate).collect::<Result<Vec<_>, _>>()?)),
        Expression::Intersection(items) => {
            Ok(intersect(items.iter().map(static_evaluate).collect::<Result<Vec<_>, _>>()?))
        }
        other => Err(EvaluationError::NotStatic { expression: other.to_string() }),
    }
}

fn evaluate_all(
    items: &[Expression],
    scope: &Rc<Scope>,
    generics: &GenericParameters,
) -> Result<Vec<Type>, EvaluationError> {
    items.iter().map(|e| evaluate(e, scope, generics)).collect()
}

// ---- names ----

fn evaluate_named(
    named: &NamedExpression,
    scope: &Rc<Scope>,
    generics: &GenericParameters,
) -> Result<Type, EvaluationError> {
    let no_fields = || {
        if named.fields.is_empty() {
            Ok(())
        } else {
            Err(EvaluationError::UnexpectedFields { name: named.name.clone() })
        }
    };

    if let Some(t) = generics.get(&named.name) {
        no_fields()?;
        return Ok(t.clone());
    }

    let (owner, entry) = Scope::resolve(scope, &named.name)?;
    match &entry.definition {
        Definition::Alias(alias) => {
            no_fields()?;
            memoized(entry, &alias.name, || evaluate(&alias.ty, owner, &GenericParameters::new()))
        }
        Definition::Variable(variable) => {
            no_fields()?;
            Ok(variable.value.clone())
        }
        Definition::Parameter(parameter) => {
            no_fields()?;
            Ok(parameter.value.clone().unwrap_or_else(|| parameter.bound.clone()))
        }
        Definition::Struct(definition) => {
            let skeleton = memoized(entry, &definition.name, || struct_skeleton(definition, owner))?;
            if named.fields.is_empty() {
                return Ok(skeleton);
            }
            match &skeleton {
                Type::Struct(declared) => assign_fields(declared, &named.fields, scope, generics),
                // a struct with a `never` field has no values to narrow
                _ => Ok(skeleton),
            }
        }
        Definition::Function(_) | Definition::Builtin(_) => {
            Err(EvaluationError::NotAType { name: named.name.clone() })
        }
    }
}

/// Resolves an entry once; re-entering the same entry is a recursive definition.
fn memoized(
    entry: &ScopeEntry,
    name: &str,
    init: impl FnOnce() -> Result<Type, EvaluationError>,
) -> Result<Type, EvaluationError> {
    if let Some(t) = entry.resolved.get() {
        return Ok(t.clone());
    }
    if entry.resolving.replace(true) {
        return Err(EvaluationError::RecursiveDefinition { name: name.to_string() });
    }
    let result = init();
    entry.resolving.set(false);
    let t = result?;
    Ok(entry.resolved.get_or_init(|| t).clone())
}

fn struct_skeleton(definition: &StructDefinition, owner: &Rc<Scope>) -> Result<Type, EvaluationError> {
    let empty = GenericParameters::new();
    let fields = definition
        .fields
        .iter()
        .map(|(name, expr)| Ok(StructField::new(name.clone(), evaluate(expr, owner, &empty)?)))
        .collect::<Result<Vec<_>, EvaluationError>>()?;
    Ok(StructType::new(definition.name.clone(), fields))
}

fn assign_fields(
    declared: &StructType,
    assignments: &[(String, Expression)],
    scope: &Rc<Scope>,
    generics: &GenericParameters,
) -> Result<Type, EvaluationError> {
    let mut fields = declared.fields().to_vec();
    let mut seen = HashSet::new();
    for (name, expr) in assignments {
        let index = declared.field_index(name).ok_or_else(|| EvaluationError::UnknownField {
            structure: declared.name().to_string(),
            field: name.clone(),
        })?;
        if !seen.insert(name.as_str()) {
            return Err(EvaluationError::DuplicateFieldAssignment {
                structure: declared.name().to_string(),
                field: name.clone(),
            });
        }
        let value = evaluate(expr, scope, generics)?;
        let field = &mut fields[index];
        if !is_subset_of(&value, &field.ty) {
            return Err(EvaluationError::FieldNotSubset {
                structure: declared.name().to_string(),
                field: name.clone(),
                assigned: value,
                declared: field.ty.clone(),
            });
        }
        field.ty = value;
    }
    Ok(StructType::new(declared.name(), fields))
}

// ---- field access ----

pub fn field_access(of: &Type, field: &str) -> Result<Type, EvaluationError> {
    match of {
        Type::Never => Ok(Type::Never),
        Type::Any => Err(EvaluationError::FieldAccessOnAny { field: field.to_string() }),
        _ => {
            let values = of
                .members()
                .iter()
                .map(|member| match member {
                    Type::Struct(s) => s.field(field).cloned().ok_or_else(|| EvaluationError::UnknownField {
                        structure: s.name().to_string(),
                        field: field.to_string(),
                    }),
                    other => Err(EvaluationError::FieldAccessOnNonStruct { ty: other.clone(), field: field.to_string() }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(union(values))
        }
    }
}

// ---- calls ----

fn call(
    name: &str,
    args: &[Expression],
    scope: &Rc<Scope>,
    generics: &GenericParameters,
) -> Result<Type, EvaluationError> {
    let (owner, entry) = Scope::resolve(scope, name)?;
    match &entry.definition {
        Definition::Builtin(builtin) => call_builtin(builtin, args, scope, generics),
        Definition::Function(function) => call_function(function, owner, args, scope, generics),
        _ => Err(EvaluationError::NotAFunction { name: name.to_string() }),
    }
}

fn call_builtin(
    builtin: &BuiltinFunctionDefinition,
    args: &[Expression],
    scope: &Rc<Scope>,
    generics: &GenericParameters,
) -> Result<Type, EvaluationError> {
    let fixed = builtin.parameters.len();
    let arity_ok = match builtin.varargs {
        Some(_) => args.len() >= fixed,
        None => args.len() == fixed,
    };
    if !arity_ok {
        let expected = match builtin.varargs {
            Some(_) => format!("at least {fixed}"),
            None => format!("{fixed}"),
        };
        return Err(EvaluationError::ArgumentCount { function: builtin.name.clone(), expected, actual: args.len() });
    }

    let values = evaluate_all(args, scope, generics)?;
    let any = Type::Any;
    for (i, value) in values.iter().enumerate() {
        let (parameter, expected) = match builtin.parameters.get(i) {
            Some((p, t)) => (p.clone(), t),
            None => (format!("#{i}"), builtin.varargs.as_ref().unwrap_or(&any)),
        };
        if !is_subset_of(value, expected) {
            return Err(EvaluationError::InvalidArgument {
                function: builtin.name.clone(),
                parameter,
                assigned: value.clone(),
                expected: expected.clone(),
            });
        }
    }
    if values.iter().any(Type::is_never) {
        return Ok(Type::Never);
    }
    Ok((builtin.implementation)(&values))
}

fn call_function(
    function: &TypeFunctionDefinition,
    owner: &Rc<Scope>,
    args: &[Expression],
    scope: &Rc<Scope>,
    generics: &GenericParameters,
) -> Result<Type, EvaluationError> {
    if args.len() != function.parameters.len() {
        return Err(EvaluationError::ArgumentCount {
            function: function.name.clone(),
            expected: function.parameters.len().to_string(),
            actual: args.len(),
        });
    }

    let values = evaluate_all(args, scope, generics)?;
    let empty = GenericParameters::new();
    let mut body_scope = ScopeBuilder::new(format!("{}()", function.name), Some(owner.clone()));
    for (parameter, value) in function.parameters.iter().zip(values.iter()) {
        let bound = evaluate(&parameter.ty, owner, &empty)?;
        if !is_subset_of(value, &bound) {
            return Err(EvaluationError::InvalidArgument {
                function: function.name.clone(),
                parameter: parameter.name.clone(),
                assigned: value.clone(),
                expected: bound,
            });
        }
        body_scope.add(ParameterDefinition { name: parameter.name.clone(), bound, value: None })?;
        body_scope.assign_parameter(&parameter.name, value.clone())?;
    }
    if values.iter().any(Type::is_never) {
        return Ok(Type::Never);
    }
    evaluate(&function.body, &body_scope.build(), &empty)
}

// ---- match ----

fn evaluate_match(
    of: &Expression,
    arms: &[MatchArm],
    scope: &Rc<Scope>,
    generics: &GenericParameters,
) -> Result<Type, EvaluationError> {
    let mut rest = evaluate(of, scope, generics)?;
    let mut results = Vec::new();
    for arm in arms {
        let pattern = evaluate(&arm.pattern, scope, generics)?;
        let matched = intersect([rest.clone(), pattern.clone()]);
        if !matched.is_never() {
            let body = match &arm.binding {
                Some(binding) => {
                    let mut bound = generics.clone();
                    bound.insert(binding.clone(), matched);
                    evaluate(&arm.body, scope, &bound)?
                }
                None => evaluate(&arm.body, scope, generics)?,
            };
            results.push(body);
        }
        rest = without(&rest, &pattern);
    }
    Ok(union(results))
}

// ------------------------------- Tests ------------------------------------ //
