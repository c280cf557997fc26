//! Scopes: immutable, parent-linked dictionaries of definitions.
//!
//! A scope is assembled through a `ScopeBuilder` and frozen into an
//! `Rc<Scope>`. Name resolution walks from the innermost scope outwards and
//! the first match wins. Aliases and structs memoize their resolved type in
//! their own entry the first time they are evaluated.
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use tracing::debug;

use crate::algebra::is_subset_of;
use crate::error::{DefinitionError, NameResolutionError, ParameterAssignmentError};
use crate::expr::Expression;
use crate::types::Type;

// ------------------------------- Policy ---------------------------------- //

const MAX_SUGGESTIONS: usize = 3;
const MIN_SIMILARITY: f64 = 0.2;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$").expect("identifier pattern is valid")
});

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

// ————————————————————————————————————————————————————————————————————————————
// DEFINITIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub enum Definition {
    Struct(StructDefinition),
    Alias(AliasDefinition),
    Variable(VariableDefinition),
    Function(TypeFunctionDefinition),
    Builtin(BuiltinFunctionDefinition),
    Parameter(ParameterDefinition),
}

#[derive(Debug, Clone)]
pub struct StructDefinition {
    pub name: String,
    pub fields: Vec<(String, Expression)>,
}

#[derive(Debug, Clone)]
pub struct AliasDefinition {
    pub name: String,
    pub ty: Expression,
}

/// A named, already evaluated type.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub value: Type,
}

/// User-defined function from types to a type.
#[derive(Debug, Clone)]
pub struct TypeFunctionDefinition {
    pub name: String,
    pub parameters: Vec<FunctionParameter>,
    pub body: Expression,
}

#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub name: String,
    pub ty: Expression,
}

pub type BuiltinImplementation = fn(&[Type]) -> Type;

#[derive(Debug, Clone)]
pub struct BuiltinFunctionDefinition {
    pub name: String,
    pub parameters: Vec<(String, Type)>,
    /// Type of every argument after the fixed parameters, if variadic.
    pub varargs: Option<Type>,
    pub implementation: BuiltinImplementation,
}

/// A slot bound to a value when a function body is evaluated.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    pub name: String,
    pub bound: Type,
    pub value: Option<Type>,
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Struct(d) => &d.name,
            Definition::Alias(d) => &d.name,
            Definition::Variable(d) => &d.name,
            Definition::Function(d) => &d.name,
            Definition::Builtin(d) => &d.name,
            Definition::Parameter(d) => &d.name,
        }
    }
}

impl From<StructDefinition> for Definition {
    fn from(d: StructDefinition) -> Self {
        Definition::Struct(d)
    }
}

impl From<AliasDefinition> for Definition {
    fn from(d: AliasDefinition) -> Self {
        Definition::Alias(d)
    }
}

impl From<VariableDefinition> for Definition {
    fn from(d: VariableDefinition) -> Self {
        Definition::Variable(d)
    }
}

impl From<TypeFunctionDefinition> for Definition {
    fn from(d: TypeFunctionDefinition) -> Self {
        Definition::Function(d)
    }
}

impl From<BuiltinFunctionDefinition> for Definition {
    fn from(d: BuiltinFunctionDefinition) -> Self {
        Definition::Builtin(d)
    }
}

impl From<ParameterDefinition> for Definition {
    fn from(d: ParameterDefinition) -> Self {
        Definition::Parameter(d)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCOPE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug)]
pub struct ScopeEntry {
    pub definition: Definition,
    /// Memoized resolution (alias target, struct skeleton).
    pub(crate) resolved: OnceCell<Type>,
    /// Set while the memoized resolution is being computed.
    pub(crate) resolving: Cell<bool>,
}

#[derive(Debug)]
pub struct Scope {
    name: String,
    parent: Option<Rc<Scope>>,
    entries: IndexMap<String, ScopeEntry>,
}

impl Scope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    pub fn get_local(&self, name: &str) -> Option<&ScopeEntry> {
        self.entries.get(name)
    }

    /// Walks outwards from `scope`; returns the owning scope with the entry.
    pub fn lookup<'a>(scope: &'a Rc<Scope>, name: &str) -> Option<(&'a Rc<Scope>, &'a ScopeEntry)> {
        let mut current = scope;
        loop {
            if let Some(entry) = current.entries.get(name) {
                return Some((current, entry));
            }
            current = current.parent.as_ref()?;
        }
    }

    /// Like `lookup`, but an unknown name becomes an error with suggestions.
    pub fn resolve<'a>(
        scope: &'a Rc<Scope>,
        name: &str,
    ) -> Result<(&'a Rc<Scope>, &'a ScopeEntry), NameResolutionError> {
        Scope::lookup(scope, name).ok_or_else(|| NameResolutionError {
            name: name.to_string(),
            suggestions: scope.suggestions(name),
        })
    }

    /// Every name visible from this scope, innermost first, shadowed names once.
    pub fn visible_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut current = Some(self);
        while let Some(scope) = current {
            for name in scope.entries.keys() {
                if seen.insert(name.as_str()) {
                    out.push(name.as_str());
                }
            }
            current = scope.parent.as_deref();
        }
        out
    }

    /// Up to three visible names similar to `name`, best first.
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let mut scored: Vec<(f64, &str)> = self
            .visible_names()
            .into_iter()
            .map(|candidate| (similarity(name, candidate), candidate))
            .filter(|(score, _)| *score > MIN_SIMILARITY)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().take(MAX_SUGGESTIONS).map(|(_, n)| n.to_string()).collect()
    }
}

// ---- similarity ----

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.to_lowercase().chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// F1 score of the bigram multisets of `a` and `b`.
fn similarity(a: &str, b: &str) -> f64 {
    let (xs, mut ys) = (bigrams(a), bigrams(b));
    if xs.is_empty() || ys.is_empty() {
        return if a.eq_ignore_ascii_case(b) { 1.0 } else { 0.0 };
    }
    let total_x = xs.len() as f64;
    let total_y = ys.len() as f64;
    let mut common = 0usize;
    for bigram in &xs {
        if let Some(i) = ys.iter().position(|y| y == bigram) {
            ys.swap_remove(i);
            common += 1;
        }
    }
    if common == 0 {
        return 0.0;
    }
    let precision = common as f64 / total_x;
    let recall = common as f64 / total_y;
    2.0 * precision * recall / (precision + recall)
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDER
// ————————————————————————————————————————————————————————————————————————————

pub struct ScopeBuilder {
    name: String,
    parent: Option<Rc<Scope>>,
    entries: IndexMap<String, ScopeEntry>,
}

impl ScopeBuilder {
    pub fn new(name: impl Into<String>, parent: Option<Rc<Scope>>) -> Self {
        Self { name: name.into(), parent, entries: IndexMap::new() }
    }

    pub fn add(&mut self, definition: impl Into<Definition>) -> Result<(), DefinitionError> {
        let definition = definition.into();
        let name = definition.name().to_string();
        if !is_valid_identifier(&name) {
            return Err(DefinitionError::InvalidName { name });
        }
        if self.entries.contains_key(&name) {
            return Err(DefinitionError::DuplicateName { name, scope: self.name.clone() });
        }
        match &definition {
            Definition::Struct(d) => {
                check_unique(d.fields.iter().map(|(f, _)| f.as_str()), |field| {
                    DefinitionError::DuplicateField { structure: name.clone(), field }
                })?;
            }
            Definition::Function(d) => {
                check_unique(d.parameters.iter().map(|p| p.name.as_str()), |parameter| {
                    DefinitionError::DuplicateParameter { function: name.clone(), parameter }
                })?;
            }
            Definition::Builtin(d) => {
                check_unique(d.parameters.iter().map(|(p, _)| p.as_str()), |parameter| {
                    DefinitionError::DuplicateParameter { function: name.clone(), parameter }
                })?;
            }
            _ => {}
        }
        self.entries.insert(name, ScopeEntry { definition, resolved: OnceCell::new(), resolving: Cell::new(false) });
        Ok(())
    }

    /// Binds a parameter declared in this builder.
    pub fn assign_parameter(&mut self, name: &str, value: Type) -> Result<(), ParameterAssignmentError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ParameterAssignmentError::Missing { name: name.to_string() })?;
        let Definition::Parameter(parameter) = &mut entry.definition else {
            return Err(ParameterAssignmentError::NotAParameter { name: name.to_string() });
        };
        if !is_subset_of(&value, &parameter.bound) {
            return Err(ParameterAssignmentError::OutOfBounds {
                name: name.to_string(),
                value,
                bound: parameter.bound.clone(),
            });
        }
        parameter.value = Some(value);
        Ok(())
    }

    pub fn build(self) -> Rc<Scope> {
        debug!(scope = %self.name, definitions = self.entries.len(), "scope built");
        Rc::new(Scope { name: self.name, parent: self.parent, entries: self.entries })
    }
}

fn check_unique<'a>(
    names: impl Iterator<Item = &'a str>,
    error: impl FnOnce(String) -> DefinitionError,
) -> Result<(), DefinitionError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(error(name.to_string()));
        }
    }
    Ok(())
}

// ------------------------------- Tests ------------------------------------ //
