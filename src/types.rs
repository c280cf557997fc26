//! Type values of the structural type algebra.
//!
//! A `Type` denotes a set of values: numbers, strings, and named records
//! ("structs"). Values of this module are immutable and always canonical:
//! unions are only ever built by `algebra::union`, which sorts, deduplicates
//! and merges members, so two semantically equal types compare equal and
//! render to the same type id.
use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;

use crate::error::InvalidIntervalError;

pub type Num = OrderedFloat<f64>;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Never,
    Any,
    Number(NumberType),
    String(StringType),
    Struct(StructType),
    Union(UnionType),
}

/// Number primitives.
///
/// Variant order is the canonical order: literal < int-interval < interval < number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumberType {
    Literal(Num),
    /// Integer values (finite integers and ±inf) in `[min, max]`, `min < max`.
    IntInterval { min: Num, max: Num },
    /// Closed real range `[min, max]`, `min < max`. Never contains NaN.
    Interval { min: Num, max: Num },
    /// Every number, including NaN and ±inf.
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StringType {
    Literal(String),
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    name: String,
    fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

/// Canonical union: sorted, deduplicated, at least two value members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnionType {
    items: Vec<Type>,
}

/// Underlying kind of a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Number,
    String,
    Struct,
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTORS
// ————————————————————————————————————————————————————————————————————————————

/// Finite integers and the two infinities count as integer values.
pub fn is_int_value(v: f64) -> bool {
    v.is_infinite() || v.fract() == 0.0
}

fn num(v: f64) -> Num {
    // -0 and 0 are the same value for the algebra
    OrderedFloat(if v == 0.0 { 0.0 } else { v })
}

impl NumberType {
    pub fn literal(value: f64) -> Self {
        NumberType::Literal(num(value))
    }

    pub fn interval(min: f64, max: f64) -> Result<Self, InvalidIntervalError> {
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(InvalidIntervalError {
                kind: "interval",
                min: format_number(min),
                max: format_number(max),
            });
        }
        Ok(NumberType::Interval { min: num(min), max: num(max) })
    }

    pub fn int_interval(min: f64, max: f64) -> Result<Self, InvalidIntervalError> {
        if min.is_nan() || max.is_nan() || min >= max || !is_int_value(min) || !is_int_value(max) {
            return Err(InvalidIntervalError {
                kind: "int interval",
                min: format_number(min),
                max: format_number(max),
            });
        }
        Ok(NumberType::IntInterval { min: num(min), max: num(max) })
    }

    /// Closed real range; collapses to a literal when `min == max`.
    pub(crate) fn range(min: f64, max: f64) -> Option<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return None;
        }
        if min == max {
            return Some(NumberType::literal(min));
        }
        Some(NumberType::Interval { min: num(min), max: num(max) })
    }

    /// Integer values within `[min, max]`; non-integer bounds are rounded inwards.
    pub(crate) fn int_range(min: f64, max: f64) -> Option<Self> {
        if min.is_nan() || max.is_nan() {
            return None;
        }
        let min = if min.is_finite() { min.ceil() } else { min };
        let max = if max.is_finite() { max.floor() } else { max };
        if min > max {
            return None;
        }
        if min == max {
            return Some(NumberType::literal(min));
        }
        Some(NumberType::IntInterval { min: num(min), max: num(max) })
    }

    pub fn min(&self) -> f64 {
        match self {
            NumberType::Literal(v) => v.0,
            NumberType::IntInterval { min, .. } | NumberType::Interval { min, .. } => min.0,
            NumberType::Number => f64::NEG_INFINITY,
        }
    }

    pub fn max(&self) -> f64 {
        match self {
            NumberType::Literal(v) => v.0,
            NumberType::IntInterval { max, .. } | NumberType::Interval { max, .. } => max.0,
            NumberType::Number => f64::INFINITY,
        }
    }

    pub fn contains(&self, v: f64) -> bool {
        match self {
            NumberType::Literal(x) => *x == OrderedFloat(v),
            NumberType::IntInterval { min, max } => is_int_value(v) && min.0 <= v && v <= max.0,
            NumberType::Interval { min, max } => min.0 <= v && v <= max.0,
            NumberType::Number => true,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, NumberType::Literal(v) if v.0.is_nan())
    }

    /// Literal integers and int intervals.
    pub fn is_integer_set(&self) -> bool {
        match self {
            NumberType::Literal(v) => is_int_value(v.0),
            NumberType::IntInterval { .. } => true,
            _ => false,
        }
    }

    /// Number of members of a finite integer set (or 1 for any literal).
    pub fn finite_count(&self) -> Option<f64> {
        match self {
            NumberType::Literal(_) => Some(1.0),
            NumberType::IntInterval { min, max } if min.0.is_finite() && max.0.is_finite() => {
                Some(max.0 - min.0 + 1.0)
            }
            _ => None,
        }
    }

    /// Members of a finite integer set, or the literal itself.
    pub fn enumerate(&self) -> Option<Vec<f64>> {
        match self {
            NumberType::Literal(v) => Some(vec![v.0]),
            NumberType::IntInterval { min, max } if min.0.is_finite() && max.0.is_finite() => {
                let mut out = Vec::new();
                let mut v = min.0;
                while v <= max.0 {
                    out.push(v);
                    v += 1.0;
                }
                Some(out)
            }
            _ => None,
        }
    }
}

impl StructType {
    /// Builds a struct value; a struct with a `never` field is `never`.
    pub fn new(name: impl Into<String>, fields: Vec<StructField>) -> Type {
        if fields.iter().any(|f| f.ty.is_never()) {
            return Type::Never;
        }
        Type::Struct(StructType { name: name.into(), fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Same struct with the field at `index` replaced.
    pub fn with_field(&self, index: usize, ty: Type) -> Type {
        let mut fields = self.fields.clone();
        fields[index].ty = ty;
        StructType::new(self.name.clone(), fields)
    }

    /// Same-named structs must agree on field names and order.
    pub(crate) fn assert_same_shape(&self, other: &StructType) {
        let same = self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a.name == b.name);
        assert!(
            same,
            "struct `{}` appears with two different shapes: `{}` and `{}`",
            self.name,
            Type::Struct(self.clone()),
            Type::Struct(other.clone()),
        );
    }
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }
}

impl UnionType {
    /// Callers guarantee canonical members (see `algebra::union`).
    pub(crate) fn from_canonical(items: Vec<Type>) -> Self {
        debug_assert!(items.len() >= 2);
        debug_assert!(items.iter().all(Type::is_value));
        Self { items }
    }

    pub fn items(&self) -> &[Type] {
        &self.items
    }
}

impl Type {
    pub fn number() -> Self {
        Type::Number(NumberType::Number)
    }

    pub fn literal(value: f64) -> Self {
        Type::Number(NumberType::literal(value))
    }

    pub fn string() -> Self {
        Type::String(StringType::String)
    }

    pub fn string_literal(value: impl Into<String>) -> Self {
        Type::String(StringType::Literal(value.into()))
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// Numbers, strings and structs.
    pub fn is_value(&self) -> bool {
        matches!(self, Type::Number(_) | Type::String(_) | Type::Struct(_))
    }

    pub fn kind(&self) -> Option<Kind> {
        match self {
            Type::Number(_) => Some(Kind::Number),
            Type::String(_) => Some(Kind::String),
            Type::Struct(_) => Some(Kind::Struct),
            _ => None,
        }
    }

    /// Union members, the value itself, or nothing for `never`.
    pub fn members(&self) -> &[Type] {
        match self {
            Type::Never => &[],
            Type::Union(u) => u.items(),
            other => std::slice::from_ref(other),
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Stable textual identity; equal types always produce equal ids.
    pub fn type_id(&self) -> String {
        self.to_string()
    }

    fn rank(&self) -> u8 {
        match self {
            Type::Never => 0,
            Type::Number(_) => 1,
            Type::String(_) => 2,
            Type::Struct(_) => 3,
            Type::Union(_) => 4,
            Type::Any => 5,
        }
    }
}

impl From<NumberType> for Type {
    fn from(n: NumberType) -> Self {
        Type::Number(n)
    }
}

impl From<StringType> for Type {
    fn from(s: StringType) -> Self {
        Type::String(s)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CANONICAL ORDER
// ————————————————————————————————————————————————————————————————————————————

impl Ord for StructType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fields
            .len()
            .cmp(&other.fields.len())
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| {
                for (a, b) in self.fields.iter().zip(&other.fields) {
                    let ord = a.name.cmp(&b.name).then_with(|| a.ty.cmp(&b.ty));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            })
    }
}

impl PartialOrd for StructType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Type {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Type::Number(a), Type::Number(b)) => a.cmp(b),
            (Type::String(a), Type::String(b)) => a.cmp(b),
            (Type::Struct(a), Type::Struct(b)) => a.cmp(b),
            (Type::Union(a), Type::Union(b)) => a.items.cmp(&b.items),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Type {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DISPLAY (type ids)
// ————————————————————————————————————————————————————————————————————————————

/// Numbers as they appear in type ids; non-finite values use `inf`/`-inf`/`NaN`.
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{v}")
    }
}

impl fmt::Display for NumberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberType::Literal(v) => write!(f, "{}", format_number(v.0)),
            NumberType::IntInterval { min, max } => {
                write!(f, "int({}..{})", format_number(min.0), format_number(max.0))
            }
            NumberType::Interval { min, max } => {
                write!(f, "{}..{}", format_number(min.0), format_number(max.0))
            }
            NumberType::Number => write!(f, "number"),
        }
    }
}

impl fmt::Display for StringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringType::Literal(s) => write!(f, "{s:?}"),
            StringType::String => write!(f, "string"),
        }
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.fields.is_empty() {
            return Ok(());
        }
        write!(f, " {{ ")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.ty)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Never => write!(f, "never"),
            Type::Any => write!(f, "any"),
            Type::Number(n) => write!(f, "{n}"),
            Type::String(s) => write!(f, "{s}"),
            Type::Struct(s) => write!(f, "{s}"),
            Type::Union(u) => {
                for (i, item) in u.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
