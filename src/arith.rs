//! Numeric arithmetic lifted over unions.
//!
//! Every operation works member-wise: unary ops map each number member,
//! binary ops take the cartesian product of members, and the results are
//! re-unioned. `never` propagates, `any` is treated as `number`, non-number
//! members are ignored (callers check argument types first).
//!
//! Results are exact for literals and small integer sets and a superset
//! otherwise. NaN-producing combinations (`0 * inf`, `inf + -inf`, `x / 0`)
//! union in `NaN` explicitly.
use crate::algebra::union;
use crate::types::{NumberType, Type, is_int_value};

// ------------------------------- Policy ---------------------------------- //

/// Max number of combinations expanded pointwise into a literal union.
const MAX_POINTWISE: f64 = 10.0;

// ------------------------------ Views ------------------------------------ //

#[derive(Debug, Clone, Copy)]
struct Range {
    min: f64,
    max: f64,
    int: bool,
}

impl Range {
    fn contains_zero(&self) -> bool {
        self.min <= 0.0 && 0.0 <= self.max
    }

    fn is_unbounded(&self) -> bool {
        self.min.is_infinite() || self.max.is_infinite()
    }

    fn has_finite_value(&self) -> bool {
        !(self.min == self.max && self.min.is_infinite())
    }
}

/// Non-NaN part as a closed range, plus whether NaN is included.
fn view(n: &NumberType) -> (Option<Range>, bool) {
    match n {
        NumberType::Literal(v) if v.0.is_nan() => (None, true),
        NumberType::Literal(v) => (Some(Range { min: v.0, max: v.0, int: is_int_value(v.0) }), false),
        NumberType::IntInterval { min, max } => (Some(Range { min: min.0, max: max.0, int: true }), false),
        NumberType::Interval { min, max } => (Some(Range { min: min.0, max: max.0, int: false }), false),
        NumberType::Number => {
            let real = Range { min: f64::NEG_INFINITY, max: f64::INFINITY, int: false };
            (Some(real), true)
        }
    }
}

fn numbers(t: &Type) -> Vec<NumberType> {
    match t {
        Type::Any => vec![NumberType::Number],
        other => other
            .members()
            .iter()
            .filter_map(|m| match m {
                Type::Number(n) => Some(*n),
                _ => None,
            })
            .collect(),
    }
}

fn nan() -> Type {
    Type::literal(f64::NAN)
}

/// Range over the non-NaN candidates; `None` if every candidate is NaN.
fn hull(candidates: &[f64], int: bool) -> Option<Type> {
    let mut valid = candidates.iter().copied().filter(|v| !v.is_nan());
    let first = valid.next()?;
    let (lo, hi) = valid.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let n = if int { NumberType::int_range(lo, hi) } else { NumberType::range(lo, hi) };
    n.map(Type::Number)
}

fn with_nan(t: Option<Type>, nan_reachable: bool) -> Type {
    union(t.into_iter().chain(nan_reachable.then(nan)))
}

// ------------------------------ Lifting ---------------------------------- //

fn lift_unary(t: &Type, f: impl Fn(&NumberType) -> Type) -> Type {
    union(numbers(t).iter().map(f))
}

fn lift_binary(a: &Type, b: &Type, f: impl Fn(&NumberType, &NumberType) -> Type) -> Type {
    let xs = numbers(a);
    let ys = numbers(b);
    union(xs.iter().flat_map(|x| ys.iter().map(|y| f(x, y)).collect::<Vec<_>>()))
}

/// Every combination of members of two small finite sets.
fn pointwise(a: &NumberType, b: &NumberType, f: impl Fn(f64, f64) -> f64) -> Option<Type> {
    let count = a.finite_count()? * b.finite_count()?;
    if count > MAX_POINTWISE {
        return None;
    }
    let xs = a.enumerate()?;
    let ys = b.enumerate()?;
    Some(union(xs.iter().flat_map(|x| ys.iter().map(|y| Type::literal(f(*x, *y))).collect::<Vec<_>>())))
}

/// Every member of one small finite set.
fn pointwise_unary(a: &NumberType, f: impl Fn(f64) -> f64) -> Option<Type> {
    if a.finite_count()? > MAX_POINTWISE {
        return None;
    }
    Some(union(a.enumerate()?.into_iter().map(|x| Type::literal(f(x)))))
}

// ------------------------------ Operations ------------------------------- //

pub fn add(a: &Type, b: &Type) -> Type {
    lift_binary(a, b, add_number)
}

fn add_number(a: &NumberType, b: &NumberType) -> Type {
    if let Some(t) = pointwise(a, b, |x, y| x + y) {
        return t;
    }
    let ((ra, na), (rb, nb)) = (view(a), view(b));
    let (Some(ra), Some(rb)) = (ra, rb) else {
        return nan();
    };
    let opposite_infinities = (ra.min == f64::NEG_INFINITY && rb.max == f64::INFINITY)
        || (ra.max == f64::INFINITY && rb.min == f64::NEG_INFINITY);
    let candidates = [ra.min + rb.min, ra.min + rb.max, ra.max + rb.min, ra.max + rb.max];
    with_nan(hull(&candidates, ra.int && rb.int), na || nb || opposite_infinities)
}

pub fn negate(a: &Type) -> Type {
    lift_unary(a, |n| match view(n) {
        (None, _) => nan(),
        (Some(r), has_nan) => with_nan(hull(&[-r.max, -r.min], r.int), has_nan),
    })
}

pub fn subtract(a: &Type, b: &Type) -> Type {
    add(a, &negate(b))
}

pub fn multiply(a: &Type, b: &Type) -> Type {
    lift_binary(a, b, multiply_number)
}

fn multiply_number(a: &NumberType, b: &NumberType) -> Type {
    if let Some(t) = pointwise(a, b, |x, y| x * y) {
        return t;
    }
    let ((ra, na), (rb, nb)) = (view(a), view(b));
    let (Some(ra), Some(rb)) = (ra, rb) else {
        return nan();
    };
    let zero_times_infinity =
        (ra.contains_zero() && rb.is_unbounded()) || (rb.contains_zero() && ra.is_unbounded());
    let mut candidates = vec![ra.min * rb.min, ra.min * rb.max, ra.max * rb.min, ra.max * rb.max];
    // endpoint products miss 0 when every one of them is 0 * inf
    if (ra.contains_zero() && rb.has_finite_value()) || (rb.contains_zero() && ra.has_finite_value()) {
        candidates.push(0.0);
    }
    with_nan(hull(&candidates, ra.int && rb.int), na || nb || zero_times_infinity)
}

/// `1 / a`, with `1 / 0 = NaN`.
pub fn reciprocal(a: &Type) -> Type {
    lift_unary(a, reciprocal_number)
}

fn reciprocal_number(a: &NumberType) -> Type {
    if let Some(t) = pointwise_unary(a, |x| if x == 0.0 { f64::NAN } else { 1.0 / x }) {
        return t;
    }
    let (r, has_nan) = view(a);
    let Some(r) = r else {
        return nan();
    };
    if r.min == r.max {
        return if r.min == 0.0 { nan() } else { Type::literal(1.0 / r.min) };
    }
    if !r.contains_zero() {
        return with_nan(hull(&[1.0 / r.min, 1.0 / r.max], false), has_nan);
    }

    // 0 itself maps to NaN; each side of 0 maps to its own range
    let mut pieces = vec![nan()];
    if r.min < 0.0 {
        let piece = if r.int { NumberType::range(-1.0, 1.0 / r.min) } else { NumberType::range(f64::NEG_INFINITY, 1.0 / r.min) };
        pieces.extend(piece.map(Type::Number));
    }
    if r.max > 0.0 {
        let piece = if r.int { NumberType::range(1.0 / r.max, 1.0) } else { NumberType::range(1.0 / r.max, f64::INFINITY) };
        pieces.extend(piece.map(Type::Number));
    }
    union(pieces)
}

/// `a / b`, with `x / 0 = NaN`.
pub fn divide(a: &Type, b: &Type) -> Type {
    lift_binary(a, b, divide_number)
}

fn divide_number(a: &NumberType, b: &NumberType) -> Type {
    let div = |x: f64, y: f64| if y == 0.0 { f64::NAN } else { x / y };
    if let Some(t) = pointwise(a, b, div) {
        return t;
    }
    multiply(&Type::Number(*a), &reciprocal_number(b))
}

pub fn min(a: &Type, b: &Type) -> Type {
    lift_binary(a, b, |x, y| min_max_number(x, y, f64::min))
}

pub fn max(a: &Type, b: &Type) -> Type {
    lift_binary(a, b, |x, y| min_max_number(x, y, f64::max))
}

fn min_max_number(a: &NumberType, b: &NumberType, pick: fn(f64, f64) -> f64) -> Type {
    if let Some(t) = pointwise(a, b, pick) {
        return t;
    }
    let ((ra, na), (rb, nb)) = (view(a), view(b));
    let range = match (ra, rb) {
        (Some(ra), Some(rb)) => hull(&[pick(ra.min, rb.min), pick(ra.max, rb.max)], ra.int && rb.int),
        _ => None,
    };
    with_nan(range, na || nb)
}

/// Rounds half away from zero.
pub fn round(a: &Type) -> Type {
    lift_unary(a, |n| match n {
        NumberType::Literal(v) => Type::literal(v.0.round()),
        NumberType::IntInterval { .. } => Type::Number(*n),
        NumberType::Interval { min, max } => {
            NumberType::int_range(min.0.round(), max.0.round()).map_or(Type::Never, Type::Number)
        }
        NumberType::Number => {
            let ints = NumberType::int_range(f64::NEG_INFINITY, f64::INFINITY).map(Type::Number);
            with_nan(ints, true)
        }
    })
}

// ------------------------------- Tests ------------------------------------ //
