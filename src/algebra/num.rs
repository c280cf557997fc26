use crate::types::{NumberType, is_int_value};

use NumberType::{IntInterval, Interval, Literal, Number};

const REAL: NumberType = Interval {
    min: ordered_float::OrderedFloat(f64::NEG_INFINITY),
    max: ordered_float::OrderedFloat(f64::INFINITY),
};

// ---- union ----

pub(super) fn union_all(mut items: Vec<NumberType>) -> Vec<NumberType> {
    if items.contains(&Number) {
        return vec![Number];
    }
    items.sort();
    items.dedup();
    let merged = super::merge_pairwise(items, merge);

    // integers covered by a continuous member are dropped from the integer side
    let intervals: Vec<NumberType> = merged
        .iter()
        .filter(|n| matches!(n, Interval { .. }))
        .copied()
        .collect();
    let mut out = Vec::with_capacity(merged.len());
    for item in merged {
        if !matches!(item, IntInterval { .. }) {
            out.push(item);
            continue;
        }
        let mut pieces = vec![item];
        for iv in &intervals {
            pieces = pieces.iter().flat_map(|p| without(p, iv)).collect();
        }
        out.extend(pieces);
    }
    out
}

fn merge(a: &NumberType, b: &NumberType) -> Option<NumberType> {
    if a == b {
        return Some(*a);
    }
    match (a, b) {
        (Number, _) | (_, Number) => Some(Number),
        (Literal(x), Literal(y)) => {
            let (x, y) = (x.0.min(y.0), x.0.max(y.0));
            let adjacent = x.is_finite() && y.is_finite() && is_int_value(x) && is_int_value(y) && y - x == 1.0;
            adjacent.then(|| IntInterval { min: x.into(), max: y.into() })
        }
        (Literal(x), range) | (range, Literal(x)) => merge_literal(x.0, range),
        (IntInterval { min: a0, max: a1 }, IntInterval { min: b0, max: b1 }) => {
            // overlapping or adjacent
            let touches = a0.0 <= b1.0 + 1.0 && b0.0 <= a1.0 + 1.0;
            touches.then(|| IntInterval { min: (*a0).min(*b0), max: (*a1).max(*b1) })
        }
        (IntInterval { min, max }, iv @ Interval { .. }) | (iv @ Interval { .. }, IntInterval { min, max }) => {
            (iv.contains(min.0) && iv.contains(max.0)).then_some(*iv)
        }
        (Interval { min: a0, max: a1 }, Interval { min: b0, max: b1 }) => {
            let touches = a0 <= b1 && b0 <= a1;
            touches.then(|| Interval { min: (*a0).min(*b0), max: (*a1).max(*b1) })
        }
    }
}

fn merge_literal(x: f64, range: &NumberType) -> Option<NumberType> {
    if x.is_nan() {
        return (*range == REAL).then_some(Number);
    }
    if range.contains(x) {
        return Some(*range);
    }
    match range {
        IntInterval { min, max } if x.is_finite() && is_int_value(x) => {
            if x == min.0 - 1.0 {
                Some(IntInterval { min: x.into(), max: *max })
            } else if x == max.0 + 1.0 {
                Some(IntInterval { min: *min, max: x.into() })
            } else {
                None
            }
        }
        _ => None,
    }
}

// ---- intersection ----

pub(super) fn intersect(a: &NumberType, b: &NumberType) -> Option<NumberType> {
    match (a, b) {
        (Number, x) | (x, Number) => Some(*x),
        (Literal(x), other) | (other, Literal(x)) => other.contains(x.0).then_some(Literal(*x)),
        (IntInterval { min: a0, max: a1 }, IntInterval { min: b0, max: b1 })
        | (IntInterval { min: a0, max: a1 }, Interval { min: b0, max: b1 })
        | (Interval { min: b0, max: b1 }, IntInterval { min: a0, max: a1 }) => {
            NumberType::int_range(a0.0.max(b0.0), a1.0.min(b1.0))
        }
        (Interval { min: a0, max: a1 }, Interval { min: b0, max: b1 }) => {
            NumberType::range(a0.0.max(b0.0), a1.0.min(b1.0))
        }
    }
}

// ---- difference ----

/// `a \ b` as a list of members (not necessarily canonical).
pub(super) fn without(a: &NumberType, b: &NumberType) -> Vec<NumberType> {
    if is_subset(a, b) {
        return Vec::new();
    }
    if intersect(a, b).is_none() {
        return vec![*a];
    }
    match (a, b) {
        (Number, _) => {
            let mut out = without(&REAL, b);
            if !b.is_nan() {
                out.push(NumberType::literal(f64::NAN));
            }
            out
        }
        (IntInterval { min, max }, _) => int_minus_range(min.0, max.0, b.min(), b.max()),
        (Interval { min, max }, Interval { min: lo, max: hi }) => {
            let piece = if lo <= min {
                NumberType::range(hi.0, max.0)
            } else if hi >= max {
                NumberType::range(min.0, lo.0)
            } else {
                // a hole in the middle is not representable
                Some(*a)
            };
            piece.into_iter().collect()
        }
        _ => vec![*a],
    }
}

/// Integer values in `[min, max]` outside the closed range `[lo, hi]`.
fn int_minus_range(min: f64, max: f64, lo: f64, hi: f64) -> Vec<NumberType> {
    let left = if lo == f64::NEG_INFINITY {
        None
    } else {
        let end = if is_int_value(lo) { lo - 1.0 } else { lo.floor() };
        NumberType::int_range(min, end)
    };
    let right = if hi == f64::INFINITY {
        None
    } else {
        let start = if is_int_value(hi) { hi + 1.0 } else { hi.ceil() };
        NumberType::int_range(start, max)
    };
    left.into_iter().chain(right).collect()
}

// ---- subset ----

pub(super) fn is_subset(a: &NumberType, b: &NumberType) -> bool {
    match (a, b) {
        (_, Number) => true,
        (Number, _) => false,
        (Literal(x), other) => other.contains(x.0),
        (IntInterval { min, max }, IntInterval { .. } | Interval { .. })
        | (Interval { min, max }, Interval { .. }) => b.min() <= min.0 && max.0 <= b.max(),
        _ => false,
    }
}
