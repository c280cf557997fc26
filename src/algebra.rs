//! Set algebra over `Type`.
//!
//! Every function here is total: contradictions yield `never`, never an error.
//! Results are always canonical (see `union`).
//!
//! Design goals:
//! - union ∪ is associative/commutative/idempotent on the canonical form.
//! - intersection ∩ distributes over unions (cost is multiplicative in union
//!   sizes; kept for correctness).
//! - difference \ is exact where the grammar can express it and otherwise a
//!   superset of the true result.
pub mod num;
pub mod obj;
pub mod string;

use crate::types::{NumberType, StringType, StructType, Type, UnionType};

// -------------------------------- Union (∪) -------------------------------- //

/// Union of all `items` in canonical form.
///
/// `any` absorbs everything and `never` is dropped. Mergeable members of the
/// same kind collapse (adjacent integers, overlapping ranges, structs that
/// differ in at most one field); the rest is sorted and deduplicated.
pub fn union<I>(items: I) -> Type
where
    I: IntoIterator<Item = Type>,
{
    let mut numbers: Vec<NumberType> = Vec::new();
    let mut strings: Vec<StringType> = Vec::new();
    let mut structs: Vec<StructType> = Vec::new();

    let mut push = |t: Type| -> bool {
        match t {
            Type::Never => {}
            Type::Any => return false,
            Type::Number(n) => numbers.push(n),
            Type::String(s) => strings.push(s),
            Type::Struct(s) => structs.push(s),
            Type::Union(_) => unreachable!("flattened by caller"),
        }
        true
    };

    for item in items {
        let keep_going = match item {
            Type::Union(u) => u.items().iter().cloned().all(&mut push),
            other => push(other),
        };
        if !keep_going {
            return Type::Any;
        }
    }

    let mut out: Vec<Type> = Vec::new();
    out.extend(num::union_all(numbers).into_iter().map(Type::Number));
    out.extend(string::union_all(strings).into_iter().map(Type::String));
    out.extend(obj::union_all(structs).into_iter().map(Type::Struct));
    from_members(out)
}

/// Canonicalize already-merged value members.
pub(crate) fn from_members(mut items: Vec<Type>) -> Type {
    items.sort();
    items.dedup();
    match items.len() {
        0 => Type::Never,
        1 => items.remove(0),
        _ => Type::Union(UnionType::from_canonical(items)),
    }
}

/// Repeatedly merges any mergeable pair until no pair merges.
pub(crate) fn merge_pairwise<T>(mut items: Vec<T>, merge: impl Fn(&T, &T) -> Option<T>) -> Vec<T> {
    'restart: loop {
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if let Some(merged) = merge(&items[i], &items[j]) {
                    items.swap_remove(j);
                    items[i] = merged;
                    continue 'restart;
                }
            }
        }
        return items;
    }
}

// ----------------------------- Intersection (∩) ---------------------------- //

/// Intersection of all `items`.
///
/// `any` is the identity and `never` absorbs. Unions distribute: the result
/// is the union over every combination of one member per union.
pub fn intersect<I>(items: I) -> Type
where
    I: IntoIterator<Item = Type>,
{
    let mut values = Type::Any;
    let mut unions: Vec<UnionType> = Vec::new();

    for item in items {
        match item {
            Type::Any => {}
            Type::Never => return Type::Never,
            Type::Union(u) => unions.push(u),
            value => {
                values = intersect_pair(&values, &value);
                if values.is_never() {
                    return Type::Never;
                }
            }
        }
    }

    if unions.is_empty() {
        return values;
    }

    // one representative per union, pruned as soon as a partial result is never
    let mut partials = vec![values];
    for u in &unions {
        let mut next = Vec::new();
        for partial in &partials {
            for member in u.items() {
                let t = intersect_pair(partial, member);
                if !t.is_never() {
                    next.push(t);
                }
            }
        }
        if next.is_empty() {
            return Type::Never;
        }
        partials = next;
    }
    union(partials)
}

/// `a ∩ b` where neither side is a union.
fn intersect_pair(a: &Type, b: &Type) -> Type {
    match (a, b) {
        (Type::Any, x) | (x, Type::Any) => x.clone(),
        (Type::Number(x), Type::Number(y)) => num::intersect(x, y).map_or(Type::Never, Type::Number),
        (Type::String(x), Type::String(y)) => string::intersect(x, y).map_or(Type::Never, Type::String),
        (Type::Struct(x), Type::Struct(y)) => obj::intersect(x, y),
        (Type::Union(_), _) | (_, Type::Union(_)) => intersect([a.clone(), b.clone()]),
        _ => Type::Never,
    }
}

// ------------------------------ Difference (\) ----------------------------- //

/// `left \ right`: exact where representable, otherwise the smallest
/// representable superset of the true difference.
pub fn without(left: &Type, right: &Type) -> Type {
    match (left, right) {
        (Type::Never, _) | (_, Type::Any) => Type::Never,
        (_, Type::Never) => left.clone(),
        // the complement of a set is not expressible
        (Type::Any, _) => Type::Any,
        (_, Type::Union(u)) => {
            let mut rest = left.clone();
            for member in u.items() {
                rest = without(&rest, member);
                if rest.is_never() {
                    break;
                }
            }
            rest
        }
        (Type::Union(u), _) => union(u.items().iter().map(|m| without(m, right))),
        (l, r) => without_value(l, r),
    }
}

fn without_value(left: &Type, right: &Type) -> Type {
    match (left, right) {
        (Type::Number(x), Type::Number(y)) => union(num::without(x, y).into_iter().map(Type::Number)),
        (Type::String(x), Type::String(y)) => string::without(x, y).map_or(Type::Never, Type::String),
        (Type::Struct(x), Type::Struct(y)) => obj::without(x, y),
        _ => left.clone(),
    }
}

// -------------------------------- Relations -------------------------------- //

/// `a ⊆ b`.
pub fn is_subset_of(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Never, _) | (_, Type::Any) => true,
        (Type::Any, _) | (_, Type::Never) => false,
        (Type::Union(u), _) => u.items().iter().all(|m| is_subset_of(m, b)),
        // a number may be covered by several members together
        (Type::Number(_), Type::Union(_)) => without(a, b).is_never(),
        (_, Type::Union(u)) => u.items().iter().any(|m| is_value_subset(a, m)),
        (x, y) => is_value_subset(x, y),
    }
}

fn is_value_subset(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Number(x), Type::Number(y)) => num::is_subset(x, y),
        (Type::String(x), Type::String(y)) => string::is_subset(x, y),
        (Type::Struct(x), Type::Struct(y)) => obj::is_subset(x, y),
        _ => false,
    }
}

/// `a ⊇ b`.
pub fn is_superset_of(a: &Type, b: &Type) -> bool {
    is_subset_of(b, a)
}

/// `a ∩ b = never`.
pub fn is_disjoint_with(a: &Type, b: &Type) -> bool {
    intersect([a.clone(), b.clone()]).is_never()
}

/// Semantic equality; relies on canonical form.
pub fn is_same(a: &Type, b: &Type) -> bool {
    a == b
}

// ------------------------------- Tests ------------------------------------ //
