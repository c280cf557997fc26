use indexmap::IndexMap;

use crate::types::{StructType, Type};

use super::{intersect as intersect_types, is_disjoint_with, is_subset_of, union as union_types, without as without_types};

// ---- union ----

/// Structs whose fields expand into more combinations than this stay whole.
const MAX_ATOMS: usize = 256;

/// Structs are first split into atoms (one union member per field) so the
/// result depends only on the set of values, not on how the union was
/// grouped. Atoms then merge field by field until nothing changes.
pub(super) fn union_all(items: Vec<StructType>) -> Vec<StructType> {
    let mut items: Vec<StructType> = items.iter().flat_map(atoms).collect();
    loop {
        items.sort();
        items.dedup();
        items = drop_subsumed(items);
        let width = items.iter().map(|s| s.fields().len()).max().unwrap_or(0);
        let merged = (0..width).fold(items.clone(), merge_on_field);
        if merged.len() == items.len() {
            return items;
        }
        items = merged;
    }
}

fn atoms(s: &StructType) -> Vec<StructType> {
    let count = s.fields().iter().map(|f| f.ty.members().len()).product::<usize>();
    if count > MAX_ATOMS {
        return vec![s.clone()];
    }
    let mut out = vec![s.clone()];
    for (index, field) in s.fields().iter().enumerate() {
        if field.ty.members().len() < 2 {
            continue;
        }
        out = out
            .iter()
            .flat_map(|partial| field.ty.members().iter().map(move |m| partial.with_field(index, m.clone())))
            .filter_map(|t| match t {
                Type::Struct(s) => Some(s),
                _ => None,
            })
            .collect();
    }
    out
}

fn drop_subsumed(items: Vec<StructType>) -> Vec<StructType> {
    let keep: Vec<bool> = items
        .iter()
        .enumerate()
        .map(|(i, a)| !items.iter().enumerate().any(|(j, b)| i != j && is_subset(a, b) && (!is_subset(b, a) || j < i)))
        .collect();
    items.into_iter().zip(keep).filter_map(|(s, keep)| keep.then_some(s)).collect()
}

/// Merges structs that agree on every field except the one at `index`.
fn merge_on_field(items: Vec<StructType>, index: usize) -> Vec<StructType> {
    let mut out = Vec::new();
    let mut groups: IndexMap<Type, (StructType, Vec<Type>)> = IndexMap::new();
    for s in items {
        if index >= s.fields().len() {
            out.push(s);
            continue;
        }
        let key = s.with_field(index, Type::Any);
        let ty = s.fields()[index].ty.clone();
        groups.entry(key).or_insert_with(|| (s, Vec::new())).1.push(ty);
    }
    for (_, (first, types)) in groups {
        if let Type::Struct(s) = first.with_field(index, union_types(types)) {
            out.push(s);
        }
    }
    out
}

// ---- intersection ----

pub(super) fn intersect(a: &StructType, b: &StructType) -> Type {
    if a.name() != b.name() {
        return Type::Never;
    }
    a.assert_same_shape(b);
    let fields = a
        .fields()
        .iter()
        .zip(b.fields())
        .map(|(x, y)| {
            let mut field = x.clone();
            field.ty = intersect_types([x.ty.clone(), y.ty.clone()]);
            field
        })
        .collect();
    StructType::new(a.name(), fields)
}

// ---- difference ----

/// Exact when at most one field of `a` escapes `b`; otherwise `a`.
pub(super) fn without(a: &StructType, b: &StructType) -> Type {
    if a.name() != b.name() {
        return Type::Struct(a.clone());
    }
    a.assert_same_shape(b);
    let pairs: Vec<_> = a.fields().iter().zip(b.fields()).collect();
    if pairs.iter().any(|(x, y)| is_disjoint_with(&x.ty, &y.ty)) {
        return Type::Struct(a.clone());
    }

    let mut escaping = pairs
        .iter()
        .enumerate()
        .filter(|(_, (x, y))| !is_subset_of(&x.ty, &y.ty));
    match (escaping.next(), escaping.next()) {
        (None, _) => Type::Never,
        (Some((index, (x, y))), None) => a.with_field(index, without_types(&x.ty, &y.ty)),
        (Some(_), Some(_)) => Type::Struct(a.clone()),
    }
}

// ---- subset ----

pub(super) fn is_subset(a: &StructType, b: &StructType) -> bool {
    if a.name() != b.name() {
        return false;
    }
    a.assert_same_shape(b);
    a.fields()
        .iter()
        .zip(b.fields())
        .all(|(x, y)| is_subset_of(&x.ty, &y.ty))
}
