use crate::types::StringType;

pub(super) fn union_all(mut items: Vec<StringType>) -> Vec<StringType> {
    if items.contains(&StringType::String) {
        return vec![StringType::String];
    }
    items.sort();
    items.dedup();
    items
}

pub(super) fn intersect(a: &StringType, b: &StringType) -> Option<StringType> {
    match (a, b) {
        (StringType::String, x) | (x, StringType::String) => Some(x.clone()),
        (StringType::Literal(x), StringType::Literal(y)) => (x == y).then(|| a.clone()),
    }
}

/// `string \ "lit"` stays `string`: a co-finite set is not representable.
pub(super) fn without(a: &StringType, b: &StringType) -> Option<StringType> {
    if is_subset(a, b) { None } else { Some(a.clone()) }
}

pub(super) fn is_subset(a: &StringType, b: &StringType) -> bool {
    match (a, b) {
        (_, StringType::String) => true,
        (StringType::String, StringType::Literal(_)) => false,
        (StringType::Literal(x), StringType::Literal(y)) => x == y,
    }
}
