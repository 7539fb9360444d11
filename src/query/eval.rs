use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::types::{CmpOp, Filter, MAX_PATH_DEPTH, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, Order, SortSpec};
use crate::geo::Point;

/// Evaluate `filter` against a stored document.
///
/// Paths traverse embedded documents and fan out across arrays, so
/// `shippingAddresses.city` matches when any element's `city` matches.
#[must_use]
pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => !lookup(doc, path).is_empty() == *exists,
        Filter::In { path, values } => matches_any(doc, path, values),
        Filter::Nin { path, values } => !matches_any(doc, path, values),
        Filter::Cmp { path, op: CmpOp::Eq, value } => matches_eq(doc, path, value),
        Filter::Cmp { path, op: CmpOp::Ne, value } => !matches_eq(doc, path, value),
        Filter::Cmp { path, op, value } => candidates(doc, path).any(|v| {
            comparable(v, value).is_some_and(|c| match op {
                CmpOp::Gt => c == Ordering::Greater,
                CmpOp::Gte => c != Ordering::Less,
                CmpOp::Lt => c == Ordering::Less,
                CmpOp::Lte => c != Ordering::Greater,
                CmpOp::Eq | CmpOp::Ne => false,
            })
        }),
        Filter::Regex { path, pattern, case_insensitive } => {
            let mut re = regex::RegexBuilder::new(pattern);
            re.case_insensitive(*case_insensitive);
            let Ok(r) = re.build() else { return false };
            candidates(doc, path).any(|v| matches!(v, Bson::String(s) if r.is_match(s)))
        }
        Filter::Geo { path, shape } => points_at(doc, path).into_iter().any(|p| shape.contains(p)),
    }
}

fn matches_eq(doc: &BsonDocument, path: &str, value: &Bson) -> bool {
    let found = lookup(doc, path);
    if found.is_empty() {
        return matches!(value, Bson::Null);
    }
    found.iter().any(|v| {
        bson_eq(v, value) || matches!(v, Bson::Array(items) if items.iter().any(|i| bson_eq(i, value)))
    })
}

fn matches_any(doc: &BsonDocument, path: &str, values: &[Bson]) -> bool {
    values.iter().any(|x| matches_eq(doc, path, x))
}

/// Resolved values plus the elements of any array value.
fn candidates<'a>(doc: &'a BsonDocument, path: &str) -> impl Iterator<Item = &'a Bson> + 'a {
    lookup(doc, path).into_iter().flat_map(|v| match v {
        Bson::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    })
}

/// Locations stored at `path`, either a single point or an array of points.
#[must_use]
pub fn points_at(doc: &BsonDocument, path: &str) -> Vec<Point> {
    lookup(doc, path)
        .into_iter()
        .flat_map(|v| match (Point::from_bson(v), v) {
            (Some(p), _) => vec![p],
            (None, Bson::Array(items)) => items.iter().filter_map(Point::from_bson).collect(),
            (None, _) => Vec::new(),
        })
        .collect()
}

/// Every value reachable at a dotted path.
#[must_use]
pub fn lookup<'a>(doc: &'a BsonDocument, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    if path.is_empty() || path.len() > 1024 {
        return out;
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() > MAX_PATH_DEPTH {
        return out;
    }
    walk(doc, &parts, &mut out);
    out
}

fn walk<'a>(doc: &'a BsonDocument, parts: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else { return };
    let Some(v) = doc.get(*head) else { return };
    if rest.is_empty() {
        out.push(v);
        return;
    }
    match v {
        Bson::Document(d) => walk(d, rest, out),
        Bson::Array(items) => {
            for item in items {
                if let Bson::Document(d) = item {
                    walk(d, rest, out);
                }
            }
        }
        _ => {}
    }
}

pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let va = lookup(a, &s.field).first().copied();
        let vb = lookup(b, &s.field).first().copied();
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if matches!(s.order, Order::Asc) { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        _ => f64::NAN,
    }
}

/// Numbers compare across their representations; everything else by value.
#[must_use]
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return as_f64_num(a) == as_f64_num(b);
    }
    a == b
}

/// Ordering between two values of the same type class, `None` otherwise.
#[must_use]
pub fn comparable(a: &Bson, b: &Bson) -> Option<Ordering> {
    if is_num(a) && is_num(b) {
        return Some(as_f64_num(a).total_cmp(&as_f64_num(b)));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting mixed values.
#[must_use]
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    comparable(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

const fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::Symbol(_) | T::String(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::RegularExpression(_) => 11,
        T::DbPointer(_) => 12,
        T::JavaScriptCode(_) | T::JavaScriptCodeWithScope(_) => 13,
        T::MaxKey => 255,
    }
}

/// Keep only `fields` (dotted paths allowed) plus `_id`.
#[must_use]
pub fn project_fields(doc: &BsonDocument, fields: &[String]) -> BsonDocument {
    let mut out = BsonDocument::new();
    if let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for f in fields.iter().take(MAX_PROJECTION_FIELDS) {
        if let Some(v) = lookup(doc, f).first() {
            insert_path(&mut out, f, (*v).clone());
        }
    }
    out
}

fn insert_path(doc: &mut BsonDocument, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, BsonDocument::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                insert_path(inner, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn person() -> BsonDocument {
        doc! {
            "lastname": "Matthews",
            "age": 39,
            "address": { "zipCode": "C0123", "city": "Springfield" },
            "shippingAddresses": [ { "city": "Dublin" }, { "city": "Cork" } ],
            "tags": ["a", "b"],
        }
    }

    #[test]
    fn traverses_arrays_of_documents() {
        let f = Filter::Cmp { path: "shippingAddresses.city".into(), op: CmpOp::Eq, value: "Cork".into() };
        assert!(eval_filter(&person(), &f));
    }

    #[test]
    fn numeric_equality_crosses_representations() {
        let f = Filter::Cmp { path: "age".into(), op: CmpOp::Eq, value: Bson::Double(39.0) };
        assert!(eval_filter(&person(), &f));
        let gt = Filter::Cmp { path: "age".into(), op: CmpOp::Gt, value: Bson::Int64(38) };
        assert!(eval_filter(&person(), &gt));
    }

    #[test]
    fn range_operators_do_not_cross_types() {
        let f = Filter::Cmp { path: "lastname".into(), op: CmpOp::Gt, value: Bson::Int32(1) };
        assert!(!eval_filter(&person(), &f));
    }

    #[test]
    fn null_equality_matches_missing_fields() {
        let f = Filter::Cmp { path: "nickname".into(), op: CmpOp::Eq, value: Bson::Null };
        assert!(eval_filter(&person(), &f));
        let ne = Filter::Cmp { path: "nickname".into(), op: CmpOp::Ne, value: Bson::Null };
        assert!(!eval_filter(&person(), &ne));
    }

    #[test]
    fn equality_matches_array_members() {
        let f = Filter::Cmp { path: "tags".into(), op: CmpOp::Eq, value: "b".into() };
        assert!(eval_filter(&person(), &f));
        let nin = Filter::Nin { path: "tags".into(), values: vec!["c".into()] };
        assert!(eval_filter(&person(), &nin));
    }

    #[test]
    fn projection_keeps_nested_paths() {
        let p = project_fields(&person(), &["address.zipCode".to_string()]);
        assert_eq!(p, doc! { "address": { "zipCode": "C0123" } });
    }
}
