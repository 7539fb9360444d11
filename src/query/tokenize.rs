use serde::Serialize;

use super::keyword::{ALL_IGNORE_CASE, IGNORE_CASE, Operator, SUFFIXES};
use super::path::{LeafKind, PropertyPath, Resolution};
use super::types::{Order, Sort, SortSpec};
use crate::errors::DbError;
use crate::schema::{EntitySchema, ScalarType};

const FIND_VERBS: [&str; 6] = ["find", "read", "get", "query", "search", "stream"];
const WRITE_VERBS: [&str; 2] = ["delete", "remove"];

/// What the method prefix asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryKind {
    Find,
    Count,
    Exists,
}

/// One predicate clause: a resolved property, an operator and its modifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clause {
    /// Fragment of the method name this clause was read from.
    pub source: String,
    pub path: PropertyPath,
    pub operator: Operator,
    pub ignore_case: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderClause {
    pub source: String,
    pub path: PropertyPath,
    pub order: Order,
}

/// Parsed form of a derived query method name.
///
/// `groups` holds the OR-groups in source order; each group is the AND-list of its clauses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartTree {
    pub method: String,
    pub kind: QueryKind,
    pub limit: Option<usize>,
    pub groups: Vec<Vec<Clause>>,
    pub order_by: Vec<OrderClause>,
    all_ignore_case: Option<&'static str>,
    prefix: String,
}

impl PartTree {
    /// Tokenize `method` against `schema`.
    ///
    /// # Errors
    /// `MalformedQueryName`, `UnresolvedProperty`, `AmbiguousProperty`,
    /// `UnsupportedOperator` or `ClauseTypeMismatch`.
    pub fn parse(method: &str, schema: &EntitySchema) -> Result<Self, DbError> {
        let name = normalize_method_name(method);
        let name = name.as_str();
        let (kind, verb_len) = parse_verb(name)?;
        let by = find_keyword(name, verb_len, "By", true)
            .ok_or_else(|| DbError::malformed(name, "missing `By` after the subject"))?;
        let limit = parse_subject(name, kind, &name[verb_len..by])?;
        let prefix = name[..by + 2].to_string();
        let tail = &name[by + 2..];
        if tail.is_empty() {
            return Err(DbError::malformed(name, "empty predicate"));
        }

        let (predicate, order_text) = match find_keyword(tail, 0, "OrderBy", true) {
            Some(at) => (&tail[..at], Some(&tail[at + "OrderBy".len()..])),
            None => (tail, None),
        };
        let (predicate, all_ignore_case) = strip_suffix_any(predicate, &ALL_IGNORE_CASE);

        let mut groups = Vec::new();
        if !(predicate.is_empty() && order_text.is_some() && all_ignore_case.is_none()) {
            for or_part in split_keyword(predicate, "Or") {
                let mut group = Vec::new();
                for fragment in split_keyword(or_part, "And") {
                    if fragment.is_empty() {
                        return Err(DbError::malformed(name, "empty clause"));
                    }
                    group.push(parse_clause(fragment, schema, name, all_ignore_case.is_some())?);
                }
                groups.push(group);
            }
        }

        let order_by = match order_text {
            Some(text) => parse_order_by(text, schema, name)?,
            None => Vec::new(),
        };
        let tree = Self { method: name.to_string(), kind, limit, groups, order_by, all_ignore_case, prefix };
        log::debug!(
            "tokenized {}: {} clause(s) in {} group(s), {} sort key(s)",
            tree.method,
            tree.clauses().count(),
            tree.groups.len(),
            tree.order_by.len()
        );
        Ok(tree)
    }

    /// Clauses in declaration order.
    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.groups.iter().flatten()
    }

    /// Verb, subject and `By`, e.g. `findFirst3By`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rebuild the text after the prefix from the parsed parts.
    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = self
            .groups
            .iter()
            .map(|g| g.iter().map(|c| c.source.as_str()).collect::<Vec<_>>().join("And"))
            .collect::<Vec<_>>()
            .join("Or");
        if let Some(modifier) = self.all_ignore_case {
            out.push_str(modifier);
        }
        if !self.order_by.is_empty() {
            out.push_str("OrderBy");
            for o in &self.order_by {
                out.push_str(&o.source);
            }
        }
        out
    }

    /// Sort spelled by the `OrderBy` tail, if any.
    #[must_use]
    pub fn order_sort(&self) -> Option<Sort> {
        if self.order_by.is_empty() {
            return None;
        }
        Some(Sort(self.order_by.iter().map(|o| SortSpec { field: o.path.dotted(), order: o.order }).collect()))
    }
}

/// `find_by_address_zip_code` becomes `findByAddressZipCode`; camelCase passes through.
#[must_use]
pub fn normalize_method_name(name: &str) -> String {
    if !name.contains('_') || name.chars().any(|c| c.is_ascii_uppercase()) {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
        let mut chars = part.chars();
        if i > 0
            && let Some(first) = chars.next()
        {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        } else {
            out.push_str(part);
        }
    }
    out
}

fn followed_by_upper(s: &str, at: usize) -> bool {
    s[at..].chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// True when `kw` occurs at byte `at` and is followed by an uppercase letter (or the end, if allowed).
fn keyword_at(s: &str, at: usize, kw: &str, allow_end: bool) -> bool {
    s.is_char_boundary(at)
        && s[at..].starts_with(kw)
        && (followed_by_upper(s, at + kw.len()) || (allow_end && at + kw.len() == s.len()))
}

fn find_keyword(s: &str, from: usize, kw: &str, allow_end: bool) -> Option<usize> {
    (from..s.len()).find(|&i| keyword_at(s, i, kw, allow_end))
}

/// Split on a combinator keyword. A trailing or leading keyword yields an empty part.
fn split_keyword<'a>(s: &'a str, kw: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < s.len() {
        if keyword_at(s, i, kw, true) {
            parts.push(&s[start..i]);
            i += kw.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&s[start..]);
    parts
}

fn strip_suffix_any<'a>(s: &'a str, suffixes: &[&'static str]) -> (&'a str, Option<&'static str>) {
    for sfx in suffixes {
        if let Some(rest) = s.strip_suffix(sfx) {
            return (rest, Some(*sfx));
        }
    }
    (s, None)
}

fn starts_with_verb(name: &str, verb: &str) -> bool {
    name.starts_with(verb) && followed_by_upper(name, verb.len())
}

fn parse_verb(name: &str) -> Result<(QueryKind, usize), DbError> {
    if let Some(v) = WRITE_VERBS.into_iter().find(|v| starts_with_verb(name, v)) {
        return Err(DbError::malformed(name, format!("`{v}` queries are not supported; only reads are")));
    }
    if let Some(v) = FIND_VERBS.into_iter().find(|v| starts_with_verb(name, v)) {
        return Ok((QueryKind::Find, v.len()));
    }
    if starts_with_verb(name, "count") {
        return Ok((QueryKind::Count, "count".len()));
    }
    if starts_with_verb(name, "exists") {
        return Ok((QueryKind::Exists, "exists".len()));
    }
    Err(DbError::malformed(name, "expected a find/read/get/query/search/stream/count/exists prefix"))
}

/// Subject text between the verb and `By`: `All`, `First`, `Top10`, or a free entity name.
fn parse_subject(name: &str, kind: QueryKind, subject: &str) -> Result<Option<usize>, DbError> {
    if subject.contains("Distinct") {
        return Err(DbError::malformed(name, "`Distinct` queries are not supported"));
    }
    let Some((kw, rest)) = ["First", "Top"]
        .iter()
        .find_map(|kw| subject.strip_prefix(kw).map(|rest| (*kw, rest)))
    else {
        return Ok(None);
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    let limit = if digits.is_empty() {
        1
    } else {
        digits.parse::<usize>().map_err(|_| DbError::malformed(name, format!("`{kw}{digits}` is out of range")))?
    };
    if limit == 0 {
        return Err(DbError::malformed(name, format!("`{kw}0` selects nothing")));
    }
    if kind != QueryKind::Find {
        return Err(DbError::malformed(name, format!("`{kw}` only applies to find queries")));
    }
    Ok(Some(limit))
}

fn supports_ignore_case(op: Operator, path: &PropertyPath) -> bool {
    let textual = matches!(path.leaf(), LeafKind::Scalar(ScalarType::String | ScalarType::Any))
        || path.is_collection();
    textual && (matches!(op, Operator::Equals | Operator::NotEquals) || op.is_pattern())
}

fn parse_clause(fragment: &str, schema: &EntitySchema, method: &str, all_ignore_case: bool) -> Result<Clause, DbError> {
    let (body, explicit_ic) = match strip_suffix_any(fragment, &IGNORE_CASE) {
        (rest, Some(sfx)) if !rest.is_empty() => (rest, Some(sfx)),
        _ => (fragment, None),
    };
    let (path, operator) = resolve_operator(body, schema, method)?;

    if operator.is_geo() && !path.is_geo() {
        return Err(DbError::unsupported(
            method,
            operator.name(),
            format!("`{}` is not a geospatial property", path.dotted()),
        ));
    }
    if let Some(sfx) = explicit_ic
        && !supports_ignore_case(operator, &path)
    {
        return Err(DbError::unsupported(
            method,
            sfx,
            format!("case-insensitive matching needs a string property and operator, got {}", operator.name()),
        ));
    }
    let scalar = path.scalar_type();
    if operator.is_pattern()
        && !path.is_collection()
        && matches!(scalar, Some(ScalarType::Number | ScalarType::Boolean | ScalarType::Date))
    {
        return Err(DbError::mismatch(
            method,
            format!("{} needs a string property, `{}` is not", operator.name(), path.dotted()),
        ));
    }
    if matches!(operator, Operator::True | Operator::False)
        && !matches!(scalar, Some(ScalarType::Boolean | ScalarType::Any))
    {
        return Err(DbError::mismatch(
            method,
            format!("{} needs a boolean property, `{}` is not", operator.name(), path.dotted()),
        ));
    }

    let ignore_case = explicit_ic.is_some() || (all_ignore_case && supports_ignore_case(operator, &path));
    Ok(Clause { source: fragment.to_string(), path, operator, ignore_case })
}

/// Longest keyword suffix whose remaining text resolves to a property; plain equality otherwise.
fn resolve_operator(body: &str, schema: &EntitySchema, method: &str) -> Result<(PropertyPath, Operator), DbError> {
    let suffixed = SUFFIXES.iter().filter_map(|(kw, op)| {
        let prop = body.strip_suffix(kw)?;
        (!prop.is_empty()).then_some((prop, *op))
    });
    for (prop, op) in suffixed.chain(std::iter::once((body, Operator::Equals))) {
        match Resolution::of(schema, prop) {
            Resolution::Found(path) => return Ok((path, op)),
            Resolution::Ambiguous(candidates) => {
                return Err(DbError::AmbiguousProperty {
                    method: method.to_string(),
                    token: prop.to_string(),
                    candidates,
                });
            }
            Resolution::Missing => {}
        }
    }

    // A resolving prefix followed by an unknown capitalized word is an unknown operator.
    let boundaries = body.char_indices().filter(|(i, c)| *i > 0 && c.is_ascii_uppercase()).map(|(i, _)| i);
    let longest = boundaries.collect::<Vec<_>>().into_iter().rev().find_map(|at| match Resolution::of(schema, &body[..at]) {
        Resolution::Found(path) => Some((path, &body[at..])),
        _ => None,
    });
    match longest {
        Some((path, rest)) if !matches!(path.leaf(), LeafKind::Embedded) && !rest.starts_with('_') => {
            Err(DbError::unsupported(method, rest, format!("unknown operator after `{}`", path.dotted())))
        }
        _ => Err(DbError::UnresolvedProperty {
            method: method.to_string(),
            entity: schema.name.clone(),
            token: body.to_string(),
        }),
    }
}

fn parse_order_by(text: &str, schema: &EntitySchema, method: &str) -> Result<Vec<OrderClause>, DbError> {
    if text.is_empty() {
        return Err(DbError::malformed(method, "empty `OrderBy` clause"));
    }
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut push = |source: &str, prop: &str, order: Order| -> Result<(), DbError> {
        let path = PropertyPath::resolve(schema, prop, method)?;
        out.push(OrderClause { source: source.to_string(), path, order });
        Ok(())
    };
    while i < text.len() {
        let hit = [("Desc", Order::Desc), ("Asc", Order::Asc)]
            .into_iter()
            .find(|(kw, _)| i > start && keyword_at(text, i, kw, true));
        if let Some((kw, order)) = hit {
            push(&text[start..i + kw.len()], &text[start..i], order)?;
            i += kw.len();
            start = i;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        push(&text[start..], &text[start..], Order::Asc)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntitySchema {
        EntitySchema::new("Person")
            .string("firstname")
            .string("lastname")
            .number("age")
            .boolean("active")
            .embedded("address", EntitySchema::new("Address").string("zipCode").string("city"))
            .geo_point("location")
            .string("brand")
    }

    #[test]
    fn splits_or_groups_of_and_clauses() {
        let t = PartTree::parse("findByFirstnameAndLastnameOrAgeGreaterThan", &person()).unwrap();
        assert_eq!(t.groups.len(), 2);
        assert_eq!(t.groups[0].len(), 2);
        assert_eq!(t.groups[1][0].operator, Operator::GreaterThan);
        assert_eq!(t.to_source(), "FirstnameAndLastnameOrAgeGreaterThan");
    }

    #[test]
    fn order_by_tail_with_directions() {
        let t = PartTree::parse("findByLastnameOrderByFirstnameAscAgeDesc", &person()).unwrap();
        let sort = t.order_sort().unwrap();
        assert_eq!(sort, Sort::asc("firstname").and_desc("age"));
        assert_eq!(t.to_source(), "LastnameOrderByFirstnameAscAgeDesc");
    }

    #[test]
    fn keywords_inside_words_stay_property_text() {
        let t = PartTree::parse("findByBrand", &person()).unwrap();
        assert_eq!(t.groups[0][0].path.dotted(), "brand");
    }

    #[test]
    fn trailing_and_is_malformed() {
        let err = PartTree::parse("findByLastnameAnd", &person()).unwrap_err();
        assert!(matches!(err, DbError::MalformedQueryName { .. }), "{err}");
    }

    #[test]
    fn prefixes_select_the_query_kind() {
        assert_eq!(PartTree::parse("countByLastname", &person()).unwrap().kind, QueryKind::Count);
        assert_eq!(PartTree::parse("existsByLastname", &person()).unwrap().kind, QueryKind::Exists);
        let top = PartTree::parse("findTop3ByLastname", &person()).unwrap();
        assert_eq!(top.limit, Some(3));
        assert_eq!(top.prefix(), "findTop3By");
        assert_eq!(PartTree::parse("findFirstByLastname", &person()).unwrap().limit, Some(1));
        assert!(matches!(
            PartTree::parse("deleteByLastname", &person()),
            Err(DbError::MalformedQueryName { .. })
        ));
    }

    #[test]
    fn snake_case_names_are_normalized() {
        assert_eq!(normalize_method_name("find_by_address_zip_code"), "findByAddressZipCode");
        let t = PartTree::parse("find_by_address_zip_code", &person()).unwrap();
        assert_eq!(t.groups[0][0].path.dotted(), "address.zipCode");
    }

    #[test]
    fn unknown_operator_suffix_is_unsupported() {
        let err = PartTree::parse("findByAgeAround", &person()).unwrap_err();
        assert!(
            matches!(err, DbError::UnsupportedOperator { ref operator, .. } if operator == "Around"),
            "{err}"
        );
        let err = PartTree::parse("findByNickname", &person()).unwrap_err();
        assert!(matches!(err, DbError::UnresolvedProperty { .. }), "{err}");
    }

    #[test]
    fn ignore_case_modifiers() {
        let t = PartTree::parse("findByLastnameIgnoreCase", &person()).unwrap();
        assert!(t.groups[0][0].ignore_case);
        let t = PartTree::parse("findByLastnameAndAgeAllIgnoreCase", &person()).unwrap();
        assert!(t.groups[0][0].ignore_case);
        assert!(!t.groups[0][1].ignore_case);
        assert_eq!(t.to_source(), "LastnameAndAgeAllIgnoreCase");
        let err = PartTree::parse("findByAgeGreaterThanIgnoreCase", &person()).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperator { .. }), "{err}");
    }

    #[test]
    fn geo_operator_on_plain_property_is_unsupported() {
        let err = PartTree::parse("findByLastnameNear", &person()).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperator { .. }), "{err}");
        assert!(PartTree::parse("findByLocationNear", &person()).is_ok());
    }

    #[test]
    fn boolean_and_null_operators() {
        let t = PartTree::parse("findByActiveTrueAndAgeIsNotNull", &person()).unwrap();
        let ops: Vec<Operator> = t.clauses().map(|c| c.operator).collect();
        assert_eq!(ops, vec![Operator::True, Operator::IsNotNull]);
        assert!(matches!(
            PartTree::parse("findByLastnameTrue", &person()),
            Err(DbError::ClauseTypeMismatch { .. })
        ));
    }

    #[test]
    fn order_by_without_predicate() {
        let t = PartTree::parse("findAllByOrderByLastnameDesc", &person()).unwrap();
        assert!(t.groups.is_empty());
        assert_eq!(t.order_sort(), Some(Sort::desc("lastname")));
        assert!(matches!(PartTree::parse("findBy", &person()), Err(DbError::MalformedQueryName { .. })));
    }
}
