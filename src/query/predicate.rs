use bson::Bson;

use super::eval::comparable;
use super::keyword::{Operator, ValueShape};
use super::params::Param;
use super::path::PropertyPath;
use super::tokenize::PartTree;
use super::types::{CmpOp, Filter};
use crate::errors::DbError;
use crate::geo::{Distance, GeoShape, Point};
use crate::schema::ScalarType;

/// A clause with its bound arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub path: PropertyPath,
    pub operator: Operator,
    pub ignore_case: bool,
    pub values: Vec<Param>,
}

/// Boolean tree over criteria. AND binds tighter than OR.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Leaf(Criterion),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// Geospatial ranking request carried by a `Near` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct NearQuery {
    pub path: String,
    pub center: Point,
    pub max_distance: Option<Distance>,
}

impl Predicate {
    /// Bind `args` to the clauses of `tree`. `slots[i]` lists the argument indices of clause `i`.
    ///
    /// Returns `None` when the tree has no clauses.
    ///
    /// # Errors
    /// `ClauseTypeMismatch` when a bound value does not fit its clause, `InvalidGeometry`
    /// for invalid shapes.
    pub fn build(
        tree: &PartTree,
        slots: &[Vec<usize>],
        args: &[Param],
        max_in_set: usize,
    ) -> Result<Option<Self>, DbError> {
        let mut slot = slots.iter();
        let mut groups = Vec::with_capacity(tree.groups.len());
        for group in &tree.groups {
            let mut leaves = Vec::with_capacity(group.len());
            for clause in group {
                let indices = slot
                    .next()
                    .ok_or_else(|| DbError::mismatch(&tree.method, "clause has no parameter binding"))?;
                let criterion = Criterion {
                    path: clause.path.clone(),
                    operator: clause.operator,
                    ignore_case: clause.ignore_case,
                    values: indices.iter().filter_map(|i| args.get(*i).cloned()).collect(),
                };
                criterion.check(&tree.method, max_in_set)?;
                leaves.push(Self::Leaf(criterion));
            }
            groups.push(collapse(leaves, Self::And));
        }
        Ok((!groups.is_empty()).then(|| collapse(groups, Self::Or)))
    }

    #[must_use]
    pub fn to_filter(&self) -> Filter {
        match self {
            Self::Leaf(c) => c.to_filter(),
            Self::And(children) => Filter::and(children.iter().map(Self::to_filter).collect()),
            Self::Or(children) => Filter::or(children.iter().map(Self::to_filter).collect()),
        }
    }

    /// Leaves in source order.
    #[must_use]
    pub fn criteria(&self) -> Vec<&Criterion> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Criterion>) {
        match self {
            Self::Leaf(c) => out.push(c),
            Self::And(children) | Self::Or(children) => children.iter().for_each(|c| c.collect(out)),
        }
    }

    /// The `Near` clause, if one is present.
    #[must_use]
    pub fn near(&self) -> Option<NearQuery> {
        self.criteria().into_iter().find_map(|c| match (c.operator, c.values.as_slice()) {
            (Operator::Near, [Param::Point(center), rest @ ..]) => Some(NearQuery {
                path: c.path.dotted(),
                center: *center,
                max_distance: match rest {
                    [Param::Distance(d)] => Some(*d),
                    _ => None,
                },
            }),
            _ => None,
        })
    }
}

fn collapse(mut items: Vec<Predicate>, combine: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if items.len() == 1
        && let Some(only) = items.pop()
    {
        return only;
    }
    combine(items)
}

fn value_fits(ty: ScalarType, v: &Bson) -> bool {
    match (ty, v) {
        (ScalarType::Any, _) | (_, Bson::Null) => true,
        (ScalarType::String, Bson::String(_)) => true,
        (ScalarType::Number, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => true,
        (ScalarType::Boolean, Bson::Boolean(_)) => true,
        (ScalarType::Date, Bson::DateTime(_) | Bson::Timestamp(_)) => true,
        _ => false,
    }
}

impl Criterion {
    fn value(&self, i: usize) -> Option<&Bson> {
        match self.values.get(i) {
            Some(Param::Value(v)) => Some(v),
            _ => None,
        }
    }

    fn text_value(&self) -> Option<&str> {
        match self.value(0) {
            Some(Bson::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Eager compatibility check between the operator, the property and the bound values.
    fn check(&self, method: &str, max_in_set: usize) -> Result<(), DbError> {
        let field = self.path.dotted();
        let op = self.operator.name();
        let declared = self.path.scalar_type();
        match self.operator.value_shape() {
            ValueShape::None => {}
            ValueShape::Pair => {
                let (Some(lo), Some(hi)) = (self.value(0), self.value(1)) else {
                    return Err(DbError::mismatch(method, format!("{op} on `{field}` needs two values")));
                };
                if matches!(lo, Bson::Null) || matches!(hi, Bson::Null) || comparable(lo, hi).is_none() {
                    return Err(DbError::mismatch(
                        method,
                        format!("{op} on `{field}` needs two range-comparable values, got {lo} and {hi}"),
                    ));
                }
                if let Some(ty) = declared
                    && !(value_fits(ty, lo) && value_fits(ty, hi))
                {
                    return Err(DbError::mismatch(method, format!("{op} bounds do not match `{field}` ({ty:?})")));
                }
            }
            ValueShape::Sequence => {
                let Some(Bson::Array(items)) = self.value(0) else {
                    return Err(DbError::mismatch(method, format!("{op} on `{field}` needs a sequence of values")));
                };
                if items.len() > max_in_set {
                    return Err(DbError::mismatch(
                        method,
                        format!("{op} on `{field}` got {} values, limit is {max_in_set}", items.len()),
                    ));
                }
            }
            ValueShape::Single => {
                let Some(v) = self.value(0) else {
                    return Err(DbError::mismatch(method, format!("{op} on `{field}` needs a value")));
                };
                if self.operator.is_pattern() && !self.path.is_collection() {
                    if !matches!(v, Bson::String(_)) {
                        return Err(DbError::mismatch(method, format!("{op} on `{field}` needs a string, got {v}")));
                    }
                    if self.operator == Operator::Regex {
                        regex::Regex::new(self.text_value().unwrap_or_default())
                            .map_err(|e| DbError::mismatch(method, format!("invalid regex for `{field}`: {e}")))?;
                    }
                } else if self.operator.is_range() && matches!(v, Bson::Null | Bson::Array(_) | Bson::Document(_)) {
                    return Err(DbError::mismatch(method, format!("{op} on `{field}` needs an ordered value, got {v}")));
                } else if let Some(ty) = declared
                    && !value_fits(ty, v)
                {
                    return Err(DbError::mismatch(method, format!("{op} value {v} does not match `{field}` ({ty:?})")));
                }
            }
            ValueShape::Point => {
                let shape = match self.values.as_slice() {
                    [Param::Point(center)] => GeoShape::Near { center: *center, max_distance: None },
                    [Param::Point(center), Param::Distance(d)] => {
                        GeoShape::Near { center: *center, max_distance: Some(*d) }
                    }
                    _ => return Err(DbError::mismatch(method, format!("Near on `{field}` needs a point"))),
                };
                shape.validate()?;
            }
            ValueShape::Area => match self.values.as_slice() {
                [Param::Shape(shape)] if !matches!(shape, GeoShape::Near { .. }) => shape.validate()?,
                _ => return Err(DbError::mismatch(method, format!("Within on `{field}` needs a circle, box or polygon"))),
            },
        }
        Ok(())
    }

    #[must_use]
    pub fn to_filter(&self) -> Filter {
        let path = self.path.dotted();
        let first = self.value(0).cloned().unwrap_or(Bson::Null);
        let cmp = |op: CmpOp, value: Bson| Filter::Cmp { path: path.clone(), op, value };
        let re = |pattern: String| Filter::Regex { path: path.clone(), pattern, case_insensitive: self.ignore_case };
        let negate = |f: Filter| Filter::Not(Box::new(f));
        let text = self.text_value().map(regex::escape);
        match self.operator {
            Operator::Equals => match &text {
                Some(t) if self.ignore_case => re(format!("^{t}$")),
                _ => cmp(CmpOp::Eq, first),
            },
            Operator::NotEquals => match &text {
                Some(t) if self.ignore_case => negate(re(format!("^{t}$"))),
                _ => cmp(CmpOp::Ne, first),
            },
            Operator::LessThan | Operator::Before => cmp(CmpOp::Lt, first),
            Operator::LessThanEqual => cmp(CmpOp::Lte, first),
            Operator::GreaterThan | Operator::After => cmp(CmpOp::Gt, first),
            Operator::GreaterThanEqual => cmp(CmpOp::Gte, first),
            Operator::Between => Filter::And(vec![
                cmp(CmpOp::Gt, first),
                cmp(CmpOp::Lt, self.value(1).cloned().unwrap_or(Bson::Null)),
            ]),
            Operator::Like => re(like_to_regex(self.text_value().unwrap_or_default())),
            Operator::NotLike => negate(re(like_to_regex(self.text_value().unwrap_or_default()))),
            Operator::StartingWith => re(format!("^{}", text.unwrap_or_default())),
            Operator::EndingWith => re(format!("{}$", text.unwrap_or_default())),
            Operator::Containing if self.path.is_collection() => cmp(CmpOp::Eq, first),
            Operator::Containing => re(text.unwrap_or_default()),
            Operator::NotContaining if self.path.is_collection() => cmp(CmpOp::Ne, first),
            Operator::NotContaining => negate(re(text.unwrap_or_default())),
            Operator::Regex => re(self.text_value().unwrap_or_default().to_string()),
            Operator::In => Filter::In { path: path.clone(), values: array(&first) },
            Operator::NotIn => Filter::Nin { path: path.clone(), values: array(&first) },
            Operator::IsNull => cmp(CmpOp::Eq, Bson::Null),
            Operator::IsNotNull => cmp(CmpOp::Ne, Bson::Null),
            Operator::Exists => Filter::Exists { path: path.clone(), exists: true },
            Operator::True => cmp(CmpOp::Eq, Bson::Boolean(true)),
            Operator::False => cmp(CmpOp::Eq, Bson::Boolean(false)),
            Operator::Near => {
                let (center, max_distance) = match self.values.as_slice() {
                    [Param::Point(c), Param::Distance(d)] => (*c, Some(*d)),
                    [Param::Point(c)] => (*c, None),
                    _ => (Point::new(f64::NAN, f64::NAN), None),
                };
                Filter::Geo { path: path.clone(), shape: GeoShape::Near { center, max_distance } }
            }
            Operator::Within => match self.values.first() {
                Some(Param::Shape(shape)) => Filter::Geo { path: path.clone(), shape: shape.clone() },
                _ => Filter::Not(Box::new(Filter::True)),
            },
        }
    }
}

fn array(v: &Bson) -> Vec<Bson> {
    match v {
        Bson::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// `*` matches any run of characters; the pattern is anchored unless it starts or ends with `*`.
#[must_use]
pub fn like_to_regex(pattern: &str) -> String {
    let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
    let body = body.strip_prefix(".*").unwrap_or(&body);
    let body = body.strip_suffix(".*").unwrap_or(body);
    let mut out = String::with_capacity(body.len() + 2);
    if !pattern.starts_with('*') {
        out.push('^');
    }
    out.push_str(body);
    if !pattern.ends_with('*') {
        out.push('$');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntitySchema;

    fn person() -> EntitySchema {
        EntitySchema::new("Person")
            .string("firstname")
            .string("lastname")
            .number("age")
            .collection_of("tags", crate::schema::PropertyKind::Scalar(ScalarType::String))
    }

    fn bind(method: &str, args: Vec<Param>) -> Result<Option<Predicate>, DbError> {
        let tree = PartTree::parse(method, &person())?;
        let mut next = 0;
        let slots: Vec<Vec<usize>> = tree
            .clauses()
            .map(|c| {
                let n = c.operator.arity().0;
                let s = (next..next + n).collect();
                next += n;
                s
            })
            .collect();
        Predicate::build(&tree, &slots, &args, 1000)
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let p = bind("findByFirstnameAndLastnameOrAge", crate::params!["Dave", "Matthews", 39]).unwrap().unwrap();
        let Predicate::Or(groups) = &p else { panic!("{p:?}") };
        assert!(matches!(groups[0], Predicate::And(ref leaves) if leaves.len() == 2));
        assert!(matches!(groups[1], Predicate::Leaf(_)));
    }

    #[test]
    fn between_needs_comparable_bounds() {
        let err = bind("findByAgeBetween", crate::params![10, "x"]).unwrap_err();
        assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
        let p = bind("findByAgeBetween", crate::params![10, 20.5]).unwrap().unwrap();
        assert_eq!(
            p.to_filter(),
            Filter::And(vec![
                Filter::Cmp { path: "age".into(), op: CmpOp::Gt, value: Bson::Int32(10) },
                Filter::Cmp { path: "age".into(), op: CmpOp::Lt, value: Bson::Double(20.5) },
            ])
        );
    }

    #[test]
    fn in_requires_a_sequence() {
        let err = bind("findByFirstnameIn", crate::params!["x"]).unwrap_err();
        assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
        assert!(bind("findByFirstnameIn", crate::params![vec!["x", "y"]]).is_ok());
    }

    #[test]
    fn declared_scalar_types_are_enforced() {
        let err = bind("findByAgeGreaterThan", crate::params!["old"]).unwrap_err();
        assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
    }

    #[test]
    fn containing_on_collections_is_membership() {
        let p = bind("findByTagsContaining", crate::params!["x"]).unwrap().unwrap();
        assert_eq!(p.to_filter(), Filter::Cmp { path: "tags".into(), op: CmpOp::Eq, value: "x".into() });
        let p = bind("findByLastnameContaining", crate::params!["a.b"]).unwrap().unwrap();
        assert_eq!(
            p.to_filter(),
            Filter::Regex { path: "lastname".into(), pattern: "a\\.b".into(), case_insensitive: false }
        );
    }

    #[test]
    fn ignore_case_equality_is_anchored_regex() {
        let p = bind("findByLastnameIgnoreCase", crate::params!["matthews"]).unwrap().unwrap();
        assert_eq!(
            p.to_filter(),
            Filter::Regex { path: "lastname".into(), pattern: "^matthews$".into(), case_insensitive: true }
        );
    }

    #[test]
    fn like_wildcards_control_anchoring() {
        assert_eq!(like_to_regex("Dav*"), "^Dav");
        assert_eq!(like_to_regex("*ave"), "ave$");
        assert_eq!(like_to_regex("*av*"), "av");
        assert_eq!(like_to_regex("D*e"), "^D.*e$");
        assert_eq!(like_to_regex("Dave"), "^Dave$");
    }
}
