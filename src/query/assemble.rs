use serde_json::json;
use std::sync::Arc;

use super::keyword::{Operator, ValueShape};
use super::params::Param;
use super::path::PropertyPath;
use super::predicate::{NearQuery, Predicate};
use super::signature::{MethodSignature, ParamKind, ResultShape};
use super::template::QueryTemplate;
use super::tokenize::{PartTree, QueryKind};
use super::types::{Filter, FindOptions, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, PageRequest, Sort, SortSpec};
use crate::errors::DbError;
use crate::schema::EntitySchema;

#[derive(Debug, Clone, PartialEq)]
enum QuerySource {
    /// Derived from the method name; `slots[i]` are the parameter indices of clause `i`.
    Derived { tree: PartTree, slots: Vec<Vec<usize>> },
    Explicit { template: QueryTemplate, name_limit: Option<usize> },
}

/// Immutable result of compiling one method signature against an entity schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    signature: MethodSignature,
    shape: ResultShape,
    source: QuerySource,
    projection: Option<Vec<String>>,
    sort_param: Option<usize>,
    page_param: Option<usize>,
    // Call-time sort keys resolve against it
    schema: Arc<EntitySchema>,
}

/// Everything the execution pipeline needs for one call. Built once per call, then read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpecification {
    method: String,
    shape: ResultShape,
    predicate: Option<Predicate>,
    filter: Filter,
    sort: Option<Sort>,
    page: Option<PageRequest>,
    limit: Option<usize>,
    projection: Option<Vec<String>>,
    near: Option<NearQuery>,
}

fn single_special(sig: &MethodSignature, kind: ParamKind) -> Result<Option<usize>, DbError> {
    let mut found = sig.params().iter().enumerate().filter(|(_, k)| **k == kind).map(|(i, _)| i);
    let first = found.next();
    if found.next().is_some() {
        return Err(DbError::mismatch(sig.name(), format!("at most one {kind:?} parameter is allowed")));
    }
    Ok(first)
}

/// Map call-time sort keys onto schema paths. `_id` is always accepted.
pub(crate) fn resolve_sort(sort: Sort, schema: &EntitySchema, method: &str) -> Result<Sort, DbError> {
    sort.0
        .into_iter()
        .map(|spec| {
            let field = if spec.field == "_id" {
                spec.field
            } else {
                PropertyPath::resolve_dotted(schema, &spec.field, method)?.dotted()
            };
            Ok(SortSpec { field, order: spec.order })
        })
        .collect::<Result<Vec<_>, DbError>>()
        .map(Sort)
}

fn kind_from_name(name: &str) -> QueryKind {
    let starts = |p: &str| name.starts_with(p) && name[p.len()..].starts_with(|c: char| c.is_ascii_uppercase());
    if starts("count") {
        QueryKind::Count
    } else if starts("exists") {
        QueryKind::Exists
    } else {
        QueryKind::Find
    }
}

fn shape_for(sig: &MethodSignature, kind: QueryKind) -> Result<ResultShape, DbError> {
    let implied = match kind {
        QueryKind::Find => ResultShape::List,
        QueryKind::Count => ResultShape::Count,
        QueryKind::Exists => ResultShape::Exists,
    };
    let Some(declared) = sig.declared_returns() else { return Ok(implied) };
    let compatible = match kind {
        QueryKind::Find => !matches!(declared, ResultShape::Count | ResultShape::Exists),
        QueryKind::Count | QueryKind::Exists => declared == implied,
    };
    if !compatible {
        return Err(DbError::mismatch(
            sig.name(),
            format!("declared result {declared:?} does not match the {kind:?} prefix"),
        ));
    }
    Ok(declared)
}

/// Consume value parameters clause by clause in declaration order.
fn bind_slots(sig: &MethodSignature, tree: &PartTree) -> Result<Vec<Vec<usize>>, DbError> {
    let method = sig.name();
    let values = sig.value_param_indices();
    let min_required: usize = tree.clauses().map(|c| c.operator.arity().0).sum();
    let too_few = || DbError::ParameterCountMismatch {
        method: method.to_string(),
        expected: min_required.max(values.len() + 1),
        actual: values.len(),
    };
    let mut next = values.iter().copied().peekable();
    let mut slots = Vec::new();
    for clause in tree.clauses() {
        let op = clause.operator;
        let field = clause.path.dotted();
        let mut take = |accept: &dyn Fn(ParamKind) -> bool, wanted: &str| -> Result<usize, DbError> {
            let i = next.next().ok_or_else(too_few)?;
            let kind = sig.params()[i];
            if accept(kind) {
                Ok(i)
            } else {
                Err(DbError::mismatch(
                    method,
                    format!("parameter {i} ({kind:?}) cannot bind {} on `{field}`, expected {wanted}", op.name()),
                ))
            }
        };
        let slot = match op.value_shape() {
            ValueShape::None => Vec::new(),
            ValueShape::Single => {
                let array_ok = matches!(op, Operator::Equals | Operator::NotEquals);
                vec![take(&|k| k == ParamKind::Value || (array_ok && k == ParamKind::Sequence), "a value")?]
            }
            ValueShape::Pair => vec![
                take(&|k| k == ParamKind::Value, "a value")?,
                take(&|k| k == ParamKind::Value, "a value")?,
            ],
            ValueShape::Sequence => {
                vec![take(&|k| matches!(k, ParamKind::Sequence | ParamKind::Value), "a sequence")?]
            }
            ValueShape::Point => {
                let mut s = vec![take(&|k| k == ParamKind::Point, "a point")?];
                if let Some(&i) = next.peek()
                    && sig.params()[i] == ParamKind::Distance
                {
                    next.next();
                    s.push(i);
                }
                s
            }
            ValueShape::Area => vec![take(&ParamKind::is_area, "a circle, box or polygon")?],
        };
        slots.push(slot);
    }
    let leftover = next.count();
    if leftover > 0 {
        return Err(DbError::ParameterCountMismatch {
            method: method.to_string(),
            expected: values.len() - leftover,
            actual: values.len(),
        });
    }
    Ok(slots)
}

fn check_geo_shape(sig: &MethodSignature, tree: &PartTree, slots: &[Vec<usize>], shape: ResultShape) -> Result<(), DbError> {
    let method = sig.name();
    let nears: Vec<usize> = tree
        .clauses()
        .enumerate()
        .filter(|(_, c)| c.operator == Operator::Near)
        .map(|(i, _)| i)
        .collect();
    if nears.len() > 1 {
        return Err(DbError::geo_shape(method, format!("{} Near clauses; at most one is allowed", nears.len())));
    }
    if !nears.is_empty() && tree.groups.len() > 1 {
        return Err(DbError::geo_shape(method, "Near cannot be combined with Or"));
    }
    if shape.is_distance_ranked() {
        let with_distance = nears.first().is_some_and(|i| slots.get(*i).is_some_and(|s| s.len() == 2));
        if !with_distance {
            return Err(DbError::geo_shape(
                method,
                format!("{shape:?} needs exactly one Near clause bound with a Distance"),
            ));
        }
    }
    Ok(())
}

fn resolve_projection(sig: &MethodSignature, schema: &EntitySchema) -> Result<Option<Vec<String>>, DbError> {
    let Some(fields) = sig.projection() else { return Ok(None) };
    if fields.len() > MAX_PROJECTION_FIELDS {
        return Err(DbError::mismatch(sig.name(), format!("projection lists {} fields", fields.len())));
    }
    fields
        .iter()
        .map(|f| {
            let path = if f.contains('.') {
                PropertyPath::resolve_dotted(schema, f, sig.name())?
            } else {
                PropertyPath::resolve(schema, f, sig.name())?
            };
            Ok(path.dotted())
        })
        .collect::<Result<Vec<_>, DbError>>()
        .map(Some)
}

impl CompiledQuery {
    /// Compile `signature` against `schema`.
    ///
    /// # Errors
    /// Any of the compile-time `DbError` variants, naming the method and the reason.
    pub fn compile(signature: &MethodSignature, schema: &EntitySchema) -> Result<Self, DbError> {
        let started = std::time::Instant::now();
        let sort_param = single_special(signature, ParamKind::Sort)?;
        let page_param = single_special(signature, ParamKind::Page)?;
        let mut projection = resolve_projection(signature, schema)?;

        let (source, shape) = if let Some(query) = signature.query() {
            let template = QueryTemplate::compile(
                signature.name(),
                query,
                signature.fields(),
                signature.value_param_indices().len(),
            )?;
            if let Some(fields) = template.fields() {
                projection = Some(fields.to_vec());
            }
            let shape = shape_for(signature, kind_from_name(signature.name()))?;
            if shape.is_distance_ranked() {
                return Err(DbError::geo_shape(signature.name(), "explicit queries cannot rank by distance"));
            }
            let name_limit = PartTree::parse(signature.name(), schema).ok().and_then(|t| t.limit);
            (QuerySource::Explicit { template, name_limit }, shape)
        } else {
            let tree = PartTree::parse(signature.name(), schema)?;
            if tree.order_by.len() > MAX_SORT_FIELDS {
                return Err(DbError::malformed(signature.name(), format!("{} sort keys", tree.order_by.len())));
            }
            let shape = shape_for(signature, tree.kind)?;
            let slots = bind_slots(signature, &tree)?;
            check_geo_shape(signature, &tree, &slots, shape)?;
            (QuerySource::Derived { tree, slots }, shape)
        };

        if shape.is_paged() && page_param.is_none() {
            return Err(DbError::mismatch(signature.name(), format!("{shape:?} results need a Page parameter")));
        }

        let compiled = Self {
            signature: signature.clone(),
            shape,
            source,
            projection,
            sort_param,
            page_param,
            schema: Arc::new(schema.clone()),
        };
        crate::utils::devlog::bench(
            "compile",
            started.elapsed(),
            serde_json::json!({ "method": signature.name(), "entity": signature.entity() }),
        );
        Ok(compiled)
    }

    #[must_use]
    pub const fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    #[must_use]
    pub const fn shape(&self) -> ResultShape {
        self.shape
    }

    /// Parsed method name, absent for explicit queries.
    #[must_use]
    pub const fn part_tree(&self) -> Option<&PartTree> {
        match &self.source {
            QuerySource::Derived { tree, .. } => Some(tree),
            QuerySource::Explicit { .. } => None,
        }
    }

    /// True when `args` match the declared parameter kinds; used to pick among overloads.
    #[must_use]
    pub fn accepts(&self, args: &[Param]) -> bool {
        args.len() == self.signature.params().len()
            && args.iter().zip(self.signature.params()).all(|(a, k)| a.fits(*k))
    }

    /// Bind call arguments into a query specification.
    ///
    /// # Errors
    /// `ParameterCountMismatch` or `ClauseTypeMismatch` when `args` do not fit,
    /// `InvalidGeometry` for invalid shapes.
    pub fn bind(&self, args: &[Param], max_in_set: usize) -> Result<QuerySpecification, DbError> {
        let method = self.signature.name();
        let kinds = self.signature.params();
        if args.len() != kinds.len() {
            return Err(DbError::ParameterCountMismatch {
                method: method.to_string(),
                expected: kinds.len(),
                actual: args.len(),
            });
        }
        for (i, (arg, kind)) in args.iter().zip(kinds).enumerate() {
            if !arg.fits(*kind) {
                return Err(DbError::mismatch(
                    method,
                    format!("argument {i} is a {}, declared {kind:?}", arg.kind_name()),
                ));
            }
        }

        let explicit_sort = match self.sort_param.and_then(|i| args.get(i)) {
            Some(Param::Sort(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };
        let page = match self.page_param.and_then(|i| args.get(i)) {
            Some(Param::Page(p)) => Some(p.clone()),
            _ => None,
        };
        let page_sort = page.as_ref().and_then(|p| p.sort.clone()).filter(|s| !s.is_empty());

        let (predicate, filter, name_sort, limit) = match &self.source {
            QuerySource::Derived { tree, slots } => {
                let predicate = Predicate::build(tree, slots, args, max_in_set)?;
                let filter = predicate.as_ref().map_or(Filter::True, Predicate::to_filter);
                (predicate, filter, tree.order_sort(), tree.limit)
            }
            QuerySource::Explicit { template, name_limit } => {
                let values: Vec<&Param> =
                    self.signature.value_param_indices().into_iter().filter_map(|i| args.get(i)).collect();
                (None, template.render(method, &values)?, None, *name_limit)
            }
        };
        let near = predicate.as_ref().and_then(Predicate::near);
        let sort = match explicit_sort.or(page_sort) {
            Some(call_sort) => Some(resolve_sort(call_sort, &self.schema, method)?),
            None => name_sort,
        };
        if sort.as_ref().is_some_and(|s| s.specs().len() > MAX_SORT_FIELDS) {
            return Err(DbError::mismatch(method, format!("sort exceeds {MAX_SORT_FIELDS} keys")));
        }

        Ok(QuerySpecification {
            method: method.to_string(),
            shape: self.shape,
            predicate,
            filter,
            sort,
            page,
            limit,
            projection: self.projection.clone(),
            near,
        })
    }

    /// JSON summary of the compiled structure.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        let mut out = json!({
            "signature": self.signature.to_string(),
            "shape": format!("{:?}", self.shape),
            "projection": self.projection,
        });
        match &self.source {
            QuerySource::Derived { tree, slots } => {
                let clauses: Vec<serde_json::Value> = tree
                    .clauses()
                    .zip(slots)
                    .map(|(c, s)| {
                        json!({
                            "path": c.path.dotted(),
                            "operator": c.operator.name(),
                            "ignore_case": c.ignore_case,
                            "params": s,
                        })
                    })
                    .collect();
                out["kind"] = json!(format!("{:?}", tree.kind));
                out["limit"] = json!(tree.limit);
                out["or_groups"] = json!(tree.groups.iter().map(Vec::len).collect::<Vec<_>>());
                out["clauses"] = json!(clauses);
                out["order_by"] = json!(tree.order_sort().map(|s| s.0));
            }
            QuerySource::Explicit { template, .. } => {
                out["query"] = json!(template.query());
            }
        }
        out
    }
}

impl QuerySpecification {
    /// Match-everything specification for the repository's built-in `find_all`/`count_all`.
    pub(crate) fn unfiltered(method: &str, shape: ResultShape, sort: Option<Sort>) -> Self {
        Self {
            method: method.to_string(),
            shape,
            predicate: None,
            filter: Filter::True,
            sort: sort.filter(|s| !s.is_empty()),
            page: None,
            limit: None,
            projection: None,
            near: None,
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub const fn shape(&self) -> ResultShape {
        self.shape
    }

    #[must_use]
    pub const fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    #[must_use]
    pub const fn filter(&self) -> &Filter {
        &self.filter
    }

    #[must_use]
    pub const fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    #[must_use]
    pub const fn page(&self) -> Option<&PageRequest> {
        self.page.as_ref()
    }

    /// Result cap from a `FirstN`/`TopN` subject.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    #[must_use]
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    #[must_use]
    pub const fn near(&self) -> Option<&NearQuery> {
        self.near.as_ref()
    }

    /// Store options: sort, page window (capped by the subject limit), projection.
    #[must_use]
    pub fn find_options(&self) -> FindOptions {
        let (skip, limit) = match (&self.page, self.limit) {
            (Some(p), cap) => (Some(p.offset()), Some(cap.map_or(p.size(), |c| c.min(p.size())))),
            (None, cap) => (None, cap),
        };
        FindOptions {
            projection: self.projection.clone(),
            sort: self.sort.as_ref().map(|s| s.0.clone()),
            limit,
            skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Distance, Point};
    use crate::params;
    use crate::query::types::CmpOp;

    fn person() -> EntitySchema {
        EntitySchema::new("Person")
            .string("firstname")
            .string("lastname")
            .number("age")
            .geo_point("location")
    }

    fn compile(sig: MethodSignature) -> Result<CompiledQuery, DbError> {
        CompiledQuery::compile(&sig.for_entity("Person"), &person())
    }

    #[test]
    fn arity_mismatch_is_reported_at_compile_time() {
        let err = compile(MethodSignature::new("findByAgeBetween", [ParamKind::Value])).unwrap_err();
        assert!(matches!(err, DbError::ParameterCountMismatch { expected: 2, actual: 1, .. }), "{err}");
        let err = compile(MethodSignature::new("findByLastname", [ParamKind::Value, ParamKind::Value])).unwrap_err();
        assert!(matches!(err, DbError::ParameterCountMismatch { expected: 1, actual: 2, .. }), "{err}");
    }

    #[test]
    fn special_parameters_do_not_bind_clauses() {
        let q = compile(
            MethodSignature::new("findByLastname", [ParamKind::Sort, ParamKind::Value, ParamKind::Page])
                .returns(ResultShape::Page),
        )
        .unwrap();
        let spec = q
            .bind(&params![Sort::desc("age"), "Matthews", PageRequest::new(1, 2).unwrap()], 1000)
            .unwrap();
        assert_eq!(spec.filter(), &Filter::Cmp { path: "lastname".into(), op: CmpOp::Eq, value: "Matthews".into() });
        let opts = spec.find_options();
        assert_eq!((opts.skip, opts.limit), (Some(2), Some(2)));
        let mut keys: Vec<String> = serde_json::to_value(&opts)
            .unwrap()
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        assert_eq!(keys, ["limit", "projection", "skip", "sort"]);
    }

    #[test]
    fn call_time_sort_keys_resolve_against_the_schema() {
        let q = compile(MethodSignature::new("findByLastname", [ParamKind::Value, ParamKind::Sort])).unwrap();
        let spec = q.bind(&params!["M", Sort::desc("FirstName")], 1000).unwrap();
        assert_eq!(spec.sort(), Some(&Sort::desc("firstname")));
        let spec = q.bind(&params!["M", Sort::asc("_id")], 1000).unwrap();
        assert_eq!(spec.sort(), Some(&Sort::asc("_id")));
        let err = q.bind(&params!["M", Sort::asc("agee")], 1000).unwrap_err();
        assert!(matches!(err, DbError::UnresolvedProperty { ref token, .. } if token == "agee"), "{err}");

        let paged = compile(
            MethodSignature::new("findByLastname", [ParamKind::Value, ParamKind::Page]).returns(ResultShape::Page),
        )
        .unwrap();
        let page = PageRequest::new(0, 5).unwrap().with_sort(Sort::asc("nickname"));
        let err = paged.bind(&params!["M", page], 1000).unwrap_err();
        assert!(matches!(err, DbError::UnresolvedProperty { .. }), "{err}");
    }

    #[test]
    fn sort_precedence_is_argument_then_page_then_name() {
        let q = compile(MethodSignature::new(
            "findByLastnameOrderByFirstnameAsc",
            [ParamKind::Value, ParamKind::Sort, ParamKind::Page],
        ))
        .unwrap();
        let page = PageRequest::new(0, 5).unwrap().with_sort(Sort::asc("age"));
        let spec = q.bind(&params!["M", Sort::desc("age"), page.clone()], 1000).unwrap();
        assert_eq!(spec.sort(), Some(&Sort::desc("age")));
        let spec = q.bind(&params!["M", Sort::default(), page], 1000).unwrap();
        assert_eq!(spec.sort(), Some(&Sort::asc("age")));
        let spec = q.bind(&params!["M", Sort::default(), PageRequest::new(0, 5).unwrap()], 1000).unwrap();
        assert_eq!(spec.sort(), Some(&Sort::asc("firstname")));
    }

    #[test]
    fn geo_results_need_near_with_distance() {
        let err = compile(MethodSignature::new("findByLocationNear", [ParamKind::Point]).returns(ResultShape::GeoResults))
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidGeoQueryShape { .. }), "{err}");
        let q = compile(
            MethodSignature::new("findByLocationNear", [ParamKind::Point, ParamKind::Distance])
                .returns(ResultShape::GeoResults),
        )
        .unwrap();
        let spec = q.bind(&params![Point::new(1.0, 2.0), Distance::new(3.0)], 1000).unwrap();
        assert_eq!(spec.near().map(|n| n.center), Some(Point::new(1.0, 2.0)));
    }

    #[test]
    fn two_near_clauses_are_rejected() {
        let err = compile(MethodSignature::new(
            "findByLocationNearAndLocationNear",
            [ParamKind::Point, ParamKind::Point],
        ))
        .unwrap_err();
        assert!(matches!(err, DbError::InvalidGeoQueryShape { .. }), "{err}");
    }

    #[test]
    fn runtime_arguments_are_rechecked() {
        let q = compile(MethodSignature::new("findByLastname", [ParamKind::Value])).unwrap();
        assert!(matches!(q.bind(&[], 10), Err(DbError::ParameterCountMismatch { .. })));
        assert!(matches!(
            q.bind(&params![Point::new(0.0, 0.0)], 10),
            Err(DbError::ClauseTypeMismatch { .. })
        ));
    }

    #[test]
    fn page_shape_needs_a_page_parameter() {
        let err = compile(MethodSignature::new("findByLastname", [ParamKind::Value]).returns(ResultShape::Page))
            .unwrap_err();
        assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
    }

    #[test]
    fn subject_limit_caps_page_size() {
        let q = compile(MethodSignature::new("findTop3ByLastname", [ParamKind::Value, ParamKind::Page])).unwrap();
        let spec = q.bind(&params!["M", PageRequest::new(2, 10).unwrap()], 10).unwrap();
        let opts = spec.find_options();
        assert_eq!((opts.skip, opts.limit), (Some(20), Some(3)));
    }
}
