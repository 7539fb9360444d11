use bson::{Bson, Document as BsonDocument};

use super::types::{CmpOp, Filter};
use crate::errors::DbError;
use crate::geo::{Circle, Distance, GeoBox, GeoShape, Metric, Point, Polygon};

/// Parse a JSON query text (`{"lastname": "x", "age": {"$gt": 3}}`) into a [`Filter`].
///
/// # Errors
/// Returns `DbError::Json` for invalid JSON and `DbError::Config` for unsupported operators.
pub fn parse_filter_json(json: &str) -> Result<Filter, DbError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let doc = crate::utils::json::json_value_to_bson_document(value)?;
    parse_filter_document(&doc)
}

/// Parse a Mongo-style query document into a [`Filter`]. Top-level keys are conjoined.
///
/// # Errors
/// Returns `DbError::Config` naming the first unsupported construct.
pub fn parse_filter_document(doc: &BsonDocument) -> Result<Filter, DbError> {
    let mut parts = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        parts.push(match key.as_str() {
            "$and" => Filter::And(parse_list(key, value)?),
            "$or" => Filter::Or(parse_list(key, value)?),
            "$nor" => Filter::Not(Box::new(Filter::or(parse_list(key, value)?))),
            k if k.starts_with('$') => return Err(unsupported(k)),
            field => parse_field(field, value)?,
        });
    }
    Ok(Filter::and(parts))
}

/// Check that every `$` key in `doc` is an operator [`parse_filter_document`] knows,
/// without looking at operand types. Used for templates whose values are still placeholders.
///
/// # Errors
/// Returns `DbError::Config` naming the first unsupported operator or misplaced list.
pub fn check_operators(doc: &BsonDocument) -> Result<(), DbError> {
    for (key, value) in doc {
        match key.as_str() {
            "$and" | "$or" | "$nor" => match value {
                Bson::Array(items) => {
                    for item in items {
                        match item {
                            Bson::Document(d) => check_operators(d)?,
                            Bson::Null => {}
                            _ => return Err(DbError::Config(format!("{key} entries must be documents"))),
                        }
                    }
                }
                Bson::Null => {}
                _ => return Err(DbError::Config(format!("{key} expects an array"))),
            },
            k if k.starts_with('$') => return Err(unsupported(k)),
            _ => check_field_operators(value)?,
        }
    }
    Ok(())
}

const FIELD_OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$exists", "$regex", "$options", "$not", "$near",
    "$nearSphere", "$maxDistance", "$within", "$geoWithin",
];

const SHAPE_OPERATORS: &[&str] = &["$center", "$box", "$polygon"];

fn check_field_operators(value: &Bson) -> Result<(), DbError> {
    let Bson::Document(ops) = value else { return Ok(()) };
    if !is_operator_doc(ops) {
        return Ok(());
    }
    for (op, arg) in ops {
        if !FIELD_OPERATORS.contains(&op.as_str()) {
            return Err(unsupported(op));
        }
        match (op.as_str(), arg) {
            ("$not", _) => check_field_operators(arg)?,
            ("$within" | "$geoWithin", Bson::Document(shape)) => {
                if let Some(k) = shape.keys().find(|k| !SHAPE_OPERATORS.contains(&k.as_str())) {
                    return Err(unsupported(k));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_list(key: &str, value: &Bson) -> Result<Vec<Filter>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::Config(format!("{key} expects an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => parse_filter_document(d),
            _ => Err(DbError::Config(format!("{key} entries must be documents"))),
        })
        .collect()
}

fn is_operator_doc(d: &BsonDocument) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

fn parse_field(field: &str, value: &Bson) -> Result<Filter, DbError> {
    let Bson::Document(ops) = value else {
        return Ok(Filter::Cmp { path: field.to_string(), op: CmpOp::Eq, value: value.clone() });
    };
    if !is_operator_doc(ops) {
        return Ok(Filter::Cmp { path: field.to_string(), op: CmpOp::Eq, value: value.clone() });
    }
    let case_insensitive = matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
    let max_distance = ops.get("$maxDistance").and_then(number);
    let mut parts = Vec::new();
    for (op, arg) in ops {
        let path = field.to_string();
        let cmp = |op| Filter::Cmp { path: field.to_string(), op, value: arg.clone() };
        parts.push(match op.as_str() {
            "$eq" => cmp(CmpOp::Eq),
            "$ne" => cmp(CmpOp::Ne),
            "$gt" => cmp(CmpOp::Gt),
            "$gte" => cmp(CmpOp::Gte),
            "$lt" => cmp(CmpOp::Lt),
            "$lte" => cmp(CmpOp::Lte),
            "$in" => Filter::In { path, values: array(op, arg)? },
            "$nin" => Filter::Nin { path, values: array(op, arg)? },
            "$exists" => Filter::Exists { path, exists: truthy(arg) },
            "$regex" => match arg {
                Bson::String(p) => Filter::Regex { path, pattern: p.clone(), case_insensitive },
                _ => return Err(DbError::Config("$regex expects a string".into())),
            },
            "$not" => Filter::Not(Box::new(parse_field(field, arg)?)),
            "$near" | "$nearSphere" => {
                let center = point(op, arg)?;
                // $nearSphere distances are radians
                let max_distance = max_distance.map(|v| {
                    if op == "$near" { Distance::new(v) } else { Distance::kilometers(v * Metric::Kilometers.multiplier()) }
                });
                Filter::Geo { path, shape: GeoShape::Near { center, max_distance } }
            }
            "$within" | "$geoWithin" => Filter::Geo { path, shape: within(arg)? },
            "$options" | "$maxDistance" => continue,
            other => return Err(unsupported(other)),
        });
    }
    Ok(Filter::and(parts))
}

fn within(arg: &Bson) -> Result<GeoShape, DbError> {
    let Bson::Document(d) = arg else {
        return Err(DbError::Config("$within expects a shape document".into()));
    };
    if let Some(Bson::Array(c)) = d.get("$center")
        && let [center, radius] = c.as_slice()
    {
        let center = point("$center", center)?;
        let radius = number(radius).ok_or_else(|| DbError::Config("$center radius".into()))?;
        return Ok(GeoShape::Circle(Circle { center, radius }));
    }
    if let Some(Bson::Array(b)) = d.get("$box")
        && let [first, second] = b.as_slice()
    {
        return Ok(GeoShape::Box(GeoBox::new(point("$box", first)?, point("$box", second)?)));
    }
    if let Some(Bson::Array(p)) = d.get("$polygon") {
        let points = p.iter().map(|v| point("$polygon", v)).collect::<Result<Vec<_>, _>>()?;
        return Ok(GeoShape::Polygon(Polygon::new(points)));
    }
    Err(DbError::Config("$within expects $center, $box or $polygon".into()))
}

fn point(op: &str, v: &Bson) -> Result<Point, DbError> {
    Point::from_bson(v).ok_or_else(|| DbError::Config(format!("{op} expects a point")))
}

fn array(op: &str, v: &Bson) -> Result<Vec<Bson>, DbError> {
    match v {
        Bson::Array(a) => Ok(a.clone()),
        _ => Err(DbError::Config(format!("{op} expects an array"))),
    }
}

fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => number(other).is_none_or(|n| n != 0.0),
    }
}

#[allow(clippy::cast_precision_loss)]
fn number(v: &Bson) -> Option<f64> {
    match v {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

fn unsupported(op: &str) -> DbError {
    DbError::Config(format!("unsupported query operator {op}"))
}
