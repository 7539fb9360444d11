use bson::{Bson, Document as BsonDocument, doc};

use super::types::{CmpOp, Filter};

impl Filter {
    /// Render as a Mongo-style query document.
    ///
    /// Conjunctions over distinct fields merge into one document; colliding keys
    /// fall back to an explicit `$and`.
    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        match self {
            Self::True => BsonDocument::new(),
            Self::And(children) => render_and(children),
            Self::Or(children) => doc! { "$or": render_all(children) },
            Self::Not(inner) => doc! { "$nor": [inner.to_document()] },
            Self::Exists { path, exists } => field(path, doc! { "$exists": *exists }),
            Self::In { path, values } => field(path, doc! { "$in": values.clone() }),
            Self::Nin { path, values } => field(path, doc! { "$nin": values.clone() }),
            Self::Cmp { path, op: CmpOp::Eq, value } => {
                let mut out = BsonDocument::new();
                out.insert(path.as_str(), value.clone());
                out
            }
            Self::Cmp { path, op, value } => {
                let mut inner = BsonDocument::new();
                inner.insert(op.symbol(), value.clone());
                field(path, inner)
            }
            Self::Regex { path, pattern, case_insensitive } => {
                let mut inner = doc! { "$regex": pattern.as_str() };
                if *case_insensitive {
                    inner.insert("$options", "i");
                }
                field(path, inner)
            }
            Self::Geo { path, shape } => field(path, shape.to_query_document()),
        }
    }

    /// Stable digest of the rendered document, used to correlate log lines.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let text = crate::utils::json::bson_to_json_text(&Bson::Document(self.to_document()));
        super::telemetry::sha256_hex(&text)
    }
}

fn field(path: &str, value: BsonDocument) -> BsonDocument {
    let mut out = BsonDocument::new();
    out.insert(path, value);
    out
}

fn render_all(children: &[Filter]) -> Vec<Bson> {
    children.iter().map(|c| Bson::Document(c.to_document())).collect()
}

fn is_operator_doc(v: &Bson) -> bool {
    matches!(v, Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')))
}

fn render_and(children: &[Filter]) -> BsonDocument {
    let mut out = BsonDocument::new();
    for child in children {
        for (key, value) in child.to_document() {
            match out.get_mut(&key) {
                None => {
                    out.insert(key, value);
                }
                Some(existing) if is_operator_doc(existing) && is_operator_doc(&value) => {
                    let (Bson::Document(have), Bson::Document(add)) = (existing, value) else {
                        return doc! { "$and": render_all(children) };
                    };
                    if add.keys().any(|k| have.contains_key(k)) {
                        return doc! { "$and": render_all(children) };
                    }
                    for (k, v) in add {
                        have.insert(k, v);
                    }
                }
                Some(_) => return doc! { "$and": render_all(children) },
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Circle, GeoShape};

    fn cmp(path: &str, op: CmpOp, value: impl Into<Bson>) -> Filter {
        Filter::Cmp { path: path.into(), op, value: value.into() }
    }

    #[test]
    fn conjunction_merges_range_on_one_field() {
        let f = Filter::And(vec![cmp("age", CmpOp::Gt, 20), cmp("age", CmpOp::Lt, 40)]);
        assert_eq!(f.to_document(), doc! { "age": { "$gt": 20, "$lt": 40 } });
    }

    #[test]
    fn conjunction_with_colliding_keys_uses_and() {
        let f = Filter::And(vec![cmp("age", CmpOp::Eq, 20), cmp("age", CmpOp::Gt, 10)]);
        assert_eq!(
            f.to_document(),
            doc! { "$and": [ { "age": 20 }, { "age": { "$gt": 10 } } ] }
        );
    }

    #[test]
    fn disjunction_and_negation() {
        let f = Filter::Or(vec![
            cmp("firstname", CmpOp::Eq, "Dave"),
            Filter::Not(Box::new(Filter::Regex {
                path: "lastname".into(),
                pattern: "^M".into(),
                case_insensitive: true,
            })),
        ]);
        assert_eq!(
            f.to_document(),
            doc! { "$or": [
                { "firstname": "Dave" },
                { "$nor": [ { "lastname": { "$regex": "^M", "$options": "i" } } ] },
            ] }
        );
    }

    #[test]
    fn geo_within_circle() {
        let f = Filter::Geo { path: "location".into(), shape: GeoShape::Circle(Circle::new(1.0, 2.0, 0.5)) };
        assert_eq!(
            f.to_document(),
            doc! { "location": { "$within": { "$center": [[1.0, 2.0], 0.5] } } }
        );
    }

    #[test]
    fn fingerprint_is_stable_and_value_sensitive() {
        let a = cmp("lastname", CmpOp::Eq, "Matthews");
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), cmp("lastname", CmpOp::Eq, "Beauford").fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
