use crate::errors::DbError;

/// Convert a `serde_json::Value` that must be an object into a `bson::Document`.
///
/// # Errors
/// Returns `DbError::Config` when the value is not an object or holds values BSON cannot carry.
pub fn json_value_to_bson_document(val: serde_json::Value) -> Result<bson::Document, DbError> {
    match val {
        serde_json::Value::Object(obj) => {
            bson::Document::try_from(obj).map_err(|e| DbError::Config(e.to_string()))
        }
        other => Err(DbError::Config(format!("expected JSON object, got {other}"))),
    }
}

/// Convert any JSON value (extended JSON understood) into BSON.
///
/// # Errors
/// Returns `DbError::Config` for values BSON cannot carry.
pub fn json_to_bson(val: serde_json::Value) -> Result<bson::Bson, DbError> {
    let mut wrapper = serde_json::Map::new();
    wrapper.insert("v".into(), val);
    let mut doc = json_value_to_bson_document(serde_json::Value::Object(wrapper))?;
    doc.remove("v").ok_or_else(|| DbError::Config("empty value".into()))
}

/// Relaxed extended-JSON text for a single BSON value, used for template substitution.
#[must_use]
pub fn bson_to_json_text(value: &bson::Bson) -> String {
    value.clone().into_relaxed_extjson().to_string()
}

/// Rewrite a single-quoted Mongo-shell style document into strict JSON.
///
/// Only quote characters are touched; a single quote inside a double-quoted string is kept.
#[must_use]
pub fn normalize_quotes(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut in_double = false;
    let mut escaped = false;
    for c in template.chars() {
        match c {
            '\\' => {
                escaped = !escaped;
                out.push(c);
                continue;
            }
            '"' if !escaped => in_double = !in_double,
            '\'' if !in_double && !escaped => {
                out.push('"');
                escaped = false;
                continue;
            }
            _ => {}
        }
        escaped = false;
        out.push(c);
    }
    out
}
