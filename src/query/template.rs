use bson::Bson;
use regex::Regex;
use std::sync::LazyLock;

use super::params::Param;
use super::parse::{check_operators, parse_filter_json};
use super::types::{Filter, MAX_PROJECTION_FIELDS};
use crate::errors::DbError;
use crate::utils::json::{bson_to_json_text, normalize_quotes};

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\?(\d+)").ok());

/// A hand-written query with `?N` placeholders bound to the method's value parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplate {
    query: String,
    fields: Option<Vec<String>>,
}

impl QueryTemplate {
    /// Validate `query` (and the optional `fields` selection) for a method with
    /// `value_params` bindable parameters.
    ///
    /// # Errors
    /// `ParameterCountMismatch` for a placeholder past the last parameter,
    /// `MalformedQueryName` when either template does not parse.
    pub fn compile(method: &str, query: &str, fields: Option<&str>, value_params: usize) -> Result<Self, DbError> {
        let query = normalize_quotes(query);
        if let Some(max) = placeholders(&query).max()
            && max >= value_params
        {
            return Err(DbError::ParameterCountMismatch {
                method: method.to_string(),
                expected: max + 1,
                actual: value_params,
            });
        }
        // Operand types depend on the bound values and are checked by `render`.
        let probe = substitute(&query, |_| Some("null".to_string()));
        check_structure(&probe).map_err(|e| DbError::malformed(method, format!("query template: {e}")))?;
        let fields = fields.map(|f| parse_fields(method, f)).transpose()?;
        Ok(Self { query, fields })
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// Substitute `values` and parse the result.
    ///
    /// # Errors
    /// `ClauseTypeMismatch` when a placeholder is bound to a non-value argument.
    pub fn render(&self, method: &str, values: &[&Param]) -> Result<Filter, DbError> {
        let mut bad = None;
        let text = substitute(&self.query, |i| match values.get(i) {
            Some(Param::Value(v)) => Some(bson_to_json_text(v)),
            Some(Param::Point(p)) => Some(bson_to_json_text(&p.to_bson())),
            Some(other) => {
                bad = Some(format!("placeholder ?{i} cannot take a {} argument", other.kind_name()));
                None
            }
            None => {
                bad = Some(format!("placeholder ?{i} has no argument"));
                None
            }
        });
        if let Some(reason) = bad {
            return Err(DbError::mismatch(method, reason));
        }
        parse_filter_json(&text).map_err(|e| DbError::mismatch(method, format!("bound query: {e}")))
    }
}

fn check_structure(text: &str) -> Result<(), DbError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    check_operators(&crate::utils::json::json_value_to_bson_document(value)?)
}

fn placeholders(text: &str) -> impl Iterator<Item = usize> + '_ {
    PLACEHOLDER
        .as_ref()
        .into_iter()
        .flat_map(move |re| re.captures_iter(text).filter_map(|c| c.get(1)?.as_str().parse().ok()))
}

fn substitute(text: &str, mut value: impl FnMut(usize) -> Option<String>) -> String {
    let Some(re) = PLACEHOLDER.as_ref() else { return text.to_string() };
    re.replace_all(text, |c: &regex::Captures<'_>| {
        c.get(1)
            .and_then(|m| m.as_str().parse().ok())
            .and_then(&mut value)
            .unwrap_or_else(|| "null".to_string())
    })
    .into_owned()
}

/// `{ 'firstname': 1, 'address.city': true }` into included field paths.
fn parse_fields(method: &str, fields: &str) -> Result<Vec<String>, DbError> {
    let value: serde_json::Value = serde_json::from_str(&normalize_quotes(fields))
        .map_err(|e| DbError::malformed(method, format!("fields template: {e}")))?;
    let doc = crate::utils::json::json_value_to_bson_document(value)
        .map_err(|e| DbError::malformed(method, format!("fields template: {e}")))?;
    let included: Vec<String> = doc
        .iter()
        .filter(|(_, v)| match v {
            Bson::Boolean(b) => *b,
            Bson::Int32(i) => *i != 0,
            Bson::Int64(i) => *i != 0,
            Bson::Double(f) => *f != 0.0,
            _ => false,
        })
        .map(|(k, _)| k.clone())
        .take(MAX_PROJECTION_FIELDS)
        .collect();
    if included.is_empty() {
        return Err(DbError::malformed(method, "fields template selects nothing"));
    }
    Ok(included)
}
