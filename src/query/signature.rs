use serde::{Deserialize, Serialize};

/// Declared kind of one method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Value,
    Sequence,
    Point,
    Distance,
    Circle,
    Box,
    Polygon,
    Sort,
    Page,
}

impl ParamKind {
    /// `Sort` and `Page` shape the query instead of binding to a clause.
    #[must_use]
    pub const fn is_special(self) -> bool {
        matches!(self, Self::Sort | Self::Page)
    }

    #[must_use]
    pub const fn is_area(self) -> bool {
        matches!(self, Self::Circle | Self::Box | Self::Polygon)
    }
}

/// What an invocation hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    List,
    One,
    Count,
    Exists,
    Page,
    GeoResults,
    GeoPage,
}

impl ResultShape {
    #[must_use]
    pub const fn is_paged(self) -> bool {
        matches!(self, Self::Page | Self::GeoPage)
    }

    #[must_use]
    pub const fn is_distance_ranked(self) -> bool {
        matches!(self, Self::GeoResults | Self::GeoPage)
    }
}

/// Declaration of one repository query method; also the compiled-query cache key.
///
/// ```
/// use nexuslite_repository::query::{MethodSignature, ParamKind, ResultShape};
///
/// let sig = MethodSignature::new("findByLastname", [ParamKind::Value])
///     .returns(ResultShape::List)
///     .project(["firstname", "lastname"]);
/// assert_eq!(sig.params().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    #[serde(default)]
    entity: String,
    name: String,
    #[serde(default)]
    params: Vec<ParamKind>,
    #[serde(default)]
    returns: Option<ResultShape>,
    #[serde(default)]
    projection: Option<Vec<String>>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    fields: Option<String>,
}

impl MethodSignature {
    #[must_use]
    pub fn new(name: impl Into<String>, params: impl IntoIterator<Item = ParamKind>) -> Self {
        Self {
            entity: String::new(),
            name: name.into(),
            params: params.into_iter().collect(),
            returns: None,
            projection: None,
            query: None,
            fields: None,
        }
    }

    /// Declared result shape. Without it the prefix decides (`count`, `exists`, else list).
    #[must_use]
    pub const fn returns(mut self, shape: ResultShape) -> Self {
        self.returns = Some(shape);
        self
    }

    /// Restrict returned fields to these properties (camel tokens or dotted paths).
    #[must_use]
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the derived predicate with an explicit query template using `?N` placeholders.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Field selection template for an explicit query, e.g. `{ 'firstname': 1 }`.
    #[must_use]
    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    #[must_use]
    pub fn for_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    #[must_use]
    pub const fn declared_returns(&self) -> Option<ResultShape> {
        self.returns
    }

    #[must_use]
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[must_use]
    pub fn fields(&self) -> Option<&str> {
        self.fields.as_deref()
    }

    /// Indices of parameters that bind to clauses or placeholders.
    pub(crate) fn value_param_indices(&self) -> Vec<usize> {
        self.params.iter().enumerate().filter(|(_, k)| !k.is_special()).map(|(i, _)| i).collect()
    }
}

impl std::fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| format!("{p:?}")).collect();
        write!(f, "{}::{}({})", if self.entity.is_empty() { "?" } else { &self.entity }, self.name, params.join(", "))?;
        if let Some(r) = self.returns {
            write!(f, " -> {r:?}")?;
        }
        Ok(())
    }
}
