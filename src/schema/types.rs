use serde::{Deserialize, Serialize};

/// Declared value type of a scalar leaf. `Any` disables operator/type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum PropertyKind {
    Scalar(ScalarType),
    Embedded(EntitySchema),
    GeoPoint,
    Collection(Box<PropertyKind>),
    /// Id reference to another entity; a leaf, never traversed.
    Reference(String),
}

impl PropertyKind {
    /// Schema reachable through this property, if it can be traversed.
    #[must_use]
    pub fn nested(&self) -> Option<&EntitySchema> {
        match self {
            Self::Embedded(s) => Some(s),
            Self::Collection(inner) => inner.nested(),
            _ => None,
        }
    }

    /// A point, or a collection of points.
    #[must_use]
    pub fn is_geo(&self) -> bool {
        match self {
            Self::GeoPoint => true,
            Self::Collection(inner) => inner.is_geo(),
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    #[must_use]
    pub const fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Self::Scalar(t) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
}

impl Property {
    /// True when a camel-case method token segment names this property.
    ///
    /// Matching ignores ASCII case and underscores, so `ZipCode` finds `zipCode` and `zip_code`.
    #[must_use]
    pub fn matches_segment(&self, segment: &str) -> bool {
        let mut a = self.name.chars().filter(|c| *c != '_');
        let mut b = segment.chars().filter(|c| *c != '_');
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x.eq_ignore_ascii_case(&y) => {}
                _ => return false,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl EntitySchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), properties: Vec::new() }
    }

    #[must_use]
    pub fn property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push(Property { name: name.into(), kind });
        self
    }

    #[must_use]
    pub fn scalar(self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.property(name, PropertyKind::Scalar(ty))
    }

    #[must_use]
    pub fn string(self, name: impl Into<String>) -> Self {
        self.scalar(name, ScalarType::String)
    }

    #[must_use]
    pub fn number(self, name: impl Into<String>) -> Self {
        self.scalar(name, ScalarType::Number)
    }

    #[must_use]
    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.scalar(name, ScalarType::Boolean)
    }

    #[must_use]
    pub fn date(self, name: impl Into<String>) -> Self {
        self.scalar(name, ScalarType::Date)
    }

    #[must_use]
    pub fn embedded(self, name: impl Into<String>, schema: EntitySchema) -> Self {
        self.property(name, PropertyKind::Embedded(schema))
    }

    #[must_use]
    pub fn geo_point(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::GeoPoint)
    }

    #[must_use]
    pub fn collection_of(self, name: impl Into<String>, element: PropertyKind) -> Self {
        self.property(name, PropertyKind::Collection(Box::new(element)))
    }

    #[must_use]
    pub fn reference(self, name: impl Into<String>, entity: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Reference(entity.into()))
    }

    /// Exact lookup by declared name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All properties a token segment may refer to.
    pub fn matching<'a>(&'a self, segment: &str) -> impl Iterator<Item = &'a Property> {
        self.properties.iter().filter(move |p| p.matches_segment(segment))
    }

    /// Dotted paths of every geospatial leaf, embedded ones included.
    #[must_use]
    pub fn geo_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_geo_paths("", &mut out, 0);
        out
    }

    fn collect_geo_paths(&self, prefix: &str, out: &mut Vec<String>, depth: usize) {
        if depth >= crate::query::MAX_PATH_DEPTH {
            return;
        }
        for p in &self.properties {
            let path = if prefix.is_empty() { p.name.clone() } else { format!("{prefix}.{}", p.name) };
            if p.kind.is_geo() {
                out.push(path);
            } else if let Some(nested) = p.kind.nested() {
                nested.collect_geo_paths(&path, out, depth + 1);
            }
        }
    }
}
