use bson::Bson;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use crate::geo::GeoShape;

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

/// Ordered list of sort directives. Field names are document paths (`address.zipCode`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort(pub Vec<SortSpec>);

impl Sort {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self(vec![SortSpec { field: field.into(), order: Order::Asc }])
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self(vec![SortSpec { field: field.into(), order: Order::Desc }])
    }

    #[must_use]
    pub fn and_asc(mut self, field: impl Into<String>) -> Self {
        self.0.push(SortSpec { field: field.into(), order: Order::Asc });
        self
    }

    #[must_use]
    pub fn and_desc(mut self, field: impl Into<String>) -> Self {
        self.0.push(SortSpec { field: field.into(), order: Order::Desc });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn specs(&self) -> &[SortSpec] {
        &self.0
    }
}

/// Zero-based page request. The size is never zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: NonZeroUsize,
    pub sort: Option<Sort>,
}

impl PageRequest {
    /// Returns `None` when `size` is zero.
    #[must_use]
    pub fn new(page: usize, size: usize) -> Option<Self> {
        NonZeroUsize::new(size).map(|size| Self { page, size, sort: None })
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size.get()
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.page.saturating_mul(self.size.get())
    }
}

/// Options for `CollectionHandle::find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    pub projection: Option<Vec<String>>,
    pub sort: Option<Vec<SortSpec>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

/// Store-agnostic predicate handed to the collection collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    Regex { path: String, pattern: String, case_insensitive: bool },
    Geo { path: String, shape: GeoShape },
}

impl Filter {
    /// Collapse single-child combinators.
    #[must_use]
    pub fn and(mut children: Vec<Self>) -> Self {
        match children.len() {
            0 => Self::True,
            1 => children.swap_remove(0),
            _ => Self::And(children),
        }
    }

    #[must_use]
    pub fn or(mut children: Vec<Self>) -> Self {
        match children.len() {
            0 => Self::True,
            1 => children.swap_remove(0),
            _ => Self::Or(children),
        }
    }

    /// First `Near` shape found in conjunctive position, used for distance ordering.
    #[must_use]
    pub fn near_clause(&self) -> Option<(&str, &GeoShape)> {
        match self {
            Self::Geo { path, shape: shape @ GeoShape::Near { .. } } => Some((path.as_str(), shape)),
            Self::And(fs) => fs.iter().find_map(Self::near_clause),
            _ => None,
        }
    }
}
