use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use super::handle::StoreCursor;
use crate::errors::DbError;

/// Lazy, typed view over a store cursor.
///
/// The cursor is released on exhaustion, on the first error and on drop.
pub struct ResultStream<T> {
    collection: String,
    cursor: Option<Box<dyn StoreCursor>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResultStream<T> {
    pub(crate) fn new(collection: &str, cursor: Box<dyn StoreCursor>) -> Self {
        Self { collection: collection.to_string(), cursor: Some(cursor), _marker: PhantomData }
    }

    /// Restart from the first result. False once the cursor was released or the store cannot restart.
    pub fn rewind(&mut self) -> bool {
        self.cursor.as_mut().is_some_and(|c| c.rewind())
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    fn release(&mut self) {
        if let Some(mut c) = self.cursor.take() {
            c.close();
        }
    }
}

impl<T: DeserializeOwned> Iterator for ResultStream<T> {
    type Item = Result<T, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.next_document() {
            Ok(Some(doc)) => match bson::deserialize_from_document(doc) {
                Ok(v) => Some(Ok(v)),
                Err(e) => {
                    self.release();
                    Some(Err(e.into()))
                }
            },
            Ok(None) => {
                self.release();
                None
            }
            Err(source) => {
                self.release();
                super::pipeline::record_store_failure(&self.collection, &*source);
                Some(Err(DbError::QueryExecution { collection: self.collection.clone(), source }))
            }
        }
    }
}

impl<T> Drop for ResultStream<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> std::fmt::Debug for ResultStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream").field("collection", &self.collection).field("open", &self.is_open()).finish()
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub size: usize,
}

impl<T> Page<T> {
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        let size = crate::utils::num::usize_to_u64(self.size.max(1));
        self.total.div_ceil(size)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        crate::utils::num::usize_to_u64(self.page).saturating_add(1) < self.total_pages()
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.page > 0
    }
}

/// An entity with its distance from the query point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoResult<T> {
    pub content: T,
    pub distance: f64,
}

/// Distance-ranked results, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoResults<T> {
    pub results: Vec<GeoResult<T>>,
}

impl<T> GeoResults<T> {
    pub(crate) fn new(mut results: Vec<GeoResult<T>>) -> Self {
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Self { results }
    }

    /// Mean distance; zero when empty.
    #[must_use]
    pub fn average_distance(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.results.len() as f64;
        self.results.iter().map(|r| r.distance).sum::<f64>() / n
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contents(&self) -> impl Iterator<Item = &T> {
        self.results.iter().map(|r| &r.content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPage<T> {
    pub results: GeoResults<T>,
    pub total: u64,
    pub page: usize,
    pub size: usize,
}

impl<T> GeoPage<T> {
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(crate::utils::num::usize_to_u64(self.size.max(1)))
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        crate::utils::num::usize_to_u64(self.page).saturating_add(1) < self.total_pages()
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.page > 0
    }
}

/// Result of invoking a registered method, shaped by its declaration.
#[derive(Debug)]
pub enum QueryOutcome<T> {
    List(Vec<T>),
    One(Option<T>),
    Count(u64),
    Exists(bool),
    Page(Page<T>),
    GeoResults(GeoResults<T>),
    GeoPage(GeoPage<T>),
}

impl<T> QueryOutcome<T> {
    #[must_use]
    pub const fn shape_name(&self) -> &'static str {
        match self {
            Self::List(_) => "List",
            Self::One(_) => "One",
            Self::Count(_) => "Count",
            Self::Exists(_) => "Exists",
            Self::Page(_) => "Page",
            Self::GeoResults(_) => "GeoResults",
            Self::GeoPage(_) => "GeoPage",
        }
    }
}
