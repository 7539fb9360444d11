use bson::{Bson, Document};
use ordered_float::OrderedFloat;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::handle::{CollectionHandle, IndexSpec, StoreCursor};
use super::nearest_distance;
use crate::errors::{DbError, StoreError};
use crate::geo::GeoShape;
use crate::query::{Filter, FindOptions, compare_docs, eval_filter, project_fields};

/// A failure the next store call reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// `find`/`count` fails outright.
    Call(String),
    /// The cursor fails after yielding this many documents.
    AfterDocuments(usize, String),
}

/// In-process collection evaluating [`Filter`] over stored bson documents.
pub struct MemoryCollection {
    name: String,
    docs: RwLock<Vec<Document>>,
    indexes: RwLock<Vec<IndexSpec>>,
    open_cursors: Arc<AtomicUsize>,
    failure: Mutex<Option<Failure>>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(Vec::new()),
            indexes: RwLock::new(Vec::new()),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            failure: Mutex::new(None),
        }
    }

    /// Store `doc`, assigning a uuid `_id` when it has none. Returns the id.
    pub fn insert(&self, mut doc: Document) -> Bson {
        let id = if let Some(id) = doc.get("_id") {
            id.clone()
        } else {
            let id = Bson::String(uuid::Uuid::new_v4().to_string());
            doc.insert("_id", id.clone());
            id
        };
        self.docs.write().push(doc);
        id
    }

    /// # Errors
    /// Returns `DbError::Bson` when `value` does not serialize to a document.
    pub fn insert_serialized<T: Serialize>(&self, value: &T) -> Result<Bson, DbError> {
        Ok(self.insert(bson::serialize_to_document(value)?))
    }

    /// # Errors
    /// See [`MemoryCollection::insert_serialized`].
    pub fn insert_all<'a, T, I>(&self, values: I) -> Result<Vec<Bson>, DbError>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        values.into_iter().map(|v| self.insert_serialized(v)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Cursors handed out and not yet closed.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn index_info(&self) -> Vec<IndexSpec> {
        self.indexes.read().clone()
    }

    /// Make the next `find` or `count` fail.
    pub fn fail_next(&self, failure: Failure) {
        *self.failure.lock() = Some(failure);
    }
}

fn store_error(msg: String) -> StoreError {
    msg.into()
}

impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, filter: &Filter, opts: &FindOptions) -> Result<Box<dyn StoreCursor>, StoreError> {
        let fail_at = match self.failure.lock().take() {
            Some(Failure::Call(msg)) => return Err(store_error(msg)),
            Some(Failure::AfterDocuments(n, msg)) => Some((n, msg)),
            None => None,
        };
        let started = std::time::Instant::now();
        let mut docs: Vec<Document> = self.docs.read().iter().filter(|d| eval_filter(d, filter)).cloned().collect();

        match (opts.sort.as_deref(), filter.near_clause()) {
            (Some(sort), _) if !sort.is_empty() => docs.sort_by(|a, b| compare_docs(a, b, sort)),
            (_, Some((path, GeoShape::Near { center, max_distance }))) => {
                let metric = max_distance.map(|d| d.metric).unwrap_or_default();
                docs.sort_by_cached_key(|d| {
                    OrderedFloat(nearest_distance(d, path, *center, metric).unwrap_or(f64::INFINITY))
                });
            }
            _ => {}
        }

        let skip = opts.skip.unwrap_or(0);
        let limit = opts.limit.unwrap_or(usize::MAX);
        let mut docs: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();
        if let Some(fields) = &opts.projection {
            for d in &mut docs {
                *d = project_fields(d, fields);
            }
        }

        crate::utils::devlog::bench(
            "store",
            started.elapsed(),
            serde_json::json!({ "op": "find", "collection": self.name, "result_count": docs.len() }),
        );
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor { docs, pos: 0, fail_at, open: Some(self.open_cursors.clone()) }))
    }

    fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        if let Some(Failure::Call(msg) | Failure::AfterDocuments(_, msg)) = self.failure.lock().take() {
            return Err(store_error(msg));
        }
        let n = self.docs.read().iter().filter(|d| eval_filter(d, filter)).count();
        Ok(crate::utils::num::usize_to_u64(n))
    }

    fn ensure_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write();
        if !indexes.contains(spec) {
            log::info!("collection {}: index {:?} on {}", self.name, spec.kind, spec.field);
            indexes.push(spec.clone());
        }
        Ok(())
    }
}

struct MemoryCursor {
    docs: Vec<Document>,
    pos: usize,
    fail_at: Option<(usize, String)>,
    // Present while the cursor is open
    open: Option<Arc<AtomicUsize>>,
}

impl StoreCursor for MemoryCursor {
    fn next_document(&mut self) -> Result<Option<Document>, StoreError> {
        if self.open.is_none() {
            return Ok(None);
        }
        if let Some((at, msg)) = &self.fail_at
            && self.pos >= *at
        {
            return Err(store_error(msg.clone()));
        }
        let next = self.docs.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        Ok(next)
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn rewind(&mut self) -> bool {
        if self.open.is_none() {
            return false;
        }
        self.pos = 0;
        true
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Distance, Point};
    use crate::query::{CmpOp, SortSpec};
    use bson::doc;

    fn seeded() -> MemoryCollection {
        let c = MemoryCollection::new("people");
        c.insert(doc! { "name": "a", "age": 30, "loc": [0.0, 3.0] });
        c.insert(doc! { "name": "b", "age": 20, "loc": [0.0, 1.0] });
        c.insert(doc! { "name": "c", "age": 40, "loc": [0.0, 2.0] });
        c
    }

    fn drain(mut cur: Box<dyn StoreCursor>) -> Vec<Document> {
        let mut out = Vec::new();
        while let Some(d) = cur.next_document().unwrap() {
            out.push(d);
        }
        out
    }

    fn names(docs: &[Document]) -> Vec<&str> {
        docs.iter().filter_map(|d| d.get_str("name").ok()).collect()
    }

    #[test]
    fn insert_assigns_ids() {
        let c = MemoryCollection::new("x");
        let id = c.insert(doc! { "a": 1 });
        assert!(matches!(id, Bson::String(ref s) if s.len() == 36));
        assert_eq!(c.insert(doc! { "_id": 7 }), Bson::Int32(7));
    }

    #[test]
    fn sorts_pages_and_projects() {
        let c = seeded();
        let opts = FindOptions {
            projection: Some(vec!["name".into()]),
            sort: Some(vec![SortSpec { field: "age".into(), order: crate::query::Order::Asc }]),
            limit: Some(2),
            skip: Some(1),
        };
        let docs = drain(c.find(&Filter::True, &opts).unwrap());
        assert_eq!(names(&docs), vec!["a", "c"]);
        assert!(docs[0].get("age").is_none());
    }

    #[test]
    fn near_orders_by_distance_without_sort() {
        let c = seeded();
        let f = Filter::Geo {
            path: "loc".into(),
            shape: GeoShape::Near { center: Point::new(0.0, 0.0), max_distance: Some(Distance::new(2.5)) },
        };
        let docs = drain(c.find(&f, &FindOptions::default()).unwrap());
        assert_eq!(names(&docs), vec!["b", "c"]);
    }

    #[test]
    fn cursors_are_tracked_until_closed() {
        let c = seeded();
        let mut cur = c.find(&Filter::True, &FindOptions::default()).unwrap();
        assert_eq!(c.open_cursors(), 1);
        assert!(cur.next_document().unwrap().is_some());
        assert!(cur.rewind());
        cur.close();
        cur.close();
        assert_eq!(c.open_cursors(), 0);
        assert!(!cur.rewind());
        let cur = c.find(&Filter::True, &FindOptions::default()).unwrap();
        drop(cur);
        assert_eq!(c.open_cursors(), 0);
    }

    #[test]
    fn injected_failures_surface_once() {
        let c = seeded();
        c.fail_next(Failure::Call("down".into()));
        assert!(c.count(&Filter::True).is_err());
        assert_eq!(c.count(&Filter::True).unwrap(), 3);
        c.fail_next(Failure::AfterDocuments(1, "reset".into()));
        let mut cur = c.find(&Filter::True, &FindOptions::default()).unwrap();
        assert!(cur.next_document().unwrap().is_some());
        assert!(cur.next_document().is_err());
    }

    #[test]
    fn find_one_uses_filter() {
        let c = seeded();
        let f = Filter::Cmp { path: "age".into(), op: CmpOp::Gt, value: 35.into() };
        let d = c.find_one(&f, &FindOptions::default()).unwrap().unwrap();
        assert_eq!(d.get_str("name").unwrap(), "c");
        assert_eq!(c.open_cursors(), 0);
    }
}
