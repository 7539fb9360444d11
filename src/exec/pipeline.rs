use serde::de::DeserializeOwned;
use std::time::Instant;

use super::handle::CollectionHandle;
use super::nearest_distance;
use super::results::{GeoPage, GeoResult, GeoResults, Page, QueryOutcome, ResultStream};
use crate::config::RepositoryConfig;
use crate::errors::{DbError, StoreError};
use crate::query::telemetry::{self, QueryRecord};
use crate::query::{FindOptions, QuerySpecification, ResultShape};

pub(crate) fn record_store_failure(collection: &str, err: &dyn std::error::Error) {
    telemetry::record_failure();
    log::warn!("query on collection {collection} failed: {err}");
}

/// Runs bound specifications against one collection.
pub struct QueryExecution<'a> {
    collection: &'a dyn CollectionHandle,
    config: &'a RepositoryConfig,
}

/// Execute `spec` and shape the result by its declared result shape.
///
/// # Errors
/// `QueryExecution` wrapping the store failure, or `Bson` when a document does not
/// deserialize into `T`.
pub fn execute<T: DeserializeOwned>(
    collection: &dyn CollectionHandle,
    spec: &QuerySpecification,
    config: &RepositoryConfig,
) -> Result<QueryOutcome<T>, DbError> {
    QueryExecution::new(collection, config).run(spec)
}

impl<'a> QueryExecution<'a> {
    #[must_use]
    pub const fn new(collection: &'a dyn CollectionHandle, config: &'a RepositoryConfig) -> Self {
        Self { collection, config }
    }

    fn wrap(&self, source: StoreError) -> DbError {
        record_store_failure(self.collection.name(), &*source);
        DbError::QueryExecution { collection: self.collection.name().to_string(), source }
    }

    /// Store options for `spec` with the configured result cap applied.
    fn options(&self, spec: &QuerySpecification) -> FindOptions {
        let mut opts = spec.find_options();
        opts.limit = Some(opts.limit.map_or(self.config.max_result_limit, |l| l.min(self.config.max_result_limit)));
        // Distances are computed from the stored location, so keep it in projected results.
        if let (Some(fields), Some(near)) = (opts.projection.as_mut(), spec.near())
            && !fields.contains(&near.path)
        {
            fields.push(near.path.clone());
        }
        opts
    }

    /// Open a lazy stream over the documents `spec` selects.
    ///
    /// # Errors
    /// `QueryExecution` when the store rejects the query.
    pub fn stream<T: DeserializeOwned>(&self, spec: &QuerySpecification) -> Result<ResultStream<T>, DbError> {
        let opts = self.options(spec);
        let started = Instant::now();
        let cursor = self.collection.find(spec.filter(), &opts).map_err(|e| self.wrap(e))?;
        self.finish(spec, &opts, started, None);
        Ok(ResultStream::new(self.collection.name(), cursor))
    }

    /// Execute `spec` to completion.
    ///
    /// # Errors
    /// See [`execute`].
    pub fn run<T: DeserializeOwned>(&self, spec: &QuerySpecification) -> Result<QueryOutcome<T>, DbError> {
        let started = Instant::now();
        let opts = self.options(spec);
        let outcome = match spec.shape() {
            ResultShape::List => {
                let items = self.collect(spec, &opts)?;
                QueryOutcome::List(items)
            }
            ResultShape::One => {
                let doc = self.collection.find_one(spec.filter(), &opts).map_err(|e| self.wrap(e))?;
                QueryOutcome::One(doc.map(bson::deserialize_from_document::<T>).transpose()?)
            }
            ResultShape::Count => QueryOutcome::Count(self.count(spec)?),
            ResultShape::Exists => {
                let probe = FindOptions { projection: Some(vec!["_id".into()]), limit: Some(1), ..FindOptions::default() };
                let doc = self.collection.find_one(spec.filter(), &probe).map_err(|e| self.wrap(e))?;
                QueryOutcome::Exists(doc.is_some())
            }
            ResultShape::Page => {
                let content = self.collect(spec, &opts)?;
                let (page, size) = page_window(spec);
                QueryOutcome::Page(Page { content, total: self.count(spec)?, page, size })
            }
            ResultShape::GeoResults => QueryOutcome::GeoResults(self.ranked(spec, &opts)?),
            ResultShape::GeoPage => {
                let results = self.ranked(spec, &opts)?;
                let (page, size) = page_window(spec);
                QueryOutcome::GeoPage(GeoPage { results, total: self.count(spec)?, page, size })
            }
        };
        let returned = match &outcome {
            QueryOutcome::List(v) | QueryOutcome::Page(Page { content: v, .. }) => crate::utils::num::usize_to_u64(v.len()),
            QueryOutcome::GeoResults(r) | QueryOutcome::GeoPage(GeoPage { results: r, .. }) => {
                crate::utils::num::usize_to_u64(r.len())
            }
            QueryOutcome::One(o) => u64::from(o.is_some()),
            QueryOutcome::Exists(b) => u64::from(*b),
            QueryOutcome::Count(n) => *n,
        };
        self.finish(spec, &opts, started, Some(returned));
        Ok(outcome)
    }

    fn collect<T: DeserializeOwned>(&self, spec: &QuerySpecification, opts: &FindOptions) -> Result<Vec<T>, DbError> {
        let cursor = self.collection.find(spec.filter(), opts).map_err(|e| self.wrap(e))?;
        ResultStream::new(self.collection.name(), cursor).collect()
    }

    /// Total matches, capped by the subject limit.
    fn count(&self, spec: &QuerySpecification) -> Result<u64, DbError> {
        let n = self.collection.count(spec.filter()).map_err(|e| self.wrap(e))?;
        Ok(spec.limit().map_or(n, |l| n.min(crate::utils::num::usize_to_u64(l))))
    }

    fn ranked<T: DeserializeOwned>(&self, spec: &QuerySpecification, opts: &FindOptions) -> Result<GeoResults<T>, DbError> {
        let near = spec.near().ok_or_else(|| DbError::geo_shape(spec.method(), "no Near clause to rank by"))?;
        let metric = near.max_distance.map(|d| d.metric).unwrap_or_default();
        let mut cursor = self.collection.find(spec.filter(), opts).map_err(|e| self.wrap(e))?;
        let mut results = Vec::new();
        loop {
            let doc = match cursor.next_document() {
                Ok(Some(doc)) => doc,
                Ok(None) => break,
                Err(e) => {
                    cursor.close();
                    return Err(self.wrap(e));
                }
            };
            let distance = nearest_distance(&doc, &near.path, near.center, metric).unwrap_or(f64::INFINITY);
            match bson::deserialize_from_document(doc) {
                Ok(content) => results.push(GeoResult { content, distance }),
                Err(e) => {
                    cursor.close();
                    return Err(e.into());
                }
            }
        }
        cursor.close();
        Ok(GeoResults::new(results))
    }

    fn finish(&self, spec: &QuerySpecification, opts: &FindOptions, started: Instant, result_count: Option<u64>) {
        let elapsed = started.elapsed();
        let fingerprint = spec.filter().fingerprint();
        let slow = telemetry::log_query(&QueryRecord {
            collection: self.collection.name(),
            method: spec.method(),
            filter_fingerprint: &fingerprint,
            duration_ms: elapsed.as_millis(),
            limit: opts.limit,
            skip: opts.skip,
            result_count,
            slow_query_ms: self.config.slow_query_ms,
        });
        if slow {
            log::warn!(
                "slow query {} on {}: {} ms (threshold {} ms)",
                spec.method(),
                self.collection.name(),
                elapsed.as_millis(),
                self.config.slow_query_ms
            );
        }
        crate::utils::devlog::bench(
            "query",
            elapsed,
            serde_json::json!({
                "op": shape_op(spec.shape()),
                "method": spec.method(),
                "collection": self.collection.name(),
                "result_count": result_count,
            }),
        );
    }
}

const fn shape_op(shape: ResultShape) -> &'static str {
    match shape {
        ResultShape::List | ResultShape::Page => "find",
        ResultShape::One | ResultShape::Exists => "find_one",
        ResultShape::Count => "count",
        ResultShape::GeoResults | ResultShape::GeoPage => "geo_near",
    }
}

fn page_window(spec: &QuerySpecification) -> (usize, usize) {
    spec.page().map_or((0, 0), |p| (p.page, spec.limit().map_or(p.size(), |l| l.min(p.size()))))
}
