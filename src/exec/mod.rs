// Store collaborators and the execution pipeline
mod handle;
mod memory;
mod pipeline;
mod results;

pub use handle::{CollectionHandle, IndexKind, IndexSpec, StoreCursor};
pub use memory::{Failure, MemoryCollection};
pub use pipeline::{QueryExecution, execute};
pub use results::{GeoPage, GeoResult, GeoResults, Page, QueryOutcome, ResultStream};

use bson::Document;

use crate::geo::{Metric, Point, distance_between};
use crate::query::points_at;

/// Distance from `center` to the closest point stored under `path`.
pub(crate) fn nearest_distance(doc: &Document, path: &str, center: Point, metric: Metric) -> Option<f64> {
    points_at(doc, path).into_iter().map(|p| distance_between(center, p, metric)).min_by(f64::total_cmp)
}
