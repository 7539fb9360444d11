//! Geospatial operands: points, distances and the shapes used by `Near`/`Within`.
mod metric;
mod shapes;

pub use metric::{Distance, Metric, distance_between};
pub use shapes::{Circle, GeoBox, GeoShape, Point, Polygon};
