use bson::{Bson, Document as BsonDocument, doc};
use serde::{Deserialize, Serialize};

use super::metric::{Distance, distance_between};
use crate::errors::DbError;

/// A 2d coordinate; `x` is longitude and `y` latitude for spherical metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn to_bson(self) -> Bson {
        Bson::Array(vec![Bson::Double(self.x), Bson::Double(self.y)])
    }

    /// Read a stored location: `[x, y]`, `{x, y}` or a GeoJSON point.
    #[must_use]
    pub fn from_bson(v: &Bson) -> Option<Self> {
        match v {
            Bson::Array(a) if a.len() == 2 => Some(Self::new(as_f64(&a[0])?, as_f64(&a[1])?)),
            Bson::Document(d) => {
                if let Some(coords) = d.get("coordinates") {
                    return Self::from_bson(coords);
                }
                Some(Self::new(as_f64(d.get("x")?)?, as_f64(d.get("y")?)?))
            }
            _ => None,
        }
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    #[must_use]
    pub const fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { center: Point::new(x, y), radius }
    }
}

/// Axis-aligned box given by two opposite corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub first: Point,
    pub second: Point,
}

impl GeoBox {
    #[must_use]
    pub const fn new(first: Point, second: Point) -> Self {
        Self { first, second }
    }

    fn contains(&self, p: Point) -> bool {
        let (min_x, max_x) = (self.first.x.min(self.second.x), self.first.x.max(self.second.x));
        let (min_y, max_y) = (self.first.y.min(self.second.y), self.first.y.max(self.second.y));
        p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    #[must_use]
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    fn is_degenerate(&self) -> bool {
        let Some((&a, rest)) = self.points.split_first() else { return true };
        let Some(&b) = rest.iter().find(|p| **p != a) else { return true };
        rest.iter().all(|&c| collinear(a, b, c))
    }

    /// Ray casting; points on an edge count as inside.
    fn contains(&self, p: Point) -> bool {
        let n = self.points.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            if on_segment(a, b, p) {
                return true;
            }
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// Largest sine of the angle at `a` still treated as a straight line.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

// The cross product is |ab| |ac| sin(angle), so the tolerance scales with both edges.
fn collinear(a: Point, b: Point, c: Point) -> bool {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let (acx, acy) = (c.x - a.x, c.y - a.y);
    let cross = abx * acy - aby * acx;
    cross.abs() <= COLLINEAR_TOLERANCE * abx.hypot(aby) * acx.hypot(acy)
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    if !collinear(a, b, p) {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Spatial predicate operand. Each variant validates and renders itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeoShape {
    Circle(Circle),
    Box(GeoBox),
    Polygon(Polygon),
    Near { center: Point, max_distance: Option<Distance> },
}

impl GeoShape {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Circle(_) => "Circle",
            Self::Box(_) => "Box",
            Self::Polygon(_) => "Polygon",
            Self::Near { .. } => "Near",
        }
    }

    /// # Errors
    /// Returns `DbError::InvalidGeometry` for negative radii/distances, non-finite
    /// coordinates, or polygons with fewer than three non-collinear vertices.
    pub fn validate(&self) -> Result<(), DbError> {
        match self {
            Self::Circle(c) => {
                if !c.center.is_finite() || !c.radius.is_finite() || c.radius < 0.0 {
                    return Err(DbError::InvalidGeometry(format!("circle radius {}", c.radius)));
                }
            }
            Self::Box(b) => {
                if !b.first.is_finite() || !b.second.is_finite() {
                    return Err(DbError::InvalidGeometry("box corner is not finite".into()));
                }
            }
            Self::Polygon(p) => {
                if p.points.len() < 3 {
                    return Err(DbError::InvalidGeometry(format!(
                        "polygon needs at least 3 vertices, got {}",
                        p.points.len()
                    )));
                }
                if p.points.iter().any(|v| !v.is_finite()) || p.is_degenerate() {
                    return Err(DbError::InvalidGeometry("polygon vertices are collinear".into()));
                }
            }
            Self::Near { center, max_distance } => {
                if !center.is_finite() {
                    return Err(DbError::InvalidGeometry("near point is not finite".into()));
                }
                if let Some(d) = max_distance
                    && !d.is_valid()
                {
                    return Err(DbError::InvalidGeometry(format!("max distance {}", d.value)));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        match self {
            Self::Circle(c) => (p.x - c.center.x).hypot(p.y - c.center.y) <= c.radius,
            Self::Box(b) => b.contains(p),
            Self::Polygon(poly) => poly.contains(p),
            Self::Near { center, max_distance } => max_distance
                .is_none_or(|d| distance_between(*center, p, d.metric) <= d.value),
        }
    }

    /// Store-side operator document for this shape.
    #[must_use]
    pub fn to_query_document(&self) -> BsonDocument {
        match self {
            Self::Circle(c) => doc! {
                "$within": { "$center": [c.center.to_bson(), c.radius] }
            },
            Self::Box(b) => doc! {
                "$within": { "$box": [b.first.to_bson(), b.second.to_bson()] }
            },
            Self::Polygon(p) => {
                let pts: Vec<Bson> = p.points.iter().map(|v| v.to_bson()).collect();
                doc! { "$within": { "$polygon": pts } }
            }
            Self::Near { center, max_distance } => {
                let spherical = max_distance.is_some_and(|d| d.metric.is_spherical());
                let op = if spherical { "$nearSphere" } else { "$near" };
                let mut out = BsonDocument::new();
                out.insert(op, center.to_bson());
                if let Some(d) = max_distance {
                    out.insert("$maxDistance", d.normalized_value());
                }
                out
            }
        }
    }
}
