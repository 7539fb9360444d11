use serde::{Deserialize, Serialize};

use super::shapes::Point;

/// Unit in which a [`Distance`] is expressed.
///
/// `Neutral` distances live in the coordinate plane itself (legacy 2d semantics);
/// the other metrics measure great-circle distance on the earth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Metric {
    #[default]
    Neutral,
    Kilometers,
    Miles,
}

impl Metric {
    /// Earth radius in this metric's unit; 1.0 for `Neutral`.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Neutral => 1.0,
            Self::Kilometers => 6378.137,
            Self::Miles => 3963.191,
        }
    }

    #[must_use]
    pub const fn is_spherical(self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub value: f64,
    pub metric: Metric,
}

impl Distance {
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self { value, metric: Metric::Neutral }
    }

    #[must_use]
    pub const fn kilometers(value: f64) -> Self {
        Self { value, metric: Metric::Kilometers }
    }

    #[must_use]
    pub const fn miles(value: f64) -> Self {
        Self { value, metric: Metric::Miles }
    }

    /// Value as the store expects it: radians for spherical metrics, raw otherwise.
    #[must_use]
    pub fn normalized_value(&self) -> f64 {
        self.value / self.metric.multiplier()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.value >= 0.0
    }
}

/// Distance between two points measured in `metric`.
#[must_use]
pub fn distance_between(a: Point, b: Point, metric: Metric) -> f64 {
    if metric.is_spherical() {
        haversine_radians(a, b) * metric.multiplier()
    } else {
        (a.x - b.x).hypot(a.y - b.y)
    }
}

/// Central angle between two (longitude, latitude) points in radians.
fn haversine_radians(a: Point, b: Point) -> f64 {
    let (lat1, lat2) = (a.y.to_radians(), b.y.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.x - a.x).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance() {
        let d = distance_between(Point::new(0.0, 0.0), Point::new(3.0, 4.0), Metric::Neutral);
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn spherical_distance_one_degree_of_latitude() {
        let d = distance_between(Point::new(0.0, 0.0), Point::new(0.0, 1.0), Metric::Kilometers);
        assert!((d - 111.319).abs() < 0.01, "got {d}");
    }

    #[test]
    fn normalized_value_is_radians_for_spherical() {
        let d = Distance::kilometers(6378.137);
        assert!((d.normalized_value() - 1.0).abs() < 1e-12);
        assert!((Distance::new(0.5).normalized_value() - 0.5).abs() < 1e-12);
    }
}
