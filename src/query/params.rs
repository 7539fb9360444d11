use bson::Bson;
use serde::Serialize;

use super::signature::ParamKind;
use super::types::{PageRequest, Sort};
use crate::errors::DbError;
use crate::geo::{Circle, Distance, GeoBox, GeoShape, Point, Polygon};

/// One runtime argument of a query method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(Bson),
    Point(Point),
    Distance(Distance),
    Shape(GeoShape),
    Sort(Sort),
    Page(PageRequest),
}

impl Param {
    /// Convert any serde value (embedded object, enum, newtype) into a parameter.
    ///
    /// # Errors
    /// Returns `DbError::Bson` when the value cannot be represented.
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, DbError> {
        Ok(Self::Value(bson::serialize_to_bson(value)?))
    }

    /// A sequence argument for `In`/`NotIn`.
    pub fn values<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bson>,
    {
        Self::Value(Bson::Array(items.into_iter().map(Into::into).collect()))
    }

    /// True when this argument can fill a parameter declared as `kind`.
    #[must_use]
    pub fn fits(&self, kind: ParamKind) -> bool {
        match (self, kind) {
            (Self::Value(Bson::Array(_)), ParamKind::Sequence) => true,
            (Self::Value(_), ParamKind::Value) => true,
            (Self::Point(_), ParamKind::Point) => true,
            (Self::Distance(_), ParamKind::Distance) => true,
            (Self::Shape(GeoShape::Circle(_)), ParamKind::Circle) => true,
            (Self::Shape(GeoShape::Box(_)), ParamKind::Box) => true,
            (Self::Shape(GeoShape::Polygon(_)), ParamKind::Polygon) => true,
            (Self::Sort(_), ParamKind::Sort) => true,
            (Self::Page(_), ParamKind::Page) => true,
            _ => false,
        }
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Value(Bson::Array(_)) => "Sequence",
            Self::Value(_) => "Value",
            Self::Point(_) => "Point",
            Self::Distance(_) => "Distance",
            Self::Shape(s) => s.kind_name(),
            Self::Sort(_) => "Sort",
            Self::Page(_) => "Page",
        }
    }
}

macro_rules! value_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Param {
                fn from(v: $t) -> Self {
                    Self::Value(Bson::from(v))
                }
            }
        )*
    };
}

value_from!(&str, String, i32, i64, f64, bool, Bson, bson::Document, bson::DateTime, bson::oid::ObjectId);

impl From<chrono::DateTime<chrono::Utc>> for Param {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Self::Value(Bson::DateTime(bson::DateTime::from_millis(v.timestamp_millis())))
    }
}

impl<T: Into<Bson>> From<Vec<T>> for Param {
    fn from(v: Vec<T>) -> Self {
        Self::values(v)
    }
}

impl From<Point> for Param {
    fn from(v: Point) -> Self {
        Self::Point(v)
    }
}

impl From<Distance> for Param {
    fn from(v: Distance) -> Self {
        Self::Distance(v)
    }
}

impl From<Circle> for Param {
    fn from(v: Circle) -> Self {
        Self::Shape(GeoShape::Circle(v))
    }
}

impl From<GeoBox> for Param {
    fn from(v: GeoBox) -> Self {
        Self::Shape(GeoShape::Box(v))
    }
}

impl From<Polygon> for Param {
    fn from(v: Polygon) -> Self {
        Self::Shape(GeoShape::Polygon(v))
    }
}

impl From<Sort> for Param {
    fn from(v: Sort) -> Self {
        Self::Sort(v)
    }
}

impl From<PageRequest> for Param {
    fn from(v: PageRequest) -> Self {
        Self::Page(v)
    }
}

/// Build a `Vec<Param>` from heterogeneous arguments.
///
/// ```
/// use nexuslite_repository::params;
/// use nexuslite_repository::query::PageRequest;
///
/// let args = params!["Matthews", 39, PageRequest::new(0, 10).unwrap()];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::query::Param>::new() };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::query::Param::from($arg)),+]
    };
}
