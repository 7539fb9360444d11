use serde::Serialize;
use std::sync::LazyLock;

/// Closed set of clause operators a method name may spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Before,
    After,
    Between,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    NotContaining,
    Regex,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Exists,
    True,
    False,
    Near,
    Within,
}

/// Shape of the argument(s) an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    None,
    Single,
    Pair,
    Sequence,
    /// A point, optionally followed by a distance.
    Point,
    /// A circle, box or polygon.
    Area,
}

impl Operator {
    pub const ALL: [Self; 25] = [
        Self::Equals,
        Self::NotEquals,
        Self::LessThan,
        Self::LessThanEqual,
        Self::GreaterThan,
        Self::GreaterThanEqual,
        Self::Before,
        Self::After,
        Self::Between,
        Self::Like,
        Self::NotLike,
        Self::StartingWith,
        Self::EndingWith,
        Self::Containing,
        Self::NotContaining,
        Self::Regex,
        Self::In,
        Self::NotIn,
        Self::IsNull,
        Self::IsNotNull,
        Self::Exists,
        Self::True,
        Self::False,
        Self::Near,
        Self::Within,
    ];

    /// Spellings recognized as a clause suffix. The first one is canonical.
    #[must_use]
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Equals => &["Is", "Equals"],
            Self::NotEquals => &["Not", "IsNot"],
            Self::LessThan => &["LessThan", "IsLessThan"],
            Self::LessThanEqual => &["LessThanEqual", "IsLessThanEqual"],
            Self::GreaterThan => &["GreaterThan", "IsGreaterThan"],
            Self::GreaterThanEqual => &["GreaterThanEqual", "IsGreaterThanEqual"],
            Self::Before => &["Before", "IsBefore"],
            Self::After => &["After", "IsAfter"],
            Self::Between => &["Between", "IsBetween"],
            Self::Like => &["Like", "IsLike"],
            Self::NotLike => &["NotLike", "IsNotLike"],
            Self::StartingWith => &["StartingWith", "IsStartingWith", "StartsWith"],
            Self::EndingWith => &["EndingWith", "IsEndingWith", "EndsWith"],
            Self::Containing => &["Containing", "IsContaining", "Contains"],
            Self::NotContaining => &["NotContaining", "IsNotContaining", "NotContains"],
            Self::Regex => &["Regex", "MatchesRegex", "Matches"],
            Self::In => &["In", "IsIn"],
            Self::NotIn => &["NotIn", "IsNotIn"],
            Self::IsNull => &["IsNull", "Null"],
            Self::IsNotNull => &["IsNotNull", "NotNull"],
            Self::Exists => &["Exists"],
            Self::True => &["True", "IsTrue"],
            Self::False => &["False", "IsFalse"],
            Self::Near => &["Near", "IsNear"],
            Self::Within => &["Within", "IsWithin"],
        }
    }

    #[must_use]
    pub const fn value_shape(self) -> ValueShape {
        match self {
            Self::IsNull | Self::IsNotNull | Self::Exists | Self::True | Self::False => ValueShape::None,
            Self::Between => ValueShape::Pair,
            Self::In | Self::NotIn => ValueShape::Sequence,
            Self::Near => ValueShape::Point,
            Self::Within => ValueShape::Area,
            _ => ValueShape::Single,
        }
    }

    /// Minimum and maximum number of method parameters consumed.
    #[must_use]
    pub const fn arity(self) -> (usize, usize) {
        match self.value_shape() {
            ValueShape::None => (0, 0),
            ValueShape::Pair => (2, 2),
            ValueShape::Point => (1, 2),
            ValueShape::Single | ValueShape::Sequence | ValueShape::Area => (1, 1),
        }
    }

    #[must_use]
    pub const fn is_geo(self) -> bool {
        matches!(self, Self::Near | Self::Within)
    }

    /// Operators whose value is matched as text.
    #[must_use]
    pub const fn is_pattern(self) -> bool {
        matches!(
            self,
            Self::Like
                | Self::NotLike
                | Self::StartingWith
                | Self::EndingWith
                | Self::Containing
                | Self::NotContaining
                | Self::Regex
        )
    }

    /// Operators that order their operand.
    #[must_use]
    pub const fn is_range(self) -> bool {
        matches!(
            self,
            Self::LessThan
                | Self::LessThanEqual
                | Self::GreaterThan
                | Self::GreaterThanEqual
                | Self::Before
                | Self::After
                | Self::Between
        )
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.keywords()[0]
    }
}

/// Every `(spelling, operator)` pair, longest spelling first.
pub(crate) static SUFFIXES: LazyLock<Vec<(&'static str, Operator)>> = LazyLock::new(|| {
    let mut all: Vec<(&'static str, Operator)> = Operator::ALL
        .iter()
        .flat_map(|op| op.keywords().iter().map(move |k| (*k, *op)))
        .collect();
    all.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
    all
});

/// Modifier suffixes for case-insensitive matching.
pub(crate) const IGNORE_CASE: [&str; 2] = ["IgnoringCase", "IgnoreCase"];
pub(crate) const ALL_IGNORE_CASE: [&str; 2] = ["AllIgnoringCase", "AllIgnoreCase"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spellings_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (k, _) in SUFFIXES.iter() {
            assert!(seen.insert(*k), "duplicate keyword {k}");
        }
    }

    #[test]
    fn suffixes_are_longest_first() {
        let lens: Vec<usize> = SUFFIXES.iter().map(|(k, _)| k.len()).collect();
        assert!(lens.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn arity_follows_value_shape() {
        assert_eq!(Operator::Between.arity(), (2, 2));
        assert_eq!(Operator::IsNull.arity(), (0, 0));
        assert_eq!(Operator::Near.arity(), (1, 2));
        assert_eq!(Operator::In.arity(), (1, 1));
    }
}
