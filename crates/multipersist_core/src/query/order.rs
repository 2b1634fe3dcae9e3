//! Ordering specifications.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Smallest first (`1`).
    #[default]
    Ascending,
    /// Largest first (`-1`).
    Descending,
}

impl Direction {
    /// Parses the numeric form: `1` ascending, `-1` descending.
    ///
    /// # Errors
    ///
    /// `InvalidOrdering` for any other number.
    pub fn from_sign(field: &str, sign: i64) -> CoreResult<Self> {
        match sign {
            1 => Ok(Direction::Ascending),
            -1 => Ok(Direction::Descending),
            other => Err(CoreError::InvalidOrdering {
                field: field.to_string(),
                direction: other,
            }),
        }
    }

    /// Numeric form of this direction.
    pub fn sign(self) -> i64 {
        match self {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        })
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderTerm {
    /// Field name.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

impl OrderTerm {
    /// Ascending on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    /// Descending on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// An `order_by` argument: field names (ascending) or `(field, 1 | -1)`
/// pairs, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSpec {
    terms: Vec<(String, i64)>,
}

impl OrderSpec {
    /// Resolves the numeric directions.
    ///
    /// # Errors
    ///
    /// `InvalidOrdering` for a direction other than `1` / `-1`.
    pub fn terms(&self) -> CoreResult<Vec<OrderTerm>> {
        self.terms
            .iter()
            .map(|(field, sign)| {
                Ok(OrderTerm {
                    field: field.clone(),
                    direction: Direction::from_sign(field, *sign)?,
                })
            })
            .collect()
    }
}

impl From<&str> for OrderSpec {
    fn from(field: &str) -> Self {
        Self {
            terms: vec![(field.to_string(), 1)],
        }
    }
}

impl From<String> for OrderSpec {
    fn from(field: String) -> Self {
        Self {
            terms: vec![(field, 1)],
        }
    }
}

impl From<Vec<&str>> for OrderSpec {
    fn from(fields: Vec<&str>) -> Self {
        Self {
            terms: fields.into_iter().map(|f| (f.to_string(), 1)).collect(),
        }
    }
}

impl From<Vec<String>> for OrderSpec {
    fn from(fields: Vec<String>) -> Self {
        Self {
            terms: fields.into_iter().map(|f| (f, 1)).collect(),
        }
    }
}

impl<const N: usize> From<[&str; N]> for OrderSpec {
    fn from(fields: [&str; N]) -> Self {
        Self {
            terms: fields.into_iter().map(|f| (f.to_string(), 1)).collect(),
        }
    }
}

impl From<(&str, i64)> for OrderSpec {
    fn from((field, sign): (&str, i64)) -> Self {
        Self {
            terms: vec![(field.to_string(), sign)],
        }
    }
}

impl From<Vec<(&str, i64)>> for OrderSpec {
    fn from(pairs: Vec<(&str, i64)>) -> Self {
        Self {
            terms: pairs.into_iter().map(|(f, s)| (f.to_string(), s)).collect(),
        }
    }
}

impl<const N: usize> From<[(&str, i64); N]> for OrderSpec {
    fn from(pairs: [(&str, i64); N]) -> Self {
        Self {
            terms: pairs.into_iter().map(|(f, s)| (f.to_string(), s)).collect(),
        }
    }
}

impl From<(&str, Direction)> for OrderSpec {
    fn from((field, direction): (&str, Direction)) -> Self {
        Self {
            terms: vec![(field.to_string(), direction.sign())],
        }
    }
}

impl From<OrderTerm> for OrderSpec {
    fn from(term: OrderTerm) -> Self {
        Self {
            terms: vec![(term.field, term.direction.sign())],
        }
    }
}

/// Appends `incoming` to `current`. A field already present loses its old
/// position and moves to the end with its new direction.
pub(crate) fn merge(current: &mut Vec<OrderTerm>, incoming: Vec<OrderTerm>) {
    for term in incoming {
        current.retain(|t| t.field != term.field);
        current.push(term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn apply(specs: Vec<OrderSpec>) -> Vec<OrderTerm> {
        let mut current = Vec::new();
        for spec in specs {
            merge(&mut current, spec.terms().unwrap());
        }
        current
    }

    #[test]
    fn respecified_field_moves_last() {
        let accumulated = apply(vec!["age".into(), ("name", 1).into(), "age".into()]);
        let direct = apply(vec![[("name", 1), ("age", 1)].into()]);
        assert_eq!(accumulated, direct);
        assert_eq!(accumulated, [OrderTerm::asc("name"), OrderTerm::asc("age")]);
    }

    #[test]
    fn respecified_field_takes_new_direction() {
        let terms = apply(vec![["age", "name"].into(), ("age", -1).into()]);
        assert_eq!(terms, [OrderTerm::asc("name"), OrderTerm::desc("age")]);
    }

    #[test]
    fn invalid_direction() {
        let spec: OrderSpec = ("age", 2).into();
        assert!(matches!(
            spec.terms(),
            Err(CoreError::InvalidOrdering { direction: 2, .. })
        ));
    }

    #[test]
    fn direction_round_trips_sign() {
        for d in [Direction::Ascending, Direction::Descending] {
            assert_eq!(Direction::from_sign("x", d.sign()).unwrap(), d);
        }
    }

    proptest! {
        #[test]
        fn merge_keeps_each_field_once_at_its_last_position(
            fields in prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d"]), 0..12)
        ) {
            let specs = fields.iter().map(|f| OrderSpec::from(*f)).collect();
            let merged = apply(specs);

            let mut expected: Vec<&str> = Vec::new();
            for f in &fields {
                expected.retain(|e| e != f);
                expected.push(*f);
            }
            let got: Vec<&str> = merged.iter().map(|t| t.field.as_str()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
