//! Covered date range of one meter.

use chrono::NaiveDate;

/// The inclusive range of dates a meter has profiles for.
///
/// `from <= to` always holds; the constructor swaps reversed bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdDateRange {
    id: String,
    from: NaiveDate,
    to: NaiveDate,
}

impl IdDateRange {
    /// Creates a range, ordering the bounds.
    pub fn new(id: impl Into<String>, from: NaiveDate, to: NaiveDate) -> Self {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self {
            id: id.into(),
            from,
            to,
        }
    }

    /// Meter identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// First covered date.
    pub fn from(&self) -> NaiveDate {
        self.from
    }

    /// Last covered date.
    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Returns true when `date` lies within the range, bounds included.
    pub fn is_in_range(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Returns true when both bounds equal `from` and `to`.
    pub fn has_bounds(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.from == from && self.to == to
    }
}
