//! Holiday model and date-range arithmetic
//!
//! A holiday spans a [`DateRange`] whose end may be open, meaning the holiday
//! is ongoing. All coverage questions reduce to [`DateRange::overlaps`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Student;

/// Inclusive range of calendar days. `end == None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Build a range, rejecting `end < start`.
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Option<Self> {
        match end {
            Some(end) if end < start => None,
            _ => Some(Self { start, end }),
        }
    }

    /// The single day `[day, day]`
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: Some(day),
        }
    }

    /// An ongoing range starting at `start`
    pub fn ongoing(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    /// Query range for a request: an absent end means the start day only.
    pub fn for_query(start: NaiveDate, end: Option<NaiveDate>) -> Option<Self> {
        Self::new(start, Some(end.unwrap_or(start)))
    }

    /// Whether the range never ends
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Whether `day` falls inside the range
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && self.end.map_or(true, |end| day <= end)
    }

    /// Whether the two ranges share at least one day.
    ///
    /// Each range must start no later than the other one ends, where an open
    /// end compares greater than every date.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        starts_by(self.start, other.end) && starts_by(other.start, self.end)
    }
}

/// `start <= end`, with `None` as +infinity
fn starts_by(start: NaiveDate, end: Option<NaiveDate>) -> bool {
    end.map_or(true, |end| start <= end)
}

/// Holiday entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Holiday {
    /// Create a new holiday; the id is assigned by the database.
    pub fn new(name: String, range: DateRange) -> Self {
        Self {
            id: 0,
            name,
            start_date: range.start,
            end_date: range.end,
            created_at: Utc::now(),
        }
    }

    /// The days this holiday covers
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Whether this holiday blocks creation of one spanning `range`.
    ///
    /// Sharing a start date always conflicts, independently of the ends.
    pub fn conflicts_with(&self, range: &DateRange) -> bool {
        self.start_date == range.start || self.range().overlaps(range)
    }
}

/// Holiday together with the students it is assigned to
#[derive(Debug, Clone, Serialize)]
pub struct HolidayWithStudents {
    #[serde(flatten)]
    pub holiday: Holiday,
    pub students: Vec<Student>,
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn date_strategy() -> impl Strategy<Value = NaiveDate> {
        (0i64..3650).prop_map(|offset| {
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap() + chrono::Duration::days(offset)
        })
    }

    fn range_strategy() -> impl Strategy<Value = DateRange> {
        (date_strategy(), prop::option::of(0i64..400)).prop_map(|(start, len)| DateRange {
            start,
            end: len.map(|days| start + chrono::Duration::days(days)),
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn overlap_is_symmetric(a in range_strategy(), b in range_strategy()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn single_day_overlap_matches_containment(day in date_strategy(), holiday in range_strategy()) {
            let expected = holiday.start <= day && holiday.end.map_or(true, |end| day <= end);
            prop_assert_eq!(DateRange::single(day).overlaps(&holiday), expected);
            prop_assert_eq!(holiday.contains(day), expected);
        }

        #[test]
        fn range_overlaps_itself(a in range_strategy()) {
            prop_assert!(a.overlaps(&a));
        }

        #[test]
        fn overlap_means_some_shared_day(a in range_strategy(), b in range_strategy()) {
            // The later of the two starts is a shared day whenever they overlap.
            let day = a.start.max(b.start);
            prop_assert_eq!(a.overlaps(&b), a.contains(day) && b.contains(day));
        }
    }
}
