//! Fetch request contract handed to the storage engine.
//!
//! Once a pattern has been resolved into concrete series, each series turns
//! into one [`Req`]. The index fills in what the caller asked for; the
//! planning fields (`archive` onwards) are set later by whoever picks the
//! archive to read from and the runtime consolidation to apply.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consolidation::Consolidator;

/// `archive` value of a request that has not been planned yet.
pub const ARCHIVE_UNPLANNED: i32 = -2;

/// `archive` value selecting the raw, unconsolidated data.
pub const ARCHIVE_RAW: i32 = -1;

/// A request to fetch one series over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Req {
    /// External id of the series.
    pub key: String,
    /// Start of the range, epoch seconds, inclusive.
    pub from: u32,
    /// End of the range, epoch seconds, exclusive.
    pub to: u32,
    /// Minimum number of points the caller wants back.
    pub min_points: u32,
    /// Maximum number of points the caller wants back.
    pub max_points: u32,
    /// How points are reduced when consolidating.
    pub consolidator: Consolidator,

    /// Archive to read: [`ARCHIVE_RAW`] for raw data, `0` for the first
    /// rollup level and so on. [`ARCHIVE_UNPLANNED`] until planned.
    pub archive: i32,
    /// Interval of the raw series, in seconds.
    pub raw_interval: u32,
    /// Interval of the archive being read, in seconds.
    pub arch_interval: u32,
    /// Interval of the output after runtime consolidation, in seconds.
    pub out_interval: u32,
    /// Number of archive points consolidated into one output point.
    pub agg_num: u32,
}

impl Req {
    /// Creates an unplanned request.
    pub fn new(
        key: impl Into<String>,
        from: u32,
        to: u32,
        min_points: u32,
        max_points: u32,
        consolidator: Consolidator,
    ) -> Self {
        Self {
            key: key.into(),
            from,
            to,
            min_points,
            max_points,
            consolidator,
            archive: ARCHIVE_UNPLANNED,
            raw_interval: 0,
            arch_interval: 0,
            out_interval: 0,
            agg_num: 0,
        }
    }

    /// Returns true once the planning fields have been filled in.
    pub fn is_planned(&self) -> bool {
        self.archive != ARCHIVE_UNPLANNED
    }

    /// Length of the requested range, in seconds.
    pub fn span(&self) -> u32 {
        self.to.saturating_sub(self.from).saturating_sub(1)
    }

    /// Renders the request including its planning fields.
    pub fn debug_string(&self) -> String {
        format!(
            "{} {} - {} . {} <= points <= {}. {} - archive {}, rawInt {}, archInt {}, outInt {}, aggNum {}",
            self.key,
            self.from,
            self.to,
            self.min_points,
            self.max_points,
            self.consolidator,
            self.archive,
            self.raw_interval,
            self.arch_interval,
            self.out_interval,
            self.agg_num
        )
    }
}

impl fmt::Display for Req {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} - {} span:{}s. {} <= points <= {}. {}",
            self.key,
            self.from,
            self.to,
            self.span(),
            self.min_points,
            self.max_points,
            self.consolidator
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unplanned() {
        let req = Req::new("1.abc", 100, 200, 10, 800, Consolidator::Avg);
        assert!(!req.is_planned());
        assert_eq!(req.archive, ARCHIVE_UNPLANNED);
        assert_eq!(req.agg_num, 0);
    }

    #[test]
    fn test_display() {
        let req = Req::new("1.abc", 100, 200, 10, 800, Consolidator::Max);
        assert_eq!(req.to_string(), "1.abc 100 - 200 span:99s. 10 <= points <= 800. max");
    }

    #[test]
    fn test_debug_string_after_planning() {
        let mut req = Req::new("1.abc", 100, 200, 10, 800, Consolidator::Sum);
        req.archive = ARCHIVE_RAW;
        req.raw_interval = 10;
        req.arch_interval = 10;
        req.out_interval = 20;
        req.agg_num = 2;

        assert!(req.is_planned());
        assert_eq!(
            req.debug_string(),
            "1.abc 100 - 200 . 10 <= points <= 800. sum - archive -1, rawInt 10, archInt 10, outInt 20, aggNum 2"
        );
    }

    #[test]
    fn test_span_of_empty_range() {
        let req = Req::new("k", 200, 200, 1, 1, Consolidator::Avg);
        assert_eq!(req.span(), 0);
    }
}
