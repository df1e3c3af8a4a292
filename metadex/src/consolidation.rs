//! Consolidation methods named in fetch requests.
//!
//! The index only carries the method through to the planning stage; how the
//! values are actually reduced is the storage engine's business.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How multiple raw points are reduced to one output point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consolidator {
    /// Arithmetic mean.
    #[default]
    Avg,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Most recent value.
    Last,
    /// Sum of values.
    Sum,
    /// Number of values.
    Cnt,
}

impl Consolidator {
    /// All methods, in declaration order.
    pub const ALL: [Consolidator; 6] = [
        Consolidator::Avg,
        Consolidator::Min,
        Consolidator::Max,
        Consolidator::Last,
        Consolidator::Sum,
        Consolidator::Cnt,
    ];

    /// The lower-case name used in requests and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Consolidator::Avg => "avg",
            Consolidator::Min => "min",
            Consolidator::Max => "max",
            Consolidator::Last => "last",
            Consolidator::Sum => "sum",
            Consolidator::Cnt => "cnt",
        }
    }
}

impl fmt::Display for Consolidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown consolidator name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consolidator '{0}'")]
pub struct UnknownConsolidator(pub String);

impl FromStr for Consolidator {
    type Err = UnknownConsolidator;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "avg" | "average" => Ok(Consolidator::Avg),
            "min" => Ok(Consolidator::Min),
            "max" => Ok(Consolidator::Max),
            "last" => Ok(Consolidator::Last),
            "sum" => Ok(Consolidator::Sum),
            "cnt" | "count" => Ok(Consolidator::Cnt),
            other => Err(UnknownConsolidator(other.to_string())),
        }
    }
}
