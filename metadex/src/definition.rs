//! Metric definitions and the data points they are derived from.
//!
//! A [`MetricDefinition`] exists once per distinct series. It is created the
//! first time the ingest path sees an unknown external id (or when bootstrap
//! discovers one in the durable store) and is never deleted. The only field
//! that changes afterwards is [`MetricDefinition::last_update`].

use serde::{Deserialize, Serialize};

/// Tenant (organization) identifier.
pub type OrgId = i32;

/// The shared scope. Series owned by this org are visible to every tenant,
/// and a lookup made on behalf of this org sees every tenant's series.
pub const SHARED_ORG: OrgId = -1;

/// Metadata describing one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Stable, globally unique external id (typically a content hash).
    pub id: String,
    /// Owning tenant.
    pub org_id: OrgId,
    /// Hierarchical dotted name, e.g. `host.web1.cpu.idle`.
    pub name: String,
    /// Metric name without the host-specific parts.
    #[serde(default)]
    pub metric: String,
    /// Expected interval between points, in seconds.
    #[serde(default)]
    pub interval: u32,
    /// Unit of the values.
    #[serde(default)]
    pub unit: String,
    /// Target type such as `gauge` or `counter`.
    #[serde(default)]
    pub target_type: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last time (epoch seconds) this series was seen by the index.
    pub last_update: i64,
}

impl MetricDefinition {
    /// Creates a definition with only the fields the index cares about.
    pub fn new(
        id: impl Into<String>,
        org_id: OrgId,
        name: impl Into<String>,
        last_update: i64,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            org_id,
            metric: name.clone(),
            name,
            interval: 0,
            unit: String::new(),
            target_type: String::new(),
            tags: Vec::new(),
            last_update,
        }
    }

    /// Returns true if this definition should be refreshed for a point at
    /// `timestamp`, i.e. it was last updated more than `window_secs` before.
    pub fn is_stale(&self, timestamp: i64, window_secs: i64) -> bool {
        self.last_update < timestamp.saturating_sub(window_secs)
    }
}

/// A single incoming data point as delivered by the ingest path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricData {
    /// External id of the series.
    pub id: String,
    /// Owning tenant.
    pub org_id: OrgId,
    /// Hierarchical dotted name.
    pub name: String,
    /// Metric name without the host-specific parts.
    #[serde(default)]
    pub metric: String,
    /// Interval between points, in seconds.
    #[serde(default)]
    pub interval: u32,
    /// Unit of the value.
    #[serde(default)]
    pub unit: String,
    /// Target type such as `gauge` or `counter`.
    #[serde(default)]
    pub target_type: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Timestamp of the point, epoch seconds.
    pub time: i64,
    /// The sampled value.
    pub value: f64,
}

impl From<&MetricData> for MetricDefinition {
    fn from(data: &MetricData) -> Self {
        Self {
            id: data.id.clone(),
            org_id: data.org_id,
            name: data.name.clone(),
            metric: data.metric.clone(),
            interval: data.interval,
            unit: data.unit.clone(),
            target_type: data.target_type.clone(),
            tags: data.tags.clone(),
            last_update: data.time,
        }
    }
}
