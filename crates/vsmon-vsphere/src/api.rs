//! Boundary with the vendor RPC client.
//!
//! The check never speaks the wire protocol itself. A [`Connector`] opens
//! authenticated sessions and each session is a [`VsphereApi`] that returns
//! inventory snapshots, the performance-counter catalog and metric samples.

use crate::entity::{EntityId, Infrastructure};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned performance counter key.
pub type CounterId = i32;

/// How the server aggregates samples of a counter over an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupType {
    Average,
    Summation,
    Maximum,
    Minimum,
    Latest,
    None,
}

impl RollupType {
    pub fn short_name(&self) -> &'static str {
        match self {
            RollupType::Average => "avg",
            RollupType::Summation => "sum",
            RollupType::Maximum => "max",
            RollupType::Minimum => "min",
            RollupType::Latest => "latest",
            RollupType::None => "raw",
        }
    }
}

/// One entry of the performance-counter catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterDescriptor {
    pub key: CounterId,
    pub group: String,
    pub name: String,
    pub rollup: RollupType,
    pub unit: String,
}

impl CounterDescriptor {
    /// Canonical metric name: `<group>.<name>.<short rollup>`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vsmon_vsphere::api::{CounterDescriptor, RollupType};
    ///
    /// let counter = CounterDescriptor {
    ///     key: 2,
    ///     group: "cpu".into(),
    ///     name: "usage".into(),
    ///     rollup: RollupType::Average,
    ///     unit: "percent".into(),
    /// };
    /// assert_eq!(counter.metric_name(), "cpu.usage.avg");
    /// ```
    pub fn metric_name(&self) -> String {
        format!("{}.{}.{}", self.group, self.name, self.rollup.short_name())
    }
}

/// Counter plus instance selector. An empty instance asks for the aggregate,
/// `"*"` asks for every instance (per core, per LUN, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricId {
    pub counter_id: CounterId,
    #[serde(default)]
    pub instance: String,
}

/// Query for a set of counters on one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub entity: EntityId,
    pub metric_ids: Vec<MetricId>,
    pub interval_id: Option<u32>,
    pub max_sample: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
}

/// Samples of one counter instance, oldest first. Negative values mean the
/// sample is not available yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub counter_id: CounterId,
    #[serde(default)]
    pub instance: String,
    pub values: Vec<i64>,
}

/// Everything returned for one entity of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetricResult {
    pub entity: EntityId,
    pub series: Vec<MetricSeries>,
}

/// TLS options handed to the connector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub verify: bool,
    pub ca_path: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub username: String,
    pub password: String,
    pub tls: TlsOptions,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("tls", &self.tls)
            .finish()
    }
}

/// An authenticated session. Sessions are not shared between workers.
#[async_trait::async_trait]
pub trait VsphereApi: Send + Sync {
    /// Server clock, used as a liveness check right after connecting.
    async fn current_time(&self) -> Result<DateTime<Utc>>;

    /// Every inventory object with its properties, pages already merged.
    async fn get_infrastructure(&self) -> Result<Infrastructure>;

    /// Counters enabled at or below the given statistics level.
    async fn get_perf_counters_by_level(&self, level: u8) -> Result<Vec<CounterDescriptor>>;

    /// Server-side cap on metrics per historical query. Negative means no cap.
    async fn get_max_query_metrics(&self) -> Result<i64>;

    async fn query_metrics(&self, specs: &[QuerySpec]) -> Result<Vec<EntityMetricResult>>;
}

/// Opens new sessions.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn VsphereApi>>;
}
