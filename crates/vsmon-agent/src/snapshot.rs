//! Vendor client backed by a recorded JSON snapshot.
//!
//! The file is read on every connect, so an updated recording is picked up
//! the next time a session reconnects.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use vsmon_vsphere::api::{
    ConnectOptions, Connector, CounterDescriptor, CounterId, EntityMetricResult, MetricSeries, QuerySpec,
    VsphereApi,
};
use vsmon_vsphere::entity::{EntityId, Infrastructure};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub infrastructure: Infrastructure,
    pub counters: Vec<CounterDescriptor>,
    #[serde(default)]
    pub max_query_metrics: Option<i64>,
    #[serde(default)]
    pub samples: Vec<RecordedSeries>,
}

/// Samples of one (entity, counter, instance), oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSeries {
    pub entity: EntityId,
    pub counter_id: CounterId,
    #[serde(default)]
    pub instance: String,
    pub values: Vec<i64>,
}

impl Snapshot {
    fn series_for(&self, entity: &EntityId, counter_id: CounterId, instance: &str) -> Vec<MetricSeries> {
        self.samples
            .iter()
            .filter(|s| &s.entity == entity && s.counter_id == counter_id)
            .filter(|s| instance == "*" || s.instance == instance)
            .map(|s| MetricSeries {
                counter_id: s.counter_id,
                instance: s.instance.clone(),
                values: s.values.clone(),
            })
            .collect()
    }
}

pub struct SnapshotConnector {
    path: PathBuf,
}

impl SnapshotConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Connector for SnapshotConnector {
    async fn connect(&self, options: &ConnectOptions) -> anyhow::Result<Box<dyn VsphereApi>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read snapshot {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot {}", self.path.display()))?;

        tracing::debug!(
            host = %options.host,
            entities = snapshot.infrastructure.len(),
            counters = snapshot.counters.len(),
            "Snapshot session opened"
        );
        Ok(Box::new(SnapshotApi {
            snapshot: Arc::new(snapshot),
        }))
    }
}

pub struct SnapshotApi {
    snapshot: Arc<Snapshot>,
}

#[async_trait]
impl VsphereApi for SnapshotApi {
    async fn current_time(&self) -> anyhow::Result<DateTime<Utc>> {
        Ok(Utc::now())
    }

    async fn get_infrastructure(&self) -> anyhow::Result<Infrastructure> {
        Ok(self.snapshot.infrastructure.clone())
    }

    async fn get_perf_counters_by_level(&self, _level: u8) -> anyhow::Result<Vec<CounterDescriptor>> {
        Ok(self.snapshot.counters.clone())
    }

    async fn get_max_query_metrics(&self) -> anyhow::Result<i64> {
        self.snapshot
            .max_query_metrics
            .context("snapshot does not record max_query_metrics")
    }

    async fn query_metrics(&self, specs: &[QuerySpec]) -> anyhow::Result<Vec<EntityMetricResult>> {
        let results = specs
            .iter()
            .map(|spec| EntityMetricResult {
                entity: spec.entity.clone(),
                series: spec
                    .metric_ids
                    .iter()
                    .flat_map(|id| self.snapshot.series_for(&spec.entity, id.counter_id, &id.instance))
                    .collect(),
            })
            .collect();
        Ok(results)
    }
}
