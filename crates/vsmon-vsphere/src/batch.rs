//! Splits (entity, counter) pairs into queries that respect the server's
//! per-call metric quota.

use crate::api::{MetricId, QuerySpec};
use crate::cache::ClassMetadata;
use crate::entity::{EntityClass, EntityId};
use crate::metrics::should_collect_per_instance_values;
use chrono::{DateTime, Duration, Utc};

/// Realtime sampling interval, in seconds.
pub const REALTIME_INTERVAL_ID: u32 = 20;

/// Window requested for historical entities. Must contain at least one
/// rollup sample.
pub const HISTORICAL_WINDOW_HOURS: i64 = 2;

/// Pairs of one class sent as a single remote query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBatch {
    pub class: EntityClass,
    pub entities: Vec<(EntityId, Vec<MetricId>)>,
}

impl QueryBatch {
    fn new(class: EntityClass) -> Self {
        Self {
            class,
            entities: Vec::new(),
        }
    }

    pub fn pair_count(&self) -> usize {
        self.entities.iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn push(&mut self, entity: &EntityId, metric: MetricId) {
        match self.entities.last_mut() {
            Some((last, ids)) if last == entity => ids.push(metric),
            _ => self.entities.push((entity.clone(), vec![metric])),
        }
    }

    /// One query spec per entity. Realtime classes ask for the latest
    /// 20-second sample, historical ones for a two-hour window.
    pub fn query_specs(&self, now: DateTime<Utc>) -> Vec<QuerySpec> {
        let realtime = self.class.is_realtime();
        self.entities
            .iter()
            .map(|(entity, metric_ids)| QuerySpec {
                entity: entity.clone(),
                metric_ids: metric_ids.clone(),
                interval_id: realtime.then_some(REALTIME_INTERVAL_ID),
                max_sample: realtime.then_some(1),
                start_time: (!realtime).then(|| now - Duration::hours(HISTORICAL_WINDOW_HOURS)),
            })
            .collect()
    }
}

/// Metric ids to query for a class, ordered by counter key. Per-instance
/// counters ask for every instance.
pub fn metric_ids_for(metadata: &ClassMetadata) -> Vec<MetricId> {
    let mut ids: Vec<MetricId> = metadata
        .iter()
        .map(|(counter_id, descriptor)| MetricId {
            counter_id: *counter_id,
            instance: if should_collect_per_instance_values(&descriptor.name) {
                "*".to_string()
            } else {
                String::new()
            },
        })
        .collect();
    ids.sort_by_key(|id| id.counter_id);
    ids
}

#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    batch_morlist_size: usize,
    /// Negative means the server imposes no cap.
    max_historical_metrics: i64,
}

impl BatchPlanner {
    pub fn new(batch_morlist_size: usize, max_historical_metrics: i64) -> Self {
        Self {
            batch_morlist_size: batch_morlist_size.max(1),
            max_historical_metrics,
        }
    }

    /// Largest number of pairs a batch of `class` may hold.
    pub fn max_batch_size(&self, class: EntityClass) -> usize {
        if class == EntityClass::Cluster {
            // A cluster query fans out server-side; never combine it.
            return 1;
        }
        if class.is_realtime() || self.max_historical_metrics < 0 {
            return self.batch_morlist_size;
        }
        let quota = usize::try_from(self.max_historical_metrics).unwrap_or(usize::MAX);
        self.batch_morlist_size.min(quota).max(1)
    }

    /// Partition every (entity, metric) pair into batches, in input order.
    pub fn plan(&self, class: EntityClass, entities: &[EntityId], metric_ids: &[MetricId]) -> Vec<QueryBatch> {
        let max = self.max_batch_size(class);
        let mut batches = Vec::new();
        let mut current = QueryBatch::new(class);
        let mut size = 0;

        for entity in entities {
            for metric in metric_ids {
                if size >= max {
                    batches.push(std::mem::replace(&mut current, QueryBatch::new(class)));
                    size = 0;
                }
                current.push(entity, metric.clone());
                size += 1;
            }
        }

        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}
