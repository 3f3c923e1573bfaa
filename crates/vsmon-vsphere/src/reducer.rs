//! Turns raw query results into gauges.

use crate::api::EntityMetricResult;
use crate::cache::{ClassMetadata, InventoryEntry};
use crate::entity::{EntityClass, EntityId};
use crate::metrics::{instance_tag_key, should_collect_per_instance_values};
use std::collections::HashMap;
use vsmon_common::sink::MetricSink;

/// One value ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge {
    pub name: String,
    pub value: f64,
    pub hostname: Option<String>,
    pub tags: Vec<String>,
}

impl Gauge {
    pub fn submit(&self, sink: &dyn MetricSink) {
        sink.gauge(&self.name, self.value, self.hostname.as_deref(), &self.tags);
    }
}

/// Reduces the results of batches for a single class against cache
/// snapshots taken at the start of collection.
pub struct ResultReducer<'a> {
    pub class: EntityClass,
    pub inventory: &'a HashMap<EntityId, InventoryEntry>,
    pub metadata: &'a ClassMetadata,
    pub base_tags: &'a [String],
}

impl ResultReducer<'_> {
    pub fn reduce(&self, results: &[EntityMetricResult]) -> Vec<Gauge> {
        let mut gauges = Vec::new();

        for result in results {
            let Some(entry) = self.inventory.get(&result.entity) else {
                tracing::debug!(entity = %result.entity, "Skipping results for entity missing from inventory");
                continue;
            };

            for series in &result.series {
                let Some(counter) = self.metadata.get(&series.counter_id) else {
                    tracing::debug!(
                        counter = series.counter_id,
                        "Skipping value for counter without metadata"
                    );
                    continue;
                };

                let Some(raw) = latest_valid_sample(&series.values) else {
                    tracing::debug!(metric = %counter.name, entity = %result.entity, "Skipping metric without a valid sample");
                    continue;
                };

                let mut value = raw as f64;
                if counter.unit == "percent" {
                    value /= 100.0;
                }

                let mut tags = Vec::new();
                if should_collect_per_instance_values(&counter.name) {
                    let instance = if series.instance.is_empty() {
                        "none"
                    } else {
                        series.instance.as_str()
                    };
                    tags.push(format!("{}:{}", instance_tag_key(&counter.name), instance));
                }

                let hostname = if self.class.is_historical() {
                    tags.extend(entry.tags.iter().cloned());
                    None
                } else {
                    entry.hostname.clone()
                };
                tags.extend(self.base_tags.iter().cloned());

                gauges.push(Gauge {
                    name: counter.name.clone(),
                    value,
                    hostname,
                    tags,
                });
            }
        }

        gauges
    }
}

/// Most recent non-negative sample. Negative values mean the sample is not
/// available yet.
pub fn latest_valid_sample(values: &[i64]) -> Option<i64> {
    values.iter().rev().find(|v| **v >= 0).copied()
}
