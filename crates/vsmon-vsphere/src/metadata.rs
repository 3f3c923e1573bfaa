use crate::api::CounterDescriptor;
use crate::cache::{ClassMetadata, MetricDescriptor, Staging};
use crate::config::CheckSettings;
use crate::entity::EntityClass;

/// Store, for every class that reports metrics, the counters of the catalog
/// that are allow-listed for it and not excluded by a metric filter.
pub fn build_metadata(
    counters: &[CounterDescriptor],
    settings: &CheckSettings,
    staging: &mut Staging<EntityClass, ClassMetadata>,
) {
    let named: Vec<(String, &CounterDescriptor)> =
        counters.iter().map(|c| (c.metric_name(), c)).collect();

    for class in EntityClass::REALTIME.into_iter().chain(EntityClass::HISTORICAL) {
        let metadata: ClassMetadata = named
            .iter()
            .filter(|(name, _)| settings.allowed_metrics.is_allowed(class, name))
            .filter(|(name, _)| {
                let excluded = settings.metric_filters.is_excluded(class, name);
                if excluded {
                    tracing::debug!(class = %class, metric = %name, "Metric excluded by metric filters");
                }
                !excluded
            })
            .map(|(name, counter)| {
                (
                    counter.key,
                    MetricDescriptor {
                        name: name.clone(),
                        unit: counter.unit.clone(),
                    },
                )
            })
            .collect();

        tracing::debug!(class = %class, counters = metadata.len(), "Metric metadata prepared");
        staging.set(class, metadata);
    }
}
