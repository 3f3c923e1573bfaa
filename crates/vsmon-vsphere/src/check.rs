//! The poll cycle: refresh whatever cache expired, then collect.

use crate::api::Connector;
use crate::batch::{metric_ids_for, BatchPlanner};
use crate::cache::{ClassMetadata, InventoryCache, MetadataCache};
use crate::collector::MetricCollector;
use crate::config::{CheckSettings, CollectionType};
use crate::entity::EntityClass;
use crate::error::{Result, VsphereError};
use crate::inventory::build_inventory;
use crate::metadata::build_metadata;
use crate::pool::{ConnectionPool, SessionKey};
use crate::reducer::ResultReducer;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use vsmon_common::sink::MetricSink;
use vsmon_common::types::ExternalHostTags;

/// Namespace of the host tags published for hosts and VMs.
pub const EXTERNAL_TAGS_NAMESPACE: &str = "vsphere";

/// Server quota value meaning "no limit".
pub const UNLIMITED_QUERY_METRICS: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    MetadataCheck,
    MetadataRefresh,
    InventoryCheck,
    InventoryRefresh,
    ExternalTags,
    Collect,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::MetadataCheck => "metadata_check",
            CyclePhase::MetadataRefresh => "metadata_refresh",
            CyclePhase::InventoryCheck => "inventory_check",
            CyclePhase::InventoryRefresh => "inventory_refresh",
            CyclePhase::ExternalTags => "external_tags",
            CyclePhase::Collect => "collect",
        };
        f.write_str(name)
    }
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub metadata_refreshed: bool,
    pub inventory_refreshed: bool,
    /// Number of hosts whose external tags were published, if any were.
    pub external_tags: Option<usize>,
    pub batches: usize,
    pub failed_batches: usize,
    pub gauges: usize,
}

pub struct VsphereCheck {
    settings: CheckSettings,
    pool: Arc<ConnectionPool>,
    collector: MetricCollector,
    inventory: InventoryCache,
    metadata: MetadataCache,
    sink: Arc<dyn MetricSink>,
    max_query_metrics: i64,
    phase: CyclePhase,
}

impl VsphereCheck {
    pub fn new(settings: CheckSettings, connector: Arc<dyn Connector>, sink: Arc<dyn MetricSink>) -> Self {
        let pool = Arc::new(ConnectionPool::new(connector, settings.connect.clone()));
        let collector = MetricCollector::new(Arc::clone(&pool), settings.thread_count);
        let inventory = InventoryCache::new(settings.infrastructure_cache_interval);
        let metadata = MetadataCache::new(settings.metadata_cache_interval);
        let max_query_metrics = settings.max_query_metrics.unwrap_or(UNLIMITED_QUERY_METRICS);

        Self {
            settings,
            pool,
            collector,
            inventory,
            metadata,
            sink,
            max_query_metrics,
            phase: CyclePhase::Idle,
        }
    }

    pub fn settings(&self) -> &CheckSettings {
        &self.settings
    }

    pub fn inventory(&self) -> &InventoryCache {
        &self.inventory
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Per-call metric quota used to size historical batches.
    pub fn max_query_metrics(&self) -> i64 {
        self.max_query_metrics
    }

    /// Run one poll cycle.
    ///
    /// # Errors
    ///
    /// Fails when the orchestrator cannot connect or a cache refresh fails.
    /// A failed refresh keeps the previous cache content and is retried on
    /// the next cycle. Failed batches are not errors.
    pub async fn check(&mut self) -> Result<CycleReport> {
        let result = self.run_cycle().await;
        if let Err(e) = &result {
            tracing::error!(host = %self.pool.host(), phase = %self.phase, error = %e, "vSphere check cycle failed");
        }
        self.enter(CyclePhase::Idle);
        result
    }

    async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        self.enter(CyclePhase::MetadataCheck);
        if self.metadata.is_expired() {
            self.enter(CyclePhase::MetadataRefresh);
            self.refresh_metadata().await?;
            report.metadata_refreshed = true;
        }

        self.enter(CyclePhase::InventoryCheck);
        if self.inventory.is_expired() {
            self.enter(CyclePhase::InventoryRefresh);
            self.refresh_inventory().await?;
            report.inventory_refreshed = true;

            if self.settings.collection_type == CollectionType::Realtime {
                self.enter(CyclePhase::ExternalTags);
                report.external_tags = Some(self.submit_external_host_tags());
            }
        }

        self.enter(CyclePhase::Collect);
        self.collect(&mut report).await;

        tracing::info!(
            host = %self.pool.host(),
            batches = report.batches,
            failed = report.failed_batches,
            gauges = report.gauges,
            "vSphere check cycle complete"
        );
        Ok(report)
    }

    fn enter(&mut self, phase: CyclePhase) {
        tracing::trace!(from = %self.phase, to = %phase, "Cycle phase");
        self.phase = phase;
    }

    async fn refresh_metadata(&mut self) -> Result<()> {
        let session = self.pool.session(SessionKey::Orchestrator).await?;

        let counters = session.get_perf_counters_by_level(self.settings.collection_level).await?;
        self.metadata.refresh_with(|staging| {
            build_metadata(&counters, &self.settings, staging);
            Ok::<_, VsphereError>(())
        })?;

        if self.settings.max_query_metrics.is_none() {
            self.max_query_metrics = match session.get_max_query_metrics().await {
                Ok(limit) => limit,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read max_query_metrics, assuming no limit");
                    UNLIMITED_QUERY_METRICS
                }
            };
        }

        tracing::info!(
            counters = counters.len(),
            max_query_metrics = self.max_query_metrics,
            "Metric metadata cache refreshed"
        );
        Ok(())
    }

    async fn refresh_inventory(&self) -> Result<()> {
        let session = self.pool.session(SessionKey::Orchestrator).await?;

        let infrastructure = session.get_infrastructure().await?;
        let mut stored = 0;
        self.inventory.refresh_with(|staging| {
            stored = build_inventory(&infrastructure, &self.settings, staging);
            Ok::<_, VsphereError>(())
        })?;

        tracing::info!(
            entities = infrastructure.len(),
            monitored = stored,
            "Inventory cache refreshed"
        );
        Ok(())
    }

    /// Publish the inventory tags of every host and VM under its hostname.
    fn submit_external_host_tags(&self) -> usize {
        let content = self.inventory.snapshot();
        let mut external_tags = Vec::new();

        for class in [EntityClass::Host, EntityClass::VirtualMachine] {
            for id in self.inventory.entities_of(class) {
                let Some(entry) = content.get(&id) else {
                    continue;
                };
                if let Some(hostname) = entry.hostname.as_deref().filter(|h| !h.is_empty()) {
                    external_tags.push(ExternalHostTags::new(
                        hostname,
                        EXTERNAL_TAGS_NAMESPACE,
                        entry.tags.clone(),
                    ));
                }
            }
        }

        let published = external_tags.len();
        tracing::debug!(hosts = published, "Sending external host tags");
        self.sink.set_external_tags(external_tags);
        published
    }

    async fn collect(&self, report: &mut CycleReport) {
        let inventory = self.inventory.snapshot();
        let metadata = self.metadata.snapshot();
        let planner = BatchPlanner::new(self.settings.batch_morlist_size, self.max_query_metrics);

        let mut batches = Vec::new();
        for &class in self.settings.collection_type.classes() {
            let entities = self.inventory.entities_of(class);
            if entities.is_empty() {
                continue;
            }
            let Some(class_metadata) = metadata.get(&class) else {
                continue;
            };
            let metric_ids = metric_ids_for(class_metadata);
            batches.extend(planner.plan(class, &entities, &metric_ids));
        }

        let empty = ClassMetadata::new();
        let sink = Arc::clone(&self.sink);
        let mut gauges = 0;

        let stats = self
            .collector
            .run(batches, Utc::now(), |outcome| {
                let Ok(results) = outcome.result else {
                    return;
                };
                let reducer = ResultReducer {
                    class: outcome.class,
                    inventory: &inventory,
                    metadata: metadata.get(&outcome.class).unwrap_or(&empty),
                    base_tags: &self.settings.base_tags,
                };
                for gauge in reducer.reduce(&results) {
                    gauge.submit(sink.as_ref());
                    gauges += 1;
                }
            })
            .await;

        report.batches = stats.batches;
        report.failed_batches = stats.failed;
        report.gauges = gauges;
    }
}
