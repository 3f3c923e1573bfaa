use crate::api::EntityMetricResult;
use crate::batch::QueryBatch;
use crate::entity::EntityClass;
use crate::error::Result;
use crate::pool::{ConnectionPool, SessionKey};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Result of one batch, as reported by the worker that ran it.
#[derive(Debug)]
pub struct BatchOutcome {
    pub worker: usize,
    pub class: EntityClass,
    pub pairs: usize,
    pub result: Result<Vec<EntityMetricResult>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub batches: usize,
    pub failed: usize,
}

/// Runs query batches on a fixed set of workers, each holding its own
/// session from the pool.
pub struct MetricCollector {
    pool: Arc<ConnectionPool>,
    workers: usize,
}

impl MetricCollector {
    pub fn new(pool: Arc<ConnectionPool>, workers: usize) -> Self {
        Self {
            pool,
            workers: workers.max(1),
        }
    }

    /// Run every batch and hand each outcome to `on_outcome` on the calling
    /// task, in completion order. A failed batch is reported and does not
    /// affect the others. Returns once all workers are done.
    ///
    /// A worker that panics loses the batch it was running; that batch, and
    /// any left queued once no worker remains, count as failed without an
    /// outcome.
    pub async fn run<F>(&self, batches: Vec<QueryBatch>, now: DateTime<Utc>, mut on_outcome: F) -> CollectStats
    where
        F: FnMut(BatchOutcome),
    {
        let mut stats = CollectStats::default();
        if batches.is_empty() {
            return stats;
        }

        let workers = self.workers.min(batches.len());
        let queue = Arc::new(Mutex::new(batches.into_iter().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = Vec::with_capacity(workers);

        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let pool = Arc::clone(&self.pool);
            let tx = tx.clone();

            tasks.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some(batch) = next else {
                        break;
                    };
                    let result = run_batch(&pool, worker, &batch, now).await;
                    let outcome = BatchOutcome {
                        worker,
                        class: batch.class,
                        pairs: batch.pair_count(),
                        result,
                    };
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            stats.batches += 1;
            if let Err(e) = &outcome.result {
                stats.failed += 1;
                tracing::warn!(
                    worker = outcome.worker,
                    class = %outcome.class,
                    pairs = outcome.pairs,
                    error = %e,
                    "Metric batch failed"
                );
            }
            on_outcome(outcome);
        }

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Task panicked: {}", e);
                stats.batches += 1;
                stats.failed += 1;
            }
        }

        let stranded = queue.lock().unwrap_or_else(PoisonError::into_inner).drain(..).count();
        if stranded > 0 {
            tracing::warn!(batches = stranded, "Metric batches left unqueried, no worker remaining");
            stats.batches += stranded;
            stats.failed += stranded;
        }

        stats
    }
}

/// Query one batch on the worker's own session. The call relies on the
/// client's own timeouts.
async fn run_batch(
    pool: &ConnectionPool,
    worker: usize,
    batch: &QueryBatch,
    now: DateTime<Utc>,
) -> Result<Vec<EntityMetricResult>> {
    let session = pool.session(SessionKey::Worker(worker)).await?;
    session.query_metrics(&batch.query_specs(now)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        ConnectOptions, Connector, CounterDescriptor, MetricId, MetricSeries, QuerySpec, TlsOptions, VsphereApi,
    };
    use crate::batch::BatchPlanner;
    use crate::entity::{EntityId, Infrastructure};
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Echoes one sample per requested pair. Fails any query touching
    /// `failing` and panics on any query touching `panicking`.
    #[derive(Clone, Default)]
    struct EchoApi {
        failing: Option<EntityId>,
        panicking: Option<EntityId>,
    }

    #[async_trait]
    impl VsphereApi for EchoApi {
        async fn current_time(&self) -> anyhow::Result<DateTime<Utc>> {
            Ok(Utc::now())
        }

        async fn get_infrastructure(&self) -> anyhow::Result<Infrastructure> {
            Ok(Infrastructure::new())
        }

        async fn get_perf_counters_by_level(&self, _level: u8) -> anyhow::Result<Vec<CounterDescriptor>> {
            Ok(vec![])
        }

        async fn get_max_query_metrics(&self) -> anyhow::Result<i64> {
            Ok(-1)
        }

        async fn query_metrics(&self, specs: &[QuerySpec]) -> anyhow::Result<Vec<EntityMetricResult>> {
            if specs.iter().any(|s| Some(&s.entity) == self.panicking.as_ref()) {
                panic!("malformed response");
            }
            if specs.iter().any(|s| Some(&s.entity) == self.failing.as_ref()) {
                anyhow::bail!("server fault");
            }
            Ok(specs
                .iter()
                .map(|spec| EntityMetricResult {
                    entity: spec.entity.clone(),
                    series: spec
                        .metric_ids
                        .iter()
                        .map(|id| MetricSeries {
                            counter_id: id.counter_id,
                            instance: String::new(),
                            values: vec![1],
                        })
                        .collect(),
                })
                .collect())
        }
    }

    struct EchoConnector {
        api: EchoApi,
    }

    #[async_trait]
    impl Connector for EchoConnector {
        async fn connect(&self, _options: &ConnectOptions) -> anyhow::Result<Box<dyn VsphereApi>> {
            Ok(Box::new(self.api.clone()))
        }
    }

    fn pool(failing: Option<&str>) -> Arc<ConnectionPool> {
        pool_with(EchoApi {
            failing: failing.map(EntityId::from),
            panicking: None,
        })
    }

    fn pool_with(api: EchoApi) -> Arc<ConnectionPool> {
        let connector = Arc::new(EchoConnector { api });
        Arc::new(ConnectionPool::new(
            connector,
            ConnectOptions {
                host: "vcenter.local".into(),
                username: "user".into(),
                password: "secret".into(),
                tls: TlsOptions {
                    verify: true,
                    ca_path: None,
                },
            },
        ))
    }

    fn batches(entities: usize, per_batch: usize) -> Vec<QueryBatch> {
        let entities: Vec<EntityId> = (0..entities).map(|i| EntityId::new(format!("vm-{i}"))).collect();
        let metrics: Vec<MetricId> = (1..=2)
            .map(|counter_id| MetricId {
                counter_id,
                instance: String::new(),
            })
            .collect();
        BatchPlanner::new(per_batch, -1).plan(EntityClass::VirtualMachine, &entities, &metrics)
    }

    #[tokio::test]
    async fn all_batches_are_drained() {
        let pool = pool(None);
        let collector = MetricCollector::new(Arc::clone(&pool), 3);
        let mut seen = HashSet::new();

        let stats = collector
            .run(batches(10, 4), Utc::now(), |outcome| {
                for result in outcome.result.unwrap() {
                    for series in result.series {
                        assert!(seen.insert((result.entity.clone(), series.counter_id)));
                    }
                }
            })
            .await;

        assert_eq!(stats, CollectStats { batches: 5, failed: 0 });
        assert_eq!(seen.len(), 20);
        assert!(pool.session_count() <= 3);
    }

    #[tokio::test]
    async fn failed_batch_does_not_affect_others() {
        let collector = MetricCollector::new(pool(Some("vm-3")), 2);
        let mut delivered = 0;

        let stats = collector
            .run(batches(6, 2), Utc::now(), |outcome| {
                if let Ok(results) = outcome.result {
                    delivered += results.len();
                }
            })
            .await;

        assert_eq!(stats.batches, 6);
        assert_eq!(stats.failed, 1);
        assert_eq!(delivered, 5);
    }

    #[tokio::test]
    async fn no_batches_spawns_no_workers() {
        let pool = pool(None);
        let collector = MetricCollector::new(Arc::clone(&pool), 4);
        let stats = collector.run(Vec::new(), Utc::now(), |_| panic!("unexpected outcome")).await;
        assert_eq!(stats, CollectStats::default());
        assert_eq!(pool.session_count(), 0);
    }

    #[tokio::test]
    async fn panicked_worker_counts_its_batch_as_failed() {
        let collector = MetricCollector::new(
            pool_with(EchoApi {
                panicking: Some("vm-2".into()),
                ..EchoApi::default()
            }),
            2,
        );
        let mut delivered = 0;

        let stats = collector
            .run(batches(6, 2), Utc::now(), |outcome| {
                if let Ok(results) = outcome.result {
                    delivered += results.len();
                }
            })
            .await;

        assert_eq!(stats, CollectStats { batches: 6, failed: 1 });
        assert_eq!(delivered, 5);
    }

    #[tokio::test]
    async fn batches_stranded_by_last_worker_panic_are_failed() {
        let collector = MetricCollector::new(
            pool_with(EchoApi {
                panicking: Some("vm-0".into()),
                ..EchoApi::default()
            }),
            1,
        );
        let mut outcomes = 0;

        let stats = collector.run(batches(3, 2), Utc::now(), |_| outcomes += 1).await;

        assert_eq!(stats, CollectStats { batches: 3, failed: 3 });
        assert_eq!(outcomes, 0);
    }
}
