//! Built-in metric allow-lists and per-instance rules.

use crate::entity::EntityClass;
use std::collections::{HashMap, HashSet};

const VM_METRICS: &[&str] = &[
    "cpu.costop.sum",
    "cpu.demand.avg",
    "cpu.demandEntitlementRatio.latest",
    "cpu.entitlement.latest",
    "cpu.latency.avg",
    "cpu.readiness.avg",
    "cpu.ready.sum",
    "cpu.swapwait.sum",
    "cpu.usagemhz.avg",
    "cpu.usagemhz.min",
    "cpu.usagemhz.max",
    "cpu.usagemhz.raw",
    "cpu.wait.sum",
    // per core
    "cpu.idle.sum",
    "cpu.maxlimited.sum",
    "cpu.overlap.sum",
    "cpu.run.sum",
    "cpu.system.sum",
    "cpu.usage.avg",
    "cpu.usage.min",
    "cpu.usage.max",
    "cpu.usage.raw",
    "cpu.used.sum",
];

const HOST_METRICS: &[&str] = &[
    "cpu.costop.sum",
    "cpu.demand.avg",
    "cpu.latency.avg",
    "cpu.readiness.avg",
    "cpu.ready.sum",
    "cpu.reservedCapacity.avg",
    "cpu.swapwait.sum",
    "cpu.totalCapacity.avg",
    "cpu.usagemhz.avg",
    "cpu.usagemhz.min",
    "cpu.usagemhz.max",
    "cpu.usagemhz.raw",
    "cpu.wait.sum",
    // per core
    "cpu.coreUtilization.avg",
    "cpu.coreUtilization.min",
    "cpu.coreUtilization.max",
    "cpu.coreUtilization.raw",
    "cpu.idle.sum",
    "cpu.usage.avg",
    "cpu.usage.min",
    "cpu.usage.max",
    "cpu.usage.raw",
    "cpu.used.sum",
    "cpu.utilization.avg",
    "cpu.utilization.min",
    "cpu.utilization.max",
    "cpu.utilization.raw",
];

const DATASTORE_METRICS: &[&str] = &["disk.used.latest"];

/// Metric names collected for each entity class. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct AllowedMetrics {
    by_class: HashMap<EntityClass, HashSet<String>>,
}

impl AllowedMetrics {
    pub fn builtin() -> Self {
        let to_set = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<HashSet<_>>();
        let mut by_class = HashMap::new();
        by_class.insert(EntityClass::VirtualMachine, to_set(VM_METRICS));
        by_class.insert(EntityClass::Host, to_set(HOST_METRICS));
        by_class.insert(EntityClass::Datastore, to_set(DATASTORE_METRICS));
        by_class.insert(EntityClass::Datacenter, HashSet::new());
        by_class.insert(EntityClass::Cluster, HashSet::new());
        Self { by_class }
    }

    pub fn is_allowed(&self, class: EntityClass, metric_name: &str) -> bool {
        self.by_class
            .get(&class)
            .is_some_and(|names| names.contains(metric_name))
    }
}

impl Default for AllowedMetrics {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Whether a metric is reported per instance (core, LUN, ...) rather than as
/// a single aggregate.
pub fn should_collect_per_instance_values(metric_name: &str) -> bool {
    metric_name.starts_with("cpu.us") || metric_name.starts_with("disk.used.latest")
}

/// Tag key carrying the instance of a per-instance metric.
pub fn instance_tag_key(metric_name: &str) -> &'static str {
    if metric_name.starts_with("cpu") {
        "cpu_core"
    } else {
        "instance"
    }
}
