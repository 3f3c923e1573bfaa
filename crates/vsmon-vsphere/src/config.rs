use crate::api::{ConnectOptions, TlsOptions};
use crate::entity::EntityClass;
use crate::error::{Result, VsphereError};
use crate::filters::{compile_patterns, FilterProperty, MetricFilters, ResourceFilters};
use crate::metrics::AllowedMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Instance configuration as written by the user.
#[derive(Clone, Serialize, Deserialize)]
pub struct VsphereInstanceConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_ssl_verify")]
    pub ssl_verify: bool,
    #[serde(default)]
    pub ssl_capath: Option<String>,
    #[serde(default = "default_collection_level")]
    pub collection_level: u8,
    /// `realtime` or `historical`.
    #[serde(default = "default_collection_type")]
    pub collection_type: String,
    #[serde(default)]
    pub resource_filters: Vec<ResourceFilterConfig>,
    /// Resource type -> metric name patterns to exclude.
    #[serde(default)]
    pub metric_filters: HashMap<String, Vec<String>>,
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    #[serde(default = "default_batch_morlist_size")]
    pub batch_morlist_size: usize,
    /// Per-query metric cap for historical resources. Negative disables the
    /// cap; unset asks the server.
    #[serde(default)]
    pub max_query_metrics: Option<i64>,
    #[serde(default)]
    pub use_guest_hostname: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_infrastructure_cache_interval_secs")]
    pub infrastructure_cache_interval_secs: u64,
    #[serde(default = "default_metadata_cache_interval_secs")]
    pub metadata_cache_interval_secs: u64,
}

impl fmt::Debug for VsphereInstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VsphereInstanceConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("ssl_verify", &self.ssl_verify)
            .field("ssl_capath", &self.ssl_capath)
            .field("collection_level", &self.collection_level)
            .field("collection_type", &self.collection_type)
            .field("resource_filters", &self.resource_filters)
            .field("metric_filters", &self.metric_filters)
            .field("thread_count", &self.thread_count)
            .field("batch_morlist_size", &self.batch_morlist_size)
            .field("max_query_metrics", &self.max_query_metrics)
            .field("use_guest_hostname", &self.use_guest_hostname)
            .field("tags", &self.tags)
            .field("infrastructure_cache_interval_secs", &self.infrastructure_cache_interval_secs)
            .field("metadata_cache_interval_secs", &self.metadata_cache_interval_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceFilterConfig {
    pub resource: String,
    pub property: String,
    pub patterns: Vec<String>,
}

fn default_ssl_verify() -> bool {
    true
}

fn default_collection_level() -> u8 {
    1
}

fn default_collection_type() -> String {
    "realtime".to_string()
}

fn default_thread_count() -> usize {
    4
}

fn default_batch_morlist_size() -> usize {
    50
}

fn default_infrastructure_cache_interval_secs() -> u64 {
    180
}

fn default_metadata_cache_interval_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionType {
    Realtime,
    Historical,
}

impl CollectionType {
    pub fn classes(&self) -> &'static [EntityClass] {
        match self {
            CollectionType::Realtime => &EntityClass::REALTIME,
            CollectionType::Historical => &EntityClass::HISTORICAL,
        }
    }

    pub fn collects(&self, class: EntityClass) -> bool {
        self.classes().contains(&class)
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionType::Realtime => f.write_str("realtime"),
            CollectionType::Historical => f.write_str("historical"),
        }
    }
}

impl std::str::FromStr for CollectionType {
    type Err = VsphereError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "realtime" => Ok(CollectionType::Realtime),
            "historical" => Ok(CollectionType::Historical),
            other => Err(VsphereError::Configuration(format!(
                "collection_type is {other:?}, it should be either 'realtime' or 'historical'"
            ))),
        }
    }
}

/// Validated settings the check runs with.
#[derive(Debug, Clone)]
pub struct CheckSettings {
    pub connect: ConnectOptions,
    pub collection_level: u8,
    pub collection_type: CollectionType,
    pub resource_filters: ResourceFilters,
    pub metric_filters: MetricFilters,
    pub allowed_metrics: AllowedMetrics,
    pub thread_count: usize,
    pub batch_morlist_size: usize,
    pub max_query_metrics: Option<i64>,
    pub use_guest_hostname: bool,
    pub base_tags: Vec<String>,
    pub infrastructure_cache_interval: Duration,
    pub metadata_cache_interval: Duration,
}

impl CheckSettings {
    /// Validate a user configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VsphereError::Configuration`] for an unknown collection type,
    /// resource type or filter property, or a zero worker/batch size, and
    /// [`VsphereError::InvalidPattern`] for a pattern that does not compile.
    pub fn from_config(config: &VsphereInstanceConfig) -> Result<Self> {
        let collection_type: CollectionType = config.collection_type.parse()?;

        if config.thread_count == 0 {
            return Err(VsphereError::Configuration("thread_count must be at least 1".into()));
        }
        if config.batch_morlist_size == 0 {
            return Err(VsphereError::Configuration(
                "batch_morlist_size must be at least 1".into(),
            ));
        }

        let mut verify = config.ssl_verify;
        if !config.ssl_verify && config.ssl_capath.is_some() {
            tracing::warn!(
                "Both ssl_capath and ssl_verify=false are set; proceeding with verification disabled"
            );
            verify = false;
        }

        Ok(Self {
            connect: ConnectOptions {
                host: config.host.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
                tls: TlsOptions {
                    verify,
                    ca_path: if verify { config.ssl_capath.clone() } else { None },
                },
            },
            collection_level: config.collection_level,
            collection_type,
            resource_filters: build_resource_filters(&config.resource_filters, collection_type)?,
            metric_filters: build_metric_filters(&config.metric_filters)?,
            allowed_metrics: AllowedMetrics::builtin(),
            thread_count: config.thread_count,
            batch_morlist_size: config.batch_morlist_size,
            max_query_metrics: config.max_query_metrics,
            use_guest_hostname: config.use_guest_hostname,
            base_tags: config.tags.clone(),
            infrastructure_cache_interval: Duration::from_secs(
                config.infrastructure_cache_interval_secs,
            ),
            metadata_cache_interval: Duration::from_secs(config.metadata_cache_interval_secs),
        })
    }
}

fn parse_resource(resource: &str) -> Result<EntityClass> {
    let class: EntityClass = resource
        .parse()
        .map_err(VsphereError::Configuration)?;
    if !class.is_realtime() && !class.is_historical() {
        return Err(VsphereError::Configuration(format!(
            "resource type {resource:?} does not report metrics"
        )));
    }
    Ok(class)
}

fn build_resource_filters(
    configs: &[ResourceFilterConfig],
    collection_type: CollectionType,
) -> Result<ResourceFilters> {
    let mut filters = ResourceFilters::default();

    for f in configs {
        let class = parse_resource(&f.resource)?;
        let property = FilterProperty::parse(class, &f.property).ok_or_else(|| {
            VsphereError::Configuration(format!(
                "property {:?} is not valid for resource type {}",
                f.property, f.resource
            ))
        })?;
        let patterns = compile_patterns(&f.patterns)?;

        if !collection_type.collects(class) {
            tracing::warn!(
                resource = %f.resource,
                collection_type = %collection_type,
                "Ignoring filter for a resource type that is not collected"
            );
            continue;
        }

        if !filters.insert(class, property, patterns) {
            tracing::warn!(
                resource = %f.resource,
                property = %f.property,
                "Ignoring duplicate filter for the same resource type and property"
            );
        }
    }

    Ok(filters)
}

fn build_metric_filters(configs: &HashMap<String, Vec<String>>) -> Result<MetricFilters> {
    let mut filters = MetricFilters::default();
    for (resource, patterns) in configs {
        let class = parse_resource(resource)?;
        filters.insert(class, compile_patterns(patterns)?);
    }
    Ok(filters)
}
