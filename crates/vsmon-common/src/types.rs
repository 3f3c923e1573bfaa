use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One gauge submission produced by a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
    /// Host the value is attributed to. `None` means the point is reported
    /// against the check itself and identified only by its tags.
    pub hostname: Option<String>,
    pub tags: Vec<String>,
}

/// Tags attached to a host outside of any metric submission, grouped by
/// source namespace (e.g. `"vsphere"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalHostTags {
    pub hostname: String,
    pub tags: HashMap<String, Vec<String>>,
}

impl ExternalHostTags {
    pub fn new(hostname: impl Into<String>, namespace: &str, tags: Vec<String>) -> Self {
        let mut by_namespace = HashMap::new();
        by_namespace.insert(namespace.to_string(), tags);
        Self {
            hostname: hostname.into(),
            tags: by_namespace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_host_tags_are_grouped_under_namespace() {
        let ext = ExternalHostTags::new("esx1", "vsphere", vec!["vsphere_type:host".into()]);
        assert_eq!(ext.hostname, "esx1");
        assert_eq!(ext.tags["vsphere"], vec!["vsphere_type:host".to_string()]);
    }

    #[test]
    fn data_point_serializes_null_hostname() {
        let point = MetricDataPoint {
            timestamp: Utc::now(),
            metric_name: "disk.used.latest".into(),
            value: 1.0,
            hostname: None,
            tags: vec![],
        };
        let json = serde_json::to_value(&point).unwrap();
        assert!(json["hostname"].is_null());
        assert_eq!(json["metric_name"], "disk.used.latest");
    }
}
