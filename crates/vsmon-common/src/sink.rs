use crate::types::{ExternalHostTags, MetricDataPoint};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Destination for the values a check produces.
///
/// Implementations must tolerate being called from the thread that drives a
/// check cycle while other threads read previously submitted data.
pub trait MetricSink: Send + Sync {
    /// Submit an instantaneous value.
    fn gauge(&self, name: &str, value: f64, hostname: Option<&str>, tags: &[String]);

    /// Replace the host-level tags published for the check.
    fn set_external_tags(&self, tags: Vec<ExternalHostTags>);
}

#[derive(Default)]
struct BufferState {
    points: VecDeque<MetricDataPoint>,
    external_tags: Vec<ExternalHostTags>,
    dropped: u64,
}

/// Bounded in-memory sink. Once `max_size` points are held the oldest point
/// is dropped for every new one.
pub struct MetricBuffer {
    state: Mutex<BufferState>,
    max_size: usize,
}

impl MetricBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                points: VecDeque::with_capacity(max_size.min(4096)),
                ..Default::default()
            }),
            max_size,
        }
    }

    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn drain_all(&self) -> Vec<MetricDataPoint> {
        self.state().points.drain(..).collect()
    }

    /// Last published external tags. Publishing is a replace, not an append.
    pub fn external_tags(&self) -> Vec<ExternalHostTags> {
        self.state().external_tags.clone()
    }

    pub fn len(&self) -> usize {
        self.state().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().points.is_empty()
    }

    /// Number of points evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.state().dropped
    }
}

impl MetricSink for MetricBuffer {
    fn gauge(&self, name: &str, value: f64, hostname: Option<&str>, tags: &[String]) {
        let point = MetricDataPoint {
            timestamp: Utc::now(),
            metric_name: name.to_string(),
            value,
            hostname: hostname.map(str::to_string),
            tags: tags.to_vec(),
        };

        let mut state = self.state();
        if self.max_size == 0 {
            state.dropped += 1;
            return;
        }
        if state.points.len() >= self.max_size {
            state.points.pop_front();
            state.dropped += 1;
        }
        state.points.push_back(point);
    }

    fn set_external_tags(&self, tags: Vec<ExternalHostTags>) {
        tracing::debug!(hosts = tags.len(), "External host tags replaced");
        self.state().external_tags = tags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_evicts_oldest_when_full() {
        let buffer = MetricBuffer::new(2);
        buffer.gauge("a", 1.0, None, &[]);
        buffer.gauge("b", 2.0, Some("esx1"), &[]);
        buffer.gauge("c", 3.0, None, &["env:prod".to_string()]);

        assert_eq!(buffer.dropped(), 1);
        let points = buffer.drain_all();
        let names: Vec<&str> = points.iter().map(|p| p.metric_name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(points[0].hostname.as_deref(), Some("esx1"));
        assert_eq!(points[1].tags, vec!["env:prod".to_string()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn external_tags_are_replaced() {
        let buffer = MetricBuffer::new(10);
        buffer.set_external_tags(vec![ExternalHostTags::new("vm1", "vsphere", vec![])]);
        buffer.set_external_tags(vec![ExternalHostTags::new("vm2", "vsphere", vec![])]);

        let tags = buffer.external_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].hostname, "vm2");
    }
}
