mod config;
mod snapshot;

use anyhow::Result;
use snapshot::SnapshotConnector;
use std::io::Write;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;
use vsmon_common::sink::MetricBuffer;
use vsmon_common::types::MetricDataPoint;
use vsmon_vsphere::check::VsphereCheck;
use vsmon_vsphere::config::CheckSettings;

/// Write one JSON object per point.
fn write_points<W: Write>(out: &mut W, points: &[MetricDataPoint]) -> Result<()> {
    for point in points {
        serde_json::to_writer(&mut *out, point)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("vsmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = config::AgentConfig::load(&config_path)?;
    let settings = CheckSettings::from_config(&config.vsphere)?;
    tracing::info!(host = %settings.connect.host, collection_type = %settings.collection_type, "vsmon-agent starting");

    let buffer = Arc::new(MetricBuffer::new(config.buffer_max_size));
    let connector = Arc::new(SnapshotConnector::new(&config.snapshot_path));
    let mut check = VsphereCheck::new(settings, connector, buffer.clone());

    let mut tick = interval(Duration::from_secs(config.collection_interval_secs));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reported_dropped = 0;

    tracing::info!(
        interval_secs = config.collection_interval_secs,
        buffer_max = config.buffer_max_size,
        snapshot = %config.snapshot_path,
        "Starting collection loop"
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // Failed cycles are logged by the check and retried on the next tick.
                if let Ok(report) = check.check().await {
                    tracing::debug!(?report, "Cycle finished");
                }

                let points = buffer.drain_all();
                let dropped = buffer.dropped();
                if dropped > reported_dropped {
                    tracing::warn!(dropped = dropped - reported_dropped, "Metric buffer overflowed");
                    reported_dropped = dropped;
                }
                write_points(&mut std::io::stdout().lock(), &points)?;
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn points_are_written_as_json_lines() {
        let points = vec![
            MetricDataPoint {
                timestamp: Utc::now(),
                metric_name: "cpu.usage.avg".into(),
                value: 0.3,
                hostname: Some("esx1".into()),
                tags: vec!["cpu_core:none".into()],
            },
            MetricDataPoint {
                timestamp: Utc::now(),
                metric_name: "disk.used.latest".into(),
                value: 2048.0,
                hostname: None,
                tags: vec![],
            },
        ];

        let mut out = Vec::new();
        write_points(&mut out, &points).unwrap();

        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 2);
        let first: MetricDataPoint = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, points[0]);
    }
}
