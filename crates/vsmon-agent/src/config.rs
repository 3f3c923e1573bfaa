use anyhow::Context;
use serde::Deserialize;
use vsmon_vsphere::config::VsphereInstanceConfig;

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,
    #[serde(default = "default_buffer_max_size")]
    pub buffer_max_size: usize,
    /// Recorded inventory, counter catalog and samples served to the check.
    pub snapshot_path: String,
    pub vsphere: VsphereInstanceConfig,
}

fn default_collection_interval() -> u64 {
    20
}

fn default_buffer_max_size() -> usize {
    10_000
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("failed to parse config {path}"))?;
        if config.collection_interval_secs == 0 {
            anyhow::bail!("collection_interval_secs must be at least 1");
        }
        Ok(config)
    }
}
