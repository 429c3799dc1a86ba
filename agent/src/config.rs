use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs::File, io::Read, path::Path};

use serde::Deserialize;

use crate::agent::{AgentBuilder, DEFAULT_DURATION, DEFAULT_TICK_INTERVAL};
use crate::rotation::EnabledProfiles;

#[derive(Deserialize, Debug)]
pub struct AgentConfig {
    pub collector: Collector,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub profiles: Profiles,
}

#[derive(Deserialize, Debug)]
pub struct Collector {
    pub addr: String,
    pub service: String,
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Profiles {
    #[serde(flatten)]
    pub enabled: EnabledProfiles,
    pub cpu_duration_secs: u64,
    pub trace_duration_secs: u64,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            enabled: EnabledProfiles::default(),
            cpu_duration_secs: DEFAULT_DURATION.as_secs(),
            trace_duration_secs: DEFAULT_DURATION.as_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    DEFAULT_TICK_INTERVAL.as_secs()
}

impl AgentConfig {
    pub fn new() -> Result<Self> {
        Self::from_path("Agent.toml")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let current_dir = std::env::current_dir().context("unable to get current dir")?;
        let mut config_file = File::open(path)
            .with_context(move || format!("{path:?} not found in {current_dir:?}"))?;
        let mut contents = String::new();
        config_file
            .read_to_string(&mut contents)
            .with_context(|| format!("something went wrong reading {path:?}"))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Agent options described by this config.
    pub fn builder(&self) -> AgentBuilder {
        let mut builder = AgentBuilder::new(&self.collector.addr, &self.collector.service)
            .with_profiles(self.profiles.enabled)
            .with_cpu_duration(Duration::from_secs(self.profiles.cpu_duration_secs))
            .with_tick_interval(Duration::from_secs(self.collector.tick_interval_secs));
        if self.profiles.enabled.trace {
            builder = builder.with_trace(Duration::from_secs(self.profiles.trace_duration_secs));
        }
        for (k, v) in &self.labels {
            builder = builder.with_label(k, v);
        }
        builder
    }
}
