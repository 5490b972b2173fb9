use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::heating::{Calibration, Location};
use crate::home::geometry::HouseConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub monitoring: MonitoringConfig,
    pub engine: EngineConfig,
    pub location: Location,
    #[serde(default)]
    pub calibration: Calibration,
    pub store: StoreConfig,
    pub house: HouseConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml"))
            .add_source(Environment::default().separator("_").list_separator(","));

        let s = builder.build()?;
        s.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Seconds between evaluation cycles.
    pub cycle_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// JSON file holding the last known sensor values.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub logs: EnvFilterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    pub filters: Vec<String>,
}

impl TryInto<EnvFilter> for EnvFilterConfig {
    type Error = tracing_subscriber::filter::ParseError;

    fn try_into(self) -> Result<EnvFilter, Self::Error> {
        EnvFilter::builder()
            .with_default_directive(self.default_level.parse()?)
            .parse(self.filters.join(","))
    }
}

impl MonitoringConfig {
    pub fn init(&self) -> Result<(), tracing_subscriber::filter::ParseError> {
        let filter: EnvFilter = self.logs.clone().try_into()?;
        let fmt_layer = tracing_subscriber::fmt::layer();

        tracing_subscriber::registry().with(fmt_layer).with(filter).init();

        Ok(())
    }
}
