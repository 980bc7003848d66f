use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::tracker::LatLng;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    pub entities: Vec<String>,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub headings: HeadingsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub base_url: Url,
    #[serde(default = "default_timeout", deserialize_with = "duration")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval", deserialize_with = "duration")]
    pub interval: Duration,
    #[serde(default = "default_fleet_interval", deserialize_with = "duration")]
    pub fleet_interval: Duration,
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_fleet_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            fleet_interval: default_fleet_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_center")]
    pub center: String,
    #[serde(default = "default_zoom")]
    pub zoom: u8,
}

fn default_center() -> String {
    "27.7123,-97.3246".to_string()
}

fn default_zoom() -> u8 {
    14
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: default_center(),
            zoom: default_zoom(),
        }
    }
}

impl MapConfig {
    pub fn center(&self) -> Option<LatLng> {
        LatLng::from_coordinates(&self.center)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadingsConfig {
    /// Keeps headings in memory only when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Log,
    Geojson,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: OutputKind,
    pub path: Option<PathBuf>,
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.entities.is_empty() {
            return invalid("no entities to track".into());
        }
        if let Some(cs) = self.entities.iter().find(|cs| cs.trim().is_empty()) {
            return invalid(format!("blank call sign {:?}", cs));
        }
        if self.poll.interval.is_zero() || self.poll.fleet_interval.is_zero() {
            return invalid("poll intervals must be positive".into());
        }
        if self.map.center().is_none() {
            return invalid(format!("map.center {:?} is not \"lat,lon\"", self.map.center));
        }
        if self.output.kind == OutputKind::Geojson && self.output.path.is_none() {
            return invalid("output.path is required for geojson output".into());
        }
        Ok(())
    }

    pub fn tracks(&self, call_sign: &str) -> bool {
        self.entities.iter().any(|cs| cs == call_sign)
    }
}
