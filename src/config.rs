use crate::error::{Result, TsError};
use crate::splice::LoopMode;
use crate::streamer::{StreamerOptions, DEFAULT_BUFFER_CAPACITY};
use serde::{Deserialize, Deserializer};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_ADDRESS: &str = "TSCAST_ADDRESS";
pub const ENV_PORT: &str = "TSCAST_PORT";
pub const ENV_TTL: &str = "TSCAST_TTL";
pub const ENV_BUFFER_CAPACITY: &str = "TSCAST_BUFFER_CAPACITY";
pub const ENV_LOG_LEVEL: &str = "TSCAST_LOG_LEVEL";

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./tscast.toml", "./config.toml"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub address: String,
    pub port: u16,
    pub ttl: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            address: String::from("239.0.0.1"),
            port: 1234,
            ttl: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub buffer_capacity: usize,
    pub fix_continuity: bool,
    /// `"once"`, `"infinite"` or a positive number of passes.
    #[serde(deserialize_with = "deserialize_loops")]
    pub loops: LoopMode,
    pub splice_gap_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            fix_continuity: true,
            loops: LoopMode::Once,
            splice_gap_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub output: OutputConfig,
    pub stream: StreamConfig,
    pub inputs: Vec<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            stream: StreamConfig::default(),
            inputs: Vec::new(),
            log_level: String::from("info"),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reads the first config file found in the working directory, falling
    /// back to defaults, then applies `TSCAST_*` environment variables.
    pub fn load_default() -> Result<Self> {
        let mut config = DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Self::load)
            .transpose()?
            .unwrap_or_default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_ADDRESS) {
            self.output.address = address;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.output.port = parse_var(ENV_PORT, &port)?;
        }
        if let Some(ttl) = lookup(ENV_TTL) {
            self.output.ttl = parse_var(ENV_TTL, &ttl)?;
        }
        if let Some(capacity) = lookup(ENV_BUFFER_CAPACITY) {
            self.stream.buffer_capacity = parse_var(ENV_BUFFER_CAPACITY, &capacity)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.buffer_capacity == 0 {
            return Err(TsError::Config(
                "stream.buffer_capacity must be greater than zero".into(),
            ));
        }
        self.stream.loops.validate()?;
        if self.inputs.is_empty() {
            return Err(TsError::Config("no inputs configured".into()));
        }
        self.target()?;
        Ok(())
    }

    pub fn target(&self) -> Result<SocketAddr> {
        let ip = IpAddr::from_str(&self.output.address).map_err(|e| {
            TsError::Config(format!("invalid address '{}': {}", self.output.address, e))
        })?;
        Ok(SocketAddr::new(ip, self.output.port))
    }

    pub fn splice_gap(&self) -> Duration {
        Duration::from_millis(self.stream.splice_gap_ms)
    }

    pub fn streamer_options(&self) -> StreamerOptions {
        StreamerOptions::default().with_buffer_capacity(self.stream.buffer_capacity)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| TsError::Config(format!("{}='{}': {}", key, value, e)))
}

impl FromStr for LoopMode {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self> {
        let mode = match s.trim().to_lowercase().as_str() {
            "once" => LoopMode::Once,
            "infinite" | "forever" => LoopMode::Infinite,
            other => LoopMode::Count(other.parse().map_err(|_| {
                TsError::Config(format!(
                    "loops must be 'once', 'infinite' or a number, got '{}'",
                    s
                ))
            })?),
        };
        mode.validate()?;
        Ok(mode)
    }
}

fn deserialize_loops<'de, D>(deserializer: D) -> std::result::Result<LoopMode, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loops {
        Count(u32),
        Name(String),
    }

    match Loops::deserialize(deserializer)? {
        Loops::Count(0) => Err(serde::de::Error::custom("loops must be greater than zero")),
        Loops::Count(n) => Ok(LoopMode::Count(n)),
        Loops::Name(name) => name.parse().map_err(serde::de::Error::custom),
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tscast configuration

# Input files, played in order
inputs = ["intro.ts", "main.ts"]

# OFF, ERROR, WARN, INFO, DEBUG or TRACE
log_level = "info"

[output]
address = "239.0.0.1"
port = 1234
ttl = 1

[stream]
buffer_capacity = 1000
fix_continuity = true
# "once", "infinite" or a number of passes
loops = "once"
splice_gap_ms = 0
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.stream.buffer_capacity, 1000);
        assert!(config.stream.fix_continuity);
        assert_eq!(config.stream.loops, LoopMode::Once);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            inputs = ["a.ts", "b.ts"]
            log_level = "debug"

            [output]
            address = "127.0.0.1"
            port = 5000
            ttl = 4

            [stream]
            buffer_capacity = 50
            fix_continuity = false
            loops = 3
            splice_gap_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.inputs, vec![PathBuf::from("a.ts"), PathBuf::from("b.ts")]);
        assert_eq!(config.target().unwrap(), "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.output.ttl, 4);
        assert_eq!(config.stream.loops, LoopMode::Count(3));
        assert_eq!(config.splice_gap(), Duration::from_millis(100));
        assert!(!config.stream.fix_continuity);
        config.validate().unwrap();
    }

    #[test]
    fn test_named_loops() {
        let config = Config::from_toml_str("[stream]\nloops = \"infinite\"").unwrap();
        assert_eq!(config.stream.loops, LoopMode::Infinite);

        assert!(Config::from_toml_str("[stream]\nloops = 0").is_err());
        assert!(Config::from_toml_str("[stream]\nloops = \"sometimes\"").is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(matches!(
            Config::from_toml_str("[output]\nhost = \"x\""),
            Err(TsError::Toml(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.inputs.push(PathBuf::from("a.ts"));
        config.validate().unwrap();

        config.stream.buffer_capacity = 0;
        assert!(matches!(config.validate(), Err(TsError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [(ENV_PORT, "6000"), (ENV_BUFFER_CAPACITY, "10")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.output.port, 6000);
        assert_eq!(config.stream.buffer_capacity, 10);

        let result = config.apply_overrides(|key| (key == ENV_TTL).then(|| "many".to_string()));
        assert!(matches!(result, Err(TsError::Config(_))));
    }

    #[test]
    fn test_loop_mode_from_str() {
        assert_eq!("once".parse::<LoopMode>().unwrap(), LoopMode::Once);
        assert_eq!("Infinite".parse::<LoopMode>().unwrap(), LoopMode::Infinite);
        assert_eq!("2".parse::<LoopMode>().unwrap(), LoopMode::Count(2));
        assert!("0".parse::<LoopMode>().is_err());
    }

    #[test]
    fn test_template_parses() {
        let path = std::env::temp_dir().join(format!("tscast-template-{}.toml", std::process::id()));
        let _ = std::fs::remove_file(&path);
        create_default_config_template(&path).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.inputs.len(), 2);
        std::fs::remove_file(&path).unwrap();
    }
}
