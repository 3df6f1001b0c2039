use crate::{
    detector::{DebounceMode, PollingConfig, ReadingMode},
    phonetic::PhoneticRule,
    synth::SynthBackend,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs::read_to_string;

const CONFIG_FILE: &str = "Config.toml";

/// Input source value meaning "no text source".
pub const NO_INPUT_SOURCE: &str = "none";

/// Per-source settings. An update always carries every field.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub speaker_id: u32,

    /// Spoken by the "generate now" action
    pub text: String,

    /// Name of the text source to monitor, or [NO_INPUT_SOURCE]
    pub input_source: String,

    /// Path of the file to monitor, empty for none
    pub file: String,

    pub phonetic_transcription: bool,

    pub backend: SynthBackend,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speaker_id: 0,
            text: "Hello, World!".to_string(),
            input_source: NO_INPUT_SOURCE.to_string(),
            file: String::new(),
            phonetic_transcription: true,
            backend: SynthBackend::default(),
        }
    }
}

impl Settings {
    pub fn source_name(&self) -> Option<&str> {
        match self.input_source.as_str() {
            "" | NO_INPUT_SOURCE => None,
            name => Some(name),
        }
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        (!self.file.is_empty()).then(|| PathBuf::from(&self.file))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub debounce: DebounceMode,
    pub reading: ReadingMode,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            debounce: DebounceMode::default(),
            reading: ReadingMode::default(),
        }
    }
}

impl PollingSettings {
    pub fn to_polling_config(&self) -> Result<PollingConfig> {
        PollingConfig::new(
            Duration::from_millis(self.interval_ms),
            self.debounce,
            self.reading,
        )
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// How many generation units may synthesize at once
    pub max_concurrent: usize,

    /// How long shutdown waits for in-flight units before abandoning them
    pub shutdown_timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl GenerationConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the WAV stream is served
    pub listen_addr: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7878".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub polling: PollingSettings,
    pub generation: GenerationConfig,
    pub output: OutputConfig,

    /// Replaces the built-in phonetic rules when non-empty
    pub phonetic_rules: Vec<PhoneticRule>,
}

impl Config {
    pub fn parse(config: &str) -> Result<Config> {
        let config: Config = toml::from_str(config)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.polling
            .to_polling_config()
            .context("Invalid [polling] section")?;

        if self.generation.max_concurrent == 0 {
            bail!("Invalid [generation] section: max_concurrent must be at least 1");
        }

        Ok(())
    }
}

pub async fn load() -> Result<Config> {
    load_from(CONFIG_FILE).await
}

pub async fn load_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config = read_to_string(path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))?;

    Config::parse(&config).with_context(|| format!("Could not parse {}", path.display()))
}
