use crate::platform::PlatformSetting;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SEED_INPUT: &str = "<html a=\"value\">...</html>";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to read seed file at {path:?}: {source}")]
    SeedFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Could not find command '{command}' in {working_dir:?}")]
    TargetNotFound {
        command: String,
        working_dir: PathBuf,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerSettings {
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default = "default_seed_input")]
    pub seed_input: String,
    /// Read the initial seed from this file instead of `seed_input`.
    pub seed_file: Option<PathBuf>,
    /// Fixed RNG seed. When unset, a fresh one is drawn per run.
    pub rng_seed: Option<u64>,
    #[serde(default = "default_max_consecutive_spawn_failures")]
    pub max_consecutive_spawn_failures: u32,
}

pub fn default_iterations() -> u64 {
    1000
}
fn default_seed_input() -> String {
    DEFAULT_SEED_INPUT.to_string()
}
pub fn default_max_consecutive_spawn_failures() -> u32 {
    3
}

impl Default for FuzzerSettings {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            seed_input: default_seed_input(),
            seed_file: None,
            rng_seed: None,
            max_consecutive_spawn_failures: default_max_consecutive_spawn_failures(),
        }
    }
}

impl FuzzerSettings {
    /// The starting seed bytes, from `seed_file` when set.
    pub fn load_seed(&self) -> Result<Vec<u8>, ConfigError> {
        match &self.seed_file {
            Some(path) => std::fs::read(path).map_err(|source| ConfigError::SeedFile {
                path: path.clone(),
                source,
            }),
            None => Ok(self.seed_input.as_bytes().to_vec()),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExecutorSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub platform: PlatformSetting,
}

fn default_timeout_ms() -> u64 {
    2000
}
fn default_working_dir() -> PathBuf {
    PathBuf::from("./")
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            working_dir: default_working_dir(),
            platform: PlatformSetting::default(),
        }
    }
}

impl ExecutorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks that the program named by `command` exists relative to the
    /// working directory. Only the first whitespace-separated word is the
    /// program; the rest are its arguments.
    pub fn check_target(&self, command: &str) -> Result<PathBuf, ConfigError> {
        let not_found = || ConfigError::TargetNotFound {
            command: command.to_string(),
            working_dir: self.working_dir.clone(),
        };
        let program = command.split_whitespace().next().ok_or_else(not_found)?;
        let path = self.working_dir.join(Path::new(program));
        if path.exists() {
            Ok(path)
        } else {
            Err(not_found())
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TumblerConfig {
    #[serde(default)]
    pub fuzzer: FuzzerSettings,
    #[serde(default)]
    pub executor: ExecutorSettings,
}

impl TumblerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fuzzer.iterations == 0 {
            return Err(ConfigError::Invalid("iterations must be greater than 0".into()));
        }
        if self.fuzzer.max_consecutive_spawn_failures == 0 {
            return Err(ConfigError::Invalid(
                "max-consecutive-spawn-failures must be greater than 0".into(),
            ));
        }
        if self.executor.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout-ms must be greater than 0".into()));
        }
        Ok(())
    }
}
