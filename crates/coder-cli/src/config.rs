use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const CONFIG_VERSION: u32 = 2;
const DICTIONARY_FILE: &str = "dictionary.csv";

pub const STRATEGIES: [&str; 3] = ["rules", "dictionary", "scored"];

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory not found; set HOME")]
    HomeMissing,
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub dictionaries_dir: PathBuf,
}

impl ConfigPaths {
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::HomeMissing)?;
        Ok(Self::from_base(PathBuf::from(home).join(".coder")))
    }

    pub fn from_base(base_dir: PathBuf) -> Self {
        let config_path = base_dir.join("config.toml");
        let dictionaries_dir = base_dir.join("dictionaries");
        Self {
            base_dir,
            config_path,
            dictionaries_dir,
        }
    }

    /// Where `coder dictionary install` puts the active dictionary.
    pub fn default_dictionary(&self) -> PathBuf {
        self.dictionaries_dir.join(DICTIONARY_FILE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub classify: ClassifyConfig,
    pub llm: LlmConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            classify: ClassifyConfig::default(),
            llm: LlmConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    pub strategy: String,
    pub threshold: f64,
    /// Dictionary path; empty means the installed default.
    pub dictionary: String,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            strategy: "rules".to_string(),
            threshold: coder_core::aggregate::DEFAULT_THRESHOLD,
            dictionary: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: coder_core::llm::DEFAULT_PROVIDER.to_string(),
            model: coder_core::llm::openrouter::DEFAULT_MODEL.to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output directory; empty writes beside each input.
    pub dir: String,
}

impl Config {
    pub fn load_or_create(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        ensure_dirs(paths)?;
        if paths.config_path.exists() {
            let config = Self::load(paths)?;
            return Ok(config);
        }

        let config = Self::default();
        Self::write(paths, &config)?;
        Ok(config)
    }

    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        ensure_dirs(paths)?;
        let content = fs::read_to_string(&paths.config_path)?;
        let raw: toml::Value = toml::from_str(&content)?;
        let file_version = raw
            .get("version")
            .and_then(|value| value.as_integer())
            .unwrap_or(0) as u32;

        let mut config: Config = toml::from_str(&content)?;
        let mut migrated = false;

        if file_version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
            migrated = true;
        } else if file_version > CONFIG_VERSION {
            warn!(file_version, supported = CONFIG_VERSION, "config version is newer than supported; proceeding");
        }

        warn_if_loose_permissions(&paths.config_path)?;

        if migrated {
            Self::write(paths, &config)?;
        }

        Ok(config)
    }

    pub fn write(paths: &ConfigPaths, config: &Config) -> Result<(), ConfigError> {
        ensure_dirs(paths)?;
        let content = toml::to_string_pretty(config)?;
        write_atomic(&paths.config_path, content.as_bytes())?;
        Ok(())
    }

    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        if !redacted.llm.api_key.trim().is_empty() {
            redacted.llm.api_key = "<redacted>".to_string();
        }
        redacted
    }

    /// Configured dictionary, or the installed default.
    pub fn dictionary_path(&self, paths: &ConfigPaths) -> PathBuf {
        let configured = self.classify.dictionary.trim();
        if configured.is_empty() {
            paths.default_dictionary()
        } else {
            PathBuf::from(configured)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_strategy("classify.strategy", &self.classify.strategy)?;
        validate_threshold("classify.threshold", self.classify.threshold)?;

        if self.llm.provider != coder_core::llm::DEFAULT_PROVIDER {
            return Err(ConfigError::Validation(format!(
                "llm.provider must be openrouter (got {})",
                self.llm.provider
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".into()));
        }
        let output_dir = self.output.dir.trim();
        if !output_dir.is_empty() && Path::new(output_dir).is_file() {
            return Err(ConfigError::Validation(format!(
                "output.dir is a file: {output_dir}"
            )));
        }
        Ok(())
    }
}

pub fn validate_strategy(field: &str, value: &str) -> Result<(), ConfigError> {
    if STRATEGIES.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{field} must be rules, dictionary or scored (got {value})"
        )))
    }
}

pub fn validate_threshold(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{field} must be between 0.0 and 1.0 (got {value})"
        )))
    }
}

fn ensure_dirs(paths: &ConfigPaths) -> Result<(), ConfigError> {
    fs::create_dir_all(&paths.base_dir)?;
    fs::create_dir_all(&paths.dictionaries_dir)?;
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("config path missing parent directory"))?;
    let tmp_path = parent.join("config.toml.tmp");
    fs::write(&tmp_path, contents)?;
    set_strict_permissions(&tmp_path)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn set_strict_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perm)?;
    }
    Ok(())
}

fn warn_if_loose_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            warn!(path = %path.display(), "config file is group/world readable; set permissions to 0600");
        }
    }
    Ok(())
}
