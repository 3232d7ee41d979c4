//! Resolve an [`OrchestratorConfig`] from files, inline JSON and the
//! environment.
//!
//! Evaluation order for the base document:
//! 1) an explicit path handed to [`ConfigLoader::with_path`],
//! 2) `$IDSCAN_CONFIG_PATH` (TOML or JSON file),
//! 3) `$IDSCAN_CONFIG_JSON` (inline JSON),
//! 4) the first of [`DEFAULT_CANDIDATES`] found under the base directory,
//! 5) built-in defaults.
//!
//! Per-field `IDSCAN_*` overrides are applied on top of whichever document
//! won. Variables from a `.env` file in the base directory fill in anything
//! the process environment does not set.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use idscan_core::OrchestratorConfig;
use tracing::{debug, warn};

use crate::error::ConfigLoadError;
use crate::util::{duration_millis, parse_bool, parse_duration};
use crate::validation::{ConfigWarnings, guard_rails};

pub const CONFIG_PATH_VAR: &str = "IDSCAN_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "IDSCAN_CONFIG_JSON";

pub const DEFAULT_CANDIDATES: [&str; 4] = [
    "idscan.toml",
    "idscan.json",
    "config/idscan.toml",
    "config/idscan.json",
];

const BARCODE_TIMEOUT_VAR: &str = "IDSCAN_BARCODE_TIMEOUT";
const OCR_TIMEOUT_VAR: &str = "IDSCAN_OCR_TIMEOUT";
const MAX_PROCESSING_TIME_VAR: &str = "IDSCAN_MAX_PROCESSING_TIME";
const MAX_BARCODE_ATTEMPTS_VAR: &str = "IDSCAN_MAX_BARCODE_ATTEMPTS";
const AUTO_FALLBACK_VAR: &str = "IDSCAN_AUTO_FALLBACK";
const MIN_QUALITY_VAR: &str = "IDSCAN_MIN_QUALITY";
const TRANSITION_GRACE_VAR: &str = "IDSCAN_TRANSITION_GRACE";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where the base configuration document came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("built-in defaults"),
            ConfigSource::EnvPath(path) => {
                write!(f, "{} (from ${CONFIG_PATH_VAR})", path.display())
            }
            ConfigSource::EnvInline => write!(f, "${CONFIG_JSON_VAR}"),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: OrchestratorConfig,
    pub source: ConfigSource,
    pub warnings: ConfigWarnings,
    /// `.env` file that contributed variables, if any.
    pub env_file_loaded: Option<PathBuf>,
    /// Names of the `IDSCAN_*` variables that overrode a field.
    pub overrides: Vec<&'static str>,
}

impl ConfigLoad {
    pub fn to_toml(&self) -> Result<String, ConfigLoadError> {
        toml::to_string_pretty(&self.config).map_err(|err| ConfigLoadError::Parse {
            origin: "resolved config".into(),
            message: err.to_string(),
        })
    }
}

pub struct ConfigLoader {
    env: EnvLookup,
    base_dir: PathBuf,
    path: Option<PathBuf>,
    dotenv: bool,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("base_dir", &self.base_dir)
            .field("path", &self.path)
            .field("dotenv", &self.dotenv)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader backed by the process environment and the current directory.
    pub fn new() -> Self {
        let base_dir =
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            env: Arc::new(|name| std::env::var(name).ok()),
            base_dir,
            path: None,
            dotenv: true,
        }
    }

    /// Replace the environment lookup, mainly for tests.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    pub fn with_env_map(self, vars: HashMap<String, String>) -> Self {
        self.with_env(move |name| vars.get(name).cloned())
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Use this file instead of searching the environment and defaults.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn without_dotenv(mut self) -> Self {
        self.dotenv = false;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (dotenv_vars, env_file_loaded) = self.read_dotenv()?;
        let lookup = |name: &str| -> Option<String> {
            (self.env)(name)
                .or_else(|| dotenv_vars.get(name).cloned())
                .filter(|value| !value.trim().is_empty())
        };

        let (mut config, source) = self.resolve_base(&lookup)?;
        let overrides = apply_env_overrides(&mut config, &lookup)?;
        config.validate()?;

        let warnings = guard_rails(&config);
        for warning in warnings.iter() {
            warn!(
                target: "idscan::config",
                field = warning.field,
                hint = warning.hint.as_deref().unwrap_or(""),
                "{}",
                warning.message
            );
        }
        debug!(
            target: "idscan::config",
            source = %source,
            overrides = overrides.len(),
            "configuration resolved"
        );

        Ok(ConfigLoad {
            config,
            source,
            warnings,
            env_file_loaded,
            overrides,
        })
    }

    fn resolve_base(
        &self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(OrchestratorConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.path {
            let path = self.absolute(path);
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        if let Some(raw) = lookup(CONFIG_PATH_VAR) {
            let path = self.absolute(Path::new(raw.trim()));
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = lookup(CONFIG_JSON_VAR) {
            let config = serde_json::from_str(&raw).map_err(|err| {
                ConfigLoadError::Parse {
                    origin: format!("${CONFIG_JSON_VAR}"),
                    message: err.to_string(),
                }
            })?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((OrchestratorConfig::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| self.base_dir.join(candidate))
            .find(|path| path.is_file())
    }

    fn read_dotenv(
        &self,
    ) -> Result<(HashMap<String, String>, Option<PathBuf>), ConfigLoadError> {
        let path = self.base_dir.join(".env");
        if !self.dotenv || !path.is_file() {
            return Ok((HashMap::new(), None));
        }

        let iter = dotenvy::from_path_iter(&path).map_err(|source| {
            ConfigLoadError::EnvFile {
                path: path.clone(),
                source,
            }
        })?;
        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|source| ConfigLoadError::EnvFile {
                path: path.clone(),
                source,
            })?;
            vars.insert(key, value);
        }
        Ok((vars, Some(path)))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

pub fn load_from_file(path: &Path) -> Result<OrchestratorConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            serde_json::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                origin,
                message: err.to_string(),
            })
        }
        Some("toml") | Some("tml") => {
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                origin,
                message: err.to_string(),
            })
        }
        _ => parse_from_str(&contents, &origin),
    }
}

/// Parse a document of unknown format, trying TOML first and then JSON.
pub fn parse_from_str(
    contents: &str,
    origin: &str,
) -> Result<OrchestratorConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            message: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

fn apply_env_overrides(
    config: &mut OrchestratorConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Vec<&'static str>, ConfigLoadError> {
    let mut applied = Vec::new();

    if let Some(ms) = env_millis(lookup, BARCODE_TIMEOUT_VAR)? {
        config.fallback.barcode_timeout_ms = ms;
        applied.push(BARCODE_TIMEOUT_VAR);
    }
    if let Some(ms) = env_millis(lookup, OCR_TIMEOUT_VAR)? {
        config.fallback.ocr_timeout_ms = ms;
        applied.push(OCR_TIMEOUT_VAR);
    }
    if let Some(ms) = env_millis(lookup, MAX_PROCESSING_TIME_VAR)? {
        config.fallback.max_fallback_processing_time_ms = ms;
        applied.push(MAX_PROCESSING_TIME_VAR);
    }
    if let Some(raw) = lookup(MAX_BARCODE_ATTEMPTS_VAR) {
        config.fallback.max_barcode_attempts =
            raw.trim().parse().map_err(|err: std::num::ParseIntError| {
                invalid_env(MAX_BARCODE_ATTEMPTS_VAR, &raw, err.to_string())
            })?;
        applied.push(MAX_BARCODE_ATTEMPTS_VAR);
    }
    if let Some(raw) = lookup(AUTO_FALLBACK_VAR) {
        config.fallback.enable_auto_fallback = parse_bool(&raw).ok_or_else(|| {
            invalid_env(AUTO_FALLBACK_VAR, &raw, "expected a boolean".into())
        })?;
        applied.push(AUTO_FALLBACK_VAR);
    }
    if let Some(raw) = lookup(MIN_QUALITY_VAR) {
        config.fallback.min_quality_threshold =
            raw.trim().parse().map_err(|err: std::num::ParseFloatError| {
                invalid_env(MIN_QUALITY_VAR, &raw, err.to_string())
            })?;
        applied.push(MIN_QUALITY_VAR);
    }
    if let Some(ms) = env_millis(lookup, TRANSITION_GRACE_VAR)? {
        config.transition_grace_ms = ms;
        applied.push(TRANSITION_GRACE_VAR);
    }

    Ok(applied)
}

fn env_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigLoadError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    parse_duration(&raw)
        .map(|duration| Some(duration_millis(duration)))
        .map_err(|reason| invalid_env(name, &raw, reason))
}

fn invalid_env(name: &'static str, value: &str, reason: String) -> ConfigLoadError {
    ConfigLoadError::InvalidEnv {
        name,
        value: value.to_string(),
        reason,
    }
}
