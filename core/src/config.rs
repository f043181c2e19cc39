use crate::completion::{GenerationParams, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::provider::{FailurePolicy, ProviderKind};
use crate::store::StateStore;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_NAMESPACE: &str = "snowcell";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub failure_policy: FailurePolicy,
    pub state_dir: PathBuf,
    /// Prefix accepted in front of model keys, e.g. `snowcell:qwen`.
    pub namespace: String,
    pub remote: RemoteSettings,
    pub defaults: GenerationParams,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Replaces the catalog endpoint with `<base_url>/v1/chat/completions`.
    pub base_url: Option<Url>,
    pub timeout: Duration,
    /// The endpoint understands `"stream": true` and answers with SSE frames.
    pub native_streaming: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            native_streaming: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Remote,
            failure_policy: FailurePolicy::Fallback,
            state_dir: StateStore::default_root(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            remote: RemoteSettings::default(),
            defaults: GenerationParams::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Read { path, .. } => format!("Could not read {}.", path.display()),
            Self::Invalid(detail) => format!("SnowCell not configured: {detail}. Update snc.yaml."),
        }
    }
}

impl Settings {
    /// Settings from the first `snc.yaml` found, then environment overrides.
    /// No file at all means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match locate_config_file() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_environment()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: SncConfig = serde_yaml::from_str(contents)
            .map_err(|err| ConfigError::Invalid(format!("invalid snc.yaml: {err}")))?;
        resolve_settings(config)
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::new(self.state_dir.clone())
    }

    fn apply_environment(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("SNC_PROVIDER") {
            self.provider = ProviderKind::parse(&value)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown SNC_PROVIDER `{value}`")))?;
        }
        if let Ok(value) = std::env::var("SNC_STRICT") {
            self.failure_policy = FailurePolicy::from_strict(parse_flag(&value)?);
        }
        if let Ok(value) = std::env::var("SNC_STATE_DIR") {
            self.state_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("SNOWCELL_API_BASE") {
            self.remote.base_url = Some(parse_url(&value)?);
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid(format!("`{other}` is not a boolean"))),
    }
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|err| ConfigError::Invalid(format!("invalid base url `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "base url `{value}` must use http or https"
        )));
    }
    Ok(url)
}

fn resolve_settings(config: SncConfig) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();
    if let Some(provider) = config.provider {
        settings.provider = provider;
    }
    if let Some(strict) = config.strict {
        settings.failure_policy = FailurePolicy::from_strict(strict);
    }
    if let Some(state_dir) = config.state_dir {
        settings.state_dir = expand_home(&state_dir);
    }
    if let Some(namespace) = config.namespace {
        let namespace = namespace.trim().to_string();
        if namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace cannot be empty".to_string()));
        }
        settings.namespace = namespace;
    }

    let remote = config.remote.unwrap_or_default();
    if let Some(base_url) = remote.base_url {
        settings.remote.base_url = Some(parse_url(&base_url)?);
    }
    if let Some(timeout_secs) = remote.timeout_secs {
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "remote.timeout_secs must be positive".to_string(),
            ));
        }
        settings.remote.timeout = Duration::from_secs(timeout_secs);
    }
    settings.remote.native_streaming = remote.native_streaming.unwrap_or(false);

    let defaults = config.defaults.unwrap_or_default();
    settings.defaults = GenerationParams {
        temperature: defaults.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: defaults.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    };
    settings
        .defaults
        .validate()
        .map_err(|err| ConfigError::Invalid(format!("defaults: {err}")))?;

    Ok(settings)
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), BaseDirs::new()) {
        (Some(rest), Some(base)) => base.home_dir().join(rest),
        _ => PathBuf::from(path),
    }
}

fn locate_config_file() -> Option<PathBuf> {
    snc_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn snc_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("snowcell");
        paths.push(config_dir.join("snc.yaml"));
        paths.push(config_dir.join("snc.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".snc").join("snc.yaml"));
        paths.push(home_dir.join(".snc").join("snc.yml"));
    } else {
        paths.push(PathBuf::from("snc.yaml"));
        paths.push(PathBuf::from("snc.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SncConfig {
    provider: Option<ProviderKind>,
    strict: Option<bool>,
    state_dir: Option<String>,
    namespace: Option<String>,
    remote: Option<RemoteSection>,
    defaults: Option<DefaultsSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteSection {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    native_streaming: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefaultsSection {
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}
