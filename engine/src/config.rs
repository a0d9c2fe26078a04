use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, time::Duration};

use bodycode_providers::ApiConfig;
use bodycode_types::{ApiKey, ModelName};

/// Environment variables consulted, in order, when the config has no key.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// `~/.bodycode/config.toml`. Every section is optional.
///
/// ```toml
/// [api_keys]
/// google = "${GEMINI_API_KEY}"
///
/// [app]
/// model = "gemini-3-flash-preview"
/// validation_model = "gemini-3-flash-preview"
/// compatibility_model = "gemini-3-pro-image-preview"
///
/// [gemini]
/// base_url = "https://generativelanguage.googleapis.com/v1beta"
/// stream_idle_timeout_secs = 60
/// max_output_tokens = 8192
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct BodycodeConfig {
    pub app: Option<AppConfig>,
    pub api_keys: Option<ApiKeys>,
    pub gemini: Option<GeminiConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Model for the analysis chat and follow-up questions.
    pub model: Option<String>,
    pub validation_model: Option<String>,
    pub compatibility_model: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub google: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let google = if self.google.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("google", &google).finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GeminiConfig {
    pub base_url: Option<String>,
    pub stream_idle_timeout_secs: Option<u64>,
    pub max_output_tokens: Option<u32>,
}

/// Models used by each feature, resolved from config with defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub chat: ModelName,
    pub validation: ModelName,
    pub compatibility: ModelName,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            chat: ModelName::chat_default(),
            validation: ModelName::validation_default(),
            compatibility: ModelName::compatibility_default(),
        }
    }
}

/// Replace `${VAR}` references with environment values (missing vars become empty).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }

    out.push_str(rest);
    out
}

fn parse_model(raw: Option<&str>, fallback: ModelName, field: &str) -> ModelName {
    let Some(raw) = raw else {
        return fallback;
    };
    match ModelName::parse(raw) {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!(field, %e, "Ignoring invalid model in config");
            fallback
        }
    }
}

impl BodycodeConfig {
    /// Load the user config. A missing file (or home directory) is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Config key first, then [`API_KEY_ENV_VARS`]. Blank values count as absent.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<ApiKey> {
        self.resolve_api_key_with(|name| env::var(name).ok())
    }

    pub(crate) fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<ApiKey> {
        self.api_keys
            .as_ref()
            .and_then(|keys| keys.google.as_deref())
            .map(expand_env_vars)
            .and_then(ApiKey::new)
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|name| lookup(name).and_then(ApiKey::new))
            })
    }

    #[must_use]
    pub fn models(&self) -> ModelSettings {
        let defaults = ModelSettings::default();
        let app = self.app.as_ref();
        ModelSettings {
            chat: parse_model(
                app.and_then(|a| a.model.as_deref()),
                defaults.chat,
                "app.model",
            ),
            validation: parse_model(
                app.and_then(|a| a.validation_model.as_deref()),
                defaults.validation,
                "app.validation_model",
            ),
            compatibility: parse_model(
                app.and_then(|a| a.compatibility_model.as_deref()),
                defaults.compatibility,
                "app.compatibility_model",
            ),
        }
    }

    /// Endpoint settings for `key`, with `[gemini]` overrides applied.
    #[must_use]
    pub fn api_config(&self, key: ApiKey) -> ApiConfig {
        let mut config = ApiConfig::new(key);
        let Some(gemini) = &self.gemini else {
            return config;
        };
        if let Some(base_url) = gemini.base_url.as_deref().map(str::trim)
            && !base_url.is_empty()
        {
            config = config.with_base_url(base_url);
        }
        if let Some(secs) = gemini.stream_idle_timeout_secs {
            config = config.with_stream_idle_timeout(Duration::from_secs(secs));
        }
        if let Some(tokens) = gemini.max_output_tokens {
            config = config.with_max_output_tokens(tokens);
        }
        config
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".bodycode").join("config.toml"))
}
