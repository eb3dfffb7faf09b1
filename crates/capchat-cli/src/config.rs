//! Configuration file support

use std::fs;
use std::path::{Path, PathBuf};

use capchat_ai::{DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, GenerationSettings};
use capchat_session::{DEFAULT_SYSTEM_PROMPT, SessionConfig};
use serde::{Deserialize, Serialize};

/// Environment variable consulted when the config has no API key
pub const API_KEY_ENV: &str = "CAPCHAT_API_KEY";

/// Configuration for capchat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key (alternative to the environment variable)
    pub api_key: Option<String>,
    /// Chat-completions endpoint
    pub base_url: Option<String>,
    /// Model to use
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum output tokens per reply
    pub max_tokens: Option<u32>,
    /// Custom system prompt file path
    pub system_prompt_file: Option<String>,
    /// Cap on requests in flight at once
    pub max_concurrent_sessions: Option<usize>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capchat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CAPCHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file; missing or broken files give the defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            model: Some(DEFAULT_MODEL.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            ..Config::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// Get the API key, checking config then env
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key_or(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_or(&self, from_env: Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or(from_env.filter(|key| !key.trim().is_empty()))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Generation parameters, with the built-in defaults filled in
    pub fn settings(&self) -> GenerationSettings {
        let defaults = GenerationSettings::default();
        GenerationSettings {
            model: self.model.clone().unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }

    /// The system instruction: the custom prompt file if one is set and
    /// readable, the built-in prompt otherwise
    pub fn system_prompt(&self) -> String {
        let Some(ref file) = self.system_prompt_file else {
            return DEFAULT_SYSTEM_PROMPT.to_string();
        };

        let path = expand_home(file);
        match fs::read_to_string(&path) {
            Ok(prompt) if !prompt.trim().is_empty() => prompt,
            Ok(_) => {
                eprintln!("Warning: System prompt file {} is empty, using the default", path.display());
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
            Err(e) => {
                eprintln!("Warning: Failed to read system prompt file {}: {}", path.display(), e);
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }

    /// Everything the session manager needs
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            system_prompt: self.system_prompt(),
            settings: self.settings(),
            max_concurrent_sessions: self.max_concurrent_sessions,
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# capchat configuration file
# Place at ~/.config/capchat/config.toml (Linux) or %APPDATA%\capchat\config.toml (Windows)

# API key (optional - can also use the CAPCHAT_API_KEY environment variable)
# api_key = "sk-..."

# Chat-completions endpoint
base_url = "https://api.siliconflow.cn/v1"

# Model to use
model = "deepseek-ai/DeepSeek-V3"

# Sampling temperature and reply length
temperature = 0.7
max_tokens = 2000

# Custom system prompt file (optional)
# system_prompt_file = "~/.config/capchat/system_prompt.txt"

# Cap on requests in flight at once (optional, unbounded by default)
# max_concurrent_sessions = 4
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("capchat-{}-{}", uuid::Uuid::new_v4(), name))
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some(DEFAULT_BASE_URL));
        assert_eq!(config.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(config.max_tokens, Some(2000));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = toml::from_str("model = \"Qwen/Qwen2.5-7B-Instruct\"").unwrap();
        let settings = config.settings();
        assert_eq!(settings.model, "Qwen/Qwen2.5-7B-Instruct");
        assert_eq!(settings.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(settings.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_api_key_precedence() {
        let mut config = Config::default();
        assert_eq!(config.api_key_or(None), None);
        assert_eq!(config.api_key_or(Some("env".into())).as_deref(), Some("env"));
        assert_eq!(config.api_key_or(Some("  ".into())), None);

        config.api_key = Some("file".into());
        assert_eq!(config.api_key_or(Some("env".into())).as_deref(), Some("file"));

        config.api_key = Some(String::new());
        assert_eq!(config.api_key_or(Some("env".into())).as_deref(), Some("env"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = temp_path("config.toml");
        let config = Config {
            api_key: Some("sk-test".into()),
            max_concurrent_sessions: Some(2),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);
        fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
        assert_eq!(loaded.session_config().max_concurrent_sessions, Some(2));
    }

    #[test]
    fn test_missing_or_broken_file_gives_defaults() {
        assert_eq!(Config::load_from(&temp_path("absent.toml")), Config::default());

        let path = temp_path("broken.toml");
        fs::write(&path, "model = [unclosed").unwrap();
        let loaded = Config::load_from(&path);
        fs::remove_file(&path).ok();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_custom_system_prompt_file() {
        let path = temp_path("prompt.txt");
        fs::write(&path, "Be brief.").unwrap();
        let config = Config {
            system_prompt_file: Some(path.display().to_string()),
            ..Config::default()
        };

        let prompt = config.system_prompt();
        fs::remove_file(&path).ok();
        assert_eq!(prompt, "Be brief.");

        let missing = Config {
            system_prompt_file: Some(temp_path("gone.txt").display().to_string()),
            ..Config::default()
        };
        assert_eq!(missing.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }
}
