//! Layered configuration: built-in defaults, then `~/.stylemask/config.json`,
//! then `STYLEMASK_*` environment variables. CLI flags override all of these.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "nous-hermes2:10.7b-solar-q6_K";
pub const DEFAULT_PERSONA: &str = "Ernest Hemingway";

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key() -> String {
    stylemask_llm::openai::NO_KEY_REQUIRED.to_string()
}

fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_persona")]
    pub persona: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            api_key: default_api_key(),
            persona: default_persona(),
        }
    }
}

fn stylemask_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".stylemask")
}

fn config_json_path() -> PathBuf {
    stylemask_dir().join("config.json")
}

impl Config {
    pub fn load() -> Self {
        let mut config = Config::default();

        let json_path = config_json_path();
        if json_path.exists() {
            if let Ok(content) = std::fs::read_to_string(&json_path) {
                if let Ok(file_config) = serde_json::from_str::<Config>(&content) {
                    config = file_config;
                } else {
                    log::warn!("ignoring malformed config at {}", json_path.display());
                }
            }
        }

        if let Ok(url) = std::env::var("STYLEMASK_URL") {
            config.url = url;
        }
        if let Ok(model) = std::env::var("STYLEMASK_MODEL") {
            config.model = model;
        }
        if let Ok(api_key) = std::env::var("STYLEMASK_API_KEY") {
            config.api_key = api_key;
        }
        if let Ok(persona) = std::env::var("STYLEMASK_PERSONA") {
            config.persona = persona;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_server() {
        let config = Config::default();
        assert_eq!(config.url, "http://localhost:11434/v1");
        assert_eq!(config.model, "nous-hermes2:10.7b-solar-q6_K");
        assert_eq!(config.persona, "Ernest Hemingway");
    }

    #[test]
    fn partial_config_file_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"model": "my-model"}"#).unwrap();
        assert_eq!(config.model, "my-model");
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.persona, DEFAULT_PERSONA);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config {
            url: "http://localhost:8080/v1".to_string(),
            model: "local".to_string(),
            api_key: "key".to_string(),
            persona: "Mark Twain".to_string(),
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
