use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::builder::AssemblyOptions;
use crate::engine::FitOptions;
use crate::error::AssistantError;

pub const DEFAULT_CONFIG_FILE: &str = "microarray-assistant.json";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";
pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub group_pattern: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub coefficient: Option<String>,
    #[serde(default)]
    pub top: Option<usize>,
    #[serde(default)]
    pub gene_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub gateway: GatewaySettings,
    pub assembly: AssemblyOptions,
    pub fit: FitOptions,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AssistantError> {
        let config = Self::load(path)?;
        Self::resolve_config(config, |key| std::env::var(key).ok())
    }

    pub fn load(path: Option<&str>) -> Result<Config, AssistantError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AssistantError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| AssistantError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config<F>(config: Config, env: F) -> Result<ResolvedConfig, AssistantError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(AssistantError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let gateway = config.gateway;
        let key_env = gateway
            .api_key_env
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let mut headers = BTreeMap::new();
        if let Some(key) = env(&key_env).filter(|key| !key.trim().is_empty()) {
            headers.insert("Authorization".to_string(), format!("Bearer {}", key.trim()));
        }
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.extend(gateway.headers);

        let gateway = GatewaySettings {
            base_url: gateway
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: gateway.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: gateway.max_tokens.unwrap_or(1000),
            temperature: gateway.temperature.unwrap_or(0.1),
            headers,
        };

        let analysis = config.analysis;
        let mut assembly = AssemblyOptions::default();
        if let Some(pattern) = analysis.group_pattern {
            assembly.group_pattern = pattern;
        }
        if let Some(exclude) = analysis.exclude {
            assembly.exclude_value = exclude;
        }
        if let Some(gene_column) = analysis.gene_column {
            assembly.gene_column = gene_column;
        }

        let mut fit = FitOptions::default();
        if let Some(formula) = analysis.formula {
            fit.formula = formula;
        }
        if let Some(coefficient) = analysis.coefficient {
            fit.coefficient = coefficient;
        }
        if let Some(top) = analysis.top {
            fit.top_n = top;
        }

        Ok(ResolvedConfig {
            schema_version,
            gateway,
            assembly,
            fit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_resolves_to_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default(), |_| None).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.gateway.base_url, DEFAULT_BASE_URL);
        assert_eq!(resolved.gateway.model, DEFAULT_MODEL);
        assert_eq!(resolved.gateway.max_tokens, 1000);
        assert!(!resolved.gateway.headers.contains_key("Authorization"));
        assert_eq!(resolved.assembly, AssemblyOptions::default());
        assert_eq!(resolved.fit, FitOptions::default());
    }

    #[test]
    fn api_key_comes_from_named_env_var() {
        let config: Config =
            serde_json::from_str(r#"{"gateway": {"api_key_env": "MY_KEY"}}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config, |key| {
            (key == "MY_KEY").then(|| "secret".to_string())
        })
        .unwrap();
        assert_eq!(
            resolved.gateway.headers.get("Authorization").map(String::as_str),
            Some("Bearer secret")
        );
    }
}
