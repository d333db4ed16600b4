//! Configuration management for lintpatch
//!
//! Settings live in a TOML file: `--config <path>`, else `./lintpatch.toml`,
//! else `~/.config/lintpatch/config.toml`. Every field has a default, so no
//! file at all is a valid setup.

use crate::gate::{SafetyGate, SyntaxPolicy, ValidatorCommand};
use crate::llm::client::DEFAULT_ENDPOINT;
use crate::llm::FallbackChain;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCAL_CONFIG_FILE: &str = "lintpatch.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub generation: GenerationSettings,
    pub gate: GateSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSettings {
    /// Fallback chain, fastest/cheapest first
    pub models: Vec<String>,
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub attempt_timeout_secs: u64,
    pub rate_limit_pause_secs: u64,
    /// Optional cap on generated tokens; the API default applies when unset
    pub max_output_tokens: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            models: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-flash".to_string(),
            ],
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            attempt_timeout_secs: 120,
            rate_limit_pause_secs: 5,
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateSettings {
    /// Syntax checker argv; the candidate path is appended
    pub validator: Vec<String>,
    pub transient_suffix: String,
    pub validator_timeout_secs: u64,
    pub syntax_policy: SyntaxPolicy,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            validator: vec!["php".to_string(), "-l".to_string()],
            transient_suffix: ".check.php".to_string(),
            validator_timeout_secs: 30,
            syntax_policy: SyntaxPolicy::Strict,
        }
    }
}

impl Config {
    /// Get the user-level config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lintpatch").join("config.toml"))
    }

    /// Resolve and load the config.
    ///
    /// An explicit path must exist. Discovered files are optional, but any
    /// file that exists must parse.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::load_from(path)?;
            return Ok((config, Some(path.to_path_buf())));
        }

        let candidates = std::iter::once(cwd.join(LOCAL_CONFIG_FILE)).chain(Self::user_config_path());
        for path in candidates {
            if path.is_file() {
                let config = Self::load_from(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let generation = &self.generation;
        if generation.models.iter().all(|m| m.trim().is_empty()) {
            bail!("generation.models must name at least one model");
        }
        if generation.attempt_timeout_secs == 0 {
            bail!("generation.attempt_timeout_secs must be greater than zero");
        }
        if generation.api_key_env.trim().is_empty() {
            bail!("generation.api_key_env must not be empty");
        }

        let gate = &self.gate;
        if ValidatorCommand::from_argv(&gate.validator).is_none() {
            bail!("gate.validator must name a program");
        }
        if gate.transient_suffix.is_empty() {
            bail!("gate.transient_suffix must not be empty");
        }
        if gate.validator_timeout_secs == 0 {
            bail!("gate.validator_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        let var = &self.generation.api_key_env;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => bail!("{} environment variable not set", var),
        }
    }

    pub fn fallback_chain(&self) -> FallbackChain {
        FallbackChain {
            models: self
                .generation
                .models
                .iter()
                .map(|m| m.trim())
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect(),
            attempt_timeout: Duration::from_secs(self.generation.attempt_timeout_secs),
            rate_limit_pause: Duration::from_secs(self.generation.rate_limit_pause_secs),
        }
    }

    pub fn safety_gate(&self) -> Result<SafetyGate> {
        let validator = ValidatorCommand::from_argv(&self.gate.validator)
            .context("gate.validator must name a program")?;
        Ok(SafetyGate {
            validator,
            transient_suffix: self.gate.transient_suffix.clone(),
            validator_timeout: Duration::from_secs(self.gate.validator_timeout_secs),
            syntax_policy: self.gate.syntax_policy,
        })
    }
}
