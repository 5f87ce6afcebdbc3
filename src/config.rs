use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

pub const APP_DIR_NAME: &str = "fixifox";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profiles: std::collections::BTreeMap<String, Profile>,
    /// Per-task model chain overrides, keyed by task name ("explain",
    /// "generate", ...). Missing entries fall back to the built-in chains.
    #[serde(default)]
    pub task_models: std::collections::BTreeMap<String, ModelChain>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelChain {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = config_dir().context("unable to resolve OS config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn ensure_config_parent_exists(path: &PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config dir: {}", parent.display()))?;
    }
    Ok(())
}

pub fn load_config_if_exists(path: &PathBuf) -> Result<Option<AppConfig>> {
    if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file: {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&text).context("parsing config TOML")?;
        Ok(Some(cfg))
    } else {
        Ok(None)
    }
}

pub fn write_config(path: &PathBuf, cfg: &AppConfig) -> Result<()> {
    ensure_config_parent_exists(path)?;
    let text = toml::to_string_pretty(cfg).context("serializing config to TOML")?;
    fs::write(path, text).with_context(|| format!("writing config file: {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub provider: String,
    pub model_override: Option<String>,
    /// Key stored in the active profile; env vars cover the rest.
    pub api_key: Option<String>,
}

pub fn resolve_effective_settings(
    profile_override: Option<&str>,
    cli_provider: Option<&str>,
    cli_model: Option<&str>,
) -> Result<EffectiveSettings> {
    let path = default_config_path()?;
    let cfg = load_config_if_exists(&path)?;

    let mut provider: Option<String> = None;
    let mut model: Option<String> = None;
    let mut api_key: Option<String> = None;

    if let Some(cfg) = cfg {
        let profile_name = profile_override
            .map(|s| s.to_string())
            .or(cfg.default_profile)
            .unwrap_or_else(|| "default".to_string());
        if let Some(p) = cfg.profiles.get(&profile_name) {
            if let Some(pv) = &p.provider {
                provider = Some(pv.clone());
            }
            if let Some(m) = &p.model {
                model = Some(m.clone());
            }
            api_key = p.api_key.clone();
        }
    }

    if let Some(cp) = cli_provider {
        provider = Some(cp.to_string());
    }
    if let Some(cm) = cli_model {
        model = Some(cm.to_string());
    }

    let provider = provider.unwrap_or_else(|| "groq".to_string());
    Ok(EffectiveSettings { provider, model_override: model, api_key })
}

/// Built-in chain per task; ids follow what the hosted provider serves. A
/// `--model` override replaces the primary but keeps the fallbacks.
pub fn default_chain(task: &str) -> ModelChain {
    let (primary, fallbacks): (&str, &[&str]) = match task {
        "explain" => ("llama-3.3-70b-versatile", &["llama-3.1-8b-instant"]),
        "generate" => ("llama-3.3-70b-versatile", &["gemma2-9b-it", "llama-3.1-8b-instant"]),
        "flow" => ("deepseek-r1-distill-llama-70b", &[]),
        "scan" => ("qwen-qwq-32b", &["llama-3.3-70b-versatile"]),
        "fix" => ("meta-llama/llama-4-scout-17b-16e-instruct", &["llama-3.3-70b-versatile"]),
        "convert" => ("qwen-qwq-32b", &["gemma2-9b-it"]),
        "assist" => ("meta-llama/llama-4-scout-17b-16e-instruct", &[]),
        _ => ("llama-3.3-70b-versatile", &[]),
    };
    ModelChain {
        primary: primary.to_string(),
        fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
    }
}

/// Chain for a task after applying config and CLI overrides.
pub fn resolve_chain(
    cfg: Option<&AppConfig>,
    task: &str,
    model_override: Option<&str>,
) -> ModelChain {
    let mut chain = cfg
        .and_then(|c| c.task_models.get(task).cloned())
        .unwrap_or_else(|| default_chain(task));
    if let Some(m) = model_override {
        chain.primary = m.to_string();
    }
    chain
}
