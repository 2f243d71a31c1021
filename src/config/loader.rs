// Configuration loader
// Loads settings from ~/.appforge/config.toml (or an explicit path) and
// applies environment overrides on top.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::provider::ProviderEntry;
use super::settings::{Config, DeployMode};

/// Default config location: `~/.appforge/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".appforge").join("config.toml"))
}

/// Load configuration from an explicit path, `APPFORGE_CONFIG`, the default
/// location, or from environment variables alone when no file exists.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("APPFORGE_CONFIG").map(PathBuf::from))
        .or_else(default_config_path);

    let mut config = match path {
        Some(ref p) if p.exists() => load_from_file(p)?,
        Some(ref p) if explicit.is_some() => {
            bail!("Configuration file not found: {}", p.display())
        }
        _ => config_from_env()?,
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn load_from_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
}

/// No config file: pick the provider from whichever API key is exported.
fn config_from_env() -> Result<Config> {
    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        if !api_key.is_empty() {
            return Ok(Config::with_provider(ProviderEntry::Openai {
                api_key,
                model: None,
                review_model: None,
                base_url: None,
            }));
        }
    }

    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        if !api_key.is_empty() {
            return Ok(Config::with_provider(ProviderEntry::Claude {
                api_key,
                model: None,
                review_model: None,
                base_url: None,
            }));
        }
    }

    bail!(
        "No configuration found. Create ~/.appforge/config.toml:\n\n\
        [provider]\n\
        type = \"openai\"\n\
        api_key = \"sk-...\"\n\n\
        Alternatively, set an environment variable:\n\
        export OPENAI_API_KEY=\"sk-...\"   (or ANTHROPIC_API_KEY)"
    );
}

/// Apply environment overrides. `lookup` is injected so tests don't touch
/// the process environment.
pub(crate) fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(config.provider.api_key_env()).filter(|k| !k.is_empty()) {
        config.provider.set_api_key(key);
    }

    if let Some(bind) = lookup("APPFORGE_BIND") {
        config.server.bind_address = bind;
    } else if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
        let host = config
            .server
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        config.server.bind_address = format!("{}:{}", host, port);
    }

    if let Some(root) = lookup("APPFORGE_WORKSPACE") {
        config.workspace.root = PathBuf::from(root);
    }

    if lookup("USE_LOCAL_PREVIEW").as_deref() == Some("true") {
        config.deploy.mode = DeployMode::Local;
    }
}
