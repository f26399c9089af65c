//! Initialize the configuration directory: create ~/.deputy, a default config and the workspace policy.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;
use crate::prompt::{DEFAULT_POLICY, POLICY_FILE};

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Creates the workspace directory and seeds `POLICY.md` from the bundled policy if missing.
///
/// Existing files are never overwritten. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let config = if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
        config::Config::default()
    } else {
        config::load_config(Some(config_path.to_path_buf()))?.0
    };

    let workspace = config::resolve_workspace_dir(&config, config_path);
    if !workspace.exists() {
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("creating workspace directory {}", workspace.display()))?;
        log::info!("created workspace directory at {}", workspace.display());
    }
    let policy = workspace.join(POLICY_FILE);
    if !policy.exists() {
        std::fs::write(&policy, DEFAULT_POLICY)
            .with_context(|| format!("writing default policy to {}", policy.display()))?;
        log::info!("wrote default policy to {}", policy.display());
    } else {
        log::debug!("policy already exists at {}, skipping", policy.display());
    }

    Ok(config_dir.to_path_buf())
}
