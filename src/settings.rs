use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::retarget::RetargetOptions;

/// Persisted driver settings. Command-line flags override these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetargetSettings {
    pub options: RetargetOptions,
    /// Saved bone map applied when no `--map` is given.
    pub map_name: Option<String>,
    /// Directory holding saved bone maps.
    pub map_dir: Option<String>,
    pub log_level: LogLevel,
}

impl Default for RetargetSettings {
    /// Root motion is opt-in for the driver; an explicit `options` object
    /// carries the library defaults for the fields it omits.
    fn default() -> Self {
        Self {
            options: RetargetOptions {
                preserve_root_motion: false,
                ..RetargetOptions::default()
            },
            map_name: None,
            map_dir: None,
            log_level: LogLevel::default(),
        }
    }
}

/// Save retarget settings to a JSON file.
pub fn save_settings(path: &Path, settings: &RetargetSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)
        .context("failed to serialize retarget settings as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save retarget settings: {}", path.display()))?;
    Ok(())
}

/// Load retarget settings from a JSON file.
pub fn load_settings(path: &Path) -> Result<RetargetSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load retarget settings: {}", path.display()))?;
    let settings: RetargetSettings =
        serde_json::from_str(&content).context("failed to parse retarget settings JSON")?;
    Ok(settings)
}
