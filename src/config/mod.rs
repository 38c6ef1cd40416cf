//! Configuration management for tessera
//!
//! Settings come from a TOML file. Every section is optional and falls back to
//! its defaults, so an empty file is a valid configuration.
//!
//! ```toml
//! [keyboard]
//! layout = "de"
//! options = "ctrl:nocaps"
//!
//! [output]
//! width = 1280
//! height = 720
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration struct containing all tessera settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TesseraConfig {
    /// Keymap selection (RMLVO names or a pre-compiled keymap file)
    #[serde(default)]
    pub keyboard: KeyboardConfig,

    /// The single fixed-size output
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub seat: SeatConfig,

    /// Supervision of the nested X server
    #[serde(default)]
    pub xwayland: XWaylandConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Keymap configuration, in xkb RMLVO terms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeyboardConfig {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    /// Comma separated xkb options, e.g. "ctrl:nocaps,compose:ralt"
    pub options: String,
    /// Use this pre-compiled keymap instead of compiling the names above
    pub keymap_file: Option<PathBuf>,
}

/// Geometry advertised for the single output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub width: i32,
    pub height: i32,
    /// Refresh rate in mHz
    pub refresh: i32,
    pub physical_width_mm: i32,
    pub physical_height_mm: i32,
    pub make: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeatConfig {
    pub name: String,
    /// Move keyboard focus to a surface when it is clicked
    pub click_to_focus: bool,
    /// Hotspot used for a cursor sprite before the client sets one
    pub default_hotspot: (i32, i32),
}

/// X server supervision policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct XWaylandConfig {
    pub enabled: bool,
    /// Respawn the server when it exits cleanly
    pub respawn: bool,
    /// Give up after this many respawns (0 = unlimited)
    pub max_restarts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            rules: "evdev".to_string(),
            model: "pc105".to_string(),
            layout: "us".to_string(),
            variant: String::new(),
            options: String::new(),
            keymap_file: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            refresh: 60_000,
            physical_width_mm: 0,
            physical_height_mm: 0,
            make: "unknown".to_string(),
            model: "unknown".to_string(),
        }
    }
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            name: "seat0".to_string(),
            click_to_focus: true,
            default_hotspot: (16, 16),
        }
    }
}

impl Default for XWaylandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            respawn: true,
            max_restarts: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TesseraConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: TesseraConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.output.width <= 0 || self.output.height <= 0 {
            anyhow::bail!(
                "Invalid output size {}x{}: both dimensions must be positive",
                self.output.width,
                self.output.height
            );
        }

        if self.output.refresh <= 0 {
            anyhow::bail!("Invalid output refresh: {} mHz", self.output.refresh);
        }

        if self.keyboard.keymap_file.is_none() && self.keyboard.layout.trim().is_empty() {
            anyhow::bail!("keyboard.layout must be set when no keymap_file is given");
        }

        if self.seat.name.trim().is_empty() {
            anyhow::bail!("seat.name must not be empty");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace", "off"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
