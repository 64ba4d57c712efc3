//! Configuration management for Alcove
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It combines settings for the seat, outputs, view
//! placement policy, and renderer selection.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration struct containing all Alcove settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlcoveConfig {
    /// Seat and keyboard settings
    #[serde(default)]
    pub seat: SeatConfig,

    /// Virtual output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// View placement and configure policy
    #[serde(default)]
    pub view: ViewConfig,

    /// Renderer selection
    #[serde(default)]
    pub renderer: RendererConfig,
}

/// Seat and keyboard configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatConfig {
    /// Seat name advertised to clients
    pub name: String,

    /// Keyboard layout name (e.g. "us")
    pub keyboard_layout: String,

    /// Keyboard repeat rate (events per second)
    pub repeat_rate: u32,

    /// Keyboard repeat delay (milliseconds)
    pub repeat_delay: u32,
}

/// Virtual output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Width of the primary virtual output (also the fallback custom
    /// mode when an output advertises no preferred mode)
    pub width: u32,

    /// Height of the primary virtual output
    pub height: u32,
}

/// View placement and configure policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewConfig {
    /// Size proposed in the initial configure
    pub default_width: u32,
    pub default_height: u32,

    /// Compositor-assigned position for new views
    pub default_x: i32,
    pub default_y: i32,

    /// Configure new views as fullscreen so clients skip drawing their
    /// own decorations. This mirrors the embedding use case where each
    /// view fills its host widget; disable to let clients keep their
    /// requested geometry.
    pub fullscreen_on_map: bool,
}

/// Renderer selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RendererConfig {
    /// Prefer the hardware (fd-sharing) path when the capability probe
    /// succeeds. Degrades silently to the CPU path otherwise.
    pub prefer_hardware: bool,
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            name: "seat0".to_string(),
            keyboard_layout: "us".to_string(),
            repeat_rate: 25,
            repeat_delay: 600,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            default_width: 640,
            default_height: 480,
            default_x: 50,
            default_y: 50,
            fullscreen_on_map: true,
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            prefer_hardware: false,
        }
    }
}

impl AlcoveConfig {
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

        let config: AlcoveConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.seat.name.is_empty() {
            anyhow::bail!("Invalid seat name: must not be empty");
        }

        if self.seat.repeat_rate == 0 || self.seat.repeat_rate > 1000 {
            anyhow::bail!("Invalid repeat_rate: must be between 1 and 1000");
        }

        if self.output.width == 0 || self.output.height == 0 {
            anyhow::bail!("Invalid output size: width and height must be non-zero");
        }

        if self.view.default_width == 0 || self.view.default_height == 0 {
            anyhow::bail!("Invalid view size: default_width and default_height must be non-zero");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
