//! Engine configuration loaded from a TOML file.
//!
//! Every field has a default, so an absent file or a partial file is fine:
//!
//! ```toml
//! [window]
//! width = 1700
//! height = 900
//! title = "Frame Pacer"
//!
//! [frames]
//! frames_in_flight = 3
//! fence_timeout_ms = 1000
//! acquire_timeout_ms = 1000
//!
//! [vulkan]
//! validation = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Upper bound on the frame ring size. More slots only add latency.
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub window: WindowSettings,
    pub frames: FrameSettings,
    pub vulkan: VulkanSettings,
}

/// Initial window geometry and title.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1700,
            height: 900,
            title: "Frame Pacer".to_string(),
        }
    }
}

/// Frame ring sizing and the bounded waits of the frame loop.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FrameSettings {
    /// Number of frame slots (frames in flight).
    pub frames_in_flight: usize,
    /// Bound on the per-slot fence wait, in milliseconds.
    pub fence_timeout_ms: u64,
    /// Bound on swapchain image acquisition, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout_ms: 1000,
            acquire_timeout_ms: 1000,
        }
    }
}

impl FrameSettings {
    #[inline]
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    #[inline]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Vulkan instance options.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VulkanSettings {
    /// Request the Khronos validation layer.
    pub validation: bool,
}

impl Default for VulkanSettings {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this
    /// schema or if a value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration at `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let frames = &self.frames;

        if frames.frames_in_flight == 0 || frames.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, frames.frames_in_flight
            )));
        }
        if frames.fence_timeout_ms == 0 || frames.acquire_timeout_ms == 0 {
            return Err(Error::Config(
                "fence_timeout_ms and acquire_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        Ok(())
    }
}
