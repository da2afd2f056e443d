// SPDX-License-Identifier: GPL-3.0-only

use crate::constants;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Current on-disk config version
pub const CONFIG_VERSION: u32 = 1;

/// Durations are stored as integer milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Hard cutoff for a recorded clip
    #[serde(with = "millis")]
    pub max_duration: Duration,
    /// Recorder data slice
    #[serde(with = "millis")]
    pub time_slice: Duration,
    /// Ideal capture width
    pub ideal_width: u32,
    /// Ideal capture height
    pub ideal_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration: constants::capture::MAX_CLIP_DURATION,
            time_slice: constants::capture::TIME_SLICE,
            ideal_width: constants::capture::IDEAL_WIDTH,
            ideal_height: constants::capture::IDEAL_HEIGHT,
        }
    }
}

/// Display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    #[serde(with = "millis")]
    pub image_load_timeout: Duration,
    #[serde(with = "millis")]
    pub video_load_timeout: Duration,
    /// Manual retry cooldown
    #[serde(with = "millis")]
    pub retry_throttle: Duration,
    /// Slides requested on each side of the active album slide
    pub album_window: usize,
    /// Visible fraction at which reels autoplay
    pub autoplay_visibility: f32,
    /// Blur radius for locked media
    pub blur_radius: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            image_load_timeout: constants::display::IMAGE_LOAD_TIMEOUT,
            video_load_timeout: constants::display::VIDEO_LOAD_TIMEOUT,
            retry_throttle: constants::display::RETRY_THROTTLE,
            album_window: constants::display::ALBUM_WINDOW,
            autoplay_visibility: constants::display::AUTOPLAY_VISIBILITY,
            blur_radius: constants::display::BLUR_RADIUS,
        }
    }
}

/// Look-ahead settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Upcoming items warmed ahead of the scroll position
    pub radius: usize,
    /// Leading items warmed on mount
    pub initial_count: usize,
    #[serde(with = "millis")]
    pub scroll_debounce: Duration,
    /// Album size above which slides are bulk-warmed
    pub album_threshold: usize,
    #[serde(with = "millis")]
    pub album_settle_delay: Duration,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            radius: constants::preload::RADIUS,
            initial_count: constants::preload::INITIAL_COUNT,
            scroll_debounce: constants::preload::SCROLL_DEBOUNCE,
            album_threshold: constants::preload::ALBUM_THRESHOLD,
            album_settle_delay: constants::preload::ALBUM_SETTLE_DELAY,
        }
    }
}

/// Trimmer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Clip length produced by the trimmer
    #[serde(with = "millis")]
    pub target_duration: Duration,
    /// Explicit ffmpeg binary (otherwise looked up on PATH)
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            target_duration: constants::transcode::TARGET_DURATION,
            ffmpeg_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub preload: PreloadConfig,
    pub transcode: TranscodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            capture: CaptureConfig::default(),
            display: DisplayConfig::default(),
            preload: PreloadConfig::default(),
            transcode: TranscodeConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location (`<config dir>/reel-media/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reel-media").join("config.json"))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Config = serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!(path = %path.display(), version = config.version, "Loaded config");
        Ok(config)
    }

    /// Write to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Write to the default location
    pub fn save(&self) -> AppResult<()> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("No config directory on this platform".into()))?;
        self.save_to(&path)
    }

    /// Reject values the state machines cannot run with
    pub fn validate(&self) -> AppResult<()> {
        let durations = [
            ("capture.max_duration", self.capture.max_duration),
            ("capture.time_slice", self.capture.time_slice),
            ("display.image_load_timeout", self.display.image_load_timeout),
            ("display.video_load_timeout", self.display.video_load_timeout),
            ("transcode.target_duration", self.transcode.target_duration),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(AppError::Config(format!("{} must be greater than zero", name)));
            }
        }

        let visibility = self.display.autoplay_visibility;
        if !(visibility > 0.0 && visibility <= 1.0) {
            return Err(AppError::Config(format!(
                "display.autoplay_visibility must be in (0, 1], got {}",
                visibility
            )));
        }

        if self.display.album_window >= constants::display::MAX_ALBUM_ITEMS {
            return Err(AppError::Config(
                "display.album_window must be smaller than the maximum album size".into(),
            ));
        }

        Ok(())
    }
}
