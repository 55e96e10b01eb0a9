//! Engine configuration
//!
//! Sources, lowest precedence first: built-in defaults, a JSON file, then
//! environment variables. Every field is optional in the file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tunables for annotation authoring and drawing
///
/// Widths, radii and font sizes are in canvas pixels at scale 1 and are
/// multiplied by the current scale when drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Author stamped on committed annotations
    pub author: String,
    /// Fill alpha for Highlight
    pub highlight_alpha: f32,
    /// Fill alpha for the Text background
    pub text_alpha: f32,
    /// Fill alpha for Polygon
    pub polygon_alpha: f32,
    /// Opacity multiplier applied to the live preview layer
    pub preview_opacity: f32,
    /// Stroke width for Underline and StrikeOut
    pub line_width: f32,
    /// Stroke width for Square and Circle
    pub shape_width: f32,
    /// Stroke width for Ink
    pub ink_width: f32,
    pub font_size: f32,
    /// Line height as a multiple of `font_size`
    pub line_height: f32,
    /// Minimum distance between recorded ink points
    pub ink_min_spacing: f32,
    pub text_marker_radius: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            author: "User".to_string(),
            highlight_alpha: 0.3,
            text_alpha: 0.5,
            polygon_alpha: 0.5,
            preview_opacity: 0.6,
            line_width: 1.0,
            shape_width: 2.0,
            ink_width: 2.0,
            font_size: 16.0,
            line_height: 1.2,
            ink_min_spacing: 2.0,
            text_marker_radius: 2.0,
        }
    }
}

impl EngineConfig {
    /// Sets the default author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Sets the FreeText font size.
    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_size = size;
        self
    }

    /// Sets the preview layer opacity.
    pub fn with_preview_opacity(mut self, opacity: f32) -> Self {
        self.preview_opacity = opacity;
        self
    }

    /// Loads configuration from a JSON file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// out-of-range value.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides on top of `self`.
    ///
    /// Environment variables:
    /// - `ANNOTATOR_AUTHOR`: default author
    /// - `ANNOTATOR_FONT_SIZE`: FreeText font size
    /// - `ANNOTATOR_PREVIEW_OPACITY`: preview opacity in `0.0..=1.0`
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    fn with_lookup<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("ANNOTATOR_AUTHOR") {
            self.author = val;
        }

        if let Some(val) = lookup("ANNOTATOR_FONT_SIZE") {
            self.font_size = val
                .parse::<f32>()
                .map_err(|_| ConfigError::InvalidValue("ANNOTATOR_FONT_SIZE".to_string()))?;
        }

        if let Some(val) = lookup("ANNOTATOR_PREVIEW_OPACITY") {
            self.preview_opacity = val.parse::<f32>().map_err(|_| {
                ConfigError::InvalidValue("ANNOTATOR_PREVIEW_OPACITY".to_string())
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("highlight_alpha", self.highlight_alpha),
            ("text_alpha", self.text_alpha),
            ("polygon_alpha", self.polygon_alpha),
            ("preview_opacity", self.preview_opacity),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(name.to_string()));
            }
        }

        let positive = [
            ("line_width", self.line_width),
            ("shape_width", self.shape_width),
            ("ink_width", self.ink_width),
            ("font_size", self.font_size),
            ("line_height", self.line_height),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue(name.to_string()));
            }
        }

        let non_negative = [
            ("ink_min_spacing", self.ink_min_spacing),
            ("text_marker_radius", self.text_marker_radius),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue(name.to_string()));
            }
        }
        Ok(())
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
