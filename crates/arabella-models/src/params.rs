//! Generation parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output resolution.
///
/// Variants are declared in ascending order so the derived `Ord`
/// gives `720p < 1080p < 4k`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd720,
    #[default]
    #[serde(rename = "1080p")]
    FullHd1080,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hd720 => "720p",
            Resolution::FullHd1080 => "1080p",
            Resolution::Uhd4k => "4k",
        }
    }

    /// Whether a provider capped at `self` can render `required`.
    pub fn covers(&self, required: Resolution) -> bool {
        *self >= required
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "720p" => Ok(Resolution::Hd720),
            "1080p" => Ok(Resolution::FullHd1080),
            "4k" => Ok(Resolution::Uhd4k),
            _ => Err(ResolutionParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown resolution: {0}")]
pub struct ResolutionParseError(String);

/// Aspect ratio, serialized as `"W:H"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Widescreen (16:9)
    pub const LANDSCAPE: AspectRatio = AspectRatio {
        width: 16,
        height: 9,
    };

    /// Vertical (9:16) for shorts and reels
    pub const PORTRAIT: AspectRatio = AspectRatio {
        width: 9,
        height: 16,
    };

    /// Square (1:1)
    pub const SQUARE: AspectRatio = AspectRatio {
        width: 1,
        height: 1,
    };

    /// Classic television (4:3)
    pub const CLASSIC: AspectRatio = AspectRatio {
        width: 4,
        height: 3,
    };

    /// Create a new aspect ratio.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the aspect ratio as a decimal.
    pub fn as_f64(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            return Err(AspectRatioParseError::InvalidFormat(s.to_string()));
        }

        let width = parts[0]
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(parts[0].to_string()))?;
        let height = parts[1]
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(parts[1].to_string()))?;

        if width == 0 || height == 0 {
            return Err(AspectRatioParseError::ZeroValue);
        }

        Ok(AspectRatio { width, height })
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = AspectRatioParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

impl JsonSchema for AspectRatio {
    fn schema_name() -> String {
        "AspectRatio".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::LANDSCAPE
    }
}

#[derive(Debug, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Invalid number in aspect ratio: {0}")]
    InvalidNumber(String),
    #[error("Aspect ratio cannot have zero values")]
    ZeroValue,
}

/// Configurable video generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoParams {
    /// Duration in seconds
    pub duration: u32,
    pub resolution: Resolution,
    pub aspect_ratio: AspectRatio,
    /// Frames per second
    pub fps: u32,
    /// Visual style modifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            duration: 15,
            resolution: Resolution::FullHd1080,
            aspect_ratio: AspectRatio::LANDSCAPE,
            fps: 30,
            style: None,
            negative_prompt: None,
        }
    }
}

/// Caller-supplied overrides for a template's default parameters.
///
/// Unset fields (and zero numeric fields) keep the template default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoParamsOverride {
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
}

impl VideoParams {
    /// Apply request overrides on top of these parameters.
    pub fn merged_with(&self, overrides: &VideoParamsOverride) -> VideoParams {
        let mut params = self.clone();
        if let Some(duration) = overrides.duration.filter(|d| *d > 0) {
            params.duration = duration;
        }
        if let Some(resolution) = overrides.resolution {
            params.resolution = resolution;
        }
        if let Some(aspect_ratio) = overrides.aspect_ratio {
            params.aspect_ratio = aspect_ratio;
        }
        if let Some(fps) = overrides.fps.filter(|f| *f > 0) {
            params.fps = fps;
        }
        if let Some(style) = overrides.style.as_ref().filter(|s| !s.is_empty()) {
            params.style = Some(style.clone());
        }
        if let Some(negative) = overrides.negative_prompt.as_ref().filter(|s| !s.is_empty()) {
            params.negative_prompt = Some(negative.clone());
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_ordering() {
        assert!(Resolution::Hd720 < Resolution::FullHd1080);
        assert!(Resolution::FullHd1080 < Resolution::Uhd4k);
        assert!(Resolution::Uhd4k.covers(Resolution::FullHd1080));
        assert!(!Resolution::FullHd1080.covers(Resolution::Uhd4k));
    }

    #[test]
    fn test_resolution_wire_format() {
        assert_eq!(serde_json::to_string(&Resolution::Uhd4k).unwrap(), "\"4k\"");
        assert_eq!("1080P".parse::<Resolution>().unwrap(), Resolution::FullHd1080);
        assert!("8k".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::PORTRAIT);
        assert!("16x9".parse::<AspectRatio>().is_err());
        assert!("0:1".parse::<AspectRatio>().is_err());

        let json = serde_json::to_string(&AspectRatio::LANDSCAPE).unwrap();
        assert_eq!(json, "\"16:9\"");
        let back: AspectRatio = serde_json::from_str("\"1:1\"").unwrap();
        assert_eq!(back, AspectRatio::SQUARE);
    }

    #[test]
    fn test_params_merge_keeps_defaults_for_unset_fields() {
        let defaults = VideoParams::default();
        let overrides = VideoParamsOverride {
            duration: Some(0),
            resolution: Some(Resolution::Hd720),
            style: Some(String::new()),
            ..Default::default()
        };

        let merged = defaults.merged_with(&overrides);
        assert_eq!(merged.duration, 15);
        assert_eq!(merged.resolution, Resolution::Hd720);
        assert_eq!(merged.fps, 30);
        assert_eq!(merged.style, None);
    }
}
