//! Rendering primitives shared by every backend.
//!
//! These types are backend-agnostic: the canvas backend serializes them into
//! its document, the static backend converts them into `plotters` styles.

use serde::{Deserialize, Serialize};

/// RGBA color.
///
/// All components are expected to be in the 0.0..=1.0 range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: f32,
    /// Green channel.
    pub g: f32,
    /// Blue channel.
    pub b: f32,
    /// Alpha channel.
    pub a: f32,
}

impl Color {
    /// Create a new color.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color from 8-bit channels.
    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }

    /// Parse a `#rrggbb` or `rrggbb` hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |start: usize| u8::from_str_radix(&digits[start..start + 2], 16).ok();
        Some(Self::rgb8(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Format as `#rrggbb`, ignoring alpha.
    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.rgb8_channels();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// Color channels as 8-bit values.
    pub fn rgb8_channels(&self) -> [u8; 3] {
        let quantize = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        [quantize(self.r), quantize(self.g), quantize(self.b)]
    }

    /// Same color with a different alpha.
    pub const fn with_alpha(self, a: f32) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }

    /// Opaque black.
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
}

/// Opacity used for error bands.
pub const BAND_ALPHA: f32 = 0.3;
/// Opacity used for histogram bars.
pub const BAR_ALPHA: f32 = 0.7;
/// Opacity of the background behind parameter text boxes.
pub const TEXT_BOX_ALPHA: f32 = 0.7;

/// Line stroke styling.
///
/// The width is expressed in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineStyle {
    /// Stroke color.
    pub color: Color,
    /// Stroke width in pixels.
    pub width: f32,
}

impl LineStyle {
    /// Stroke of the given color and the default width.
    pub fn colored(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 2.0,
        }
    }
}

/// Marker styling for scatter points.
///
/// Marker sizes are expressed in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerStyle {
    /// Marker color.
    pub color: Color,
    /// Marker diameter in pixels.
    pub size: f32,
}

impl MarkerStyle {
    /// Marker of the given color and the default size.
    pub fn colored(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            size: 7.0,
        }
    }
}

/// Text styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    /// Text color.
    pub color: Color,
    /// Font size in pixels.
    pub size: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            size: 14.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let color = Color::from_hex("#e41a1c").expect("valid hex");
        assert_eq!(color.to_hex(), "#e41a1c");
        assert_eq!(color.rgb8_channels(), [0xe4, 0x1a, 0x1c]);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(Color::from_hex("#12345").is_none());
        assert!(Color::from_hex("zzzzzz").is_none());
    }
}
