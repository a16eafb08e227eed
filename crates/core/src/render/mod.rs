//! Drawing primitives, visual settings and the per-frame render modes.

mod engine;
mod raster;
mod scheduler;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::VisualizerError;

pub use engine::RenderEngine;
pub use raster::Pixmap;
pub use scheduler::{CancelToken, FrameSource, LoopStatus, RenderLoop};

/// Straight-alpha RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same colour with opacity `alpha` in `0.0..=1.0`.
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// Fill style of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Paint {
    Solid(Color),
    /// Gradient along the line from `start` to `end`.
    Linear {
        start: Point,
        end: Point,
        stops: Vec<GradientStop>,
    },
    /// Gradient between two concentric circles.
    Radial {
        center: Point,
        inner_radius: f32,
        outer_radius: f32,
        stops: Vec<GradientStop>,
    },
}

/// 2D raster target the render modes draw on.
///
/// Dimensions are owned by whoever sizes the surface; the engine only reads
/// them each frame.
pub trait Surface {
    fn size(&self) -> (u32, u32);

    /// Resets every pixel to transparent.
    fn clear(&mut self);

    fn fill_rect(&mut self, rect: Rect, paint: &Paint);

    fn fill_polygon(&mut self, points: &[Point], paint: &Paint);

    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32);

    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint);
}

/// Named three-colour gradients, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Violet,
    Fire,
    Neon,
    Ocean,
}

impl Palette {
    pub const ALL: [Palette; 4] = [Palette::Violet, Palette::Fire, Palette::Neon, Palette::Ocean];

    pub fn colors(self) -> [Color; 3] {
        match self {
            Palette::Violet => [
                Color::rgb(0x8b, 0x5c, 0xf6),
                Color::rgb(0x3b, 0x82, 0xf6),
                Color::rgb(0x63, 0x66, 0xf1),
            ],
            Palette::Fire => [
                Color::rgb(0xef, 0x44, 0x44),
                Color::rgb(0xf5, 0x9e, 0x0b),
                Color::rgb(0xfc, 0xd3, 0x4d),
            ],
            Palette::Neon => [
                Color::rgb(0x10, 0xb9, 0x81),
                Color::rgb(0x06, 0xb6, 0xd4),
                Color::rgb(0xd9, 0x46, 0xef),
            ],
            Palette::Ocean => [
                Color::rgb(0x0e, 0xa5, 0xe9),
                Color::rgb(0x22, 0xd3, 0xee),
                Color::rgb(0xf0, 0xf9, 0xff),
            ],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Palette::Violet => "violet",
            Palette::Fire => "fire",
            Palette::Neon => "neon",
            Palette::Ocean => "ocean",
        }
    }
}

impl FromStr for Palette {
    type Err = VisualizerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Palette::ALL
            .into_iter()
            .find(|palette| palette.name().eq_ignore_ascii_case(value))
            .ok_or_else(|| VisualizerError::msg(format!("unknown palette `{value}`")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    #[default]
    Bars,
    Wave,
    Sphere,
}

impl FromStr for VisualMode {
    type Err = VisualizerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "bars" => Ok(VisualMode::Bars),
            "wave" => Ok(VisualMode::Wave),
            "sphere" => Ok(VisualMode::Sphere),
            _ => Err(VisualizerError::msg(format!("unknown visual mode `{value}`"))),
        }
    }
}

/// Caller-owned selection read by the engine every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisualConfig {
    pub mode: VisualMode,
    pub palette: Palette,
}
