use tiny_skia::{FillRule, PathBuilder, SpreadMode, Stroke, Transform};

use super::{Color, GradientStop, Paint, Point, Rect, Surface};

/// Software RGBA surface backed by a [`tiny_skia::Pixmap`].
///
/// A zero-sized surface has no backing pixmap and ignores every draw call.
#[derive(Debug, Clone)]
pub struct Pixmap {
    width: u32,
    height: u32,
    inner: Option<tiny_skia::Pixmap>,
}

impl Pixmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            inner: tiny_skia::Pixmap::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Changes the dimensions; contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    /// Straight-alpha RGBA of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let pixel = self.inner.as_ref()?.pixel(x, y)?.demultiply();
        Some([pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()])
    }

    /// True when no pixel has any coverage.
    pub fn is_blank(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(true, |pixmap| pixmap.pixels().iter().all(|pixel| pixel.alpha() == 0))
    }

    /// Row-major straight-alpha RGBA bytes, four per pixel.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let Some(pixmap) = &self.inner else {
            return Vec::new();
        };
        pixmap
            .pixels()
            .iter()
            .flat_map(|pixel| {
                let pixel = pixel.demultiply();
                [pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()]
            })
            .collect()
    }
}

impl Surface for Pixmap {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        if let Some(pixmap) = &mut self.inner {
            pixmap.fill(tiny_skia::Color::TRANSPARENT);
        }
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        let (Some(pixmap), Some(rect)) = (
            &mut self.inner,
            tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height),
        ) else {
            return;
        };
        pixmap.fill_rect(rect, &skia_paint(paint), Transform::identity(), None);
    }

    fn fill_polygon(&mut self, points: &[Point], paint: &Paint) {
        let (Some(pixmap), Some(path)) = (&mut self.inner, polyline_path(points, true)) else {
            return;
        };
        pixmap.fill_path(
            &path,
            &skia_paint(paint),
            FillRule::EvenOdd,
            Transform::identity(),
            None,
        );
    }

    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32) {
        if width <= 0.0 {
            return;
        }
        let (Some(pixmap), Some(path)) = (&mut self.inner, polyline_path(points, false)) else {
            return;
        };
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(
            &path,
            &skia_paint(&Paint::Solid(color)),
            &stroke,
            Transform::identity(),
            None,
        );
    }

    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint) {
        let (Some(pixmap), Some(path)) = (
            &mut self.inner,
            PathBuilder::from_circle(center.x, center.y, radius),
        ) else {
            return;
        };
        pixmap.fill_path(
            &path,
            &skia_paint(paint),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

fn polyline_path(points: &[Point], close: bool) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.x, first.y);
    for point in rest {
        builder.line_to(point.x, point.y);
    }
    if close {
        builder.close();
    }
    builder.finish()
}

fn skia_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

fn skia_point(point: Point) -> tiny_skia::Point {
    tiny_skia::Point::from_xy(point.x, point.y)
}

fn skia_stops(stops: &[GradientStop], map: impl Fn(f32) -> f32) -> Vec<tiny_skia::GradientStop> {
    stops
        .iter()
        .map(|stop| tiny_skia::GradientStop::new(map(stop.offset), skia_color(stop.color)))
        .collect()
}

fn skia_paint(paint: &Paint) -> tiny_skia::Paint<'static> {
    let shader = match paint {
        Paint::Solid(_) => None,
        Paint::Linear { start, end, stops } => tiny_skia::LinearGradient::new(
            skia_point(*start),
            skia_point(*end),
            skia_stops(stops, |offset| offset),
            SpreadMode::Pad,
            Transform::identity(),
        ),
        // The shader spans the centre to the outer radius; stops are moved
        // into the ring so everything inside `inner_radius` pads with the
        // first colour.
        Paint::Radial {
            center,
            inner_radius,
            outer_radius,
            stops,
        } if *outer_radius > 0.0 => {
            let inner = (inner_radius / outer_radius).clamp(0.0, 1.0);
            tiny_skia::RadialGradient::new(
                skia_point(*center),
                skia_point(*center),
                *outer_radius,
                skia_stops(stops, |offset| inner + offset * (1.0 - inner)),
                SpreadMode::Pad,
                Transform::identity(),
            )
        }
        Paint::Radial { .. } => None,
    };

    let mut out = tiny_skia::Paint::default();
    out.anti_alias = true;
    out.shader = shader.unwrap_or_else(|| tiny_skia::Shader::SolidColor(fallback_color(paint)));
    out
}

/// Colour used when the paint is solid or its gradient degenerates.
fn fallback_color(paint: &Paint) -> tiny_skia::Color {
    match paint {
        Paint::Solid(color) => skia_color(*color),
        Paint::Linear { stops, .. } | Paint::Radial { stops, .. } => stops
            .last()
            .map_or(tiny_skia::Color::TRANSPARENT, |stop| skia_color(stop.color)),
    }
}
