use std::f32::consts::TAU;

use super::{Color, GradientStop, Paint, Point, Rect, Surface, VisualConfig, VisualMode};
use crate::config::RenderConfig;

/// Maps frequency frames onto a surface in one of the three visual modes.
///
/// The only state carried between frames is the sphere rotation.
#[derive(Debug, Clone)]
pub struct RenderEngine {
    config: RenderConfig,
    rotation: f32,
}

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl RenderEngine {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            rotation: 0.0,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Accumulated sphere rotation in radians.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Clears the surface and paints `frame`. An empty frame leaves it blank.
    pub fn draw(&mut self, surface: &mut dyn Surface, frame: &[u8], visual: &VisualConfig) {
        surface.clear();
        if frame.is_empty() {
            return;
        }

        let (width, height) = surface.size();
        let (width, height) = (width as f32, height as f32);
        let colors = visual.palette.colors();

        match visual.mode {
            VisualMode::Bars => self.draw_bars(surface, frame, width, height, colors),
            VisualMode::Wave => self.draw_wave(surface, frame, width, height, colors),
            VisualMode::Sphere => self.draw_sphere(surface, frame, width, height, colors),
        }
    }

    fn draw_bars(
        &self,
        surface: &mut dyn Surface,
        frame: &[u8],
        width: f32,
        height: f32,
        colors: [Color; 3],
    ) {
        let bar_width = width / frame.len() as f32 * self.config.bar_width_scale;
        // Shared by every bar: spans the full height, bottom to top.
        let paint = Paint::Linear {
            start: Point::new(0.0, height),
            end: Point::new(0.0, 0.0),
            stops: vec![
                GradientStop::new(0.0, colors[0]),
                GradientStop::new(0.5, colors[1]),
                GradientStop::new(1.0, colors[2]),
            ],
        };

        let mut x = 0.0;
        for &value in frame {
            if x >= width {
                break;
            }
            let bar_height = value as f32 / 255.0 * height;
            if bar_height > 0.0 {
                surface.fill_rect(
                    Rect::new(x, height - bar_height, bar_width, bar_height),
                    &paint,
                );
            }
            x += bar_width + self.config.bar_gap;
        }
    }

    fn draw_wave(
        &self,
        surface: &mut dyn Surface,
        frame: &[u8],
        width: f32,
        height: f32,
        colors: [Color; 3],
    ) {
        let slice = width / frame.len() as f32;
        let mut points: Vec<Point> = frame
            .iter()
            .enumerate()
            .map(|(i, &value)| Point::new(i as f32 * slice, value as f32 / 128.0 * height / 2.0))
            .collect();
        points.push(Point::new(width, height / 2.0));

        surface.stroke_polyline(&points, colors[1], self.config.line_width);
    }

    fn draw_sphere(
        &mut self,
        surface: &mut dyn Surface,
        frame: &[u8],
        width: f32,
        height: f32,
        colors: [Color; 3],
    ) {
        let center = Point::new(width / 2.0, height / 2.0);
        let radius = width.min(height) / 4.0;
        self.rotation = (self.rotation + self.config.rotation_step) % TAU;

        let bars = self.config.sphere_bars;
        let step = TAU / bars as f32;
        let half = frame.len() as f32 / 2.0;
        let bar_width = self.config.sphere_bar_width;

        for i in 0..bars {
            let index = ((i as f32 / bars as f32) * half) as usize;
            let value = frame[index.min(frame.len() - 1)];
            let length = value as f32 / 255.0 * radius * 1.5;
            if length <= 0.0 {
                continue;
            }

            let angle = self.rotation + (i + 1) as f32 * step;
            let (sin, cos) = angle.sin_cos();
            // Rectangle in the rotated frame: across [0, bar_width], outwards
            // along +y from `radius`.
            let corners = [
                (0.0, radius),
                (bar_width, radius),
                (bar_width, radius + length),
                (0.0, radius + length),
            ]
            .map(|(x, y)| Point::new(center.x + x * cos - y * sin, center.y + x * sin + y * cos));

            surface.fill_polygon(&corners, &Paint::Solid(colors[i % 3]));
        }

        let glow = Paint::Radial {
            center,
            inner_radius: radius * 0.8,
            outer_radius: radius * 1.2,
            stops: vec![
                GradientStop::new(0.0, colors[0].with_alpha(0.0)),
                GradientStop::new(1.0, colors[1].with_alpha(self.config.glow_alpha)),
            ],
        };
        surface.fill_circle(center, radius * 1.5, &glow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DrawCommand, RecordingSurface};
    use crate::render::{Palette, Pixmap};

    fn visual(mode: VisualMode) -> VisualConfig {
        VisualConfig {
            mode,
            palette: Palette::Violet,
        }
    }

    #[test]
    fn empty_frame_only_clears() {
        let mut engine = RenderEngine::default();
        for mode in [VisualMode::Bars, VisualMode::Wave, VisualMode::Sphere] {
            let mut surface = RecordingSurface::new(200, 100);
            engine.draw(&mut surface, &[], &visual(mode));
            assert_eq!(surface.commands(), &[DrawCommand::Clear]);
        }
        assert_eq!(engine.rotation(), 0.0);
    }

    #[test]
    fn silent_bars_leave_the_surface_blank() {
        let mut engine = RenderEngine::default();
        let mut pixmap = Pixmap::new(128, 64);
        engine.draw(&mut pixmap, &[0; 64], &visual(VisualMode::Bars));
        assert!(pixmap.is_blank());

        let mut surface = RecordingSurface::new(128, 64);
        engine.draw(&mut surface, &[0; 64], &visual(VisualMode::Bars));
        assert_eq!(surface.draw_count(), 0);
    }

    #[test]
    fn bars_scale_with_magnitude() {
        let mut engine = RenderEngine::default();
        let mut surface = RecordingSurface::new(100, 50);
        engine.draw(&mut surface, &[255, 51, 0, 0], &visual(VisualMode::Bars));

        let rects: Vec<Rect> = surface
            .commands()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::FillRect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0], Rect::new(0.0, 0.0, 62.5, 50.0));
        assert_eq!(rects[1].x, 63.5);
        assert!((rects[1].height - 10.0).abs() < 1e-4);
    }

    #[test]
    fn full_bar_is_painted_with_the_palette_gradient() {
        let mut engine = RenderEngine::default();
        let mut pixmap = Pixmap::new(10, 100);
        engine.draw(&mut pixmap, &[255], &visual(VisualMode::Bars));

        // Bottom row sits next to the first stop, top row next to the last.
        let colors = Palette::Violet.colors();
        let near = |pixel: Option<[u8; 4]>, color: Color| {
            pixel.is_some_and(|[r, g, b, a]| {
                r.abs_diff(color.r) <= 3
                    && g.abs_diff(color.g) <= 3
                    && b.abs_diff(color.b) <= 3
                    && a == 255
            })
        };
        assert!(near(pixmap.pixel(0, 99), colors[0]));
        assert!(near(pixmap.pixel(0, 0), colors[2]));
        assert!(!near(pixmap.pixel(0, 50), colors[0]));
    }

    #[test]
    fn centred_wave_is_a_flat_line() {
        let mut engine = RenderEngine::default();
        let mut surface = RecordingSurface::new(200, 100);
        engine.draw(&mut surface, &[128; 50], &visual(VisualMode::Wave));

        let Some(DrawCommand::StrokePolyline {
            points,
            color,
            width,
        }) = surface.commands().last()
        else {
            panic!("wave mode strokes a polyline");
        };
        assert_eq!(points.len(), 51);
        assert!(points.iter().all(|point| point.y == 50.0));
        assert_eq!(points.last(), Some(&Point::new(200.0, 50.0)));
        assert_eq!(*color, Palette::Violet.colors()[1]);
        assert_eq!(*width, 3.0);

        let mut pixmap = Pixmap::new(200, 100);
        engine.draw(&mut pixmap, &[128; 50], &visual(VisualMode::Wave));
        assert!(pixmap.pixel(100, 50).is_some_and(|rgba| rgba[3] == 255));
        assert_eq!(pixmap.pixel(100, 40), Some([0, 0, 0, 0]));
        assert_eq!(pixmap.pixel(100, 60), Some([0, 0, 0, 0]));
    }

    #[test]
    fn sphere_rotates_every_frame_even_in_silence() {
        let mut engine = RenderEngine::default();
        let mut surface = RecordingSurface::new(400, 400);
        for _ in 0..3 {
            engine.draw(&mut surface, &[0; 256], &visual(VisualMode::Sphere));
        }
        assert!((engine.rotation() - 0.015).abs() < 1e-6);

        // Silence draws no bars but keeps the glow.
        assert!(matches!(
            surface.frame(),
            [DrawCommand::Clear, DrawCommand::FillCircle { radius, .. }] if *radius == 150.0
        ));
    }

    #[test]
    fn sphere_draws_one_bar_per_step_cycling_colours() {
        let mut engine = RenderEngine::default();
        let mut surface = RecordingSurface::new(400, 400);
        engine.draw(&mut surface, &[255; 256], &visual(VisualMode::Sphere));

        let colors = Palette::Violet.colors();
        let fills: Vec<&Paint> = surface
            .commands()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::FillPolygon { paint, .. } => Some(paint),
                _ => None,
            })
            .collect();
        assert_eq!(fills.len(), 120);
        assert_eq!(fills[0], &Paint::Solid(colors[0]));
        assert_eq!(fills[4], &Paint::Solid(colors[1]));
        assert_eq!(fills[119], &Paint::Solid(colors[2]));

        let Some(DrawCommand::FillPolygon { points, .. }) = surface.commands().get(1) else {
            panic!("first bar follows the clear");
        };
        let center = Point::new(200.0, 200.0);
        assert!((points[0].distance(center) - 100.0).abs() < 1e-3);
        assert!((points[3].distance(center) - 250.0).abs() < 1e-3);
    }
}
