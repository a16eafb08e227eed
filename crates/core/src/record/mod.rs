use serde::{Deserialize, Serialize};

use crate::{
    render::{Color, Paint, Point, Rect, Surface},
    Result,
};

/// A single drawing call issued against a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear,
    FillRect {
        rect: Rect,
        paint: Paint,
    },
    FillPolygon {
        points: Vec<Point>,
        paint: Paint,
    },
    StrokePolyline {
        points: Vec<Point>,
        color: Color,
        width: f32,
    },
    FillCircle {
        center: Point,
        radius: f32,
        paint: Paint,
    },
}

/// Surface that keeps the calls made against it instead of rasterising them.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Every command since creation or the last [`RecordingSurface::take`].
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Commands of the most recent frame, starting at its clear.
    pub fn frame(&self) -> &[DrawCommand] {
        let start = self
            .commands
            .iter()
            .rposition(|command| *command == DrawCommand::Clear)
            .unwrap_or(0);
        &self.commands[start..]
    }

    pub fn clear_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| **command == DrawCommand::Clear)
            .count()
    }

    /// Number of recorded calls that paint something.
    pub fn draw_count(&self) -> usize {
        self.commands.len() - self.clear_count()
    }

    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Serialises the most recent frame as a JSON array.
    pub fn frame_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self.frame())?)
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        self.commands.push(DrawCommand::FillRect {
            rect,
            paint: paint.clone(),
        });
    }

    fn fill_polygon(&mut self, points: &[Point], paint: &Paint) {
        self.commands.push(DrawCommand::FillPolygon {
            points: points.to_vec(),
            paint: paint.clone(),
        });
    }

    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32) {
        self.commands.push(DrawCommand::StrokePolyline {
            points: points.to_vec(),
            color,
            width,
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint) {
        self.commands.push(DrawCommand::FillCircle {
            center,
            radius,
            paint: paint.clone(),
        });
    }
}
