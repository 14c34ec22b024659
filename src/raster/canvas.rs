use crate::foundation::core::{Rect, Rgba8Premul, Size};
use crate::raster::image::StaticImage;
use kurbo::Vec2;

/// One recorded drawing command, already in surface coordinates.
#[derive(Clone, Debug)]
pub enum PaintOp {
    /// Replace every pixel.
    Clear(Rgba8Premul),
    FillRect { rect: Rect, color: Rgba8Premul },
    /// Source-over an image with its top-left corner at `(x, y)`.
    DrawImage { image: StaticImage, x: i32, y: i32 },
}

/// Paint-command recorder bound to a provider's surface.
///
/// The current translation persists across flushes, like a canvas matrix.
#[derive(Debug)]
pub struct PaintCanvas {
    size: Size,
    ops: Vec<PaintOp>,
    translation: Vec2,
}

impl PaintCanvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ops: Vec::new(),
            translation: Vec2::ZERO,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn clear(&mut self, color: Rgba8Premul) {
        // Everything recorded before a clear is invisible.
        self.ops.clear();
        self.ops.push(PaintOp::Clear(color));
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgba8Premul) {
        let rect = rect + self.translation;
        if rect.area() == 0.0 {
            return;
        }
        self.ops.push(PaintOp::FillRect { rect, color });
    }

    pub fn draw_image(&mut self, image: &StaticImage, x: i32, y: i32) {
        self.ops.push(PaintOp::DrawImage {
            image: image.clone(),
            x: x.saturating_add(self.translation.x.round() as i32),
            y: y.saturating_add(self.translation.y.round() as i32),
        });
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.translation += Vec2::new(dx, dy);
    }

    pub fn reset_transform(&mut self) {
        self.translation = Vec2::ZERO;
    }

    pub fn has_recorded_ops(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn recorded_ops(&self) -> &[PaintOp] {
        &self.ops
    }

    pub(crate) fn take_ops(&mut self) -> Vec<PaintOp> {
        std::mem::take(&mut self.ops)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/canvas.rs"]
mod tests;
