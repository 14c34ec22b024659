use crate::foundation::core::{IntRect, PixelFormat, Size};
use crate::foundation::error::{HandoffError, HandoffResult};
use crate::raster::blend::{over, over_in_place, unpremultiply};
use crate::raster::canvas::PaintOp;

/// Replays recorded paint ops into RGBA8 premultiplied pixels.
///
/// Runs of fills are rasterized by `vello_cpu` into a scratch pixmap and composited over the
/// target. The render context and scratch pixmap are reused while the surface size is stable.
#[derive(Default)]
pub struct Rasterizer {
    ctx: Option<vello_cpu::RenderContext>,
    scratch: Option<vello_cpu::Pixmap>,
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("has_ctx", &self.ctx.is_some())
            .finish()
    }
}

impl Rasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(level = "trace", skip(self, target, ops), fields(ops = ops.len()))]
    pub fn replay(&mut self, target: &mut [u8], size: Size, ops: &[PaintOp]) -> HandoffResult<()> {
        let size = size.validate()?;
        if target.len() != size.byte_len(PixelFormat::Rgba8Premul) {
            return Err(HandoffError::validation(format!(
                "target of {} bytes does not match a {}x{} surface",
                target.len(),
                size.width,
                size.height
            )));
        }

        let mut i = 0;
        while i < ops.len() {
            match &ops[i] {
                PaintOp::Clear(c) => {
                    let px = c.to_array();
                    for d in target.chunks_exact_mut(4) {
                        d.copy_from_slice(&px);
                    }
                    i += 1;
                }
                PaintOp::DrawImage { image, x, y } => {
                    let pixels = image.read_pixels()?;
                    blit_over(target, size, &pixels, image.size(), *x, *y);
                    i += 1;
                }
                PaintOp::FillRect { .. } => {
                    let end = ops[i..]
                        .iter()
                        .position(|op| !matches!(op, PaintOp::FillRect { .. }))
                        .map_or(ops.len(), |n| i + n);
                    self.fill_run(target, size, &ops[i..end])?;
                    i = end;
                }
            }
        }
        Ok(())
    }

    fn fill_run(&mut self, target: &mut [u8], size: Size, run: &[PaintOp]) -> HandoffResult<()> {
        // `Size::validate` caps both edges at u16::MAX.
        let w = size.width as u16;
        let h = size.height as u16;

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx,
            _ => vello_cpu::RenderContext::new(w, h),
        };
        ctx.reset();
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);

        for op in run {
            let PaintOp::FillRect { rect, color } = op else {
                continue;
            };
            if color.a == 0 {
                continue;
            }
            let [r, g, b, a] = unpremultiply(*color);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                rect.x0, rect.y0, rect.x1, rect.y1,
            ));
        }
        ctx.flush();

        let mut scratch = match self.scratch.take() {
            Some(p) if p.width() == w && p.height() == h => p,
            _ => vello_cpu::Pixmap::new(w, h),
        };
        scratch.data_as_u8_slice_mut().fill(0);
        ctx.render_to_pixmap(&mut scratch);
        let out = over_in_place(target, scratch.data_as_u8_slice());

        self.ctx = Some(ctx);
        self.scratch = Some(scratch);
        out
    }
}

fn blit_over(dst: &mut [u8], dst_size: Size, src: &[u8], src_size: Size, x: i32, y: i32) {
    let placed = IntRect::new(x, y, src_size.width, src_size.height);
    let clip = placed.intersect(IntRect::from_size(dst_size));
    if clip.is_empty() {
        return;
    }
    let dst_stride = dst_size.width as usize * 4;
    let src_stride = src_size.width as usize * 4;
    for row in 0..clip.height as usize {
        let dy = clip.y as usize + row;
        let sy = (i64::from(clip.y) - i64::from(y)) as usize + row;
        for col in 0..clip.width as usize {
            let dx = clip.x as usize + col;
            let sx = (i64::from(clip.x) - i64::from(x)) as usize + col;
            let di = dy * dst_stride + dx * 4;
            let si = sy * src_stride + sx * 4;
            let Some(s) = src.get(si..si + 4) else {
                return;
            };
            let d = &mut dst[di..di + 4];
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
            d.copy_from_slice(&out);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/rasterize.rs"]
mod tests;
