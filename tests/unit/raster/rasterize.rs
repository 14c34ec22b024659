use super::*;
use crate::foundation::core::{ContentId, Rect, Rgba8Premul};
use crate::raster::image::StaticImage;

fn px(buf: &[u8], size: Size, x: u32, y: u32) -> [u8; 4] {
    let i = (y as usize * size.width as usize + x as usize) * 4;
    [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
}

#[test]
fn clear_then_fill_composites_over() {
    let size = Size::new(8, 8);
    let mut target = vec![0u8; size.byte_len(PixelFormat::Rgba8Premul)];
    let ops = vec![
        PaintOp::Clear(Rgba8Premul::opaque(0, 0, 255)),
        PaintOp::FillRect {
            rect: Rect::new(0.0, 0.0, 4.0, 8.0),
            color: Rgba8Premul::opaque(255, 0, 0),
        },
    ];
    Rasterizer::new().replay(&mut target, size, &ops).unwrap();

    assert_eq!(px(&target, size, 1, 1), [255, 0, 0, 255]);
    assert_eq!(px(&target, size, 6, 6), [0, 0, 255, 255]);
}

#[test]
fn draw_image_is_clipped_to_surface() {
    let size = Size::new(4, 4);
    let mut target = vec![0u8; size.byte_len(PixelFormat::Rgba8Premul)];
    let image = StaticImage::from_pixels(
        Size::new(2, 2),
        [9u8, 9, 9, 255].repeat(4),
        ContentId::next(),
    )
    .unwrap();
    let ops = vec![PaintOp::DrawImage { image, x: 3, y: -1 }];
    Rasterizer::new().replay(&mut target, size, &ops).unwrap();

    assert_eq!(px(&target, size, 3, 0), [9, 9, 9, 255]);
    assert_eq!(px(&target, size, 2, 0), [0, 0, 0, 0]);
    assert_eq!(px(&target, size, 3, 1), [0, 0, 0, 0]);
}

#[test]
fn rasterizer_is_reusable_across_sizes() {
    let mut r = Rasterizer::new();
    for edge in [4u32, 6, 4] {
        let size = Size::new(edge, edge);
        let mut target = vec![0u8; size.byte_len(PixelFormat::Rgba8Premul)];
        let ops = vec![PaintOp::FillRect {
            rect: Rect::new(0.0, 0.0, f64::from(edge), f64::from(edge)),
            color: Rgba8Premul::opaque(0, 255, 0),
        }];
        r.replay(&mut target, size, &ops).unwrap();
        assert_eq!(px(&target, size, edge - 1, edge - 1), [0, 255, 0, 255]);
    }
}

#[test]
fn wrong_target_length_is_rejected() {
    let mut target = vec![0u8; 3];
    let err = Rasterizer::new()
        .replay(&mut target, Size::new(1, 1), &[])
        .unwrap_err();
    assert!(matches!(err, HandoffError::Validation(_)));
}
