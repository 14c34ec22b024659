use super::*;

#[test]
fn translation_applies_to_later_ops_and_survives_take() {
    let mut c = PaintCanvas::new(Size::new(8, 8));
    c.translate(2.0, 1.0);
    c.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Rgba8Premul::opaque(1, 2, 3));
    let ops = c.take_ops();
    assert!(!c.has_recorded_ops());
    match &ops[0] {
        PaintOp::FillRect { rect, .. } => assert_eq!(*rect, Rect::new(2.0, 1.0, 3.0, 2.0)),
        other => panic!("unexpected op {other:?}"),
    }

    c.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Rgba8Premul::opaque(1, 2, 3));
    match &c.recorded_ops()[0] {
        PaintOp::FillRect { rect, .. } => assert_eq!(rect.x0, 2.0),
        other => panic!("unexpected op {other:?}"),
    }
}

#[test]
fn clear_drops_earlier_ops() {
    let mut c = PaintCanvas::new(Size::new(4, 4));
    c.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Rgba8Premul::opaque(9, 9, 9));
    c.clear(Rgba8Premul::transparent());
    assert_eq!(c.recorded_ops().len(), 1);
    assert!(matches!(c.recorded_ops()[0], PaintOp::Clear(_)));
}

#[test]
fn empty_rects_are_not_recorded() {
    let mut c = PaintCanvas::new(Size::new(4, 4));
    c.fill_rect(Rect::new(1.0, 1.0, 1.0, 3.0), Rgba8Premul::opaque(9, 9, 9));
    assert!(!c.has_recorded_ops());
}
