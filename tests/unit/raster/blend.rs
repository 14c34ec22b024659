use super::*;

#[test]
fn transparent_source_keeps_destination() {
    assert_eq!(over([1, 2, 3, 4], [0, 0, 0, 0]), [1, 2, 3, 4]);
}

#[test]
fn opaque_source_replaces_destination() {
    assert_eq!(over([1, 2, 3, 255], [10, 20, 30, 255]), [10, 20, 30, 255]);
}

#[test]
fn half_alpha_blends() {
    let out = over([0, 0, 200, 255], [128, 0, 0, 128]);
    assert_eq!(out[0], 128);
    assert_eq!(out[2], 100);
    assert_eq!(out[3], 255);
}

#[test]
fn in_place_rejects_mismatched_buffers() {
    let mut dst = [0u8; 8];
    assert!(over_in_place(&mut dst, &[0u8; 4]).is_err());
}

#[test]
fn unpremultiply_inverts_premultiply() {
    let c = Rgba8Premul::from_straight_rgba(255, 128, 0, 128);
    let [r, g, b, a] = unpremultiply(c);
    assert_eq!((r, b, a), (255, 0, 128));
    assert!((i32::from(g) - 128).abs() <= 1);
    assert_eq!(unpremultiply(Rgba8Premul::transparent()), [0; 4]);
}
