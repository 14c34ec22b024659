use super::*;

#[test]
fn from_pixels_checks_length() {
    let err =
        StaticImage::from_pixels(Size::new(2, 2), vec![0; 15], ContentId::next()).unwrap_err();
    assert!(matches!(err, HandoffError::Validation(_)));
}

#[test]
fn software_images_read_back_and_stay_software() {
    let id = ContentId::next();
    let mut px = vec![0; 16];
    px[4..8].copy_from_slice(&[10, 20, 30, 255]);
    let img = StaticImage::from_pixels(Size::new(2, 2), px, id).unwrap();
    assert!(!img.is_texture_backed());
    assert!(img.resource().is_none());
    assert_eq!(
        img.pixel(1, 0).unwrap(),
        Some(Rgba8Premul {
            r: 10,
            g: 20,
            b: 30,
            a: 255
        })
    );
    assert_eq!(img.pixel(2, 0).unwrap(), None);

    let soft = img.to_software().unwrap();
    assert_eq!(soft.content_id(), id);
    assert_eq!(soft.read_pixels().unwrap(), img.read_pixels().unwrap());
}

#[test]
fn straight_pixels_unpremultiply() {
    let px = Rgba8Premul::from_straight_rgba(200, 100, 0, 128).to_array().to_vec();
    let img = StaticImage::from_pixels(Size::new(1, 1), px, ContentId::next()).unwrap();
    let straight = img.read_straight_pixels().unwrap();
    assert_eq!(straight[3], 128);
    assert!((i32::from(straight[0]) - 200).abs() <= 1);
}
