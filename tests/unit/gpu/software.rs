use super::*;
use crate::foundation::core::{PixelFormat, Size};

fn desc(w: u32, h: u32) -> SharedImageDesc {
    SharedImageDesc {
        size: Size::new(w, h),
        format: PixelFormat::Rgba8Premul,
    }
}

#[test]
fn shared_images_are_accounted() {
    let gpu = SoftwareGpu::new();
    let a = gpu.create_shared_image(desc(4, 4)).unwrap();
    let b = gpu.create_shared_image(desc(4, 4)).unwrap();
    assert_ne!(a, b);
    assert_eq!(gpu.num_shared_images(), 2);

    let token = gpu.gen_sync_token();
    gpu.destroy_shared_image(a, token);
    gpu.destroy_shared_image(a, SyncToken::EMPTY);
    assert_eq!(gpu.num_shared_images(), 1);
    assert_eq!(gpu.waited_sync_tokens(), vec![token]);

    let st = gpu.stats();
    assert_eq!(st.created_shared_images, 2);
    assert_eq!(st.destroyed_shared_images, 1);
}

#[test]
fn partial_writes_land_in_place() {
    let gpu = SoftwareGpu::new();
    let m = gpu.create_shared_image(desc(2, 2)).unwrap();
    gpu.write_pixels(m, IntRect::new(1, 1, 1, 1), &[9, 8, 7, 6])
        .unwrap();
    let px = gpu.read_pixels(m).unwrap();
    assert_eq!(&px[12..16], &[9, 8, 7, 6]);
    assert!(px[..12].iter().all(|&b| b == 0));

    let err = gpu
        .write_pixels(m, IntRect::new(1, 1, 2, 1), &[0; 8])
        .unwrap_err();
    assert!(matches!(err, HandoffError::Validation(_)));
}

#[test]
fn lost_context_refuses_work() {
    let gpu = SoftwareGpu::new();
    let m = gpu.create_shared_image(desc(1, 1)).unwrap();
    gpu.lose_context();
    assert!(gpu.is_context_lost());
    assert!(!gpu.supports_gpu_compositing());
    assert!(gpu.create_shared_image(desc(1, 1)).unwrap_err().is_gpu_failure());
    assert!(gpu.read_pixels(m).is_err());
    assert!(!gpu.gen_sync_token().has_data());

    // Cleanup still works so nothing leaks.
    gpu.destroy_shared_image(m, SyncToken::EMPTY);
    assert_eq!(gpu.num_shared_images(), 0);
}

#[test]
fn injected_allocation_failures_are_one_shot() {
    let gpu = SoftwareGpu::new();
    gpu.fail_next_allocations(1);
    let err = gpu.create_shared_image(desc(1, 1)).unwrap_err();
    assert!(matches!(err, HandoffError::Allocation(_)));
    assert!(gpu.create_shared_image(desc(1, 1)).is_ok());
    assert_eq!(gpu.stats().failed_allocations, 1);
}
