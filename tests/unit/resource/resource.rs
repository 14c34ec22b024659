use super::*;
use crate::gpu::SoftwareGpu;
use crate::task::Inbox;

fn bitmap(w: u32, h: u32) -> ResourceRef {
    CanvasResource::create_bitmap(Size::new(w, h), PixelFormat::Rgba8Premul, Weak::new()).unwrap()
}

fn shared_image(gpu: &Arc<SoftwareGpu>, link: Weak<ProviderLink>) -> ResourceRef {
    CanvasResource::create_shared_image(
        Size::new(4, 4),
        PixelFormat::Rgba8Premul,
        gpu.clone(),
        link,
    )
    .unwrap()
}

#[test]
fn last_unref_callback_gets_the_final_reference() {
    let slot: Arc<Mutex<Option<ResourceRef>>> = Arc::new(Mutex::new(None));
    let r = bitmap(2, 2);
    let serial = r.serial();
    let s = Arc::clone(&slot);
    r.set_last_unref_callback(Box::new(move |last| {
        *s.lock().unwrap() = Some(last);
    }));

    let extra = r.clone();
    drop(extra);
    assert!(slot.lock().unwrap().is_none());

    drop(r);
    let back = slot.lock().unwrap().take().unwrap();
    assert_eq!(back.serial(), serial);
    assert!(back.has_one_ref());
    assert!(!back.has_last_unref_callback());
}

#[test]
fn concurrent_final_drops_run_the_callback_once() {
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;

    for _ in 0..200 {
        let calls = Arc::new(AtomicUsize::new(0));
        let r = bitmap(1, 1);
        let c = Arc::clone(&calls);
        r.set_last_unref_callback(Box::new(move |_last| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let barrier = Arc::new(Barrier::new(2));
        let threads: Vec<_> = [r.clone(), r]
            .into_iter()
            .map(|handle| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    drop(handle);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn drop_on_owning_thread_tears_down_and_elsewhere_abandons() {
    let gpu = Arc::new(SoftwareGpu::new());
    let a = shared_image(&gpu, Weak::new());
    let b = shared_image(&gpu, Weak::new());
    assert_eq!(gpu.num_shared_images(), 2);

    drop(a);
    assert_eq!(gpu.num_shared_images(), 1);

    std::thread::spawn(move || drop(b)).join().unwrap();
    assert_eq!(gpu.num_shared_images(), 1);
}

#[test]
fn writes_are_owning_thread_only() {
    let r = bitmap(1, 1);
    let other = r.clone();
    let err = std::thread::spawn(move || {
        let err = other.write_pixels(IntRect::new(0, 0, 1, 1), &[1, 2, 3, 4]);
        // Hand the reference back so the drop happens on the owning thread.
        (err, other)
    })
    .join()
    .unwrap();
    assert!(matches!(err.0, Err(HandoffError::Contract(_))));

    r.write_pixels(IntRect::new(0, 0, 1, 1), &[1, 2, 3, 4]).unwrap();
    assert_eq!(r.read_pixels().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn prepare_transferable_describes_the_resource() {
    let soft = bitmap(3, 2);
    let (t, _cb) = soft.prepare_transferable_resource().unwrap();
    assert!(t.is_software);
    assert_eq!(t.mailbox, Mailbox(soft.serial()));
    assert_eq!(t.size, Size::new(3, 2));
    assert!(!t.sync_token.has_data());
    assert_eq!(soft.ref_count(), 2);

    let gpu = Arc::new(SoftwareGpu::new());
    let tex = shared_image(&gpu, Weak::new());
    tex.set_filter_quality(FilterQuality::High);
    let (t, cb) = tex.prepare_transferable_resource().unwrap();
    assert!(!t.is_software);
    assert!(t.sync_token.has_data());
    assert_eq!(tex.sync_token(), t.sync_token);
    assert_eq!(t.filter_quality, FilterQuality::High);
    drop(cb);

    gpu.lose_context();
    assert!(!tex.is_valid());
    assert!(tex.prepare_transferable_resource().is_none());
}

#[test]
fn release_recycles_only_the_last_healthy_reference() {
    let gpu = Arc::new(SoftwareGpu::new());
    let inbox = Inbox::<ResourceRef>::new();
    let link = Arc::new(ProviderLink::new(inbox.port(), true));

    let r = shared_image(&gpu, Arc::downgrade(&link));
    assert_eq!(link.in_flight(), 1);

    // Still referenced by the provider side: not recycled.
    let (_, cb) = r.prepare_transferable_resource().unwrap();
    let token = gpu.gen_sync_token();
    cb.run(token, false);
    assert!(inbox.is_empty());
    assert_eq!(gpu.waited_sync_tokens(), vec![token]);

    // Compositor holds the only reference.
    let (_, cb) = r.prepare_transferable_resource().unwrap();
    drop(r);
    cb.run(SyncToken::EMPTY, false);
    let recycled = inbox.try_next().unwrap();
    assert!(recycled.has_one_ref());
    assert_eq!(link.in_flight(), 1);

    // Lost resources are destroyed instead.
    let (_, cb) = recycled.prepare_transferable_resource().unwrap();
    drop(recycled);
    cb.run(SyncToken::EMPTY, true);
    assert!(inbox.is_empty());
    assert_eq!(link.in_flight(), 0);
    assert_eq!(gpu.num_shared_images(), 0);
}

#[test]
fn release_defers_to_last_unref_callback() {
    let inbox = Inbox::<ResourceRef>::new();
    let link = Arc::new(ProviderLink::new(inbox.port(), true));
    let r = CanvasResource::create_bitmap(
        Size::new(1, 1),
        PixelFormat::Rgba8Premul,
        Arc::downgrade(&link),
    )
    .unwrap();
    let hits = Arc::new(Mutex::new(0));
    let h = Arc::clone(&hits);
    r.set_last_unref_callback(Box::new(move |_last| *h.lock().unwrap() += 1));

    let (_, cb) = r.prepare_transferable_resource().unwrap();
    drop(r);
    cb.run(SyncToken::EMPTY, false);
    assert!(inbox.is_empty());
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn disabled_recycling_destroys_released_resources() {
    let inbox = Inbox::<ResourceRef>::new();
    let link = Arc::new(ProviderLink::new(inbox.port(), false));
    let r = CanvasResource::create_bitmap(
        Size::new(1, 1),
        PixelFormat::Rgba8Premul,
        Arc::downgrade(&link),
    )
    .unwrap();
    let (_, cb) = r.prepare_transferable_resource().unwrap();
    drop(r);
    cb.run(SyncToken::EMPTY, false);
    assert!(inbox.is_empty());
    assert_eq!(link.in_flight(), 0);
    assert_eq!(link.max_in_flight(), 1);
}

#[test]
fn swap_chain_present_copies_back_to_front() {
    let gpu = Arc::new(SoftwareGpu::new());
    let r = CanvasResource::create_swap_chain(
        Size::new(1, 1),
        PixelFormat::Rgba8Premul,
        gpu.clone(),
        Weak::new(),
    )
    .unwrap();
    assert!(!r.is_recycleable());
    r.write_pixels(IntRect::new(0, 0, 1, 1), &[5, 6, 7, 255]).unwrap();
    let (t, _cb) = r.prepare_transferable_resource().unwrap();
    assert_eq!(gpu.read_pixels(t.mailbox).unwrap(), vec![5, 6, 7, 255]);
}

#[test]
fn imported_resources_are_read_only_and_not_destroyed() {
    let gpu = Arc::new(SoftwareGpu::new());
    let mailbox = gpu
        .create_shared_image(SharedImageDesc {
            size: Size::new(1, 1),
            format: PixelFormat::Rgba8Premul,
        })
        .unwrap();
    let r = CanvasResource::import_external(mailbox, Size::new(1, 1), gpu.clone()).unwrap();
    assert_eq!(r.kind(), ResourceKind::External);
    assert!(!r.is_recycleable());
    let err = r
        .write_pixels(IntRect::new(0, 0, 1, 1), &[0; 4])
        .unwrap_err();
    assert!(matches!(err, HandoffError::Contract(_)));
    drop(r);
    assert_eq!(gpu.num_shared_images(), 1);
}

#[test]
fn copy_pixels_between_resources() {
    let gpu = Arc::new(SoftwareGpu::new());
    let a = shared_image(&gpu, Weak::new());
    let b = shared_image(&gpu, Weak::new());
    a.update_pixels(|px| {
        px.fill(7);
        Ok(())
    })
    .unwrap();
    b.copy_pixels_from(&a).unwrap();
    assert!(b.read_pixels().unwrap().iter().all(|&v| v == 7));

    let c = bitmap(4, 4);
    c.copy_pixels_from(&a).unwrap();
    assert_eq!(c.read_pixels().unwrap(), a.read_pixels().unwrap());
    assert!(c.copy_pixels_from(&bitmap(2, 2)).is_err());
}
