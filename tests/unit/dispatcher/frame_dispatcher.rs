use super::*;
use crate::compositor::{RecordingFrameSink, SinkEvent};
use crate::foundation::error::HandoffError;
use crate::foundation::core::{FlushReason, PlaceholderId, Rect, Rgba8Premul};
use crate::gpu::{GpuContext, SoftwareGpu};
use crate::placeholder::PlaceholderRegistry;
use crate::provider::{ProviderKind, ProviderOpts, ResourceProvider};
use std::sync::Arc;

const SIZE: Size = Size::new(4, 4);

fn dispatcher(sink: &RecordingFrameSink) -> ResourceDispatcher {
    ResourceDispatcher::new(SIZE, Box::new(sink.clone()), DispatcherOpts::default(), None).unwrap()
}

fn provider() -> ResourceProvider {
    ResourceProvider::new(SIZE, ProviderOpts::default(), None).unwrap()
}

fn frame(p: &mut ResourceProvider, shade: u8) -> ResourceRef {
    p.canvas()
        .unwrap()
        .fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), Rgba8Premul::opaque(shade, 0, 0));
    p.produce_resource(FlushReason::CanvasPushFrame).unwrap()
}

fn dispatch(d: &mut ResourceDispatcher, r: ResourceRef) -> bool {
    d.dispatch_frame(r, Duration::ZERO, IntRect::from_size(SIZE), false, true)
}

fn dispatch_sync(d: &mut ResourceDispatcher, r: ResourceRef) -> bool {
    d.dispatch_frame_sync(r, Duration::ZERO, IntRect::from_size(SIZE), false, true)
}

#[test]
fn rejects_empty_canvas() {
    let sink = RecordingFrameSink::new();
    let err = ResourceDispatcher::new(
        Size::new(0, 4),
        Box::new(sink),
        DispatcherOpts::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, HandoffError::Validation(_)));
}

#[test]
fn without_placeholder_compositor_return_releases() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();

    assert!(dispatch(&mut d, frame(&mut p, 10)));
    let submitted = sink.frames();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].resources[0].id, ResourceId(1));
    assert_eq!(submitted[0].quads[0].resource_id, ResourceId(1));
    assert!(submitted[0].resources[0].is_software);
    assert_eq!(d.has_spare_lock(ResourceId(1)), Some(false));
    assert_eq!(d.pending_compositor_frames(), 1);

    d.did_receive_compositor_frame_ack(&sink.take_returns());
    assert!(d.exported_resource_ids().is_empty());
    assert_eq!(d.pending_compositor_frames(), 0);
    assert_eq!(d.stats().released, 1);
}

#[test]
fn ids_increase_per_frame() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();
    for shade in 0..3 {
        assert!(dispatch_sync(&mut d, frame(&mut p, shade)));
    }
    let ids: Vec<ResourceId> = sink.frames().iter().map(|f| f.resources[0].id).collect();
    assert_eq!(ids, vec![ResourceId(1), ResourceId(2), ResourceId(3)]);
}

#[test]
fn full_pending_window_refuses_frames() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();

    assert!(dispatch(&mut d, frame(&mut p, 1)));
    assert!(dispatch(&mut d, frame(&mut p, 2)));
    assert!(d.has_too_many_pending_frames());
    assert!(!dispatch(&mut d, frame(&mut p, 3)));
    assert_eq!(sink.frame_count(), 2);
    assert_eq!(d.stats().frames_refused, 1);

    d.did_receive_compositor_frame_ack(&[]);
    assert!(dispatch(&mut d, frame(&mut p, 4)));
}

#[test]
fn wrong_size_is_refused() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut other = ResourceProvider::new(Size::new(8, 8), ProviderOpts::default(), None).unwrap();
    let r = other.produce_resource(FlushReason::Testing).unwrap();
    assert!(!dispatch(&mut d, r));
    assert_eq!(sink.frame_count(), 0);
    assert!(d.exported_resource_ids().is_empty());
}

#[test]
fn lost_resource_is_refused() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();
    let r = frame(&mut p, 1);
    r.notify_resource_lost();
    assert!(!dispatch(&mut d, r));
    assert_eq!(d.stats().frames_refused, 1);
}

#[test]
fn double_compositor_return_releases_once() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();
    assert!(dispatch(&mut d, frame(&mut p, 1)));

    let returns = sink.take_returns();
    d.reclaim_resources(&returns);
    d.reclaim_resources(&returns);
    assert_eq!(d.stats().released, 1);
}

#[test]
fn returned_frames_are_recycled_unless_lost() {
    for lost in [false, true] {
        let sink = RecordingFrameSink::new();
        sink.set_return_as_lost(lost);
        let mut d = dispatcher(&sink);
        let mut p = provider();

        assert!(dispatch(&mut d, frame(&mut p, 1)));
        // The provider moves on to a copy; the compositor holds the only reference.
        let _next = frame(&mut p, 2);
        d.did_receive_compositor_frame_ack(&sink.take_returns());

        let expected = if lost { 0 } else { 1 };
        assert_eq!(p.recycled_resource_count(), expected, "lost = {lost}");
    }
}

#[test]
fn drawing_after_a_lost_return_dispatches_a_fresh_resource() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();

    let first = frame(&mut p, 10);
    let first_serial = first.serial();
    assert!(dispatch(&mut d, first));
    sink.set_return_as_lost(true);
    d.did_receive_compositor_frame_ack(&sink.take_returns());

    let next = frame(&mut p, 20);
    assert_ne!(next.serial(), first_serial);
    assert!(!next.is_lost());
    assert_eq!(next.read_pixels().unwrap()[0], 20);
    assert!(dispatch(&mut d, next));
    assert_eq!(d.stats().frames_refused, 0);
    assert_eq!(d.stats().frames_dispatched, 2);
}

#[test]
fn dropping_dispatcher_releases_frames() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();
    assert!(dispatch(&mut d, frame(&mut p, 1)));
    let _next = frame(&mut p, 2);
    drop(d);
    assert_eq!(p.recycled_resource_count(), 1);
}

#[test]
fn placeholder_gets_at_most_three_frames_and_the_latest() {
    let sink = RecordingFrameSink::new();
    let mut registry = PlaceholderRegistry::new();
    let id = PlaceholderId(7);
    registry.register(id);
    let mut d = ResourceDispatcher::new(
        SIZE,
        Box::new(sink.clone()),
        DispatcherOpts::default(),
        Some(registry.handle(id)),
    )
    .unwrap();
    let mut p = provider();

    for shade in 1..=4 {
        assert!(dispatch_sync(&mut d, frame(&mut p, shade)));
    }
    assert_eq!(d.posted_to_placeholder(), 3);
    assert_eq!(d.latest_unposted_resource_id(), Some(ResourceId(4)));

    // A newer frame replaces the unposted one, which is released.
    assert!(dispatch_sync(&mut d, frame(&mut p, 5)));
    assert_eq!(d.latest_unposted_resource_id(), Some(ResourceId(5)));
    assert_eq!(d.stats().dropped_unposted, 1);
    assert_eq!(d.has_spare_lock(ResourceId(4)), None);

    // Attach plus three frames; showing 2 and 3 hands back 1 and 2.
    assert_eq!(registry.process_messages(), 4);
    assert_eq!(d.process_messages(), 2);
    assert_eq!(d.latest_unposted_resource_id(), None);
    assert_eq!(d.posted_to_placeholder(), 2);
    assert_eq!(d.exported_resource_ids(), vec![ResourceId(3), ResourceId(5)]);

    registry.process_messages();
    assert_eq!(
        registry.get(id).unwrap().current_resource_id(),
        Some(ResourceId(5))
    );
    d.process_messages();
    assert_eq!(d.exported_resource_ids(), vec![ResourceId(5)]);
    // Still held by both the compositor and the placeholder.
    assert_eq!(d.has_spare_lock(ResourceId(5)), Some(true));
}

#[test]
fn begin_frame_skips_when_window_is_full() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();
    assert!(dispatch(&mut d, frame(&mut p, 1)));
    assert!(dispatch(&mut d, frame(&mut p, 2)));

    let args = BeginFrameArgs::normal(1, 10, Duration::from_millis(100));
    let produced = d.on_begin_frame(args, args.frame_time, |_| panic!("must not produce"));
    assert!(!produced);
    assert_eq!(
        sink.events().last(),
        Some(&SinkEvent::DidNotProduceFrame(BeginFrameAck::new(&args, false)))
    );
}

#[test]
fn begin_frame_skips_missed_frames_past_deadline() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut args = BeginFrameArgs::normal(1, 3, Duration::from_millis(100));
    args.missed = true;
    let late = args.deadline + Duration::from_millis(1);
    assert!(!d.on_begin_frame(args, late, |_| panic!("must not produce")));
    assert_eq!(sink.did_not_produce_count(), 1);

    // Within its deadline a missed frame goes to the producer.
    assert!(!d.on_begin_frame(args, args.frame_time, |_| false));
    assert_eq!(sink.did_not_produce_count(), 2);
}

#[test]
fn begin_frame_ack_travels_with_the_frame() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();
    let r = frame(&mut p, 9);

    let args = BeginFrameArgs::normal(2, 42, Duration::from_millis(16));
    assert!(d.on_begin_frame(args, args.frame_time, |d| dispatch(d, r)));
    let ack = sink.frames()[0].begin_frame_ack;
    assert_eq!(ack.sequence_number, 42);
    assert_eq!(ack.source_id, 2);
    assert!(ack.has_damage);
    assert_eq!(sink.did_not_produce_count(), 0);
}

#[test]
fn suspended_animation_hides_begin_frame_requests() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);

    d.set_needs_begin_frame(true);
    d.set_needs_begin_frame(true);
    d.set_suspend_animation(true);
    assert!(!d.needs_begin_frame());
    d.set_suspend_animation(false);
    d.set_suspend_animation(true);
    d.set_needs_begin_frame(false);
    d.set_suspend_animation(false);

    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::SetNeedsBeginFrame(true),
            SinkEvent::SetNeedsBeginFrame(false),
            SinkEvent::SetNeedsBeginFrame(true),
            SinkEvent::SetNeedsBeginFrame(false),
        ]
    );
}

#[test]
fn reshape_forces_new_surface_and_full_damage() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut small = provider();
    let damage = IntRect::new(1, 1, 1, 1);

    assert!(dispatch_sync(&mut d, frame(&mut small, 1)));
    let first = sink.frames()[0].local_surface_id;

    let big = Size::new(8, 8);
    d.reshape(big).unwrap();
    assert!(!dispatch_sync(&mut d, frame(&mut small, 2)));

    let mut p = ResourceProvider::new(big, ProviderOpts::default(), None).unwrap();
    let r = p.produce_resource(FlushReason::Testing).unwrap();
    assert!(d.dispatch_frame_sync(r.clone(), Duration::ZERO, damage, false, true));
    let resized = &sink.frames()[1];
    assert_eq!(resized.local_surface_id, first.next_child());
    assert_eq!(resized.damage_rect, IntRect::from_size(big));
    assert_eq!(resized.size, big);

    assert!(d.dispatch_frame_sync(r, Duration::ZERO, damage, false, true));
    let next = &sink.frames()[2];
    assert_eq!(next.local_surface_id, resized.local_surface_id);
    assert_eq!(next.damage_rect, damage);

    assert!(d.reshape(Size::new(0, 0)).is_err());
}

#[test]
fn vertical_flip_needs_gpu_compositing() {
    let gpu = Arc::new(SoftwareGpu::new());
    let opts = ProviderOpts {
        kind: ProviderKind::SharedImage,
        ..ProviderOpts::default()
    };
    let mut accelerated =
        ResourceProvider::new(SIZE, opts, Some(gpu.clone() as Arc<dyn GpuContext>)).unwrap();
    let mut software = provider();

    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let flip = |d: &mut ResourceDispatcher, r: ResourceRef| {
        assert!(d.dispatch_frame_sync(r, Duration::ZERO, IntRect::from_size(SIZE), true, false));
    };

    flip(&mut d, software.produce_resource(FlushReason::Testing).unwrap());
    flip(&mut d, accelerated.produce_resource(FlushReason::Testing).unwrap());
    gpu.set_gpu_compositing(false);
    flip(&mut d, accelerated.produce_resource(FlushReason::Testing).unwrap());

    let flipped: Vec<bool> = sink.frames().iter().map(|f| f.quads[0].y_flipped).collect();
    assert_eq!(flipped, vec![false, true, false]);
}

#[test]
fn filter_quality_arrives_by_message() {
    let sink = RecordingFrameSink::new();
    let mut d = dispatcher(&sink);
    let mut p = provider();

    assert!(d.port().post(DispatcherMessage::SetFilterQuality(FilterQuality::High)));
    assert!(d.port().post(DispatcherMessage::SetSuspendAnimation(true)));
    assert_eq!(d.process_messages(), 2);
    assert_eq!(d.filter_quality(), FilterQuality::High);
    assert!(d.is_animation_suspended());

    assert!(dispatch(&mut d, frame(&mut p, 1)));
    assert_eq!(sink.frames()[0].resources[0].filter_quality, FilterQuality::High);
}
