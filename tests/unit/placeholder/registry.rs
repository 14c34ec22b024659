use super::*;
use crate::foundation::core::{FlushReason, Size};
use crate::provider::{ProviderOpts, ResourceProvider};

fn resource() -> ResourceRef {
    let mut p = ResourceProvider::new(Size::new(2, 2), ProviderOpts::default(), None).unwrap();
    p.produce_resource(FlushReason::Testing).unwrap()
}

#[test]
fn routes_frames_by_id() {
    let mut registry = PlaceholderRegistry::new();
    registry.register(PlaceholderId(1));
    registry.register(PlaceholderId(2));
    let dispatcher = Inbox::<DispatcherMessage>::new();

    let handle = registry.handle(PlaceholderId(2));
    assert!(handle.post(PlaceholderMessage::SetResource {
        placeholder: handle.id(),
        resource_id: ResourceId(5),
        resource: resource(),
        dispatcher: dispatcher.port(),
    }));
    assert_eq!(registry.process_messages(), 1);

    assert!(registry.get(PlaceholderId(1)).unwrap().current_resource().is_none());
    assert_eq!(
        registry.get(PlaceholderId(2)).unwrap().current_resource_id(),
        Some(ResourceId(5))
    );
    assert!(dispatcher.is_empty());
}

#[test]
fn attach_binds_the_dispatcher() {
    let mut registry = PlaceholderRegistry::new();
    registry.register(PlaceholderId(1));
    let dispatcher = Inbox::<DispatcherMessage>::new();
    let handle = registry.handle(PlaceholderId(1));
    handle.post(PlaceholderMessage::AttachDispatcher {
        placeholder: handle.id(),
        dispatcher: dispatcher.port(),
    });
    registry.process_messages();
    assert!(registry.get(PlaceholderId(1)).unwrap().has_dispatcher());
}

#[test]
fn frame_for_unknown_placeholder_goes_back() {
    let mut registry = PlaceholderRegistry::new();
    let dispatcher = Inbox::<DispatcherMessage>::new();
    let handle = registry.handle(PlaceholderId(9));
    handle.post(PlaceholderMessage::SetResource {
        placeholder: handle.id(),
        resource_id: ResourceId(1),
        resource: resource(),
        dispatcher: dispatcher.port(),
    });
    registry.process_messages();

    let mut back = Vec::new();
    dispatcher.drain(|m| back.push(m));
    assert!(matches!(
        back.as_slice(),
        [DispatcherMessage::ReclaimResource { id: ResourceId(1), resource: Some(_) }]
    ));
}

#[test]
fn unregister_returns_the_frame() {
    let mut registry = PlaceholderRegistry::new();
    let dispatcher = Inbox::<DispatcherMessage>::new();
    registry
        .register(PlaceholderId(1))
        .set_resource(resource(), ResourceId(2), dispatcher.port());
    registry.unregister(PlaceholderId(1));
    assert!(registry.is_empty());
    assert!(matches!(
        dispatcher.try_next(),
        Some(DispatcherMessage::ReclaimResource { id: ResourceId(2), .. })
    ));
}

#[test]
#[should_panic(expected = "registered twice")]
fn double_register_panics() {
    let mut registry = PlaceholderRegistry::new();
    registry.register(PlaceholderId(1));
    registry.register(PlaceholderId(1));
}

#[test]
#[should_panic(expected = "was not registered")]
fn unregister_unknown_panics() {
    let mut registry = PlaceholderRegistry::new();
    registry.unregister(PlaceholderId(1));
}
