use crate::dispatcher::DispatcherMessage;
use crate::foundation::core::{FilterQuality, PlaceholderId, ResourceId};
use crate::resource::ResourceRef;
use crate::task::Port;

/// Animation state as seen by the placeholder.
///
/// The `Should*` states remember a request made while no dispatcher was reachable; it is
/// replayed once one attaches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationState {
    #[default]
    Active,
    Suspended,
    ShouldSuspend,
    ShouldActivate,
}

#[derive(Debug)]
struct PlaceholderFrame {
    id: ResourceId,
    resource: ResourceRef,
    dispatcher: Port<DispatcherMessage>,
}

/// Displays the most recent frame of an off-thread canvas.
///
/// At most one frame is held. Replacing or dropping it hands the old one back to the
/// dispatcher that posted it.
#[derive(Debug)]
pub struct Placeholder {
    id: PlaceholderId,
    frame: Option<PlaceholderFrame>,
    dispatcher: Option<Port<DispatcherMessage>>,
    animation_state: AnimationState,
    filter_quality: FilterQuality,
    frames_received: u64,
}

impl Placeholder {
    pub fn new(id: PlaceholderId) -> Self {
        Self {
            id,
            frame: None,
            dispatcher: None,
            animation_state: AnimationState::Active,
            filter_quality: FilterQuality::default(),
            frames_received: 0,
        }
    }

    pub fn id(&self) -> PlaceholderId {
        self.id
    }

    pub fn animation_state(&self) -> AnimationState {
        self.animation_state
    }

    pub fn has_dispatcher(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn filter_quality(&self) -> FilterQuality {
        self.filter_quality
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn current_resource(&self) -> Option<&ResourceRef> {
        self.frame.as_ref().map(|f| &f.resource)
    }

    pub fn current_resource_id(&self) -> Option<ResourceId> {
        self.frame.as_ref().map(|f| f.id)
    }

    /// Show a new frame. The previous one goes back to its dispatcher.
    pub fn set_resource(
        &mut self,
        resource: ResourceRef,
        id: ResourceId,
        dispatcher: Port<DispatcherMessage>,
    ) {
        self.release_frame();
        self.frame = Some(PlaceholderFrame {
            id,
            resource,
            dispatcher,
        });
        self.frames_received += 1;
    }

    /// Hand the current frame back to the dispatcher that posted it.
    pub fn release_frame(&mut self) {
        let Some(PlaceholderFrame {
            id,
            resource,
            dispatcher,
        }) = self.frame.take()
        else {
            return;
        };
        let reclaim = DispatcherMessage::ReclaimResource {
            id,
            resource: Some(resource),
        };
        if !dispatcher.post(reclaim) {
            tracing::trace!(id = id.0, "dispatcher gone; frame released here");
        }
    }

    /// Bind the dispatcher animation requests go to, replaying anything queued meanwhile.
    pub fn set_dispatcher(&mut self, dispatcher: Port<DispatcherMessage>) {
        self.dispatcher = Some(dispatcher);
        let state = self.animation_state;
        self.animation_state = match state {
            AnimationState::ShouldSuspend
                if self.post(DispatcherMessage::SetSuspendAnimation(true)) =>
            {
                AnimationState::Suspended
            }
            AnimationState::ShouldActivate
                if self.post(DispatcherMessage::SetSuspendAnimation(false)) =>
            {
                AnimationState::Active
            }
            state => state,
        };
        if self.filter_quality != FilterQuality::default() {
            self.post(DispatcherMessage::SetFilterQuality(self.filter_quality));
        }
    }

    /// Ask the producing thread to pause or resume its animation.
    pub fn set_suspend_animation(&mut self, suspend: bool) {
        self.animation_state = match (self.animation_state, suspend) {
            (AnimationState::Active, true) => {
                if self.post(DispatcherMessage::SetSuspendAnimation(true)) {
                    AnimationState::Suspended
                } else {
                    AnimationState::ShouldSuspend
                }
            }
            (AnimationState::Suspended, false) => {
                if self.post(DispatcherMessage::SetSuspendAnimation(false)) {
                    AnimationState::Active
                } else {
                    AnimationState::ShouldActivate
                }
            }
            (AnimationState::ShouldSuspend, false) => AnimationState::Active,
            (AnimationState::ShouldActivate, true) => AnimationState::Suspended,
            (state, _) => state,
        };
    }

    pub fn update_filter_quality(&mut self, quality: FilterQuality) {
        if self.filter_quality == quality {
            return;
        }
        self.filter_quality = quality;
        self.post(DispatcherMessage::SetFilterQuality(quality));
    }

    fn post(&mut self, message: DispatcherMessage) -> bool {
        let Some(dispatcher) = &self.dispatcher else {
            return false;
        };
        if dispatcher.post(message) {
            return true;
        }
        tracing::debug!(placeholder = ?self.id, "dispatcher gone");
        self.dispatcher = None;
        false
    }
}

impl Drop for Placeholder {
    fn drop(&mut self) {
        self.release_frame();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/placeholder/placeholder.rs"]
mod tests;
