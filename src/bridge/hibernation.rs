use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Where a bridge is in the hibernation cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HibernationState {
    #[default]
    Active,
    /// Page hidden; an idle task will try to hibernate.
    Scheduled,
    /// GPU backing released, content kept as a software image.
    Hibernating,
    TornDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HibernationEvent {
    Scheduled,
    AbortedDueToDestructionWhileHibernatePending,
    AbortedDueToVisibilityChange,
    AbortedDueGpuContextLoss,
    AbortedDueToSnapshotFailure,
    EndedNormally,
    EndedWithSwitchToBackgroundRendering,
    EndedWithTeardown,
}

/// Receives hibernation events of a [`LayerBridge`](crate::bridge::LayerBridge).
pub trait HibernationLogger {
    fn report_hibernation_event(&self, event: HibernationEvent);

    fn did_start_hibernating(&self) {}
}

/// Reports through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingHibernationLogger;

impl HibernationLogger for TracingHibernationLogger {
    fn report_hibernation_event(&self, event: HibernationEvent) {
        tracing::debug!(?event, "canvas hibernation");
    }

    fn did_start_hibernating(&self) {
        tracing::debug!("canvas started hibernating");
    }
}

/// Keeps every event in memory. Clones share the record.
#[derive(Clone, Debug, Default)]
pub struct RecordingHibernationLogger {
    events: Rc<RefCell<Vec<HibernationEvent>>>,
    starts: Rc<Cell<u32>>,
}

impl RecordingHibernationLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HibernationEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<HibernationEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Times a bridge actually entered hibernation.
    pub fn hibernation_starts(&self) -> u32 {
        self.starts.get()
    }
}

impl HibernationLogger for RecordingHibernationLogger {
    fn report_hibernation_event(&self, event: HibernationEvent) {
        tracing::trace!(?event, "recorded hibernation event");
        self.events.borrow_mut().push(event);
    }

    fn did_start_hibernating(&self) {
        self.starts.set(self.starts.get() + 1);
    }
}
