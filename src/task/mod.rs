//! Task posting primitives.
//!
//! Two flavors are used by the canvas machinery:
//!
//! - [`Inbox`]/[`Port`]: typed cross-thread message channels. A port never keeps its receiver
//!   alive; posting to a torn-down receiver returns `false` and drops the message on the sending
//!   side.
//! - [`TaskQueue`]: a single-thread queue of posted and idle closures, drained cooperatively by
//!   the owning thread.

mod inbox;
mod queue;

pub use inbox::{Inbox, Port};
pub use queue::{TaskQueue, WeakTaskQueue};
