use crate::foundation::core::{IntRect, PixelFormat, Size};
use crate::foundation::error::HandoffResult;

/// Opaque handle to GPU memory shared across contexts.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Mailbox(pub u64);

impl Mailbox {
    pub const ZERO: Mailbox = Mailbox(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Marker in the GPU command stream. Waiting on it orders later work after everything issued
/// before it was generated.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SyncToken(pub u64);

impl SyncToken {
    pub const EMPTY: SyncToken = SyncToken(0);

    pub fn has_data(self) -> bool {
        self.0 != 0
    }
}

/// Allocation parameters of a shared image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SharedImageDesc {
    pub size: Size,
    pub format: PixelFormat,
}

/// Shared-image interface of a GPU context.
///
/// Implementations must be callable from any thread: resources are released on whichever thread
/// drops the last reference. Pixel transfers use tightly packed premultiplied RGBA8 rows.
pub trait GpuContext: Send + Sync + std::fmt::Debug {
    /// Whether the context was reset. A lost context never comes back; callers restore with a
    /// new context.
    fn is_context_lost(&self) -> bool;

    /// Whether frames are composited on the GPU (decides y-flip handling).
    fn supports_gpu_compositing(&self) -> bool;

    fn create_shared_image(&self, desc: SharedImageDesc) -> HandoffResult<Mailbox>;

    /// Destroy a shared image once `sync_token` has passed. Unknown mailboxes are ignored.
    fn destroy_shared_image(&self, mailbox: Mailbox, sync_token: SyncToken);

    /// Upload `pixels` into `rect` of the image.
    fn write_pixels(&self, mailbox: Mailbox, rect: IntRect, pixels: &[u8]) -> HandoffResult<()>;

    /// Read back the whole image.
    fn read_pixels(&self, mailbox: Mailbox) -> HandoffResult<Vec<u8>>;

    fn copy_shared_image(&self, src: Mailbox, dst: Mailbox) -> HandoffResult<()>;

    fn gen_sync_token(&self) -> SyncToken;

    fn wait_sync_token(&self, sync_token: SyncToken);
}
