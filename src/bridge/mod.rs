//! Main-thread canvas path: a provider, its compositor layer and the hibernation policy.

mod hibernation;
mod layer;
mod layer_bridge;
mod rate_limiter;

pub use hibernation::{
    HibernationEvent, HibernationLogger, HibernationState, RecordingHibernationLogger,
    TracingHibernationLogger,
};
pub use layer::TextureLayer;
pub use layer_bridge::{BridgeOpts, LayerBridge, RasterMode, RasterModeHint};
pub use rate_limiter::{MAX_CANVAS_ANIMATION_BACKLOG, RateLimiter};
