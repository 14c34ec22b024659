use crate::bridge::BridgeOpts;
use crate::dispatcher::DispatcherOpts;
use crate::foundation::core::Size;
use crate::foundation::error::{HandoffError, HandoffResult};
use crate::provider::ProviderOpts;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Default canvas size, matching an unsized HTML canvas.
pub const DEFAULT_CANVAS_SIZE: Size = Size::new(300, 150);

/// Options for a whole canvas pipeline, as read from a JSON file.
///
/// Every field is optional in JSON; missing fields take their defaults.
///
/// ```json
/// {
///   "size": { "width": 640, "height": 480 },
///   "dispatcher": { "max_pending_compositor_frames": 3 },
///   "bridge": { "hibernation_enabled": false }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub size: Size,
    pub provider: ProviderOpts,
    pub dispatcher: DispatcherOpts,
    pub bridge: BridgeOpts,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CANVAS_SIZE,
            provider: ProviderOpts::default(),
            dispatcher: DispatcherOpts::default(),
            bridge: BridgeOpts::default(),
        }
    }
}

impl HandoffConfig {
    /// Parse and validate a config from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> HandoffResult<Self> {
        let config: HandoffConfig = serde_json::from_reader(r)
            .map_err(|e| HandoffError::serde(format!("parse config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> HandoffResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    pub fn from_path(path: impl AsRef<Path>) -> HandoffResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            HandoffError::validation(format!("open config JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn validate(&self) -> HandoffResult<()> {
        self.size.validate()?;
        if self.dispatcher.max_pending_compositor_frames == 0 {
            return Err(HandoffError::validation(
                "dispatcher.max_pending_compositor_frames must be > 0",
            ));
        }
        if self.dispatcher.max_unreclaimed_placeholder_frames == 0 {
            return Err(HandoffError::validation(
                "dispatcher.max_unreclaimed_placeholder_frames must be > 0",
            ));
        }
        if self.bridge.max_animation_backlog == 0 {
            return Err(HandoffError::validation(
                "bridge.max_animation_backlog must be > 0",
            ));
        }
        for (name, pool) in [
            ("provider.pool", &self.provider.pool),
            ("bridge.provider.pool", &self.bridge.provider.pool),
        ] {
            if pool.max_resources > 0 && pool.max_pool_bytes == 0 {
                return Err(HandoffError::validation(format!(
                    "{name}.max_pool_bytes must be > 0 when resources are pooled"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
