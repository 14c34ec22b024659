use crate::foundation::error::{HandoffError, HandoffResult};
use std::sync::atomic::{AtomicU64, Ordering};

pub use kurbo::{Point, Rect};

/// Largest edge length accepted for a canvas surface.
///
/// The raster path works on `u16` extents, so anything larger can never be drawn.
pub const MAX_SURFACE_EDGE: u32 = u16::MAX as u32;

/// Integer pixel size of a canvas or resource.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Reject empty or oversized surfaces.
    pub fn validate(self) -> HandoffResult<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(HandoffError::validation(format!(
                "surface size must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_SURFACE_EDGE || self.height > MAX_SURFACE_EDGE {
            return Err(HandoffError::validation(format!(
                "surface size {}x{} exceeds {MAX_SURFACE_EDGE}",
                self.width, self.height
            )));
        }
        Ok(self)
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Byte length of a tightly packed buffer of this size.
    pub fn byte_len(self, format: PixelFormat) -> usize {
        self.area().saturating_mul(format.bytes_per_pixel())
    }
}

/// Integer pixel rectangle (damage regions, quads).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl IntRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole surface.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn right(self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    fn bottom(self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Intersection of two rectangles; empty rectangles collapse to the default.
    pub fn intersect(self, other: IntRect) -> IntRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= i64::from(x0) || y1 <= i64::from(y0) {
            return IntRect::default();
        }
        IntRect::new(
            x0,
            y0,
            (x1 - i64::from(x0)) as u32,
            (y1 - i64::from(y0)) as u32,
        )
    }

    /// Smallest rectangle containing both inputs.
    pub fn union(self, other: IntRect) -> IntRect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        IntRect::new(
            x0,
            y0,
            (x1 - i64::from(x0)) as u32,
            (y1 - i64::from(y0)) as u32,
        )
    }

    /// Round a floating point rectangle outwards to whole pixels.
    pub fn enclosing(rect: Rect) -> IntRect {
        let r = rect.abs();
        let x0 = r.x0.floor() as i32;
        let y0 = r.y0.floor() as i32;
        let x1 = r.x1.ceil() as i32;
        let y1 = r.y1.ceil() as i32;
        IntRect::new(
            x0,
            y0,
            x1.saturating_sub(x0).max(0) as u32,
            y1.saturating_sub(y0).max(0) as u32,
        )
    }
}

/// Pixel layout of resource storage.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum PixelFormat {
    /// 8-bit RGBA with premultiplied alpha, tightly packed, row-major.
    #[default]
    Rgba8Premul,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8Premul => 4,
        }
    }
}

/// Sampling hint forwarded to the compositor.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FilterQuality {
    /// Nearest-neighbor sampling.
    None,
    #[default]
    Low,
    Medium,
    High,
}

impl FilterQuality {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            FilterQuality::None => 0,
            FilterQuality::Low => 1,
            FilterQuality::Medium => 2,
            FilterQuality::High => 3,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => FilterQuality::None,
            1 => FilterQuality::Low,
            2 => FilterQuality::Medium,
            _ => FilterQuality::High,
        }
    }
}

/// Why the canvas is being flushed. Recorded in logs only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    Testing,
    CanvasPushFrame,
    Snapshot,
    Hibernating,
    WritePixels,
    Clear,
    DrawImage,
    Printing,
}

/// Compositor-facing identifier of a dispatched frame resource.
///
/// Assigned by a dispatcher in strictly increasing order; `0` is never handed out.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub const INVALID: ResourceId = ResourceId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Key of a placeholder inside a [`crate::placeholder::PlaceholderRegistry`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PlaceholderId(pub u32);

static NEXT_CONTENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identifier of a distinct piece of drawn content.
///
/// Downstream caches compare content ids to detect stale copies of a canvas image.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ContentId(pub u64);

impl ContentId {
    pub const INVALID: ContentId = ContentId(0);

    /// Allocate the next id. Ids are strictly increasing across the process.
    pub fn next() -> ContentId {
        ContentId(NEXT_CONTENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8Premul {
    /// Fully transparent black.
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    /// Opaque color from straight components.
    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Convert straight-alpha RGBA8 into premultiplied RGBA8.
    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
