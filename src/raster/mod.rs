//! Paint-command recording and software rasterization.
//!
//! A [`PaintCanvas`] only records [`PaintOp`]s. They are replayed into a resource's pixels when
//! the provider flushes, which is what lets the provider decide on copy-on-write at the last
//! possible moment.

mod blend;
mod canvas;
mod image;
mod rasterize;

pub use blend::{over, over_in_place, unpremultiply};
pub use canvas::{PaintCanvas, PaintOp};
pub use image::StaticImage;
pub use rasterize::Rasterizer;
