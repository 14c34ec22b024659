use crate::foundation::core::{ContentId, PixelFormat, Rgba8Premul, Size};
use crate::foundation::error::{HandoffError, HandoffResult};
use crate::raster::blend::unpremultiply;
use crate::resource::ResourceRef;
use std::sync::Arc;

#[derive(Debug)]
enum ImageBacking {
    Software(Vec<u8>),
    /// Shares the producing resource; the provider copies on write before touching it again.
    Resource(ResourceRef),
}

#[derive(Debug)]
struct ImageInner {
    size: Size,
    content_id: ContentId,
    backing: ImageBacking,
}

/// Immutable snapshot of canvas content.
///
/// Cheap to clone. Images taken from an accelerated provider keep its resource alive, so the
/// resource cannot be written until every image referencing it is gone.
#[derive(Clone, Debug)]
pub struct StaticImage {
    inner: Arc<ImageInner>,
}

impl StaticImage {
    /// Wrap premultiplied RGBA8 pixels.
    pub fn from_pixels(size: Size, pixels: Vec<u8>, content_id: ContentId) -> HandoffResult<Self> {
        let size = size.validate()?;
        if pixels.len() != size.byte_len(PixelFormat::Rgba8Premul) {
            return Err(HandoffError::validation(format!(
                "{} bytes do not describe a {}x{} image",
                pixels.len(),
                size.width,
                size.height
            )));
        }
        Ok(Self {
            inner: Arc::new(ImageInner {
                size,
                content_id,
                backing: ImageBacking::Software(pixels),
            }),
        })
    }

    pub(crate) fn from_resource(resource: ResourceRef, content_id: ContentId) -> Self {
        Self {
            inner: Arc::new(ImageInner {
                size: resource.size(),
                content_id,
                backing: ImageBacking::Resource(resource),
            }),
        }
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    pub fn content_id(&self) -> ContentId {
        self.inner.content_id
    }

    pub fn is_texture_backed(&self) -> bool {
        match &self.inner.backing {
            ImageBacking::Software(_) => false,
            ImageBacking::Resource(r) => r.is_accelerated(),
        }
    }

    /// Resource backing the image, if any.
    pub fn resource(&self) -> Option<&ResourceRef> {
        match &self.inner.backing {
            ImageBacking::Software(_) => None,
            ImageBacking::Resource(r) => Some(r),
        }
    }

    pub fn read_pixels(&self) -> HandoffResult<Vec<u8>> {
        match &self.inner.backing {
            ImageBacking::Software(px) => Ok(px.clone()),
            ImageBacking::Resource(r) => r.read_pixels(),
        }
    }

    /// Pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> HandoffResult<Option<Rgba8Premul>> {
        let size = self.size();
        if x >= size.width || y >= size.height {
            return Ok(None);
        }
        let px = self.read_pixels()?;
        let i = (y as usize * size.width as usize + x as usize) * 4;
        Ok(Some(Rgba8Premul {
            r: px[i],
            g: px[i + 1],
            b: px[i + 2],
            a: px[i + 3],
        }))
    }

    /// Straight-alpha RGBA8 copy, the layout image encoders expect.
    pub fn read_straight_pixels(&self) -> HandoffResult<Vec<u8>> {
        let mut px = self.read_pixels()?;
        for p in px.chunks_exact_mut(4) {
            let straight = unpremultiply(Rgba8Premul {
                r: p[0],
                g: p[1],
                b: p[2],
                a: p[3],
            });
            p.copy_from_slice(&straight);
        }
        Ok(px)
    }

    /// Copy into CPU memory, dropping any reference to GPU backing. Keeps the content id.
    pub fn to_software(&self) -> HandoffResult<StaticImage> {
        if let ImageBacking::Software(_) = self.inner.backing {
            return Ok(self.clone());
        }
        Self::from_pixels(self.size(), self.read_pixels()?, self.content_id())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/image.rs"]
mod tests;
