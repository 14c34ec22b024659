use crate::resource::ResourceRef;

/// Compositor layer showing a canvas.
///
/// Remembers the resource it last received together with the provider's content generation at
/// that time, so an unchanged canvas is not handed over twice.
#[derive(Debug, Default)]
pub struct TextureLayer {
    texture: Option<(ResourceRef, u64)>,
    is_opaque: bool,
    updates: u64,
    clears: u64,
}

impl TextureLayer {
    pub fn new(is_opaque: bool) -> Self {
        Self {
            is_opaque,
            ..Self::default()
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.is_opaque
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn texture(&self) -> Option<&ResourceRef> {
        self.texture.as_ref().map(|(r, _)| r)
    }

    /// Times a new texture was handed to the layer.
    pub fn texture_updates(&self) -> u64 {
        self.updates
    }

    pub fn clears(&self) -> u64 {
        self.clears
    }

    /// Drop the texture. The next frame is handed over even if unchanged.
    pub fn clear_texture(&mut self) {
        if self.texture.take().is_some() {
            self.clears += 1;
        }
    }

    pub(crate) fn shows(&self, resource: &ResourceRef, generation: u64) -> bool {
        self.texture
            .as_ref()
            .is_some_and(|(r, g)| r.ptr_eq(resource) && *g == generation)
    }

    pub(crate) fn set_texture(&mut self, resource: ResourceRef, generation: u64) {
        self.texture = Some((resource, generation));
        self.updates += 1;
    }
}
