use crate::foundation::core::Rgba8Premul;
use crate::foundation::error::{HandoffError, HandoffResult};

pub type PremulRgba8 = [u8; 4];

/// Premultiplied source-over.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    match src[3] {
        0 => dst,
        255 => src,
        sa => {
            let inv = 255u16 - u16::from(sa);
            let mut out = [0u8; 4];
            for i in 0..4 {
                out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
            }
            out
        }
    }
}

pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> HandoffResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(HandoffError::validation(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Straight-alpha components of a premultiplied color.
pub fn unpremultiply(c: Rgba8Premul) -> [u8; 4] {
    if c.a == 0 {
        return [0; 4];
    }
    let a = u32::from(c.a);
    let un = |v: u8| ((u32::from(v) * 255 + a / 2) / a).min(255) as u8;
    [un(c.r), un(c.g), un(c.b), c.a]
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/raster/blend.rs"]
mod tests;
