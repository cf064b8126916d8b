// Blend ops and samplers for 8 bit paletted destinations. Palette index 0
// is transparent for the masked modes. The add, sub, revsub and
// add-src-color slots go through the 256x256 translucency table when the
// args carry one; without a table they fall back to saturating index
// arithmetic, which is only meaningful for ramp palettes.

use super::FrameBuffer8;
use crate::worker::WorkerData;
use crate::TriangleArgs;

pub(super) trait Blend {
    fn blend(args: &TriangleArgs, src: u8, dst: u8) -> u8;
}

pub(super) trait Sampler {
    fn sample(args: &TriangleArgs, x: i32, y: i32) -> u8;
}

pub(super) struct Opaque;
pub(super) struct Masked;
pub(super) struct AddClamp;
pub(super) struct SubClamp;
pub(super) struct RevSubClamp;
pub(super) struct Shaded;
pub(super) struct AddSrcColor;

impl Blend for Opaque {
    #[inline]
    fn blend(_args: &TriangleArgs, src: u8, _dst: u8) -> u8 {
        src
    }
}

impl Blend for Masked {
    #[inline]
    fn blend(_args: &TriangleArgs, src: u8, dst: u8) -> u8 {
        if src == 0 {
            dst
        } else {
            src
        }
    }
}

#[inline]
fn table_blend(args: &TriangleArgs, src: u8, dst: u8, fallback: u8) -> u8 {
    match args.source.blend_table {
        Some(table) => table[(src as usize) << 8 | dst as usize],
        None => fallback,
    }
}

impl Blend for AddClamp {
    #[inline]
    fn blend(args: &TriangleArgs, src: u8, dst: u8) -> u8 {
        table_blend(args, src, dst, dst.saturating_add(src))
    }
}

impl Blend for SubClamp {
    #[inline]
    fn blend(args: &TriangleArgs, src: u8, dst: u8) -> u8 {
        table_blend(args, src, dst, dst.saturating_sub(src))
    }
}

impl Blend for RevSubClamp {
    #[inline]
    fn blend(args: &TriangleArgs, src: u8, dst: u8) -> u8 {
        table_blend(args, src, dst, src.saturating_sub(dst))
    }
}

impl Blend for Shaded {
    /// `src` is a coverage value from the shaded sampler, not an index.
    #[inline]
    fn blend(args: &TriangleArgs, src: u8, dst: u8) -> u8 {
        if src >= 128 {
            args.uniforms.color as u8
        } else {
            dst
        }
    }
}

impl Blend for AddSrcColor {
    #[inline]
    fn blend(args: &TriangleArgs, src: u8, dst: u8) -> u8 {
        table_blend(args, src, dst, dst.saturating_add(src))
    }
}

pub(super) struct FillSampler;
pub(super) struct TextureSampler;
pub(super) struct TranslatedSampler;
pub(super) struct ShadedSampler;
pub(super) struct SkycapSampler;

impl Sampler for FillSampler {
    #[inline]
    fn sample(args: &TriangleArgs, _x: i32, _y: i32) -> u8 {
        args.uniforms.color as u8
    }
}

impl Sampler for TextureSampler {
    #[inline]
    fn sample(args: &TriangleArgs, x: i32, y: i32) -> u8 {
        match args.source.texture8 {
            Some(texture) => texture.fetch(x, y),
            None => args.uniforms.color as u8,
        }
    }
}

impl Sampler for TranslatedSampler {
    #[inline]
    fn sample(args: &TriangleArgs, x: i32, y: i32) -> u8 {
        let texel = match args.source.texture8 {
            Some(texture) => texture.fetch(x, y),
            None => args.uniforms.color as u8,
        };
        match args.source.translation {
            Some(translation) => translation[texel as usize],
            None => texel,
        }
    }
}

impl Sampler for ShadedSampler {
    /// Samples the texture as a coverage map. Without a texture every
    /// pixel counts as fully covered.
    #[inline]
    fn sample(args: &TriangleArgs, x: i32, y: i32) -> u8 {
        match args.source.texture8 {
            Some(texture) => texture.fetch(x, y),
            None => 255,
        }
    }
}

impl Sampler for SkycapSampler {
    #[inline]
    fn sample(args: &TriangleArgs, x: i32, y: i32) -> u8 {
        match args.source.texture8 {
            Some(texture) => texture.fetch_capped(x, y),
            None => args.uniforms.color as u8,
        }
    }
}

pub(super) fn execute<B: Blend, S: Sampler>(
    args: &TriangleArgs,
    frame: &mut FrameBuffer8,
    thread: &WorkerData,
) {
    let pitch = frame.pitch();
    let data = frame.data_mut();

    for span in &thread.full_spans {
        let mut offset = span.y as usize * pitch + span.x as usize;
        for iy in 0..8 {
            let y = span.y as i32 + iy;
            for ix in 0..span.length as i32 * 8 {
                let x = span.x as i32 + ix;
                let dst = &mut data[offset + ix as usize];
                *dst = B::blend(args, S::sample(args, x, y), *dst);
            }
            offset += pitch;
        }
    }

    for block in &thread.partial_blocks {
        let mut offset = block.y as usize * pitch + block.x as usize;
        for (row, block_mask) in [(0, block.mask0), (4, block.mask1)] {
            let mut mask = block_mask;
            for iy in row..row + 4 {
                let y = block.y as i32 + iy;
                for ix in 0..8 {
                    if mask & (1 << 31) != 0 {
                        let x = block.x as i32 + ix;
                        let dst = &mut data[offset + ix as usize];
                        *dst = B::blend(args, S::sample(args, x, y), *dst);
                    }
                    mask <<= 1;
                }
                offset += pitch;
            }
        }
    }
}

#[cfg(test)]
use crate::binner::bin_normal;
#[cfg(test)]
use crate::stencil::StencilBuffer;
#[cfg(test)]
use crate::{point2, BlendMode, RasterConfig};

#[cfg(test)]
fn test_args<'l>(config: &RasterConfig) -> TriangleArgs<'l> {
    let mut args =
        TriangleArgs::new(point2(1.0, 1.0), point2(4.0, 30.0), point2(30.0, 6.0), config);
    args.uniforms.color = 9;
    args
}

#[cfg(test)]
fn bin(args: &TriangleArgs, config: &RasterConfig) -> WorkerData {
    let stencil = StencilBuffer::new(config);
    let mut thread = WorkerData::new(0, 1, config);
    bin_normal(args, &stencil, &mut thread);
    thread
}

#[test]
fn fill_copy_writes_the_binned_pixels() {
    let config = RasterConfig::new(32, 32);
    let args = test_args(&config);
    let thread = bin(&args, &config);
    let mut frame = FrameBuffer8::new(&config);

    super::FILL_8[BlendMode::Copy as usize](&args, &mut frame, &thread);

    let mut drawn = 0;
    for y in 0..32 {
        for x in 0..32 {
            let value = frame.get(x, y);
            assert!(value == 0 || value == 9);
            if value == 9 {
                drawn += 1;
            }
        }
    }
    assert!(drawn > 0);
}

#[test]
fn masked_skips_transparent_texels() {
    let config = RasterConfig::new(32, 32);
    // Checkerboard of transparent and solid texels.
    let texture = super::Texture8::new(2, 2, vec![0, 5, 5, 0]);
    let mut args = test_args(&config);
    args.source.texture8 = Some(&texture);
    let thread = bin(&args, &config);

    let mut frame = FrameBuffer8::new(&config);
    frame.fill(1);
    super::DRAW_8[BlendMode::AlphaBlend as usize](&args, &mut frame, &thread);

    for y in 0..32 {
        for x in 0..32 {
            let expected = if (x + y) % 2 == 1 { [1, 5] } else { [1, 1] };
            assert!(expected.contains(&frame.get(x, y)), "at ({x}, {y})");
        }
    }
}

#[test]
fn add_clamp_falls_back_to_saturating_add() {
    let config = RasterConfig::new(32, 32);
    let args = test_args(&config);
    let thread = bin(&args, &config);

    let mut frame = FrameBuffer8::new(&config);
    frame.fill(250);
    super::FILL_8[BlendMode::Add as usize](&args, &mut frame, &thread);

    for y in 0..32 {
        for x in 0..32 {
            let value = frame.get(x, y);
            assert!(value == 250 || value == 255);
        }
    }
}

#[test]
fn add_clamp_uses_the_blend_table() {
    let config = RasterConfig::new(32, 32);
    let mut table = vec![0u8; 65536].into_boxed_slice();
    table[(9usize) << 8 | 3] = 77;
    let table: &[u8; 65536] = (&*table).try_into().unwrap();

    let mut args = test_args(&config);
    args.source.blend_table = Some(table);
    let thread = bin(&args, &config);

    let mut frame = FrameBuffer8::new(&config);
    frame.fill(3);
    super::FILL_8[BlendMode::Add as usize](&args, &mut frame, &thread);

    for y in 0..32 {
        for x in 0..32 {
            let value = frame.get(x, y);
            assert!(value == 3 || value == 77);
        }
    }
}

#[test]
fn translate_remaps_indices() {
    let config = RasterConfig::new(32, 32);
    let texture = super::Texture8::new(1, 1, vec![4]);
    let mut translation = [0u8; 256];
    translation[4] = 200;

    let mut args = test_args(&config);
    args.source.texture8 = Some(&texture);
    args.source.translation = Some(&translation);
    let thread = bin(&args, &config);

    let mut frame = FrameBuffer8::new(&config);
    super::DRAW_8[BlendMode::TranslateCopy as usize](&args, &mut frame, &thread);

    let mut drawn = 0;
    for y in 0..32 {
        for x in 0..32 {
            let value = frame.get(x, y);
            assert!(value == 0 || value == 200);
            if value == 200 {
                drawn += 1;
            }
        }
    }
    assert!(drawn > 0);
}
