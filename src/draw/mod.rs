mod draw32;
mod draw8;

use crate::worker::WorkerData;
use crate::{RasterConfig, TriangleArgs};

/// Blend mode slots, in table order. The slot order is part of the
/// external contract and must not change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlendMode {
    Copy,
    AlphaBlend,
    AddSolid,
    Add,
    Sub,
    RevSub,
    Stencil,
    Shaded,
    TranslateCopy,
    TranslateAlphaBlend,
    TranslateAdd,
    TranslateSub,
    TranslateRevSub,
    AddSrcColorOneMinusSrcColor,
    Skycap,
}

pub const NUM_BLEND_MODES: usize = 15;

pub type DrawerFn8 = fn(&TriangleArgs, &mut FrameBuffer8, &WorkerData);
pub type DrawerFn32 = fn(&TriangleArgs, &mut FrameBuffer32, &WorkerData);

/// Textured drawers for 8 bit paletted destinations.
pub static DRAW_8: [DrawerFn8; NUM_BLEND_MODES] = [
    draw8::execute::<draw8::Opaque, draw8::TextureSampler>, // Copy
    draw8::execute::<draw8::Masked, draw8::TextureSampler>, // AlphaBlend
    draw8::execute::<draw8::AddClamp, draw8::TextureSampler>, // AddSolid
    draw8::execute::<draw8::AddClamp, draw8::TextureSampler>, // Add
    draw8::execute::<draw8::SubClamp, draw8::TextureSampler>, // Sub
    draw8::execute::<draw8::RevSubClamp, draw8::TextureSampler>, // RevSub
    draw8::execute::<draw8::Shaded, draw8::ShadedSampler>,  // Stencil
    draw8::execute::<draw8::Shaded, draw8::ShadedSampler>,  // Shaded
    draw8::execute::<draw8::Opaque, draw8::TranslatedSampler>, // TranslateCopy
    draw8::execute::<draw8::Masked, draw8::TranslatedSampler>, // TranslateAlphaBlend
    draw8::execute::<draw8::AddClamp, draw8::TranslatedSampler>, // TranslateAdd
    draw8::execute::<draw8::SubClamp, draw8::TranslatedSampler>, // TranslateSub
    draw8::execute::<draw8::RevSubClamp, draw8::TranslatedSampler>, // TranslateRevSub
    draw8::execute::<draw8::AddSrcColor, draw8::TextureSampler>, // AddSrcColorOneMinusSrcColor
    draw8::execute::<draw8::Opaque, draw8::SkycapSampler>,  // Skycap
];

/// Constant color drawers for 8 bit paletted destinations.
pub static FILL_8: [DrawerFn8; NUM_BLEND_MODES] = [
    draw8::execute::<draw8::Opaque, draw8::FillSampler>,    // Copy
    draw8::execute::<draw8::Masked, draw8::FillSampler>,    // AlphaBlend
    draw8::execute::<draw8::AddClamp, draw8::FillSampler>,  // AddSolid
    draw8::execute::<draw8::AddClamp, draw8::FillSampler>,  // Add
    draw8::execute::<draw8::SubClamp, draw8::FillSampler>,  // Sub
    draw8::execute::<draw8::RevSubClamp, draw8::FillSampler>, // RevSub
    draw8::execute::<draw8::Shaded, draw8::ShadedSampler>,  // Stencil
    draw8::execute::<draw8::Shaded, draw8::ShadedSampler>,  // Shaded
    draw8::execute::<draw8::Opaque, draw8::TranslatedSampler>, // TranslateCopy
    draw8::execute::<draw8::Masked, draw8::TranslatedSampler>, // TranslateAlphaBlend
    draw8::execute::<draw8::AddClamp, draw8::TranslatedSampler>, // TranslateAdd
    draw8::execute::<draw8::SubClamp, draw8::TranslatedSampler>, // TranslateSub
    draw8::execute::<draw8::RevSubClamp, draw8::TranslatedSampler>, // TranslateRevSub
    draw8::execute::<draw8::AddSrcColor, draw8::FillSampler>, // AddSrcColorOneMinusSrcColor
    draw8::execute::<draw8::Opaque, draw8::FillSampler>,    // Skycap
];

/// Textured drawers for 32 bit RGBA destinations.
pub static DRAW_32: [DrawerFn32; NUM_BLEND_MODES] = [
    draw32::execute::<draw32::Opaque, draw32::TextureSampler>, // Copy
    draw32::execute::<draw32::Masked, draw32::TextureSampler>, // AlphaBlend
    draw32::execute::<draw32::AddClamp, draw32::TextureSampler>, // AddSolid
    draw32::execute::<draw32::AddClamp, draw32::TextureSampler>, // Add
    draw32::execute::<draw32::SubClamp, draw32::TextureSampler>, // Sub
    draw32::execute::<draw32::RevSubClamp, draw32::TextureSampler>, // RevSub
    draw32::execute::<draw32::Shaded, draw32::ShadedSampler>, // Stencil
    draw32::execute::<draw32::Shaded, draw32::ShadedSampler>, // Shaded
    draw32::execute::<draw32::Opaque, draw32::TranslatedSampler>, // TranslateCopy
    draw32::execute::<draw32::Masked, draw32::TranslatedSampler>, // TranslateAlphaBlend
    draw32::execute::<draw32::AddClamp, draw32::TranslatedSampler>, // TranslateAdd
    draw32::execute::<draw32::SubClamp, draw32::TranslatedSampler>, // TranslateSub
    draw32::execute::<draw32::RevSubClamp, draw32::TranslatedSampler>, // TranslateRevSub
    draw32::execute::<draw32::AddSrcColor, draw32::TextureSampler>, // AddSrcColorOneMinusSrcColor
    draw32::execute::<draw32::Opaque, draw32::SkycapSampler>, // Skycap
];

/// Constant color drawers for 32 bit RGBA destinations.
pub static FILL_32: [DrawerFn32; NUM_BLEND_MODES] = [
    draw32::execute::<draw32::Opaque, draw32::FillSampler>, // Copy
    draw32::execute::<draw32::Masked, draw32::FillSampler>, // AlphaBlend
    draw32::execute::<draw32::AddClamp, draw32::FillSampler>, // AddSolid
    draw32::execute::<draw32::AddClamp, draw32::FillSampler>, // Add
    draw32::execute::<draw32::SubClamp, draw32::FillSampler>, // Sub
    draw32::execute::<draw32::RevSubClamp, draw32::FillSampler>, // RevSub
    draw32::execute::<draw32::Shaded, draw32::ShadedSampler>, // Stencil
    draw32::execute::<draw32::Shaded, draw32::ShadedSampler>, // Shaded
    draw32::execute::<draw32::Opaque, draw32::TranslatedSampler>, // TranslateCopy
    draw32::execute::<draw32::Masked, draw32::TranslatedSampler>, // TranslateAlphaBlend
    draw32::execute::<draw32::AddClamp, draw32::TranslatedSampler>, // TranslateAdd
    draw32::execute::<draw32::SubClamp, draw32::TranslatedSampler>, // TranslateSub
    draw32::execute::<draw32::RevSubClamp, draw32::TranslatedSampler>, // TranslateRevSub
    draw32::execute::<draw32::AddSrcColor, draw32::FillSampler>, // AddSrcColorOneMinusSrcColor
    draw32::execute::<draw32::Opaque, draw32::FillSampler>, // Skycap
];

pub struct Texture8 {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
}

impl Texture8 {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), width * height);
        Texture8 { pixels, width, height }
    }

    /// Tiled fetch. Coordinates are non-negative screen positions.
    #[inline]
    pub fn fetch(&self, x: i32, y: i32) -> u8 {
        let u = x as usize % self.width;
        let v = y as usize % self.height;
        self.pixels[v * self.width + u]
    }

    /// Tiled horizontally, clamped to the last row vertically.
    #[inline]
    pub fn fetch_capped(&self, x: i32, y: i32) -> u8 {
        let u = x as usize % self.width;
        let v = (y as usize).min(self.height - 1);
        self.pixels[v * self.width + u]
    }
}

pub struct Texture32 {
    pixels: Vec<u32>,
    width: usize,
    height: usize,
}

impl Texture32 {
    pub fn new(width: usize, height: usize, pixels: Vec<u32>) -> Self {
        assert_eq!(pixels.len(), width * height);
        Texture32 { pixels, width, height }
    }

    #[inline]
    pub fn fetch(&self, x: i32, y: i32) -> u32 {
        let u = x as usize % self.width;
        let v = y as usize % self.height;
        self.pixels[v * self.width + u]
    }

    #[inline]
    pub fn fetch_capped(&self, x: i32, y: i32) -> u32 {
        let u = x as usize % self.width;
        let v = (y as usize).min(self.height - 1);
        self.pixels[v * self.width + u]
    }
}

pub struct FrameBuffer8 {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl FrameBuffer8 {
    pub fn new(config: &RasterConfig) -> Self {
        FrameBuffer8 {
            data: vec![0; (config.width * config.height) as usize],
            width: config.width as usize,
            height: config.height as usize,
        }
    }

    pub fn pitch(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    pub fn get(&self, x: i32, y: i32) -> u8 {
        debug_assert!((x as usize) < self.width && (y as usize) < self.height);
        self.data[y as usize * self.width + x as usize]
    }

    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

pub struct FrameBuffer32 {
    data: Vec<u32>,
    width: usize,
    height: usize,
}

impl FrameBuffer32 {
    pub fn new(config: &RasterConfig) -> Self {
        FrameBuffer32 {
            data: vec![0; (config.width * config.height) as usize],
            width: config.width as usize,
            height: config.height as usize,
        }
    }

    pub fn pitch(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn fill(&mut self, value: u32) {
        self.data.fill(value);
    }

    pub fn get(&self, x: i32, y: i32) -> u32 {
        debug_assert!((x as usize) < self.width && (y as usize) < self.height);
        self.data[y as usize * self.width + x as usize]
    }

    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut [u32] {
        &mut self.data
    }
}

#[test]
fn blend_mode_slot_order_is_the_contract() {
    assert_eq!(BlendMode::Copy as usize, 0);
    assert_eq!(BlendMode::AlphaBlend as usize, 1);
    assert_eq!(BlendMode::AddSolid as usize, 2);
    assert_eq!(BlendMode::Add as usize, 3);
    assert_eq!(BlendMode::Sub as usize, 4);
    assert_eq!(BlendMode::RevSub as usize, 5);
    assert_eq!(BlendMode::Stencil as usize, 6);
    assert_eq!(BlendMode::Shaded as usize, 7);
    assert_eq!(BlendMode::TranslateCopy as usize, 8);
    assert_eq!(BlendMode::TranslateAlphaBlend as usize, 9);
    assert_eq!(BlendMode::TranslateAdd as usize, 10);
    assert_eq!(BlendMode::TranslateSub as usize, 11);
    assert_eq!(BlendMode::TranslateRevSub as usize, 12);
    assert_eq!(BlendMode::AddSrcColorOneMinusSrcColor as usize, 13);
    assert_eq!(BlendMode::Skycap as usize, 14);
}
