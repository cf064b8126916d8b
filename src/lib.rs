pub mod binner;
pub mod draw;
pub mod setup;
pub mod stencil;
pub mod subsector;
pub mod worker;

pub use euclid::point2;
pub type ScreenPoint = euclid::default::Point2D<f32>;

pub use binner::{bin_normal, bin_subsector};
pub use draw::{BlendMode, FrameBuffer32, FrameBuffer8, Texture32, Texture8};
pub use stencil::{stencil_write, StencilBuffer};
pub use subsector::{subsector_write, SubsectorBuffer};
pub use worker::{WorkerData, Workers};

/// Tiles are 8x8 pixels. Must be a power of two.
pub const TILE_SIZE: i32 = 8;

/// A run of fully covered, contiguous tiles on a single tile row.
///
/// `x` and `y` are the pixel coordinates of the leftmost tile's top left
/// corner, both multiples of 8. `length` is in tiles and never zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FullSpan {
    pub x: u16,
    pub y: u16,
    pub length: u32,
}

/// A single partially covered tile.
///
/// `mask0` covers pixel rows 0..4 and `mask1` rows 4..8, both packed MSB
/// first: bit 31 of `mask0` is the pixel at (x, y), bit 0 of `mask1` is the
/// pixel at (x + 7, y + 7).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PartialBlock {
    pub x: u16,
    pub y: u16,
    pub mask0: u32,
    pub mask1: u32,
}

/// Target dimensions shared by the stencil, subsector and frame buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RasterConfig {
    pub width: i32,
    pub height: i32,
}

impl RasterConfig {
    pub fn new(width: i32, height: i32) -> Self {
        debug_assert!(width > 0 && height > 0);
        RasterConfig { width, height }
    }

    pub fn tiles_x(&self) -> i32 {
        (self.width + TILE_SIZE - 1) / TILE_SIZE
    }

    pub fn tiles_y(&self) -> i32 {
        (self.height + TILE_SIZE - 1) / TILE_SIZE
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles_x() as usize * self.tiles_y() as usize
    }
}

/// Per-triangle interpolation-free parameters consumed by the drawers.
///
/// Alphas are 0..=256 fixed point weights. The binner only reads
/// `subsector_depth`.
#[derive(Copy, Clone, Debug)]
pub struct TriUniforms {
    pub color: u32,
    pub src_alpha: u32,
    pub dest_alpha: u32,
    pub light: u32,
    pub subsector_depth: u32,
}

impl Default for TriUniforms {
    fn default() -> Self {
        TriUniforms {
            color: 0,
            src_alpha: 256,
            dest_alpha: 256,
            light: 256,
            subsector_depth: 0,
        }
    }
}

/// Read-only texture and table handles for the drawers.
#[derive(Copy, Clone, Default)]
pub struct DrawSource<'l> {
    pub texture8: Option<&'l Texture8>,
    pub texture32: Option<&'l Texture32>,
    /// 256 entry palette remap used by the translate blend modes.
    pub translation: Option<&'l [u8; 256]>,
    /// Palette used to expand 8 bit texels for 32 bit translate modes.
    pub palette: Option<&'l [u32; 256]>,
    /// 256x256 `src << 8 | dst` translucency table for 8 bit blending.
    pub blend_table: Option<&'l [u8; 65536]>,
}

/// Immutable descriptor of one triangle, valid for the duration of the
/// draw. Buffers are passed to each pipeline phase separately so that a
/// phase can only touch what it owns.
#[derive(Copy, Clone)]
pub struct TriangleArgs<'l> {
    pub v1: ScreenPoint,
    pub v2: ScreenPoint,
    pub v3: ScreenPoint,
    /// Exclusive clip extents.
    pub clip_right: i32,
    pub clip_bottom: i32,
    pub stencil_test_value: u8,
    pub stencil_write_value: u8,
    /// Selects the subsector binner variant.
    pub subsector_test: bool,
    pub write_stencil: bool,
    pub write_subsector: bool,
    pub uniforms: TriUniforms,
    pub source: DrawSource<'l>,
}

impl<'l> TriangleArgs<'l> {
    pub fn new(v1: ScreenPoint, v2: ScreenPoint, v3: ScreenPoint, config: &RasterConfig) -> Self {
        TriangleArgs {
            v1,
            v2,
            v3,
            clip_right: config.width,
            clip_bottom: config.height,
            stencil_test_value: 0,
            stencil_write_value: 0,
            subsector_test: false,
            write_stencil: false,
            write_subsector: false,
            uniforms: TriUniforms::default(),
            source: DrawSource::default(),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Stats {
    pub triangles: usize,
    pub full_spans: usize,
    pub solid_tiles: usize,
    pub partial_blocks: usize,
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            triangles: 0,
            full_spans: 0,
            solid_tiles: 0,
            partial_blocks: 0,
        }
    }

    pub fn clear(&mut self) {
        *self = Stats::new();
    }

    /// Fold one worker's output for the current triangle into the totals.
    pub fn accumulate(&mut self, thread: &WorkerData) {
        self.full_spans += thread.full_spans.len();
        self.partial_blocks += thread.partial_blocks.len();
        for span in &thread.full_spans {
            self.solid_tiles += span.length as usize;
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Stats::new()
    }
}
