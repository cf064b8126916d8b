use crate::worker::WorkerData;
use crate::{RasterConfig, TILE_SIZE};

const UNIFORM_BITS: u32 = 0xFFFF_FF00;
const PIXELS_PER_TILE: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Screen-aligned stencil buffer stored as 8x8 tiles: one mask word plus 64
/// per-pixel bytes per tile. A mask word with `0xFFFFFF` in the high bits
/// means the tile is uniform, the low byte is the shared value and the
/// per-pixel bytes are stale; a zero mask word means the bytes are
/// authoritative. No other mask word values are legal.
pub struct StencilBuffer {
    values: Vec<u8>,
    masks: Vec<u32>,
    tiles_x: i32,
    tiles_y: i32,
}

impl StencilBuffer {
    pub fn new(config: &RasterConfig) -> Self {
        let tiles_x = config.tiles_x();
        let tiles_y = config.tiles_y();
        let num_tiles = config.num_tiles();
        StencilBuffer {
            values: vec![0; num_tiles * PIXELS_PER_TILE],
            masks: vec![UNIFORM_BITS; num_tiles],
            tiles_x,
            tiles_y,
        }
    }

    /// Tiles per row, the tile index pitch.
    pub fn tiles_x(&self) -> i32 {
        self.tiles_x
    }

    pub fn tiles_y(&self) -> i32 {
        self.tiles_y
    }

    /// Reset every tile to the uniform representation of `value`.
    pub fn set_all(&mut self, value: u8) {
        self.masks.fill(UNIFORM_BITS | value as u32);
    }

    /// `Some(value)` when the tile at tile coordinates (tx, ty) is uniform.
    pub fn tile_value(&self, tx: i32, ty: i32) -> Option<u8> {
        let word = self.masks[(tx + ty * self.tiles_x) as usize];
        if word & UNIFORM_BITS == UNIFORM_BITS {
            Some(word as u8)
        } else {
            None
        }
    }

    /// Stencil value at pixel (x, y), resolving the tile representation.
    pub fn get(&self, x: i32, y: i32) -> u8 {
        let block = self.block_index(x, y);
        let word = self.masks[block];
        if word & UNIFORM_BITS == UNIFORM_BITS {
            word as u8
        } else {
            let ix = (x & (TILE_SIZE - 1)) as usize;
            let iy = (y & (TILE_SIZE - 1)) as usize;
            self.values[block * PIXELS_PER_TILE + iy * TILE_SIZE as usize + ix]
        }
    }

    /// Write one pixel, materializing the tile if it was uniform.
    pub fn set_pixel(&mut self, x: i32, y: i32, value: u8) {
        let block = self.block_index(x, y);
        self.materialize(block);
        let ix = (x & (TILE_SIZE - 1)) as usize;
        let iy = (y & (TILE_SIZE - 1)) as usize;
        self.values[block * PIXELS_PER_TILE + iy * TILE_SIZE as usize + ix] = value;
    }

    #[inline]
    pub(crate) fn block_index(&self, x: i32, y: i32) -> usize {
        debug_assert!(x >= 0 && y >= 0, "stencil access at ({x}, {y})");
        (x / TILE_SIZE + (y / TILE_SIZE) * self.tiles_x) as usize
    }

    #[inline]
    pub(crate) fn mask_word(&self, block: usize) -> u32 {
        self.masks[block]
    }

    #[inline]
    pub(crate) fn block_values(&self, block: usize) -> &[u8] {
        &self.values[block * PIXELS_PER_TILE..(block + 1) * PIXELS_PER_TILE]
    }

    fn materialize(&mut self, block: usize) {
        let word = self.masks[block];
        if word & UNIFORM_BITS == UNIFORM_BITS {
            let value = word as u8;
            self.values[block * PIXELS_PER_TILE..(block + 1) * PIXELS_PER_TILE].fill(value);
            self.masks[block] = 0;
        }
    }
}

/// Commit one worker's coverage into the stencil buffer as
/// `write_value`.
///
/// Fully covered tiles flip straight to the uniform representation.
/// Partial tiles are materialized, merged per pixel and collapsed back to
/// uniform when every pixel ends up holding `write_value`, so runs of
/// identical writes converge back to the cheap representation.
pub fn stencil_write(stencil: &mut StencilBuffer, write_value: u8, thread: &WorkerData) {
    for span in &thread.full_spans {
        let block = stencil.block_index(span.x as i32, span.y as i32);
        for word in &mut stencil.masks[block..block + span.length as usize] {
            *word = UNIFORM_BITS | write_value as u32;
        }
    }

    for block in &thread.partial_blocks {
        let index = stencil.block_index(block.x as i32, block.y as i32);
        stencil.materialize(index);

        let values = &mut stencil.values[index * PIXELS_PER_TILE..(index + 1) * PIXELS_PER_TILE];
        let mut count = 0;
        let mut mask0 = block.mask0;
        let mut mask1 = block.mask1;
        for v in &mut values[0..32] {
            // A pixel that already holds the write value counts towards
            // collapsing even when the coverage bit is clear.
            if mask0 & (1 << 31) != 0 || *v == write_value {
                *v = write_value;
                count += 1;
            }
            mask0 <<= 1;
        }
        for v in &mut values[32..64] {
            if mask1 & (1 << 31) != 0 || *v == write_value {
                *v = write_value;
                count += 1;
            }
            mask1 <<= 1;
        }

        if count == PIXELS_PER_TILE {
            stencil.masks[index] = UNIFORM_BITS | write_value as u32;
        }
    }
}

#[cfg(test)]
use crate::{FullSpan, PartialBlock};

#[cfg(test)]
fn test_thread(spans: Vec<FullSpan>, blocks: Vec<PartialBlock>) -> WorkerData {
    let mut thread = WorkerData::new(0, 1, &RasterConfig::new(64, 64));
    thread.full_spans = spans;
    thread.partial_blocks = blocks;
    thread
}

#[test]
fn span_write_is_uniform() {
    let config = RasterConfig::new(64, 64);
    let mut stencil = StencilBuffer::new(&config);
    stencil.set_all(3);

    let thread = test_thread(vec![FullSpan { x: 8, y: 16, length: 3 }], Vec::new());
    stencil_write(&mut stencil, 7, &thread);

    assert_eq!(stencil.tile_value(0, 2), Some(3));
    assert_eq!(stencil.tile_value(1, 2), Some(7));
    assert_eq!(stencil.tile_value(2, 2), Some(7));
    assert_eq!(stencil.tile_value(3, 2), Some(7));
    assert_eq!(stencil.tile_value(4, 2), Some(3));
    assert_eq!(stencil.get(8, 16), 7);
}

#[test]
fn partial_write_materializes() {
    let config = RasterConfig::new(64, 64);
    let mut stencil = StencilBuffer::new(&config);
    stencil.set_all(3);

    // Left half of the tile covered.
    let thread = test_thread(
        Vec::new(),
        vec![PartialBlock { x: 0, y: 0, mask0: 0xF0F0_F0F0, mask1: 0xF0F0_F0F0 }],
    );
    stencil_write(&mut stencil, 7, &thread);

    assert_eq!(stencil.tile_value(0, 0), None);
    assert_eq!(stencil.get(0, 0), 7);
    assert_eq!(stencil.get(3, 7), 7);
    assert_eq!(stencil.get(4, 0), 3);
    assert_eq!(stencil.get(7, 7), 3);
}

#[test]
fn partial_write_collapses_back_to_uniform() {
    let config = RasterConfig::new(64, 64);
    let mut stencil = StencilBuffer::new(&config);
    stencil.set_all(7);

    // Every non-covered pixel already holds the write value, so the tile
    // must end up uniform again.
    let thread = test_thread(
        Vec::new(),
        vec![PartialBlock { x: 0, y: 0, mask0: 0xF0F0_F0F0, mask1: 0 }],
    );
    stencil_write(&mut stencil, 7, &thread);

    assert_eq!(stencil.tile_value(0, 0), Some(7));
}

#[test]
fn heterogeneous_write_preserves_other_values() {
    let config = RasterConfig::new(64, 64);
    let mut stencil = StencilBuffer::new(&config);
    stencil.set_all(3);

    // One covered pixel leaves the rest of the materialized tile alone.
    let thread =
        test_thread(Vec::new(), vec![PartialBlock { x: 0, y: 0, mask0: 1 << 31, mask1: 0 }]);
    stencil_write(&mut stencil, 9, &thread);

    assert_eq!(stencil.tile_value(0, 0), None);
    assert_eq!(stencil.get(0, 0), 9);
    for y in 0..8 {
        for x in 0..8 {
            if (x, y) != (0, 0) {
                assert_eq!(stencil.get(x, y), 3);
            }
        }
    }
}
