use copyless::VecHelper;

use crate::setup::TriangleSetup;
use crate::stencil::StencilBuffer;
use crate::subsector::SubsectorBuffer;
use crate::worker::WorkerData;
use crate::{FullSpan, PartialBlock, TriangleArgs, TILE_SIZE};

/// Bin one triangle with the equality stencil policy: uniform tiles whose
/// value differs from the test value reject whole, heterogeneous tiles
/// test `byte == test_value` per pixel.
pub fn bin_normal(args: &TriangleArgs, stencil: &StencilBuffer, thread: &mut WorkerData) {
    profiling::scope!("bin_normal");
    bin_impl::<false>(args, stencil, None, thread);
}

/// Bin one triangle with the depth-style stencil policy (`>=` per pixel,
/// `<` rejects uniform tiles) and a per-pixel subsector test that applies
/// even to geometrically full tiles.
pub fn bin_subsector(
    args: &TriangleArgs,
    stencil: &StencilBuffer,
    subsector: &SubsectorBuffer,
    thread: &mut WorkerData,
) {
    profiling::scope!("bin_subsector");
    bin_impl::<true>(args, stencil, Some(subsector), thread);
}

fn bin_impl<const SUBSECTOR: bool>(
    args: &TriangleArgs,
    stencil: &StencilBuffer,
    subsector: Option<&SubsectorBuffer>,
    thread: &mut WorkerData,
) {
    thread.full_spans.clear();
    thread.partial_blocks.clear();

    let Some(tri) = TriangleSetup::new(args.v1, args.v2, args.v3, args.clip_right, args.clip_bottom)
    else {
        return;
    };

    let q = TILE_SIZE;
    let test_value = args.stencil_test_value;
    let depth = args.uniforms.subsector_depth;
    let stencil_pitch = stencil.tiles_x();

    let (sub_data, sub_pitch) = if SUBSECTOR {
        let sub = subsector.unwrap();
        (sub.data(), sub.pitch())
    } else {
        (&[][..], 0)
    };

    // First tile row handled by this worker. Tile row r belongs to worker
    // r mod num_cores; this is the only thing that keeps the workers'
    // outputs disjoint.
    let core_skip = (thread.core - tri.min_y / q).rem_euclid(thread.num_cores);
    let min_y = tri.min_y + core_skip * q;
    thread.start_x = tri.min_x;
    thread.start_y = min_y;

    let mut span = FullSpan { x: 0, y: 0, length: 0 };

    let mut y = min_y;
    while y < tri.max_y {
        for x in (tri.min_x..tri.max_x).step_by(q as usize) {
            let x0 = x << 4;
            let x1 = (x + q - 1) << 4;
            let y0 = y << 4;
            let y1 = (y + q - 1) << 4;

            let (a, b, c) = tri.corner_masks(x0, x1, y0, y1);

            let block = (x / q + (y / q) * stencil_pitch) as usize;
            let mask_word = stencil.mask_word(block);
            let is_single = mask_word & 0xFFFF_FF00 == 0xFFFF_FF00;
            let single_value = mask_word as u8;
            let skip_block = if SUBSECTOR {
                is_single && single_value < test_value
            } else {
                is_single && single_value != test_value
            };

            // Reject tiles entirely outside an edge or failing the whole
            // tile stencil test.
            if a == 0 || b == 0 || c == 0 || skip_block {
                flush_span(&mut span, thread);
                continue;
            }

            // Accept the whole tile when all corners are inside all three
            // edges, the tile does not cross the clip edges and the
            // stencil passes for all 64 pixels at once.
            if a == 0xF
                && b == 0xF
                && c == 0xF
                && x + q <= args.clip_right
                && y + q <= args.clip_bottom
                && is_single
            {
                if !SUBSECTOR {
                    extend_span(&mut span, x, y);
                    continue;
                }

                // A geometrically full tile still has to pass the
                // subsector test pixel by pixel.
                let mut offset = y as usize * sub_pitch + x as usize;
                let mut mask0 = 0u32;
                let mut mask1 = 0u32;
                for _ in 0..4 {
                    for value in &sub_data[offset..offset + 8] {
                        mask0 = (mask0 << 1) | (*value >= depth) as u32;
                    }
                    offset += sub_pitch;
                }
                for _ in 0..4 {
                    for value in &sub_data[offset..offset + 8] {
                        mask1 = (mask1 << 1) | (*value >= depth) as u32;
                    }
                    offset += sub_pitch;
                }

                emit(&mut span, thread, x, y, mask0, mask1);
                continue;
            }

            // Partially covered tile. The half space values step by
            // -fdy per pixel to the right and +fdx per row down.
            let (mut cy1, mut cy2, mut cy3) = tri.row_start(x0, y0);
            let stencil_values = stencil.block_values(block);
            let mut sub_offset = if SUBSECTOR { y as usize * sub_pitch + x as usize } else { 0 };

            let mut mask0 = 0u32;
            let mut mask1 = 0u32;
            for iy in 0..q {
                let mut cx1 = cy1;
                let mut cx2 = cy2;
                let mut cx3 = cy3;

                for ix in 0..q {
                    // Uniform tiles that got this far pass the stencil
                    // test outright; their per-pixel bytes are stale and
                    // must not be read.
                    let stencil_pass = is_single
                        || if SUBSECTOR {
                            stencil_values[(ix + iy * q) as usize] >= test_value
                        } else {
                            stencil_values[(ix + iy * q) as usize] == test_value
                        };
                    let covered = cx1 > 0
                        && cx2 > 0
                        && cx3 > 0
                        && x + ix < args.clip_right
                        && y + iy < args.clip_bottom
                        && stencil_pass
                        && (!SUBSECTOR || sub_data[sub_offset + ix as usize] >= depth);

                    if iy < 4 {
                        mask0 = (mask0 << 1) | covered as u32;
                    } else {
                        mask1 = (mask1 << 1) | covered as u32;
                    }

                    cx1 -= tri.fdy12;
                    cx2 -= tri.fdy23;
                    cx3 -= tri.fdy31;
                }

                cy1 += tri.fdx12;
                cy2 += tri.fdx23;
                cy3 += tri.fdx31;
                if SUBSECTOR {
                    sub_offset += sub_pitch;
                }
            }

            emit(&mut span, thread, x, y, mask0, mask1);
        }

        flush_span(&mut span, thread);
        y += q * thread.num_cores;
    }
}

/// Classify a computed coverage mask: full masks grow the current span
/// (the corner test can miss full coverage when a heterogeneous stencil
/// tile passes everywhere), empty masks emit nothing, anything else
/// becomes a partial block.
#[inline]
fn emit(span: &mut FullSpan, thread: &mut WorkerData, x: i32, y: i32, mask0: u32, mask1: u32) {
    if mask0 != !0 || mask1 != !0 {
        flush_span(span, thread);
        if mask0 == 0 && mask1 == 0 {
            return;
        }
        thread
            .partial_blocks
            .alloc()
            .init(PartialBlock { x: x as u16, y: y as u16, mask0, mask1 });
    } else {
        extend_span(span, x, y);
    }
}

#[inline]
fn flush_span(span: &mut FullSpan, thread: &mut WorkerData) {
    if span.length != 0 {
        thread.full_spans.alloc().init(*span);
        span.length = 0;
    }
}

#[inline]
fn extend_span(span: &mut FullSpan, x: i32, y: i32) {
    if span.length != 0 {
        span.length += 1;
    } else {
        *span = FullSpan { x: x as u16, y: y as u16, length: 1 };
    }
}

#[cfg(test)]
use crate::{point2, RasterConfig};
#[cfg(test)]
use std::collections::HashSet;

/// Expands a worker's span/block output into pixel coordinates, asserting
/// that no pixel is emitted twice.
#[cfg(test)]
fn coverage(thread: &WorkerData) -> HashSet<(i32, i32)> {
    let mut pixels = HashSet::new();
    for span in &thread.full_spans {
        assert!(span.length > 0);
        assert_eq!(span.x % 8, 0);
        assert_eq!(span.y % 8, 0);
        for iy in 0..8 {
            for ix in 0..span.length as i32 * 8 {
                let inserted = pixels.insert((span.x as i32 + ix, span.y as i32 + iy));
                assert!(inserted, "double emission at {:?}", (span.x as i32 + ix, span.y as i32 + iy));
            }
        }
    }
    for block in &thread.partial_blocks {
        assert_eq!(block.x % 8, 0);
        assert_eq!(block.y % 8, 0);
        assert!(block.mask0 != 0 || block.mask1 != 0);
        assert!(block.mask0 != !0 || block.mask1 != !0);
        for (row, mut mask) in [(0, block.mask0), (4, block.mask1)] {
            for iy in row..row + 4 {
                for ix in 0..8 {
                    if mask & (1 << 31) != 0 {
                        let inserted = pixels.insert((block.x as i32 + ix, block.y as i32 + iy));
                        assert!(inserted, "double emission at {:?}", (block.x as i32 + ix, block.y as i32 + iy));
                    }
                    mask <<= 1;
                }
            }
        }
    }
    pixels
}

/// Brute force per-pixel rasterization with the same edge equations, the
/// ground truth the tile walk must reproduce.
#[cfg(test)]
fn reference_coverage(args: &TriangleArgs, stencil: &StencilBuffer) -> HashSet<(i32, i32)> {
    let mut pixels = HashSet::new();
    let Some(tri) = TriangleSetup::new(args.v1, args.v2, args.v3, args.clip_right, args.clip_bottom)
    else {
        return pixels;
    };
    for y in 0..args.clip_bottom {
        for x in 0..args.clip_right {
            let e1 = tri.c1 + tri.dx12 * (y << 4) - tri.dy12 * (x << 4);
            let e2 = tri.c2 + tri.dx23 * (y << 4) - tri.dy23 * (x << 4);
            let e3 = tri.c3 + tri.dx31 * (y << 4) - tri.dy31 * (x << 4);
            if e1 > 0 && e2 > 0 && e3 > 0 && stencil.get(x, y) == args.stencil_test_value {
                pixels.insert((x, y));
            }
        }
    }
    pixels
}

#[cfg(test)]
fn bin_all_cores(args: &TriangleArgs, stencil: &StencilBuffer, num_cores: i32) -> HashSet<(i32, i32)> {
    let config = RasterConfig::new(args.clip_right, args.clip_bottom);
    let mut pixels = HashSet::new();
    for core in 0..num_cores {
        let mut thread = WorkerData::new(core, num_cores, &config);
        bin_normal(args, stencil, &mut thread);
        for pixel in coverage(&thread) {
            // The tile row partition: workers may not overlap.
            let inserted = pixels.insert(pixel);
            assert!(inserted, "workers overlap at {pixel:?}");
            assert_eq!((pixel.1 / 8) % num_cores, core);
        }
    }
    pixels
}

#[test]
fn screen_filling_triangle() {
    let config = RasterConfig::new(100, 100);
    let stencil = StencilBuffer::new(&config);
    let args =
        TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 200.0), point2(200.0, 0.0), &config);

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);

    assert_eq!(coverage(&thread), reference_coverage(&args, &stencil));
    // Interior rows must coalesce into multi-tile spans, and the tiles
    // crossing the clip edges must come out as partial blocks.
    assert!(thread.full_spans.iter().any(|span| span.length > 1));
    assert!(!thread.partial_blocks.is_empty());
    for pixel in coverage(&thread) {
        assert!(pixel.0 < 100 && pixel.1 < 100);
    }
}

#[test]
fn exactly_top_left_pixel() {
    let config = RasterConfig::new(64, 64);
    let stencil = StencilBuffer::new(&config);
    let args = TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 1.0), point2(1.0, 0.0), &config);

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);

    let pixels = coverage(&thread);
    assert!(pixels.contains(&(0, 0)));
    assert!(!pixels.contains(&(1, 0)));
    assert!(!pixels.contains(&(0, 1)));
    assert_eq!(pixels.len(), 1);
}

#[test]
fn quad_shares_the_diagonal() {
    let config = RasterConfig::new(64, 64);
    let stencil = StencilBuffer::new(&config);

    // Two triangles of a quad: the union covers the quad exactly once,
    // the shared diagonal belongs to one of them.
    let upper =
        TriangleArgs::new(point2(0.0, 0.0), point2(16.0, 16.0), point2(16.0, 0.0), &config);
    let lower =
        TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 16.0), point2(16.0, 16.0), &config);

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&upper, &stencil, &mut thread);
    let a = coverage(&thread);
    bin_normal(&lower, &stencil, &mut thread);
    let b = coverage(&thread);

    assert!(a.is_disjoint(&b), "shared edge pixels covered twice");
    let union: HashSet<_> = a.union(&b).copied().collect();
    for y in 0..16 {
        for x in 0..16 {
            assert!(union.contains(&(x, y)), "gap at ({x}, {y})");
        }
    }
    assert_eq!(union.len(), 256);
}

#[test]
fn adjacent_triangles_never_double_hit() {
    let config = RasterConfig::new(48, 48);
    let stencil = StencilBuffer::new(&config);

    // A diagonal shared edge with non-integer endpoints, traversed in
    // opposite directions by the two triangles.
    let left =
        TriangleArgs::new(point2(3.5, 2.25), point2(11.25, 40.5), point2(37.0, 9.75), &config);
    let right =
        TriangleArgs::new(point2(37.0, 9.75), point2(11.25, 40.5), point2(44.5, 43.0), &config);

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&left, &stencil, &mut thread);
    let a = coverage(&thread);
    assert_eq!(a, reference_coverage(&left, &stencil));
    bin_normal(&right, &stencil, &mut thread);
    let b = coverage(&thread);
    assert_eq!(b, reference_coverage(&right, &stencil));

    assert!(a.is_disjoint(&b));
}

#[test]
fn tile_row_partition() {
    let config = RasterConfig::new(64, 64);
    let stencil = StencilBuffer::new(&config);
    let args = TriangleArgs::new(point2(1.0, 2.0), point2(8.0, 60.0), point2(60.0, 10.0), &config);

    let single = bin_all_cores(&args, &stencil, 1);
    assert_eq!(single, reference_coverage(&args, &stencil));
    for num_cores in [2, 4, 8] {
        assert_eq!(bin_all_cores(&args, &stencil, num_cores), single, "{num_cores} cores");
    }
}

#[test]
fn stencil_reject() {
    let config = RasterConfig::new(64, 64);
    let mut stencil = StencilBuffer::new(&config);
    stencil.set_all(3);

    let mut args = TriangleArgs::new(point2(1.0, 1.0), point2(1.0, 7.0), point2(7.0, 1.0), &config);
    args.stencil_test_value = 5;

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);
    assert!(thread.full_spans.is_empty());
    assert!(thread.partial_blocks.is_empty());
}

#[test]
fn stencil_partial_pass() {
    let config = RasterConfig::new(64, 64);
    let mut stencil = StencilBuffer::new(&config);
    stencil.set_all(3);
    // Left half of tile (0, 0) passes the test.
    for y in 0..8 {
        for x in 0..4 {
            stencil.set_pixel(x, y, 5);
        }
    }

    let mut args =
        TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 32.0), point2(32.0, 0.0), &config);
    args.stencil_test_value = 5;

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);

    assert!(thread.full_spans.is_empty());
    assert_eq!(
        thread.partial_blocks,
        vec![PartialBlock { x: 0, y: 0, mask0: 0xF0F0_F0F0, mask1: 0xF0F0_F0F0 }]
    );
}

#[test]
fn uniform_and_materialized_tiles_are_equivalent() {
    let config = RasterConfig::new(64, 64);

    let mut uniform = StencilBuffer::new(&config);
    uniform.set_all(5);

    // The same content with every tile materialized.
    let mut materialized = StencilBuffer::new(&config);
    materialized.set_all(0);
    for y in 0..64 {
        for x in 0..64 {
            materialized.set_pixel(x, y, 5);
        }
    }

    let mut args =
        TriangleArgs::new(point2(2.0, 1.0), point2(10.0, 60.0), point2(55.0, 20.0), &config);
    args.stencil_test_value = 5;

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &uniform, &mut thread);
    let a = coverage(&thread);
    bin_normal(&args, &materialized, &mut thread);
    let b = coverage(&thread);
    assert_eq!(a, b);
}

#[test]
fn subsector_depth_test() {
    let config = RasterConfig::new(64, 64);
    let stencil = StencilBuffer::new(&config);
    let mut subsector = SubsectorBuffer::new(&config);
    subsector.fill(10);

    let mut args =
        TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 32.0), point2(32.0, 0.0), &config);
    let mut thread = WorkerData::new(0, 1, &config);

    // Existing value 10 >= depth 5: everything passes.
    args.uniforms.subsector_depth = 5;
    bin_subsector(&args, &stencil, &subsector, &mut thread);
    let pass = coverage(&thread);
    assert!(pass.contains(&(0, 0)));
    assert!(!thread.full_spans.is_empty());

    // Depth 11 fails every pixel.
    args.uniforms.subsector_depth = 11;
    bin_subsector(&args, &stencil, &subsector, &mut thread);
    assert!(thread.full_spans.is_empty());
    assert!(thread.partial_blocks.is_empty());
}

#[test]
fn subsector_masks_full_tiles_per_pixel() {
    let config = RasterConfig::new(64, 64);
    let stencil = StencilBuffer::new(&config);
    let mut subsector = SubsectorBuffer::new(&config);
    subsector.fill(10);
    // The right half of tile (0, 0) was already claimed by a later
    // subsector.
    for y in 0..8 {
        for x in 4..8 {
            subsector.set(x, y, 2);
        }
    }

    let mut args =
        TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 32.0), point2(32.0, 0.0), &config);
    args.uniforms.subsector_depth = 5;

    let mut thread = WorkerData::new(0, 1, &config);
    bin_subsector(&args, &stencil, &subsector, &mut thread);

    // The geometrically full tile turns into a partial block keyed by the
    // subsector buffer contents.
    let block = thread
        .partial_blocks
        .iter()
        .find(|block| block.x == 0 && block.y == 0)
        .expect("tile (0, 0) should be partial");
    assert_eq!(block.mask0, 0xF0F0_F0F0);
    assert_eq!(block.mask1, 0xF0F0_F0F0);
}

#[test]
fn no_coverage_outside_clip() {
    let config = RasterConfig::new(50, 46);
    let stencil = StencilBuffer::new(&config);
    let args =
        TriangleArgs::new(point2(-20.0, -10.0), point2(30.0, 80.0), point2(90.0, 5.0), &config);

    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);

    for pixel in coverage(&thread) {
        assert!(pixel.0 >= 0 && pixel.0 < 50, "{pixel:?}");
        assert!(pixel.1 >= 0 && pixel.1 < 46, "{pixel:?}");
    }
    assert_eq!(coverage(&thread), reference_coverage(&args, &stencil));
}

#[test]
fn degenerate_triangles_emit_nothing() {
    let config = RasterConfig::new(64, 64);
    let stencil = StencilBuffer::new(&config);
    let mut thread = WorkerData::new(0, 1, &config);

    let args =
        TriangleArgs::new(point2(10.0, 10.0), point2(10.0, 10.0), point2(40.0, 40.0), &config);
    bin_normal(&args, &stencil, &mut thread);
    assert!(thread.full_spans.is_empty());
    assert!(thread.partial_blocks.is_empty());

    let args = TriangleArgs::new(
        point2(-40.0, -40.0),
        point2(-10.0, -10.0),
        point2(-10.0, -40.0),
        &config,
    );
    bin_normal(&args, &stencil, &mut thread);
    assert!(thread.full_spans.is_empty());
    assert!(thread.partial_blocks.is_empty());
}

#[test]
fn mask_bit_order() {
    let config = RasterConfig::new(64, 64);
    let stencil = StencilBuffer::new(&config);

    // A triangle covering exactly pixel (8, 8), the top left corner of
    // tile (1, 1).
    let args = TriangleArgs::new(point2(8.0, 8.0), point2(8.0, 9.0), point2(9.0, 8.0), &config);
    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);

    assert_eq!(thread.partial_blocks, vec![PartialBlock { x: 8, y: 8, mask0: 1 << 31, mask1: 0 }]);
}
