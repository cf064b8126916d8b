use std::ptr::NonNull;
use std::sync::Arc;

use crate::binner::{bin_normal, bin_subsector};
use crate::draw::{self, BlendMode, FrameBuffer32, FrameBuffer8};
use crate::stencil::{stencil_write, StencilBuffer};
use crate::subsector::{subsector_write, SubsectorBuffer};
use crate::{FullSpan, PartialBlock, RasterConfig, TriangleArgs};

/// One worker's identity and scratch output for the current triangle.
pub struct WorkerData {
    pub core: i32,
    pub num_cores: i32,
    pub full_spans: Vec<FullSpan>,
    pub partial_blocks: Vec<PartialBlock>,
    /// Top left corner of the first tile this worker visited, kept around
    /// for debugging.
    pub start_x: i32,
    pub start_y: i32,
}

impl WorkerData {
    /// The scratch capacity upper-bounds the screen tile count, which
    /// upper-bounds the emission of any single triangle, so the binner
    /// never allocates.
    pub fn new(core: i32, num_cores: i32, config: &RasterConfig) -> Self {
        debug_assert!(num_cores > 0 && core < num_cores);
        let tiles = config.num_tiles();
        WorkerData {
            core,
            num_cores,
            full_spans: Vec::with_capacity(tiles),
            partial_blocks: Vec::with_capacity(tiles),
            start_x: 0,
            start_y: 0,
        }
    }
}

/// A temporary wrapper for pointers shared with the broadcast closures.
///
/// # Safety
///
/// The tile row partition keeps every per-tile and per-pixel access of the
/// wrapped buffers disjoint between workers for the duration of one
/// triangle, and `Workers::draw_*` does not touch the buffers while the
/// broadcast is in flight. Scratch slots are indexed by worker and never
/// shared.
struct SharedPtr<T> {
    ptr: NonNull<T>,
}

unsafe impl<T> Send for SharedPtr<T> {}
unsafe impl<T> Sync for SharedPtr<T> {}

impl<T> Copy for SharedPtr<T> {}
impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> SharedPtr<T> {
    fn new(reference: &mut T) -> Self {
        SharedPtr { ptr: NonNull::from(reference) }
    }
}

pub struct Workers {
    thread_pool: Arc<rayon::ThreadPool>,
}

impl Workers {
    pub fn new(num_workers: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|idx| format!("Raster#{idx}"))
            .build()
            .unwrap();

        Workers { thread_pool: Arc::new(pool) }
    }

    pub fn num_workers(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Rasterize one triangle into an 8 bit destination: every worker
    /// bins its tile rows, draws them with the selected blend mode and
    /// commits the stencil and subsector writes the args ask for.
    ///
    /// Triangles whose stencil or depth behavior depends on a previous
    /// triangle must not be submitted until this call returns.
    pub fn draw_8(
        &self,
        args: &TriangleArgs,
        mode: BlendMode,
        fill: bool,
        frame: &mut FrameBuffer8,
        stencil: &mut StencilBuffer,
        subsector: &mut SubsectorBuffer,
        scratch: &mut [WorkerData],
    ) {
        profiling::scope!("Workers::draw_8");
        let drawer =
            if fill { draw::FILL_8[mode as usize] } else { draw::DRAW_8[mode as usize] };
        let frame = SharedPtr::new(frame);
        self.draw_impl(args, stencil, subsector, scratch, move |args, thread| {
            let frame = frame;
            // Safety: disjoint pixel rows per worker, see SharedPtr.
            drawer(args, unsafe { &mut *frame.ptr.as_ptr() }, thread);
        });
    }

    /// 32 bit counterpart of [`Workers::draw_8`].
    pub fn draw_32(
        &self,
        args: &TriangleArgs,
        mode: BlendMode,
        fill: bool,
        frame: &mut FrameBuffer32,
        stencil: &mut StencilBuffer,
        subsector: &mut SubsectorBuffer,
        scratch: &mut [WorkerData],
    ) {
        profiling::scope!("Workers::draw_32");
        let drawer =
            if fill { draw::FILL_32[mode as usize] } else { draw::DRAW_32[mode as usize] };
        let frame = SharedPtr::new(frame);
        self.draw_impl(args, stencil, subsector, scratch, move |args, thread| {
            let frame = frame;
            // Safety: disjoint pixel rows per worker, see SharedPtr.
            drawer(args, unsafe { &mut *frame.ptr.as_ptr() }, thread);
        });
    }

    fn draw_impl(
        &self,
        args: &TriangleArgs,
        stencil: &mut StencilBuffer,
        subsector: &mut SubsectorBuffer,
        scratch: &mut [WorkerData],
        draw: impl Fn(&TriangleArgs, &WorkerData) + Sync,
    ) {
        let num_cores = self.num_workers();
        assert!(
            scratch.len() >= num_cores,
            "need one scratch slot per worker, got {} for {num_cores}",
            scratch.len()
        );

        let stencil = SharedPtr::new(stencil);
        let subsector = SharedPtr::new(subsector);
        let scratch = SharedPtr { ptr: NonNull::new(scratch.as_mut_ptr()).unwrap() };

        self.thread_pool.broadcast(|ctx| {
            let (stencil, subsector, scratch) = (stencil, subsector, scratch);
            let idx = ctx.index();
            // Safety: one slot per worker, indexed by worker.
            let thread = unsafe { &mut *scratch.ptr.as_ptr().add(idx) };
            thread.core = idx as i32;
            thread.num_cores = num_cores as i32;

            // Binning only reads the shared buffers; the writes below are
            // confined to this worker's tile rows.
            if args.subsector_test {
                let stencil = unsafe { stencil.ptr.as_ref() };
                let subsector = unsafe { subsector.ptr.as_ref() };
                bin_subsector(args, stencil, subsector, thread);
            } else {
                let stencil = unsafe { stencil.ptr.as_ref() };
                bin_normal(args, stencil, thread);
            }

            draw(args, thread);

            if args.write_stencil {
                let stencil = unsafe { &mut *stencil.ptr.as_ptr() };
                stencil_write(stencil, args.stencil_write_value, thread);
            }
            if args.write_subsector {
                let subsector = unsafe { &mut *subsector.ptr.as_ptr() };
                subsector_write(subsector, args.uniforms.subsector_depth, thread);
            }
        });
    }
}

#[cfg(test)]
use crate::point2;

#[test]
fn parallel_output_is_worker_count_independent() {
    let config = RasterConfig::new(64, 64);
    let mut args =
        TriangleArgs::new(point2(2.0, 3.0), point2(12.0, 58.0), point2(60.0, 14.0), &config);
    args.uniforms.color = 7;
    args.write_stencil = true;
    args.stencil_write_value = 1;
    args.write_subsector = true;
    args.uniforms.subsector_depth = 5;

    let mut reference: Option<(Vec<u8>, Vec<u8>, Vec<u32>)> = None;

    for num_workers in [1, 2, 4, 8] {
        let workers = Workers::new(num_workers);
        let mut frame = FrameBuffer8::new(&config);
        let mut stencil = StencilBuffer::new(&config);
        let mut subsector = SubsectorBuffer::new(&config);
        let mut scratch: Vec<WorkerData> = (0..num_workers)
            .map(|core| WorkerData::new(core as i32, num_workers as i32, &config))
            .collect();

        workers.draw_8(
            &args,
            BlendMode::Copy,
            true,
            &mut frame,
            &mut stencil,
            &mut subsector,
            &mut scratch,
        );

        let pixels: Vec<u8> =
            (0..64 * 64).map(|i| frame.get(i % 64, i / 64)).collect();
        let stencil_pixels: Vec<u8> =
            (0..64 * 64).map(|i| stencil.get(i % 64, i / 64)).collect();
        let subsector_pixels: Vec<u32> =
            (0..64 * 64).map(|i| subsector.get(i % 64, i / 64)).collect();

        match &reference {
            None => reference = Some((pixels, stencil_pixels, subsector_pixels)),
            Some((frame_ref, stencil_ref, subsector_ref)) => {
                assert_eq!(&pixels, frame_ref, "{num_workers} workers");
                assert_eq!(&stencil_pixels, stencil_ref, "{num_workers} workers");
                assert_eq!(&subsector_pixels, subsector_ref, "{num_workers} workers");
            }
        }
    }
}

#[test]
fn drawn_pixels_match_binned_coverage() {
    let config = RasterConfig::new(64, 64);
    let mut args =
        TriangleArgs::new(point2(0.5, 1.25), point2(9.0, 55.0), point2(58.0, 30.5), &config);
    args.uniforms.color = 9;

    let workers = Workers::new(2);
    let mut frame = FrameBuffer8::new(&config);
    let mut stencil = StencilBuffer::new(&config);
    let mut subsector = SubsectorBuffer::new(&config);
    let mut scratch = vec![WorkerData::new(0, 2, &config), WorkerData::new(1, 2, &config)];

    workers.draw_8(
        &args,
        BlendMode::Copy,
        true,
        &mut frame,
        &mut stencil,
        &mut subsector,
        &mut scratch,
    );

    let mut stats = crate::Stats::new();
    for thread in &scratch {
        stats.accumulate(thread);
    }
    assert!(stats.solid_tiles + stats.partial_blocks > 0);

    // Serial ground truth from the binner alone.
    let mut expected = vec![0u8; 64 * 64];
    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);
    for span in &thread.full_spans {
        for iy in 0..8 {
            for ix in 0..span.length as i32 * 8 {
                expected[(span.y as i32 + iy) as usize * 64 + (span.x as i32 + ix) as usize] = 9;
            }
        }
    }
    for block in &thread.partial_blocks {
        for (row, mut mask) in [(0, block.mask0), (4, block.mask1)] {
            for iy in row..row + 4 {
                for ix in 0..8 {
                    if mask & (1 << 31) != 0 {
                        expected
                            [(block.y as i32 + iy) as usize * 64 + (block.x as i32 + ix) as usize] =
                            9;
                    }
                    mask <<= 1;
                }
            }
        }
    }

    for y in 0..64 {
        for x in 0..64 {
            assert_eq!(frame.get(x, y), expected[(y * 64 + x) as usize], "at ({x}, {y})");
        }
    }
}
