//! The pirate side: threads that sweep a working set through the shared
//! last-level cache while the coordinator samples the target's counters.
//!
//! Each worker owns one slice of a single shared [`buffer::HugePageBuffer`]
//! (actually every worker's slice can overlap the whole array; the split is
//! only about which *portion* of the current working set each thread is
//! responsible for touching, not disjoint ownership) and cycles through:
//! warm the current size in, publish [`PirateState::Running`], wait out any
//! heating window, then run the timed pass the coordinator samples during.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::buffer::{BufferView, HUGE_PAGE_SIZE};
use crate::counter_group::{AttachedGroup, PendingGroup};
use crate::cpu;
use crate::error::CounterError;
use crate::sink::Reference;
use crate::state::{PirateCell, PirateState, TargetCell, TargetState};

/// Which touching-loop shape a pirate uses, chosen once at bootstrap from
/// whether the last-level cache's way size is a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVariant {
    /// `way_size` is a power of two: working-set slices can be addressed as
    /// plain contiguous byte ranges.
    Exact,
    /// `way_size` is not a power of two: slices are scanned one huge page at
    /// a time so that "N ways" of a non-power-of-two cache still maps onto
    /// a whole number of allocated huge pages.
    HugePageAligned,
}

/// Immutable geometry plus the one field the coordinator mutates every step
/// of the sweep.
pub struct PirateConfig {
    pub ways: usize,
    pub cache_size: usize,
    pub stride: usize,
    pub way_size: usize,
    pub alloc_size: usize,
    pub loop_variant: LoopVariant,
    pub n_pirates: usize,
    /// The working-set size every pirate currently touches. Written only by
    /// the coordinator, between sweep steps; read continuously by every
    /// worker's touching loop.
    pub current_size: AtomicUsize,
}

impl PirateConfig {
    /// Derive pirate geometry from a last-level cache's `(ways, cache_size,
    /// stride)`, as read from the cache topology oracle.
    pub fn new(cache_size: usize, ways: usize, stride: usize, n_pirates: usize) -> Self {
        let way_size = cache_size / ways;
        let loop_variant = if way_size != 0 && (way_size & (way_size - 1)) == 0 {
            LoopVariant::Exact
        } else {
            LoopVariant::HugePageAligned
        };

        let alloc_size = match loop_variant {
            LoopVariant::Exact => cache_size,
            LoopVariant::HugePageAligned => {
                let spare = if cache_size % way_size != 0 { 1 } else { 0 };
                (ways - 1 + spare) * HUGE_PAGE_SIZE
            }
        };

        PirateConfig {
            ways,
            cache_size,
            stride,
            way_size,
            alloc_size,
            loop_variant,
            n_pirates,
            current_size: AtomicUsize::new(0),
        }
    }

    pub fn current_size(&self) -> usize {
        self.current_size.load(Ordering::Acquire)
    }
}

/// One pass over `pirate_number`'s slice of `size` bytes, touching every
/// `stride`th byte. No power-of-two assumption on `size` or `way_size`.
fn touch_exact(buffer: BufferView, size: usize, stride: usize, n_pirates: usize, pirate_number: usize) {
    if size == 0 || n_pirates == 0 {
        return;
    }
    let chunk = size / n_pirates;
    let start = pirate_number * chunk;
    let stop = start + chunk;

    let mut i = start;
    while i < stop {
        unsafe {
            std::hint::black_box(buffer.read_volatile(i));
        }
        i += stride;
    }
}

/// One pass over `pirate_number`'s slice of `size` bytes, scanning one huge
/// page at a time so a non-power-of-two way size still lands on whole
/// huge-page boundaries in the backing allocation.
fn touch_huge_page_aligned(
    buffer: BufferView,
    size: usize,
    way_size: usize,
    stride: usize,
    n_pirates: usize,
    pirate_number: usize,
) {
    if size == 0 || n_pirates == 0 || way_size == 0 {
        return;
    }
    let chunk = way_size / n_pirates;
    let start = pirate_number * chunk;
    let last_element = (size / way_size) * HUGE_PAGE_SIZE + (size % way_size);

    let mut i = start;
    while i < last_element {
        let limit = std::cmp::min(i + chunk, last_element);
        let mut j = i;
        while j < limit {
            unsafe {
                std::hint::black_box(buffer.read_volatile(j));
            }
            j += stride;
        }
        i += HUGE_PAGE_SIZE;
    }
}

fn touch(config: &PirateConfig, buffer: BufferView, size: usize, n_pirates: usize, pirate_number: usize) {
    match config.loop_variant {
        LoopVariant::Exact => touch_exact(buffer, size, config.stride, n_pirates, pirate_number),
        LoopVariant::HugePageAligned => {
            touch_huge_page_aligned(buffer, size, config.way_size, config.stride, n_pirates, pirate_number)
        }
    }
}

/// A pirate worker thread's identity and collaborators, ready to be handed
/// to [`run`].
pub struct PirateWorker {
    pub pirate_number: usize,
    pub n_pirates: usize,
    pub cpu: usize,
    pub config: Arc<PirateConfig>,
    pub cell: Arc<PirateCell>,
    pub target_cell: Arc<TargetCell>,
    pub buffer: BufferView,
    pub counters: PendingGroup,
    pub take_reference: bool,
}

/// Fault every page of `buffer` in by writing to it once, `stride` bytes at
/// a time, exactly as the touching loops will later read it.
fn fault_in(buffer: BufferView, stride: usize) {
    let mut i = 0;
    while i < buffer.len() {
        unsafe {
            buffer.write_volatile(i, (i & 0xFF) as u8);
        }
        i += stride.max(1);
    }
}

/// Run one full measured pass at `size`, then one more after a reset, and
/// return the second pass's counter values as the reference datum. This
/// warms the working set exactly as a normal sweep step would before the
/// value that gets recorded is read.
fn measure_reference(
    config: &PirateConfig,
    buffer: BufferView,
    n_pirates: usize,
    pirate_number: usize,
    group: &mut AttachedGroup,
) -> Result<Reference, CounterError> {
    let size = config.cache_size / 2;

    touch(config, buffer, size, n_pirates, pirate_number);
    touch(config, buffer, size, n_pirates, pirate_number);

    group.reset()?;
    touch(config, buffer, size, n_pirates, pirate_number);
    let reading = group.read()?;

    Ok(Reference {
        size: size as u64,
        values: reading.values,
    })
}

/// What a worker hands back to the coordinator once it is attached and
/// ready: its now-live counter group (the coordinator reads and resets it
/// from here on; the fd stays valid regardless of which thread touches it)
/// and, for worker 0 only, the reference measurement.
pub struct PirateReady {
    pub pirate_number: usize,
    pub group: AttachedGroup,
    pub reference: Option<Reference>,
}

/// Run this worker forever: pin to its CPU, fault its slice of the buffer
/// in, attach its counter group, optionally take the one-time reference
/// measurement, hand both back over `ready_tx`, then loop the warm/run
/// cycle described at module level.
///
/// Never returns on success; the process exits some other way (the target
/// finishing, or a signal) while this thread is still inside its loop.
pub fn run(worker: PirateWorker, ready_tx: std::sync::mpsc::Sender<PirateReady>) -> Result<(), CounterError> {
    if let Err(err) = cpu::pin_current_thread(worker.cpu) {
        tracing::warn!(cpu = worker.cpu, pirate = worker.pirate_number, error = %err, "failed to pin pirate thread");
    }

    fault_in(worker.buffer, worker.config.stride);

    let mut group = worker.counters.attach(0, None)?;

    let reference = if worker.take_reference {
        Some(measure_reference(
            &worker.config,
            worker.buffer,
            worker.n_pirates,
            worker.pirate_number,
            &mut group,
        )?)
    } else {
        None
    };

    if let Some(reference) = &reference {
        tracing::info!(size = reference.size, "pirate reference measurement taken");
    }

    let _ = ready_tx.send(PirateReady {
        pirate_number: worker.pirate_number,
        group,
        reference,
    });

    loop {
        let size = worker.config.current_size();
        touch(&worker.config, worker.buffer, size, worker.n_pirates, worker.pirate_number);

        worker.cell.store(PirateState::Running);
        while worker.target_cell.load() == TargetState::Heating {
            std::hint::spin_loop();
        }

        loop {
            let size = worker.config.current_size();
            touch(&worker.config, worker.buffer, size, worker.n_pirates, worker.pirate_number);
            if worker.cell.load() != PirateState::Running {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HugePageBuffer;

    #[test]
    fn exact_variant_chosen_for_power_of_two_way_size() {
        let config = PirateConfig::new(1 << 20, 16, 64, 2);
        assert_eq!(config.loop_variant, LoopVariant::Exact);
        assert_eq!(config.way_size, 1 << 16);
        assert_eq!(config.alloc_size, 1 << 20);
    }

    #[test]
    fn huge_page_variant_chosen_for_non_power_of_two_way_size() {
        // 10 MiB over 3 ways gives a way_size that is not a power of two.
        let config = PirateConfig::new(10 * (1 << 20), 3, 64, 2);
        assert_eq!(config.loop_variant, LoopVariant::HugePageAligned);
        assert!(config.alloc_size >= config.cache_size);
        assert_eq!(config.alloc_size % HUGE_PAGE_SIZE, 0);
    }

    #[test]
    #[ignore = "requires a reserved hugetlb pool (/proc/sys/vm/nr_hugepages)"]
    fn touch_exact_stays_within_each_pirates_slice() {
        let buffer = HugePageBuffer::allocate(1 << 21).unwrap();
        let view = buffer.view();
        // Two pirates splitting a 4096-byte working set: each only touches
        // its own half. This just needs to not panic or go out of bounds;
        // the debug_assert in read_volatile does the real checking.
        touch_exact(view, 4096, 64, 2, 0);
        touch_exact(view, 4096, 64, 2, 1);
    }

    #[test]
    #[ignore = "requires a reserved hugetlb pool (/proc/sys/vm/nr_hugepages)"]
    fn touch_huge_page_aligned_handles_zero_size() {
        let buffer = HugePageBuffer::allocate(1 << 21).unwrap();
        let view = buffer.view();
        touch_huge_page_aligned(view, 0, 1 << 16, 64, 2, 0);
    }
}
