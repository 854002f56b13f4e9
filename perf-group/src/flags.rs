#![allow(missing_docs)]

use bitflags::bitflags;

use crate::sys::bindings;

bitflags! {
    /// Specifies which fields to include in the sample.
    ///
    /// These values correspond to `PERF_SAMPLE_x` values. See the
    /// [manpage] for documentation on what they mean.
    ///
    /// [manpage]: http://man7.org/linux/man-pages/man2/perf_event_open.2.html
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SampleFlag : u64 {
        const IP = bindings::PERF_SAMPLE_IP as _;
        const TID = bindings::PERF_SAMPLE_TID as _;
        const TIME = bindings::PERF_SAMPLE_TIME as _;
        const ADDR = bindings::PERF_SAMPLE_ADDR as _;
        const READ = bindings::PERF_SAMPLE_READ as _;
        const CALLCHAIN = bindings::PERF_SAMPLE_CALLCHAIN as _;
        const ID = bindings::PERF_SAMPLE_ID as _;
        const CPU = bindings::PERF_SAMPLE_CPU as _;
        const PERIOD = bindings::PERF_SAMPLE_PERIOD as _;
        const STREAM_ID = bindings::PERF_SAMPLE_STREAM_ID as _;
        const RAW = bindings::PERF_SAMPLE_RAW as _;
        const BRANCH_STACK = bindings::PERF_SAMPLE_BRANCH_STACK as _;
        const REGS_USER = bindings::PERF_SAMPLE_REGS_USER as _;
        const STACK_USER = bindings::PERF_SAMPLE_STACK_USER as _;
        const WEIGHT = bindings::PERF_SAMPLE_WEIGHT as _;
        const DATA_SRC = bindings::PERF_SAMPLE_DATA_SRC as _;
        const IDENTIFIER = bindings::PERF_SAMPLE_IDENTIFIER as _;
        const TRANSACTION = bindings::PERF_SAMPLE_TRANSACTION as _;
        const REGS_INTR = bindings::PERF_SAMPLE_REGS_INTR as _;
        const PHYS_ADDR = bindings::PERF_SAMPLE_PHYS_ADDR as _;
        const AUX = bindings::PERF_SAMPLE_AUX as _;
        const CGROUP = bindings::PERF_SAMPLE_CGROUP as _;

        // The following are present in perf_event.h but not yet documented
        // in the manpage.
        const DATA_PAGE_SIZE = bindings::PERF_SAMPLE_DATA_PAGE_SIZE as _;
        const CODE_PAGE_SIZE = bindings::PERF_SAMPLE_CODE_PAGE_SIZE as _;
        const WEIGHT_STRUCT = bindings::PERF_SAMPLE_WEIGHT_STRUCT as _;
    }
}

bitflags! {
    /// Specifies which fields are returned when a [`Counter`] or [`Group`] is
    /// read.
    ///
    /// These correspond to the `PERF_FORMAT_x` values described in the
    /// [manpage].
    ///
    /// [`Counter`]: crate::Counter
    /// [`Group`]: crate::Group
    /// [manpage]: http://man7.org/linux/man-pages/man2/perf_event_open.2.html
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ReadFormat : u64 {
        /// Include the total time the counter was enabled, whether or not it
        /// was actually running on the PMU.
        const TOTAL_TIME_ENABLED = bindings::PERF_FORMAT_TOTAL_TIME_ENABLED as _;

        /// Include the total time the counter was actually running on the
        /// PMU.
        const TOTAL_TIME_RUNNING = bindings::PERF_FORMAT_TOTAL_TIME_RUNNING as _;

        /// Include the kernel-assigned id of each counter in the read.
        const ID = bindings::PERF_FORMAT_ID as _;

        /// Read all counters in the group together, as a single atomic
        /// operation.
        const GROUP = bindings::PERF_FORMAT_GROUP as _;

        /// Include a count of samples that were lost due to the ring buffer
        /// filling up.
        const LOST = bindings::PERF_FORMAT_LOST as _;
    }
}

impl ReadFormat {
    /// The largest number of `u64` words a single, non-grouped read can
    /// produce: the value itself, plus every optional trailer field.
    pub(crate) const MAX_NON_GROUP_SIZE: usize = 4;
}

/// Which clock source to use for event timestamps.
///
/// Passed to [`Builder::clockid`](crate::Builder::clockid). See the
/// [`clock_gettime(2)`][man] manpage for the meaning of each clock.
///
/// [man]: https://www.mankier.com/2/clock_gettime
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Clock {
    /// A settable, system-wide clock that measures real (wall clock) time.
    Realtime = libc::CLOCK_REALTIME,

    /// A clock that cannot be set and represents monotonic time since some
    /// unspecified starting point.
    Monotonic = libc::CLOCK_MONOTONIC,

    /// A process-wide clock measuring CPU time consumed by the calling
    /// process.
    ProcessCputimeId = libc::CLOCK_PROCESS_CPUTIME_ID,

    /// A thread-specific clock measuring CPU time consumed by the calling
    /// thread.
    ThreadCputimeId = libc::CLOCK_THREAD_CPUTIME_ID,

    /// Like `Monotonic`, but not affected by NTP adjustments or `adjtime(3)`.
    MonotonicRaw = libc::CLOCK_MONOTONIC_RAW,

    /// Identical to `Realtime`, except it does not count time the system is
    /// suspended.
    RealtimeCoarse = libc::CLOCK_REALTIME_COARSE,

    /// Like `Monotonic`, but with lower resolution and lower overhead.
    MonotonicCoarse = libc::CLOCK_MONOTONIC_COARSE,

    /// Like `Monotonic`, but also counts time the system is suspended.
    Boottime = libc::CLOCK_BOOTTIME,
}

impl Clock {
    pub(crate) fn into_raw(self) -> libc::clockid_t {
        self as libc::clockid_t
    }
}

/// How much "skid" (instruction-count imprecision) to permit between an
/// event occurring and a sample being recorded.
///
/// See the `precise_ip` field in the [manpage] for details.
///
/// [manpage]: http://man7.org/linux/man-pages/man2/perf_event_open.2.html
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SampleSkid {
    /// There may be arbitrary skid.
    Arbitrary = 0,

    /// Skid is constant.
    Constant = 1,

    /// Requested to have 0 skid.
    RequestZero = 2,

    /// Must have 0 skid, or the counter will fail to build.
    RequireZero = 3,
}

bitflags! {
    /// Specifies which branches to include in a branch-stack sample.
    ///
    /// These correspond to the `PERF_SAMPLE_BRANCH_x` values described in the
    /// [manpage]. Used with
    /// [`Builder::branch_sample_type`](crate::Builder::branch_sample_type).
    ///
    /// [manpage]: http://man7.org/linux/man-pages/man2/perf_event_open.2.html
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SampleBranchFlag : u64 {
        const USER = bindings::PERF_SAMPLE_BRANCH_USER as _;
        const KERNEL = bindings::PERF_SAMPLE_BRANCH_KERNEL as _;
        const HV = bindings::PERF_SAMPLE_BRANCH_HV as _;
        const ANY = bindings::PERF_SAMPLE_BRANCH_ANY as _;
        const ANY_CALL = bindings::PERF_SAMPLE_BRANCH_ANY_CALL as _;
        const ANY_RETURN = bindings::PERF_SAMPLE_BRANCH_ANY_RETURN as _;
        const IND_CALL = bindings::PERF_SAMPLE_BRANCH_IND_CALL as _;
        const ABORT_TX = bindings::PERF_SAMPLE_BRANCH_ABORT_TX as _;
        const IN_TX = bindings::PERF_SAMPLE_BRANCH_IN_TX as _;
        const NO_TX = bindings::PERF_SAMPLE_BRANCH_NO_TX as _;
        const COND = bindings::PERF_SAMPLE_BRANCH_COND as _;
        const CALL_STACK = bindings::PERF_SAMPLE_BRANCH_CALL_STACK as _;
        const IND_JUMP = bindings::PERF_SAMPLE_BRANCH_IND_JUMP as _;
        const CALL = bindings::PERF_SAMPLE_BRANCH_CALL as _;
        const NO_FLAGS = bindings::PERF_SAMPLE_BRANCH_NO_FLAGS as _;
        const NO_CYCLES = bindings::PERF_SAMPLE_BRANCH_NO_CYCLES as _;
    }
}
