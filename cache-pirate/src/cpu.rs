//! CPU pinning, shared by the pirate workers and the target's pre-exec hook.

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

/// Restrict `pid` (0 meaning the calling thread) to a single CPU.
pub fn pin(pid: Pid, cpu: usize) -> nix::Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu)?;
    sched_setaffinity(pid, &set)
}

/// Restrict the calling thread to a single CPU.
pub fn pin_current_thread(cpu: usize) -> nix::Result<()> {
    pin(Pid::from_raw(0), cpu)
}
