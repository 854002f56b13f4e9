//! Spawning and controlling the traced target process.
//!
//! The target is forked, pinned to its CPU, and put into `PTRACE_TRACEME`
//! before it execs, so the coordinator can attach counters to a live,
//! not-yet-running pid and see the post-exec `SIGTRAP` that every traced
//! process delivers to itself. A `socketpair`-based handshake keeps the
//! child waiting right up until the parent has finished attaching, so no
//! counter ever misses instructions the target executes before `exec`.

use std::ffi::CString;
use std::os::fd::RawFd;

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::signalfd::{SfdFlags, SigSet, SignalFd};
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use nix::unistd::{execvp, fork, write, ForkResult, Pid};

use crate::cpu;
use crate::error::TargetError;

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SyncMsg {
    Waiting = 0,
    Go = 1,
    Abort = 2,
}

fn sync_send(fd: RawFd, msg: SyncMsg) -> nix::Result<()> {
    write(fd, &[msg as u8]).map(|_| ())
}

fn sync_recv(fd: RawFd) -> nix::Result<SyncMsg> {
    let mut buf = [0u8; 1];
    nix::unistd::read(fd, &mut buf)?;
    Ok(match buf[0] {
        0 => SyncMsg::Waiting,
        1 => SyncMsg::Go,
        _ => SyncMsg::Abort,
    })
}

/// A forked target that has announced it is waiting, but has not yet been
/// released to call `exec`. The caller must attach its counter group to
/// [`pid`](PendingTarget::pid) before calling [`release`](PendingTarget::release).
pub struct PendingTarget {
    pid: Pid,
    parent_fd: RawFd,
}

impl PendingTarget {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Tell the child to proceed into `exec`. The traced `exec` delivers a
    /// `SIGTRAP` stop to this pid, which the coordinator observes as the
    /// first ptrace event.
    pub fn release(self) -> Result<Pid, TargetError> {
        sync_send(self.parent_fd, SyncMsg::Go).map_err(TargetError::Handshake)?;
        let _ = nix::unistd::close(self.parent_fd);
        Ok(self.pid)
    }

    /// Abort the handshake: the child execs nothing and exits immediately.
    /// Used when attaching counters to the new pid fails.
    pub fn abort(self) -> Result<(), TargetError> {
        sync_send(self.parent_fd, SyncMsg::Abort).map_err(TargetError::Handshake)?;
        let _ = nix::unistd::close(self.parent_fd);
        Ok(())
    }
}

/// Fork a child that pins itself to `cpu`, calls `PTRACE_TRACEME`, and then
/// waits on the handshake socket for [`PendingTarget::release`] before
/// `execvp`-ing `command`/`args`.
pub fn fork_stopped(cpu: usize, command: &str, args: &[String]) -> Result<PendingTarget, TargetError> {
    let (parent_fd, child_fd) = socketpair(
        AddressFamily::Unix,
        SockType::SeqPacket,
        None,
        SockFlag::empty(),
    )
    .map_err(TargetError::Handshake)?;

    let file = CString::new(command).map_err(|_| TargetError::InvalidCommand)?;
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(file.clone());
    for arg in args {
        argv.push(CString::new(arg.as_str()).map_err(|_| TargetError::InvalidCommand)?);
    }

    match unsafe { fork() }.map_err(TargetError::Fork)? {
        ForkResult::Child => {
            let _ = nix::unistd::close(parent_fd);

            if let Err(err) = cpu::pin(Pid::from_raw(0), cpu) {
                eprintln!("cache-pirate: failed to pin target to cpu {cpu}: {err}");
                std::process::exit(127);
            }
            if ptrace::traceme().is_err() {
                eprintln!("cache-pirate: PTRACE_TRACEME failed");
                std::process::exit(127);
            }

            if sync_send(child_fd, SyncMsg::Waiting).is_err() {
                std::process::exit(127);
            }
            match sync_recv(child_fd) {
                Ok(SyncMsg::Go) => {}
                _ => std::process::exit(127),
            }
            let _ = nix::unistd::close(child_fd);

            let _ = execvp(&file, &argv);
            eprintln!("cache-pirate: exec failed for {command}");
            std::process::exit(127);
        }
        ForkResult::Parent { child } => {
            let _ = nix::unistd::close(child_fd);
            match sync_recv(parent_fd).map_err(TargetError::Handshake)? {
                SyncMsg::Waiting => Ok(PendingTarget { pid: child, parent_fd }),
                _ => Err(TargetError::Handshake(nix::errno::Errno::EPROTO)),
            }
        }
    }
}

/// Route overflow signals from the leader counter's fd to `pid`, matching
/// `fcntl(F_SETOWN, pid)` + `fcntl(F_SETFL, O_ASYNC)` on the real (non-dummy)
/// leader fd.
pub fn route_overflow_signal(leader_fd: RawFd, pid: Pid) -> Result<(), TargetError> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};

    fcntl(leader_fd, FcntlArg::F_SETOWN(pid.as_raw())).map_err(TargetError::Fcntl)?;
    let current = fcntl(leader_fd, FcntlArg::F_GETFL).map_err(TargetError::Fcntl)?;
    let flags = OFlag::from_bits_truncate(current) | OFlag::O_ASYNC;
    fcntl(leader_fd, FcntlArg::F_SETFL(flags)).map_err(TargetError::Fcntl)?;
    Ok(())
}

/// Block `SIGINT` and `SIGCHLD` on the calling thread, returning the mask so
/// a `signalfd` can be created from it later. Must be called on the main
/// thread before any pirate thread is spawned and before the target is
/// forked: both inherit the caller's signal mask (a new thread copies its
/// creator's mask, and `fork` copies the calling thread's), which is the
/// only way to guarantee these two signals are never delivered to, and
/// silently dropped by, some thread/process other than whoever holds the
/// signalfd.
pub fn block_signals() -> Result<SigSet, TargetError> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGCHLD);
    mask.thread_block().map_err(TargetError::SignalFd)?;
    Ok(mask)
}

/// A `signalfd` delivering every signal in `mask`. `mask` must already be
/// blocked (see [`block_signals`]) so the signals only ever arrive through
/// this fd.
pub fn create_signal_fd(mask: &SigSet) -> Result<SignalFd, TargetError> {
    SignalFd::with_flags(mask, SfdFlags::empty()).map_err(TargetError::SignalFd)
}

/// `PTRACE_CONT`, optionally re-delivering `signal` to the target.
pub fn cont(pid: Pid, signal: Option<Signal>) -> Result<(), TargetError> {
    ptrace::cont(pid, signal).map_err(TargetError::Ptrace)
}
