//! The target/pirate state machine: owns `target_state`, reacts to every
//! ptrace-stop and externally-delivered signal, drives the pirate sweep,
//! and emits samples to the sink.
//!
//! This is a direct translation of `handle_child_signal`/`handle_child_event`/
//! `dump_all_events`'s switch statement into match arms over [`TargetState`],
//! kept in one method so the state transition table stays readable as a
//! single unit rather than scattered across helpers.

use std::os::fd::AsRawFd;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::signal::Signal;
use nix::sys::signalfd::SignalFd;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::counter_group::AttachedGroup;
use crate::error::{CounterError, TargetError};
use crate::pirate::PirateConfig;
use crate::sink::{SampleSink, Sample};
use crate::state::{PirateCell, PirateState, TargetCell, TargetState};
use crate::target;

/// Everything the coordinator needs to drive one run: the target's pid and
/// group, every pirate's handshake cell and group, shared sweep geometry,
/// and where samples go.
pub struct Coordinator<S: SampleSink> {
    pub target_pid: Pid,
    pub target_group: AttachedGroup,
    pub pirate_cells: Vec<Arc<PirateCell>>,
    pub pirate_groups: Vec<AttachedGroup>,
    pub pirate_config: Arc<PirateConfig>,
    pub target_cell: Arc<TargetCell>,
    pub no_sweep: bool,
    pub heat_time: Duration,
    pub sink: S,
    /// Delivers `SIGINT`/`SIGCHLD`, built from a mask blocked on the main
    /// thread in `bootstrap::run` before any pirate thread was spawned or
    /// the target forked, so neither can have the signal delivered to it
    /// directly. See `target::block_signals`.
    pub signal_fd: SignalFd,
}

impl<S: SampleSink> Coordinator<S> {
    /// Reset the target's group and every pirate's group, as one logical
    /// operation. Called once at the first exec-stop, and again after every
    /// sample (including on sweep wrap, after the heat interval).
    fn reset_all(&mut self) -> Result<(), CounterError> {
        self.target_group.reset()?;
        for group in &mut self.pirate_groups {
            group.reset()?;
        }
        Ok(())
    }

    /// Read the target's and every pirate's counters and emit one sample,
    /// unless the target is currently heating (no sample is meaningful
    /// mid-heat, matching the original's `dump_all_events` guard).
    fn dump_all_events(&mut self) -> Result<(), CounterError> {
        if self.target_cell.load() == TargetState::Heating {
            return Ok(());
        }

        let pirate_size = self.pirate_config.current_size();
        let target_size = self.pirate_config.cache_size.saturating_sub(pirate_size);

        let target_reading = self.target_group.read()?;
        let mut pirate_values = Vec::with_capacity(self.pirate_groups.len());
        for group in &mut self.pirate_groups {
            pirate_values.push(group.read()?.values);
        }

        let sample = Sample {
            target_size: target_size as u64,
            target_values: target_reading.values,
            pirate_size: pirate_size as u64,
            pirate_values,
        };

        if self.sink.write_sample(&sample).is_err() {
            tracing::error!("failed to write sample to sink");
        }

        Ok(())
    }

    /// Tell every pirate to stop its current measured pass and wait for all
    /// of them to acknowledge by moving off `NextSize`.
    fn advance_pirates(&self) {
        for cell in &self.pirate_cells {
            cell.store(PirateState::NextSize);
        }
        for cell in &self.pirate_cells {
            while cell.load() == PirateState::NextSize {
                std::hint::spin_loop();
            }
        }
    }

    /// The `TARGET_RUNNING` / `SIGIO` branch: either re-arm immediately (no
    /// sweep configured) or advance to the next working-set size, wrapping
    /// into a heat interval once the sweep has covered the whole cache.
    fn handle_overflow(&mut self) -> Result<(), TargetError> {
        if self.no_sweep {
            self.dump_all_events().map_err(|_| TargetError::InvalidCommand)?;
            self.reset_all().map_err(|_| TargetError::InvalidCommand)?;
            target::cont(self.target_pid, None)?;
            return Ok(());
        }

        let way_size = self.pirate_config.way_size;
        let cache_size = self.pirate_config.cache_size;
        let current = self.pirate_config.current_size();

        if current >= cache_size.saturating_sub(way_size) {
            // Last step of the sweep: sample the step we are still at, then
            // wrap, matching the original's "dump before resetting to 0".
            self.dump_all_events().map_err(|_| TargetError::InvalidCommand)?;

            self.target_group
                .disable()
                .map_err(|_| TargetError::InvalidCommand)?;

            self.pirate_config.current_size.store(0, Ordering::Release);
            self.target_cell.store(TargetState::Heating);

            self.advance_pirates();

            target::cont(self.target_pid, None)?;
            std::thread::sleep(self.heat_time);

            self.target_cell.store(TargetState::Running);
            self.target_group
                .enable()
                .map_err(|_| TargetError::InvalidCommand)?;
            self.reset_all().map_err(|_| TargetError::InvalidCommand)?;
        } else {
            self.dump_all_events().map_err(|_| TargetError::InvalidCommand)?;

            self.pirate_config
                .current_size
                .store(current + way_size, Ordering::Release);

            self.advance_pirates();

            self.reset_all().map_err(|_| TargetError::InvalidCommand)?;
            target::cont(self.target_pid, None)?;
        }

        Ok(())
    }

    /// One ptrace-stop on the target, dispatched by `target_state` exactly
    /// as the original's `switch (target_state) { switch (signal) ... }`.
    fn handle_child_signal(&mut self, pid: Pid, signal: Signal) -> Result<(), TargetError> {
        debug_assert_eq!(pid, self.target_pid);

        match self.target_cell.load() {
            TargetState::WaitExec => match signal {
                Signal::SIGTRAP => {
                    self.target_cell.store(TargetState::Running);
                    if let Err(err) = self.reset_all() {
                        tracing::error!(%err, "failed to reset counters at exec stop");
                    }
                    target::cont(pid, None)
                }
                other => {
                    tracing::warn!(signal = %other, "unexpected signal while waiting for target exec");
                    target::cont(pid, Some(other))
                }
            },
            TargetState::Running => match signal {
                Signal::SIGIO => self.handle_overflow(),
                Signal::SIGTRAP => {
                    tracing::warn!("unexpected SIGTRAP in running target");
                    target::cont(pid, Some(signal))
                }
                other => target::cont(pid, Some(other)),
            },
            TargetState::Heating => match signal {
                Signal::SIGIO => {
                    tracing::error!("got SIGIO while heating");
                    target::cont(pid, Some(signal))
                }
                Signal::SIGTRAP => {
                    tracing::warn!("unexpected SIGTRAP in target while heating");
                    target::cont(pid, Some(signal))
                }
                other => target::cont(pid, Some(other)),
            },
        }
    }

    /// The `SIGCHLD` branch: reap the target and decide whether it stopped
    /// (keep going) or exited/was killed (final sample, then report the
    /// outcome to the caller so `main` can propagate an exit code).
    fn handle_child_event(&mut self, pid: Pid) -> Result<Option<i32>, TargetError> {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)).map_err(TargetError::Fork)? {
            WaitStatus::Exited(_, code) => {
                let _ = self.dump_all_events();
                Ok(Some(code))
            }
            WaitStatus::Signaled(_, sig, _) => {
                tracing::warn!(signal = %sig, "target terminated by signal");
                let _ = self.dump_all_events();
                Ok(Some(1))
            }
            WaitStatus::Stopped(_, sig) => {
                self.handle_child_signal(pid, sig)?;
                Ok(None)
            }
            WaitStatus::StillAlive => Ok(None),
            _ => Ok(None),
        }
    }

    /// Drive the poll loop until the target exits or is killed, returning
    /// the exit code to propagate.
    pub fn run(mut self) -> Result<i32, TargetError> {
        let raw_fd = self.signal_fd.as_raw_fd();

        loop {
            let mut fds = [PollFd::new(raw_fd, PollFlags::POLLIN)];
            match poll(&mut fds, -1) {
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => return Err(TargetError::SignalFd(err)),
            }

            let Some(revents) = fds[0].revents() else { continue };
            if !revents.contains(PollFlags::POLLIN) {
                continue;
            }

            let info = match self.signal_fd.read_signal() {
                Ok(Some(info)) => info,
                Ok(None) => continue,
                Err(err) => return Err(TargetError::SignalFd(err)),
            };

            match info.ssi_signo as i32 {
                signo if signo == Signal::SIGINT as i32 => {
                    tracing::info!("received SIGINT, killing target");
                    let _ = self.dump_all_events();
                    let _ = nix::sys::signal::kill(self.target_pid, Signal::SIGKILL);
                }
                signo if signo == Signal::SIGCHLD as i32 => {
                    let pid = Pid::from_raw(info.ssi_pid as i32);
                    if let Some(code) = self.handle_child_event(pid)? {
                        return Ok(code);
                    }
                }
                other => {
                    tracing::warn!(signal = other, "unhandled signal");
                }
            }
        }
    }
}
