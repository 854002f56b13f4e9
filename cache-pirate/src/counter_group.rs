//! Grouped hardware performance counters for one entity (target or pirate).
//!
//! A [`PendingGroup`] collects [`CounterDescriptor`]s with no kernel
//! resources attached; [`PendingGroup::attach`] opens them all against one
//! `(pid, cpu)` tuple, in order, with the first descriptor becoming the
//! kernel-level group leader that every other descriptor joins by raw file
//! descriptor. This mirrors the way `perf_event_open(2)` programs actually
//! structure a group (the first, "interesting" event is the leader), rather
//! than `perf_event::Group`'s own placeholder-dummy-leader convention.

use std::os::fd::AsRawFd;

use libc::pid_t;
use perf_event::events::Event;
use perf_event::{Builder, Counter, ReadFormat};

use crate::error::CounterError;

/// Identifies one hardware event, before any kernel counter is opened for it.
/// How often the leader overflows: a fixed event count, or a target
/// frequency the kernel adjusts the period towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTrigger {
    Period(u64),
    Frequency(u64),
}

#[derive(Debug, Clone)]
pub struct CounterDescriptor {
    pub name: String,
    pub event: Event,
    /// Only meaningful on the first descriptor in a group; cleared on
    /// followers at attach time regardless of what's set here.
    pub pinned: bool,
    pub exclusive: bool,
    /// Only meaningful on the first descriptor: the leader's overflow
    /// trigger. `None` leaves the kernel default (counting only, never
    /// overflowing).
    pub sample_trigger: Option<SampleTrigger>,
    /// Only meaningful on the first descriptor: whether the group starts
    /// counting immediately at attach time. The target's group wants this
    /// `false` (it starts disabled, with `enable_on_exec` instead, so
    /// nothing is counted before the traced `exec`); pirate groups want it
    /// `true` (they run continuously from the moment they attach).
    pub start_enabled: bool,
    /// Only meaningful on the first descriptor: start the group disabled,
    /// but have the kernel enable it automatically on the next `exec` in
    /// the attached task. Used only by the target's group.
    pub enable_on_exec: bool,
}

impl CounterDescriptor {
    pub fn new(name: impl Into<String>, event: Event) -> Self {
        CounterDescriptor {
            name: name.into(),
            event,
            pinned: false,
            exclusive: false,
            sample_trigger: None,
            start_enabled: true,
            enable_on_exec: false,
        }
    }
}

/// A group of counter descriptors with no attached kernel resources yet.
#[derive(Debug, Clone, Default)]
pub struct PendingGroup {
    descriptors: Vec<CounterDescriptor>,
}

impl PendingGroup {
    pub fn new() -> Self {
        PendingGroup::default()
    }

    /// Append one descriptor at the tail. Only valid before `attach`; there
    /// is no attached state to invalidate here since `attach` consumes self.
    pub fn append(&mut self, descriptor: CounterDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[CounterDescriptor] {
        &self.descriptors
    }

    /// Open a kernel counter for each descriptor in order, against `pid`
    /// (0 for the calling process/thread) restricted to `cpu` (`None` for
    /// any CPU). On any failure, every counter opened so far for this group
    /// is dropped (closing its fd) before the error is returned.
    pub fn attach(self, pid: pid_t, cpu: Option<usize>) -> Result<AttachedGroup, CounterError> {
        let mut iter = self.descriptors.into_iter();
        let leader_desc = iter
            .next()
            .expect("counter group must have at least one descriptor");

        let mut leader_builder = Builder::new()
            .kind(leader_desc.event.clone())
            .observe_pid(pid);
        leader_builder = match cpu {
            Some(cpu) => leader_builder.one_cpu(cpu),
            None => leader_builder.any_cpu(),
        };
        leader_builder.pinned(leader_desc.pinned);
        leader_builder.exclusive(leader_desc.exclusive);
        leader_builder.enabled(leader_desc.start_enabled);
        leader_builder.enable_on_exec(leader_desc.enable_on_exec);
        leader_builder.read_format(ReadFormat::GROUP | ReadFormat::ID | ReadFormat::TOTAL_TIME_ENABLED | ReadFormat::TOTAL_TIME_RUNNING);
        match leader_desc.sample_trigger {
            Some(SampleTrigger::Period(period)) => {
                leader_builder.sample_period(period);
            }
            Some(SampleTrigger::Frequency(freq)) => {
                leader_builder.sample_frequency(freq);
            }
            None => {}
        }

        let leader = leader_builder.build().map_err(CounterError::Attach)?;
        let leader_fd = leader.as_raw_fd();

        let mut followers = Vec::new();
        let mut names = vec![leader_desc.name];

        for desc in iter {
            let mut builder = Builder::new().kind(desc.event.clone()).observe_pid(pid);
            builder = match cpu {
                Some(cpu) => builder.one_cpu(cpu),
                None => builder.any_cpu(),
            };
            let mut builder = builder.raw_group_fd(leader_fd);
            builder.pinned(false);
            builder.exclusive(false);

            match builder.build() {
                Ok(counter) => {
                    followers.push(counter);
                    names.push(desc.name);
                }
                Err(source) => {
                    // `leader` and the followers built so far are dropped
                    // here, closing their fds.
                    return Err(CounterError::Attach(source));
                }
            }
        }

        Ok(AttachedGroup {
            leader,
            followers,
            names,
        })
    }
}

/// One grouped read: the descriptor count, timesharing metadata, and one
/// value per descriptor, in the group's insertion order (leader first).
#[derive(Debug, Clone)]
pub struct GroupReading {
    pub nr: usize,
    pub time_enabled: u64,
    pub time_running: u64,
    pub values: Vec<u64>,
}

/// A counter group with kernel resources attached to one `(pid, cpu)` tuple.
pub struct AttachedGroup {
    leader: Counter,
    followers: Vec<Counter>,
    names: Vec<String>,
}

impl AttachedGroup {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Reset every counter in the group to zero, as a single atomic
    /// operation addressed via the leader.
    pub fn reset(&mut self) -> Result<(), CounterError> {
        self.leader
            .reset()
            .map_err(|source| CounterError::Ioctl { op: "reset", source })
    }

    /// Enable (start counting) every counter in the group.
    pub fn enable(&mut self) -> Result<(), CounterError> {
        self.leader
            .enable()
            .map_err(|source| CounterError::Ioctl { op: "enable", source })
    }

    /// Disable (stop counting) every counter in the group, without
    /// resetting accumulated values.
    pub fn disable(&mut self) -> Result<(), CounterError> {
        self.leader
            .disable()
            .map_err(|source| CounterError::Ioctl { op: "disable", source })
    }

    /// Read every counter in the group at once. Retries on transient
    /// `EAGAIN`; any other I/O error, or a short read, is fatal.
    pub fn read(&mut self) -> Result<GroupReading, CounterError> {
        let max_members = self.names.len();
        let data = loop {
            match self.leader.read_group(max_members) {
                Ok(data) => break data,
                Err(source) if source.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(source) => return Err(CounterError::Read(source)),
            }
        };

        if data.values.len() != max_members {
            return Err(CounterError::Read(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "short group read: expected {max_members} members, got {}",
                    data.values.len()
                ),
            )));
        }

        let values = data.values.into_iter().map(|(_id, value)| value).collect();

        Ok(GroupReading {
            nr: max_members,
            time_enabled: data.time_enabled,
            time_running: data.time_running,
            values,
        })
    }

    /// The leader's raw file descriptor, e.g. to route overflow signals via
    /// `fcntl(F_SETOWN/F_SETSIG)` or to address a single-counter ioctl.
    pub fn leader_fd(&self) -> std::os::fd::RawFd {
        self.leader.as_raw_fd()
    }

    /// Close every open fd in the group. Idempotent: dropping an
    /// `AttachedGroup` that has already been closed is a no-op because the
    /// underlying `File`s are gone once moved out.
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_group_collects_descriptors_in_order() {
        let mut group = PendingGroup::new();
        group.append(CounterDescriptor::new(
            "instructions",
            Event::Hardware(perf_event::events::Hardware::INSTRUCTIONS),
        ));
        group.append(CounterDescriptor::new(
            "cycles",
            Event::Hardware(perf_event::events::Hardware::CPU_CYCLES),
        ));

        let names: Vec<_> = group.descriptors().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["instructions", "cycles"]);
    }
}
