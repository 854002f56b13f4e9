//! Structured error types for each fallible collaborator.
//!
//! Each is a `thiserror` enum so call sites can match on cause; `main` wraps
//! these in `anyhow::Context` to attach a step description at the bootstrap
//! boundary.

use std::io;

/// Failure while resolving a symbolic or raw event name to a counter descriptor.
#[derive(Debug, thiserror::Error)]
pub enum EventResolveError {
    #[error("unknown hardware/software event name: {0}")]
    UnknownEvent(String),

    #[error("invalid raw event spec {0:?}: {1}")]
    InvalidRaw(String, std::num::ParseIntError),
}

/// Failure while reading cache topology from the operating system.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("no cache index entries found for cpu{0}")]
    NoCacheIndex(usize),

    #[error("failed to read {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("malformed value in {path}: {value:?}")]
    Malformed { path: String, value: String },
}

/// Failure while writing a header or sample to the sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors detected at bootstrap, before any kernel resource is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("pirate cpu {0} used more than once")]
    DuplicatePirateCpu(usize),

    #[error("pirate cpu {0} is the same as the target cpu")]
    PirateOnTargetCpu(usize),

    #[error("no target command specified")]
    MissingCommand,

    #[error(transparent)]
    Event(#[from] EventResolveError),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Failure while creating, attaching, or reading a counter group.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("failed to attach counter group: {0}")]
    Attach(io::Error),

    #[error("failed to read counter group: {0}")]
    Read(io::Error),

    #[error("failed to control counter group ({op}): {source}")]
    Ioctl { op: &'static str, source: io::Error },
}

/// Failure while forking, handshaking with, or controlling the target process.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("fork failed: {0}")]
    Fork(nix::errno::Errno),

    #[error("target command is not a valid C string")]
    InvalidCommand,

    #[error("handshake with target failed: {0}")]
    Handshake(nix::errno::Errno),

    #[error("fcntl on leader counter fd failed: {0}")]
    Fcntl(nix::errno::Errno),

    #[error("failed to create signalfd: {0}")]
    SignalFd(nix::errno::Errno),

    #[error("ptrace operation failed: {0}")]
    Ptrace(nix::errno::Errno),

    #[error(transparent)]
    Counter(#[from] CounterError),
}
