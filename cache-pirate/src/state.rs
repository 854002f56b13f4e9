//! The two small pieces of cross-entity shared state: `target_state`,
//! written only by the coordinator, and one `PirateState` cell per pirate
//! worker, written by the coordinator (to request `NEXT_SIZE`) and by the
//! worker itself (to publish `RUNNING`/`FINISHED`). Both are plain atomics
//! with release/acquire ordering rather than locks: every handshake here is
//! a single-writer, single-cell publish, and the busy-wait on the reading
//! side is intentional (see `SPEC_FULL.md` on why futexes would be worse).

use std::sync::atomic::{AtomicU8, Ordering};

/// Where the target process is in its exec/run/heat lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    WaitExec,
    Running,
    Heating,
}

impl TargetState {
    fn encode(self) -> u8 {
        match self {
            TargetState::WaitExec => 0,
            TargetState::Running => 1,
            TargetState::Heating => 2,
        }
    }

    fn decode(value: u8) -> Self {
        match value {
            0 => TargetState::WaitExec,
            1 => TargetState::Running,
            2 => TargetState::Heating,
            other => unreachable!("invalid encoded TargetState: {other}"),
        }
    }
}

/// Single writer: the coordinator. Many readers: every pirate worker, who
/// spin on it to know when they may run their measured pass.
pub struct TargetCell(AtomicU8);

impl TargetCell {
    pub fn new(initial: TargetState) -> Self {
        TargetCell(AtomicU8::new(initial.encode()))
    }

    pub fn load(&self) -> TargetState {
        TargetState::decode(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: TargetState) {
        self.0.store(state.encode(), Ordering::Release);
    }
}

/// One pirate worker's lifecycle: waiting for the coordinator to publish a
/// new working-set size, actively running the touching loop at that size, or
/// done for good (process shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PirateState {
    NextSize,
    Running,
    Finished,
}

impl PirateState {
    fn encode(self) -> u8 {
        match self {
            PirateState::NextSize => 0,
            PirateState::Running => 1,
            PirateState::Finished => 2,
        }
    }

    fn decode(value: u8) -> Self {
        match value {
            0 => PirateState::NextSize,
            1 => PirateState::Running,
            2 => PirateState::Finished,
            other => unreachable!("invalid encoded PirateState: {other}"),
        }
    }
}

/// Owned by one pirate worker; the coordinator only ever writes `NextSize`
/// into it, and only after first observing `Running`.
pub struct PirateCell(AtomicU8);

impl PirateCell {
    pub fn new(initial: PirateState) -> Self {
        PirateCell(AtomicU8::new(initial.encode()))
    }

    pub fn load(&self) -> PirateState {
        PirateState::decode(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: PirateState) {
        self.0.store(state.encode(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_cell_round_trips() {
        let cell = TargetCell::new(TargetState::WaitExec);
        assert_eq!(cell.load(), TargetState::WaitExec);
        cell.store(TargetState::Heating);
        assert_eq!(cell.load(), TargetState::Heating);
    }

    #[test]
    fn pirate_cell_round_trips() {
        let cell = PirateCell::new(PirateState::NextSize);
        assert_eq!(cell.load(), PirateState::NextSize);
        cell.store(PirateState::Running);
        assert_eq!(cell.load(), PirateState::Running);
        cell.store(PirateState::Finished);
        assert_eq!(cell.load(), PirateState::Finished);
    }
}
