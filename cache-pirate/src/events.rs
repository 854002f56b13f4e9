//! Hardware-event-name-to-encoding resolver.
//!
//! Accepts either a symbolic name from a fixed table of common hardware and
//! software events, or a `raw:<hex>` string parsed directly into a raw
//! counter config.

use perf_event::events::{Event, Hardware, Software};

use crate::error::EventResolveError;

/// Resolves an event name into the `Event` value that selects it on
/// `perf_event::Builder`.
pub trait EventResolver {
    fn resolve(&self, name: &str) -> Result<Event, EventResolveError>;
}

/// The fixed table of symbolic names this tool understands, plus `raw:<hex>`.
pub struct SymbolTableResolver;

impl EventResolver for SymbolTableResolver {
    fn resolve(&self, name: &str) -> Result<Event, EventResolveError> {
        if let Some(hex) = name.strip_prefix("raw:") {
            let value = u64::from_str_radix(hex.trim_start_matches("0x"), 16)
                .map_err(|source| EventResolveError::InvalidRaw(name.to_string(), source))?;
            return Ok(Event::Raw(value));
        }

        let event = match name {
            "cycles" | "cpu-cycles" => Event::Hardware(Hardware::CPU_CYCLES),
            "instructions" => Event::Hardware(Hardware::INSTRUCTIONS),
            "cache-references" => Event::Hardware(Hardware::CACHE_REFERENCES),
            "cache-misses" => Event::Hardware(Hardware::CACHE_MISSES),
            "branch-instructions" | "branches" => Event::Hardware(Hardware::BRANCH_INSTRUCTIONS),
            "branch-misses" => Event::Hardware(Hardware::BRANCH_MISSES),
            "bus-cycles" => Event::Hardware(Hardware::BUS_CYCLES),
            "stalled-cycles-frontend" => Event::Hardware(Hardware::STALLED_CYCLES_FRONTEND),
            "stalled-cycles-backend" => Event::Hardware(Hardware::STALLED_CYCLES_BACKEND),
            "ref-cycles" => Event::Hardware(Hardware::REF_CPU_CYCLES),
            "cpu-clock" => Event::Software(Software::CPU_CLOCK),
            "task-clock" => Event::Software(Software::TASK_CLOCK),
            "page-faults" | "faults" => Event::Software(Software::PAGE_FAULTS),
            "context-switches" | "cs" => Event::Software(Software::CONTEXT_SWITCHES),
            "cpu-migrations" | "migrations" => Event::Software(Software::CPU_MIGRATIONS),
            "minor-faults" => Event::Software(Software::PAGE_FAULTS_MIN),
            "major-faults" => Event::Software(Software::PAGE_FAULTS_MAJ),
            "alignment-faults" => Event::Software(Software::ALIGNMENT_FAULTS),
            "emulation-faults" => Event::Software(Software::EMULATION_FAULTS),
            _ => return Err(EventResolveError::UnknownEvent(name.to_string())),
        };

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_symbolic_names() {
        let resolver = SymbolTableResolver;
        assert!(matches!(
            resolver.resolve("instructions").unwrap(),
            Event::Hardware(Hardware::INSTRUCTIONS)
        ));
        assert!(matches!(
            resolver.resolve("cycles").unwrap(),
            Event::Hardware(Hardware::CPU_CYCLES)
        ));
        assert!(matches!(
            resolver.resolve("task-clock").unwrap(),
            Event::Software(Software::TASK_CLOCK)
        ));
    }

    #[test]
    fn resolves_raw_hex_events() {
        let resolver = SymbolTableResolver;
        match resolver.resolve("raw:1a8").unwrap() {
            Event::Raw(config) => assert_eq!(config, 0x1a8),
            other => panic!("expected raw event, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_names() {
        let resolver = SymbolTableResolver;
        assert!(matches!(
            resolver.resolve("not-a-real-event"),
            Err(EventResolveError::UnknownEvent(_))
        ));
    }

    #[test]
    fn rejects_malformed_raw_events() {
        let resolver = SymbolTableResolver;
        assert!(matches!(
            resolver.resolve("raw:not-hex"),
            Err(EventResolveError::InvalidRaw(_, _))
        ));
    }
}
