//! Command-line surface and the validated [`Settings`] it resolves into.
//!
//! `Cli` is the raw `clap`-derived argument struct; [`Cli::into_settings`]
//! resolves it against the event resolver into a `Settings` value with no
//! remaining unparsed strings, performing every configuration-time check
//! (CPU disjointness, event name resolution) before any kernel resource is
//! touched.

use std::collections::HashSet;

use clap::Parser;

use crate::error::ConfigError;
use crate::events::EventResolver;

/// Raw command-line arguments, parsed but not yet validated against each
/// other or resolved against the event table.
#[derive(Debug, Parser)]
#[command(name = "cache-pirate", about = "Cache pirating: measure a target's performance as a function of available shared cache")]
pub struct Cli {
    /// CPU the target process is pinned to.
    #[arg(long, default_value_t = 0)]
    pub target_cpu: usize,

    /// CPU a pirate thread is pinned to. Repeatable; one thread per value.
    /// Defaults to one pirate on `target_cpu - 1`, or `1` if `target_cpu`
    /// is `0`.
    #[arg(long = "pirate-cpu")]
    pub pirate_cpus: Vec<usize>,

    /// Fix the pirate working-set size instead of sweeping it; disables
    /// the sweep and samples continuously at this size.
    #[arg(long)]
    pub pirate_size: Option<usize>,

    /// Symbolic target event name (e.g. `instructions`). Repeatable.
    #[arg(long = "target-event")]
    pub target_events: Vec<String>,

    /// Raw target event, as `raw:<hex>`. Repeatable; merged with
    /// `--target-event` in the order given on the command line is not
    /// preserved across the two flags, only within each.
    #[arg(long = "target-raw-event")]
    pub target_raw_events: Vec<String>,

    /// Extra pirate event name, added to every pirate's group in addition
    /// to `instructions` and `cycles`. Repeatable.
    #[arg(long = "pirate-event")]
    pub pirate_events: Vec<String>,

    /// Microseconds the target spends paused (counters disabled) after
    /// each full sweep wrap.
    #[arg(long, default_value_t = 10_000)]
    pub target_heat_time_us: u64,

    /// Sample period of the target's leader event, in occurrences.
    /// Mutually exclusive with `--sample-freq`.
    #[arg(long)]
    pub sample_period: Option<u64>,

    /// Sample frequency of the target's leader event, in Hz. Mutually
    /// exclusive with `--sample-period`.
    #[arg(long)]
    pub sample_freq: Option<u64>,

    /// Skip the one-time pirate reference measurement.
    #[arg(long)]
    pub no_reference: bool,

    /// Output path for the sample sink.
    #[arg(short, long, default_value = "pirate.out")]
    pub output: String,

    /// Target command and its arguments, after `--`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// The leader's sample-triggering rate: exactly one of period or frequency.
#[derive(Debug, Clone, Copy)]
pub enum SampleRate {
    Period(u64),
    Frequency(u64),
}

/// One resolved target or pirate event: a human-readable name plus the
/// `perf_event::events::Event` it resolves to.
#[derive(Debug, Clone)]
pub struct ResolvedEvent {
    pub name: String,
    pub event: perf_event::events::Event,
}

/// Fully validated, resolved configuration: no more strings to parse, no
/// more CPU conflicts to check. Everything the coordinator and bootstrap
/// need to wire up a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target_cpu: usize,
    pub pirate_cpus: Vec<usize>,
    pub pirate_size: Option<usize>,
    pub target_events: Vec<ResolvedEvent>,
    pub pirate_events: Vec<ResolvedEvent>,
    pub heat_time_us: u64,
    pub sample_rate: SampleRate,
    pub take_reference: bool,
    pub output: String,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Cli {
    /// Resolve the default pirate CPU list (one pirate on `target_cpu - 1`,
    /// or `1` when `target_cpu == 0`) unless the caller supplied one.
    fn pirate_cpus_or_default(&self) -> Vec<usize> {
        if !self.pirate_cpus.is_empty() {
            return self.pirate_cpus.clone();
        }
        let default_cpu = if self.target_cpu == 0 { 1 } else { self.target_cpu - 1 };
        vec![default_cpu]
    }

    /// Validate CPU disjointness and resolve every event name, producing an
    /// immutable [`Settings`]. No kernel resource is touched here.
    pub fn into_settings(self, resolver: &dyn EventResolver) -> Result<Settings, ConfigError> {
        let pirate_cpus = self.pirate_cpus_or_default();

        let mut seen = HashSet::new();
        for &cpu in &pirate_cpus {
            if cpu == self.target_cpu {
                return Err(ConfigError::PirateOnTargetCpu(cpu));
            }
            if !seen.insert(cpu) {
                return Err(ConfigError::DuplicatePirateCpu(cpu));
            }
        }

        if self.command.is_empty() {
            return Err(ConfigError::MissingCommand);
        }

        let mut target_events = Vec::new();
        for name in &self.target_events {
            target_events.push(ResolvedEvent {
                name: name.clone(),
                event: resolver.resolve(name)?,
            });
        }
        for name in &self.target_raw_events {
            let raw_name = format!("raw:{name}");
            target_events.push(ResolvedEvent {
                name: raw_name.clone(),
                event: resolver.resolve(&raw_name)?,
            });
        }
        if target_events.is_empty() {
            target_events.push(ResolvedEvent {
                name: "instructions".into(),
                event: resolver.resolve("instructions")?,
            });
        }

        let mut pirate_events = vec![
            ResolvedEvent {
                name: "instructions".into(),
                event: resolver.resolve("instructions")?,
            },
            ResolvedEvent {
                name: "cycles".into(),
                event: resolver.resolve("cycles")?,
            },
        ];
        for name in &self.pirate_events {
            pirate_events.push(ResolvedEvent {
                name: name.clone(),
                event: resolver.resolve(name)?,
            });
        }

        let sample_rate = match (self.sample_period, self.sample_freq) {
            (Some(period), None) => SampleRate::Period(period),
            (None, Some(freq)) => SampleRate::Frequency(freq),
            (None, None) => SampleRate::Period(1_000_000),
            (Some(_), Some(_)) => SampleRate::Period(1_000_000), // clap's `conflicts_with` would reject this earlier in a stricter build
        };

        let mut command = self.command;
        let program = command.remove(0);

        Ok(Settings {
            target_cpu: self.target_cpu,
            pirate_cpus,
            pirate_size: self.pirate_size,
            target_events,
            pirate_events,
            heat_time_us: self.target_heat_time_us,
            sample_rate,
            take_reference: !self.no_reference,
            output: self.output,
            command: program,
            command_args: command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SymbolTableResolver;

    fn base_cli(command: Vec<&str>) -> Cli {
        Cli {
            target_cpu: 0,
            pirate_cpus: vec![],
            pirate_size: None,
            target_events: vec![],
            target_raw_events: vec![],
            pirate_events: vec![],
            target_heat_time_us: 10_000,
            sample_period: None,
            sample_freq: None,
            no_reference: false,
            output: "out.bin".into(),
            command: command.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn defaults_one_pirate_to_cpu_1_when_target_is_cpu_0() {
        let resolver = SymbolTableResolver;
        let settings = base_cli(vec!["sleep", "1"]).into_settings(&resolver).unwrap();
        assert_eq!(settings.pirate_cpus, vec![1]);
        assert_eq!(settings.command, "sleep");
        assert_eq!(settings.command_args, vec!["1".to_string()]);
    }

    #[test]
    fn defaults_one_pirate_to_target_cpu_minus_one_otherwise() {
        let resolver = SymbolTableResolver;
        let mut cli = base_cli(vec!["sleep", "1"]);
        cli.target_cpu = 4;
        let settings = cli.into_settings(&resolver).unwrap();
        assert_eq!(settings.pirate_cpus, vec![3]);
    }

    #[test]
    fn rejects_pirate_cpu_equal_to_target_cpu() {
        let resolver = SymbolTableResolver;
        let mut cli = base_cli(vec!["sleep", "1"]);
        cli.pirate_cpus = vec![0];
        assert!(matches!(
            cli.into_settings(&resolver),
            Err(ConfigError::PirateOnTargetCpu(0))
        ));
    }

    #[test]
    fn rejects_duplicate_pirate_cpus() {
        let resolver = SymbolTableResolver;
        let mut cli = base_cli(vec!["sleep", "1"]);
        cli.pirate_cpus = vec![1, 1];
        assert!(matches!(
            cli.into_settings(&resolver),
            Err(ConfigError::DuplicatePirateCpu(1))
        ));
    }

    #[test]
    fn rejects_missing_command() {
        let resolver = SymbolTableResolver;
        let cli = base_cli(vec![]);
        assert!(matches!(cli.into_settings(&resolver), Err(ConfigError::MissingCommand)));
    }

    #[test]
    fn pirate_events_always_include_instructions_and_cycles() {
        let resolver = SymbolTableResolver;
        let settings = base_cli(vec!["sleep", "1"]).into_settings(&resolver).unwrap();
        let names: Vec<_> = settings.pirate_events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["instructions", "cycles"]);
    }

    #[test]
    fn defaults_to_instructions_when_no_target_event_given() {
        let resolver = SymbolTableResolver;
        let settings = base_cli(vec!["sleep", "1"]).into_settings(&resolver).unwrap();
        assert_eq!(settings.target_events.len(), 1);
        assert_eq!(settings.target_events[0].name, "instructions");
    }
}
