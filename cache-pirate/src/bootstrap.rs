//! Wires every collaborator together into one run: reads LLC geometry,
//! allocates the shared backing buffer, spawns the pirate threads, forks
//! and attaches the target, writes the header, and hands control to the
//! [`Coordinator`].

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use perf_event::Builder;

use crate::buffer::HugePageBuffer;
use crate::cli::{ResolvedEvent, SampleRate, Settings};
use crate::coordinator::Coordinator;
use crate::counter_group::{CounterDescriptor, PendingGroup, SampleTrigger};
use crate::pirate::{PirateConfig, PirateReady, PirateWorker};
use crate::sink::{CounterInfo, FileSink, Header, PirateSetup, SampleSink, TargetSetup};
use crate::state::{PirateCell, PirateState, TargetCell, TargetState};
use crate::target;
use crate::topology::CacheTopology;

/// The `(type_, config, config1, config2)` a resolved event would be opened
/// with, read off a throwaway `Builder` without ever calling `build()`.
fn descriptor_info(event: &ResolvedEvent) -> CounterInfo {
    let builder = Builder::new().kind(event.event.clone());
    let attrs = builder.attrs();
    CounterInfo {
        name: event.name.clone(),
        type_: attrs.type_,
        config: attrs.config,
        config1: attrs.config1,
        config2: attrs.config2,
    }
}

fn pirate_descriptors(events: &[ResolvedEvent]) -> PendingGroup {
    let mut group = PendingGroup::new();
    for event in events {
        group.append(CounterDescriptor::new(event.name.clone(), event.event.clone()));
    }
    group
}

fn target_descriptors(events: &[ResolvedEvent], sample_rate: SampleRate) -> PendingGroup {
    let mut group = PendingGroup::new();
    for (i, event) in events.iter().enumerate() {
        let mut descriptor = CounterDescriptor::new(event.name.clone(), event.event.clone());
        if i == 0 {
            descriptor.pinned = true;
            descriptor.start_enabled = false;
            descriptor.enable_on_exec = true;
            descriptor.sample_trigger = Some(match sample_rate {
                SampleRate::Period(period) => SampleTrigger::Period(period),
                SampleRate::Frequency(freq) => SampleTrigger::Frequency(freq),
            });
        }
        group.append(descriptor);
    }
    group
}

/// Run one full measurement session to completion, returning the process
/// exit code to propagate (the target's own code on normal exit, or a
/// nonzero failure code otherwise).
pub fn run(settings: Settings, topology: &dyn CacheTopology) -> Result<i32> {
    // Block SIGINT/SIGCHLD on this thread before anything that inherits our
    // signal mask exists: pirate threads copy it at spawn, and the target
    // copies it at fork. Doing this any later leaves a window where the
    // target's own exec-stop SIGCHLD arrives before the signalfd does and is
    // silently dropped (default-ignored), hanging the coordinator in `poll`
    // forever, or where a pirate thread could receive SIGINT/SIGCHLD itself.
    let signal_mask = target::block_signals().context("blocking startup signals")?;
    let signal_fd = target::create_signal_fd(&signal_mask).context("creating signalfd")?;

    let geometry = topology
        .llc_geometry(settings.target_cpu)
        .context("reading last-level cache topology")?;

    let n_pirates = settings.pirate_cpus.len();
    let pirate_config = Arc::new(PirateConfig::new(
        geometry.size,
        geometry.ways,
        geometry.line_size,
        n_pirates,
    ));

    if let Some(fixed) = settings.pirate_size {
        pirate_config.current_size.store(fixed, Ordering::Release);
    }

    let buffer = HugePageBuffer::allocate(pirate_config.alloc_size).context("allocating huge-page backing buffer")?;
    let buffer_view = buffer.view();

    let target_cell = Arc::new(TargetCell::new(TargetState::WaitExec));

    let (ready_tx, ready_rx) = mpsc::channel::<PirateReady>();
    let mut pirate_cells = Vec::with_capacity(n_pirates);
    let mut join_handles = Vec::with_capacity(n_pirates);

    for (pirate_number, &cpu) in settings.pirate_cpus.iter().enumerate() {
        let cell = Arc::new(PirateCell::new(PirateState::NextSize));
        pirate_cells.push(Arc::clone(&cell));

        let worker = PirateWorker {
            pirate_number,
            n_pirates,
            cpu,
            config: Arc::clone(&pirate_config),
            cell,
            target_cell: Arc::clone(&target_cell),
            buffer: buffer_view,
            counters: pirate_descriptors(&settings.pirate_events),
            take_reference: pirate_number == 0 && settings.take_reference,
        };

        let tx = ready_tx.clone();
        join_handles.push(thread::spawn(move || {
            if let Err(err) = crate::pirate::run(worker, tx) {
                tracing::error!(pirate = pirate_number, %err, "pirate worker failed");
            }
        }));
    }
    drop(ready_tx);

    let mut ready_by_number = std::collections::HashMap::with_capacity(n_pirates);
    for _ in 0..n_pirates {
        let ready = ready_rx
            .recv()
            .context("a pirate worker exited before becoming ready")?;
        ready_by_number.insert(ready.pirate_number, ready);
    }

    let mut pirate_groups = Vec::with_capacity(n_pirates);
    let mut reference = None;
    for i in 0..n_pirates {
        let ready = ready_by_number
            .remove(&i)
            .expect("every pirate number 0..n_pirates reported ready");
        if ready.reference.is_some() {
            reference = ready.reference;
        }
        pirate_groups.push(ready.group);
    }

    // In fixed-size (no-sweep) mode every pirate starts at `NextSize` and
    // moves off it only once its warm-up pass over the working set has
    // actually run, not merely once its counter group is attached. Releasing
    // the target before that leaves it racing pirates that haven't started
    // occupying cache yet, skewing the very first samples.
    if settings.pirate_size.is_some() {
        for cell in &pirate_cells {
            while cell.load() == PirateState::NextSize {
                std::hint::spin_loop();
            }
        }
    }

    let pending_target = target::fork_stopped(settings.target_cpu, &settings.command, &settings.command_args)
        .context("forking target process")?;

    let target_group_pending = target_descriptors(&settings.target_events, settings.sample_rate);
    let target_group = match target_group_pending.attach(pending_target.pid().as_raw(), Some(settings.target_cpu)) {
        Ok(group) => group,
        Err(err) => {
            let _ = pending_target.abort();
            return Err(err).context("attaching target counter group");
        }
    };

    target::route_overflow_signal(target_group.leader_fd(), pending_target.pid())
        .context("routing overflow signal to target")?;

    let target_pid = pending_target.release().context("releasing target to exec")?;

    let mut sink = FileSink::create(&settings.output).context("creating sample sink")?;

    let header = Header {
        target: TargetSetup {
            cpu: settings.target_cpu as u32,
            sample_period: match settings.sample_rate {
                SampleRate::Period(p) => p,
                SampleRate::Frequency(f) => f,
            },
            counters: settings.target_events.iter().map(descriptor_info).collect(),
            command: format!("{} {}", settings.command, settings.command_args.join(" ")),
        },
        pirate: PirateSetup {
            ways: pirate_config.ways as u32,
            cache_size: pirate_config.cache_size as u64,
            stride: pirate_config.stride as u32,
            way_size: pirate_config.way_size as u64,
            no_sweep: settings.pirate_size.is_some(),
            n_pirates: n_pirates as u32,
            cpus: settings.pirate_cpus.iter().map(|&c| c as u32).collect(),
            counters: settings.pirate_events.iter().map(descriptor_info).collect(),
        },
        reference,
    };
    sink.write_header(&header).context("writing header")?;

    let coordinator = Coordinator {
        target_pid,
        target_group,
        pirate_cells,
        pirate_groups,
        pirate_config,
        target_cell,
        no_sweep: settings.pirate_size.is_some(),
        heat_time: Duration::from_micros(settings.heat_time_us),
        sink,
        signal_fd,
    };

    let code = coordinator.run().context("running coordination loop")?;
    Ok(code)
}
