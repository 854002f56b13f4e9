//! Sample sink: the on-disk wire format, and a deterministic in-memory fake.
//!
//! Wire format: an 8-byte magic marker, then one length-prefixed header
//! record, then zero or more length-prefixed sample records. Lengths are
//! 32-bit little-endian byte counts of the record that follows.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::SinkError;

const MAGIC: &[u8; 8] = b"PIRATEv1";

/// Describes one attached counter, as recorded in the header.
#[derive(Debug, Clone)]
pub struct CounterInfo {
    pub name: String,
    pub type_: u32,
    pub config: u64,
    pub config1: u64,
    pub config2: u64,
}

/// A one-time reference measurement, taken by pirate worker #0.
#[derive(Debug, Clone)]
pub struct Reference {
    pub size: u64,
    pub values: Vec<u64>,
}

/// Pirate-side configuration recorded in the header.
#[derive(Debug, Clone)]
pub struct PirateSetup {
    pub ways: u32,
    pub cache_size: u64,
    pub stride: u32,
    pub way_size: u64,
    pub no_sweep: bool,
    pub n_pirates: u32,
    pub cpus: Vec<u32>,
    pub counters: Vec<CounterInfo>,
}

/// Target-side configuration recorded in the header.
#[derive(Debug, Clone)]
pub struct TargetSetup {
    pub cpu: u32,
    pub sample_period: u64,
    pub counters: Vec<CounterInfo>,
    pub command: String,
}

/// The one-time header emitted right after the optional reference measurement.
#[derive(Debug, Clone)]
pub struct Header {
    pub target: TargetSetup,
    pub pirate: PirateSetup,
    pub reference: Option<Reference>,
}

/// One sweep point: the target's counter values plus every pirate's.
#[derive(Debug, Clone)]
pub struct Sample {
    pub target_size: u64,
    pub target_values: Vec<u64>,
    pub pirate_size: u64,
    pub pirate_values: Vec<Vec<u64>>,
}

/// Accepts a header (once) and samples (repeatedly). The core never retries a
/// failed call; durability of each call is the sink's responsibility.
pub trait SampleSink {
    fn write_header(&mut self, header: &Header) -> Result<(), SinkError>;
    fn write_sample(&mut self, sample: &Sample) -> Result<(), SinkError>;
}

fn encode_counter_info(buf: &mut Vec<u8>, ctr: &CounterInfo) {
    let name_bytes = ctr.name.as_bytes();
    buf.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&ctr.type_.to_le_bytes());
    buf.extend_from_slice(&ctr.config.to_le_bytes());
    buf.extend_from_slice(&ctr.config1.to_le_bytes());
    buf.extend_from_slice(&ctr.config2.to_le_bytes());
}

fn encode_counter_list(buf: &mut Vec<u8>, counters: &[CounterInfo]) {
    buf.extend_from_slice(&(counters.len() as u32).to_le_bytes());
    for ctr in counters {
        encode_counter_info(buf, ctr);
    }
}

fn encode_header(header: &Header) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(&header.target.cpu.to_le_bytes());
    buf.extend_from_slice(&header.target.sample_period.to_le_bytes());
    encode_counter_list(&mut buf, &header.target.counters);
    let command_bytes = header.target.command.as_bytes();
    buf.extend_from_slice(&(command_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(command_bytes);

    buf.extend_from_slice(&header.pirate.ways.to_le_bytes());
    buf.extend_from_slice(&header.pirate.cache_size.to_le_bytes());
    buf.extend_from_slice(&header.pirate.stride.to_le_bytes());
    buf.extend_from_slice(&header.pirate.way_size.to_le_bytes());
    buf.push(header.pirate.no_sweep as u8);
    buf.extend_from_slice(&header.pirate.n_pirates.to_le_bytes());
    buf.extend_from_slice(&(header.pirate.cpus.len() as u32).to_le_bytes());
    for cpu in &header.pirate.cpus {
        buf.extend_from_slice(&cpu.to_le_bytes());
    }
    encode_counter_list(&mut buf, &header.pirate.counters);

    match &header.reference {
        Some(reference) => {
            buf.push(1);
            buf.extend_from_slice(&reference.size.to_le_bytes());
            buf.extend_from_slice(&(reference.values.len() as u32).to_le_bytes());
            for value in &reference.values {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        None => buf.push(0),
    }

    buf
}

fn encode_sample(sample: &Sample) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(&sample.target_size.to_le_bytes());
    buf.extend_from_slice(&(sample.target_values.len() as u32).to_le_bytes());
    for value in &sample.target_values {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    buf.extend_from_slice(&sample.pirate_size.to_le_bytes());
    buf.extend_from_slice(&(sample.pirate_values.len() as u32).to_le_bytes());
    for pirate_values in &sample.pirate_values {
        buf.extend_from_slice(&(pirate_values.len() as u32).to_le_bytes());
        for value in pirate_values {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    buf
}

fn write_record(out: &mut impl Write, payload: &[u8]) -> Result<(), SinkError> {
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(payload)?;
    out.flush()?;
    Ok(())
}

/// Writes the wire format described above to a file, flushing after every
/// record so a killed process leaves a stream truncated at a record boundary.
pub struct FileSink {
    out: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(MAGIC)?;
        out.flush()?;
        Ok(FileSink { out })
    }
}

impl SampleSink for FileSink {
    fn write_header(&mut self, header: &Header) -> Result<(), SinkError> {
        write_record(&mut self.out, &encode_header(header))
    }

    fn write_sample(&mut self, sample: &Sample) -> Result<(), SinkError> {
        write_record(&mut self.out, &encode_sample(sample))
    }
}

/// Captures emitted records in memory, for tests.
#[derive(Default)]
pub struct MemorySink {
    pub header: Option<Header>,
    pub samples: Vec<Sample>,
}

impl SampleSink for MemorySink {
    fn write_header(&mut self, header: &Header) -> Result<(), SinkError> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn write_sample(&mut self, sample: &Sample) -> Result<(), SinkError> {
        self.samples.push(sample.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            target: TargetSetup {
                cpu: 0,
                sample_period: 1_000_000,
                counters: vec![CounterInfo {
                    name: "instructions".into(),
                    type_: 0,
                    config: 1,
                    config1: 0,
                    config2: 0,
                }],
                command: "echo hi".into(),
            },
            pirate: PirateSetup {
                ways: 16,
                cache_size: 1 << 20,
                stride: 64,
                way_size: 1 << 16,
                no_sweep: false,
                n_pirates: 1,
                cpus: vec![1],
                counters: vec![
                    CounterInfo {
                        name: "instructions".into(),
                        type_: 0,
                        config: 1,
                        config1: 0,
                        config2: 0,
                    },
                    CounterInfo {
                        name: "cycles".into(),
                        type_: 0,
                        config: 0,
                        config1: 0,
                        config2: 0,
                    },
                ],
            },
            reference: None,
        }
    }

    #[test]
    fn file_sink_writes_magic_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut sink = FileSink::create(&path).unwrap();
        sink.write_header(&sample_header()).unwrap();
        sink.write_sample(&Sample {
            target_size: 1 << 19,
            target_values: vec![42],
            pirate_size: 1 << 19,
            pirate_values: vec![vec![1, 2]],
        })
        .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], MAGIC);
        assert!(bytes.len() > 8);
    }

    #[test]
    fn memory_sink_captures_header_and_samples() {
        let mut sink = MemorySink::default();
        sink.write_header(&sample_header()).unwrap();
        sink.write_sample(&Sample {
            target_size: 0,
            target_values: vec![1],
            pirate_size: 1 << 20,
            pirate_values: vec![vec![7, 8]],
        })
        .unwrap();

        assert!(sink.header.is_some());
        assert_eq!(sink.samples.len(), 1);
        assert_eq!(sink.samples[0].target_size, 0);
    }
}
