//! Cache topology oracle: `{ways, size, line_size}` for a CPU's last-level cache.

use std::fs;
use std::path::Path;

use crate::error::TopologyError;

/// LLC parameters for one CPU, as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    pub ways: usize,
    pub size: usize,
    pub line_size: usize,
}

/// Reads cache topology for a given CPU. Pluggable so tests can substitute
/// fixed values without touching the filesystem.
pub trait CacheTopology {
    fn llc_geometry(&self, cpu: usize) -> Result<CacheGeometry, TopologyError>;
}

/// Reads `/sys/devices/system/cpu/cpu<N>/cache/index<M>/` for the
/// highest-numbered cache index exposed for `cpu` — i.e. the LLC.
pub struct SysfsTopology;

impl SysfsTopology {
    fn cache_index_path(cpu: usize, index: usize) -> String {
        format!("/sys/devices/system/cpu/cpu{cpu}/cache/index{index}/")
    }

    fn read_suffixed_int(path: &Path) -> Result<usize, TopologyError> {
        let raw = fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw = raw.trim();

        let malformed = || TopologyError::Malformed {
            path: path.display().to_string(),
            value: raw.to_string(),
        };

        let (digits, factor) = match raw.strip_suffix('K') {
            Some(digits) => (digits, 1024),
            None => match raw.strip_suffix('M') {
                Some(digits) => (digits, 1024 * 1024),
                None => (raw, 1),
            },
        };

        let value: usize = digits.parse().map_err(|_| malformed())?;
        Ok(value * factor)
    }

    fn read_plain_int(path: &Path) -> Result<usize, TopologyError> {
        let raw = fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        raw.trim().parse().map_err(|_| TopologyError::Malformed {
            path: path.display().to_string(),
            value: raw,
        })
    }
}

impl CacheTopology for SysfsTopology {
    fn llc_geometry(&self, cpu: usize) -> Result<CacheGeometry, TopologyError> {
        let mut last_index = None;
        let mut index = 0;
        loop {
            let path = Self::cache_index_path(cpu, index);
            if !Path::new(&path).exists() {
                break;
            }
            last_index = Some(index);
            index += 1;
        }

        let llc_index = last_index.ok_or(TopologyError::NoCacheIndex(cpu))?;
        let base = Self::cache_index_path(cpu, llc_index);

        let ways = Self::read_plain_int(&Path::new(&base).join("ways_of_associativity"))?;
        let size = Self::read_suffixed_int(&Path::new(&base).join("size"))?;
        let line_size = Self::read_plain_int(&Path::new(&base).join("coherency_line_size"))?;

        Ok(CacheGeometry {
            ways,
            size,
            line_size,
        })
    }
}

/// A topology oracle that returns caller-supplied values, for tests.
pub struct FixedTopology(pub CacheGeometry);

impl CacheTopology for FixedTopology {
    fn llc_geometry(&self, _cpu: usize) -> Result<CacheGeometry, TopologyError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_topology_returns_configured_geometry() {
        let geom = CacheGeometry {
            ways: 16,
            size: 1024 * 1024,
            line_size: 64,
        };
        let oracle = FixedTopology(geom);
        assert_eq!(oracle.llc_geometry(0).unwrap(), geom);
        assert_eq!(oracle.llc_geometry(3).unwrap(), geom);
    }
}
