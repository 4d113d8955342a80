//! Tasking configuration

use log::LevelFilter;

/// Upper bound on the number of cores the tasking service manages
pub const MAX_CORES: usize = 64;

/// Round a fresh core starts in; new schedule entries carry round 0
pub const INITIAL_ROUND: u64 = 1;

#[cfg(feature = "thread-dumping")]
const DEFAULT_DUMP_INTERVAL: Option<u64> = Some(10_000);
#[cfg(not(feature = "thread-dumping"))]
const DEFAULT_DUMP_INTERVAL: Option<u64> = None;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Physical cores that get their own scheduler
    pub cores: usize,
    /// Log a scheduler dump every this many scheduling decisions
    pub dump_interval: Option<u64>,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }

    pub fn with_dump_interval(mut self, interval: Option<u64>) -> Self {
        self.dump_interval = interval;
        self
    }

    /// Core count clamped to what the service supports
    pub fn core_count(&self) -> usize {
        self.cores.clamp(1, MAX_CORES)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cores: 1,
            dump_interval: DEFAULT_DUMP_INTERVAL,
            log_level: LevelFilter::Info,
        }
    }
}
