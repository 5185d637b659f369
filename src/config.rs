//! Process-wide engine configuration: environment toggles are read
//! once, built into an `EngineConfig`, and passed by reference from
//! there on.

use csv::{QuoteStyle, Terminator};

const DEFAULT_BLOCK_SIZE: u32 = 50_000;
const DEFAULT_BATCH_ROWS: usize = 10_000;
const DEFAULT_FLUSH_EVERY: usize = 8_192;
const PARALLEL_MIN_FILE_SIZE: u64 = 10 * 1024 * 1024;
const PARALLEL_MIN_LIMIT: u64 = 10_000;

/// CSV dialect knobs for the output writer. The reader's dialect is
/// fixed to RFC 4180; only the writer side is configurable.
#[derive(Debug, Clone)]
pub struct Dialect {
    delimiter: u8,
    terminator: Terminator,
    quote: u8,
    quote_style: QuoteStyle,
    double_quote: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            delimiter: b',',
            terminator: Terminator::Any(b'\n'),
            quote: b'"',
            quote_style: QuoteStyle::Necessary,
            double_quote: true,
        }
    }
}

impl Dialect {
    pub fn csv_writer_from_writer<W: std::io::Write>(&self, wtr: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(self.terminator)
            .quote(self.quote)
            .quote_style(self.quote_style)
            .double_quote(self.double_quote)
            .from_writer(wtr)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub debug: bool,
    pub no_parallel: bool,
    pub parallelism: usize,
    pub block_size: u32,
    pub batch_rows: usize,
    pub flush_every: usize,
    pub dialect: Dialect,
}

impl EngineConfig {
    /// Reads `SIDX_NO_PARALLEL`/`SIDX_DEBUG` exactly once. Never call
    /// this from inside a scanning loop.
    pub fn from_env() -> EngineConfig {
        EngineConfigBuilder::new().build_from_env()
    }

    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    pub fn channel_capacity(&self) -> usize {
        2 * self.parallelism.max(1)
    }

    /// True when a file is large enough, and the query's limit (if any)
    /// loose enough, to justify the overhead of the parallel scanner.
    pub fn should_use_parallel(&self, file_size: u64, limit: Option<u64>) -> bool {
        if self.no_parallel {
            return false;
        }
        if file_size < PARALLEL_MIN_FILE_SIZE {
            return false;
        }
        match limit {
            None => true,
            Some(n) => n >= PARALLEL_MIN_LIMIT,
        }
    }
}

pub struct EngineConfigBuilder {
    debug: Option<bool>,
    no_parallel: Option<bool>,
    parallelism: usize,
    block_size: u32,
    batch_rows: usize,
    flush_every: usize,
    dialect: Dialect,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        EngineConfigBuilder {
            debug: None,
            no_parallel: None,
            parallelism: num_cpus::get().max(1),
            block_size: DEFAULT_BLOCK_SIZE,
            batch_rows: DEFAULT_BATCH_ROWS,
            flush_every: DEFAULT_FLUSH_EVERY,
            dialect: Dialect::default(),
        }
    }

    pub fn debug(mut self, yes: bool) -> Self {
        self.debug = Some(yes);
        self
    }

    pub fn no_parallel(mut self, yes: bool) -> Self {
        self.no_parallel = Some(yes);
        self
    }

    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    pub fn block_size(mut self, n: u32) -> Self {
        self.block_size = n;
        self
    }

    pub fn batch_rows(mut self, n: usize) -> Self {
        self.batch_rows = n;
        self
    }

    pub fn flush_every(mut self, n: usize) -> Self {
        self.flush_every = n;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig {
            debug: self.debug.unwrap_or(false),
            no_parallel: self.no_parallel.unwrap_or(false),
            parallelism: self.parallelism,
            block_size: self.block_size,
            batch_rows: self.batch_rows,
            flush_every: self.flush_every,
            dialect: self.dialect,
        }
    }

    fn build_from_env(mut self) -> EngineConfig {
        if self.debug.is_none() {
            self.debug = Some(env_flag("SIDX_DEBUG"));
        }
        if self.no_parallel.is_none() {
            self.no_parallel = Some(env_flag("SIDX_NO_PARALLEL"));
        }
        self.build()
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        EngineConfigBuilder::new()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_requires_minimum_file_size() {
        let config = EngineConfig::builder().build();
        assert!(!config.should_use_parallel(1024, None));
        assert!(config.should_use_parallel(20 * 1024 * 1024, None));
    }

    #[test]
    fn parallel_requires_limit_above_threshold() {
        let config = EngineConfig::builder().build();
        assert!(config.should_use_parallel(20 * 1024 * 1024, Some(50_000)));
        assert!(!config.should_use_parallel(20 * 1024 * 1024, Some(5)));
    }

    #[test]
    fn no_parallel_override_always_wins() {
        let config = EngineConfig::builder().no_parallel(true).build();
        assert!(!config.should_use_parallel(20 * 1024 * 1024, None));
    }

    #[test]
    fn channel_capacity_is_twice_parallelism() {
        let config = EngineConfig::builder().parallelism(4).build();
        assert_eq!(config.channel_capacity(), 8);
    }
}
