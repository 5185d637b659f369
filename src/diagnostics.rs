//! `SIDX_DEBUG`-gated stderr diagnostics: index load/validation
//! failures, prune counts, seek targets, and the chosen scan strategy
//! are all reported straight to stderr with `eprintln!` rather than a
//! logging crate, kept in one place so call sites stay one-liners.

use crate::config::EngineConfig;

pub fn index_validation_failed(config: &EngineConfig, path: &std::path::Path, reason: &str) {
    if config.debug {
        eprintln!("sidx: ignoring index {}: {}", path.display(), reason);
    }
}

pub fn index_loaded(config: &EngineConfig, path: &std::path::Path, num_blocks: usize) {
    if config.debug {
        eprintln!("sidx: loaded index {} ({} blocks)", path.display(), num_blocks);
    }
}

pub fn prune_summary(config: &EngineConfig, pruned: usize, total: usize) {
    if config.debug {
        eprintln!("sidx: pruned {pruned}/{total} blocks");
    }
}

pub fn seek_target(config: &EngineConfig, block_index: usize, start_offset: u64) {
    if config.debug {
        eprintln!("sidx: seeking to block {block_index} at offset {start_offset}");
    }
}

pub fn strategy_chosen(config: &EngineConfig, strategy: &str) {
    if config.debug {
        eprintln!("sidx: strategy = {strategy}");
    }
}
