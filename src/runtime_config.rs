//! # Runtime Configuration Module
//!
//! Environment-driven defaults for the pipeline.
//!
//! ## Environment Variables
//!
//! ### `BULK_DISPATCH_WORKERS` / `BULK_PROCESS_WORKERS`
//!
//! Pool sizes used by [`Batch::from_config`](crate::Batch::from_config). Default: `20` each.
//! Zero or unparsable values fall back to the default.
//!
//! ### `BULK_STACK_SIZE`
//!
//! Stack size of every pipeline coroutine. Accepts values in:
//! - Decimal: `65536` (64 KB)
//! - Hexadecimal: `0x10000` (64 KB)
//!
//! Default: `0x10000` (64 KB)
//!
//! Dispatch workers run the transport on their own stack, so a transport with deep call
//! chains needs more than a processing worker does. Total virtual memory per run is roughly
//! `stack_size × (dispatch_workers + process_workers + 3)`.
//!
//! ### `BULK_COLLECTOR_POLL_MS`
//!
//! How long the collector parks when its input is momentarily empty before checking the
//! scope again. Default: `1`.
//!
//! ## Usage
//!
//! ```rust
//! use bulkhttp::PipelineConfig;
//!
//! let config = PipelineConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use std::env;
use std::time::Duration;

const DEFAULT_WORKERS: usize = 20;
const DEFAULT_STACK_SIZE: usize = 0x10000;
const DEFAULT_COLLECTOR_POLL: Duration = Duration::from_millis(1);

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Default dispatch pool size (Wd)
    pub dispatch_workers: usize,
    /// Default processing pool size (Wp)
    pub process_workers: usize,
    /// Stack size for pipeline coroutines in bytes
    pub stack_size: usize,
    /// Collector park interval while waiting for outcomes
    pub collector_poll: Duration,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let dispatch_workers = env::var("BULK_DISPATCH_WORKERS")
            .ok()
            .and_then(|s| parse_workers(&s))
            .unwrap_or(DEFAULT_WORKERS);

        let process_workers = env::var("BULK_PROCESS_WORKERS")
            .ok()
            .and_then(|s| parse_workers(&s))
            .unwrap_or(DEFAULT_WORKERS);

        let stack_size = env::var("BULK_STACK_SIZE")
            .ok()
            .and_then(|s| parse_stack_size(&s))
            .unwrap_or(DEFAULT_STACK_SIZE);

        let collector_poll = env::var("BULK_COLLECTOR_POLL_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_COLLECTOR_POLL);

        Self {
            dispatch_workers,
            process_workers,
            stack_size,
            collector_poll,
        }
    }

    /// Defaults with the given pool sizes
    #[must_use]
    pub fn with_workers(dispatch_workers: usize, process_workers: usize) -> Self {
        Self {
            dispatch_workers,
            process_workers,
            ..Self::default()
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dispatch_workers: DEFAULT_WORKERS,
            process_workers: DEFAULT_WORKERS,
            stack_size: DEFAULT_STACK_SIZE,
            collector_poll: DEFAULT_COLLECTOR_POLL,
        }
    }
}

fn parse_workers(s: &str) -> Option<usize> {
    s.trim().parse().ok().filter(|n: &usize| *n > 0)
}

/// Decimal or `0x`-prefixed hexadecimal
fn parse_stack_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.dispatch_workers, 20);
        assert_eq!(config.process_workers, 20);
        assert_eq!(config.stack_size, 0x10000);
        assert_eq!(config.collector_poll, Duration::from_millis(1));
    }

    #[test]
    fn test_parse_stack_size() {
        assert_eq!(parse_stack_size("0x8000"), Some(0x8000));
        assert_eq!(parse_stack_size("0X4000"), Some(0x4000));
        assert_eq!(parse_stack_size("32768"), Some(32768));
        assert_eq!(parse_stack_size(" 4096 "), Some(4096));
        assert_eq!(parse_stack_size("0xZZ"), None);
        assert_eq!(parse_stack_size("big"), None);
    }

    #[test]
    fn test_parse_workers_rejects_zero() {
        assert_eq!(parse_workers("4"), Some(4));
        assert_eq!(parse_workers("0"), None);
        assert_eq!(parse_workers("-1"), None);
    }

    #[test]
    fn test_with_workers_keeps_other_defaults() {
        let config = PipelineConfig::with_workers(2, 3);
        assert_eq!(config.dispatch_workers, 2);
        assert_eq!(config.process_workers, 3);
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
    }
}
