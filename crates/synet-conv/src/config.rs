//! Cache-size configuration consumed by the blocking planner.
//!
//! Sizes default to a typical desktop core and can be overridden with the
//! `SYNET_CONV_L1`, `SYNET_CONV_L2` and `SYNET_CONV_L3` environment variables
//! (bytes, with an optional `K`/`M` suffix). The environment is read once.

use once_cell::sync::Lazy;

use crate::conv::Strategy;
use crate::simd::SimdLevel;

pub const DEFAULT_L1: usize = 32 * 1024;
pub const DEFAULT_L2: usize = 1024 * 1024;
pub const DEFAULT_L3: usize = 8 * 1024 * 1024;

/// Data cache sizes in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSizes {
    pub l1: usize,
    pub l2: usize,
    pub l3: usize,
}

impl Default for CacheSizes {
    fn default() -> Self {
        Self {
            l1: DEFAULT_L1,
            l2: DEFAULT_L2,
            l3: DEFAULT_L3,
        }
    }
}

static CACHE_SIZES: Lazy<CacheSizes> = Lazy::new(|| {
    let defaults = CacheSizes::default();
    let sizes = CacheSizes {
        l1: env_size("SYNET_CONV_L1").unwrap_or(defaults.l1),
        l2: env_size("SYNET_CONV_L2").unwrap_or(defaults.l2),
        l3: env_size("SYNET_CONV_L3").unwrap_or(defaults.l3),
    };
    log::debug!("cache sizes: l1={} l2={} l3={}", sizes.l1, sizes.l2, sizes.l3);
    sizes
});

impl CacheSizes {
    pub const fn new(l1: usize, l2: usize, l3: usize) -> Self {
        Self { l1, l2, l3 }
    }

    /// Process-wide sizes: defaults with environment overrides applied.
    pub fn detect() -> Self {
        *CACHE_SIZES
    }
}

fn env_size(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    let parsed = parse_size(&value);
    if parsed.is_none() {
        log::warn!("ignoring {}={:?}: expected a positive byte count", name, value);
    }
    parsed
}

/// Parse `"32768"`, `"32K"` or `"1M"` into bytes.
pub(crate) fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    let (digits, scale) = match value.char_indices().last()? {
        (i, 'k' | 'K') => (&value[..i], 1024),
        (i, 'm' | 'M') => (&value[..i], 1024 * 1024),
        _ => (value, 1),
    };
    digits
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&v| v > 0)
        .map(|v| v * scale)
}

/// Construction options for [`crate::Convolution::with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvOptions {
    /// Cache sizes for the planner; `None` uses [`CacheSizes::detect`].
    pub caches: Option<CacheSizes>,
    /// Vector backend; `None` uses [`crate::simd::simd_level`].
    pub level: Option<SimdLevel>,
    /// Forced strategy; `None` lets [`crate::conv::select_strategy`] choose.
    pub strategy: Option<Strategy>,
}

impl ConvOptions {
    pub fn caches(mut self, caches: CacheSizes) -> Self {
        self.caches = Some(caches);
        self
    }

    pub fn level(mut self, level: SimdLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}
