use std::fmt;

use once_cell::sync::Lazy;

/// Instruction set a convolution executes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimdLevel {
    Portable,
    Sse2,
    Neon,
    Avx2,
}

impl SimdLevel {
    pub const fn label(self) -> &'static str {
        match self {
            SimdLevel::Portable => "portable",
            SimdLevel::Sse2 => "sse2",
            SimdLevel::Neon => "neon",
            SimdLevel::Avx2 => "avx2",
        }
    }

    /// Work ratio `src_c * stride² / kernel_area` below which the direct
    /// NHWC kernels beat im2row + GEMM on this instruction set.
    pub const fn nhwc_direct_ratio(self) -> f64 {
        match self {
            SimdLevel::Portable => 2.0,
            SimdLevel::Sse2 | SimdLevel::Neon => 4.0,
            SimdLevel::Avx2 => 8.0,
        }
    }

    /// The running CPU can execute this level.
    pub fn is_available(self) -> bool {
        match self {
            SimdLevel::Portable => true,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => true,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => {
                std::arch::is_x86_feature_detected!("avx2") && std::arch::is_x86_feature_detected!("fma")
            }
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => std::arch::is_aarch64_feature_detected!("neon"),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Every level the running CPU supports, narrowest first.
    pub fn available() -> Vec<SimdLevel> {
        [SimdLevel::Portable, SimdLevel::Sse2, SimdLevel::Neon, SimdLevel::Avx2]
            .into_iter()
            .filter(|level| level.is_available())
            .collect()
    }

    fn parse(value: &str) -> Option<SimdLevel> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portable" | "scalar" => Some(SimdLevel::Portable),
            "sse2" | "sse" => Some(SimdLevel::Sse2),
            "neon" => Some(SimdLevel::Neon),
            "avx2" => Some(SimdLevel::Avx2),
            _ => None,
        }
    }
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

static LEVEL: Lazy<SimdLevel> = Lazy::new(|| {
    let detected = detect();
    let level = match std::env::var("SYNET_CONV_SIMD_MAX") {
        Ok(value) => match SimdLevel::parse(&value) {
            Some(ceiling) => best_at_most(ceiling),
            None => {
                log::warn!("ignoring SYNET_CONV_SIMD_MAX={:?}", value);
                detected
            }
        },
        Err(_) => detected,
    };
    log::info!("convolution simd level: {} (detected {})", level, detected);
    level
});

/// Widest instruction set available, after the environment ceiling.
pub fn simd_level() -> SimdLevel {
    *LEVEL
}

fn detect() -> SimdLevel {
    best_at_most(SimdLevel::Avx2)
}

/// Widest available level not above `ceiling`.
fn best_at_most(ceiling: SimdLevel) -> SimdLevel {
    SimdLevel::available()
        .into_iter()
        .filter(|&level| level <= ceiling)
        .max()
        .unwrap_or(SimdLevel::Portable)
}
