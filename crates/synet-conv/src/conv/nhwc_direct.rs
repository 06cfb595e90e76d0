use crate::config::CacheSizes;
use crate::core::{pack_bias, pack_weights, plan_blocks, AlgParam, PackedParams};
use crate::error::Result;
use crate::simd::{dispatch, SimdLevel};
use crate::types::ConvParam;

/// Cache-blocked, register-blocked direct convolution for ungrouped NHWC.
pub(crate) struct NhwcDirect {
    p: ConvParam,
    level: SimdLevel,
    alg: AlgParam,
    weight: Vec<f32>,
    bias: Vec<f32>,
    params: PackedParams,
}

impl NhwcDirect {
    pub fn new(p: &ConvParam, level: SimdLevel, caches: &CacheSizes) -> Self {
        debug_assert!(p.is_trans() && p.group == 1);
        let (lanes, groups, run) = dispatch::backend_shape(level);
        Self {
            p: *p,
            level,
            alg: plan_blocks(p, lanes, groups, run, caches),
            weight: Vec::new(),
            bias: Vec::new(),
            params: PackedParams::default(),
        }
    }

    pub fn level(&self) -> SimdLevel {
        self.level
    }

    pub fn alg_mut(&mut self) -> &mut AlgParam {
        &mut self.alg
    }

    pub fn set_weights(&mut self, weight: &[f32], bias: Option<&[f32]>, params: &[f32]) -> Result<()> {
        let micro_d = self.alg.micro_d;
        self.params = PackedParams::pack(self.p.activation, params, self.p.dst_c, micro_d)?;
        self.weight = pack_weights(&self.p, &self.alg, weight);
        self.bias = pack_bias(bias, self.p.dst_c, micro_d);
        Ok(())
    }

    pub fn forward(&self, src: &[f32], dst: &mut [f32]) {
        dispatch::convolve_nhwc_direct(
            self.level,
            &self.p,
            &self.alg,
            src,
            &self.weight,
            &self.bias,
            &self.params,
            dst,
        );
    }
}
