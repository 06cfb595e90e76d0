//! Portable single-precision GEMM with BLIS-style blocking.
//!
//! ```text
//! for jc in 0..N step NC:
//!   for pc in 0..K step KC:
//!     pack B[pc:KC, jc:NC] into NR-wide panels
//!     for ic in 0..M step MC:
//!       pack A[ic:MC, pc:KC] into MR-tall panels
//!       for jr, ir: microkernel MR x NR
//! ```

use super::tiling::BlockIterator;

const MR: usize = 4;
const NR: usize = 8;
const MC: usize = 64;
const KC: usize = 256;
const NC: usize = 512;

/// Whether an operand is stored transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transpose {
    #[default]
    NoTrans,
    Trans,
}

/// `C = op(A) · op(B)` for row-major operands.
///
/// `op(A)` is `m × k`: element `(i, p)` is `a[i*lda + p]`, or `a[p*lda + i]`
/// when transposed. `op(B)` is `k × n` likewise. `C` is `m × n` with row
/// stride `ldc` and is overwritten.
#[allow(clippy::too_many_arguments)]
pub fn sgemm(
    m: usize,
    n: usize,
    k: usize,
    a: &[f32],
    lda: usize,
    trans_a: Transpose,
    b: &[f32],
    ldb: usize,
    trans_b: Transpose,
    c: &mut [f32],
    ldc: usize,
) {
    if m == 0 || n == 0 {
        return;
    }
    for i in 0..m {
        c[i * ldc..i * ldc + n].fill(0.0);
    }
    if k == 0 {
        return;
    }

    let mut packed_a = vec![0.0f32; MC.min(m.next_multiple_of(MR)) * KC.min(k)];
    let mut packed_b = vec![0.0f32; NC.min(n.next_multiple_of(NR)) * KC.min(k)];

    for (jc, nc) in BlockIterator::new(n, NC) {
        for (pc, kc) in BlockIterator::new(k, KC) {
            pack_b(b, ldb, trans_b, pc, kc, jc, nc, &mut packed_b);
            for (ic, mc) in BlockIterator::new(m, MC) {
                pack_a(a, lda, trans_a, ic, mc, pc, kc, &mut packed_a);
                for (jr, nr) in BlockIterator::new(nc, NR) {
                    let pb = &packed_b[jr * kc..(jr + NR) * kc];
                    for (ir, mr) in BlockIterator::new(mc, MR) {
                        let pa = &packed_a[ir * kc..(ir + MR) * kc];
                        let offset = (ic + ir) * ldc + jc + jr;
                        microkernel(kc, pa, pb, &mut c[offset..], ldc, mr, nr);
                    }
                }
            }
        }
    }
}

#[inline(always)]
fn element(x: &[f32], ld: usize, trans: Transpose, row: usize, col: usize) -> f32 {
    match trans {
        Transpose::NoTrans => x[row * ld + col],
        Transpose::Trans => x[col * ld + row],
    }
}

/// Pack `op(A)[ic..ic+mc, pc..pc+kc]` as MR-tall column panels, zero padded.
#[allow(clippy::too_many_arguments)]
fn pack_a(a: &[f32], lda: usize, trans: Transpose, ic: usize, mc: usize, pc: usize, kc: usize, packed: &mut [f32]) {
    for panel in 0..mc.div_ceil(MR) {
        let dst = &mut packed[panel * MR * kc..(panel + 1) * MR * kc];
        for p in 0..kc {
            for i in 0..MR {
                let row = panel * MR + i;
                dst[p * MR + i] = if row < mc {
                    element(a, lda, trans, ic + row, pc + p)
                } else {
                    0.0
                };
            }
        }
    }
}

/// Pack `op(B)[pc..pc+kc, jc..jc+nc]` as NR-wide row panels, zero padded.
#[allow(clippy::too_many_arguments)]
fn pack_b(b: &[f32], ldb: usize, trans: Transpose, pc: usize, kc: usize, jc: usize, nc: usize, packed: &mut [f32]) {
    for panel in 0..nc.div_ceil(NR) {
        let dst = &mut packed[panel * NR * kc..(panel + 1) * NR * kc];
        for p in 0..kc {
            for j in 0..NR {
                let col = panel * NR + j;
                dst[p * NR + j] = if col < nc {
                    element(b, ldb, trans, pc + p, jc + col)
                } else {
                    0.0
                };
            }
        }
    }
}

/// `C[0..mr, 0..nr] += Ã · B̃` over one packed panel pair.
#[inline(always)]
fn microkernel(kc: usize, pa: &[f32], pb: &[f32], c: &mut [f32], ldc: usize, mr: usize, nr: usize) {
    let mut acc = [[0.0f32; NR]; MR];
    for p in 0..kc {
        let a = &pa[p * MR..(p + 1) * MR];
        let b = &pb[p * NR..(p + 1) * NR];
        for i in 0..MR {
            for j in 0..NR {
                acc[i][j] += a[i] * b[j];
            }
        }
    }
    for (i, row) in acc.iter().enumerate().take(mr) {
        for (j, v) in row.iter().enumerate().take(nr) {
            c[i * ldc + j] += v;
        }
    }
}
