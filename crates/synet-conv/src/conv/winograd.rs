//! Winograd / Toom-Cook fast convolution.
//!
//! A `bh × bw` output block of a `kh × kw` kernel is computed from an input
//! tile of `th × tw = (bh + kh - 1) × (bw + kw - 1)` points:
//!
//! ```text
//! Y = ATh · [(Gh · g · Gwᵀ) ⊙ (BTh · d · BTwᵀ)] · ATwᵀ
//! ```
//!
//! The element-wise product over all tiles and channels becomes one GEMM per
//! point `t`: `M_t (tiles × dst_c) = V_t (tiles × src_c) · U_t (src_c × dst_c)`.
//!
//! The one-dimensional transforms `F(m, r)` are generated from the
//! interpolation points `0, 1, -1, 2, -2, 1/2, -1/2, 3, -3` and infinity,
//! in f64 and rounded once to f32.

use crate::core::{activate, pack_bias, sgemm, PackedParams, Transpose};
use crate::error::Result;
use crate::types::ConvParam;

const POINTS: [f64; 9] = [0.0, 1.0, -1.0, 2.0, -2.0, 0.5, -0.5, 3.0, -3.0];
/// Largest tile side: F(4, 5).
const MAX_TILE: usize = 8;

/// Output block `(bh, bw)` used for `p`, or `None` when no transform applies.
pub fn winograd_block(p: &ConvParam) -> Option<(usize, usize)> {
    let (h, w) = (p.dst_h, p.dst_w);
    let two = h >= 4 && w >= 4 && h * w >= 36;
    match (p.kernel_y, p.kernel_x) {
        (3, 3) if h >= 8 && w >= 8 && h * w >= 144 => Some((4, 4)),
        (3, 3) | (2, 2) if two => Some((2, 2)),
        (1, 3) | (1, 5) if w >= 8 => Some((1, 4)),
        _ => None,
    }
}

/// Row-major f32 matrix.
#[derive(Debug, Clone, PartialEq)]
struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    fn from_f64(rows: usize, cols: usize, data: &[f64]) -> Self {
        Self {
            rows,
            cols,
            data: data.iter().map(|&v| v as f32).collect(),
        }
    }

    #[inline(always)]
    fn at(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }
}

/// Coefficients, lowest power first, of `∏ (x - a)` over `roots`.
fn poly_from_roots(roots: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut coeffs = vec![1.0];
    for a in roots {
        let mut next = vec![0.0; coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i + 1] += c;
            next[i] -= a * c;
        }
        coeffs = next;
    }
    coeffs
}

/// The `F(m, r)` matrices `(AT: m×n, G: n×r, BT: n×n)` with `n = m + r - 1`.
fn toom_cook(m: usize, r: usize) -> (Matrix, Matrix, Matrix) {
    let n = m + r - 1;
    let finite = &POINTS[..n - 1];

    let mut at = vec![0.0; m * n];
    for i in 0..m {
        for (j, &a) in finite.iter().enumerate() {
            at[i * n + j] = a.powi(i as i32);
        }
    }
    at[(m - 1) * n + n - 1] = 1.0;

    let mut g = vec![0.0; n * r];
    for (j, &a) in finite.iter().enumerate() {
        let f: f64 = finite
            .iter()
            .enumerate()
            .filter(|&(l, _)| l != j)
            .map(|(_, &b)| a - b)
            .product();
        for k in 0..r {
            g[j * r + k] = a.powi(k as i32) / f;
        }
    }
    g[(n - 1) * r + r - 1] = 1.0;

    let mut bt = vec![0.0; n * n];
    for j in 0..n - 1 {
        let roots = finite.iter().enumerate().filter(|&(l, _)| l != j).map(|(_, &b)| b);
        for (k, c) in poly_from_roots(roots).into_iter().enumerate() {
            bt[j * n + k] = c;
        }
    }
    for (k, c) in poly_from_roots(finite.iter().copied()).into_iter().enumerate() {
        bt[(n - 1) * n + k] = c;
    }

    (
        Matrix::from_f64(m, n, &at),
        Matrix::from_f64(n, r, &g),
        Matrix::from_f64(n, n, &bt),
    )
}

/// `out = L · X · Rᵀ` for an `x_rows × x_cols` matrix `x`.
fn sandwich(l: &Matrix, x: &[f32], x_cols: usize, r: &Matrix, out: &mut [f32]) {
    debug_assert_eq!(r.cols, x_cols);
    let mut tmp = [0.0f32; MAX_TILE * MAX_TILE];
    for i in 0..l.rows {
        for c in 0..x_cols {
            tmp[i * x_cols + c] = (0..l.cols).map(|k| l.at(i, k) * x[k * x_cols + c]).sum();
        }
    }
    for i in 0..l.rows {
        for j in 0..r.rows {
            out[i * r.rows + j] = (0..x_cols).map(|c| tmp[i * x_cols + c] * r.at(j, c)).sum();
        }
    }
}

pub(crate) struct Winograd {
    p: ConvParam,
    block: (usize, usize),
    tile: (usize, usize),
    at: (Matrix, Matrix),
    g: (Matrix, Matrix),
    bt: (Matrix, Matrix),
    /// `U_t` for every point: `[t][src_c][dst_c]`.
    filter: Vec<f32>,
    bias: Vec<f32>,
    params: PackedParams,
}

impl Winograd {
    pub fn new(p: &ConvParam) -> Self {
        let (bh, bw) = winograd_block(p).unwrap_or((1, 1));
        let (at_h, g_h, bt_h) = toom_cook(bh, p.kernel_y);
        let (at_w, g_w, bt_w) = toom_cook(bw, p.kernel_x);
        log::debug!("winograd block {}x{} for kernel {}x{}", bh, bw, p.kernel_y, p.kernel_x);
        Self {
            p: *p,
            block: (bh, bw),
            tile: (bh + p.kernel_y - 1, bw + p.kernel_x - 1),
            at: (at_h, at_w),
            g: (g_h, g_w),
            bt: (bt_h, bt_w),
            filter: Vec::new(),
            bias: Vec::new(),
            params: PackedParams::default(),
        }
    }

    fn points(&self) -> usize {
        self.tile.0 * self.tile.1
    }

    fn tiles(&self) -> (usize, usize) {
        (self.p.dst_h.div_ceil(self.block.0), self.p.dst_w.div_ceil(self.block.1))
    }

    pub fn buffer_len(&self) -> usize {
        let (ty, tx) = self.tiles();
        self.points() * ty * tx * (self.p.src_c + self.p.dst_c)
    }

    pub fn set_weights(&mut self, weight: &[f32], bias: Option<&[f32]>, params: &[f32]) -> Result<()> {
        let p = &self.p;
        let (kh, kw) = (p.kernel_y, p.kernel_x);
        let points = self.points();
        let mut kernel = [0.0f32; MAX_TILE * MAX_TILE];
        let mut u = [0.0f32; MAX_TILE * MAX_TILE];
        let mut filter = vec![0.0f32; points * p.src_c * p.dst_c];
        for oc in 0..p.dst_c {
            for ic in 0..p.src_c {
                for ky in 0..kh {
                    for kx in 0..kw {
                        kernel[ky * kw + kx] = weight[p.weight_index(oc, ic, ky, kx)];
                    }
                }
                sandwich(&self.g.0, &kernel, kw, &self.g.1, &mut u);
                for (t, &v) in u[..points].iter().enumerate() {
                    filter[(t * p.src_c + ic) * p.dst_c + oc] = v;
                }
            }
        }
        self.params = PackedParams::pack(p.activation, params, p.dst_c, 1)?;
        self.filter = filter;
        self.bias = pack_bias(bias, p.dst_c, 1);
        Ok(())
    }

    pub fn forward(&self, src: &[f32], buf: &mut [f32], dst: &mut [f32]) {
        let p = &self.p;
        let (bh, bw) = self.block;
        let (th, tw) = self.tile;
        let (tiles_y, tiles_x) = self.tiles();
        let tiles = tiles_y * tiles_x;
        let points = self.points();
        let (v, m) = buf.split_at_mut(points * tiles * p.src_c);

        let mut d = [0.0f32; MAX_TILE * MAX_TILE];
        let mut out = [0.0f32; MAX_TILE * MAX_TILE];
        for tile in 0..tiles {
            let (y0, x0) = ((tile / tiles_x) * bh, (tile % tiles_x) * bw);
            for ic in 0..p.src_c {
                for i in 0..th {
                    let sy = (y0 + i).checked_sub(p.pad_y).filter(|&y| y < p.src_h);
                    for j in 0..tw {
                        let sx = (x0 + j).checked_sub(p.pad_x).filter(|&x| x < p.src_w);
                        d[i * tw + j] = match (sy, sx) {
                            (Some(y), Some(x)) => src[p.src_index(ic, y, x)],
                            _ => 0.0,
                        };
                    }
                }
                sandwich(&self.bt.0, &d, tw, &self.bt.1, &mut out);
                for (t, &value) in out[..points].iter().enumerate() {
                    v[(t * tiles + tile) * p.src_c + ic] = value;
                }
            }
        }

        let (u_len, v_len, m_len) = (p.src_c * p.dst_c, tiles * p.src_c, tiles * p.dst_c);
        for t in 0..points {
            sgemm(
                tiles,
                p.dst_c,
                p.src_c,
                &v[t * v_len..(t + 1) * v_len],
                p.src_c,
                Transpose::NoTrans,
                &self.filter[t * u_len..(t + 1) * u_len],
                p.dst_c,
                Transpose::NoTrans,
                &mut m[t * m_len..(t + 1) * m_len],
                p.dst_c,
            );
        }

        let mut y = [0.0f32; MAX_TILE * MAX_TILE];
        for tile in 0..tiles {
            let (y0, x0) = ((tile / tiles_x) * bh, (tile % tiles_x) * bw);
            for oc in 0..p.dst_c {
                for t in 0..points {
                    d[t] = m[(t * tiles + tile) * p.dst_c + oc];
                }
                sandwich(&self.at.0, &d, tw, &self.at.1, &mut y);
                for i in 0..bh.min(p.dst_h - y0) {
                    for j in 0..bw.min(p.dst_w - x0) {
                        let value = y[i * bw + j] + self.bias[oc];
                        dst[p.dst_index(oc, y0 + i, x0 + j)] = activate(value, &self.params, oc);
                    }
                }
            }
        }
    }
}
