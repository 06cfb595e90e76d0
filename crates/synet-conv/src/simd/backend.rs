//! The vector abstraction the micro-kernels are written against.

/// Widest vector any backend uses, in f32 lanes.
pub const MAX_LANES: usize = 16;

/// Vector primitives for one instruction set.
///
/// All methods are `unsafe`: pointer arguments must be valid for the number
/// of lanes accessed, and the instruction set must be available on the
/// running CPU.
pub trait VectorBackend: Copy + Send + Sync + 'static {
    type Vector: Copy;

    /// Vector width in f32 lanes (F).
    const LANES: usize;
    /// Output-channel register groups per micro-tile.
    const REGISTER_GROUPS: usize;
    /// Widest run of spatial positions one kernel call covers.
    const KERNEL_RUN: usize;

    unsafe fn zero() -> Self::Vector;
    unsafe fn splat(value: f32) -> Self::Vector;
    unsafe fn load(ptr: *const f32) -> Self::Vector;
    unsafe fn store(ptr: *mut f32, v: Self::Vector);
    unsafe fn add(a: Self::Vector, b: Self::Vector) -> Self::Vector;
    unsafe fn mul(a: Self::Vector, b: Self::Vector) -> Self::Vector;
    /// `a * b + c`
    unsafe fn fmadd(a: Self::Vector, b: Self::Vector, c: Self::Vector) -> Self::Vector;
    /// A NaN lane of `a` yields the lane of `b`, matching `f32::max`.
    unsafe fn max(a: Self::Vector, b: Self::Vector) -> Self::Vector;
    /// A NaN lane of `a` yields the lane of `b`, matching `f32::min`.
    unsafe fn min(a: Self::Vector, b: Self::Vector) -> Self::Vector;
    /// Per lane `if v >= 0 { a } else { b }`. NaN lanes of `v` take `b`.
    unsafe fn select_non_negative(v: Self::Vector, a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Load the first `n` lanes, zero the rest.
    #[inline(always)]
    unsafe fn load_partial(ptr: *const f32, n: usize) -> Self::Vector {
        debug_assert!(n <= Self::LANES);
        let mut buf = [0.0f32; MAX_LANES];
        std::ptr::copy_nonoverlapping(ptr, buf.as_mut_ptr(), n);
        Self::load(buf.as_ptr())
    }

    /// Store the first `n` lanes only.
    #[inline(always)]
    unsafe fn store_partial(ptr: *mut f32, v: Self::Vector, n: usize) {
        debug_assert!(n <= Self::LANES);
        let mut buf = [0.0f32; MAX_LANES];
        Self::store(buf.as_mut_ptr(), v);
        std::ptr::copy_nonoverlapping(buf.as_ptr(), ptr, n);
    }

    /// Apply a scalar function lane by lane.
    #[inline(always)]
    unsafe fn map<F: Fn(f32) -> f32>(v: Self::Vector, f: F) -> Self::Vector {
        let mut buf = [0.0f32; MAX_LANES];
        Self::store(buf.as_mut_ptr(), v);
        for x in buf[..Self::LANES].iter_mut() {
            *x = f(*x);
        }
        Self::load(buf.as_ptr())
    }
}

/// Architecture-independent backend on four-lane arrays.
///
/// Always available; the reference against which the ISA backends are
/// checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct Portable;

const PORTABLE_LANES: usize = 4;

#[inline(always)]
fn lanewise<F: Fn(f32, f32) -> f32>(a: [f32; PORTABLE_LANES], b: [f32; PORTABLE_LANES], f: F) -> [f32; PORTABLE_LANES] {
    [f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2]), f(a[3], b[3])]
}

impl VectorBackend for Portable {
    type Vector = [f32; PORTABLE_LANES];

    const LANES: usize = PORTABLE_LANES;
    const REGISTER_GROUPS: usize = 2;
    const KERNEL_RUN: usize = 4;

    #[inline(always)]
    unsafe fn zero() -> Self::Vector {
        [0.0; PORTABLE_LANES]
    }

    #[inline(always)]
    unsafe fn splat(value: f32) -> Self::Vector {
        [value; PORTABLE_LANES]
    }

    #[inline(always)]
    unsafe fn load(ptr: *const f32) -> Self::Vector {
        std::ptr::read_unaligned(ptr as *const [f32; PORTABLE_LANES])
    }

    #[inline(always)]
    unsafe fn store(ptr: *mut f32, v: Self::Vector) {
        std::ptr::write_unaligned(ptr as *mut [f32; PORTABLE_LANES], v)
    }

    #[inline(always)]
    unsafe fn add(a: Self::Vector, b: Self::Vector) -> Self::Vector {
        lanewise(a, b, |x, y| x + y)
    }

    #[inline(always)]
    unsafe fn mul(a: Self::Vector, b: Self::Vector) -> Self::Vector {
        lanewise(a, b, |x, y| x * y)
    }

    #[inline(always)]
    unsafe fn fmadd(a: Self::Vector, b: Self::Vector, c: Self::Vector) -> Self::Vector {
        [
            a[0] * b[0] + c[0],
            a[1] * b[1] + c[1],
            a[2] * b[2] + c[2],
            a[3] * b[3] + c[3],
        ]
    }

    #[inline(always)]
    unsafe fn max(a: Self::Vector, b: Self::Vector) -> Self::Vector {
        lanewise(a, b, f32::max)
    }

    #[inline(always)]
    unsafe fn min(a: Self::Vector, b: Self::Vector) -> Self::Vector {
        lanewise(a, b, f32::min)
    }

    #[inline(always)]
    unsafe fn select_non_negative(v: Self::Vector, a: Self::Vector, b: Self::Vector) -> Self::Vector {
        std::array::from_fn(|i| if v[i] >= 0.0 { a[i] } else { b[i] })
    }
}
