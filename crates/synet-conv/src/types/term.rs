/// Position of a micro-kernel call in the chain of input-channel blocks that
/// contribute to one destination accumulator.
///
/// | Term | Accumulator start | Bias + activation |
/// |------|-------------------|-------------------|
/// | `First` | zero | no |
/// | `Interim` | destination | no |
/// | `Last` | destination | yes |
/// | `Single` | zero | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    First,
    Interim,
    Last,
    Single,
}

impl Term {
    /// Term for a block that is (or is not) the first and the last contributor.
    pub const fn new(first: bool, last: bool) -> Self {
        match (first, last) {
            (true, true) => Term::Single,
            (true, false) => Term::First,
            (false, true) => Term::Last,
            (false, false) => Term::Interim,
        }
    }

    /// Accumulators start from zero instead of the destination contents.
    #[inline(always)]
    pub const fn is_first(self) -> bool {
        matches!(self, Term::First | Term::Single)
    }

    /// Bias and activation are applied on store.
    #[inline(always)]
    pub const fn is_last(self) -> bool {
        matches!(self, Term::Last | Term::Single)
    }
}
