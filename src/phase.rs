//! Three-way fused phase verdict.
//!
//! Grounded on ConSTRain's `utils::VcfFilter` (a small enum with a `name()`
//! accessor used both for control flow and for rendering into VCF/log
//! output); generalized here into a proper lattice with an explicit merge
//! operation in place of `VcfFilter`'s single-reason-wins semantics.

/// A strand-relationship verdict between a reference and a target variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Identical,
    Opposite,
    Unknown,
    Inconsistent,
}

impl Phase {
    /// Fuse two independent verdicts about the same variant.
    ///
    /// `Inconsistent` is absorbing; `Unknown` is the identity element;
    /// agreeing verdicts pass through; disagreeing non-unknown verdicts
    /// collapse to `Inconsistent`.
    pub fn merge(a: Phase, b: Phase) -> Phase {
        use Phase::*;
        match (a, b) {
            (Inconsistent, _) | (_, Inconsistent) => Inconsistent,
            (Unknown, y) => y,
            (x, Unknown) => x,
            (Identical, Identical) => Identical,
            (Opposite, Opposite) => Opposite,
            (Identical, Opposite) | (Opposite, Identical) => Inconsistent,
        }
    }

    /// The verdict obtained by complementing the strand under consideration.
    /// `Unknown` and `Inconsistent` are strand-symmetric and pass through.
    pub fn flip(self) -> Phase {
        match self {
            Phase::Identical => Phase::Opposite,
            Phase::Opposite => Phase::Identical,
            other => other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Identical => "SAME_STRAND",
            Phase::Opposite => "OPPOSITE_STRAND",
            Phase::Unknown => "UNKNOWN_STRAND",
            Phase::Inconsistent => "INCONSISTENT_STRAND",
        }
    }

    /// Disposition used in the log's SUMMARY column for a matched variant.
    pub fn passes(self) -> bool {
        matches!(self, Phase::Identical | Phase::Opposite)
    }
}
