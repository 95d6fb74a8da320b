//! Per-variant genotype record (spec component C2).
//!
//! Grounded on ConSTRain's `repeat::TandemRepeat`: an immutable payload tied
//! to one locus, built once by the reading layer and never mutated
//! afterwards, with small derived accessors rather than exposed internals.

use std::rc::Rc;

use crate::marker::Marker;

/// One sample's genotype at a marker: two haplotype allele indices (`None`
/// for missing) and whether they are phased relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Haplotype {
    pub a1: Option<u32>,
    pub a2: Option<u32>,
    pub phased: bool,
}

impl Haplotype {
    pub const fn missing() -> Self {
        Haplotype { a1: None, a2: None, phased: false }
    }

    pub fn is_missing(&self) -> bool {
        self.a1.is_none() || self.a2.is_none()
    }
}

/// Per-sample genotypes at a single marker. Stable reference to its marker;
/// never mutated after construction.
#[derive(Debug, Clone)]
pub struct Record {
    marker: Rc<Marker>,
    haplotypes: Vec<Haplotype>,
}

impl Record {
    pub fn new(marker: Rc<Marker>, haplotypes: Vec<Haplotype>) -> Self {
        Record { marker, haplotypes }
    }

    pub fn marker(&self) -> &Rc<Marker> {
        &self.marker
    }

    pub fn haplotypes(&self) -> &[Haplotype] {
        &self.haplotypes
    }

    pub fn n_samples(&self) -> usize {
        self.haplotypes.len()
    }

    /// Sample-subsetted copy retaining only `keep`, in the given order. Used
    /// to derive the `excludesamples`-filtered view from the unfiltered
    /// record without re-reading the file (see DESIGN.md).
    pub fn subset(&self, keep: &[usize]) -> Record {
        let haplotypes = keep.iter().map(|&i| self.haplotypes[i]).collect();
        Record { marker: Rc::clone(&self.marker), haplotypes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker() -> Rc<Marker> {
        Rc::new(Marker::new("chr1", 1, vec![], vec!["A".into(), "G".into()], None))
    }

    #[test]
    fn subset_keeps_requested_samples_in_order() {
        let haps = vec![
            Haplotype { a1: Some(0), a2: Some(0), phased: false },
            Haplotype { a1: Some(0), a2: Some(1), phased: true },
            Haplotype::missing(),
        ];
        let record = Record::new(marker(), haps.clone());
        let subset = record.subset(&[2, 0]);
        assert_eq!(subset.haplotypes(), &[haps[2], haps[0]]);
    }
}
