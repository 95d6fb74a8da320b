//! Allele-dose view of a matched pair (spec component C5).
//!
//! Grounded on ConSTRain's `repeat::TandemRepeat::get_observed_allele_counts`,
//! which folds raw per-sample genotype calls into compact per-allele count
//! arrays for downstream statistics rather than re-walking genotypes at every
//! consumer.

use anyhow::{bail, Result};

use crate::marker::Marker;
use crate::record::Record;

/// Per-sample dosage of one tracked reference allele at a marker, plus the
/// observed allele-index counts needed for the frequency statistic
/// (§4.3/§4.4).
#[derive(Debug, Clone)]
pub struct AlleleDose {
    /// Dosage of the tracked reference allele per sample: 0, 1 or 2 copies,
    /// or -1 if either haplotype call is missing.
    pub dose: Vec<i32>,
    /// Count of non-missing haplotype calls per allele index (reference
    /// marker allele ordering), used to derive the allele frequency.
    pub counts: Vec<u64>,
    /// Index of the tracked allele within the reference marker's allele list.
    pub a_r: usize,
}

impl AlleleDose {
    /// Build the dose view of `record` against `marker`'s `a_r`-th allele.
    /// If `flip` is set, `record`'s own marker is strand-complemented first
    /// so its allele symbols compare against `marker`'s on the same strand;
    /// this fails if `record`'s marker has no single-base allele to flip.
    pub fn build(marker: &Marker, a_r: usize, record: &Record, flip: bool) -> Result<AlleleDose> {
        let record_marker = record.marker().as_ref();
        let aligned = if flip {
            if !record_marker.is_flippable() {
                bail!("cannot flip marker {record_marker}: no single-base allele to complement");
            }
            record_marker.complement()
        } else {
            record_marker.clone()
        };

        // Map each haplotype allele index (position in `aligned`'s list) to
        // the corresponding index in `marker`'s allele list, by symbol. π
        // must be total: a target allele absent from the reference allele
        // set is inconsistent data, not a value to silently drop.
        let pi: Vec<usize> = aligned
            .alleles()
            .iter()
            .map(|sym| marker.alleles().iter().position(|a| a == sym).ok_or_else(|| anyhow::anyhow!("inconsistent-data: target allele '{sym}' at marker {record_marker} has no match in reference marker {marker}")))
            .collect::<Result<Vec<usize>>>()?;

        let mut counts = vec![0u64; marker.alleles().len()];
        let mut dose = Vec::with_capacity(record.n_samples());

        for hap in record.haplotypes() {
            match (hap.a1, hap.a2) {
                (Some(a1), Some(a2)) => {
                    let (a1, a2) = (a1 as usize, a2 as usize);
                    let m1 = *pi.get(a1).ok_or_else(|| anyhow::anyhow!("haplotype allele index {a1} out of range for marker {record_marker}"))?;
                    let m2 = *pi.get(a2).ok_or_else(|| anyhow::anyhow!("haplotype allele index {a2} out of range for marker {record_marker}"))?;
                    counts[m1] += 1;
                    counts[m2] += 1;
                    let d = (m1 == a_r) as i32 + (m2 == a_r) as i32;
                    dose.push(d);
                }
                _ => dose.push(-1),
            }
        }

        Ok(AlleleDose { dose, counts, a_r })
    }

    /// Non-missing allele frequency of the tracked allele.
    pub fn freq(&self) -> Option<f64> {
        let n: u64 = self.counts.iter().sum();
        if n == 0 {
            None
        } else {
            Some(self.counts[self.a_r] as f64 / n as f64)
        }
    }

    /// Number of samples with a non-missing dose.
    pub fn n_called(&self) -> usize {
        self.dose.iter().filter(|&&d| d >= 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Haplotype;
    use std::rc::Rc;

    fn hap(a1: u32, a2: u32) -> Haplotype {
        Haplotype { a1: Some(a1), a2: Some(a2), phased: false }
    }

    #[test]
    fn dose_counts_tracked_allele_copies() {
        let marker = Marker::new("chr1", 1, vec![], vec!["A".into(), "G".into()], None);
        let rec_marker = Rc::new(Marker::new("chr1", 1, vec![], vec!["A".into(), "G".into()], None));
        let record = Record::new(rec_marker, vec![hap(0, 0), hap(0, 1), hap(1, 1), Haplotype::missing()]);

        let view = AlleleDose::build(&marker, 1, &record, false).unwrap();
        assert_eq!(view.dose, vec![0, 1, 2, -1]);
        assert_eq!(view.counts, vec![3, 3]);
        assert_eq!(view.freq(), Some(0.5));
    }

    #[test]
    fn flip_realigns_allele_symbols_before_counting() {
        let marker = Marker::new("chr1", 1, vec![], vec!["A".into(), "G".into()], None);
        // record's own marker is on the opposite strand: T/C
        let rec_marker = Rc::new(Marker::new("chr1", 1, vec![], vec!["T".into(), "C".into()], None));
        let record = Record::new(rec_marker, vec![hap(1, 1)]); // homozygous C, i.e. G after flip

        let view = AlleleDose::build(&marker, 1, &record, true).unwrap();
        assert_eq!(view.dose, vec![2]);
    }

    #[test]
    fn flip_rejects_markers_with_no_flippable_allele() {
        let marker = Marker::new("chr1", 1, vec![], vec!["A".into(), "G".into()], None);
        let rec_marker = Rc::new(Marker::new("chr1", 1, vec![], vec!["AT".into(), "A".into()], None));
        let record = Record::new(rec_marker, vec![hap(0, 1)]);

        assert!(AlleleDose::build(&marker, 1, &record, true).is_err());
    }

    #[test]
    fn target_allele_absent_from_reference_is_inconsistent_data() {
        let marker = Marker::new("chr1", 1, vec![], vec!["A".into(), "G".into()], None);
        let rec_marker = Rc::new(Marker::new("chr1", 1, vec![], vec!["A".into(), "C".into()], None));
        let record = Record::new(rec_marker, vec![hap(0, 1)]);

        assert!(AlleleDose::build(&marker, 1, &record, false).is_err());
    }
}
