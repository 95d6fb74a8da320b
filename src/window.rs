//! Sliding window engine (spec component C8).
//!
//! Grounded on ConSTRain's `repeat::RepeatIterator`/buffered-channel reading
//! pattern in `io.rs`: a small ring of in-flight items refilled from an
//! upstream source and drained in order, rather than materializing the
//! whole stream. Here the ring additionally carries accumulated evidence
//! (`corPhase`) across refills, since correlation anchors from one cycle
//! must keep voting on markers retained into the next.

use anyhow::Result;

use crate::corr;
use crate::dose::AlleleDose;
use crate::freq;
use crate::marker::Marker;
use crate::phase::Phase;
use crate::record::Record;

/// Half the window's capacity; the window never exceeds `2 * WINDOW_OVERLAP`
/// slots and retains up to `WINDOW_OVERLAP` of them across a cycle.
pub const WINDOW_OVERLAP: usize = 100;

/// A source of per-sample genotype records that can be advanced to a
/// specific expected marker. Implemented by the htslib-backed reader in
/// `io::vcf` and, for testing, by [`VecRecordSource`].
pub trait RecordSource {
    /// Advance the stream until it yields the record for `expected`. Fails
    /// with "input modified during run" if the stream is exhausted or its
    /// next record does not match.
    fn next(&mut self, expected: &Marker) -> Result<Record>;
}

/// An in-memory, pre-built [`RecordSource`] for tests: a fixed sequence of
/// records consumed strictly in order.
pub struct VecRecordSource {
    records: std::collections::VecDeque<Record>,
}

impl VecRecordSource {
    pub fn new(records: Vec<Record>) -> Self {
        VecRecordSource { records: records.into() }
    }
}

impl RecordSource for VecRecordSource {
    fn next(&mut self, expected: &Marker) -> Result<Record> {
        let record = self
            .records
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("input modified during run: stream exhausted before marker {expected}"))?;
        if record.marker().as_ref() != expected {
            anyhow::bail!("input modified during run: expected marker {expected}, stream yielded {}", record.marker());
        }
        Ok(record)
    }
}

/// A matched reference/target pair with its three phase verdicts and the
/// allele-dose views needed to keep voting on `corPhase` in later cycles.
pub struct WindowSlot {
    pub ref_record: Record,
    pub tgt_filtered: Record,
    pub tgt_unfiltered: Record,
    pub allele_phase: Phase,
    pub freq_phase: Phase,
    pub cor_phase: Phase,
    pub ref_dose: AlleleDose,
    /// Present when `allele_phase ∈ {Unknown, Identical}`.
    pub tgt_dose: Option<AlleleDose>,
    /// Present when `allele_phase ∈ {Unknown, Opposite}`.
    pub tgt_dose_flipped: Option<AlleleDose>,
}

impl WindowSlot {
    /// Build a slot from a matched pair's records, deriving `freq_phase`
    /// immediately and leaving `cor_phase` at `Unknown` for accumulation.
    pub fn build(ref_marker: &Marker, allele_phase: Phase, ref_record: Record, tgt_filtered: Record, tgt_unfiltered: Record) -> Result<WindowSlot> {
        let ref_dose = AlleleDose::build(ref_marker, 0, &ref_record, false)?;
        let tgt_dose = matches!(allele_phase, Phase::Unknown | Phase::Identical)
            .then(|| AlleleDose::build(ref_marker, 0, &tgt_filtered, false))
            .transpose()?;
        let tgt_dose_flipped = matches!(allele_phase, Phase::Unknown | Phase::Opposite)
            .then(|| AlleleDose::build(ref_marker, 0, &tgt_filtered, true))
            .transpose()?;

        let abs_z = freq::abs_z(Some(&ref_dose), tgt_dose.as_ref());
        let flipped_abs_z = freq::abs_z(Some(&ref_dose), tgt_dose_flipped.as_ref());
        let freq_phase = freq::freq_phase(abs_z, flipped_abs_z);

        Ok(WindowSlot {
            ref_record,
            tgt_filtered,
            tgt_unfiltered,
            allele_phase,
            freq_phase,
            cor_phase: Phase::Unknown,
            ref_dose,
            tgt_dose,
            tgt_dose_flipped,
        })
    }
}

/// `minAbsCor(f, N)` (§4.5.1): a wider band of frequencies near 0.5 gets a
/// stricter (smaller) threshold than frequencies near the extremes.
fn min_abs_cor(freq: Option<f64>, n_samples: usize) -> f64 {
    let denom = ((n_samples.max(2) - 1) as f64).sqrt();
    let numerator = match freq {
        Some(f) if f > 0.3 && f < 0.7 => 5.0,
        _ => 7.0,
    };
    numerator / denom
}

/// The ring of in-flight slots, refilled from upstream and drained in order.
pub struct WindowEngine {
    slots: Vec<WindowSlot>,
    finished: bool,
}

impl Default for WindowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowEngine {
    pub fn new() -> Self {
        WindowEngine { slots: Vec::new(), finished: false }
    }

    /// Whether the matched-triple stream driving this engine is exhausted.
    /// Slots may still be resident; call [`WindowEngine::final_flush`] to
    /// drain them.
    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.slots.is_empty()
    }

    /// Run one window cycle (§4.5): flush the non-overlapping prefix, refill
    /// up to `2 * WINDOW_OVERLAP` slots by calling `fill` for each new one,
    /// then update every slot's `cor_phase`. `fill` returns `Ok(None)` once
    /// the matched-triple stream is exhausted.
    pub fn cycle(&mut self, mut fill: impl FnMut() -> Result<Option<WindowSlot>>) -> Result<Vec<WindowSlot>> {
        let overlap = WINDOW_OVERLAP.min(self.slots.len());
        let overlap_start = self.slots.len() - overlap;
        let flushed: Vec<WindowSlot> = self.slots.drain(0..overlap_start).collect();

        while !self.finished && self.slots.len() < 2 * WINDOW_OVERLAP {
            match fill()? {
                Some(slot) => self.slots.push(slot),
                None => self.finished = true,
            }
        }

        self.update_cor_phase();
        Ok(flushed)
    }

    /// Drain and return every remaining slot once the matcher is exhausted.
    pub fn final_flush(&mut self) -> Vec<WindowSlot> {
        std::mem::take(&mut self.slots)
    }

    fn update_cor_phase(&mut self) {
        let n = self.slots.len();
        let mut derived = vec![Phase::Unknown; n];

        for j in 0..n {
            let focus = &self.slots[j];
            let min_ref_r = min_abs_cor(focus.ref_dose.freq(), focus.ref_dose.n_called());
            let focus_tgt_view = focus.tgt_dose.as_ref().or(focus.tgt_dose_flipped.as_ref());
            let min_tgt_r = min_abs_cor(focus_tgt_view.and_then(AlleleDose::freq), focus_tgt_view.map_or(0, AlleleDose::n_called));

            let (mut same, mut opp) = (0i64, 0i64);
            for k in 0..n {
                if k == j {
                    continue;
                }
                let anchor = &self.slots[k];
                if !matches!(anchor.freq_phase, Phase::Identical | Phase::Opposite) {
                    continue;
                }
                if anchor.allele_phase != anchor.freq_phase && anchor.allele_phase != Phase::Unknown {
                    continue;
                }

                let ref_cor = corr::pearson(&focus.ref_dose.dose, &anchor.ref_dose.dose);
                if ref_cor.abs() <= min_ref_r {
                    continue;
                }

                let flip_anchor = anchor.freq_phase == Phase::Opposite;
                let anchor_dose = if flip_anchor { anchor.tgt_dose_flipped.as_ref() } else { anchor.tgt_dose.as_ref() };
                let Some(anchor_dose) = anchor_dose else { continue };

                let cor = focus.tgt_dose.as_ref().map_or(0.0, |d| corr::pearson(&d.dose, &anchor_dose.dose));
                let f_cor = focus.tgt_dose_flipped.as_ref().map_or(0.0, |d| corr::pearson(&d.dose, &anchor_dose.dose));

                if ref_cor < -min_ref_r {
                    if cor < -min_tgt_r {
                        same += 1;
                    }
                    if f_cor < -min_tgt_r {
                        opp += 1;
                    }
                } else {
                    if cor > min_tgt_r {
                        same += 1;
                    }
                    if f_cor > min_tgt_r {
                        opp += 1;
                    }
                }
            }

            const MAX_INC: i64 = 1;
            const MIN_DIFF: i64 = 2;
            derived[j] = if opp <= MAX_INC && same - opp >= MIN_DIFF {
                Phase::Identical
            } else if same <= MAX_INC && opp - same >= MIN_DIFF {
                Phase::Opposite
            } else if same > MAX_INC && opp > MAX_INC {
                Phase::Inconsistent
            } else {
                Phase::Unknown
            };
        }

        for (j, nv) in derived.into_iter().enumerate() {
            self.slots[j].cor_phase = Phase::merge(self.slots[j].cor_phase, nv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Haplotype;
    use std::rc::Rc;

    fn marker(pos: i64, alleles: &[&str]) -> Rc<Marker> {
        Rc::new(Marker::new("chr1", pos, vec![], alleles.iter().map(|s| s.to_string()).collect(), None))
    }

    fn hap(a1: u32, a2: u32) -> Haplotype {
        Haplotype { a1: Some(a1), a2: Some(a2), phased: false }
    }

    fn identical_slot(pos: i64, dose_pattern: &[(u32, u32)]) -> WindowSlot {
        let m = marker(pos, &["A", "G"]);
        let haps: Vec<Haplotype> = dose_pattern.iter().map(|&(a, b)| hap(a, b)).collect();
        let ref_record = Record::new(Rc::clone(&m), haps.clone());
        let tgt_record = Record::new(Rc::clone(&m), haps.clone());
        WindowSlot::build(&m, Phase::Identical, ref_record, tgt_record.clone(), tgt_record).unwrap()
    }

    #[test]
    fn build_slot_computes_freq_phase_from_dose_views() {
        let slot = identical_slot(1, &[(0, 0), (0, 0), (1, 1), (1, 1)]);
        assert_eq!(slot.allele_phase, Phase::Identical);
        assert!(slot.tgt_dose.is_some());
        assert!(slot.tgt_dose_flipped.is_none());
        assert_eq!(slot.cor_phase, Phase::Unknown);
    }

    #[test]
    fn cycle_flushes_overlap_and_retains_the_rest() {
        let mut engine = WindowEngine::new();
        let mut produced = 0i64;
        let mut fill = || -> Result<Option<WindowSlot>> {
            produced += 1;
            Ok(Some(identical_slot(produced, &[(0, 0), (1, 1)])))
        };

        let flushed = engine.cycle(&mut fill).unwrap();
        assert!(flushed.is_empty(), "first cycle fills from empty, nothing to flush yet");
        assert_eq!(engine.slots.len(), 2 * WINDOW_OVERLAP);

        let flushed2 = engine.cycle(&mut fill).unwrap();
        assert_eq!(flushed2.len(), WINDOW_OVERLAP, "second cycle flushes exactly the non-overlapping half");
        assert_eq!(engine.slots.len(), 2 * WINDOW_OVERLAP);
    }

    #[test]
    fn final_flush_drains_everything() {
        let mut engine = WindowEngine::new();
        let mut n = 5;
        engine
            .cycle(|| {
                if n == 0 {
                    return Ok(None);
                }
                n -= 1;
                Ok(Some(identical_slot(n as i64 + 1, &[(0, 0), (1, 1)])))
            })
            .unwrap();
        assert_eq!(engine.final_flush().len(), 5);
        assert!(engine.final_flush().is_empty());
    }
}
