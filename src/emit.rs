//! Final fusion (§4.5.2) and per-variant emission (C9).
//!
//! Grounded on ConSTRain's `io::vcf::write_reassigned_genotype`, which
//! formats one output VCF line from a genotype decision plus the sample
//! list, and on `utils::VcfFilter::name()` for the terse summary-string
//! style used here in the log's SUMMARY column.

use std::fmt::Write as _;

use crate::marker::Marker;
use crate::matcher::RejectReason;
use crate::phase::Phase;
use crate::record::Record;

/// Pairwise fusion M(x, y) from §4.5.2: agreement passes through,
/// disagreement between `Identical`/`Opposite` is fatal-to-this-variant,
/// `Unknown` is the identity, `Inconsistent` absorbs. This is the same
/// lattice operation as [`Phase::merge`]; kept as a separate name here
/// because §4.5.2 invokes it under its own label ("M").
fn fuse(x: Phase, y: Phase) -> Phase {
    Phase::merge(x, y)
}

/// The effective phase verdict for a matched slot (§4.5.2): in non-strict
/// mode a conclusive allele-symbol verdict short-circuits the other two
/// signals; otherwise all three signals are fused.
pub fn effective_phase(allele_phase: Phase, freq_phase: Phase, cor_phase: Phase, strict: bool) -> Phase {
    if !strict && allele_phase != Phase::Unknown {
        return allele_phase;
    }
    fuse(allele_phase, fuse(freq_phase, cor_phase))
}

/// One emitted VCF data line, sample genotypes already rendered.
pub struct VcfLine {
    pub chrom: String,
    pub pos: i64,
    pub id: String,
    pub reference: String,
    pub alt: String,
    pub info: String,
    pub genotypes: String,
}

/// Render the matched slot's unfiltered target record as an output VCF
/// line under `effective`, renaming alleles through π against `ref_marker`.
/// `None` if `effective` carries no record (§4.5.2).
pub fn render_vcf_line(ref_marker: &Marker, target_marker: &Marker, unfiltered: &Record, effective: Phase) -> Option<VcfLine> {
    if !effective.passes() {
        return None;
    }
    let flip = effective == Phase::Opposite;
    let aligned = if flip { target_marker.complement() } else { target_marker.clone() };
    let pi: Vec<Option<usize>> = aligned.alleles().iter().map(|sym| ref_marker.alleles().iter().position(|a| a == sym)).collect();

    let info = ref_marker.end().map(|e| format!("END={e}")).unwrap_or_else(|| ".".to_string());
    let mut genotypes = String::new();
    for (i, hap) in unfiltered.haplotypes().iter().enumerate() {
        if i > 0 {
            genotypes.push('\t');
        }
        let sep = if hap.phased { '|' } else { '/' };
        write_allele(&mut genotypes, hap.a1, &pi);
        genotypes.push(sep);
        write_allele(&mut genotypes, hap.a2, &pi);
    }

    Some(VcfLine {
        chrom: ref_marker.chrom().to_string(),
        pos: ref_marker.pos(),
        id: ref_marker.ids().first().cloned().unwrap_or_else(|| ".".to_string()),
        reference: ref_marker.ref_allele().to_string(),
        alt: ref_marker.alleles()[1..].join(","),
        info,
        genotypes,
    })
}

fn write_allele(out: &mut String, raw: Option<u32>, pi: &[Option<usize>]) {
    match raw.and_then(|a| pi.get(a as usize).copied().flatten()) {
        Some(i) => write!(out, "{i}").expect("String writes are infallible"),
        None => out.push('.'),
    }
}

/// Render the TSV log line for one matched target marker: `ALLELE`/`FREQ`/`R2`
/// hold the three verdict labels, `SUMMARY` is `PASS`/`FAIL` on `effective`,
/// and `INFO` summarizes the effective verdict that produced it.
pub fn render_log_matched(chrom: &str, pos: i64, id: &str, reference: &str, alt: &str, allele_phase: Phase, freq_phase: Phase, cor_phase: Phase, effective: Phase) -> String {
    let summary = if effective.passes() { "PASS" } else { "FAIL" };
    format!(
        "{chrom}\t{pos}\t{id}\t{reference}\t{alt}\t{}\t{}\t{}\t{summary}\tEFFECTIVE={}",
        allele_phase.label(),
        freq_phase.label(),
        cor_phase.label(),
        effective.label(),
    )
}

/// Render the TSV log line for a target marker rejected before matching:
/// the three verdict columns are `NOT_PERFORMED`, `SUMMARY` is `REMOVED`,
/// and `INFO` names the rejection reason.
pub fn render_log_rejected(chrom: &str, pos: i64, id: &str, reference: &str, alt: &str, reason: RejectReason) -> String {
    format!("{chrom}\t{pos}\t{id}\t{reference}\t{alt}\tNOT_PERFORMED\tNOT_PERFORMED\tNOT_PERFORMED\tREMOVED\t{}", reason.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_strict_conclusive_allele_phase_short_circuits() {
        assert_eq!(effective_phase(Phase::Identical, Phase::Opposite, Phase::Opposite, false), Phase::Identical);
    }

    #[test]
    fn unknown_allele_phase_falls_through_to_fusion_even_when_not_strict() {
        assert_eq!(effective_phase(Phase::Unknown, Phase::Identical, Phase::Unknown, false), Phase::Identical);
    }

    #[test]
    fn strict_mode_always_fuses_all_three_signals() {
        assert_eq!(effective_phase(Phase::Identical, Phase::Opposite, Phase::Unknown, true), Phase::Inconsistent);
        assert_eq!(effective_phase(Phase::Identical, Phase::Identical, Phase::Unknown, true), Phase::Identical);
    }

    #[test]
    fn conclusive_verdicts_pass_emission_filter() {
        assert!(Phase::Identical.passes());
        assert!(Phase::Opposite.passes());
        assert!(!Phase::Unknown.passes());
        assert!(!Phase::Inconsistent.passes());
    }

    #[test]
    fn matched_log_line_has_ten_columns_with_verdict_labels_in_their_own_slots() {
        let line = render_log_matched("chr1", 100, "rs1", "A", "G", Phase::Identical, Phase::Unknown, Phase::Opposite, Phase::Identical);
        let cols: Vec<&str> = line.split('\t').collect();
        assert_eq!(cols.len(), 10);
        assert_eq!(cols, ["chr1", "100", "rs1", "A", "G", "SAME_STRAND", "UNKNOWN_STRAND", "OPPOSITE_STRAND", "PASS", "EFFECTIVE=SAME_STRAND"]);
    }

    #[test]
    fn rejected_log_line_has_ten_columns_with_not_performed_verdicts_and_removed_summary() {
        let line = render_log_rejected("chr1", 300, "rs3", "A", "T", RejectReason::NotInReference);
        let cols: Vec<&str> = line.split('\t').collect();
        assert_eq!(cols.len(), 10);
        assert_eq!(cols, ["chr1", "300", "rs3", "A", "T", "NOT_PERFORMED", "NOT_PERFORMED", "NOT_PERFORMED", "REMOVED", "NOT_IN_REFERENCE"]);
    }

    #[test]
    fn opposite_verdict_renders_complemented_genotypes() {
        use crate::record::Haplotype;

        let ref_marker = Marker::new("chr1", 100, vec!["rs1".into()], vec!["A".into(), "G".into()], None);
        let target_marker = Marker::new("chr1", 100, vec![], vec!["T".into(), "C".into()], None);
        let record = Record::new(
            std::rc::Rc::new(target_marker.clone()),
            vec![Haplotype { a1: Some(0), a2: Some(1), phased: true }, Haplotype::missing()],
        );

        let line = render_vcf_line(&ref_marker, &target_marker, &record, Phase::Opposite).unwrap();
        assert_eq!(line.genotypes, "0|1\t./.");
        assert_eq!(line.reference, "A");
        assert_eq!(line.alt, "G");

        assert!(render_vcf_line(&ref_marker, &target_marker, &record, Phase::Unknown).is_none());
    }
}
