//! Pair matcher (spec component C4).
//!
//! Grounded on ConSTRain's `io::InputFileType` enum, which picks between two
//! input-reading strategies via a match rather than an object hierarchy —
//! the same shape spec.md's REDESIGN FLAGS section asks for here: `MatchMode`
//! is a two-variant sum type standing in for the id-match/position-match
//! candidate-lookup strategies.

use std::collections::BTreeSet;

use crate::index::MarkerIndex;
use crate::marker::Marker;
use crate::phase::Phase;

/// Which field ties a target marker to its reference candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Id,
    Pos,
}

impl MatchMode {
    pub fn parse(s: &str) -> Option<MatchMode> {
        match s.to_ascii_uppercase().as_str() {
            "ID" => Some(MatchMode::Id),
            "POS" => Some(MatchMode::Pos),
            _ => None,
        }
    }

    fn candidates(self, ref_index: &MarkerIndex, target: &Marker) -> Vec<usize> {
        match self {
            MatchMode::Id => {
                let mut found: BTreeSet<usize> = BTreeSet::new();
                for id in target.ids() {
                    if let Some(i) = ref_index.index_of_id(id) {
                        found.insert(i);
                    }
                }
                found.into_iter().collect()
            }
            MatchMode::Pos => ref_index.at_position(target.pos()).to_vec(),
        }
    }
}

/// Why a target marker was dropped instead of matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotInReference,
    MultipleRefMatches,
    DuplicateMarker,
    MarkerOutOfOrder,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::NotInReference => "NOT_IN_REFERENCE",
            RejectReason::MultipleRefMatches => "MULTIPLE_REF_MATCHES",
            RejectReason::DuplicateMarker => "DUPLICATE_MARKER",
            RejectReason::MarkerOutOfOrder => "MARKER_OUT_OF_ORDER",
        }
    }
}

/// A target marker matched to a unique reference marker, with the
/// allele-symbol-derived strand verdict.
#[derive(Debug, Clone, Copy)]
pub struct MatchedPair {
    pub ref_idx: usize,
    pub tgt_idx: usize,
    pub allele_phase: Phase,
}

/// One outcome per target marker, in target file order.
#[derive(Debug, Clone, Copy)]
pub enum MatchEvent {
    Matched(MatchedPair),
    Rejected { tgt_idx: usize, reason: RejectReason },
}

/// Allele-symbol comparison between a reference and target marker (§4.1).
pub fn strand(r: &Marker, t: &Marker) -> Phase {
    let a: BTreeSet<&str> = r.alleles().iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = t.alleles().iter().map(String::as_str).collect();
    let t_flipped = t.complement();
    let b_flipped: BTreeSet<&str> = t_flipped.alleles().iter().map(String::as_str).collect();

    let a_covers_b = b.is_subset(&a);
    let a_covers_b_flipped = b_flipped.is_subset(&a);

    match (a_covers_b, a_covers_b_flipped) {
        (true, true) => Phase::Unknown,
        (true, false) => Phase::Identical,
        (false, true) => Phase::Opposite,
        (false, false) => Phase::Inconsistent,
    }
}

/// Walk the target markers in order, matching each to a unique, strictly
/// advancing reference marker (§4.1). Returns one event per target marker.
pub fn match_markers(ref_index: &MarkerIndex, tgt_index: &MarkerIndex, mode: MatchMode) -> Vec<MatchEvent> {
    let mut events = Vec::with_capacity(tgt_index.len());
    let mut prev_ref_idx: i64 = -1;

    for (tgt_idx, target) in tgt_index.iter() {
        let candidates: Vec<usize> = mode
            .candidates(ref_index, target)
            .into_iter()
            .filter(|&ri| strand(ref_index.get(ri), target) != Phase::Inconsistent)
            .collect();

        let event = if candidates.is_empty() {
            MatchEvent::Rejected { tgt_idx, reason: RejectReason::NotInReference }
        } else if candidates.len() > 1 {
            MatchEvent::Rejected { tgt_idx, reason: RejectReason::MultipleRefMatches }
        } else {
            let ref_idx = candidates[0];
            if ref_idx as i64 == prev_ref_idx {
                MatchEvent::Rejected { tgt_idx, reason: RejectReason::DuplicateMarker }
            } else if (ref_idx as i64) < prev_ref_idx {
                MatchEvent::Rejected { tgt_idx, reason: RejectReason::MarkerOutOfOrder }
            } else {
                let allele_phase = strand(ref_index.get(ref_idx), target);
                prev_ref_idx = ref_idx as i64;
                MatchEvent::Matched(MatchedPair { ref_idx, tgt_idx, allele_phase })
            }
        };
        events.push(event);
    }

    events
}
