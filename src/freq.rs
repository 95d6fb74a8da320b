//! Allele-frequency phase signal (spec component C6).
//!
//! Grounded on ConSTRain's `utils::process_sample` frequency-ratio logic: a
//! small pure function over two summary counts with explicit handling of the
//! zero-denominator edge case, kept separate from the I/O that produces its
//! inputs.

use crate::dose::AlleleDose;
use crate::phase::Phase;

/// Decision threshold on the two-proportion z-statistic (§4.3).
pub const DELTA: f64 = 4.0;

/// Two-proportion z-statistic magnitude between the reference-allele
/// frequencies of `x` and `y`. Absent views or empty cohorts are treated as
/// maximally distant (`+∞`); an evenly-split or fully-concordant pooled
/// count is treated as perfectly concordant (`0.0`), per §4.3.
pub fn abs_z(x: Option<&AlleleDose>, y: Option<&AlleleDose>) -> f64 {
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        _ => return f64::INFINITY,
    };

    let x_cnt = x.counts[x.a_r] as f64;
    let y_cnt = y.counts[y.a_r] as f64;
    let nx: u64 = x.counts.iter().sum();
    let ny: u64 = y.counts.iter().sum();
    if nx == 0 || ny == 0 {
        return f64::INFINITY;
    }
    let (nx, ny) = (nx as f64, ny as f64);

    if x_cnt + y_cnt == 0.0 || x_cnt + y_cnt == nx + ny {
        return 0.0;
    }

    let px = x_cnt / nx;
    let py = y_cnt / ny;
    let p = (x_cnt + y_cnt) / (nx + ny);
    let variance = (1.0 / nx + 1.0 / ny) * p * (1.0 - p);
    (px - py).abs() / variance.sqrt()
}

/// Frequency-based phase verdict: same-strand reading wins if its
/// z-statistic is comfortably (by [`DELTA`]) smaller than the flipped
/// reading's, opposite-strand wins symmetrically, otherwise `Unknown`.
pub fn freq_phase(abs_z: f64, flipped_abs_z: f64) -> Phase {
    if abs_z.is_infinite() && flipped_abs_z.is_infinite() {
        Phase::Unknown
    } else if flipped_abs_z >= abs_z + DELTA {
        Phase::Identical
    } else if abs_z >= flipped_abs_z + DELTA {
        Phase::Opposite
    } else {
        Phase::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dose(counts: [u64; 2]) -> AlleleDose {
        AlleleDose { dose: vec![], counts: counts.to_vec(), a_r: 0 }
    }

    #[test]
    fn abs_z_is_zero_for_identical_frequencies() {
        let x = dose([50, 50]);
        let y = dose([50, 50]);
        assert_eq!(abs_z(Some(&x), Some(&y)), 0.0);
    }

    #[test]
    fn abs_z_is_zero_for_fully_concordant_counts() {
        let x = dose([100, 0]);
        let y = dose([50, 0]);
        assert_eq!(abs_z(Some(&x), Some(&y)), 0.0);
    }

    #[test]
    fn abs_z_is_infinite_when_a_side_is_missing_or_empty() {
        let x = dose([50, 50]);
        assert_eq!(abs_z(None, Some(&x)), f64::INFINITY);
        assert_eq!(abs_z(Some(&x), None), f64::INFINITY);
        let empty = dose([0, 0]);
        assert_eq!(abs_z(Some(&x), Some(&empty)), f64::INFINITY);
    }

    #[test]
    fn abs_z_is_positive_for_diverging_frequencies() {
        let x = dose([90, 10]);
        let y = dose([10, 90]);
        assert!(abs_z(Some(&x), Some(&y)) > 10.0);
    }

    #[test]
    fn freq_phase_picks_the_clearly_smaller_side() {
        assert_eq!(freq_phase(0.1, 10.0), Phase::Identical);
        assert_eq!(freq_phase(10.0, 0.1), Phase::Opposite);
        assert_eq!(freq_phase(1.0, 2.0), Phase::Unknown);
        assert_eq!(freq_phase(f64::INFINITY, f64::INFINITY), Phase::Unknown);
    }
}
