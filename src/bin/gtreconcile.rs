//! `gtreconcile` binary entry point.
//!
//! Grounded on ConSTRain's `bin/ConSTRain.rs`: parse arguments, run the
//! library's entry point, and translate any error into a logged message
//! and a non-zero exit code.

use std::env;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use gtreconcile::cli;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match cli::parse(&args) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    match gtreconcile::run(&config, &filedate_today()) {
        Ok(summary) => {
            log::info!("done: {summary:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `YYYYMMDD` for the current day in UTC, via civil-from-days arithmetic
/// (Howard Hinnant's algorithm) to avoid pulling in a date/time crate the
/// teacher's stack doesn't carry.
fn filedate_today() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before 1970").as_secs();
    let days = (secs / 86_400) as i64;
    let (y, m, d) = civil_from_days(days);
    format!("{y:04}{m:02}{d:02}")
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_matches_known_epoch_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
