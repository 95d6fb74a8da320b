//! Sample-exclusion list reader.
//!
//! Grounded on ConSTRain's `io::bed`, which reads a plain-text auxiliary
//! file line by line into a small in-memory collection, skipping blank
//! lines and surfacing `anyhow::Context` on I/O failure.

use std::collections::HashSet;
use std::fs;

use anyhow::{Context, Result};

/// Read one sample identifier per non-blank line.
pub fn read_excluded_samples(path: &str) -> Result<HashSet<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read sample-exclusion file '{path}'"))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}
