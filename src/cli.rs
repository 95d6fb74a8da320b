//! Command line interface.
//!
//! Grounded on ConSTRain's `cli.rs`, but the `key=value` argument grammar
//! required here (`ref=foo.vcf.gz`) has no natural expression as clap flags,
//! so parsing is hand-rolled in the same spirit: one struct per run, built
//! once, validated eagerly with `anyhow::Context` on every failure path.

use anyhow::{bail, Context, Result};

use crate::matcher::MatchMode;

/// A parsed `chrom` argument: `<chrom>` or `<chrom>:<start>-<end>`
/// (1-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromRegion {
    pub chrom: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl ChromRegion {
    pub fn contains(&self, chrom: &str, pos: i64) -> bool {
        if chrom != self.chrom {
            return false;
        }
        self.start.is_none_or(|s| pos >= s) && self.end.is_none_or(|e| pos <= e)
    }

    fn parse(s: &str) -> Result<ChromRegion> {
        let Some((chrom, range)) = s.split_once(':') else {
            return Ok(ChromRegion { chrom: s.to_string(), start: None, end: None });
        };
        let (start, end) = range.split_once('-').with_context(|| format!("malformed chrom region '{s}': expected <chrom>:<start>-<end>"))?;
        let start: i64 = start.parse().with_context(|| format!("malformed chrom region '{s}': start is not a number"))?;
        let end: i64 = end.parse().with_context(|| format!("malformed chrom region '{s}': end is not a number"))?;
        if start > end {
            bail!("malformed chrom region '{s}': start > end");
        }
        Ok(ChromRegion { chrom: chrom.to_string(), start: Some(start), end: Some(end) })
    }
}

/// Fully-validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub ref_path: String,
    pub gt_path: String,
    pub out_prefix: String,
    pub region: ChromRegion,
    pub match_mode: MatchMode,
    pub strict: bool,
    pub exclude_samples_path: Option<String>,
}

const USAGE: &str = "usage: gtreconcile ref=<path> gt=<path> chrom=<chrom[:start-end]> out=<prefix> [match=ID|POS] [strict=true|false] [excludesamples=<path>]";

/// Parse `key=value` arguments (as received after the program name).
pub fn parse(args: &[String]) -> Result<Config> {
    let mut ref_path = None;
    let mut gt_path = None;
    let mut out_prefix = None;
    let mut chrom = None;
    let mut match_mode = MatchMode::Id;
    let mut strict = false;
    let mut exclude_samples_path = None;

    for arg in args {
        let (key, value) = arg.split_once('=').with_context(|| format!("{USAGE}\nnot a key=value argument: '{arg}'"))?;
        match key {
            "ref" => ref_path = Some(value.to_string()),
            "gt" => gt_path = Some(value.to_string()),
            "out" => out_prefix = Some(value.to_string()),
            "chrom" => chrom = Some(ChromRegion::parse(value)?),
            "match" => match_mode = MatchMode::parse(value).with_context(|| format!("{USAGE}\ninvalid match mode '{value}', expected ID or POS"))?,
            "strict" => strict = parse_bool(value).with_context(|| format!("{USAGE}\ninvalid strict value '{value}', expected true or false"))?,
            "excludesamples" => exclude_samples_path = Some(value.to_string()),
            other => bail!("{USAGE}\nunknown argument key '{other}'"),
        }
    }

    let ref_path = ref_path.with_context(|| format!("{USAGE}\nmissing required argument 'ref'"))?;
    let gt_path = gt_path.with_context(|| format!("{USAGE}\nmissing required argument 'gt'"))?;
    let out_prefix = out_prefix.with_context(|| format!("{USAGE}\nmissing required argument 'out'"))?;
    let region = chrom.with_context(|| format!("{USAGE}\nmissing required argument 'chrom'"))?;

    if ref_path == out_prefix || gt_path == out_prefix {
        bail!("output prefix '{out_prefix}' collides with an input path");
    }

    Ok(Config { ref_path, gt_path, out_prefix, region, match_mode, strict, exclude_samples_path })
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("not a boolean: '{s}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_required_and_defaulted_arguments() {
        let cfg = parse(&args(&["ref=ref.vcf.gz", "gt=gt.vcf.gz", "chrom=chr1", "out=result"])).unwrap();
        assert_eq!(cfg.ref_path, "ref.vcf.gz");
        assert_eq!(cfg.match_mode, MatchMode::Id);
        assert!(!cfg.strict);
        assert_eq!(cfg.region, ChromRegion { chrom: "chr1".into(), start: None, end: None });
    }

    #[test]
    fn parses_chrom_region_and_case_insensitive_match_mode() {
        let cfg = parse(&args(&["ref=r", "gt=g", "chrom=chr2:100-200", "out=o", "match=pos", "strict=TRUE"])).unwrap();
        assert_eq!(cfg.region, ChromRegion { chrom: "chr2".into(), start: Some(100), end: Some(200) });
        assert_eq!(cfg.match_mode, MatchMode::Pos);
        assert!(cfg.strict);
        assert!(cfg.region.contains("chr2", 150));
        assert!(!cfg.region.contains("chr2", 201));
        assert!(!cfg.region.contains("chr1", 150));
    }

    #[test]
    fn rejects_unknown_keys_and_missing_required_arguments() {
        assert!(parse(&args(&["ref=r", "gt=g", "chrom=chr1", "out=o", "bogus=1"])).is_err());
        assert!(parse(&args(&["ref=r", "gt=g", "out=o"])).is_err());
    }

    #[test]
    fn rejects_malformed_chrom_region() {
        assert!(parse(&args(&["ref=r", "gt=g", "chrom=chr1:100", "out=o"])).is_err());
        assert!(parse(&args(&["ref=r", "gt=g", "chrom=chr1:200-100", "out=o"])).is_err());
    }

    #[test]
    fn rejects_output_path_colliding_with_an_input() {
        assert!(parse(&args(&["ref=same", "gt=g", "chrom=chr1", "out=same"])).is_err());
    }
}
