//! htslib-backed VCF reading and writing.
//!
//! Grounded on ConSTRain's `io::vcf`: a thin layer translating between
//! `rust_htslib::bcf` types and this crate's own domain types, with every
//! failure path wrapped in `anyhow::Context` naming the file and record at
//! fault. This is the only module that touches `rust_htslib` directly; the
//! rest of the engine depends on [`crate::window::RecordSource`] instead.

use std::collections::HashSet;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use rust_htslib::bcf::header::Header as BcfHeader;
use rust_htslib::bcf::record::GenotypeAllele;
use rust_htslib::bcf::{Format, Read, Reader, Writer};

use crate::cli::ChromRegion;
use crate::emit::VcfLine;
use crate::index::MarkerIndex;
use crate::marker::Marker;
use crate::record::{Haplotype, Record};
use crate::window::RecordSource;

fn marker_from_record(record: &rust_htslib::bcf::Record, chrom: &str) -> Result<Marker> {
    let pos = record.pos() + 1; // htslib positions are 0-based
    let ids: Vec<String> = {
        let raw = record.id();
        if raw == b"." {
            Vec::new()
        } else {
            String::from_utf8_lossy(&raw).split(';').map(str::to_string).collect()
        }
    };
    let alleles: Vec<String> = record.alleles().into_iter().map(|a| String::from_utf8_lossy(a).into_owned()).collect();
    if alleles.len() < 2 {
        bail!("record at {chrom}:{pos} carries fewer than two alleles");
    }
    let end = record.info(b"END").integer().ok().flatten().map(|v| v[0] as i64);

    Ok(Marker::new(chrom, pos, ids, alleles, end))
}

fn haplotypes_from_record(record: &rust_htslib::bcf::Record, n_samples: usize) -> Result<Vec<Haplotype>> {
    let genotypes = record.genotypes().context("failed to decode GT field")?;
    let mut out = Vec::with_capacity(n_samples);
    for sample in 0..n_samples {
        let gt = genotypes.get(sample);
        let mut alleles = gt.iter().filter(|a| !matches!(a, GenotypeAllele::UnphasedMissing | GenotypeAllele::PhasedMissing));
        let a1 = alleles.next();
        let a2 = alleles.next();
        let phased = gt.iter().any(|a| matches!(a, GenotypeAllele::Phased(_) | GenotypeAllele::PhasedMissing));
        out.push(Haplotype { a1: a1.and_then(allele_index), a2: a2.and_then(allele_index), phased });
    }
    Ok(out)
}

fn allele_index(a: &GenotypeAllele) -> Option<u32> {
    match a {
        GenotypeAllele::Unphased(i) | GenotypeAllele::Phased(i) => Some(*i as u32),
        _ => None,
    }
}

/// Read every marker in `path` whose chromosome and position fall inside
/// `region`, plus the file's full (unfiltered) sample list.
pub fn prescan(path: &str, region: &ChromRegion) -> Result<(MarkerIndex, Vec<String>)> {
    let mut reader = Reader::from_path(path).with_context(|| format!("failed to open VCF file '{path}'"))?;
    let header = reader.header().to_owned();
    let samples: Vec<String> = header.samples().iter().map(|s| String::from_utf8_lossy(s).into_owned()).collect();

    let mut markers = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to read a record from '{path}'"))?;
        let rid = record.rid().with_context(|| format!("record in '{path}' has no contig"))?;
        let chrom = String::from_utf8_lossy(header.rid2name(rid)?).into_owned();
        let pos = record.pos() + 1;
        if !region.contains(&chrom, pos) {
            continue;
        }
        markers.push(marker_from_record(&record, &chrom)?);
    }

    let index = MarkerIndex::build(markers)?;
    Ok((index, samples))
}

/// A streaming reader advanced in lockstep with the matched-triple sequence
/// (§5): each call to [`RecordSource::next`] pulls forward until it reaches
/// the expected marker.
pub struct VcfRecordSource {
    reader: Reader,
    n_samples: usize,
    sample_keep: Option<Vec<usize>>,
}

impl VcfRecordSource {
    pub fn open(path: &str, region: ChromRegion, exclude: &HashSet<String>) -> Result<Self> {
        let reader = Reader::from_path(path).with_context(|| format!("failed to open VCF file '{path}'"))?;
        let header = reader.header();
        let n_samples = header.sample_count() as usize;
        let sample_keep = if exclude.is_empty() {
            None
        } else {
            Some(
                header
                    .samples()
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| !exclude.contains(&String::from_utf8_lossy(name).into_owned()))
                    .map(|(i, _)| i)
                    .collect(),
            )
        };
        let _ = region; // region filtering already applied during prescan; retained here for symmetry
        Ok(VcfRecordSource { reader, n_samples, sample_keep })
    }
}

impl RecordSource for VcfRecordSource {
    fn next(&mut self, expected: &Marker) -> Result<Record> {
        loop {
            let mut record = self.reader.empty_record();
            match self.reader.read(&mut record) {
                None => bail!("input modified during run: stream exhausted before marker {expected}"),
                Some(res) => res.context("failed to read VCF record")?,
            }
            let header = self.reader.header();
            let rid = record.rid().context("record has no contig")?;
            let chrom = String::from_utf8_lossy(header.rid2name(rid)?).into_owned();
            let marker = marker_from_record(&record, &chrom)?;

            if &marker == expected {
                let haplotypes = haplotypes_from_record(&record, self.n_samples)?;
                let full = Record::new(Rc::new(marker), haplotypes);
                return Ok(match &self.sample_keep {
                    Some(keep) => full.subset(keep),
                    None => full,
                });
            }

            // This record wasn't chosen as part of the matched-triple sequence
            // (not r*, or rejected as NOT_IN_REFERENCE/MULTIPLE_REF_MATCHES/
            // DUPLICATE_MARKER/MARKER_OUT_OF_ORDER) but is still physically
            // present in the file; skip forward past it. Only a record that
            // has already moved past `expected` in genomic order means the
            // expected marker itself is missing from the stream.
            if marker.chrom() != expected.chrom() || marker.pos() > expected.pos() {
                bail!("input modified during run: passed marker {expected} without a matching record (stream at {marker})");
            }
        }
    }
}

const FILEFORMAT: &[u8] = b"##fileformat=VCFv4.2";
const FORMAT_GT_LINE: &[u8] = br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#;

/// Output `.vcf.gz` writer, streaming one record per call to `write_line`.
pub struct VcfOutput {
    writer: Writer,
}

impl VcfOutput {
    pub fn create(out_prefix: &str, filedate: &str, source_version: &str, unfiltered_samples: &[String]) -> Result<Self> {
        let mut header = BcfHeader::new();
        header.push_record(FILEFORMAT);
        header.push_record(format!("##filedate={filedate}").as_bytes());
        header.push_record(format!("##source={source_version}").as_bytes());
        header.push_record(br#"##INFO=<ID=END,Number=1,Type=Integer,Description="End position of the variant">"#);
        header.push_record(FORMAT_GT_LINE);
        for sample in unfiltered_samples {
            header.push_sample(sample.as_bytes());
        }

        let path = format!("{out_prefix}.vcf.gz");
        let writer = Writer::from_path(&path, &header, false, Format::Vcf).with_context(|| format!("failed to create output VCF '{path}'"))?;
        Ok(VcfOutput { writer })
    }

    pub fn write_line(&mut self, line: &VcfLine) -> Result<()> {
        let mut record = self.writer.empty_record();
        let rid = self.writer.header().name2rid(line.chrom.as_bytes()).with_context(|| format!("contig '{}' missing from output header", line.chrom))?;
        record.set_rid(Some(rid));
        record.set_pos(line.pos - 1);
        if line.id != "." {
            record.set_id(line.id.as_bytes())?;
        }

        let mut alleles: Vec<&[u8]> = vec![line.reference.as_bytes()];
        if !line.alt.is_empty() {
            alleles.push(line.alt.as_bytes());
        }
        record.set_alleles(&alleles)?;

        if let Some(end) = line.info.strip_prefix("END=") {
            record.push_info_integer(b"END", &[end.parse::<i32>().context("malformed END info value")?])?;
        }

        let genotypes: Result<Vec<Vec<GenotypeAllele>>> = line
            .genotypes
            .split('\t')
            .map(|gt| {
                let sep = if gt.contains('|') { '|' } else { '/' };
                gt.split(sep)
                    .map(|a| {
                        Ok(match (a, sep) {
                            (".", '|') => GenotypeAllele::PhasedMissing,
                            (".", _) => GenotypeAllele::UnphasedMissing,
                            (i, '|') => GenotypeAllele::Phased(i.parse::<i32>().context("malformed GT allele index")?),
                            (i, _) => GenotypeAllele::Unphased(i.parse::<i32>().context("malformed GT allele index")?),
                        })
                    })
                    .collect()
            })
            .collect();
        let genotypes = genotypes?;
        let flat: Vec<GenotypeAllele> = genotypes.into_iter().flatten().collect();
        record.push_genotypes(&flat)?;

        self.writer.write(&record).context("failed to write output VCF record")
    }
}
