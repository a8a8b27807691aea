//! Reconstruction of one genome-wide prediction set, either from per-partition
//! outputs (single-set join) or from two independently hint-weighted runs
//! (dual join). The dual join recovers transcripts the structural merge tool
//! drops when they sit wholly inside an intron of a kept transcript; without
//! that pass, evidence-supported genes silently disappear.

use crate::error::{PipelineError, Result};
use crate::external::ExternalCommand;
use crate::hints::{read_hints, write_hints};
use definitions::{
    FeatureKind, HintRecord, JobDescriptor, PredictionSet, Transcript, PROTEIN_SOURCE, RNA_SOURCE,
};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Map one slice-local prediction line back to assembly coordinates. Slices of
/// an oversize sequence carry `name:start-end` FASTA headers (1-based) and
/// slice-local feature coordinates; whole-sequence lines pass through
/// untouched, as does anything that is not a 9-column feature row.
fn unshift_line(line: &str) -> String {
    if line.starts_with('#') {
        return line.to_string();
    }
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return line.to_string();
    }
    let (name, range) = match fields[0].rsplit_once(':') {
        Some(pair) => pair,
        None => return line.to_string(),
    };
    let offset = match range.split_once('-') {
        Some((lo, hi)) => match (lo.parse::<u64>(), hi.parse::<u64>()) {
            (Ok(lo), Ok(_)) if lo > 0 => lo - 1,
            _ => return line.to_string(),
        },
        None => return line.to_string(),
    };
    let (start, end) = match (fields[3].parse::<u64>(), fields[4].parse::<u64>()) {
        (Ok(start), Ok(end)) => (start, end),
        _ => return line.to_string(),
    };
    let start = (start + offset).to_string();
    let end = (end + offset).to_string();
    let mut fields = fields;
    fields[0] = name;
    fields[3] = &start;
    fields[4] = &end;
    fields.join("\t")
}

/// Concatenate the partition outputs ordered by (sequence, region start),
/// restoring assembly coordinates on slice-local lines so the downstream
/// boundary resolver sees one coordinate system per sequence.
/// Completion order of the worker pool never shows through here.
pub fn concatenate_partitions(jobs: &[JobDescriptor], out: &Path) -> Result<()> {
    debug!("START\tPartitionJoin\t{} partitions", jobs.len());
    for job in jobs {
        if !job.output.exists() {
            return Err(PipelineError::MissingArtifact {
                stage: "prediction join",
                path: job.output.clone(),
            });
        }
    }
    let mut ordered: Vec<&JobDescriptor> = jobs.iter().collect();
    ordered.sort_by_key(|job| {
        job.regions
            .first()
            .map(|r| (r.seqname.clone(), r.start))
            .unwrap_or_default()
    });
    let mut wtr = std::fs::File::create(out).map(BufWriter::new)?;
    for job in ordered {
        let rdr = std::fs::File::open(&job.output).map(BufReader::new)?;
        for line in rdr.lines() {
            let line = line?;
            if !line.is_empty() {
                writeln!(wtr, "{}", unshift_line(&line))?;
            }
        }
    }
    Ok(())
}

/// Single-set join: concatenate, then let the external boundary-resolution
/// tool clean up duplicate calls in the chunk-overlap zones (one gff stream
/// in, one cleaned gff stream out).
pub fn join_partitions(jobs: &[JobDescriptor], out: &Path, resolver: &Path) -> Result<()> {
    let raw = out.with_extension("raw.gff");
    concatenate_partitions(jobs, &raw)?;
    ExternalCommand::new(resolver)
        .stdin_from(&raw)
        .stdout_to(out)
        .run()
}

/// Tag each transcript with the evidence sources backing it. An intron hint
/// supports a transcript when it matches one of its introns exactly; any other
/// hint kind supports it when it falls inside the transcript span.
pub fn annotate_support(set: &mut PredictionSet, hints: &[HintRecord]) {
    for tx in set.transcripts.iter_mut() {
        let introns = tx.introns();
        let (span_start, span_end) = tx.span();
        for hint in hints.iter() {
            if hint.seqname != tx.seqname {
                continue;
            }
            let src = match hint.attrs.src() {
                Some(src) => src.to_string(),
                None => continue,
            };
            let matched = match hint.kind {
                FeatureKind::Intron => introns
                    .iter()
                    .any(|&(lo, hi)| lo == hint.start && hi == hint.end),
                _ => span_start <= hint.start && hint.end <= span_end,
            };
            if matched {
                tx.supported_by.insert(src);
            }
        }
    }
}

/// Which of the two input sets is kept wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinBasis {
    /// The protein-weighted run is the basis; the RNA run is the overlay.
    ProteinWeighted,
    /// The RNA-weighted run is the basis; the protein run is the overlay.
    RnaWeighted,
}

pub fn supported_count(set: &PredictionSet, src: &str) -> usize {
    set.transcripts
        .iter()
        .filter(|tx| tx.is_supported_by(src))
        .count()
}

/// The set with more evidence-supported transcripts wins. Equal counts favor
/// the protein-weighted set; the original left ties to accident, so the
/// tie-break is fixed here.
pub fn choose_basis(protein_run: &PredictionSet, rna_run: &PredictionSet) -> JoinBasis {
    let protein = supported_count(protein_run, PROTEIN_SOURCE);
    let rna = supported_count(rna_run, RNA_SOURCE);
    if rna > protein {
        JoinBasis::RnaWeighted
    } else {
        JoinBasis::ProteinWeighted
    }
}

/// Restrict a set to the transcripts supported by the given evidence source.
pub fn filter_supported(set: &PredictionSet, src: &str) -> PredictionSet {
    let transcripts: Vec<_> = set
        .transcripts
        .iter()
        .filter(|tx| tx.is_supported_by(src))
        .cloned()
        .collect();
    PredictionSet {
        label: set.label.clone(),
        transcripts,
    }
}

/// True when `tx` sits entirely inside one intron of `host`.
pub fn lies_in_intron_of(tx: &Transcript, host: &Transcript) -> bool {
    if tx.seqname != host.seqname {
        return false;
    }
    let (start, end) = tx.span();
    host.introns()
        .iter()
        .any(|&(lo, hi)| lo <= start && end <= hi)
}

/// Transcripts of `source` that the merge dropped even though they do not
/// overlap anything kept: structurally absent from `merged` and nested inside
/// an intron of a kept transcript.
pub fn find_missed(source: &PredictionSet, merged: &PredictionSet) -> Vec<Transcript> {
    let kept: HashSet<String> = merged
        .transcripts
        .iter()
        .map(|tx| tx.fingerprint())
        .collect();
    source
        .transcripts
        .iter()
        .filter(|tx| !kept.contains(&tx.fingerprint()))
        .filter(|tx| merged.transcripts.iter().any(|host| lies_in_intron_of(tx, host)))
        .cloned()
        .collect()
}

/// Keep one transcript per structural fingerprint, first-seen wins.
pub fn dedup_by_fingerprint(transcripts: Vec<Transcript>) -> Vec<Transcript> {
    let mut seen = HashSet::new();
    transcripts
        .into_iter()
        .filter(|tx| seen.insert(tx.fingerprint()))
        .collect()
}

/// Dual join, steps 1-6: count support, pick basis/overlay, run the external
/// structural merge with the basis at higher priority, recover missed genes
/// from both inputs, deduplicate them structurally, and append.
pub fn join_dual(
    merger: &Path,
    protein_run: &PredictionSet,
    rna_run: &PredictionSet,
    workdir: &Path,
) -> Result<PredictionSet> {
    debug!("START\tDualJoin");
    let protein = supported_count(protein_run, PROTEIN_SOURCE);
    let rna = supported_count(rna_run, RNA_SOURCE);
    info!("JOIN\tsupport\tprotein={}\trna={}", protein, rna);
    let (mut basis, mut overlay) = match choose_basis(protein_run, rna_run) {
        JoinBasis::ProteinWeighted => {
            (protein_run.clone(), filter_supported(rna_run, RNA_SOURCE))
        }
        JoinBasis::RnaWeighted => {
            (rna_run.clone(), filter_supported(protein_run, PROTEIN_SOURCE))
        }
    };
    // The two runs share one predictor id namespace; the same id can name
    // unrelated loci, which would fuse when the merged rows are regrouped.
    let basis_label = basis.label.clone();
    basis.relabel(&basis_label);
    let overlay_label = overlay.label.clone();
    overlay.relabel(&overlay_label);
    info!("JOIN\tbasis={}\toverlay={}({})", basis.label, overlay.label, overlay.len());
    std::fs::create_dir_all(workdir)?;
    let basis_path = workdir.join("basis.gff");
    let overlay_path = workdir.join("overlay.gff");
    let merged_path = workdir.join("merged.gff");
    write_hints(&basis_path, &basis.to_records())?;
    write_hints(&overlay_path, &overlay.to_records())?;
    ExternalCommand::new(merger)
        .arg(format!(
            "--genesets={},{}",
            basis_path.display(),
            overlay_path.display()
        ))
        .arg("--priorities=2,1")
        .arg(format!("--output={}", merged_path.display()))
        .run()?;
    let merged_records = read_hints(&merged_path)?;
    let merged = PredictionSet::from_records("joined", &merged_records)?;
    Ok(recover_missed(merged, &basis, &overlay)?)
}

/// The reconciliation pass shared by the external merge and by tests: append
/// structurally unique intron-nested transcripts back onto the merged set,
/// with ids disambiguated by a set-of-origin prefix.
pub fn recover_missed(
    merged: PredictionSet,
    basis: &PredictionSet,
    overlay: &PredictionSet,
) -> Result<PredictionSet> {
    let mut missed = vec![];
    for (origin, set) in [(basis.label.clone(), basis), (overlay.label.clone(), overlay)] {
        for mut tx in find_missed(set, &merged) {
            tx.tx_id = format!("{}.{}", origin, tx.tx_id);
            tx.gene_id = format!("{}.{}", origin, tx.gene_id);
            missed.push(tx);
        }
    }
    let missed = dedup_by_fingerprint(missed);
    if !missed.is_empty() {
        info!("JOIN\trescued\t{}", missed.len());
    }
    let mut transcripts = merged.transcripts;
    transcripts.extend(missed);
    Ok(PredictionSet::new(&merged.label, transcripts)?)
}
