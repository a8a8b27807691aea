//! Genome partitioning: split the assembly into size-bounded chunks of
//! parallel prediction work, each with its own FASTA, hint subset, and output
//! path. Disjoint output paths are what make the worker pool race-free.

use crate::error::{PipelineError, Result};
use definitions::{HintRecord, JobDescriptor, Region};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Above this scaffold count parallel execution tends to be dominated by
/// per-job overhead; advisory only.
pub const SCAFFOLD_WARNING_THRESHOLD: usize = 30_000;

#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Maximum combined bases per chunk.
    pub chunk_len: usize,
    /// Overlap between adjacent slices of an oversize sequence, so features at
    /// a cut are fully contained in at least one slice.
    pub overlap: usize,
    pub outdir: PathBuf,
}

impl PartitionConfig {
    pub fn new(chunk_len: usize, overlap: usize, outdir: &Path) -> Self {
        Self {
            chunk_len,
            overlap,
            outdir: outdir.to_path_buf(),
        }
    }
}

/// A contiguous piece of one sequence assigned to a chunk.
/// Coordinates are 0-based half-open over the stored sequence.
#[derive(Debug, Clone)]
struct Slice<'a> {
    name: &'a str,
    start: usize,
    end: usize,
    whole: bool,
}

/// Split the genome into job descriptors and write the per-chunk FASTA and
/// hint files. Sequence order is preserved; a sequence larger than the chunk
/// budget becomes its own run of overlapping slices.
pub fn partition(
    genome: &Path,
    hints: &[HintRecord],
    config: &PartitionConfig,
) -> Result<Vec<JobDescriptor>> {
    debug!("START\tGenomePartition");
    if config.chunk_len == 0 || config.overlap >= config.chunk_len {
        return Err(PipelineError::Config(format!(
            "chunk length {} must exceed overlap {}",
            config.chunk_len, config.overlap
        )));
    }
    let sequences = read_genome(genome)?;
    if sequences.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: "genome partition",
            detail: format!("no sequences in {}", genome.display()),
        });
    }
    if sequences.len() > SCAFFOLD_WARNING_THRESHOLD {
        warn!(
            "PARTITION\t{} scaffolds; parallel execution may be unreliable on assemblies this fragmented",
            sequences.len()
        );
    }
    std::fs::create_dir_all(&config.outdir)?;
    let chunks = pack(&sequences, config);
    let dropped = boundary_hint_count(&chunks, hints);
    if dropped > 0 {
        warn!(
            "PARTITION\t{} hint(s) span a slice boundary by more than the overlap and reach no job",
            dropped
        );
    }
    let mut jobs = vec![];
    for (id, chunk) in chunks.iter().enumerate() {
        let fasta = config.outdir.join(format!("chunk_{:05}.fa", id));
        let hints_path = config.outdir.join(format!("chunk_{:05}.hints.gff", id));
        let output = config.outdir.join(format!("chunk_{:05}.pred.gff", id));
        write_chunk_fasta(&fasta, chunk, &sequences)?;
        write_chunk_hints(&hints_path, chunk, hints)?;
        let regions = chunk
            .iter()
            .map(|s| Region {
                seqname: s.name.to_string(),
                start: s.start as u64 + 1,
                end: s.end as u64,
            })
            .collect();
        jobs.push(JobDescriptor {
            id,
            fasta,
            hints: hints_path,
            output,
            regions,
        });
    }
    info!("PARTITION\t{} sequences\t{} jobs", sequences.len(), jobs.len());
    Ok(jobs)
}

fn read_genome(genome: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let reader = bio::io::fasta::Reader::from_file(genome)
        .map_err(|e| PipelineError::parse("fasta", format!("{}: {}", genome.display(), e)))?;
    let mut sequences = vec![];
    for record in reader.records() {
        let record = record?;
        sequences.push((record.id().to_string(), record.seq().to_vec()));
    }
    Ok(sequences)
}

/// Greedy order-preserving packing into chunks bounded by the base budget.
fn pack<'a>(sequences: &'a [(String, Vec<u8>)], config: &PartitionConfig) -> Vec<Vec<Slice<'a>>> {
    let mut chunks: Vec<Vec<Slice<'a>>> = vec![];
    let mut current: Vec<Slice<'a>> = vec![];
    let mut current_len = 0usize;
    for (name, seq) in sequences {
        let len = seq.len();
        if len > config.chunk_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let mut start = 0;
            loop {
                let end = (start + config.chunk_len).min(len);
                chunks.push(vec![Slice {
                    name,
                    start,
                    end,
                    whole: false,
                }]);
                if end == len {
                    break;
                }
                start = end - config.overlap;
            }
        } else {
            if current_len + len > config.chunk_len && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(Slice {
                name,
                start: 0,
                end: len,
                whole: true,
            });
            current_len += len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Hints on a sliced sequence that no slice fully contains. Such a hint spans
/// a cut by more than the overlap margin and is forwarded to no job.
fn boundary_hint_count(chunks: &[Vec<Slice>], hints: &[HintRecord]) -> usize {
    hints
        .iter()
        .filter(|rec| {
            let mut sliced = false;
            for slice in chunks.iter().flatten() {
                if slice.name != rec.seqname {
                    continue;
                }
                if slice.whole {
                    return false;
                }
                sliced = true;
                let (lo, hi) = (slice.start as u64 + 1, slice.end as u64);
                if lo <= rec.start && rec.end <= hi {
                    return false;
                }
            }
            sliced
        })
        .count()
}

fn write_chunk_fasta(
    path: &Path,
    chunk: &[Slice],
    sequences: &[(String, Vec<u8>)],
) -> Result<()> {
    let file = std::fs::File::create(path).map(BufWriter::new)?;
    let mut wtr = bio::io::fasta::Writer::new(file);
    for slice in chunk {
        let seq = sequences
            .iter()
            .find(|(name, _)| name == slice.name)
            .map(|(_, seq)| &seq[slice.start..slice.end])
            .expect("slice references a read sequence");
        if slice.whole {
            wtr.write(slice.name, None, seq)?;
        } else {
            let header = format!("{}:{}-{}", slice.name, slice.start + 1, slice.end);
            wtr.write(&header, None, seq)?;
        }
    }
    Ok(())
}

/// Write the hint subset of one chunk. For a partial slice the records fully
/// inside the slice are kept and shifted to slice-local coordinates; the slice
/// already carries the overlap margin, so boundary features are intact in the
/// neighboring slice.
fn write_chunk_hints(path: &Path, chunk: &[Slice], hints: &[HintRecord]) -> Result<()> {
    let mut wtr = std::fs::File::create(path).map(BufWriter::new)?;
    for slice in chunk {
        let (lo, hi) = (slice.start as u64 + 1, slice.end as u64);
        for rec in hints.iter().filter(|r| r.seqname == slice.name) {
            if slice.whole {
                writeln!(wtr, "{}", rec)?;
            } else if lo <= rec.start && rec.end <= hi {
                let mut shifted = rec.clone();
                shifted.seqname = format!("{}:{}-{}", slice.name, lo, hi);
                shifted.start = rec.start - lo + 1;
                shifted.end = rec.end - lo + 1;
                writeln!(wtr, "{}", shifted)?;
            }
        }
    }
    Ok(())
}

pub fn save_jobs(jobs: &[JobDescriptor], path: &Path) -> Result<()> {
    let wtr = std::fs::File::create(path).map(BufWriter::new)?;
    serde_json::to_writer(wtr, jobs).map_err(|e| PipelineError::parse("job list", e))?;
    Ok(())
}

pub fn load_jobs(path: &Path) -> Result<Vec<JobDescriptor>> {
    let rdr = std::fs::File::open(path).map(std::io::BufReader::new)?;
    serde_json::from_reader(rdr).map_err(|e| PipelineError::parse("job list", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fasta(dir: &Path, seqs: &[(&str, usize)]) -> PathBuf {
        let path = dir.join("genome.fa");
        let mut file = std::fs::File::create(&path).unwrap();
        for (name, len) in seqs {
            writeln!(file, ">{}", name).unwrap();
            let seq: String = std::iter::repeat("ACGT").flat_map(|s| s.chars()).take(*len).collect();
            writeln!(file, "{}", seq).unwrap();
        }
        path
    }

    fn coverage_is_exact(jobs: &[JobDescriptor], seqs: &[(&str, usize)], overlap: u64) {
        for (name, len) in seqs {
            let mut covered = vec![0usize; *len];
            for job in jobs {
                for region in job.regions.iter().filter(|r| &r.seqname == name) {
                    for pos in region.start..=region.end {
                        covered[(pos - 1) as usize] += 1;
                    }
                }
            }
            assert!(covered.iter().all(|&c| c >= 1), "dropped bases in {}", name);
            // only overlap zones may be covered twice.
            let doubly = covered.iter().filter(|&&c| c > 1).count() as u64;
            let regions: u64 = jobs
                .iter()
                .flat_map(|j| j.regions.iter())
                .filter(|r| &r.seqname == name)
                .count() as u64;
            assert!(doubly <= overlap * regions);
            assert!(covered.iter().all(|&c| c <= 2));
        }
    }

    #[test]
    fn small_scaffolds_are_packed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let seqs = [("s1", 300), ("s2", 300), ("s3", 300)];
        let genome = write_fasta(dir.path(), &seqs);
        let config = PartitionConfig::new(700, 50, &dir.path().join("parts"));
        let jobs = partition(&genome, &[], &config).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].regions.len(), 2);
        assert_eq!(jobs[0].regions[0].seqname, "s1");
        assert_eq!(jobs[1].regions[0].seqname, "s3");
        coverage_is_exact(&jobs, &seqs, 50);
    }

    #[test]
    fn oversize_sequence_is_sliced_with_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let seqs = [("big", 2500)];
        let genome = write_fasta(dir.path(), &seqs);
        let config = PartitionConfig::new(1000, 100, &dir.path().join("parts"));
        let jobs = partition(&genome, &[], &config).unwrap();
        assert!(jobs.len() >= 3);
        assert_eq!(jobs[0].regions[0].start, 1);
        assert_eq!(jobs[0].regions[0].end, 1000);
        assert_eq!(jobs[1].regions[0].start, 901);
        coverage_is_exact(&jobs, &seqs, 100);
    }

    #[test]
    fn output_paths_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let seqs = [("s1", 400), ("s2", 400), ("s3", 400)];
        let genome = write_fasta(dir.path(), &seqs);
        let config = PartitionConfig::new(500, 50, &dir.path().join("parts"));
        let jobs = partition(&genome, &[], &config).unwrap();
        let outputs: std::collections::HashSet<_> = jobs.iter().map(|j| &j.output).collect();
        assert_eq!(outputs.len(), jobs.len());
    }

    #[test]
    fn hints_are_subset_and_shifted() {
        let dir = tempfile::tempdir().unwrap();
        let seqs = [("big", 2000)];
        let genome = write_fasta(dir.path(), &seqs);
        let hints: Vec<HintRecord> = vec![
            "big\taln\tintron\t100\t200\t.\t+\t.\tsrc=P".parse().unwrap(),
            "big\taln\tintron\t1500\t1600\t.\t+\t.\tsrc=P".parse().unwrap(),
            "other\taln\tintron\t10\t20\t.\t+\t.\tsrc=P".parse().unwrap(),
        ];
        let config = PartitionConfig::new(1000, 100, &dir.path().join("parts"));
        let jobs = partition(&genome, &hints, &config).unwrap();
        let first = std::fs::read_to_string(&jobs[0].hints).unwrap();
        assert!(first.contains("\t100\t200\t"));
        assert!(!first.contains("other"));
        // slice 2 spans 901..1900: hint at 1500 shifts to 600.
        let second = std::fs::read_to_string(&jobs[1].hints).unwrap();
        assert!(second.contains("\t600\t700\t"));
    }

    #[test]
    fn hints_lost_to_a_slice_boundary_are_counted() {
        let chunks = vec![vec![
            Slice {
                name: "big",
                start: 0,
                end: 1000,
                whole: false,
            },
            Slice {
                name: "big",
                start: 900,
                end: 1900,
                whole: false,
            },
            Slice {
                name: "small",
                start: 0,
                end: 500,
                whole: true,
            },
        ]];
        let hints: Vec<HintRecord> = vec![
            // crosses the cut by more than the overlap: in no slice.
            "big\taln\tintron\t850\t1150\t.\t+\t.\tsrc=P".parse().unwrap(),
            // inside the second slice (901..1900).
            "big\taln\tintron\t950\t1150\t.\t+\t.\tsrc=P".parse().unwrap(),
            // whole sequences never lose hints.
            "small\taln\tintron\t10\t490\t.\t+\t.\tsrc=P".parse().unwrap(),
            // unknown sequences are not this check's business.
            "other\taln\tintron\t1\t9\t.\t+\t.\tsrc=P".parse().unwrap(),
        ];
        assert_eq!(boundary_hint_count(&chunks, &hints), 1);
    }

    #[test]
    fn invalid_budget_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let genome = write_fasta(dir.path(), &[("s1", 100)]);
        let config = PartitionConfig::new(100, 100, &dir.path().join("parts"));
        assert!(matches!(
            partition(&genome, &[], &config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn jobs_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let genome = write_fasta(dir.path(), &[("s1", 200)]);
        let config = PartitionConfig::new(500, 50, &dir.path().join("parts"));
        let jobs = partition(&genome, &[], &config).unwrap();
        let path = dir.path().join("jobs.json");
        save_jobs(&jobs, &path).unwrap();
        let loaded = load_jobs(&path).unwrap();
        assert_eq!(loaded.len(), jobs.len());
        assert_eq!(loaded[0].output, jobs[0].output);
    }
}
