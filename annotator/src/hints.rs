//! Hint aggregation: fold the per-source evidence files into the one canonical
//! hints file the prediction engine consumes. Sorting here fixes the record
//! order for everything downstream, so the merge and the engine's region
//! assignment never depend on source-file order.

use crate::error::{PipelineError, Result};
use crate::freshness;
use definitions::HintRecord;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Parse one evidence file. Comment lines and blank lines are skipped; any
/// malformed row is an error naming the offending line.
pub fn read_hints(path: &Path) -> Result<Vec<HintRecord>> {
    let reader = std::fs::File::open(path).map(BufReader::new)?;
    let mut records = vec![];
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record: HintRecord = line.parse().map_err(|e| {
            PipelineError::parse(format!("{}:{}", path.display(), idx + 1), e)
        })?;
        records.push(record);
    }
    Ok(records)
}

pub fn write_hints(path: &Path, records: &[HintRecord]) -> Result<()> {
    let mut wtr = std::fs::File::create(path).map(BufWriter::new)?;
    for record in records {
        writeln!(wtr, "{}", record)?;
    }
    Ok(())
}

/// Split into merge candidates and protected records. Manually curated records
/// with a group id keep independent identity and must never be collapsed.
pub fn partition_by_mergeability(records: Vec<HintRecord>) -> (Vec<HintRecord>, Vec<HintRecord>) {
    records.into_iter().partition(|r| !r.is_protected())
}

/// Stable multi-key sort: sequence name, then start, then end. Applying it
/// twice yields the same order (required for reproducible re-runs).
pub fn sort_records(records: &mut [HintRecord]) {
    records.sort_by(|a, b| {
        a.seqname
            .cmp(&b.seqname)
            .then(a.start.cmp(&b.start))
            .then(a.end.cmp(&b.end))
    });
}

/// Collapse consecutive records identical in (seqname, start, end, strand,
/// kind, src) into one record whose multiplicity is the sum of the collapsed
/// multiplicities. Input must already be sorted.
pub fn merge_duplicates(sorted: Vec<HintRecord>) -> Vec<HintRecord> {
    let mut out: Vec<HintRecord> = vec![];
    for record in sorted {
        match out.last_mut() {
            Some(prev) if prev.merge_key() == record.merge_key() => {
                let mult = prev.attrs.multiplicity() + record.attrs.multiplicity();
                prev.attrs.set_multiplicity(mult);
            }
            _ => out.push(record),
        }
    }
    out
}

/// The full aggregation chain over already-parsed records.
pub fn aggregate_records(records: Vec<HintRecord>) -> Vec<HintRecord> {
    let (mergeable, protected) = partition_by_mergeability(records);
    let mut mergeable = mergeable;
    sort_records(&mut mergeable);
    let mut merged = merge_duplicates(mergeable);
    // Ordering between the two groups carries no meaning downstream, but
    // appending the protected block keeps the output stable across runs.
    merged.extend(protected);
    merged
}

/// Aggregate the evidence files into `out`. Skips the work when `out` is
/// fresh. Returns the number of records written; zero evidence over all
/// sources means the requested evidence-driven run cannot proceed.
pub fn aggregate(sources: &[PathBuf], out: &Path, force: bool) -> Result<usize> {
    debug!("START\tHintAggregation");
    if !freshness::is_stale(sources, &[out], force) {
        info!("HINTS\tfresh\t{}", out.display());
        return Ok(read_hints(out)?.len());
    }
    let mut records = vec![];
    for source in sources {
        let mut from_source = read_hints(source)?;
        debug!("HINTS\t{}\t{}", source.display(), from_source.len());
        records.append(&mut from_source);
    }
    let merged = aggregate_records(records);
    if merged.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: "hint aggregation",
            detail: format!("no evidence records in {} source file(s)", sources.len()),
        });
    }
    write_hints(out, &merged)?;
    info!("HINTS\twritten\t{}\t{}", merged.len(), out.display());
    Ok(merged.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rec(line: &str) -> HintRecord {
        line.parse().unwrap()
    }

    #[test]
    fn duplicates_collapse_with_multiplicity() {
        let records = vec![
            rec("chr1\ta\tintron\t10\t50\t.\t+\t.\tsrc=P"),
            rec("chr1\tb\tintron\t10\t50\t.\t+\t.\tsrc=P"),
            rec("chr1\tc\tintron\t10\t50\t.\t+\t.\tsrc=P;mult=3"),
            rec("chr1\td\tintron\t10\t60\t.\t+\t.\tsrc=P"),
        ];
        let merged = merge_duplicates(records);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].attrs.multiplicity(), 5);
        assert_eq!(merged[1].attrs.multiplicity(), 1);
    }

    #[test]
    fn different_source_never_merges() {
        let records = vec![
            rec("chr1\ta\tintron\t10\t50\t.\t+\t.\tsrc=P"),
            rec("chr1\ta\tintron\t10\t50\t.\t+\t.\tsrc=E"),
        ];
        assert_eq!(merge_duplicates(records).len(), 2);
    }

    #[test]
    fn protected_records_survive_aggregation_unmerged() {
        let records = vec![
            rec("chr1\tman\tintron\t10\t50\t.\t+\t.\tsrc=M;grp=g1"),
            rec("chr1\tman\tintron\t10\t50\t.\t+\t.\tsrc=M;grp=g1"),
            rec("chr1\ta\tintron\t10\t50\t.\t+\t.\tsrc=P"),
            rec("chr1\tb\tintron\t10\t50\t.\t+\t.\tsrc=P"),
        ];
        let out = aggregate_records(records);
        // one merged P record plus the two protected copies.
        assert_eq!(out.len(), 3);
        let protected: Vec<_> = out.iter().filter(|r| r.is_protected()).collect();
        assert_eq!(protected.len(), 2);
        assert!(protected.iter().all(|r| r.attrs.multiplicity() == 1));
    }

    #[test]
    fn sort_is_idempotent() {
        let mut records = vec![
            rec("chr2\ta\tintron\t5\t9\t.\t+\t.\tsrc=P"),
            rec("chr1\ta\texonpart\t7\t30\t.\t+\t.\tsrc=P"),
            rec("chr1\ta\tintron\t7\t20\t.\t-\t.\tsrc=E"),
            rec("chr1\ta\tintron\t2\t20\t.\t+\t.\tsrc=P"),
        ];
        sort_records(&mut records);
        let once = records.clone();
        sort_records(&mut records);
        assert_eq!(once, records);
        let keys: Vec<_> = records
            .iter()
            .map(|r| (r.seqname.clone(), r.start, r.end))
            .collect();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn empty_evidence_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("empty.gff");
        std::fs::File::create(&src).unwrap();
        let out = dir.path().join("hints.gff");
        let err = aggregate(&[src], &out, false).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult { .. }));
    }

    #[test]
    fn aggregate_skips_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.gff");
        let mut file = std::fs::File::create(&src).unwrap();
        writeln!(file, "chr1\ta\tintron\t10\t50\t.\t+\t.\tsrc=P").unwrap();
        writeln!(file, "chr1\tb\tintron\t10\t50\t.\t+\t.\tsrc=P").unwrap();
        drop(file);
        let out = dir.path().join("hints.gff");
        assert_eq!(aggregate(&[src.clone()], &out, false).unwrap(), 1);
        let stamp = std::fs::metadata(&out).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        // second run reuses the fresh output.
        assert_eq!(aggregate(&[src], &out, false).unwrap(), 1);
        assert_eq!(std::fs::metadata(&out).unwrap().modified().unwrap(), stamp);
    }

    #[test]
    fn scenario_protein_only_evidence() {
        // 50 intron + 10 exonpart hints, each duplicated once in the raw
        // stream, all src=P: the canonical file holds exactly 60 records.
        let mut records = vec![];
        for i in 0..50u64 {
            let line = format!("chr1\taln\tintron\t{}\t{}\t.\t+\t.\tsrc=P", 100 + 10 * i, 105 + 10 * i);
            records.push(rec(&line));
            records.push(rec(&line));
        }
        for i in 0..10u64 {
            let line = format!("chr2\taln\texonpart\t{}\t{}\t.\t+\t.\tsrc=P", 50 + 20 * i, 60 + 20 * i);
            records.push(rec(&line));
        }
        let out = aggregate_records(records);
        assert_eq!(out.len(), 60);
        assert!(out.iter().all(|r| r.attrs.src() == Some("P")));
    }
}
