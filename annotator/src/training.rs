//! Training loop: turn a candidate gene set into a trained, optimized species
//! parameter set. The candidates march through a fixed sequence of states
//! (deduplicated, validity-filtered, size-capped, redundancy-filtered, split,
//! trained, optimized, optionally CRF-retrained) and each transition is a pure
//! function here plus at most one external tool run.

use crate::accuracy::parse_accuracy_report;
use crate::error::{PipelineError, Result};
use crate::external::{ExternalCommand, Toolchain};
use crate::find_union::FindUnion;
use crate::hints::write_hints;
use crate::translate;
use definitions::{AccuracyMetrics, GeneticCode, PredictionSet, Transcript};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Hard cap on training examples. Bounds the all-against-all similarity search
/// and the optimizer runtime.
pub const MAX_TRAINING_GENES: usize = 8000;
/// Below this many surviving genes the trained model is usable but weak.
pub const LOW_TRAINING_GENES: usize = 600;
/// The cross-validation fold count scales with parallelism but never drops
/// below this.
pub const KFOLD_FLOOR: usize = 8;

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub species: String,
    /// Directory holding the species parameter files.
    pub species_dir: PathBuf,
    pub workdir: PathBuf,
    pub rounds: usize,
    pub crf: bool,
    /// Keep the CRF parameter set even when its test score does not improve.
    pub keep_crf_always: bool,
    pub code: GeneticCode,
    pub seed: u64,
    pub threads: usize,
    /// Template parameter files for bootstrapping a species that does not
    /// exist yet.
    pub template: Option<PathBuf>,
}

impl TrainingConfig {
    fn parameter_file(&self) -> PathBuf {
        self.species_dir
            .join(format!("{}_parameters.cfg", self.species))
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub candidate_count: usize,
    pub final_count: usize,
    pub baseline: AccuracyMetrics,
    pub optimized: AccuracyMetrics,
    pub crf: Option<AccuracyMetrics>,
    pub kept_crf: bool,
}

#[derive(Debug, Clone)]
pub struct TrainingSplit {
    pub train: Vec<Transcript>,
    pub validation: Vec<Transcript>,
    pub test: Vec<Transcript>,
}

/// Keep one transcript per gene. Alternative splice variants of a gene carry
/// near-identical statistics and would over-weight it.
pub fn dedup_variants(transcripts: &[Transcript]) -> Vec<Transcript> {
    let mut seen = HashSet::new();
    transcripts
        .iter()
        .filter(|tx| seen.insert(tx.gene_id.clone()))
        .cloned()
        .collect()
}

/// Sequence ids the trainer rejected in validation-only mode.
pub fn parse_bad_ids(report: &str) -> Result<HashSet<String>> {
    let pattern = Regex::new(r"error in sequence ([^\s:]+)")
        .map_err(|e| PipelineError::parse("trainer report", e.to_string()))?;
    Ok(pattern
        .captures_iter(report)
        .map(|cap| cap[1].to_string())
        .collect())
}

/// Drop every candidate the trainer could not parse. Returns the survivors and
/// the rejected ids for the log.
pub fn filter_valid(
    transcripts: Vec<Transcript>,
    report: &str,
) -> Result<(Vec<Transcript>, Vec<String>)> {
    let bad = parse_bad_ids(report)?;
    let mut rejected = vec![];
    let mut kept = vec![];
    for tx in transcripts {
        if bad.contains(&tx.tx_id) {
            rejected.push(tx.tx_id);
        } else {
            kept.push(tx);
        }
    }
    Ok((kept, rejected))
}

fn cap_to(
    transcripts: Vec<Transcript>,
    cap: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<Transcript> {
    if transcripts.len() <= cap {
        return transcripts;
    }
    let mut picked: Vec<usize> = rand::seq::index::sample(rng, transcripts.len(), cap).into_vec();
    picked.sort_unstable();
    let picked: HashSet<usize> = picked.into_iter().collect();
    transcripts
        .into_iter()
        .enumerate()
        .filter(|(i, _)| picked.contains(i))
        .map(|(_, tx)| tx)
        .collect()
}

/// Uniform random subsample down to [`MAX_TRAINING_GENES`], input order kept.
pub fn size_cap(transcripts: Vec<Transcript>, rng: &mut Xoshiro256PlusPlus) -> Vec<Transcript> {
    cap_to(transcripts, MAX_TRAINING_GENES, rng)
}

/// Query/subject id pairs from a tab-separated similarity report (first two
/// columns). Self hits carry no information and are dropped here.
pub fn parse_similar_pairs(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let query = fields.next()?;
            let subject = fields.next()?;
            (query != subject).then(|| (query.to_string(), subject.to_string()))
        })
        .collect()
}

/// One representative per similarity cluster, input order kept. Similarity
/// pairs are edges; the first member of each connected component survives.
pub fn pick_representatives(
    transcripts: Vec<Transcript>,
    pairs: &[(String, String)],
) -> Vec<Transcript> {
    let index: HashMap<&str, usize> = transcripts
        .iter()
        .enumerate()
        .map(|(i, tx)| (tx.tx_id.as_str(), i))
        .collect();
    let mut clusters = FindUnion::new(transcripts.len());
    for (query, subject) in pairs {
        if let (Some(&a), Some(&b)) = (index.get(query.as_str()), index.get(subject.as_str())) {
            clusters.unite(a, b);
        }
    }
    let mut seen_roots = HashSet::new();
    transcripts
        .into_iter()
        .enumerate()
        .filter(|(i, _)| match clusters.find(*i) {
            Some(root) => seen_roots.insert(root),
            None => false,
        })
        .map(|(_, tx)| tx)
        .collect()
}

/// Tiered train/validation/test split. Small sets are split into thirds,
/// larger ones hold out a fixed 200+200 or 300+300. Any empty partition means
/// the model cannot be scored, which is fatal.
pub fn split(
    mut transcripts: Vec<Transcript>,
    rng: &mut Xoshiro256PlusPlus,
) -> Result<TrainingSplit> {
    let total = transcripts.len();
    transcripts.shuffle(rng);
    let (validation_size, test_size) = if total < LOW_TRAINING_GENES {
        warn!(
            "only {} training genes; accuracy estimates will be noisy",
            total
        );
        (total / 3, total / 3)
    } else if total <= 1000 {
        (200, 200)
    } else {
        (300, 300)
    };
    let train_size = total - validation_size - test_size;
    if train_size == 0 || validation_size == 0 || test_size == 0 {
        return Err(PipelineError::EmptyResult {
            stage: "training",
            detail: format!("{} genes cannot fill train/validation/test", total),
        });
    }
    let test = transcripts.split_off(total - test_size);
    let validation = transcripts.split_off(transcripts.len() - validation_size);
    Ok(TrainingSplit {
        train: transcripts,
        validation,
        test,
    })
}

/// Per-codon stop usage counts from the trainer report (`taa: 996 (0.41)`).
pub fn parse_stop_counts(report: &str) -> Result<HashMap<String, u64>> {
    let pattern = Regex::new(r"(taa|tag|tga):\s*(\d+)")
        .map_err(|e| PipelineError::parse("trainer report", e.to_string()))?;
    let mut counts = HashMap::new();
    for cap in pattern.captures_iter(report) {
        let count: u64 = cap[2]
            .parse()
            .map_err(|_| PipelineError::parse("trainer report", format!("bad count: {}", &cap[2])))?;
        counts.insert(cap[1].to_string(), count);
    }
    Ok(counts)
}

/// Stop-codon probabilities for the constant-probability table. Codons that
/// cannot terminate under the genetic code get zero mass; their observed mass
/// is redistributed to the valid codons in proportion to the valid counts.
/// When every valid codon has a zero count the mass is split evenly.
pub fn redistribute_stop_freqs(
    counts: &HashMap<String, u64>,
    code: GeneticCode,
) -> HashMap<String, f64> {
    let valid = code.stop_codons();
    let valid_sum: u64 = valid
        .iter()
        .map(|codon| counts.get(*codon).copied().unwrap_or(0))
        .sum();
    let mut freqs = HashMap::new();
    for codon in ["taa", "tag", "tga"] {
        let is_valid = valid.contains(&codon);
        let freq = if !is_valid {
            0.0
        } else if valid_sum == 0 {
            1.0 / valid.len() as f64
        } else {
            counts.get(codon).copied().unwrap_or(0) as f64 / valid_sum as f64
        };
        freqs.insert(codon.to_string(), freq);
    }
    freqs
}

/// Lines in a trainer report complaining that a gene violates the stop-codon
/// boundary convention.
pub fn count_stop_disagreements(report: &str) -> usize {
    report
        .lines()
        .filter(|line| line.contains("does not end in stop codon"))
        .count()
}

const STOP_PROB_KEYS: [(&str, &str); 3] = [
    ("tag", "/Constant/amberprob"),
    ("taa", "/Constant/ochreprob"),
    ("tga", "/Constant/opalprob"),
];

/// Second whitespace token of the matching line, if any.
pub fn get_species_parameter(cfg: &Path, key: &str) -> Result<Option<String>> {
    let text = std::fs::read_to_string(cfg)?;
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() == Some(key) {
            return Ok(fields.next().map(|v| v.to_string()));
        }
    }
    Ok(None)
}

/// Rewrite one parameter in the species config, keeping any trailing comment.
/// A missing key is appended.
pub fn set_species_parameter(cfg: &Path, key: &str, value: &str) -> Result<()> {
    let text = std::fs::read_to_string(cfg)?;
    let mut out = String::with_capacity(text.len());
    let mut found = false;
    for line in text.lines() {
        let is_match = line.split_whitespace().next() == Some(key);
        if is_match {
            found = true;
            let comment = line.find('#').map(|pos| line[pos..].to_string());
            match comment {
                Some(comment) => out.push_str(&format!("{} {} {}\n", key, value, comment)),
                None => out.push_str(&format!("{} {}\n", key, value)),
            }
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    if !found {
        out.push_str(&format!("{} {}\n", key, value));
    }
    std::fs::write(cfg, out)?;
    Ok(())
}

/// Cross-validation fold count: one fold per worker, floored.
pub fn kfold(threads: usize) -> usize {
    threads.max(KFOLD_FLOOR)
}

/// Bootstrap a fresh species parameter set from the generic template files,
/// renaming the `generic_` filename prefix to the species name.
pub fn create_species(template_dir: &Path, config: &TrainingConfig) -> Result<()> {
    info!("TRAIN\tnew species\t{}", config.species);
    std::fs::create_dir_all(&config.species_dir)?;
    for entry in std::fs::read_dir(template_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let renamed = match name.strip_prefix("generic_") {
            Some(rest) => format!("{}_{}", config.species, rest),
            None => name,
        };
        std::fs::copy(entry.path(), config.species_dir.join(renamed))?;
    }
    Ok(())
}

fn snapshot_params(dir: &Path, backup: &Path) -> Result<()> {
    std::fs::create_dir_all(backup)?;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::copy(entry.path(), backup.join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// Put the parameter directory back into its snapshotted state, including
/// removing files that appeared after the snapshot.
fn restore_params(backup: &Path, dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && !backup.join(entry.file_name()).exists() {
            std::fs::remove_file(entry.path())?;
        }
    }
    for entry in std::fs::read_dir(backup)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::copy(entry.path(), dir.join(entry.file_name()))?;
        }
    }
    Ok(())
}

fn write_gene_file(path: &Path, label: &str, transcripts: &[Transcript]) -> Result<()> {
    let set = PredictionSet::new(label, transcripts.to_vec())?;
    write_hints(path, &set.to_records())?;
    Ok(())
}

fn write_protein_fasta(
    path: &Path,
    genome: &[(String, Vec<u8>)],
    transcripts: &[Transcript],
    code: GeneticCode,
) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    for tx in transcripts {
        let cds = translate::extract_cds(genome, tx)?;
        writeln!(file, ">{}", tx.tx_id)?;
        writeln!(file, "{}", translate::translate(&cds, code))?;
    }
    Ok(())
}

fn run_trainer(tools: &Toolchain, config: &TrainingConfig, genes: &Path) -> Result<String> {
    ExternalCommand::new(&tools.trainer)
        .arg(format!("--species={}", config.species))
        .path_arg(genes)
        .run_capture()
}

fn evaluate(tools: &Toolchain, config: &TrainingConfig, test: &Path) -> Result<AccuracyMetrics> {
    let report = ExternalCommand::new(&tools.predictor)
        .arg(format!("--species={}", config.species))
        .path_arg(test)
        .run_capture()?;
    parse_accuracy_report(&report)
}

/// Run the similarity search over the translated training genes and keep one
/// representative per cluster.
fn redundancy_filter(
    tools: &Toolchain,
    config: &TrainingConfig,
    genome: &[(String, Vec<u8>)],
    transcripts: Vec<Transcript>,
) -> Result<Vec<Transcript>> {
    let proteins = config.workdir.join("training_proteins.fa");
    write_protein_fasta(&proteins, genome, &transcripts, config.code)?;
    let db = config.workdir.join("training_proteins.db");
    ExternalCommand::new(&tools.similarity)
        .arg("makedb")
        .arg("--in")
        .path_arg(&proteins)
        .arg("--db")
        .path_arg(&db)
        .run()?;
    let hits = ExternalCommand::new(&tools.similarity)
        .arg("blastp")
        .arg("--query")
        .path_arg(&proteins)
        .arg("--db")
        .path_arg(&db)
        .arg("--outfmt")
        .arg("6")
        .arg("--threads")
        .arg(config.threads.to_string())
        .run_capture()?;
    let pairs = parse_similar_pairs(&hits);
    Ok(pick_representatives(transcripts, &pairs))
}

/// After baseline training, fold the observed stop-codon usage back into the
/// model's constant-probability table, honoring the genetic code.
fn apply_stop_freqs(config: &TrainingConfig, report: &str) -> Result<()> {
    let counts = parse_stop_counts(report)?;
    if counts.is_empty() {
        warn!("trainer report carries no stop-codon counts; probabilities left as-is");
        return Ok(());
    }
    let freqs = redistribute_stop_freqs(&counts, config.code);
    let cfg = config.parameter_file();
    for (codon, key) in STOP_PROB_KEYS {
        if let Some(freq) = freqs.get(codon) {
            set_species_parameter(&cfg, key, &format!("{:.3}", freq))?;
        }
    }
    Ok(())
}

/// Drive the whole training loop. Every intermediate file lands in the
/// workdir; the species parameter directory is the only state mutated outside
/// of it.
pub fn run_training(
    config: &TrainingConfig,
    tools: &Toolchain,
    candidates: &PredictionSet,
    genome_path: &Path,
) -> Result<TrainingOutcome> {
    debug!("START\tTraining\t{} candidates", candidates.len());
    std::fs::create_dir_all(&config.workdir)?;
    if !config.parameter_file().exists() {
        match &config.template {
            Some(template) => create_species(template, config)?,
            None => {
                return Err(PipelineError::MissingArtifact {
                    stage: "training",
                    path: config.parameter_file(),
                })
            }
        }
    }
    let candidate_count = candidates.len();
    let deduped = dedup_variants(&candidates.transcripts);
    debug!("TRAIN\tDeduplicated\t{}", deduped.len());

    let raw_genes = config.workdir.join("candidates.gff");
    write_gene_file(&raw_genes, &candidates.label, &deduped)?;
    let report = run_trainer(tools, config, &raw_genes)?;
    let (valid, rejected) = filter_valid(deduped, &report)?;
    if !rejected.is_empty() {
        debug!("TRAIN\tRejected\t{}\t{}", rejected.len(), rejected.join(","));
    }
    if valid.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: "training",
            detail: "every candidate gene was rejected by the trainer".to_string(),
        });
    }

    let mut rng: Xoshiro256PlusPlus = SeedableRng::seed_from_u64(config.seed);
    let capped = size_cap(valid, &mut rng);
    debug!("TRAIN\tSizeCapped\t{}", capped.len());

    let genome = translate::read_genome(genome_path)?;
    let filtered = redundancy_filter(tools, config, &genome, capped)?;
    if filtered.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: "training",
            detail: format!(
                "no training genes survived redundancy filtering; fewer than {} is low but usable, zero is unusable",
                LOW_TRAINING_GENES
            ),
        });
    }
    if filtered.len() < LOW_TRAINING_GENES {
        warn!(
            "{} training genes after redundancy filtering (below {})",
            filtered.len(),
            LOW_TRAINING_GENES
        );
    }
    let final_count = filtered.len();

    let parts = split(filtered, &mut rng)?;
    debug!(
        "TRAIN\tSplit\t{}/{}/{}",
        parts.train.len(),
        parts.validation.len(),
        parts.test.len()
    );
    let train_file = config.workdir.join("train.gff");
    let validation_file = config.workdir.join("validation.gff");
    let test_file = config.workdir.join("test.gff");
    write_gene_file(&train_file, "train", &parts.train)?;
    write_gene_file(&validation_file, "validation", &parts.validation)?;
    write_gene_file(&test_file, "test", &parts.test)?;

    // Baseline pass, with the data-driven stop-codon boundary switch: when at
    // least half the genes violate the current convention, flip it and retrain.
    let mut report = run_trainer(tools, config, &train_file)?;
    let disagreements = count_stop_disagreements(&report);
    if 2 * disagreements >= parts.train.len() {
        let cfg = config.parameter_file();
        let current = get_species_parameter(&cfg, "stopCodonExcludedFromCDS")?;
        let flipped = match current.as_deref() {
            Some("true") => "false",
            _ => "true",
        };
        warn!(
            "{} of {} training genes disagree with the stop-codon convention; setting stopCodonExcludedFromCDS={}",
            disagreements,
            parts.train.len(),
            flipped
        );
        set_species_parameter(&cfg, "stopCodonExcludedFromCDS", flipped)?;
        report = run_trainer(tools, config, &train_file)?;
    }
    apply_stop_freqs(config, &report)?;
    let baseline = evaluate(tools, config, &test_file)?;
    debug!("TRAIN\tBaseline\t{:.4}", baseline.score());

    ExternalCommand::new(&tools.optimizer)
        .arg(format!("--species={}", config.species))
        .arg(format!("--rounds={}", config.rounds))
        .arg(format!("--kfold={}", kfold(config.threads)))
        .arg(format!("--cpus={}", config.threads))
        .arg("--onlytrain")
        .path_arg(&validation_file)
        .path_arg(&train_file)
        .run()?;
    run_trainer(tools, config, &train_file)?;
    let optimized = evaluate(tools, config, &test_file)?;
    debug!("TRAIN\tOptimized\t{:.4}", optimized.score());

    let (crf, kept_crf) = if config.crf {
        let backup = config.workdir.join("params_before_crf");
        snapshot_params(&config.species_dir, &backup)?;
        ExternalCommand::new(&tools.trainer)
            .arg(format!("--species={}", config.species))
            .arg("--CRF=1")
            .path_arg(&train_file)
            .run()?;
        let crf_metrics = evaluate(tools, config, &test_file)?;
        debug!("TRAIN\tCrf\t{:.4}", crf_metrics.score());
        let keep = config.keep_crf_always || crf_metrics.score() > optimized.score();
        if !keep {
            restore_params(&backup, &config.species_dir)?;
        }
        (Some(crf_metrics), keep)
    } else {
        (None, false)
    };

    debug!("END\tTraining");
    Ok(TrainingOutcome {
        candidate_count,
        final_count,
        baseline,
        optimized,
        crf,
        kept_crf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use definitions::Strand;

    fn tx(id: &str, gene: &str) -> Transcript {
        Transcript::new(id, gene, "chr1", Strand::Forward)
    }

    fn many(n: usize) -> Vec<Transcript> {
        (0..n)
            .map(|i| tx(&format!("t{}", i), &format!("g{}", i)))
            .collect()
    }

    fn rng(seed: u64) -> Xoshiro256PlusPlus {
        SeedableRng::seed_from_u64(seed)
    }

    #[test]
    fn variants_collapse_to_first_per_gene() {
        let input = vec![tx("t1.1", "g1"), tx("t1.2", "g1"), tx("t2.1", "g2")];
        let out = dedup_variants(&input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tx_id, "t1.1");
        assert_eq!(out[1].tx_id, "t2.1");
    }

    #[test]
    fn trainer_errors_remove_candidates() {
        let report = "\
# reading sequences
error in sequence t1: invalid reading frame
all good for t2
error in sequence t3: overlapping exons
";
        let input = vec![tx("t1", "g1"), tx("t2", "g2"), tx("t3", "g3")];
        let (kept, rejected) = filter_valid(input, report).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].tx_id, "t2");
        assert_eq!(rejected, vec!["t1".to_string(), "t3".to_string()]);
    }

    #[test]
    fn cap_preserves_order_and_is_seeded() {
        let capped = cap_to(many(100), 10, &mut rng(7));
        assert_eq!(capped.len(), 10);
        let ids: Vec<usize> = capped
            .iter()
            .map(|t| t.tx_id[1..].parse().unwrap())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        let again = cap_to(many(100), 10, &mut rng(7));
        let again_ids: Vec<String> = again.iter().map(|t| t.tx_id.clone()).collect();
        let first_ids: Vec<String> = capped.iter().map(|t| t.tx_id.clone()).collect();
        assert_eq!(first_ids, again_ids);
    }

    #[test]
    fn small_sets_are_not_capped() {
        assert_eq!(cap_to(many(5), 10, &mut rng(0)).len(), 5);
    }

    #[test]
    fn self_hits_are_ignored() {
        let text = "t1\tt1\t100.0\nt1\tt2\t98.0\nt2\tt3\t97.5\n";
        let pairs = parse_similar_pairs(text);
        assert_eq!(
            pairs,
            vec![
                ("t1".to_string(), "t2".to_string()),
                ("t2".to_string(), "t3".to_string()),
            ]
        );
    }

    #[test]
    fn one_representative_per_cluster() {
        let input = vec![tx("a", "ga"), tx("b", "gb"), tx("c", "gc"), tx("d", "gd"), tx("e", "ge")];
        let pairs = vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
            ("d".to_string(), "e".to_string()),
        ];
        let reps = pick_representatives(input, &pairs);
        let ids: Vec<&str> = reps.iter().map(|t| t.tx_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn unknown_pair_ids_are_skipped() {
        let input = vec![tx("a", "ga"), tx("b", "gb")];
        let pairs = vec![("a".to_string(), "nosuch".to_string())];
        assert_eq!(pick_representatives(input, &pairs).len(), 2);
    }

    #[test]
    fn small_sets_split_into_thirds() {
        // 599 sits just below the fixed-holdout tier.
        let parts = split(many(599), &mut rng(1)).unwrap();
        assert_eq!(parts.validation.len(), 199);
        assert_eq!(parts.test.len(), 199);
        assert_eq!(parts.train.len(), 201);
    }

    #[test]
    fn medium_sets_hold_out_200() {
        let parts = split(many(700), &mut rng(1)).unwrap();
        assert_eq!(parts.validation.len(), 200);
        assert_eq!(parts.test.len(), 200);
        assert_eq!(parts.train.len(), 300);
    }

    #[test]
    fn large_sets_hold_out_300() {
        let parts = split(many(1500), &mut rng(1)).unwrap();
        assert_eq!(parts.validation.len(), 300);
        assert_eq!(parts.test.len(), 300);
        assert_eq!(parts.train.len(), 900);
    }

    #[test]
    fn tiny_sets_cannot_be_split() {
        assert!(split(many(2), &mut rng(1)).is_err());
    }

    #[test]
    fn split_is_a_partition() {
        let parts = split(many(650), &mut rng(3)).unwrap();
        let mut ids: Vec<String> = parts
            .train
            .iter()
            .chain(parts.validation.iter())
            .chain(parts.test.iter())
            .map(|t| t.tx_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 650);
    }

    #[test]
    fn stop_counts_are_parsed() {
        let report = "\
end of training
tag: 167 (0.07)
taa: 996 (0.41)
tga: 1241 (0.52)
";
        let counts = parse_stop_counts(report).unwrap();
        assert_eq!(counts["taa"], 996);
        assert_eq!(counts["tag"], 167);
        assert_eq!(counts["tga"], 1241);
    }

    #[test]
    fn standard_code_keeps_observed_frequencies() {
        let counts: HashMap<String, u64> = [("taa", 600u64), ("tag", 200), ("tga", 200)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let freqs = redistribute_stop_freqs(&counts, GeneticCode::Standard);
        assert!((freqs["taa"] - 0.6).abs() < 1e-9);
        assert!((freqs["tag"] - 0.2).abs() < 1e-9);
        assert!((freqs["tga"] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn invalid_codon_mass_moves_proportionally() {
        let counts: HashMap<String, u64> = [("taa", 600u64), ("tag", 200), ("tga", 200)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        // Euplotid stops are taa and tag only.
        let freqs = redistribute_stop_freqs(&counts, GeneticCode::Euplotid);
        assert!((freqs["taa"] - 0.75).abs() < 1e-9);
        assert!((freqs["tag"] - 0.25).abs() < 1e-9);
        assert_eq!(freqs["tga"], 0.0);
    }

    #[test]
    fn zero_valid_counts_split_evenly() {
        let counts: HashMap<String, u64> =
            [("tga".to_string(), 1000u64)].iter().cloned().collect();
        let freqs = redistribute_stop_freqs(&counts, GeneticCode::Euplotid);
        assert!((freqs["taa"] - 0.5).abs() < 1e-9);
        assert!((freqs["tag"] - 0.5).abs() < 1e-9);
        assert_eq!(freqs["tga"], 0.0);
    }

    #[test]
    fn disagreement_lines_are_counted() {
        let report = "\
gene t1 ok
gene t2 does not end in stop codon
gene t3 does not end in stop codon
";
        assert_eq!(count_stop_disagreements(report), 2);
    }

    #[test]
    fn kfold_floors_at_eight() {
        assert_eq!(kfold(2), 8);
        assert_eq!(kfold(8), 8);
        assert_eq!(kfold(24), 24);
    }

    #[test]
    fn template_files_are_renamed_for_the_species() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("generic");
        std::fs::create_dir_all(&template).unwrap();
        std::fs::write(template.join("generic_parameters.cfg"), "a 1\n").unwrap();
        std::fs::write(template.join("generic_weights.pbl"), "w\n").unwrap();
        std::fs::write(template.join("README"), "notes\n").unwrap();
        let config = TrainingConfig {
            species: "myfish".to_string(),
            species_dir: dir.path().join("species/myfish"),
            workdir: dir.path().join("work"),
            rounds: 1,
            crf: false,
            keep_crf_always: false,
            code: GeneticCode::Standard,
            seed: 42,
            threads: 1,
            template: None,
        };
        create_species(&template, &config).unwrap();
        assert!(config.species_dir.join("myfish_parameters.cfg").exists());
        assert!(config.species_dir.join("myfish_weights.pbl").exists());
        assert!(config.species_dir.join("README").exists());
    }

    #[test]
    fn restore_removes_files_created_after_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("species");
        let backup = dir.path().join("backup");
        std::fs::create_dir_all(&params).unwrap();
        std::fs::write(params.join("sp_parameters.cfg"), "before\n").unwrap();
        snapshot_params(&params, &backup).unwrap();
        // a retraining pass rewrites one file and adds another.
        std::fs::write(params.join("sp_parameters.cfg"), "after\n").unwrap();
        std::fs::write(params.join("sp_weights.pbl"), "new\n").unwrap();
        restore_params(&backup, &params).unwrap();
        let text = std::fs::read_to_string(params.join("sp_parameters.cfg")).unwrap();
        assert_eq!(text, "before\n");
        assert!(!params.join("sp_weights.pbl").exists());
    }

    #[test]
    fn species_parameters_can_be_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("sp_parameters.cfg");
        std::fs::write(
            &cfg,
            "# species parameters\n/Constant/amberprob 0.33 # tag\nstopCodonExcludedFromCDS false\n",
        )
        .unwrap();
        set_species_parameter(&cfg, "/Constant/amberprob", "0.100").unwrap();
        set_species_parameter(&cfg, "stopCodonExcludedFromCDS", "true").unwrap();
        set_species_parameter(&cfg, "/Constant/opalprob", "0.500").unwrap();
        assert_eq!(
            get_species_parameter(&cfg, "/Constant/amberprob").unwrap(),
            Some("0.100".to_string())
        );
        assert_eq!(
            get_species_parameter(&cfg, "stopCodonExcludedFromCDS").unwrap(),
            Some("true".to_string())
        );
        assert_eq!(
            get_species_parameter(&cfg, "/Constant/opalprob").unwrap(),
            Some("0.500".to_string())
        );
        let text = std::fs::read_to_string(&cfg).unwrap();
        assert!(text.contains("# tag"));
        assert!(text.starts_with("# species parameters"));
    }
}
