//! The whole annotation pipeline, driven by a TOML profile. Every stage writes
//! its result to a file in the working directory and is skipped on a re-run
//! when that file is newer than the stage inputs, so an interrupted run resumes
//! at the first stale stage.

use annotator::accuracy::{parse_accuracy_report, summary_table};
use annotator::external::{ExternalCommand, ToolOverrides, Toolchain};
use annotator::freshness::{is_stale, require_inputs};
use annotator::hints::{aggregate, read_hints, write_hints};
use annotator::joiner;
use annotator::partition::{partition, save_jobs, PartitionConfig};
use annotator::runner::run_all;
use annotator::training::{run_training, TrainingConfig};
use annotator::{PipelineError, Result};
use definitions::{GeneticCode, JobDescriptor, PredictionSet};
use serde::{Deserialize, Serialize};
use log::*;
use std::path::Path;
use std::path::PathBuf;

/// The configuration of the pipeline.
/// This struct is a comprehensive list of the parameters that can be set by a
/// user. All other parameters are determined automatically or hard-coded to
/// values that work well for most of the cases.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PipelineConfig {
    /// The path to the genome assembly.
    genome: PathBuf,
    /// Species parameter set name.
    species: String,
    /// Directory holding the species parameter files.
    species_dir: PathBuf,
    /// The path to the working directory.
    workdir: PathBuf,
    #[serde(default)]
    protein_evidence: Vec<PathBuf>,
    #[serde(default)]
    rna_evidence: Vec<PathBuf>,
    #[serde(default)]
    manual_hints: Vec<PathBuf>,
    /// Candidate training genes from an external aligner. Required unless
    /// training is skipped.
    #[serde(default)]
    training_genes: Option<PathBuf>,
    /// Annotated test genes; when present, the final set is scored against it.
    #[serde(default)]
    reference: Option<PathBuf>,
    /// Template parameter files for bootstrapping a new species.
    #[serde(default)]
    species_template: Option<PathBuf>,
    #[serde(default)]
    verbose: usize,
    #[serde(default = "default_threads")]
    threads: usize,
    #[serde(default = "default_seed")]
    seed: u64,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    utr: bool,
    #[serde(default)]
    skip_training: bool,
    #[serde(default = "default_rounds")]
    rounds: usize,
    #[serde(default)]
    crf: bool,
    #[serde(default)]
    keep_crf_always: bool,
    #[serde(default = "default_table")]
    genetic_code: u8,
    #[serde(default = "default_chunk_len")]
    chunk_len: usize,
    #[serde(default = "default_overlap")]
    overlap: usize,
    /// Delete the per-partition job artifacts after a successful run.
    #[serde(default)]
    cleanup: bool,
    #[serde(default)]
    tools: ToolSection,
}

fn default_threads() -> usize {
    1
}
fn default_seed() -> u64 {
    42
}
fn default_rounds() -> usize {
    1
}
fn default_table() -> u8 {
    1
}
fn default_chunk_len() -> usize {
    2_500_000
}
fn default_overlap() -> usize {
    50_000
}

/// Explicit tool paths in the profile; anything unset is looked up on PATH.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ToolSection {
    #[serde(default)]
    predictor: Option<PathBuf>,
    #[serde(default)]
    trainer: Option<PathBuf>,
    #[serde(default)]
    optimizer: Option<PathBuf>,
    #[serde(default)]
    merger: Option<PathBuf>,
    #[serde(default)]
    resolver: Option<PathBuf>,
    #[serde(default)]
    similarity: Option<PathBuf>,
    #[serde(default)]
    converter: Option<PathBuf>,
}

impl ToolSection {
    fn overrides(&self) -> ToolOverrides {
        ToolOverrides {
            predictor: self.predictor.clone(),
            trainer: self.trainer.clone(),
            optimizer: self.optimizer.clone(),
            merger: self.merger.clone(),
            resolver: self.resolver.clone(),
            similarity: self.similarity.clone(),
            converter: self.converter.clone(),
        }
    }
}

/// One predictor invocation per job, writing to the job's own output file.
pub fn predict_commands(
    predictor: &Path,
    species: &str,
    utr: bool,
    jobs: &[JobDescriptor],
) -> Vec<ExternalCommand> {
    jobs.iter()
        .map(|job| {
            ExternalCommand::new(predictor)
                .arg(format!("--species={}", species))
                .arg(format!("--hintsfile={}", job.hints.display()))
                .arg(format!("--UTR={}", if utr { "on" } else { "off" }))
                .path_arg(&job.fasta)
                .stdout_to(&job.output)
        })
        .collect()
}

pub fn run_pipeline(config: &PipelineConfig) -> Result<()> {
    let PipelineConfig {
        genome,
        species,
        species_dir,
        workdir,
        protein_evidence,
        rna_evidence,
        manual_hints,
        training_genes,
        reference,
        species_template,
        verbose,
        threads,
        seed,
        force,
        utr,
        skip_training,
        rounds,
        crf,
        keep_crf_always,
        genetic_code,
        chunk_len,
        overlap,
        cleanup,
        tools,
    } = config.clone();
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    debug!("START\tPipeline\t{}", species);
    let code = GeneticCode::from_table(genetic_code).ok_or_else(|| {
        PipelineError::Config(format!("unsupported translation table {}", genetic_code))
    })?;
    let tools = Toolchain::discover(&tools.overrides())?;
    let mut inputs = vec![genome.clone()];
    inputs.extend(protein_evidence.iter().cloned());
    inputs.extend(rna_evidence.iter().cloned());
    inputs.extend(manual_hints.iter().cloned());
    require_inputs("setup", &inputs)?;
    std::fs::create_dir_all(&workdir)?;

    // Hint aggregation, one file per evidence class. Manual hints ride along
    // with each class; their protected records survive merging untouched.
    let mut class_hints: Vec<(&str, PathBuf)> = vec![];
    if !protein_evidence.is_empty() {
        let out = workdir.join("hints_protein.gff");
        let mut sources = protein_evidence.clone();
        sources.extend(manual_hints.iter().cloned());
        let count = aggregate(&sources, &out, force)?;
        info!("HINTS\tprotein\t{}", count);
        class_hints.push(("protein_run", out));
    }
    if !rna_evidence.is_empty() {
        let out = workdir.join("hints_rna.gff");
        let mut sources = rna_evidence.clone();
        sources.extend(manual_hints.iter().cloned());
        let count = aggregate(&sources, &out, force)?;
        info!("HINTS\trna\t{}", count);
        class_hints.push(("rna_run", out));
    }
    if class_hints.is_empty() && !manual_hints.is_empty() {
        let out = workdir.join("hints_manual.gff");
        let count = aggregate(&manual_hints, &out, force)?;
        info!("HINTS\tmanual\t{}", count);
        class_hints.push(("manual_run", out));
    }
    if class_hints.is_empty() {
        return Err(PipelineError::Config(
            "no evidence files given; at least one evidence class is required".to_string(),
        ));
    }

    // Training.
    if !skip_training {
        let genes_path = training_genes.ok_or_else(|| {
            PipelineError::Config(
                "training requested but no training_genes file in the profile".to_string(),
            )
        })?;
        let parameter_file = species_dir.join(format!("{}_parameters.cfg", species));
        if is_stale(&[&genes_path], &[&parameter_file], force) {
            let records = read_hints(&genes_path)?;
            let candidates = PredictionSet::from_records("training", &records)?;
            let training_config = TrainingConfig {
                species: species.clone(),
                species_dir: species_dir.clone(),
                workdir: workdir.join("training"),
                rounds,
                crf,
                keep_crf_always,
                code,
                seed,
                threads,
                template: species_template.clone(),
            };
            let outcome = run_training(&training_config, &tools, &candidates, &genome)?;
            info!(
                "TRAIN\t{} candidates\t{} kept\tbaseline={:.4}\toptimized={:.4}",
                outcome.candidate_count,
                outcome.final_count,
                outcome.baseline.score(),
                outcome.optimized.score(),
            );
            if let Some(crf_metrics) = outcome.crf {
                info!(
                    "TRAIN\tcrf={:.4}\tkept={}",
                    crf_metrics.score(),
                    outcome.kept_crf
                );
            }
        } else {
            info!("TRAIN\tfresh\t{}", parameter_file.display());
        }
    }

    // Partition, predict, and join, once per evidence class. UTR mode adds a
    // second prediction pass; the UTR-aware set becomes the class result.
    let passes: &[bool] = if utr { &[false, true] } else { &[false] };
    let mut class_results: Vec<(String, PathBuf, PathBuf)> = vec![];
    let mut partition_dirs: Vec<PathBuf> = vec![];
    for (label, hints_path) in class_hints.iter() {
        let mut joined = PathBuf::new();
        for &with_utr in passes {
            let pass = match with_utr {
                true => format!("{}_utr", label),
                false => label.to_string(),
            };
            let outdir = workdir.join(format!("partitions_{}", pass));
            let out = workdir.join(format!("{}.gff", pass));
            if is_stale(&[&genome, hints_path], &[&out], force) {
                let records = read_hints(hints_path)?;
                let partition_config = PartitionConfig::new(chunk_len, overlap, &outdir);
                let jobs = partition(&genome, &records, &partition_config)?;
                save_jobs(&jobs, &outdir.join("jobs.json"))?;
                let commands = predict_commands(&tools.predictor, &species, with_utr, &jobs);
                run_all(&commands, threads)?;
                joiner::join_partitions(&jobs, &out, &tools.resolver)?;
            } else {
                info!("PREDICT\tfresh\t{}", out.display());
            }
            partition_dirs.push(outdir);
            joined = out;
        }
        class_results.push((label.to_string(), hints_path.clone(), joined));
    }

    // Reconcile the runs into the final gene set, only when a class result is
    // newer than the final outputs.
    let gtf = workdir.join("predictions.gtf");
    let gff3 = workdir.join("predictions.gff3");
    let joined_paths: Vec<PathBuf> = class_results.iter().map(|(_, _, j)| j.clone()).collect();
    if is_stale(&joined_paths, &[&gtf, &gff3], force) {
        let mut runs: Vec<PredictionSet> = vec![];
        for (label, hints_path, joined) in class_results.iter() {
            let records = read_hints(joined)?;
            let mut set = PredictionSet::from_records(label, &records)?;
            joiner::annotate_support(&mut set, &read_hints(hints_path)?);
            runs.push(set);
        }
        let final_set = match runs.len() {
            2 => {
                let rna_run = runs.pop().ok_or_else(|| PipelineError::EmptyResult {
                    stage: "dual join",
                    detail: "missing rna run".to_string(),
                })?;
                let protein_run = runs.pop().ok_or_else(|| PipelineError::EmptyResult {
                    stage: "dual join",
                    detail: "missing protein run".to_string(),
                })?;
                joiner::join_dual(&tools.merger, &protein_run, &rna_run, &workdir.join("join"))?
            }
            _ => runs.pop().ok_or_else(|| PipelineError::EmptyResult {
                stage: "prediction",
                detail: "no prediction run produced".to_string(),
            })?,
        };
        info!("JOIN\tfinal\t{} transcripts", final_set.len());
        write_hints(&gtf, &final_set.to_records())?;

        // Format conversion for downstream consumers.
        ExternalCommand::new(&tools.converter)
            .arg("--gff3")
            .stdin_from(&gtf)
            .stdout_to(&gff3)
            .run()?;
    } else {
        info!("JOIN\tfresh\t{}", gtf.display());
    }

    // Accuracy evaluation against the reference, when one is given.
    if let Some(reference) = reference {
        let table_path = workdir.join("accuracy.tsv");
        if is_stale(&[&gtf, &reference], &[&table_path], force) {
            let report = ExternalCommand::new(&tools.predictor)
                .arg(format!("--species={}", species))
                .path_arg(&reference)
                .run_capture()?;
            let metrics = parse_accuracy_report(&report)?;
            let table = summary_table(&[("final".to_string(), metrics)]);
            std::fs::write(&table_path, &table)?;
            info!("EVAL\tscore\t{:.4}", metrics.score());
        } else {
            info!("EVAL\tfresh\t{}", table_path.display());
        }
    }

    if cleanup {
        for dir in partition_dirs {
            debug!("CLEANUP\t{}", dir.display());
            std::fs::remove_dir_all(&dir)?;
        }
    }
    debug!("END\tPipeline");
    Ok(())
}

/// Directory the profile routes run artifacts (and the run log) into.
pub fn workdir_of(config: &PipelineConfig) -> &Path {
    &config.workdir
}
