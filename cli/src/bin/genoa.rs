use annotator::accuracy::summary_table;
use annotator::external::{locate, ExternalCommand, ToolOverrides, Toolchain};
use annotator::training::{run_training, TrainingConfig};
use definitions::{GeneticCode, PredictionSet};
use std::path::{Path, PathBuf};
#[macro_use]
extern crate log;

fn main() -> anyhow::Result<()> {
    let matches = genoa_cli::commands::genoa_parser().get_matches();
    if let Some(("pipeline", sub_m)) = matches.subcommand() {
        let path: &String = sub_m.get_one("profile").unwrap();
        let file = std::fs::read_to_string(path)?;
        let config: genoa_cli::pipeline::PipelineConfig = toml::from_str(&file)?;
        if let Err(why) = genoa_cli::pipeline::run_pipeline(&config) {
            // fatal errors land in the run log as well as on stderr.
            let log_path = genoa_cli::pipeline::workdir_of(&config).join("genoa.log");
            let _ = append_run_log(&log_path, &why);
            return Err(why.into());
        }
        return Ok(());
    }
    if let Some((_, sub_m)) = matches.subcommand() {
        let level = match sub_m.get_count("verbose") {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    }
    match matches.subcommand() {
        Some(("hints", sub_m)) => aggregate_hints(sub_m)?,
        Some(("partition", sub_m)) => partition_genome(sub_m)?,
        Some(("predict", sub_m)) => predict(sub_m)?,
        Some(("join", sub_m)) => join(sub_m)?,
        Some(("train", sub_m)) => train(sub_m)?,
        Some(("evaluate", sub_m)) => evaluate(sub_m)?,
        _ => unreachable!(),
    }
    Ok(())
}

fn append_run_log(path: &Path, why: &annotator::PipelineError) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "FATAL\t{}", why)
}

fn aggregate_hints(matches: &clap::ArgMatches) -> annotator::Result<()> {
    debug!("START\tHints");
    let sources: Vec<PathBuf> = matches
        .get_many::<String>("evidence")
        .unwrap()
        .map(PathBuf::from)
        .collect();
    let output = PathBuf::from(matches.get_one::<String>("output").unwrap());
    let force = matches.get_flag("force");
    let count = annotator::hints::aggregate(&sources, &output, force)?;
    info!("HINTS\t{}\t{}", count, output.display());
    Ok(())
}

fn partition_genome(matches: &clap::ArgMatches) -> annotator::Result<()> {
    debug!("START\tPartition");
    let genome = PathBuf::from(matches.get_one::<String>("genome").unwrap());
    let hints = PathBuf::from(matches.get_one::<String>("hints").unwrap());
    let outdir = PathBuf::from(matches.get_one::<String>("outdir").unwrap());
    let chunk_len: usize = matches
        .get_one("chunk_len")
        .and_then(|e: &String| e.parse().ok())
        .expect("chunk_len");
    let overlap: usize = matches
        .get_one("overlap")
        .and_then(|e: &String| e.parse().ok())
        .expect("overlap");
    let records = annotator::hints::read_hints(&hints)?;
    let config = annotator::partition::PartitionConfig::new(chunk_len, overlap, &outdir);
    let jobs = annotator::partition::partition(&genome, &records, &config)?;
    annotator::partition::save_jobs(&jobs, &outdir.join("jobs.json"))?;
    info!("PARTITION\t{} jobs\t{}", jobs.len(), outdir.display());
    Ok(())
}

fn predict(matches: &clap::ArgMatches) -> annotator::Result<()> {
    debug!("START\tPredict");
    let jobs_path = PathBuf::from(matches.get_one::<String>("jobs").unwrap());
    let jobs = annotator::partition::load_jobs(&jobs_path)?;
    let explicit: Option<&String> = matches.get_one("predictor");
    let predictor = locate("augustus", explicit.map(Path::new))?;
    let species: &String = matches.get_one("species").unwrap();
    let utr = matches.get_flag("utr");
    let threads: usize = matches
        .get_one("threads")
        .and_then(|e: &String| e.parse().ok())
        .expect("threads");
    let commands = genoa_cli::pipeline::predict_commands(&predictor, species, utr, &jobs);
    annotator::runner::run_all(&commands, threads)
}

fn join(matches: &clap::ArgMatches) -> annotator::Result<()> {
    debug!("START\tJoin");
    let jobs_path = PathBuf::from(matches.get_one::<String>("jobs").unwrap());
    let jobs = annotator::partition::load_jobs(&jobs_path)?;
    let output = PathBuf::from(matches.get_one::<String>("output").unwrap());
    let explicit: Option<&String> = matches.get_one("resolver");
    let resolver = locate("join_aug_pred.pl", explicit.map(Path::new))?;
    annotator::joiner::join_partitions(&jobs, &output, &resolver)
}

fn train(matches: &clap::ArgMatches) -> annotator::Result<()> {
    debug!("START\tTrain");
    let genes = PathBuf::from(matches.get_one::<String>("genes").unwrap());
    let genome = PathBuf::from(matches.get_one::<String>("genome").unwrap());
    let table: u8 = matches
        .get_one("table")
        .and_then(|e: &String| e.parse().ok())
        .expect("table");
    let code = GeneticCode::from_table(table).ok_or_else(|| {
        annotator::PipelineError::Config(format!("unsupported translation table {}", table))
    })?;
    let config = TrainingConfig {
        species: matches.get_one::<String>("species").unwrap().clone(),
        species_dir: PathBuf::from(matches.get_one::<String>("species_dir").unwrap()),
        workdir: PathBuf::from(matches.get_one::<String>("workdir").unwrap()),
        rounds: matches
            .get_one("rounds")
            .and_then(|e: &String| e.parse().ok())
            .expect("rounds"),
        crf: matches.get_flag("crf"),
        keep_crf_always: matches.get_flag("keep_crf"),
        code,
        seed: matches
            .get_one("seed")
            .and_then(|e: &String| e.parse().ok())
            .expect("seed"),
        threads: matches
            .get_one("threads")
            .and_then(|e: &String| e.parse().ok())
            .expect("threads"),
        template: matches.get_one::<String>("template").map(PathBuf::from),
    };
    let tools = Toolchain::discover(&ToolOverrides::default())?;
    let records = annotator::hints::read_hints(&genes)?;
    let candidates = PredictionSet::from_records("training", &records)?;
    let outcome = run_training(&config, &tools, &candidates, &genome)?;
    info!(
        "TRAIN\t{} candidates\t{} kept",
        outcome.candidate_count, outcome.final_count
    );
    let mut results = vec![
        ("baseline".to_string(), outcome.baseline),
        ("optimized".to_string(), outcome.optimized),
    ];
    if let Some(crf_metrics) = outcome.crf {
        results.push(("crf".to_string(), crf_metrics));
    }
    print!("{}", summary_table(&results));
    Ok(())
}

fn evaluate(matches: &clap::ArgMatches) -> annotator::Result<()> {
    debug!("START\tEvaluate");
    let species: &String = matches.get_one("species").unwrap();
    let test = PathBuf::from(matches.get_one::<String>("test").unwrap());
    let name: &String = matches.get_one("name").unwrap();
    let predictor = locate("augustus", None)?;
    let report = ExternalCommand::new(&predictor)
        .arg(format!("--species={}", species))
        .path_arg(&test)
        .run_capture()?;
    let metrics = annotator::accuracy::parse_accuracy_report(&report)?;
    print!("{}", summary_table(&[(name.clone(), metrics)]));
    Ok(())
}
