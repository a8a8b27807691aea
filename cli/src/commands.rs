use clap::{Arg, ArgAction, Command};

fn verbose_arg() -> Arg {
    Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .help("Debug mode")
}

fn threads_arg() -> Arg {
    Arg::new("threads")
        .short('t')
        .long("threads")
        .default_value("1")
        .help("number of threads")
}

fn subcommand_hints() -> Command {
    Command::new("hints")
        .version("0.1")
        .about("Aggregate evidence files into one sorted, duplicate-merged hint set.")
        .arg(verbose_arg())
        .arg(
            Arg::new("evidence")
                .long("evidence")
                .short('e')
                .value_name("GFF")
                .action(ArgAction::Append)
                .required(true)
                .help("Evidence hint file. Repeat for multiple sources."),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("PATH")
                .required(true)
                .help("Aggregated hint file."),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Rebuild even if the output is newer than every input."),
        )
}

fn subcommand_partition() -> Command {
    Command::new("partition")
        .version("0.1")
        .about("Split the genome into size-bounded prediction chunks.")
        .arg(verbose_arg())
        .arg(
            Arg::new("genome")
                .long("genome")
                .short('g')
                .value_name("FASTA")
                .required(true)
                .help("Genome assembly."),
        )
        .arg(
            Arg::new("hints")
                .long("hints")
                .value_name("GFF")
                .required(true)
                .help("Aggregated hint file."),
        )
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .value_name("DIR")
                .required(true)
                .help("Directory for per-chunk FASTA/hint files and the job list."),
        )
        .arg(
            Arg::new("chunk_len")
                .long("chunk_len")
                .default_value("2500000")
                .help("Maximum combined bases per chunk."),
        )
        .arg(
            Arg::new("overlap")
                .long("overlap")
                .default_value("50000")
                .help("Overlap between adjacent slices of an oversize sequence."),
        )
}

fn subcommand_predict() -> Command {
    Command::new("predict")
        .version("0.1")
        .about("Run the gene predictor over a partitioned job list in parallel.")
        .arg(verbose_arg())
        .arg(threads_arg())
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .value_name("JSON")
                .required(true)
                .help("Job list written by the partition step."),
        )
        .arg(
            Arg::new("species")
                .long("species")
                .short('s')
                .value_name("NAME")
                .required(true)
                .help("Species parameter set name."),
        )
        .arg(
            Arg::new("utr")
                .long("utr")
                .action(ArgAction::SetTrue)
                .help("Predict untranslated regions too."),
        )
        .arg(
            Arg::new("predictor")
                .long("predictor")
                .value_name("PATH")
                .help("Explicit path to the prediction binary."),
        )
}

fn subcommand_join() -> Command {
    Command::new("join")
        .version("0.1")
        .about("Join per-chunk predictions into one genome-wide gene set.")
        .arg(verbose_arg())
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .value_name("JSON")
                .required(true)
                .help("Job list written by the partition step."),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("PATH")
                .required(true)
                .help("Joined gene set."),
        )
        .arg(
            Arg::new("resolver")
                .long("resolver")
                .value_name("PATH")
                .help("Explicit path to the boundary-resolution script."),
        )
}

fn subcommand_train() -> Command {
    Command::new("train")
        .version("0.1")
        .about("Train and optimize a species parameter set from candidate genes.")
        .arg(verbose_arg())
        .arg(threads_arg())
        .arg(
            Arg::new("genes")
                .long("genes")
                .value_name("GFF")
                .required(true)
                .help("Candidate training genes (gene/transcript/exon/CDS rows)."),
        )
        .arg(
            Arg::new("genome")
                .long("genome")
                .short('g')
                .value_name("FASTA")
                .required(true)
                .help("Genome assembly."),
        )
        .arg(
            Arg::new("species")
                .long("species")
                .short('s')
                .value_name("NAME")
                .required(true)
                .help("Species parameter set name."),
        )
        .arg(
            Arg::new("species_dir")
                .long("species_dir")
                .value_name("DIR")
                .required(true)
                .help("Directory holding the species parameter files."),
        )
        .arg(
            Arg::new("workdir")
                .long("workdir")
                .value_name("DIR")
                .default_value("genoa_training")
                .help("Directory for intermediate training files."),
        )
        .arg(
            Arg::new("rounds")
                .long("rounds")
                .default_value("1")
                .help("Optimization rounds."),
        )
        .arg(
            Arg::new("crf")
                .long("crf")
                .action(ArgAction::SetTrue)
                .help("Also run a CRF training pass and keep it if it scores higher."),
        )
        .arg(
            Arg::new("keep_crf")
                .long("keep_crf")
                .action(ArgAction::SetTrue)
                .help("Keep the CRF parameter set regardless of its score."),
        )
        .arg(
            Arg::new("table")
                .long("table")
                .default_value("1")
                .help("Translation table number."),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .default_value("42")
                .help("Seed value for random number generators"),
        )
        .arg(
            Arg::new("template")
                .long("template")
                .value_name("DIR")
                .help("Generic parameter templates for bootstrapping a new species."),
        )
}

fn subcommand_evaluate() -> Command {
    Command::new("evaluate")
        .version("0.1")
        .about("Score a trained parameter set against an annotated test set.")
        .arg(verbose_arg())
        .arg(
            Arg::new("species")
                .long("species")
                .short('s')
                .value_name("NAME")
                .required(true)
                .help("Species parameter set name."),
        )
        .arg(
            Arg::new("test")
                .long("test")
                .value_name("GFF")
                .required(true)
                .help("Annotated test genes."),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .default_value("genes")
                .help("Column label in the summary table."),
        )
}

fn subcommand_pipeline() -> Command {
    Command::new("pipeline")
        .version("0.1")
        .about("Run the whole annotation pipeline from a TOML profile.")
        .arg(
            Arg::new("profile")
                .long("profile")
                .short('p')
                .value_name("TOML")
                .required(true)
                .help("Pipeline profile."),
        )
}

pub fn genoa_parser() -> Command {
    Command::new("genoa")
        .version("0.1.0")
        .about("Evidence-driven gene annotation pipeline.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(subcommand_hints())
        .subcommand(subcommand_partition())
        .subcommand(subcommand_predict())
        .subcommand(subcommand_join())
        .subcommand(subcommand_train())
        .subcommand(subcommand_evaluate())
        .subcommand(subcommand_pipeline())
}
