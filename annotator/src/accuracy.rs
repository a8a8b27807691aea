//! The one place that touches the evaluator's free-text output. The grammar
//! is narrow: per level (`nucleotide`, `exon`, `gene`) one row whose last two
//! `|`-separated numeric fields are sensitivity and specificity. Everything
//! downstream works on `AccuracyMetrics`.

use crate::error::{PipelineError, Result};
use definitions::AccuracyMetrics;

fn level_row(text: &str, level: &str) -> Result<(f64, f64)> {
    let needle = format!("{} level", level);
    let line = text
        .lines()
        .find(|line| line.contains(&needle))
        .ok_or_else(|| {
            PipelineError::parse("accuracy report", format!("no `{}` row", needle))
        })?;
    let numbers: Vec<f64> = line
        .split('|')
        .filter_map(|field| field.trim().parse().ok())
        .collect();
    if numbers.len() < 2 {
        return Err(PipelineError::parse(
            "accuracy report",
            format!("`{}` row carries fewer than two numeric fields", needle),
        ));
    }
    Ok((numbers[numbers.len() - 2], numbers[numbers.len() - 1]))
}

/// Parse the evaluator's report into the six sub-metrics.
pub fn parse_accuracy_report(text: &str) -> Result<AccuracyMetrics> {
    let (nuc_sens, nuc_spec) = level_row(text, "nucleotide")?;
    let (exon_sens, exon_spec) = level_row(text, "exon")?;
    let (gene_sens, gene_spec) = level_row(text, "gene")?;
    Ok(AccuracyMetrics {
        nuc_sens,
        nuc_spec,
        exon_sens,
        exon_spec,
        gene_sens,
        gene_spec,
    })
}

/// Plain-text summary: one row per metric, one column per evaluated gene set,
/// plus the derived F1 rows. This is the return-valued accumulator of
/// evaluation results; nothing global holds them.
pub fn summary_table(results: &[(String, AccuracyMetrics)]) -> String {
    let mut out = String::new();
    out.push_str("metric");
    for (name, _) in results {
        out.push('\t');
        out.push_str(name);
    }
    out.push('\n');
    let rows: [(&str, fn(&AccuracyMetrics) -> f64); 10] = [
        ("nucleotide_sensitivity", |m| m.nuc_sens),
        ("nucleotide_specificity", |m| m.nuc_spec),
        ("exon_sensitivity", |m| m.exon_sens),
        ("exon_specificity", |m| m.exon_spec),
        ("gene_sensitivity", |m| m.gene_sens),
        ("gene_specificity", |m| m.gene_spec),
        ("nucleotide_f1", |m| m.nuc_f1()),
        ("exon_f1", |m| m.exon_f1()),
        ("gene_f1", |m| m.gene_f1()),
        ("weighted_score", |m| m.score()),
    ];
    for (name, value) in rows.iter() {
        out.push_str(name);
        for (_, metrics) in results {
            out.push_str(&format!("\t{:.2}", value(metrics)));
        }
        out.push('\n');
    }
    out
}
