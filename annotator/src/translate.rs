//! CDS-to-protein translation for the redundancy filter. Only the tables the
//! pipeline supports are implemented; everything else is rejected upstream.

use crate::error::{PipelineError, Result};
use definitions::{GeneticCode, Strand, Transcript};
use std::path::Path;

pub fn read_genome(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let reader = bio::io::fasta::Reader::from_file(path)
        .map_err(|e| PipelineError::parse("fasta", format!("{}: {}", path.display(), e)))?;
    let mut sequences = vec![];
    for record in reader.records() {
        let record = record?;
        sequences.push((record.id().to_string(), record.seq().to_vec()));
    }
    Ok(sequences)
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|base| match base.to_ascii_uppercase() {
            b'A' => b'T',
            b'T' => b'A',
            b'G' => b'C',
            b'C' => b'G',
            other => other,
        })
        .collect()
}

/// Concatenated coding sequence of a transcript, reverse-complemented for the
/// minus strand.
pub fn extract_cds(genome: &[(String, Vec<u8>)], tx: &Transcript) -> Result<Vec<u8>> {
    let seq = genome
        .iter()
        .find(|(name, _)| name == &tx.seqname)
        .map(|(_, seq)| seq)
        .ok_or_else(|| {
            PipelineError::parse("training gene", format!("unknown sequence {}", tx.seqname))
        })?;
    let mut cds = vec![];
    for (start, end) in tx.cds() {
        if end as usize > seq.len() {
            return Err(PipelineError::parse(
                "training gene",
                format!("{}: CDS {}-{} beyond sequence end", tx.tx_id, start, end),
            ));
        }
        cds.extend_from_slice(&seq[(start - 1) as usize..end as usize]);
    }
    if tx.strand == Strand::Reverse {
        cds = revcomp(&cds);
    }
    Ok(cds)
}

fn standard_codon(codon: &[u8; 3]) -> u8 {
    // Indexed T, C, A, G per position; the canonical table layout.
    const BASES: [u8; 4] = [b'T', b'C', b'A', b'G'];
    const TABLE: &[u8; 64] =
        b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";
    let index_of = |base: u8| BASES.iter().position(|&b| b == base.to_ascii_uppercase());
    match (index_of(codon[0]), index_of(codon[1]), index_of(codon[2])) {
        (Some(a), Some(b), Some(c)) => TABLE[a * 16 + b * 4 + c],
        // ambiguous base anywhere in the codon.
        _ => b'X',
    }
}

fn translate_codon(codon: &[u8; 3], code: GeneticCode) -> u8 {
    let upper = [
        codon[0].to_ascii_uppercase(),
        codon[1].to_ascii_uppercase(),
        codon[2].to_ascii_uppercase(),
    ];
    match (&upper, code) {
        (b"TAA", GeneticCode::Ciliate) | (b"TAG", GeneticCode::Ciliate) => b'Q',
        (b"TGA", GeneticCode::Euplotid) => b'C',
        (b"TGA", GeneticCode::Gracilibacteria) => b'G',
        (b"CTG", GeneticCode::AlternativeYeast) => b'S',
        (b"CTG", GeneticCode::PachysolenTannophilus) => b'A',
        _ => standard_codon(&upper),
    }
}

/// Translate a coding sequence. A trailing stop is dropped; an internal stop
/// is kept as `*` so the caller can spot broken structures.
pub fn translate(cds: &[u8], code: GeneticCode) -> String {
    let mut protein = String::with_capacity(cds.len() / 3);
    for chunk in cds.chunks_exact(3) {
        let codon = [chunk[0], chunk[1], chunk[2]];
        protein.push(translate_codon(&codon, code) as char);
    }
    if protein.ends_with('*') {
        protein.pop();
    }
    protein
}
