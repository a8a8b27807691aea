//! Definitions -- the shared data model of the genoa annotation pipeline.
//! Stages of the pipeline communicate through the filesystem; the structures here
//! are the typed view of those files (9-column hint/gene rows, prediction sets,
//! job descriptors) plus the run context threaded through every stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Evidence source tag of manually curated hints. Records from this source that
/// carry a group id must never be merged with anything else.
pub const MANUAL_SOURCE: &str = "M";
/// Evidence source tag of protein-derived hints.
pub const PROTEIN_SOURCE: &str = "P";
/// Evidence source tag of RNA-derived hints.
pub const RNA_SOURCE: &str = "E";

/// Error raised when a wire-format line cannot be turned into a typed record.
#[derive(Debug, Clone)]
pub struct ParseError {
    msg: String,
}

impl ParseError {
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
    Unknown,
}

impl FromStr for Strand {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." => Ok(Strand::Unknown),
            _ => Err(ParseError::new(format!("invalid strand: {}", s))),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let c = match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Unknown => '.',
        };
        write!(f, "{}", c)
    }
}

/// The fixed feature vocabulary. Which downstream stage accepts a record is
/// governed by its kind, so unknown kinds are a parse error, not a catch-all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    Intron,
    Start,
    Stop,
    Ass,
    Dss,
    ExonPart,
    Exon,
    CdsPart,
    UtrPart,
    NonExonPart,
    Ep,
    Gene,
    Cds,
    Transcript,
}

impl FromStr for FeatureKind {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, ParseError> {
        // "Intron" is a known capitalized alias emitted by some aligners and is
        // folded to the canonical lowercase kind.
        match s {
            "intron" | "Intron" => Ok(FeatureKind::Intron),
            "start" => Ok(FeatureKind::Start),
            "stop" => Ok(FeatureKind::Stop),
            "ass" => Ok(FeatureKind::Ass),
            "dss" => Ok(FeatureKind::Dss),
            "exonpart" => Ok(FeatureKind::ExonPart),
            "exon" => Ok(FeatureKind::Exon),
            "CDSpart" => Ok(FeatureKind::CdsPart),
            "UTRpart" => Ok(FeatureKind::UtrPart),
            "nonexonpart" => Ok(FeatureKind::NonExonPart),
            "ep" => Ok(FeatureKind::Ep),
            "gene" => Ok(FeatureKind::Gene),
            "CDS" => Ok(FeatureKind::Cds),
            "transcript" | "mRNA" => Ok(FeatureKind::Transcript),
            _ => Err(ParseError::new(format!("unknown feature type: {}", s))),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            FeatureKind::Intron => "intron",
            FeatureKind::Start => "start",
            FeatureKind::Stop => "stop",
            FeatureKind::Ass => "ass",
            FeatureKind::Dss => "dss",
            FeatureKind::ExonPart => "exonpart",
            FeatureKind::Exon => "exon",
            FeatureKind::CdsPart => "CDSpart",
            FeatureKind::UtrPart => "UTRpart",
            FeatureKind::NonExonPart => "nonexonpart",
            FeatureKind::Ep => "ep",
            FeatureKind::Gene => "gene",
            FeatureKind::Cds => "CDS",
            FeatureKind::Transcript => "transcript",
        };
        write!(f, "{}", s)
    }
}

/// Ordered `key=value` list from the 9th column. Unknown keys are kept verbatim
/// so that rewriting a file is reproducible.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Attributes {
    items: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
    pub fn set<T: Into<String>>(&mut self, key: &str, value: T) {
        let value = value.into();
        match self.items.iter_mut().find(|(k, _)| k == key) {
            Some(item) => item.1 = value,
            None => self.items.push((key.to_string(), value)),
        }
    }
    pub fn src(&self) -> Option<&str> {
        self.get("src")
    }
    /// Group id; both `grp` and `group` spellings occur in the wild.
    pub fn group(&self) -> Option<&str> {
        self.get("grp").or_else(|| self.get("group"))
    }
    pub fn multiplicity(&self) -> u32 {
        self.get("mult").and_then(|v| v.parse().ok()).unwrap_or(1)
    }
    pub fn set_multiplicity(&mut self, mult: u32) {
        self.set("mult", mult.to_string());
    }
    pub fn priority(&self) -> Option<i32> {
        self.get("pri").and_then(|v| v.parse().ok())
    }
    pub fn gene_id(&self) -> Option<&str> {
        self.get("gene_id")
    }
    pub fn transcript_id(&self) -> Option<&str> {
        self.get("transcript_id")
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromStr for Attributes {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, ParseError> {
        let mut items = vec![];
        for token in s.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some((k, v)) => items.push((k.trim().to_string(), v.trim().to_string())),
                None => items.push((token.to_string(), String::new())),
            }
        }
        Ok(Self { items })
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.items.iter() {
            if !first {
                write!(f, ";")?;
            }
            first = false;
            if v.is_empty() {
                write!(f, "{}", k)?;
            } else {
                write!(f, "{}={}", k, v)?;
            }
        }
        Ok(())
    }
}

/// One 9-column interval row, the unit of every evidence and gene-structure file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HintRecord {
    pub seqname: String,
    pub source: String,
    pub kind: FeatureKind,
    /// 1-based, inclusive.
    pub start: u64,
    /// 1-based, inclusive. `start <= end` holds for every parsed record.
    pub end: u64,
    pub score: Option<f64>,
    pub strand: Strand,
    pub frame: Option<u8>,
    pub attrs: Attributes,
}

impl HintRecord {
    /// Records agreeing on this key (and not protected) are merge candidates.
    pub fn merge_key(&self) -> (&str, u64, u64, Strand, FeatureKind, Option<&str>) {
        (
            self.seqname.as_str(),
            self.start,
            self.end,
            self.strand,
            self.kind,
            self.attrs.src(),
        )
    }
    /// Manually curated records carrying a group id keep independent identity.
    pub fn is_protected(&self) -> bool {
        self.attrs.src() == Some(MANUAL_SOURCE) && self.attrs.group().is_some()
    }
}

impl FromStr for HintRecord {
    type Err = ParseError;
    fn from_str(line: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 9 {
            let msg = format!("expected 9 tab-separated columns, got {}", fields.len());
            return Err(ParseError::new(msg));
        }
        let start: u64 = fields[3]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid start: {}", fields[3])))?;
        let end: u64 = fields[4]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid end: {}", fields[4])))?;
        if end < start {
            let msg = format!("start {} greater than end {}", start, end);
            return Err(ParseError::new(msg));
        }
        let score = match fields[5] {
            "." => None,
            s => Some(
                s.parse()
                    .map_err(|_| ParseError::new(format!("invalid score: {}", s)))?,
            ),
        };
        let frame = match fields[7] {
            "." => None,
            s => Some(
                s.parse()
                    .map_err(|_| ParseError::new(format!("invalid frame: {}", s)))?,
            ),
        };
        Ok(HintRecord {
            seqname: fields[0].to_string(),
            source: fields[1].to_string(),
            kind: fields[2].parse()?,
            start,
            end,
            score,
            strand: fields[6].parse()?,
            frame,
            attrs: fields[8].parse()?,
        })
    }
}

impl fmt::Display for HintRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let score = match self.score {
            Some(s) => s.to_string(),
            None => ".".to_string(),
        };
        let frame = match self.frame {
            Some(fr) => fr.to_string(),
            None => ".".to_string(),
        };
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.seqname,
            self.source,
            self.kind,
            self.start,
            self.end,
            score,
            self.strand,
            frame,
            self.attrs,
        )
    }
}

/// One exon/CDS/UTR segment of a transcript structure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxFeature {
    pub kind: FeatureKind,
    pub start: u64,
    pub end: u64,
}

/// A transcript structure: ordered segments grouped under a transcript id,
/// grouped under a gene id, tagged with the evidence sources supporting it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub tx_id: String,
    pub gene_id: String,
    pub seqname: String,
    pub strand: Strand,
    pub features: Vec<TxFeature>,
    pub supported_by: BTreeSet<String>,
}

impl Transcript {
    pub fn new(tx_id: &str, gene_id: &str, seqname: &str, strand: Strand) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            gene_id: gene_id.to_string(),
            seqname: seqname.to_string(),
            strand,
            features: vec![],
            supported_by: BTreeSet::new(),
        }
    }
    pub fn span(&self) -> (u64, u64) {
        let start = self.features.iter().map(|f| f.start).min().unwrap_or(0);
        let end = self.features.iter().map(|f| f.end).max().unwrap_or(0);
        (start, end)
    }
    /// Exon segments in coordinate order. Falls back to the CDS segments when a
    /// source emitted CDS rows only.
    pub fn exons(&self) -> Vec<(u64, u64)> {
        let mut exons: Vec<_> = self
            .features
            .iter()
            .filter(|f| f.kind == FeatureKind::Exon)
            .map(|f| (f.start, f.end))
            .collect();
        if exons.is_empty() {
            exons = self
                .features
                .iter()
                .filter(|f| f.kind == FeatureKind::Cds)
                .map(|f| (f.start, f.end))
                .collect();
        }
        exons.sort_unstable();
        exons
    }
    /// Gaps between consecutive exons.
    pub fn introns(&self) -> Vec<(u64, u64)> {
        let exons = self.exons();
        exons
            .windows(2)
            .filter(|w| w[0].1 + 1 < w[1].0)
            .map(|w| (w[0].1 + 1, w[1].0 - 1))
            .collect()
    }
    /// Structural identity over the coding/UTR segments in coordinate order.
    /// Two transcripts with equal fingerprints describe the same structure.
    pub fn fingerprint(&self) -> String {
        let mut segments: Vec<_> = self
            .features
            .iter()
            .filter(|f| matches!(f.kind, FeatureKind::Cds | FeatureKind::UtrPart))
            .collect();
        segments.sort_unstable_by_key(|f| (f.start, f.end));
        let mut out = format!("{}{}", self.seqname, self.strand);
        for seg in segments {
            out.push_str(&format!(":{}:{}-{}", seg.kind, seg.start, seg.end));
        }
        out
    }
    pub fn cds(&self) -> Vec<(u64, u64)> {
        let mut cds: Vec<_> = self
            .features
            .iter()
            .filter(|f| f.kind == FeatureKind::Cds)
            .map(|f| (f.start, f.end))
            .collect();
        cds.sort_unstable();
        cds
    }
    pub fn is_supported_by(&self, src: &str) -> bool {
        self.supported_by.contains(src)
    }
}

/// The output of one prediction run. Transcript ids are unique within a set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSet {
    pub label: String,
    pub transcripts: Vec<Transcript>,
}

impl PredictionSet {
    pub fn new(label: &str, transcripts: Vec<Transcript>) -> Result<Self, ParseError> {
        let mut seen = HashSet::new();
        for tx in transcripts.iter() {
            if !seen.insert(tx.tx_id.as_str()) {
                let msg = format!("duplicated transcript id in {}: {}", label, tx.tx_id);
                return Err(ParseError::new(msg));
            }
        }
        Ok(Self {
            label: label.to_string(),
            transcripts,
        })
    }
    /// Build from 9-column rows. Gene rows are skipped (the gene grouping is
    /// recovered from the `gene_id` attribute), transcript rows carry the
    /// supporting-source tag in a `sup=` attribute, and segment rows attach by
    /// `transcript_id`.
    pub fn from_records(label: &str, records: &[HintRecord]) -> Result<Self, ParseError> {
        let mut order: Vec<String> = vec![];
        let mut transcripts: std::collections::HashMap<String, Transcript> = Default::default();
        for rec in records {
            if rec.kind == FeatureKind::Gene {
                continue;
            }
            let tx_id = rec
                .attrs
                .transcript_id()
                .ok_or_else(|| ParseError::new(format!("row without transcript_id: {}", rec)))?
                .to_string();
            let entry = transcripts.entry(tx_id.clone()).or_insert_with(|| {
                order.push(tx_id.clone());
                let gene = rec.attrs.gene_id().unwrap_or_else(|| tx_id.as_str());
                Transcript::new(&tx_id, gene, &rec.seqname, rec.strand)
            });
            match rec.kind {
                FeatureKind::Transcript => {
                    if let Some(sup) = rec.attrs.get("sup") {
                        for src in sup.split(',').filter(|s| !s.is_empty()) {
                            entry.supported_by.insert(src.to_string());
                        }
                    }
                }
                kind => entry.features.push(TxFeature {
                    kind,
                    start: rec.start,
                    end: rec.end,
                }),
            }
        }
        let transcripts = order
            .into_iter()
            .map(|id| transcripts.remove(&id).unwrap())
            .collect();
        PredictionSet::new(label, transcripts)
    }
    /// Flatten back to rows for writing. One transcript row, then the segments.
    pub fn to_records(&self) -> Vec<HintRecord> {
        let mut out = vec![];
        for tx in self.transcripts.iter() {
            let (start, end) = tx.span();
            let mut attrs = Attributes::new();
            attrs.set("gene_id", tx.gene_id.clone());
            attrs.set("transcript_id", tx.tx_id.clone());
            if !tx.supported_by.is_empty() {
                let sup: Vec<_> = tx.supported_by.iter().cloned().collect();
                attrs.set("sup", sup.join(","));
            }
            out.push(HintRecord {
                seqname: tx.seqname.clone(),
                source: self.label.clone(),
                kind: FeatureKind::Transcript,
                start,
                end,
                score: None,
                strand: tx.strand,
                frame: None,
                attrs,
            });
            for feature in tx.features.iter() {
                let mut attrs = Attributes::new();
                attrs.set("gene_id", tx.gene_id.clone());
                attrs.set("transcript_id", tx.tx_id.clone());
                out.push(HintRecord {
                    seqname: tx.seqname.clone(),
                    source: self.label.clone(),
                    kind: feature.kind,
                    start: feature.start,
                    end: feature.end,
                    score: None,
                    strand: tx.strand,
                    frame: None,
                    attrs,
                });
            }
        }
        out
    }
    /// Deterministic renaming so that ids never collide after a join.
    pub fn relabel(&mut self, prefix: &str) {
        for tx in self.transcripts.iter_mut() {
            tx.tx_id = format!("{}.{}", prefix, tx.tx_id);
            tx.gene_id = format!("{}.{}", prefix, tx.gene_id);
        }
    }
    pub fn len(&self) -> usize {
        self.transcripts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }
}

/// A closed 1-based coordinate range on one sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub seqname: String,
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// One unit of parallel prediction work. Output paths are unique by
/// construction so concurrent jobs never share a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: usize,
    pub fasta: PathBuf,
    pub hints: PathBuf,
    pub output: PathBuf,
    pub regions: Vec<Region>,
}

/// The six sub-metrics of one evaluation run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccuracyMetrics {
    pub nuc_sens: f64,
    pub nuc_spec: f64,
    pub exon_sens: f64,
    pub exon_spec: f64,
    pub gene_sens: f64,
    pub gene_spec: f64,
}

impl AccuracyMetrics {
    /// The fixed weighted average used to rank trained parameter sets. Exon and
    /// nucleotide correctness are weighted above whole-gene exactness.
    pub fn score(&self) -> f64 {
        (3.0 * self.nuc_sens
            + 2.0 * self.nuc_spec
            + 4.0 * self.exon_sens
            + 3.0 * self.exon_spec
            + 2.0 * self.gene_sens
            + self.gene_spec)
            / 15.0
    }
    pub fn nuc_f1(&self) -> f64 {
        f1(self.nuc_sens, self.nuc_spec)
    }
    pub fn exon_f1(&self) -> f64 {
        f1(self.exon_sens, self.exon_spec)
    }
    pub fn gene_f1(&self) -> f64 {
        f1(self.gene_sens, self.gene_spec)
    }
}

pub fn f1(sens: f64, spec: f64) -> f64 {
    if sens + spec == 0.0 {
        0.0
    } else {
        2.0 * sens * spec / (sens + spec)
    }
}

/// Supported translation tables. Only a fixed set is accepted because the
/// stop-codon probability rewrite must know the valid stop codons per table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GeneticCode {
    Standard,
    Ciliate,
    Euplotid,
    AlternativeYeast,
    Gracilibacteria,
    PachysolenTannophilus,
}

impl GeneticCode {
    pub fn from_table(id: u8) -> Option<Self> {
        match id {
            1 => Some(GeneticCode::Standard),
            6 => Some(GeneticCode::Ciliate),
            10 => Some(GeneticCode::Euplotid),
            12 => Some(GeneticCode::AlternativeYeast),
            25 => Some(GeneticCode::Gracilibacteria),
            26 => Some(GeneticCode::PachysolenTannophilus),
            _ => None,
        }
    }
    pub fn table(&self) -> u8 {
        match self {
            GeneticCode::Standard => 1,
            GeneticCode::Ciliate => 6,
            GeneticCode::Euplotid => 10,
            GeneticCode::AlternativeYeast => 12,
            GeneticCode::Gracilibacteria => 25,
            GeneticCode::PachysolenTannophilus => 26,
        }
    }
    /// Codons that terminate translation under this table.
    pub fn stop_codons(&self) -> &'static [&'static str] {
        match self {
            GeneticCode::Standard
            | GeneticCode::AlternativeYeast
            | GeneticCode::PachysolenTannophilus => &["taa", "tag", "tga"],
            GeneticCode::Ciliate => &["tga"],
            GeneticCode::Euplotid | GeneticCode::Gracilibacteria => &["taa", "tag"],
        }
    }
}

impl Default for GeneticCode {
    fn default() -> Self {
        GeneticCode::Standard
    }
}

/// Immutable run context threaded through the driver and the stages, replacing
/// process-wide mutable flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    pub species: String,
    pub workdir: PathBuf,
    pub genome: PathBuf,
    pub protein_evidence: Vec<PathBuf>,
    pub rna_evidence: Vec<PathBuf>,
    pub manual_hints: Vec<PathBuf>,
    pub threads: usize,
    pub seed: u64,
    pub force: bool,
    pub utr: bool,
    pub skip_training: bool,
}

impl PipelineContext {
    pub fn has_protein_evidence(&self) -> bool {
        !self.protein_evidence.is_empty()
    }
    pub fn has_rna_evidence(&self) -> bool {
        !self.rna_evidence.is_empty()
    }
    /// Both evidence classes present: prediction runs twice and the results are
    /// reconciled by the dual join.
    pub fn dual_evidence(&self) -> bool {
        self.has_protein_evidence() && self.has_rna_evidence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn record_round_trip() {
        let line = "chr1\tminiprot\tintron\t120\t540\t0.9\t+\t.\tsrc=P;mult=4;pri=4";
        let rec: HintRecord = line.parse().unwrap();
        assert_eq!(rec.seqname, "chr1");
        assert_eq!(rec.kind, FeatureKind::Intron);
        assert_eq!(rec.attrs.multiplicity(), 4);
        assert_eq!(rec.attrs.src(), Some("P"));
        assert_eq!(format!("{}", rec), line);
    }

    #[test]
    fn capitalized_intron_is_folded() {
        let line = "chr1\taln\tIntron\t1\t10\t.\t-\t.\tsrc=E";
        let rec: HintRecord = line.parse().unwrap();
        assert_eq!(rec.kind, FeatureKind::Intron);
        assert!(format!("{}", rec).contains("\tintron\t"));
    }

    #[test]
    fn invalid_rows_are_rejected() {
        assert!("chr1\tx\tintron\t10\t5\t.\t+\t.\tsrc=P"
            .parse::<HintRecord>()
            .is_err());
        assert!("chr1\tx\tblah\t1\t5\t.\t+\t.\tsrc=P"
            .parse::<HintRecord>()
            .is_err());
        assert!("chr1\tx\tintron\t1\t5\t.\t*\t.\tsrc=P"
            .parse::<HintRecord>()
            .is_err());
    }

    #[test]
    fn protected_needs_manual_source_and_group() {
        let rec: HintRecord = "chr1\tman\tintron\t1\t5\t.\t+\t.\tsrc=M;grp=g1"
            .parse()
            .unwrap();
        assert!(rec.is_protected());
        let rec: HintRecord = "chr1\tman\tintron\t1\t5\t.\t+\t.\tsrc=M".parse().unwrap();
        assert!(!rec.is_protected());
        let rec: HintRecord = "chr1\taln\tintron\t1\t5\t.\t+\t.\tsrc=P;grp=g1"
            .parse()
            .unwrap();
        assert!(!rec.is_protected());
    }

    #[test]
    fn fingerprint_identifies_structures() {
        let mut a = Transcript::new("t1", "g1", "chr1", Strand::Forward);
        a.features.push(TxFeature {
            kind: FeatureKind::Cds,
            start: 10,
            end: 50,
        });
        a.features.push(TxFeature {
            kind: FeatureKind::Cds,
            start: 100,
            end: 150,
        });
        let mut b = Transcript::new("t9", "g9", "chr1", Strand::Forward);
        b.features.push(TxFeature {
            kind: FeatureKind::Cds,
            start: 100,
            end: 150,
        });
        b.features.push(TxFeature {
            kind: FeatureKind::Cds,
            start: 10,
            end: 50,
        });
        assert_eq!(a.fingerprint(), b.fingerprint());
        let mut c = b.clone();
        c.features[0].end = 151;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn introns_are_gaps_between_exons() {
        let mut tx = Transcript::new("t1", "g1", "chr1", Strand::Forward);
        for &(s, e) in &[(10u64, 20u64), (30, 40), (41, 50), (60, 70)] {
            tx.features.push(TxFeature {
                kind: FeatureKind::Exon,
                start: s,
                end: e,
            });
        }
        assert_eq!(tx.introns(), vec![(21, 29), (51, 59)]);
    }

    #[test]
    fn accuracy_score_formula() {
        let metrics = AccuracyMetrics {
            nuc_sens: 90.0,
            nuc_spec: 85.0,
            exon_sens: 80.0,
            exon_spec: 75.0,
            gene_sens: 60.0,
            gene_spec: 55.0,
        };
        let expected = 1160.0 / 15.0;
        assert!((metrics.score() - expected).abs() < 1e-9);
    }

    #[test]
    fn prediction_set_rejects_duplicated_ids() {
        let a = Transcript::new("t1", "g1", "chr1", Strand::Forward);
        let b = Transcript::new("t1", "g2", "chr1", Strand::Forward);
        assert!(PredictionSet::new("x", vec![a, b]).is_err());
    }

    #[test]
    fn prediction_set_round_trip() {
        let rows = [
            "chr1\trunA\ttranscript\t10\t150\t.\t+\t.\tgene_id=g1;transcript_id=t1;sup=P",
            "chr1\trunA\texon\t10\t50\t.\t+\t.\tgene_id=g1;transcript_id=t1",
            "chr1\trunA\tCDS\t10\t50\t.\t+\t.\tgene_id=g1;transcript_id=t1",
            "chr1\trunA\texon\t100\t150\t.\t+\t.\tgene_id=g1;transcript_id=t1",
        ];
        let records: Vec<HintRecord> = rows.iter().map(|r| r.parse().unwrap()).collect();
        let set = PredictionSet::from_records("runA", &records).unwrap();
        assert_eq!(set.len(), 1);
        let tx = &set.transcripts[0];
        assert!(tx.is_supported_by("P"));
        assert_eq!(tx.span(), (10, 150));
        assert_eq!(tx.exons(), vec![(10, 50), (100, 150)]);
        let back = set.to_records();
        let again = PredictionSet::from_records("runA", &back).unwrap();
        assert_eq!(again.transcripts, set.transcripts);
    }

    #[test]
    fn genetic_code_stop_codons() {
        assert_eq!(GeneticCode::Standard.stop_codons().len(), 3);
        assert_eq!(GeneticCode::Ciliate.stop_codons(), &["tga"]);
        assert_eq!(GeneticCode::from_table(10), Some(GeneticCode::Euplotid));
        assert_eq!(GeneticCode::from_table(2), None);
    }
}
