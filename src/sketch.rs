//! This module provides bottom-k MinHash sketches of sequence files.
//!
//! A `Sketch` is a set of `SketchEntry` values (one per input file) sharing one
//! `SketchParams`. Each entry keeps the `sketch_size` smallest distinct k-mer hashes
//! in ascending order, along with the sequence length and an identifying name.
//! Sketches are built from FASTA/FASTQ files with `BottomKSketcher`, or loaded from
//! JSON sketch files previously written by `Sketch::save`.

use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::warn;
use needletail::parse_fastx_reader;
use needletail::parser::SequenceRecord;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::hashing::{ItemHash, KmerHasher};
use crate::progress::progress_bar;
use crate::sketch_params::SketchParams;

pub const SKETCH_SUFFIX: &str = ".msh.json";

/// Sorted hashes of one sketch entry; the width is fixed per sketch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HashSequence {
    Hash32(Vec<u32>),
    Hash64(Vec<u64>),
}

impl HashSequence {
    pub fn len(&self) -> usize {
        match self {
            HashSequence::Hash32(hashes) => hashes.len(),
            HashSequence::Hash64(hashes) => hashes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn use64(&self) -> bool {
        matches!(self, HashSequence::Hash64(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SketchEntry {
    pub name: String,
    pub comment: String,
    pub length: u64,
    pub hashes: HashSequence,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sketch {
    params: SketchParams,
    entries: Vec<SketchEntry>,
}

impl Sketch {
    pub fn new(params: SketchParams, entries: Vec<SketchEntry>) -> Result<Self> {
        params.validate()?;

        for entry in &entries {
            if entry.hashes.use64() != params.use64() {
                bail!(
                    "Sketch entry {} has {}-bit hashes, but the sketch uses {}-bit hashes",
                    entry.name,
                    if entry.hashes.use64() { 64 } else { 32 },
                    if params.use64() { 64 } else { 32 }
                );
            }
        }

        Ok(Sketch { params, entries })
    }

    pub fn params(&self) -> &SketchParams {
        &self.params
    }

    pub fn entries(&self) -> &[SketchEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> &SketchEntry {
        &self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the entries of another sketch built with identical parameters.
    pub fn merge(&mut self, other: Sketch) -> Result<()> {
        self.params.check_compatibility(&other.params)?;
        self.entries.extend(other.entries);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open sketch {}", path.display()))?;

        let sketch: Sketch = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse sketch {}", path.display()))?;

        // validate parameters and hash widths read from disk
        Sketch::new(sketch.params, sketch.entries)
            .with_context(|| format!("Invalid sketch {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)
            .with_context(|| format!("Failed to write sketch {}", path.display()))?;
        writer.flush()?;

        Ok(())
    }
}

/// Retains the `sketch_size` smallest distinct hashes seen.
///
/// In reads mode a hash is only retained once it has been seen `min_copies`
/// times, which filters out most k-mers arising from sequencing errors.
#[derive(Clone, Debug)]
pub struct BottomKSketcher {
    hasher: KmerHasher,
    heap: BinaryHeap<ItemHash>,
    counts: FxHashMap<ItemHash, u32>,
    sketch_size: usize,
    min_copies: u32,
    use64: bool,
    reads: bool,
    bp_count: u64,
}

impl BottomKSketcher {
    pub fn new(params: &SketchParams) -> Self {
        BottomKSketcher {
            hasher: KmerHasher::new(params),
            heap: BinaryHeap::new(),
            counts: FxHashMap::default(),
            sketch_size: params.sketch_size() as usize,
            min_copies: params.min_copies().max(1),
            use64: params.use64(),
            reads: params.reads(),
            bp_count: 0,
        }
    }

    pub fn process_seq(&mut self, seq: &SequenceRecord) {
        self.process_bytes(&seq.seq());
    }

    pub fn process_bytes(&mut self, seq: &[u8]) {
        self.bp_count += seq.len() as u64;

        let hasher = self.hasher.clone();
        hasher.hashes(seq, |hash| self.insert(hash));
    }

    fn insert(&mut self, hash: ItemHash) {
        if self.heap.len() >= self.sketch_size && self.heap.peek().is_some_and(|&max| hash >= max) {
            return;
        }

        let count = self.counts.entry(hash).or_insert(0);
        *count = count.saturating_add(1);
        if *count != self.min_copies {
            return;
        }

        self.heap.push(hash);
        if self.heap.len() > self.sketch_size {
            if let Some(evicted) = self.heap.pop() {
                self.counts.remove(&evicted);
            }

            // drop pending hashes that can no longer enter the sketch
            if self.counts.len() > 4 * self.sketch_size {
                if let Some(&max) = self.heap.peek() {
                    self.counts.retain(|&h, _| h <= max);
                }
            }
        }
    }

    /// Estimate of the number of distinct k-mers from the bottom-k hashes.
    pub fn estimate_set_size(&self) -> f64 {
        match self.heap.peek() {
            Some(&max) if max > 0 => {
                let bits = if self.use64 { 64 } else { 32 };
                2f64.powi(bits) * self.heap.len() as f64 / max as f64
            }
            _ => 0.0,
        }
    }

    pub fn into_entry(self, name: String, comment: String) -> SketchEntry {
        let length = if self.reads {
            self.estimate_set_size().round() as u64
        } else {
            self.bp_count
        };

        let use64 = self.use64;
        let sorted = self.heap.into_sorted_vec();
        let hashes = if use64 {
            HashSequence::Hash64(sorted)
        } else {
            HashSequence::Hash32(sorted.into_iter().map(|h| h as u32).collect())
        };

        SketchEntry {
            name,
            comment,
            length,
            hashes,
        }
    }
}

/// Create sketch entry from sequence file.
pub fn sketch_file(seq_file: &Path, sketch_params: &SketchParams) -> Result<SketchEntry> {
    let mut sketcher = sketch_params.create_sketcher();
    let reader = File::open(seq_file)
        .with_context(|| format!("Failed to open {}", seq_file.display()))?;

    let mut fastx_reader = parse_fastx_reader(reader)
        .with_context(|| format!("Failed to parse {}", seq_file.display()))?;

    let mut comment = None;
    while let Some(rec) = fastx_reader.next() {
        let record = rec.with_context(|| format!("Invalid record in {}", seq_file.display()))?;
        if comment.is_none() {
            comment = Some(record_comment(record.id()));
        }
        sketcher.process_seq(&record);
    }

    Ok(sketcher.into_entry(
        seq_file.to_string_lossy().to_string(),
        comment.unwrap_or_default(),
    ))
}

/// Description following the identifier in a record header.
fn record_comment(header: &[u8]) -> String {
    let header = String::from_utf8_lossy(header);
    match header.split_once(char::is_whitespace) {
        Some((_, comment)) => comment.trim().to_string(),
        None => String::new(),
    }
}

/// Sketch sequence files in parallel, keeping entries in input order.
pub fn sketch_files(seq_files: &[PathBuf], sketch_params: &SketchParams) -> Result<Sketch> {
    let progress_bar = progress_bar(seq_files.len() as u64);

    let entries = seq_files
        .par_iter()
        .map(|seq_file| {
            let entry = sketch_file(seq_file, sketch_params);
            progress_bar.inc(1);
            entry
        })
        .collect::<Result<Vec<SketchEntry>>>()?;

    progress_bar.finish();

    for entry in entries.iter().filter(|entry| entry.hashes.is_empty()) {
        warn!("No valid k-mers found in {}", entry.name);
    }

    Sketch::new(sketch_params.clone(), entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};

    // Helper to create a temporary FASTA file with given contents
    fn write_temp_fasta(contents: &str, filename: &str, dir: &TempDir) -> PathBuf {
        let file_path = dir.path().join(filename);
        let mut file = File::create(&file_path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.sync_all().unwrap();
        file_path
    }

    fn sorted_hashes(entry: &SketchEntry) -> Vec<u64> {
        match &entry.hashes {
            HashSequence::Hash32(hashes) => hashes.iter().map(|&h| h as u64).collect(),
            HashSequence::Hash64(hashes) => hashes.clone(),
        }
    }

    #[test]
    fn test_bottom_k_keeps_smallest() {
        let params = SketchParams::new(21, 3).unwrap();
        let mut sketcher = params.create_sketcher();
        for hash in [50, 10, 40, 10, 30, 20, 60] {
            sketcher.insert(hash);
        }

        let entry = sketcher.into_entry("a".to_string(), String::new());
        assert_eq!(entry.hashes, HashSequence::Hash64(vec![10, 20, 30]));
    }

    #[test]
    fn test_min_copies() {
        let args = crate::cli::SketchArgs {
            reads: true,
            min_copies: Some(2),
            sketch_size: Some(2),
            ..Default::default()
        };
        let params = SketchParams::from_args(&args).unwrap();
        let mut sketcher = params.create_sketcher();
        for hash in [5, 1, 7, 7, 2, 9, 9, 1, 3] {
            sketcher.insert(hash);
        }

        // 5, 2 and 3 were only seen once
        let entry = sketcher.into_entry("a".to_string(), String::new());
        assert_eq!(entry.hashes, HashSequence::Hash64(vec![1, 7]));
    }

    #[test]
    fn test_hash_width() {
        let params = SketchParams::new(4, 100).unwrap();
        let mut sketcher = params.create_sketcher();
        sketcher.process_bytes(b"ACGTACGT");

        let entry = sketcher.into_entry("a".to_string(), String::new());
        assert!(!entry.hashes.use64());
        assert_eq!(entry.hashes.len(), 3);
        assert_eq!(entry.length, 8);

        let hashes = sorted_hashes(&entry);
        assert!(hashes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sketch_file() {
        let temp_dir = tempdir().unwrap();
        let fasta = ">seq1 Escherichia coli\nACGTACGTACGTAAAGGGCCCTTT\n>seq2\nGGGATTACA\n";
        let file = write_temp_fasta(fasta, "genome1.fa", &temp_dir);

        let params = SketchParams::new(5, 1000).unwrap();
        let entry = sketch_file(&file, &params).unwrap();
        assert_eq!(entry.comment, "Escherichia coli");
        assert_eq!(entry.length, 33);
        assert_eq!(entry.name, file.to_string_lossy());

        let hashes = sorted_hashes(&entry);
        assert!(!hashes.is_empty());
        assert!(hashes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sketch_missing_file() {
        let params = SketchParams::new(5, 1000).unwrap();
        let err = sketch_files(&[PathBuf::from("/no/such/genome.fa")], &params).unwrap_err();
        assert!(format!("{err:#}").contains("/no/such/genome.fa"));
    }

    #[test]
    fn test_sketch_files_order_and_round_trip() {
        let temp_dir = tempdir().unwrap();
        let file1 = write_temp_fasta(">a\nACGTACGTACGTTTGACA\n", "a.fa", &temp_dir);
        let file2 = write_temp_fasta(">b\nTTTTGGGGCCCCAAAATG\n", "b.fa", &temp_dir);

        let params = SketchParams::new(5, 1000).unwrap();
        let sketch = sketch_files(&[file1.clone(), file2.clone()], &params).unwrap();
        assert_eq!(sketch.len(), 2);
        assert_eq!(sketch.entry(0).name, file1.to_string_lossy());
        assert_eq!(sketch.entry(1).name, file2.to_string_lossy());

        let path = temp_dir.path().join(format!("all{SKETCH_SUFFIX}"));
        sketch.save(&path).unwrap();
        assert_eq!(Sketch::load(&path).unwrap(), sketch);
    }

    #[test]
    fn test_load_rejects_invalid_params() {
        let temp_dir = tempdir().unwrap();
        let sketch = Sketch::new(SketchParams::new(5, 1000).unwrap(), Vec::new()).unwrap();
        let json = serde_json::to_string(&sketch).unwrap();
        assert!(json.contains("\"kmer_length\":5"));

        let path = temp_dir.path().join(format!("zero_k{SKETCH_SUFFIX}"));
        std::fs::write(&path, json.replace("\"kmer_length\":5", "\"kmer_length\":0")).unwrap();
        let err = Sketch::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("k-mer length"));

        let path = temp_dir.path().join(format!("wide{SKETCH_SUFFIX}"));
        std::fs::write(&path, json.replace("\"use64\":false", "\"use64\":true")).unwrap();
        assert!(Sketch::load(&path).is_err());
    }

    #[test]
    fn test_merge_incompatible() {
        let mut sketch = Sketch::new(SketchParams::new(21, 1000).unwrap(), Vec::new()).unwrap();
        let other = Sketch::new(SketchParams::new(15, 1000).unwrap(), Vec::new()).unwrap();
        assert!(sketch.merge(other).is_err());
    }

    #[test]
    fn test_entry_width_mismatch() {
        let entry = SketchEntry {
            name: "a".to_string(),
            comment: String::new(),
            length: 10,
            hashes: HashSequence::Hash32(vec![1, 2]),
        };
        assert!(Sketch::new(SketchParams::new(21, 1000).unwrap(), vec![entry]).is_err());
    }
}
