//! Pairwise comparison of bottom-k sketches.
//!
//! The number of shared hashes is estimated with a bounded sorted merge of the two
//! hash sequences, which walks the bottom `sketch_size` hashes of their union. The
//! resulting Jaccard estimate is converted to a Mash distance and paired with the
//! p-value of observing that many shared hashes by chance.
//!
//! See Ondov et al., 2016: https://doi.org/10.1186/s13059-016-0997-x

use std::cmp::Ordering;

use anyhow::{bail, Result};

use crate::significance::p_value;
use crate::sketch::{HashSequence, SketchEntry};

/// Outcome of comparing one reference entry with one query entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairResult {
    pub numer: u64,
    pub denom: u64,
    pub distance: f64,
    pub p_value: f64,
    pub pass: bool,
}

/// Count shared hashes within the bottom `sketch_size` hashes of the union.
///
/// Returns `(common, denom)` where `denom` is the size of the union walked,
/// never larger than `sketch_size`.
pub fn intersect<T: Ord>(hashes_ref: &[T], hashes_qry: &[T], sketch_size: u64) -> (u64, u64) {
    let mut i = 0;
    let mut j = 0;
    let mut common = 0;
    let mut denom = 0;

    while denom < sketch_size && i < hashes_ref.len() && j < hashes_qry.len() {
        match hashes_ref[i].cmp(&hashes_qry[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
                common += 1;
            }
        }

        denom += 1;
    }

    if denom < sketch_size {
        // complete the union with whatever remains of either sequence
        denom += (hashes_ref.len() - i) as u64 + (hashes_qry.len() - j) as u64;
        denom = denom.min(sketch_size);
    }

    (common, denom)
}

/// Intersect two hash sequences of the same width.
pub fn intersect_sequences(
    hashes_ref: &HashSequence,
    hashes_qry: &HashSequence,
    sketch_size: u64,
) -> Result<(u64, u64)> {
    match (hashes_ref, hashes_qry) {
        (HashSequence::Hash32(r), HashSequence::Hash32(q)) => Ok(intersect(r, q, sketch_size)),
        (HashSequence::Hash64(r), HashSequence::Hash64(q)) => Ok(intersect(r, q, sketch_size)),
        _ => bail!("Cannot compare sketches with 32-bit and 64-bit hashes"),
    }
}

/// Mash distance for `common` shared hashes out of `denom`.
pub fn mash_distance(common: u64, denom: u64, kmer_length: u8) -> f64 {
    if common == denom {
        // avoid -0
        return 0.0;
    }

    if common == 0 {
        // avoid inf
        return 1.0;
    }

    let jaccard = common as f64 / denom as f64;
    let distance = -(2.0 * jaccard / (1.0 + jaccard)).ln() / kmer_length as f64;

    distance.min(1.0)
}

/// Compare a reference entry with a query entry.
pub fn compare_entries(
    entry_ref: &SketchEntry,
    entry_qry: &SketchEntry,
    sketch_size: u64,
    kmer_length: u8,
    kmer_space: f64,
    max_p_value: f64,
) -> Result<PairResult> {
    let (numer, denom) = intersect_sequences(&entry_ref.hashes, &entry_qry.hashes, sketch_size)?;
    let p_value = p_value(numer, entry_ref.length, entry_qry.length, kmer_space, denom);

    Ok(PairResult {
        numer,
        denom,
        distance: mash_distance(numer, denom, kmer_length),
        p_value,
        pass: p_value <= max_p_value,
    })
}
