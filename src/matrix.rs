//! All-pairs distance matrix over the entries of a sketch.
//!
//! The N×N grid of (reference, query) pairs is flattened row-major, with the reference
//! index advancing fastest, and cut into contiguous `PairBatch`es. Batches are resolved
//! in parallel on the rayon thread pool. Only the strict lower triangle
//! (reference < query) is compared; each distance is mirrored into the upper triangle
//! and the diagonal stays at zero. Each batch is folded into the shared matrix as soon
//! as it completes; batches cover disjoint cells, so the completion order does not
//! change the result for any degree of parallelism.

use std::ops::Index;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use log::{debug, info};
use num_format::{Locale, ToFormattedString};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::compare::{compare_entries, PairResult};
use crate::progress::progress_bar;
use crate::sketch::Sketch;

/// Upper bound on the number of grid cells walked by a single batch.
pub const MAX_PAIRS_PER_BATCH: usize = 0x1000;

/// Symmetric distance matrix stored as a flat row-major buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    count: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(count: usize) -> Self {
        DistanceMatrix {
            count,
            values: vec![0.0; count * count],
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.count..(i + 1) * self.count]
    }

    /// Set the distance between entries `i` and `j` in both halves.
    pub fn set_symmetric(&mut self, i: usize, j: usize, distance: f64) {
        self.values[i * self.count + j] = distance;
        self.values[j * self.count + i] = distance;
    }

    /// Write the outputs of one batch, returning how many passed the p-value threshold.
    pub fn record(&mut self, outputs: &[PairOutput]) -> usize {
        let mut pass_count = 0;
        for output in outputs {
            let result = &output.result;
            debug!(
                "{} vs {}: {}/{} shared hashes, distance {}, p-value {}",
                output.index_ref, output.index_query, result.numer, result.denom, result.distance, result.p_value
            );

            self.set_symmetric(output.index_query, output.index_ref, result.distance);
            if result.pass {
                pass_count += 1;
            }
        }

        pass_count
    }
}

impl Index<(usize, usize)> for DistanceMatrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.values[i * self.count + j]
    }
}

/// A contiguous run of cells in the row-major flattening of the pair grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairBatch {
    pub index_ref: usize,
    pub index_query: usize,
    pub pair_count: usize,
}

/// Comparison result for one lower-triangle cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairOutput {
    pub index_ref: usize,
    pub index_query: usize,
    pub result: PairResult,
}

/// Number of grid cells per batch for `count` entries and `parallelism` workers.
pub fn pairs_per_batch(count: usize, parallelism: usize) -> usize {
    (count * count / parallelism.max(1)).clamp(1, MAX_PAIRS_PER_BATCH)
}

/// Cut the full `count`×`count` grid into disjoint, exhaustive batches.
pub fn partition(count: usize, parallelism: usize) -> Vec<PairBatch> {
    let pair_count = count * count;
    let per_batch = pairs_per_batch(count, parallelism);

    (0..pair_count)
        .step_by(per_batch)
        .map(|start| PairBatch {
            index_ref: start % count,
            index_query: start / count,
            pair_count: per_batch.min(pair_count - start),
        })
        .collect()
}

/// Compare the lower-triangle cells covered by a batch.
pub fn compare_batch(sketch: &Sketch, batch: &PairBatch, max_p_value: f64) -> Result<Vec<PairOutput>> {
    let count = sketch.len();
    let params = sketch.params();

    // every entry shares the sketch parameters, so the target size is the same for all pairs
    let sketch_size = params.sketch_size();

    let mut outputs = Vec::new();
    let mut i = batch.index_query;
    let mut j = batch.index_ref;

    for _ in 0..batch.pair_count {
        if i >= count {
            break;
        }

        if j < i {
            let result = compare_entries(
                sketch.entry(j),
                sketch.entry(i),
                sketch_size,
                params.k(),
                params.kmer_space(),
                max_p_value,
            )?;

            outputs.push(PairOutput {
                index_ref: j,
                index_query: i,
                result,
            });
        }

        j += 1;
        if j == count {
            j = 0;
            i += 1;
        }
    }

    Ok(outputs)
}

/// Compute the distance matrix between all entries of a sketch.
///
/// Batches are sized for `parallelism` workers and dispatched on the current rayon
/// thread pool. Any failed comparison aborts the whole computation.
pub fn build_matrix(sketch: &Sketch, parallelism: usize, max_p_value: f64) -> Result<DistanceMatrix> {
    let count = sketch.len();
    let batches = partition(count, parallelism);
    let pair_count = count * count.saturating_sub(1) / 2;

    info!(
        "Comparing {} pairs of sketches in {} batches.",
        pair_count.to_formatted_string(&Locale::en),
        batches.len().to_formatted_string(&Locale::en)
    );

    let progress_bar = progress_bar(batches.len() as u64);
    let matrix = Mutex::new((DistanceMatrix::new(count), 0usize));
    batches.par_iter().try_for_each(|batch| -> Result<()> {
        let outputs = compare_batch(sketch, batch, max_p_value)?;

        let mut guard = matrix
            .lock()
            .map_err(|_| anyhow!("Distance matrix lock poisoned"))?;
        let (distances, pass_count) = &mut *guard;
        *pass_count += distances.record(&outputs);
        drop(guard);

        progress_bar.inc(1);
        Ok(())
    })?;
    progress_bar.finish();

    let (matrix, pass_count) = matrix
        .into_inner()
        .map_err(|_| anyhow!("Distance matrix lock poisoned"))?;

    info!(
        "{} of {} pairs within the p-value threshold of {}.",
        pass_count.to_formatted_string(&Locale::en),
        pair_count.to_formatted_string(&Locale::en),
        max_p_value
    );

    Ok(matrix)
}
