// Methods in this file were ported from minimap2 by Heng Li or modified from skani by Jim Shaw.

// minimap2 MIT License
//
// Copyright (c) 2018-     Dana-Farber Cancer Institute
//               2017-2018 Broad Institute, Inc.
//
// skani MIT License
//
// Copyright (c) 2022 Jim Shaw
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the
// "Software"), to deal in the Software without restriction, including
// without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to
// permit persons to whom the Software is furnished to do so, subject to
// the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use crate::sketch_params::{SketchParams, ALPHABET_NUCLEOTIDE};

pub type ItemHash = u64;

const INVALID_SYMBOL: u8 = u8::MAX;

/// Thomas Wang's integer hash function.
// Ported from minimap2 and following Rust implementation by Anicet Ebou.
// https://gist.github.com/lh3/974ced188be2f90422cc#file-inthash-c
// https://aebou.rbind.io/post/a-rust-glimpse-at-thomas-wang-integer-hash-function
// Further reading: https://gist.github.com/badboy/6267743
#[inline]
pub fn tw_hash64(kmer: ItemHash) -> ItemHash {
    let mut hash = kmer;

    hash = (!hash).wrapping_add(hash << 21); // key = (key << 21) - key - 1
    hash = hash ^ (hash >> 24);

    hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8); // key * 265
    hash = hash ^ (hash >> 14);

    hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4); // key * 21
    hash = hash ^ (hash >> 28);

    hash = hash.wrapping_add(hash << 31);

    hash
}

/// Rolling k-mer encoder and hasher for an arbitrary alphabet.
///
/// K-mers are encoded as base-|alphabet| integers. K-mers containing a character
/// outside the alphabet are skipped. For canonical nucleotide sketches the smaller
/// of the forward and reverse complement encodings is hashed.
#[derive(Clone, Debug)]
pub struct KmerHasher {
    symbols: [u8; 256],
    base: u128,
    modulus: u128,
    k: usize,
    canonical: bool,
    seed: ItemHash,
    hash_mask: ItemHash,
}

impl KmerHasher {
    pub fn new(params: &SketchParams) -> Self {
        let mut symbols = [INVALID_SYMBOL; 256];
        for (idx, c) in params.alphabet().bytes().enumerate() {
            symbols[c as usize] = idx as u8;
            if !params.preserve_case() {
                symbols[c.to_ascii_lowercase() as usize] = idx as u8;
            }
        }

        let base = params.alphabet().len() as u128;
        let k = params.k() as usize;

        KmerHasher {
            symbols,
            base,
            modulus: base.pow(k as u32),
            k,
            canonical: !params.noncanonical() && params.alphabet() == ALPHABET_NUCLEOTIDE,
            seed: tw_hash64(params.seed() as ItemHash),
            hash_mask: if params.use64() {
                ItemHash::MAX
            } else {
                u32::MAX as ItemHash
            },
        }
    }

    /// Pass the encoding of every valid k-mer in `seq` to `emit`.
    // Modified from the fmh_seeds method by Jim Shaw in skani.
    pub fn kmers<F: FnMut(ItemHash)>(&self, seq: &[u8], mut emit: F) {
        if seq.len() < self.k {
            return;
        }

        let rev_shift_dist = 2 * (self.k - 1);

        let mut fwd_kmer: u128 = 0;
        let mut rev_kmer: ItemHash = 0;
        let mut valid = 0;

        for &c in seq {
            let symbol = self.symbols[c as usize];
            if symbol == INVALID_SYMBOL {
                valid = 0;
                continue;
            }

            fwd_kmer = (fwd_kmer * self.base + symbol as u128) % self.modulus;

            if self.canonical {
                let nuc_r = 3 - symbol as ItemHash;
                rev_kmer >>= 2;
                rev_kmer |= nuc_r << rev_shift_dist;
            }

            valid += 1;
            if valid < self.k {
                continue;
            }

            let fwd = fwd_kmer as ItemHash;
            if self.canonical && rev_kmer < fwd {
                emit(rev_kmer);
            } else {
                emit(fwd);
            }
        }
    }

    /// Pass the hash of every valid k-mer in `seq` to `emit`.
    pub fn hashes<F: FnMut(ItemHash)>(&self, seq: &[u8], mut emit: F) {
        self.kmers(seq, |kmer| emit(self.hash(kmer)));
    }

    #[inline]
    pub fn hash(&self, kmer: ItemHash) -> ItemHash {
        tw_hash64(kmer ^ self.seed) & self.hash_mask
    }
}
