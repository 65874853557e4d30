//! This module defines the `SketchParams` struct, which encapsulates the parameters
//! required to build and compare bottom-k sketches: k-mer length, sketch size, alphabet,
//! canonicality, case sensitivity, hash seed, hash width and the reads-mode settings.
//! Parameters are either built fresh from the command line or inherited from a
//! pre-built sketch, in which case command-line overrides of inherited values are
//! rejected. It also provides compatibility checks between parameter sets.

use anyhow::{bail, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::cli::SketchArgs;
use crate::sketch::BottomKSketcher;

pub const DEFAULT_K: u8 = 21;
pub const DEFAULT_PROTEIN_K: u8 = 9;
pub const DEFAULT_SKETCH_SIZE: u64 = 1000;
pub const DEFAULT_SEED: u32 = 42;
pub const DEFAULT_MIN_COPIES: u32 = 2;

pub const ALPHABET_NUCLEOTIDE: &str = "ACGT";
pub const ALPHABET_PROTEIN: &str = "ACDEFGHIKLMNPQRSTVWY";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SketchParams {
    kmer_length: u8,
    sketch_size: u64,
    alphabet: String,
    noncanonical: bool,
    preserve_case: bool,
    seed: u32,
    use64: bool,
    reads: bool,
    min_copies: u32,
}

impl SketchParams {
    /// Nucleotide parameters with the given k-mer length and sketch size.
    pub fn new(kmer_length: u8, sketch_size: u64) -> Result<Self> {
        Self::with_alphabet(
            kmer_length,
            sketch_size,
            ALPHABET_NUCLEOTIDE.to_string(),
            false,
            false,
        )
    }

    fn with_alphabet(
        kmer_length: u8,
        sketch_size: u64,
        alphabet: String,
        noncanonical: bool,
        preserve_case: bool,
    ) -> Result<Self> {
        if kmer_length == 0 {
            bail!("k-mer length must be at least 1");
        }

        if sketch_size == 0 {
            bail!("Sketch size must be at least 1");
        }

        if alphabet.is_empty() {
            bail!("Alphabet must contain at least one character");
        }

        // k-mers are encoded as base-|alphabet| integers in 64 bits
        let space = (alphabet.len() as u128).checked_pow(kmer_length as u32);
        let use64 = match space {
            Some(space) if space <= 1u128 << 64 => space > 1u128 << 32,
            _ => bail!(
                "k-mer length {} is too large for an alphabet of {} characters",
                kmer_length,
                alphabet.len()
            ),
        };

        Ok(SketchParams {
            kmer_length,
            sketch_size,
            alphabet,
            noncanonical,
            preserve_case,
            seed: DEFAULT_SEED,
            use64,
            reads: false,
            min_copies: 1,
        })
    }

    /// Build parameters for freshly sketched inputs from command-line options.
    pub fn from_args(args: &SketchArgs) -> Result<Self> {
        if args.protein && args.alphabet.is_some() {
            bail!("The options --protein and --alphabet cannot be used together");
        }

        if args.min_copies.is_some() && !args.reads {
            bail!("The option --min-copies requires --reads");
        }

        let (alphabet, noncanonical, default_k) = if args.protein {
            (ALPHABET_PROTEIN.to_string(), true, DEFAULT_PROTEIN_K)
        } else if let Some(alphabet) = &args.alphabet {
            (normalize_alphabet(alphabet, args.preserve_case), true, DEFAULT_K)
        } else {
            (ALPHABET_NUCLEOTIDE.to_string(), args.noncanonical, DEFAULT_K)
        };

        let mut params = Self::with_alphabet(
            args.kmer_length.unwrap_or(default_k),
            args.sketch_size.unwrap_or(DEFAULT_SKETCH_SIZE),
            alphabet,
            noncanonical,
            args.preserve_case,
        )?;

        params.seed = args.seed.unwrap_or(DEFAULT_SEED);
        if args.reads {
            params.reads = true;
            params.min_copies = args.min_copies.unwrap_or(DEFAULT_MIN_COPIES);
        }

        Ok(params)
    }

    /// Parameters to use with a pre-built sketch carrying these parameters.
    ///
    /// Everything is inherited from the sketch. Options that would override an
    /// inherited value are configuration errors.
    pub fn inherit(&self, args: &SketchArgs) -> Result<Self> {
        let overrides = [
            ("kmer-length", args.kmer_length.is_some()),
            ("noncanonical", args.noncanonical),
            ("protein", args.protein),
            ("alphabet", args.alphabet.is_some()),
            ("seed", args.seed.is_some()),
            ("preserve-case", args.preserve_case),
            ("min-copies", args.min_copies.is_some()),
        ];

        for (option, active) in overrides {
            if active {
                bail!(
                    "The option --{} cannot be used when a sketch is provided; it is inherited from the sketch.",
                    option
                );
            }
        }

        if let Some(sketch_size) = args.sketch_size {
            if sketch_size != self.sketch_size {
                if args.reads || self.reads {
                    bail!(
                        "The sketch size must match the sketch when using reads mode (sketch has {}, requested {}); leave this option out to inherit it.",
                        self.sketch_size,
                        sketch_size
                    );
                }

                warn!(
                    "Ignoring --sketch-size {}; using size {} from the sketch.",
                    sketch_size, self.sketch_size
                );
            }
        }

        Ok(self.clone())
    }

    /// Check parameters read from disk against the rules applied when they are built.
    pub fn validate(&self) -> Result<()> {
        let expected = Self::with_alphabet(
            self.kmer_length,
            self.sketch_size,
            self.alphabet.clone(),
            self.noncanonical,
            self.preserve_case,
        )?;

        if self.use64 != expected.use64 {
            bail!(
                "Sketch has 64-bit hashes = {}, but k = {} with {} alphabet characters requires {}",
                self.use64,
                self.kmer_length,
                self.alphabet.len(),
                expected.use64
            );
        }

        if self.reads && self.min_copies == 0 {
            bail!("Sketch built from reads must have min_copies of at least 1");
        }

        Ok(())
    }

    pub fn create_sketcher(&self) -> BottomKSketcher {
        BottomKSketcher::new(self)
    }

    pub fn k(&self) -> u8 {
        self.kmer_length
    }

    pub fn sketch_size(&self) -> u64 {
        self.sketch_size
    }

    pub fn alphabet(&self) -> &str {
        &self.alphabet
    }

    pub fn noncanonical(&self) -> bool {
        self.noncanonical
    }

    pub fn preserve_case(&self) -> bool {
        self.preserve_case
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn use64(&self) -> bool {
        self.use64
    }

    pub fn reads(&self) -> bool {
        self.reads
    }

    pub fn min_copies(&self) -> u32 {
        self.min_copies
    }

    /// Number of distinct k-mers possible for the alphabet and k.
    pub fn kmer_space(&self) -> f64 {
        (self.alphabet.len() as f64).powi(self.kmer_length as i32)
    }

    /// Return true if sketch parameters are identical.
    pub fn check_compatibility(&self, other: &SketchParams) -> Result<bool> {
        if self.k() != other.k() {
            bail!(
                "Sketch has k = {}, but other sketch has k = {}",
                self.k(),
                other.k()
            );
        }

        // bottom-k sketches of different sizes can be compared by truncating to
        // the smaller size, but mixing them in one file hides that from the user
        if self.sketch_size() != other.sketch_size() {
            bail!(
                "Sketch has size = {}, but other sketch has size = {}",
                self.sketch_size(),
                other.sketch_size()
            );
        }

        if self.alphabet() != other.alphabet() {
            bail!(
                "Sketch has alphabet = {}, but other sketch has alphabet = {}",
                self.alphabet(),
                other.alphabet()
            );
        }

        if self.noncanonical() != other.noncanonical() {
            bail!(
                "Sketch has noncanonical = {}, but other sketch has noncanonical = {}",
                self.noncanonical(),
                other.noncanonical()
            );
        }

        if self.preserve_case() != other.preserve_case() {
            bail!(
                "Sketch has preserve_case = {}, but other sketch has preserve_case = {}",
                self.preserve_case(),
                other.preserve_case()
            );
        }

        if self.seed() != other.seed() {
            bail!(
                "Sketch has seed = {}, but other sketch has seed = {}",
                self.seed(),
                other.seed()
            );
        }

        if self.use64() != other.use64() {
            bail!(
                "Sketch has 64-bit hashes = {}, but other sketch has 64-bit hashes = {}",
                self.use64(),
                other.use64()
            );
        }

        Ok(true)
    }
}

/// Deduplicate alphabet characters, upper-casing them unless case is preserved.
fn normalize_alphabet(alphabet: &str, preserve_case: bool) -> String {
    let mut normalized = String::new();
    for c in alphabet.chars() {
        let c = if preserve_case { c } else { c.to_ascii_uppercase() };
        if !normalized.contains(c) {
            normalized.push(c);
        }
    }

    normalized
}
