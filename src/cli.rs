//! Command-line interface definition for the sketchdist application.
//!
//! This file defines the `Cli` struct and its subcommands using the `clap` crate. The
//! `matrix` command computes a PHYLIP distance matrix from sequence files or pre-built
//! sketches; the `sketch` command writes sketches to disk for later use. Sketching
//! options are shared by both commands and are optional so that values inherited from
//! a pre-built sketch can be told apart from explicit overrides.
//! The CLI output is styled using the `anstyle` crate for improved readability.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(styles=get_styles())]
#[command(disable_help_subcommand = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute the distance matrix between sequence files or sketches (PHYLIP style)
    Matrix(MatrixArgs),

    /// Sketch sequence files and write the sketches to disk
    Sketch(SketchCmdArgs),
}

#[derive(Args)]
pub struct MatrixArgs {
    /// Sequence files, or sketch files (*.msh.json)
    #[arg(required = true, value_parser = clap::value_parser!(PathBuf))]
    pub inputs: Vec<PathBuf>,

    /// Inputs are files listing paths to sequence files, one per line
    #[arg(short, long, help_heading = "Inputs", default_value_t = false)]
    pub list: bool,

    /// Output file [default: stdout]
    #[arg(short = 'o', long, help_heading = "Output", value_parser = clap::value_parser!(PathBuf))]
    pub output: Option<PathBuf>,

    /// Maximum p-value to report
    #[arg(short = 'v', long = "pvalue", help_heading = "Output", default_value_t = 1.0, value_parser = validate_p_value)]
    pub max_p_value: f64,

    #[command(flatten)]
    pub sketch: SketchArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args)]
pub struct SketchCmdArgs {
    /// Sequence files to sketch
    #[arg(required = true, value_parser = clap::value_parser!(PathBuf))]
    pub inputs: Vec<PathBuf>,

    /// Inputs are files listing paths to sequence files, one per line
    #[arg(short, long, help_heading = "Inputs", default_value_t = false)]
    pub list: bool,

    /// Output sketch file (suffix .msh.json is added if missing)
    #[arg(short = 'o', long, help_heading = "Output", value_parser = clap::value_parser!(PathBuf))]
    pub output: PathBuf,

    #[command(flatten)]
    pub sketch: SketchArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args)]
pub struct CommonArgs {
    /// Number of threads to use
    #[arg(short, long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,

    /// Also write log messages to this file
    #[arg(long, value_parser = clap::value_parser!(PathBuf))]
    pub log: Option<PathBuf>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct SketchArgs {
    /// Length of k-mers to use [default: 21, 9 for --protein]
    #[arg(short, long, help_heading = "Sketching parameters", value_parser = validate_kmer_length)]
    pub kmer_length: Option<u8>,

    /// Number of min-hashes kept per sketch [default: 1000]
    #[arg(short = 's', long, help_heading = "Sketching parameters", value_parser = validate_sketch_size)]
    pub sketch_size: Option<u64>,

    /// Seed for the k-mer hash function [default: 42]
    #[arg(short = 'S', long, help_heading = "Sketching parameters")]
    pub seed: Option<u32>,

    /// Do not use canonical k-mers (the smaller of forward and reverse complement)
    #[arg(short, long, help_heading = "Sketching parameters", default_value_t = false)]
    pub noncanonical: bool,

    /// Preserve case in k-mers and alphabet
    #[arg(short = 'Z', long, help_heading = "Sketching parameters", default_value_t = false)]
    pub preserve_case: bool,

    /// Use the amino acid alphabet (implies --noncanonical)
    #[arg(short = 'a', long, help_heading = "Sketching parameters", default_value_t = false)]
    pub protein: bool,

    /// Alphabet to base hashes on (implies --noncanonical)
    #[arg(short = 'z', long, help_heading = "Sketching parameters")]
    pub alphabet: Option<String>,

    /// Inputs are reads; filter out k-mers seen fewer than --min-copies times
    #[arg(short, long, help_heading = "Sketching parameters", default_value_t = false)]
    pub reads: bool,

    /// Minimum copies of each k-mer required in reads mode [default: 2]
    #[arg(short, long, help_heading = "Sketching parameters")]
    pub min_copies: Option<u32>,
}

fn validate_kmer_length(k: &str) -> Result<u8, String> {
    let k: u8 = k
        .parse()
        .map_err(|_| format!("`{k}` isn't a valid k-mer length"))?;

    if !(1..=32).contains(&k) {
        return Err("k-mer length must be in the range [1, 32]".to_string());
    }

    Ok(k)
}

fn validate_sketch_size(size: &str) -> Result<u64, String> {
    let size: u64 = size
        .parse()
        .map_err(|_| format!("`{size}` isn't a valid sketch size"))?;

    if size == 0 {
        return Err("Sketch size must be at least 1".to_string());
    }

    Ok(size)
}

fn validate_p_value(p: &str) -> Result<f64, String> {
    let p: f64 = p
        .parse()
        .map_err(|_| format!("`{p}` isn't a valid p-value"))?;

    if !(0.0..=1.0).contains(&p) {
        return Err("p-value must be in the range [0, 1]".to_string());
    }

    Ok(p)
}

fn validate_threads(threads: &str) -> Result<usize, String> {
    let threads: usize = threads
        .parse()
        .map_err(|_| format!("`{threads}` isn't a valid value"))?;

    if !(1..=1024).contains(&threads) {
        return Err("Threads must be in the range [1, 1024]".to_string());
    }

    Ok(threads)
}

fn get_styles() -> clap::builder::Styles {
    let bold_white = anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White)));
    let bold_red = anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

    clap::builder::Styles::styled()
        .usage(bold_white)
        .header(bold_white)
        .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
        .invalid(bold_red)
        .error(bold_red)
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}
