//! Main entry point for the sketchdist application.
//!
//! This file handles command-line parsing, logging setup and input resolution, and
//! orchestrates the two commands: `sketch`, which writes bottom-k sketches of sequence
//! files to disk, and `matrix`, which estimates Mash distances between all pairs of
//! inputs and writes them as a PHYLIP-style distance matrix.

use std::env;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Parser;
use log::info;

use crate::cli::{Cli, Command, MatrixArgs, SketchArgs, SketchCmdArgs};
use crate::io_utils::{is_sketch_file, read_path_list, write_phylip};
use crate::logging::setup_logger;
use crate::matrix::build_matrix;
use crate::sketch::{sketch_files, Sketch, SKETCH_SUFFIX};
use crate::sketch_params::SketchParams;

mod cli;
pub mod compare;
pub mod hashing;
pub mod io_utils;
pub mod logging;
pub mod matrix;
pub mod progress;
pub mod significance;
pub mod sketch;
pub mod sketch_params;

/// Common initialization required by all commands.
fn init(threads: usize) -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    info!("{} v{}", env!("CARGO_PKG_NAME"), VERSION);
    info!("{}", env::args().collect::<Vec<String>>().join(" "));

    info!("Using {} threads.", threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    Ok(())
}

/// Expand list files into the paths they contain, if requested.
fn resolve_inputs(inputs: &[PathBuf], list: bool) -> Result<Vec<PathBuf>> {
    if !list {
        return Ok(inputs.to_vec());
    }

    let mut paths = Vec::new();
    for list_file in inputs {
        paths.extend(read_path_list(list_file)?);
    }

    if paths.is_empty() {
        bail!("No input paths found in list files.");
    }

    Ok(paths)
}

/// Load pre-built sketches or sketch sequence files, returning the sketch to compare.
fn load_or_sketch(paths: &[PathBuf], sketch_args: &SketchArgs) -> Result<Sketch> {
    let prebuilt = paths.first().is_some_and(|path| is_sketch_file(path));

    if prebuilt {
        if let Some(path) = paths.iter().find(|path| !is_sketch_file(path)) {
            bail!(
                "Cannot mix sketch files and sequence files; {} is not a sketch ({}).",
                path.display(),
                SKETCH_SUFFIX
            );
        }

        info!("Loading {} sketch files.", paths.len());
        let mut sketch = Sketch::load(&paths[0])?;
        for path in &paths[1..] {
            sketch.merge(Sketch::load(path)?)?;
        }

        // reject overrides of inherited parameters before comparing anything
        sketch.params().inherit(sketch_args)?;
        Ok(sketch)
    } else {
        if let Some(path) = paths.iter().find(|path| is_sketch_file(path)) {
            bail!(
                "Cannot mix sketch files and sequence files; {} is a sketch.",
                path.display()
            );
        }

        let sketch_params = SketchParams::from_args(sketch_args)?;
        info!(
            "Sketching {} files (k = {}, sketch size = {}).",
            paths.len(),
            sketch_params.k(),
            sketch_params.sketch_size()
        );
        sketch_files(paths, &sketch_params)
    }
}

fn run_matrix(args: &MatrixArgs) -> Result<()> {
    let paths = resolve_inputs(&args.inputs, args.list)?;
    let sketch = load_or_sketch(&paths, &args.sketch)?;
    if sketch.is_empty() {
        bail!("No sketches to compare.");
    }

    let matrix = build_matrix(&sketch, args.common.threads, args.max_p_value)?;

    let names: Vec<&str> = sketch.entries().iter().map(|entry| entry.name.as_str()).collect();
    match &args.output {
        Some(output) => {
            info!("Writing distance matrix to {}", output.display());
            let mut writer = BufWriter::new(File::create(output)?);
            write_phylip(&mut writer, &names, &matrix)?;
        }
        None => {
            let mut writer = BufWriter::new(io::stdout().lock());
            write_phylip(&mut writer, &names, &matrix)?;
        }
    }

    Ok(())
}

fn run_sketch(args: &SketchCmdArgs) -> Result<()> {
    let paths = resolve_inputs(&args.inputs, args.list)?;
    if let Some(path) = paths.iter().find(|path| is_sketch_file(path)) {
        bail!("{} is already a sketch.", path.display());
    }

    let sketch_params = SketchParams::from_args(&args.sketch)?;
    info!(
        "Sketching {} files (k = {}, sketch size = {}).",
        paths.len(),
        sketch_params.k(),
        sketch_params.sketch_size()
    );
    let sketch = sketch_files(&paths, &sketch_params)?;

    let output = sketch_output_path(&args.output);
    info!("Writing {} sketches to {}", sketch.len(), output.display());
    sketch.save(&output)
}

fn sketch_output_path(output: &Path) -> PathBuf {
    if is_sketch_file(output) {
        output.to_path_buf()
    } else {
        PathBuf::from(format!("{}{}", output.display(), SKETCH_SUFFIX))
    }
}

fn main() -> Result<()> {
    let start = Instant::now();

    let args = Cli::parse();

    let common = match &args.command {
        Command::Matrix(args) => &args.common,
        Command::Sketch(args) => &args.common,
    };

    setup_logger(common.log.as_deref())?;

    init(common.threads)?;

    match &args.command {
        Command::Matrix(args) => run_matrix(args)?,
        Command::Sketch(args) => run_sketch(args)?,
    }

    info!("Elapsed time (sec): {:.2}", start.elapsed().as_secs_f32());
    info!("Done.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_list_inputs() -> Result<()> {
        let temp_dir = tempdir()?;
        let list1 = temp_dir.path().join("list1.txt");
        let list2 = temp_dir.path().join("list2.txt");
        write(&list1, "/path/to/genome1.fna\n/path/to/genome2.fna\n")?;
        write(&list2, "/path/to/genome3.fna\n")?;

        let paths = resolve_inputs(&[list1.clone(), list2], true)?;
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[2], PathBuf::from("/path/to/genome3.fna"));

        let paths = resolve_inputs(&[list1.clone()], false)?;
        assert_eq!(paths, vec![list1]);

        Ok(())
    }

    #[test]
    fn test_sketch_output_path() {
        assert_eq!(sketch_output_path(Path::new("out")), PathBuf::from("out.msh.json"));
        assert_eq!(sketch_output_path(Path::new("out.msh.json")), PathBuf::from("out.msh.json"));
    }

    #[test]
    fn test_prebuilt_sketch_rejects_overrides() -> Result<()> {
        let temp_dir = tempdir()?;
        let fasta = temp_dir.path().join("ecoli.fna");
        write(&fasta, ">chr\nACGTACGGTACCATGACGTTAGCATGCA\n")?;

        let sketch = sketch_files(&[fasta.clone()], &SketchParams::new(9, 100)?)?;
        let sketch_path = temp_dir.path().join("ecoli.msh.json");
        sketch.save(&sketch_path)?;

        let loaded = load_or_sketch(&[sketch_path.clone()], &SketchArgs::default())?;
        assert_eq!(loaded, sketch);

        let overrides = SketchArgs {
            kmer_length: Some(21),
            ..Default::default()
        };
        assert!(load_or_sketch(&[sketch_path.clone()], &overrides).is_err());

        // sketches and sequence files cannot be mixed
        assert!(load_or_sketch(&[sketch_path.clone(), fasta.clone()], &SketchArgs::default()).is_err());
        assert!(load_or_sketch(&[fasta, sketch_path], &SketchArgs::default()).is_err());

        Ok(())
    }

    #[test]
    fn test_matrix_from_sequence_files() -> Result<()> {
        let temp_dir = tempdir()?;
        let genome = "ACGTTGCATGCATGCCGATAGCTAGCTAGGATCCGATCGATGCTAGCTAGCTGACTGATCGATGCAT";
        let other = "TTGACCAGTAGGCATTACGGATCAAGTCCGGATACCAGGTTTAGCAACGGTAGCCATAGGACCTTA";

        let path_a = temp_dir.path().join("a.fna");
        let path_b = temp_dir.path().join("b.fa");
        let path_c = temp_dir.path().join("c.fasta");
        write(&path_a, format!(">a\n{genome}\n"))?;
        write(&path_b, format!(">b\n{genome}\n"))?;
        write(&path_c, format!(">c\n{other}\n"))?;

        let sketch = load_or_sketch(&[path_a, path_b, path_c], &SketchArgs {
            kmer_length: Some(11),
            ..Default::default()
        })?;
        let matrix = build_matrix(&sketch, 2, 1.0)?;

        let names: Vec<&str> = sketch.entries().iter().map(|entry| entry.name.as_str()).collect();
        let mut out = Vec::new();
        write_phylip(&mut out, &names, &matrix)?;

        let out = String::from_utf8(out)?;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "3");
        assert!(lines[1].starts_with("a 0 0 "));
        assert!(lines[2].starts_with("b 0 0 "));
        assert!(lines[3].starts_with("c "));
        assert_eq!(matrix.row(0), matrix.row(1));

        Ok(())
    }
}
