use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::matrix::DistanceMatrix;
use crate::sketch::SKETCH_SUFFIX;

/// Extracts an identifier from a sequence file path by removing the directory and
/// everything from the first `.` of the file name onward.
pub fn extract_name(file_name: &str) -> &str {
    let left = file_name.rfind('/').map_or(0, |idx| idx + 1);
    let name = &file_name[left..];

    match name.find('.') {
        Some(right) => &name[..right],
        None => name,
    }
}

pub fn is_sketch_file(path: &Path) -> bool {
    path.to_string_lossy().ends_with(SKETCH_SUFFIX)
}

/// Read a file listing one input path per line.
pub fn read_path_list(list_file: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(list_file)
        .with_context(|| format!("Failed to open list file {}", list_file.display()))?;

    let mut paths = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            paths.push(PathBuf::from(line));
        }
    }

    Ok(paths)
}

/// Significant digits written for each distance.
const DISTANCE_PRECISION: i32 = 6;

/// Format a distance like C's `%g`: six significant digits, trailing zeros dropped,
/// and exponent notation for values below 1e-4 or at least 1e6.
pub fn format_distance(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }

    // the exponent after rounding to the requested precision picks the notation
    let scientific = format!("{:.*e}", (DISTANCE_PRECISION - 1) as usize, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= DISTANCE_PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exponent.abs())
    } else {
        let decimals = (DISTANCE_PRECISION - 1 - exponent) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Write a PHYLIP-style distance matrix: the entry count, then one labelled row per entry.
pub fn write_phylip<W: Write>(writer: &mut W, names: &[&str], matrix: &DistanceMatrix) -> Result<()> {
    writeln!(writer, "{}", matrix.len())?;

    for (i, name) in names.iter().enumerate() {
        write!(writer, "{}", extract_name(name))?;
        for distance in matrix.row(i) {
            write!(writer, " {}", format_distance(*distance))?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_extract_name() {
        assert_eq!(extract_name("/data/genomes/ecoli.fna"), "ecoli");
        assert_eq!(extract_name("sample"), "sample");
        assert_eq!(extract_name("genomes/sample.fna.gz"), "sample");
        assert_eq!(extract_name("/data/v1.2/genome"), "genome");
        assert_eq!(extract_name("dir/"), "");
    }

    #[test]
    fn test_is_sketch_file() {
        assert!(is_sketch_file(Path::new("/tmp/all.msh.json")));
        assert!(!is_sketch_file(Path::new("/tmp/genome.fna")));
    }

    #[test]
    fn test_read_path_list() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        write(temp_file.path(), "/path/to/genome1.fna\n\n  /path/to/genome2.fna  \n")?;

        let paths = read_path_list(temp_file.path())?;
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/path/to/genome1.fna"),
                PathBuf::from("/path/to/genome2.fna")
            ]
        );

        assert!(read_path_list(Path::new("/no/such/list.txt")).is_err());
        Ok(())
    }

    #[test]
    fn test_write_phylip() -> Result<()> {
        let mut matrix = DistanceMatrix::new(4);
        matrix.set_symmetric(1, 0, 0.25);
        matrix.set_symmetric(2, 0, 1.0);
        matrix.set_symmetric(2, 1, 0.0125);
        matrix.set_symmetric(3, 0, -(0.6f64 / 1.3).ln() / 21.0);
        matrix.set_symmetric(3, 1, 1.5e-7);

        let mut out = Vec::new();
        write_phylip(&mut out, &["/data/a.fna", "b", "x/c.fa.gz", "d"], &matrix)?;

        let expected = "4\n\
                        a 0 0.25 1 0.0368186\n\
                        b 0.25 0 0.0125 1.5e-07\n\
                        c 1 0.0125 0 0\n\
                        d 0.0368186 1.5e-07 0 0\n";
        assert_eq!(String::from_utf8(out)?, expected);
        Ok(())
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.0), "0");
        assert_eq!(format_distance(1.0), "1");
        assert_eq!(format_distance(0.25), "0.25");
        assert_eq!(format_distance(0.036818566106356275), "0.0368186");
        assert_eq!(format_distance(0.00012345678), "0.000123457");
        assert_eq!(format_distance(1.5e-7), "1.5e-07");
        assert_eq!(format_distance(0.000099999999), "0.0001");
        assert_eq!(format_distance(2.0 / 3.0), "0.666667");
        assert_eq!(format_distance(123456789.0), "1.23457e+08");
    }
}
