use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::{SerReader, SerWriter}, prelude::{CsvReader, CsvWriter}};

/// Writes a Polars DataFrame to a CSV file at `path`.
pub(crate) fn write_to_csv_file(path: &Path, df: &DataFrame) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    let writer: BufWriter<File> = BufWriter::new(file);
    CsvWriter::new(writer).finish(&mut df.clone())?;
    Ok(())
}

/// Reads a CSV file from `path` into a Polars DataFrame.
pub(crate) fn read_from_csv_file(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;
    let df = CsvReader::new(file)
        .finish()
        .with_context(|| format!("Failed to parse CSV file: {}", path.display()))?;
    Ok(df)
}
