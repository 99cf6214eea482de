use crate::data::{Column, Frame};
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(anyhow::anyhow!("Cannot determine format of gzipped file {:?}", path))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(anyhow::anyhow!("Unsupported file format: {:?}", path)),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Loader for stay-level tabular files
#[derive(Debug, Clone, Default)]
pub struct FrameLoader;

impl FrameLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a frame from file, replacing missing and infinite values with 0
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Frame> {
        let path = path.as_ref();
        info!("Loading data from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let frame = if format.is_gzipped() {
            self.parse_frame(BufReader::new(GzDecoder::new(file)), format)
        } else {
            self.parse_frame(BufReader::new(file), format)
        }
        .with_context(|| format!("Failed to read {:?}", path))?;

        info!("Loaded {} rows x {} columns", frame.n_rows(), frame.n_cols());
        Ok(frame)
    }

    /// Parse a frame from any reader
    pub fn parse_frame<R: Read>(&self, reader: R, format: FileFormat) -> Result<Frame> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(|s| s.to_string())
            .collect();
        debug!("Headers: {:?}", headers);

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (line, result) in csv_reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Failed to parse CSV record at line {}", line + 2))?;
            for (col, value) in cells.iter_mut().zip(record.iter()) {
                col.push(value.trim().to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| build_column(name, values))
            .collect();
        Frame::new(columns)
    }
}

/// Type a raw column: numeric when every non-empty cell parses as a float
fn build_column(name: String, values: Vec<String>) -> Column {
    let is_numeric = values
        .iter()
        .all(|v| v.is_empty() || v.parse::<f64>().is_ok());

    if is_numeric {
        let parsed = values
            .iter()
            .map(|v| sanitize(v.parse::<f64>().unwrap_or(f64::NAN)))
            .collect();
        Column::numeric(name, parsed)
    } else {
        let filled = values
            .into_iter()
            .map(|v| if v.is_empty() { "0".to_string() } else { v })
            .collect();
        Column::text(name, filled)
    }
}

/// Missing and infinite values become 0
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
