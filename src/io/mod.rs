mod results;

pub use results::{load_outputs, save_outputs, save_pas_results};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Writes `value` as gzip-compressed JSON.
pub fn write_json_gz<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, value)
        .with_context(|| format!("Failed to serialize {:?}", path))?;
    encoder.finish().with_context(|| format!("Failed to finish {:?}", path))?;
    Ok(())
}

pub fn read_json_gz<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    serde_json::from_reader(decoder).with_context(|| format!("Failed to deserialize {:?}", path))
}

/// Writes `value` as gzip-compressed bincode.
pub fn write_bincode_gz<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    bincode::serialize_into(&mut encoder, value)
        .with_context(|| format!("Failed to serialize {:?}", path))?;
    encoder.finish().with_context(|| format!("Failed to finish {:?}", path))?;
    Ok(())
}

pub fn read_bincode_gz<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    bincode::deserialize_from(decoder).with_context(|| format!("Failed to deserialize {:?}", path))
}
