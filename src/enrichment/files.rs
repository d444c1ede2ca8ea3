//! Reading match CSV files and writing their enriched copies.

use crate::error::TennisWeatherError;
use log::{debug, info};
use polars::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::{fs, task};

/// File name prefix of the singles match files in the `tennis_atp` layout.
pub const DEFAULT_FILE_PREFIX: &str = "atp_matches_";
pub const OUTPUT_SUFFIX: &str = "_weather.csv";

/// `<output_dir>/<input stem>_weather.csv`
pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "matches".to_string());
    output_dir.join(format!("{stem}{OUTPUT_SUFFIX}"))
}

pub async fn read_match_file(path: &Path) -> Result<DataFrame, TennisWeatherError> {
    let path_buf = path.to_path_buf();
    task::spawn_blocking(move || {
        // Infer from every row: seed columns mix integers with entry codes like "Q"
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .try_into_reader_with_file_path(Some(path_buf.clone()))
            .and_then(|reader| reader.finish())
            .map_err(|e| TennisWeatherError::InputRead(path_buf, e))
    })
    .await?
}

/// Writes `df` to `path` through a temporary file in the same directory.
pub async fn write_enriched_file(mut df: DataFrame, path: &Path) -> Result<(), TennisWeatherError> {
    let path_buf = path.to_path_buf();
    task::spawn_blocking(move || {
        let dir = path_buf
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(dir)
            .map_err(|e| TennisWeatherError::OutputWrite(path_buf.clone(), e))?;
        CsvWriter::new(&mut temp_file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| TennisWeatherError::OutputEncode(path_buf.clone(), e))?;
        temp_file
            .flush()
            .map_err(|e| TennisWeatherError::OutputWrite(path_buf.clone(), e))?;
        temp_file
            .persist(&path_buf)
            .map_err(|e| TennisWeatherError::OutputWrite(path_buf.clone(), e.error))?;
        Ok::<(), TennisWeatherError>(())
    })
    .await??;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// CSV files in `dir` whose name starts with `prefix`, sorted by name.
/// Previously written `*_weather.csv` outputs are left out.
pub async fn list_match_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, TennisWeatherError> {
    let map_err = |e| TennisWeatherError::InputDirectory(dir.to_path_buf(), e);
    let mut entries = fs::read_dir(dir).await.map_err(map_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(map_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) || !name.ends_with(".csv") || name.ends_with(OUTPUT_SUFFIX) {
            continue;
        }
        if entry.file_type().await.map_err(map_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    info!(
        "Found {} match files with prefix '{}' in {}",
        files.len(),
        prefix,
        dir.display()
    );
    Ok(files)
}
