//! The durable weather cache: one CSV row per (latitude, longitude, date).
//!
//! The file is read once when the store is opened. Every new record is appended
//! (and synced) before `insert` returns, so a crash never loses a finished
//! fetch. [`WeatherCacheStore::compact`] rewrites the file atomically with
//! exactly one row per key.

use crate::types::cache_key::CacheKey;
use crate::types::location::LatLon;
use crate::types::match_date::AnyMatchDate;
use crate::types::weather_record::{WeatherRecord, CACHE_COLUMNS};
use crate::weather_data::error::WeatherDataError;
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::{fs, task};

pub const WEATHER_CACHE_FILE_NAME: &str = "weather_cache.csv";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Result of [`WeatherCacheStore::get_or_fetch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheLookup {
    Hit(WeatherRecord),
    Fetched(WeatherRecord),
}

impl CacheLookup {
    pub fn record(&self) -> &WeatherRecord {
        match self {
            CacheLookup::Hit(record) | CacheLookup::Fetched(record) => record,
        }
    }

    pub fn into_record(self) -> WeatherRecord {
        match self {
            CacheLookup::Hit(record) | CacheLookup::Fetched(record) => record,
        }
    }

    pub fn was_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<WeatherRecord>,
    index: HashMap<CacheKey, usize>,
}

impl StoreState {
    /// Builds the state from file rows; later duplicates of a key are dropped.
    fn from_records(records: Vec<WeatherRecord>) -> (Self, usize) {
        let mut state = StoreState::default();
        let mut duplicates = 0;
        for record in records {
            if !state.push(record) {
                duplicates += 1;
            }
        }
        (state, duplicates)
    }

    fn push(&mut self, record: WeatherRecord) -> bool {
        match self.index.entry(record.key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(self.records.len());
                self.records.push(record);
                true
            }
        }
    }
}

pub struct WeatherCacheStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl WeatherCacheStore {
    /// Opens `weather_cache.csv` inside `cache_dir`.
    pub async fn open(cache_dir: &Path) -> Result<Self, WeatherDataError> {
        Self::open_file(cache_dir.join(WEATHER_CACHE_FILE_NAME)).await
    }

    /// Opens (or creates) the cache at `path`.
    ///
    /// A missing or empty file becomes a header-only file. Bytes after the last
    /// newline are left over from an interrupted append; they are dropped and cut
    /// from the file. A file that cannot be read or parsed is moved aside to
    /// `<path>.corrupt` and replaced by a header-only file; the store then
    /// starts empty.
    pub async fn open_file(path: PathBuf) -> Result<Self, WeatherDataError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| WeatherDataError::CacheDirCreation(parent.to_path_buf(), e))?;
        }

        let records = match fs::read(&path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating weather cache {}", path.display());
                Self::write_header(&path).await?;
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "Weather cache {} is unreadable, starting empty: {}",
                    path.display(),
                    e
                );
                Self::quarantine(&path).await?;
                Vec::new()
            }
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                Self::write_header(&path).await?;
                Vec::new()
            }
            Ok(mut bytes) => {
                // Every append ends in '\n'; anything after the last one is an interrupted write
                if let Some(end) = bytes.iter().rposition(|b| *b == b'\n') {
                    if end + 1 < bytes.len() {
                        let torn = bytes.split_off(end + 1);
                        warn!(
                            "Dropping incomplete last row of weather cache {}: {:?}",
                            path.display(),
                            String::from_utf8_lossy(&torn)
                        );
                        Self::truncate(&path, bytes.len() as u64).await?;
                    }
                }
                let header_only = !bytes.contains(&b'\n');
                let path_clone = path.clone();
                let parsed =
                    task::spawn_blocking(move || parse_cache_bytes(bytes, &path_clone)).await?;
                match parsed {
                    Ok(records) => {
                        if header_only {
                            Self::write_header(&path).await?;
                        }
                        records
                    }
                    Err(e) => {
                        warn!(
                            "Weather cache {} is malformed, starting empty: {}",
                            path.display(),
                            e
                        );
                        Self::quarantine(&path).await?;
                        Vec::new()
                    }
                }
            }
        };

        let (state, duplicates) = StoreState::from_records(records);
        if duplicates > 0 {
            warn!(
                "Weather cache {} contains {} duplicate rows; keeping the first of each",
                path.display(),
                duplicates
            );
        }
        info!(
            "Loaded {} weather records from {}",
            state.records.len(),
            path.display()
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every record, in insertion order.
    pub async fn records(&self) -> Vec<WeatherRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<WeatherRecord> {
        let state = self.state.lock().await;
        state.index.get(key).map(|&idx| state.records[idx])
    }

    /// Adds `record` and appends it to the backing file.
    ///
    /// Returns `false` without touching the file when the key is already present.
    pub async fn insert(&self, record: WeatherRecord) -> Result<bool, WeatherDataError> {
        let record = record.normalized();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match state.index.entry(record.key()) {
            Entry::Occupied(_) => {
                debug!("Weather cache already holds {}", record.key());
                Ok(false)
            }
            Entry::Vacant(entry) => {
                self.append_record(&record).await?;
                entry.insert(state.records.len());
                state.records.push(record);
                Ok(true)
            }
        }
    }

    /// Returns the cached record for `key`, or runs `fetch` and stores its result.
    ///
    /// `fetch` runs without holding the store lock. If another task stored the
    /// same key in the meantime, that record wins and nothing is written.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> Result<CacheLookup, WeatherDataError>
    where
        F: FnOnce(CacheKey) -> Fut,
        Fut: Future<Output = Result<WeatherRecord, WeatherDataError>>,
    {
        // --- Fast path ---
        if let Some(record) = self.lookup(&key).await {
            debug!("Weather cache hit for {}", key);
            return Ok(CacheLookup::Hit(record));
        }

        // --- Slow path: fetch outside the lock ---
        debug!("Weather cache miss for {}", key);
        let fetched = fetch(key).await?;
        let fetched = WeatherRecord {
            latitude: key.latitude(),
            longitude: key.longitude(),
            date: key.date(),
            ..fetched
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match state.index.entry(key) {
            // Someone else stored it while we were fetching
            Entry::Occupied(entry) => Ok(CacheLookup::Fetched(state.records[*entry.get()])),
            Entry::Vacant(entry) => {
                self.append_record(&fetched).await?;
                entry.insert(state.records.len());
                state.records.push(fetched);
                Ok(CacheLookup::Fetched(fetched))
            }
        }
    }

    /// Rewrites the backing file with one row per key, atomically.
    pub async fn compact(&self) -> Result<(), WeatherDataError> {
        let state = self.state.lock().await;
        let bytes = encode_records(&state.records, true)
            .map_err(|e| WeatherDataError::CacheEncode(self.path.clone(), e))?;
        let count = state.records.len();
        Self::replace_file(&self.path, bytes).await?;
        info!("Compacted weather cache {} ({} records)", self.path.display(), count);
        Ok(())
    }

    async fn append_record(&self, record: &WeatherRecord) -> Result<(), WeatherDataError> {
        let line = encode_records(std::slice::from_ref(record), false)
            .map_err(|e| WeatherDataError::CacheEncode(self.path.clone(), e))?;
        Self::append_bytes(&self.path, &line).await
    }

    async fn append_bytes(path: &Path, bytes: &[u8]) -> Result<(), WeatherDataError> {
        let write = async {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(bytes).await?;
            file.sync_data().await
        };
        write
            .await
            .map_err(|e| WeatherDataError::CacheWrite(path.to_path_buf(), e))
    }

    async fn truncate(path: &Path, len: u64) -> Result<(), WeatherDataError> {
        let truncate = async {
            let file = fs::OpenOptions::new().write(true).open(path).await?;
            file.set_len(len).await?;
            file.sync_data().await
        };
        truncate
            .await
            .map_err(|e| WeatherDataError::CacheWrite(path.to_path_buf(), e))
    }

    async fn write_header(path: &Path) -> Result<(), WeatherDataError> {
        Self::replace_file(path, header_line().into_bytes()).await
    }

    async fn replace_file(path: &Path, bytes: Vec<u8>) -> Result<(), WeatherDataError> {
        let path_buf = path.to_path_buf();
        task::spawn_blocking(move || {
            let dir = path_buf
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let write = || -> std::io::Result<()> {
                let mut temp_file = NamedTempFile::new_in(dir)?;
                temp_file.write_all(&bytes)?;
                temp_file.as_file().sync_all()?;
                temp_file.persist(&path_buf).map_err(|e| e.error)?;
                Ok(())
            };
            write().map_err(|e| WeatherDataError::CacheWrite(path_buf.clone(), e))
        })
        .await?
    }

    /// Moves an unusable cache file aside and starts a fresh one.
    async fn quarantine(path: &Path) -> Result<(), WeatherDataError> {
        let mut corrupt = path.as_os_str().to_owned();
        corrupt.push(".corrupt");
        let corrupt = PathBuf::from(corrupt);
        fs::rename(path, &corrupt)
            .await
            .map_err(|e| WeatherDataError::CacheWrite(corrupt.clone(), e))?;
        warn!("Moved unusable weather cache to {}", corrupt.display());
        Self::write_header(path).await
    }
}

fn header_line() -> String {
    format!("{}\n", CACHE_COLUMNS.join(","))
}

fn records_to_frame(records: &[WeatherRecord]) -> PolarsResult<DataFrame> {
    polars::df!(
        "latitude" => records.iter().map(|r| r.latitude).collect::<Vec<f64>>(),
        "longitude" => records.iter().map(|r| r.longitude).collect::<Vec<f64>>(),
        "date" => records
            .iter()
            .map(|r| r.date.format(DATE_FORMAT).to_string())
            .collect::<Vec<String>>(),
        "temperature_max" => records.iter().map(|r| r.temperature_max).collect::<Vec<Option<f64>>>(),
        "temperature_min" => records.iter().map(|r| r.temperature_min).collect::<Vec<Option<f64>>>(),
        "precipitation_sum" => records.iter().map(|r| r.precipitation_sum).collect::<Vec<Option<f64>>>(),
        "wind_speed_max" => records.iter().map(|r| r.wind_speed_max).collect::<Vec<Option<f64>>>(),
    )
}

fn encode_records(records: &[WeatherRecord], include_header: bool) -> PolarsResult<Vec<u8>> {
    if records.is_empty() {
        return Ok(if include_header {
            header_line().into_bytes()
        } else {
            Vec::new()
        });
    }
    let mut df = records_to_frame(records)?;
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(include_header)
        .finish(&mut df)?;
    Ok(buf)
}

/// Parses the full cache file. Rows with a missing or invalid key are skipped.
fn parse_cache_bytes(bytes: Vec<u8>, path: &Path) -> Result<Vec<WeatherRecord>, WeatherDataError> {
    let mut lines = bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace));
    let header = lines.next().map(String::from_utf8_lossy).unwrap_or_default();
    let header_columns: Vec<&str> = header.trim().split(',').map(str::trim).collect();
    if let Some(missing) = CACHE_COLUMNS.iter().find(|c| !header_columns.contains(c)) {
        return Err(WeatherDataError::CacheSchema {
            path: path.to_path_buf(),
            column: missing.to_string(),
        });
    }
    if lines.next().is_none() {
        return Ok(Vec::new());
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| WeatherDataError::CacheParse(path.to_path_buf(), e))?;

    let (records, skipped) =
        frame_to_records(&df).map_err(|e| WeatherDataError::CacheParse(path.to_path_buf(), e))?;
    if skipped > 0 {
        warn!(
            "Skipped {} weather cache rows with a missing or invalid key in {}",
            skipped,
            path.display()
        );
    }
    Ok(records)
}

fn frame_to_records(df: &DataFrame) -> PolarsResult<(Vec<WeatherRecord>, usize)> {
    let float_column = |name: &str| -> PolarsResult<Float64Chunked> {
        Ok(df.column(name)?.cast(&DataType::Float64)?.f64()?.clone())
    };
    let latitude = float_column("latitude")?;
    let longitude = float_column("longitude")?;
    let temperature_max = float_column("temperature_max")?;
    let temperature_min = float_column("temperature_min")?;
    let precipitation_sum = float_column("precipitation_sum")?;
    let wind_speed_max = float_column("wind_speed_max")?;
    let date_column = df.column("date")?.cast(&DataType::String)?;
    let dates = date_column.str()?;

    let mut records = Vec::with_capacity(df.height());
    let mut skipped = 0;
    for idx in 0..df.height() {
        let lat = latitude.get(idx);
        let lon = longitude.get(idx);
        let date = dates.get(idx).and_then(|d| d.to_match_date());
        let (Some(lat), Some(lon), Some(date)) = (lat, lon, date) else {
            skipped += 1;
            continue;
        };
        if !LatLon(lat, lon).is_valid() {
            skipped += 1;
            continue;
        }
        let record = WeatherRecord {
            latitude: lat,
            longitude: lon,
            date,
            temperature_max: temperature_max.get(idx),
            temperature_min: temperature_min.get(idx),
            precipitation_sum: precipitation_sum.get(idx),
            wind_speed_max: wind_speed_max.get(idx),
        };
        records.push(record.normalized());
    }
    Ok((records, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record(lat: f64, lon: f64, day: u32) -> WeatherRecord {
        WeatherRecord {
            latitude: lat,
            longitude: lon,
            date: NaiveDate::from_ymd_opt(2023, 7, day).unwrap(),
            temperature_max: Some(22.4),
            temperature_min: Some(13.1),
            precipitation_sum: Some(0.0),
            wind_speed_max: Some(18.7),
        }
    }

    fn cache_contents(store: &WeatherCacheStore) -> String {
        std::fs::read_to_string(store.path()).unwrap()
    }

    #[tokio::test]
    async fn test_new_file_has_only_header() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let store = WeatherCacheStore::open(dir.path()).await?;
        assert!(store.is_empty().await);
        assert_eq!(
            cache_contents(&store),
            "latitude,longitude,date,temperature_max,temperature_min,precipitation_sum,wind_speed_max\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_is_idempotent() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let store = WeatherCacheStore::open(dir.path()).await?;
        let rec = record(51.433, -0.214, 10);

        assert!(store.insert(rec).await?);
        let first = store.lookup(&rec.key()).await;
        let second = store.lookup(&rec.key()).await;
        assert_eq!(first, Some(rec));
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_one_entry() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let store = WeatherCacheStore::open(dir.path()).await?;
        let rec = record(51.433, -0.214, 10);

        assert!(store.insert(rec).await?);
        let drifted = WeatherRecord {
            latitude: 51.4331,
            temperature_max: Some(99.0),
            ..rec
        };
        assert!(!store.insert(drifted).await?);
        assert_eq!(store.len().await, 1);
        assert_eq!(cache_contents(&store).lines().count(), 2);
        assert_eq!(store.lookup(&rec.key()).await, Some(rec));
        Ok(())
    }

    #[tokio::test]
    async fn test_store_only_grows() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let store = WeatherCacheStore::open(dir.path()).await?;
        let mut last = store.len().await;
        for rec in [
            record(51.433, -0.214, 10),
            record(51.433, -0.214, 10),
            record(51.433, -0.214, 11),
            record(48.847, 2.249, 11),
        ] {
            store.insert(rec).await?;
            let now = store.len().await;
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_reload_round_trip() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let with_gap = WeatherRecord {
            precipitation_sum: None,
            ..record(-37.82, 144.979, 12)
        };
        let awkward = WeatherRecord {
            temperature_max: Some(0.1 + 0.2),
            ..record(40.749, -73.846, 13)
        };
        {
            let store = WeatherCacheStore::open(dir.path()).await?;
            store.insert(record(51.433, -0.214, 10)).await?;
            store.insert(with_gap).await?;
            store.insert(awkward).await?;
        }

        let reloaded = WeatherCacheStore::open(dir.path()).await?;
        assert_eq!(
            reloaded.records().await,
            vec![record(51.433, -0.214, 10), with_gap, awkward]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_file_is_moved_aside() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WEATHER_CACHE_FILE_NAME);
        std::fs::write(&path, "this is,not a\nweather,cache\n").unwrap();

        let store = WeatherCacheStore::open(dir.path()).await?;
        assert!(store.is_empty().await);
        assert!(dir.path().join("weather_cache.csv.corrupt").exists());
        assert!(cache_contents(&store).starts_with("latitude,longitude,date"));

        // The fresh file accepts new rows
        store.insert(record(51.433, -0.214, 10)).await?;
        assert_eq!(WeatherCacheStore::open(dir.path()).await?.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_file_is_reinitialised() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WEATHER_CACHE_FILE_NAME);
        std::fs::write(&path, "").unwrap();

        let store = WeatherCacheStore::open(dir.path()).await?;
        assert!(store.is_empty().await);
        assert!(!dir.path().join("weather_cache.csv.corrupt").exists());
        assert!(cache_contents(&store).starts_with("latitude,"));
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_file_with_bad_rows_and_duplicates() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WEATHER_CACHE_FILE_NAME);
        std::fs::write(
            &path,
            "latitude,longitude,date,temperature_max,temperature_min,precipitation_sum,wind_speed_max\n\
             51.4338,-0.2142,2023-07-10,22.4,13.1,0,18.7\n\
             ,-0.2142,2023-07-11,22.4,13.1,0,18.7\n\
             51.4338,-0.2142,2023-07-10,1,1,1,1\n\
             48.847,2.249,2023-06-01 00:00:00,25,15,,10\n",
        )
        .unwrap();

        let store = WeatherCacheStore::open(dir.path()).await?;
        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].latitude, 51.434);
        assert_eq!(records[0].temperature_max, Some(22.4));
        assert_eq!(records[1].precipitation_sum, None);

        store.insert(record(40.749, -73.846, 10)).await?;
        assert_eq!(WeatherCacheStore::open(dir.path()).await?.len().await, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_incomplete_last_row_is_dropped() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WEATHER_CACHE_FILE_NAME);
        std::fs::write(
            &path,
            "latitude,longitude,date,temperature_max,temperature_min,precipitation_sum,wind_speed_max\n\
             51.433,-0.214,2023-07-10,22.4,13.1,0.0,18.7\n\
             48.847,2.249,2023-06-04,27.9,1",
        )
        .unwrap();
        let interrupted = CacheKey::new(
            LatLon(48.847, 2.249),
            NaiveDate::from_ymd_opt(2023, 6, 4).unwrap(),
        );

        let store = WeatherCacheStore::open(dir.path()).await?;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.lookup(&interrupted).await, None);
        let contents = cache_contents(&store);
        assert!(contents.ends_with("18.7\n"));
        assert_eq!(contents.lines().count(), 2);

        // The key can be fetched again and is stored whole
        let refetched =
            WeatherRecord::from_key(interrupted, Some(27.9), Some(16.2), Some(0.0), Some(9.4));
        assert!(store.insert(refetched).await?);
        let reloaded = WeatherCacheStore::open(dir.path()).await?;
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(reloaded.lookup(&interrupted).await, Some(refetched));
        Ok(())
    }

    #[tokio::test]
    async fn test_header_without_newline_is_kept_empty() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WEATHER_CACHE_FILE_NAME);
        std::fs::write(
            &path,
            "latitude,longitude,date,temperature_max,temperature_min,precipitation_sum,wind_speed_max",
        )
        .unwrap();

        let store = WeatherCacheStore::open(dir.path()).await?;
        assert!(store.is_empty().await);
        store.insert(record(51.433, -0.214, 10)).await?;
        assert_eq!(WeatherCacheStore::open(dir.path()).await?.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_compact_rewrites_one_row_per_key() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WEATHER_CACHE_FILE_NAME);
        std::fs::write(
            &path,
            "latitude,longitude,date,temperature_max,temperature_min,precipitation_sum,wind_speed_max\n\
             51.433,-0.214,2023-07-10,22.4,13.1,0.0,18.7\n\
             51.433,-0.214,2023-07-10,22.4,13.1,0.0,18.7\n",
        )
        .unwrap();

        let store = WeatherCacheStore::open(dir.path()).await?;
        store.compact().await?;
        assert_eq!(cache_contents(&store).lines().count(), 2);
        assert_eq!(WeatherCacheStore::open(dir.path()).await?.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_or_fetch_fetches_once() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let store = WeatherCacheStore::open(dir.path()).await?;
        let key = record(51.433, -0.214, 10).key();
        let calls = AtomicUsize::new(0);

        let fetch = |k: CacheKey| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(WeatherRecord::from_key(k, Some(20.0), None, None, None)) }
        };
        let first = store.get_or_fetch(key, fetch).await?;
        let second = store.get_or_fetch(key, fetch).await?;

        assert!(!first.was_hit());
        assert!(second.was_hit());
        assert_eq!(first.record(), second.record());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_misses_converge() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(WeatherCacheStore::open(dir.path()).await?);
        let key = record(51.433, -0.214, 10).key();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .get_or_fetch(key, |k| async move {
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok(WeatherRecord::from_key(k, Some(i as f64), None, None, None))
                    })
                    .await
            }));
        }
        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await??.into_record());
        }

        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len().await, 1);
        assert_eq!(cache_contents(&store).lines().count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_fetch_stores_nothing() -> Result<(), WeatherDataError> {
        let dir = tempfile::tempdir().unwrap();
        let store = WeatherCacheStore::open(dir.path()).await?;
        let key = record(51.433, -0.214, 10).key();

        let result = store
            .get_or_fetch(key, |_| async {
                Err(WeatherDataError::EmptyDailyData {
                    url: "http://archive".to_string(),
                })
            })
            .await;
        assert!(result.is_err());
        assert!(store.is_empty().await);
        Ok(())
    }
}
