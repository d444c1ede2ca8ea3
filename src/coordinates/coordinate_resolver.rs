use crate::coordinates::error::CoordinateError;
use crate::coordinates::geocoder::NominatimGeocoder;
use crate::types::location::LatLon;
use bincode::config::{Configuration, Fixint, LittleEndian};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

const COORDINATE_CACHE_FILE_NAME: &str = "tournament_coordinates.bin";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// Venues of the four majors. These are always known and never replaced by a
/// geocoded value.
pub const SEED_COORDINATES: [(&str, LatLon); 4] = [
    ("Australian Open", LatLon(-37.820, 144.979)),
    ("Roland Garros", LatLon(48.847, 2.249)),
    ("Wimbledon", LatLon(51.433, -0.214)),
    ("US Open", LatLon(40.749, -73.846)),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCoordinate {
    name: String,
    latitude: f64,
    longitude: f64,
    /// Unix seconds.
    resolved_at: i64,
}

#[derive(Debug, Clone, Copy)]
struct KnownCoordinate {
    location: LatLon,
    /// `None` for seeds.
    resolved_at: Option<i64>,
}

#[derive(Debug, Default)]
struct CoordinateTable {
    known: HashMap<String, KnownCoordinate>,
    /// Names the geocoder could not place during this run.
    unresolved: HashSet<String>,
}

impl CoordinateTable {
    fn seeded() -> Self {
        let known = SEED_COORDINATES
            .iter()
            .map(|(name, location)| {
                (
                    name.to_string(),
                    KnownCoordinate {
                        location: *location,
                        resolved_at: None,
                    },
                )
            })
            .collect();
        Self {
            known,
            unresolved: HashSet::new(),
        }
    }

    fn geocoded_entries(&self) -> Vec<PersistedCoordinate> {
        let mut entries: Vec<PersistedCoordinate> = self
            .known
            .iter()
            .filter_map(|(name, known)| {
                known.resolved_at.map(|resolved_at| PersistedCoordinate {
                    name: name.clone(),
                    latitude: known.location.0,
                    longitude: known.location.1,
                    resolved_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

/// Maps tournament names to venue coordinates.
///
/// Lookups go to the in-memory table first (seeded with the majors and any
/// coordinates geocoded in earlier runs that have not expired), then to the
/// geocoder. The table only grows: an existing entry is never overwritten.
pub struct CoordinateResolver {
    geocoder: NominatimGeocoder,
    cache_file: PathBuf,
    table: Mutex<CoordinateTable>,
    persist_lock: Mutex<()>,
}

impl CoordinateResolver {
    /// Creates a resolver whose geocoded entries are persisted in `cache_dir`.
    ///
    /// Entries older than `ttl` are dropped while loading. A missing or
    /// unreadable coordinate file is not an error; the resolver starts from the
    /// seed table.
    pub async fn new(cache_dir: &Path, geocoder: NominatimGeocoder, ttl: Duration) -> Self {
        let cache_file = cache_dir.join(COORDINATE_CACHE_FILE_NAME);
        let mut table = CoordinateTable::seeded();

        if cache_file.exists() {
            let path_clone = cache_file.clone();
            let loaded =
                tokio::task::spawn_blocking(move || Self::get_cached_coordinates(&path_clone))
                    .await
                    .map_err(CoordinateError::from)
                    .and_then(|result| result);
            match loaded {
                Ok(entries) => Self::merge_persisted(&mut table, entries, ttl),
                Err(e) => warn!(
                    "Ignoring unreadable coordinate cache {}: {}",
                    cache_file.display(),
                    e
                ),
            }
        }

        Self {
            geocoder,
            cache_file,
            table: Mutex::new(table),
            persist_lock: Mutex::new(()),
        }
    }

    fn merge_persisted(table: &mut CoordinateTable, entries: Vec<PersistedCoordinate>, ttl: Duration) {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let mut loaded = 0usize;
        let mut expired = 0usize;

        for entry in entries {
            let location = LatLon(entry.latitude, entry.longitude);
            if !location.is_valid() {
                continue;
            }
            if now.saturating_sub(entry.resolved_at) > ttl_secs {
                expired += 1;
                continue;
            }
            if let Entry::Vacant(slot) = table.known.entry(entry.name) {
                slot.insert(KnownCoordinate {
                    location,
                    resolved_at: Some(entry.resolved_at),
                });
                loaded += 1;
            }
        }
        info!(
            "Loaded {} cached tournament coordinates ({} expired)",
            loaded, expired
        );
    }

    fn get_cached_coordinates(cache_path: &Path) -> Result<Vec<PersistedCoordinate>, CoordinateError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| CoordinateError::CacheRead(cache_path.to_path_buf(), e))?;
        let (decoded, _) = bincode::serde::decode_from_slice::<Vec<PersistedCoordinate>, _>(
            &bytes,
            BINCODE_CONFIG,
        )
        .map_err(|e| CoordinateError::CacheDecode(cache_path.to_path_buf(), Box::from(e)))?;
        Ok(decoded)
    }

    async fn cache_coordinates(
        entries: Vec<PersistedCoordinate>,
        cache_path: &Path,
    ) -> Result<(), CoordinateError> {
        let bincode_data = tokio::task::spawn_blocking(move || {
            bincode::serde::encode_to_vec(entries, BINCODE_CONFIG)
                .map_err(|e| CoordinateError::CacheEncode(Box::new(e)))
        })
        .await??;
        let tmp_path = cache_path.with_extension("bin.tmp");
        tokio::fs::write(&tmp_path, &bincode_data)
            .await
            .map_err(|e| CoordinateError::CacheWrite(tmp_path.clone(), e))?;
        tokio::fs::rename(&tmp_path, cache_path)
            .await
            .map_err(|e| CoordinateError::CacheWrite(cache_path.to_path_buf(), e))?;
        debug!(
            "Wrote coordinate cache ({} bytes) to {}",
            bincode_data.len(),
            cache_path.display()
        );
        Ok(())
    }

    /// Coordinates for `name` if already known, without consulting the geocoder.
    pub async fn get(&self, name: &str) -> Option<LatLon> {
        let table = self.table.lock().await;
        table.known.get(name.trim()).map(|known| known.location)
    }

    /// Number of tournaments with known coordinates.
    pub async fn len(&self) -> usize {
        self.table.lock().await.known.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Resolves a tournament name to coordinates.
    ///
    /// Unknown names are geocoded as `"<name> tennis tournament"`. A name the
    /// geocoder has no place for is not asked again during this run. A failed
    /// geocoder request (after retries) is logged and reported as `None`, and
    /// the name is tried again on the next call.
    pub async fn resolve(&self, name: &str) -> Option<LatLon> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        {
            let table = self.table.lock().await;
            if let Some(known) = table.known.get(name) {
                return Some(known.location);
            }
            if table.unresolved.contains(name) {
                return None;
            }
        }

        let query = format!("{name} tennis tournament");
        let found = match self.geocoder.geocode(&query).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Geocoding '{}' failed: {}", name, e);
                return None;
            }
        };

        let Some(location) = found else {
            info!("No coordinates for tournament '{}'", name);
            self.table.lock().await.unresolved.insert(name.to_string());
            return None;
        };

        let location = {
            let mut table = self.table.lock().await;
            match table.known.entry(name.to_string()) {
                Entry::Occupied(entry) => entry.get().location,
                Entry::Vacant(entry) => {
                    entry.insert(KnownCoordinate {
                        location,
                        resolved_at: Some(Utc::now().timestamp()),
                    });
                    location
                }
            }
        };

        self.persist().await;
        Some(location)
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let entries = self.table.lock().await.geocoded_entries();
        if let Err(e) = Self::cache_coordinates(entries, &self.cache_file).await {
            warn!("Failed to persist tournament coordinates: {}", e);
        }
    }
}
