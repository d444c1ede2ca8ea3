use polars::prelude::DataFrame;
use std::fmt;
use std::ops::AddAssign;
use std::path::PathBuf;

/// What happened to one match row during enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Weather columns were filled (from the cache or a fresh fetch).
    Enriched,
    /// The tournament name is missing or could not be placed.
    UnresolvedLocation,
    /// `tourney_date` is missing or not a recognisable date.
    InvalidDate,
    /// The weather lookup failed; the row keeps empty weather columns.
    FetchFailed { reason: String },
}

impl RowOutcome {
    pub fn is_enriched(&self) -> bool {
        matches!(self, RowOutcome::Enriched)
    }
}

/// Counts collected while enriching one or more match tables.
///
/// Cache hits and misses count distinct (location, date) lookups, not rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub rows: usize,
    pub enriched: usize,
    pub unresolved: usize,
    pub invalid_dates: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl EnrichmentReport {
    pub(crate) fn count(&mut self, outcome: &RowOutcome) {
        self.rows += 1;
        match outcome {
            RowOutcome::Enriched => self.enriched += 1,
            RowOutcome::UnresolvedLocation => self.unresolved += 1,
            RowOutcome::InvalidDate => self.invalid_dates += 1,
            RowOutcome::FetchFailed { .. } => self.failed += 1,
        }
    }
}

impl AddAssign for EnrichmentReport {
    fn add_assign(&mut self, other: Self) {
        self.rows += other.rows;
        self.enriched += other.enriched;
        self.unresolved += other.unresolved;
        self.invalid_dates += other.invalid_dates;
        self.failed += other.failed;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
    }
}

impl fmt::Display for EnrichmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows: {} enriched, {} unresolved, {} invalid dates, {} failed ({} cache hits, {} misses)",
            self.rows,
            self.enriched,
            self.unresolved,
            self.invalid_dates,
            self.failed,
            self.cache_hits,
            self.cache_misses
        )
    }
}

/// A match table with weather columns attached, plus one outcome per row.
#[derive(Debug, Clone)]
pub struct EnrichedFrame {
    pub frame: DataFrame,
    pub outcomes: Vec<RowOutcome>,
    pub report: EnrichmentReport,
}

/// Result of enriching one match file.
#[derive(Debug, Clone)]
pub struct FileEnrichment {
    pub input: PathBuf,
    pub output: PathBuf,
    pub report: EnrichmentReport,
}

/// Result of enriching every match file in a directory. A file that fails does
/// not stop the others.
#[derive(Debug, Default)]
pub struct DirectoryEnrichment {
    pub files: Vec<FileEnrichment>,
    pub failures: Vec<(PathBuf, crate::TennisWeatherError)>,
}

impl DirectoryEnrichment {
    /// Totals over all successfully written files.
    pub fn report(&self) -> EnrichmentReport {
        let mut total = EnrichmentReport::default();
        for file in &self.files {
            total += file.report;
        }
        total
    }
}
