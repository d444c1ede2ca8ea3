//! Provides [`MatchEnricher`], obtained via [`TennisWeather::enrich()`].

use crate::enrichment::driver::EnrichmentDriver;
use crate::enrichment::files::{
    list_match_files, output_path, read_match_file, write_enriched_file, DEFAULT_FILE_PREFIX,
};
use crate::enrichment::outcome::{DirectoryEnrichment, EnrichedFrame, FileEnrichment};
use crate::{TennisWeather, TennisWeatherError};
use bon::bon;
use log::{info, warn};
use polars::prelude::DataFrame;
use std::path::Path;

/// Adds daily weather columns (`temperature_max`, `temperature_min`,
/// `precipitation_sum`, `wind_speed_max`) to match tables.
///
/// Input tables need a `tourney_name` and a `tourney_date` column. Rows whose
/// tournament cannot be placed, whose date is unusable or whose weather lookup
/// fails keep empty weather values; see [`crate::RowOutcome`].
pub struct MatchEnricher<'a> {
    client: &'a TennisWeather,
}

#[bon]
impl<'a> MatchEnricher<'a> {
    pub(crate) fn new(client: &'a TennisWeather) -> Self {
        Self { client }
    }

    fn driver(&self) -> EnrichmentDriver<'_> {
        EnrichmentDriver::new(
            self.client.resolver(),
            self.client.store(),
            self.client.fetcher(),
            self.client.config().concurrency,
        )
    }

    /// Enriches an in-memory match table.
    ///
    /// # Errors
    ///
    /// Returns [`TennisWeatherError::MissingColumn`] if `tourney_name` or
    /// `tourney_date` is absent.
    pub async fn frame(&self, df: DataFrame) -> Result<EnrichedFrame, TennisWeatherError> {
        self.driver().enrich(df).await
    }

    /// Enriches one match CSV file and writes `<stem>_weather.csv` into
    /// `output_dir` (created if missing).
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use tennis_weather::{TennisWeather, TennisWeatherError};
    /// # use std::path::Path;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), TennisWeatherError> {
    /// let client = TennisWeather::new().await?;
    /// let result = client
    ///     .enrich()
    ///     .file(Path::new("tennis_atp/atp_matches_2023.csv"))
    ///     .output_dir(Path::new("enriched"))
    ///     .call()
    ///     .await?;
    /// println!("{}: {}", result.output.display(), result.report);
    /// # Ok(())
    /// # }
    /// ```
    #[builder(start_fn = file)]
    #[doc(hidden)]
    pub async fn build_file(
        &self,
        #[builder(start_fn)] input: &Path,
        output_dir: &Path,
    ) -> Result<FileEnrichment, TennisWeatherError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| TennisWeatherError::OutputWrite(output_dir.to_path_buf(), e))?;

        info!("Enriching {}", input.display());
        let df = read_match_file(input).await?;
        let enriched = self.driver().enrich(df).await?;

        let output = output_path(input, output_dir);
        write_enriched_file(enriched.frame, &output).await?;
        info!("Wrote {} ({})", output.display(), enriched.report);
        Ok(FileEnrichment {
            input: input.to_path_buf(),
            output,
            report: enriched.report,
        })
    }

    /// Enriches every `<file_prefix>*.csv` file in `dir`, in name order.
    ///
    /// `file_prefix` defaults to `atp_matches_`. A file that cannot be read,
    /// enriched or written is logged and listed in
    /// [`DirectoryEnrichment::failures`]; the remaining files are still processed.
    ///
    /// # Errors
    ///
    /// Returns [`TennisWeatherError::InputDirectory`] if `dir` cannot be listed.
    #[builder(start_fn = directory)]
    #[doc(hidden)]
    pub async fn build_directory(
        &self,
        #[builder(start_fn)] dir: &Path,
        output_dir: &Path,
        #[builder(into, default = DEFAULT_FILE_PREFIX.to_string())] file_prefix: String,
    ) -> Result<DirectoryEnrichment, TennisWeatherError> {
        let mut result = DirectoryEnrichment::default();
        for input in list_match_files(dir, &file_prefix).await? {
            match self.file(&input).output_dir(output_dir).call().await {
                Ok(file) => result.files.push(file),
                Err(e) => {
                    warn!("Skipping {}: {}", input.display(), e);
                    result.failures.push((input, e));
                }
            }
        }
        info!(
            "Enriched {} files from {} ({} failed): {}",
            result.files.len(),
            dir.display(),
            result.failures.len(),
            result.report()
        );
        Ok(result)
    }
}
