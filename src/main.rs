use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;
use tennis_weather::{
    get_cache_dir, EnrichmentReport, TennisWeather, TennisWeatherConfig, TennisWeatherError,
    DEFAULT_FILE_PREFIX,
};

#[derive(Debug, Parser)]
#[command(version, about = "Add daily weather columns to tennis match CSV files.")]
struct Cli {
    /// Match CSV files, or directories to scan for `<file-prefix>*.csv`
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where `<stem>_weather.csv` files are written
    #[arg(env = "TENNIS_WEATHER_OUTPUT_DIR", short, long, default_value = "enriched")]
    output_dir: PathBuf,

    /// File name prefix used when scanning directories
    #[arg(env = "TENNIS_WEATHER_FILE_PREFIX", long, default_value = DEFAULT_FILE_PREFIX)]
    file_prefix: String,

    /// Cache directory (defaults to the system cache directory)
    #[arg(env = "TENNIS_WEATHER_CACHE_DIR", long)]
    cache_dir: Option<PathBuf>,

    #[arg(env = "TENNIS_WEATHER_ARCHIVE_URL", long)]
    archive_url: Option<String>,

    #[arg(env = "TENNIS_WEATHER_GEOCODER_URL", long)]
    geocoder_url: Option<String>,

    /// Open-Meteo API key for the commercial archive endpoint
    #[arg(env = "TENNIS_WEATHER_API_KEY", long, hide_env_values = true)]
    api_key: Option<String>,

    #[arg(env = "TENNIS_WEATHER_USER_AGENT", long)]
    user_agent: Option<String>,

    /// Per-request timeout in seconds
    #[arg(env = "TENNIS_WEATHER_TIMEOUT_SECS", long)]
    timeout_secs: Option<u64>,

    /// Weather lookups in flight at once
    #[arg(env = "TENNIS_WEATHER_CONCURRENCY", short, long)]
    concurrency: Option<usize>,

    #[arg(env = "TENNIS_WEATHER_REQUESTS_PER_SECOND", long)]
    requests_per_second: Option<u32>,

    /// Attempts per archive or geocoder request, including the first
    #[arg(env = "TENNIS_WEATHER_MAX_ATTEMPTS", long)]
    max_attempts: Option<u32>,

    /// Days before a geocoded tournament location is looked up again
    #[arg(env = "TENNIS_WEATHER_COORDINATE_TTL_DAYS", long)]
    coordinate_ttl_days: Option<u64>,

    /// Do not keep raw archive responses on disk
    #[arg(env = "TENNIS_WEATHER_NO_HTTP_CACHE", long)]
    no_http_cache: bool,
}

impl Cli {
    fn config(&self) -> Result<TennisWeatherConfig, TennisWeatherError> {
        let cache_dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => get_cache_dir().map_err(TennisWeatherError::CacheDirResolution)?,
        };
        Ok(TennisWeatherConfig::builder()
            .cache_dir(cache_dir)
            .maybe_archive_url(self.archive_url.clone())
            .maybe_geocoder_url(self.geocoder_url.clone())
            .maybe_api_key(self.api_key.clone())
            .maybe_user_agent(self.user_agent.clone())
            .maybe_request_timeout(self.timeout_secs.map(Duration::from_secs))
            .maybe_concurrency(self.concurrency)
            .maybe_requests_per_second(self.requests_per_second)
            .maybe_max_attempts(self.max_attempts)
            .maybe_coordinate_ttl(
                self.coordinate_ttl_days
                    .map(|days| Duration::from_secs(days * 24 * 60 * 60)),
            )
            .http_cache(!self.no_http_cache)
            .build())
    }
}

#[tokio::main]
async fn main() -> Result<(), TennisWeatherError> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let client = TennisWeather::with_config(cli.config()?).await?;

    let mut total = EnrichmentReport::default();
    let mut failed_files = 0usize;
    for input in &cli.inputs {
        if input.is_dir() {
            let result = client
                .enrich()
                .directory(input)
                .output_dir(&cli.output_dir)
                .file_prefix(cli.file_prefix.as_str())
                .call()
                .await?;
            total += result.report();
            failed_files += result.failures.len();
        } else {
            match client
                .enrich()
                .file(input)
                .output_dir(&cli.output_dir)
                .call()
                .await
            {
                Ok(file) => total += file.report,
                Err(e) => {
                    error!("Failed to enrich {}: {}", input.display(), e);
                    failed_files += 1;
                }
            }
        }
    }

    let requests = client.network_requests();
    client.close().await?;
    info!("{} archive requests", requests);
    println!("{total}");

    if failed_files > 0 {
        error!("{} input files could not be enriched", failed_files);
        std::process::exit(1);
    }
    Ok(())
}
