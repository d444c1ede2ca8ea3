use chrono::NaiveDate;
use polars::prelude::*;
use std::path::Path;
use std::time::Duration;
use tennis_weather::{
    CacheKey, LatLon, RowOutcome, TennisWeather, TennisWeatherConfig, TennisWeatherError,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, cache_dir: &Path) -> TennisWeatherConfig {
    TennisWeatherConfig::builder()
        .cache_dir(cache_dir)
        .archive_url(format!("{}/v1/archive", server.uri()))
        .geocoder_url(format!("{}/search", server.uri()))
        .requests_per_second(100)
        .geocoder_requests_per_second(100)
        .max_attempts(2)
        .retry_base_delay(Duration::from_millis(1))
        .http_cache(false)
        .build()
}

fn archive_day(day: &str, tmax: f64, tmin: f64, rain: f64, wind: f64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "latitude": 51.43,
        "longitude": -0.21,
        "daily": {
            "time": [day],
            "temperature_2m_max": [tmax],
            "temperature_2m_min": [tmin],
            "precipitation_sum": [rain],
            "wind_speed_10m_max": [wind]
        }
    }))
}

async fn mount_wimbledon(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .and(query_param("latitude", "51.433"))
        .and(query_param("longitude", "-0.214"))
        .and(query_param("start_date", "2023-07-10"))
        .and(query_param("end_date", "2023-07-10"))
        .respond_with(archive_day("2023-07-10", 22.4, 13.1, 0.3, 18.7))
        .expect(times)
        .mount(server)
        .await;
}

fn f64_values(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
    df.column(column).unwrap().f64().unwrap().into_iter().collect()
}

#[tokio::test]
async fn test_wimbledon_end_to_end_then_cache_hit() -> Result<(), TennisWeatherError> {
    let server = MockServer::start().await;
    mount_wimbledon(&server, 1).await;
    let dir = tempfile::tempdir().unwrap();
    let wimbledon_key = CacheKey::new(
        LatLon(51.433, -0.214),
        NaiveDate::from_ymd_opt(2023, 7, 10).unwrap(),
    );

    // First run: one fetch, one cache row
    {
        let client = TennisWeather::with_config(config(&server, dir.path())).await?;
        let df = polars::df!(
            "tourney_name" => ["Wimbledon"],
            "tourney_date" => [20230710i64],
            "winner_name" => ["Carlos Alcaraz"],
        )?;
        let enriched = client.enrich().frame(df).await?;

        assert_eq!(enriched.outcomes, vec![RowOutcome::Enriched]);
        assert_eq!(client.network_requests(), 1);
        assert_eq!(client.store().len().await, 1);
        assert!(client.store().lookup(&wimbledon_key).await.is_some());
        assert_eq!(f64_values(&enriched.frame, "temperature_max"), [Some(22.4)]);
        assert_eq!(f64_values(&enriched.frame, "temperature_min"), [Some(13.1)]);
        assert_eq!(f64_values(&enriched.frame, "precipitation_sum"), [Some(0.3)]);
        assert_eq!(f64_values(&enriched.frame, "wind_speed_max"), [Some(18.7)]);
        client.close().await?;
    }

    // Second run over the same cache directory: no fetch at all
    let client = TennisWeather::with_config(config(&server, dir.path())).await?;
    let df = polars::df!(
        "tourney_name" => ["Wimbledon", "Wimbledon"],
        "tourney_date" => ["20230710", "2023-07-10"],
    )?;
    let enriched = client.enrich().frame(df).await?;
    assert_eq!(client.network_requests(), 0);
    assert_eq!(enriched.report.cache_hits, 1);
    assert_eq!(enriched.report.enriched, 2);
    assert_eq!(
        f64_values(&enriched.frame, "temperature_max"),
        [Some(22.4), Some(22.4)]
    );

    let cache = std::fs::read_to_string(dir.path().join("weather_cache.csv")).unwrap();
    assert_eq!(cache.lines().count(), 2);
    assert!(cache.contains("51.433,-0.214,2023-07-10,22.4,13.1,0.3,18.7"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_tournament_keeps_row_and_caches_nothing() -> Result<(), TennisWeatherError> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Local Exhibition Cup tennis tournament"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let client = TennisWeather::with_config(config(&server, dir.path())).await?;

    let df = polars::df!(
        "tourney_name" => ["Local Exhibition Cup", "Local Exhibition Cup"],
        "tourney_date" => [20230601i64, 20230602],
        "score" => ["6-4 6-4", "7-6(3) 6-1"],
    )?;
    let enriched = client.enrich().frame(df.clone()).await?;

    assert_eq!(enriched.report.unresolved, 2);
    assert!(client.store().is_empty().await);
    for column in tennis_weather::WEATHER_COLUMNS {
        assert_eq!(f64_values(&enriched.frame, column), [None, None]);
    }
    for column in df.get_column_names() {
        assert!(enriched
            .frame
            .column(column)?
            .as_materialized_series()
            .equals_missing(df.column(column)?.as_materialized_series()));
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_does_not_stop_other_rows() -> Result<(), TennisWeatherError> {
    let server = MockServer::start().await;
    mount_wimbledon(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .and(query_param("start_date", "2023-06-04"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let client = TennisWeather::with_config(config(&server, dir.path())).await?;

    let df = polars::df!(
        "tourney_name" => ["Roland Garros", "Wimbledon"],
        "tourney_date" => [20230604i64, 20230710],
    )?;
    let enriched = client.enrich().frame(df).await?;

    assert!(matches!(enriched.outcomes[0], RowOutcome::FetchFailed { .. }));
    assert_eq!(enriched.outcomes[1], RowOutcome::Enriched);
    assert_eq!(
        f64_values(&enriched.frame, "temperature_max"),
        [None, Some(22.4)]
    );
    assert_eq!(client.store().len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_geocoded_coordinates_survive_restart() -> Result<(), TennisWeatherError> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Queen's Club Championships tennis tournament"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"lat": "51.4873", "lon": "-0.2119"}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .and(query_param("latitude", "51.487"))
        .and(query_param("longitude", "-0.212"))
        .respond_with(archive_day("2023-06-19", 24.0, 14.0, 0.0, 11.0))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let date = NaiveDate::from_ymd_opt(2023, 6, 19).unwrap();

    let first = TennisWeather::with_config(config(&server, dir.path())).await?;
    let record = first
        .lookup("Queen's Club Championships")
        .date(date)
        .call()
        .await?
        .expect("venue should be geocoded");
    assert_eq!(record.temperature_max, Some(24.0));
    first.close().await?;

    let second = TennisWeather::with_config(config(&server, dir.path())).await?;
    assert_eq!(
        second.resolver().get("Queen's Club Championships").await,
        Some(LatLon(51.4873, -0.2119))
    );
    let again = second
        .lookup("Queen's Club Championships")
        .date(date)
        .call()
        .await?;
    assert_eq!(again, Some(record));
    assert_eq!(second.network_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_directory_enrichment_writes_weather_files() -> Result<(), TennisWeatherError> {
    let server = MockServer::start().await;
    mount_wimbledon(&server, 1).await;
    let input_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let output_dir = input_dir.path().join("out");

    std::fs::write(
        input_dir.path().join("atp_matches_2023.csv"),
        "tourney_id,tourney_name,tourney_date,winner_seed\n\
         2023-540,Wimbledon,20230710,1\n\
         2023-540,Wimbledon,20230710,Q\n",
    )
    .unwrap();
    std::fs::write(
        input_dir.path().join("atp_matches_broken.csv"),
        "tourney_id,winner_name\n2023-540,Someone\n",
    )
    .unwrap();
    std::fs::write(
        input_dir.path().join("atp_players.csv"),
        "player_id,name_first\n1,Rod\n",
    )
    .unwrap();

    let client = TennisWeather::with_config(config(&server, cache_dir.path())).await?;
    let result = client
        .enrich()
        .directory(input_dir.path())
        .output_dir(&output_dir)
        .call()
        .await?;

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.failures.len(), 1);
    assert!(matches!(
        result.failures[0].1,
        TennisWeatherError::MissingColumn(_)
    ));
    assert_eq!(result.report().enriched, 2);

    let written = std::fs::read_to_string(output_dir.join("atp_matches_2023_weather.csv")).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("tourney_id,tourney_name,tourney_date,winner_seed,temperature_max,temperature_min,precipitation_sum,wind_speed_max")
    );
    assert_eq!(
        lines.next(),
        Some("2023-540,Wimbledon,20230710,1,22.4,13.1,0.3,18.7")
    );
    assert!(!output_dir.join("atp_players_weather.csv").exists());
    Ok(())
}
