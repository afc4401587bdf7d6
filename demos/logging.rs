//! Runs one compile-evaluate cycle against a synthetic bar frame, with the
//! same dev-time tracing subscriber setup used by the integration tests.
//! Not part of the published crate; exercised only via `cargo run --example logging`.

use std::{env, fs};

use anyhow::{Context, Result};
use polars::prelude::*;
use strategy_evolver::{
    artifacts::ArtifactWriter,
    bars::BarFrame,
    config::RunConfig,
    evolution::Driver,
    llm::{HttpLlmClient, LlmCache},
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing()?;

    let frame = synthetic_aapl_frame(500);
    let cache_dir = env::temp_dir().join("strategy-evolver-demo-cache");
    let cache = LlmCache::new(cache_dir).context("failed to open llm cache")?;

    let endpoint = env::var("STRATEGY_EVOLVER_LLM_ENDPOINT")
        .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    let api_key = env::var("STRATEGY_EVOLVER_LLM_API_KEY").unwrap_or_default();
    let client = HttpLlmClient::new(endpoint, api_key);

    let mut cfg = RunConfig::default();
    cfg.evolution.depth = 1;
    cfg.evolution.branching = 1;
    cfg.evolution.survivors_per_layer = 1;

    let mut driver = Driver::new(cfg.clone(), &frame, "openai", "gpt-4o-mini", None, 20);
    cfg.phase3.seed = Some(driver.resolved_episode_seed());

    info!("starting demo run");
    let (summary, _transcripts) = driver
        .run("buy when RSI dips below 30 and sell when it rises above 70", &client, &cache)
        .await
        .context("run failed")?;

    let out_dir = env::temp_dir().join("strategy-evolver-demo-run");
    let writer = ArtifactWriter::new(out_dir)?;
    writer.write_run_config(&cfg)?;
    writer.write_summary(&summary)?;

    info!(best_fitness = summary.best_fitness, root = %writer.root().display(), "demo run finished");
    Ok(())
}

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if env::var("STRATEGY_EVOLVER_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();
        info!("logging to stdout as json");
        return Ok(None);
    }

    let log_dir = env::temp_dir().join("strategy-evolver-demo-logs");
    fs::create_dir_all(&log_dir)?;
    let timestamp = time::OffsetDateTime::now_utc()
        .format(&time::macros::format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .context("failed to format log file timestamp")?;
    let file_name = format!("strategy-evolver-{timestamp}.log");
    let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(log_file = %log_dir.join(&file_name).display(), "logging to file");
    Ok(Some(guard))
}

fn synthetic_aapl_frame(n: usize) -> BarFrame {
    let start_ms: i64 = 1_700_000_000_000;
    let day_ms: i64 = 86_400_000;
    let ts: Vec<i64> = (0..n as i64).map(|i| start_ms + i * day_ms).collect();
    let closes: Vec<f64> = (0..n)
        .map(|i| 150.0 + 20.0 * ((i as f64) / 30.0).sin() + (i as f64) * 0.01)
        .collect();
    let df = df![
        "timestamp" => ts,
        "open" => closes.clone(),
        "high" => closes.iter().map(|c| c + 1.0).collect::<Vec<_>>(),
        "low" => closes.iter().map(|c| c - 1.0).collect::<Vec<_>>(),
        "close" => closes,
        "volume" => vec![1_000_000.0; n],
    ]
    .expect("synthetic demo frame columns have matching lengths");
    let df = df
        .lazy()
        .with_column(col("timestamp").cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
        .collect()
        .expect("casting the synthetic timestamp column never fails");
    BarFrame::from_dataframe(df).expect("synthetic demo frame satisfies BarFrame's schema")
}
