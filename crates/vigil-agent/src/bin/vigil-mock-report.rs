use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;

use vigil_agent::auth::{CredentialManager, CredentialSource};
use vigil_agent::config::LoginSettings;
use vigil_agent::delivery::{Deliver, DeliveryClient, DeliveryOutcome, RetryPolicy};
use vigil_common::types::MetricRecord;

#[derive(Debug)]
struct Config {
    server_url: String,
    login_path: String,
    metrics_path: String,
    device_count: usize,
    device_prefix: String,
    batches: usize,
    batch_size: usize,
    pause_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            login_path: "/login".to_string(),
            metrics_path: "/api/metrics".to_string(),
            device_count: 3,
            device_prefix: "mock".to_string(),
            batches: 5,
            batch_size: 4,
            pause_ms: 120,
        }
    }
}

enum CliAction {
    Run(Config),
    Help,
}

fn usage() {
    println!(
        "Usage:\n  vigil-mock-report [options]\n\nCredentials come from VIGIL_USERNAME / VIGIL_PASSWORD.\n\nOptions:\n  --server-url <url>        collector base URL (default: http://127.0.0.1:8080)\n  --login-path <path>       login endpoint path (default: /login)\n  --metrics-path <path>     metrics endpoint path (default: /api/metrics)\n  --device-count <n>        synthetic device count (default: 3)\n  --device-prefix <prefix>  device id prefix (default: mock)\n  --batches <n>             batches per device (default: 5)\n  --batch-size <n>          records per batch (default: 4)\n  --pause-ms <n>            pause between batches (default: 120)\n  -h, --help                show this help"
    );
}

fn parse_cli() -> Result<CliAction> {
    let mut config = Config::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "--server-url" => config.server_url = next_value(&mut args, "--server-url")?,
            "--login-path" => config.login_path = next_value(&mut args, "--login-path")?,
            "--metrics-path" => config.metrics_path = next_value(&mut args, "--metrics-path")?,
            "--device-count" => {
                config.device_count =
                    parse_positive(&next_value(&mut args, "--device-count")?, "--device-count")?;
            }
            "--device-prefix" => config.device_prefix = next_value(&mut args, "--device-prefix")?,
            "--batches" => {
                config.batches = parse_positive(&next_value(&mut args, "--batches")?, "--batches")?;
            }
            "--batch-size" => {
                config.batch_size =
                    parse_positive(&next_value(&mut args, "--batch-size")?, "--batch-size")?;
            }
            "--pause-ms" => {
                config.pause_ms = next_value(&mut args, "--pause-ms")?
                    .parse::<u64>()
                    .context("invalid number for --pause-ms")?;
            }
            _ => bail!("unknown argument: {arg}"),
        }
    }

    Ok(CliAction::Run(config))
}

fn next_value<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| anyhow!("missing value for {flag}"))
}

fn parse_positive(value: &str, flag: &str) -> Result<usize> {
    let parsed = value
        .parse::<usize>()
        .with_context(|| format!("invalid number for {flag}: {value}"))?;
    if parsed == 0 {
        bail!("{flag} must be greater than 0");
    }
    Ok(parsed)
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Synthetic but plausible host readings, varied per device and batch.
fn synthetic_record(device_id: &str, seed: f64) -> MetricRecord {
    MetricRecord {
        device_id: device_id.to_string(),
        cpu_usage: 25.0 + (seed * 13.0) % 50.0,
        memory_usage: 40.0 + (seed * 7.0) % 35.0,
        disk_usage: 55.0 + (seed * 3.0) % 20.0,
        bytes_sent_per_sec: 8_000 + (seed as u64 * 311) % 40_000,
        bytes_recv_per_sec: 12_000 + (seed as u64 * 577) % 60_000,
        system_uptime_seconds: 86_400.0 * (3.0 + seed),
        disk_read_bytes_per_sec: 1_024 + (seed as u64 * 97) % 8_192,
        disk_write_bytes_per_sec: 2_048 + (seed as u64 * 131) % 16_384,
        latency_ms: if seed as u64 % 7 == 0 {
            None
        } else {
            Some(1.5 + (seed * 1.1) % 40.0)
        },
        timestamp: Utc::now(),
    }
}

fn main() -> Result<()> {
    let config = match parse_cli()? {
        CliAction::Help => {
            usage();
            return Ok(());
        }
        CliAction::Run(config) => config,
    };

    let login = LoginSettings::from_env()?;
    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let manager = CredentialManager::new(
        http.clone(),
        join_url(&config.server_url, &config.login_path),
        login,
    );
    let mut credential = manager.obtain().context("login failed")?;

    let delivery = DeliveryClient::new(
        http,
        join_url(&config.server_url, &config.metrics_path),
        RetryPolicy::new(3, Duration::from_millis(500)),
    );

    println!(
        "[mock-report] devices={} batches={} batch_size={} server={}",
        config.device_count, config.batches, config.batch_size, config.server_url
    );

    let mut sent = 0usize;
    let mut failed = 0usize;

    for batch_index in 0..config.batches {
        for device_index in 1..=config.device_count {
            let device_id = format!("{}-{device_index:02}", config.device_prefix);
            let batch: Vec<MetricRecord> = (0..config.batch_size)
                .map(|i| {
                    let seed = (batch_index * config.batch_size + i + device_index) as f64;
                    synthetic_record(&device_id, seed)
                })
                .collect();

            let mut outcome = delivery.send(&batch, &credential);
            if outcome == DeliveryOutcome::AuthRejected {
                credential = manager.obtain().context("credential refresh failed")?;
                outcome = delivery.send(&batch, &credential);
            }

            match outcome {
                DeliveryOutcome::Accepted => {
                    sent += batch.len();
                    println!(
                        "[mock-report][ok] device={device_id} batch={} records={}",
                        batch_index + 1,
                        batch.len()
                    );
                }
                other => {
                    failed += batch.len();
                    eprintln!(
                        "[mock-report][fail] device={device_id} batch={} outcome={other:?}",
                        batch_index + 1
                    );
                }
            }

            if config.pause_ms > 0 {
                thread::sleep(Duration::from_millis(config.pause_ms));
            }
        }
    }

    println!("[mock-report] done sent={sent} failed={failed}");
    if failed > 0 {
        bail!("{failed} record(s) failed");
    }
    Ok(())
}
