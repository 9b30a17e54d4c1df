use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use vigil_agent::auth::CredentialManager;
use vigil_agent::batcher::Batcher;
use vigil_agent::config::{AgentConfig, LoginSettings};
use vigil_agent::delivery::{DeliveryClient, RetryPolicy};
use vigil_agent::identity;
use vigil_agent::pipeline::{Controller, LogSink};
use vigil_agent::queue::{DurableQueue, JsonFileStore};
use vigil_collector::latency::LatencyProbe;
use vigil_collector::SystemSampler;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    let login = LoginSettings::from_env()?;

    let device_id = identity::resolve_device_id(&config.device_id_path)
        .context("failed to resolve device identity")?;
    tracing::info!(device_id = %device_id, server = %config.server_url, "vigil-agent starting");

    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let probe = config.latency_probe_addr.clone().map(|addr| {
        LatencyProbe::new(
            addr,
            Duration::from_millis(config.latency_probe_timeout_ms),
        )
    });
    let sampler = SystemSampler::new(device_id, probe);

    let credentials = CredentialManager::new(http.clone(), config.login_url(), login);
    let policy = RetryPolicy::new(
        config.max_retries,
        Duration::from_millis(config.retry_base_delay_ms),
    );
    let delivery = DeliveryClient::new(http, config.metrics_url(), policy);
    let queue = DurableQueue::new(JsonFileStore::new(&config.queue_path));
    let batcher = Batcher::new(config.batch_size);

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("failed to install shutdown handler")?;

    let mut controller = Controller::new(
        queue,
        delivery,
        credentials,
        sampler,
        batcher,
        Box::new(LogSink),
        Duration::from_secs(config.interval_secs),
    );

    tracing::info!(
        interval_secs = config.interval_secs,
        batch_size = config.batch_size,
        queue_path = %config.queue_path.display(),
        "starting delivery loop"
    );

    controller.run(&running).context("agent terminated")?;
    tracing::info!("vigil-agent stopped");
    Ok(())
}
