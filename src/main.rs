//! Retry breaker demo.
//!
//! Drives traffic at a simulated flaky upstream through a guarded call and
//! logs the breaker tripping, replaying and closing again.
//!
//! ```text
//!  traffic loop ──▶ CircuitBreaker::call ──▶ upstream (fails during outage)
//!                         │ open
//!                         ▼
//!                      fallback ("cached")
//!
//!  retry scheduler ──▶ replay tripping call ──▶ ok: guard closed
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;

use retry_breaker::config::schema::GuardConfig;
use retry_breaker::config::{load_config, BreakerConfig};
use retry_breaker::lifecycle::{signals, Shutdown};
use retry_breaker::observability::{logging, metrics};
use retry_breaker::{CircuitBreaker, OperationId};

const DEMO_GUARD: &str = "upstream.fetch_quote";

#[derive(Parser)]
#[command(name = "retry-breaker")]
#[command(about = "Circuit breaker demo against a simulated flaky upstream", long_about = None)]
struct Cli {
    /// TOML config; a single demo guard is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long, default_value_t = 30)]
    duration_secs: u64,

    /// Upstream outage length, starting 3 seconds in
    #[arg(short, long, default_value_t = 8)]
    outage_secs: u64,

    /// Failure probability while the upstream is healthy
    #[arg(short, long, default_value_t = 0.05)]
    failure_rate: f64,
}

/// Upstream whose availability can be switched off.
struct Upstream {
    down: AtomicBool,
    failure_rate: f64,
    served: AtomicU64,
}

impl Upstream {
    async fn fetch_quote(&self) -> Result<u64, String> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.down.load(Ordering::Relaxed) {
            return Err("upstream unavailable".to_string());
        }
        if rand::thread_rng().gen_bool(self.failure_rate.clamp(0.0, 1.0)) {
            return Err("upstream timed out".to_string());
        }
        Ok(self.served.fetch_add(1, Ordering::Relaxed))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => demo_config(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("retry-breaker v0.1.0 starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let breaker = CircuitBreaker::from_config(&config)?;
    let id = match config.guards.first() {
        Some(guard) => OperationId::new(&guard.name),
        None => OperationId::new(DEMO_GUARD),
    };
    let guard = match breaker.guard(&id) {
        Ok(guard) => guard,
        Err(_) => breaker.register(id, Default::default())?,
    };

    tracing::info!(
        guard = %guard.id(),
        threshold = guard.policy().threshold,
        duration_secs = cli.duration_secs,
        outage_secs = cli.outage_secs,
        "Configuration loaded"
    );

    let upstream = Arc::new(Upstream {
        down: AtomicBool::new(false),
        failure_rate: cli.failure_rate,
        served: AtomicU64::new(0),
    });

    let outage = upstream.clone();
    let outage_secs = cli.outage_secs;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        tracing::warn!(outage_secs, "Upstream going down");
        outage.down.store(true, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(outage_secs)).await;
        tracing::warn!("Upstream back up");
        outage.down.store(false, Ordering::Relaxed);
    });

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));
    let mut shutdown_rx = shutdown.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(cli.duration_secs));
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    let (mut real, mut fallback, mut failed) = (0u64, 0u64, 0u64);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        let call = upstream.clone();
        let result = breaker
            .call(
                &guard,
                move || {
                    let upstream = call.clone();
                    async move { upstream.fetch_quote().await }
                },
                || async { Ok(u64::MAX) },
            )
            .await;

        match result {
            Ok(u64::MAX) => fallback += 1,
            Ok(_) => real += 1,
            Err(e) => {
                failed += 1;
                tracing::debug!(error = %e, "Upstream call failed");
            }
        }
    }

    tracing::info!(
        real,
        fallback,
        failed,
        open_guards = breaker.open_guards().len(),
        "Traffic stopped"
    );
    breaker.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn demo_config() -> BreakerConfig {
    let mut config = BreakerConfig::default();
    config.retry.retry_interval_ms = 2000;
    config.retry.max_retry = 10;
    config.guards.push(GuardConfig {
        name: DEMO_GUARD.to_string(),
        threshold: 0.5,
        window_size: 5,
        window_unit: Default::default(),
        fallback: Some("cached_quote".to_string()),
        max_retry: None,
        retry_interval_ms: None,
        alert: None,
    });
    config
}
