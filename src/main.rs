//! resilience-pipeline command line.
//!
//! ```text
//! check    → load + validate config, resolve every target, print policies
//! simulate → drive a synthetic operation through one target's executor
//! watch    → keep a live provider, apply config changes until SIGINT/SIGTERM
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use futures_util::stream::{self, StreamExt};
use rand::Rng;

use resilience_pipeline::config::{load_config, ConfigWatcher};
use resilience_pipeline::lifecycle::{wait_for_shutdown, Shutdown};
use resilience_pipeline::observability::logging;
use resilience_pipeline::{Context, OperationError, Provider};

#[derive(Parser)]
#[command(name = "resilience-pipeline")]
#[command(about = "Run operations under named timeout, retry and circuit breaker policies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and print every resolved target policy
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Drive a synthetic operation through a target's policy
    Simulate {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        target: String,

        /// Number of executions
        #[arg(long, default_value_t = 20)]
        calls: u32,

        /// Latency of each synthetic attempt
        #[arg(long, default_value_t = 10)]
        latency_ms: u64,

        /// Probability (0.0 to 1.0) that an attempt fails transiently
        #[arg(long, default_value_t = 0.3)]
        failure_rate: f64,

        /// Executions in flight at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Hold a live provider and apply config changes as they land
    Watch {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Commands {
    fn config_path(&self) -> &Path {
        match self {
            Commands::Check { config }
            | Commands::Simulate { config, .. }
            | Commands::Watch { config } => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.command.config_path())?;
    logging::init(&config.observability)?;

    let provider = Arc::new(Provider::new());
    let added = config.apply(&provider)?;
    tracing::info!(
        entries = added,
        targets = provider.targets().len(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Check { .. } => check(&provider)?,
        Commands::Simulate {
            target,
            calls,
            latency_ms,
            failure_rate,
            concurrency,
            ..
        } => {
            if !(0.0..=1.0).contains(&failure_rate) {
                return Err(format!("failure rate must be within 0.0..=1.0, got {}", failure_rate).into());
            }
            let sim = Simulation {
                calls,
                latency: Duration::from_millis(latency_ms),
                failure_rate,
                concurrency: concurrency.max(1),
            };
            simulate(&provider, &target, sim).await?;
        }
        Commands::Watch { config } => watch(provider, &config).await?,
    }

    Ok(())
}

fn check(provider: &Provider) -> Result<(), Box<dyn std::error::Error>> {
    let mut resolved = BTreeMap::new();
    for target in provider.targets() {
        let policy = provider.resolve(&target)?;
        resolved.insert(target, policy.summary());
    }

    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

struct Simulation {
    calls: u32,
    latency: Duration,
    failure_rate: f64,
    concurrency: usize,
}

async fn simulate(
    provider: &Provider,
    target: &str,
    sim: Simulation,
) -> Result<(), Box<dyn std::error::Error>> {
    let executor = provider.executor(target)?;

    let shutdown = Arc::new(Shutdown::new());
    let trigger = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if let Ok(signal) = wait_for_shutdown().await {
            tracing::info!(signal, "Interrupted, cancelling simulation");
            trigger.trigger();
        }
    });

    let Simulation {
        calls,
        latency,
        failure_rate,
        concurrency,
    } = sim;
    let started = Instant::now();

    let outcomes: Vec<String> = stream::iter(0..calls)
        .map(|_| {
            let executor = executor.clone();
            let ctx = shutdown.context();
            async move {
                let result = executor
                    .execute(ctx, move |ctx: Context| async move {
                        tokio::select! {
                            _ = ctx.cancelled() => {
                                return Err(OperationError::permanent("attempt abandoned"));
                            }
                            _ = tokio::time::sleep(latency) => {}
                        }
                        let fail = rand::thread_rng().gen_bool(failure_rate);
                        if fail {
                            Err(OperationError::transient("synthetic failure"))
                        } else {
                            Ok(())
                        }
                    })
                    .await;
                match result {
                    Ok(()) => "ok".to_string(),
                    Err(e) => e.kind().to_string(),
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut tally: BTreeMap<String, u32> = BTreeMap::new();
    for outcome in outcomes {
        *tally.entry(outcome).or_default() += 1;
    }

    let report = serde_json::json!({
        "target": target,
        "calls": calls,
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "outcomes": tally,
        "circuit_breaker": executor
            .policy()
            .and_then(|p| p.circuit_breaker())
            .map(|cb| cb.stats()),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn watch(provider: Arc<Provider>, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let _handle = watcher.run()?;

    let signal = wait_for_shutdown();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match config.apply(&provider) {
                    Ok(added) => tracing::info!(
                        added,
                        targets = provider.targets().len(),
                        "Configuration applied"
                    ),
                    Err(e) => tracing::error!(error = %e, "Failed to apply configuration"),
                }
            }
            res = &mut signal => {
                let signal = res?;
                tracing::info!(signal, "Shutdown signal received");
                break;
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
