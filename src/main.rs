use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tactician::cli::{self, Cli, Commands};
use tactician::config::AppConfig;
use tactician::decision::DecisionResolver;
use tactician::error::Result;
use tactician::logging::{init_logging, init_logging_simple};
use tactician::oracle::{DecisionOracle, HttpOracle, RuleOracle};
use tactician::simulation::Simulation;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::CheckConfig => {
            init_logging_simple();
            let config = AppConfig::load_validated(&cli.config_dir)?;
            cli::print_config_summary(&config);
        }
        Commands::Fingerprint {
            agent,
            health,
            hostiles,
            allies,
            mood,
        } => {
            init_logging_simple();
            cli::print_fingerprint(&agent, health, hostiles, allies, &mood)?;
        }
        Commands::Simulate {
            agents,
            ticks,
            tick_ms,
            offline,
            latency_ms,
            seed,
        } => {
            // Bounds must be valid before any request is served.
            let config = AppConfig::load_validated(&cli.config_dir)?;
            init_logging(&config.logging);
            run_simulation(&config, agents, ticks, tick_ms, offline, latency_ms, seed).await?;
        }
    }
    Ok(())
}

async fn run_simulation(
    config: &AppConfig,
    agents: usize,
    ticks: u64,
    tick_ms: u64,
    offline: bool,
    latency_ms: u64,
    seed: u64,
) -> Result<()> {
    let oracle: Arc<dyn DecisionOracle> = if offline {
        info!("Using offline rule oracle ({}ms latency)", latency_ms);
        Arc::new(RuleOracle::with_latency(Duration::from_millis(latency_ms)))
    } else {
        let oracle = HttpOracle::new(config.oracle.clone())?;
        info!("Using decision service model {}", oracle.model());
        Arc::new(oracle)
    };

    let resolver = Arc::new(DecisionResolver::from_config(config, oracle));
    let mut sim = Simulation::new(resolver.clone(), config.world.clone(), agents, seed);
    info!(
        agents = sim.agent_count(),
        ticks,
        max_concurrent = config.admission.max_concurrent,
        ttl_ms = config.cache.ttl_ms,
        "Starting simulation"
    );

    tokio::select! {
        _ = sim.run(ticks, Duration::from_millis(tick_ms)) => {}
        _ = shutdown_signal() => info!("Interrupted, stopping simulation"),
    }

    resolver.shutdown();
    let stats = resolver.stats();
    println!(
        "requests={} hits={} ({:.1}%) calls={} shared={} fallbacks={} peak_in_flight={}/{}",
        stats.requests,
        stats.hits,
        stats.hit_rate() * 100.0,
        stats.calls,
        stats.shared,
        stats.fallbacks(),
        resolver.gate().peak_in_flight(),
        resolver.gate().max_concurrent(),
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
