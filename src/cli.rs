use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::decision::derive_key;
use crate::domain::{Mood, Situation};

#[derive(Parser)]
#[command(name = "tactician")]
#[command(author = "Tactician Team")]
#[command(version = "0.1.0")]
#[command(about = "LLM decision cache and admission gate for multi-agent simulations", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", global = true)]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate configuration, then print the effective bounds
    CheckConfig,
    /// Print the cache fingerprint for a situation
    Fingerprint {
        /// Agent identifier
        #[arg(short, long)]
        agent: String,
        /// Health percentage (already bucketed)
        #[arg(long, default_value = "100")]
        health: u8,
        /// Hostile entities nearby
        #[arg(long, default_value = "0")]
        hostiles: u32,
        /// Friendly entities nearby
        #[arg(long, default_value = "0")]
        allies: u32,
        /// Mood label (calm, alert, afraid, angry, confident)
        #[arg(long, default_value = "calm")]
        mood: String,
    },
    /// Drive the resolver with a small simulated world
    Simulate {
        /// Number of agents (capped by world.max_agents)
        #[arg(short, long, default_value = "20")]
        agents: usize,
        /// Number of ticks to run
        #[arg(short, long, default_value = "30")]
        ticks: u64,
        /// Minimum tick duration in milliseconds
        #[arg(long, default_value = "250")]
        tick_ms: u64,
        /// Use the offline rule oracle instead of the configured LLM
        #[arg(long)]
        offline: bool,
        /// Artificial latency of the offline oracle in milliseconds
        #[arg(long, default_value = "150")]
        latency_ms: u64,
        /// RNG seed for the world
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

/// Print the effective configuration summary
pub fn print_config_summary(config: &AppConfig) {
    println!("Configuration OK");
    println!(
        "  cache:      ttl={}ms max_entries={} strict_capacity={}",
        config.cache.ttl_ms, config.cache.max_entries, config.cache.strict_capacity
    );
    println!(
        "  admission:  max_concurrent={} acquire_timeout={}ms single_flight={}",
        config.admission.max_concurrent,
        config.admission.acquire_timeout_ms,
        config.admission.single_flight
    );
    let allowed = if config.oracle.allowed_models.is_empty() {
        "any".to_string()
    } else {
        config.oracle.allowed_models.join(", ")
    };
    println!(
        "  oracle:     model={} allowed=[{}] timeout={}s credential={}",
        config.oracle.model,
        allowed,
        config.oracle.timeout_secs,
        if config.oracle.is_configured() { "set" } else { "missing" }
    );
    println!(
        "  world:      {}x{} max_agents={} heartbeat_timeout={}s",
        config.world.width,
        config.world.height,
        config.world.max_agents,
        config.agents.heartbeat_timeout_secs
    );
}

/// Build the situation passed on the command line and print its fingerprint
pub fn print_fingerprint(
    agent: &str,
    health: u8,
    hostiles: u32,
    allies: u32,
    mood: &str,
) -> crate::error::Result<()> {
    let mood: Mood = mood
        .parse()
        .map_err(crate::error::TacticianError::Configuration)?;
    let situation = Situation::new(health, hostiles, allies, mood);
    println!("{}", derive_key(agent, &situation));
    Ok(())
}
