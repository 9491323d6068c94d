//! Demo tick loop driving the resolver
//!
//! Agents of two factions wander a bounded world. Each tick every agent
//! observes its neighbourhood, asks the resolver for a decision concurrently,
//! and applies a crude outcome. Situations are bucketed the same way a real
//! simulation would, so repeated situations produce cache hits.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::config::WorldConfig;
use crate::decision::{DecisionResolver, DecisionSource};
use crate::domain::{Action, Mood, Situation};

const PERCEPTION_RADIUS: f32 = 12.0;
const HEALTH_BUCKET: u8 = 20;
const MAX_HEALTH: f32 = 100.0;

#[derive(Debug, Clone)]
struct SimAgent {
    id: String,
    faction: u8,
    x: f32,
    y: f32,
    health: f32,
}

/// Per-tick outcome counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub fresh: usize,
    pub cached: usize,
    pub shared: usize,
    pub fallback: usize,
    pub elapsed_ms: u64,
}

pub struct Simulation {
    resolver: Arc<DecisionResolver>,
    world: WorldConfig,
    agents: Vec<SimAgent>,
    rng: StdRng,
    tick: u64,
}

impl Simulation {
    /// Spawn `agent_count` agents (capped at `world.max_agents`)
    pub fn new(
        resolver: Arc<DecisionResolver>,
        world: WorldConfig,
        agent_count: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let count = agent_count.min(world.max_agents);
        let agents = (0..count)
            .map(|i| SimAgent {
                id: format!("agent-{i}"),
                faction: (i % 2) as u8,
                x: rng.gen_range(0.0..world.width as f32),
                y: rng.gen_range(0.0..world.height as f32),
                health: MAX_HEALTH,
            })
            .collect();

        Self {
            resolver,
            world,
            agents,
            rng,
            tick: 0,
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn observe(&self, idx: usize) -> Situation {
        let me = &self.agents[idx];
        let (mut hostiles, mut allies) = (0u32, 0u32);
        for (j, other) in self.agents.iter().enumerate() {
            if j == idx || other.health <= 0.0 {
                continue;
            }
            let dist = ((other.x - me.x).powi(2) + (other.y - me.y).powi(2)).sqrt();
            if dist <= PERCEPTION_RADIUS {
                if other.faction == me.faction {
                    allies += 1;
                } else {
                    hostiles += 1;
                }
            }
        }

        let health = Situation::bucket_health(me.health, MAX_HEALTH, HEALTH_BUCKET);
        let mood = match (health, hostiles) {
            (h, n) if h < 40 && n > 0 => Mood::Afraid,
            (_, n) if n > allies + 1 => Mood::Alert,
            (h, n) if h >= 80 && n > 0 => Mood::Confident,
            (_, n) if n > 0 => Mood::Angry,
            _ => Mood::Calm,
        };
        Situation::new(health, hostiles, allies, mood)
    }

    fn apply(&mut self, idx: usize, action: Action, situation: &Situation) {
        let (w, h) = (self.world.width as f32, self.world.height as f32);
        let rng = &mut self.rng;
        let agent = &mut self.agents[idx];

        let step = match action {
            Action::Retreat => 3.0,
            Action::Explore | Action::Gather => 1.5,
            _ => 0.5,
        };
        agent.x = (agent.x + rng.gen_range(-step..=step)).clamp(0.0, w);
        agent.y = (agent.y + rng.gen_range(-step..=step)).clamp(0.0, h);

        let damage = situation.hostiles_nearby as f32 * rng.gen_range(0.0..4.0);
        let damage = match action {
            Action::Defend => damage * 0.4,
            Action::Retreat => damage * 0.6,
            _ => damage,
        };
        let healing = match action {
            Action::Heal => 8.0,
            Action::Idle | Action::Socialize => 2.0,
            _ => 0.5,
        };
        agent.health = (agent.health - damage + healing).clamp(0.0, MAX_HEALTH);
        if agent.health <= 0.0 {
            // Respawn somewhere else at full health
            agent.health = MAX_HEALTH;
            agent.x = rng.gen_range(0.0..w);
            agent.y = rng.gen_range(0.0..h);
        }
    }

    /// Run one tick: observe, resolve all agents concurrently, apply
    pub async fn step(&mut self) -> TickReport {
        self.tick += 1;
        let started = Instant::now();

        let observations: Vec<(String, Situation)> = (0..self.agents.len())
            .map(|i| (self.agents[i].id.clone(), self.observe(i)))
            .collect();

        let resolutions = join_all(observations.iter().map(|(id, situation)| {
            let resolver = self.resolver.clone();
            async move { resolver.resolve(id, situation).await }
        }))
        .await;

        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };
        for (idx, ((_, situation), resolution)) in
            observations.iter().zip(resolutions.iter()).enumerate()
        {
            match resolution.source {
                DecisionSource::Fresh => report.fresh += 1,
                DecisionSource::Cached => report.cached += 1,
                DecisionSource::Shared => report.shared += 1,
                DecisionSource::Fallback(_) => report.fallback += 1,
            }
            self.apply(idx, resolution.decision.action, situation);
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report
    }

    /// Run `ticks` ticks, sleeping so each tick takes at least `tick_interval`
    pub async fn run(&mut self, ticks: u64, tick_interval: Duration) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(ticks as usize);
        for _ in 0..ticks {
            let started = Instant::now();
            let report = self.step().await;
            info!(
                tick = report.tick,
                fresh = report.fresh,
                cached = report.cached,
                shared = report.shared,
                fallback = report.fallback,
                elapsed_ms = report.elapsed_ms,
                "tick complete"
            );
            reports.push(report);

            let spent = started.elapsed();
            if spent < tick_interval {
                tokio::time::sleep(tick_interval - spent).await;
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{AdmissionGate, DecisionCache};
    use crate::oracle::RuleOracle;

    fn resolver() -> Arc<DecisionResolver> {
        Arc::new(DecisionResolver::new(
            DecisionCache::new(Duration::from_secs(60), 200),
            AdmissionGate::new(5),
            Arc::new(RuleOracle::new()),
        ))
    }

    #[test]
    fn test_agent_count_capped_by_world() {
        let world = WorldConfig {
            max_agents: 4,
            ..Default::default()
        };
        let sim = Simulation::new(resolver(), world, 10, 7);
        assert_eq!(sim.agent_count(), 4);
    }

    #[tokio::test]
    async fn test_ticks_produce_cache_hits() {
        let resolver = resolver();
        let mut sim = Simulation::new(resolver.clone(), WorldConfig::default(), 12, 42);

        let reports = sim.run(5, Duration::ZERO).await;
        assert_eq!(reports.len(), 5);
        for report in &reports {
            assert_eq!(
                report.fresh + report.cached + report.shared + report.fallback,
                12
            );
            assert_eq!(report.fallback, 0);
        }
        // Agents start at full health and mostly out of range: repeats hit the cache.
        assert!(resolver.stats().hits > 0);
        assert_eq!(resolver.stats().requests, 60);
    }
}
