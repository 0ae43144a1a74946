use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    agent::QLearningAgent,
    config::TrainingConfig,
    engine::GridWorld,
    error::SimError,
    render::SnapshotPublisher,
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct EpisodeReport {
    pub(crate) episode: usize,
    pub(crate) steps: usize,
    pub(crate) reached_target: bool,
    pub(crate) total_reward: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    RunningEpisode,
    EpisodeDone,
}

impl Phase {
    fn allows(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::RunningEpisode)
                | (Phase::RunningEpisode, Phase::EpisodeDone)
                | (Phase::EpisodeDone, Phase::RunningEpisode)
                | (Phase::EpisodeDone, Phase::Idle)
        )
    }
}

pub(crate) struct TrainingOutcome {
    pub(crate) agent: QLearningAgent,
    pub(crate) reports: Vec<EpisodeReport>,
}

/// Drives episodes against the world. Owns the canonical world state and
/// publishes a frame after every reset and step.
pub(crate) struct Trainer {
    world: GridWorld,
    agent: QLearningAgent,
    config: TrainingConfig,
    publisher: SnapshotPublisher,
    phase: Phase,
    episodes_run: usize,
}

impl Trainer {
    pub(crate) fn new(
        world: GridWorld,
        agent: QLearningAgent,
        config: TrainingConfig,
        publisher: SnapshotPublisher,
    ) -> Self {
        Trainer {
            world,
            agent,
            config,
            publisher,
            phase: Phase::Idle,
            episodes_run: 0,
        }
    }

    /// Runs `max_episodes` episodes, yielding to the scheduler between them.
    /// The first world or agent error aborts the run.
    pub(crate) async fn train<F>(mut self, mut on_episode: F) -> Result<TrainingOutcome, SimError>
    where
        F: FnMut(&EpisodeReport),
    {
        let mut reports = Vec::with_capacity(self.config.max_episodes);
        loop {
            let report = self.run_episode().await?;
            on_episode(&report);
            reports.push(report);

            if self.episodes_run >= self.config.max_episodes {
                break;
            }
            tokio::task::yield_now().await;
        }

        self.enter(Phase::Idle);
        info!(
            episodes = reports.len(),
            learned_states = self.agent.learned_states(),
            "Training complete."
        );
        Ok(TrainingOutcome {
            agent: self.agent,
            reports,
        })
    }

    async fn run_episode(&mut self) -> Result<EpisodeReport, SimError> {
        self.enter(Phase::RunningEpisode);
        self.episodes_run += 1;
        let episode = self.episodes_run;

        let mut state = self.world.reset();
        self.publisher.set_clock(episode, 0);
        self.world.render(&mut self.publisher);

        let mut steps = 0;
        let mut done = false;
        let mut total_reward = 0.0;
        while !done && steps < self.config.max_steps_per_episode {
            let action = self.agent.select_action(state);
            let transition = self.world.step(action)?;
            self.agent
                .update(state, action, transition.reward, transition.state)?;

            state = transition.state;
            done = transition.done;
            total_reward += transition.reward;
            steps += 1;

            self.publisher.set_clock(episode, steps);
            self.world.render(&mut self.publisher);
            self.pace().await;
        }

        self.enter(Phase::EpisodeDone);
        Ok(EpisodeReport {
            episode,
            steps,
            reached_target: done,
            total_reward,
        })
    }

    async fn pace(&self) {
        if self.config.step_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
        } else if self.config.yield_every_step {
            tokio::task::yield_now().await;
        }
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase.allows(next),
            "trainer cannot go from {:?} to {:?}",
            self.phase,
            next
        );
        debug!(from = ?self.phase, to = ?next, episode = self.episodes_run, "trainer phase");
        self.phase = next;
    }
}
