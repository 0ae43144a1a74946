use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    agent::QLearningAgent,
    client::RemoteViewer,
    config::{TrainingConfig, ViewConfig},
    engine::GridWorld,
    render::{render_loop, Frame, SnapshotPublisher},
    server::{bind_http_server, ProgressBoard},
    trainer::{Trainer, TrainingOutcome},
    transport::WorldApiClient,
    ui::TerminalSurface,
};

#[derive(Clone, Copy, Debug)]
pub(crate) struct SessionOptions {
    pub(crate) view: ViewConfig,
    pub(crate) render: bool,
    pub(crate) serve: Option<SocketAddr>,
    pub(crate) linger: bool,
}

/// One training session: the trainer task plus whichever viewers were asked
/// for. Viewers only ever read published frames.
pub(crate) async fn run_training(
    config: TrainingConfig,
    options: SessionOptions,
) -> Result<TrainingOutcome> {
    let run_id = Uuid::new_v4();
    let (world_rng, agent_rng) = config.rngs();
    let world = GridWorld::new(world_rng);
    let agent = QLearningAgent::new(
        config.learning_rate,
        config.discount,
        config.epsilon,
        agent_rng,
    );
    let (publisher, frames) = SnapshotPublisher::channel(run_id, &world);
    let board = ProgressBoard::new(run_id, config.clone());
    info!(%run_id, ?config, "starting training session");

    let server = match options.serve {
        Some(addr) => {
            let (bound, server) = ServerTask::spawn(addr, frames.clone(), board.clone())?;
            info!(%bound, "serving world state");
            Some(server)
        }
        None => None,
    };

    let renderer = options.render.then(|| {
        let surface = TerminalSurface::stdout(options.view.width, options.view.height);
        let frames = frames.clone();
        let fps = options.view.fps;
        tokio::spawn(async move { render_loop(frames, surface, fps).await.map(drop) })
    });
    drop(frames);

    let trainer = Trainer::new(world, agent, config, publisher);
    let trained = trainer
        .train(|report| {
            board.record(*report);
            info!(
                episode = report.episode,
                steps = report.steps,
                reached_target = report.reached_target,
                total_reward = report.total_reward,
                "Episode {} finished in {} steps.",
                report.episode,
                report.steps
            );
        })
        .await;
    if let Ok(outcome) = &trained {
        board.finish(outcome.agent.learned_states());
        summarize(outcome);
    }

    finish_session(trained.map_err(Into::into), renderer, server, options.linger).await
}

struct ServerTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ServerTask {
    fn spawn(
        addr: SocketAddr,
        frames: watch::Receiver<Frame>,
        board: ProgressBoard,
    ) -> Result<(SocketAddr, Self)> {
        let (stop, stopped) = oneshot::channel::<()>();
        let (bound, serve) = bind_http_server(addr, frames, board, async move {
            let _ = stopped.await;
        })?;
        let handle = tokio::spawn(serve);
        Ok((bound, ServerTask { stop, handle }))
    }

    async fn shutdown(self) -> Result<()> {
        let _ = self.stop.send(());
        self.handle.await.context("world server panicked")
    }
}

/// Waits for the renderer and stops the server whether or not training
/// succeeded. The first failure wins.
async fn finish_session(
    trained: Result<TrainingOutcome>,
    renderer: Option<JoinHandle<Result<()>>>,
    server: Option<ServerTask>,
    linger: bool,
) -> Result<TrainingOutcome> {
    let rendered = match renderer {
        Some(renderer) => renderer
            .await
            .context("render loop panicked")
            .and_then(|result| result),
        None => Ok(()),
    };

    let mut lingered = Ok(());
    let mut served = Ok(());
    if let Some(server) = server {
        if linger && trained.is_ok() && rendered.is_ok() {
            info!("training finished; still serving, press Ctrl-C to stop");
            lingered = tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C");
        }
        served = server.shutdown().await;
    }
    if let Err(err) = &trained {
        warn!(error = %err, "training aborted");
    }

    let outcome = trained?;
    rendered?;
    lingered?;
    served?;
    Ok(outcome)
}

fn summarize(outcome: &TrainingOutcome) {
    let reached = outcome.reports.iter().filter(|r| r.reached_target).count();
    let tail = &outcome.reports[outcome.reports.len().saturating_sub(10)..];
    let recent_steps = tail.iter().map(|r| r.steps).sum::<usize>() as f64 / tail.len().max(1) as f64;
    info!(
        episodes = outcome.reports.len(),
        reached,
        recent_mean_steps = recent_steps,
        learned_states = outcome.agent.learned_states(),
        "training summary"
    );
    for (state, action) in outcome.agent.greedy_policy() {
        let values = outcome.agent.q_values(state);
        debug!(%state, ?action, ?values, "greedy action");
    }
}

pub(crate) fn run_viewer(url: &str, view: ViewConfig) -> Result<()> {
    let surface = TerminalSurface::stdout(view.width, view.height);
    let mut viewer = RemoteViewer::new(WorldApiClient::new(url), surface, view.fps);
    let drawn = viewer.run()?;
    info!(drawn, "viewer finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use tokio::net::TcpStream;

    use super::*;
    use crate::{error::SimError, render::FrameSink};

    fn options(serve: Option<SocketAddr>) -> SessionOptions {
        SessionOptions {
            view: ViewConfig::default(),
            render: false,
            serve,
            linger: false,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn headless_session_runs_all_episodes() {
        let config = TrainingConfig {
            max_episodes: 12,
            seed: Some(2024),
            ..TrainingConfig::default()
        };
        let outcome = run_training(config, options(None)).await.unwrap();
        assert_eq!(outcome.reports.len(), 12);
        assert!(outcome.agent.learned_states() > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn served_session_shuts_server_down() {
        let config = TrainingConfig {
            max_episodes: 3,
            seed: Some(7),
            ..TrainingConfig::default()
        };
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let outcome = run_training(config, options(Some(addr))).await.unwrap();
        assert_eq!(outcome.reports.len(), 3);
    }

    fn idle_server() -> (SocketAddr, ServerTask) {
        let world = GridWorld::new(StdRng::seed_from_u64(1));
        let run_id = Uuid::new_v4();
        let (_publisher, frames) = SnapshotPublisher::channel(run_id, &world);
        let board = ProgressBoard::new(run_id, TrainingConfig::default());
        ServerTask::spawn(([127, 0, 0, 1], 0).into(), frames, board).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_training_still_stops_the_server() {
        let (bound, server) = idle_server();
        TcpStream::connect(bound).await.unwrap();

        let trained = Err(SimError::InvalidAction { index: 7, len: 5 }.into());
        let err = finish_session(trained, None, Some(server), true)
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<SimError>(),
            Some(&SimError::InvalidAction { index: 7, len: 5 })
        );
        assert!(TcpStream::connect(bound).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn broken_display_still_stops_the_server() {
        struct Broken;
        impl FrameSink for Broken {
            fn draw(&mut self, _frame: &Frame) -> Result<()> {
                anyhow::bail!("display went away")
            }
        }

        let (bound, server) = idle_server();
        let world = GridWorld::new(StdRng::seed_from_u64(2));
        let (_publisher, frames) = SnapshotPublisher::channel(Uuid::new_v4(), &world);
        let renderer = tokio::spawn(async move { render_loop(frames, Broken, 60.0).await.map(drop) });
        let outcome = TrainingOutcome {
            agent: QLearningAgent::new(0.1, 0.9, 0.1, StdRng::seed_from_u64(3)),
            reports: Vec::new(),
        };

        let err = finish_session(Ok(outcome), Some(renderer), Some(server), true)
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "display went away");
        assert!(TcpStream::connect(bound).await.is_err());
    }
}
