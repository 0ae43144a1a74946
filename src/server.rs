use std::{
    future::Future,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;
use warp::Filter;

use crate::{config::TrainingConfig, render::Frame, trainer::EpisodeReport};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrainingProgress {
    pub(crate) run_id: Uuid,
    pub(crate) config: TrainingConfig,
    pub(crate) episodes: Vec<EpisodeReport>,
    pub(crate) learned_states: usize,
    pub(crate) complete: bool,
}

/// Episode history shared between the trainer and the HTTP routes.
#[derive(Clone)]
pub(crate) struct ProgressBoard(Arc<Mutex<TrainingProgress>>);

impl ProgressBoard {
    pub(crate) fn new(run_id: Uuid, config: TrainingConfig) -> Self {
        ProgressBoard(Arc::new(Mutex::new(TrainingProgress {
            run_id,
            config,
            episodes: Vec::new(),
            learned_states: 0,
            complete: false,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, TrainingProgress> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, report: EpisodeReport) {
        self.lock().episodes.push(report);
    }

    pub(crate) fn finish(&self, learned_states: usize) {
        let mut progress = self.lock();
        progress.learned_states = learned_states;
        progress.complete = true;
    }

    pub(crate) fn snapshot(&self) -> TrainingProgress {
        self.lock().clone()
    }
}

pub(crate) fn routes(
    frames: watch::Receiver<Frame>,
    board: ProgressBoard,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state = warp::path!("world" / "state")
        .and(warp::get())
        .map(move || {
            let frame = *frames.borrow();
            warp::reply::json(&frame)
        });

    let progress = warp::path!("world" / "progress")
        .and(warp::get())
        .map(move || warp::reply::json(&board.snapshot()));

    state.or(progress)
}

/// Binds the read-only world routes. The returned future serves until
/// `shutdown` resolves.
pub(crate) fn bind_http_server(
    addr: SocketAddr,
    frames: watch::Receiver<Frame>,
    board: ProgressBoard,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()> + Send)> {
    warp::serve(routes(frames, board))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("failed to bind world server on {addr}"))
}
