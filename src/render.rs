use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::frame_period,
    engine::{GridWorld, WorldSnapshot},
};

pub(crate) trait RenderSurface {
    fn render(&mut self, world: &WorldSnapshot);
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Frame {
    pub(crate) run_id: Uuid,
    pub(crate) episode: usize,
    pub(crate) step: usize,
    pub(crate) world: WorldSnapshot,
}

pub(crate) trait FrameSink {
    fn draw(&mut self, frame: &Frame) -> Result<()>;
}

/// Single writer side of the frame channel. Readers only ever see whole
/// frames, published after a `reset` or `step` has completed.
pub(crate) struct SnapshotPublisher {
    run_id: Uuid,
    episode: usize,
    step: usize,
    sender: watch::Sender<Frame>,
}

impl SnapshotPublisher {
    pub(crate) fn channel(run_id: Uuid, world: &GridWorld) -> (Self, watch::Receiver<Frame>) {
        let (sender, receiver) = watch::channel(Frame {
            run_id,
            episode: 0,
            step: 0,
            world: world.snapshot(),
        });
        let publisher = SnapshotPublisher {
            run_id,
            episode: 0,
            step: 0,
            sender,
        };
        (publisher, receiver)
    }

    pub(crate) fn set_clock(&mut self, episode: usize, step: usize) {
        self.episode = episode;
        self.step = step;
    }
}

impl RenderSurface for SnapshotPublisher {
    fn render(&mut self, world: &WorldSnapshot) {
        self.sender.send_replace(Frame {
            run_id: self.run_id,
            episode: self.episode,
            step: self.step,
            world: *world,
        });
    }
}

/// Redraws the latest frame at a fixed rate until the publisher goes away,
/// then draws the final frame once more and hands the sink back.
pub(crate) async fn render_loop<S: FrameSink>(
    mut frames: watch::Receiver<Frame>,
    mut sink: S,
    fps: f64,
) -> Result<S> {
    let mut ticker = time::interval(frame_period(fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut drawn = 0usize;
    loop {
        ticker.tick().await;
        let closed = frames.has_changed().is_err();
        let frame = *frames.borrow_and_update();
        sink.draw(&frame)?;
        drawn += 1;
        if closed {
            break;
        }
    }

    debug!(drawn, "render loop finished");
    Ok(sink)
}
