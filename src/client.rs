use std::{thread, time::Duration};

use anyhow::Result;
use tracing::info;

use crate::{config::frame_period, render::FrameSink, transport::WorldApiClient};

/// Polls a running `seeker train --serve` instance and draws what it sees.
pub(crate) struct RemoteViewer<S: FrameSink> {
    api_client: WorldApiClient,
    sink: S,
    frame_interval: Duration,
}

impl<S: FrameSink> RemoteViewer<S> {
    pub(crate) fn new(api_client: WorldApiClient, sink: S, fps: f64) -> Self {
        RemoteViewer {
            api_client,
            sink,
            frame_interval: frame_period(fps),
        }
    }

    /// Draws frames until the server reports the run it is showing as
    /// complete. Returns how many frames were drawn.
    pub(crate) fn run(&mut self) -> Result<usize> {
        let mut drawn = 0;
        loop {
            let progress = self.api_client.fetch_progress()?;
            let frame = self.api_client.fetch_frame()?;
            self.sink.draw(&frame)?;
            drawn += 1;

            if progress.complete && progress.run_id == frame.run_id {
                info!(
                    run_id = %progress.run_id,
                    episodes = progress.episodes.len(),
                    learned_states = progress.learned_states,
                    "remote training complete"
                );
                return Ok(drawn);
            }
            thread::sleep(self.frame_interval);
        }
    }

    #[cfg(test)]
    pub(crate) fn into_sink(self) -> S {
        self.sink
    }
}
