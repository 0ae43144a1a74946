use anyhow::{Context, Result};
use reqwest::blocking::Client;

use crate::{render::Frame, server::TrainingProgress};

#[derive(Clone)]
pub(crate) struct WorldApiClient {
    client: Client,
    base_url: String,
}

impl WorldApiClient {
    pub fn new(base_url: &str) -> Self {
        WorldApiClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn fetch_frame(&self) -> Result<Frame> {
        self.client
            .get(format!("{}/world/state", self.base_url))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())
            .with_context(|| format!("failed to fetch world state from {}", self.base_url))
    }

    pub fn fetch_progress(&self) -> Result<TrainingProgress> {
        self.client
            .get(format!("{}/world/progress", self.base_url))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())
            .with_context(|| format!("failed to fetch training progress from {}", self.base_url))
    }
}
