use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{
    app::SessionOptions,
    config::{TrainingConfig, ViewConfig},
};

mod agent;
mod app;
mod client;
mod config;
mod engine;
mod error;
mod render;
mod server;
mod trainer;
mod transport;
mod ui;

/// Tabular Q-learning on a bounded grid: an agent learns to walk onto a target.
#[derive(Parser)]
#[command(name = "seeker", version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    train: TrainArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Train an agent (the default when no subcommand is given).
    Train(TrainArgs),
    /// Draw the world of a training session started with `train --serve`.
    Watch(WatchArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// JSON file with training settings; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    episodes: Option<usize>,
    #[arg(long)]
    max_steps: Option<usize>,
    #[arg(long)]
    lr: Option<f64>,
    #[arg(long)]
    gamma: Option<f64>,
    #[arg(long)]
    epsilon: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Yield to the scheduler after every step, not just between episodes.
    #[arg(long)]
    yield_every_step: bool,
    /// Sleep this long after every step so the run can be watched.
    #[arg(long)]
    step_delay_ms: Option<u64>,
    /// Draw the world in this terminal while training.
    #[arg(long)]
    render: bool,
    /// Serve world state and progress over HTTP on this address.
    #[arg(long)]
    serve: Option<SocketAddr>,
    /// Keep serving after training finishes, until Ctrl-C.
    #[arg(long, requires = "serve")]
    linger: bool,
    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long, default_value = "http://127.0.0.1:3030")]
    url: String,
    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Args)]
struct ViewArgs {
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Columns used to draw the floor.
    #[arg(long, default_value_t = 21)]
    width: usize,
    /// Rows used to draw the floor.
    #[arg(long, default_value_t = 21)]
    height: usize,
}

impl ViewArgs {
    fn into_config(self) -> Result<ViewConfig> {
        let view = ViewConfig {
            fps: self.fps,
            width: self.width,
            height: self.height,
        };
        view.validate()?;
        Ok(view)
    }
}

impl TrainArgs {
    fn into_config(self) -> Result<(TrainingConfig, SessionOptions)> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)?,
            None => TrainingConfig::default(),
        };
        if let Some(episodes) = self.episodes {
            config.max_episodes = episodes;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps_per_episode = max_steps;
        }
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if let Some(gamma) = self.gamma {
            config.discount = gamma;
        }
        if let Some(epsilon) = self.epsilon {
            config.epsilon = epsilon;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(step_delay_ms) = self.step_delay_ms {
            config.step_delay_ms = step_delay_ms;
        }
        config.yield_every_step |= self.yield_every_step;
        config.validate()?;

        let options = SessionOptions {
            view: self.view.into_config()?,
            render: self.render,
            serve: self.serve,
            linger: self.linger,
        };
        Ok((config, options))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Train(cli.train)) {
        Command::Train(args) => {
            let (config, options) = args.into_config()?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(app::run_training(config, options))?;
            Ok(())
        }
        Command::Watch(args) => app::run_viewer(&args.url, args.view.into_config()?),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_trains_with_defaults() {
        let cli = Cli::try_parse_from(["seeker"]).unwrap();
        assert!(cli.command.is_none());
        let (config, options) = cli.train.into_config().unwrap();
        assert_eq!(config, TrainingConfig::default());
        assert_eq!(options.view, ViewConfig::default());
        assert!(!options.render);
        assert!(options.serve.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "seeker", "train", "--episodes", "7", "--max-steps", "40", "--lr", "0.5",
            "--gamma", "0.9", "--epsilon", "0", "--seed", "11", "--serve", "127.0.0.1:3030",
            "--linger", "--fps", "12",
        ])
        .unwrap();
        let Some(Command::Train(args)) = cli.command else {
            panic!("expected train subcommand");
        };
        let (config, options) = args.into_config().unwrap();
        assert_eq!(config.max_episodes, 7);
        assert_eq!(config.max_steps_per_episode, 40);
        assert_eq!(config.learning_rate, 0.5);
        assert_eq!(config.discount, 0.9);
        assert_eq!(config.epsilon, 0.0);
        assert_eq!(config.seed, Some(11));
        assert_eq!(options.serve, Some(([127, 0, 0, 1], 3030).into()));
        assert!(options.linger);
        assert_eq!(options.view.fps, 12.0);
    }

    #[test]
    fn out_of_range_hyperparameters_are_rejected() {
        let cli = Cli::try_parse_from(["seeker", "--epsilon", "1.5"]).unwrap();
        let err = cli.train.into_config().unwrap_err();
        assert_eq!(err.to_string(), "epsilon must be in [0, 1], got 1.5");
    }

    #[test]
    fn linger_needs_serve() {
        assert!(Cli::try_parse_from(["seeker", "train", "--linger"]).is_err());
    }
}
