use std::fmt;

use glam::DVec3;
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{error::SimError, render::RenderSurface};

pub(crate) const NUM_ACTIONS: usize = 5;
pub(crate) const BOUND: f64 = 10.0;
const TARGET_RANGE: i64 = 8;
/// Height of the agent and target above the floor. Visual only.
pub(crate) const VISUAL_OFFSET: f64 = 0.5;
const GOAL_RADIUS: f64 = 1.0;
const GOAL_REWARD: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Action {
    North,
    South,
    West,
    East,
    Stay,
}

impl Action {
    /// Index order is shared by the Q-table columns and action selection.
    pub(crate) const ALL: [Action; NUM_ACTIONS] = [
        Action::North,
        Action::South,
        Action::West,
        Action::East,
        Action::Stay,
    ];

    pub(crate) fn from_index(index: usize) -> Result<Self, SimError> {
        Self::ALL.get(index).copied().ok_or(SimError::InvalidAction {
            index,
            len: NUM_ACTIONS,
        })
    }

    pub(crate) fn displacement(self) -> DVec3 {
        match self {
            Action::North => DVec3::new(0.0, 0.0, -1.0),
            Action::South => DVec3::new(0.0, 0.0, 1.0),
            Action::West => DVec3::new(-1.0, 0.0, 0.0),
            Action::East => DVec3::new(1.0, 0.0, 0.0),
            Action::Stay => DVec3::ZERO,
        }
    }
}

/// Agent position rounded onto the integer lattice of the floor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct StateKey {
    pub(crate) x: i64,
    pub(crate) z: i64,
}

impl StateKey {
    #[cfg(test)]
    pub(crate) fn new(x: i64, z: i64) -> Self {
        StateKey { x, z }
    }

    pub(crate) fn from_position(position: DVec3) -> Self {
        StateKey {
            x: position.x.round() as i64,
            z: position.z.round() as i64,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.z)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Transition {
    pub(crate) state: StateKey,
    pub(crate) reward: f64,
    pub(crate) done: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct WorldSnapshot {
    pub(crate) agent: DVec3,
    pub(crate) target: DVec3,
    pub(crate) state: StateKey,
    pub(crate) bound: f64,
}

impl WorldSnapshot {
    pub(crate) fn distance(&self) -> f64 {
        self.agent.distance(self.target)
    }
}

pub(crate) struct GridWorld {
    agent: DVec3,
    target: DVec3,
    rng: StdRng,
}

impl GridWorld {
    pub(crate) fn new(rng: StdRng) -> Self {
        let mut world = GridWorld {
            agent: DVec3::new(0.0, VISUAL_OFFSET, 0.0),
            target: DVec3::new(0.0, VISUAL_OFFSET, 0.0),
            rng,
        };
        world.reset();
        world
    }

    pub(crate) fn reset(&mut self) -> StateKey {
        self.agent = DVec3::new(0.0, VISUAL_OFFSET, 0.0);
        let tx = self.rng.gen_range(-TARGET_RANGE..=TARGET_RANGE);
        let tz = self.rng.gen_range(-TARGET_RANGE..=TARGET_RANGE);
        self.target = DVec3::new(tx as f64, VISUAL_OFFSET, tz as f64);
        self.state_key()
    }

    pub(crate) fn step(&mut self, action_index: usize) -> Result<Transition, SimError> {
        let action = Action::from_index(action_index)?;

        let moved = self.agent + action.displacement();
        self.agent = DVec3::new(
            moved.x.clamp(-BOUND, BOUND),
            moved.y,
            moved.z.clamp(-BOUND, BOUND),
        );

        let distance = self.agent.distance(self.target);
        let (reward, done) = if distance < GOAL_RADIUS {
            (GOAL_REWARD, true)
        } else {
            (-distance, false)
        };

        Ok(Transition {
            state: self.state_key(),
            reward,
            done,
        })
    }

    pub(crate) fn state_key(&self) -> StateKey {
        StateKey::from_position(self.agent)
    }

    pub(crate) fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            agent: self.agent,
            target: self.target,
            state: self.state_key(),
            bound: BOUND,
        }
    }

    pub(crate) fn render<S: RenderSurface>(&self, surface: &mut S) {
        surface.render(&self.snapshot());
    }

    #[cfg(test)]
    pub(crate) fn place_target(&mut self, x: f64, z: f64) {
        self.target = DVec3::new(x, VISUAL_OFFSET, z);
    }
}
