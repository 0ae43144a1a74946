use std::collections::HashMap;

use rand::{rngs::StdRng, Rng};

use crate::{
    engine::{Action, StateKey, NUM_ACTIONS},
    error::SimError,
};

type QRow = [f64; NUM_ACTIONS];

pub(crate) struct QLearningAgent {
    q_table: HashMap<StateKey, QRow>,
    learning_rate: f64,
    discount: f64,
    epsilon: f64,
    rng: StdRng,
}

impl QLearningAgent {
    pub(crate) fn new(learning_rate: f64, discount: f64, epsilon: f64, rng: StdRng) -> Self {
        QLearningAgent {
            q_table: HashMap::new(),
            learning_rate,
            discount,
            epsilon,
            rng,
        }
    }

    fn row(&mut self, state: StateKey) -> &mut QRow {
        self.q_table.entry(state).or_insert([0.0; NUM_ACTIONS])
    }

    pub(crate) fn select_action(&mut self, state: StateKey) -> usize {
        let values = *self.row(state);
        if self.rng.gen::<f64>() < self.epsilon {
            self.rng.gen_range(0..NUM_ACTIONS)
        } else {
            first_argmax(&values)
        }
    }

    pub(crate) fn update(
        &mut self,
        state: StateKey,
        action: usize,
        reward: f64,
        next_state: StateKey,
    ) -> Result<(), SimError> {
        if action >= NUM_ACTIONS {
            return Err(SimError::InvalidAction {
                index: action,
                len: NUM_ACTIONS,
            });
        }

        let max_next = self
            .row(next_state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let (learning_rate, discount) = (self.learning_rate, self.discount);

        let values = self.row(state);
        values[action] += learning_rate * (reward + discount * max_next - values[action]);
        Ok(())
    }

    pub(crate) fn q_values(&self, state: StateKey) -> Option<&QRow> {
        self.q_table.get(&state)
    }

    pub(crate) fn learned_states(&self) -> usize {
        self.q_table.len()
    }

    /// Greedy action for every state seen so far, ordered by state.
    pub(crate) fn greedy_policy(&self) -> Vec<(StateKey, Action)> {
        let mut policy = self
            .q_table
            .iter()
            .map(|(state, values)| (*state, Action::ALL[first_argmax(values)]))
            .collect::<Vec<_>>();
        policy.sort_by_key(|(state, _)| *state);
        policy
    }
}

// Ties go to the lowest index.
fn first_argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |best, (index, &value)| if value > values[best] { index } else { best })
}
