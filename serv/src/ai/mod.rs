pub mod memory;
pub mod model;
pub mod orchestrator;

use std::path::Path;

use rand::Rng;

use comn::entities::{BotAction, OBSERVATION_LEN};

pub use memory::{Memory, Transition};
pub use model::{Model, ModelError, Optimizer};
pub use orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct Params {
    pub hidden_layers: Vec<usize>,
    pub batch_size: usize,
    pub memory_capacity: usize,
    pub discount: f32,
    pub learning_rate: f32,
    pub optimizer: Optimizer,
    pub max_epsilon: f32,
    pub min_epsilon: f32,
    pub epsilon_decay: f32,
    pub train_every: usize,
    pub promote_every: usize,
    pub perturbation: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 128],
            batch_size: 128,
            memory_capacity: 10_000,
            discount: 0.9,
            learning_rate: 0.001,
            optimizer: Optimizer::Adam,
            max_epsilon: 0.3,
            min_epsilon: 0.01,
            epsilon_decay: 0.005,
            train_every: 50,
            promote_every: 500,
            perturbation: 0.01,
        }
    }
}

impl Params {
    pub fn epsilon(&self, step: usize) -> f32 {
        self.min_epsilon
            + (self.max_epsilon - self.min_epsilon) * (-self.epsilon_decay * step as f32).exp()
    }

    pub fn new_model<R: Rng>(&self, rng: &mut R) -> Model {
        Model::new(
            OBSERVATION_LEN,
            &self.hidden_layers,
            BotAction::ALL.len(),
            self.optimizer,
            self.learning_rate,
            rng,
        )
    }

    /// Loads saved weights, rejecting files whose input or action count does
    /// not match the observation and action space.
    pub fn load_model(&self, path: &Path) -> Result<Model, ModelError> {
        let model = Model::load(path, self.optimizer, self.learning_rate)?;

        if model.num_inputs() != OBSERVATION_LEN || model.num_actions() != BotAction::ALL.len() {
            return Err(ModelError::ShapeMismatch);
        }

        Ok(model)
    }
}

/// Everything the agents share: hyperparameters, the replay memory and the
/// best model found so far.
pub struct TrainingContext {
    pub params: Params,
    pub memory: Memory,
    pub model: Model,
}

impl TrainingContext {
    pub fn new(params: Params, model: Model) -> Self {
        let memory = Memory::new(params.memory_capacity);

        Self {
            params,
            memory,
            model,
        }
    }

    /// Samples a batch and runs one Q-learning step on `model`. Returns the
    /// loss, or `None` if there is nothing to learn from yet.
    pub fn train_model<R: Rng>(&self, model: &mut Model, rng: &mut R) -> Option<f32> {
        let batch = self.memory.sample(self.params.batch_size, rng);
        if batch.is_empty() {
            return None;
        }

        let states: Vec<Vec<f32>> = batch.iter().map(|t| t.state.clone()).collect();
        let targets = td_targets(model, &batch, self.params.discount);

        Some(model.train(&states, &targets))
    }
}

/// Current predictions, with the taken action's value replaced by the
/// one-step return `r + discount * max Q(s', .)`.
pub fn td_targets(model: &Model, batch: &[&Transition], discount: f32) -> Vec<Vec<f32>> {
    let states: Vec<Vec<f32>> = batch.iter().map(|t| t.state.clone()).collect();
    let next_states: Vec<Vec<f32>> = batch.iter().map(|t| t.next_state.clone()).collect();

    let mut targets = model.predict(&states);
    let next_values = model.predict(&next_states);

    for ((target, transition), next) in targets.iter_mut().zip(batch).zip(&next_values) {
        let best_next = next.iter().copied().fold(std::f32::NEG_INFINITY, f32::max);
        target[transition.action.index()] = transition.reward + discount * best_next;
    }

    targets
}
