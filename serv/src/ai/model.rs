use std::{fs, io, path::Path};

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;

#[derive(Debug)]
pub enum ModelError {
    Io(io::Error),
    Format(serde_json::Error),
    ShapeMismatch,
}

impl From<io::Error> for ModelError {
    fn from(err: io::Error) -> Self {
        ModelError::Io(err)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Format(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Optimizer {
    Sgd,
    Adam,
}

/// Fully connected layer. `weights` is `outputs x inputs`, `biases` is a
/// single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub weights: DMatrix<f32>,
    pub biases: DMatrix<f32>,
}

impl Layer {
    fn new<R: Rng>(num_inputs: usize, num_outputs: usize, rng: &mut R) -> Self {
        let std = (2.0 / num_inputs.max(1) as f32).sqrt();

        Self {
            weights: DMatrix::from_fn(num_outputs, num_inputs, |_, _| {
                rng.sample::<f32, _>(StandardNormal) * std
            }),
            biases: DMatrix::zeros(num_outputs, 1),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: DMatrix::zeros(self.weights.nrows(), self.weights.ncols()),
            biases: DMatrix::zeros(self.biases.nrows(), 1),
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn num_outputs(&self) -> usize {
        self.weights.nrows()
    }

    /// Inputs are one column per sample.
    fn forward(&self, inputs: &DMatrix<f32>) -> DMatrix<f32> {
        let ones = DMatrix::from_element(1, inputs.ncols(), 1.0);
        &self.weights * inputs + &self.biases * ones
    }
}

#[derive(Debug, Clone)]
struct Moments {
    first: Layer,
    second: Layer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Weights {
    layers: Vec<Layer>,
}

/// Action-value function approximated by a ReLU network. Without hidden
/// layers it is a linear model.
#[derive(Debug, Clone)]
pub struct Model {
    layers: Vec<Layer>,
    optimizer: Optimizer,
    learning_rate: f32,
    moments: Vec<Moments>,
    num_steps: i32,
}

impl Model {
    pub fn new<R: Rng>(
        num_inputs: usize,
        hidden_layers: &[usize],
        num_actions: usize,
        optimizer: Optimizer,
        learning_rate: f32,
        rng: &mut R,
    ) -> Self {
        let sizes: Vec<usize> = std::iter::once(num_inputs)
            .chain(hidden_layers.iter().copied())
            .chain(std::iter::once(num_actions))
            .collect();
        let layers = sizes
            .windows(2)
            .map(|pair| Layer::new(pair[0], pair[1], rng))
            .collect();

        Self::with_layers(layers, optimizer, learning_rate)
    }

    pub fn from_layers(
        layers: Vec<Layer>,
        optimizer: Optimizer,
        learning_rate: f32,
    ) -> Result<Self, ModelError> {
        let consistent = !layers.is_empty()
            && layers
                .iter()
                .all(|layer| layer.biases.nrows() == layer.num_outputs() && layer.biases.ncols() == 1)
            && layers
                .windows(2)
                .all(|pair| pair[0].num_outputs() == pair[1].num_inputs());

        if consistent {
            Ok(Self::with_layers(layers, optimizer, learning_rate))
        } else {
            Err(ModelError::ShapeMismatch)
        }
    }

    fn with_layers(layers: Vec<Layer>, optimizer: Optimizer, learning_rate: f32) -> Self {
        let moments = layers
            .iter()
            .map(|layer| Moments {
                first: layer.zeros_like(),
                second: layer.zeros_like(),
            })
            .collect();

        Self {
            layers,
            optimizer,
            learning_rate,
            moments,
            num_steps: 0,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn num_inputs(&self) -> usize {
        self.layers.first().map_or(0, Layer::num_inputs)
    }

    pub fn num_actions(&self) -> usize {
        self.layers.last().map_or(0, Layer::num_outputs)
    }

    fn to_columns(&self, states: &[Vec<f32>]) -> DMatrix<f32> {
        debug_assert!(states.iter().all(|s| s.len() == self.num_inputs()));

        DMatrix::from_fn(self.num_inputs(), states.len(), |i, j| {
            states[j].get(i).copied().unwrap_or(0.0)
        })
    }

    /// Pre-activations and activations of every layer, input first.
    fn forward(&self, inputs: DMatrix<f32>) -> (Vec<DMatrix<f32>>, Vec<DMatrix<f32>>) {
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut activations = vec![inputs];

        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activations[activations.len() - 1]);
            let a = if i + 1 < self.layers.len() {
                z.map(|v| v.max(0.0))
            } else {
                z.clone()
            };

            pre_activations.push(z);
            activations.push(a);
        }

        (pre_activations, activations)
    }

    /// One action-value vector per state.
    pub fn predict(&self, states: &[Vec<f32>]) -> Vec<Vec<f32>> {
        if states.is_empty() {
            return Vec::new();
        }

        let (_, mut activations) = self.forward(self.to_columns(states));
        let output = activations.pop().unwrap_or_else(|| DMatrix::zeros(0, 0));

        output
            .column_iter()
            .map(|column| column.iter().copied().collect())
            .collect()
    }

    pub fn predict_one(&self, state: &[f32]) -> Vec<f32> {
        self.predict(&[state.to_vec()]).pop().unwrap_or_default()
    }

    /// Index of the highest value; the first one wins ties.
    pub fn greedy_action(&self, state: &[f32]) -> usize {
        argmax(&self.predict_one(state))
    }

    pub fn choose_action<R: Rng>(&self, state: &[f32], epsilon: f32, rng: &mut R) -> usize {
        if rng.gen::<f32>() < epsilon {
            rng.gen_range(0..self.num_actions())
        } else {
            self.greedy_action(state)
        }
    }

    /// One optimization step on the mean squared error over all outputs.
    /// Returns the loss before the step.
    pub fn train(&mut self, states: &[Vec<f32>], targets: &[Vec<f32>]) -> f32 {
        debug_assert_eq!(states.len(), targets.len());
        if states.is_empty() {
            return 0.0;
        }

        let (pre_activations, activations) = self.forward(self.to_columns(states));
        let output = &activations[activations.len() - 1];
        let target = DMatrix::from_fn(output.nrows(), output.ncols(), |i, j| {
            targets[j].get(i).copied().unwrap_or(0.0)
        });

        let error = output - target;
        let num_elements = error.len() as f32;
        let loss = error.iter().map(|e| e * e).sum::<f32>() / num_elements;

        let mut delta = error * (2.0 / num_elements);
        let mut gradients = Vec::with_capacity(self.layers.len());

        for i in (0..self.layers.len()).rev() {
            let ones = DMatrix::from_element(delta.ncols(), 1, 1.0);
            gradients.push(Layer {
                weights: &delta * activations[i].transpose(),
                biases: &delta * ones,
            });

            if i > 0 {
                let relu_grad = pre_activations[i - 1].map(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = (self.layers[i].weights.transpose() * &delta).component_mul(&relu_grad);
            }
        }
        gradients.reverse();

        self.apply_gradients(&gradients);

        loss
    }

    fn apply_gradients(&mut self, gradients: &[Layer]) {
        self.num_steps += 1;
        let lr = self.learning_rate;

        match self.optimizer {
            Optimizer::Sgd => {
                for (layer, grad) in self.layers.iter_mut().zip(gradients) {
                    layer.weights -= &grad.weights * lr;
                    layer.biases -= &grad.biases * lr;
                }
            }
            Optimizer::Adam => {
                let correction1 = 1.0 - ADAM_BETA1.powi(self.num_steps);
                let correction2 = 1.0 - ADAM_BETA2.powi(self.num_steps);

                for ((layer, grad), moments) in self
                    .layers
                    .iter_mut()
                    .zip(gradients)
                    .zip(self.moments.iter_mut())
                {
                    adam_step(
                        &mut layer.weights,
                        &grad.weights,
                        &mut moments.first.weights,
                        &mut moments.second.weights,
                        lr,
                        correction1,
                        correction2,
                    );
                    adam_step(
                        &mut layer.biases,
                        &grad.biases,
                        &mut moments.first.biases,
                        &mut moments.second.biases,
                        lr,
                        correction1,
                        correction2,
                    );
                }
            }
        }
    }

    /// Copy with every parameter shifted by up to `variation` in either
    /// direction. Optimizer state starts fresh.
    pub fn copy_perturbed<R: Rng>(&self, variation: f32, rng: &mut R) -> Model {
        let mut perturb = |m: &DMatrix<f32>| {
            m.map(|v| {
                if variation > 0.0 {
                    v + rng.gen_range(-variation..variation)
                } else {
                    v
                }
            })
        };
        let layers = self
            .layers
            .iter()
            .map(|layer| Layer {
                weights: perturb(&layer.weights),
                biases: perturb(&layer.biases),
            })
            .collect();

        Self::with_layers(layers, self.optimizer, self.learning_rate)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let weights = Weights {
            layers: self.layers.clone(),
        };
        fs::write(path, serde_json::to_vec(&weights)?)?;

        Ok(())
    }

    pub fn load(path: &Path, optimizer: Optimizer, learning_rate: f32) -> Result<Model, ModelError> {
        let weights: Weights = serde_json::from_slice(&fs::read(path)?)?;

        Self::from_layers(weights.layers, optimizer, learning_rate)
    }
}

fn adam_step(
    param: &mut DMatrix<f32>,
    grad: &DMatrix<f32>,
    first: &mut DMatrix<f32>,
    second: &mut DMatrix<f32>,
    lr: f32,
    correction1: f32,
    correction2: f32,
) {
    *first = first.zip_map(grad, |m, g| ADAM_BETA1 * m + (1.0 - ADAM_BETA1) * g);
    *second = second.zip_map(grad, |v, g| ADAM_BETA2 * v + (1.0 - ADAM_BETA2) * g * g);

    let step = first.zip_map(second, |m, v| {
        lr * (m / correction1) / ((v / correction2).sqrt() + ADAM_EPSILON)
    });
    *param -= step;
}

pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;

    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }

    best
}
