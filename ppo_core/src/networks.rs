use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::tanh;
use burn::tensor::{backend::Backend, Tensor};

// tanh MLPs: observation -> logits (actor) and observation -> value (critic).

fn hidden_stack<B: Backend>(
    input_size: usize,
    hidden_sizes: &[usize],
    device: &B::Device,
) -> (Vec<Linear<B>>, usize) {
    let mut in_features = input_size;
    let mut layers = Vec::with_capacity(hidden_sizes.len());
    for &width in hidden_sizes {
        layers.push(LinearConfig::new(in_features, width).init(device));
        in_features = width;
    }
    (layers, in_features)
}

#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    layers: Vec<Linear<B>>,
    logits_head: Linear<B>,
}

impl<B: Backend> Actor<B> {
    pub fn new(
        observation_dim: usize,
        hidden_sizes: &[usize],
        num_actions: usize,
        device: &B::Device,
    ) -> Self {
        let (layers, in_features) = hidden_stack(observation_dim, hidden_sizes, device);
        let logits_head = LinearConfig::new(in_features, num_actions).init(device);
        Self { layers, logits_head }
    }

    /// `[batch, observation_dim]` -> `[batch, num_actions]` logits.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in self.layers.iter() {
            x = tanh(layer.forward(x));
        }
        self.logits_head.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    layers: Vec<Linear<B>>,
    value_head: Linear<B>,
}

impl<B: Backend> Critic<B> {
    pub fn new(observation_dim: usize, hidden_sizes: &[usize], device: &B::Device) -> Self {
        let (layers, in_features) = hidden_stack(observation_dim, hidden_sizes, device);
        let value_head = LinearConfig::new(in_features, 1).init(device);
        Self { layers, value_head }
    }

    /// `[batch, observation_dim]` -> `[batch]` values.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 1> {
        let mut x = input;
        for layer in self.layers.iter() {
            x = tanh(layer.forward(x));
        }
        self.value_head.forward(x).flatten(0, 1)
    }
}
