// Episodic environments with discrete actions
pub mod cart_pole;

pub use cart_pole::CartPole;

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Vec<f32>,
    pub reward: f32,
    /// The episode reached a terminal state; nothing follows it.
    pub terminated: bool,
    /// The episode was cut off by a time limit.
    pub truncated: bool,
}

impl Transition {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

pub trait Environment {
    fn observation_dim(&self) -> usize;
    fn num_actions(&self) -> usize;
    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Vec<f32>;
    fn step(&mut self, action: usize) -> Transition;
}
