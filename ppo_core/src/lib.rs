// PPO core library: trajectory buffer with GAE, burn actor-critic and the
// CartPole training loop

pub mod algorithms;
pub mod env;
pub mod networks;
pub mod trainers;

// Re-export main types
pub use algorithms::ppo::{
    discounted_cumulative_sum, ActorCritic, BufferError, EpochSummary, PpoTrainer,
    TrajectoryBatch, TrajectoryBuffer,
};
pub use env::{CartPole, Environment, Transition};
pub use trainers::{run_training, RunFlags, TrainingSettings};
