pub mod algorithm;
pub mod buffer;
pub mod discount;
pub mod distribution;
pub mod error;
pub mod policy;
pub mod trainer;

pub use algorithm::{adam_actor_critic, BurnActorCritic, PolicyConfig};
pub use buffer::{StepView, TrajectoryBatch, TrajectoryBuffer};
pub use discount::discounted_cumulative_sum;
pub use error::{BufferError, PolicyError, TrainError};
pub use policy::{ActorCritic, Evaluation, PolicyUpdate};
pub use trainer::{EpochSummary, PpoTrainer, PpoTrainerConfig};
