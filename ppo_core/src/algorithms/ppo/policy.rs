use super::buffer::TrajectoryBatch;
use super::error::PolicyError;

/// Policy head and critic outputs for a single observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Unnormalized action log-probabilities.
    pub logits: Vec<f32>,
    pub value: f32,
}

/// Diagnostics of one clipped-surrogate policy step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyUpdate {
    pub loss: f32,
    /// Mean `logp_old - logp_new` measured after the step.
    pub kl: f32,
}

/// Actor and critic as seen by the training loop.
///
/// Implementations own their networks and optimizers; the trainer only
/// passes observations in and epoch batches through.
pub trait ActorCritic {
    fn evaluate(&self, observation: &[f32]) -> Result<Evaluation, PolicyError>;

    /// Critic estimate only, used to bootstrap cut-off trajectories.
    fn value(&self, observation: &[f32]) -> Result<f32, PolicyError> {
        self.evaluate(observation).map(|e| e.value)
    }

    fn update_policy(&mut self, batch: &TrajectoryBatch<'_>) -> Result<PolicyUpdate, PolicyError>;

    /// One regression step of the critic towards `batch.returns`. Returns the loss.
    fn update_value(&mut self, batch: &TrajectoryBatch<'_>) -> Result<f32, PolicyError>;
}
