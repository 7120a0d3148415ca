// burn-backed actor/critic with one Adam optimizer per network
use std::fs;
use std::path::Path;

use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, PrettyJsonFileRecorder, Recorder};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};
use serde::{Deserialize, Serialize};

use super::buffer::TrajectoryBatch;
use super::error::PolicyError;
use super::policy::{ActorCritic, Evaluation, PolicyUpdate};
use crate::networks::{Actor, Critic};
use crate::trainers::checkpoint::{CheckpointError, Checkpointable};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub observation_dim: usize,
    pub num_actions: usize,
    pub hidden_sizes: Vec<usize>,
    pub clip_ratio: f32,
    pub policy_learning_rate: f64,
    pub value_function_learning_rate: f64,
}

/// Adam, epsilon 1e-7.
pub fn adam<B, M>() -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamConfig::new().with_epsilon(1e-7).init()
}

pub struct BurnActorCritic<B: AutodiffBackend, OA, OC> {
    actor: Actor<B>,
    critic: Critic<B>,
    actor_optimizer: OA,
    critic_optimizer: OC,
    config: PolicyConfig,
    device: B::Device,
}

/// Fresh networks with Adam optimizers.
pub fn adam_actor_critic<B: AutodiffBackend>(
    config: PolicyConfig,
    device: &B::Device,
) -> BurnActorCritic<B, impl Optimizer<Actor<B>, B>, impl Optimizer<Critic<B>, B>> {
    let actor = Actor::new(
        config.observation_dim,
        &config.hidden_sizes,
        config.num_actions,
        device,
    );
    let critic = Critic::new(config.observation_dim, &config.hidden_sizes, device);
    BurnActorCritic::new(
        actor,
        critic,
        adam::<B, Actor<B>>(),
        adam::<B, Critic<B>>(),
        config,
        device,
    )
}

fn tensor_error<E: std::fmt::Debug>(e: E) -> PolicyError {
    PolicyError::Tensor(format!("{:?}", e))
}

fn observation_tensor<BK: Backend>(
    batch: &TrajectoryBatch<'_>,
    device: &BK::Device,
) -> Tensor<BK, 2> {
    Tensor::<BK, 1>::from_floats(batch.observations, device)
        .reshape([batch.len(), batch.observation_dim])
}

fn action_tensor<BK: Backend>(batch: &TrajectoryBatch<'_>, device: &BK::Device) -> Tensor<BK, 2, Int> {
    let actions: Vec<i32> = batch.actions.iter().map(|&a| a as i32).collect();
    Tensor::<BK, 1, Int>::from_ints(actions.as_slice(), device).reshape([batch.len(), 1])
}

/// `log π(a|s)` for each row, `[batch]`.
fn taken_log_probabilities<BK: Backend>(
    logits: Tensor<BK, 2>,
    actions: Tensor<BK, 2, Int>,
) -> Tensor<BK, 1> {
    log_softmax(logits, 1).gather(1, actions).flatten(0, 1)
}

impl<B, OA, OC> BurnActorCritic<B, OA, OC>
where
    B: AutodiffBackend,
    OA: Optimizer<Actor<B>, B>,
    OC: Optimizer<Critic<B>, B>,
{
    pub fn new(
        actor: Actor<B>,
        critic: Critic<B>,
        actor_optimizer: OA,
        critic_optimizer: OC,
        config: PolicyConfig,
        device: &B::Device,
    ) -> Self {
        Self {
            actor,
            critic,
            actor_optimizer,
            critic_optimizer,
            config,
            device: device.clone(),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    fn check_batch(&self, batch: &TrajectoryBatch<'_>) -> Result<(), PolicyError> {
        if batch.is_empty() {
            return Err(PolicyError::Shape("empty batch".to_string()));
        }
        if batch.observation_dim != self.config.observation_dim {
            return Err(PolicyError::Shape(format!(
                "batch observation_dim {} != network input {}",
                batch.observation_dim, self.config.observation_dim
            )));
        }
        Ok(())
    }

    /// Mean `logp_old - logp_new` under the current actor, without gradients.
    fn approximate_kl(&self, batch: &TrajectoryBatch<'_>) -> f32 {
        let actor = self.actor.valid();
        let obs = observation_tensor::<B::InnerBackend>(batch, &self.device);
        let actions = action_tensor::<B::InnerBackend>(batch, &self.device);
        let old = Tensor::<B::InnerBackend, 1>::from_floats(batch.log_probabilities, &self.device);
        let new = taken_log_probabilities(actor.forward(obs), actions);
        (old - new).mean().into_scalar().elem::<f32>()
    }
}

impl<B, OA, OC> ActorCritic for BurnActorCritic<B, OA, OC>
where
    B: AutodiffBackend,
    OA: Optimizer<Actor<B>, B>,
    OC: Optimizer<Critic<B>, B>,
{
    fn evaluate(&self, observation: &[f32]) -> Result<Evaluation, PolicyError> {
        let dim = self.config.observation_dim;
        if observation.len() != dim {
            return Err(PolicyError::Shape(format!(
                "observation has {} elements, network expects {}",
                observation.len(),
                dim
            )));
        }
        let obs = Tensor::<B::InnerBackend, 1>::from_floats(observation, &self.device)
            .reshape([1, dim]);
        let logits = self
            .actor
            .valid()
            .forward(obs.clone())
            .into_data()
            .to_vec::<f32>()
            .map_err(tensor_error)?;
        let value = self.critic.valid().forward(obs).into_scalar().elem::<f32>();
        Ok(Evaluation { logits, value })
    }

    fn value(&self, observation: &[f32]) -> Result<f32, PolicyError> {
        let dim = self.config.observation_dim;
        if observation.len() != dim {
            return Err(PolicyError::Shape(format!(
                "observation has {} elements, network expects {}",
                observation.len(),
                dim
            )));
        }
        let obs = Tensor::<B::InnerBackend, 1>::from_floats(observation, &self.device)
            .reshape([1, dim]);
        Ok(self.critic.valid().forward(obs).into_scalar().elem::<f32>())
    }

    fn update_policy(&mut self, batch: &TrajectoryBatch<'_>) -> Result<PolicyUpdate, PolicyError> {
        self.check_batch(batch)?;
        let clip = self.config.clip_ratio;

        let obs = observation_tensor::<B>(batch, &self.device);
        let actions = action_tensor::<B>(batch, &self.device);
        let old_log_probs = Tensor::<B, 1>::from_floats(batch.log_probabilities, &self.device);
        let advantages = Tensor::<B, 1>::from_floats(batch.advantages, &self.device);

        let log_probs = taken_log_probabilities(self.actor.forward(obs), actions);
        let ratio = (log_probs - old_log_probs).exp();
        let clipped = ratio.clone().clamp(1.0 - clip, 1.0 + clip) * advantages.clone();
        let loss = -(ratio * advantages).min_pair(clipped).mean();
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.actor);
        self.actor = self.actor_optimizer.step(
            self.config.policy_learning_rate,
            self.actor.clone(),
            grads,
        );

        Ok(PolicyUpdate {
            loss: loss_value,
            kl: self.approximate_kl(batch),
        })
    }

    fn update_value(&mut self, batch: &TrajectoryBatch<'_>) -> Result<f32, PolicyError> {
        self.check_batch(batch)?;

        let obs = observation_tensor::<B>(batch, &self.device);
        let returns = Tensor::<B, 1>::from_floats(batch.returns, &self.device);
        let loss = (returns - self.critic.forward(obs)).powf_scalar(2.0).mean();
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.critic);
        self.critic = self.critic_optimizer.step(
            self.config.value_function_learning_rate,
            self.critic.clone(),
            grads,
        );
        Ok(loss_value)
    }
}

impl<B, OA, OC> Checkpointable for BurnActorCritic<B, OA, OC>
where
    B: AutodiffBackend,
    OA: Optimizer<Actor<B>, B>,
    OC: Optimizer<Critic<B>, B>,
{
    /// Writes `actor.json`, `critic.json` and `config.json` into `path`.
    fn save_checkpoint(&self, path: &Path) -> Result<(), CheckpointError> {
        fs::create_dir_all(path)?;
        let recorder = PrettyJsonFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.actor.clone().into_record(), path.join("actor"))
            .map_err(|e| CheckpointError::Recorder(format!("{:?}", e)))?;
        recorder
            .record(self.critic.clone().into_record(), path.join("critic"))
            .map_err(|e| CheckpointError::Recorder(format!("{:?}", e)))?;
        let config = serde_json::to_string_pretty(&self.config)
            .map_err(|e| CheckpointError::Format(e.to_string()))?;
        fs::write(path.join(CONFIG_FILE), config)?;
        Ok(())
    }

    fn load_checkpoint(&mut self, path: &Path) -> Result<(), CheckpointError> {
        let content = fs::read_to_string(path.join(CONFIG_FILE))?;
        let saved: PolicyConfig =
            serde_json::from_str(&content).map_err(|e| CheckpointError::Format(e.to_string()))?;
        if saved.observation_dim != self.config.observation_dim
            || saved.num_actions != self.config.num_actions
            || saved.hidden_sizes != self.config.hidden_sizes
        {
            return Err(CheckpointError::Incompatible(format!(
                "checkpoint network {:?} does not match {:?}",
                saved, self.config
            )));
        }

        let recorder = PrettyJsonFileRecorder::<FullPrecisionSettings>::new();
        let actor_record = recorder
            .load(path.join("actor"), &self.device)
            .map_err(|e| CheckpointError::Recorder(format!("{:?}", e)))?;
        self.actor = self.actor.clone().load_record(actor_record);
        let critic_record = recorder
            .load(path.join("critic"), &self.device)
            .map_err(|e| CheckpointError::Recorder(format!("{:?}", e)))?;
        self.critic = self.critic.clone().load_record(critic_record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::ppo::TrajectoryBuffer;
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    fn config() -> PolicyConfig {
        PolicyConfig {
            observation_dim: 2,
            num_actions: 3,
            hidden_sizes: vec![8],
            clip_ratio: 0.2,
            policy_learning_rate: 1e-2,
            value_function_learning_rate: 1e-2,
        }
    }

    fn filled_buffer(policy: &impl ActorCritic) -> TrajectoryBuffer {
        let mut buf = TrajectoryBuffer::new(2, 6, 0.99, 0.97).unwrap();
        for i in 0..6 {
            let obs = [i as f32 * 0.1, 1.0 - i as f32 * 0.1];
            let eval = policy.evaluate(&obs).unwrap();
            let action = i % 3;
            let logp = crate::algorithms::ppo::distribution::log_probability(&eval.logits, action);
            buf.store(&obs, action, i as f32, eval.value, logp).unwrap();
        }
        buf.finish_trajectory(0.0).unwrap();
        buf
    }

    #[test]
    fn evaluate_shapes() {
        let device = Default::default();
        let policy = adam_actor_critic::<B>(config(), &device);
        let eval = policy.evaluate(&[0.1, 0.2]).unwrap();
        assert_eq!(eval.logits.len(), 3);
        assert!(eval.value.is_finite());
        assert!(matches!(policy.evaluate(&[0.1]), Err(PolicyError::Shape(_))));
    }

    #[test]
    fn first_policy_step_starts_on_policy() {
        let device = Default::default();
        let mut policy = adam_actor_critic::<B>(config(), &device);
        let mut buf = filled_buffer(&policy);
        let batch = buf.get().unwrap();
        let update = policy.update_policy(&batch).unwrap();
        // ratio is 1 before the step, so the loss is -mean(normalized advantages)
        assert!(update.loss.abs() < 1e-4, "loss was {}", update.loss);
        assert!(update.kl.is_finite());
    }

    #[test]
    fn value_steps_reduce_loss() {
        let device = Default::default();
        let mut policy = adam_actor_critic::<B>(config(), &device);
        let mut buf = filled_buffer(&policy);
        let batch = buf.get().unwrap();
        let first = policy.update_value(&batch).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = policy.update_value(&batch).unwrap();
        }
        assert!(last < first, "value loss went from {} to {}", first, last);
    }

    #[test]
    fn checkpoint_round_trip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let policy = adam_actor_critic::<B>(config(), &device);
        policy.save_checkpoint(dir.path()).unwrap();

        let mut restored = adam_actor_critic::<B>(config(), &device);
        restored.load_checkpoint(dir.path()).unwrap();
        let a = policy.evaluate(&[0.3, -0.4]).unwrap();
        let b = restored.evaluate(&[0.3, -0.4]).unwrap();
        for (x, y) in a.logits.iter().zip(&b.logits) {
            assert!((x - y).abs() < 1e-6);
        }
        assert!((a.value - b.value).abs() < 1e-6);
    }

    #[test]
    fn checkpoint_rejects_other_architecture() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        adam_actor_critic::<B>(config(), &device)
            .save_checkpoint(dir.path())
            .unwrap();
        let mut other = config();
        other.hidden_sizes = vec![4, 4];
        let mut policy = adam_actor_critic::<B>(other, &device);
        assert!(matches!(
            policy.load_checkpoint(dir.path()),
            Err(CheckpointError::Incompatible(_))
        ));
    }
}
