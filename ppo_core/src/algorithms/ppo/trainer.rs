use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::buffer::TrajectoryBuffer;
use super::distribution;
use super::error::{PolicyError, TrainError};
use super::policy::ActorCritic;
use crate::env::Environment;
use crate::trainers::checkpoint::{CheckpointManager, Checkpointable};
use crate::trainers::settings::TrainingSettings;
use crate::trainers::stats::StatsReporter;

/// Early stop the policy phase once KL exceeds this multiple of the target.
const KL_STOP_FACTOR: f32 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpoTrainerConfig {
    pub steps_per_epoch: usize,
    pub gamma: f32,
    pub lam: f32,
    pub train_policy_iterations: usize,
    pub train_value_iterations: usize,
    pub target_kl: f32,
    /// Epochs between checkpoints.
    pub checkpoint_interval: u64,
}

impl PpoTrainerConfig {
    pub fn from_settings(settings: &TrainingSettings) -> Self {
        let h = &settings.hyperparameters;
        Self {
            steps_per_epoch: h.steps_per_epoch,
            gamma: h.gamma,
            lam: h.lam,
            train_policy_iterations: h.train_policy_iterations,
            train_value_iterations: h.train_value_iterations,
            target_kl: h.target_kl,
            checkpoint_interval: settings.checkpoint_settings.checkpoint_interval,
        }
    }
}

/// What one epoch of collection and updates produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub epoch: u64,
    /// Averaged over every segment closed this epoch, including the one cut
    /// off at the epoch boundary.
    pub mean_return: f32,
    pub mean_length: f32,
    pub episodes: usize,
    pub policy_iterations: usize,
    pub kl: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
}

pub struct PpoTrainer<E: Environment, P: ActorCritic> {
    config: PpoTrainerConfig,
    env: E,
    policy: P,
    buffer: TrajectoryBuffer,
    rng: StdRng,
    stats: StatsReporter,
    checkpoints: Option<CheckpointManager>,
    epoch: u64,
}

impl<E: Environment, P: ActorCritic> PpoTrainer<E, P> {
    pub fn new(config: PpoTrainerConfig, env: E, policy: P, seed: u64) -> Result<Self, TrainError> {
        let buffer = TrajectoryBuffer::new(
            env.observation_dim(),
            config.steps_per_epoch,
            config.gamma,
            config.lam,
        )?
        .with_num_actions(env.num_actions());

        Ok(Self {
            config,
            env,
            policy,
            buffer,
            rng: StdRng::seed_from_u64(seed),
            stats: StatsReporter::new(),
            checkpoints: None,
            epoch: 0,
        })
    }

    pub fn with_stats(mut self, stats: StatsReporter) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn config(&self) -> &PpoTrainerConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Number of completed epochs.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Collect one epoch of experience, then update the policy and the critic.
    pub fn run_epoch(&mut self) -> Result<EpochSummary, TrainError> {
        // drop whatever a failed epoch left behind
        self.buffer.reset();
        let steps = self.config.steps_per_epoch;
        let mut observation = self.env.reset();
        let mut episode_return = 0.0f32;
        let mut episode_length = 0usize;
        let mut sum_return = 0.0f32;
        let mut sum_length = 0usize;
        let mut episodes = 0usize;

        for t in 0..steps {
            let evaluation = self.policy.evaluate(&observation)?;
            let (action, log_probability) = distribution::sample(&evaluation.logits, &mut self.rng)
                .ok_or_else(|| PolicyError::Shape("policy produced no logits".to_string()))?;
            let transition = self.env.step(action);

            self.buffer.store(
                &observation,
                action,
                transition.reward,
                evaluation.value,
                log_probability,
            )?;
            episode_return += transition.reward;
            episode_length += 1;

            let done = transition.done();
            let terminated = transition.terminated;
            observation = transition.observation;

            let epoch_boundary = t + 1 == steps;
            if done || epoch_boundary {
                let bootstrap = if terminated {
                    0.0
                } else {
                    self.policy.value(&observation)?
                };
                self.buffer.finish_trajectory(bootstrap)?;

                sum_return += episode_return;
                sum_length += episode_length;
                episodes += 1;
                if !epoch_boundary {
                    observation = self.env.reset();
                }
                episode_return = 0.0;
                episode_length = 0;
            }
        }

        let batch = self.buffer.get()?;

        let mut policy_iterations = 0;
        let mut kl = 0.0;
        let mut policy_loss = 0.0;
        for _ in 0..self.config.train_policy_iterations {
            let update = self.policy.update_policy(&batch)?;
            policy_iterations += 1;
            kl = update.kl;
            policy_loss = update.loss;
            if kl > KL_STOP_FACTOR * self.config.target_kl {
                log::debug!(
                    "Early stopping policy updates at iteration {} (kl {:.5})",
                    policy_iterations,
                    kl
                );
                break;
            }
        }

        let mut value_loss = 0.0;
        for _ in 0..self.config.train_value_iterations {
            value_loss = self.policy.update_value(&batch)?;
        }

        self.epoch += 1;
        let summary = EpochSummary {
            epoch: self.epoch,
            mean_return: sum_return / episodes as f32,
            mean_length: sum_length as f32 / episodes as f32,
            episodes,
            policy_iterations,
            kl,
            policy_loss,
            value_loss,
        };
        self.report(&summary)?;
        Ok(summary)
    }

    fn report(&mut self, summary: &EpochSummary) -> Result<(), TrainError> {
        log::info!(
            "Epoch {}. Mean return: {:.3}. Mean length: {:.1}. Episodes: {}. KL: {:.5}.",
            summary.epoch,
            summary.mean_return,
            summary.mean_length,
            summary.episodes,
            summary.kl
        );
        self.stats.add_stat("episode/mean_return", summary.mean_return);
        self.stats.add_stat("episode/mean_length", summary.mean_length);
        self.stats.add_stat("episode/count", summary.episodes as f32);
        self.stats.add_stat("policy/kl", summary.kl);
        self.stats.add_stat("policy/iterations", summary.policy_iterations as f32);
        self.stats.add_stat("loss/policy", summary.policy_loss);
        self.stats.add_stat("loss/value", summary.value_loss);
        self.stats
            .write_stats(summary.epoch)
            .map_err(TrainError::Stats)
    }
}

impl<E, P> PpoTrainer<E, P>
where
    E: Environment,
    P: ActorCritic + Checkpointable,
{
    /// Restore the policy from the newest checkpoint and continue counting
    /// epochs from it.
    pub fn resume(&mut self) -> Result<u64, TrainError> {
        if let Some(manager) = &self.checkpoints {
            self.epoch = manager.restore_latest(&mut self.policy)?;
        }
        Ok(self.epoch)
    }

    /// Run `epochs` further epochs, checkpointing every interval and once at the end.
    pub fn train(&mut self, epochs: u64) -> Result<Vec<EpochSummary>, TrainError> {
        let mut summaries = Vec::with_capacity(epochs as usize);
        let mut last_saved = None;
        for _ in 0..epochs {
            let summary = self.run_epoch()?;
            summaries.push(summary);
            if summary.epoch % self.config.checkpoint_interval.max(1) == 0 {
                self.save_checkpoint()?;
                last_saved = Some(summary.epoch);
            }
        }
        if epochs > 0 && last_saved != Some(self.epoch) {
            self.save_checkpoint()?;
        }
        Ok(summaries)
    }

    fn save_checkpoint(&self) -> Result<(), TrainError> {
        if let Some(manager) = &self.checkpoints {
            manager.save(&self.policy, self.epoch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::ppo::buffer::TrajectoryBatch;
    use crate::algorithms::ppo::policy::{Evaluation, PolicyUpdate};
    use crate::env::Transition;
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;

    /// Observation is the step count; reward 1 per step. The episode ends
    /// after `episode_length` steps, by truncation when `truncate` is set.
    struct Corridor {
        episode_length: usize,
        truncate: bool,
        t: usize,
    }

    impl Corridor {
        fn terminating(episode_length: usize) -> Self {
            Self {
                episode_length,
                truncate: false,
                t: 0,
            }
        }

        fn truncating(episode_length: usize) -> Self {
            Self {
                episode_length,
                truncate: true,
                t: 0,
            }
        }
    }

    impl Environment for Corridor {
        fn observation_dim(&self) -> usize {
            1
        }

        fn num_actions(&self) -> usize {
            2
        }

        fn reset(&mut self) -> Vec<f32> {
            self.t = 0;
            vec![0.0]
        }

        fn step(&mut self, _action: usize) -> Transition {
            self.t += 1;
            let end = self.t == self.episode_length;
            Transition {
                observation: vec![self.t as f32],
                reward: 1.0,
                terminated: end && !self.truncate,
                truncated: end && self.truncate,
            }
        }
    }

    /// Uniform policy with critic `0.5 * obs`.
    #[derive(Default)]
    struct Scripted {
        kl: f32,
        /// `evaluate` fails on this call number (1-based).
        fail_on_evaluation: Option<usize>,
        evaluations: Cell<usize>,
        policy_calls: usize,
        value_calls: usize,
        returns: Vec<f32>,
    }

    impl ActorCritic for Scripted {
        fn evaluate(&self, observation: &[f32]) -> Result<Evaluation, PolicyError> {
            let call = self.evaluations.get() + 1;
            self.evaluations.set(call);
            if self.fail_on_evaluation == Some(call) {
                return Err(PolicyError::Tensor("scripted failure".to_string()));
            }
            Ok(Evaluation {
                logits: vec![0.0, 0.0],
                value: observation[0] * 0.5,
            })
        }

        fn update_policy(&mut self, batch: &TrajectoryBatch<'_>) -> Result<PolicyUpdate, PolicyError> {
            self.policy_calls += 1;
            self.returns = batch.returns.to_vec();
            Ok(PolicyUpdate {
                loss: -1.0,
                kl: self.kl,
            })
        }

        fn update_value(&mut self, _batch: &TrajectoryBatch<'_>) -> Result<f32, PolicyError> {
            self.value_calls += 1;
            Ok(0.5)
        }
    }

    fn config(steps_per_epoch: usize) -> PpoTrainerConfig {
        PpoTrainerConfig {
            steps_per_epoch,
            gamma: 0.99,
            lam: 0.97,
            train_policy_iterations: 10,
            train_value_iterations: 3,
            target_kl: 0.01,
            checkpoint_interval: 1,
        }
    }

    /// Two-step epoch with gamma 0.5; returns the stored returns.
    fn two_step_returns(env: Corridor) -> Vec<f32> {
        let mut cfg = config(2);
        cfg.gamma = 0.5;
        let mut trainer = PpoTrainer::new(cfg, env, Scripted::default(), 0).unwrap();
        trainer.run_epoch().unwrap();
        trainer.policy().returns.clone()
    }

    #[test]
    fn truncation_bootstraps_from_critic() {
        // critic at obs 2 is 1.0
        let returns = two_step_returns(Corridor::truncating(2));
        assert_abs_diff_eq!(returns[1], 1.0 + 0.5 * 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(returns[0], 1.0 + 0.5 * 1.5, epsilon = 1e-6);
    }

    #[test]
    fn epoch_boundary_cut_bootstraps_from_critic() {
        let returns = two_step_returns(Corridor::terminating(10));
        assert_abs_diff_eq!(returns[1], 1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(returns[0], 1.75, epsilon = 1e-6);
    }

    #[test]
    fn terminal_on_last_step_bootstraps_zero() {
        let returns = two_step_returns(Corridor::terminating(2));
        assert_abs_diff_eq!(returns[1], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(returns[0], 1.5, epsilon = 1e-6);
    }

    #[test]
    fn epoch_counts_cut_off_segment() {
        let mut trainer =
            PpoTrainer::new(config(8), Corridor::terminating(3), Scripted::default(), 0).unwrap();
        let summary = trainer.run_epoch().unwrap();
        // 3 + 3 + 2 (cut off)
        assert_eq!(summary.episodes, 3);
        assert_abs_diff_eq!(summary.mean_length, 8.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(summary.mean_return, 8.0 / 3.0, epsilon = 1e-6);
        assert_eq!(summary.epoch, 1);
        assert_eq!(trainer.policy().returns.len(), 8);
    }

    #[test]
    fn policy_phase_stops_on_large_kl() {
        let policy = Scripted {
            kl: 0.016,
            ..Default::default()
        };
        let mut trainer = PpoTrainer::new(config(8), Corridor::terminating(4), policy, 1).unwrap();
        let summary = trainer.run_epoch().unwrap();
        assert_eq!(summary.policy_iterations, 1);
        assert_eq!(trainer.policy().policy_calls, 1);
        assert_eq!(trainer.policy().value_calls, 3);
        assert_abs_diff_eq!(summary.value_loss, 0.5);
    }

    #[test]
    fn small_kl_runs_every_iteration() {
        let policy = Scripted {
            kl: 0.014,
            ..Default::default()
        };
        let mut trainer = PpoTrainer::new(config(8), Corridor::terminating(4), policy, 1).unwrap();
        let summary = trainer.run_epoch().unwrap();
        assert_eq!(summary.policy_iterations, 10);
    }

    #[test]
    fn consecutive_epochs_reuse_buffer() {
        let mut trainer =
            PpoTrainer::new(config(7), Corridor::terminating(5), Scripted::default(), 2).unwrap();
        for expected in 1..=3 {
            assert_eq!(trainer.run_epoch().unwrap().epoch, expected);
        }
    }

    #[test]
    fn epoch_after_failed_collection_starts_clean() {
        let policy = Scripted {
            fail_on_evaluation: Some(3),
            ..Default::default()
        };
        let mut trainer = PpoTrainer::new(config(4), Corridor::terminating(3), policy, 3).unwrap();
        assert!(matches!(
            trainer.run_epoch(),
            Err(TrainError::Policy(PolicyError::Tensor(_)))
        ));
        let summary = trainer.run_epoch().unwrap();
        assert_eq!(summary.epoch, 1);
        assert_eq!(trainer.policy().returns.len(), 4);
    }
}
