use super::discount::{discounted_cumulative_sum, mean_and_std};
use super::error::BufferError;

/// Fixed-capacity on-policy storage for one epoch of PPO experience.
///
/// Steps are written in order by [`store`](Self::store). Each finished
/// episode (or truncated tail) is closed with
/// [`finish_trajectory`](Self::finish_trajectory), which fills in GAE
/// advantages and discounted returns for that segment. [`get`](Self::get)
/// normalizes advantages over the full epoch and rewinds the cursors.
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    observation_dim: usize,
    capacity: usize,
    num_actions: Option<usize>,
    gamma: f32,
    lam: f32,

    observations: Vec<f32>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    values: Vec<f32>,
    log_probabilities: Vec<f32>,
    advantages: Vec<f32>,
    returns: Vec<f32>,

    pointer: usize,
    trajectory_start_index: usize,
}

/// Read-only copy-free view of a written slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepView<'a> {
    pub observation: &'a [f32],
    pub action: usize,
    pub reward: f32,
    pub value: f32,
    pub log_probability: f32,
}

/// Epoch batch handed to the policy and value updates.
///
/// All sequences are index-aligned and have length `capacity`.
/// `observations` is row-major with `observation_dim` columns.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryBatch<'a> {
    pub observation_dim: usize,
    pub observations: &'a [f32],
    pub actions: &'a [usize],
    pub advantages: &'a [f32],
    pub returns: &'a [f32],
    pub log_probabilities: &'a [f32],
}

impl<'a> TrajectoryBatch<'a> {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn observation(&self, index: usize) -> &'a [f32] {
        let start = index * self.observation_dim;
        &self.observations[start..start + self.observation_dim]
    }
}

fn ensure_finite(field: &'static str, value: f32) -> Result<(), BufferError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(BufferError::NonFinite { field, value })
    }
}

impl TrajectoryBuffer {
    pub fn new(
        observation_dim: usize,
        capacity: usize,
        gamma: f32,
        lam: f32,
    ) -> Result<Self, BufferError> {
        if observation_dim == 0 {
            return Err(BufferError::InvalidConfig {
                field: "observation_dim",
                reason: "must be > 0".to_string(),
            });
        }
        if capacity == 0 {
            return Err(BufferError::InvalidConfig {
                field: "capacity",
                reason: "must be > 0".to_string(),
            });
        }
        if !(gamma > 0.0 && gamma <= 1.0) {
            return Err(BufferError::InvalidConfig {
                field: "gamma",
                reason: format!("must be in (0, 1], got {}", gamma),
            });
        }
        if !(0.0..=1.0).contains(&lam) {
            return Err(BufferError::InvalidConfig {
                field: "lam",
                reason: format!("must be in [0, 1], got {}", lam),
            });
        }

        Ok(Self {
            observation_dim,
            capacity,
            num_actions: None,
            gamma,
            lam,
            observations: vec![0.0; capacity * observation_dim],
            actions: vec![0; capacity],
            rewards: vec![0.0; capacity],
            values: vec![0.0; capacity],
            log_probabilities: vec![0.0; capacity],
            advantages: vec![0.0; capacity],
            returns: vec![0.0; capacity],
            pointer: 0,
            trajectory_start_index: 0,
        })
    }

    /// Reject actions `>= num_actions` in [`store`](Self::store).
    pub fn with_num_actions(mut self, num_actions: usize) -> Self {
        self.num_actions = Some(num_actions);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn lam(&self) -> f32 {
        self.lam
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn trajectory_start_index(&self) -> usize {
        self.trajectory_start_index
    }

    /// Number of steps written since the last reset.
    pub fn len(&self) -> usize {
        self.pointer
    }

    pub fn is_empty(&self) -> bool {
        self.pointer == 0
    }

    pub fn is_full(&self) -> bool {
        self.pointer == self.capacity
    }

    /// Slot `index`, if it has been written in the current epoch.
    pub fn step(&self, index: usize) -> Option<StepView<'_>> {
        if index >= self.pointer {
            return None;
        }
        let start = index * self.observation_dim;
        Some(StepView {
            observation: &self.observations[start..start + self.observation_dim],
            action: self.actions[index],
            reward: self.rewards[index],
            value: self.values[index],
            log_probability: self.log_probabilities[index],
        })
    }

    /// Advantages of closed segments, `[0, trajectory_start_index)`.
    pub fn advantages(&self) -> &[f32] {
        &self.advantages[..self.trajectory_start_index]
    }

    /// Returns of closed segments, `[0, trajectory_start_index)`.
    pub fn returns(&self) -> &[f32] {
        &self.returns[..self.trajectory_start_index]
    }

    pub fn store(
        &mut self,
        observation: &[f32],
        action: usize,
        reward: f32,
        value: f32,
        log_probability: f32,
    ) -> Result<(), BufferError> {
        if self.pointer >= self.capacity {
            return Err(BufferError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if observation.len() != self.observation_dim {
            return Err(BufferError::ObservationDim {
                expected: self.observation_dim,
                got: observation.len(),
            });
        }
        if let Some(num_actions) = self.num_actions {
            if action >= num_actions {
                return Err(BufferError::ActionOutOfRange { action, num_actions });
            }
        }
        ensure_finite("reward", reward)?;
        ensure_finite("value", value)?;
        ensure_finite("log_probability", log_probability)?;

        let i = self.pointer;
        let start = i * self.observation_dim;
        self.observations[start..start + self.observation_dim].copy_from_slice(observation);
        self.actions[i] = action;
        self.rewards[i] = reward;
        self.values[i] = value;
        self.log_probabilities[i] = log_probability;
        self.pointer += 1;
        Ok(())
    }

    /// Close the open segment `[trajectory_start_index, pointer)`.
    ///
    /// `bootstrap_value` must be 0 after a true terminal state and the
    /// critic's estimate of the cut-off state after a truncation.
    /// An empty segment is a no-op.
    pub fn finish_trajectory(&mut self, bootstrap_value: f32) -> Result<(), BufferError> {
        ensure_finite("bootstrap_value", bootstrap_value)?;

        let segment = self.trajectory_start_index..self.pointer;
        if segment.is_empty() {
            return Ok(());
        }

        let mut rewards = self.rewards[segment.clone()].to_vec();
        rewards.push(bootstrap_value);
        let mut values = self.values[segment.clone()].to_vec();
        values.push(bootstrap_value);

        let deltas: Vec<f32> = (0..segment.len())
            .map(|i| rewards[i] + self.gamma * values[i + 1] - values[i])
            .collect();

        let advantages = discounted_cumulative_sum(&deltas, self.gamma * self.lam);
        let returns = discounted_cumulative_sum(&rewards, self.gamma);

        self.advantages[segment.clone()].copy_from_slice(&advantages);
        self.returns[segment.clone()].copy_from_slice(&returns[..segment.len()]);

        self.trajectory_start_index = self.pointer;
        Ok(())
    }

    /// Normalize advantages over the full epoch and rewind both cursors.
    ///
    /// A zero-variance epoch is reported as
    /// [`BufferError::DegenerateAdvantages`] and leaves the buffer untouched.
    pub fn get(&mut self) -> Result<TrajectoryBatch<'_>, BufferError> {
        if self.pointer != self.capacity {
            return Err(BufferError::NotFull {
                pointer: self.pointer,
                capacity: self.capacity,
            });
        }
        if self.trajectory_start_index != self.pointer {
            return Err(BufferError::OpenTrajectory {
                start: self.trajectory_start_index,
                pointer: self.pointer,
            });
        }

        let (mean, std) = mean_and_std(&self.advantages);
        if std.is_nan() || std <= f32::EPSILON * mean.abs() {
            return Err(BufferError::DegenerateAdvantages { value: mean });
        }
        for adv in &mut self.advantages {
            *adv = (*adv - mean) / std;
        }

        self.reset();

        Ok(TrajectoryBatch {
            observation_dim: self.observation_dim,
            observations: &self.observations,
            actions: &self.actions,
            advantages: &self.advantages,
            returns: &self.returns,
            log_probabilities: &self.log_probabilities,
        })
    }

    /// Rewind both cursors without touching stored data.
    pub fn reset(&mut self) {
        self.pointer = 0;
        self.trajectory_start_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn fill(buf: &mut TrajectoryBuffer, rewards: &[f32], values: &[f32]) {
        for (i, (&r, &v)) in rewards.iter().zip(values).enumerate() {
            buf.store(&[i as f32], 0, r, v, -0.5).unwrap();
        }
    }

    #[test]
    fn rejects_bad_construction() {
        assert!(TrajectoryBuffer::new(0, 4, 0.99, 0.95).is_err());
        assert!(TrajectoryBuffer::new(2, 0, 0.99, 0.95).is_err());
        assert!(TrajectoryBuffer::new(2, 4, 0.0, 0.95).is_err());
        assert!(TrajectoryBuffer::new(2, 4, 1.01, 0.95).is_err());
        assert!(TrajectoryBuffer::new(2, 4, 0.99, -0.1).is_err());
        assert!(TrajectoryBuffer::new(2, 4, 1.0, 1.0).is_ok());
    }

    #[test]
    fn store_guards_shapes_and_ranges() {
        let mut buf = TrajectoryBuffer::new(2, 4, 0.99, 0.95).unwrap().with_num_actions(2);
        assert_eq!(
            buf.store(&[1.0], 0, 0.0, 0.0, 0.0),
            Err(BufferError::ObservationDim { expected: 2, got: 1 })
        );
        assert_eq!(
            buf.store(&[1.0, 2.0], 2, 0.0, 0.0, 0.0),
            Err(BufferError::ActionOutOfRange { action: 2, num_actions: 2 })
        );
        assert!(matches!(
            buf.store(&[1.0, 2.0], 1, f32::NAN, 0.0, 0.0),
            Err(BufferError::NonFinite { field: "reward", .. })
        ));
        assert_eq!(buf.pointer(), 0);
    }

    #[test]
    fn capacity_violation() {
        let mut buf = TrajectoryBuffer::new(1, 2, 0.99, 0.95).unwrap();
        fill(&mut buf, &[1.0, 1.0], &[0.0, 0.0]);
        assert!(buf.is_full());
        assert_eq!(
            buf.store(&[0.0], 0, 1.0, 0.0, 0.0),
            Err(BufferError::CapacityExceeded { capacity: 2 })
        );
    }

    #[test]
    fn empty_segment_is_noop() {
        let mut buf = TrajectoryBuffer::new(1, 2, 0.99, 0.95).unwrap();
        buf.finish_trajectory(3.0).unwrap();
        assert_eq!(buf.trajectory_start_index(), 0);
        assert!(buf.advantages().is_empty());
    }

    #[test]
    fn single_step_bootstrap() {
        let mut buf = TrajectoryBuffer::new(1, 1, 0.5, 1.0).unwrap();
        buf.store(&[0.0], 0, 1.0, 2.0, 0.0).unwrap();
        buf.finish_trajectory(4.0).unwrap();
        // delta = 1 + 0.5 * 4 - 2
        assert_abs_diff_eq!(buf.advantages()[0], 1.0, epsilon = 1e-6);
        // return = 1 + 0.5 * 4
        assert_abs_diff_eq!(buf.returns()[0], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn lambda_zero_gives_td_residuals() {
        let mut buf = TrajectoryBuffer::new(1, 3, 0.9, 0.0).unwrap();
        fill(&mut buf, &[1.0, 2.0, 3.0], &[0.5, 1.0, 1.5]);
        buf.finish_trajectory(2.0).unwrap();
        let expected = [
            1.0 + 0.9 * 1.0 - 0.5,
            2.0 + 0.9 * 1.5 - 1.0,
            3.0 + 0.9 * 2.0 - 1.5,
        ];
        for (a, e) in buf.advantages().iter().zip(expected) {
            assert_abs_diff_eq!(*a, e, epsilon = 1e-5);
        }
    }

    #[test]
    fn degenerate_epoch_leaves_buffer_intact() {
        let mut buf = TrajectoryBuffer::new(1, 1, 0.99, 0.95).unwrap();
        buf.store(&[0.0], 0, 1.0, 0.0, 0.0).unwrap();
        buf.finish_trajectory(0.0).unwrap();
        assert_eq!(
            buf.get().unwrap_err(),
            BufferError::DegenerateAdvantages { value: 1.0 }
        );
        assert_eq!(buf.pointer(), 1);
        assert_eq!(buf.advantages(), &[1.0]);
        buf.reset();
        assert!(buf.is_empty());
    }

    #[test]
    fn tiny_advantages_still_normalize() {
        let mut buf = TrajectoryBuffer::new(1, 2, 0.99, 0.95).unwrap();
        for reward in [1e-7, 3e-7] {
            buf.store(&[0.0], 0, reward, 0.0, 0.0).unwrap();
            buf.finish_trajectory(0.0).unwrap();
        }
        let batch = buf.get().unwrap();
        assert_abs_diff_eq!(batch.advantages[0], -1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(batch.advantages[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn step_view_only_covers_written_slots() {
        let mut buf = TrajectoryBuffer::new(2, 3, 0.99, 0.95).unwrap();
        buf.store(&[1.0, 2.0], 1, 0.5, 0.25, -0.7).unwrap();
        let step = buf.step(0).unwrap();
        assert_eq!(step.observation, &[1.0, 2.0]);
        assert_eq!(step.action, 1);
        assert!(buf.step(1).is_none());
    }
}
