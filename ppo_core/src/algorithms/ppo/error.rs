use std::fmt;

use crate::trainers::checkpoint::CheckpointError;

/// Contract violations reported by [`TrajectoryBuffer`](super::TrajectoryBuffer).
#[derive(Debug, Clone, PartialEq)]
pub enum BufferError {
    /// Construction parameter outside its valid range.
    InvalidConfig { field: &'static str, reason: String },
    /// `store` called with `pointer == capacity`.
    CapacityExceeded { capacity: usize },
    /// Observation length differs from the configured dimensionality.
    ObservationDim { expected: usize, got: usize },
    /// Action index outside `[0, num_actions)`.
    ActionOutOfRange { action: usize, num_actions: usize },
    /// Reward, value, log-probability or bootstrap is NaN or infinite.
    NonFinite { field: &'static str, value: f32 },
    /// `get` called before every slot was written.
    NotFull { pointer: usize, capacity: usize },
    /// `get` called while the last trajectory segment is still open.
    OpenTrajectory { start: usize, pointer: usize },
    /// Every advantage in the epoch is identical, normalization would divide by zero.
    DegenerateAdvantages { value: f32 },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::InvalidConfig { field, reason } => {
                write!(f, "invalid buffer config: {} {}", field, reason)
            }
            BufferError::CapacityExceeded { capacity } => {
                write!(f, "buffer is full ({} steps), call get() before storing more", capacity)
            }
            BufferError::ObservationDim { expected, got } => {
                write!(f, "observation has {} elements, expected {}", got, expected)
            }
            BufferError::ActionOutOfRange { action, num_actions } => {
                write!(f, "action {} out of range for {} actions", action, num_actions)
            }
            BufferError::NonFinite { field, value } => {
                write!(f, "{} must be finite, got {}", field, value)
            }
            BufferError::NotFull { pointer, capacity } => {
                write!(f, "buffer holds {} of {} steps, epoch is incomplete", pointer, capacity)
            }
            BufferError::OpenTrajectory { start, pointer } => write!(
                f,
                "trajectory [{}, {}) was never closed with finish_trajectory",
                start, pointer
            ),
            BufferError::DegenerateAdvantages { value } => write!(
                f,
                "all advantages equal {}, cannot normalize a zero-variance epoch",
                value
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// Failures raised by an [`ActorCritic`](super::ActorCritic) implementation.
#[derive(Debug)]
pub enum PolicyError {
    /// Input shape does not match the network.
    Shape(String),
    /// Tensor data could not be read back.
    Tensor(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Shape(msg) => write!(f, "shape error: {}", msg),
            PolicyError::Tensor(msg) => write!(f, "tensor error: {}", msg),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Anything that aborts a training epoch.
#[derive(Debug)]
pub enum TrainError {
    Buffer(BufferError),
    Policy(PolicyError),
    Checkpoint(CheckpointError),
    Stats(std::io::Error),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Buffer(e) => write!(f, "buffer: {}", e),
            TrainError::Policy(e) => write!(f, "policy: {}", e),
            TrainError::Checkpoint(e) => write!(f, "checkpoint: {}", e),
            TrainError::Stats(e) => write!(f, "stats: {}", e),
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainError::Buffer(e) => Some(e),
            TrainError::Policy(e) => Some(e),
            TrainError::Checkpoint(e) => Some(e),
            TrainError::Stats(e) => Some(e),
        }
    }
}

impl From<BufferError> for TrainError {
    fn from(e: BufferError) -> Self {
        TrainError::Buffer(e)
    }
}

impl From<PolicyError> for TrainError {
    fn from(e: PolicyError) -> Self {
        TrainError::Policy(e)
    }
}

impl From<CheckpointError> for TrainError {
    fn from(e: CheckpointError) -> Self {
        TrainError::Checkpoint(e)
    }
}
