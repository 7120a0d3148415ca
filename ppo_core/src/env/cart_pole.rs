//! Classic cart-pole balancing task.
//!
//! Four-dimensional observation `[x, x_dot, theta, theta_dot]`, two actions
//! (0 pushes left, 1 pushes right) and a reward of 1 for every step taken.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Environment, Transition};

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const POLE_HALF_LENGTH: f32 = 0.5;
const FORCE_MAG: f32 = 10.0;
const TAU: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * std::f32::consts::PI / 180.0;
const INIT_RANGE: f32 = 0.05;

pub const DEFAULT_MAX_EPISODE_STEPS: u32 = 200;

pub struct CartPole {
    state: [f32; 4],
    steps: u32,
    max_episode_steps: u32,
    rng: StdRng,
}

impl CartPole {
    pub fn new(seed: u64, max_episode_steps: u32) -> Self {
        let mut env = Self {
            state: [0.0; 4],
            steps: 0,
            max_episode_steps,
            rng: StdRng::seed_from_u64(seed),
        };
        env.reset();
        env
    }

    pub fn with_defaults(seed: u64) -> Self {
        Self::new(seed, DEFAULT_MAX_EPISODE_STEPS)
    }

    pub fn state(&self) -> [f32; 4] {
        self.state
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    fn failed(&self) -> bool {
        let [x, _, theta, _] = self.state;
        x.abs() > X_THRESHOLD || theta.abs() > THETA_THRESHOLD
    }
}

impl Environment for CartPole {
    fn observation_dim(&self) -> usize {
        4
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Vec<f32> {
        for value in self.state.iter_mut() {
            *value = self.rng.gen_range(-INIT_RANGE..INIT_RANGE);
        }
        self.steps = 0;
        self.state.to_vec()
    }

    fn step(&mut self, action: usize) -> Transition {
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let [x, x_dot, theta, theta_dot] = self.state;

        let cos_theta = theta.cos();
        let sin_theta = theta.sin();
        let total_mass = CART_MASS + POLE_MASS;
        let pole_mass_length = POLE_MASS * POLE_HALF_LENGTH;

        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        // explicit Euler
        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        self.steps += 1;

        let terminated = self.failed();
        let truncated = !terminated && self.steps >= self.max_episode_steps;
        Transition {
            observation: self.state.to_vec(),
            reward: 1.0,
            terminated,
            truncated,
        }
    }
}
