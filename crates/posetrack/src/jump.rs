//! Snap-to-keyframe camera transitions.
//!
//! A jump blends the live camera to a keyframe over a fixed duration. Wall
//! time accumulates between ticks and is consumed in fixed increments, so the
//! number of samples depends only on the duration and the step, never on the
//! render rate.

use std::cell::Cell;
use std::rc::Rc;

use glam::{DMat3, DQuat, DVec3};
use posetrack_core::convention::{quat_from_mat3, renderer_to_internal};
use posetrack_core::{look_at_basis, quat_slerp, EngineOptions, Keyframe};

// Absorbs rounding drift so summed tick times never lose a step.
const STEP_EPSILON: f64 = 1e-9;

/// Shared cancellation flag of one jump.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Where the camera starts.
#[derive(Debug, Clone, Copy)]
pub struct JumpStart {
    pub position: DVec3,
    pub target: DVec3,
    /// Live orientation in the renderer basis.
    pub orientation: Option<DQuat>,
    pub frame: f64,
}

/// One interpolation sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpSample {
    pub position: DVec3,
    pub target: DVec3,
    /// Internal-convention orientation.
    pub rotation: DMat3,
    pub frame: u32,
}

/// What one tick produced.
#[derive(Debug, Clone, Default)]
pub struct JumpTick {
    pub samples: Vec<JumpSample>,
    /// Exact final pose, present once the jump is over.
    pub finished: Option<JumpSample>,
}

/// A running transition.
#[derive(Debug)]
pub struct JumpAnimation {
    start_position: DVec3,
    start_target: DVec3,
    start_orientation: DQuat,
    start_frame: f64,
    end: JumpSample,
    end_orientation: DQuat,
    duration: f64,
    step: f64,
    total_steps: u32,
    steps_taken: u32,
    accumulator: f64,
    elapsed: f64,
    token: CancelToken,
}

impl JumpAnimation {
    /// Starts a jump from `start` to `key`.
    pub fn new(start: JumpStart, key: &Keyframe, options: &EngineOptions) -> Self {
        let start_rotation = start
            .orientation
            .map(|q| renderer_to_internal(DMat3::from_quat(q)))
            .unwrap_or_else(|| look_at_basis(start.position, start.target));
        let end_rotation = key
            .internal_rotation()
            .unwrap_or_else(|| look_at_basis(key.position, key.target));

        Self {
            start_position: start.position,
            start_target: start.target,
            start_orientation: quat_from_mat3(start_rotation),
            start_frame: start.frame,
            end: JumpSample {
                position: key.position,
                target: key.target,
                rotation: end_rotation,
                frame: key.frame,
            },
            end_orientation: quat_from_mat3(end_rotation),
            duration: options.jump_duration_secs.max(0.0),
            step: options.jump_fixed_step_secs,
            total_steps: options.jump_step_count(),
            steps_taken: 0,
            accumulator: 0.0,
            elapsed: 0.0,
            token: CancelToken::default(),
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fixed steps consumed so far.
    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// The keyframe pose the jump ends on.
    pub fn end(&self) -> &JumpSample {
        &self.end
    }

    fn sample(&self, t: f64) -> JumpSample {
        let frame = self.start_frame + (f64::from(self.end.frame) - self.start_frame) * t;
        let orientation = quat_slerp(self.start_orientation, self.end_orientation, t);
        JumpSample {
            position: self.start_position.lerp(self.end.position, t),
            target: self.start_target.lerp(self.end.target, t),
            rotation: DMat3::from_quat(orientation),
            frame: frame.round().max(0.0) as u32,
        }
    }

    /// Advances by `dt` seconds of wall time.
    pub fn advance(&mut self, dt: f64) -> JumpTick {
        let mut tick = JumpTick::default();
        if self.is_cancelled() {
            return tick;
        }

        let dt = dt.max(0.0);
        self.elapsed += dt;
        self.accumulator += dt;

        let mut advanced = false;
        while self.accumulator + STEP_EPSILON >= self.step && self.steps_taken < self.total_steps {
            self.accumulator -= self.step;
            self.steps_taken += 1;
            advanced = true;

            let t = (f64::from(self.steps_taken) / f64::from(self.total_steps)).min(1.0);
            tick.samples.push(self.sample(t));
            if self.steps_taken >= self.total_steps {
                tick.finished = Some(self.end);
                return tick;
            }
        }

        // ticks too short to reach another step still finish on time
        if !advanced && self.elapsed >= self.duration {
            tick.finished = Some(self.end);
        }
        tick
    }
}
