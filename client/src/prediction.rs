//! Local player prediction and server reconciliation.
//!
//! Every input sample moves the predicted player immediately and is kept in a
//! bounded pending buffer. When the server acknowledges a sequence number the
//! acknowledged inputs are dropped, the player is reset to the authoritative
//! position and the remaining inputs are replayed. The gap between the old
//! prediction and the replay becomes a cosmetic offset that decays over
//! subsequent frames, unless it is large enough to be treated as a teleport.

use log::debug;
use shared::movement::{step_player, InputFlags, MovementResolver};
use shared::protocol::command_dt_secs;
use shared::Vec2;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingInput {
    pub seq: u32,
    pub dt_ms: f32,
    pub flags: InputFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionState {
    Idle,
    Predicting,
    /// A server correction is still being smoothed out of the render offset.
    Reconciling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Replay landed where the prediction already was.
    InSync,
    /// Replay diverged; the difference is being smoothed away.
    Smoothed { error: f32 },
    /// Divergence beyond the teleport threshold; snapped instantly.
    Snapped { error: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorConfig {
    pub capacity: usize,
    /// Errors larger than this many pixels snap instead of smoothing.
    pub teleport_threshold: f32,
    /// Exponential decay rate of the cosmetic offset, per second.
    pub error_decay_rate: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            teleport_threshold: 64.0,
            error_decay_rate: 10.0,
        }
    }
}

/// Offsets smaller than this are dropped to zero.
const ERROR_EPSILON: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct Predictor {
    config: PredictorConfig,
    pending: VecDeque<PendingInput>,
    next_seq: u32,
    last_acked_seq: u32,
    position: Vec2,
    velocity: Vec2,
    facing: Vec2,
    error_offset: Vec2,
    state: PredictionState,
}

impl Predictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            pending: VecDeque::with_capacity(config.capacity),
            next_seq: 1,
            last_acked_seq: 0,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            facing: Vec2::new(0.0, 1.0),
            error_offset: Vec2::ZERO,
            state: PredictionState::Idle,
        }
    }

    /// Starts over from an authoritative pose, e.g. after a snapshot.
    pub fn reset(&mut self, position: Vec2, facing: Vec2) {
        self.pending.clear();
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.facing = facing;
        self.error_offset = Vec2::ZERO;
        self.state = PredictionState::Idle;
    }

    /// Applies one input sample locally and buffers it for replay. The
    /// returned input is what gets sent to the server.
    pub fn apply_local_input<R: MovementResolver + ?Sized>(
        &mut self,
        resolver: &R,
        flags: InputFlags,
        dt_ms: f32,
    ) -> PendingInput {
        let input = PendingInput {
            seq: self.next_seq,
            dt_ms,
            flags,
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        self.step(resolver, &input);
        if self.pending.len() >= self.config.capacity {
            self.pending.pop_front();
        }
        self.pending.push_back(input);
        self.state = self.settled_state();
        input
    }

    /// Reconciles against an authoritative pose that includes every input up
    /// to `last_acked_seq`.
    pub fn reconcile<R: MovementResolver + ?Sized>(
        &mut self,
        resolver: &R,
        server_position: Vec2,
        server_facing: Vec2,
        last_acked_seq: u32,
    ) -> Reconciliation {
        self.last_acked_seq = self.last_acked_seq.max(last_acked_seq);
        let acked = self.last_acked_seq;
        self.pending.retain(|input| input.seq > acked);

        let predicted = self.position;
        self.position = server_position;
        self.facing = server_facing;
        self.velocity = Vec2::ZERO;
        let replay: Vec<PendingInput> = self.pending.iter().copied().collect();
        for input in &replay {
            self.step(resolver, input);
        }

        let error = predicted - self.position;
        let magnitude = error.length();
        let outcome = if magnitude > self.config.teleport_threshold {
            debug!("Reconciliation snapped ({:.1}px)", magnitude);
            self.error_offset = Vec2::ZERO;
            Reconciliation::Snapped { error: magnitude }
        } else if magnitude > ERROR_EPSILON {
            // Rendered position stays continuous across the correction.
            self.error_offset = self.error_offset + error;
            Reconciliation::Smoothed { error: magnitude }
        } else {
            Reconciliation::InSync
        };

        self.state = self.settled_state();
        outcome
    }

    /// Decays the cosmetic error offset over `dt` seconds.
    pub fn decay(&mut self, dt: f32) {
        let factor = (-self.config.error_decay_rate * dt).exp();
        self.error_offset = self.error_offset * factor;
        if self.error_offset.length() < ERROR_EPSILON {
            self.error_offset = Vec2::ZERO;
        }
        self.state = self.settled_state();
    }

    fn settled_state(&self) -> PredictionState {
        if self.error_offset != Vec2::ZERO {
            PredictionState::Reconciling
        } else if self.pending.is_empty() {
            PredictionState::Idle
        } else {
            PredictionState::Predicting
        }
    }

    fn step<R: MovementResolver + ?Sized>(&mut self, resolver: &R, input: &PendingInput) {
        let outcome = step_player(
            resolver,
            self.position,
            self.facing,
            input.flags,
            command_dt_secs(input.dt_ms),
        );
        self.position = outcome.position;
        self.velocity = outcome.velocity;
        self.facing = outcome.facing;
    }

    /// Simulated position.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Simulated position plus the decaying correction offset.
    pub fn render_position(&self) -> Vec2 {
        self.position + self.error_offset
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn facing(&self) -> Vec2 {
        self.facing
    }

    pub fn error_offset(&self) -> Vec2 {
        self.error_offset
    }

    pub fn state(&self) -> PredictionState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn last_acked_seq(&self) -> u32 {
        self.last_acked_seq
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::movement::OpenFloor;

    const RIGHT: InputFlags = InputFlags(InputFlags::RIGHT);
    const DOWN: InputFlags = InputFlags(InputFlags::DOWN);

    fn predictor_at(position: Vec2) -> Predictor {
        let mut predictor = Predictor::default();
        predictor.reset(position, Vec2::new(0.0, 1.0));
        predictor
    }

    #[test]
    fn test_state_transitions() {
        let mut predictor = predictor_at(Vec2::new(100.0, 100.0));
        assert_eq!(predictor.state(), PredictionState::Idle);

        let input = predictor.apply_local_input(&OpenFloor, RIGHT, 16.0);
        assert_eq!(input.seq, 1);
        assert_eq!(predictor.state(), PredictionState::Predicting);

        let server = predictor.position();
        predictor.reconcile(&OpenFloor, server, predictor.facing(), 1);
        assert_eq!(predictor.state(), PredictionState::Idle);
        assert_eq!(predictor.pending_len(), 0);
    }

    #[test]
    fn test_replay_converges_without_divergence() {
        let start = Vec2::new(100.0, 100.0);
        let mut predictor = predictor_at(start);
        let mut inputs = Vec::new();
        for i in 0..10 {
            let flags = if i % 3 == 0 { DOWN } else { RIGHT };
            inputs.push(predictor.apply_local_input(&OpenFloor, flags, 16.0));
        }
        let predicted = predictor.position();

        // The server has applied the first six inputs with the same step.
        let mut server_pos = start;
        let mut server_facing = Vec2::new(0.0, 1.0);
        for input in &inputs[..6] {
            let outcome = step_player(&OpenFloor, server_pos, server_facing, input.flags, input.dt_ms / 1000.0);
            server_pos = outcome.position;
            server_facing = outcome.facing;
        }

        let outcome = predictor.reconcile(&OpenFloor, server_pos, server_facing, 6);
        assert_eq!(outcome, Reconciliation::InSync);
        assert_eq!(predictor.pending_len(), 4);
        assert_approx_eq!(predictor.position().x, predicted.x, 1e-3);
        assert_approx_eq!(predictor.position().y, predicted.y, 1e-3);
        assert_eq!(predictor.error_offset(), Vec2::ZERO);
    }

    #[test]
    fn test_small_divergence_is_smoothed() {
        let mut predictor = predictor_at(Vec2::new(100.0, 100.0));
        predictor.apply_local_input(&OpenFloor, RIGHT, 16.0);
        let before = predictor.render_position();

        // Server says we are 5px further left than we thought.
        let server = predictor.position() - Vec2::new(5.0, 0.0);
        let outcome = predictor.reconcile(&OpenFloor, server, predictor.facing(), 1);
        let Reconciliation::Smoothed { error } = outcome else {
            panic!("expected smoothing, got {:?}", outcome);
        };
        assert_approx_eq!(error, 5.0, 1e-3);

        // Rendered position does not jump, simulated position does.
        assert_approx_eq!(predictor.render_position().x, before.x, 1e-3);
        assert_approx_eq!(predictor.position().x, server.x, 1e-3);
        assert_eq!(predictor.state(), PredictionState::Reconciling);

        // New input while the offset decays keeps the correction visible.
        predictor.apply_local_input(&OpenFloor, InputFlags(0), 16.0);
        assert_eq!(predictor.state(), PredictionState::Reconciling);
        predictor.decay(1.0 / 60.0);
        assert_eq!(predictor.state(), PredictionState::Reconciling);

        for _ in 0..120 {
            predictor.decay(1.0 / 60.0);
        }
        assert_eq!(predictor.error_offset(), Vec2::ZERO);
        assert_eq!(predictor.state(), PredictionState::Predicting);
        assert_approx_eq!(predictor.render_position().x, server.x, 1e-3);
    }

    #[test]
    fn test_large_divergence_snaps() {
        let mut predictor = predictor_at(Vec2::new(100.0, 100.0));
        predictor.apply_local_input(&OpenFloor, RIGHT, 16.0);

        let outcome = predictor.reconcile(&OpenFloor, Vec2::new(400.0, 300.0), Vec2::new(0.0, 1.0), 1);
        assert!(matches!(outcome, Reconciliation::Snapped { .. }));
        assert_eq!(predictor.render_position(), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn test_pending_buffer_is_bounded() {
        let mut predictor = Predictor::new(PredictorConfig {
            capacity: 4,
            ..PredictorConfig::default()
        });
        predictor.reset(Vec2::new(300.0, 200.0), Vec2::new(0.0, 1.0));
        for _ in 0..10 {
            predictor.apply_local_input(&OpenFloor, InputFlags::default(), 16.0);
        }
        assert_eq!(predictor.pending_len(), 4);
    }

    #[test]
    fn test_stale_ack_does_not_regress() {
        let mut predictor = predictor_at(Vec2::new(100.0, 100.0));
        for _ in 0..3 {
            predictor.apply_local_input(&OpenFloor, RIGHT, 16.0);
        }
        let pos = predictor.position();
        predictor.reconcile(&OpenFloor, pos, predictor.facing(), 3);
        predictor.reconcile(&OpenFloor, pos, predictor.facing(), 1);
        assert_eq!(predictor.last_acked_seq(), 3);
        assert_eq!(predictor.pending_len(), 0);
    }
}
