//! Delayed rendering of remote entities.
//!
//! Remote entities are drawn slightly in the past so there are usually two
//! authoritative samples around the render time to blend between.

use shared::ecs::EntityId;
use shared::Vec2;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationConfig {
    /// How far behind the newest data remote entities are rendered.
    pub delay_ms: f64,
    /// Samples older than this relative to the newest one are pruned.
    pub window_ms: f64,
    pub max_extrapolation_ms: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            delay_ms: 75.0,
            window_ms: 200.0,
            max_extrapolation_ms: 150.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time_ms: f64,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Time-ordered positional samples of one entity.
#[derive(Debug, Clone, Default)]
pub struct PositionHistory {
    samples: VecDeque<Sample>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample and prunes those outside the window. The newest
    /// sample is always kept. Out-of-order samples are dropped.
    pub fn push(&mut self, sample: Sample, window_ms: f64) {
        if let Some(last) = self.samples.back() {
            if sample.time_ms < last.time_ms {
                return;
            }
        }
        self.samples.push_back(sample);

        let cutoff = sample.time_ms - window_ms;
        while self.samples.len() > 1 && self.samples.front().is_some_and(|s| s.time_ms < cutoff) {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Position at `render_time_ms`, blended between the samples around it.
    pub fn sample(&self, render_time_ms: f64, max_extrapolation_ms: f64) -> Option<Vec2> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;

        if render_time_ms <= first.time_ms {
            return Some(first.position);
        }
        if render_time_ms >= last.time_ms {
            let ahead = (render_time_ms - last.time_ms).min(max_extrapolation_ms);
            return Some(last.position + last.velocity * (ahead / 1000.0) as f32);
        }

        let newer = self.samples.iter().position(|s| s.time_ms >= render_time_ms)?;
        let to = self.samples[newer];
        let from = self.samples[newer.saturating_sub(1)];
        let span = to.time_ms - from.time_ms;
        if span <= 0.0 {
            return Some(to.position);
        }
        let alpha = ((render_time_ms - from.time_ms) / span) as f32;
        Some(from.position.lerp(to.position, alpha))
    }
}

/// Histories for every remote entity.
#[derive(Debug, Clone, Default)]
pub struct Interpolator {
    config: InterpolationConfig,
    histories: HashMap<EntityId, PositionHistory>,
}

impl Interpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    pub fn record(&mut self, entity: EntityId, time_ms: f64, position: Vec2, velocity: Vec2) {
        let window = self.config.window_ms;
        self.histories.entry(entity).or_default().push(
            Sample {
                time_ms,
                position,
                velocity,
            },
            window,
        );
    }

    pub fn remove(&mut self, entity: EntityId) {
        self.histories.remove(&entity);
    }

    pub fn clear(&mut self) {
        self.histories.clear();
    }

    pub fn history(&self, entity: EntityId) -> Option<&PositionHistory> {
        self.histories.get(&entity)
    }

    /// Rendered position at wall time `now_ms`, or `None` for an entity with
    /// no history yet.
    pub fn position_at(&self, entity: EntityId, now_ms: f64) -> Option<Vec2> {
        self.histories
            .get(&entity)?
            .sample(now_ms - self.config.delay_ms, self.config.max_extrapolation_ms)
    }
}
