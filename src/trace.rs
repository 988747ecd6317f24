//! Adaptive pathline tracing through a time-dependent, layered velocity field.
//!
//! [`PathlineTracer::step`] is a pure transition from one [`Particle`] to the
//! next; [`PathlineTracer::trace`] drives it and accumulates the trajectory.
//! Each step is one Euler predictor plus one trapezoidal corrector. The step is
//! halved when the two disagree by more than the tolerance or when the
//! horizontal displacement is too large, and doubled after a run of calm steps.
//! A step that leaves the current layer is shortened by bisection so that the
//! particle lands on the interface, and the next step starts in the
//! neighbouring layer.

use std::fmt;

use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use thiserror::Error;

use crate::errors::{AemError, Result};
use crate::math::{Scalar, R3};
use crate::solver::CancelToken;

const BISECTION_ITERATIONS: usize = 60;

/// Anything a particle can be moved through.
pub trait VelocityField: Sync {
    /// Pore velocity at `position` and time `t`, evaluated in `layer`.
    fn velocity(&self, position: &R3, layer: usize, t: Scalar) -> Result<R3>;

    /// Number of layers, top first.
    fn layer_count(&self) -> usize;

    /// `(bottom, top)` elevation of `layer`.
    fn layer_bounds(&self, layer: usize) -> (Scalar, Scalar);

    /// Layer containing elevation `z`; interfaces belong to the upper layer.
    fn layer_at(&self, z: Scalar) -> Option<usize>;

    /// Label of an element that captures a particle moving from `from` to `to` in `layer`.
    fn captured_by(&self, _from: &R3, _to: &R3, _layer: usize) -> Option<String> {
        None
    }
}

/// Step-size control and stop conditions.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// First time step.
    pub initial_step: Scalar,
    /// Largest time step.
    pub max_step: Scalar,
    /// Smallest time step before the trace fails.
    pub min_step: Scalar,
    /// Largest accepted predictor/corrector discrepancy (length).
    pub tolerance: Scalar,
    /// Largest horizontal displacement per step.
    pub max_displacement: Scalar,
    /// Distance beyond an interface that counts as a crossing.
    pub vertical_tolerance: Scalar,
    /// Consecutive calm steps before the step is doubled.
    pub growth_after: usize,
    /// Maximum number of accepted steps.
    pub max_steps: usize,
    /// Optional cooperative cancellation.
    pub cancel: Option<CancelToken>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            initial_step: 1.0,
            max_step: 10.0,
            min_step: 1.0e-8,
            tolerance: 1.0e-3,
            max_displacement: 10.0,
            vertical_tolerance: 1.0e-6,
            growth_after: 3,
            max_steps: 10_000,
            cancel: None,
        }
    }
}

impl TraceConfig {
    /// Default control with initial step `initial_step` and maximum step `max_step`.
    #[must_use]
    pub fn new(initial_step: Scalar, max_step: Scalar) -> Self {
        Self { initial_step, max_step, ..Self::default() }
    }

    /// Sets the discrepancy tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Scalar) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the largest horizontal displacement per step.
    #[must_use]
    pub const fn with_max_displacement(mut self, max_displacement: Scalar) -> Self {
        self.max_displacement = max_displacement;
        self
    }

    /// Sets the smallest allowed step.
    #[must_use]
    pub const fn with_min_step(mut self, min_step: Scalar) -> Self {
        self.min_step = min_step;
        self
    }

    /// Sets the maximum number of steps.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the number of calm steps before growth.
    #[must_use]
    pub const fn with_growth_after(mut self, growth_after: usize) -> Self {
        self.growth_after = growth_after;
        self
    }

    /// Sets the interface crossing tolerance.
    #[must_use]
    pub const fn with_vertical_tolerance(mut self, vertical_tolerance: Scalar) -> Self {
        self.vertical_tolerance = vertical_tolerance;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn validate(&self) -> Result<()> {
        let positive = [
            ("initial_step", self.initial_step),
            ("max_step", self.max_step),
            ("min_step", self.min_step),
            ("tolerance", self.tolerance),
            ("max_displacement", self.max_displacement),
            ("vertical_tolerance", self.vertical_tolerance),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| *v <= 0.0 || !v.is_finite()) {
            return Err(AemError::config(format!("trace {name} must be positive, got {value}")));
        }
        if self.min_step > self.max_step {
            return Err(AemError::config("trace min_step exceeds max_step"));
        }
        if self.growth_after == 0 || self.max_steps == 0 {
            return Err(AemError::config("trace growth_after and max_steps must be positive"));
        }
        Ok(())
    }
}

/// Why a trace ended normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The configured number of steps was taken.
    MaxSteps,
    /// The requested end time was reached.
    EndTime,
    /// The particle entered a sink element.
    Captured {
        /// Label of the capturing element.
        element: String,
    },
    /// The particle left the top or bottom of the layer stack.
    ReachedBoundary,
    /// The trace was cancelled between steps.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxSteps => write!(f, "max_steps"),
            Self::EndTime => write!(f, "end_time"),
            Self::Captured { element } => write!(f, "captured:{element}"),
            Self::ReachedBoundary => write!(f, "boundary"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// State attached to each trajectory sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceState {
    /// Moving within one layer.
    Active,
    /// Landed on an interface and moved into layer `to`.
    LayerTransition {
        /// Layer left.
        from: usize,
        /// Layer entered.
        to: usize,
    },
    /// Terminal, successful.
    Stopped(StopReason),
    /// Terminal, unsuccessful.
    Failed,
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::LayerTransition { from, to } => write!(f, "transition:{from}->{to}"),
            Self::Stopped(reason) => write!(f, "stopped:{reason}"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One sample of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TracePoint {
    /// Position.
    pub position: R3,
    /// Time.
    pub time: Scalar,
    /// Layer the particle is in.
    pub layer: usize,
    /// Velocity at the sample.
    pub velocity: R3,
    /// State after reaching the sample.
    pub state: TraceState,
}

/// A completed pathline.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// Samples, starting with the release point.
    pub points: Vec<TracePoint>,
    /// Why the trace ended.
    pub stop: StopReason,
}

impl Trajectory {
    /// Last sample.
    #[must_use]
    pub fn last(&self) -> Option<&TracePoint> {
        self.points.last()
    }
}

/// A pathline that could not be completed; the samples reached so far are kept.
#[derive(Debug, Error)]
#[error("pathline failed at t = {time} after {} samples: {reason}", .points.len())]
pub struct TraceFailure {
    /// Time of the last accepted sample.
    pub time: Scalar,
    /// What went wrong.
    pub reason: String,
    /// Samples accepted before the failure; the last one is marked `Failed`.
    pub points: Vec<TracePoint>,
    /// Error raised by the velocity field, if that caused the failure.
    pub cause: Option<Box<AemError>>,
}

/// Integration state of one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Position.
    pub position: R3,
    /// Time.
    pub time: Scalar,
    /// Current layer.
    pub layer: usize,
    /// Velocity at the current position and time.
    pub velocity: R3,
    /// Step to try next.
    pub dt: Scalar,
    /// Consecutive calm steps.
    pub calm_steps: usize,
    /// Accepted steps so far.
    pub steps: usize,
}

/// Result of one successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// The particle after the step.
    pub particle: Particle,
    /// State reached.
    pub state: TraceState,
}

/// Why a single step could not be taken.
#[derive(Debug)]
pub enum StepError {
    /// The velocity field failed.
    Velocity(AemError),
    /// The step shrank below the minimum; carries the last step tried.
    Underflow(Scalar),
}

impl From<AemError> for StepError {
    fn from(error: AemError) -> Self {
        Self::Velocity(error)
    }
}

/// Predictor/corrector result for a trial step.
struct Trial {
    predicted: R3,
    corrected: R3,
}

/// Pathline integrator over a [`VelocityField`].
#[derive(Debug, Clone)]
pub struct PathlineTracer<'a, F: VelocityField> {
    field: &'a F,
    config: TraceConfig,
}

impl<'a, F: VelocityField> PathlineTracer<'a, F> {
    /// Tracer over `field`; fails on invalid step control.
    pub fn new(field: &'a F, config: TraceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { field, config })
    }

    /// Step control in use.
    #[must_use]
    pub const fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Releases a particle at `start` at time `start_time`.
    pub fn release(&self, start: R3, start_time: Scalar) -> Result<Particle> {
        let layer = self.field.layer_at(start.z).ok_or_else(|| {
            AemError::config(format!("start elevation {} is outside the layer stack", start.z))
        })?;
        self.release_in_layer(start, layer, start_time)
    }

    /// Releases a particle at `start` in an explicit layer (for points on an interface).
    ///
    /// A velocity failure at release is reported as a trace failure with no samples.
    pub fn release_in_layer(
        &self,
        start: R3,
        layer: usize,
        start_time: Scalar,
    ) -> Result<Particle> {
        if layer >= self.field.layer_count() {
            return Err(AemError::config(format!("layer {layer} does not exist")));
        }
        let velocity = self.field.velocity(&start, layer, start_time).map_err(|e| {
            AemError::from(TraceFailure {
                time: start_time,
                reason: e.to_string(),
                points: Vec::new(),
                cause: Some(Box::new(e)),
            })
        })?;
        Ok(Particle {
            position: start,
            time: start_time,
            layer,
            velocity,
            dt: self.config.initial_step.min(self.config.max_step),
            calm_steps: 0,
            steps: 0,
        })
    }

    /// Traces from `start` between `start_time` and `end_time`.
    pub fn trace(&self, start: R3, start_time: Scalar, end_time: Scalar) -> Result<Trajectory> {
        let particle = self.release(start, start_time)?;
        self.trace_particle(particle, end_time)
    }

    /// Traces an already released particle until a stop condition or failure.
    pub fn trace_particle(&self, mut particle: Particle, end_time: Scalar) -> Result<Trajectory> {
        if end_time <= particle.time || end_time.is_nan() {
            return Err(AemError::config(format!(
                "end time {end_time} must be after the start time {}",
                particle.time
            )));
        }
        let mut points = vec![TracePoint {
            position: particle.position,
            time: particle.time,
            layer: particle.layer,
            velocity: particle.velocity,
            state: TraceState::Active,
        }];
        loop {
            if self.config.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                mark_last(&mut points, TraceState::Stopped(StopReason::Cancelled));
                return Ok(Trajectory { points, stop: StopReason::Cancelled });
            }
            match self.step(&particle, end_time) {
                Ok(Step { particle: next, state }) => {
                    points.push(TracePoint {
                        position: next.position,
                        time: next.time,
                        layer: next.layer,
                        velocity: next.velocity,
                        state: state.clone(),
                    });
                    if let TraceState::Stopped(stop) = state {
                        debug!("pathline stopped ({stop}) after {} steps", next.steps);
                        return Ok(Trajectory { points, stop });
                    }
                    particle = next;
                }
                Err(error) => {
                    mark_last(&mut points, TraceState::Failed);
                    let (reason, cause) = match error {
                        StepError::Velocity(e) => (e.to_string(), Some(Box::new(e))),
                        StepError::Underflow(dt) => {
                            (format!("time step {dt:e} fell below the minimum"), None)
                        }
                    };
                    return Err(TraceFailure { time: particle.time, reason, points, cause }.into());
                }
            }
        }
    }

    /// Advances `particle` by one accepted step (or up to an interface).
    pub fn step(
        &self,
        particle: &Particle,
        end_time: Scalar,
    ) -> std::result::Result<Step, StepError> {
        let cfg = &self.config;
        let mut dt = particle.dt.min(end_time - particle.time);
        let mut halved = false;
        let (trial, dt, discrepancy) = loop {
            if dt < cfg.min_step && dt < end_time - particle.time {
                return Err(StepError::Underflow(dt));
            }
            let trial = self.advance(particle, dt)?;
            let discrepancy = (trial.corrected - trial.predicted).norm();
            let moved = trial.corrected - particle.position;
            if discrepancy > cfg.tolerance || moved.xy().norm() > cfg.max_displacement {
                dt *= 0.5;
                halved = true;
                continue;
            }
            break (trial, dt, discrepancy);
        };

        let mut calm_steps =
            if discrepancy < 0.25 * cfg.tolerance { particle.calm_steps + 1 } else { 0 };
        let mut next_dt = if halved { dt } else { particle.dt };
        if calm_steps >= cfg.growth_after {
            next_dt = (2.0 * next_dt).min(cfg.max_step);
            calm_steps = 0;
        }

        let (bottom, top) = self.field.layer_bounds(particle.layer);
        let z = trial.corrected.z;
        let crossing = if z > top + cfg.vertical_tolerance {
            Some((top, true))
        } else if z < bottom - cfg.vertical_tolerance {
            Some((bottom, false))
        } else {
            None
        };

        let (position, time, state, layer) = match crossing {
            None => (
                trial.corrected,
                particle.time + dt,
                TraceState::Active,
                particle.layer,
            ),
            Some((interface, upward)) => {
                let (position, partial) = self.land_on(particle, dt, interface)?;
                let neighbour = if upward {
                    particle.layer.checked_sub(1)
                } else {
                    Some(particle.layer + 1).filter(|&l| l < self.field.layer_count())
                };
                match neighbour {
                    Some(to) => (
                        position,
                        particle.time + partial,
                        TraceState::LayerTransition { from: particle.layer, to },
                        to,
                    ),
                    None => (
                        position,
                        particle.time + partial,
                        TraceState::Stopped(StopReason::ReachedBoundary),
                        particle.layer,
                    ),
                }
            }
        };

        let steps = particle.steps + 1;
        let state = if let Some(element) =
            self.field.captured_by(&particle.position, &position, particle.layer)
        {
            TraceState::Stopped(StopReason::Captured { element })
        } else if matches!(state, TraceState::Stopped(_)) {
            state
        } else if time >= end_time * (1.0 - Scalar::EPSILON) {
            TraceState::Stopped(StopReason::EndTime)
        } else if steps >= cfg.max_steps {
            TraceState::Stopped(StopReason::MaxSteps)
        } else {
            state
        };

        let velocity = self.field.velocity(&position, layer, time)?;
        Ok(Step {
            particle: Particle {
                position,
                time,
                layer,
                velocity,
                dt: next_dt,
                calm_steps,
                steps,
            },
            state,
        })
    }

    fn advance(&self, particle: &Particle, dt: Scalar) -> std::result::Result<Trial, StepError> {
        let v0 = particle.velocity;
        let predicted = particle.position + v0 * dt;
        let v1 = self.field.velocity(&predicted, particle.layer, particle.time + dt)?;
        let corrected = particle.position + (v0 + v1) * (0.5 * dt);
        Ok(Trial { predicted, corrected })
    }

    // Bisects on the step length until the corrected position lies on `interface`.
    fn land_on(
        &self,
        particle: &Particle,
        dt: Scalar,
        interface: Scalar,
    ) -> std::result::Result<(R3, Scalar), StepError> {
        if (particle.position.z - interface).abs() <= self.config.vertical_tolerance {
            return Ok((particle.position, 0.0));
        }
        let side = |z: Scalar| (z - interface).signum();
        let start_side = side(particle.position.z);
        let (mut lo, mut hi) = (0.0, dt);
        let mut best = (particle.position, 0.0);
        for _ in 0..BISECTION_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            let trial = self.advance(particle, mid)?;
            let z = trial.corrected.z;
            best = (trial.corrected, mid);
            if (z - interface).abs() <= self.config.vertical_tolerance {
                break;
            }
            if side(z) == start_side {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let (mut position, partial) = best;
        position.z = interface;
        Ok((position, partial))
    }

    /// Traces independent particles, in parallel with the `parallel` feature.
    pub fn trace_many(&self, starts: &[(R3, Scalar)], end_time: Scalar) -> Vec<Result<Trajectory>> {
        #[cfg(feature = "parallel")]
        {
            starts.par_iter().map(|&(start, t0)| self.trace(start, t0, end_time)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            starts.iter().map(|&(start, t0)| self.trace(start, t0, end_time)).collect()
        }
    }
}

fn mark_last(points: &mut [TracePoint], state: TraceState) {
    if let Some(last) = points.last_mut() {
        last.state = state;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Uniform velocity in a stack of equally thick layers.
    struct Uniform {
        velocity: R3,
        interfaces: Vec<Scalar>,
    }

    impl Uniform {
        fn new(velocity: R3) -> Self {
            Self { velocity, interfaces: vec![0.0, -10.0, -20.0, -30.0] }
        }
    }

    impl VelocityField for Uniform {
        fn velocity(&self, _position: &R3, _layer: usize, _t: Scalar) -> Result<R3> {
            Ok(self.velocity)
        }

        fn layer_count(&self) -> usize {
            self.interfaces.len() - 1
        }

        fn layer_bounds(&self, layer: usize) -> (Scalar, Scalar) {
            (self.interfaces[layer + 1], self.interfaces[layer])
        }

        fn layer_at(&self, z: Scalar) -> Option<usize> {
            (0..self.layer_count()).find(|&l| {
                let (bottom, top) = self.layer_bounds(l);
                z <= top && z >= bottom
            })
        }
    }

    /// Velocity that fails after a given time.
    struct Expiring {
        inner: Uniform,
        until: Scalar,
    }

    impl VelocityField for Expiring {
        fn velocity(&self, position: &R3, layer: usize, t: Scalar) -> Result<R3> {
            if t > self.until {
                return Err(AemError::OutOfRange { time: t, min_time: 0.0, max_time: self.until });
            }
            self.inner.velocity(position, layer, t)
        }

        fn layer_count(&self) -> usize {
            self.inner.layer_count()
        }

        fn layer_bounds(&self, layer: usize) -> (Scalar, Scalar) {
            self.inner.layer_bounds(layer)
        }

        fn layer_at(&self, z: Scalar) -> Option<usize> {
            self.inner.layer_at(z)
        }
    }

    #[test]
    fn uniform_flow_gives_straight_line_at_constant_speed() {
        let field = Uniform::new(R3::new(0.5, -0.25, 0.0));
        let tracer = PathlineTracer::new(&field, TraceConfig::new(0.5, 4.0)).unwrap();
        let start = R3::new(1.0, 2.0, -5.0);
        let path = tracer.trace(start, 0.0, 100.0).unwrap();
        assert_eq!(path.stop, StopReason::EndTime);
        for point in &path.points {
            let expected = start + field.velocity * point.time;
            assert_relative_eq!(point.position.x, expected.x, epsilon = 1.0e-9);
            assert_relative_eq!(point.position.y, expected.y, epsilon = 1.0e-9);
            assert_relative_eq!(point.position.z, -5.0, epsilon = 1.0e-12);
        }
        let last = path.last().unwrap();
        assert_relative_eq!(last.time, 100.0, epsilon = 1.0e-9);
        // steps grow up to the maximum once the flow is calm
        assert!(path.points.len() < 40);
    }

    #[test]
    fn particle_on_interface_without_vertical_flow_stays_in_its_layer() {
        let field = Uniform::new(R3::new(1.0, 0.0, 0.0));
        let tracer = PathlineTracer::new(&field, TraceConfig::new(1.0, 5.0)).unwrap();
        let path = tracer.trace(R3::new(0.0, 0.0, -10.0), 0.0, 50.0).unwrap();
        assert!(path.points.iter().all(|p| p.layer == 0));
        assert!(path
            .points
            .iter()
            .all(|p| matches!(p.state, TraceState::Active | TraceState::Stopped(_))));
    }

    #[test]
    fn downward_flow_lands_on_each_interface() {
        let field = Uniform::new(R3::new(0.0, 0.0, -1.0));
        let tracer = PathlineTracer::new(&field, TraceConfig::new(3.0, 3.0)).unwrap();
        let path = tracer.trace(R3::new(0.0, 0.0, -1.0), 0.0, 100.0).unwrap();
        let transitions: Vec<&TracePoint> = path
            .points
            .iter()
            .filter(|p| matches!(p.state, TraceState::LayerTransition { .. }))
            .collect();
        assert_eq!(transitions.len(), 2);
        assert_relative_eq!(transitions[0].position.z, -10.0);
        assert_eq!(transitions[0].layer, 1);
        assert_relative_eq!(transitions[0].time, 9.0, epsilon = 1.0e-5);
        assert_relative_eq!(transitions[1].position.z, -20.0);
        assert_eq!(transitions[1].layer, 2);
        assert_eq!(path.stop, StopReason::ReachedBoundary);
        assert_relative_eq!(path.last().unwrap().position.z, -30.0);
    }

    #[test]
    fn max_steps_stops_the_trace() {
        let field = Uniform::new(R3::new(1.0, 0.0, 0.0));
        let config = TraceConfig::new(1.0, 1.0).with_max_steps(5);
        let tracer = PathlineTracer::new(&field, config).unwrap();
        let path = tracer.trace(R3::new(0.0, 0.0, -5.0), 0.0, 1000.0).unwrap();
        assert_eq!(path.stop, StopReason::MaxSteps);
        assert_eq!(path.points.len(), 6);
    }

    #[test]
    fn velocity_errors_keep_the_partial_trajectory() {
        let field = Expiring { inner: Uniform::new(R3::new(1.0, 0.0, 0.0)), until: 4.5 };
        let tracer = PathlineTracer::new(&field, TraceConfig::new(1.0, 1.0)).unwrap();
        let error = tracer.trace(R3::new(0.0, 0.0, -5.0), 0.0, 10.0).unwrap_err();
        let failure = match error {
            AemError::TraceFailed(failure) => failure,
            other => panic!("expected a trace failure, got {other}"),
        };
        assert_eq!(failure.points.len(), 5);
        assert_eq!(failure.points.last().unwrap().state, TraceState::Failed);
        assert!(matches!(failure.cause.as_deref(), Some(AemError::OutOfRange { .. })));
    }

    #[test]
    fn failure_at_release_is_a_trace_failure() {
        let field = Expiring { inner: Uniform::new(R3::new(1.0, 0.0, 0.0)), until: -1.0 };
        let tracer = PathlineTracer::new(&field, TraceConfig::new(1.0, 1.0)).unwrap();
        match tracer.trace(R3::new(0.0, 0.0, -5.0), 0.0, 10.0) {
            Err(AemError::TraceFailed(failure)) => {
                assert!(failure.points.is_empty());
                assert_relative_eq!(failure.time, 0.0);
                assert!(matches!(failure.cause.as_deref(), Some(AemError::OutOfRange { .. })));
            }
            other => panic!("expected a trace failure, got {other:?}"),
        }
        // a bad elevation is still a configuration error
        assert!(matches!(
            tracer.trace(R3::new(0.0, 0.0, 5.0), 0.0, 10.0),
            Err(AemError::Configuration(_))
        ));
    }

    #[test]
    fn release_on_interface_keeps_vertical_displacement() {
        let field = Uniform::new(R3::new(0.0, 0.0, 1.0));
        let tracer = PathlineTracer::new(&field, TraceConfig::new(1.0, 1.0)).unwrap();
        let particle = tracer.release_in_layer(R3::new(0.0, 0.0, -10.0), 1, 0.0).unwrap();
        let path = tracer.trace_particle(particle, 5.0).unwrap();
        assert_eq!(path.stop, StopReason::EndTime);
        assert_eq!(path.points[1].state, TraceState::LayerTransition { from: 1, to: 0 });
        assert_relative_eq!(path.points[1].time, 0.0);
        for point in &path.points {
            assert_relative_eq!(point.position.z, -10.0 + point.time, epsilon = 1.0e-9);
        }
        let last = path.last().unwrap();
        assert_eq!(last.layer, 0);
        assert_relative_eq!(last.position.z, -5.0, epsilon = 1.0e-9);
    }

    #[test]
    fn flow_reversal_after_a_transition_returns_to_the_upper_layer() {
        // downward until t = 5, upward afterwards
        struct Reversing(Uniform);
        impl VelocityField for Reversing {
            fn velocity(&self, _position: &R3, _layer: usize, t: Scalar) -> Result<R3> {
                Ok(R3::new(0.0, 0.0, if t < 5.0 { -1.0 } else { 1.0 }))
            }
            fn layer_count(&self) -> usize {
                self.0.layer_count()
            }
            fn layer_bounds(&self, layer: usize) -> (Scalar, Scalar) {
                self.0.layer_bounds(layer)
            }
            fn layer_at(&self, z: Scalar) -> Option<usize> {
                self.0.layer_at(z)
            }
        }
        let field = Reversing(Uniform::new(R3::zeros()));
        let config = TraceConfig::new(1.0, 1.0).with_tolerance(10.0);
        let tracer = PathlineTracer::new(&field, config).unwrap();
        let path = tracer.trace(R3::new(0.0, 0.0, -6.5), 0.0, 8.0).unwrap();
        let transitions: Vec<&TraceState> = path
            .points
            .iter()
            .map(|p| &p.state)
            .filter(|s| matches!(s, TraceState::LayerTransition { .. }))
            .collect();
        assert_eq!(
            transitions,
            [
                &TraceState::LayerTransition { from: 0, to: 1 },
                &TraceState::LayerTransition { from: 1, to: 0 }
            ]
        );
        let last = path.last().unwrap();
        assert_eq!(last.layer, 0);
        assert_relative_eq!(last.position.z, -8.5, epsilon = 1.0e-9);
    }

    #[test]
    fn cancelled_trace_stops_cleanly() {
        let field = Uniform::new(R3::new(1.0, 0.0, 0.0));
        let token = CancelToken::new();
        token.cancel();
        let tracer =
            PathlineTracer::new(&field, TraceConfig::new(1.0, 1.0).with_cancel(token)).unwrap();
        let path = tracer.trace(R3::new(0.0, 0.0, -5.0), 0.0, 10.0).unwrap();
        assert_eq!(path.stop, StopReason::Cancelled);
        assert_eq!(path.points.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let field = Uniform::new(R3::zeros());
        assert!(PathlineTracer::new(&field, TraceConfig::new(0.0, 1.0)).is_err());
        let tiny_max = TraceConfig::new(1.0, 1.0).with_min_step(2.0);
        assert!(PathlineTracer::new(&field, tiny_max).is_err());
    }

    #[test]
    fn many_particles_trace_independently() {
        let field = Uniform::new(R3::new(1.0, 0.0, 0.0));
        let tracer = PathlineTracer::new(&field, TraceConfig::new(1.0, 2.0)).unwrap();
        let starts = [(R3::new(0.0, 0.0, -5.0), 0.0), (R3::new(0.0, 1.0, -15.0), 2.0)];
        let paths = tracer.trace_many(&starts, 10.0);
        assert_eq!(paths.len(), 2);
        let second = paths[1].as_ref().unwrap();
        assert_eq!(second.points[0].layer, 1);
        assert_relative_eq!(second.last().unwrap().position.x, 8.0, epsilon = 1.0e-9);
    }
}
