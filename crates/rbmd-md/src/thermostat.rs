//! NVT thermostats for the rigid-body integrator.
//!
//! Two variants are supported:
//! - [`Brownian`]: Langevin drag plus a seeded random force on every particle.
//!   Body members receive these forces before aggregation, so bodies are
//!   thermostatted through their net force and torque.
//! - [`NoseHoover`]: an extended-system friction coefficient `xi` that scales
//!   translational and angular momenta.
//!
//! Auxiliary state (RNG stream, `xi`) starts fresh whenever a thermostat is
//! attached unless carry-over is requested explicitly.

use crate::{MdError, ParticleData, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rbmd_math::Vec3;

/// Brownian-dynamics (Langevin) thermostat.
#[derive(Clone, Debug)]
pub struct Brownian {
    /// Target temperature.
    pub temperature: f64,
    /// Drag coefficient (mass / time).
    pub gamma: f64,
    seed: u64,
    rng: StdRng,
    draws: u64,
}

impl Brownian {
    pub fn new(temperature: f64, gamma: f64, seed: u64) -> Self {
        Self {
            temperature,
            gamma,
            seed,
            rng: StdRng::seed_from_u64(seed),
            draws: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Random numbers drawn since the stream was (re)seeded.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Add drag `-γ v` and a random force with per-component variance
    /// `2 γ T / dt` to every particle, in index order.
    pub fn apply_forces(&mut self, particles: &mut ParticleData, dt: f64) {
        let sigma = (2.0 * self.gamma * self.temperature / dt).sqrt();
        for (f, v) in particles.force.iter_mut().zip(&particles.vel) {
            let noise = Vec3::new(
                StandardNormal.sample(&mut self.rng),
                StandardNormal.sample(&mut self.rng),
                StandardNormal.sample(&mut self.rng),
            );
            *f += -self.gamma * v + sigma * noise;
        }
        self.draws += 3 * particles.len() as u64;
    }
}

/// Nosé–Hoover thermostat.
#[derive(Clone, Debug)]
pub struct NoseHoover {
    /// Target temperature.
    pub temperature: f64,
    /// Coupling time constant.
    pub tau: f64,
    xi: f64,
}

impl NoseHoover {
    pub fn new(temperature: f64, tau: f64) -> Self {
        Self {
            temperature,
            tau,
            xi: 0.0,
        }
    }

    /// Current friction coefficient.
    pub fn xi(&self) -> f64 {
        self.xi
    }

    /// Momentum scale for half a step, exp(-xi dt / 2).
    pub fn half_step_scale(&self, dt: f64) -> f64 {
        (-0.5 * self.xi * dt).exp()
    }

    /// dxi/dt = (T/T0 - 1) / tau²
    pub fn advance(&mut self, current_temperature: f64, dt: f64) {
        self.xi += dt / (self.tau * self.tau) * (current_temperature / self.temperature - 1.0);
    }
}

/// Thermostat attached to the integrator.
#[derive(Clone, Debug)]
pub enum Thermostat {
    Brownian(Brownian),
    NoseHoover(NoseHoover),
}

/// What happens to auxiliary state when a thermostat replaces another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThermostatHandoff {
    /// Start from freshly initialised auxiliary state.
    #[default]
    Reset,
    /// Keep `xi` (Nosé–Hoover) or the RNG stream (Brownian) when the variant
    /// matches; otherwise reset.
    CarryOver,
}

impl Thermostat {
    pub fn brownian(temperature: f64, gamma: f64, seed: u64) -> Self {
        Thermostat::Brownian(Brownian::new(temperature, gamma, seed))
    }

    pub fn nose_hoover(temperature: f64, tau: f64) -> Self {
        Thermostat::NoseHoover(NoseHoover::new(temperature, tau))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Thermostat::Brownian(_) => "brownian",
            Thermostat::NoseHoover(_) => "nose-hoover",
        }
    }

    pub fn temperature(&self) -> f64 {
        match self {
            Thermostat::Brownian(b) => b.temperature,
            Thermostat::NoseHoover(n) => n.temperature,
        }
    }

    /// Nosé–Hoover friction coefficient, if any.
    pub fn xi(&self) -> Option<f64> {
        match self {
            Thermostat::NoseHoover(n) => Some(n.xi),
            Thermostat::Brownian(_) => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.temperature();
        if !(t.is_finite() && t >= 0.0) {
            return Err(MdError::config(format!(
                "{}: temperature must be non-negative, got {t}",
                self.name()
            )));
        }
        match self {
            Thermostat::Brownian(b) if !(b.gamma.is_finite() && b.gamma >= 0.0) => Err(
                MdError::config(format!("brownian: gamma must be non-negative, got {}", b.gamma)),
            ),
            Thermostat::NoseHoover(n) if !(n.tau.is_finite() && n.tau > 0.0) => Err(
                MdError::config(format!("nose-hoover: tau must be positive, got {}", n.tau)),
            ),
            Thermostat::NoseHoover(n) if n.temperature <= 0.0 => Err(MdError::config(
                "nose-hoover: temperature must be positive",
            )),
            _ => Ok(()),
        }
    }

    /// Reinitialise auxiliary state.
    pub fn reset(&mut self) {
        match self {
            Thermostat::Brownian(b) => {
                b.rng = StdRng::seed_from_u64(b.seed);
                b.draws = 0;
            }
            Thermostat::NoseHoover(n) => n.xi = 0.0,
        }
    }

    /// Take over auxiliary state from `previous` when the variants match.
    /// Returns false when nothing could be carried over.
    pub fn carry_over_from(&mut self, previous: &Thermostat) -> bool {
        match (self, previous) {
            (Thermostat::NoseHoover(next), Thermostat::NoseHoover(prev)) => {
                next.xi = prev.xi;
                true
            }
            (Thermostat::Brownian(next), Thermostat::Brownian(prev)) => {
                next.rng = prev.rng.clone();
                next.draws = prev.draws;
                true
            }
            _ => false,
        }
    }

    /// Per-particle thermostat forces, added after the pair forces.
    pub(crate) fn apply_forces(&mut self, particles: &mut ParticleData, dt: f64) {
        if let Thermostat::Brownian(b) = self {
            b.apply_forces(particles, dt);
        }
    }

    /// Momentum scale applied at the start and end of each step.
    pub(crate) fn half_step_scale(&self, dt: f64) -> f64 {
        match self {
            Thermostat::NoseHoover(n) => n.half_step_scale(dt),
            Thermostat::Brownian(_) => 1.0,
        }
    }

    /// Update auxiliary variables from the temperature after the second kick.
    pub(crate) fn end_step(&mut self, current_temperature: f64, dt: f64) {
        if let Thermostat::NoseHoover(n) = self {
            n.advance(current_temperature, dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Particle;
    use approx::assert_relative_eq;

    fn resting_particles(n: usize) -> ParticleData {
        let mut pd = ParticleData::new(["A"]);
        for i in 0..n {
            pd.push(Particle::new(Vec3::new(i as f64, 0.0, 0.0), 1.0, 0))
                .unwrap();
        }
        pd
    }

    #[test]
    fn test_brownian_reproducible_with_seed() {
        let mut a = resting_particles(10);
        let mut b = resting_particles(10);
        Brownian::new(1.2, 1.0, 42).apply_forces(&mut a, 0.005);
        Brownian::new(1.2, 1.0, 42).apply_forces(&mut b, 0.005);
        assert_eq!(a.force, b.force);

        let mut c = resting_particles(10);
        Brownian::new(1.2, 1.0, 43).apply_forces(&mut c, 0.005);
        assert_ne!(a.force, c.force);
    }

    #[test]
    fn test_brownian_variance() {
        let mut pd = resting_particles(20_000);
        let (gamma, temperature, dt) = (2.0, 1.5, 0.01);
        Brownian::new(temperature, gamma, 5).apply_forces(&mut pd, dt);
        let n = 3.0 * pd.len() as f64;
        let var: f64 = pd.force.iter().map(|f| f.norm_squared()).sum::<f64>() / n;
        assert_relative_eq!(var, 2.0 * gamma * temperature / dt, max_relative = 0.03);
    }

    #[test]
    fn test_brownian_drag() {
        let mut pd = resting_particles(1);
        pd.vel[0] = Vec3::new(2.0, 0.0, 0.0);
        // Zero temperature leaves only the drag term
        Brownian::new(0.0, 0.5, 1).apply_forces(&mut pd, 0.01);
        assert_relative_eq!(pd.force[0], Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_nose_hoover_friction_sign() {
        let mut nh = NoseHoover::new(1.0, 0.5);
        nh.advance(2.0, 0.01);
        assert!(nh.xi() > 0.0);
        assert!(nh.half_step_scale(0.01) < 1.0);

        let mut cold = NoseHoover::new(1.0, 0.5);
        cold.advance(0.5, 0.01);
        assert!(cold.xi() < 0.0);
        assert!(cold.half_step_scale(0.01) > 1.0);
    }

    #[test]
    fn test_reset_and_carry_over() {
        let mut previous = Thermostat::nose_hoover(1.0, 1.0);
        previous.end_step(3.0, 0.1);
        let xi = previous.xi().unwrap();
        assert!(xi > 0.0);

        let mut next = Thermostat::nose_hoover(1.2, 10.0);
        assert!(next.carry_over_from(&previous));
        assert_eq!(next.xi(), Some(xi));
        next.reset();
        assert_eq!(next.xi(), Some(0.0));

        let mut brownian = Thermostat::brownian(1.0, 1.0, 9);
        assert!(!brownian.carry_over_from(&previous));
    }

    #[test]
    fn test_brownian_reset_restarts_stream() {
        let mut t = Thermostat::brownian(1.0, 1.0, 77);
        let mut a = resting_particles(3);
        t.apply_forces(&mut a, 0.01);
        t.reset();
        let mut b = resting_particles(3);
        t.apply_forces(&mut b, 0.01);
        assert_eq!(a.force, b.force);
    }

    #[test]
    fn test_validate() {
        assert!(Thermostat::nose_hoover(1.2, 10.0).validate().is_ok());
        assert!(Thermostat::nose_hoover(1.2, 0.0).validate().is_err());
        assert!(Thermostat::brownian(-1.0, 1.0, 0).validate().is_err());
        assert!(Thermostat::brownian(1.0, -1.0, 0).validate().is_err());
    }
}
