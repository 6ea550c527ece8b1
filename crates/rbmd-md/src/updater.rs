//! Periodic updaters applied after a completed step.

use crate::{MdError, Result, SystemState};

/// Rescales all velocities and angular momenta to a set-point temperature
/// every `period` steps.
#[derive(Clone, Debug)]
pub struct TempRescale {
    pub temperature: f64,
    pub period: u64,
}

impl TempRescale {
    /// Below this instantaneous temperature rescaling is skipped.
    pub const MIN_TEMPERATURE: f64 = 1e-3;

    pub fn new(temperature: f64, period: u64) -> Result<Self> {
        if !(temperature.is_finite() && temperature >= 0.0) {
            return Err(MdError::config(format!(
                "temp rescale: temperature must be non-negative, got {temperature}"
            )));
        }
        if period == 0 {
            return Err(MdError::config("temp rescale: period must be at least 1"));
        }
        Ok(Self {
            temperature,
            period,
        })
    }

    /// Apply at `step` if due. Returns true if velocities were rescaled.
    pub fn update(&self, step: u64, state: &mut SystemState) -> bool {
        if step % self.period != 0 {
            return false;
        }
        let current = state.thermo(0.0).temperature();
        if current < Self::MIN_TEMPERATURE {
            log::warn!(
                "temp rescale at step {step}: cannot scale a temperature of {current:.3e}, skipping"
            );
            return false;
        }
        state.scale_momenta((self.temperature / current).sqrt());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Particle, ParticleData, SimBox};
    use approx::assert_relative_eq;
    use rbmd_math::Vec3;

    fn gas() -> SystemState {
        let mut pd = ParticleData::new(["A"]);
        for k in 0..20 {
            pd.push(Particle::new(Vec3::new(0.3 * k as f64 - 3.0, 0.0, 0.0), 1.0, 0))
                .unwrap();
        }
        pd.push(Particle::new(Vec3::new(0.0, 2.0, 0.0), 1.0, 0).in_body(0))
            .unwrap();
        pd.push(Particle::new(Vec3::new(0.0, 2.0, 1.0), 1.0, 0).in_body(0))
            .unwrap();
        SystemState::new(pd, SimBox::cube(10.0).unwrap()).unwrap()
    }

    #[test]
    fn test_rescale_hits_set_point() {
        let mut state = gas();
        state.thermalize(3.0, 5);
        let updater = TempRescale::new(1.2, 10).unwrap();
        assert!(!updater.update(5, &mut state));
        assert!(updater.update(20, &mut state));
        assert_relative_eq!(state.thermo(0.0).temperature(), 1.2, max_relative = 1e-12);
    }

    #[test]
    fn test_zero_temperature_skipped() {
        let mut state = gas();
        let updater = TempRescale::new(1.0, 1).unwrap();
        assert!(!updater.update(1, &mut state));
        assert_eq!(state.thermo(0.0).kinetic_energy(), 0.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TempRescale::new(1.0, 0).is_err());
        assert!(TempRescale::new(-1.0, 5).is_err());
    }
}
