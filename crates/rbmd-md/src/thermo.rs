//! Kinetic energy, degrees of freedom and temperature (k_B = 1).

use crate::{ParticleData, RigidBody};

/// Instantaneous thermodynamic quantities of the system.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ThermoQuantities {
    pub potential_energy: f64,
    /// Free particles plus body centers of mass.
    pub translational_kinetic_energy: f64,
    pub rotational_kinetic_energy: f64,
    pub dof: usize,
}

impl ThermoQuantities {
    pub fn kinetic_energy(&self) -> f64 {
        self.translational_kinetic_energy + self.rotational_kinetic_energy
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy() + self.potential_energy
    }

    /// T = 2 KE / dof.
    pub fn temperature(&self) -> f64 {
        if self.dof == 0 {
            0.0
        } else {
            2.0 * self.kinetic_energy() / self.dof as f64
        }
    }
}

/// Free particles carry 3 degrees of freedom; bodies 3 plus one per
/// non-zero principal moment.
pub fn degrees_of_freedom(particles: &ParticleData, bodies: &[RigidBody]) -> usize {
    3 * particles.n_free() + bodies.iter().map(|b| 3 + b.rotational_dof()).sum::<usize>()
}

pub fn compute_thermo(particles: &ParticleData, bodies: &[RigidBody], potential_energy: f64) -> ThermoQuantities {
    let body_trans: f64 = bodies.iter().map(RigidBody::translational_kinetic_energy).sum();
    let body_rot: f64 = bodies.iter().map(RigidBody::rotational_kinetic_energy).sum();
    ThermoQuantities {
        potential_energy,
        translational_kinetic_energy: particles.free_kinetic_energy() + body_trans,
        rotational_kinetic_energy: body_rot,
        dof: degrees_of_freedom(particles, bodies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Particle, SimBox, build_bodies};
    use approx::assert_relative_eq;
    use rbmd_math::Vec3;

    #[test]
    fn test_free_particle_temperature() {
        let mut pd = ParticleData::new(["A"]);
        pd.push(Particle::new(Vec3::zeros(), 1.0, 0).with_velocity(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        pd.push(Particle::new(Vec3::x(), 1.0, 0).with_velocity(Vec3::new(0.0, -1.0, 0.0)))
            .unwrap();
        let t = compute_thermo(&pd, &[], -3.0);
        assert_eq!(t.dof, 6);
        assert_relative_eq!(t.kinetic_energy(), 1.0);
        assert_relative_eq!(t.temperature(), 1.0 / 3.0);
        assert_relative_eq!(t.total_energy(), -2.0);
    }

    #[test]
    fn test_body_dof_and_energy() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = ParticleData::new(["A"]);
        pd.push(
            Particle::new(-Vec3::x(), 1.0, 0)
                .with_velocity(Vec3::new(1.0, -2.0, 0.0))
                .in_body(0),
        )
        .unwrap();
        pd.push(
            Particle::new(Vec3::x(), 1.0, 0)
                .with_velocity(Vec3::new(1.0, 2.0, 0.0))
                .in_body(0),
        )
        .unwrap();
        pd.push(Particle::new(5.0 * Vec3::y(), 1.0, 0)).unwrap();
        let bodies = build_bodies(&mut pd, &sim_box).unwrap();

        let t = compute_thermo(&pd, &bodies, 0.0);
        // 3 (free) + 3 + 2 (linear body)
        assert_eq!(t.dof, 8);
        // COM: 0.5 * 2 * 1² ; rotation: 0.5 * L ω = 0.5 * 4 * 2
        assert_relative_eq!(t.translational_kinetic_energy, 1.0, epsilon = 1e-12);
        assert_relative_eq!(t.rotational_kinetic_energy, 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_empty_system() {
        let t = compute_thermo(&ParticleData::new(["A"]), &[], 0.0);
        assert_eq!(t.temperature(), 0.0);
    }
}
