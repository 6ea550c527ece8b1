//! Complete dynamical state: particles, rigid bodies and the box.

use crate::body::{build_bodies, place_members, update_member_velocities};
use crate::thermo::{ThermoQuantities, compute_thermo};
use crate::{Membership, ParticleData, Result, RigidBody, SimBox};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use rbmd_math::Vec3;

/// Particle store together with the bodies slaved to it.
#[derive(Clone, Debug)]
pub struct SystemState {
    pub particles: ParticleData,
    pub bodies: Vec<RigidBody>,
    pub sim_box: SimBox,
}

impl SystemState {
    /// Wrap positions into the box and build rigid bodies from membership.
    pub fn new(mut particles: ParticleData, sim_box: SimBox) -> Result<Self> {
        for x in particles.pos.iter_mut() {
            *x = sim_box.wrap(*x);
        }
        let bodies = build_bodies(&mut particles, &sim_box)?;
        Ok(Self {
            particles,
            bodies,
            sim_box,
        })
    }

    pub fn thermo(&self, potential_energy: f64) -> ThermoQuantities {
        compute_thermo(&self.particles, &self.bodies, potential_energy)
    }

    /// Sum member forces into body force and torque.
    pub fn aggregate_body_forces(&mut self) {
        let forces = &self.particles.force;
        self.bodies.par_iter_mut().for_each(|b| b.aggregate(forces));
    }

    /// Multiply all translational and angular momenta by `s`.
    pub fn scale_momenta(&mut self, s: f64) {
        for (v, m) in self.particles.vel.iter_mut().zip(&self.particles.membership) {
            if *m == Membership::Free {
                *v *= s;
            }
        }
        for b in self.bodies.iter_mut() {
            b.com_vel *= s;
            b.angmom *= s;
            b.sync_angvel();
        }
        self.sync_member_velocities();
    }

    /// Slave member positions and velocities to their bodies.
    pub fn sync_members(&mut self) {
        for b in &self.bodies {
            place_members(b, &mut self.particles, &self.sim_box);
        }
    }

    pub fn sync_member_velocities(&mut self) {
        for b in &self.bodies {
            update_member_velocities(b, &mut self.particles);
        }
    }

    /// Describe the first non-finite quantity, if any.
    pub fn find_non_finite(&self) -> Option<String> {
        let p = &self.particles;
        for i in 0..p.len() {
            if !rbmd_math::is_finite(&p.pos[i]) {
                return Some(format!("particle {i} position is not finite"));
            }
            if !rbmd_math::is_finite(&p.vel[i]) {
                return Some(format!("particle {i} velocity is not finite"));
            }
            if !rbmd_math::is_finite(&p.force[i]) {
                return Some(format!("particle {i} force is not finite"));
            }
        }
        self.bodies
            .iter()
            .position(|b| !b.is_finite())
            .map(|b| format!("rigid body {b} state is not finite"))
    }

    /// Draw Maxwell–Boltzmann velocities at `temperature` for free particles
    /// and bodies (including angular momenta), then remove net momentum.
    pub fn thermalize(&mut self, temperature: f64, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut gaussian = || -> Vec3 {
            Vec3::new(
                StandardNormal.sample(&mut rng),
                StandardNormal.sample(&mut rng),
                StandardNormal.sample(&mut rng),
            )
        };

        for i in 0..self.particles.len() {
            if self.particles.membership[i] == Membership::Free {
                let sigma = (temperature / self.particles.mass[i]).sqrt();
                self.particles.vel[i] = sigma * gaussian();
            }
        }
        for b in self.bodies.iter_mut() {
            b.com_vel = (temperature / b.mass).sqrt() * gaussian();
            let g = gaussian();
            let l_body = Vec3::from_fn(|d, _| (temperature * b.moments[d]).sqrt() * g[d]);
            b.angmom = b.orientation.rotate(&l_body);
            b.sync_angvel();
        }
        self.remove_net_momentum();
    }

    /// Subtract the center-of-mass velocity of the whole system.
    pub fn remove_net_momentum(&mut self) {
        let mut momentum = Vec3::zeros();
        let mut mass = 0.0;
        for i in 0..self.particles.len() {
            if self.particles.membership[i] == Membership::Free {
                momentum += self.particles.mass[i] * self.particles.vel[i];
                mass += self.particles.mass[i];
            }
        }
        for b in &self.bodies {
            momentum += b.mass * b.com_vel;
            mass += b.mass;
        }
        if mass == 0.0 {
            return;
        }
        let v_com = momentum / mass;
        for i in 0..self.particles.len() {
            if self.particles.membership[i] == Membership::Free {
                self.particles.vel[i] -= v_com;
            }
        }
        for b in self.bodies.iter_mut() {
            b.com_vel -= v_com;
        }
        self.sync_member_velocities();
    }

    /// Total linear momentum of free particles and bodies.
    pub fn net_momentum(&self) -> Vec3 {
        let free: Vec3 = (0..self.particles.len())
            .filter(|&i| self.particles.membership[i] == Membership::Free)
            .map(|i| self.particles.mass[i] * self.particles.vel[i])
            .sum();
        self.bodies
            .iter()
            .fold(free, |acc, b| acc + b.mass * b.com_vel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Particle;
    use approx::assert_relative_eq;

    fn mixed_system() -> SystemState {
        let mut pd = ParticleData::new(["A"]);
        for k in 0..4 {
            let c = Vec3::new(-6.0 + 3.0 * k as f64, 0.0, 0.0);
            for d in [Vec3::x(), Vec3::y(), Vec3::z(), -Vec3::x()] {
                pd.push(Particle::new(c + 0.5 * d, 1.0, 0).in_body(k)).unwrap();
            }
        }
        for k in 0..50 {
            pd.push(Particle::new(Vec3::new(0.0, 4.0, -6.0 + 0.2 * k as f64), 1.0, 0))
                .unwrap();
        }
        SystemState::new(pd, SimBox::cube(16.0).unwrap()).unwrap()
    }

    #[test]
    fn test_thermalize_removes_momentum() {
        let mut state = mixed_system();
        state.thermalize(1.5, 3);
        assert!(state.net_momentum().norm() < 1e-10);
        let t = state.thermo(0.0);
        assert!(t.kinetic_energy() > 0.0);
        // Member velocities follow the bodies
        let b = &state.bodies[0];
        let r = b.member_offset(0);
        assert_relative_eq!(
            state.particles.vel[b.members[0]],
            b.com_vel + b.angvel.cross(&r),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_thermalize_reproducible() {
        let mut a = mixed_system();
        let mut b = mixed_system();
        a.thermalize(1.0, 9);
        b.thermalize(1.0, 9);
        assert_eq!(a.particles.vel, b.particles.vel);
    }

    #[test]
    fn test_scale_momenta_scales_energy() {
        let mut state = mixed_system();
        state.thermalize(1.0, 1);
        let before = state.thermo(0.0).kinetic_energy();
        state.scale_momenta(0.5);
        let after = state.thermo(0.0).kinetic_energy();
        assert_relative_eq!(after, 0.25 * before, max_relative = 1e-12);
    }

    #[test]
    fn test_find_non_finite() {
        let mut state = mixed_system();
        assert!(state.find_non_finite().is_none());
        state.particles.vel[60] = Vec3::new(f64::NAN, 0.0, 0.0);
        let msg = state.find_non_finite().unwrap();
        assert!(msg.contains("particle 60"));
    }
}
