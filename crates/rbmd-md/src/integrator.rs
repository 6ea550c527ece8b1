//! Velocity Verlet for free particles and rigid bodies.
//!
//! Each step is split around the force evaluation:
//!
//! 1. [`VelocityVerlet::step_one`]: half kick with the old forces, drift,
//!    rotate orientations, place body members.
//! 2. forces are recomputed and aggregated onto bodies;
//! 3. [`VelocityVerlet::step_two`]: second half kick, member velocities.
//!
//! Between the two kicks orientations follow the torque-free rotor
//! ([`crate::RigidBody::free_rotate`]) and are renormalised every step.

use crate::{Membership, MdError, Result, SystemState};
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocityVerlet {
    /// Timestep.
    pub dt: f64,
}

impl VelocityVerlet {
    pub fn new(dt: f64) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(MdError::config(format!("timestep must be positive, got {dt}")));
        }
        Ok(Self { dt })
    }

    /// First half of the step. `scale` multiplies all momenta beforehand
    /// (1.0 without a Nosé–Hoover thermostat).
    pub fn step_one(&self, state: &mut SystemState, scale: f64) {
        if scale != 1.0 {
            state.scale_momenta(scale);
        }

        let dt = self.dt;
        let half = 0.5 * dt;
        let sim_box = state.sim_box;
        let p = &mut state.particles;

        p.pos
            .par_iter_mut()
            .zip(p.vel.par_iter_mut())
            .zip(p.force.par_iter())
            .zip(p.mass.par_iter())
            .zip(p.membership.par_iter())
            .filter(|(_, m)| **m == Membership::Free)
            .for_each(|((((x, v), f), m), _)| {
                *v += half / m * f;
                *x = sim_box.wrap(*x + dt * *v);
            });

        state.bodies.par_iter_mut().for_each(|b| {
            b.com_vel += half / b.mass * b.force;
            b.angmom += half * b.torque;
            b.com = sim_box.wrap(b.com + dt * b.com_vel);
            b.free_rotate(dt);
        });

        state.sync_members();
    }

    /// Second half kick using the freshly aggregated forces.
    pub fn step_two(&self, state: &mut SystemState) {
        let half = 0.5 * self.dt;
        let p = &mut state.particles;

        p.vel
            .par_iter_mut()
            .zip(p.force.par_iter())
            .zip(p.mass.par_iter())
            .zip(p.membership.par_iter())
            .filter(|(_, m)| **m == Membership::Free)
            .for_each(|(((v, f), m), _)| {
                *v += half / m * f;
            });

        state.bodies.par_iter_mut().for_each(|b| {
            b.com_vel += half / b.mass * b.force;
            b.angmom += half * b.torque;
            b.sync_angvel();
        });

        state.sync_member_velocities();
    }
}
