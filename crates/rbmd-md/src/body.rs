//! Rigid bodies built from constituent particles.
//!
//! Each body stores its center-of-mass state, orientation and the body-frame
//! offsets of its members. Member positions and velocities in
//! [`ParticleData`] are slaved to the body after every update.

use crate::{Membership, MdError, ParticleData, Result, SimBox};
use nalgebra::SymmetricEigen;
use rbmd_math::{Mat3, Quat, Vec3, skew};

/// Relative threshold below which a principal moment counts as zero.
const MOMENT_EPS: f64 = 1e-10;

/// A set of particles moving as one rotating and translating unit.
#[derive(Clone, Debug)]
pub struct RigidBody {
    /// Member particle indices, in ascending order.
    pub members: Vec<usize>,
    /// Member offsets from the center of mass, in the body frame.
    pub offsets: Vec<Vec3>,
    pub mass: f64,
    /// Center-of-mass position, wrapped into the box.
    pub com: Vec3,
    pub com_vel: Vec3,
    /// Body-to-space rotation.
    pub orientation: Quat,
    /// Principal moments of inertia (body frame). Zero for degenerate axes.
    pub moments: Vec3,
    /// Angular momentum in the space frame.
    pub angmom: Vec3,
    /// Angular velocity in the space frame, derived from `angmom`.
    pub angvel: Vec3,
    /// Net force on the body from the last force evaluation.
    pub force: Vec3,
    /// Net torque about the center of mass from the last force evaluation.
    pub torque: Vec3,
}

impl RigidBody {
    /// Space-frame angular velocity for the current orientation and momentum.
    pub fn angular_velocity(&self) -> Vec3 {
        let l_body = self.orientation.inverse_rotate(&self.angmom);
        let mut w_body = Vec3::zeros();
        for d in 0..3 {
            if self.moments[d] > 0.0 {
                w_body[d] = l_body[d] / self.moments[d];
            }
        }
        self.orientation.rotate(&w_body)
    }

    /// Recompute `angvel` after `angmom` or `orientation` changed.
    pub fn sync_angvel(&mut self) {
        self.angvel = self.angular_velocity();
    }

    /// Number of rotational degrees of freedom (non-zero principal moments).
    pub fn rotational_dof(&self) -> usize {
        self.moments.iter().filter(|m| **m > 0.0).count()
    }

    pub fn translational_kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.com_vel.norm_squared()
    }

    pub fn rotational_kinetic_energy(&self) -> f64 {
        0.5 * self.angmom.dot(&self.angvel)
    }

    /// Torque-free rotation over `dt` at fixed space-frame angular momentum.
    ///
    /// The free rotor is split into exact rotations about the principal axes
    /// in the symmetric order 3, 2, 1, 2, 3 (half steps on axes 3 and 2), so
    /// the kinetic energy of an asymmetric top stays bounded.
    pub fn free_rotate(&mut self, dt: f64) {
        let half = 0.5 * dt;
        for (axis, h) in [(2, half), (1, half), (0, dt), (1, half), (2, half)] {
            self.rotate_about_principal_axis(axis, h);
        }
        self.orientation = self.orientation.normalize();
        self.sync_angvel();
    }

    /// Exact flow of `l_k² / 2 I_k`: spin about body axis `k` at rate `l_k / I_k`.
    fn rotate_about_principal_axis(&mut self, axis: usize, dt: f64) {
        let moment = self.moments[axis];
        if moment <= 0.0 {
            return;
        }
        let l = self.orientation.inverse_rotate(&self.angmom)[axis];
        let mut e = Vec3::zeros();
        e[axis] = 1.0;
        let spin = Quat::from_axis_angle(&e, l / moment * dt);
        self.orientation = self.orientation.mul(&spin);
    }

    /// Space-frame offset of member `k` from the center of mass.
    pub fn member_offset(&self, k: usize) -> Vec3 {
        self.orientation.rotate(&self.offsets[k])
    }

    /// Sum member forces into the body force and torque.
    pub fn aggregate(&mut self, forces: &[Vec3]) {
        let mut f = Vec3::zeros();
        let mut t = Vec3::zeros();
        for (k, &i) in self.members.iter().enumerate() {
            let r = self.member_offset(k);
            f += forces[i];
            t += r.cross(&forces[i]);
        }
        self.force = f;
        self.torque = t;
    }

    pub fn is_finite(&self) -> bool {
        rbmd_math::is_finite(&self.com)
            && rbmd_math::is_finite(&self.com_vel)
            && rbmd_math::is_finite(&self.angmom)
            && self.orientation.is_finite()
    }
}

/// Build rigid bodies from the membership recorded in `particles`.
///
/// Body ids must be contiguous from zero. Member velocities are projected onto
/// rigid motion, and member positions are snapped to the rigid geometry.
pub fn build_bodies(particles: &mut ParticleData, sim_box: &SimBox) -> Result<Vec<RigidBody>> {
    let n_bodies = particles
        .membership
        .iter()
        .filter_map(Membership::body)
        .max()
        .map_or(0, |b| b + 1);

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_bodies];
    for (i, m) in particles.membership.iter().enumerate() {
        if let Membership::Body(b) = m {
            groups[*b].push(i);
        }
    }

    let mut bodies = Vec::with_capacity(n_bodies);
    for (b, members) in groups.into_iter().enumerate() {
        if members.is_empty() {
            return Err(MdError::config(format!(
                "rigid body ids must be contiguous: body {b} has no members"
            )));
        }
        bodies.push(body_from_members(particles, sim_box, members));
    }

    for body in &bodies {
        place_members(body, particles, sim_box);
    }

    Ok(bodies)
}

fn body_from_members(particles: &ParticleData, sim_box: &SimBox, members: Vec<usize>) -> RigidBody {
    let anchor = particles.pos[members[0]];

    // Unwrap members relative to the first one so bodies may straddle the box edge
    let unwrapped: Vec<Vec3> = members
        .iter()
        .map(|&i| anchor + sim_box.minimum_image(particles.pos[i] - anchor))
        .collect();

    let mass: f64 = members.iter().map(|&i| particles.mass[i]).sum();
    let mut com = Vec3::zeros();
    let mut momentum = Vec3::zeros();
    for (k, &i) in members.iter().enumerate() {
        com += particles.mass[i] * unwrapped[k];
        momentum += particles.mass[i] * particles.vel[i];
    }
    com /= mass;
    let com_vel = momentum / mass;

    // Point-mass inertia tensor: I = -Σ m [r]×[r]×
    let mut inertia = Mat3::zeros();
    let mut angmom = Vec3::zeros();
    for (k, &i) in members.iter().enumerate() {
        let r = unwrapped[k] - com;
        let s = skew(&r);
        inertia -= particles.mass[i] * s * s;
        angmom += particles.mass[i] * r.cross(&(particles.vel[i] - com_vel));
    }

    let (rotation, mut moments) = principal_axes(inertia);
    let max_moment = moments.max();
    for d in 0..3 {
        if moments[d] <= MOMENT_EPS * max_moment.max(f64::MIN_POSITIVE) {
            moments[d] = 0.0;
        }
    }
    let orientation = Quat::from_matrix(&rotation);

    let offsets = unwrapped
        .iter()
        .map(|r| orientation.inverse_rotate(&(r - com)))
        .collect();

    let mut body = RigidBody {
        members,
        offsets,
        mass,
        com: sim_box.wrap(com),
        com_vel,
        orientation,
        moments,
        angmom,
        angvel: Vec3::zeros(),
        force: Vec3::zeros(),
        torque: Vec3::zeros(),
    };
    body.sync_angvel();
    body
}

/// Principal axes as the columns of a proper rotation, with matching moments.
fn principal_axes(inertia: Mat3) -> (Mat3, Vec3) {
    let eigen = SymmetricEigen::new(inertia);
    let mut axes = eigen.eigenvectors;
    let moments = eigen.eigenvalues;
    if axes.determinant() < 0.0 {
        let flipped: Vec3 = -axes.column(2).into_owned();
        axes.set_column(2, &flipped);
    }
    (axes, moments.map(|m| m.max(0.0)))
}

/// Slave member positions and velocities to the body state.
pub fn place_members(body: &RigidBody, particles: &mut ParticleData, sim_box: &SimBox) {
    for (k, &i) in body.members.iter().enumerate() {
        let r = body.member_offset(k);
        particles.pos[i] = sim_box.wrap(body.com + r);
        particles.vel[i] = body.com_vel + body.angvel.cross(&r);
    }
}

/// Refresh member velocities only (positions unchanged).
pub fn update_member_velocities(body: &RigidBody, particles: &mut ParticleData) {
    for (k, &i) in body.members.iter().enumerate() {
        let r = body.member_offset(k);
        particles.vel[i] = body.com_vel + body.angvel.cross(&r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Particle;
    use approx::assert_relative_eq;

    fn dumbbell(center: Vec3) -> ParticleData {
        let mut pd = ParticleData::new(["A"]);
        pd.push(Particle::new(center - Vec3::x(), 1.0, 0).in_body(0))
            .unwrap();
        pd.push(Particle::new(center + Vec3::x(), 1.0, 0).in_body(0))
            .unwrap();
        pd
    }

    fn cube_particles(center: Vec3, half: f64) -> ParticleData {
        let mut pd = ParticleData::new(["A"]);
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    let x = center + half * Vec3::new(sx, sy, sz);
                    pd.push(Particle::new(x, 1.0, 0).in_body(0)).unwrap();
                }
            }
        }
        pd
    }

    #[test]
    fn test_cube_body() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = cube_particles(Vec3::new(1.0, 2.0, 3.0), 0.5);
        let bodies = build_bodies(&mut pd, &sim_box).unwrap();
        assert_eq!(bodies.len(), 1);
        let b = &bodies[0];
        assert_relative_eq!(b.mass, 8.0);
        assert_relative_eq!(b.com, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        // I = Σ m (r² - r_d²) = 8 * (0.75 - 0.25) = 4 on every axis
        for d in 0..3 {
            assert_relative_eq!(b.moments[d], 4.0, epsilon = 1e-10);
        }
        assert_eq!(b.rotational_dof(), 3);
        assert!((b.orientation.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_body_has_two_rotational_dof() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = dumbbell(Vec3::zeros());
        let bodies = build_bodies(&mut pd, &sim_box).unwrap();
        assert_eq!(bodies[0].rotational_dof(), 2);
    }

    #[test]
    fn test_body_across_periodic_boundary() {
        let sim_box = SimBox::cube(10.0).unwrap();
        let mut pd = ParticleData::new(["A"]);
        pd.push(Particle::new(Vec3::new(4.8, 0.0, 0.0), 1.0, 0).in_body(0))
            .unwrap();
        pd.push(Particle::new(Vec3::new(-4.8, 0.0, 0.0), 1.0, 0).in_body(0))
            .unwrap();
        let bodies = build_bodies(&mut pd, &sim_box).unwrap();
        // Members are 0.4 apart through the boundary, COM sits on the edge
        assert_relative_eq!(bodies[0].com.x.abs(), 5.0, epsilon = 1e-12);
        let sep = sim_box.minimum_image(pd.pos[1] - pd.pos[0]);
        assert_relative_eq!(sep.norm(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_initial_rotation_is_captured() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = dumbbell(Vec3::zeros());
        // Spin about z: v = ω × r with ω = 2 ẑ
        pd.vel[0] = Vec3::new(0.0, -2.0, 0.0);
        pd.vel[1] = Vec3::new(0.0, 2.0, 0.0);
        let bodies = build_bodies(&mut pd, &sim_box).unwrap();
        let b = &bodies[0];
        assert_relative_eq!(b.com_vel, Vec3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(b.angmom, Vec3::new(0.0, 0.0, 4.0), epsilon = 1e-12);
        assert_relative_eq!(b.angvel, Vec3::new(0.0, 0.0, 2.0), epsilon = 1e-10);
        assert_relative_eq!(pd.vel[1], Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-10);
    }

    #[test]
    fn test_aggregate_force_and_torque() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = dumbbell(Vec3::zeros());
        let mut bodies = build_bodies(&mut pd, &sim_box).unwrap();
        let forces = vec![Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        bodies[0].aggregate(&forces);
        assert_relative_eq!(bodies[0].force, Vec3::zeros(), epsilon = 1e-12);
        // τ = (-x) × (-y) + x × y = 2 ẑ
        assert_relative_eq!(bodies[0].torque, Vec3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_free_rotate_about_principal_axis() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = ParticleData::new(["A"]);
        for axis in [Vec3::x(), 0.5 * Vec3::y(), 0.25 * Vec3::z()] {
            pd.push(Particle::new(axis, 1.0, 0).in_body(0)).unwrap();
            pd.push(Particle::new(-axis, 1.0, 0).in_body(0)).unwrap();
        }
        let mut bodies = build_bodies(&mut pd, &sim_box).unwrap();
        let b = &mut bodies[0];
        // I_z = 2.5, so ω = 1 about z
        b.angmom = Vec3::new(0.0, 0.0, 2.5);
        b.sync_angvel();
        assert_relative_eq!(b.angvel, Vec3::z(), epsilon = 1e-10);

        let before: Vec<Vec3> = (0..6).map(|k| b.member_offset(k)).collect();
        b.free_rotate(0.5);
        let turn = Quat::from_axis_angle(&Vec3::z(), 0.5);
        for (k, r) in before.iter().enumerate() {
            assert_relative_eq!(b.member_offset(k), turn.rotate(r), epsilon = 1e-10);
        }
        assert_relative_eq!(b.angvel, Vec3::z(), epsilon = 1e-10);
    }

    #[test]
    fn test_missing_body_id_rejected() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = ParticleData::new(["A"]);
        pd.push(Particle::new(Vec3::zeros(), 1.0, 0).in_body(1))
            .unwrap();
        assert!(build_bodies(&mut pd, &sim_box).is_err());
    }
}
