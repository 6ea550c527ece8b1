//! Per-particle state store.
//!
//! Particles are stored as a structure of arrays. Indices are stable for the
//! lifetime of a simulation: the store never reorders particles.

use crate::{MdError, Result};
use rbmd_math::Vec3;

/// Index into the particle-type registry.
pub type TypeId = usize;

/// Rigid-body membership of a particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Membership {
    /// Integrated as an independent point mass.
    #[default]
    Free,
    /// Constituent of the rigid body with the given id.
    Body(usize),
}

impl Membership {
    pub fn body(&self) -> Option<usize> {
        match self {
            Membership::Free => None,
            Membership::Body(b) => Some(*b),
        }
    }
}

/// One particle's initial data, used to populate a [`ParticleData`].
#[derive(Clone, Debug)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f64,
    pub type_id: TypeId,
    pub membership: Membership,
}

impl Particle {
    /// Create a free particle at rest.
    pub fn new(position: Vec3, mass: f64, type_id: TypeId) -> Self {
        Self {
            position,
            velocity: Vec3::zeros(),
            mass,
            type_id,
            membership: Membership::Free,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Attach this particle to rigid body `body`.
    pub fn in_body(mut self, body: usize) -> Self {
        self.membership = Membership::Body(body);
        self
    }
}

/// All per-particle arrays.
#[derive(Clone, Debug, Default)]
pub struct ParticleData {
    /// Particle type names; a [`TypeId`] indexes this list.
    pub type_names: Vec<String>,
    /// Positions, wrapped into the box.
    pub pos: Vec<Vec3>,
    pub vel: Vec<Vec3>,
    /// Force accumulator, rebuilt every step.
    pub force: Vec<Vec3>,
    /// Per-particle share of the pair potential energy.
    pub energy: Vec<f64>,
    pub mass: Vec<f64>,
    pub type_id: Vec<TypeId>,
    pub membership: Vec<Membership>,
}

impl ParticleData {
    /// Create an empty store with the given type names.
    pub fn new<S: Into<String>>(type_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            type_names: type_names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Append a particle, returning its index.
    pub fn push(&mut self, p: Particle) -> Result<usize> {
        if p.type_id >= self.type_names.len() {
            return Err(MdError::config(format!(
                "particle type id {} out of range ({} types registered)",
                p.type_id,
                self.type_names.len()
            )));
        }
        if !(p.mass.is_finite() && p.mass > 0.0) {
            return Err(MdError::config(format!(
                "particle mass must be positive, got {}",
                p.mass
            )));
        }
        if !rbmd_math::is_finite(&p.position) || !rbmd_math::is_finite(&p.velocity) {
            return Err(MdError::config("particle position/velocity must be finite"));
        }
        self.pos.push(p.position);
        self.vel.push(p.velocity);
        self.force.push(Vec3::zeros());
        self.energy.push(0.0);
        self.mass.push(p.mass);
        self.type_id.push(p.type_id);
        self.membership.push(p.membership);
        Ok(self.pos.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    pub fn n_types(&self) -> usize {
        self.type_names.len()
    }

    /// Resolve a type name.
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.type_names.iter().position(|n| n == name)
    }

    /// Type id for `name`, registering it if unknown.
    pub fn register_type(&mut self, name: &str) -> TypeId {
        match self.type_id(name) {
            Some(id) => id,
            None => {
                self.type_names.push(name.to_string());
                self.type_names.len() - 1
            }
        }
    }

    /// Whether particles `i` and `j` are constituents of the same rigid body.
    pub fn same_body(&self, i: usize, j: usize) -> bool {
        match (self.membership[i], self.membership[j]) {
            (Membership::Body(a), Membership::Body(b)) => a == b,
            _ => false,
        }
    }

    /// Reset force and energy accumulators.
    pub fn reset_forces(&mut self) {
        self.force.iter_mut().for_each(|f| *f = Vec3::zeros());
        self.energy.iter_mut().for_each(|e| *e = 0.0);
    }

    /// Kinetic energy of the free (non-body) particles.
    pub fn free_kinetic_energy(&self) -> f64 {
        self.vel
            .iter()
            .zip(&self.mass)
            .zip(&self.membership)
            .filter(|(_, m)| **m == Membership::Free)
            .map(|((v, m), _)| 0.5 * m * v.norm_squared())
            .sum()
    }

    pub fn n_free(&self) -> usize {
        self.membership
            .iter()
            .filter(|m| **m == Membership::Free)
            .count()
    }
}
