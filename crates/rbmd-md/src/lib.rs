//! Rigid-body molecular dynamics.
//!
//! Velocity Verlet integration of free particles and rigid bodies with:
//! - Lennard-Jones pair potential with per-type-pair coefficients
//! - cell-list neighbor lists with skin and exclusion rules
//! - quaternion orientations for rigid bodies
//! - Brownian and Nosé–Hoover thermostats
//! - DCD trajectory and tab-separated scalar log output
//!
//! Everything lives in an explicit [`Simulation`] context.
//!
//! # Example
//!
//! ```
//! use rbmd_md::{
//!     EnergyShift, ExclusionRule, LennardJones, LjCoeff, Particle, ParticleData, SimBox,
//!     Simulation, Thermostat,
//! };
//! use rbmd_math::Vec3;
//! use std::sync::Arc;
//!
//! let mut particles = ParticleData::new(["A"]);
//! for i in 0..4 {
//!     let x = Vec3::new(1.5 * i as f64 - 2.0, 0.0, 0.0);
//!     particles.push(Particle::new(x, 1.0, 0)).unwrap();
//! }
//! let mut sim = Simulation::new(particles, SimBox::cube(8.0).unwrap()).unwrap();
//!
//! let lj = LennardJones::new(2f64.powf(1.0 / 6.0))
//!     .with_mode(EnergyShift::Shift)
//!     .with_coeff(0, 0, LjCoeff::new(1.0, 1.0));
//! sim.set_pair_potential(Arc::new(lj)).unwrap();
//! sim.reset_exclusions(&[ExclusionRule::Body]);
//! sim.set_timestep(0.005).unwrap();
//! sim.set_thermostat(Thermostat::brownian(1.2, 1.0, 42)).unwrap();
//!
//! let summary = sim.run(100).unwrap();
//! assert_eq!(summary.steps_completed, 100);
//! ```

pub mod body;
pub mod dcd;
pub mod error;
pub mod force;
pub mod integrator;
pub mod neighbor;
pub mod output;
pub mod pair;
pub mod particle;
pub mod scalar_log;
pub mod sim_box;
pub mod simulation;
pub mod state;
pub mod thermo;
pub mod thermostat;
pub mod updater;

pub use body::{RigidBody, build_bodies};
pub use dcd::{DcdFrame, DcdHeader, DcdReader, DcdWriter};
pub use error::{MdError, Result};
pub use force::compute_pair_forces;
pub use integrator::VelocityVerlet;
pub use neighbor::{ExclusionRule, Exclusions, NeighborList};
pub use output::{Frame, LogQuantity, OutputErrorPolicy, OutputMode, OutputWriter};
pub use pair::{EnergyShift, LennardJones, LjCoeff, PairCoeffTable, PairPotential};
pub use particle::{Membership, Particle, ParticleData, TypeId};
pub use scalar_log::LogWriter;
pub use sim_box::SimBox;
pub use simulation::{CancelToken, Phase, RunSummary, Simulation};
pub use state::SystemState;
pub use thermo::{ThermoQuantities, compute_thermo};
pub use thermostat::{Brownian, NoseHoover, Thermostat, ThermostatHandoff};
pub use updater::TempRescale;
