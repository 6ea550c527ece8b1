//! JSON formats for rbmd.
//!
//! - [`Configuration`]: box, particle types and per-particle state, with
//!   optional rigid-body membership.
//! - [`RunScript`]: a declarative run: potential, exclusions, timestep,
//!   outputs and an ordered list of thermostatted phases.

pub mod config;
pub mod error;
pub mod script;

pub use config::{Configuration, ParticleSpec};
pub use error::{FormatError, Result};
pub use script::{
    ExclusionSpec, LjSpec, ModeSpec, OutputSpec, PairCoeffSpec, PhaseSpec, PotentialSpec,
    RunScript, ShiftSpec, ThermalizeSpec, ThermostatSpec, UpdaterSpec,
};
