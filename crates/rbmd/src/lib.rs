//! rbmd: rigid-body molecular dynamics.
//!
//! Umbrella crate re-exporting the engine, math primitives and file formats.
//! The `rbmd` binary runs JSON run scripts (see [`rbmd_format::RunScript`]).

pub use rbmd_format::{self, Configuration, FormatError, RunScript};
pub use rbmd_math::{self, Quat, Vec3};
pub use rbmd_md::{
    self, CancelToken, DcdReader, DcdWriter, EnergyShift, ExclusionRule, LennardJones, LjCoeff,
    LogQuantity, LogWriter, MdError, OutputMode, Particle, ParticleData, Phase, RunSummary,
    SimBox, Simulation, TempRescale, Thermostat, ThermostatHandoff,
};
