//! Periodic output: the writer trait, frames and log quantities.

use crate::{MdError, ParticleData, Result, SimBox, ThermoQuantities};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::str::FromStr;

/// How an output file is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Truncate any existing file.
    #[default]
    Overwrite,
    /// Continue an existing file, creating it if missing.
    Append,
    /// Fail if the file already exists.
    CreateNew,
}

/// What the run driver does when a writer fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputErrorPolicy {
    /// Log the error, record it in the run summary and keep integrating.
    #[default]
    Continue,
    /// Abort the run with the error.
    Halt,
}

/// Snapshot handed to writers.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub step: u64,
    pub time: f64,
    pub particles: &'a ParticleData,
    pub sim_box: &'a SimBox,
    pub thermo: ThermoQuantities,
    /// Nosé–Hoover friction coefficient when that thermostat is active.
    pub thermostat_xi: Option<f64>,
}

/// Periodically invoked output stream.
pub trait OutputWriter: Send {
    /// Destination, for diagnostics.
    fn path(&self) -> &Path;

    /// Write every `period` steps.
    fn period(&self) -> u64;

    fn write(&mut self, frame: &Frame<'_>) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// Named scalar quantity available to [`crate::LogWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogQuantity {
    PotentialEnergy,
    KineticEnergy,
    TranslationalKineticEnergy,
    RotationalKineticEnergy,
    Temperature,
    ThermostatXi,
    NumParticles,
    Time,
}

impl LogQuantity {
    pub const ALL: [LogQuantity; 8] = [
        LogQuantity::PotentialEnergy,
        LogQuantity::KineticEnergy,
        LogQuantity::TranslationalKineticEnergy,
        LogQuantity::RotationalKineticEnergy,
        LogQuantity::Temperature,
        LogQuantity::ThermostatXi,
        LogQuantity::NumParticles,
        LogQuantity::Time,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogQuantity::PotentialEnergy => "potential_energy",
            LogQuantity::KineticEnergy => "kinetic_energy",
            LogQuantity::TranslationalKineticEnergy => "translational_kinetic_energy",
            LogQuantity::RotationalKineticEnergy => "rotational_kinetic_energy",
            LogQuantity::Temperature => "temperature",
            LogQuantity::ThermostatXi => "thermostat_xi",
            LogQuantity::NumParticles => "num_particles",
            LogQuantity::Time => "time",
        }
    }

    pub fn value(&self, frame: &Frame<'_>) -> f64 {
        let t = &frame.thermo;
        match self {
            LogQuantity::PotentialEnergy => t.potential_energy,
            LogQuantity::KineticEnergy => t.kinetic_energy(),
            LogQuantity::TranslationalKineticEnergy => t.translational_kinetic_energy,
            LogQuantity::RotationalKineticEnergy => t.rotational_kinetic_energy,
            LogQuantity::Temperature => t.temperature(),
            LogQuantity::ThermostatXi => frame.thermostat_xi.unwrap_or(0.0),
            LogQuantity::NumParticles => frame.particles.len() as f64,
            LogQuantity::Time => frame.time,
        }
    }
}

impl fmt::Display for LogQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogQuantity {
    type Err = MdError;

    fn from_str(s: &str) -> Result<Self> {
        LogQuantity::ALL
            .into_iter()
            .find(|q| q.name() == s)
            .ok_or_else(|| MdError::config(format!("unknown log quantity '{s}'")))
    }
}

/// Open `path` according to `mode`. Returns the file and whether it already
/// held data that the writer continues.
pub(crate) fn open_output(path: &Path, mode: OutputMode) -> Result<(File, bool)> {
    let mut opts = OpenOptions::new();
    match mode {
        OutputMode::Overwrite => opts.write(true).create(true).truncate(true),
        OutputMode::Append => opts.read(true).write(true).create(true),
        OutputMode::CreateNew => opts.write(true).create_new(true),
    };
    let file = opts
        .open(path)
        .map_err(|e| MdError::output(path, e))?;
    let continuing = mode == OutputMode::Append
        && file.metadata().map_err(|e| MdError::output(path, e))?.len() > 0;
    Ok((file, continuing))
}
