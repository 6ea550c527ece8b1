//! Declarative run script.
//!
//! A script names the configuration file, the pair potential and its
//! coefficients, exclusions, the timestep, periodic outputs and an ordered
//! list of phases. Relative paths are resolved against the script's
//! directory.

use crate::config::Configuration;
use crate::error::{FormatError, Result};
use rbmd_md::{
    DcdWriter, EnergyShift, ExclusionRule, LennardJones, LjCoeff, LogQuantity, LogWriter,
    OutputErrorPolicy, OutputMode, OutputWriter, Phase, RunSummary, Simulation, TempRescale,
    Thermostat,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunScript {
    /// Initial configuration file.
    pub configuration: PathBuf,
    pub potential: PotentialSpec,
    #[serde(default)]
    pub exclusions: Vec<ExclusionSpec>,
    /// Neighbor list skin.
    #[serde(default = "default_skin")]
    pub skin: f64,
    pub dt: f64,
    /// Draw initial velocities instead of using the configured ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermalize: Option<ThermalizeSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    #[serde(default)]
    pub updaters: Vec<UpdaterSpec>,
    #[serde(default)]
    pub on_output_error: OutputErrorSpec,
    pub phases: Vec<PhaseSpec>,
    /// Where to write the configuration after the last phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_configuration: Option<PathBuf>,
}

fn default_skin() -> f64 {
    rbmd_md::simulation::DEFAULT_SKIN
}

/// Pair potential selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PotentialSpec {
    Lj(LjSpec),
}

/// Lennard-Jones parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LjSpec {
    pub r_cut: f64,
    #[serde(default)]
    pub mode: ShiftSpec,
    /// Start of XPLOR smoothing; required for `mode = "xplor"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_on: Option<f64>,
    pub pair_coeffs: Vec<PairCoeffSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShiftSpec {
    #[default]
    None,
    Shift,
    Xplor,
}

/// Coefficients for one unordered type pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCoeffSpec {
    pub a: String,
    pub b: String,
    pub epsilon: f64,
    pub sigma: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_alpha() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionSpec {
    /// Pairs within one rigid body.
    Body,
    /// One explicit particle pair.
    Pair([usize; 2]),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThermalizeSpec {
    pub temperature: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModeSpec {
    #[default]
    Overwrite,
    Append,
    CreateNew,
}

impl From<ModeSpec> for OutputMode {
    fn from(mode: ModeSpec) -> Self {
        match mode {
            ModeSpec::Overwrite => OutputMode::Overwrite,
            ModeSpec::Append => OutputMode::Append,
            ModeSpec::CreateNew => OutputMode::CreateNew,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputErrorSpec {
    #[default]
    Continue,
    Halt,
}

impl From<OutputErrorSpec> for OutputErrorPolicy {
    fn from(policy: OutputErrorSpec) -> Self {
        match policy {
            OutputErrorSpec::Continue => OutputErrorPolicy::Continue,
            OutputErrorSpec::Halt => OutputErrorPolicy::Halt,
        }
    }
}

/// Periodic output stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputSpec {
    Dcd {
        filename: PathBuf,
        period: u64,
        #[serde(default)]
        mode: ModeSpec,
    },
    Log {
        filename: PathBuf,
        period: u64,
        quantities: Vec<String>,
        #[serde(default)]
        mode: ModeSpec,
    },
}

impl OutputSpec {
    pub fn filename(&self) -> &Path {
        match self {
            OutputSpec::Dcd { filename, .. } | OutputSpec::Log { filename, .. } => filename,
        }
    }

    fn filename_mut(&mut self) -> &mut PathBuf {
        match self {
            OutputSpec::Dcd { filename, .. } | OutputSpec::Log { filename, .. } => filename,
        }
    }

    pub fn period(&self) -> u64 {
        match self {
            OutputSpec::Dcd { period, .. } | OutputSpec::Log { period, .. } => *period,
        }
    }

    pub fn mode(&self) -> ModeSpec {
        match self {
            OutputSpec::Dcd { mode, .. } | OutputSpec::Log { mode, .. } => *mode,
        }
    }

    /// Validate the output against the file system without opening it.
    pub fn check(&self) -> Result<()> {
        let filename = self.filename();
        if self.period() == 0 {
            return Err(FormatError::invalid(format!(
                "{}: output period must be at least 1",
                filename.display()
            )));
        }
        if let OutputSpec::Log { quantities, .. } = self {
            parse_quantities(quantities)?;
        }
        if self.mode() == ModeSpec::CreateNew && filename.exists() {
            return Err(FormatError::invalid(format!(
                "{} already exists",
                filename.display()
            )));
        }
        let dir = match filename.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !dir.is_dir() {
            return Err(FormatError::invalid(format!(
                "output directory {} does not exist",
                dir.display()
            )));
        }
        Ok(())
    }

    /// Open the writer, creating or truncating the file as its mode says.
    pub fn open(&self, dt: f64) -> Result<Box<dyn OutputWriter>> {
        let writer: Box<dyn OutputWriter> = match self {
            OutputSpec::Dcd {
                filename,
                period,
                mode,
            } => Box::new(DcdWriter::create(filename, *period, dt, (*mode).into())?),
            OutputSpec::Log {
                filename,
                period,
                quantities,
                mode,
            } => Box::new(LogWriter::create(
                filename,
                *period,
                parse_quantities(quantities)?,
                (*mode).into(),
            )?),
        };
        Ok(writer)
    }
}

fn parse_quantities(names: &[String]) -> Result<Vec<LogQuantity>> {
    let quantities = names
        .iter()
        .map(|q| q.parse::<LogQuantity>())
        .collect::<rbmd_md::Result<Vec<_>>>()?;
    Ok(quantities)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UpdaterSpec {
    TempRescale { temperature: f64, period: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ThermostatSpec {
    Brownian {
        temperature: f64,
        #[serde(default = "default_gamma")]
        gamma: f64,
        #[serde(default)]
        seed: u64,
    },
    NoseHoover {
        temperature: f64,
        tau: f64,
    },
}

fn default_gamma() -> f64 {
    1.0
}

impl From<&ThermostatSpec> for Thermostat {
    fn from(spec: &ThermostatSpec) -> Self {
        match *spec {
            ThermostatSpec::Brownian {
                temperature,
                gamma,
                seed,
            } => Thermostat::brownian(temperature, gamma, seed),
            ThermostatSpec::NoseHoover { temperature, tau } => {
                Thermostat::nose_hoover(temperature, tau)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub steps: u64,
    /// Absent for constant-energy integration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermostat: Option<ThermostatSpec>,
}

impl RunScript {
    /// Load a script, resolving relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let mut script = Self::from_json(&json)?;
        if let Some(dir) = path.parent() {
            script.resolve_paths(dir);
        }
        Ok(script)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let script: RunScript = serde_json::from_str(json)?;
        if script.phases.is_empty() {
            return Err(FormatError::invalid("run script has no phases"));
        }
        Ok(script)
    }

    /// Prefix relative file paths with `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.configuration);
        for output in self.outputs.iter_mut() {
            resolve(output.filename_mut());
        }
        if let Some(p) = self.final_configuration.as_mut() {
            resolve(p);
        }
    }

    /// Total number of steps over all phases.
    pub fn total_steps(&self) -> u64 {
        self.phases.iter().map(|p| p.steps).sum()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.phases
            .iter()
            .map(|p| Phase {
                steps: p.steps,
                thermostat: p.thermostat.as_ref().map(Thermostat::from),
            })
            .collect()
    }

    /// Load the configuration and set up a simulation ready to run.
    pub fn build(&self) -> Result<Simulation> {
        let config = Configuration::load(&self.configuration)?;
        self.build_from(&config)
    }

    /// Validate the whole setup without creating or truncating any output
    /// file.
    pub fn check(&self) -> Result<Simulation> {
        let config = Configuration::load(&self.configuration)?;
        self.prepare(&config)
    }

    /// Set up a simulation from an already loaded configuration. Outputs are
    /// opened only after everything else has been validated.
    pub fn build_from(&self, config: &Configuration) -> Result<Simulation> {
        let mut sim = self.prepare(config)?;
        for output in &self.outputs {
            sim.add_writer(output.open(self.dt)?)?;
        }
        Ok(sim)
    }

    fn prepare(&self, config: &Configuration) -> Result<Simulation> {
        let mut sim = config.to_simulation()?;

        let PotentialSpec::Lj(lj) = &self.potential;
        sim.set_pair_potential(Arc::new(lj.to_potential(&sim)?))?;
        sim.reset_exclusions(
            &self
                .exclusions
                .iter()
                .map(|e| match *e {
                    ExclusionSpec::Body => ExclusionRule::Body,
                    ExclusionSpec::Pair([i, j]) => ExclusionRule::Pair(i, j),
                })
                .collect::<Vec<_>>(),
        );
        sim.set_neighbor_skin(self.skin)?;
        sim.set_timestep(self.dt)?;
        sim.set_output_error_policy(self.on_output_error.into());

        if let Some(t) = self.thermalize {
            sim.thermalize(t.temperature, t.seed)?;
        }
        for updater in &self.updaters {
            let UpdaterSpec::TempRescale {
                temperature,
                period,
            } = *updater;
            sim.add_updater(TempRescale::new(temperature, period)?);
        }
        for phase in self.phases() {
            if let Some(t) = &phase.thermostat {
                t.validate()?;
            }
        }
        for output in &self.outputs {
            output.check()?;
        }
        sim.validate()?;
        Ok(sim)
    }

    /// Build, run all phases, save the final configuration if requested and
    /// close the outputs.
    pub fn execute(&self) -> Result<RunSummary> {
        let mut sim = self.build()?;
        let summary = sim.run_phases(&self.phases())?;
        if let Some(path) = &self.final_configuration {
            Configuration::from_simulation(&sim).save(path)?;
            log::info!("final configuration written to {}", path.display());
        }
        sim.close()?;
        Ok(summary)
    }
}

impl LjSpec {
    /// Resolve type names against the simulation's registry.
    pub fn to_potential(&self, sim: &Simulation) -> Result<LennardJones> {
        let mode = match self.mode {
            ShiftSpec::None => EnergyShift::None,
            ShiftSpec::Shift => EnergyShift::Shift,
            ShiftSpec::Xplor => EnergyShift::Xplor {
                r_on: self
                    .r_on
                    .ok_or_else(|| FormatError::invalid("lj: xplor mode requires r_on"))?,
            },
        };
        let type_id = |name: &str| {
            sim.particles()
                .type_id(name)
                .ok_or_else(|| FormatError::invalid(format!("lj: unknown type '{name}'")))
        };
        let mut lj = LennardJones::new(self.r_cut).with_mode(mode);
        for c in &self.pair_coeffs {
            let coeff = LjCoeff::new(c.epsilon, c.sigma).with_alpha(c.alpha);
            lj.set_coeff(type_id(&c.a)?, type_id(&c.b)?, coeff);
        }
        Ok(lj)
    }
}
