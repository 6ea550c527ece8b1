//! Run driver: the simulation context and its step loop.

use crate::{
    ExclusionRule, Frame, MdError, NeighborList, OutputErrorPolicy, OutputWriter, PairPotential,
    ParticleData, Result, RigidBody, SimBox, SystemState, TempRescale, ThermoQuantities,
    Thermostat, ThermostatHandoff, VelocityVerlet, compute_pair_forces,
};
use rbmd_math::{Quat, Vec3};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Default neighbor list skin.
pub const DEFAULT_SKIN: f64 = 0.4;

/// Shared flag that stops a run between steps.
///
/// The flag stays set until [`CancelToken::reset`] is called, so later runs
/// return immediately as well.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// One segment of a multi-phase run.
#[derive(Clone, Debug)]
pub struct Phase {
    pub steps: u64,
    /// Thermostat for this phase; `None` integrates at constant energy.
    pub thermostat: Option<Thermostat>,
}

/// Outcome of [`Simulation::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    pub steps_completed: u64,
    pub cancelled: bool,
    /// Writer failures tolerated under [`OutputErrorPolicy::Continue`].
    pub output_errors: Vec<MdError>,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.steps_completed += other.steps_completed;
        self.cancelled |= other.cancelled;
        self.output_errors.extend(other.output_errors);
    }
}

struct WriterSlot {
    writer: Box<dyn OutputWriter>,
    last_step: Option<u64>,
}

impl WriterSlot {
    /// Due on multiples of the period, once per step even across runs.
    fn is_due(&self, step: u64) -> bool {
        step % self.writer.period() == 0 && self.last_step != Some(step)
    }
}

/// Dynamical state saved before every step and restored when the step
/// turns out to be unstable. Buffers are reused from step to step.
#[derive(Default)]
struct Checkpoint {
    pos: Vec<Vec3>,
    vel: Vec<Vec3>,
    force: Vec<Vec3>,
    energy: Vec<f64>,
    bodies: Vec<BodyMotion>,
    thermostat: Option<Thermostat>,
    potential_energy: f64,
    step: u64,
    time: f64,
}

/// The part of a rigid body that changes during a step.
#[derive(Clone, Copy)]
struct BodyMotion {
    com: Vec3,
    com_vel: Vec3,
    orientation: Quat,
    angmom: Vec3,
    angvel: Vec3,
    force: Vec3,
    torque: Vec3,
}

impl BodyMotion {
    fn of(b: &RigidBody) -> Self {
        Self {
            com: b.com,
            com_vel: b.com_vel,
            orientation: b.orientation,
            angmom: b.angmom,
            angvel: b.angvel,
            force: b.force,
            torque: b.torque,
        }
    }

    fn apply(&self, b: &mut RigidBody) {
        b.com = self.com;
        b.com_vel = self.com_vel;
        b.orientation = self.orientation;
        b.angmom = self.angmom;
        b.angvel = self.angvel;
        b.force = self.force;
        b.torque = self.torque;
    }
}

impl Checkpoint {
    fn save_state(&mut self, state: &SystemState) {
        let p = &state.particles;
        self.pos.clone_from(&p.pos);
        self.vel.clone_from(&p.vel);
        self.force.clone_from(&p.force);
        self.energy.clone_from(&p.energy);
        self.bodies.clear();
        self.bodies.extend(state.bodies.iter().map(BodyMotion::of));
    }

    fn restore_state(&self, state: &mut SystemState) {
        let p = &mut state.particles;
        p.pos.clone_from(&self.pos);
        p.vel.clone_from(&self.vel);
        p.force.clone_from(&self.force);
        p.energy.clone_from(&self.energy);
        for (b, motion) in state.bodies.iter_mut().zip(&self.bodies) {
            motion.apply(b);
        }
    }
}

/// Simulation context owning the system, its interactions and outputs.
///
/// Construct from particles and a box, configure, then call
/// [`Simulation::run`] as many times as needed. Particle state persists
/// across runs.
pub struct Simulation {
    state: SystemState,
    step: u64,
    time: f64,
    integrator: Option<VelocityVerlet>,
    potential: Option<Arc<dyn PairPotential>>,
    nlist: NeighborList,
    thermostat: Option<Thermostat>,
    writers: Vec<WriterSlot>,
    updaters: Vec<TempRescale>,
    output_policy: OutputErrorPolicy,
    energy_limit: Option<f64>,
    potential_energy: f64,
    cancel: CancelToken,
    checkpoint: Checkpoint,
}

impl Simulation {
    /// Wrap particles into the box and derive rigid bodies from membership.
    pub fn new(particles: ParticleData, sim_box: SimBox) -> Result<Self> {
        let state = SystemState::new(particles, sim_box)?;
        log::info!(
            "system: {} particles, {} rigid bodies, box {:?}",
            state.particles.len(),
            state.bodies.len(),
            sim_box.lengths().as_slice()
        );
        Ok(Self {
            state,
            step: 0,
            time: 0.0,
            integrator: None,
            potential: None,
            nlist: NeighborList::new(0.0, DEFAULT_SKIN),
            thermostat: None,
            writers: Vec::new(),
            updaters: Vec::new(),
            output_policy: OutputErrorPolicy::default(),
            energy_limit: None,
            potential_energy: 0.0,
            cancel: CancelToken::new(),
            checkpoint: Checkpoint::default(),
        })
    }

    /// Attach the pair potential. Coefficients are checked against the
    /// registered types immediately.
    pub fn set_pair_potential(&mut self, potential: Arc<dyn PairPotential>) -> Result<()> {
        potential.validate(self.state.particles.n_types())?;
        self.nlist.set_r_cut(potential.r_cut());
        self.potential = Some(potential);
        Ok(())
    }

    /// Replace all neighbor list exclusion rules.
    pub fn reset_exclusions(&mut self, rules: &[ExclusionRule]) {
        self.nlist.reset_exclusions(rules);
    }

    pub fn set_neighbor_skin(&mut self, skin: f64) -> Result<()> {
        if !(skin.is_finite() && skin >= 0.0) {
            return Err(MdError::config(format!(
                "neighbor list skin must be non-negative, got {skin}"
            )));
        }
        self.nlist.skin = skin;
        self.nlist.invalidate();
        Ok(())
    }

    /// Evaluate the rebuild criterion every `period` steps.
    pub fn set_check_period(&mut self, period: u64) -> Result<()> {
        if period == 0 {
            return Err(MdError::config("neighbor list check period must be at least 1"));
        }
        self.nlist.check_period = period;
        Ok(())
    }

    pub fn set_timestep(&mut self, dt: f64) -> Result<()> {
        self.integrator = Some(VelocityVerlet::new(dt)?);
        Ok(())
    }

    /// Continue step numbering from `step`, e.g. when restarting.
    pub fn set_step(&mut self, step: u64) {
        self.step = step;
    }

    /// Attach a thermostat with fresh auxiliary state.
    pub fn set_thermostat(&mut self, thermostat: Thermostat) -> Result<()> {
        self.replace_thermostat(thermostat, ThermostatHandoff::Reset)
    }

    /// Attach a thermostat, optionally carrying auxiliary state over from the
    /// current one.
    pub fn replace_thermostat(
        &mut self,
        mut thermostat: Thermostat,
        handoff: ThermostatHandoff,
    ) -> Result<()> {
        thermostat.validate()?;
        thermostat.reset();
        if handoff == ThermostatHandoff::CarryOver {
            let carried = self
                .thermostat
                .as_ref()
                .is_some_and(|prev| thermostat.carry_over_from(prev));
            if !carried {
                log::warn!(
                    "thermostat {}: nothing to carry over from {}, starting fresh",
                    thermostat.name(),
                    self.thermostat.as_ref().map_or("none", Thermostat::name)
                );
            }
        }
        log::info!(
            "thermostat: {} at T = {}",
            thermostat.name(),
            thermostat.temperature()
        );
        self.thermostat = Some(thermostat);
        Ok(())
    }

    /// Remove the thermostat, leaving constant-energy integration.
    pub fn disable_thermostat(&mut self) -> Option<Thermostat> {
        let previous = self.thermostat.take();
        if let Some(t) = &previous {
            log::info!("thermostat {} disabled", t.name());
        }
        previous
    }

    pub fn add_writer(&mut self, writer: Box<dyn OutputWriter>) -> Result<()> {
        if writer.period() == 0 {
            return Err(MdError::config(format!(
                "writer {}: period must be at least 1",
                writer.path().display()
            )));
        }
        self.writers.push(WriterSlot {
            writer,
            last_step: None,
        });
        Ok(())
    }

    pub fn add_updater(&mut self, updater: TempRescale) {
        self.updaters.push(updater);
    }

    pub fn set_output_error_policy(&mut self, policy: OutputErrorPolicy) {
        self.output_policy = policy;
    }

    /// Treat a total energy magnitude above `limit` as an instability.
    pub fn set_energy_limit(&mut self, limit: Option<f64>) {
        self.energy_limit = limit;
    }

    /// Draw Maxwell–Boltzmann velocities and angular momenta at
    /// `temperature`.
    pub fn thermalize(&mut self, temperature: f64, seed: u64) -> Result<()> {
        if !(temperature.is_finite() && temperature >= 0.0) {
            return Err(MdError::config(format!(
                "thermalize: temperature must be non-negative, got {temperature}"
            )));
        }
        self.state.thermalize(temperature, seed);
        Ok(())
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn particles(&self) -> &ParticleData {
        &self.state.particles
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.state.bodies
    }

    pub fn sim_box(&self) -> &SimBox {
        &self.state.sim_box
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn timestep(&self) -> Option<f64> {
        self.integrator.map(|i| i.dt)
    }

    pub fn thermostat(&self) -> Option<&Thermostat> {
        self.thermostat.as_ref()
    }

    pub fn neighbor_list(&self) -> &NeighborList {
        &self.nlist
    }

    /// Potential energy from the last force evaluation.
    pub fn potential_energy(&self) -> f64 {
        self.potential_energy
    }

    pub fn thermo(&self) -> ThermoQuantities {
        self.state.thermo(self.potential_energy)
    }

    /// Handle for stopping a run from another thread or a writer.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Check everything a run needs. Nothing is mutated.
    pub fn validate(&self) -> Result<()> {
        self.ready().map(|_| ())
    }

    fn ready(&self) -> Result<(VelocityVerlet, Arc<dyn PairPotential>)> {
        let integrator = self
            .integrator
            .ok_or_else(|| MdError::config("timestep not set"))?;
        let potential = self
            .potential
            .clone()
            .ok_or_else(|| MdError::config("no pair potential attached"))?;
        potential.validate(self.state.particles.n_types())?;
        self.nlist.validate(&self.state.sim_box)?;
        if let Some(t) = &self.thermostat {
            t.validate()?;
        }
        Ok((integrator, potential))
    }

    /// Advance `steps` steps.
    ///
    /// Configuration errors are reported before any step executes. On a
    /// numerical instability the state of the last good step is restored and
    /// the error returned.
    pub fn run(&mut self, steps: u64) -> Result<RunSummary> {
        let (integrator, potential) = self.ready()?;
        log::info!(
            "run: {steps} steps from step {} (dt = {}, thermostat: {})",
            self.step,
            integrator.dt,
            self.thermostat.as_ref().map_or("none", Thermostat::name)
        );

        let mut summary = RunSummary::default();
        self.compute_forces(potential.as_ref(), integrator.dt)?;
        if let Some(detail) = self.state.find_non_finite() {
            return Err(MdError::NumericalInstability {
                step: self.step,
                detail,
            });
        }
        self.write_outputs(&mut summary)?;

        let start = Instant::now();
        for _ in 0..steps {
            if self.cancel.is_cancelled() {
                log::info!("run cancelled at step {}", self.step);
                summary.cancelled = true;
                break;
            }

            self.save_checkpoint();
            if let Err(e) = self.advance(&integrator, potential.as_ref()) {
                log::error!("{e}; restoring step {}", self.checkpoint.step);
                self.restore_checkpoint();
                return Err(e);
            }
            summary.steps_completed += 1;

            for updater in &self.updaters {
                updater.update(self.step, &mut self.state);
            }
            self.write_outputs(&mut summary)?;
        }

        let elapsed = start.elapsed();
        log::info!(
            "run finished at step {}: {} steps in {:.2?}, {} neighbor list builds",
            self.step,
            summary.steps_completed,
            elapsed,
            self.nlist.n_builds()
        );
        Ok(summary)
    }

    /// Run phases in order, attaching each phase's thermostat with fresh
    /// auxiliary state. Stops early when a phase is cancelled.
    pub fn run_phases(&mut self, phases: &[Phase]) -> Result<RunSummary> {
        for t in phases.iter().filter_map(|p| p.thermostat.as_ref()) {
            t.validate()?;
        }

        let mut total = RunSummary::default();
        for (k, phase) in phases.iter().enumerate() {
            match &phase.thermostat {
                Some(t) => self.set_thermostat(t.clone())?,
                None => {
                    self.disable_thermostat();
                }
            }
            log::info!("phase {}/{}: {} steps", k + 1, phases.len(), phase.steps);
            let summary = self.run(phase.steps)?;
            let cancelled = summary.cancelled;
            total.absorb(summary);
            if cancelled {
                break;
            }
        }
        Ok(total)
    }

    /// Flush and close all writers.
    pub fn close(mut self) -> Result<()> {
        let mut first_error = None;
        for slot in self.writers.iter_mut() {
            if let Err(e) = slot.writer.flush() {
                log::error!("{e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// One complete step including the stability check.
    fn advance(&mut self, integrator: &VelocityVerlet, potential: &dyn PairPotential) -> Result<()> {
        let dt = integrator.dt;
        let scale = self
            .thermostat
            .as_ref()
            .map_or(1.0, |t| t.half_step_scale(dt));
        integrator.step_one(&mut self.state, scale);
        self.step += 1;
        self.time += dt;

        self.compute_forces(potential, dt)?;
        integrator.step_two(&mut self.state);

        if let Some(t) = self.thermostat.as_mut() {
            let temperature = self.state.thermo(0.0).temperature();
            t.end_step(temperature, dt);
            let scale = t.half_step_scale(dt);
            if scale != 1.0 {
                self.state.scale_momenta(scale);
            }
        }

        self.check_stability()
    }

    fn compute_forces(&mut self, potential: &dyn PairPotential, dt: f64) -> Result<()> {
        let state = &mut self.state;
        self.nlist.refresh(&state.particles, &state.sim_box, self.step)?;
        self.potential_energy =
            compute_pair_forces(&mut state.particles, &self.nlist, potential, &state.sim_box);
        if let Some(t) = self.thermostat.as_mut() {
            t.apply_forces(&mut state.particles, dt);
        }
        state.aggregate_body_forces();
        Ok(())
    }

    fn check_stability(&self) -> Result<()> {
        let unstable = |detail: String| MdError::NumericalInstability {
            step: self.step,
            detail,
        };
        if let Some(detail) = self.state.find_non_finite() {
            return Err(unstable(detail));
        }
        let energy = self.thermo().total_energy();
        if !energy.is_finite() {
            return Err(unstable(format!("total energy is {energy}")));
        }
        if let Some(limit) = self.energy_limit {
            if energy.abs() > limit {
                return Err(unstable(format!(
                    "total energy {energy:.6e} exceeds limit {limit:.6e}"
                )));
            }
        }
        Ok(())
    }

    fn save_checkpoint(&mut self) {
        let c = &mut self.checkpoint;
        c.save_state(&self.state);
        c.thermostat.clone_from(&self.thermostat);
        c.potential_energy = self.potential_energy;
        c.step = self.step;
        c.time = self.time;
    }

    fn restore_checkpoint(&mut self) {
        let c = &self.checkpoint;
        c.restore_state(&mut self.state);
        self.thermostat.clone_from(&c.thermostat);
        self.potential_energy = c.potential_energy;
        self.step = c.step;
        self.time = c.time;
        self.nlist.invalidate();
    }

    fn write_outputs(&mut self, summary: &mut RunSummary) -> Result<()> {
        let step = self.step;
        if !self.writers.iter().any(|s| s.is_due(step)) {
            return Ok(());
        }
        let frame = Frame {
            step,
            time: self.time,
            particles: &self.state.particles,
            sim_box: &self.state.sim_box,
            thermo: self.state.thermo(self.potential_energy),
            thermostat_xi: self.thermostat.as_ref().and_then(Thermostat::xi),
        };
        for slot in self.writers.iter_mut() {
            if !slot.is_due(step) {
                continue;
            }
            match slot.writer.write(&frame) {
                Ok(()) => slot.last_step = Some(step),
                Err(e) => {
                    log::error!("step {step}: {e}");
                    match self.output_policy {
                        OutputErrorPolicy::Halt => return Err(e),
                        OutputErrorPolicy::Continue => {
                            slot.last_step = Some(step);
                            summary.output_errors.push(e);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
