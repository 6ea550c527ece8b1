//! Rigid cubes under Brownian dynamics, then Nosé–Hoover NVT.
//!
//! Writes `rigid_cubes.dcd` and `rigid_cubes.log` to the working directory.

use rbmd_math::Vec3;
use rbmd_md::{
    DcdWriter, EnergyShift, ExclusionRule, LennardJones, LjCoeff, LogQuantity, LogWriter,
    OutputMode, Particle, ParticleData, SimBox, Simulation, Thermostat,
};
use std::sync::Arc;

fn main() -> rbmd_md::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let temperature = 1.2;
    let dt = 0.005;
    let n_side = 4;
    let spacing = 2.2;

    // Simple cubic lattice of unit cubes, one particle per corner
    let l = n_side as f64 * spacing;
    let mut particles = ParticleData::new(["A"]);
    let mut body = 0;
    for ix in 0..n_side {
        for iy in 0..n_side {
            for iz in 0..n_side {
                let center = Vec3::new(ix as f64, iy as f64, iz as f64) * spacing
                    - Vec3::repeat(0.5 * (l - spacing));
                for corner in 0..8 {
                    let offset = Vec3::new(
                        (corner & 1) as f64 - 0.5,
                        ((corner >> 1) & 1) as f64 - 0.5,
                        ((corner >> 2) & 1) as f64 - 0.5,
                    );
                    particles.push(Particle::new(center + offset, 1.0, 0).in_body(body))?;
                }
                body += 1;
            }
        }
    }

    let mut sim = Simulation::new(particles, SimBox::cube(l)?)?;
    println!(
        "{} particles in {} rigid cubes, box {:.1}",
        sim.particles().len(),
        sim.bodies().len(),
        l
    );

    // WCA: purely repulsive Lennard-Jones shifted to zero at the minimum
    let lj = LennardJones::new(2f64.powf(1.0 / 6.0))
        .with_mode(EnergyShift::Shift)
        .with_coeff(0, 0, LjCoeff::new(1.0, 1.0));
    sim.set_pair_potential(Arc::new(lj))?;
    sim.reset_exclusions(&[ExclusionRule::Body]);
    sim.set_timestep(dt)?;

    sim.add_writer(Box::new(DcdWriter::create(
        "rigid_cubes.dcd",
        100,
        dt,
        OutputMode::Overwrite,
    )?))?;
    sim.add_writer(Box::new(LogWriter::create(
        "rigid_cubes.log",
        100,
        vec![LogQuantity::PotentialEnergy, LogQuantity::KineticEnergy],
        OutputMode::Overwrite,
    )?))?;

    println!("Brownian dynamics at T = {temperature}");
    sim.set_thermostat(Thermostat::brownian(temperature, 1.0, 1))?;
    sim.run(5000)?;
    report(&sim);

    println!("Nosé–Hoover at T = {temperature}, tau = 10");
    sim.disable_thermostat();
    sim.set_thermostat(Thermostat::nose_hoover(temperature, 10.0))?;
    sim.run(10000)?;
    report(&sim);

    sim.close()
}

fn report(sim: &Simulation) {
    let thermo = sim.thermo();
    println!(
        "{:8} T = {:.3}  KE = {:.4}  PE = {:.4}",
        sim.step(),
        thermo.temperature(),
        thermo.kinetic_energy(),
        thermo.potential_energy
    );
}
