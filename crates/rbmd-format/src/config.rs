//! Initial configuration: box, type names and particles.

use crate::error::{FormatError, Result};
use rbmd_math::Vec3;
use rbmd_md::{Membership, Particle, ParticleData, SimBox, Simulation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Particle configuration as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Configuration {
    /// Step number the configuration belongs to.
    #[serde(default)]
    pub timestep: u64,
    /// Periodic box lengths [Lx, Ly, Lz].
    #[serde(rename = "box")]
    pub box_lengths: [f64; 3],
    /// Particle type names; particles refer to them by name.
    pub types: Vec<String>,
    pub particles: Vec<ParticleSpec>,
}

/// One particle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticleSpec {
    pub position: [f64; 3],
    #[serde(default)]
    pub velocity: [f64; 3],
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Rigid body id; ids are contiguous from 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<usize>,
}

fn default_mass() -> f64 {
    1.0
}

impl ParticleSpec {
    pub fn new(position: [f64; 3], type_name: impl Into<String>) -> Self {
        Self {
            position,
            velocity: [0.0; 3],
            type_name: type_name.into(),
            mass: default_mass(),
            body: None,
        }
    }

    pub fn in_body(mut self, body: usize) -> Self {
        self.body = Some(body);
        self
    }
}

impl Configuration {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Configuration = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check type names and body ids. Numeric ranges (mass, box lengths) are
    /// checked when the particle store is built.
    pub fn validate(&self) -> Result<()> {
        if self.types.is_empty() {
            return Err(FormatError::invalid("no particle types declared"));
        }
        let mut seen = BTreeSet::new();
        for name in &self.types {
            if !seen.insert(name.as_str()) {
                return Err(FormatError::invalid(format!("duplicate type name '{name}'")));
            }
        }
        for (i, p) in self.particles.iter().enumerate() {
            if !seen.contains(p.type_name.as_str()) {
                return Err(FormatError::invalid(format!(
                    "particle {i} has undeclared type '{}'",
                    p.type_name
                )));
            }
        }

        let bodies: BTreeSet<usize> = self.particles.iter().filter_map(|p| p.body).collect();
        if let Some(missing) = (0..bodies.len()).find(|b| !bodies.contains(b)) {
            return Err(FormatError::invalid(format!(
                "body ids must be contiguous from 0, body {missing} has no members"
            )));
        }
        Ok(())
    }

    pub fn sim_box(&self) -> Result<SimBox> {
        Ok(SimBox::new(Vec3::from(self.box_lengths))?)
    }

    /// Build the particle store.
    pub fn to_particles(&self) -> Result<ParticleData> {
        let mut particles = ParticleData::new(self.types.iter().cloned());
        for (i, p) in self.particles.iter().enumerate() {
            let type_id = particles
                .type_id(&p.type_name)
                .ok_or_else(|| FormatError::invalid(format!("particle {i}: unknown type")))?;
            let mut particle = Particle::new(Vec3::from(p.position), p.mass, type_id)
                .with_velocity(Vec3::from(p.velocity));
            if let Some(b) = p.body {
                particle = particle.in_body(b);
            }
            particles.push(particle)?;
        }
        Ok(particles)
    }

    /// Create a simulation starting at this configuration's step.
    pub fn to_simulation(&self) -> Result<Simulation> {
        self.validate()?;
        let mut sim = Simulation::new(self.to_particles()?, self.sim_box()?)?;
        sim.set_step(self.timestep);
        Ok(sim)
    }

    /// Snapshot the current particle state of a simulation.
    pub fn from_simulation(sim: &Simulation) -> Self {
        let p = sim.particles();
        let particles = (0..p.len())
            .map(|i| ParticleSpec {
                position: p.pos[i].into(),
                velocity: p.vel[i].into(),
                type_name: p.type_names[p.type_id[i]].clone(),
                mass: p.mass[i],
                body: match p.membership[i] {
                    Membership::Free => None,
                    Membership::Body(b) => Some(b),
                },
            })
            .collect();
        Self {
            timestep: sim.step(),
            box_lengths: sim.sim_box().lengths().into(),
            types: p.type_names.clone(),
            particles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube_config() -> Configuration {
        let mut particles = Vec::new();
        for sx in [-0.5, 0.5] {
            for sy in [-0.5, 0.5] {
                for sz in [-0.5, 0.5] {
                    particles.push(ParticleSpec::new([sx, sy, sz], "A").in_body(0));
                }
            }
        }
        particles.push(ParticleSpec::new([2.0, 2.0, 2.0], "B"));
        Configuration {
            timestep: 0,
            box_lengths: [8.0, 8.0, 8.0],
            types: vec!["A".into(), "B".into()],
            particles,
        }
    }

    #[test]
    fn test_defaults() {
        let json = r#"{
            "box": [10.0, 10.0, 10.0],
            "types": ["A"],
            "particles": [{ "position": [1.0, 2.0, 3.0], "type": "A" }]
        }"#;
        let config = Configuration::from_json(json).unwrap();
        assert_eq!(config.timestep, 0);
        let p = &config.particles[0];
        assert_eq!(p.velocity, [0.0; 3]);
        assert_eq!(p.mass, 1.0);
        assert_eq!(p.body, None);
    }

    #[test]
    fn test_rejects_unknown_type() {
        let mut config = cube_config();
        config.particles[0].type_name = "C".into();
        assert!(matches!(
            config.validate(),
            Err(FormatError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_gap_in_body_ids() {
        let mut config = cube_config();
        config.particles[8].body = Some(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_box() {
        let mut config = cube_config();
        config.box_lengths[1] = -1.0;
        assert!(matches!(config.to_simulation(), Err(FormatError::Md(_))));
    }

    #[test]
    fn test_simulation_round_trip() {
        let mut config = cube_config();
        config.timestep = 400;
        config.particles[8].velocity = [0.1, -0.2, 0.3];
        config.particles[8].mass = 2.5;

        let sim = config.to_simulation().unwrap();
        assert_eq!(sim.bodies().len(), 1);
        assert_eq!(sim.step(), 400);

        let back = Configuration::from_simulation(&sim);
        assert_eq!(back.timestep, 400);
        assert_eq!(back.types, config.types);
        assert_eq!(back.box_lengths, config.box_lengths);
        for (a, b) in back.particles.iter().zip(&config.particles) {
            assert_eq!(a.type_name, b.type_name);
            assert_eq!(a.body, b.body);
            assert_eq!(a.mass, b.mass);
            assert_relative_eq!(Vec3::from(a.position), Vec3::from(b.position), epsilon = 1e-12);
            assert_relative_eq!(Vec3::from(a.velocity), Vec3::from(b.velocity), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init.json");
        let config = cube_config();
        config.save(&path).unwrap();
        let loaded = Configuration::load(&path).unwrap();
        assert_eq!(loaded, config);
        // Free particles carry no body field
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("\"body\"").count(), 8);
    }
}
