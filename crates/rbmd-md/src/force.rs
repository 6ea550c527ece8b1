//! Pair force evaluation over the neighbor list.

use crate::{NeighborList, PairPotential, ParticleData, SimBox};

/// Accumulate pair forces and energies into `particles`.
///
/// Accumulators are reset first. Pairs are visited in neighbor-list order so
/// the summation order, and therefore the result, is reproducible. Returns the
/// total potential energy.
pub fn compute_pair_forces(
    particles: &mut ParticleData,
    nlist: &NeighborList,
    potential: &dyn PairPotential,
    sim_box: &SimBox,
) -> f64 {
    particles.reset_forces();
    let mut total = 0.0;

    for &(i, j) in &nlist.pairs {
        let dr = sim_box.minimum_image(particles.pos[i] - particles.pos[j]);
        let Some((force_divr, energy)) =
            potential.evaluate(dr.norm_squared(), particles.type_id[i], particles.type_id[j])
        else {
            continue;
        };

        // Equal and opposite on the partner
        let f = force_divr * dr;
        particles.force[i] += f;
        particles.force[j] -= f;

        particles.energy[i] += 0.5 * energy;
        particles.energy[j] += 0.5 * energy;
        total += energy;
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnergyShift, LennardJones, LjCoeff, Particle};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rbmd_math::Vec3;

    fn lj() -> LennardJones {
        LennardJones::new(2f64.powf(1.0 / 6.0) * 2.0)
            .with_mode(EnergyShift::Shift)
            .with_coeff(0, 0, LjCoeff::new(1.0, 1.0))
    }

    #[test]
    fn test_two_particles_beyond_cutoff() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = ParticleData::new(["A"]);
        pd.push(Particle::new(Vec3::zeros(), 1.0, 0)).unwrap();
        pd.push(Particle::new(Vec3::new(2.3, 0.0, 0.0), 1.0, 0))
            .unwrap();

        let pot = lj();
        let mut nlist = NeighborList::new(pot.r_cut(), 0.4);
        nlist.build(&pd, &sim_box).unwrap();
        // Inside the skin, so the pair is listed but outside the cutoff
        assert_eq!(nlist.pairs.len(), 1);

        let energy = compute_pair_forces(&mut pd, &nlist, &pot, &sim_box);
        assert_eq!(energy, 0.0);
        assert_eq!(pd.force[0], Vec3::zeros());
        assert_eq!(pd.force[1], Vec3::zeros());
    }

    #[test]
    fn test_pair_forces_antisymmetric() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = ParticleData::new(["A"]);
        pd.push(Particle::new(Vec3::zeros(), 1.0, 0)).unwrap();
        pd.push(Particle::new(Vec3::new(0.9, 0.3, -0.2), 1.0, 0))
            .unwrap();

        let pot = lj();
        let mut nlist = NeighborList::new(pot.r_cut(), 0.4);
        nlist.build(&pd, &sim_box).unwrap();
        compute_pair_forces(&mut pd, &nlist, &pot, &sim_box);

        assert_eq!(pd.force[0], -pd.force[1]);
        // Repulsive: particle 0 pushed away from particle 1
        assert!(pd.force[0].dot(&(pd.pos[1] - pd.pos[0])) < 0.0);
    }

    #[test]
    fn test_momentum_conservation() {
        let sim_box = SimBox::cube(8.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut pd = ParticleData::new(["A"]);
        for _ in 0..200 {
            let x = Vec3::from_fn(|_, _| rng.gen_range(-4.0..4.0));
            pd.push(Particle::new(x, 1.0, 0)).unwrap();
        }

        let pot = LennardJones::new(2.5).with_coeff(0, 0, LjCoeff::new(1.0, 0.8));
        let mut nlist = NeighborList::new(pot.r_cut(), 0.3);
        nlist.build(&pd, &sim_box).unwrap();
        compute_pair_forces(&mut pd, &nlist, &pot, &sim_box);

        let total: Vec3 = pd.force.iter().sum();
        let scale: f64 = pd.force.iter().map(|f| f.norm()).sum::<f64>().max(1.0);
        assert!(total.norm() / scale < 1e-12, "net force {total:?}");
    }

    #[test]
    fn test_energy_split_between_particles() {
        let sim_box = SimBox::cube(20.0).unwrap();
        let mut pd = ParticleData::new(["A"]);
        pd.push(Particle::new(Vec3::zeros(), 1.0, 0)).unwrap();
        pd.push(Particle::new(Vec3::new(1.0, 0.0, 0.0), 1.0, 0))
            .unwrap();

        let pot = LennardJones::new(2.5).with_coeff(0, 0, LjCoeff::new(1.0, 1.0));
        let mut nlist = NeighborList::new(pot.r_cut(), 0.3);
        nlist.build(&pd, &sim_box).unwrap();
        let total = compute_pair_forces(&mut pd, &nlist, &pot, &sim_box);

        // V(σ) = 0 for the unshifted potential
        assert_relative_eq!(total, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pd.energy[0], pd.energy[1]);
    }
}
