//! Pair potentials with per-type-pair coefficients.

use crate::{MdError, Result, TypeId};
use std::collections::BTreeMap;

/// Pair potential evaluated on the neighbor list.
pub trait PairPotential: Send + Sync {
    /// Cutoff radius beyond which the interaction vanishes.
    fn r_cut(&self) -> f64;

    /// Check that coefficients exist and are valid for all `n_types` types.
    fn validate(&self, n_types: usize) -> Result<()>;

    /// Evaluate at squared separation `r_sq` for types `(ti, tj)`.
    ///
    /// Returns `(f/r, energy)` where f = -dV/dr, so the force on i is
    /// `(f/r) * (x_i - x_j)`. `None` beyond the cutoff.
    fn evaluate(&self, r_sq: f64, ti: TypeId, tj: TypeId) -> Option<(f64, f64)>;

    fn name(&self) -> &str;
}

/// How the potential is made continuous at the cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum EnergyShift {
    /// Plain truncation.
    #[default]
    None,
    /// Subtract V(r_cut) so the energy is zero at the cutoff.
    Shift,
    /// XPLOR smoothing between `r_on` and `r_cut`.
    Xplor { r_on: f64 },
}

/// Lennard-Jones coefficients for one type pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LjCoeff {
    /// Well depth.
    pub epsilon: f64,
    /// Zero-crossing distance.
    pub sigma: f64,
    /// Scale of the attractive term (1 for the standard 12-6 form).
    pub alpha: f64,
}

impl LjCoeff {
    pub fn new(epsilon: f64, sigma: f64) -> Self {
        Self {
            epsilon,
            sigma,
            alpha: 1.0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(format!("sigma must be positive, got {}", self.sigma));
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(format!("epsilon must be non-negative, got {}", self.epsilon));
        }
        if !self.alpha.is_finite() {
            return Err(format!("alpha must be finite, got {}", self.alpha));
        }
        Ok(())
    }
}

/// Coefficients keyed by unordered type pair.
#[derive(Clone, Debug)]
pub struct PairCoeffTable<C> {
    coeffs: BTreeMap<(TypeId, TypeId), C>,
}

impl<C> Default for PairCoeffTable<C> {
    fn default() -> Self {
        Self {
            coeffs: BTreeMap::new(),
        }
    }
}

impl<C> PairCoeffTable<C> {
    fn key(a: TypeId, b: TypeId) -> (TypeId, TypeId) {
        (a.min(b), a.max(b))
    }

    /// Set coefficients for `(a, b)`; `(b, a)` refers to the same entry.
    pub fn set(&mut self, a: TypeId, b: TypeId, coeff: C) {
        self.coeffs.insert(Self::key(a, b), coeff);
    }

    pub fn get(&self, a: TypeId, b: TypeId) -> Option<&C> {
        self.coeffs.get(&Self::key(a, b))
    }

    /// All type pairs among the first `n_types` types without coefficients.
    pub fn missing(&self, n_types: usize) -> Vec<(TypeId, TypeId)> {
        let mut out = Vec::new();
        for a in 0..n_types {
            for b in a..n_types {
                if !self.coeffs.contains_key(&(a, b)) {
                    out.push((a, b));
                }
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(TypeId, TypeId), &C)> {
        self.coeffs.iter()
    }
}

/// Precomputed per-pair constants.
#[derive(Clone, Copy, Debug)]
struct LjParams {
    lj1: f64,
    lj2: f64,
    energy_shift: f64,
}

/// Lennard-Jones 12-6 potential: V(r) = 4ε [(σ/r)^12 - α(σ/r)^6].
#[derive(Clone, Debug)]
pub struct LennardJones {
    r_cut: f64,
    mode: EnergyShift,
    table: PairCoeffTable<LjCoeff>,
    params: BTreeMap<(TypeId, TypeId), LjParams>,
}

impl LennardJones {
    /// Create with a global cutoff and no coefficients.
    pub fn new(r_cut: f64) -> Self {
        Self {
            r_cut,
            mode: EnergyShift::None,
            table: PairCoeffTable::default(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: EnergyShift) -> Self {
        self.set_mode(mode);
        self
    }

    /// Builder form of [`LennardJones::set_coeff`].
    pub fn with_coeff(mut self, a: TypeId, b: TypeId, coeff: LjCoeff) -> Self {
        self.set_coeff(a, b, coeff);
        self
    }

    pub fn set_mode(&mut self, mode: EnergyShift) {
        self.mode = mode;
        self.recompute();
    }

    pub fn set_coeff(&mut self, a: TypeId, b: TypeId, coeff: LjCoeff) {
        self.table.set(a, b, coeff);
        self.recompute();
    }

    pub fn mode(&self) -> EnergyShift {
        self.mode
    }

    pub fn coeffs(&self) -> &PairCoeffTable<LjCoeff> {
        &self.table
    }

    fn recompute(&mut self) {
        let r_cut = self.r_cut;
        let shift_at_cut = matches!(self.mode, EnergyShift::Shift)
            || matches!(self.mode, EnergyShift::Xplor { r_on } if r_on >= r_cut);
        self.params = self
            .table
            .iter()
            .map(|(&key, c)| {
                let s6 = c.sigma.powi(6);
                let lj1 = 4.0 * c.epsilon * s6 * s6;
                let lj2 = c.alpha * 4.0 * c.epsilon * s6;
                let energy_shift = if shift_at_cut {
                    let inv6 = 1.0 / r_cut.powi(6);
                    inv6 * (lj1 * inv6 - lj2)
                } else {
                    0.0
                };
                (
                    key,
                    LjParams {
                        lj1,
                        lj2,
                        energy_shift,
                    },
                )
            })
            .collect();
    }

    /// Unshifted energy and f/r for the raw 12-6 form.
    #[inline]
    fn raw(p: &LjParams, r_sq: f64) -> (f64, f64) {
        let r2inv = 1.0 / r_sq;
        let r6inv = r2inv * r2inv * r2inv;
        let force_divr = r2inv * r6inv * (12.0 * p.lj1 * r6inv - 6.0 * p.lj2);
        let energy = r6inv * (p.lj1 * r6inv - p.lj2);
        (force_divr, energy)
    }
}

impl PairPotential for LennardJones {
    fn r_cut(&self) -> f64 {
        self.r_cut
    }

    fn validate(&self, n_types: usize) -> Result<()> {
        if !(self.r_cut.is_finite() && self.r_cut > 0.0) {
            return Err(MdError::config(format!(
                "lj: r_cut must be positive, got {}",
                self.r_cut
            )));
        }
        if let EnergyShift::Xplor { r_on } = self.mode {
            if !(r_on.is_finite() && r_on > 0.0) {
                return Err(MdError::config(format!("lj: xplor r_on must be positive, got {r_on}")));
            }
        }
        let missing = self.table.missing(n_types);
        if !missing.is_empty() {
            return Err(MdError::config(format!(
                "lj: coefficients not set for type pairs {missing:?}"
            )));
        }
        for ((a, b), c) in self.table.iter() {
            c.validate()
                .map_err(|e| MdError::config(format!("lj: pair ({a}, {b}): {e}")))?;
        }
        Ok(())
    }

    fn evaluate(&self, r_sq: f64, ti: TypeId, tj: TypeId) -> Option<(f64, f64)> {
        let rcut_sq = self.r_cut * self.r_cut;
        if r_sq >= rcut_sq || r_sq <= 0.0 {
            return None;
        }
        let p = self.params.get(&(ti.min(tj), ti.max(tj)))?;
        let (force_divr, energy) = Self::raw(p, r_sq);

        match self.mode {
            EnergyShift::Xplor { r_on } if r_on < self.r_cut && r_sq >= r_on * r_on => {
                // S(r) = (rc² - r²)² (rc² + 2r² - 3ron²) / (rc² - ron²)³
                let ron_sq = r_on * r_on;
                let denom = (rcut_sq - ron_sq).powi(3);
                let diff = rcut_sq - r_sq;
                let s = diff * diff * (rcut_sq + 2.0 * r_sq - 3.0 * ron_sq) / denom;
                // -(dS/dr)/r
                let ds_divr = 12.0 * diff * (r_sq - ron_sq) / denom;
                Some((s * force_divr + ds_divr * energy, s * energy))
            }
            _ => Some((force_divr, energy - p.energy_shift)),
        }
    }

    fn name(&self) -> &str {
        "lj"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lj(mode: EnergyShift) -> LennardJones {
        LennardJones::new(2.5)
            .with_mode(mode)
            .with_coeff(0, 0, LjCoeff::new(1.0, 1.0))
    }

    #[test]
    fn test_zero_at_sigma() {
        let (f, e) = lj(EnergyShift::None).evaluate(1.0, 0, 0).unwrap();
        assert_relative_eq!(e, 0.0, epsilon = 1e-12);
        // Repulsive at r = σ
        assert!(f > 0.0);
    }

    #[test]
    fn test_minimum() {
        let r_min = 2f64.powf(1.0 / 6.0);
        let (f, e) = lj(EnergyShift::None).evaluate(r_min * r_min, 0, 0).unwrap();
        assert_relative_eq!(e, -1.0, epsilon = 1e-12);
        assert!(f.abs() < 1e-10);
    }

    #[test]
    fn test_shift_zero_at_cutoff() {
        let pot = lj(EnergyShift::Shift);
        // Just inside the cutoff the shifted energy approaches zero
        let r = 2.5 - 1e-9;
        let (_, e) = pot.evaluate(r * r, 0, 0).unwrap();
        assert!(e.abs() < 1e-8);
        // At and beyond the cutoff nothing is returned
        assert!(pot.evaluate(2.5 * 2.5, 0, 0).is_none());
        assert!(pot.evaluate(9.0, 0, 0).is_none());

        let (_, unshifted) = lj(EnergyShift::None).evaluate(r * r, 0, 0).unwrap();
        assert!(unshifted < -1e-3);
    }

    #[test]
    fn test_shift_preserves_force() {
        let (f0, _) = lj(EnergyShift::None).evaluate(1.44, 0, 0).unwrap();
        let (f1, _) = lj(EnergyShift::Shift).evaluate(1.44, 0, 0).unwrap();
        assert_relative_eq!(f0, f1);
    }

    #[test]
    fn test_force_is_negative_energy_derivative() {
        for mode in [
            EnergyShift::None,
            EnergyShift::Shift,
            EnergyShift::Xplor { r_on: 2.0 },
        ] {
            let pot = lj(mode);
            for r in [0.95, 1.3, 2.2, 2.4] {
                let h = 1e-6;
                let e_plus = pot.evaluate((r + h) * (r + h), 0, 0).unwrap().1;
                let e_minus = pot.evaluate((r - h) * (r - h), 0, 0).unwrap().1;
                let numeric = -(e_plus - e_minus) / (2.0 * h);
                let (force_divr, _) = pot.evaluate(r * r, 0, 0).unwrap();
                assert_relative_eq!(force_divr * r, numeric, max_relative = 1e-5, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_xplor_continuous_at_cutoff() {
        let pot = lj(EnergyShift::Xplor { r_on: 2.0 });
        let r = 2.5 - 1e-7;
        let (f, e) = pot.evaluate(r * r, 0, 0).unwrap();
        assert!(e.abs() < 1e-10);
        assert!(f.abs() < 1e-5);
    }

    #[test]
    fn test_symmetric_type_lookup() {
        let pot = LennardJones::new(3.0)
            .with_coeff(0, 0, LjCoeff::new(1.0, 1.0))
            .with_coeff(1, 1, LjCoeff::new(1.0, 1.0))
            .with_coeff(1, 0, LjCoeff::new(0.5, 1.2));
        assert_eq!(pot.evaluate(1.5, 0, 1), pot.evaluate(1.5, 1, 0));
        assert!(pot.validate(2).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_pairs() {
        let pot = LennardJones::new(3.0).with_coeff(0, 0, LjCoeff::new(1.0, 1.0));
        let err = pot.validate(2).unwrap_err();
        assert!(err.to_string().contains("(0, 1)"));
    }

    #[test]
    fn test_validate_rejects_bad_coefficients() {
        let pot = LennardJones::new(3.0).with_coeff(0, 0, LjCoeff::new(1.0, -1.0));
        assert!(pot.validate(1).is_err());
        let pot = LennardJones::new(-1.0).with_coeff(0, 0, LjCoeff::new(1.0, 1.0));
        assert!(pot.validate(1).is_err());
    }
}
