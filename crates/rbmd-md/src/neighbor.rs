//! Cell-list neighbor list with a skin buffer and exclusion rules.

use crate::{MdError, ParticleData, Result, SimBox};
use rbmd_math::Vec3;
use std::collections::BTreeSet;

/// Rule removing candidate pairs from the neighbor list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExclusionRule {
    /// Exclude pairs whose particles belong to the same rigid body.
    Body,
    /// Exclude one explicit particle pair.
    Pair(usize, usize),
}

/// Active set of exclusion rules.
#[derive(Clone, Debug, Default)]
pub struct Exclusions {
    body: bool,
    pairs: BTreeSet<(usize, usize)>,
}

impl Exclusions {
    pub fn from_rules(rules: &[ExclusionRule]) -> Self {
        let mut ex = Self::default();
        for rule in rules {
            match *rule {
                ExclusionRule::Body => ex.body = true,
                ExclusionRule::Pair(i, j) => {
                    ex.pairs.insert((i.min(j), i.max(j)));
                }
            }
        }
        ex
    }

    pub fn excludes_body(&self) -> bool {
        self.body
    }

    /// Whether the pair `(i, j)` is excluded.
    pub fn is_excluded(&self, particles: &ParticleData, i: usize, j: usize) -> bool {
        (self.body && particles.same_body(i, j)) || self.pairs.contains(&(i.min(j), i.max(j)))
    }
}

/// Neighbor list for pairwise force computation.
#[derive(Clone, Debug)]
pub struct NeighborList {
    /// Sorted neighbor pairs (i, j) with i < j.
    pub pairs: Vec<(usize, usize)>,
    /// Interaction cutoff.
    pub r_cut: f64,
    /// Skin distance added to the cutoff when building.
    pub skin: f64,
    /// Evaluate the displacement criterion every this many steps.
    pub check_period: u64,
    exclusions: Exclusions,
    last_positions: Vec<Vec3>,
    n_builds: u64,
    stale: bool,
}

impl NeighborList {
    /// Create a neighbor list. Nothing is built until [`NeighborList::build`].
    pub fn new(r_cut: f64, skin: f64) -> Self {
        Self {
            pairs: Vec::new(),
            r_cut,
            skin,
            check_period: 1,
            exclusions: Exclusions::default(),
            last_positions: Vec::new(),
            n_builds: 0,
            stale: true,
        }
    }

    /// Search radius, `r_cut + skin`.
    pub fn r_list(&self) -> f64 {
        self.r_cut + self.skin
    }

    /// Number of builds performed so far.
    pub fn n_builds(&self) -> u64 {
        self.n_builds
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    /// Replace all exclusion rules. The next refresh rebuilds the list.
    pub fn reset_exclusions(&mut self, rules: &[ExclusionRule]) {
        self.exclusions = Exclusions::from_rules(rules);
        self.stale = true;
    }

    /// Change the cutoff. The next refresh rebuilds the list.
    pub fn set_r_cut(&mut self, r_cut: f64) {
        self.r_cut = r_cut;
        self.stale = true;
    }

    /// Force a rebuild at the next refresh.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Check the geometric requirements of the minimum image convention.
    pub fn validate(&self, sim_box: &SimBox) -> Result<()> {
        if !(self.r_cut.is_finite() && self.r_cut > 0.0) {
            return Err(MdError::config(format!(
                "neighbor list cutoff must be positive, got {}",
                self.r_cut
            )));
        }
        if !(self.skin.is_finite() && self.skin >= 0.0) {
            return Err(MdError::config(format!(
                "neighbor list skin must be non-negative, got {}",
                self.skin
            )));
        }
        if self.check_period == 0 {
            return Err(MdError::config("neighbor list check period must be at least 1"));
        }
        let half = 0.5 * sim_box.min_length();
        if self.r_list() > half {
            return Err(MdError::config(format!(
                "r_cut + skin = {} exceeds half the smallest box length ({})",
                self.r_list(),
                half
            )));
        }
        Ok(())
    }

    /// Rebuild when stale or when some particle moved more than skin/2.
    /// Returns true if a rebuild happened.
    pub fn refresh(&mut self, particles: &ParticleData, sim_box: &SimBox, step: u64) -> Result<bool> {
        let due = self.stale
            || (step % self.check_period == 0 && self.needs_rebuild(particles, sim_box));
        if due {
            self.build(particles, sim_box)?;
        }
        Ok(due)
    }

    /// Build the list from scratch using a cell list.
    pub fn build(&mut self, particles: &ParticleData, sim_box: &SimBox) -> Result<()> {
        self.validate(sim_box)?;

        let r_search = self.r_list();
        let r_search_sq = r_search * r_search;
        let cells = CellGrid::new(sim_box, r_search, &particles.pos);

        self.pairs.clear();
        let mut candidates = Vec::new();
        for i in 0..particles.len() {
            candidates.clear();
            let home = cells.cell_of(sim_box, &particles.pos[i]);
            for cell in cells.neighborhood(home) {
                for &j in &cells.contents[cell] {
                    if j <= i {
                        continue;
                    }
                    let dr = sim_box.minimum_image(particles.pos[j] - particles.pos[i]);
                    if dr.norm_squared() < r_search_sq && !self.exclusions.is_excluded(particles, i, j) {
                        candidates.push(j);
                    }
                }
            }
            candidates.sort_unstable();
            self.pairs.extend(candidates.iter().map(|&j| (i, j)));
        }

        self.last_positions.clear();
        self.last_positions.extend_from_slice(&particles.pos);
        self.n_builds += 1;
        self.stale = false;
        log::debug!(
            "neighbor list build #{}: {} pairs, {} cells",
            self.n_builds,
            self.pairs.len(),
            cells.contents.len()
        );
        Ok(())
    }

    /// Whether any particle moved more than half the skin since the last build.
    pub fn needs_rebuild(&self, particles: &ParticleData, sim_box: &SimBox) -> bool {
        if self.last_positions.len() != particles.len() {
            return true;
        }

        let max_disp_sq = (0.5 * self.skin).powi(2);
        self.last_positions
            .iter()
            .zip(&particles.pos)
            .any(|(last, x)| sim_box.minimum_image(x - last).norm_squared() > max_disp_sq)
    }
}

/// Regular grid of cells with edge at least the search radius.
struct CellGrid {
    dims: [usize; 3],
    contents: Vec<Vec<usize>>,
}

impl CellGrid {
    fn new(sim_box: &SimBox, r_search: f64, positions: &[Vec3]) -> Self {
        let lengths = sim_box.lengths();
        let dims = [0, 1, 2].map(|d| ((lengths[d] / r_search).floor() as usize).max(1));
        let mut grid = Self {
            dims,
            contents: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        };
        for (i, x) in positions.iter().enumerate() {
            let c = grid.cell_of(sim_box, x);
            grid.contents[c].push(i);
        }
        grid
    }

    fn cell_of(&self, sim_box: &SimBox, x: &Vec3) -> usize {
        let f = sim_box.fractional(x);
        let idx = [0, 1, 2].map(|d| ((f[d] * self.dims[d] as f64) as usize).min(self.dims[d] - 1));
        self.flat(idx)
    }

    fn flat(&self, idx: [usize; 3]) -> usize {
        (idx[0] * self.dims[1] + idx[1]) * self.dims[2] + idx[2]
    }

    /// Unique cells in the 3x3x3 neighborhood of `cell`, periodic.
    fn neighborhood(&self, cell: usize) -> Vec<usize> {
        let [nx, ny, nz] = self.dims;
        let (cx, cy, cz) = (cell / (ny * nz), (cell / nz) % ny, cell % nz);
        let shift = |c: usize, o: isize, n: usize| (c as isize + o).rem_euclid(n as isize) as usize;

        let mut out = Vec::with_capacity(27);
        for ox in -1..=1 {
            for oy in -1..=1 {
                for oz in -1..=1 {
                    let idx = [shift(cx, ox, nx), shift(cy, oy, ny), shift(cz, oz, nz)];
                    out.push(self.flat(idx));
                }
            }
        }
        // Small grids wrap onto themselves
        out.sort_unstable();
        out.dedup();
        out
    }
}
