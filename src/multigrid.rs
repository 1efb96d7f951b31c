//! Geometric multigrid hierarchy and the V-cycle preconditioner built on it.
//!
//! Four levels (the finest plus three coarsenings by a factor of two per
//! axis), each carrying its own [`Geometry`], [`SparseMatrix`] and
//! [`HaloPlan`]. `MGVCycle` recurses fine-to-coarse: pre-smooth, restrict
//! the residual, recurse (or exact-solve at the bottom), prolong the
//! correction back, post-smooth.

use crate::geometry::Geometry;
use crate::halo::{build_halo_plan, exchange_halo};
use crate::kernels::color::Coloring;
use crate::kernels::{optimized, reference};
use crate::problem::{generate_problem, SparseMatrix};
use crate::transport::Transport;

/// Number of pre/post SYMGS sweeps applied at every level but the coarsest.
pub const SMOOTHER_STEPS: usize = 1;
/// Levels in the hierarchy, finest first.
pub const NUM_LEVELS: usize = 4;

/// Per-level bookkeeping needed by the V-cycle: the fine-to-coarse
/// injection table and scratch vectors sized for this level's coarse
/// neighbor (empty / absent at the coarsest level).
pub struct MgData {
    /// `f2c[k]` is this level's local row index injected into coarse row k.
    pub f2c: Vec<usize>,
}

/// One level of the multigrid hierarchy.
pub struct MgLevel {
    pub geometry: Geometry,
    pub matrix: SparseMatrix,
    pub coloring: Coloring,
    /// Scratch residual/correction vectors, sized to this level's
    /// `local_num_cols`. Reused across V-cycles to avoid reallocating.
    pub r: Vec<f64>,
    pub x: Vec<f64>,
}

/// The full hierarchy plus the transports each level communicates over.
pub struct Hierarchy {
    pub levels: Vec<MgLevel>,
}

/// Build the [`NUM_LEVELS`]-level hierarchy from a finest `geometry`,
/// generating each coarser problem and halo plan in turn and wiring
/// `mg_data` (f2c) from each level into the next-finer one.
pub struct MultigridBuilder;

impl MultigridBuilder {
    pub fn build(finest: &Geometry, transport: &dyn Transport) -> crate::error::HpcgResult<Hierarchy> {
        let mut geometries = vec![finest.clone()];
        for _ in 1..NUM_LEVELS {
            geometries.push(geometries.last().unwrap().coarsen()?);
        }

        let mut levels = Vec::with_capacity(NUM_LEVELS);
        for (level_idx, geometry) in geometries.iter().enumerate() {
            let mut problem = generate_problem(geometry);
            build_halo_plan(geometry, &mut problem.matrix, transport, level_idx as u8);
            problem.matrix.finalize_totals(transport);
            let coloring = Coloring::build(geometry);
            let r = vec![0.0; problem.matrix.local_num_cols];
            let x = vec![0.0; problem.matrix.local_num_cols];
            levels.push(MgLevel {
                geometry: geometry.clone(),
                matrix: problem.matrix,
                coloring,
                r,
                x,
            });
        }

        for level_idx in 0..NUM_LEVELS - 1 {
            let fine_geometry = &levels[level_idx].geometry;
            let coarse_geometry = &levels[level_idx + 1].geometry;
            let f2c = build_f2c(fine_geometry, coarse_geometry);
            levels[level_idx].matrix.mg_data = Some(Box::new(MgData { f2c }));
        }

        Ok(Hierarchy { levels })
    }
}

/// `f2c[k]` is the fine-level local row index of coarse row `k`: the fine
/// point at twice the coarse point's coordinates in every axis.
fn build_f2c(fine: &Geometry, coarse: &Geometry) -> Vec<usize> {
    let mut f2c = Vec::with_capacity(coarse.local_num_rows());
    for cz in 0..coarse.nz {
        for cy in 0..coarse.ny {
            for cx in 0..coarse.nx {
                let fx = 2 * cx;
                let fy = 2 * cy;
                let fz = 2 * cz;
                f2c.push(fx + fy * fine.nx + fz * fine.nx * fine.ny);
            }
        }
    }
    f2c
}

/// Apply the multigrid V-cycle preconditioner: `x <- M^-1 r` at
/// `levels[level]`, recursing toward the coarsest level and back.
///
/// Preconditions: `levels[level].r[0..local_num_rows]` holds the input
/// residual (halo slots are not read). Postcondition: `levels[level].x`
/// holds the correction, including a refreshed halo.
pub fn mgv_cycle(levels: &mut [MgLevel], level: usize, transport: &dyn Transport) {
    if level == levels.len() - 1 {
        coarsest_solve(levels, level, transport);
        return;
    }

    {
        let lvl = &mut levels[level];
        lvl.x.iter_mut().for_each(|v| *v = 0.0);
        for _ in 0..SMOOTHER_STEPS {
            optimized::symgs(&lvl.matrix, &lvl.r, &mut lvl.x, &lvl.coloring);
            exchange_halo(&mut lvl.x, &lvl.matrix, transport, level as u8);
        }
    }

    let residual = compute_fine_residual(levels, level, transport);
    restrict_into_coarse(levels, level, &residual);

    mgv_cycle(levels, level + 1, transport);

    prolong_from_coarse(levels, level);

    let lvl = &mut levels[level];
    for _ in 0..SMOOTHER_STEPS {
        optimized::symgs(&lvl.matrix, &lvl.r, &mut lvl.x, &lvl.coloring);
        exchange_halo(&mut lvl.x, &lvl.matrix, transport, level as u8);
    }
}

fn compute_fine_residual(levels: &mut [MgLevel], level: usize, _transport: &dyn Transport) -> Vec<f64> {
    let lvl = &levels[level];
    let mut ax = vec![0.0; lvl.matrix.local_num_cols];
    reference::spmv(&lvl.matrix, &lvl.x, &mut ax);
    (0..lvl.matrix.local_num_rows).map(|i| lvl.r[i] - ax[i]).collect()
}

fn restrict_into_coarse(levels: &mut [MgLevel], level: usize, residual_fine: &[f64]) {
    let f2c = levels[level]
        .matrix
        .mg_data
        .as_ref()
        .expect("non-coarsest level always has mg_data")
        .f2c
        .clone();
    let coarse = &mut levels[level + 1];
    reference::restrict(residual_fine, &f2c, &mut coarse.r);
}

fn prolong_from_coarse(levels: &mut [MgLevel], level: usize) {
    let f2c = levels[level]
        .matrix
        .mg_data
        .as_ref()
        .expect("non-coarsest level always has mg_data")
        .f2c
        .clone();
    let coarse_x = levels[level + 1].x.clone();
    let lvl = &mut levels[level];
    reference::prolong(&mut lvl.x, &coarse_x, &f2c);
}

/// At the coarsest level the V-cycle bottoms out in extra SYMGS sweeps
/// rather than a direct solve, matching the benchmark's reference design
/// (an exact coarse solve is not required for M to remain SPD).
fn coarsest_solve(levels: &mut [MgLevel], level: usize, transport: &dyn Transport) {
    let lvl = &mut levels[level];
    lvl.x.iter_mut().for_each(|v| *v = 0.0);
    for _ in 0..SMOOTHER_STEPS {
        optimized::symgs(&lvl.matrix, &lvl.r, &mut lvl.x, &lvl.coloring);
        exchange_halo(&mut lvl.x, &lvl.matrix, transport, level as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::make_local_transports;

    #[test]
    fn hierarchy_has_four_levels_with_correct_row_counts() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let transports = make_local_transports(1);
        let hierarchy = MultigridBuilder::build(&g, transports[0].as_ref()).unwrap();
        assert_eq!(hierarchy.levels.len(), NUM_LEVELS);
        let expected = [4096usize, 512, 64, 8];
        for (level, &rows) in hierarchy.levels.iter().zip(expected.iter()) {
            assert_eq!(level.matrix.local_num_rows, rows);
        }
    }

    #[test]
    fn f2c_maps_into_range_of_fine_level() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let transports = make_local_transports(1);
        let hierarchy = MultigridBuilder::build(&g, transports[0].as_ref()).unwrap();
        let fine_rows = hierarchy.levels[0].matrix.local_num_rows;
        let f2c = &hierarchy.levels[0].matrix.mg_data.as_ref().unwrap().f2c;
        assert_eq!(f2c.len(), hierarchy.levels[1].matrix.local_num_rows);
        assert!(f2c.iter().all(|&i| i < fine_rows));
    }

    #[test]
    fn v_cycle_reduces_residual_norm() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let transports = make_local_transports(1);
        let mut hierarchy = MultigridBuilder::build(&g, transports[0].as_ref()).unwrap();

        let problem = generate_problem(&g);
        hierarchy.levels[0].r[..problem.matrix.local_num_rows]
            .copy_from_slice(&problem.b[..problem.matrix.local_num_rows]);

        mgv_cycle(&mut hierarchy.levels, 0, transports[0].as_ref());

        let lvl = &hierarchy.levels[0];
        let mut ax = vec![0.0; lvl.matrix.local_num_cols];
        reference::spmv(&lvl.matrix, &lvl.x, &mut ax);
        let residual_norm: f64 = (0..lvl.matrix.local_num_rows)
            .map(|i| (lvl.r[i] - ax[i]).powi(2))
            .sum::<f64>()
            .sqrt();
        let rhs_norm: f64 = problem.b[..lvl.matrix.local_num_rows]
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt();
        assert!(residual_norm < rhs_norm);
    }
}
