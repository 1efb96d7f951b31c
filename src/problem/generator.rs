//! Materializes the local rows of the 27-point-stencil operator for one
//! [`Geometry`], together with its right-hand side and solution vectors.

use std::collections::HashMap;

use crate::geometry::Geometry;
use crate::problem::matrix::SparseMatrix;

/// The local rows of `A`, `b`, `xexact` and `x0` produced for one geometry.
pub struct GeneratedProblem {
    pub matrix: SparseMatrix,
    /// Right-hand side, row-sum definition (`b_i = sum_j A_ij * 1`).
    pub b: Vec<f64>,
    /// The exact solution the problem is constructed to have (all ones).
    pub xexact: Vec<f64>,
    /// The CG initial guess (all zeros).
    pub x0: Vec<f64>,
}

/// The 26 non-self offsets plus the self offset, enumerated z-major so the
/// self offset always lands at the middle (13th of 27) when none of the
/// neighbors fall outside the global grid.
const OFFSETS: [(i64, i64, i64); 27] = stencil_offsets();

const fn stencil_offsets() -> [(i64, i64, i64); 27] {
    let mut out = [(0i64, 0i64, 0i64); 27];
    let mut idx = 0;
    let mut sz = -1i64;
    while sz <= 1 {
        let mut sy = -1i64;
        while sy <= 1 {
            let mut sx = -1i64;
            while sx <= 1 {
                out[idx] = (sx, sy, sz);
                idx += 1;
                sx += 1;
            }
            sy += 1;
        }
        sz += 1;
    }
    out
}

/// Local linear index of an owned point within this participant's box,
/// matching the fine-grid linearization f2c injection assumes:
/// `i = ix + iy*nx + iz*nx*ny`.
#[inline]
fn local_linear(geometry: &Geometry, ix: usize, iy: usize, iz: usize) -> usize {
    ix + iy * geometry.nx + iz * geometry.nx * geometry.ny
}

/// Generate the local rows of `A`, `b`, `xexact`, `x0` for `geometry`.
pub fn generate_problem(geometry: &Geometry) -> GeneratedProblem {
    let local_num_rows = geometry.local_num_rows();

    let mut nonzeros_in_row = Vec::with_capacity(local_num_rows);
    let mut mtx_ind_l = Vec::with_capacity(local_num_rows);
    let mut matrix_values = Vec::with_capacity(local_num_rows);
    let mut mtx_ind_g = Vec::with_capacity(local_num_rows);
    let mut matrix_diagonal = Vec::with_capacity(local_num_rows);
    let mut b = Vec::with_capacity(local_num_rows);

    let mut external_map: HashMap<i64, usize> = HashMap::new();
    let mut external_local_to_global: Vec<i64> = Vec::new();

    for iz in 0..geometry.nz {
        for iy in 0..geometry.ny {
            for ix in 0..geometry.nx {
                let gix = geometry.ipx * geometry.nx + ix;
                let giy = geometry.ipy * geometry.ny + iy;
                let giz = geometry.ipz * geometry.nz + iz;

                let mut row_cols = Vec::with_capacity(27);
                let mut row_vals = Vec::with_capacity(27);
                let mut row_gcols = Vec::with_capacity(27);
                let mut diag_pos = None;
                let mut off_grid_count = 0usize;

                for &(sx, sy, sz) in OFFSETS.iter() {
                    let ngix = gix as i64 + sx;
                    let ngiy = giy as i64 + sy;
                    let ngiz = giz as i64 + sz;
                    if ngix < 0
                        || ngiy < 0
                        || ngiz < 0
                        || ngix >= geometry.gnx as i64
                        || ngiy >= geometry.gny as i64
                        || ngiz >= geometry.gnz as i64
                    {
                        off_grid_count += 1;
                        continue;
                    }
                    let (ngix, ngiy, ngiz) = (ngix as usize, ngiy as usize, ngiz as usize);
                    let global_col = ngix as i64
                        + ngiy as i64 * geometry.gnx as i64
                        + ngiz as i64 * geometry.gnx as i64 * geometry.gny as i64;

                    let is_self = sx == 0 && sy == 0 && sz == 0;

                    let owner = geometry.owner_of(ngix, ngiy, ngiz);
                    let local_col = if owner == geometry.rank {
                        let lix = ngix - geometry.ipx * geometry.nx;
                        let liy = ngiy - geometry.ipy * geometry.ny;
                        let liz = ngiz - geometry.ipz * geometry.nz;
                        local_linear(geometry, lix, liy, liz)
                    } else {
                        *external_map.entry(global_col).or_insert_with(|| {
                            let id = local_num_rows + external_local_to_global.len();
                            external_local_to_global.push(global_col);
                            id
                        })
                    };

                    if is_self {
                        diag_pos = Some(row_cols.len());
                    }
                    row_cols.push(local_col);
                    row_gcols.push(global_col);
                    // placeholder value pushed now, diagonal fixed up below
                    row_vals.push(if is_self { f64::NAN } else { -1.0 });
                }

                // Diagonal = 26 - offGridCount (26 in-grid neighbors at an
                // interior point, one fewer for each neighbor that falls
                // outside the global grid).
                let diag_value = 26.0 - off_grid_count as f64;
                let dp = diag_pos.expect("self offset is never out of grid");
                row_vals[dp] = diag_value;

                let row_sum: f64 = row_vals.iter().sum();

                nonzeros_in_row.push(row_cols.len() as u8);
                matrix_diagonal.push(dp);
                mtx_ind_l.push(row_cols);
                matrix_values.push(row_vals);
                mtx_ind_g.push(row_gcols);
                b.push(row_sum);
            }
        }
    }

    let local_num_cols = local_num_rows + external_local_to_global.len();
    let mut external_to_local: Vec<(i64, usize)> = external_map.into_iter().collect();
    external_to_local.sort_unstable_by_key(|&(g, _)| g);

    // xexact is 1 everywhere, including halo slots: the exact solution is
    // uniformly 1 at every grid point regardless of which participant owns it.
    let xexact = vec![1.0; local_num_cols];
    let x0 = vec![0.0; local_num_cols];
    b.resize(local_num_cols, 0.0);

    let matrix = SparseMatrix {
        local_num_rows,
        local_num_cols,
        total_num_rows: (geometry.gnx * geometry.gny * geometry.gnz) as u64,
        total_num_nonzeros: nonzeros_in_row.iter().map(|&n| n as u64).sum(),
        nonzeros_in_row,
        mtx_ind_l,
        matrix_values,
        mtx_ind_g: Some(mtx_ind_g),
        matrix_diagonal,
        external_to_local,
        external_local_to_global,
        halo: None,
        mg_data: None,
    };

    GeneratedProblem {
        matrix,
        b,
        xexact,
        x0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_row_has_26_coefficients_of_minus_one() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let problem = generate_problem(&g);
        // Point (8,8,8) is interior for a 16^3 single-participant grid.
        let i = local_linear(&g, 8, 8, 8);
        assert_eq!(problem.matrix.nonzeros_in_row[i], 27);
        assert_eq!(problem.matrix.diagonal_value(i), 26.0);
        let off_diag_count = problem.matrix.matrix_values[i]
            .iter()
            .filter(|&&v| v == -1.0)
            .count();
        assert_eq!(off_diag_count, 26);
    }

    #[test]
    fn corner_row_has_8_nonzeros() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let problem = generate_problem(&g);
        let i = local_linear(&g, 0, 0, 0);
        assert_eq!(problem.matrix.nonzeros_in_row[i], 8);
        assert_eq!(problem.matrix.diagonal_value(i), 26.0 - 19.0);
    }

    #[test]
    fn single_participant_has_no_external_columns() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let problem = generate_problem(&g);
        assert_eq!(problem.matrix.local_num_cols, problem.matrix.local_num_rows);
        assert!(problem.matrix.external_to_local.is_empty());
    }

    #[test]
    fn two_participants_reference_each_other_as_external() {
        let g0 = Geometry::new(0, 2, 16, 16, 16, None).unwrap();
        let problem0 = generate_problem(&g0);
        assert!(problem0.matrix.local_num_cols > problem0.matrix.local_num_rows);
        // Every external column must resolve back via binary search.
        for &(g, l) in &problem0.matrix.external_to_local {
            assert_eq!(problem0.matrix.local_id_for_external(g), Some(l));
        }
    }

    #[test]
    fn total_num_rows_matches_global_volume() {
        let g = Geometry::new(0, 4, 32, 24, 16, None).unwrap();
        let problem = generate_problem(&g);
        assert_eq!(problem.matrix.total_num_rows, 32 * 24 * 16 * 4);
    }
}
