//! The structured sparse operator produced for one multigrid level.

use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::halo::HaloPlan;
use crate::multigrid::MgData;

/// One level's local rows of the 27-point-stencil operator.
///
/// Row storage is ragged (`Vec<Vec<_>>`) rather than a single CSR blob
/// because construction, reference SPMV and reference SYMGS all walk rows
/// one at a time — the natural shape for hand-assembling a stencil matrix.
/// [`SparseMatrix::to_csr`] is provided for callers that want contiguous
/// storage.
pub struct SparseMatrix {
    /// Rows owned by this participant.
    pub local_num_rows: usize,
    /// Owned rows plus distinct off-process columns referenced by them.
    /// Finalized once halo planning has interned every foreign column.
    pub local_num_cols: usize,
    /// Total rows across all participants (== product of global dims).
    pub total_num_rows: u64,
    /// Total nonzeros across all participants; filled by
    /// [`SparseMatrix::finalize_totals`].
    pub total_num_nonzeros: u64,

    /// Per-row nonzero count, in `[8, 27]`.
    pub nonzeros_in_row: Vec<u8>,
    /// Per-row local column indices.
    pub mtx_ind_l: Vec<Vec<usize>>,
    /// Per-row coefficients, parallel to `mtx_ind_l`.
    pub matrix_values: Vec<Vec<f64>>,
    /// Per-row global column indices. Used only during halo planning and
    /// dropped once the halo plan is built.
    pub mtx_ind_g: Option<Vec<Vec<i64>>>,
    /// Index into row `i`'s arrays where the diagonal entry lives.
    pub matrix_diagonal: Vec<usize>,

    /// Sorted (global id, local id) pairs for every foreign column
    /// referenced by a local row. Binary-searched, rarely inserted into —
    /// the flat-array replacement for a hash map described in the design
    /// notes.
    pub external_to_local: Vec<(i64, usize)>,
    /// `external_local_to_global[local_id - local_num_rows]` is the global
    /// id assigned to that halo slot.
    pub external_local_to_global: Vec<i64>,

    /// Send/receive schedule for halo exchange. `None` until halo planning
    /// runs.
    pub halo: Option<HaloPlan>,
    /// Coarse-level linkage. `None` at the coarsest level.
    pub mg_data: Option<Box<MgData>>,
}

impl SparseMatrix {
    /// Binary-search the foreign-column table for `global`.
    pub fn local_id_for_external(&self, global: i64) -> Option<usize> {
        self.external_to_local
            .binary_search_by_key(&global, |&(g, _)| g)
            .ok()
            .map(|idx| self.external_to_local[idx].1)
    }

    /// Value of row `i`'s diagonal entry.
    #[inline]
    pub fn diagonal_value(&self, i: usize) -> f64 {
        self.matrix_values[i][self.matrix_diagonal[i]]
    }

    /// Sum nonzero counts across all participants via `transport` and
    /// record the result. No-op (keeps the locally-known count) when run
    /// with a single participant.
    pub fn finalize_totals(&mut self, transport: &dyn crate::transport::Transport) {
        let local_nnz: u64 = self.nonzeros_in_row.iter().map(|&n| n as u64).sum();
        self.total_num_nonzeros = if transport.size() == 1 {
            local_nnz
        } else {
            transport.all_reduce_sum(local_nnz as f64).round() as u64
        };
    }

    /// Convert to a CSR matrix over owned rows only (columns are the local
    /// column space, including halo slots) — useful for cross-checking
    /// against `nalgebra_sparse` routines and for the validator.
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.local_num_rows, self.local_num_cols);
        for (row, (cols, vals)) in self.mtx_ind_l.iter().zip(self.matrix_values.iter()).enumerate() {
            for (&col, &val) in cols.iter().zip(vals.iter()) {
                coo.push(row, col, val);
            }
        }
        CsrMatrix::from(&coo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::problem::generator::generate_problem;

    #[test]
    fn diagonal_is_positive_everywhere() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let problem = generate_problem(&g);
        for i in 0..problem.matrix.local_num_rows {
            assert!(problem.matrix.diagonal_value(i) > 0.0);
        }
    }

    #[test]
    fn row_sum_matches_b_with_xexact_all_ones() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let problem = generate_problem(&g);
        for i in 0..problem.matrix.local_num_rows {
            let row_sum: f64 = problem.matrix.matrix_values[i].iter().sum();
            assert!((row_sum - problem.b[i]).abs() < 1e-12);
        }
    }
}
