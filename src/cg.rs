//! The preconditioned Conjugate Gradient driver.
//!
//! Implements the textbook PCG recurrence with the multigrid V-cycle as the
//! preconditioner `M`: `r0 = b - Ax0`, then for each iteration solve `Mz =
//! r`, update the search direction via Fletcher-Reeves, line-search `alpha`
//! from `p . Ap`, and update `x`, `r`. Halo exchange runs before every SPMV
//! and before/within every SYMGS sweep; DOT products are summed globally via
//! `Transport::all_reduce_sum`.

use crate::error::{HpcgError, HpcgResult};
use crate::kernels::{optimized, reference};
use crate::multigrid::{mgv_cycle, Hierarchy};
use crate::timers::{Phase, PhaseTimers};
use crate::transport::Transport;

/// Outcome of a single CG run.
#[derive(Debug, Clone)]
pub struct CgResult {
    pub iterations: usize,
    pub final_residual_norm: f64,
    /// `final_residual_norm / initial_residual_norm`.
    pub relative_residual: f64,
    pub converged: bool,
    /// Residual norm at the end of each iteration, `residual_trace[0]` being
    /// the initial residual before any iteration ran.
    pub residual_trace: Vec<f64>,
}

/// Run preconditioned CG against `hierarchy.levels[0]`, solving `Ax = b` in
/// place on `x`.
///
/// `tolerance <= 0.0` runs the full `max_iterations` unconditionally (the
/// benchmark's official, reference-timed mode); a positive tolerance stops
/// early once the relative residual drops below it (used for convergence
/// testing by the validator).
pub fn cg(
    hierarchy: &mut Hierarchy,
    transport: &dyn Transport,
    b: &[f64],
    x: &mut [f64],
    max_iterations: usize,
    tolerance: f64,
    do_preconditioning: bool,
    timers: &mut PhaseTimers,
) -> HpcgResult<CgResult> {
    let matrix_len = hierarchy.levels[0].matrix.local_num_cols;
    let local_num_rows = hierarchy.levels[0].matrix.local_num_rows;

    let mut r = vec![0.0; matrix_len];
    let mut z = vec![0.0; matrix_len];
    let mut p = vec![0.0; matrix_len];
    let mut ap = vec![0.0; matrix_len];

    {
        let _t = timers.scoped(Phase::HaloExchange);
        crate::halo::exchange_halo(x, &hierarchy.levels[0].matrix, transport, 0);
    }
    {
        let _t = timers.scoped(Phase::Spmv);
        optimized::spmv(&hierarchy.levels[0].matrix, x, &mut ap);
    }
    for i in 0..local_num_rows {
        r[i] = b[i] - ap[i];
    }

    let initial_residual_norm = global_norm(&r, local_num_rows, transport);
    if initial_residual_norm == 0.0 {
        return Ok(CgResult {
            iterations: 0,
            final_residual_norm: 0.0,
            relative_residual: 0.0,
            converged: true,
            residual_trace: vec![0.0],
        });
    }

    let mut residual_trace = vec![initial_residual_norm];
    let mut old_r_dot_z = 0.0;
    let mut iteration = 0;
    let mut relative_residual = 1.0;

    while iteration < max_iterations {
        iteration += 1;

        if do_preconditioning {
            hierarchy.levels[0].r[..local_num_rows].copy_from_slice(&r[..local_num_rows]);
            mgv_cycle(&mut hierarchy.levels, 0, transport);
            z[..local_num_rows].copy_from_slice(&hierarchy.levels[0].x[..local_num_rows]);
        } else {
            z[..local_num_rows].copy_from_slice(&r[..local_num_rows]);
        }

        let r_dot_z = {
            let _t = timers.scoped(Phase::WaxpbyDot);
            global_dot(&r, &z, local_num_rows, transport)
        };

        {
            let _t = timers.scoped(Phase::WaxpbyDot);
            if iteration == 1 {
                p[..local_num_rows].copy_from_slice(&z[..local_num_rows]);
            } else {
                let beta = r_dot_z / old_r_dot_z;
                optimized::waxpby(1.0, &z, beta, &p, &mut p, local_num_rows);
            }
        }
        old_r_dot_z = r_dot_z;

        {
            let _t = timers.scoped(Phase::HaloExchange);
            crate::halo::exchange_halo(&mut p, &hierarchy.levels[0].matrix, transport, 0);
        }
        {
            let _t = timers.scoped(Phase::Spmv);
            optimized::spmv(&hierarchy.levels[0].matrix, &p, &mut ap);
        }

        let p_dot_ap = global_dot(&p, &ap, local_num_rows, transport);
        if p_dot_ap <= 0.0 {
            return Err(HpcgError::NonPositiveDefinite {
                iteration,
                value: p_dot_ap,
            });
        }
        let alpha = r_dot_z / p_dot_ap;

        {
            let _t = timers.scoped(Phase::WaxpbyDot);
            optimized::waxpby(1.0, x, alpha, &p, x, local_num_rows);
            optimized::waxpby(1.0, &r, -alpha, &ap, &mut r, local_num_rows);
        }

        let residual_norm = global_norm(&r, local_num_rows, transport);
        relative_residual = residual_norm / initial_residual_norm;
        residual_trace.push(residual_norm);
        if tolerance > 0.0 && relative_residual <= tolerance {
            return Ok(CgResult {
                iterations: iteration,
                final_residual_norm: residual_norm,
                relative_residual,
                converged: true,
                residual_trace,
            });
        }
    }

    let final_residual_norm = *residual_trace.last().unwrap();
    Ok(CgResult {
        iterations: iteration,
        final_residual_norm,
        relative_residual,
        converged: tolerance <= 0.0 || relative_residual <= tolerance,
        residual_trace,
    })
}

fn global_dot(x: &[f64], y: &[f64], local_num_rows: usize, transport: &dyn Transport) -> f64 {
    let local = reference::dot_local(x, y, local_num_rows);
    if transport.size() == 1 {
        local
    } else {
        transport.all_reduce_sum(local)
    }
}

fn global_norm(r: &[f64], local_num_rows: usize, transport: &dyn Transport) -> f64 {
    global_dot(r, r, local_num_rows, transport).sqrt()
}
