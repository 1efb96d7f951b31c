//! `hpcg-bench`: the CLI driver binary. Parses configuration, bootstraps
//! participants, generates the problem, runs the validator, then a timed
//! CG solve, and writes a YAML report.

use std::process::ExitCode;

use hpcg_bench::config::RunConfig;
use hpcg_bench::error::HpcgResult;
use hpcg_bench::geometry::Geometry;
use hpcg_bench::multigrid::MultigridBuilder;
use hpcg_bench::problem::generate_problem;
use hpcg_bench::report::{GeometrySummary, PhaseTimingsSummary, Report, ValidationSummary};
use hpcg_bench::timers::{Phase, PhaseTimers};
use hpcg_bench::transport::{run_participants, Transport};
use hpcg_bench::validator::{check_problem, test_cg, test_norms, test_symmetry};
use hpcg_bench::{cg, multigrid};

/// Fixed iteration count used for non-timed (`rt == 0`) runs.
const FIXED_ITERATIONS: usize = 50;
/// Trials for the norms-repeatability probe.
const NORMS_TRIALS: usize = 3;

fn main() -> ExitCode {
    env_logger::init();

    let config = match RunConfig::from_args() {
        Ok(c) => c,
        Err(e) => {
            log::error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "starting run: local box {}x{}x{}, {} participant(s)",
        config.nx,
        config.ny,
        config.nz,
        config.participants
    );

    let results = run_participants(config.participants, move |transport| run_one(&config, transport.as_ref()));

    if results.iter().any(|r| r.is_err()) {
        for r in &results {
            if let Err(e) = r {
                log::error!("participant failed: {e}");
            }
        }
        return ExitCode::FAILURE;
    }

    if let Some(Ok(report)) = results.into_iter().next() {
        match report.to_yaml() {
            Ok(yaml) => println!("{yaml}"),
            Err(e) => {
                log::error!("failed to serialize report: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn run_one(config: &RunConfig, transport: &dyn Transport) -> HpcgResult<Report> {
    let mut timers = PhaseTimers::new();

    let geometry = {
        let _t = timers.scoped(Phase::Setup);
        match config.explicit_process_grid {
            Some((npx, npy, npz)) => explicit_grid_geometry(transport, config, npx, npy, npz)?,
            None => Geometry::with_aspect_bound(
                transport.rank(),
                transport.size(),
                config.nx,
                config.ny,
                config.nz,
                config.pencil,
                config.max_aspect_ratio,
            )?,
        }
    };

    log::debug!(
        "rank {}: process grid {:?}, local box {}x{}x{}",
        geometry.rank,
        (geometry.npx, geometry.npy, geometry.npz),
        geometry.nx,
        geometry.ny,
        geometry.nz
    );

    // Vectors (b, xexact, x0) for the finest level; MultigridBuilder builds
    // the matrix hierarchy itself (with halo plans and mg_data attached) and
    // does not retain these.
    let problem = {
        let _t = timers.scoped(Phase::Setup);
        generate_problem(&geometry)
    };

    let mut hierarchy = {
        let _t = timers.scoped(Phase::MgBuild);
        MultigridBuilder::build(&geometry, transport)?
    };

    log::info!("running validation probes");
    let check = check_problem(&hierarchy.levels[0].matrix, &problem.b);
    let symmetry = test_symmetry(&mut hierarchy, transport);
    let cg_trial = test_cg(&mut hierarchy, transport, &problem.b, FIXED_ITERATIONS)?;
    let norms_repeatable = test_norms(&mut hierarchy, transport, &problem.b, FIXED_ITERATIONS, NORMS_TRIALS)?;

    log::info!("running timed CG solve");
    let mut x = problem.x0.clone();
    let tolerance = if config.runtime_seconds > 0 { 0.0 } else { 1e-9 };
    let result = {
        let _t = timers.scoped(Phase::Total);
        cg::cg(
            &mut hierarchy,
            transport,
            &problem.b,
            &mut x,
            FIXED_ITERATIONS,
            tolerance,
            true,
            &mut timers,
        )?
    };

    let total_flops = estimate_flops(&hierarchy, result.iterations);
    let gflops = total_flops / timers.total(Phase::Total).as_secs_f64().max(1e-12) / 1e9;

    Ok(Report {
        geometry: GeometrySummary::from(&geometry),
        iterations: result.iterations,
        final_relative_residual: result.relative_residual,
        residual_trace: result.residual_trace,
        timings: PhaseTimingsSummary::from(&timers),
        validation: ValidationSummary {
            check_problem_passed: check.passed(),
            operator_symmetry_passed: symmetry.operator_symmetry_error < 1e-8,
            preconditioner_symmetry_passed: symmetry.preconditioner_symmetry_error < 1e-8,
            cg_trial_passed: cg_trial.passed(),
            norms_repeatable,
        },
        gflops,
    })
}

fn explicit_grid_geometry(
    transport: &dyn Transport,
    config: &RunConfig,
    npx: usize,
    npy: usize,
    npz: usize,
) -> HpcgResult<Geometry> {
    if npx * npy * npz != transport.size() {
        return Err(hpcg_bench::error::HpcgError::ParticipantCountMismatch {
            expected: npx * npy * npz,
            actual: transport.size(),
        });
    }
    Geometry::with_explicit_process_grid(
        transport.rank(),
        transport.size(),
        npx,
        npy,
        npz,
        config.nx,
        config.ny,
        config.nz,
        config.pencil,
    )
}

/// Rough flop count per CG iteration: one SPMV (2*nnz), one SYMGS V-cycle
/// (dominated by repeated SPMV-equivalent sweeps across all multigrid
/// levels), and a handful of O(n) vector ops.
fn estimate_flops(hierarchy: &multigrid::Hierarchy, iterations: usize) -> f64 {
    let finest = &hierarchy.levels[0].matrix;
    let spmv_flops = 2.0 * finest.total_num_nonzeros as f64;
    let mg_flops: f64 = hierarchy
        .levels
        .iter()
        .map(|lvl| 4.0 * lvl.matrix.total_num_nonzeros as f64)
        .sum();
    let vector_flops = 6.0 * finest.total_num_rows as f64;
    (spmv_flops + mg_flops + vector_flops) * iterations as f64
}
