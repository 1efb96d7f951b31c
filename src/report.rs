//! YAML run report, written by participant 0 once a run completes.

use std::time::Duration;

use serde::Serialize;

use crate::error::HpcgResult;
use crate::geometry::Geometry;
use crate::timers::{Phase, PhaseTimers};

#[derive(Debug, Serialize)]
pub struct GeometrySummary {
    pub participants: usize,
    pub process_grid: (usize, usize, usize),
    pub local_dims: (usize, usize, usize),
    pub global_dims: (usize, usize, usize),
}

impl From<&Geometry> for GeometrySummary {
    fn from(g: &Geometry) -> Self {
        GeometrySummary {
            participants: g.size,
            process_grid: (g.npx, g.npy, g.npz),
            local_dims: (g.nx, g.ny, g.nz),
            global_dims: (g.gnx, g.gny, g.gnz),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PhaseTimingsSummary {
    pub setup_seconds: f64,
    pub spmv_seconds: f64,
    pub symgs_seconds: f64,
    pub waxpby_dot_seconds: f64,
    pub mg_build_seconds: f64,
    pub halo_exchange_seconds: f64,
    pub total_seconds: f64,
}

impl From<&PhaseTimers> for PhaseTimingsSummary {
    fn from(t: &PhaseTimers) -> Self {
        let secs = |d: Duration| d.as_secs_f64();
        PhaseTimingsSummary {
            setup_seconds: secs(t.total(Phase::Setup)),
            spmv_seconds: secs(t.total(Phase::Spmv)),
            symgs_seconds: secs(t.total(Phase::Symgs)),
            waxpby_dot_seconds: secs(t.total(Phase::WaxpbyDot)),
            mg_build_seconds: secs(t.total(Phase::MgBuild)),
            halo_exchange_seconds: secs(t.total(Phase::HaloExchange)),
            total_seconds: secs(t.total(Phase::Total)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationSummary {
    pub check_problem_passed: bool,
    pub operator_symmetry_passed: bool,
    pub preconditioner_symmetry_passed: bool,
    pub cg_trial_passed: bool,
    pub norms_repeatable: bool,
}

/// A complete run's findings, serialized to YAML for the operator.
#[derive(Debug, Serialize)]
pub struct Report {
    pub geometry: GeometrySummary,
    pub iterations: usize,
    pub final_relative_residual: f64,
    pub residual_trace: Vec<f64>,
    pub timings: PhaseTimingsSummary,
    pub validation: ValidationSummary,
    /// Giga-floating-point-operations per second, the benchmark's official
    /// figure of merit: total floating point ops across the run divided by
    /// total elapsed seconds.
    pub gflops: f64,
}

impl Report {
    pub fn to_yaml(&self) -> HpcgResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    #[test]
    fn report_serializes_to_yaml() {
        let g = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
        let report = Report {
            geometry: GeometrySummary::from(&g),
            iterations: 10,
            final_relative_residual: 1e-9,
            residual_trace: vec![1.0, 0.1, 0.01],
            timings: PhaseTimingsSummary::from(&PhaseTimers::new()),
            validation: ValidationSummary {
                check_problem_passed: true,
                operator_symmetry_passed: true,
                preconditioner_symmetry_passed: true,
                cg_trial_passed: true,
                norms_repeatable: true,
            },
            gflops: 1.23,
        };
        let yaml = report.to_yaml().unwrap();
        assert!(yaml.contains("iterations: 10"));
        assert!(yaml.contains("gflops: 1.23"));
    }
}
