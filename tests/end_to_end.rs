//! End-to-end scenarios spanning multiple modules: multi-participant
//! geometry, halo exchange, multigrid construction and a full CG solve.

use hpcg_bench::prelude::*;

#[test]
fn single_participant_cg_converges_in_fixed_iteration_budget() {
    let geometry = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
    let transports = make_local_transports(1);
    let mut hierarchy = MultigridBuilder::build(&geometry, transports[0].as_ref()).unwrap();
    let problem = generate_problem(&geometry);

    let mut x = problem.x0.clone();
    let mut timers = PhaseTimers::new();
    let result = cg(
        &mut hierarchy,
        transports[0].as_ref(),
        &problem.b,
        &mut x,
        50,
        1e-9,
        true,
        &mut timers,
    )
    .unwrap();

    assert!(result.converged);
    assert!(result.iterations <= 50);
}

#[test]
fn eight_participants_2x2x2_halo_counts_match_cube_neighborhood() {
    let results = run_participants(8, |t| {
        let geometry = Geometry::new(t.rank(), t.size(), 16, 16, 16, None).unwrap();
        assert_eq!((geometry.npx, geometry.npy, geometry.npz), (2, 2, 2));
        let mut problem = generate_problem(&geometry);
        build_halo_plan(&geometry, &mut problem.matrix, t.as_ref(), 0);
        let plan = problem.matrix.halo.clone().unwrap();
        (plan.number_of_send_neighbors(), plan.number_of_recv_neighbors())
    });
    // Every participant in a 2x2x2 process grid has exactly 7 neighbors
    // (the rest of the cube).
    for (send, recv) in results {
        assert_eq!(send, 7);
        assert_eq!(recv, 7);
    }
}

#[test]
fn four_participants_2x2x1_total_num_rows_is_global_volume() {
    let results = run_participants(4, |t| {
        let geometry = Geometry::new(t.rank(), t.size(), 16, 16, 16, None).unwrap();
        let problem = generate_problem(&geometry);
        problem.matrix.total_num_rows
    });
    for total in results {
        assert_eq!(total, 16 * 16 * 16 * 4);
    }
}

#[test]
fn symmetry_probe_holds_within_tolerance_on_multi_participant_run() {
    let results = run_participants(2, |t| {
        let geometry = Geometry::new(t.rank(), t.size(), 16, 16, 16, None).unwrap();
        let mut hierarchy = MultigridBuilder::build(&geometry, t.as_ref()).unwrap();
        hpcg_bench::validator::test_symmetry(&mut hierarchy, t.as_ref())
    });
    for report in results {
        assert!(report.passed(), "{:?}", report);
    }
}

#[test]
fn norms_probe_is_repeatable_across_trials() {
    let geometry = Geometry::new(0, 1, 8, 8, 8, None).unwrap();
    let transports = make_local_transports(1);
    let mut hierarchy = MultigridBuilder::build(&geometry, transports[0].as_ref()).unwrap();
    let problem = generate_problem(&geometry);
    let repeatable =
        hpcg_bench::validator::test_norms(&mut hierarchy, transports[0].as_ref(), &problem.b, 20, 4).unwrap();
    assert!(repeatable);
}

#[test]
fn four_level_coarsening_row_count_hierarchy_from_32cubed() {
    let geometry = Geometry::new(0, 1, 32, 32, 32, None).unwrap();
    let transports = make_local_transports(1);
    let hierarchy = MultigridBuilder::build(&geometry, transports[0].as_ref()).unwrap();
    let expected = [32768usize, 4096, 512, 64];
    for (level, &rows) in hierarchy.levels.iter().zip(expected.iter()) {
        assert_eq!(level.matrix.local_num_rows, rows);
    }
}
