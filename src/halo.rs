//! Builds the send/receive schedule for boundary exchange and performs the
//! exchange itself.
//!
//! Setup round-trips exactly once per neighbor: a participant sends the
//! owner the list of global ids it wants (in ascending local-halo-id
//! order); the owner translates each to its own local row index *in the
//! order received* and stores the result as `elements_to_send`. No reply is
//! needed — both sides already agree on the correspondence because message
//! order is preserved end to end. After setup, exchange is purely
//! index-driven, as specified.

use std::collections::BTreeMap;

use crate::geometry::Geometry;
use crate::problem::SparseMatrix;
use crate::transport::{compose_tag, Transport, PHASE_HALO_SIZE, PHASE_HALO_VALUES, PHASE_HALO_WANT_IDS};

/// Participants this one sends rows to.
#[derive(Debug, Clone)]
pub struct NeighborSend {
    pub rank: usize,
    /// Local row indices, in the order the neighbor requested them.
    pub elements_to_send: Vec<usize>,
}

/// Participants this one receives halo values from.
#[derive(Debug, Clone)]
pub struct NeighborRecv {
    pub rank: usize,
    /// Halo-slot local indices (`>= local_num_rows`) to fill, in the order
    /// this participant will request (and the neighbor will reply).
    pub local_ids: Vec<usize>,
}

/// The halo exchange schedule for one matrix level.
#[derive(Debug, Clone, Default)]
pub struct HaloPlan {
    pub send: Vec<NeighborSend>,
    pub recv: Vec<NeighborRecv>,
}

impl HaloPlan {
    pub fn number_of_send_neighbors(&self) -> usize {
        self.send.len()
    }

    pub fn number_of_recv_neighbors(&self) -> usize {
        self.recv.len()
    }
}

fn global_to_coords(geometry: &Geometry, g: i64) -> (usize, usize, usize) {
    let gnx = geometry.gnx as i64;
    let gny = geometry.gny as i64;
    let gix = g % gnx;
    let giy = (g / gnx) % gny;
    let giz = g / (gnx * gny);
    (gix as usize, giy as usize, giz as usize)
}

/// Build the halo plan for `matrix` at process-grid level described by
/// `geometry`, communicating over `transport`, and store it on the matrix.
/// `matrix.mtx_ind_g` is dropped once the plan is built, matching the
/// spec's "discarded after halo setup".
pub fn build_halo_plan(geometry: &Geometry, matrix: &mut SparseMatrix, transport: &dyn Transport, level: u8) {
    if transport.size() == 1 {
        matrix.halo = Some(HaloPlan::default());
        matrix.mtx_ind_g = None;
        return;
    }

    // Bucket the external columns we reference by owning rank, preserving
    // the ascending local-id (encounter) order within each bucket.
    let mut recv_buckets: BTreeMap<usize, Vec<(i64, usize)>> = BTreeMap::new();
    for (offset, &global) in matrix.external_local_to_global.iter().enumerate() {
        let local_id = matrix.local_num_rows + offset;
        let (gix, giy, giz) = global_to_coords(geometry, global);
        let owner = geometry.owner_of(gix, giy, giz);
        recv_buckets.entry(owner).or_default().push((global, local_id));
    }

    let neighbors = geometry.neighbor_ranks();

    // Phase 1: every participant tells every geometric neighbor how many
    // (and which) global ids it wants. Non-blocking sends, so this never
    // deadlocks regardless of neighbor-set asymmetry.
    for &r in &neighbors {
        let empty = Vec::new();
        let wanted = recv_buckets.get(&r).unwrap_or(&empty);
        transport.send(r, compose_tag(PHASE_HALO_SIZE, level), &[wanted.len() as f64]);
        if !wanted.is_empty() {
            let ids: Vec<f64> = wanted.iter().map(|&(g, _)| g as f64).collect();
            transport.send(r, compose_tag(PHASE_HALO_WANT_IDS, level), &ids);
        }
    }

    // Phase 2: receive what each neighbor wants from us, translate to our
    // own local row indices, and what we want from them.
    let mut send = Vec::new();
    let mut recv = Vec::new();
    for &r in &neighbors {
        let mut count_buf = [0.0f64; 1];
        transport.recv_into(r, compose_tag(PHASE_HALO_SIZE, level), &mut count_buf);
        let their_count = count_buf[0] as usize;
        if their_count > 0 {
            let mut ids_buf = vec![0.0f64; their_count];
            transport.recv_into(r, compose_tag(PHASE_HALO_WANT_IDS, level), &mut ids_buf);
            let elements_to_send: Vec<usize> = ids_buf
                .iter()
                .map(|&g| {
                    let (gix, giy, giz) = global_to_coords(geometry, g as i64);
                    let lix = gix - geometry.ipx * geometry.nx;
                    let liy = giy - geometry.ipy * geometry.ny;
                    let liz = giz - geometry.ipz * geometry.nz;
                    lix + liy * geometry.nx + liz * geometry.nx * geometry.ny
                })
                .collect();
            send.push(NeighborSend { rank: r, elements_to_send });
        }

        if let Some(wanted) = recv_buckets.get(&r) {
            recv.push(NeighborRecv {
                rank: r,
                local_ids: wanted.iter().map(|&(_, l)| l).collect(),
            });
        }
    }

    matrix.halo = Some(HaloPlan { send, recv });
    matrix.mtx_ind_g = None;
}

/// Exchange halo values of `vector` (length `matrix.local_num_cols`)
/// according to `matrix.halo`. No-op for single-participant runs.
pub fn exchange_halo(vector: &mut [f64], matrix: &SparseMatrix, transport: &dyn Transport, level: u8) {
    let Some(plan) = matrix.halo.as_ref() else {
        return;
    };
    if plan.send.is_empty() && plan.recv.is_empty() {
        return;
    }

    for neighbor in &plan.send {
        let buf: Vec<f64> = neighbor.elements_to_send.iter().map(|&i| vector[i]).collect();
        transport.send(neighbor.rank, compose_tag(PHASE_HALO_VALUES, level), &buf);
    }

    for neighbor in &plan.recv {
        let mut buf = vec![0.0f64; neighbor.local_ids.len()];
        transport.recv_into(neighbor.rank, compose_tag(PHASE_HALO_VALUES, level), &mut buf);
        for (&local_id, &v) in neighbor.local_ids.iter().zip(buf.iter()) {
            vector[local_id] = v;
        }
    }
}
