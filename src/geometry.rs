//! Geometry and partitioning
//!
//! Splits a global logical 3D grid among participants and exposes, for each
//! participant, its coordinate in the process grid and the dimensions of its
//! local box.

use crate::error::{HpcgError, HpcgResult};

/// Default bound on the local box's max/min dimension ratio. Process grids
/// that would force a more elongated local box than this are rejected.
pub const DEFAULT_MAX_ASPECT_RATIO: f64 = 8.0;

/// Pencil-mode parameters: inflates local nz to `zu` on participants whose
/// ipz falls in a z-slab of thickness `pz`, deflates to `zl` elsewhere.
///
/// Parsed and threaded through but not applied — see the design notes on
/// pencil mode. Only the uniform-nz path is exercised by the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PencilParams {
    pub pz: usize,
    pub zl: usize,
    pub zu: usize,
}

/// Describes this participant's slice of the global grid and its place in
/// the process grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// This participant's rank.
    pub rank: usize,
    /// Total number of participants.
    pub size: usize,

    /// Process grid dimensions (npx * npy * npz == size).
    pub npx: usize,
    pub npy: usize,
    pub npz: usize,

    /// This participant's coordinate in the process grid.
    pub ipx: usize,
    pub ipy: usize,
    pub ipz: usize,

    /// Local box dimensions.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,

    /// Global grid dimensions.
    pub gnx: usize,
    pub gny: usize,
    pub gnz: usize,

    /// Pencil-mode parameters, if requested. Unused by the numerical core
    /// (see module docs).
    pub pencil: Option<PencilParams>,
}

impl Geometry {
    /// Build the geometry for `rank` out of `size` participants, each owning
    /// a local box of `(nx, ny, nz)` grid points, choosing a process grid
    /// that minimizes local-box surface-to-volume ratio.
    pub fn new(
        rank: usize,
        size: usize,
        nx: usize,
        ny: usize,
        nz: usize,
        pencil: Option<PencilParams>,
    ) -> HpcgResult<Self> {
        Self::with_aspect_bound(rank, size, nx, ny, nz, pencil, DEFAULT_MAX_ASPECT_RATIO)
    }

    /// Like [`Geometry::new`] but with an explicit aspect-ratio bound.
    pub fn with_aspect_bound(
        rank: usize,
        size: usize,
        nx: usize,
        ny: usize,
        nz: usize,
        pencil: Option<PencilParams>,
        max_aspect_ratio: f64,
    ) -> HpcgResult<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(HpcgError::InvalidDimensions(format!(
                "local dims must be positive, got ({nx}, {ny}, {nz})"
            )));
        }
        if rank >= size {
            return Err(HpcgError::InvalidDimensions(format!(
                "rank {rank} out of range for size {size}"
            )));
        }

        let (npx, npy, npz) = Self::choose_process_grid(size, nx, ny, nz, max_aspect_ratio)
            .ok_or(HpcgError::BadProcessGrid { requested: size })?;

        let (ipx, ipy, ipz) = Self::rank_to_coords(rank, npx, npy);

        Ok(Self {
            rank,
            size,
            npx,
            npy,
            npz,
            ipx,
            ipy,
            ipz,
            nx,
            ny,
            nz,
            gnx: nx * npx,
            gny: ny * npy,
            gnz: nz * npz,
            pencil,
        })
    }

    /// Build a geometry for a caller-chosen `(npx, npy, npz)` process grid
    /// rather than one derived by [`Geometry::choose_process_grid`]. Callers
    /// are responsible for `npx*npy*npz == size`.
    pub fn with_explicit_process_grid(
        rank: usize,
        size: usize,
        npx: usize,
        npy: usize,
        npz: usize,
        nx: usize,
        ny: usize,
        nz: usize,
        pencil: Option<PencilParams>,
    ) -> HpcgResult<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(HpcgError::InvalidDimensions(format!(
                "local dims must be positive, got ({nx}, {ny}, {nz})"
            )));
        }
        if npx * npy * npz != size {
            return Err(HpcgError::BadProcessGrid { requested: size });
        }
        let (ipx, ipy, ipz) = Self::rank_to_coords(rank, npx, npy);
        Ok(Self {
            rank,
            size,
            npx,
            npy,
            npz,
            ipx,
            ipy,
            ipz,
            nx,
            ny,
            nz,
            gnx: nx * npx,
            gny: ny * npy,
            gnz: nz * npz,
            pencil,
        })
    }

    /// r mod npx, (r/npx) mod npy, r/(npx*npy)
    fn rank_to_coords(rank: usize, npx: usize, npy: usize) -> (usize, usize, usize) {
        let ipx = rank % npx;
        let ipy = (rank / npx) % npy;
        let ipz = rank / (npx * npy);
        (ipx, ipy, ipz)
    }

    /// Choose (npx, npy, npz) with npx*npy*npz == size minimizing
    /// nx*ny*npz + nx*nz*npy + ny*nz*npx (local-box surface area), rejecting
    /// triples whose resulting local box aspect ratio exceeds the bound.
    ///
    /// The aspect-ratio check is on the *local* box dims, which are fixed
    /// at (nx, ny, nz) regardless of the triple chosen (uniform-nz path),
    /// so in practice it only rejects degenerate single-participant-axis
    /// decompositions indirectly via caller-supplied bounds; it is kept as
    /// an explicit, checkable invariant rather than silently accepted.
    fn choose_process_grid(
        size: usize,
        nx: usize,
        ny: usize,
        nz: usize,
        max_aspect_ratio: f64,
    ) -> Option<(usize, usize, usize)> {
        if size == 0 {
            return None;
        }
        let local_box_ok = {
            let dims = [nx as f64, ny as f64, nz as f64];
            let max = dims.iter().cloned().fold(f64::MIN, f64::max);
            let min = dims.iter().cloned().fold(f64::MAX, f64::min);
            min > 0.0 && max / min <= max_aspect_ratio
        };
        if !local_box_ok {
            return None;
        }

        let mut best: Option<(usize, usize, usize, f64)> = None;
        for npx in divisors(size) {
            let rem = size / npx;
            for npy in divisors(rem) {
                let npz = rem / npy;
                if npx * npy * npz != size {
                    continue;
                }
                let surface = (nx * ny * npz + nx * nz * npy + ny * nz * npx) as f64;
                if best.map(|(_, _, _, s)| surface < s).unwrap_or(true) {
                    best = Some((npx, npy, npz, surface));
                }
            }
        }
        best.map(|(a, b, c, _)| (a, b, c))
    }

    /// Number of local rows/grid points owned by this participant.
    pub fn local_num_rows(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Global id of local point (ix, iy, iz) at this participant.
    pub fn global_id(&self, ix: usize, iy: usize, iz: usize) -> i64 {
        let gix = self.ipx * self.nx + ix;
        let giy = self.ipy * self.ny + iy;
        let giz = self.ipz * self.nz + iz;
        gix as i64 + (giy as i64) * (self.gnx as i64) + (giz as i64) * (self.gnx as i64) * (self.gny as i64)
    }

    /// Which rank owns global grid coordinate (gix, giy, giz).
    pub fn owner_of(&self, gix: usize, giy: usize, giz: usize) -> usize {
        let ipx = gix / self.nx;
        let ipy = giy / self.ny;
        let ipz = giz / self.nz;
        ipz * (self.npx * self.npy) + ipy * self.npx + ipx
    }

    /// All other ranks whose process-grid coordinate is within one step of
    /// this participant's in every dimension (the 27-neighborhood, self
    /// excluded).
    pub fn neighbor_ranks(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for dz in -1i64..=1 {
            let jz = self.ipz as i64 + dz;
            if jz < 0 || jz >= self.npz as i64 {
                continue;
            }
            for dy in -1i64..=1 {
                let jy = self.ipy as i64 + dy;
                if jy < 0 || jy >= self.npy as i64 {
                    continue;
                }
                for dx in -1i64..=1 {
                    let jx = self.ipx as i64 + dx;
                    if jx < 0 || jx >= self.npx as i64 {
                        continue;
                    }
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let r = jz as usize * (self.npx * self.npy) + jy as usize * self.npx + jx as usize;
                    out.push(r);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The coarse geometry one multigrid level down: same process grid and
    /// rank, local dims halved.
    pub fn coarsen(&self) -> HpcgResult<Geometry> {
        if self.nx % 2 != 0 || self.ny % 2 != 0 || self.nz % 2 != 0 {
            return Err(HpcgError::InvalidDimensions(format!(
                "local dims ({}, {}, {}) not evenly coarsenable",
                self.nx, self.ny, self.nz
            )));
        }
        Geometry::new(
            self.rank,
            self.size,
            self.nx / 2,
            self.ny / 2,
            self.nz / 2,
            None,
        )
    }
}

/// Divisors of n in ascending order (n itself included).
fn divisors(n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            out.push(i);
            if i != n / i {
                out.push(n / i);
            }
        }
        i += 1;
    }
    out.sort_unstable();
    out
}
