//! Command-line and `hpcg.dat` option parsing into one [`RunConfig`].

use std::fs;
use std::path::Path;

use clap::Parser;

use crate::error::{HpcgError, HpcgResult};
use crate::geometry::{PencilParams, DEFAULT_MAX_ASPECT_RATIO};

/// Local box dimensions smaller than this are snapped up to it: the stencil
/// and multigrid coarsening both assume enough interior points to be
/// meaningful.
const MIN_LOCAL_DIM: usize = 16;

#[derive(Parser, Debug)]
#[command(name = "hpcg-bench", about = "A distributed-memory CG/multigrid benchmark")]
struct Cli {
    /// Local box x dimension.
    #[arg(long)]
    nx: Option<usize>,
    #[arg(long)]
    ny: Option<usize>,
    #[arg(long)]
    nz: Option<usize>,

    /// Timed-run duration target in seconds; 0 runs a single fixed-iteration pass.
    #[arg(long, default_value_t = 0)]
    rt: u64,

    /// Pencil-mode slab thickness / deflated / inflated nz (parsed, not applied).
    #[arg(long)]
    pz: Option<usize>,
    #[arg(long)]
    zl: Option<usize>,
    #[arg(long)]
    zu: Option<usize>,

    /// Explicit process-grid triple; when omitted the smallest-surface-area
    /// triple for the participant count is chosen automatically.
    #[arg(long)]
    npx: Option<usize>,
    #[arg(long)]
    npy: Option<usize>,
    #[arg(long)]
    npz: Option<usize>,

    /// Number of in-process participants to simulate.
    #[arg(long, default_value_t = 1)]
    participants: usize,

    /// Legacy positional shorthand: `nx ny nz [rt]`.
    #[arg(value_name = "DIMS", num_args = 0..=4)]
    legacy: Vec<u64>,
}

/// A fully-resolved run configuration, ready to hand to the problem
/// generator and CG driver.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub runtime_seconds: u64,
    pub pencil: Option<PencilParams>,
    pub explicit_process_grid: Option<(usize, usize, usize)>,
    pub participants: usize,
    pub max_aspect_ratio: f64,
}

impl RunConfig {
    /// Parse from `std::env::args`, falling back to `hpcg.dat` in the
    /// current directory when no dimensions are given at all.
    pub fn from_args() -> HpcgResult<Self> {
        Self::from_iter_and_dat(std::env::args_os(), Path::new("hpcg.dat"))
    }

    fn from_iter_and_dat<I, T>(args: I, dat_path: &Path) -> HpcgResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::parse_from(args);

        let (mut nx, mut ny, mut nz, mut rt) = (cli.nx, cli.ny, cli.nz, Some(cli.rt));

        if nx.is_none() && !cli.legacy.is_empty() {
            nx = cli.legacy.first().map(|&v| v as usize);
            ny = cli.legacy.get(1).map(|&v| v as usize);
            nz = cli.legacy.get(2).map(|&v| v as usize);
            if let Some(&r) = cli.legacy.get(3) {
                rt = Some(r);
            }
        }

        if nx.is_none() && dat_path.exists() {
            let (dnx, dny, dnz, drt) = parse_hpcg_dat(dat_path)?;
            nx = Some(dnx);
            ny = Some(dny);
            nz = Some(dnz);
            if rt == Some(0) {
                rt = Some(drt);
            }
        }

        let nx = nx.unwrap_or(MIN_LOCAL_DIM);
        let ny = ny.unwrap_or(nx);
        let nz = nz.unwrap_or(nx);

        // Any dim below the minimum is replaced by the largest of the three
        // (not by the minimum itself), so a lopsided box like 8x32x8 becomes
        // a cube at the larger size rather than a mix of 16 and 32.
        let target = nx.max(ny).max(nz).max(MIN_LOCAL_DIM);
        let snap = |d: usize| if d < MIN_LOCAL_DIM { target } else { d };
        let nx = snap(nx);
        let ny = snap(ny);
        let nz = snap(nz);

        let pencil = match (cli.pz, cli.zl, cli.zu) {
            (Some(pz), Some(zl), Some(zu)) => Some(PencilParams { pz, zl, zu }),
            (None, None, None) => None,
            _ => {
                return Err(HpcgError::InvalidDimensions(
                    "pencil mode requires --pz, --zl and --zu together".to_string(),
                ))
            }
        };

        let explicit_process_grid = match (cli.npx, cli.npy, cli.npz) {
            (Some(x), Some(y), Some(z)) => Some((x, y, z)),
            (None, None, None) => None,
            _ => {
                return Err(HpcgError::InvalidDimensions(
                    "an explicit process grid requires --npx, --npy and --npz together".to_string(),
                ))
            }
        };

        Ok(RunConfig {
            nx,
            ny,
            nz,
            runtime_seconds: rt.unwrap_or(0),
            pencil,
            explicit_process_grid,
            participants: cli.participants.max(1),
            max_aspect_ratio: DEFAULT_MAX_ASPECT_RATIO,
        })
    }
}

/// Parse an `hpcg.dat`-style options file: two ignored header lines, a
/// whitespace-separated `nx ny nz` line, then a runtime line.
fn parse_hpcg_dat(path: &Path) -> HpcgResult<(usize, usize, usize, u64)> {
    let contents =
        fs::read_to_string(path).map_err(|e| HpcgError::OptionsFile(path.display().to_string(), e.to_string()))?;
    let mut lines = contents.lines().skip(2);

    let dims_line = lines
        .next()
        .ok_or_else(|| HpcgError::OptionsFile(path.display().to_string(), "missing dims line".to_string()))?;
    let mut dims = dims_line.split_whitespace();
    let parse_dim = |field: Option<&str>| -> HpcgResult<usize> {
        field
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| HpcgError::OptionsFile(path.display().to_string(), "malformed dims line".to_string()))
    };
    let nx = parse_dim(dims.next())?;
    let ny = parse_dim(dims.next())?;
    let nz = parse_dim(dims.next())?;

    let rt = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .unwrap_or(0);

    Ok((nx, ny, nz, rt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn legacy_positional_args_are_accepted() {
        let cfg = RunConfig::from_iter_and_dat(["hpcg-bench", "32", "32", "32", "60"], Path::new("/nonexistent.dat"))
            .unwrap();
        assert_eq!((cfg.nx, cfg.ny, cfg.nz), (32, 32, 32));
        assert_eq!(cfg.runtime_seconds, 60);
    }

    #[test]
    fn dims_below_minimum_are_snapped_up() {
        let cfg =
            RunConfig::from_iter_and_dat(["hpcg-bench", "--nx", "8", "--ny", "8", "--nz", "8"], Path::new("/nonexistent.dat"))
                .unwrap();
        assert_eq!((cfg.nx, cfg.ny, cfg.nz), (16, 16, 16));
    }

    #[test]
    fn lopsided_dims_snap_to_the_largest_not_the_minimum() {
        let cfg = RunConfig::from_iter_and_dat(
            ["hpcg-bench", "--nx", "8", "--ny", "32", "--nz", "8"],
            Path::new("/nonexistent.dat"),
        )
        .unwrap();
        assert_eq!((cfg.nx, cfg.ny, cfg.nz), (32, 32, 32));
    }

    #[test]
    fn falls_back_to_hpcg_dat_when_no_dims_given() {
        let dir = std::env::temp_dir().join(format!("hpcg-dat-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let dat_path = dir.join("hpcg.dat");
        let mut f = fs::File::create(&dat_path).unwrap();
        writeln!(f, "HPCG benchmark input file").unwrap();
        writeln!(f, "Sandia National Laboratories; University of Tennessee, Knoxville").unwrap();
        writeln!(f, "104 104 104").unwrap();
        writeln!(f, "60").unwrap();

        let cfg = RunConfig::from_iter_and_dat(["hpcg-bench"], &dat_path).unwrap();
        assert_eq!((cfg.nx, cfg.ny, cfg.nz), (104, 104, 104));
        assert_eq!(cfg.runtime_seconds, 60);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn partial_pencil_args_are_rejected() {
        let err = RunConfig::from_iter_and_dat(
            ["hpcg-bench", "--nx", "16", "--ny", "16", "--nz", "16", "--pz", "4"],
            Path::new("/nonexistent.dat"),
        );
        assert!(matches!(err, Err(HpcgError::InvalidDimensions(_))));
    }
}
