//! Row coloring for parallel SYMGS.
//!
//! Rows are grouped by the parity of their local grid coordinate,
//! `(ix % 2, iy % 2, iz % 2)`, giving 8 color classes. Any two rows sharing
//! a color differ by an even step in every coordinate, so a 27-point
//! stencil offset (which only ever steps by -1, 0 or 1 per coordinate)
//! never connects two same-colored rows — each class is internally
//! independent and safe to relax in any order, or in parallel.

use crate::geometry::Geometry;

/// Rows grouped into independent color classes.
#[derive(Debug, Clone)]
pub struct Coloring {
    pub classes: Vec<Vec<usize>>,
}

impl Coloring {
    /// Build the 8-color parity scheme for `geometry`'s local box.
    pub fn build(geometry: &Geometry) -> Coloring {
        let mut classes = vec![Vec::new(); 8];
        for iz in 0..geometry.nz {
            for iy in 0..geometry.ny {
                for ix in 0..geometry.nx {
                    let row = ix + iy * geometry.nx + iz * geometry.nx * geometry.ny;
                    let color = (ix % 2) | ((iy % 2) << 1) | ((iz % 2) << 2);
                    classes[color].push(row);
                }
            }
        }
        Coloring { classes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::generate_problem;

    #[test]
    fn every_row_appears_exactly_once() {
        let g = Geometry::new(0, 1, 8, 8, 8, None).unwrap();
        let coloring = Coloring::build(&g);
        let mut seen = vec![false; g.local_num_rows()];
        for class in &coloring.classes {
            for &row in class {
                assert!(!seen[row], "row {row} colored twice");
                seen[row] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn no_two_same_colored_rows_are_stencil_neighbors() {
        let g = Geometry::new(0, 1, 8, 8, 8, None).unwrap();
        let problem = generate_problem(&g);
        let coloring = Coloring::build(&g);
        for class in &coloring.classes {
            let in_class: std::collections::HashSet<usize> = class.iter().copied().collect();
            for &row in class {
                for &col in &problem.matrix.mtx_ind_l[row] {
                    if col != row && col < problem.matrix.local_num_rows {
                        assert!(
                            !in_class.contains(&col),
                            "rows {row} and {col} share a color but are stencil neighbors"
                        );
                    }
                }
            }
        }
    }
}
