//! Structured mesh generators.
use crate::error::{ModelError, Result};
use crate::mesh::{ConvexKind, Mesh};
use nalgebra::Point2;

/// Returns `cells + 1` equispaced coordinates from `start` to `end`.
pub fn uniform_ladder(start: f64, end: f64, cells: usize) -> Vec<f64> {
    let cells = cells.max(1);
    let h = (end - start) / cells as f64;
    (0..=cells).map(|i| start + i as f64 * h).collect()
}

/// Generates a mesh of quadrilaterals from the tensor product of the coordinate ladders `xs`
/// and `ys`.
///
/// Vertices are numbered row by row, starting from the lower left corner.
pub fn regular_quadrilaterals(xs: &[f64], ys: &[f64]) -> Result<Mesh> {
    let (points, cells) = structured_grid(xs, ys)?;
    Mesh::from_points_and_convexes(
        points,
        cells
            .into_iter()
            .map(|[v00, v10, v11, v01]| (ConvexKind::Quadrilateral, vec![v00, v10, v11, v01])),
    )
}

/// Generates a triangle mesh from the tensor product of the coordinate ladders `xs` and `ys`.
///
/// Every rectangular cell is split into two counter-clockwise triangles along the diagonal
/// from its lower left to its upper right corner.
pub fn regular_simplices(xs: &[f64], ys: &[f64]) -> Result<Mesh> {
    let (points, cells) = structured_grid(xs, ys)?;
    Mesh::from_points_and_convexes(
        points,
        cells.into_iter().flat_map(|[v00, v10, v11, v01]| {
            [
                (ConvexKind::Triangle, vec![v00, v10, v11]),
                (ConvexKind::Triangle, vec![v00, v11, v01]),
            ]
        }),
    )
}

/// Points and counter-clockwise cell corners of a structured grid.
fn structured_grid(xs: &[f64], ys: &[f64]) -> Result<(Vec<Point2<f64>>, Vec<[usize; 4]>)> {
    for (name, ladder) in [("x", xs), ("y", ys)] {
        if ladder.len() < 2 {
            return Err(ModelError::InvalidArgument(format!(
                "{} ladder needs at least two coordinates",
                name
            )));
        }
        if ladder.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(ModelError::InvalidArgument(format!(
                "{} ladder must be strictly increasing",
                name
            )));
        }
    }

    let nx = xs.len();
    let to_global_vertex_index = |i: usize, j: usize| nx * j + i;

    let points = ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| Point2::new(x, y)))
        .collect();

    let mut cells = Vec::with_capacity((xs.len() - 1) * (ys.len() - 1));
    for j in 0..ys.len() - 1 {
        for i in 0..nx - 1 {
            cells.push([
                to_global_vertex_index(i, j),
                to_global_vertex_index(i + 1, j),
                to_global_vertex_index(i + 1, j + 1),
                to_global_vertex_index(i, j + 1),
            ]);
        }
    }
    Ok((points, cells))
}
