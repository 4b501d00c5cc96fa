//! The extrapolation strategies.
//!
//! Extrapolation beyond the tabulated grid is physically ill-defined, so the
//! choices are deliberately blunt: refuse outright, or clamp to the nearest
//! in-range point and hand back to the interpolator for a finite, monotone
//! continuation.

use super::error::{Error, Result};
use super::gridpdf::GridPdf;
use super::interpolation::Interpolator;

/// Evaluation of `xf` outside the grid boundaries.
pub trait Extrapolator: Send + Sync {
    /// Extrapolates `xf(id, x, q2)` for a point outside the grid of `grid`.
    fn extrapolate_xq2(&self, grid: &GridPdf, id: i32, x: f64, q2: f64) -> Result<f64>;
}

/// Refuses every off-grid query.
#[derive(Debug, Clone, Default)]
pub struct ErrorExtrapolator;

impl Extrapolator for ErrorExtrapolator {
    fn extrapolate_xq2(&self, _grid: &GridPdf, _id: i32, _x: f64, _q2: f64) -> Result<f64> {
        Err(Error::ExtrapolationDisabled)
    }
}

/// Clamps the query to the grid boundary and re-enters the interpolator.
///
/// `x` is clamped to the grid's own x range and `q2` to the full Q2 range
/// across all subgrids.
#[derive(Debug, Clone, Default)]
pub struct NearestPointExtrapolator;

impl Extrapolator for NearestPointExtrapolator {
    fn extrapolate_xq2(&self, grid: &GridPdf, id: i32, x: f64, q2: f64) -> Result<f64> {
        let cx = x.clamp(grid.x_min(), grid.x_max());
        let cq2 = q2.clamp(grid.q2_min(), grid.q2_max());
        grid.interpolator().interpolate_xq2(grid, id, cx, cq2)
    }
}
