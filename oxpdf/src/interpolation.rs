//! The interpolation strategies.
//!
//! Every strategy implements [`Interpolator`], whose provided
//! `interpolate_xq2` isolates the subgrid selection and knot-index lookup and
//! then delegates to the per-cell routine. The cubic variants use Hermite
//! splines with central differences in the grid interior and one-sided
//! differences at the edges; along Q2 the difference rule is restricted to
//! the current subgrid, so `xf` may legitimately jump across a flavour
//! threshold.

use std::cell::Cell;

use super::error::{Error, Result};
use super::gridpdf::GridPdf;
use super::knotarray::KnotArray1F;

/// Piecewise interpolation of `xf` inside the grid.
pub trait Interpolator: Send + Sync {
    /// Interpolates `xf(id, x, q2)` inside the grid of `grid`.
    ///
    /// Selects the subgrid for `q2`, looks up the knot cell, and delegates to
    /// [`Interpolator::interpolate_cell`].
    fn interpolate_xq2(&self, grid: &GridPdf, id: i32, x: f64, q2: f64) -> Result<f64> {
        let subgrid = grid.subgrid_for_q2(q2)?;
        let arr = subgrid
            .flavor(id)
            .ok_or(Error::FlavorNotSupported { id })?;
        let ix = arr.ix_below(x)?;
        let iq2 = arr.iq2_below(q2)?;
        self.interpolate_cell(arr, x, ix, q2, iq2)
    }

    /// Interpolates within the knot cell `[ix, ix+1] x [iq2, iq2+1]` of one
    /// single-flavour subgrid array.
    fn interpolate_cell(
        &self,
        subgrid: &KnotArray1F,
        x: f64,
        ix: usize,
        q2: f64,
        iq2: usize,
    ) -> Result<f64>;
}

/// One-dimensional linear interpolation in the fractional parameter `t`.
fn linear(t: f64, vl: f64, vh: f64) -> f64 {
    vl + t * (vh - vl)
}

/// Cubic Hermite interpolation for `t` in [0, 1] with values `vl`, `vh` and
/// derivatives `vdl`, `vdh` at the interval ends, in interval units.
pub(crate) fn hermite_cubic(t: f64, vl: f64, vdl: f64, vh: f64, vdh: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let p0 = (2.0 * t3 - 3.0 * t2 + 1.0) * vl;
    let m0 = (t3 - 2.0 * t2 + t) * vdl;
    let p1 = (-2.0 * t3 + 3.0 * t2) * vh;
    let m1 = (t3 - t2) * vdh;

    p0 + m0 + p1 + m1
}

/// Bilinear interpolation in the native (x, Q2) coordinates.
#[derive(Debug, Clone, Default)]
pub struct BilinearInterpolator;

impl Interpolator for BilinearInterpolator {
    fn interpolate_cell(
        &self,
        subgrid: &KnotArray1F,
        x: f64,
        ix: usize,
        q2: f64,
        iq2: usize,
    ) -> Result<f64> {
        let xs = subgrid.xs();
        let q2s = subgrid.q2s();
        let tx = (x - xs[ix]) / (xs[ix + 1] - xs[ix]);
        let tq = (q2 - q2s[iq2]) / (q2s[iq2 + 1] - q2s[iq2]);

        let f_ql = linear(tx, subgrid.xf(ix, iq2), subgrid.xf(ix + 1, iq2));
        let f_qh = linear(tx, subgrid.xf(ix, iq2 + 1), subgrid.xf(ix + 1, iq2 + 1));
        Ok(linear(tq, f_ql, f_qh))
    }
}

/// Bilinear interpolation in (log x, log Q2).
///
/// PDFs behave close to linearly in the log variables, so this is the common
/// linear choice.
#[derive(Debug, Clone, Default)]
pub struct LogBilinearInterpolator;

impl Interpolator for LogBilinearInterpolator {
    fn interpolate_cell(
        &self,
        subgrid: &KnotArray1F,
        x: f64,
        ix: usize,
        q2: f64,
        iq2: usize,
    ) -> Result<f64> {
        let log_xs = subgrid.log_xs();
        let log_q2s = subgrid.log_q2s();
        let tx = (x.ln() - log_xs[ix]) / (log_xs[ix + 1] - log_xs[ix]);
        let tq = (q2.ln() - log_q2s[iq2]) / (log_q2s[iq2 + 1] - log_q2s[iq2]);

        let f_ql = linear(tx, subgrid.xf(ix, iq2), subgrid.xf(ix + 1, iq2));
        let f_qh = linear(tx, subgrid.xf(ix, iq2 + 1), subgrid.xf(ix + 1, iq2 + 1));
        Ok(linear(tq, f_ql, f_qh))
    }
}

/// The cubic kernel shared by the bicubic strategies.
///
/// `xs` and `q2s` are the knot coordinates in whichever space (native or
/// log) the interpolation runs; the stored `xf` values are untransformed.
struct CubicKernel<'a> {
    arr: &'a KnotArray1F,
    xs: &'a [f64],
    q2s: &'a [f64],
}

impl CubicKernel<'_> {
    /// d(xf)/dx at a knot: central difference in the interior, one-sided at
    /// the grid extremities in x.
    fn ddx(&self, ix: usize, iq2: usize) -> f64 {
        let nx = self.arr.nx();
        if ix == 0 {
            (self.arr.xf(1, iq2) - self.arr.xf(0, iq2)) / (self.xs[1] - self.xs[0])
        } else if ix == nx - 1 {
            (self.arr.xf(nx - 1, iq2) - self.arr.xf(nx - 2, iq2))
                / (self.xs[nx - 1] - self.xs[nx - 2])
        } else {
            let lddx =
                (self.arr.xf(ix, iq2) - self.arr.xf(ix - 1, iq2)) / (self.xs[ix] - self.xs[ix - 1]);
            let rddx =
                (self.arr.xf(ix + 1, iq2) - self.arr.xf(ix, iq2)) / (self.xs[ix + 1] - self.xs[ix]);
            0.5 * (lddx + rddx)
        }
    }

    /// Cubic interpolation along one x row, at fixed Q2 knot `iq2`.
    fn xline(&self, tx: f64, ix: usize, iq2: usize) -> f64 {
        let dx = self.xs[ix + 1] - self.xs[ix];
        hermite_cubic(
            tx,
            self.arr.xf(ix, iq2),
            self.ddx(ix, iq2) * dx,
            self.arr.xf(ix + 1, iq2),
            self.ddx(ix + 1, iq2) * dx,
        )
    }

    /// Bicubic interpolation at coordinates `(px, pq)` in the cell
    /// `[ix, ix+1] x [iq2, iq2+1]`.
    ///
    /// The Q2 derivative inputs use the same central/one-sided rule as x,
    /// but restricted to this subgrid's Q2 rows.
    fn interpolate(&self, px: f64, ix: usize, pq: f64, iq2: usize) -> f64 {
        let dx = self.xs[ix + 1] - self.xs[ix];
        let dq = self.q2s[iq2 + 1] - self.q2s[iq2];
        let tx = (px - self.xs[ix]) / dx;
        let tq = (pq - self.q2s[iq2]) / dq;

        let vl = self.xline(tx, ix, iq2);
        let vh = self.xline(tx, ix, iq2 + 1);

        let nq2 = self.arr.nq2();
        let (vdl, vdh) = if nq2 == 2 {
            // A two-row subgrid only supports the single finite difference.
            let d = (vh - vl) / dq;
            (d, d)
        } else if iq2 == 0 {
            let vdl = (vh - vl) / dq;
            let vhh = self.xline(tx, ix, iq2 + 2);
            let vdh = 0.5 * vdl + 0.5 * (vhh - vh) / (self.q2s[iq2 + 2] - self.q2s[iq2 + 1]);
            (vdl, vdh)
        } else if iq2 == nq2 - 2 {
            let vdh = (vh - vl) / dq;
            let vll = self.xline(tx, ix, iq2 - 1);
            let vdl = 0.5 * vdh + 0.5 * (vl - vll) / (self.q2s[iq2] - self.q2s[iq2 - 1]);
            (vdl, vdh)
        } else {
            let vll = self.xline(tx, ix, iq2 - 1);
            let vhh = self.xline(tx, ix, iq2 + 2);
            let central = (vh - vl) / dq;
            let vdl = 0.5 * central + 0.5 * (vl - vll) / (self.q2s[iq2] - self.q2s[iq2 - 1]);
            let vdh = 0.5 * central + 0.5 * (vhh - vh) / (self.q2s[iq2 + 2] - self.q2s[iq2 + 1]);
            (vdl, vdh)
        };

        hermite_cubic(tq, vl, vdl * dq, vh, vdh * dq)
    }
}

/// Cubic Hermite interpolation in the native (x, Q2) coordinates.
#[derive(Debug, Clone, Default)]
pub struct BicubicInterpolator;

impl Interpolator for BicubicInterpolator {
    fn interpolate_cell(
        &self,
        subgrid: &KnotArray1F,
        x: f64,
        ix: usize,
        q2: f64,
        iq2: usize,
    ) -> Result<f64> {
        let kernel = CubicKernel {
            arr: subgrid,
            xs: subgrid.xs(),
            q2s: subgrid.q2s(),
        };
        Ok(kernel.interpolate(x, ix, q2, iq2))
    }
}

/// Per-thread memo of the last query point's log coordinates.
///
/// Repeated evaluation at the same `(x, ix)` or `(q2, iq2)` (the common
/// access pattern when scanning flavours at a fixed kinematic point) reuses
/// the transformed coordinates. Keyed by the knot-array storage address, so
/// a change of subgrid or PDF invalidates the entry.
#[derive(Debug, Clone, Copy, Default)]
struct LogPointCache {
    x_key: usize,
    ix: usize,
    x: f64,
    log_x: f64,
    x_valid: bool,
    q2_key: usize,
    iq2: usize,
    q2: f64,
    log_q2: f64,
    q2_valid: bool,
}

thread_local! {
    static LOG_POINT_CACHE: Cell<LogPointCache> = Cell::new(LogPointCache::default());
}

/// Cubic Hermite interpolation in (log x, log Q2).
///
/// The default interpolator for PDF grids.
#[derive(Debug, Clone, Default)]
pub struct LogBicubicInterpolator;

impl Interpolator for LogBicubicInterpolator {
    fn interpolate_cell(
        &self,
        subgrid: &KnotArray1F,
        x: f64,
        ix: usize,
        q2: f64,
        iq2: usize,
    ) -> Result<f64> {
        let x_key = subgrid.xs().as_ptr() as usize;
        let q2_key = subgrid.q2s().as_ptr() as usize;

        let (log_x, log_q2) = LOG_POINT_CACHE.with(|cell| {
            let mut cache = cell.get();
            if !(cache.x_valid && cache.x_key == x_key && cache.ix == ix && cache.x == x) {
                cache.x_key = x_key;
                cache.ix = ix;
                cache.x = x;
                cache.log_x = x.ln();
                cache.x_valid = true;
            }
            if !(cache.q2_valid && cache.q2_key == q2_key && cache.iq2 == iq2 && cache.q2 == q2) {
                cache.q2_key = q2_key;
                cache.iq2 = iq2;
                cache.q2 = q2;
                cache.log_q2 = q2.ln();
                cache.q2_valid = true;
            }
            cell.set(cache);
            (cache.log_x, cache.log_q2)
        });

        let kernel = CubicKernel {
            arr: subgrid,
            xs: subgrid.log_xs(),
            q2s: subgrid.log_q2s(),
        };
        Ok(kernel.interpolate(log_x, ix, log_q2, iq2))
    }
}
