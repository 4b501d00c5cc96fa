//! Knot-array storage for grid PDFs.
//!
//! A [`KnotArray1F`] holds the tabulation of a single flavour: ordered x and
//! Q2 knots, their precomputed logarithms, and the dense `xf` table. A
//! [`KnotArrayNF`] collects the single-flavour arrays of one Q2 subgrid,
//! keyed by PDG id; all entries of a subgrid share identical knot axes.

use std::collections::BTreeMap;

use ndarray::Array2;

use super::error::{Error, Result};

/// Index of the closest knot row at or below `value`.
///
/// Returns the largest `i` with `knots[i] <= value`, clamped to
/// `knots.len() - 2` so a right neighbour always exists for spline
/// construction. Fails with [`Error::OutOfGridRange`] outside the knot range.
pub fn ibelow(knots: &[f64], axis: &'static str, value: f64) -> Result<usize> {
    let lo = knots[0];
    let hi = knots[knots.len() - 1];
    if value < lo || value > hi {
        return Err(Error::OutOfGridRange {
            axis,
            value,
            lo,
            hi,
        });
    }
    let idx = knots.partition_point(|&k| k <= value);
    Ok(idx.saturating_sub(1).min(knots.len() - 2))
}

/// Tabulated `xf` values of a single flavour over an (x, Q2) knot rectangle.
#[derive(Debug, Clone)]
pub struct KnotArray1F {
    xs: Vec<f64>,
    q2s: Vec<f64>,
    log_xs: Vec<f64>,
    log_q2s: Vec<f64>,
    /// Dense table indexed as `[ix, iq2]`.
    xfs: Array2<f64>,
}

impl KnotArray1F {
    /// Builds a knot array from its axes and the dense `xf` table.
    ///
    /// The log arrays are derived here; the struct is immutable afterwards,
    /// so they can never drift from the linear knots.
    pub fn new(xs: Vec<f64>, q2s: Vec<f64>, xfs: Array2<f64>) -> Result<Self> {
        if xs.len() < 2 || q2s.len() < 2 {
            return Err(Error::UserError(
                "knot array needs at least two knots per axis".to_string(),
            ));
        }
        if xs.iter().any(|&x| x <= 0.0 || x > 1.0) {
            return Err(Error::UserError(
                "x knots must lie in (0, 1]".to_string(),
            ));
        }
        if q2s.iter().any(|&q2| q2 <= 0.0) {
            return Err(Error::UserError("Q2 knots must be positive".to_string()));
        }
        if xs.windows(2).any(|w| w[0] >= w[1]) || q2s.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::UserError(
                "knots must be strictly increasing".to_string(),
            ));
        }
        if xfs.shape() != [xs.len(), q2s.len()] {
            return Err(Error::UserError(format!(
                "xf table has shape {:?} but knots imply [{}, {}]",
                xfs.shape(),
                xs.len(),
                q2s.len()
            )));
        }

        let log_xs = xs.iter().map(|&x| x.ln()).collect();
        let log_q2s = q2s.iter().map(|&q2| q2.ln()).collect();
        Ok(Self {
            xs,
            q2s,
            log_xs,
            log_q2s,
            xfs,
        })
    }

    /// The x knots.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// The Q2 knots.
    pub fn q2s(&self) -> &[f64] {
        &self.q2s
    }

    /// Natural logarithms of the x knots.
    pub fn log_xs(&self) -> &[f64] {
        &self.log_xs
    }

    /// Natural logarithms of the Q2 knots.
    pub fn log_q2s(&self) -> &[f64] {
        &self.log_q2s
    }

    /// Number of x knots.
    pub fn nx(&self) -> usize {
        self.xs.len()
    }

    /// Number of Q2 knots.
    pub fn nq2(&self) -> usize {
        self.q2s.len()
    }

    /// Stored value at an indexed (x, Q2) knot.
    pub fn xf(&self, ix: usize, iq2: usize) -> f64 {
        self.xfs[[ix, iq2]]
    }

    /// Index of the x knot at or below `x`, with a right neighbour left over.
    pub fn ix_below(&self, x: f64) -> Result<usize> {
        ibelow(&self.xs, "x", x)
    }

    /// Index of the Q2 knot at or below `q2`, with a right neighbour left over.
    pub fn iq2_below(&self, q2: f64) -> Result<usize> {
        ibelow(&self.q2s, "Q2", q2)
    }
}

/// The single-flavour arrays of one Q2 subgrid, keyed by PDG id.
#[derive(Debug, Clone, Default)]
pub struct KnotArrayNF {
    arrays: BTreeMap<i32, KnotArray1F>,
}

impl KnotArrayNF {
    /// Builds a subgrid from `(id, array)` pairs, checking that all entries
    /// share the same knot axes.
    pub fn new(arrays: impl IntoIterator<Item = (i32, KnotArray1F)>) -> Result<Self> {
        let arrays: BTreeMap<i32, KnotArray1F> = arrays.into_iter().collect();
        let mut iter = arrays.values();
        if let Some(first) = iter.next() {
            for arr in iter {
                if arr.xs() != first.xs() || arr.q2s() != first.q2s() {
                    return Err(Error::UserError(
                        "all flavours of a subgrid must share the same knots".to_string(),
                    ));
                }
            }
        }
        Ok(Self { arrays })
    }

    /// The array for one PDG id, if the subgrid carries it.
    pub fn flavor(&self, id: i32) -> Option<&KnotArray1F> {
        self.arrays.get(&id)
    }

    /// A view onto the shared knot axes, without naming a flavour.
    ///
    /// An empty subgrid is invalid for lookup and yields an error.
    pub fn first(&self) -> Result<&KnotArray1F> {
        self.arrays
            .values()
            .next()
            .ok_or_else(|| Error::UserError("empty subgrid".to_string()))
    }

    /// Number of flavours in this subgrid.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Whether the subgrid holds no flavours at all.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Iterates over `(id, array)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &KnotArray1F)> {
        self.arrays.iter()
    }
}
