//! The PDF contract.
//!
//! [`Pdf`] is the capability set shared by every PDF variant: evaluation,
//! range checks, flavour queries, metadata access, and the strong coupling.
//! The public `xfx_q2` entry performs the physical-range and flavour checks
//! in one place and delegates the in-range computation to the concrete type,
//! which is a table lookup for [`crate::gridpdf::GridPdf`] and a closure for
//! [`AnalyticPdf`].

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::alphas::AlphaS;
use super::error::{Error, Result};
use super::factories;
use super::info::Info;

/// The PDG id of the gluon; id 0 is treated as an alias for it at every
/// public entry point.
pub const GLUON: i32 = 21;

/// Floor applied under [`ForcePositive::PositiveDefinite`].
const POSITIVE_DEFINITE_FLOOR: f64 = 1e-10;

/// Clamping policy for returned `xf` values.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ForcePositive {
    /// Return interpolated values as-is, small negatives included.
    #[default]
    Allow,
    /// Clamp to `>= 0`.
    NonNegative,
    /// Clamp to `>= 1e-10`.
    PositiveDefinite,
}

impl ForcePositive {
    /// Decodes the integer metadata flag (0, 1, 2).
    pub fn from_flag(flag: i64) -> Self {
        match flag {
            1 => Self::NonNegative,
            2 => Self::PositiveDefinite,
            _ => Self::Allow,
        }
    }

    /// Applies the policy to a computed value.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Allow => value,
            Self::NonNegative => value.max(0.0),
            Self::PositiveDefinite => value.max(POSITIVE_DEFINITE_FLOOR),
        }
    }
}

/// Access to parton density information.
pub trait Pdf: Send + Sync {
    /// Computes `xf(id, x, q2)` for an id this PDF carries, without the
    /// physical-range and flavour checks of [`Pdf::xfx_q2`].
    fn raw_xfx_q2(&self, id: i32, x: f64, q2: f64) -> Result<f64>;

    /// Whether `x` lies in this PDF's coverage.
    fn in_range_x(&self, x: f64) -> bool;

    /// Whether `q2` lies in this PDF's coverage.
    fn in_range_q2(&self, q2: f64) -> bool;

    /// The supported flavours, as sorted PDG ids.
    fn flavors(&self) -> &[i32];

    /// The metadata attached to this PDF.
    fn info(&self) -> &Info;

    /// The strong coupling at scale `q2`.
    fn alphas_q2(&self, q2: f64) -> Result<f64>;

    /// The clamping policy applied to returned values.
    fn force_positive(&self) -> ForcePositive {
        ForcePositive::Allow
    }

    /// Whether an unsupported flavour fails instead of returning zero.
    fn strict_flavors(&self) -> bool {
        false
    }

    /// Whether this PDF carries the flavour `id`.
    fn has_flavor(&self, id: i32) -> bool {
        self.flavors().binary_search(&id).is_ok()
    }

    /// Whether the linear scale `q` lies in this PDF's coverage.
    fn in_range_q(&self, q: f64) -> bool {
        self.in_range_q2(q * q)
    }

    /// Whether `(x, q2)` lies in this PDF's coverage.
    fn in_range_xq2(&self, x: f64, q2: f64) -> bool {
        self.in_range_x(x) && self.in_range_q2(q2)
    }

    /// The PDF value `xf(id, x, q2)`.
    ///
    /// Checks the physical ranges (`x` in [0, 1], `q2 >= 0`), canonicalises
    /// id 0 to the gluon, and returns zero for unsupported flavours unless
    /// strict mode is enabled. The in-range/off-grid dispatch is left to the
    /// concrete type.
    fn xfx_q2(&self, id: i32, x: f64, q2: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&x) {
            return Err(Error::UnphysicalX { value: x });
        }
        if q2 < 0.0 {
            return Err(Error::UnphysicalQ2 { value: q2 });
        }
        let id = if id == 0 { GLUON } else { id };
        if !self.has_flavor(id) {
            if self.strict_flavors() {
                return Err(Error::FlavorNotSupported { id });
            }
            return Ok(0.0);
        }
        let value = self.raw_xfx_q2(id, x, q2)?;
        Ok(self.force_positive().apply(value))
    }

    /// The PDF value `xf(id, x, q)` at a linear scale `q`.
    fn xfx_q(&self, id: i32, x: f64, q: f64) -> Result<f64> {
        self.xfx_q2(id, x, q * q)
    }

    /// Fills `out` with `xf` for the thirteen standard PIDs in the order
    /// [-6, ..., -1, 21, 1, ..., 6], i.e. the gluon lands at slot 6.
    fn xfx_q2_fill(&self, x: f64, q2: f64, out: &mut [f64; 13]) -> Result<()> {
        for (i, slot) in out.iter_mut().enumerate() {
            let id = i as i32 - 6;
            *slot = self.xfx_q2(id, x, q2)?;
        }
        Ok(())
    }

    /// Like [`Pdf::xfx_q2_fill`], at a linear scale `q`.
    fn xfx_q_fill(&self, x: f64, q: f64, out: &mut [f64; 13]) -> Result<()> {
        self.xfx_q2_fill(x, q * q, out)
    }
}

/// A PDF defined by a closed-form `xf` instead of a grid.
///
/// Useful for toy studies and for testing machinery that is generic over
/// the [`Pdf`] contract.
pub struct AnalyticPdf {
    info: Info,
    flavors: Vec<i32>,
    xf: Box<dyn Fn(i32, f64, f64) -> f64 + Send + Sync>,
    alphas: OnceCell<AlphaS>,
}

impl AnalyticPdf {
    /// Builds an analytic PDF carrying `flavors` with the density `xf`.
    pub fn new(
        info: Info,
        mut flavors: Vec<i32>,
        xf: impl Fn(i32, f64, f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        flavors.sort_unstable();
        Self {
            info,
            flavors,
            xf: Box::new(xf),
            alphas: OnceCell::new(),
        }
    }
}

impl Pdf for AnalyticPdf {
    fn raw_xfx_q2(&self, id: i32, x: f64, q2: f64) -> Result<f64> {
        Ok((self.xf)(id, x, q2))
    }

    fn in_range_x(&self, _x: f64) -> bool {
        true
    }

    fn in_range_q2(&self, _q2: f64) -> bool {
        true
    }

    fn flavors(&self) -> &[i32] {
        &self.flavors
    }

    fn info(&self) -> &Info {
        &self.info
    }

    fn alphas_q2(&self, q2: f64) -> Result<f64> {
        self.alphas
            .get_or_try_init(|| factories::mk_alphas(&self.info))?
            .alphas_q2(q2)
    }
}
