//! Strong-coupling computation.
//!
//! Three interchangeable engines: a truncated analytic series in
//! `1/ln(Q2/Lambda2)`, RK4 integration of the QCD beta function from a
//! reference point `(MZ, alpha_s(MZ))`, and cubic interpolation in `log Q2`
//! over a tabulation carried in metadata. All of them share the quark-mass
//! bookkeeping that determines the active flavour count at a given scale.

use std::f64::consts::PI;

use ninterp::data::InterpData1D;
use ninterp::error::InterpolateError;
use ninterp::interpolator::Extrapolate;
use ninterp::prelude::*;
use ninterp::strategy::traits::Strategy1D;

use ndarray::{Data, RawDataClone};

use super::error::{Error, Result};

/// MS-bar beta-function coefficient `beta_i` for `nf` active flavours.
///
/// The numerical forms of the standard expressions, e.g.
/// `beta_0 = (33 - 2 nf) / (12 pi)`.
fn beta(i: usize, nf: usize) -> f64 {
    let nf = nf as f64;
    match i {
        0 => 0.875_352_187 - 0.053_051_647 * nf,
        1 => 0.645_922_545_7 - 0.080_212_603_7 * nf,
        2 => 0.719_864_327 - 0.140_904_490 * nf + 0.003_032_913_39 * nf * nf,
        3 => {
            1.172_686 - 0.278_545_8 * nf + 0.016_244_67 * nf * nf
                + 0.000_060_124_7 * nf * nf * nf
        }
        _ => unreachable!("beta function index out of range"),
    }
}

/// All four beta coefficients for `nf` active flavours.
fn betas(nf: usize) -> [f64; 4] {
    [beta(0, nf), beta(1, nf), beta(2, nf), beta(3, nf)]
}

/// Quark masses and loop order shared by every engine variant.
#[derive(Debug, Clone)]
pub struct QcdParams {
    /// Quark masses in GeV, indexed by |PDG id| - 1 (d, u, s, c, b, t).
    qmasses: [f64; 6],
    /// QCD loop order, 1..=4.
    order: u32,
}

impl Default for QcdParams {
    fn default() -> Self {
        Self {
            qmasses: [0.0; 6],
            order: 4,
        }
    }
}

impl QcdParams {
    /// Parameters with the given loop order and no quark masses set.
    pub fn new(order: u32) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// The configured loop order.
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Sets the mass of the quark with PDG id `id` (sign ignored).
    pub fn set_quark_mass(&mut self, id: i32, mass: f64) -> Result<()> {
        let idx = id.unsigned_abs() as usize;
        if idx == 0 || idx > 6 {
            return Err(Error::UserError(format!(
                "invalid quark id {id} (expected 1-6)"
            )));
        }
        self.qmasses[idx - 1] = mass;
        Ok(())
    }

    /// The mass of the quark with PDG id `id` (sign ignored).
    pub fn quark_mass(&self, id: i32) -> Result<f64> {
        let idx = id.unsigned_abs() as usize;
        if idx == 0 || idx > 6 {
            return Err(Error::UserError(format!(
                "invalid quark id {id} (expected 1-6)"
            )));
        }
        Ok(self.qmasses[idx - 1])
    }

    /// Number of active flavours at scale `q2`: quarks are counted while
    /// `q2` exceeds their squared mass threshold.
    pub fn num_flavors_q2(&self, q2: f64) -> usize {
        let mut nf = 0;
        for (i, &mass) in self.qmasses.iter().enumerate() {
            if q2 > mass * mass {
                nf = i + 1;
            } else {
                break;
            }
        }
        nf
    }
}

/// The engine variants, dispatched per metadata `AlphaS_Type`.
pub enum AlphaS {
    /// Truncated analytic running with per-nf Lambda_QCD.
    Analytic(AlphaSAnalytic),
    /// RK4 integration of the beta function.
    Ode(AlphaSOde),
    /// Cubic interpolation over a metadata tabulation.
    Ipol(AlphaSIpol),
}

impl AlphaS {
    /// Computes `alpha_s(Q2)`.
    pub fn alphas_q2(&self, q2: f64) -> Result<f64> {
        if q2 < 0.0 {
            return Err(Error::UnphysicalQ2 { value: q2 });
        }
        match self {
            Self::Analytic(engine) => engine.alphas_q2(q2),
            Self::Ode(engine) => engine.alphas_q2(q2),
            Self::Ipol(engine) => engine.alphas_q2(q2),
        }
    }

    /// Computes `alpha_s(Q)`.
    pub fn alphas_q(&self, q: f64) -> Result<f64> {
        self.alphas_q2(q * q)
    }

    /// Number of active flavours at scale `q2`.
    pub fn num_flavors_q2(&self, q2: f64) -> usize {
        match self {
            Self::Analytic(engine) => engine.num_flavors_q2(q2),
            Self::Ode(engine) => engine.params.num_flavors_q2(q2),
            Self::Ipol(engine) => engine.params.num_flavors_q2(q2),
        }
    }
}

/// Analytic approximation of the running coupling.
///
/// One Lambda_QCD per active flavour count; the expansion variable is
/// `y = 1/ln(Q2/Lambda2)` and the series is truncated at the configured
/// loop order.
pub struct AlphaSAnalytic {
    params: QcdParams,
    /// Lambda_QCD values stored as `lambdas[nf - 1]`; zero means unset.
    lambdas: [f64; 6],
    nfmin: usize,
    nfmax: usize,
}

impl AlphaSAnalytic {
    /// An engine with no Lambda values set yet.
    pub fn new(params: QcdParams) -> Self {
        Self {
            params,
            lambdas: [0.0; 6],
            nfmin: 0,
            nfmax: 0,
        }
    }

    /// Sets Lambda_QCD for `nf` active flavours and revalidates the
    /// resulting flavour range.
    pub fn set_lambda(&mut self, nf: usize, lambda: f64) -> Result<()> {
        if nf == 0 || nf > 6 {
            return Err(Error::UserError(format!(
                "invalid flavour count {nf} for Lambda_QCD (expected 1-6)"
            )));
        }
        self.lambdas[nf - 1] = lambda;
        self.update_flavor_range()
    }

    /// Recomputes nfmin/nfmax from the non-zero Lambda entries; every
    /// flavour count between them must carry a Lambda.
    fn update_flavor_range(&mut self) -> Result<()> {
        self.nfmin = self
            .lambdas
            .iter()
            .position(|&l| l != 0.0)
            .map_or(0, |i| i + 1);
        self.nfmax = self
            .lambdas
            .iter()
            .rposition(|&l| l != 0.0)
            .map_or(0, |i| i + 1);
        if self.nfmin != self.nfmax {
            for i in self.nfmin..self.nfmax - 1 {
                if self.lambdas[i] == 0.0 {
                    return Err(Error::UserError(format!(
                        "intermediate Lambda for nf = {} must be set",
                        i + 1
                    )));
                }
            }
        }
        Ok(())
    }

    fn lambda_qcd(&self, nf: usize) -> Result<f64> {
        let lambda = if nf == 0 { 0.0 } else { self.lambdas[nf - 1] };
        if lambda == 0.0 {
            return Err(Error::UserError(format!(
                "no Lambda_QCD set for nf = {nf}"
            )));
        }
        Ok(lambda)
    }

    /// Number of active flavours at `q2`, clamped to the range for which
    /// Lambda values exist.
    pub fn num_flavors_q2(&self, q2: f64) -> usize {
        let mut nf = self.nfmin;
        for i in self.nfmin..6 {
            let mass = self.params.qmasses[i];
            if mass != 0.0 && q2 > mass * mass {
                nf = i + 1;
            }
        }
        nf.min(self.nfmax)
    }

    /// The truncated analytic series for `alpha_s(Q2)`.
    pub fn alphas_q2(&self, q2: f64) -> Result<f64> {
        let nf = self.num_flavors_q2(q2);
        let lambda = self.lambda_qcd(nf)?;
        let lambda2 = lambda * lambda;
        if q2 <= lambda2 {
            return Err(Error::AlphaSRunaway { q2, lambda2 });
        }

        let b = betas(nf);
        let b02 = b[0] * b[0];
        let b12 = b[1] * b[1];

        let lnx = (q2 / lambda2).ln();
        let lnlnx = lnx.ln();
        let lnlnx2 = lnlnx * lnlnx;
        let lnlnx3 = lnlnx2 * lnlnx;
        let y = 1.0 / lnx;

        let mut series = 1.0;
        if self.params.order > 1 {
            series -= b[1] * lnlnx / b02 * y;
        }
        if self.params.order > 2 {
            let prefactor = b12 / (b02 * b02);
            series += prefactor * y * y * (lnlnx2 - lnlnx + b[2] * b[0] / b12 - 1.0);
        }
        if self.params.order > 3 {
            let prefactor = 1.0 / (b02 * b02 * b02);
            let a_30 = b12 * b[1] * (lnlnx3 - 2.5 * lnlnx2 - 2.0 * lnlnx + 0.5);
            let a_31 = 3.0 * b[0] * b[1] * b[2] * lnlnx;
            let a_32 = 0.5 * b02 * b[3];
            series -= prefactor * y * y * y * (a_30 + a_31 - a_32);
        }
        Ok(y / b[0] * series)
    }
}

/// RK4 integration of `d alpha / d t` with `t = Q2`, from the reference
/// point `(MZ^2, alpha_s(MZ^2))` to the target scale.
pub struct AlphaSOde {
    params: QcdParams,
    mz: f64,
    alphas_mz: f64,
}

/// First-order derivative of the running coupling at `(t, y)`.
fn ode_derivative(t: f64, y: f64, b: &[f64; 4]) -> f64 {
    let d0 = b[0] / (-2.0 * PI);
    let d1 = b[1] / (-4.0 * PI * PI);
    let d2 = b[2] / (-64.0 * PI * PI * PI);
    (d0 * y * y + d1 * y * y * y + d2 * y * y * y * y) / t
}

impl AlphaSOde {
    /// An engine running from `alpha_s(mz^2) = alphas_mz`.
    pub fn new(params: QcdParams, mz: f64, alphas_mz: f64) -> Self {
        Self {
            params,
            mz,
            alphas_mz,
        }
    }

    /// Integrates the beta function to the target `q2`.
    ///
    /// The step sign always points at the target; close to it the step
    /// shrinks below the termination tolerance so the final approach cannot
    /// overshoot. Beta coefficients are recomputed from the active flavour
    /// count at every step, which deliberately allows a discrete change when
    /// the running crosses a quark mass threshold.
    pub fn alphas_q2(&self, q2: f64) -> Result<f64> {
        if q2 <= 0.0 {
            return Err(Error::UnphysicalQ2 { value: q2 });
        }
        let accuracy = 1e-3 * q2;
        let mut h: f64 = 0.01;
        let mut t = self.mz * self.mz;
        let mut y = self.alphas_mz;

        while (q2 - t).abs() > accuracy {
            let b = betas(self.params.num_flavors_q2(t));

            if h.abs() > accuracy && (q2 - t).abs() / h.abs() < 10.0 {
                h = 0.5 * accuracy;
            }
            if (q2 < t && h > 0.0) || (q2 > t && h < 0.0) {
                h = -h;
            }

            let k1 = h * ode_derivative(t, y, &b);
            let k2 = h * ode_derivative(t + 0.5 * h, y + 0.5 * k1, &b);
            let k3 = h * ode_derivative(t + 0.5 * h, y + 0.5 * k2, &b);
            let k4 = h * ode_derivative(t + h, y + k3, &b);

            y += (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0;
            t += h;
        }
        Ok(y)
    }
}

/// Cubic interpolation of `alpha_s` in `log Q2` over tabulated knots.
///
/// Below the tabulated range the coupling follows the log-log gradient of
/// the first interval; above it the last tabulated value is kept.
#[derive(Debug, Clone, Default)]
pub struct AlphaSCubicSpline;

impl AlphaSCubicSpline {
    /// Index of the closest Q2 knot at or below `q2`, leaving a right
    /// neighbour for the spline; `q2` must already be inside the knot range.
    fn iq2below<D>(data: &InterpData1D<D>, q2: f64) -> usize
    where
        D: Data<Elem = f64> + RawDataClone + Clone,
    {
        let n = data.grid[0].len();
        let idx = data.grid[0]
            .iter()
            .position(|&knot| knot > q2)
            .unwrap_or(n);
        idx.saturating_sub(1).min(n - 2)
    }

    /// Forward derivative w.r.t. log Q2 at knot `i`.
    fn ddlogq_forward<D>(data: &InterpData1D<D>, i: usize) -> f64
    where
        D: Data<Elem = f64> + RawDataClone + Clone,
    {
        (data.values[i + 1] - data.values[i])
            / (data.grid[0][i + 1].ln() - data.grid[0][i].ln())
    }

    /// Backward derivative w.r.t. log Q2 at knot `i`.
    fn ddlogq_backward<D>(data: &InterpData1D<D>, i: usize) -> f64
    where
        D: Data<Elem = f64> + RawDataClone + Clone,
    {
        (data.values[i] - data.values[i - 1])
            / (data.grid[0][i].ln() - data.grid[0][i - 1].ln())
    }

    /// Central derivative w.r.t. log Q2 at knot `i`.
    fn ddlogq_central<D>(data: &InterpData1D<D>, i: usize) -> f64
    where
        D: Data<Elem = f64> + RawDataClone + Clone,
    {
        0.5 * (Self::ddlogq_forward(data, i) + Self::ddlogq_backward(data, i))
    }
}

impl<D> Strategy1D<D> for AlphaSCubicSpline
where
    D: Data<Elem = f64> + RawDataClone + Clone,
{
    fn interpolate(
        &self,
        data: &InterpData1D<D>,
        point: &[f64; 1],
    ) -> std::result::Result<f64, InterpolateError> {
        let q2 = point[0];
        let q2s = &data.grid[0];
        let alphas = &data.values;
        let n = q2s.len();

        if q2 < q2s[0] {
            // Constant-gradient continuation in a log10-log10 plot. The first
            // knot can be duplicated at a flavour threshold, so step to the
            // first distinct one.
            let mut next = 1;
            while q2s[next] == q2s[0] {
                next += 1;
            }
            let dlogq2 = (q2s[next] / q2s[0]).log10();
            let dlogas = (alphas[next] / alphas[0]).log10();
            let loggrad = dlogas / dlogq2;
            return Ok(alphas[0] * (q2 / q2s[0]).powf(loggrad));
        }
        if q2 > q2s[n - 1] {
            return Ok(alphas[n - 1]);
        }

        let i = Self::iq2below(data, q2);

        // One-sided end derivatives, central elsewhere.
        let (d_i, d_i1) = if i == 0 {
            (
                Self::ddlogq_forward(data, i),
                Self::ddlogq_central(data, i + 1),
            )
        } else if i == n - 2 {
            (
                Self::ddlogq_central(data, i),
                Self::ddlogq_backward(data, i + 1),
            )
        } else {
            (
                Self::ddlogq_central(data, i),
                Self::ddlogq_central(data, i + 1),
            )
        };

        let dlogq2 = q2s[i + 1].ln() - q2s[i].ln();
        let t = (q2.ln() - q2s[i].ln()) / dlogq2;
        Ok(crate::interpolation::hermite_cubic(
            t,
            alphas[i],
            d_i * dlogq2,
            alphas[i + 1],
            d_i1 * dlogq2,
        ))
    }

    fn allow_extrapolate(&self) -> bool {
        // Out-of-range continuation is handled inside `interpolate`.
        true
    }
}

/// Interpolated coupling over the `(AlphaS_Qs, AlphaS_Vals)` tabulation.
pub struct AlphaSIpol {
    params: QcdParams,
    interpolator: Interp1DOwned<f64, AlphaSCubicSpline>,
}

impl AlphaSIpol {
    /// Builds the interpolator from tabulated `(Q, alpha_s)` points.
    pub fn new(params: QcdParams, qs: &[f64], vals: &[f64]) -> Result<Self> {
        if qs.len() != vals.len() || qs.len() < 2 {
            return Err(Error::UserError(format!(
                "alpha_s tabulation needs matching Q and value lists of at least two points, \
                 got {} and {}",
                qs.len(),
                vals.len()
            )));
        }
        let q2s: Vec<f64> = qs.iter().map(|&q| q * q).collect();
        let interpolator = Interp1D::new(
            q2s.into(),
            vals.to_vec().into(),
            AlphaSCubicSpline,
            Extrapolate::Enable,
        )
        .map_err(|err| Error::UserError(format!("invalid alpha_s tabulation: {err}")))?;
        Ok(Self {
            params,
            interpolator,
        })
    }

    /// Interpolates `alpha_s(Q2)`.
    pub fn alphas_q2(&self, q2: f64) -> Result<f64> {
        self.interpolator
            .interpolate(&[q2])
            .map_err(|err| Error::UserError(format!("alpha_s interpolation failed: {err}")))
    }
}
