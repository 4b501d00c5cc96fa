//! PDF sets and set-level statistics.
//!
//! A [`PdfSet`] is the ordered collection of member PDFs of one fit: member
//! 0 is the central value, the rest encode the uncertainty in one of three
//! conventions (replicas, Hessian eigenvector pairs, symmetric-Hessian
//! eigenvectors). The statistics follow G. Watt's treatment (JHEP 1109:069,
//! 2011): uncertainty bands with confidence-level rescaling via chi-squared
//! quantiles, correlations, and random sampling from Hessian eigenvectors.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::erf::erf;

use super::error::{Error, Result};
use super::factories;
use super::info::Info;
use super::pdf::Pdf;

/// The 1-sigma confidence level in percent, `100 erf(1/sqrt(2))`.
pub fn cl_1sigma() -> f64 {
    100.0 * erf(1.0 / std::f64::consts::SQRT_2)
}

/// Quantile of the chi-squared distribution with one degree of freedom.
fn chi2_quantile(p: f64) -> f64 {
    ChiSquared::new(1.0)
        .expect("one degree of freedom is a valid chi-squared")
        .inverse_cdf(p)
}

/// The uncertainty convention encoded by a set's error members.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Monte-Carlo replicas; the central value is their mean.
    Replicas,
    /// Asymmetric Hessian eigenvector pairs.
    Hessian,
    /// Symmetric Hessian eigenvectors.
    SymmHessian,
    /// No uncertainty members.
    None,
}

impl FromStr for ErrorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "replicas" => Ok(Self::Replicas),
            "hessian" => Ok(Self::Hessian),
            "symmhessian" => Ok(Self::SymmHessian),
            "none" => Ok(Self::None),
            _ => Err(Error::MetadataBadType {
                key: "ErrorType".to_string(),
                expected: "replicas|hessian|symmhessian|none",
            }),
        }
    }
}

/// The central value and uncertainty band of one observable over a set.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PdfUncertainty {
    /// Central value.
    pub central: f64,
    /// Upward uncertainty.
    pub errplus: f64,
    /// Downward uncertainty (quoted positive).
    pub errminus: f64,
    /// Symmetrised uncertainty.
    pub errsymm: f64,
    /// Rescaling factor applied to reach the requested confidence level.
    pub scale: f64,
}

/// A named set of member PDFs with cached construction and statistics.
pub struct PdfSet {
    name: String,
    info: Info,
    members: Mutex<HashMap<usize, Arc<dyn Pdf>>>,
}

impl PdfSet {
    /// Loads the set-level metadata of `name` from the search path.
    pub fn new(name: &str) -> Result<Self> {
        let info_path =
            super::paths::find_pdf_set_info_path(name).ok_or_else(|| Error::FileNotFound {
                path: super::paths::pdf_set_info_path(name).display().to_string(),
            })?;
        Ok(Self::from_info(name, Info::load(&info_path)?))
    }

    /// Wraps already-resolved metadata, e.g. for a synthetic set.
    pub fn from_info(name: &str, info: Info) -> Self {
        Self {
            name: name.to_string(),
            info,
            members: Mutex::new(HashMap::new()),
        }
    }

    /// The set name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The set-level metadata.
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// The set description from `SetDesc`.
    pub fn description(&self) -> Result<&str> {
        self.info.entry("SetDesc")
    }

    /// Number of members, central value included.
    pub fn size(&self) -> Result<usize> {
        self.info.entry_as("NumMembers")
    }

    /// The uncertainty convention of this set.
    pub fn error_type(&self) -> Result<ErrorType> {
        self.info.entry_or("ErrorType", "none").parse()
    }

    /// The confidence level of the error members in percent; 1-sigma when
    /// the metadata does not say otherwise.
    pub fn error_conf_level(&self) -> f64 {
        self.info
            .entry_as_or("ErrorConfLevel", cl_1sigma())
            .unwrap_or_else(|_| cl_1sigma())
    }

    /// Constructs (or returns the cached) member `member`.
    pub fn mk_pdf(&self, member: usize) -> Result<Arc<dyn Pdf>> {
        let mut members = self.members.lock().unwrap();
        if let Some(pdf) = members.get(&member) {
            return Ok(Arc::clone(pdf));
        }
        let pdf: Arc<dyn Pdf> = Arc::from(factories::mk_pdf(&self.name, member)?);
        members.insert(member, Arc::clone(&pdf));
        Ok(pdf)
    }

    /// Constructs all members in parallel, filling the cache.
    pub fn mk_pdfs(&self) -> Result<Vec<Arc<dyn Pdf>>> {
        let size = self.size()?;
        let fresh: Vec<(usize, Arc<dyn Pdf>)> = {
            let members = self.members.lock().unwrap();
            let missing: Vec<usize> = (0..size)
                .filter(|member| !members.contains_key(member))
                .collect();
            drop(members);
            missing
                .into_par_iter()
                .map(|member| {
                    factories::mk_pdf(&self.name, member)
                        .map(|pdf| (member, Arc::<dyn Pdf>::from(pdf)))
                })
                .collect::<Result<_>>()?
        };
        let mut members = self.members.lock().unwrap();
        for (member, pdf) in fresh {
            members.entry(member).or_insert(pdf);
        }
        Ok((0..size).map(|member| Arc::clone(&members[&member])).collect())
    }

    fn check_len(&self, values: &[f64], what: &str) -> Result<usize> {
        let size = self.size()?;
        if values.len() != size {
            return Err(Error::UserError(format!(
                "{what} needs one value per member: got {}, expected {size}",
                values.len()
            )));
        }
        Ok(size)
    }

    /// The uncertainty of `values` at the set's native confidence level.
    ///
    /// `values` holds one entry per member, member 0 first. For replica sets
    /// the central value is the replica mean and the error the standard
    /// deviation; for (symm-)Hessian sets the central value is the best fit
    /// and the errors follow the eigenvector formulae.
    pub fn uncertainty(&self, values: &[f64]) -> Result<PdfUncertainty> {
        let size = self.check_len(values, "uncertainty")?;
        let nmem = size - 1;

        match self.error_type()? {
            ErrorType::Replicas => {
                let mut av = 0.0;
                let mut sd = 0.0;
                for &value in &values[1..] {
                    av += value;
                    sd += value * value;
                }
                av /= nmem as f64;
                sd /= nmem as f64;
                sd = nmem as f64 / (nmem as f64 - 1.0) * (sd - av * av);
                sd = if sd > 0.0 && nmem > 1 { sd.sqrt() } else { 0.0 };
                Ok(PdfUncertainty {
                    central: av,
                    errplus: sd,
                    errminus: sd,
                    errsymm: sd,
                    scale: 1.0,
                })
            }
            ErrorType::SymmHessian => {
                let central = values[0];
                let errsymm = values[1..]
                    .iter()
                    .map(|&value| (value - central) * (value - central))
                    .sum::<f64>()
                    .sqrt();
                Ok(PdfUncertainty {
                    central,
                    errplus: errsymm,
                    errminus: errsymm,
                    errsymm,
                    scale: 1.0,
                })
            }
            ErrorType::Hessian => {
                let central = values[0];
                let mut errplus = 0.0;
                let mut errminus = 0.0;
                let mut errsymm = 0.0;
                for ieigen in 1..=nmem / 2 {
                    let p = values[2 * ieigen - 1];
                    let m = values[2 * ieigen];
                    let up = (p - central).max(m - central).max(0.0);
                    let down = (central - p).max(central - m).max(0.0);
                    errplus += up * up;
                    errminus += down * down;
                    errsymm += (p - m) * (p - m);
                }
                Ok(PdfUncertainty {
                    central,
                    errplus: errplus.sqrt(),
                    errminus: errminus.sqrt(),
                    errsymm: 0.5 * errsymm.sqrt(),
                    scale: 1.0,
                })
            }
            ErrorType::None => Err(Error::UserError(
                "uncertainty undefined for a set with ErrorType none".to_string(),
            )),
        }
    }

    /// The uncertainty of `values` rescaled to the confidence level
    /// `req_cl` (percent).
    ///
    /// For replica sets with `median = true` the central value becomes the
    /// replica median and the band the quantile interval bracketing
    /// `req_cl`; otherwise the native-level errors are rescaled by
    /// `sqrt(Q(req) / Q(native))` with `Q` the chi-squared(1) quantile.
    pub fn uncertainty_cl(
        &self,
        values: &[f64],
        req_cl: f64,
        median: bool,
    ) -> Result<PdfUncertainty> {
        let mut unc = self.uncertainty(values)?;

        let req = req_cl / 100.0;
        let native = self.error_conf_level() / 100.0;
        if !(0.0..=1.0).contains(&req) || !(0.0..=1.0).contains(&native) {
            return Ok(unc);
        }

        if self.error_type()? == ErrorType::Replicas && median {
            let nmem = values.len() - 1;
            let mut sorted = values.to_vec();
            sorted[1..].sort_by(f64::total_cmp);

            unc.central = if nmem % 2 == 1 {
                sorted[nmem / 2 + 1]
            } else {
                0.5 * (sorted[nmem / 2] + sorted[nmem / 2 + 1])
            };
            let upper = (0.5 * (1.0 + req) * nmem as f64).round() as usize;
            let lower = 1 + (0.5 * (1.0 - req) * nmem as f64).round() as usize;
            unc.errplus = sorted[upper] - unc.central;
            unc.errminus = unc.central - sorted[lower];
            unc.errsymm = 0.5 * (unc.errplus + unc.errminus);
        } else {
            let scale = (chi2_quantile(req) / chi2_quantile(native)).sqrt();
            unc.errplus *= scale;
            unc.errminus *= scale;
            unc.errsymm *= scale;
            unc.scale = scale;
        }
        Ok(unc)
    }

    /// The correlation of two observables over this set, in [-1, 1].
    pub fn correlation(&self, values_a: &[f64], values_b: &[f64]) -> Result<f64> {
        self.check_len(values_a, "correlation")?;
        self.check_len(values_b, "correlation")?;

        let unc_a = self.uncertainty(values_a)?;
        let unc_b = self.uncertainty(values_b)?;
        let nmem = values_a.len() - 1;

        match self.error_type()? {
            ErrorType::Replicas if nmem > 1 => {
                let mut cor = 0.0;
                for (&a, &b) in values_a[1..].iter().zip(&values_b[1..]) {
                    cor += a * b;
                }
                Ok(
                    (cor / nmem as f64 - unc_a.central * unc_b.central)
                        / (unc_a.errsymm * unc_b.errsymm)
                        * (nmem as f64 / (nmem as f64 - 1.0)),
                )
            }
            ErrorType::SymmHessian => {
                let mut cor = 0.0;
                for (&a, &b) in values_a[1..].iter().zip(&values_b[1..]) {
                    cor += (a - unc_a.central) * (b - unc_b.central);
                }
                Ok(cor / (unc_a.errsymm * unc_b.errsymm))
            }
            ErrorType::Hessian => {
                let mut cor = 0.0;
                for ieigen in 1..=nmem / 2 {
                    cor += (values_a[2 * ieigen - 1] - values_a[2 * ieigen])
                        * (values_b[2 * ieigen - 1] - values_b[2 * ieigen]);
                }
                Ok(cor / (4.0 * unc_a.errsymm * unc_b.errsymm))
            }
            _ => Ok(0.0),
        }
    }

    /// One random sample of an observable consistent with the covariance
    /// encoded by a (symm-)Hessian set.
    ///
    /// `randoms` holds one standard-normal number per eigenvector (half the
    /// error-member count for `hessian`, all of them for `symmhessian`).
    /// With `symmetrise` the averaged eigenvector excursion is used, so the
    /// sample mean tends to the best fit; otherwise the directional variant
    /// is taken. The rescaling from the native confidence level to 1-sigma
    /// is applied automatically.
    pub fn random_value(&self, values: &[f64], randoms: &[f64], symmetrise: bool) -> Result<f64> {
        let size = self.check_len(values, "random_value")?;
        let nmem = size - 1;

        let neigen = match self.error_type()? {
            ErrorType::Hessian => nmem / 2,
            ErrorType::SymmHessian => nmem,
            _ => {
                return Err(Error::UserError(
                    "random_value requires a Hessian-format set".to_string(),
                ))
            }
        };
        if randoms.len() != neigen {
            return Err(Error::UserError(format!(
                "random_value needs one random number per eigenvector: got {}, expected {neigen}",
                randoms.len()
            )));
        }

        let scale = self.uncertainty_cl(values, cl_1sigma(), false)?.scale;
        let central = values[0];
        let mut sample = central;

        match self.error_type()? {
            ErrorType::SymmHessian => {
                for (ieigen, &r) in randoms.iter().enumerate() {
                    sample += r * (values[ieigen + 1] - central).abs() * scale;
                }
            }
            ErrorType::Hessian => {
                for (ieigen, &r) in randoms.iter().enumerate() {
                    let p = values[2 * ieigen + 1];
                    let m = values[2 * ieigen + 2];
                    if symmetrise {
                        sample += 0.5 * r * (p - m).abs() * scale;
                    } else if r < 0.0 {
                        sample -= r * (m - central) * scale;
                    } else {
                        sample += r * (p - central) * scale;
                    }
                }
            }
            _ => unreachable!("checked above"),
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "Expected {expected}, got {actual}"
        );
    }

    fn synthetic_set(error_type: &str, num_members: usize) -> PdfSet {
        let mut info = Info::new();
        info.set_entry("ErrorType", error_type);
        info.set_entry("NumMembers", num_members);
        PdfSet::from_info("synthetic", info)
    }

    #[test]
    fn test_cl_1sigma() {
        assert_close(cl_1sigma(), 68.268_949_213_708_58, 1e-9);
    }

    #[test]
    fn test_symmhessian_uncertainty() {
        let set = synthetic_set("symmhessian", 3);
        let unc = set.uncertainty(&[0.0, 1.0, -1.0]).unwrap();
        assert_close(unc.central, 0.0, 1e-15);
        assert_close(unc.errplus, 2f64.sqrt(), 1e-12);
        assert_close(unc.errminus, 2f64.sqrt(), 1e-12);
        assert_close(unc.errsymm, 2f64.sqrt(), 1e-12);
    }

    #[test]
    fn test_hessian_uncertainty() {
        let set = synthetic_set("hessian", 5);
        let unc = set.uncertainty(&[0.0, 1.0, -1.0, 2.0, -2.0]).unwrap();
        assert_close(unc.central, 0.0, 1e-15);
        // err+^2 = max(1,-1,0)^2 + max(2,-2,0)^2 = 5, symmetrically for err-.
        assert_close(unc.errplus, 5f64.sqrt(), 1e-12);
        assert_close(unc.errminus, 5f64.sqrt(), 1e-12);
        // errsymm = (1/2) sqrt(2^2 + 4^2).
        assert_close(unc.errsymm, 0.5 * 20f64.sqrt(), 1e-12);
    }

    #[test]
    fn test_hessian_coincident_pairs_have_zero_symm_error() {
        let set = synthetic_set("hessian", 5);
        let unc = set.uncertainty(&[3.0, 3.5, 3.5, 2.5, 2.5]).unwrap();
        assert_close(unc.errsymm, 0.0, 1e-15);
    }

    #[test]
    fn test_replicas_uncertainty() {
        let set = synthetic_set("replicas", 5);
        let unc = set.uncertainty(&[99.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        // Central is the replica mean, not values[0].
        assert_close(unc.central, 2.5, 1e-12);
        // Sample standard deviation of {1, 2, 3, 4}.
        let expected_sd = (5.0f64 / 3.0).sqrt();
        assert_close(unc.errplus, expected_sd, 1e-12);
        assert_close(unc.errsymm, expected_sd, 1e-12);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let set = synthetic_set("replicas", 5);
        assert!(matches!(
            set.uncertainty(&[1.0, 2.0]),
            Err(Error::UserError(_))
        ));
    }

    #[test]
    fn test_cl_rescaling() {
        let set = synthetic_set("symmhessian", 3);
        let values = [0.0, 1.0, -1.0];

        // Native level requested: nothing changes.
        let unc = set.uncertainty_cl(&values, cl_1sigma(), false).unwrap();
        assert_close(unc.scale, 1.0, 1e-12);

        // 95% from 1-sigma is the familiar factor 1.96.
        let unc = set.uncertainty_cl(&values, 95.0, false).unwrap();
        assert_close(unc.scale, 1.959_963_985, 1e-6);
        assert_close(unc.errsymm, 2f64.sqrt() * unc.scale, 1e-9);

        // Out-of-range levels leave the base result untouched.
        let unc = set.uncertainty_cl(&values, 130.0, false).unwrap();
        assert_close(unc.scale, 1.0, 1e-12);
    }

    #[test]
    fn test_native_conf_level_rescaling() {
        // A 90% CL set rescaled down to 1-sigma shrinks the errors.
        let mut info = Info::new();
        info.set_entry("ErrorType", "symmhessian");
        info.set_entry("NumMembers", 3);
        info.set_entry("ErrorConfLevel", 90.0);
        let set = PdfSet::from_info("cl90", info);

        let unc = set
            .uncertainty_cl(&[0.0, 1.0, -1.0], cl_1sigma(), false)
            .unwrap();
        // sqrt(Q(0.6827) / Q(0.90)) = sqrt(1 / 2.70554).
        assert_close(unc.scale, (1.0f64 / 2.705_543_454).sqrt(), 1e-6);
    }

    #[test]
    fn test_replicas_median_interval() {
        let set = synthetic_set("replicas", 6);
        // Replicas 10, 20, 30, 40, 50: median 30.
        let values = [0.0, 50.0, 10.0, 30.0, 20.0, 40.0];
        let unc = set.uncertainty_cl(&values, 100.0, true).unwrap();
        assert_close(unc.central, 30.0, 1e-12);
        assert_close(unc.errplus, 20.0, 1e-12);
        assert_close(unc.errminus, 20.0, 1e-12);
    }

    #[test]
    fn test_correlation_of_identical_observables() {
        for (error_type, values) in [
            ("replicas", vec![9.0, 1.0, 2.0, 3.0, 4.0]),
            ("symmhessian", vec![2.0, 2.5, 1.6, 2.2]),
            ("hessian", vec![2.0, 2.5, 1.6, 2.2, 1.9]),
        ] {
            let set = synthetic_set(error_type, values.len());
            let cor = set.correlation(&values, &values).unwrap();
            assert_close(cor, 1.0, 1e-9);
        }
    }

    #[test]
    fn test_correlation_of_anticorrelated_observables() {
        let set = synthetic_set("symmhessian", 3);
        let a = [0.0, 1.0, -1.0];
        let b = [0.0, -1.0, 1.0];
        assert_close(set.correlation(&a, &b).unwrap(), -1.0, 1e-9);
    }

    #[test]
    fn test_random_value_zero_randoms_returns_central() {
        let hessian = synthetic_set("hessian", 5);
        let values = [3.0, 3.5, 2.6, 3.2, 2.9];
        for symmetrise in [true, false] {
            let sample = hessian
                .random_value(&values, &[0.0, 0.0], symmetrise)
                .unwrap();
            assert_close(sample, 3.0, 1e-12);
        }

        let symm = synthetic_set("symmhessian", 3);
        let sample = symm.random_value(&[1.5, 1.6, 1.3], &[0.0, 0.0], true).unwrap();
        assert_close(sample, 1.5, 1e-12);
    }

    #[test]
    fn test_random_value_symmhessian_sample() {
        let set = synthetic_set("symmhessian", 3);
        // values[0] = 1, excursions 0.2 and 0.1.
        let sample = set
            .random_value(&[1.0, 1.2, 0.9], &[1.0, -2.0], true)
            .unwrap();
        assert_close(sample, 1.0 + 0.2 - 2.0 * 0.1, 1e-12);
    }

    #[test]
    fn test_random_value_asymmetric_directions() {
        let set = synthetic_set("hessian", 3);
        let values = [1.0, 1.3, 0.9];
        // Positive random pulls along the plus member.
        let up = set.random_value(&values, &[1.0], false).unwrap();
        assert_close(up, 1.3, 1e-12);
        // Negative random pulls along the minus member.
        let down = set.random_value(&values, &[-1.0], false).unwrap();
        assert_close(down, 0.9, 1e-12);
    }

    #[test]
    fn test_random_value_requires_hessian() {
        let set = synthetic_set("replicas", 3);
        assert!(set.random_value(&[1.0, 2.0, 3.0], &[0.0], true).is_err());
        let set = synthetic_set("hessian", 5);
        // Wrong number of randoms for two eigenvector pairs.
        assert!(set
            .random_value(&[1.0, 2.0, 3.0, 4.0, 5.0], &[0.0], true)
            .is_err());
    }
}
