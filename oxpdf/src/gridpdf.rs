//! The grid-backed PDF.
//!
//! A [`GridPdf`] owns its subgrids (ordered by their low edge in Q2), the
//! interpolator/extrapolator strategy pair, and a lazily built strong
//! coupling engine. Subgrids abut in Q2; `xf` may be discontinuous across a
//! boundary, which the data format needs at flavour thresholds, and a query
//! exactly on a boundary resolves to the upper subgrid.

use ndarray::{Array2, Array3};
use once_cell::sync::OnceCell;
use rayon::prelude::*;

use super::alphas::AlphaS;
use super::error::{Error, Result};
use super::extrapolation::Extrapolator;
use super::factories;
use super::info::Info;
use super::interpolation::Interpolator;
use super::knotarray::{KnotArray1F, KnotArrayNF};
use super::parser::SubgridBlock;
use super::pdf::{ForcePositive, Pdf};

/// A PDF evaluated by interpolation over a multi-subgrid knot table.
pub struct GridPdf {
    info: Info,
    flavors: Vec<i32>,
    /// Subgrid low edges in Q2, ascending; parallel to `subgrids`.
    subgrid_edges: Vec<f64>,
    subgrids: Vec<KnotArrayNF>,
    x_range: (f64, f64),
    q2_range: (f64, f64),
    force_positive: ForcePositive,
    strict_flavors: bool,
    interpolator: Box<dyn Interpolator>,
    extrapolator: Box<dyn Extrapolator>,
    alphas: OnceCell<AlphaS>,
}

impl GridPdf {
    /// Builds a grid PDF from resolved metadata and parsed subgrid blocks.
    ///
    /// The strategy pair is bound from the `Interpolator` / `Extrapolator`
    /// metadata entries, defaulting to log-bicubic with nearest-point
    /// continuation.
    pub fn from_member(info: Info, blocks: Vec<SubgridBlock>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(Error::UserError("member data has no subgrids".to_string()));
        }

        let file_flavors = blocks[0].flavors.clone();
        let nflav = file_flavors.len();
        let mut subgrid_edges = Vec::with_capacity(blocks.len());
        let mut subgrids = Vec::with_capacity(blocks.len());

        for block in &blocks {
            if block.flavors != file_flavors {
                return Err(Error::UserError(
                    "all subgrids must list the same flavours".to_string(),
                ));
            }
            if block.xs != blocks[0].xs {
                return Err(Error::UserError(
                    "all subgrids must share the same x knots".to_string(),
                ));
            }

            let nq2 = block.q2s.len();
            let arrays = file_flavors.iter().enumerate().map(|(iflav, &id)| {
                let xfs = Array2::from_shape_fn((block.xs.len(), nq2), |(ix, iq2)| {
                    block.values[(ix * nq2 + iq2) * nflav + iflav]
                });
                KnotArray1F::new(block.xs.clone(), block.q2s.clone(), xfs).map(|arr| (id, arr))
            });
            let arrays: Vec<(i32, KnotArray1F)> = arrays.collect::<Result<_>>()?;

            subgrid_edges.push(block.q2s[0]);
            subgrids.push(KnotArrayNF::new(arrays)?);
        }

        // Consecutive subgrids must abut exactly in Q2.
        for pair in subgrids.windows(2) {
            let top = *pair[0].first()?.q2s().last().unwrap();
            let bottom = pair[1].first()?.q2s()[0];
            if top != bottom {
                return Err(Error::UserError(format!(
                    "subgrids do not abut in Q2: {top} != {bottom}"
                )));
            }
        }

        let first = subgrids[0].first()?;
        let x_range = (first.xs()[0], *first.xs().last().unwrap());
        let q2_range = (
            first.q2s()[0],
            *subgrids.last().unwrap().first()?.q2s().last().unwrap(),
        );

        let mut flavors = if info.has_key("Flavors") {
            info.entry_list::<i32>("Flavors")?
        } else {
            file_flavors
        };
        flavors.sort_unstable();

        let interpolator = factories::mk_interpolator(info.entry_or("Interpolator", "logcubic"))?;
        let extrapolator = factories::mk_extrapolator(info.entry_or("Extrapolator", "nearest"))?;
        let force_positive = ForcePositive::from_flag(info.entry_as_or::<i64>("ForcePositive", 0)?);

        Ok(Self {
            info,
            flavors,
            subgrid_edges,
            subgrids,
            x_range,
            q2_range,
            force_positive,
            strict_flavors: false,
            interpolator,
            extrapolator,
            alphas: OnceCell::new(),
        })
    }

    /// The subgrid whose Q2 low edge is the greatest one at or below `q2`.
    ///
    /// On a boundary the upper subgrid wins, which makes a flavour-threshold
    /// query use the higher-nf tabulation.
    pub fn subgrid_for_q2(&self, q2: f64) -> Result<&KnotArrayNF> {
        let idx = self.subgrid_edges.partition_point(|&edge| edge <= q2);
        if idx == 0 {
            return Err(Error::OutOfGridRange {
                axis: "Q2",
                value: q2,
                lo: self.q2_range.0,
                hi: self.q2_range.1,
            });
        }
        Ok(&self.subgrids[idx - 1])
    }

    /// Number of subgrids.
    pub fn subgrid_count(&self) -> usize {
        self.subgrids.len()
    }

    /// The `k`-th subgrid, ascending in Q2.
    pub fn subgrid(&self, k: usize) -> &KnotArrayNF {
        &self.subgrids[k]
    }

    /// The subgrid low edges in Q2.
    pub fn subgrid_edges(&self) -> &[f64] {
        &self.subgrid_edges
    }

    /// Lowest tabulated x.
    pub fn x_min(&self) -> f64 {
        self.x_range.0
    }

    /// Highest tabulated x.
    pub fn x_max(&self) -> f64 {
        self.x_range.1
    }

    /// Lowest tabulated Q2 across all subgrids.
    pub fn q2_min(&self) -> f64 {
        self.q2_range.0
    }

    /// Highest tabulated Q2 across all subgrids.
    pub fn q2_max(&self) -> f64 {
        self.q2_range.1
    }

    /// The bound interpolator.
    pub fn interpolator(&self) -> &dyn Interpolator {
        self.interpolator.as_ref()
    }

    /// The bound extrapolator.
    pub fn extrapolator(&self) -> &dyn Extrapolator {
        self.extrapolator.as_ref()
    }

    /// Replaces the interpolation strategy. A construction-time operation:
    /// complete it before sharing the PDF for evaluation.
    pub fn set_interpolator(&mut self, interpolator: Box<dyn Interpolator>) {
        self.interpolator = interpolator;
    }

    /// Replaces the extrapolation strategy. A construction-time operation.
    pub fn set_extrapolator(&mut self, extrapolator: Box<dyn Extrapolator>) {
        self.extrapolator = extrapolator;
    }

    /// Makes unsupported-flavour queries fail instead of returning zero.
    pub fn set_strict_flavors(&mut self, strict: bool) {
        self.strict_flavors = strict;
    }

    /// Overrides the clamping policy from metadata.
    pub fn set_force_positive(&mut self, policy: ForcePositive) {
        self.force_positive = policy;
    }

    /// The stored `xf` value at a knot of subgrid `k`, without interpolation.
    pub fn xf_at_knot(&self, k: usize, id: i32, ix: usize, iq2: usize) -> Option<f64> {
        self.subgrids
            .get(k)
            .and_then(|subgrid| subgrid.flavor(id))
            .map(|arr| arr.xf(ix, iq2))
    }

    /// Evaluates `xf` over the outer product of `ids`, `xs`, and `q2s` in
    /// parallel, returning an array of shape `[ids, xs, q2s]`.
    pub fn xfx_q2_grid(&self, ids: &[i32], xs: &[f64], q2s: &[f64]) -> Result<Array3<f64>> {
        let shape = [ids.len(), xs.len(), q2s.len()];
        let total: usize = shape.iter().product();

        let data: Vec<f64> = (0..total)
            .into_par_iter()
            .map(|flat| {
                let k = flat % shape[2];
                let j = (flat / shape[2]) % shape[1];
                let i = flat / (shape[1] * shape[2]);
                self.xfx_q2(ids[i], xs[j], q2s[k])
            })
            .collect::<Result<_>>()?;

        Ok(Array3::from_shape_vec(shape, data).expect("shape follows from the inputs"))
    }
}

impl Pdf for GridPdf {
    fn raw_xfx_q2(&self, id: i32, x: f64, q2: f64) -> Result<f64> {
        if self.in_range_xq2(x, q2) {
            self.interpolator.interpolate_xq2(self, id, x, q2)
        } else {
            self.extrapolator.extrapolate_xq2(self, id, x, q2)
        }
    }

    fn in_range_x(&self, x: f64) -> bool {
        x >= self.x_range.0 && x <= self.x_range.1
    }

    fn in_range_q2(&self, q2: f64) -> bool {
        q2 >= self.q2_range.0 && q2 <= self.q2_range.1
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

    fn force_positive(&self) -> ForcePositive {
        self.force_positive
    }

    fn strict_flavors(&self) -> bool {
        self.strict_flavors
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

    /// The 2x2 single-flavour scenario grid: x = [0.1, 0.5], Q2 knots
    /// [10, 100], xf(0.1, 10) = 1, xf(0.5, 10) = 2, xf(0.1, 100) = 3,
    /// xf(0.5, 100) = 4.
    fn scenario_block() -> SubgridBlock {
        SubgridBlock {
            xs: vec![0.1, 0.5],
            qs: vec![10.0f64.sqrt(), 10.0],
            q2s: vec![10.0, 100.0],
            flavors: vec![21],
            values: vec![1.0, 3.0, 2.0, 4.0],
        }
    }

    fn bilinear_info() -> Info {
        let mut info = Info::new();
        info.set_entry("Interpolator", "linear");
        info.set_entry("Extrapolator", "nearest");
        info
    }

    fn scenario_pdf() -> GridPdf {
        GridPdf::from_member(bilinear_info(), vec![scenario_block()]).unwrap()
    }

    /// Two abutting single-flavour subgrids with a value jump at the shared
    /// Q2 = 4 knot: the lower subgrid stores 1.0 there, the upper 2.0.
    fn two_subgrid_pdf() -> GridPdf {
        let lower = SubgridBlock {
            xs: vec![0.1, 1.0],
            qs: vec![1.0, 2.0],
            q2s: vec![1.0, 4.0],
            flavors: vec![21],
            values: vec![1.0, 1.0, 1.0, 1.0],
        };
        let upper = SubgridBlock {
            xs: vec![0.1, 1.0],
            qs: vec![2.0, 4.0],
            q2s: vec![4.0, 16.0],
            flavors: vec![21],
            values: vec![2.0, 2.0, 2.0, 2.0],
        };
        GridPdf::from_member(bilinear_info(), vec![lower, upper]).unwrap()
    }

    #[test]
    fn test_bilinear_midpoint_scenario() {
        let pdf = scenario_pdf();
        // Exact bilinear midpoint of the 2x2 grid.
        assert_close(pdf.xfx_q2(21, 0.3, 55.0).unwrap(), 2.5, 1e-12);
    }

    #[test]
    fn test_nearest_point_scenario() {
        let pdf = scenario_pdf();
        // x below range: clamp to x = 0.1, bilinear at (0.1, 100) is 3.
        assert_close(pdf.xfx_q2(21, 0.05, 100.0).unwrap(), 3.0, 1e-12);
        // Clamped result equals interpolation at the clamped point.
        assert_eq!(
            pdf.xfx_q2(21, 0.05, 55.0).unwrap(),
            pdf.xfx_q2(21, 0.1, 55.0).unwrap()
        );
    }

    #[test]
    fn test_values_exact_at_knots() {
        let pdf = scenario_pdf();
        assert_eq!(pdf.xfx_q2(21, 0.1, 10.0).unwrap(), 1.0);
        assert_eq!(pdf.xfx_q2(21, 0.5, 10.0).unwrap(), 2.0);
        assert_eq!(pdf.xfx_q2(21, 0.1, 100.0).unwrap(), 3.0);
        assert_eq!(pdf.xfx_q2(21, 0.5, 100.0).unwrap(), 4.0);
    }

    #[test]
    fn test_gluon_alias_and_unsupported_flavors() {
        let pdf = scenario_pdf();
        assert_eq!(
            pdf.xfx_q2(0, 0.3, 55.0).unwrap(),
            pdf.xfx_q2(21, 0.3, 55.0).unwrap()
        );
        assert_eq!(pdf.xfx_q2(4, 0.3, 55.0).unwrap(), 0.0);

        let mut strict = scenario_pdf();
        strict.set_strict_flavors(true);
        assert!(matches!(
            strict.xfx_q2(4, 0.3, 55.0),
            Err(Error::FlavorNotSupported { id: 4 })
        ));
    }

    #[test]
    fn test_xfx_q_matches_xfx_q2() {
        let pdf = scenario_pdf();
        assert_eq!(
            pdf.xfx_q(21, 0.3, 55.0f64.sqrt()).unwrap(),
            pdf.xfx_q2(21, 0.3, 55.0).unwrap()
        );
    }

    #[test]
    fn test_error_extrapolator() {
        let mut info = bilinear_info();
        info.set_entry("Extrapolator", "error");
        let pdf = GridPdf::from_member(info, vec![scenario_block()]).unwrap();
        assert!(matches!(
            pdf.xfx_q2(21, 0.05, 55.0),
            Err(Error::ExtrapolationDisabled)
        ));
        // In-range queries are unaffected.
        assert!(pdf.xfx_q2(21, 0.3, 55.0).is_ok());
    }

    #[test]
    fn test_subgrid_boundary_uses_upper_subgrid() {
        let pdf = two_subgrid_pdf();
        // Inside each subgrid.
        assert_eq!(pdf.xfx_q2(21, 0.5, 2.0).unwrap(), 1.0);
        assert_eq!(pdf.xfx_q2(21, 0.5, 8.0).unwrap(), 2.0);
        // Exactly on the shared knot: the upper subgrid value wins.
        assert_eq!(pdf.xfx_q2(21, 0.5, 4.0).unwrap(), 2.0);
    }

    #[test]
    fn test_ranges() {
        let pdf = two_subgrid_pdf();
        assert_eq!(pdf.x_min(), 0.1);
        assert_eq!(pdf.x_max(), 1.0);
        assert_eq!(pdf.q2_min(), 1.0);
        assert_eq!(pdf.q2_max(), 16.0);
        assert!(pdf.in_range_xq2(0.5, 8.0));
        assert!(!pdf.in_range_q2(17.0));
        assert!(!pdf.in_range_x(0.05));
    }

    #[test]
    fn test_non_abutting_subgrids_rejected() {
        let lower = SubgridBlock {
            xs: vec![0.1, 1.0],
            qs: vec![1.0, 2.0],
            q2s: vec![1.0, 4.0],
            flavors: vec![21],
            values: vec![1.0; 4],
        };
        let upper = SubgridBlock {
            xs: vec![0.1, 1.0],
            qs: vec![3.0, 4.0],
            q2s: vec![9.0, 16.0],
            flavors: vec![21],
            values: vec![2.0; 4],
        };
        assert!(GridPdf::from_member(bilinear_info(), vec![lower, upper]).is_err());
    }

    #[test]
    fn test_force_positive_clamps() {
        let block = SubgridBlock {
            xs: vec![0.1, 0.5],
            qs: vec![10.0f64.sqrt(), 10.0],
            q2s: vec![10.0, 100.0],
            flavors: vec![21],
            values: vec![-1.0, -1.0, -1.0, -1.0],
        };
        let mut info = bilinear_info();
        info.set_entry("ForcePositive", 1);
        let pdf = GridPdf::from_member(info, vec![block.clone()]).unwrap();
        assert_eq!(pdf.xfx_q2(21, 0.3, 55.0).unwrap(), 0.0);

        let mut info = bilinear_info();
        info.set_entry("ForcePositive", 2);
        let pdf = GridPdf::from_member(info, vec![block]).unwrap();
        assert_eq!(pdf.xfx_q2(21, 0.3, 55.0).unwrap(), 1e-10);
    }

    #[test]
    fn test_fill_buffer() {
        let pdf = scenario_pdf();
        let mut out = [0.0; 13];
        pdf.xfx_q2_fill(0.3, 55.0, &mut out).unwrap();
        assert_close(out[6], 2.5, 1e-12);
        assert!(out.iter().enumerate().all(|(i, &v)| i == 6 || v == 0.0));
    }

    #[test]
    fn test_bulk_grid_matches_pointwise() {
        let pdf = scenario_pdf();
        let ids = [21, 1];
        let xs = [0.1, 0.3, 0.5];
        let q2s = [10.0, 55.0, 100.0];
        let bulk = pdf.xfx_q2_grid(&ids, &xs, &q2s).unwrap();
        for (i, &id) in ids.iter().enumerate() {
            for (j, &x) in xs.iter().enumerate() {
                for (k, &q2) in q2s.iter().enumerate() {
                    assert_eq!(bulk[[i, j, k]], pdf.xfx_q2(id, x, q2).unwrap());
                }
            }
        }
    }

    #[test]
    fn test_flavors_from_metadata_override() {
        let mut info = bilinear_info();
        info.set_entry("Flavors", "[21, 1, -1]");
        let pdf = GridPdf::from_member(info, vec![scenario_block()]).unwrap();
        assert_eq!(pdf.flavors(), &[-1, 1, 21]);
        assert!(pdf.has_flavor(1));
        // Declared but untabulated flavours fail at interpolation time.
        assert!(pdf.xfx_q2(1, 0.3, 55.0).is_err());
    }
}
