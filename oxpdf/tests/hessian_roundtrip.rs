//! Round-trip of the Hessian -> replica conversion: the generated replica
//! ensemble reproduces the source set's central value and symmetric
//! uncertainty.

mod common;

use oxpdf::hessian::convert_hessian_to_replicas;
use oxpdf::paths;
use oxpdf::pdf::Pdf;
use oxpdf::set::{ErrorType, PdfSet};
use tempfile::TempDir;

/// A one-subgrid member holding the same value at every knot, so bilinear
/// interpolation returns it exactly anywhere on the grid.
fn const_member(value: f64, pdf_type: &str) -> String {
    let mut out = format!("PdfType: {pdf_type}\n---\n");
    out.push_str("1.0e-1 5.0e-1 1.0\n");
    out.push_str("1.0 2.0\n");
    out.push_str("21\n");
    for _ in 0..6 {
        out.push_str(&format!("{value}\n"));
    }
    out.push_str("---\n");
    out
}

fn set_info(error_type: &str, num_members: usize) -> String {
    format!(
        "SetDesc: \"Hessian conversion toy set\"
SetIndex: 91000
NumMembers: {num_members}
Flavors: [21]
Format: lhagrid1
XMin: 0.1
XMax: 1.0
Q2Min: 1.0
Q2Max: 4.0
ErrorType: {error_type}
Interpolator: linear
Extrapolator: nearest
"
    )
}

#[test]
fn test_symmhessian_to_replicas_roundtrip() {
    let src = TempDir::new().unwrap();
    common::write_set(
        src.path(),
        "oxconv_symm",
        &set_info("symmhessian", 3),
        &[
            const_member(2.0, "central"),
            const_member(2.1, "error"),
            const_member(1.9, "error"),
        ],
    );
    paths::prepend_path(src.path());

    let set = PdfSet::new("oxconv_symm").unwrap();
    let out = TempDir::new().unwrap();
    convert_hessian_to_replicas(&set, "oxconv_symm_rand", 42, 1000, out.path(), true).unwrap();

    // The rewritten info describes a replica set and drops the index and
    // confidence-level entries.
    let info_text = std::fs::read_to_string(
        out.path()
            .join("oxconv_symm_rand/oxconv_symm_rand.info"),
    )
    .unwrap();
    assert!(info_text.contains("ErrorType: replicas"));
    assert!(info_text.contains("NumMembers: 1001"));
    assert!(!info_text.contains("SetIndex"));
    assert!(!info_text.contains("ErrorConfLevel"));
    assert!(info_text.contains("Based on original oxconv_symm"));

    paths::prepend_path(out.path());
    let randset = PdfSet::new("oxconv_symm_rand").unwrap();
    assert_eq!(randset.size().unwrap(), 1001);
    assert_eq!(randset.error_type().unwrap(), ErrorType::Replicas);

    let pdfs = randset.mk_pdfs().unwrap();
    let values: Vec<f64> = pdfs
        .iter()
        .map(|pdf| pdf.xfx_q2(21, 0.3, 2.0).unwrap())
        .collect();

    // With symmetrised sampling the replica mean tends to the best fit and
    // the standard deviation to the source errsymm = sqrt(0.1^2 + 0.1^2).
    let unc = randset.uncertainty(&values).unwrap();
    let target_sd = (0.01f64 + 0.01).sqrt();
    assert!(
        (unc.central - 2.0).abs() / 2.0 < 0.02,
        "replica mean {} too far from 2.0",
        unc.central
    );
    assert!(
        (unc.errsymm - target_sd).abs() / target_sd < 0.08,
        "replica spread {} too far from {target_sd}",
        unc.errsymm
    );
    assert_eq!(unc.errplus, unc.errminus);

    // Member 0 was written last as the running mean of the replicas.
    let mean: f64 = values[1..].iter().sum::<f64>() / 1000.0;
    assert!((values[0] - mean).abs() < 1e-6);
}

#[test]
fn test_asymmetric_hessian_conversion() {
    let src = TempDir::new().unwrap();
    common::write_set(
        src.path(),
        "oxconv_hess",
        &set_info("hessian", 5),
        &[
            const_member(2.0, "central"),
            const_member(2.2, "error"),
            const_member(1.8, "error"),
            const_member(2.05, "error"),
            const_member(1.95, "error"),
        ],
    );
    paths::prepend_path(src.path());

    let set = PdfSet::new("oxconv_hess").unwrap();
    let out = TempDir::new().unwrap();
    convert_hessian_to_replicas(&set, "oxconv_hess_rand", 7, 80, out.path(), false).unwrap();

    paths::prepend_path(out.path());
    let randset = PdfSet::new("oxconv_hess_rand").unwrap();
    assert_eq!(randset.size().unwrap(), 81);

    let pdfs = randset.mk_pdfs().unwrap();
    let values: Vec<f64> = pdfs
        .iter()
        .map(|pdf| pdf.xfx_q2(21, 0.5, 3.0).unwrap())
        .collect();

    let unc = randset.uncertainty(&values).unwrap();
    assert!(unc.errsymm > 0.0);
    // The replicas scatter around the source best fit.
    assert!((unc.central - 2.0).abs() < 0.2);
}
