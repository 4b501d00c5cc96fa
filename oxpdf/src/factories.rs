//! Construction of PDFs, strategies, and coupling engines by name.

use std::sync::Arc;

use super::alphas::{AlphaS, AlphaSAnalytic, AlphaSIpol, AlphaSOde, QcdParams};
use super::error::{Error, Result};
use super::extrapolation::{ErrorExtrapolator, Extrapolator, NearestPointExtrapolator};
use super::gridpdf::GridPdf;
use super::index;
use super::info::Info;
use super::interpolation::{
    BicubicInterpolator, BilinearInterpolator, Interpolator, LogBicubicInterpolator,
    LogBilinearInterpolator,
};
use super::parser;
use super::paths;
use super::pdf::Pdf;

/// Builds an interpolator from its short metadata name.
pub fn mk_interpolator(name: &str) -> Result<Box<dyn Interpolator>> {
    match name.to_lowercase().as_str() {
        "linear" => Ok(Box::new(BilinearInterpolator)),
        "log" => Ok(Box::new(LogBilinearInterpolator)),
        "cubic" => Ok(Box::new(BicubicInterpolator)),
        "logcubic" => Ok(Box::new(LogBicubicInterpolator)),
        _ => Err(Error::FactoryUnknown {
            what: "interpolator",
            name: name.to_string(),
        }),
    }
}

/// Builds an extrapolator from its short metadata name.
pub fn mk_extrapolator(name: &str) -> Result<Box<dyn Extrapolator>> {
    match name.to_lowercase().as_str() {
        "nearest" => Ok(Box::new(NearestPointExtrapolator)),
        "error" => Ok(Box::new(ErrorExtrapolator)),
        _ => Err(Error::FactoryUnknown {
            what: "extrapolator",
            name: name.to_string(),
        }),
    }
}

/// Builds a strong-coupling engine from the `AlphaS_*` metadata entries.
pub fn mk_alphas(info: &Info) -> Result<AlphaS> {
    let variant = info.entry("AlphaS_Type")?.to_lowercase();

    let mut params = QcdParams::new(info.entry_as_or::<u32>("AlphaS_OrderQCD", 4)?);
    let mass_keys = [
        (1, "MDown"),
        (2, "MUp"),
        (3, "MStrange"),
        (4, "MCharm"),
        (5, "MBottom"),
        (6, "MTop"),
    ];
    for (id, key) in mass_keys {
        if info.has_key(key) {
            params.set_quark_mass(id, info.entry_as(key)?)?;
        }
    }

    match variant.as_str() {
        "analytic" => {
            let mut engine = AlphaSAnalytic::new(params);
            let mut any_lambda = false;
            for (nf, key) in [
                (3, "AlphaS_Lambda3"),
                (4, "AlphaS_Lambda4"),
                (5, "AlphaS_Lambda5"),
            ] {
                if info.has_key(key) {
                    engine.set_lambda(nf, info.entry_as(key)?)?;
                    any_lambda = true;
                }
            }
            if !any_lambda {
                return Err(Error::MetadataMissing {
                    key: "AlphaS_Lambda5".to_string(),
                });
            }
            Ok(AlphaS::Analytic(engine))
        }
        "ode" => {
            let mz = info.entry_as::<f64>("MZ")?;
            let alphas_mz = info.entry_as::<f64>("AlphaS_MZ")?;
            Ok(AlphaS::Ode(AlphaSOde::new(params, mz, alphas_mz)))
        }
        "ipol" => {
            let qs = info.entry_list::<f64>("AlphaS_Qs")?;
            let vals = info.entry_list::<f64>("AlphaS_Vals")?;
            Ok(AlphaS::Ipol(AlphaSIpol::new(params, &qs, &vals)?))
        }
        _ => Err(Error::FactoryUnknown {
            what: "alpha_s variant",
            name: variant,
        }),
    }
}

/// Constructs one member of a named set found on the search path.
///
/// The member's own header entries shadow the set-level info through the
/// metadata cascade. Dispatches on the `Format` entry; the grid format is
/// the only one known.
pub fn mk_pdf(setname: &str, member: usize) -> Result<Box<dyn Pdf>> {
    let mem_path = paths::find_pdf_mem_path(setname, member).ok_or_else(|| Error::FileNotFound {
        path: paths::pdf_mem_path(setname, member).display().to_string(),
    })?;
    let info_path = paths::find_pdf_set_info_path(setname).ok_or_else(|| Error::FileNotFound {
        path: paths::pdf_set_info_path(setname).display().to_string(),
    })?;

    let set_info = Arc::new(Info::load(&info_path)?);
    let data = parser::read_member(&mem_path)?;
    let info = data.header.with_fallback(set_info);

    let format = info.entry("Format")?;
    if format != "lhagrid1" {
        return Err(Error::FactoryUnknown {
            what: "PDF format",
            name: format.to_string(),
        });
    }
    Ok(Box::new(GridPdf::from_member(info, data.blocks)?))
}

/// Constructs a PDF from its global id in `pdfsets.index`.
pub fn mk_pdf_lhaid(lhaid: i32) -> Result<Box<dyn Pdf>> {
    let (setname, member) = index::lookup_pdf(lhaid)?;
    let member = usize::try_from(member).map_err(|_| Error::IndexLookup { lhaid })?;
    mk_pdf(&setname, member)
}

/// Constructs a PDF from a `SETNAME/member` string; a bare set name means
/// member 0.
pub fn mk_pdf_str(pdfstr: &str) -> Result<Box<dyn Pdf>> {
    let (setname, member) = index::lookup_pdf_str(pdfstr)?;
    let member = usize::try_from(member).map_err(|_| {
        Error::UserError(format!("negative member number in `{pdfstr}`"))
    })?;
    mk_pdf(&setname, member)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_names_rejected() {
        assert!(matches!(
            mk_interpolator("spline9"),
            Err(Error::FactoryUnknown {
                what: "interpolator",
                ..
            })
        ));
        assert!(matches!(
            mk_extrapolator("wild"),
            Err(Error::FactoryUnknown {
                what: "extrapolator",
                ..
            })
        ));
    }

    #[test]
    fn test_known_names_case_insensitive() {
        assert!(mk_interpolator("LogCubic").is_ok());
        assert!(mk_interpolator("linear").is_ok());
        assert!(mk_extrapolator("Nearest").is_ok());
        assert!(mk_extrapolator("error").is_ok());
    }

    #[test]
    fn test_mk_alphas_analytic() {
        let mut info = Info::new();
        info.set_entry("AlphaS_Type", "analytic");
        info.set_entry("AlphaS_OrderQCD", 2);
        info.set_entry("AlphaS_Lambda3", 0.339);
        info.set_entry("AlphaS_Lambda4", 0.296);
        info.set_entry("AlphaS_Lambda5", 0.213);
        info.set_entry("MCharm", 1.29);
        info.set_entry("MBottom", 4.1);
        info.set_entry("MTop", 172.5);

        let engine = mk_alphas(&info).unwrap();
        let alphas = engine.alphas_q2(91.1876 * 91.1876).unwrap();
        assert!((alphas - 0.118).abs() < 0.002);
    }

    #[test]
    fn test_mk_alphas_requires_parameters() {
        let mut info = Info::new();
        info.set_entry("AlphaS_Type", "analytic");
        assert!(matches!(
            mk_alphas(&info),
            Err(Error::MetadataMissing { .. })
        ));

        let mut info = Info::new();
        info.set_entry("AlphaS_Type", "ode");
        info.set_entry("MZ", 91.1876);
        // AlphaS_MZ still missing.
        assert!(matches!(
            mk_alphas(&info),
            Err(Error::MetadataMissing { .. })
        ));

        let mut info = Info::new();
        info.set_entry("AlphaS_Type", "frobnicate");
        assert!(matches!(
            mk_alphas(&info),
            Err(Error::FactoryUnknown {
                what: "alpha_s variant",
                ..
            })
        ));
    }

    #[test]
    fn test_mk_alphas_ipol() {
        let mut info = Info::new();
        info.set_entry("AlphaS_Type", "ipol");
        info.set_entry("AlphaS_Qs", "[1.0, 10.0, 100.0]");
        info.set_entry("AlphaS_Vals", "[0.35, 0.18, 0.11]");
        let engine = mk_alphas(&info).unwrap();
        assert!((engine.alphas_q2(100.0).unwrap() - 0.18).abs() < 1e-9);
    }
}
