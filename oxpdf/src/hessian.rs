//! Conversion of a Hessian set into a random-replica set on disk.
//!
//! Each replica member draws one standard-normal number per eigenvector and
//! applies [`PdfSet::random_value`] with that same random vector to every
//! sampled quantity: `alpha_s(MZ)`, each tabulated `alpha_s` point, and the
//! `xf` value at every knot of every subgrid and flavour. Sharing the
//! vector across quantities is what preserves their correlations. Member 0
//! is written last, holding the running mean over the generated replicas.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use itertools::Itertools;
use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use statrs::distribution::Normal;

use super::error::{Error, Result};
use super::parser::{self, MemberData, SubgridBlock};
use super::paths;
use super::set::{ErrorType, PdfSet};

fn write_err(path: &Path) -> impl Fn(std::io::Error) -> Error + '_ {
    move |err| Error::WriteFailure {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Converts a (symm-)Hessian `set` into a replica set named `randset_name`.
///
/// Writes `n_rep + 1` member files plus a rewritten info file into
/// `out_dir/randset_name/`. `seed` makes the generated replicas
/// reproducible. With `symmetrise` the replica average tends to the
/// best-fit member; without it the directional eigenvector excursions are
/// kept and the average may differ from the best fit.
pub fn convert_hessian_to_replicas(
    set: &PdfSet,
    randset_name: &str,
    seed: u64,
    n_rep: u32,
    out_dir: &Path,
    symmetrise: bool,
) -> Result<()> {
    let error_type = set.error_type()?;
    if !matches!(error_type, ErrorType::Hessian | ErrorType::SymmHessian) {
        return Err(Error::UserError(
            "replica conversion requires a Hessian-format set".to_string(),
        ));
    }
    if !(1..=9999).contains(&n_rep) {
        return Err(Error::UserError(format!(
            "number of replicas must be between 1 and 9999, got {n_rep}"
        )));
    }

    let size = set.size()?;
    let nmem = size - 1;
    let neigen = match error_type {
        ErrorType::Hessian => nmem / 2,
        _ => nmem,
    };

    let randset_dir = out_dir.join(randset_name);
    fs::create_dir_all(&randset_dir).map_err(write_err(&randset_dir))?;
    rewrite_info(set, randset_name, &randset_dir, n_rep, symmetrise)?;

    // Parse every member file: the knot layout must agree across members,
    // while AlphaS_MZ / AlphaS_Vals may differ per member.
    let mut members = Vec::with_capacity(size);
    for imem in 0..size {
        let path =
            paths::find_pdf_mem_path(set.name(), imem).ok_or_else(|| Error::FileNotFound {
                path: paths::pdf_mem_path(set.name(), imem).display().to_string(),
            })?;
        members.push(parser::read_member(&path)?);
    }
    let template = &members[0];
    check_members_consistent(&members)?;

    let alphas_mz = collect_member_entries(&members, "AlphaS_MZ")?;
    let alphas_qs: Option<Vec<f64>> = if template.header.has_key_local("AlphaS_Qs") {
        Some(template.header.entry_list("AlphaS_Qs")?)
    } else {
        None
    };
    let alphas_vals: Option<Vec<Vec<f64>>> = match &alphas_qs {
        Some(qs) => {
            let mut per_member = Vec::with_capacity(size);
            for data in &members {
                let vals: Vec<f64> = data.header.entry_list("AlphaS_Vals")?;
                if vals.len() != qs.len() {
                    return Err(Error::UserError(
                        "AlphaS_Vals length differs from AlphaS_Qs".to_string(),
                    ));
                }
                per_member.push(vals);
            }
            Some(per_member)
        }
        None => None,
    };

    // xf at every knot for every member, in member 0's knot layout. The
    // columns do not depend on the replica index, so they are evaluated
    // once up front.
    let knot_columns = collect_knot_columns(set, template)?;

    let mut rng = Pcg64::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).expect("unit normal is valid");

    let mut mz_mean = 0.0;
    let mut vals_mean = vec![0.0; alphas_qs.as_ref().map_or(0, Vec::len)];
    let mut xf_mean = vec![0.0; knot_columns.len()];

    // Replica members first; member 0 last, from the accumulated means.
    for ireplica in 1..=n_rep + 1 {
        let irep = if ireplica == n_rep + 1 { 0 } else { ireplica };
        let randoms: Vec<f64> = if irep > 0 {
            (0..neigen).map(|_| normal.sample(&mut rng)).collect()
        } else {
            Vec::new()
        };

        let mut header: BTreeMap<String, String> = template
            .header
            .entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        header.insert(
            "PdfType".to_string(),
            if irep == 0 { "central" } else { "replica" }.to_string(),
        );

        if let Some(mzs) = &alphas_mz {
            let value = if irep > 0 {
                let sampled = set.random_value(mzs, &randoms, symmetrise)?;
                mz_mean += sampled;
                sampled
            } else {
                mz_mean / f64::from(n_rep)
            };
            header.insert("AlphaS_MZ".to_string(), format!("{value:.6e}"));
        }

        if let (Some(per_member), Some(qs)) = (&alphas_vals, &alphas_qs) {
            let mut sampled_vals = Vec::with_capacity(qs.len());
            for iq in 0..qs.len() {
                let column: Vec<f64> = per_member.iter().map(|vals| vals[iq]).collect();
                let value = if irep > 0 {
                    let sampled = set.random_value(&column, &randoms, symmetrise)?;
                    vals_mean[iq] += sampled;
                    sampled
                } else {
                    vals_mean[iq] / f64::from(n_rep)
                };
                sampled_vals.push(value);
            }
            header.insert(
                "AlphaS_Vals".to_string(),
                format!(
                    "[{}]",
                    sampled_vals.iter().map(|v| format!("{v:.6e}")).join(", ")
                ),
            );
        }

        let mut sampled_xfs = Vec::with_capacity(knot_columns.len());
        for (iknot, column) in knot_columns.iter().enumerate() {
            let value = if irep > 0 {
                let sampled = set.random_value(column, &randoms, symmetrise)?;
                xf_mean[iknot] += sampled;
                sampled
            } else {
                xf_mean[iknot] / f64::from(n_rep)
            };
            sampled_xfs.push(value);
        }

        write_member_file(
            &randset_dir,
            randset_name,
            irep,
            &header,
            &template.blocks,
            &sampled_xfs,
        )?;
    }

    Ok(())
}

/// Copies the source info file, rewriting the entries that describe the set:
/// `SetDesc` is annotated, `SetIndex` and `ErrorConfLevel` are dropped,
/// `NumMembers` and `ErrorType` are replaced.
fn rewrite_info(
    set: &PdfSet,
    randset_name: &str,
    randset_dir: &Path,
    n_rep: u32,
    symmetrise: bool,
) -> Result<()> {
    let src = paths::find_pdf_set_info_path(set.name()).ok_or_else(|| Error::FileNotFound {
        path: paths::pdf_set_info_path(set.name()).display().to_string(),
    })?;
    let content = fs::read_to_string(&src).map_err(|err| Error::ReadFailure {
        path: src.display().to_string(),
        reason: err.to_string(),
    })?;

    let mut out = String::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("SetDesc") {
            let equation = if symmetrise {
                "Eq. (6.5) of arXiv:1205.4024v2"
            } else {
                "Eq. (6.4) of arXiv:1205.4024v2"
            };
            out.push_str(&format!(
                "SetDesc: \"Based on original {}. This set has {} member PDFs. \
                 mem=0 => average over {n_rep} random PDFs; mem=1-{n_rep} => {n_rep} \
                 random PDFs generated using {equation}\"\n",
                set.name(),
                n_rep + 1,
            ));
        } else if trimmed.starts_with("SetIndex") || trimmed.starts_with("ErrorConfLevel") {
            // Dropped in the converted set.
        } else if trimmed.starts_with("NumMembers") {
            out.push_str(&format!("NumMembers: {}\n", n_rep + 1));
        } else if trimmed.starts_with("ErrorType") {
            out.push_str("ErrorType: replicas\n");
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }

    let dst = randset_dir.join(format!("{randset_name}.info"));
    fs::write(&dst, out).map_err(write_err(&dst))
}

fn check_members_consistent(members: &[MemberData]) -> Result<()> {
    let template = &members[0];
    for data in &members[1..] {
        if data.blocks.len() != template.blocks.len() {
            return Err(Error::UserError(
                "subgrid count differs between members".to_string(),
            ));
        }
        for (a, b) in data.blocks.iter().zip(&template.blocks) {
            if a.xs != b.xs || a.qs != b.qs || a.flavors != b.flavors {
                return Err(Error::UserError(
                    "knots and flavours must be identical for all members".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Per-member values of a header entry, if every member carries it.
fn collect_member_entries(members: &[MemberData], key: &str) -> Result<Option<Vec<f64>>> {
    if !members.iter().all(|data| data.header.has_key_local(key)) {
        return Ok(None);
    }
    let values = members
        .iter()
        .map(|data| data.header.entry_as(key))
        .collect::<Result<Vec<f64>>>()?;
    Ok(Some(values))
}

/// Evaluates xf at every (subgrid, x, Q, flavour) knot for every member,
/// returning one member-value column per knot, flattened in write order.
///
/// At interior subgrid boundaries Q is nudged by 1e-15 so the evaluation
/// lands on the correct side: the first Q of an upper subgrid is shifted up
/// and the last Q of a lower subgrid down.
fn collect_knot_columns(set: &PdfSet, template: &MemberData) -> Result<Vec<Vec<f64>>> {
    let pdfs = set.mk_pdfs()?;
    let nblocks = template.blocks.len();
    let mut columns = Vec::new();

    for (isub, block) in template.blocks.iter().enumerate() {
        for &x in &block.xs {
            for (iq, &q) in block.qs.iter().enumerate() {
                let q = if isub > 0 && iq == 0 {
                    q + 1e-15
                } else if isub < nblocks - 1 && iq == block.qs.len() - 1 {
                    q - 1e-15
                } else {
                    q
                };
                for &flavor in &block.flavors {
                    let column = pdfs
                        .iter()
                        .map(|pdf| pdf.xfx_q(flavor, x, q))
                        .collect::<Result<Vec<f64>>>()?;
                    columns.push(column);
                }
            }
        }
    }
    Ok(columns)
}

/// Writes one member data file: the header entries, then each subgrid block
/// with its knot lines and `nx * nq` rows of flavour columns.
fn write_member_file(
    randset_dir: &Path,
    randset_name: &str,
    irep: u32,
    header: &BTreeMap<String, String>,
    blocks: &[SubgridBlock],
    xf_values: &[f64],
) -> Result<()> {
    let path = randset_dir.join(format!("{randset_name}_{irep:04}.dat"));
    let file = fs::File::create(&path).map_err(write_err(&path))?;
    let mut out = std::io::BufWriter::new(file);
    let fail = write_err(&path);

    for (key, value) in header {
        writeln!(out, "{key}: {value}").map_err(&fail)?;
    }
    writeln!(out, "---").map_err(&fail)?;

    let mut offset = 0;
    for block in blocks {
        let xs_line = block.xs.iter().map(|x| format!("{x:.6e}")).join(" ");
        writeln!(out, "{xs_line}").map_err(&fail)?;
        let qs_line = block.qs.iter().map(|q| format!("{q:.6e}")).join(" ");
        writeln!(out, "{qs_line}").map_err(&fail)?;
        let flavor_line = block.flavors.iter().map(ToString::to_string).join(" ");
        writeln!(out, "{flavor_line}").map_err(&fail)?;

        let nflav = block.flavors.len();
        for _ in 0..block.xs.len() * block.qs.len() {
            let row = &xf_values[offset..offset + nflav];
            let row_line = row.iter().map(|v| format!("{v:.8e}")).join(" ");
            writeln!(out, "{row_line}").map_err(&fail)?;
            offset += nflav;
        }
        writeln!(out, "---").map_err(&fail)?;
    }
    out.flush().map_err(&fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::Info;

    fn synthetic_set(error_type: &str, num_members: usize) -> PdfSet {
        let mut info = Info::new();
        info.set_entry("ErrorType", error_type);
        info.set_entry("NumMembers", num_members);
        PdfSet::from_info("synthetic", info)
    }

    #[test]
    fn test_rejects_replica_input() {
        let set = synthetic_set("replicas", 11);
        let err = convert_hessian_to_replicas(&set, "out", 42, 10, Path::new("/tmp"), true);
        assert!(matches!(err, Err(Error::UserError(_))));
    }

    #[test]
    fn test_rejects_bad_replica_count() {
        let set = synthetic_set("symmhessian", 3);
        for n_rep in [0, 10_000] {
            let err = convert_hessian_to_replicas(&set, "out", 42, n_rep, Path::new("/tmp"), true);
            assert!(matches!(err, Err(Error::UserError(_))));
        }
    }
}
