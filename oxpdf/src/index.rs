//! Global id lookup via the `pdfsets.index` file.
//!
//! The index maps a contiguous integer id base per set to the set name; a
//! member's global id is `base + member`. The file holds `id name` pairs,
//! one per line, with `#` comments.

use std::collections::BTreeMap;
use std::fs;

use super::error::{Error, Result};
use super::paths;

fn parse_index(content: &str) -> BTreeMap<i32, String> {
    let mut index = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        if let (Some(id), Some(name)) = (tokens.next(), tokens.next()) {
            if let Ok(id) = id.parse::<i32>() {
                index.insert(id, name.to_string());
            }
        }
    }
    index
}

fn load_index() -> Result<BTreeMap<i32, String>> {
    let path = paths::find_file("pdfsets.index").ok_or_else(|| Error::FileNotFound {
        path: "pdfsets.index".to_string(),
    })?;
    let content = fs::read_to_string(&path).map_err(|err| Error::ReadFailure {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    Ok(parse_index(&content))
}

/// Resolves a global member id to `(set name, member number)`.
///
/// The owning set is the one with the greatest id base at or below `lhaid`;
/// the member number is the offset from that base.
pub fn lookup_pdf(lhaid: i32) -> Result<(String, i32)> {
    let index = load_index()?;
    index
        .range(..=lhaid)
        .next_back()
        .map(|(&base, name)| (name.clone(), lhaid - base))
        .ok_or(Error::IndexLookup { lhaid })
}

/// Decodes a `SETNAME/member` string; a bare set name means member 0.
pub fn lookup_pdf_str(pdfstr: &str) -> Result<(String, i32)> {
    match pdfstr.split_once('/') {
        None => Ok((pdfstr.trim().to_string(), 0)),
        Some((name, member)) => {
            let member = member.trim().parse().map_err(|_| {
                Error::UserError(format!("could not parse PDF identity string `{pdfstr}`"))
            })?;
            Ok((name.trim().to_string(), member))
        }
    }
}

/// Reverse lookup: the global id of `(setname, member)`, or `None` when the
/// set has no index entry.
pub fn lookup_lhapdf_id(setname: &str, member: i32) -> Result<Option<i32>> {
    let index = load_index()?;
    Ok(index
        .iter()
        .find(|(_, name)| name.as_str() == setname)
        .map(|(&base, _)| base + member))
}
