//! Reading of member data files.
//!
//! A member file is multi-document text: a YAML header with the keys the
//! member overrides, then one or more subgrid blocks separated by `---`
//! lines. Inside a block the first non-comment line holds the x knots, the
//! second the Q knots (stored as Q, interpreted as Q2 = Q*Q), the third the
//! flavour id list, and the remainder the |x|*|Q| rows of |F| values each,
//! ordered by x (outer) then Q (inner). Lines starting with `#` are
//! comments.

use std::fs;
use std::path::Path;

use super::error::{Error, Result};
use super::info::Info;

/// One parsed subgrid block.
#[derive(Debug, Clone)]
pub struct SubgridBlock {
    /// Ascending x knots in (0, 1].
    pub xs: Vec<f64>,
    /// Ascending Q knots as given in the file, in GeV.
    pub qs: Vec<f64>,
    /// The Q knots squared, the axis actually used for evaluation.
    pub q2s: Vec<f64>,
    /// Flavour ids in the column order of the data rows.
    pub flavors: Vec<i32>,
    /// Flat `xf` values: index `(ix * nq + iq) * nflav + iflav`.
    pub values: Vec<f64>,
}

/// A fully parsed member data file.
#[derive(Debug, Clone)]
pub struct MemberData {
    /// The member-local metadata from the leading YAML document.
    pub header: Info,
    /// The subgrid blocks in file order, i.e. ascending in Q.
    pub blocks: Vec<SubgridBlock>,
}

/// Reads and parses a member data file.
pub fn read_member(path: &Path) -> Result<MemberData> {
    let content = fs::read_to_string(path).map_err(|err| {
        let path = path.display().to_string();
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound { path }
        } else {
            Error::ReadFailure {
                path,
                reason: err.to_string(),
            }
        }
    })?;
    read_member_str(&content, &path.display().to_string())
}

/// Parses member data from an in-memory string; `label` names the source in
/// error messages.
pub fn read_member_str(content: &str, label: &str) -> Result<MemberData> {
    let fail = |reason: String| Error::ReadFailure {
        path: label.to_string(),
        reason,
    };

    let header = Info::from_yaml_str(content).map_err(|err| match err {
        Error::ReadFailure { reason, .. } => fail(reason),
        other => other,
    })?;

    // Group lines into documents at lines holding exactly `---`.
    let mut docs: Vec<Vec<&str>> = vec![Vec::new()];
    for line in content.lines() {
        let line = line.trim();
        if line == "---" {
            docs.push(Vec::new());
        } else if !line.is_empty() && !line.starts_with('#') {
            docs.last_mut().unwrap().push(line);
        }
    }

    let mut blocks = Vec::new();
    for (iblock, lines) in docs.iter().enumerate() {
        // Document 0 is the metadata handled above.
        if iblock == 0 || lines.is_empty() {
            continue;
        }
        if lines.len() < 4 {
            return Err(fail(format!(
                "subgrid block {iblock} is truncated: {} lines",
                lines.len()
            )));
        }

        let xs = parse_floats(lines[0]).map_err(&fail)?;
        let qs = parse_floats(lines[1]).map_err(&fail)?;
        let flavors = parse_ints(lines[2]).map_err(&fail)?;
        let q2s: Vec<f64> = qs.iter().map(|&q| q * q).collect();

        let expected_rows = xs.len() * qs.len();
        let data_lines: &[&str] = &lines[3..];
        if data_lines.len() != expected_rows {
            return Err(fail(format!(
                "subgrid block {iblock} has {} data rows but {} x {} = {expected_rows} expected",
                data_lines.len(),
                xs.len(),
                qs.len()
            )));
        }

        let mut values = Vec::with_capacity(expected_rows * flavors.len());
        for (irow, line) in data_lines.iter().enumerate() {
            let row = parse_floats(line).map_err(&fail)?;
            if row.len() != flavors.len() {
                return Err(fail(format!(
                    "data row {irow} of subgrid block {iblock} has {} flavor entries \
                     but {} expected",
                    row.len(),
                    flavors.len()
                )));
            }
            values.extend(row);
        }

        blocks.push(SubgridBlock {
            xs,
            qs,
            q2s,
            flavors,
            values,
        });
    }

    if blocks.is_empty() {
        return Err(fail("no subgrid blocks found".to_string()));
    }
    Ok(MemberData { header, blocks })
}

fn parse_floats(line: &str) -> std::result::Result<Vec<f64>, String> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| format!("invalid numeric token `{token}`"))
        })
        .collect()
}

fn parse_ints(line: &str) -> std::result::Result<Vec<i32>, String> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| format!("invalid flavor id `{token}`"))
        })
        .collect()
}
