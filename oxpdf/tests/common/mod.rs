//! Helpers for writing synthetic PDF sets to disk.

use std::fs;
use std::path::Path;

/// Writes a set directory `<dir>/<name>/` with its info file and one data
/// file per member.
pub fn write_set(dir: &Path, name: &str, info: &str, members: &[String]) {
    let set_dir = dir.join(name);
    fs::create_dir_all(&set_dir).unwrap();
    fs::write(set_dir.join(format!("{name}.info")), info).unwrap();
    for (member, content) in members.iter().enumerate() {
        fs::write(set_dir.join(format!("{name}_{member:04}.dat")), content).unwrap();
    }
}
