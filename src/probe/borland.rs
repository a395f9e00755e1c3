//! Borland/Embarcadero probing.
//!
//! No spawn: `bcc32.exe`/`bcc32c.exe` read a `.cfg` next to the
//! executable, so the probe does too. Lines of the form `-isystem @\..\x`
//! or `-L@\..\x` are resolved against the compiler's directory (`@` stands
//! for it); plain `-I` / `-L` lines carry `;`-separated path lists.

use std::path::Path;

use anyhow::Result;
use fs_err as fs;

use crate::dirlist::DirList;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CfgPaths {
    pub includes: Vec<String>,
    pub libraries: Vec<String>,
}

pub fn parse_cfg(text: &str, exe_dir: &str) -> CfgPaths {
    let mut paths = CfgPaths::default();
    for line in text.lines() {
        let line = line.trim();
        let (value, out) = if let Some(rest) = line.strip_prefix("-isystem ") {
            (rest.trim(), &mut paths.includes)
        } else if let Some(rest) = line.strip_prefix("-I") {
            (rest.trim(), &mut paths.includes)
        } else if let Some(rest) = line.strip_prefix("-L") {
            (rest.trim(), &mut paths.libraries)
        } else {
            continue;
        };
        for piece in value.split(';') {
            let piece = piece.trim().trim_matches('"');
            if piece.is_empty() {
                continue;
            }
            let resolved = match piece.strip_prefix('@') {
                Some(rel) => format!("{exe_dir}{rel}"),
                None => piece.to_string(),
            };
            out.push(crate::canon::canonicalize(&resolved, None));
        }
    }
    paths
}

fn cfg_paths(short_name: &str, exe: &Path) -> Result<CfgPaths> {
    let cfg = exe.with_extension("cfg");
    let text = fs::read_to_string(&cfg)?;
    let exe_dir = exe
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!("{short_name}: reading {}", cfg.display());
    Ok(parse_cfg(&text, &exe_dir))
}

pub fn include_dirs(short_name: &str, exe: &Path, case_sensitive: bool) -> Result<DirList> {
    let mut list = DirList::new(short_name);
    for dir in cfg_paths(short_name, exe)?.includes {
        list.push_dir(&dir, None, case_sensitive);
    }
    list.uniquify(case_sensitive);
    Ok(list)
}

pub fn library_dirs(short_name: &str, exe: &Path, case_sensitive: bool) -> Result<DirList> {
    let mut list = DirList::new(short_name);
    for dir in cfg_paths(short_name, exe)?.libraries {
        list.push_dir(&dir, None, case_sensitive);
    }
    list.uniquify(case_sensitive);
    Ok(list)
}
