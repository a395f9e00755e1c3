//! Clang probing.
//!
//! Includes are extracted exactly like gcc's. Library directories come
//! from `-print-search-dirs`: the `libraries: =` line is split on `;`, and
//! for every entry both `<entry>\lib\windows` and the grandparent
//! `<entry>\..\..` are recorded, which is where LLVM-on-Windows keeps its
//! runtime and import libraries.

use std::path::Path;

use anyhow::Result;

use crate::dirlist::DirList;
use crate::probe::gnu;
use crate::spawn;

const LIBRARIES_PREFIX: &str = "libraries: =";

pub fn parse_search_dirs(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .find_map(|l| l.strip_prefix(LIBRARIES_PREFIX))
        .map(|value| gnu::split_path_list(value))
        .unwrap_or_default()
}

pub fn include_dirs(
    short_name: &str,
    exe: &Path,
    cygwin_root: Option<&Path>,
    case_sensitive: bool,
) -> Result<DirList> {
    gnu::include_dirs(short_name, exe, false, cygwin_root, case_sensitive)
}

pub fn library_dirs(short_name: &str, exe: &Path, case_sensitive: bool) -> Result<DirList> {
    let lines = spawn::capture(exe, &["-print-search-dirs"])?;
    let mut list = DirList::new(short_name);
    for entry in parse_search_dirs(&lines) {
        list.push_dir(
            &crate::canon::canonicalize(&format!("{entry}\\lib\\windows"), None),
            None,
            case_sensitive,
        );
        list.push_dir(
            &crate::canon::canonicalize(&format!("{entry}\\..\\.."), None),
            None,
            case_sensitive,
        );
    }
    list.uniquify(case_sensitive);
    Ok(list)
}
