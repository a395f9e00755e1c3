//! Open Watcom probing.
//!
//! Watcom never gets spawned: its search directories are fixed relative to
//! `%WATCOM%` (plus `%NT_INCLUDE%` for headers). Entries whose variables
//! are unset simply drop out.

use anyhow::Result;

use crate::canon;
use crate::dirlist::DirList;

const INCLUDE_SPECS: &[&str] = &["%WATCOM%\\h", "%WATCOM%\\h\\nt", "%WATCOM%\\lh", "%NT_INCLUDE%"];
const LIBRARY_SPECS: &[&str] = &[
    "%WATCOM%\\lib386",
    "%WATCOM%\\lib386\\nt",
    "%WATCOM%\\lib386\\linux",
];

fn expand_specs(short_name: &str, specs: &[&str], case_sensitive: bool) -> DirList {
    let mut list = DirList::new(short_name);
    for spec in specs {
        let expanded = canon::expand(spec);
        if !expanded.complete {
            tracing::debug!("{short_name}: {spec} not resolvable");
            continue;
        }
        list.push_dir(&canon::canonicalize(&expanded.text, None), None, case_sensitive);
    }
    list
}

pub fn include_dirs(short_name: &str, case_sensitive: bool) -> Result<DirList> {
    Ok(expand_specs(short_name, INCLUDE_SPECS, case_sensitive))
}

pub fn library_dirs(short_name: &str, case_sensitive: bool) -> Result<DirList> {
    Ok(expand_specs(short_name, LIBRARY_SPECS, case_sensitive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_drop_their_entries() {
        // Run with a variable name that cannot exist in the environment.
        let mut list = DirList::new("wcc386.exe");
        let expanded = canon::expand("%ENVTOOL_WATCOM_UNSET%\\h");
        assert!(!expanded.complete);
        if expanded.complete {
            list.push_dir(&expanded.text, None, false);
        }
        assert!(list.is_empty());
    }

    #[test]
    fn resolved_variables_produce_canonical_dirs() {
        std::env::set_var("ENVTOOL_TEST_WATCOM", "c:\\watcom");
        let expanded = canon::expand("%ENVTOOL_TEST_WATCOM%\\lib386\\nt");
        assert!(expanded.complete);
        assert_eq!(
            canon::canonicalize(&expanded.text, None),
            "c:\\watcom\\lib386\\nt"
        );
        std::env::remove_var("ENVTOOL_TEST_WATCOM");
    }
}
