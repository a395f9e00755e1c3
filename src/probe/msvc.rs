//! MSVC probing.
//!
//! `cl.exe` is only resolved on `PATH` to prove a Visual-C++ environment
//! is active; its search paths are whatever `INCLUDE` and `LIB` say in the
//! process environment (vcvars already did the work).

use anyhow::Result;

use crate::dirlist::{DirList, SplitOptions};

fn from_env(short_name: &str, var: &str, opts: &SplitOptions) -> Result<DirList> {
    let value = std::env::var(var).unwrap_or_default();
    let mut list = DirList::split(short_name, &value, opts);
    list.uniquify(opts.case_sensitive);
    Ok(list)
}

pub fn include_dirs(short_name: &str, opts: &SplitOptions) -> Result<DirList> {
    from_env(short_name, "INCLUDE", opts)
}

pub fn library_dirs(short_name: &str, opts: &SplitOptions) -> Result<DirList> {
    from_env(short_name, "LIB", opts)
}
