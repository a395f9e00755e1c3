//! Toolchain detection and per-compiler search-path probing.
//!
//! Every known toolchain short-name is resolved on `PATH`; the ones that
//! resolve (and are not disabled by a `--no-*` flag or a `[Compiler]`
//! ignore glob) get probed for their effective include and library
//! directories, which then feed the same walk as any environment variable.

mod borland;
mod clang;
mod gnu;
mod msvc;
mod watcom;

use std::path::{Path, PathBuf};

use anyhow::Result;
use which::which;

use crate::config::Config;
use crate::dirlist::{DirList, SplitOptions};
use crate::Bitness;

/// Built-in target prefixes probed for GNU compilers.
pub const GNU_PREFIXES: &[&str] = &[
    "",
    "x86_64-w64-mingw32-",
    "i386-mingw32-",
    "i686-w64-mingw32-",
    "avr-",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainKind {
    GnuCc,
    GnuCxx,
    Clang,
    Msvc,
    Borland,
    Watcom,
}

impl ToolchainKind {
    pub fn label(self) -> &'static str {
        match self {
            ToolchainKind::GnuCc => "gcc",
            ToolchainKind::GnuCxx => "g++",
            ToolchainKind::Clang => "clang",
            ToolchainKind::Msvc => "MSVC",
            ToolchainKind::Borland => "Borland",
            ToolchainKind::Watcom => "Watcom",
        }
    }
}

/// Which toolchains the command line disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct Disables {
    pub gcc: bool,
    pub gxx: bool,
    pub clang: bool,
    pub borland: bool,
    pub watcom: bool,
    /// `--no-prefix`: skip the cross-prefixed GNU variants.
    pub prefixed: bool,
}

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub short_name: String,
    pub full_path: Option<PathBuf>,
    pub kind: ToolchainKind,
    pub ignored: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeOptions<'a> {
    pub case_sensitive: bool,
    pub bits: Bitness,
    pub cygwin_root: Option<&'a Path>,
}

fn candidate_names() -> Vec<(ToolchainKind, String, bool)> {
    let mut names = Vec::new();
    for prefix in GNU_PREFIXES {
        let prefixed = !prefix.is_empty();
        names.push((ToolchainKind::GnuCc, format!("{prefix}gcc.exe"), prefixed));
        names.push((ToolchainKind::GnuCxx, format!("{prefix}g++.exe"), prefixed));
    }
    names.push((ToolchainKind::Clang, "clang.exe".to_string(), false));
    for bcc in ["bcc32.exe", "bcc32c.exe"] {
        names.push((ToolchainKind::Borland, bcc.to_string(), false));
    }
    for wcc in ["wcc386.exe", "wpp386.exe", "wcc.exe", "wpp.exe"] {
        names.push((ToolchainKind::Watcom, wcc.to_string(), false));
    }
    names.push((ToolchainKind::Msvc, "cl.exe".to_string(), false));
    names
}

fn kind_disabled(kind: ToolchainKind, dis: &Disables) -> bool {
    match kind {
        ToolchainKind::GnuCc => dis.gcc,
        ToolchainKind::GnuCxx => dis.gxx,
        ToolchainKind::Clang => dis.clang,
        ToolchainKind::Borland => dis.borland,
        ToolchainKind::Watcom => dis.watcom,
        ToolchainKind::Msvc => false,
    }
}

fn is_ignored(
    config: &Config,
    dis: &Disables,
    kind: ToolchainKind,
    prefixed: bool,
    short_name: &str,
    full_path: Option<&Path>,
) -> bool {
    if kind_disabled(kind, dis) || (prefixed && dis.prefixed) {
        return true;
    }
    let candidate = full_path
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| short_name.to_string());
    config.is_ignored("Compiler", &candidate)
}

/// Resolve all known toolchains. Unresolved ones are kept (they show up in
/// `--check`/verbose reports) but are never probed.
pub fn detect(config: &Config, dis: &Disables) -> Vec<Toolchain> {
    candidate_names()
        .into_iter()
        .map(|(kind, short_name, prefixed)| {
            let stem = short_name.trim_end_matches(".exe");
            let full_path = which(stem).or_else(|_| which(&short_name)).ok();
            let ignored = is_ignored(config, dis, kind, prefixed, &short_name, full_path.as_deref());
            Toolchain {
                short_name,
                full_path,
                kind,
                ignored,
            }
        })
        .collect()
}

impl Toolchain {
    /// Whether this toolchain can be probed at all.
    pub fn probeable(&self) -> bool {
        if self.ignored {
            return false;
        }
        match self.kind {
            // Watcom never spawns; the environment variables are enough.
            ToolchainKind::Watcom => {
                self.full_path.is_some() || std::env::var_os("WATCOM").is_some()
            }
            _ => self.full_path.is_some(),
        }
    }

    pub fn include_dirs(&self, opts: &ProbeOptions) -> Result<DirList> {
        match self.kind {
            ToolchainKind::GnuCc | ToolchainKind::GnuCxx => gnu::include_dirs(
                &self.short_name,
                self.full_path.as_deref().unwrap_or(Path::new("")),
                self.kind == ToolchainKind::GnuCxx,
                opts.cygwin_root,
                opts.case_sensitive,
            ),
            ToolchainKind::Clang => clang::include_dirs(
                &self.short_name,
                self.full_path.as_deref().unwrap_or(Path::new("")),
                opts.cygwin_root,
                opts.case_sensitive,
            ),
            ToolchainKind::Borland => borland::include_dirs(
                &self.short_name,
                self.full_path.as_deref().unwrap_or(Path::new("")),
                opts.case_sensitive,
            ),
            ToolchainKind::Watcom => watcom::include_dirs(&self.short_name, opts.case_sensitive),
            ToolchainKind::Msvc => msvc::include_dirs(
                &self.short_name,
                &SplitOptions {
                    case_sensitive: opts.case_sensitive,
                    ..SplitOptions::default()
                },
            ),
        }
    }

    pub fn library_dirs(&self, opts: &ProbeOptions) -> Result<DirList> {
        match self.kind {
            ToolchainKind::GnuCc | ToolchainKind::GnuCxx => gnu::library_dirs(
                &self.short_name,
                self.full_path.as_deref().unwrap_or(Path::new("")),
                opts.bits,
                opts.cygwin_root,
                opts.case_sensitive,
            ),
            ToolchainKind::Clang => clang::library_dirs(
                &self.short_name,
                self.full_path.as_deref().unwrap_or(Path::new("")),
                opts.case_sensitive,
            ),
            ToolchainKind::Borland => borland::library_dirs(
                &self.short_name,
                self.full_path.as_deref().unwrap_or(Path::new("")),
                opts.case_sensitive,
            ),
            ToolchainKind::Watcom => watcom::library_dirs(&self.short_name, opts.case_sensitive),
            ToolchainKind::Msvc => msvc::library_dirs(
                &self.short_name,
                &SplitOptions {
                    case_sensitive: opts.case_sensitive,
                    ..SplitOptions::default()
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvfile::KvFile;

    fn config_with_ignore(glob: &str) -> Config {
        Config::from_file(KvFile::parse(&format!("[Compiler]\nignore = {glob}\n")))
    }

    #[test]
    fn candidate_list_covers_all_prefixes() {
        let names = candidate_names();
        let gccs: Vec<_> = names
            .iter()
            .filter(|(k, _, _)| *k == ToolchainKind::GnuCc)
            .map(|(_, n, _)| n.as_str())
            .collect();
        assert_eq!(
            gccs,
            [
                "gcc.exe",
                "x86_64-w64-mingw32-gcc.exe",
                "i386-mingw32-gcc.exe",
                "i686-w64-mingw32-gcc.exe",
                "avr-gcc.exe"
            ]
        );
        assert!(names.iter().any(|(k, _, _)| *k == ToolchainKind::Msvc));
    }

    #[test]
    fn disable_flags_suppress_kinds_and_prefixes() {
        let config = Config::default();
        let dis = Disables {
            gxx: true,
            prefixed: true,
            ..Disables::default()
        };
        assert!(is_ignored(&config, &dis, ToolchainKind::GnuCxx, false, "g++.exe", None));
        assert!(is_ignored(
            &config,
            &dis,
            ToolchainKind::GnuCc,
            true,
            "avr-gcc.exe",
            None
        ));
        assert!(!is_ignored(
            &config,
            &dis,
            ToolchainKind::GnuCc,
            false,
            "gcc.exe",
            None
        ));
    }

    #[test]
    fn config_globs_match_short_name_or_full_path() {
        let config = config_with_ignore("*\\avr-gcc.exe");
        let dis = Disables::default();
        assert!(is_ignored(
            &config,
            &dis,
            ToolchainKind::GnuCc,
            true,
            "avr-gcc.exe",
            Some(Path::new("c:\\avr\\bin\\avr-gcc.exe"))
        ));

        let config = config_with_ignore("bcc32.exe");
        assert!(is_ignored(
            &config,
            &dis,
            ToolchainKind::Borland,
            false,
            "bcc32.exe",
            None
        ));
        assert!(!is_ignored(
            &config,
            &dis,
            ToolchainKind::Borland,
            false,
            "bcc32c.exe",
            None
        ));
    }
}
